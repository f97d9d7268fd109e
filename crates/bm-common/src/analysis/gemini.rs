use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{AnalysisError, BookAnalysis, BookAnalyzer, parse_analysis};

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

fn endpoint_for(model: &str) -> String {
    format!("{API_BASE}/{model}:generateContent")
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.into(),
            endpoint: endpoint_for(DEFAULT_MODEL),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl AnalyzerConfig {
    pub fn from_env() -> Self {
        let model = non_empty_env("BM_GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());
        let endpoint = non_empty_env("BM_GEMINI_ENDPOINT").unwrap_or_else(|| endpoint_for(&model));
        let timeout_secs = non_empty_env("BM_GEMINI_TIMEOUT_SECONDS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            api_key: non_empty_env("BM_GEMINI_API_KEY").or_else(|| non_empty_env("GEMINI_API_KEY")),
            model,
            endpoint,
            timeout_secs,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn first_text(response: GenerateResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .find_map(|part| part.text)
        .filter(|text| !text.trim().is_empty())
}

fn build_prompt(book_title: &str, author: Option<&str>) -> String {
    let author = author
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("不明（書籍名から推測してください）");

    format!(
        r#"あなたはビジネス書の価値を定量化する分析官です。
以下の書籍を分析し、JSON形式でのみ回答してください。

書籍名: 『{book_title}』
著者名: {author}

採点ルール:
1. ビジネスOSの5項目（戦略, 実行, 論理, 心理, 教養）の合計をちょうど10点にする。
2. ビジネススキルの5項目（営業, マーケ, IT, 財務, 管理）の合計をちょうど10点にする。
関連のない項目は0点にすること。

出力フォーマット:
{{
  "author": "正式な著者名",
  "summary": "100文字以内のあらすじ（デスマス調）",
  "tags": ["タグ1", "タグ2"],
  "points": {{
    "os_strategy": 0, "os_execution": 0, "os_logic": 0, "os_humanity": 0, "os_liberal_arts": 0,
    "skill_sales": 0, "skill_marketing": 0, "skill_technology": 0, "skill_finance": 0, "skill_management": 0
  }}
}}"#
    )
}

/// `generateContent` client. One request per book, no retries.
pub struct GeminiClient {
    http: reqwest::Client,
    config: AnalyzerConfig,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalysisError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(AnalysisError::MissingApiKey)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl BookAnalyzer for GeminiClient {
    #[instrument(skip(self), fields(model = %self.config.model))]
    async fn analyze(
        &self,
        book_title: &str,
        author: Option<&str>,
    ) -> Result<BookAnalysis, AnalysisError> {
        let prompt = build_prompt(book_title, author);
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: &prompt }],
            }],
        };

        let started = Instant::now();
        let response = self
            .http
            .post(&self.config.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let payload: GenerateResponse = response.json().await?;
        let text = first_text(payload).ok_or(AnalysisError::EmptyResponse)?;
        debug!(chars = text.len(), "analysis text received");

        let analysis = parse_analysis(&text)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            tags = analysis.tags.len(),
            "book analysed"
        );
        Ok(analysis)
    }
}
