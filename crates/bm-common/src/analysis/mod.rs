//! Book analysis: turns a title (and optional author) into tags, a summary and point deltas.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::{Attribute, SkillVector};

pub mod gemini;

pub use gemini::{AnalyzerConfig, GeminiClient};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("analysis api returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("analysis response contained no text")]
    EmptyResponse,
    #[error("failed to parse analysis json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("analysis api key is not configured")]
    MissingApiKey,
}

/// 分析結果（著者・あらすじ・タグ・獲得ポイント）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookAnalysis {
    pub author: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    #[serde(deserialize_with = "lenient_points")]
    pub points: SkillVector,
}

/// モデルが小数・負数・文字列で点数を返しても本ごと捨てない（四捨五入して 0 以上に丸める）
fn lenient_points<'de, D>(deserializer: D) -> Result<SkillVector, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<HashMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();

    let mut points = SkillVector::default();
    for attr in Attribute::iter() {
        let value = raw.get(attr.as_ref()).and_then(lenient_count).unwrap_or(0);
        points.set(attr, value);
    }
    Ok(points)
}

fn lenient_count(value: &Value) -> Option<u32> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    Some(number.round().clamp(0.0, f64::from(u32::MAX)) as u32)
}

#[async_trait]
pub trait BookAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        book_title: &str,
        author: Option<&str>,
    ) -> Result<BookAnalysis, AnalysisError>;
}

/// Stand-in used when no API key is configured. Every book fails with [`AnalysisError::MissingApiKey`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAnalyzer;

#[async_trait]
impl BookAnalyzer for DisabledAnalyzer {
    async fn analyze(
        &self,
        _book_title: &str,
        _author: Option<&str>,
    ) -> Result<BookAnalysis, AnalysisError> {
        Err(AnalysisError::MissingApiKey)
    }
}

/// Parses model output, tolerating ```` ```json ```` code fences around the object.
pub fn parse_analysis(text: &str) -> Result<BookAnalysis, AnalysisError> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let mut analysis: BookAnalysis = serde_json::from_str(cleaned.trim())?;

    analysis.tags.retain(|tag| !tag.trim().is_empty());
    analysis.author = analysis.author.filter(|a| !a.trim().is_empty());
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let text = r#"```json
{
  "author": "安宅和人",
  "summary": "課題の見極め方を解説します。",
  "tags": ["論理思考", "問題解決"],
  "points": {"os_strategy": 2, "os_logic": 8, "skill_management": 10}
}
```"#;

        let analysis = parse_analysis(text).unwrap();

        assert_eq!(analysis.author.as_deref(), Some("安宅和人"));
        assert_eq!(analysis.tags, vec!["論理思考", "問題解決"]);
        assert_eq!(analysis.points.os_logic, 8);
        assert_eq!(analysis.points.skill_management, 10);
        assert_eq!(analysis.points.skill_sales, 0);
    }

    #[test]
    fn missing_fields_default_and_blank_values_are_dropped() {
        let analysis = parse_analysis(r#"{"author": " ", "tags": ["", "dx"]}"#).unwrap();

        assert_eq!(analysis.author, None);
        assert_eq!(analysis.summary, None);
        assert_eq!(analysis.tags, vec!["dx"]);
        assert!(analysis.points.is_zero());
    }

    #[tokio::test]
    async fn disabled_analyzer_always_fails() {
        let result = DisabledAnalyzer.analyze("title", None).await;
        assert!(matches!(result, Err(AnalysisError::MissingApiKey)));
    }

    #[test]
    fn fractional_negative_and_textual_points_are_normalised() {
        let analysis = parse_analysis(
            r#"{"tags": ["会計"], "points": {"os_logic": 2.5, "skill_sales": -3, "skill_finance": "4", "os_humanity": null, "unknown": 9}}"#,
        )
        .unwrap();

        assert_eq!(analysis.points.os_logic, 3);
        assert_eq!(analysis.points.skill_sales, 0);
        assert_eq!(analysis.points.skill_finance, 4);
        assert_eq!(analysis.points.os_humanity, 0);
        assert_eq!(analysis.tags, vec!["会計"]);
    }

    #[test]
    fn null_points_read_as_zero() {
        let analysis = parse_analysis(r#"{"points": null}"#).unwrap();
        assert!(analysis.points.is_zero());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let result = parse_analysis("申し訳ありませんが分析できません");
        assert!(matches!(result, Err(AnalysisError::Parse(_))));
    }
}
