use serde::{Deserialize, Serialize};

use crate::matching::TagFrequency;
use crate::queue::{BookRequest, EnqueueReceipt};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSubmission {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
}

impl From<BookSubmission> for BookRequest {
    fn from(submission: BookSubmission) -> Self {
        BookRequest {
            title: submission.title.trim().to_string(),
            author: submission
                .author
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitBooksRequest {
    pub books: Vec<BookSubmission>,
}

/// 受付結果。分析結果は含まない（非同期処理）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitBooksResponse {
    pub batch_id: String,
    pub accepted: usize,
    pub processing_count: usize,
}

impl SubmitBooksResponse {
    pub fn from_receipt(receipt: EnqueueReceipt, processing_count: usize) -> Self {
        Self {
            batch_id: receipt.batch_id,
            accepted: receipt.accepted,
            processing_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    pub processing_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFrequencyResponse {
    pub tags: Vec<TagFrequency>,
}
