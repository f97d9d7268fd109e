use serde::{Deserialize, Serialize};

use crate::matching::RankedCandidate;

/// マッチ候補1件（一覧表示用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidateResponse {
    pub id: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_ref: Option<String>,
    pub career: String,
    pub education: String,
    /// 共通の読書タグ
    pub common_tags: Vec<String>,
    pub skill_diff: u32,
    pub os_diff: u32,
    /// 表示専用（並び順には使わない）
    pub similarity_percent: u8,
}

impl From<RankedCandidate> for MatchCandidateResponse {
    fn from(ranked: RankedCandidate) -> Self {
        let candidate = ranked.candidate;
        Self {
            id: candidate.id,
            display_name: candidate.display_name,
            bio: candidate.bio,
            avatar_ref: candidate.avatar_ref,
            career: candidate.career,
            education: candidate.education,
            common_tags: candidate.common_tags,
            skill_diff: candidate.skill_diff,
            os_diff: candidate.os_diff,
            similarity_percent: ranked.similarity_percent,
        }
    }
}
