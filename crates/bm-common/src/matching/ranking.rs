use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::similarity::Candidate;

pub const DEFAULT_RESULT_LIMIT: usize = 20;

/// Above this skill distance the displayed similarity bottoms out.
const SIMILARITY_CUTOFF_DIFF: u32 = 50;
const SIMILARITY_FLOOR: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub similarity_percent: u8,
}

/// Display-only similarity derived from `skill_diff`. Not used for ordering.
pub fn similarity_percent(diff: u32) -> u8 {
    if diff > SIMILARITY_CUTOFF_DIFF {
        return SIMILARITY_FLOOR;
    }

    let raw = 100.0 - f64::from(diff) * 1.5;
    raw.max(f64::from(SIMILARITY_FLOOR)).round() as u8
}

/// 共通タグ数(降順) → skill_diff(昇順) → os_diff(昇順)
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.common_tags
        .len()
        .cmp(&a.common_tags.len())
        .then_with(|| a.skill_diff.cmp(&b.skill_diff))
        .then_with(|| a.os_diff.cmp(&b.os_diff))
}

/// Stable-sorts candidates and keeps the first `limit`. Full ties keep their input order.
pub fn rank_candidates(mut candidates: Vec<Candidate>, limit: usize) -> Vec<RankedCandidate> {
    candidates.sort_by(compare_candidates);
    candidates.truncate(limit);

    candidates
        .into_iter()
        .map(|candidate| RankedCandidate {
            similarity_percent: similarity_percent(candidate.skill_diff),
            candidate,
        })
        .collect()
}
