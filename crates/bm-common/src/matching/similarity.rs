use serde::{Deserialize, Serialize};

use super::tags::TagSet;
use crate::{Attribute, AttributeGroup, SkillVector, UserProfile};

/// Distance reported when either side has no stats at all. Never derived from partial data.
pub const UNKNOWN_DIFF: u32 = 1000;

const PLACEHOLDER_DISPLAY_NAME: &str = "Unknown";

/// Ranking input for a single prospective match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_ref: Option<String>,
    pub career: String,
    pub education: String,
    pub common_tags: Vec<String>,
    pub skill_diff: u32,
    pub os_diff: u32,
}

fn group_diff(a: &SkillVector, b: &SkillVector, group: AttributeGroup) -> u32 {
    Attribute::in_group(group)
        .map(|attr| a.get(attr).abs_diff(b.get(attr)))
        .sum()
}

/// 戦略・実行・論理・心理・教養の差分合計
pub fn os_diff(a: &SkillVector, b: &SkillVector) -> u32 {
    group_diff(a, b, AttributeGroup::Os)
}

/// 営業・マーケ・IT・財務・管理の差分合計
pub fn skill_diff(a: &SkillVector, b: &SkillVector) -> u32 {
    group_diff(a, b, AttributeGroup::Skill)
}

/// Returns `(skill_diff, os_diff)`, or the [`UNKNOWN_DIFF`] pair when either vector is missing.
pub fn score_pair(requester: Option<&SkillVector>, candidate: Option<&SkillVector>) -> (u32, u32) {
    match (requester, candidate) {
        (Some(mine), Some(theirs)) => (skill_diff(mine, theirs), os_diff(mine, theirs)),
        _ => (UNKNOWN_DIFF, UNKNOWN_DIFF),
    }
}

/// Candidate's tags that the requester also has, in the candidate set's iteration order.
pub fn common_tags(requester_tags: &TagSet, candidate_tags: &TagSet) -> Vec<String> {
    candidate_tags
        .iter()
        .filter(|tag| requester_tags.contains(*tag))
        .cloned()
        .collect()
}

pub fn build_candidate(
    profile: UserProfile,
    requester_stats: Option<&SkillVector>,
    candidate_stats: Option<&SkillVector>,
    requester_tags: &TagSet,
    candidate_tags: &TagSet,
) -> Candidate {
    let (skill_diff, os_diff) = score_pair(requester_stats, candidate_stats);

    Candidate {
        id: profile.id,
        display_name: profile
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| PLACEHOLDER_DISPLAY_NAME.to_string()),
        bio: profile.bio.unwrap_or_default(),
        avatar_ref: profile.avatar_ref,
        career: profile.career.unwrap_or_default(),
        education: profile.education.unwrap_or_default(),
        common_tags: common_tags(requester_tags, candidate_tags),
        skill_diff,
        os_diff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> TagSet {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn diffs_sum_absolute_differences_per_group() {
        let mine = SkillVector {
            os_strategy: 5,
            os_logic: 2,
            skill_sales: 10,
            skill_finance: 1,
            ..SkillVector::default()
        };
        let theirs = SkillVector {
            os_strategy: 1,
            os_logic: 6,
            skill_sales: 4,
            skill_management: 3,
            ..SkillVector::default()
        };

        assert_eq!(os_diff(&mine, &theirs), 8);
        assert_eq!(skill_diff(&mine, &theirs), 6 + 1 + 3);
        assert_eq!(os_diff(&mine, &theirs), os_diff(&theirs, &mine));
    }

    #[test]
    fn missing_vector_on_either_side_yields_sentinel() {
        let stats = SkillVector {
            skill_sales: 3,
            ..SkillVector::default()
        };

        assert_eq!(score_pair(None, Some(&stats)), (UNKNOWN_DIFF, UNKNOWN_DIFF));
        assert_eq!(score_pair(Some(&stats), None), (UNKNOWN_DIFF, UNKNOWN_DIFF));
        assert_eq!(score_pair(None, None), (UNKNOWN_DIFF, UNKNOWN_DIFF));
    }

    #[test]
    fn zero_vectors_are_comparable() {
        let zero = SkillVector::default();
        assert_eq!(score_pair(Some(&zero), Some(&zero)), (0, 0));
    }

    #[test]
    fn common_tags_follow_candidate_order() {
        let mine = tags(&["strategy", "finance", "history"]);
        let theirs = tags(&["finance", "marketing", "strategy"]);

        assert_eq!(
            common_tags(&mine, &theirs),
            vec!["finance".to_string(), "strategy".to_string()]
        );
        assert!(common_tags(&TagSet::new(), &theirs).is_empty());
    }

    #[test]
    fn missing_display_fields_fall_back_to_placeholders() {
        let profile = UserProfile {
            id: "u2".into(),
            display_name: None,
            is_visible: true,
            ..UserProfile::default()
        };

        let candidate = build_candidate(profile, None, None, &TagSet::new(), &TagSet::new());

        assert_eq!(candidate.display_name, "Unknown");
        assert_eq!(candidate.bio, "");
        assert_eq!(candidate.career, "");
        assert_eq!(candidate.education, "");
        assert_eq!(candidate.skill_diff, UNKNOWN_DIFF);
        assert_eq!(candidate.os_diff, UNKNOWN_DIFF);
    }
}
