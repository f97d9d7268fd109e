use serde::{Deserialize, Serialize};

use crate::library::BookEdit;
use crate::matching::TagFrequency;
use crate::profile::{FollowState, ProfileUpdate, UserView};
use crate::stats::StatsSummary;
use crate::{ActivityLog, SkillVector, UserProfile};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryResponse {
    pub books: Vec<ActivityLog>,
}

/// Omitted fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditBookRequest {
    pub book_title: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub memo: Option<String>,
}

impl From<EditBookRequest> for BookEdit {
    fn from(request: EditBookRequest) -> Self {
        BookEdit {
            book_title: request.book_title,
            author: request.author,
            summary: request.summary,
            tags: request.tags,
            memo: request.memo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub stats: SkillVector,
    pub os_total: u32,
    pub skill_total: u32,
}

impl From<StatsSummary> for StatsResponse {
    fn from(summary: StatsSummary) -> Self {
        Self {
            stats: summary.stats,
            os_total: summary.os_total,
            skill_total: summary.skill_total,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_ref: Option<String>,
    pub career: Option<String>,
    pub education: Option<String>,
    pub is_visible: Option<bool>,
}

impl From<UpdateProfileRequest> for ProfileUpdate {
    fn from(request: UpdateProfileRequest) -> Self {
        ProfileUpdate {
            display_name: request.display_name,
            bio: request.bio,
            avatar_ref: request.avatar_ref,
            career: request.career,
            education: request.education,
            is_visible: request.is_visible,
        }
    }
}

/// ユーザー詳細ページ（プロフィール・ステータス・本棚・フォロー状態）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserViewResponse {
    pub profile: UserProfile,
    pub stats: StatsResponse,
    pub books: Vec<ActivityLog>,
    pub top_tags: Vec<TagFrequency>,
    pub follower_count: u64,
    pub is_following: bool,
}

impl From<UserView> for UserViewResponse {
    fn from(view: UserView) -> Self {
        Self {
            profile: view.profile,
            stats: view.stats.into(),
            books: view.books,
            top_tags: view.top_tags,
            follower_count: view.follower_count,
            is_following: view.is_following,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowResponse {
    pub following: bool,
    pub follower_count: u64,
}

impl From<FollowState> for FollowResponse {
    fn from(state: FollowState) -> Self {
        Self {
            following: state.following,
            follower_count: state.follower_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_edit_leaves_other_fields_unset() {
        let request: EditBookRequest = serde_json::from_str(r#"{"tags":["戦略"]}"#).unwrap();

        let edit = BookEdit::from(request);

        assert_eq!(edit.tags, Some(vec!["戦略".to_string()]));
        assert_eq!(edit.book_title, None);
        assert_eq!(edit.memo, None);
    }

    #[test]
    fn stats_response_is_flat_counters_plus_totals() {
        let summary = StatsSummary::from(SkillVector {
            os_logic: 3,
            skill_sales: 4,
            ..SkillVector::default()
        });

        let json = serde_json::to_value(StatsResponse::from(summary)).unwrap();

        assert_eq!(json["stats"]["os_logic"], 3);
        assert_eq!(json["os_total"], 3);
        assert_eq!(json["skill_total"], 4);
    }
}
