//! Profile editing, the public user page and follow edges.

use thiserror::Error;
use tracing::{info, instrument};

use crate::matching::{TagFrequency, tag_frequencies};
use crate::stats::StatsSummary;
use crate::store::{LibraryStore, ProfileStore, StoreError};
use crate::{ActivityLog, UserProfile};

/// Tags shown on a user page.
pub const USER_VIEW_TAG_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile {0} not found")]
    NotFound(String),
    #[error("users cannot follow themselves")]
    SelfFollow,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Full replacement of the editable profile fields. `is_visible: None` keeps the stored flag
/// (new profiles start visible).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_ref: Option<String>,
    pub career: Option<String>,
    pub education: Option<String>,
    pub is_visible: Option<bool>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[instrument(skip(store, update))]
pub async fn update_profile<S>(
    store: &S,
    user_id: &str,
    update: ProfileUpdate,
) -> Result<UserProfile, ProfileError>
where
    S: LibraryStore + ?Sized,
{
    let existing = store.get_profile(user_id).await?;
    let is_visible = update
        .is_visible
        .or(existing.as_ref().map(|p| p.is_visible))
        .unwrap_or(true);

    let profile = UserProfile {
        id: user_id.to_string(),
        display_name: non_blank(update.display_name),
        bio: non_blank(update.bio),
        avatar_ref: non_blank(update.avatar_ref),
        career: non_blank(update.career),
        education: non_blank(update.education),
        is_visible,
    };

    let stored = store.upsert_profile(&profile).await?;
    info!(is_visible = stored.is_visible, created = existing.is_none(), "profile saved");
    Ok(stored)
}

/// Everything the public user page shows for `target` as seen by `viewer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserView {
    pub profile: UserProfile,
    pub stats: StatsSummary,
    /// Newest first.
    pub books: Vec<ActivityLog>,
    pub top_tags: Vec<TagFrequency>,
    pub follower_count: u64,
    pub is_following: bool,
}

/// Builds a user page. Hidden profiles are still reachable by id; visibility only governs matching.
#[instrument(skip(store))]
pub async fn view_user<S>(
    store: &S,
    viewer_id: &str,
    target_id: &str,
) -> Result<UserView, ProfileError>
where
    S: ProfileStore + ?Sized,
{
    let (profile, stats, books, follower_count, is_following) = tokio::try_join!(
        store.get_profile(target_id),
        store.get_skill_vector(target_id),
        store.get_activity_logs(target_id),
        store.follower_count(target_id),
        store.is_following(viewer_id, target_id),
    )?;

    let profile = profile.ok_or_else(|| ProfileError::NotFound(target_id.to_string()))?;
    let top_tags = tag_frequencies(&books, USER_VIEW_TAG_LIMIT);

    Ok(UserView {
        profile,
        stats: StatsSummary::from(stats.unwrap_or_default()),
        books,
        top_tags,
        follower_count,
        is_following: is_following && viewer_id != target_id,
    })
}

/// Follow state after a follow or unfollow call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowState {
    pub following: bool,
    pub follower_count: u64,
}

/// Idempotent; following an already-followed user just reports the current state.
#[instrument(skip(store))]
pub async fn follow<S>(
    store: &S,
    follower_id: &str,
    target_id: &str,
) -> Result<FollowState, ProfileError>
where
    S: LibraryStore + ?Sized,
{
    if follower_id == target_id {
        return Err(ProfileError::SelfFollow);
    }
    if store.get_profile(target_id).await?.is_none() {
        return Err(ProfileError::NotFound(target_id.to_string()));
    }

    let created = store.follow(follower_id, target_id).await?;
    let follower_count = store.follower_count(target_id).await?;
    info!(created, follower_count, "followed");

    Ok(FollowState {
        following: true,
        follower_count,
    })
}

#[instrument(skip(store))]
pub async fn unfollow<S>(
    store: &S,
    follower_id: &str,
    target_id: &str,
) -> Result<FollowState, ProfileError>
where
    S: LibraryStore + ?Sized,
{
    let removed = store.unfollow(follower_id, target_id).await?;
    let follower_count = store.follower_count(target_id).await?;
    info!(removed, follower_count, "unfollowed");

    Ok(FollowState {
        following: false,
        follower_count,
    })
}
