use thiserror::Error;
use tracing::{info, instrument};

use crate::analysis::BookAnalysis;
use crate::stats::{PointsMode, record_points};
use crate::store::{LibraryStore, ProfileStore, StoreError};
use crate::{ActivityLog, NewActivityLog};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("activity log {0} not found")]
    NotFound(String),
    #[error("activity log {log_id} is not owned by the requesting user")]
    Forbidden { log_id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stores the analysed book as a new log and credits its points to the owner.
#[instrument(skip(store, analysis))]
pub async fn add_analyzed_book<S>(
    store: &S,
    user_id: &str,
    book_title: &str,
    analysis: &BookAnalysis,
) -> Result<ActivityLog, LibraryError>
where
    S: LibraryStore + ?Sized,
{
    let new_log = NewActivityLog {
        user_id: user_id.to_string(),
        book_title: book_title.to_string(),
        author: analysis.author.clone(),
        summary: analysis.summary.clone(),
        tags: analysis.tags.clone(),
        gained_points: analysis.points,
        memo: String::new(),
    };

    let stored = store.insert_activity_log(&new_log).await?;
    record_points(store, user_id, &stored.gained_points, PointsMode::Add).await?;

    info!(log_id = %stored.id, tags = stored.tags.as_ref().map_or(0, Vec::len), "book added");
    Ok(stored)
}

/// 本棚（新しい順）
pub async fn list_books<S>(store: &S, user_id: &str) -> Result<Vec<ActivityLog>, LibraryError>
where
    S: ProfileStore + ?Sized,
{
    Ok(store.get_activity_logs(user_id).await?)
}

/// Field-level edit of a stored log. `None` keeps the current value; points are never re-scored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookEdit {
    pub book_title: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub memo: Option<String>,
}

impl BookEdit {
    fn apply_to(self, log: &mut ActivityLog) {
        if let Some(title) = self.book_title {
            log.book_title = title.trim().to_string();
        }
        if let Some(author) = self.author {
            let author = author.trim();
            log.author = (!author.is_empty()).then(|| author.to_string());
        }
        if let Some(summary) = self.summary {
            log.summary = Some(summary);
        }
        if let Some(tags) = self.tags {
            log.tags = Some(
                tags.into_iter()
                    .map(|tag| tag.trim().to_string())
                    .filter(|tag| !tag.is_empty())
                    .collect(),
            );
        }
        if let Some(memo) = self.memo {
            log.memo = memo;
        }
    }
}

#[instrument(skip(store, edit))]
pub async fn edit_book<S>(
    store: &S,
    user_id: &str,
    log_id: &str,
    edit: BookEdit,
) -> Result<ActivityLog, LibraryError>
where
    S: LibraryStore + ?Sized,
{
    let mut log = owned_log(store, user_id, log_id).await?;
    edit.apply_to(&mut log);

    let updated = store
        .update_activity_log(&log)
        .await?
        .ok_or_else(|| LibraryError::NotFound(log_id.to_string()))?;

    info!("book edited");
    Ok(updated)
}

/// Deletes one of the user's logs and takes its points back out of their stats.
///
/// Points are only subtracted for the row this call actually removed, so a repeated delete
/// of the same log reports `NotFound` without touching the stats a second time.
#[instrument(skip(store))]
pub async fn remove_book<S>(
    store: &S,
    user_id: &str,
    log_id: &str,
) -> Result<ActivityLog, LibraryError>
where
    S: LibraryStore + ?Sized,
{
    owned_log(store, user_id, log_id).await?;

    let removed = store
        .delete_activity_log(log_id)
        .await?
        .ok_or_else(|| LibraryError::NotFound(log_id.to_string()))?;

    record_points(store, user_id, &removed.gained_points, PointsMode::Subtract).await?;

    info!("book removed");
    Ok(removed)
}

async fn owned_log<S>(store: &S, user_id: &str, log_id: &str) -> Result<ActivityLog, LibraryError>
where
    S: LibraryStore + ?Sized,
{
    let log = store
        .get_activity_log(log_id)
        .await?
        .ok_or_else(|| LibraryError::NotFound(log_id.to_string()))?;

    if log.user_id != user_id {
        return Err(LibraryError::Forbidden {
            log_id: log_id.to_string(),
        });
    }
    Ok(log)
}
