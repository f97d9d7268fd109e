use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

use bm_common::ActivityLog;
use bm_common::api::{EditBookRequest, LibraryResponse, SubmitBooksRequest, SubmitBooksResponse};
use bm_common::library::{BookEdit, edit_book, list_books, remove_book};
use bm_common::queue::BookRequest;

use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

const MAX_BOOKS_PER_SUBMISSION: usize = 50;
const MAX_TITLE_CHARS: usize = 200;

fn validate(request: SubmitBooksRequest) -> Result<Vec<BookRequest>, ApiError> {
    if request.books.is_empty() {
        return Err(ApiError::BadRequest("books must not be empty".into()));
    }
    if request.books.len() > MAX_BOOKS_PER_SUBMISSION {
        return Err(ApiError::BadRequest(format!(
            "at most {MAX_BOOKS_PER_SUBMISSION} books per submission"
        )));
    }

    let books: Vec<BookRequest> = request.books.into_iter().map(Into::into).collect();
    if let Some(index) = books.iter().position(|b| b.title.is_empty()) {
        return Err(ApiError::BadRequest(format!("books[{index}].title is required")));
    }
    if let Some(index) = books
        .iter()
        .position(|b| b.title.chars().count() > MAX_TITLE_CHARS)
    {
        return Err(ApiError::BadRequest(format!("books[{index}].title is too long")));
    }

    Ok(books)
}

fn validate_edit(request: EditBookRequest) -> Result<BookEdit, ApiError> {
    if let Some(title) = request.book_title.as_deref() {
        if title.trim().is_empty() {
            return Err(ApiError::BadRequest("book_title must not be blank".into()));
        }
        if title.trim().chars().count() > MAX_TITLE_CHARS {
            return Err(ApiError::BadRequest("book_title is too long".into()));
        }
    }
    Ok(request.into())
}

pub async fn library(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    auth: AuthUser,
) -> Result<Json<LibraryResponse>, ApiError> {
    auth.ensure_acts_for(&user_id)?;

    let books = list_books(state.store.as_ref(), &user_id).await?;
    Ok(Json(LibraryResponse { books }))
}

/// 本の情報（タイトル・著者・あらすじ・タグ・メモ）を修正。獲得ポイントは変えない。
pub async fn update_book(
    State(state): State<SharedState>,
    Path((user_id, log_id)): Path<(String, String)>,
    auth: AuthUser,
    Json(request): Json<EditBookRequest>,
) -> Result<Json<ActivityLog>, ApiError> {
    auth.ensure_acts_for(&user_id)?;

    let edit = validate_edit(request)?;
    let updated = edit_book(state.store.as_ref(), &user_id, &log_id, edit).await?;
    Ok(Json(updated))
}

/// 本をキューに追加（分析はバックグラウンドで順次実行）
pub async fn submit_books(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    auth: AuthUser,
    Json(request): Json<SubmitBooksRequest>,
) -> Result<(StatusCode, Json<SubmitBooksResponse>), ApiError> {
    auth.ensure_acts_for(&user_id)?;

    let books = validate(request)?;
    let receipt = state.queue.enqueue(&user_id, books)?;
    let response = SubmitBooksResponse::from_receipt(receipt, state.queue.remaining());

    Ok((StatusCode::ACCEPTED, Json(response)))
}

pub async fn delete_book(
    State(state): State<SharedState>,
    Path((user_id, log_id)): Path<(String, String)>,
    auth: AuthUser,
) -> Result<StatusCode, ApiError> {
    auth.ensure_acts_for(&user_id)?;

    let removed = remove_book(state.store.as_ref(), &user_id, &log_id).await?;
    info!(log_id = %removed.id, "book deleted via api");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use bm_common::api::BookSubmission;

    use super::*;

    fn request(titles: &[&str]) -> SubmitBooksRequest {
        SubmitBooksRequest {
            books: titles
                .iter()
                .map(|t| BookSubmission {
                    title: t.to_string(),
                    author: None,
                })
                .collect(),
        }
    }

    #[test]
    fn rejects_empty_and_blank_titles() {
        assert!(matches!(validate(request(&[])), Err(ApiError::BadRequest(_))));
        assert!(matches!(
            validate(request(&["ok", "  "])),
            Err(ApiError::BadRequest(msg)) if msg.contains("books[1]")
        ));
    }

    #[test]
    fn rejects_oversized_batches() {
        let titles: Vec<String> = (0..=MAX_BOOKS_PER_SUBMISSION).map(|i| format!("b{i}")).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();

        assert!(matches!(validate(request(&refs)), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn edit_rejects_blank_title_but_allows_omitting_it() {
        let blank = EditBookRequest {
            book_title: Some("   ".into()),
            ..EditBookRequest::default()
        };
        assert!(matches!(validate_edit(blank), Err(ApiError::BadRequest(_))));

        let tags_only = EditBookRequest {
            tags: Some(vec!["思考法".into()]),
            ..EditBookRequest::default()
        };
        assert_eq!(validate_edit(tags_only).unwrap().book_title, None);
    }

    #[test]
    fn accepts_trimmed_titles() {
        let books = validate(request(&[" 嫌われる勇気 "])).unwrap();
        assert_eq!(books[0].title, "嫌われる勇気");
    }
}
