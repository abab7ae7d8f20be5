//! Handlers for session endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/students/{id}/sessions` | Newest first; `?limit=` (default 20) |
//! | `POST` | `/students/{id}/sessions` | Body: [`SessionBody`]; idempotent on `call_id` |
//! | `GET`  | `/sessions/{id}` | 404 if not found |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tutor_core::{
  session::{NewSession, SessionRecord},
  store::{SessionStore, StudentDirectory},
};
use uuid::Uuid;

use crate::{AppState, error::ApiError, students::require};

fn default_limit() -> usize { 20 }

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default = "default_limit")]
  pub limit: usize,
}

/// `GET /students/{id}/sessions[?limit=<n>]`
pub async fn list<S: StudentDirectory + SessionStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<SessionRecord>>, ApiError> {
  require(&state.store, id).await?;
  let sessions = state
    .store
    .recent_sessions(id, params.limit)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(sessions))
}

/// JSON body accepted by `POST /students/{id}/sessions`.
#[derive(Debug, Deserialize)]
pub struct SessionBody {
  pub call_id:          Option<String>,
  /// Defaults to now.
  pub started_at:       Option<DateTime<Utc>>,
  pub duration_seconds: Option<u32>,
  #[serde(default)]
  pub transcript:       String,
  pub summary:          Option<String>,
}

/// `POST /students/{id}/sessions`
pub async fn create<S: SessionStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<SessionBody>,
) -> Result<impl IntoResponse, ApiError> {
  let session = state
    .store
    .record_session(NewSession {
      student_id:       id,
      call_id:          body.call_id,
      started_at:       body.started_at.unwrap_or_else(Utc::now),
      duration_seconds: body.duration_seconds,
      transcript:       body.transcript,
      summary:          body.summary,
    })
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /sessions/{id}`
pub async fn get_one<S: SessionStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionRecord>, ApiError> {
  let session = state
    .store
    .get_session(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("session {id} not found")))?;
  Ok(Json(session))
}
