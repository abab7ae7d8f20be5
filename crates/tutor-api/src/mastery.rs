//! Handlers for `/students/{id}/mastery` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/students/{id}/mastery` | Nested subject → grade → goal → KC map |
//! | `GET`  | `/students/{id}/mastery/incomplete` | `?threshold=` (default 100), weakest first |
//! | `PUT`  | `/students/{id}/mastery` | Body: [`UpsertBody`] |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use tutor_core::{
  mastery::{MAX_MASTERY, MasteryMap, MasteryRecord, ProgressEntry},
  store::{CurriculumGraph, MasteryStore, StudentDirectory},
};
use uuid::Uuid;

use crate::{AppState, error::ApiError, students::require};

/// `GET /students/{id}/mastery`
pub async fn map<S: StudentDirectory + MasteryStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<MasteryMap>, ApiError> {
  require(&state.store, id).await?;
  let map = state.store.get_mastery_map(id).await.map_err(ApiError::store)?;
  Ok(Json(map))
}

#[derive(Debug, Deserialize)]
pub struct IncompleteParams {
  pub threshold: Option<f64>,
}

/// `GET /students/{id}/mastery/incomplete[?threshold=<pct>]`
pub async fn incomplete<S: StudentDirectory + MasteryStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<IncompleteParams>,
) -> Result<Json<Vec<ProgressEntry>>, ApiError> {
  require(&state.store, id).await?;
  let entries = state
    .store
    .get_incomplete(id, params.threshold.unwrap_or(MAX_MASTERY))
    .await
    .map_err(ApiError::store)?;
  Ok(Json(entries))
}

/// JSON body accepted by `PUT /students/{id}/mastery`.
#[derive(Debug, Deserialize)]
pub struct UpsertBody {
  pub goal_code:          String,
  /// Omit to set the goal-level row.
  pub kc_code:            Option<String>,
  pub mastery_percentage: f64,
}

/// `PUT /students/{id}/mastery`
pub async fn upsert<S: CurriculumGraph + MasteryStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<UpsertBody>,
) -> Result<Json<MasteryRecord>, ApiError> {
  let goal_id = state
    .store
    .resolve_goal_code(body.goal_code.clone())
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("goal {:?} not found", body.goal_code)))?;

  let record = state
    .store
    .upsert_mastery(id, goal_id, body.kc_code, body.mastery_percentage)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(record))
}
