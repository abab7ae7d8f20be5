//! Handlers for `/students/{id}/memories` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/students/{id}/memories` | Unexpired only; optional `?scope=`, `?include_expired=true` |
//! | `PUT`  | `/students/{id}/memories/{key}` | Body: [`PutBody`]; scope default TTL applies |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::Value;
use tutor_core::{
  memory::{MAX_TTL_DAYS, MemoryEntry, MemoryPatch, MemoryScope, ttl_from_days},
  store::{MemoryStore, StudentDirectory},
};
use uuid::Uuid;

use crate::{AppState, error::ApiError, students::require};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub scope:           Option<MemoryScope>,
  #[serde(default)]
  pub include_expired: bool,
}

/// `GET /students/{id}/memories[?scope=<scope>][&include_expired=true]`
pub async fn list<S: StudentDirectory + MemoryStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<MemoryEntry>>, ApiError> {
  require(&state.store, id).await?;

  let entries = if params.include_expired {
    let mut all = state.store.all_memories(id).await.map_err(ApiError::store)?;
    if let Some(scope) = params.scope {
      all.retain(|m| m.scope == scope);
    }
    all
  } else {
    state
      .store
      .get_unexpired_memories(id, params.scope)
      .await
      .map_err(ApiError::store)?
  };
  Ok(Json(entries))
}

/// JSON body accepted by `PUT /students/{id}/memories/{key}`.
#[derive(Debug, Deserialize)]
pub struct PutBody {
  pub scope:    String,
  pub value:    Value,
  /// Overrides the scope's default lifetime; fractional days are allowed.
  pub ttl_days: Option<f64>,
}

/// `PUT /students/{id}/memories/{key}`
pub async fn put_one<S: MemoryStore>(
  State(state): State<AppState<S>>,
  Path((id, key)): Path<(Uuid, String)>,
  Json(body): Json<PutBody>,
) -> Result<Json<MemoryEntry>, ApiError> {
  if body.value.is_null() {
    return Err(ApiError::BadRequest("value must not be null".into()));
  }
  let mut patch = MemoryPatch::new(body.scope, key, body.value);
  if let Some(days) = body.ttl_days {
    let ttl = ttl_from_days(days).ok_or_else(|| {
      ApiError::BadRequest(format!("ttl_days must be in (0, {MAX_TTL_DAYS}]"))
    })?;
    patch.ttl = Some(ttl);
  }

  let mut outcome = state
    .store
    .apply_memory_delta(id, vec![patch])
    .await
    .map_err(ApiError::store)?;

  if let Some(err) = outcome.errors.pop() {
    return Err(err.into());
  }
  outcome
    .applied
    .pop()
    .map(Json)
    .ok_or_else(|| ApiError::BadRequest("memory was not written".into()))
}
