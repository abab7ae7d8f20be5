//! `POST /maintenance/sweep-memories`: physically delete expired memories.
//!
//! Reads already hide expired entries; the sweep only reclaims space.

use axum::{Json, extract::State};
use serde_json::{Value, json};
use tutor_core::store::MemoryStore;

use crate::{AppState, error::ApiError};

pub async fn sweep_memories<S: MemoryStore>(
  State(state): State<AppState<S>>,
) -> Result<Json<Value>, ApiError> {
  let purged = state
    .store
    .purge_expired_memories()
    .await
    .map_err(ApiError::store)?;
  Ok(Json(json!({ "purged": purged })))
}
