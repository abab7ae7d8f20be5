//! Handlers for `/students/{id}/profile` endpoints.

use axum::{
  Json,
  extract::{Path, State},
};
use tutor_core::{
  profile::StudentProfile,
  store::{ProfileStore, StudentDirectory},
};
use uuid::Uuid;

use crate::{AppState, error::ApiError, students::require};

/// `GET /students/{id}/profile` returns 404 until a first profile exists.
pub async fn current<S: ProfileStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<StudentProfile>, ApiError> {
  let profile = state
    .store
    .current_profile(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("no profile for student {id}")))?;
  Ok(Json(profile))
}

/// `GET /students/{id}/profile/history`, oldest first.
pub async fn history<S: StudentDirectory + ProfileStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<StudentProfile>>, ApiError> {
  require(&state.store, id).await?;
  let versions = state.store.profile_history(id).await.map_err(ApiError::store)?;
  Ok(Json(versions))
}
