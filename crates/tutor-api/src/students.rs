//! Handlers for `/students` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/students` | All students |
//! | `POST`   | `/students` | Body: `{"display_name":"Ada","grade_level":"4"}` |
//! | `GET`    | `/students/{id}` | 404 if not found |
//! | `DELETE` | `/students/{id}` | Erases everything the student owns; 204 |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use tutor_core::{
  store::StudentDirectory,
  student::{NewStudent, Student},
};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// `GET /students`
pub async fn list<S: StudentDirectory>(
  State(state): State<AppState<S>>,
) -> Result<Json<Vec<Student>>, ApiError> {
  let students = state.store.list_students().await.map_err(ApiError::store)?;
  Ok(Json(students))
}

/// `POST /students`
pub async fn create<S: StudentDirectory>(
  State(state): State<AppState<S>>,
  Json(body): Json<NewStudent>,
) -> Result<impl IntoResponse, ApiError> {
  let student = state.store.add_student(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(student)))
}

/// `GET /students/{id}`
pub async fn get_one<S: StudentDirectory>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Student>, ApiError> {
  let student = state
    .store
    .get_student(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("student {id} not found")))?;
  Ok(Json(student))
}

/// `DELETE /students/{id}`
pub async fn delete_one<S: StudentDirectory>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  if state.store.delete_student(id).await.map_err(ApiError::store)? {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("student {id} not found")))
  }
}

/// Resolve `id` or fail with 404, for handlers whose store calls return
/// empty results for unknown students.
pub(crate) async fn require<S: StudentDirectory>(
  store: &Arc<S>,
  id: Uuid,
) -> Result<Student, ApiError> {
  store
    .get_student(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("student {id} not found")))
}
