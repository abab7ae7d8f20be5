//! Handlers for the read-side context and the write-side reconciliation.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/students/{id}/context` | Optional `?format=prompt` for a Markdown briefing |
//! | `POST` | `/students/{id}/reconcile` | Body: analyzer JSON, or a JSON string of raw analyzer text |

use axum::{
  Json,
  extract::{Path, Query, State},
  response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use tutor_core::{
  context::assemble_context,
  reconcile::{ReconciliationReport, reconcile_value},
  store::TutorStore,
};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextFormat {
  #[default]
  Json,
  Prompt,
}

#[derive(Debug, Deserialize)]
pub struct ContextParams {
  #[serde(default)]
  pub format: ContextFormat,
}

/// `GET /students/{id}/context[?format=json|prompt]`
pub async fn assemble<S: TutorStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<ContextParams>,
) -> Result<Response, ApiError> {
  let context = assemble_context(state.store.as_ref(), id, state.limits)
    .await
    .map_err(ApiError::store)?;

  Ok(match params.format {
    ContextFormat::Json => Json(context).into_response(),
    ContextFormat::Prompt => context.render_prompt().into_response(),
  })
}

/// `POST /students/{id}/reconcile`
///
/// Skipped items are reported in the body's `errors`; the status is 200 as
/// long as the student exists and storage is reachable.
pub async fn reconcile<S: TutorStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<Value>,
) -> Result<Json<ReconciliationReport>, ApiError> {
  let report = reconcile_value(state.store.as_ref(), id, &body)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(report))
}
