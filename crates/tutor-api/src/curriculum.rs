//! Handlers for `/curriculum` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/curriculum/goals` | Body: goal with its knowledge components; 201, 409 on duplicate code |
//! | `GET`  | `/curriculum/goals/{code}` | Goal, KCs and prerequisites |
//! | `POST` | `/curriculum/goals/{code}/prerequisites` | Body: [`PrerequisiteBody`]; 400 on a cycle |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tutor_core::{
  curriculum::{CurriculumGoal, KnowledgeComponent, NewGoal, Prerequisite},
  store::CurriculumGraph,
};

use crate::{AppState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct GoalDetail {
  #[serde(flatten)]
  pub goal:                 CurriculumGoal,
  pub knowledge_components: Vec<KnowledgeComponent>,
  pub prerequisites:        Vec<Prerequisite>,
}

async fn resolve<S: CurriculumGraph>(store: &S, code: &str) -> Result<i64, ApiError> {
  store
    .resolve_goal_code(code.to_owned())
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("goal {code:?} not found")))
}

/// `POST /curriculum/goals`
pub async fn create_goal<S: CurriculumGraph>(
  State(state): State<AppState<S>>,
  Json(body): Json<NewGoal>,
) -> Result<impl IntoResponse, ApiError> {
  let goal = state.store.add_goal(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(goal)))
}

/// `GET /curriculum/goals/{code}`
pub async fn get_goal<S: CurriculumGraph>(
  State(state): State<AppState<S>>,
  Path(code): Path<String>,
) -> Result<Json<GoalDetail>, ApiError> {
  let goal = state
    .store
    .get_goal_by_code(code.clone())
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("goal {code:?} not found")))?;

  let knowledge_components = state
    .store
    .list_knowledge_components(goal.goal_id)
    .await
    .map_err(ApiError::store)?;
  let prerequisites = state
    .store
    .prerequisites(goal.goal_id)
    .await
    .map_err(ApiError::store)?;

  Ok(Json(GoalDetail { goal, knowledge_components, prerequisites }))
}

/// JSON body accepted by `POST /curriculum/goals/{code}/prerequisites`.
#[derive(Debug, Deserialize)]
pub struct PrerequisiteBody {
  pub required_goal_code: String,
  pub kc_code:            String,
}

/// `POST /curriculum/goals/{code}/prerequisites`
pub async fn add_prerequisite<S: CurriculumGraph>(
  State(state): State<AppState<S>>,
  Path(code): Path<String>,
  Json(body): Json<PrerequisiteBody>,
) -> Result<impl IntoResponse, ApiError> {
  let goal_id = resolve(state.store.as_ref(), &code).await?;
  let required_goal_id = resolve(state.store.as_ref(), &body.required_goal_code).await?;

  let prerequisite = state
    .store
    .add_prerequisite(goal_id, required_goal_id, body.kc_code)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(prerequisite)))
}
