//! JSON REST API for the tutoring student model.
//!
//! Exposes an axum [`Router`] backed by any [`tutor_core::store::TutorStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tutor_api::api_router(store.clone(), ContextLimits::default()))
//! ```

pub mod context;
pub mod curriculum;
pub mod error;
pub mod maintenance;
pub mod mastery;
pub mod memories;
pub mod profile;
pub mod sessions;
pub mod students;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use tutor_core::{context::ContextLimits, store::TutorStore};

pub use error::ApiError;

/// Shared handler state.
pub struct AppState<S> {
  pub store:  Arc<S>,
  pub limits: ContextLimits,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), limits: self.limits }
  }
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, limits: ContextLimits) -> Router<()>
where
  S: TutorStore + 'static,
{
  Router::new()
    // Students
    .route("/students", get(students::list::<S>).post(students::create::<S>))
    .route(
      "/students/{id}",
      get(students::get_one::<S>).delete(students::delete_one::<S>),
    )
    // Context and reconciliation
    .route("/students/{id}/context", get(context::assemble::<S>))
    .route("/students/{id}/reconcile", post(context::reconcile::<S>))
    // Mastery
    .route(
      "/students/{id}/mastery",
      get(mastery::map::<S>).put(mastery::upsert::<S>),
    )
    .route("/students/{id}/mastery/incomplete", get(mastery::incomplete::<S>))
    // Profile
    .route("/students/{id}/profile", get(profile::current::<S>))
    .route("/students/{id}/profile/history", get(profile::history::<S>))
    // Memories
    .route("/students/{id}/memories", get(memories::list::<S>))
    .route("/students/{id}/memories/{key}", put(memories::put_one::<S>))
    // Sessions
    .route(
      "/students/{id}/sessions",
      get(sessions::list::<S>).post(sessions::create::<S>),
    )
    .route("/sessions/{id}", get(sessions::get_one::<S>))
    // Curriculum
    .route("/curriculum/goals", post(curriculum::create_goal::<S>))
    .route("/curriculum/goals/{code}", get(curriculum::get_goal::<S>))
    .route(
      "/curriculum/goals/{code}/prerequisites",
      post(curriculum::add_prerequisite::<S>),
    )
    // Maintenance
    .route("/maintenance/sweep-memories", post(maintenance::sweep_memories::<S>))
    .with_state(AppState { store, limits })
}

#[cfg(test)]
mod tests;
