//! Session processing: record a finished session, ask an analyzer about it,
//! and reconcile the answer.
//!
//! The analyzer is a capability handed in by the caller (typically an LLM
//! client). Retry and backoff for the analyzer belong to the caller; this
//! module never retries network work.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
  context::{ContextLimits, StudentContext, assemble_context},
  reconcile::{ReconciliationReport, reconcile_value},
  session::{NewSession, SessionRecord},
  store::TutorStore,
};

/// Produces an unstructured session analysis from a transcript and the
/// student's accumulated context.
pub trait SessionAnalyzer: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Returns the analysis as JSON, or as a JSON string holding raw model
  /// text.
  fn analyze<'a>(
    &'a self,
    transcript: &'a str,
    context: &'a StudentContext,
  ) -> impl Future<Output = Result<Value, Self::Error>> + Send + 'a;
}

#[derive(Debug, Error)]
pub enum PipelineError<S, A> {
  #[error("store error: {0}")]
  Store(S),

  /// The session is recorded; only the analysis failed.
  #[error("analyzer error: {0}")]
  Analyzer(A),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSession {
  pub session: SessionRecord,
  pub report:  ReconciliationReport,
}

/// Record `input`, assemble context (excluding the session itself), analyze,
/// and reconcile. Safe to call again with the same `call_id`: the session is
/// not duplicated and reconciliation is idempotent.
pub async fn process_session<S, A>(
  store: &S,
  analyzer: &A,
  input: NewSession,
  limits: ContextLimits,
) -> Result<ProcessedSession, PipelineError<S::Error, A::Error>>
where
  S: TutorStore,
  A: SessionAnalyzer,
{
  let student_id = input.student_id;
  let session = store.record_session(input).await.map_err(PipelineError::Store)?;

  let mut context = assemble_context(store, student_id, limits)
    .await
    .map_err(PipelineError::Store)?;
  context.recent_sessions.retain(|s| s.session_id != session.session_id);

  let analysis = analyzer
    .analyze(&session.transcript, &context)
    .await
    .map_err(|e| {
      tracing::error!(session_id = %session.session_id, error = %e, "session analysis failed");
      PipelineError::Analyzer(e)
    })?;

  let report = reconcile_value(store, student_id, &analysis)
    .await
    .map_err(PipelineError::Store)?;

  tracing::info!(
    session_id = %session.session_id,
    %student_id,
    skipped = report.errors.len(),
    "processed session"
  );

  Ok(ProcessedSession { session, report })
}
