use std::sync::Mutex;

use chrono::Utc;
use serde_json::{Value, json};
use tutor_core::{
  context::{ContextLimits, StudentContext},
  pipeline::{PipelineError, SessionAnalyzer, process_session},
  session::NewSession,
  store::{MemoryStore, ProfileStore, SessionStore},
};
use uuid::Uuid;

use super::*;

#[derive(Debug, thiserror::Error)]
#[error("analyzer offline")]
struct Offline;

/// Returns a canned analysis and remembers how many prior sessions it saw.
struct Canned {
  analysis:     Value,
  seen_history: Mutex<Vec<usize>>,
}

impl Canned {
  fn new(analysis: Value) -> Self { Self { analysis, seen_history: Mutex::new(Vec::new()) } }
}

impl SessionAnalyzer for Canned {
  type Error = Offline;

  async fn analyze<'a>(
    &'a self,
    _transcript: &'a str,
    context: &'a StudentContext,
  ) -> Result<Value, Offline> {
    self.seen_history.lock().unwrap().push(context.recent_sessions.len());
    Ok(self.analysis.clone())
  }
}

struct Failing;

impl SessionAnalyzer for Failing {
  type Error = Offline;

  async fn analyze<'a>(
    &'a self,
    _transcript: &'a str,
    _context: &'a StudentContext,
  ) -> Result<Value, Offline> {
    Err(Offline)
  }
}

fn call(student_id: Uuid, call_id: &str) -> NewSession {
  NewSession {
    student_id,
    call_id: Some(call_id.into()),
    started_at: Utc::now(),
    duration_seconds: Some(300),
    transcript: "We talked about Rex.".into(),
    summary: None,
  }
}

#[tokio::test]
async fn processing_records_and_reconciles() {
  let s = store().await;
  let ada = student(&s, "Ada").await;
  let analyzer = Canned::new(json!({
    "memory_delta": { "personal_fact": { "pet_name": "Rex" } },
    "profile_delta": { "narrative_changes": "Talks about pets." }
  }));

  let processed = process_session(&s, &analyzer, call(ada, "c-1"), ContextLimits::default())
    .await
    .unwrap();
  assert!(processed.report.profile_updated);
  assert_eq!(processed.report.updated_memories.len(), 1);
  assert!(s.get_session(processed.session.session_id).await.unwrap().is_some());

  // Retrying the same call neither duplicates the session nor the profile.
  let retried = process_session(&s, &analyzer, call(ada, "c-1"), ContextLimits::default())
    .await
    .unwrap();
  assert_eq!(retried.session.session_id, processed.session.session_id);
  assert!(!retried.report.profile_updated);
  assert_eq!(s.recent_sessions(ada, 10).await.unwrap().len(), 1);
  assert_eq!(s.profile_history(ada).await.unwrap().len(), 1);
  assert_eq!(s.all_memories(ada).await.unwrap().len(), 1);

  // The session being analyzed is never part of its own history.
  process_session(&s, &analyzer, call(ada, "c-2"), ContextLimits::default())
    .await
    .unwrap();
  assert_eq!(*analyzer.seen_history.lock().unwrap(), [0, 0, 1]);
}

#[tokio::test]
async fn analyzer_failure_keeps_the_session() {
  let s = store().await;
  let ada = student(&s, "Ada").await;

  let err = process_session(&s, &Failing, call(ada, "c-1"), ContextLimits::default())
    .await
    .unwrap_err();
  assert!(matches!(err, PipelineError::Analyzer(Offline)));
  assert_eq!(s.recent_sessions(ada, 10).await.unwrap().len(), 1);
  assert!(s.current_profile(ada).await.unwrap().is_none());
}
