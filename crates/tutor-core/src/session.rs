//! Session records: the immutable log of one tutoring interaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
  pub session_id:       Uuid,
  pub student_id:       Uuid,
  /// Identifier assigned by the upstream call provider. Unique; a duplicate
  /// delivery resolves to the already-recorded session.
  pub call_id:          Option<String>,
  pub started_at:       DateTime<Utc>,
  pub duration_seconds: Option<u32>,
  pub transcript:       String,
  pub summary:          Option<String>,
  pub recorded_at:      DateTime<Utc>,
}

/// Input to [`crate::store::SessionStore::record_session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
  pub student_id:       Uuid,
  #[serde(default)]
  pub call_id:          Option<String>,
  pub started_at:       DateTime<Utc>,
  #[serde(default)]
  pub duration_seconds: Option<u32>,
  pub transcript:       String,
  #[serde(default)]
  pub summary:          Option<String>,
}

/// The transcript-free view used in assembled context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
  pub session_id:       Uuid,
  pub started_at:       DateTime<Utc>,
  pub duration_seconds: Option<u32>,
  pub summary:          Option<String>,
}

impl From<&SessionRecord> for SessionSummary {
  fn from(r: &SessionRecord) -> Self {
    Self {
      session_id:       r.session_id,
      started_at:       r.started_at,
      duration_seconds: r.duration_seconds,
      summary:          r.summary.clone(),
    }
  }
}
