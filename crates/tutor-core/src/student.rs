//! Student: the owner of every per-student record.
//!
//! Deleting a student erases all of their progress, profiles, memories and
//! sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
  pub student_id:   Uuid,
  pub display_name: String,
  /// Free-form grade label, e.g. `"4"` or `"K"`.
  pub grade_level:  Option<String>,
  pub phone_number: Option<String>,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::StudentDirectory::add_student`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStudent {
  pub display_name: String,
  #[serde(default)]
  pub grade_level:  Option<String>,
  #[serde(default)]
  pub phone_number: Option<String>,
}

impl NewStudent {
  pub fn new(display_name: impl Into<String>) -> Self {
    Self { display_name: display_name.into(), grade_level: None, phone_number: None }
  }
}
