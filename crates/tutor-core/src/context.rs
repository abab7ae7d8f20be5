//! Context assembly: the read-side view of everything accumulated about a
//! student, capped for use as a language-model prompt.

use std::{collections::BTreeMap, fmt::Write as _};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  mastery::{MAX_MASTERY, ProgressEntry},
  memory::{MemoryEntry, MemoryScope},
  profile::StudentProfile,
  session::SessionSummary,
  store::{MasteryStore, MemoryStore, ProfileStore, SessionStore, StudentDirectory},
  student::Student,
};

fn default_max_goals() -> usize { 10 }
fn default_max_kcs() -> usize { 15 }
fn default_max_sessions() -> usize { 3 }

/// Hard caps on the list sections of a [`StudentContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLimits {
  #[serde(default = "default_max_goals")]
  pub max_incomplete_goals: usize,
  #[serde(default = "default_max_kcs")]
  pub max_incomplete_kcs:   usize,
  #[serde(default = "default_max_sessions")]
  pub max_recent_sessions:  usize,
}

impl Default for ContextLimits {
  fn default() -> Self {
    Self {
      max_incomplete_goals: default_max_goals(),
      max_incomplete_kcs:   default_max_kcs(),
      max_recent_sessions:  default_max_sessions(),
    }
  }
}

/// The weakest incomplete goals and KCs, each list truncated to its cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryContext {
  pub incomplete_goals:       Vec<ProgressEntry>,
  pub incomplete_kcs:         Vec<ProgressEntry>,
  /// Counts before truncation.
  pub total_incomplete_goals: usize,
  pub total_incomplete_kcs:   usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentContext {
  pub basic_info:        Student,
  pub current_profile:   Option<StudentProfile>,
  pub memories_by_scope: BTreeMap<MemoryScope, Vec<MemoryEntry>>,
  pub mastery_context:   MasteryContext,
  /// Newest first.
  pub recent_sessions:   Vec<SessionSummary>,
  pub assembled_at:      DateTime<Utc>,
}

/// Build the context for `student_id`. Fails with a not-found error if the
/// student does not exist.
pub async fn assemble_context<S>(
  store: &S,
  student_id: Uuid,
  limits: ContextLimits,
) -> Result<StudentContext, S::Error>
where
  S: StudentDirectory + ProfileStore + MemoryStore + MasteryStore + SessionStore,
{
  let basic_info = store
    .get_student(student_id)
    .await?
    .ok_or(Error::StudentNotFound(student_id))?;

  let current_profile = store.current_profile(student_id).await?;

  let mut memories_by_scope: BTreeMap<MemoryScope, Vec<MemoryEntry>> =
    BTreeMap::new();
  for entry in store.get_unexpired_memories(student_id, None).await? {
    memories_by_scope.entry(entry.scope).or_default().push(entry);
  }

  // Already weakest first; splitting preserves the order.
  let (goals, kcs): (Vec<_>, Vec<_>) = store
    .get_incomplete(student_id, MAX_MASTERY)
    .await?
    .into_iter()
    .partition(ProgressEntry::is_goal);

  let mastery_context = MasteryContext {
    total_incomplete_goals: goals.len(),
    total_incomplete_kcs:   kcs.len(),
    incomplete_goals:       goals.into_iter().take(limits.max_incomplete_goals).collect(),
    incomplete_kcs:         kcs.into_iter().take(limits.max_incomplete_kcs).collect(),
  };

  let recent_sessions = store
    .recent_sessions(student_id, limits.max_recent_sessions)
    .await?
    .iter()
    .map(SessionSummary::from)
    .collect();

  Ok(StudentContext {
    basic_info,
    current_profile,
    memories_by_scope,
    mastery_context,
    recent_sessions,
    assembled_at: Utc::now(),
  })
}

impl StudentContext {
  /// Render as a compact Markdown briefing for the next tutoring prompt.
  pub fn render_prompt(&self) -> String {
    let mut out = String::new();
    let info = &self.basic_info;

    let _ = writeln!(out, "# Student: {}", info.display_name);
    if let Some(grade) = &info.grade_level {
      let _ = writeln!(out, "Grade: {grade}");
    }

    if let Some(profile) = &self.current_profile {
      out.push_str("\n## Profile\n");
      if !profile.narrative.is_empty() {
        let _ = writeln!(out, "{}", profile.narrative);
      }
      for (key, value) in &profile.traits {
        let _ = writeln!(out, "- {key}: {value}");
      }
    }

    if !self.memories_by_scope.is_empty() {
      out.push_str("\n## Memories\n");
      for (scope, entries) in &self.memories_by_scope {
        let _ = writeln!(out, "### {scope}");
        for entry in entries {
          let _ = writeln!(out, "- {}: {}", entry.key, entry.value);
        }
      }
    }

    let mastery = &self.mastery_context;
    if !mastery.incomplete_goals.is_empty() || !mastery.incomplete_kcs.is_empty() {
      out.push_str("\n## Focus areas (weakest first)\n");
      for goal in &mastery.incomplete_goals {
        let _ = writeln!(
          out,
          "- {} {}: {:.0}%",
          goal.goal_code, goal.goal_title, goal.mastery_percentage
        );
      }
      for kc in &mastery.incomplete_kcs {
        let _ = writeln!(
          out,
          "- {}/{}: {:.0}%",
          kc.goal_code,
          kc.kc_code.as_deref().unwrap_or_default(),
          kc.mastery_percentage
        );
      }
    }

    if !self.recent_sessions.is_empty() {
      out.push_str("\n## Recent sessions\n");
      for session in &self.recent_sessions {
        let _ = writeln!(
          out,
          "- {}: {}",
          session.started_at.format("%Y-%m-%d"),
          session.summary.as_deref().unwrap_or("(no summary)")
        );
      }
    }

    out
  }
}
