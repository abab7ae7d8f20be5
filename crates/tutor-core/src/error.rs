//! Error types for `tutor-core`.
//!
//! Every failure is classified by an [`ErrorKind`]. Item-level failures
//! (validation, missing references) are collected into [`ItemError`]s and
//! reported alongside whatever did apply; only transport failures propagate.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("student not found: {0}")]
  StudentNotFound(Uuid),

  #[error("goal not found: {0}")]
  GoalNotFound(String),

  #[error("knowledge component {kc_code:?} not found in goal {goal_id}")]
  KnowledgeComponentNotFound { goal_id: i64, kc_code: String },

  #[error("mastery percentage {0} outside [0.0, 100.0]")]
  MasteryOutOfRange(f64),

  #[error("unknown memory scope: {0:?}")]
  UnknownScope(String),

  #[error("invalid {field}: {reason}")]
  Invalid { field: String, reason: String },

  #[error("goal code {0:?} already exists")]
  DuplicateGoalCode(String),

  #[error("prerequisite from goal {goal_id} to goal {required_goal_id} would create a cycle")]
  PrerequisiteCycle { goal_id: i64, required_goal_id: i64 },

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse classification shared by every error type in the workspace.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// Malformed input value; the offending item is skipped.
  Validation,
  /// Reference to a goal, KC or student that does not exist.
  NotFound,
  /// A uniqueness constraint raced. Retried once, then reported per item.
  Conflict,
  /// Anything else: storage transport, corrupt rows. Propagates.
  Internal,
}

impl ErrorKind {
  /// Whether an error of this kind may be skipped and reported per item.
  /// Only [`ErrorKind::Internal`] aborts a batch.
  pub fn is_reportable(self) -> bool { !matches!(self, Self::Internal) }
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::MasteryOutOfRange(_)
      | Self::UnknownScope(_)
      | Self::Invalid { .. }
      | Self::PrerequisiteCycle { .. } => ErrorKind::Validation,
      Self::StudentNotFound(_)
      | Self::GoalNotFound(_)
      | Self::KnowledgeComponentNotFound { .. } => ErrorKind::NotFound,
      Self::DuplicateGoalCode(_) | Self::Conflict(_) => ErrorKind::Conflict,
      Self::Serialization(_) => ErrorKind::Internal,
    }
  }

  pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::Invalid { field: field.into(), reason: reason.into() }
  }
}

/// Implemented by storage backend error types so generic code can decide
/// whether to skip, retry or propagate.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn kind(&self) -> ErrorKind;
}

impl StoreError for Error {
  fn kind(&self) -> ErrorKind { Error::kind(self) }
}

// ─── Per-item failures ───────────────────────────────────────────────────────

/// Which part of a session delta an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaArea {
  /// The analysis output as a whole, e.g. unparseable text.
  Delta,
  Mastery,
  Memory,
  Profile,
}

/// A single skipped item, reported back to the caller instead of thrown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
  pub area:    DeltaArea,
  /// Human-readable identifier of the item, e.g. `"4.NBT.A.1"` or
  /// `"game_state/level"`.
  pub item:    String,
  pub kind:    ErrorKind,
  pub message: String,
}

impl ItemError {
  pub fn new(
    area: DeltaArea,
    item: impl Into<String>,
    kind: ErrorKind,
    message: impl Into<String>,
  ) -> Self {
    Self { area, item: item.into(), kind, message: message.into() }
  }

  /// Build from any classified error, keeping its display text.
  pub fn from_error<E: StoreError>(
    area: DeltaArea,
    item: impl Into<String>,
    err: &E,
  ) -> Self {
    Self::new(area, item, err.kind(), err.to_string())
  }
}

/// Outcome of a best-effort batch: everything that applied plus everything
/// that was skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partial<T> {
  pub applied: Vec<T>,
  pub errors:  Vec<ItemError>,
}

impl<T> Default for Partial<T> {
  fn default() -> Self { Self { applied: Vec::new(), errors: Vec::new() } }
}

impl<T> Partial<T> {
  pub fn is_clean(&self) -> bool { self.errors.is_empty() }
}
