//! Storage traits.
//!
//! Backends (e.g. `tutor-store-sqlite`) implement these; the reconciliation
//! engine, the context assembler and the HTTP layer depend only on the
//! traits. Every write is a single-row upsert, append or delete that the
//! backend executes atomically, so callers can run concurrently without
//! external locking.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Partial,
  curriculum::{CurriculumGoal, KnowledgeComponent, NewGoal, Prerequisite},
  error::StoreError,
  mastery::{MasteryMap, MasteryRecord, ProgressEntry},
  memory::{MemoryEntry, MemoryPatch, MemoryScope},
  profile::{ProfileDelta, StudentProfile, Traits},
  session::{NewSession, SessionRecord},
  student::{NewStudent, Student},
};

/// Shared by every storage trait so generic code sees a single error type.
pub trait Backend: Send + Sync {
  type Error: StoreError + From<crate::Error>;
}

// ─── Students ────────────────────────────────────────────────────────────────

pub trait StudentDirectory: Backend {
  fn add_student(
    &self,
    input: NewStudent,
  ) -> impl Future<Output = Result<Student, Self::Error>> + Send + '_;

  /// Returns `None` if not found.
  fn get_student(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  fn list_students(
    &self,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + '_;

  /// Erase a student and everything they own. Returns `false` if the student
  /// did not exist.
  fn delete_student(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Curriculum ──────────────────────────────────────────────────────────────

pub trait CurriculumGraph: Backend {
  /// Insert a goal with its knowledge components. A duplicate code fails
  /// with [`crate::Error::DuplicateGoalCode`].
  fn add_goal(
    &self,
    input: NewGoal,
  ) -> impl Future<Output = Result<CurriculumGoal, Self::Error>> + Send + '_;

  fn get_goal(
    &self,
    goal_id: i64,
  ) -> impl Future<Output = Result<Option<CurriculumGoal>, Self::Error>> + Send + '_;

  /// Look up a goal by its external code (trimmed, case-insensitive).
  fn get_goal_by_code(
    &self,
    code: String,
  ) -> impl Future<Output = Result<Option<CurriculumGoal>, Self::Error>> + Send + '_;

  /// Map an external goal code to the internal goal id.
  fn resolve_goal_code(
    &self,
    code: String,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + '_;

  fn goal_has_kc(
    &self,
    goal_id: i64,
    kc_code: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn list_knowledge_components(
    &self,
    goal_id: i64,
  ) -> impl Future<Output = Result<Vec<KnowledgeComponent>, Self::Error>> + Send + '_;

  /// Record that `goal_id` requires `kc_code` of `required_goal_id`.
  ///
  /// Fails with [`crate::Error::PrerequisiteCycle`] if the edge would make
  /// the goal graph cyclic.
  fn add_prerequisite(
    &self,
    goal_id: i64,
    required_goal_id: i64,
    kc_code: String,
  ) -> impl Future<Output = Result<Prerequisite, Self::Error>> + Send + '_;

  fn prerequisites(
    &self,
    goal_id: i64,
  ) -> impl Future<Output = Result<Vec<Prerequisite>, Self::Error>> + Send + '_;
}

// ─── Mastery ─────────────────────────────────────────────────────────────────

pub trait MasteryStore: Backend {
  /// Insert or update the progress row for `(student, goal)` or, when
  /// `kc_code` is given, `(student, goal, kc_code)`.
  ///
  /// Fails with a validation error if the percentage is outside
  /// `[0.0, 100.0]` (the prior value is untouched) and with a not-found
  /// error if the KC is not defined for the goal.
  fn upsert_mastery(
    &self,
    student_id: Uuid,
    goal_id: i64,
    kc_code: Option<String>,
    mastery_percentage: f64,
  ) -> impl Future<Output = Result<MasteryRecord, Self::Error>> + Send + '_;

  /// Best-effort batch of KC upserts for one goal. Invalid entries are
  /// skipped and reported, labelled by KC code; valid entries still commit.
  fn upsert_mastery_batch(
    &self,
    student_id: Uuid,
    goal_id: i64,
    entries: Vec<(String, f64)>,
  ) -> impl Future<Output = Result<Partial<MasteryRecord>, Self::Error>> + Send + '_;

  /// Every tracked goal and KC row, unordered.
  fn list_progress(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ProgressEntry>, Self::Error>> + Send + '_;

  /// Rows with mastery strictly below `threshold`, weakest first (see
  /// [`crate::mastery::weakest_first`]).
  fn get_incomplete(
    &self,
    student_id: Uuid,
    threshold: f64,
  ) -> impl Future<Output = Result<Vec<ProgressEntry>, Self::Error>> + Send + '_;

  fn get_mastery_map(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<MasteryMap, Self::Error>> + Send + '_;
}

// ─── Profiles ────────────────────────────────────────────────────────────────

pub trait ProfileStore: Backend {
  /// The snapshot with the greatest `as_of`, or `None` if never profiled.
  fn current_profile(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Option<StudentProfile>, Self::Error>> + Send + '_;

  /// Unconditionally append a snapshot.
  fn add_profile_version(
    &self,
    student_id: Uuid,
    narrative: String,
    traits: Traits,
  ) -> impl Future<Output = Result<StudentProfile, Self::Error>> + Send + '_;

  /// Merge `delta` into the current snapshot and append the result. Returns
  /// `None` without writing if nothing would change. The read and the append
  /// happen atomically for the student.
  fn apply_profile_delta(
    &self,
    student_id: Uuid,
    delta: ProfileDelta,
  ) -> impl Future<Output = Result<Option<StudentProfile>, Self::Error>> + Send + '_;

  /// All snapshots, oldest first.
  fn profile_history(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Vec<StudentProfile>, Self::Error>> + Send + '_;
}

// ─── Memories ────────────────────────────────────────────────────────────────

pub trait MemoryStore: Backend {
  /// Upsert by `(student, key)`. Not versioned.
  fn set_memory(
    &self,
    student_id: Uuid,
    key: String,
    value: String,
    scope: MemoryScope,
    expires_at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<MemoryEntry, Self::Error>> + Send + '_;

  /// Apply delta patches using the backend's expiry policy. Unknown scopes
  /// are skipped and reported, labelled `scope/key`.
  fn apply_memory_delta(
    &self,
    student_id: Uuid,
    patches: Vec<MemoryPatch>,
  ) -> impl Future<Output = Result<Partial<MemoryEntry>, Self::Error>> + Send + '_;

  /// Entries not yet expired at query time, optionally for one scope.
  fn get_unexpired_memories(
    &self,
    student_id: Uuid,
    scope: Option<MemoryScope>,
  ) -> impl Future<Output = Result<Vec<MemoryEntry>, Self::Error>> + Send + '_;

  /// Every stored entry, expired or not.
  fn all_memories(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Vec<MemoryEntry>, Self::Error>> + Send + '_;

  /// Physically delete expired entries for all students. Returns the count.
  fn purge_expired_memories(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}

// ─── Sessions ────────────────────────────────────────────────────────────────

pub trait SessionStore: Backend {
  /// Append a session. If `call_id` is already recorded the existing record
  /// is returned instead.
  fn record_session(
    &self,
    input: NewSession,
  ) -> impl Future<Output = Result<SessionRecord, Self::Error>> + Send + '_;

  fn get_session(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Option<SessionRecord>, Self::Error>> + Send + '_;

  /// Newest first.
  fn recent_sessions(
    &self,
    student_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<SessionRecord>, Self::Error>> + Send + '_;
}

// ─── Everything ──────────────────────────────────────────────────────────────

/// A backend that implements every storage trait.
pub trait TutorStore:
  StudentDirectory
  + CurriculumGraph
  + MasteryStore
  + ProfileStore
  + MemoryStore
  + SessionStore
{
}

impl<T> TutorStore for T where
  T: StudentDirectory
    + CurriculumGraph
    + MasteryStore
    + ProfileStore
    + MemoryStore
    + SessionStore
{
}
