//! A store whose goal-level mastery upserts lose a first-insert race a
//! configurable number of times, used to drive the engine's retry path.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde_json::json;
use tutor_core::{
  DeltaArea, ErrorKind, Partial,
  curriculum::{CurriculumGoal, KnowledgeComponent, NewGoal, Prerequisite},
  mastery::{MasteryMap, MasteryRecord, ProgressEntry},
  memory::{MemoryEntry, MemoryPatch, MemoryScope},
  profile::{ProfileDelta, StudentProfile, Traits},
  reconcile::reconcile_value,
  store::{
    Backend, CurriculumGraph, MasteryStore, MemoryStore, ProfileStore,
    StudentDirectory,
  },
  student::{NewStudent, Student},
};
use uuid::Uuid;

use super::*;
use crate::{Error, Result};

struct Contended {
  inner:     SqliteStore,
  conflicts: AtomicUsize,
  attempts:  AtomicUsize,
}

impl Contended {
  fn new(inner: SqliteStore, conflicts: usize) -> Self {
    Self {
      inner,
      conflicts: AtomicUsize::new(conflicts),
      attempts: AtomicUsize::new(0),
    }
  }
}

impl Backend for Contended {
  type Error = Error;
}

impl StudentDirectory for Contended {
  async fn add_student(&self, input: NewStudent) -> Result<Student> {
    self.inner.add_student(input).await
  }

  async fn get_student(&self, id: Uuid) -> Result<Option<Student>> {
    self.inner.get_student(id).await
  }

  async fn list_students(&self) -> Result<Vec<Student>> { self.inner.list_students().await }

  async fn delete_student(&self, id: Uuid) -> Result<bool> {
    self.inner.delete_student(id).await
  }
}

impl CurriculumGraph for Contended {
  async fn add_goal(&self, input: NewGoal) -> Result<CurriculumGoal> {
    self.inner.add_goal(input).await
  }

  async fn get_goal(&self, goal_id: i64) -> Result<Option<CurriculumGoal>> {
    self.inner.get_goal(goal_id).await
  }

  async fn get_goal_by_code(&self, code: String) -> Result<Option<CurriculumGoal>> {
    self.inner.get_goal_by_code(code).await
  }

  async fn resolve_goal_code(&self, code: String) -> Result<Option<i64>> {
    self.inner.resolve_goal_code(code).await
  }

  async fn goal_has_kc(&self, goal_id: i64, kc_code: String) -> Result<bool> {
    self.inner.goal_has_kc(goal_id, kc_code).await
  }

  async fn list_knowledge_components(&self, goal_id: i64) -> Result<Vec<KnowledgeComponent>> {
    self.inner.list_knowledge_components(goal_id).await
  }

  async fn add_prerequisite(
    &self,
    goal_id: i64,
    required_goal_id: i64,
    kc_code: String,
  ) -> Result<Prerequisite> {
    self.inner.add_prerequisite(goal_id, required_goal_id, kc_code).await
  }

  async fn prerequisites(&self, goal_id: i64) -> Result<Vec<Prerequisite>> {
    self.inner.prerequisites(goal_id).await
  }
}

impl MasteryStore for Contended {
  async fn upsert_mastery(
    &self,
    student_id: Uuid,
    goal_id: i64,
    kc_code: Option<String>,
    mastery_percentage: f64,
  ) -> Result<MasteryRecord> {
    self.attempts.fetch_add(1, Ordering::SeqCst);
    let lost = self
      .conflicts
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if lost {
      return Err(tutor_core::Error::Conflict("goal_progress insert raced".into()).into());
    }
    self
      .inner
      .upsert_mastery(student_id, goal_id, kc_code, mastery_percentage)
      .await
  }

  async fn upsert_mastery_batch(
    &self,
    student_id: Uuid,
    goal_id: i64,
    entries: Vec<(String, f64)>,
  ) -> Result<Partial<MasteryRecord>> {
    self.inner.upsert_mastery_batch(student_id, goal_id, entries).await
  }

  async fn list_progress(&self, student_id: Uuid) -> Result<Vec<ProgressEntry>> {
    self.inner.list_progress(student_id).await
  }

  async fn get_incomplete(&self, student_id: Uuid, threshold: f64) -> Result<Vec<ProgressEntry>> {
    self.inner.get_incomplete(student_id, threshold).await
  }

  async fn get_mastery_map(&self, student_id: Uuid) -> Result<MasteryMap> {
    self.inner.get_mastery_map(student_id).await
  }
}

impl ProfileStore for Contended {
  async fn current_profile(&self, student_id: Uuid) -> Result<Option<StudentProfile>> {
    self.inner.current_profile(student_id).await
  }

  async fn add_profile_version(
    &self,
    student_id: Uuid,
    narrative: String,
    traits: Traits,
  ) -> Result<StudentProfile> {
    self.inner.add_profile_version(student_id, narrative, traits).await
  }

  async fn apply_profile_delta(
    &self,
    student_id: Uuid,
    delta: ProfileDelta,
  ) -> Result<Option<StudentProfile>> {
    self.inner.apply_profile_delta(student_id, delta).await
  }

  async fn profile_history(&self, student_id: Uuid) -> Result<Vec<StudentProfile>> {
    self.inner.profile_history(student_id).await
  }
}

impl MemoryStore for Contended {
  async fn set_memory(
    &self,
    student_id: Uuid,
    key: String,
    value: String,
    scope: MemoryScope,
    expires_at: Option<DateTime<Utc>>,
  ) -> Result<MemoryEntry> {
    self.inner.set_memory(student_id, key, value, scope, expires_at).await
  }

  async fn apply_memory_delta(
    &self,
    student_id: Uuid,
    patches: Vec<MemoryPatch>,
  ) -> Result<Partial<MemoryEntry>> {
    self.inner.apply_memory_delta(student_id, patches).await
  }

  async fn get_unexpired_memories(
    &self,
    student_id: Uuid,
    scope: Option<MemoryScope>,
  ) -> Result<Vec<MemoryEntry>> {
    self.inner.get_unexpired_memories(student_id, scope).await
  }

  async fn all_memories(&self, student_id: Uuid) -> Result<Vec<MemoryEntry>> {
    self.inner.all_memories(student_id).await
  }

  async fn purge_expired_memories(&self) -> Result<usize> {
    self.inner.purge_expired_memories().await
  }
}

fn delta() -> serde_json::Value {
  json!({
    "mastery_delta": {
      "goal_patches": [{ "goal_code": "4.NBT.A.1", "mastery_percentage": 80 }]
    },
    "memory_delta": { "personal_fact": { "pet_name": "Rex" } }
  })
}

async fn contended(conflicts: usize) -> (Contended, Uuid) {
  let s = store().await;
  let ada = student(&s, "Ada").await;
  goal(&s, "4.NBT.A.1", &[]).await;
  (Contended::new(s, conflicts), ada)
}

#[tokio::test]
async fn single_conflict_is_retried() {
  let (s, ada) = contended(1).await;

  let report = reconcile_value(&s, ada, &delta()).await.unwrap();

  assert!(report.is_clean(), "{:?}", report.errors);
  assert_eq!(report.updated_goals.len(), 1);
  assert_eq!(s.attempts.load(Ordering::SeqCst), 2);
  assert_eq!(s.list_progress(ada).await.unwrap()[0].mastery_percentage, 80.0);
}

#[tokio::test]
async fn persistent_conflict_is_reported_per_item() {
  let (s, ada) = contended(usize::MAX).await;

  let report = reconcile_value(&s, ada, &delta()).await.unwrap();

  assert!(report.updated_goals.is_empty());
  assert_eq!(report.updated_memories.len(), 1);
  assert_eq!(report.errors.len(), 1);
  assert_eq!(report.errors[0].item, "4.NBT.A.1");
  assert_eq!(report.errors[0].kind, ErrorKind::Conflict);
  assert_eq!(report.errors[0].area, DeltaArea::Mastery);
  assert_eq!(s.attempts.load(Ordering::SeqCst), 2);
  assert!(s.list_progress(ada).await.unwrap().is_empty());
}
