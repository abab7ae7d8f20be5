use chrono::Utc;
use tutor_core::{
  ErrorKind,
  error::StoreError as _,
  memory::MemoryScope,
  profile::ProfileDelta,
  session::NewSession,
  store::{MasteryStore, MemoryStore, ProfileStore, SessionStore, StudentDirectory},
  student::NewStudent,
};
use uuid::Uuid;

use super::*;

#[tokio::test]
async fn add_and_get_student() {
  let s = store().await;

  let mut input = NewStudent::new("  Ada  ");
  input.grade_level = Some("4".into());
  let added = s.add_student(input).await.unwrap();
  assert_eq!(added.display_name, "Ada");

  let fetched = s.get_student(added.student_id).await.unwrap().unwrap();
  assert_eq!(fetched, added);
}

#[tokio::test]
async fn get_student_missing_returns_none() {
  let s = store().await;
  assert!(s.get_student(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn blank_name_is_rejected() {
  let s = store().await;
  let err = s.add_student(NewStudent::new("   ")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
  assert!(s.list_students().await.unwrap().is_empty());
}

#[tokio::test]
async fn list_students_all() {
  let s = store().await;
  student(&s, "Ada").await;
  student(&s, "Grace").await;
  assert_eq!(s.list_students().await.unwrap().len(), 2);
}

#[tokio::test]
async fn delete_student_erases_everything_they_own() {
  let s = store().await;
  let ada = student(&s, "Ada").await;
  let grace = student(&s, "Grace").await;
  let g = goal(&s, "4.NBT.A.1", &["pv"]).await;

  for id in [ada, grace] {
    s.upsert_mastery(id, g, None, 40.0).await.unwrap();
    s.upsert_mastery(id, g, Some("pv".into()), 30.0).await.unwrap();
    s.set_memory(id, "pet_name".into(), "Rex".into(), MemoryScope::PersonalFact, None)
      .await
      .unwrap();
    s.apply_profile_delta(id, ProfileDelta {
      narrative: Some("Curious.".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  }
  let session = s
    .record_session(NewSession {
      student_id:       ada,
      call_id:          None,
      started_at:       Utc::now(),
      duration_seconds: None,
      transcript:       "hello".into(),
      summary:          None,
    })
    .await
    .unwrap();

  assert!(s.delete_student(ada).await.unwrap());

  assert!(s.get_student(ada).await.unwrap().is_none());
  assert!(s.list_progress(ada).await.unwrap().is_empty());
  assert!(s.all_memories(ada).await.unwrap().is_empty());
  assert!(s.profile_history(ada).await.unwrap().is_empty());
  assert!(s.get_session(session.session_id).await.unwrap().is_none());

  // The other student is untouched.
  assert_eq!(s.list_progress(grace).await.unwrap().len(), 2);
  assert_eq!(s.all_memories(grace).await.unwrap().len(), 1);
  assert_eq!(
    s.current_profile(grace).await.unwrap().unwrap().narrative,
    "Curious."
  );

  // Curriculum is shared, not owned.
  assert!(s.get_goal(g).await.unwrap().is_some());

  assert!(!s.delete_student(ada).await.unwrap());
}
