use tutor_core::{
  Error as CoreError, ErrorKind, curriculum::NewGoal, error::StoreError as _,
  store::CurriculumGraph,
};

use super::*;
use crate::Error;

#[tokio::test]
async fn add_goal_with_knowledge_components() {
  let s = store().await;

  let mut input = NewGoal::new(" 4.NBT.A.1 ", "Place value", "math", "4")
    .with_kc("pv", "Digit values")
    .with_kc("compare", "Compare multi-digit numbers");
  input.recommended_hours_per_week = Some(1.5);
  let added = s.add_goal(input).await.unwrap();
  assert_eq!(added.code, "4.NBT.A.1");

  let fetched = s.get_goal(added.goal_id).await.unwrap().unwrap();
  assert_eq!(fetched, added);

  let kcs = s.list_knowledge_components(added.goal_id).await.unwrap();
  let codes: Vec<_> = kcs.iter().map(|k| k.kc_code.as_str()).collect();
  assert_eq!(codes, ["compare", "pv"]);

  assert!(s.goal_has_kc(added.goal_id, "pv".into()).await.unwrap());
  assert!(!s.goal_has_kc(added.goal_id, "nope".into()).await.unwrap());
}

#[tokio::test]
async fn goal_codes_resolve_trimmed_and_case_insensitively() {
  let s = store().await;
  let id = goal(&s, "4.NBT.A.1", &[]).await;

  assert_eq!(s.resolve_goal_code("  4.nbt.a.1 ".into()).await.unwrap(), Some(id));
  assert_eq!(
    s.get_goal_by_code("4.Nbt.A.1".into()).await.unwrap().map(|g| g.goal_id),
    Some(id)
  );
  assert_eq!(s.resolve_goal_code("BOGUS.CODE".into()).await.unwrap(), None);
}

#[tokio::test]
async fn duplicate_goal_code_conflicts() {
  let s = store().await;
  goal(&s, "4.NBT.A.1", &[]).await;

  let err = s
    .add_goal(NewGoal::new("4.nbt.a.1", "Again", "math", "4"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert!(matches!(err, Error::Core(CoreError::DuplicateGoalCode(_))));
}

#[tokio::test]
async fn repeated_kc_code_in_one_goal_is_rejected() {
  let s = store().await;
  let err = s
    .add_goal(NewGoal::new("X", "X", "math", "4").with_kc("a", "").with_kc(" a ", ""))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
  assert!(s.resolve_goal_code("X".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn prerequisites_are_recorded_per_kc() {
  let s = store().await;
  let base = goal(&s, "3.NBT.A.1", &["round", "add"]).await;
  let next = goal(&s, "4.NBT.A.1", &[]).await;

  s.add_prerequisite(next, base, "round".into()).await.unwrap();
  s.add_prerequisite(next, base, "add".into()).await.unwrap();
  // Re-adding the same edge is harmless.
  s.add_prerequisite(next, base, "add".into()).await.unwrap();

  let prereqs = s.prerequisites(next).await.unwrap();
  assert_eq!(prereqs.len(), 2);
  assert!(prereqs.iter().all(|p| p.required_goal_id == base));
  assert!(s.prerequisites(base).await.unwrap().is_empty());
}

#[tokio::test]
async fn prerequisite_cycles_are_rejected() {
  let s = store().await;
  let a = goal(&s, "A", &["a1"]).await;
  let b = goal(&s, "B", &["b1"]).await;
  let c = goal(&s, "C", &["c1"]).await;

  s.add_prerequisite(b, a, "a1".into()).await.unwrap();
  s.add_prerequisite(c, b, "b1".into()).await.unwrap();

  let err = s.add_prerequisite(a, c, "c1".into()).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::PrerequisiteCycle { .. })));
  assert_eq!(err.kind(), ErrorKind::Validation);

  let err = s.add_prerequisite(a, a, "a1".into()).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::PrerequisiteCycle { .. })));

  assert!(s.prerequisites(a).await.unwrap().is_empty());
}

#[tokio::test]
async fn prerequisite_on_unknown_kc_is_not_found() {
  let s = store().await;
  let a = goal(&s, "A", &["a1"]).await;
  let b = goal(&s, "B", &[]).await;

  let err = s.add_prerequisite(b, a, "zz".into()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);

  let err = s.add_prerequisite(b, 999, "a1".into()).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::GoalNotFound(_))));
}
