use chrono::{Duration, Utc};
use serde_json::json;
use tutor_core::{
  ErrorKind,
  error::StoreError as _,
  memory::{MemoryPatch, MemoryPolicy, MemoryScope},
  store::MemoryStore,
};

use super::*;

#[tokio::test]
async fn set_memory_upserts_by_key() {
  let s = store().await;
  let ada = student(&s, "Ada").await;

  s.set_memory(ada, "pet_name".into(), "Rex".into(), MemoryScope::PersonalFact, None)
    .await
    .unwrap();
  s.set_memory(ada, "pet_name".into(), "Max".into(), MemoryScope::PersonalFact, None)
    .await
    .unwrap();

  let all = s.all_memories(ada).await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(all[0].value, "Max");
}

#[tokio::test]
async fn expired_memories_are_hidden_until_purged() {
  let s = store().await;
  let ada = student(&s, "Ada").await;
  let now = Utc::now();

  s.set_memory(
    ada,
    "level".into(),
    "3".into(),
    MemoryScope::GameState,
    Some(now - Duration::minutes(1)),
  )
  .await
  .unwrap();
  s.set_memory(
    ada,
    "board".into(),
    "x..".into(),
    MemoryScope::GameState,
    Some(now + Duration::days(1)),
  )
  .await
  .unwrap();

  let visible = s.get_unexpired_memories(ada, None).await.unwrap();
  let keys: Vec<_> = visible.iter().map(|m| m.key.as_str()).collect();
  assert_eq!(keys, ["board"]);

  // Still stored until swept.
  assert_eq!(s.all_memories(ada).await.unwrap().len(), 2);

  assert_eq!(s.purge_expired_memories().await.unwrap(), 1);
  assert_eq!(s.all_memories(ada).await.unwrap().len(), 1);
  assert_eq!(s.purge_expired_memories().await.unwrap(), 0);
}

#[tokio::test]
async fn scope_filter_limits_results() {
  let s = store().await;
  let ada = student(&s, "Ada").await;

  s.set_memory(ada, "pet".into(), "Rex".into(), MemoryScope::PersonalFact, None)
    .await
    .unwrap();
  s.set_memory(ada, "opening".into(), "e4".into(), MemoryScope::StrategyLog, None)
    .await
    .unwrap();

  let facts = s
    .get_unexpired_memories(ada, Some(MemoryScope::PersonalFact))
    .await
    .unwrap();
  assert_eq!(facts.len(), 1);
  assert_eq!(facts[0].key, "pet");
}

#[tokio::test]
async fn delta_applies_scope_defaults() {
  let s = store().await;
  let ada = student(&s, "Ada").await;
  let before = Utc::now();

  let mut short = MemoryPatch::new("game_state", "turn", json!(4));
  short.ttl = Some(Duration::hours(1));

  let outcome = s
    .apply_memory_delta(ada, vec![
      MemoryPatch::new("personal_fact", "pet_name", json!("Rex")),
      MemoryPatch::new("game_state", "level", json!(3)),
      MemoryPatch::new("strategy_log", "hint", json!({ "style": "visual" })),
      short,
    ])
    .await
    .unwrap();
  assert!(outcome.is_clean());
  assert_eq!(outcome.applied.len(), 4);

  let by_key = |key: &str| {
    outcome
      .applied
      .iter()
      .find(|m| m.key == key)
      .cloned()
      .unwrap()
  };

  assert_eq!(by_key("pet_name").expires_at, None);
  assert_eq!(by_key("pet_name").value, "Rex");

  let level = by_key("level");
  assert_eq!(level.value, "3");
  let ttl = level.expires_at.unwrap() - before;
  assert!(ttl >= Duration::days(7) && ttl < Duration::days(7) + Duration::minutes(1));

  let hint = by_key("hint");
  assert_eq!(hint.value, r#"{"style":"visual"}"#);
  assert!(hint.expires_at.unwrap() - before >= Duration::days(365));

  assert!(by_key("turn").expires_at.unwrap() - before < Duration::hours(2));
}

#[tokio::test]
async fn custom_policy_overrides_defaults() {
  let s = store()
    .await
    .with_memory_policy(MemoryPolicy::from_days(1, 30).unwrap());
  let ada = student(&s, "Ada").await;
  let before = Utc::now();

  let outcome = s
    .apply_memory_delta(ada, vec![MemoryPatch::new("game_state", "level", json!(3))])
    .await
    .unwrap();
  let ttl = outcome.applied[0].expires_at.unwrap() - before;
  assert!(ttl < Duration::days(2));
}

#[tokio::test]
async fn century_ttl_stays_visible() {
  let s = store().await;
  let ada = student(&s, "Ada").await;

  let mut pet = MemoryPatch::new("personal_fact", "pet", json!("Rex"));
  pet.ttl = Some(Duration::days(36_500));
  let outcome = s.apply_memory_delta(ada, vec![pet]).await.unwrap();
  assert!(outcome.is_clean());

  let visible = s.get_unexpired_memories(ada, None).await.unwrap();
  assert_eq!(visible.len(), 1);
  assert_eq!(visible[0].key, "pet");
  assert_eq!(s.purge_expired_memories().await.unwrap(), 0);
}

#[tokio::test]
async fn expiry_beyond_year_9999_is_rejected() {
  let s = store().await;
  let ada = student(&s, "Ada").await;

  let mut pet = MemoryPatch::new("personal_fact", "pet", json!("Rex"));
  pet.ttl = Some(Duration::days(3_000_000));
  let outcome = s
    .apply_memory_delta(ada, vec![
      pet,
      MemoryPatch::new("personal_fact", "color", json!("green")),
    ])
    .await
    .unwrap();

  assert_eq!(outcome.applied.len(), 1);
  assert_eq!(outcome.applied[0].key, "color");
  assert_eq!(outcome.errors.len(), 1);
  assert_eq!(outcome.errors[0].item, "personal_fact/pet");
  assert_eq!(outcome.errors[0].kind, ErrorKind::Validation);

  let far = Utc::now() + Duration::days(3_000_000);
  let err = s
    .set_memory(ada, "pet".into(), "Rex".into(), MemoryScope::PersonalFact, Some(far))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);

  let keys: Vec<_> = s
    .get_unexpired_memories(ada, None)
    .await
    .unwrap()
    .into_iter()
    .map(|m| m.key)
    .collect();
  assert_eq!(keys, ["color"]);
}

#[tokio::test]
async fn unknown_scope_is_skipped_and_labelled() {
  let s = store().await;
  let ada = student(&s, "Ada").await;

  let outcome = s
    .apply_memory_delta(ada, vec![
      MemoryPatch::new("mood", "today", json!("happy")),
      MemoryPatch::new("personal_fact", "pet_name", json!("Rex")),
      MemoryPatch::new("personal_fact", "  ", json!("blank")),
    ])
    .await
    .unwrap();

  assert_eq!(outcome.applied.len(), 1);
  assert_eq!(outcome.errors.len(), 2);
  assert_eq!(outcome.errors[0].item, "mood/today");
  assert_eq!(outcome.errors[0].kind, ErrorKind::Validation);
  assert_eq!(outcome.errors[1].kind, ErrorKind::Validation);
}

#[tokio::test]
async fn concurrent_writes_to_different_keys_both_land() {
  let s = store().await;
  let ada = student(&s, "Ada").await;

  let (a, b) = tokio::join!(
    s.set_memory(ada, "pet_name".into(), "Rex".into(), MemoryScope::PersonalFact, None),
    s.set_memory(ada, "favorite_color".into(), "green".into(), MemoryScope::PersonalFact, None),
  );
  a.unwrap();
  b.unwrap();

  let keys: Vec<_> = s
    .get_unexpired_memories(ada, None)
    .await
    .unwrap()
    .into_iter()
    .map(|m| m.key)
    .collect();
  assert_eq!(keys, ["favorite_color", "pet_name"]);
}
