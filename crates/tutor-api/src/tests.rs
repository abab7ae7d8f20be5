//! Router tests against an in-memory store.

use std::sync::Arc;

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use serde_json::{Value, json};
use tower::ServiceExt as _;
use tutor_core::{
  context::ContextLimits,
  curriculum::NewGoal,
  store::CurriculumGraph,
};
use tutor_store_sqlite::SqliteStore;

use crate::api_router;

async fn make_store() -> Arc<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  store
    .add_goal(
      NewGoal::new("4.NBT.A.1", "Place value", "math", "4")
        .with_kc("pv", "Digit values")
        .with_kc("compare", "Compare numbers"),
    )
    .await
    .expect("seed goal");
  Arc::new(store)
}

async fn send(
  store: &Arc<SqliteStore>,
  method: &str,
  uri: &str,
  body: Option<Value>,
) -> Response {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let req = builder.body(body).unwrap();
  api_router(store.clone(), ContextLimits::default())
    .oneshot(req)
    .await
    .unwrap()
}

async fn json_body(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

async fn create_student(store: &Arc<SqliteStore>) -> String {
  let resp = send(store, "POST", "/students", Some(json!({ "display_name": "Ada" }))).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  json_body(resp).await["student_id"].as_str().unwrap().to_owned()
}

// ── Students ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn student_lifecycle() {
  let store = make_store().await;
  let id = create_student(&store).await;

  let resp = send(&store, "GET", &format!("/students/{id}"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["display_name"], "Ada");

  let resp = send(&store, "GET", "/students", None).await;
  assert_eq!(json_body(resp).await.as_array().unwrap().len(), 1);

  let resp = send(&store, "DELETE", &format!("/students/{id}"), None).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);

  let resp = send(&store, "GET", &format!("/students/{id}"), None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  assert!(json_body(resp).await["error"].as_str().unwrap().contains(&id));
}

#[tokio::test]
async fn blank_student_name_is_400() {
  let store = make_store().await;
  let resp = send(&store, "POST", "/students", Some(json!({ "display_name": " " }))).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Reconcile and context ────────────────────────────────────────────────────

#[tokio::test]
async fn reconcile_reports_skips_and_context_reflects_updates() {
  let store = make_store().await;
  let id = create_student(&store).await;

  let resp = send(
    &store,
    "POST",
    &format!("/students/{id}/reconcile"),
    Some(json!({
      "memory_delta": { "personal_fact": { "pet_name": "Rex" } },
      "mastery_delta": {
        "goal_patches": [
          { "goal_code": "4.NBT.A.1", "mastery_percentage": 75 },
          { "goal_code": "BOGUS.CODE", "mastery_percentage": 10 }
        ]
      }
    })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let report = json_body(resp).await;
  assert_eq!(report["updated_goals"].as_array().unwrap().len(), 1);
  assert_eq!(report["errors"][0]["item"], "BOGUS.CODE");
  assert_eq!(report["errors"][0]["kind"], "not_found");

  let resp = send(&store, "GET", &format!("/students/{id}/context"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let ctx = json_body(resp).await;
  assert_eq!(ctx["memories_by_scope"]["personal_fact"][0]["value"], "Rex");
  assert_eq!(
    ctx["mastery_context"]["incomplete_goals"][0]["goal_code"],
    "4.NBT.A.1"
  );

  let resp = send(&store, "GET", &format!("/students/{id}/context?format=prompt"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let prompt = String::from_utf8(bytes.to_vec()).unwrap();
  assert!(prompt.contains("- pet_name: Rex"));
}

#[tokio::test]
async fn reconcile_unknown_student_is_404() {
  let store = make_store().await;
  let resp = send(
    &store,
    "POST",
    &format!("/students/{}/reconcile", uuid::Uuid::new_v4()),
    Some(json!({})),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ── Mastery ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn mastery_upsert_validates_and_lists() {
  let store = make_store().await;
  let id = create_student(&store).await;
  let uri = format!("/students/{id}/mastery");

  let resp = send(&store, "PUT", &uri, Some(json!({
    "goal_code": "4.nbt.a.1", "kc_code": "pv", "mastery_percentage": 40
  })))
  .await;
  assert_eq!(resp.status(), StatusCode::OK);

  let resp = send(&store, "PUT", &uri, Some(json!({
    "goal_code": "4.NBT.A.1", "mastery_percentage": 150
  })))
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let resp = send(&store, "PUT", &uri, Some(json!({
    "goal_code": "NOPE", "mastery_percentage": 10
  })))
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);

  let resp = send(&store, "GET", &format!("{uri}/incomplete?threshold=50"), None).await;
  let incomplete = json_body(resp).await;
  assert_eq!(incomplete.as_array().unwrap().len(), 1);
  assert_eq!(incomplete[0]["kc_code"], "pv");

  let resp = send(&store, "GET", &uri, None).await;
  let map = json_body(resp).await;
  assert_eq!(map["tracked_items"], 1);
  assert_eq!(map["overall_mastery_percentage"], 40.0);
}

// ── Profile and memories ─────────────────────────────────────────────────────

#[tokio::test]
async fn profile_is_404_until_created() {
  let store = make_store().await;
  let id = create_student(&store).await;

  let resp = send(&store, "GET", &format!("/students/{id}/profile"), None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);

  send(
    &store,
    "POST",
    &format!("/students/{id}/reconcile"),
    Some(json!({ "profile_delta": { "trait_updates": { "pace": "fast" } } })),
  )
  .await;

  let resp = send(&store, "GET", &format!("/students/{id}/profile"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["traits"]["pace"], "fast");

  let resp = send(&store, "GET", &format!("/students/{id}/profile/history"), None).await;
  assert_eq!(json_body(resp).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn memories_put_and_filter() {
  let store = make_store().await;
  let id = create_student(&store).await;

  let resp = send(
    &store,
    "PUT",
    &format!("/students/{id}/memories/level"),
    Some(json!({ "scope": "game_state", "value": 3, "ttl_days": 2 })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let entry = json_body(resp).await;
  assert_eq!(entry["value"], "3");
  assert!(entry["expires_at"].is_string());

  let resp = send(
    &store,
    "PUT",
    &format!("/students/{id}/memories/mood"),
    Some(json!({ "scope": "feelings", "value": "happy" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let resp = send(
    &store,
    "GET",
    &format!("/students/{id}/memories?scope=personal_fact"),
    None,
  )
  .await;
  assert!(json_body(resp).await.as_array().unwrap().is_empty());

  let resp = send(&store, "GET", &format!("/students/{id}/memories"), None).await;
  assert_eq!(json_body(resp).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn memory_ttl_out_of_range_is_a_bad_request() {
  let store = make_store().await;
  let id = create_student(&store).await;

  for ttl in [json!(i64::MAX), json!(1e12), json!(0), json!(-2)] {
    let resp = send(
      &store,
      "PUT",
      &format!("/students/{id}/memories/level"),
      Some(json!({ "scope": "game_state", "value": 3, "ttl_days": ttl })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "ttl_days = {ttl}");
  }

  let resp = send(&store, "GET", &format!("/students/{id}/memories"), None).await;
  assert!(json_body(resp).await.as_array().unwrap().is_empty());
}

// ── Sessions ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sessions_dedupe_on_call_id() {
  let store = make_store().await;
  let id = create_student(&store).await;
  let body = json!({ "call_id": "call-7", "transcript": "hi", "duration_seconds": 90 });

  let resp = send(&store, "POST", &format!("/students/{id}/sessions"), Some(body.clone())).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let first = json_body(resp).await;

  let resp = send(&store, "POST", &format!("/students/{id}/sessions"), Some(body)).await;
  assert_eq!(json_body(resp).await["session_id"], first["session_id"]);

  let resp = send(&store, "GET", &format!("/students/{id}/sessions"), None).await;
  assert_eq!(json_body(resp).await.as_array().unwrap().len(), 1);

  let session_id = first["session_id"].as_str().unwrap();
  let resp = send(&store, "GET", &format!("/sessions/{session_id}"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
}

// ── Curriculum and maintenance ───────────────────────────────────────────────

#[tokio::test]
async fn curriculum_goals_and_prerequisites() {
  let store = make_store().await;

  let resp = send(
    &store,
    "POST",
    "/curriculum/goals",
    Some(json!({
      "code": "5.NBT.A.1",
      "title": "Powers of ten",
      "subject": "math",
      "grade_level": "5",
      "knowledge_components": [{ "kc_code": "pow", "description": "Powers" }]
    })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);

  let resp = send(
    &store,
    "POST",
    "/curriculum/goals",
    Some(json!({ "code": "5.nbt.a.1", "title": "Dup", "subject": "math", "grade_level": "5" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);

  let resp = send(
    &store,
    "POST",
    "/curriculum/goals/5.NBT.A.1/prerequisites",
    Some(json!({ "required_goal_code": "4.NBT.A.1", "kc_code": "pv" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);

  let resp = send(
    &store,
    "POST",
    "/curriculum/goals/4.NBT.A.1/prerequisites",
    Some(json!({ "required_goal_code": "5.NBT.A.1", "kc_code": "pow" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let resp = send(&store, "GET", "/curriculum/goals/5.NBT.A.1", None).await;
  let detail = json_body(resp).await;
  assert_eq!(detail["code"], "5.NBT.A.1");
  assert_eq!(detail["knowledge_components"][0]["kc_code"], "pow");
  assert_eq!(detail["prerequisites"][0]["kc_code"], "pv");
}

#[tokio::test]
async fn sweep_reports_count() {
  let store = make_store().await;
  let resp = send(&store, "POST", "/maintenance/sweep-memories", None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["purged"], 0);
}
