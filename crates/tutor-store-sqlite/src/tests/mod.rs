//! Integration tests for `SqliteStore` against an in-memory database.

use tutor_core::{
  curriculum::NewGoal,
  store::{CurriculumGraph, StudentDirectory},
  student::NewStudent,
};
use uuid::Uuid;

use crate::SqliteStore;

mod conflict;
mod curriculum;
mod memory;
mod pipeline;
mod students;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn student(s: &SqliteStore, name: &str) -> Uuid {
  s.add_student(NewStudent::new(name)).await.unwrap().student_id
}

/// A math goal with the given KC codes. Returns the goal id.
async fn goal(s: &SqliteStore, code: &str, kcs: &[&str]) -> i64 {
  let mut input = NewGoal::new(code, format!("Goal {code}"), "math", "4");
  for kc in kcs {
    input = input.with_kc(*kc, format!("KC {kc}"));
  }
  s.add_goal(input).await.unwrap().goal_id
}
