//! The reconciliation engine: merge one session analysis into a student's
//! cumulative mastery, memory and profile state.
//!
//! Order of application is fixed: goal mastery, KC mastery, memories, then
//! the profile. Each write is an independent field-level upsert, so two
//! deltas racing for the same student interleave at key granularity and
//! neither loses updates to keys the other did not touch. Re-applying the
//! same delta yields the same state and appends no profile version.
//!
//! Per-item problems (unknown goal codes, out-of-range percentages, unknown
//! memory scopes, a conflict that survives its retry) are collected in the
//! [`ReconciliationReport`]; only storage transport failures and an unknown
//! student abort the call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  DeltaArea, Error, ErrorKind, ItemError,
  curriculum::normalize_code,
  delta::{KcPatch, MasteryDelta, ParsedDelta, SessionAnalysisDelta},
  error::StoreError as _,
  memory::{MemoryPatch, MemoryUpdate},
  profile::ProfileDelta,
  store::{CurriculumGraph, MasteryStore, MemoryStore, ProfileStore, StudentDirectory},
};

// ─── Report ──────────────────────────────────────────────────────────────────

/// Goal codes in updates are the curriculum's spelling, not the analyzer's.
/// Error items keep the analyzer's spelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalUpdate {
  pub goal_id:            i64,
  pub goal_code:          String,
  pub mastery_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KcUpdate {
  pub goal_id:            i64,
  pub goal_code:          String,
  pub kc_code:            String,
  pub mastery_percentage: f64,
}

/// What one reconciliation pass did. A report with errors is still a
/// success: everything not listed in `errors` was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
  pub student_id:       Uuid,
  pub updated_goals:    Vec<GoalUpdate>,
  pub updated_kcs:      Vec<KcUpdate>,
  pub updated_memories: Vec<MemoryUpdate>,
  pub profile_updated:  bool,
  pub errors:           Vec<ItemError>,
}

impl ReconciliationReport {
  fn new(student_id: Uuid) -> Self {
    Self {
      student_id,
      updated_goals: Vec::new(),
      updated_kcs: Vec::new(),
      updated_memories: Vec::new(),
      profile_updated: false,
      errors: Vec::new(),
    }
  }

  pub fn is_clean(&self) -> bool { self.errors.is_empty() }

  pub fn update_count(&self) -> usize {
    self.updated_goals.len()
      + self.updated_kcs.len()
      + self.updated_memories.len()
      + usize::from(self.profile_updated)
  }
}

// ─── Entry points ────────────────────────────────────────────────────────────

/// Apply an already-parsed delta.
pub async fn reconcile<S>(
  store: &S,
  student_id: Uuid,
  delta: &SessionAnalysisDelta,
) -> Result<ReconciliationReport, S::Error>
where
  S: StudentDirectory + CurriculumGraph + MasteryStore + MemoryStore + ProfileStore,
{
  if store.get_student(student_id).await?.is_none() {
    return Err(Error::StudentNotFound(student_id).into());
  }

  let mut report = ReconciliationReport::new(student_id);

  apply_mastery(store, student_id, &delta.mastery, &mut report).await?;
  apply_memory(store, student_id, &delta.memory, &mut report).await?;
  apply_profile(store, student_id, &delta.profile, &mut report).await?;

  if report.is_clean() {
    tracing::info!(
      %student_id,
      updates = report.update_count(),
      "reconciled session delta"
    );
  } else {
    tracing::warn!(
      %student_id,
      updates = report.update_count(),
      skipped = report.errors.len(),
      "reconciled session delta with skipped items"
    );
  }

  Ok(report)
}

/// Apply a parsed delta, folding the parser's dropped entries into the
/// report ahead of the engine's own.
pub async fn reconcile_parsed<S>(
  store: &S,
  student_id: Uuid,
  parsed: ParsedDelta,
) -> Result<ReconciliationReport, S::Error>
where
  S: StudentDirectory + CurriculumGraph + MasteryStore + MemoryStore + ProfileStore,
{
  let mut report = reconcile(store, student_id, &parsed.delta).await?;
  if !parsed.errors.is_empty() {
    let mut errors = parsed.errors;
    errors.append(&mut report.errors);
    report.errors = errors;
  }
  Ok(report)
}

/// Parse untrusted analyzer JSON and apply it. A JSON string is treated as
/// raw analyzer text.
pub async fn reconcile_value<S>(
  store: &S,
  student_id: Uuid,
  value: &Value,
) -> Result<ReconciliationReport, S::Error>
where
  S: StudentDirectory + CurriculumGraph + MasteryStore + MemoryStore + ProfileStore,
{
  let parsed = match value {
    Value::String(text) => SessionAnalysisDelta::parse_str(text),
    other => SessionAnalysisDelta::from_value(other),
  };
  reconcile_parsed(store, student_id, parsed).await
}

// ─── Mastery ─────────────────────────────────────────────────────────────────

/// A goal code as stored in the curriculum.
#[derive(Debug, Clone)]
struct ResolvedGoal {
  id:   i64,
  code: String,
}

/// Resolves each distinct goal code once per delta.
struct GoalResolver<'a, S> {
  store: &'a S,
  cache: HashMap<String, Option<ResolvedGoal>>,
}

impl<'a, S: CurriculumGraph> GoalResolver<'a, S> {
  fn new(store: &'a S) -> Self { Self { store, cache: HashMap::new() } }

  async fn resolve(&mut self, code: &str) -> Result<Option<ResolvedGoal>, S::Error> {
    let key = normalize_code(code).to_ascii_uppercase();
    if let Some(hit) = self.cache.get(&key) {
      return Ok(hit.clone());
    }
    let goal = self
      .store
      .get_goal_by_code(normalize_code(code).to_owned())
      .await?
      .map(|goal| ResolvedGoal { id: goal.goal_id, code: goal.code });
    self.cache.insert(key, goal.clone());
    Ok(goal)
  }
}

fn unknown_goal(item: impl Into<String>, code: &str) -> ItemError {
  ItemError::new(
    DeltaArea::Mastery,
    item,
    ErrorKind::NotFound,
    format!("goal code {code:?} does not resolve to a curriculum goal"),
  )
}

/// Skip item-level failures and exhausted conflicts into the report;
/// propagate everything else.
fn skip_or_propagate<E: crate::error::StoreError>(
  err: E,
  area: DeltaArea,
  item: impl Into<String>,
  report: &mut ReconciliationReport,
) -> Result<(), E> {
  if err.kind().is_reportable() {
    let item = item.into();
    tracing::warn!(?area, %item, error = %err, "skipping delta item");
    report.errors.push(ItemError::from_error(area, item, &err));
    Ok(())
  } else {
    Err(err)
  }
}

async fn apply_mastery<S>(
  store: &S,
  student_id: Uuid,
  delta: &MasteryDelta,
  report: &mut ReconciliationReport,
) -> Result<(), S::Error>
where
  S: CurriculumGraph + MasteryStore,
{
  let mut resolver = GoalResolver::new(store);

  // Goal-level rows first so KC rows never precede their parent goal.
  for patch in &delta.goal_patches {
    let Some(goal) = resolver.resolve(&patch.goal_code).await? else {
      tracing::warn!(goal_code = %patch.goal_code, "skipping unknown goal code");
      report.errors.push(unknown_goal(&patch.goal_code, &patch.goal_code));
      continue;
    };

    let goal_id = goal.id;
    let first = store
      .upsert_mastery(student_id, goal_id, None, patch.mastery_percentage)
      .await;
    // A lost first-insert race surfaces as a conflict; the retry lands as an
    // update of the row the other writer created.
    let result = match first {
      Err(e) if e.kind() == ErrorKind::Conflict => {
        tracing::debug!(goal_code = %patch.goal_code, "retrying mastery upsert after conflict");
        store
          .upsert_mastery(student_id, goal_id, None, patch.mastery_percentage)
          .await
      }
      other => other,
    };

    match result {
      Ok(record) => report.updated_goals.push(GoalUpdate {
        goal_id,
        goal_code: goal.code,
        mastery_percentage: record.mastery_percentage,
      }),
      Err(e) => skip_or_propagate(e, DeltaArea::Mastery, &patch.goal_code, report)?,
    }
  }

  for (goal_code, patches) in group_by_goal(&delta.kc_patches) {
    let Some(goal) = resolver.resolve(goal_code).await? else {
      tracing::warn!(%goal_code, kcs = patches.len(), "skipping KC patches for unknown goal code");
      for patch in patches {
        report
          .errors
          .push(unknown_goal(format!("{goal_code}/{}", patch.kc_code), goal_code));
      }
      continue;
    };

    let entries = patches
      .iter()
      .map(|p| (p.kc_code.clone(), p.mastery_percentage))
      .collect();

    let batch = store.upsert_mastery_batch(student_id, goal.id, entries).await?;

    report.updated_kcs.extend(batch.applied.into_iter().filter_map(|record| {
      Some(KcUpdate {
        goal_id: goal.id,
        goal_code: goal.code.clone(),
        kc_code: record.kc_code?,
        mastery_percentage: record.mastery_percentage,
      })
    }));
    for mut err in batch.errors {
      tracing::warn!(%goal_code, kc = %err.item, error = %err.message, "skipping KC patch");
      err.item = format!("{goal_code}/{}", err.item);
      report.errors.push(err);
    }
  }

  Ok(())
}

/// Group KC patches by goal code, keeping first-appearance order.
fn group_by_goal(patches: &[KcPatch]) -> Vec<(&str, Vec<&KcPatch>)> {
  let mut groups: Vec<(&str, Vec<&KcPatch>)> = Vec::new();
  for patch in patches {
    match groups.iter_mut().find(|(code, _)| *code == patch.goal_code) {
      Some((_, group)) => group.push(patch),
      None => groups.push((patch.goal_code.as_str(), vec![patch])),
    }
  }
  groups
}

// ─── Memory ──────────────────────────────────────────────────────────────────

async fn apply_memory<S: MemoryStore>(
  store: &S,
  student_id: Uuid,
  patches: &[MemoryPatch],
  report: &mut ReconciliationReport,
) -> Result<(), S::Error> {
  if patches.is_empty() {
    return Ok(());
  }

  let outcome = store.apply_memory_delta(student_id, patches.to_vec()).await?;
  report.updated_memories.extend(
    outcome
      .applied
      .into_iter()
      .map(|entry| MemoryUpdate { scope: entry.scope, key: entry.key }),
  );
  for err in outcome.errors {
    tracing::warn!(item = %err.item, error = %err.message, "skipping memory patch");
    report.errors.push(err);
  }
  Ok(())
}

// ─── Profile ─────────────────────────────────────────────────────────────────

async fn apply_profile<S: ProfileStore>(
  store: &S,
  student_id: Uuid,
  delta: &ProfileDelta,
  report: &mut ReconciliationReport,
) -> Result<(), S::Error> {
  if delta.is_empty() {
    return Ok(());
  }

  match store.apply_profile_delta(student_id, delta.clone()).await {
    Ok(Some(profile)) => {
      tracing::debug!(%student_id, as_of = %profile.as_of, "appended profile version");
      report.profile_updated = true;
    }
    Ok(None) => {
      tracing::debug!(%student_id, "profile delta changed nothing");
    }
    Err(e) => skip_or_propagate(e, DeltaArea::Profile, "profile", report)?,
  }
  Ok(())
}
