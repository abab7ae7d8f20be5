//! Mastery tracking: per-student percentage mastery of goals and KCs.
//!
//! There is at most one progress row per `(student, goal)` and per
//! `(student, goal, kc_code)`; stores enforce this with upserts. A KC row may
//! only reference a KC that exists in the curriculum graph.

use std::{cmp::Ordering, collections::BTreeMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

pub const MIN_MASTERY: f64 = 0.0;
pub const MAX_MASTERY: f64 = 100.0;

/// Reject anything outside `[0.0, 100.0]`, including NaN. Values are never
/// clamped.
pub fn validate_percentage(value: f64) -> Result<f64> {
  if (MIN_MASTERY..=MAX_MASTERY).contains(&value) {
    Ok(value)
  } else {
    Err(Error::MasteryOutOfRange(value))
  }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// The result of a single upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryRecord {
  pub student_id:         Uuid,
  pub goal_id:            i64,
  /// `None` for a goal-level row.
  pub kc_code:            Option<String>,
  pub mastery_percentage: f64,
  pub last_updated:       DateTime<Utc>,
}

/// A tracked progress row joined with its curriculum definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
  pub goal_id:            i64,
  pub goal_code:          String,
  pub goal_title:         String,
  pub subject:            String,
  pub grade_level:        String,
  pub kc_code:            Option<String>,
  pub kc_description:     Option<String>,
  pub mastery_percentage: f64,
  pub last_updated:       DateTime<Utc>,
}

impl ProgressEntry {
  pub fn is_goal(&self) -> bool { self.kc_code.is_none() }
}

/// Weakest first; ties broken by goal code, then goal rows before KC rows,
/// then KC code, so the order is stable across backends.
pub fn weakest_first(a: &ProgressEntry, b: &ProgressEntry) -> Ordering {
  a.mastery_percentage
    .total_cmp(&b.mastery_percentage)
    .then_with(|| a.goal_code.cmp(&b.goal_code))
    .then_with(|| a.kc_code.cmp(&b.kc_code))
}

// ─── Mastery map ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KcMastery {
  pub kc_code:            String,
  pub description:        Option<String>,
  pub mastery_percentage: f64,
  pub last_updated:       DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalMastery {
  pub goal_id:              i64,
  pub goal_code:            String,
  pub title:                String,
  /// `None` when only KCs of this goal are tracked.
  pub mastery_percentage:   Option<f64>,
  pub last_updated:         Option<DateTime<Utc>>,
  pub knowledge_components: Vec<KcMastery>,
}

/// Nested view: subject → grade level → goals → KCs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryMap {
  pub student_id:                 Uuid,
  /// Unweighted mean over every tracked goal and KC percentage. Goals and
  /// KCs count equally regardless of curricular weight; `None` when nothing
  /// is tracked.
  pub overall_mastery_percentage: Option<f64>,
  pub tracked_items:              usize,
  pub subjects: BTreeMap<String, BTreeMap<String, Vec<GoalMastery>>>,
}

impl MasteryMap {
  pub fn build(student_id: Uuid, entries: Vec<ProgressEntry>) -> Self {
    let tracked_items = entries.len();
    let overall_mastery_percentage = (tracked_items > 0).then(|| {
      entries.iter().map(|e| e.mastery_percentage).sum::<f64>()
        / tracked_items as f64
    });

    // goal_code keeps goals sorted inside each grade.
    let mut goals: BTreeMap<(String, String, String), GoalMastery> =
      BTreeMap::new();

    for entry in entries {
      let goal = goals
        .entry((
          entry.subject.clone(),
          entry.grade_level.clone(),
          entry.goal_code.clone(),
        ))
        .or_insert_with(|| GoalMastery {
          goal_id:              entry.goal_id,
          goal_code:            entry.goal_code.clone(),
          title:                entry.goal_title.clone(),
          mastery_percentage:   None,
          last_updated:         None,
          knowledge_components: Vec::new(),
        });

      match entry.kc_code {
        None => {
          goal.mastery_percentage = Some(entry.mastery_percentage);
          goal.last_updated = Some(entry.last_updated);
        }
        Some(kc_code) => goal.knowledge_components.push(KcMastery {
          kc_code,
          description: entry.kc_description,
          mastery_percentage: entry.mastery_percentage,
          last_updated: entry.last_updated,
        }),
      }
    }

    let mut subjects: BTreeMap<String, BTreeMap<String, Vec<GoalMastery>>> =
      BTreeMap::new();
    for ((subject, grade, _), mut goal) in goals {
      goal.knowledge_components.sort_by(|a, b| a.kc_code.cmp(&b.kc_code));
      subjects.entry(subject).or_default().entry(grade).or_default().push(goal);
    }

    Self { student_id, overall_mastery_percentage, tracked_items, subjects }
  }
}
