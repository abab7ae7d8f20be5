//! Versioned student profiles.
//!
//! Each snapshot is immutable. The current profile is the snapshot with the
//! greatest `as_of`; an update always appends a new snapshot. Traits are
//! merged shallowly key by key, the narrative is replaced wholesale.

use chrono::{DateTime, Duration, DurationRound as _, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type Traits = Map<String, Value>;

/// An immutable profile snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
  pub profile_id: Uuid,
  pub student_id: Uuid,
  /// Strictly increasing per student.
  pub as_of:      DateTime<Utc>,
  pub narrative:  String,
  pub traits:     Traits,
}

/// A requested change to the current profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDelta {
  /// Replaces the narrative when present.
  pub narrative:         Option<String>,
  /// Overrides matching trait keys; unmentioned keys are kept. `null` values
  /// are ignored.
  pub trait_updates:     Traits,
  /// Accepted for compatibility with analyzers that emit it. Every effective
  /// change appends a version anyway, and a no-op never does.
  pub force_new_version: bool,
}

/// The content of the snapshot a delta would produce.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDraft {
  pub narrative: String,
  pub traits:    Traits,
}

impl ProfileDelta {
  pub fn is_empty(&self) -> bool {
    self.narrative.is_none()
      && self.trait_updates.values().all(Value::is_null)
  }

  /// Merge this delta onto `current`. Returns `None` when nothing would
  /// change, in which case no version may be appended.
  pub fn merge(&self, current: Option<&StudentProfile>) -> Option<ProfileDraft> {
    let mut narrative =
      current.map(|p| p.narrative.clone()).unwrap_or_default();
    let mut traits = current.map(|p| p.traits.clone()).unwrap_or_default();
    let mut changed = false;

    if let Some(new_narrative) = &self.narrative
      && (current.is_none() || *new_narrative != narrative)
    {
      narrative = new_narrative.clone();
      changed = true;
    }

    for (key, value) in &self.trait_updates {
      if value.is_null() {
        continue;
      }
      if traits.get(key) != Some(value) {
        traits.insert(key.clone(), value.clone());
        changed = true;
      }
    }

    changed.then_some(ProfileDraft { narrative, traits })
  }
}

/// Pick the `as_of` for a new snapshot: now at microsecond precision, bumped
/// past `previous` if the clock has not advanced.
pub fn next_as_of(
  previous: Option<DateTime<Utc>>,
  now: DateTime<Utc>,
) -> DateTime<Utc> {
  let now = now.duration_trunc(Duration::microseconds(1)).unwrap_or(now);
  match previous {
    Some(prev) if now <= prev => prev + Duration::microseconds(1),
    _ => now,
  }
}
