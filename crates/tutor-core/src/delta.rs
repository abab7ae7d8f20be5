//! Tolerant parser for analyzer output.
//!
//! A session analysis arrives as loosely structured JSON produced by a
//! language model. Missing or `null` sections mean "no change for that
//! area". Malformed entries are skipped individually and reported, never
//! fatal to the rest of the delta.
//!
//! Recognised shape:
//!
//! ```json
//! {
//!   "profile_delta": {
//!     "narrative_changes": "...",
//!     "trait_updates": { "pace": "fast" },
//!     "should_create_new_profile_version": true
//!   },
//!   "memory_delta": {
//!     "personal_fact": { "pet_name": "Rex" },
//!     "game_state": { "level": { "value": 3, "ttl_days": 2 } }
//!   },
//!   "mastery_delta": {
//!     "goal_patches": [{ "goal_code": "4.NBT.A.1", "mastery_percentage": 75.0 }],
//!     "kc_patches": [{ "goal_code": "4.NBT.A.1", "kc_code": "pv", "mastery_percentage": 60 }]
//!   }
//! }
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
  DeltaArea, ErrorKind, ItemError,
  memory::{MAX_TTL_DAYS, MemoryPatch, ttl_from_days},
  profile::ProfileDelta,
};

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalPatch {
  pub goal_code:          String,
  pub mastery_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KcPatch {
  pub goal_code:          String,
  pub kc_code:            String,
  pub mastery_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasteryDelta {
  pub goal_patches: Vec<GoalPatch>,
  pub kc_patches:   Vec<KcPatch>,
}

impl MasteryDelta {
  pub fn is_empty(&self) -> bool {
    self.goal_patches.is_empty() && self.kc_patches.is_empty()
  }
}

/// Everything one session analysis asks to change. Every part is optional;
/// an empty part means no change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionAnalysisDelta {
  pub profile: ProfileDelta,
  pub memory:  Vec<MemoryPatch>,
  pub mastery: MasteryDelta,
}

/// A parsed delta together with the entries the parser had to drop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDelta {
  pub delta:  SessionAnalysisDelta,
  pub errors: Vec<ItemError>,
}

impl SessionAnalysisDelta {
  pub fn is_empty(&self) -> bool {
    self.profile.is_empty() && self.memory.is_empty() && self.mastery.is_empty()
  }

  /// Parse raw analyzer text. A surrounding Markdown code fence is
  /// stripped; text that is not JSON yields an empty delta and one error.
  pub fn parse_str(text: &str) -> ParsedDelta {
    match serde_json::from_str::<Value>(strip_code_fence(text)) {
      Ok(value) => Self::from_value(&value),
      Err(e) => ParsedDelta {
        delta:  Self::default(),
        errors: vec![ItemError::new(
          DeltaArea::Delta,
          "analysis",
          ErrorKind::Validation,
          format!("analysis is not valid JSON: {e}"),
        )],
      },
    }
  }

  pub fn from_value(value: &Value) -> ParsedDelta {
    let mut errors = Vec::new();

    let Some(root) = value.as_object() else {
      if !value.is_null() {
        errors.push(ItemError::new(
          DeltaArea::Delta,
          "analysis",
          ErrorKind::Validation,
          "analysis is not a JSON object",
        ));
      }
      return ParsedDelta { delta: Self::default(), errors };
    };

    let profile = section(root, "profile_delta", DeltaArea::Profile, &mut errors)
      .map(|obj| parse_profile(obj, &mut errors))
      .unwrap_or_default();
    let memory = section(root, "memory_delta", DeltaArea::Memory, &mut errors)
      .map(|obj| parse_memory(obj, &mut errors))
      .unwrap_or_default();
    let mastery = section(root, "mastery_delta", DeltaArea::Mastery, &mut errors)
      .map(|obj| parse_mastery(obj, &mut errors))
      .unwrap_or_default();

    ParsedDelta { delta: Self { profile, memory, mastery }, errors }
  }
}

fn strip_code_fence(text: &str) -> &str {
  let trimmed = text.trim();
  let Some(rest) = trimmed.strip_prefix("```") else {
    return trimmed;
  };
  // Drop the info string (e.g. "json") on the opening fence line.
  let body = rest.split_once('\n').map_or("", |(_, body)| body);
  body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn invalid(area: DeltaArea, item: impl Into<String>, msg: impl Into<String>) -> ItemError {
  ItemError::new(area, item, ErrorKind::Validation, msg)
}

/// Fetch an optional object-valued key. Absent or `null` is `None` silently;
/// any other non-object is `None` plus an error.
fn section<'a>(
  obj: &'a Map<String, Value>,
  key: &str,
  area: DeltaArea,
  errors: &mut Vec<ItemError>,
) -> Option<&'a Map<String, Value>> {
  match obj.get(key) {
    None | Some(Value::Null) => None,
    Some(Value::Object(inner)) => Some(inner),
    Some(_) => {
      errors.push(invalid(area, key, format!("{key} must be an object")));
      None
    }
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

fn parse_profile(
  obj: &Map<String, Value>,
  errors: &mut Vec<ItemError>,
) -> ProfileDelta {
  let narrative = match obj.get("narrative_changes") {
    None | Some(Value::Null) => None,
    Some(Value::String(s)) if s.trim().is_empty() => None,
    Some(Value::String(s)) => Some(s.trim().to_owned()),
    Some(_) => {
      errors.push(invalid(
        DeltaArea::Profile,
        "narrative_changes",
        "narrative_changes must be a string",
      ));
      None
    }
  };

  let trait_updates =
    section(obj, "trait_updates", DeltaArea::Profile, errors)
      .cloned()
      .unwrap_or_default();

  let force_new_version = match obj.get("should_create_new_profile_version") {
    Some(Value::Bool(b)) => *b,
    Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
    _ => false,
  };

  ProfileDelta { narrative, trait_updates, force_new_version }
}

// ─── Memory ──────────────────────────────────────────────────────────────────

fn parse_memory(
  obj: &Map<String, Value>,
  errors: &mut Vec<ItemError>,
) -> Vec<MemoryPatch> {
  let mut patches = Vec::new();

  for (scope, entries) in obj {
    let entries = match entries {
      Value::Null => continue,
      Value::Object(entries) => entries,
      _ => {
        errors.push(invalid(
          DeltaArea::Memory,
          scope.as_str(),
          "memory scope must map keys to values",
        ));
        continue;
      }
    };

    for (key, value) in entries {
      if value.is_null() {
        continue;
      }
      let mut patch = MemoryPatch::new(scope.as_str(), key.as_str(), value.clone());
      if let Some((inner, ttl)) = ttl_envelope(value) {
        match ttl {
          Some(ttl) => {
            patch.value = inner.clone();
            patch.ttl = Some(ttl);
          }
          None => {
            errors.push(invalid(
              DeltaArea::Memory,
              patch.label(),
              format!("ttl_days must be a positive number of at most {MAX_TTL_DAYS}"),
            ));
            continue;
          }
        }
      }
      patches.push(patch);
    }
  }

  patches
}

/// Recognise `{"value": X, "ttl_days": N}` with exactly those keys. The
/// inner `Option` is `None` when `ttl_days` is not a positive number within
/// [`MAX_TTL_DAYS`].
fn ttl_envelope(value: &Value) -> Option<(&Value, Option<Duration>)> {
  let obj = value.as_object()?;
  if obj.len() != 2 {
    return None;
  }
  let inner = obj.get("value")?;
  let days = obj.get("ttl_days")?;
  Some((inner, days.as_f64().and_then(ttl_from_days)))
}

// ─── Mastery ─────────────────────────────────────────────────────────────────

fn parse_mastery(
  obj: &Map<String, Value>,
  errors: &mut Vec<ItemError>,
) -> MasteryDelta {
  let mut delta = MasteryDelta::default();

  for (i, entry) in patch_list(obj, "goal_patches", errors).iter().enumerate() {
    let item = format!("goal_patches[{i}]");
    let Some(entry) = entry.as_object() else {
      errors.push(invalid(DeltaArea::Mastery, item, "patch must be an object"));
      continue;
    };
    let goal_code = code_field(entry, "goal_code");
    let pct = percentage_field(entry);
    match (goal_code, pct) {
      (Some(goal_code), Ok(mastery_percentage)) => {
        delta.goal_patches.push(GoalPatch { goal_code, mastery_percentage });
      }
      (None, _) => errors.push(invalid(DeltaArea::Mastery, item, "missing goal_code")),
      (Some(code), Err(msg)) => errors.push(invalid(DeltaArea::Mastery, code, msg)),
    }
  }

  for (i, entry) in patch_list(obj, "kc_patches", errors).iter().enumerate() {
    let item = format!("kc_patches[{i}]");
    let Some(entry) = entry.as_object() else {
      errors.push(invalid(DeltaArea::Mastery, item, "patch must be an object"));
      continue;
    };
    let goal_code = code_field(entry, "goal_code");
    let kc_code = code_field(entry, "kc_code");
    let pct = percentage_field(entry);
    match (goal_code, kc_code, pct) {
      (Some(goal_code), Some(kc_code), Ok(mastery_percentage)) => {
        delta.kc_patches.push(KcPatch { goal_code, kc_code, mastery_percentage });
      }
      (None, _, _) => errors.push(invalid(DeltaArea::Mastery, item, "missing goal_code")),
      (Some(_), None, _) => errors.push(invalid(DeltaArea::Mastery, item, "missing kc_code")),
      (Some(goal), Some(kc), Err(msg)) => {
        errors.push(invalid(DeltaArea::Mastery, format!("{goal}/{kc}"), msg));
      }
    }
  }

  delta
}

fn patch_list<'a>(
  obj: &'a Map<String, Value>,
  key: &str,
  errors: &mut Vec<ItemError>,
) -> &'a [Value] {
  match obj.get(key) {
    None | Some(Value::Null) => &[][..],
    Some(Value::Array(items)) => items.as_slice(),
    Some(_) => {
      errors.push(invalid(DeltaArea::Mastery, key, format!("{key} must be an array")));
      &[][..]
    }
  }
}

fn code_field(entry: &Map<String, Value>, key: &str) -> Option<String> {
  entry
    .get(key)
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
}

/// Numbers are taken as-is; numeric strings (optionally with a trailing `%`)
/// are accepted. Range checking is left to the mastery store.
fn percentage_field(entry: &Map<String, Value>) -> Result<f64, String> {
  match entry.get("mastery_percentage") {
    Some(Value::Number(n)) => n
      .as_f64()
      .ok_or_else(|| "mastery_percentage is not representable".to_owned()),
    Some(Value::String(s)) => s
      .trim()
      .trim_end_matches('%')
      .trim()
      .parse::<f64>()
      .map_err(|_| format!("mastery_percentage {s:?} is not a number")),
    None | Some(Value::Null) => Err("missing mastery_percentage".to_owned()),
    Some(other) => Err(format!("mastery_percentage {other} is not a number")),
  }
}
