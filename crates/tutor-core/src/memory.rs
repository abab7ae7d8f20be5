//! Scoped key/value memories about a student.
//!
//! Unlike profiles, memories are upserted in place per key. Each scope has its
//! own default expiry; expired entries are hidden from reads and only removed
//! by an explicit sweep.

use std::str::FromStr as _;

use chrono::{DateTime, Datelike as _, Duration, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumIter,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemoryScope {
  /// Never expires by default.
  PersonalFact,
  /// Short-lived: expires after days.
  GameState,
  /// Long-lived: expires after about a year.
  StrategyLog,
}

impl MemoryScope {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s.trim()).map_err(|_| Error::UnknownScope(s.to_owned()))
  }
}

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
  pub student_id: Uuid,
  pub key:        String,
  pub scope:      MemoryScope,
  pub value:      String,
  pub expires_at: Option<DateTime<Utc>>,
  pub updated_at: DateTime<Utc>,
}

impl MemoryEntry {
  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    self.expires_at.is_some_and(|at| at <= now)
  }
}

/// One `scope/key = value` item from a session delta. The scope is kept as
/// the raw string so unknown scopes can be rejected individually.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPatch {
  pub scope: String,
  pub key:   String,
  pub value: Value,
  /// Overrides the scope's default expiry.
  pub ttl:   Option<Duration>,
}

impl MemoryPatch {
  pub fn new(
    scope: impl Into<String>,
    key: impl Into<String>,
    value: Value,
  ) -> Self {
    Self { scope: scope.into(), key: key.into(), value, ttl: None }
  }

  /// `scope/key`, used to label report entries.
  pub fn label(&self) -> String { format!("{}/{}", self.scope, self.key) }
}

/// Reported for every memory a delta wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUpdate {
  pub scope: MemoryScope,
  pub key:   String,
}

// ─── Expiry policy ───────────────────────────────────────────────────────────

/// Longest lifetime accepted for a memory, from a delta, the API or config.
pub const MAX_TTL_DAYS: i64 = 36_500;

/// Convert a (possibly fractional) day count into a lifetime. `None` unless
/// the count is finite, positive and at most [`MAX_TTL_DAYS`].
pub fn ttl_from_days(days: f64) -> Option<Duration> {
  if !days.is_finite() || days <= 0.0 || days > MAX_TTL_DAYS as f64 {
    return None;
  }
  TimeDelta::try_seconds((days * 86_400.0).round() as i64)
    .filter(|ttl| *ttl > TimeDelta::zero())
}

/// Default lifetimes per scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPolicy {
  pub game_state_ttl:   Duration,
  pub strategy_log_ttl: Duration,
}

impl Default for MemoryPolicy {
  fn default() -> Self {
    Self {
      game_state_ttl:   Duration::days(7),
      strategy_log_ttl: Duration::days(365),
    }
  }
}

impl MemoryPolicy {
  /// Both lifetimes must lie in `1..=MAX_TTL_DAYS` days.
  pub fn from_days(game_state: i64, strategy_log: i64) -> Result<Self> {
    let days = |field: &str, n: i64| {
      (1..=MAX_TTL_DAYS)
        .contains(&n)
        .then(|| Duration::days(n))
        .ok_or_else(|| Error::Invalid {
          field:  field.to_owned(),
          reason: format!("{n} is outside 1..={MAX_TTL_DAYS} days"),
        })
    };
    Ok(Self {
      game_state_ttl:   days("game_state_ttl_days", game_state)?,
      strategy_log_ttl: days("strategy_log_ttl_days", strategy_log)?,
    })
  }

  pub fn default_ttl(&self, scope: MemoryScope) -> Option<Duration> {
    match scope {
      MemoryScope::PersonalFact => None,
      MemoryScope::GameState => Some(self.game_state_ttl),
      MemoryScope::StrategyLog => Some(self.strategy_log_ttl),
    }
  }

  /// Fails when the expiry is not a representable four-digit-year instant,
  /// which stored timestamps require to compare correctly.
  pub fn expires_at(
    &self,
    scope: MemoryScope,
    now: DateTime<Utc>,
    explicit_ttl: Option<Duration>,
  ) -> Result<Option<DateTime<Utc>>> {
    let Some(ttl) = explicit_ttl.or_else(|| self.default_ttl(scope)) else {
      return Ok(None);
    };
    now
      .checked_add_signed(ttl)
      .filter(|at| (0..=9999).contains(&at.year()))
      .map(Some)
      .ok_or_else(|| Error::Invalid {
        field:  "ttl".to_owned(),
        reason: format!("lifetime of {} days is out of range", ttl.num_days()),
      })
  }
}

/// Strings are stored verbatim; anything else as compact JSON.
pub fn encode_value(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}
