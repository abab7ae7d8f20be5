//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as fixed-width RFC 3339 strings with
//! microsecond precision, so lexical order equals chronological order for
//! years 0000 through 9999. Writers reject instants outside that range.
//! Trait maps are stored as compact JSON. UUIDs are stored as hyphenated
//! lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use tutor_core::{
  curriculum::{CurriculumGoal, KnowledgeComponent},
  mastery::ProgressEntry,
  memory::{MemoryEntry, MemoryScope},
  profile::{StudentProfile, Traits},
  session::SessionRecord,
  student::Student,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── MemoryScope ─────────────────────────────────────────────────────────────

pub fn encode_scope(scope: MemoryScope) -> &'static str {
  match scope {
    MemoryScope::PersonalFact => "personal_fact",
    MemoryScope::GameState => "game_state",
    MemoryScope::StrategyLog => "strategy_log",
  }
}

pub fn decode_scope(s: &str) -> Result<MemoryScope> {
  MemoryScope::parse(s).map_err(|_| Error::Decode(format!("unknown memory scope: {s:?}")))
}

// ─── Traits ──────────────────────────────────────────────────────────────────

pub fn encode_traits(traits: &Traits) -> Result<String> {
  Ok(serde_json::to_string(traits)?)
}

pub fn decode_traits(s: &str) -> Result<Traits> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `students` row.
pub struct RawStudent {
  pub student_id:   String,
  pub display_name: String,
  pub grade_level:  Option<String>,
  pub phone_number: Option<String>,
  pub created_at:   String,
}

impl RawStudent {
  pub const COLUMNS: &'static str =
    "student_id, display_name, grade_level, phone_number, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student_id:   row.get(0)?,
      display_name: row.get(1)?,
      grade_level:  row.get(2)?,
      phone_number: row.get(3)?,
      created_at:   row.get(4)?,
    })
  }

  pub fn into_student(self) -> Result<Student> {
    Ok(Student {
      student_id:   decode_uuid(&self.student_id)?,
      display_name: self.display_name,
      grade_level:  self.grade_level,
      phone_number: self.phone_number,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub const GOAL_COLUMNS: &str = "goal_id, code, title, subject, grade_level, \
                                description, recommended_hours_per_week";

/// Goal rows need no decoding beyond column extraction.
pub fn goal_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CurriculumGoal> {
  Ok(CurriculumGoal {
    goal_id:                    row.get(0)?,
    code:                       row.get(1)?,
    title:                      row.get(2)?,
    subject:                    row.get(3)?,
    grade_level:                row.get(4)?,
    description:                row.get(5)?,
    recommended_hours_per_week: row.get(6)?,
  })
}

pub fn kc_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeComponent> {
  Ok(KnowledgeComponent {
    goal_id:     row.get(0)?,
    kc_code:     row.get(1)?,
    description: row.get(2)?,
  })
}

/// A progress row joined with its goal and (for KC rows) KC definition.
pub struct RawProgress {
  pub goal_id:            i64,
  pub goal_code:          String,
  pub goal_title:         String,
  pub subject:            String,
  pub grade_level:        String,
  pub kc_code:            Option<String>,
  pub kc_description:     Option<String>,
  pub mastery_percentage: f64,
  pub last_updated:       String,
}

impl RawProgress {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      goal_id:            row.get(0)?,
      goal_code:          row.get(1)?,
      goal_title:         row.get(2)?,
      subject:            row.get(3)?,
      grade_level:        row.get(4)?,
      kc_code:            row.get(5)?,
      kc_description:     row.get(6)?,
      mastery_percentage: row.get(7)?,
      last_updated:       row.get(8)?,
    })
  }

  pub fn into_entry(self) -> Result<ProgressEntry> {
    Ok(ProgressEntry {
      goal_id:            self.goal_id,
      goal_code:          self.goal_code,
      goal_title:         self.goal_title,
      subject:            self.subject,
      grade_level:        self.grade_level,
      kc_code:            self.kc_code,
      kc_description:     self.kc_description,
      mastery_percentage: self.mastery_percentage,
      last_updated:       decode_dt(&self.last_updated)?,
    })
  }
}

/// Raw strings read directly from a `student_profiles` row.
pub struct RawProfile {
  pub profile_id: String,
  pub student_id: String,
  pub as_of:      String,
  pub narrative:  String,
  pub traits:     String,
}

impl RawProfile {
  pub const COLUMNS: &'static str = "profile_id, student_id, as_of, narrative, traits";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      profile_id: row.get(0)?,
      student_id: row.get(1)?,
      as_of:      row.get(2)?,
      narrative:  row.get(3)?,
      traits:     row.get(4)?,
    })
  }

  pub fn into_profile(self) -> Result<StudentProfile> {
    Ok(StudentProfile {
      profile_id: decode_uuid(&self.profile_id)?,
      student_id: decode_uuid(&self.student_id)?,
      as_of:      decode_dt(&self.as_of)?,
      narrative:  self.narrative,
      traits:     decode_traits(&self.traits)?,
    })
  }
}

/// Raw strings read directly from a `student_memories` row.
pub struct RawMemory {
  pub student_id: String,
  pub memory_key: String,
  pub scope:      String,
  pub value:      String,
  pub expires_at: Option<String>,
  pub updated_at: String,
}

impl RawMemory {
  pub const COLUMNS: &'static str =
    "student_id, memory_key, scope, value, expires_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student_id: row.get(0)?,
      memory_key: row.get(1)?,
      scope:      row.get(2)?,
      value:      row.get(3)?,
      expires_at: row.get(4)?,
      updated_at: row.get(5)?,
    })
  }

  pub fn into_entry(self) -> Result<MemoryEntry> {
    Ok(MemoryEntry {
      student_id: decode_uuid(&self.student_id)?,
      key:        self.memory_key,
      scope:      decode_scope(&self.scope)?,
      value:      self.value,
      expires_at: self.expires_at.as_deref().map(decode_dt).transpose()?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `sessions` row.
pub struct RawSession {
  pub session_id:       String,
  pub student_id:       String,
  pub call_id:          Option<String>,
  pub started_at:       String,
  pub duration_seconds: Option<u32>,
  pub transcript:       String,
  pub summary:          Option<String>,
  pub recorded_at:      String,
}

impl RawSession {
  pub const COLUMNS: &'static str = "session_id, student_id, call_id, started_at, \
                                     duration_seconds, transcript, summary, recorded_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:       row.get(0)?,
      student_id:       row.get(1)?,
      call_id:          row.get(2)?,
      started_at:       row.get(3)?,
      duration_seconds: row.get(4)?,
      transcript:       row.get(5)?,
      summary:          row.get(6)?,
      recorded_at:      row.get(7)?,
    })
  }

  pub fn into_record(self) -> Result<SessionRecord> {
    Ok(SessionRecord {
      session_id:       decode_uuid(&self.session_id)?,
      student_id:       decode_uuid(&self.student_id)?,
      call_id:          self.call_id,
      started_at:       decode_dt(&self.started_at)?,
      duration_seconds: self.duration_seconds,
      transcript:       self.transcript,
      summary:          self.summary,
      recorded_at:      decode_dt(&self.recorded_at)?,
    })
  }
}
