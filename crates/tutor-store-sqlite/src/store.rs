//! [`SqliteStore`]: the SQLite implementation of the tutoring storage
//! traits.

use std::{collections::HashSet, path::Path};

use chrono::{Datelike as _, DateTime, Duration, DurationRound as _, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use tutor_core::{
  DeltaArea, ErrorKind, ItemError, Partial,
  curriculum::{
    CurriculumGoal, KnowledgeComponent, NewGoal, Prerequisite, normalize_code,
    would_create_cycle,
  },
  error::StoreError as _,
  mastery::{MasteryMap, MasteryRecord, ProgressEntry, validate_percentage, weakest_first},
  memory::{MemoryEntry, MemoryPatch, MemoryPolicy, MemoryScope, encode_value},
  profile::{ProfileDelta, StudentProfile, Traits, next_as_of},
  session::{NewSession, SessionRecord},
  store::{
    Backend, CurriculumGraph, MasteryStore, MemoryStore, ProfileStore, SessionStore,
    StudentDirectory,
  },
  student::{NewStudent, Student},
};

use crate::{
  Error, Result,
  encode::{
    GOAL_COLUMNS, RawMemory, RawProfile, RawProgress, RawSession, RawStudent, encode_dt,
    encode_scope, encode_traits, encode_uuid, goal_from_row, kc_from_row,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A tutoring store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:          tokio_rusqlite::Connection,
  memory_policy: MemoryPolicy,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, memory_policy: MemoryPolicy::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, memory_policy: MemoryPolicy::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the default per-scope memory expiry.
  pub fn with_memory_policy(mut self, policy: MemoryPolicy) -> Self {
    self.memory_policy = policy;
    self
  }

  pub fn memory_policy(&self) -> MemoryPolicy { self.memory_policy }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// The current time at the precision timestamps are stored with.
fn now() -> DateTime<Utc> {
  let now = Utc::now();
  now.duration_trunc(Duration::microseconds(1)).unwrap_or(now)
}

fn exists<P: rusqlite::Params>(
  conn: &rusqlite::Connection,
  sql: &str,
  params: P,
) -> rusqlite::Result<bool> {
  Ok(conn.query_row(sql, params, |_| Ok(())).optional()?.is_some())
}

fn student_exists(conn: &rusqlite::Connection, student_id: &str) -> rusqlite::Result<bool> {
  exists(conn, "SELECT 1 FROM students WHERE student_id = ?1", [student_id])
}

/// Goal-level and KC-level progress rows for one student, joined with their
/// curriculum definitions.
const PROGRESS_SQL: &str = "
  SELECT g.goal_id, g.code, g.title, g.subject, g.grade_level,
         NULL, NULL, p.mastery_percentage, p.last_updated
  FROM goal_progress p
  JOIN goals g ON g.goal_id = p.goal_id
  WHERE p.student_id = ?1
  UNION ALL
  SELECT g.goal_id, g.code, g.title, g.subject, g.grade_level,
         k.kc_code, k.description, p.mastery_percentage, p.last_updated
  FROM kc_progress p
  JOIN goals g ON g.goal_id = p.goal_id
  JOIN knowledge_components k ON k.goal_id = p.goal_id AND k.kc_code = p.kc_code
  WHERE p.student_id = ?1";

impl Backend for SqliteStore {
  type Error = Error;
}

// ─── Students ────────────────────────────────────────────────────────────────

impl StudentDirectory for SqliteStore {
  async fn add_student(&self, input: NewStudent) -> Result<Student> {
    let display_name = input.display_name.trim().to_owned();
    if display_name.is_empty() {
      return Err(tutor_core::Error::invalid("display_name", "must not be empty").into());
    }

    let student = Student {
      student_id: Uuid::new_v4(),
      display_name,
      grade_level: input.grade_level,
      phone_number: input.phone_number,
      created_at: now(),
    };

    let id_str = encode_uuid(student.student_id);
    let at_str = encode_dt(student.created_at);
    let name   = student.display_name.clone();
    let grade  = student.grade_level.clone();
    let phone  = student.phone_number.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO students (student_id, display_name, grade_level, phone_number, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, name, grade, phone, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(student)
  }

  async fn get_student(&self, id: Uuid) -> Result<Option<Student>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawStudent> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM students WHERE student_id = ?1", RawStudent::COLUMNS),
            [id_str],
            RawStudent::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawStudent::into_student).transpose()
  }

  async fn list_students(&self) -> Result<Vec<Student>> {
    let raws: Vec<RawStudent> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM students ORDER BY created_at, display_name",
          RawStudent::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawStudent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStudent::into_student).collect()
  }

  async fn delete_student(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    // Owned rows go with it via ON DELETE CASCADE.
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM students WHERE student_id = ?1", [id_str])?)
      })
      .await?;

    if deleted > 0 {
      tracing::info!(student_id = %id, "erased student");
    }
    Ok(deleted > 0)
  }
}

// ─── Curriculum ──────────────────────────────────────────────────────────────

enum PrerequisiteOutcome {
  Added,
  MissingGoal(i64),
  MissingKc,
  Cycle,
}

impl CurriculumGraph for SqliteStore {
  async fn add_goal(&self, input: NewGoal) -> Result<CurriculumGoal> {
    let code = normalize_code(&input.code).to_owned();
    if code.is_empty() {
      return Err(tutor_core::Error::invalid("code", "must not be empty").into());
    }
    if input.title.trim().is_empty() {
      return Err(tutor_core::Error::invalid("title", "must not be empty").into());
    }
    if let Some(hours) = input.recommended_hours_per_week
      && !(hours.is_finite() && hours >= 0.0)
    {
      return Err(
        tutor_core::Error::invalid("recommended_hours_per_week", "must be non-negative").into(),
      );
    }

    let mut seen = HashSet::new();
    let mut kcs = Vec::with_capacity(input.knowledge_components.len());
    for kc in input.knowledge_components {
      let kc_code = normalize_code(&kc.kc_code).to_owned();
      if kc_code.is_empty() {
        return Err(tutor_core::Error::invalid("kc_code", "must not be empty").into());
      }
      if !seen.insert(kc_code.clone()) {
        return Err(
          tutor_core::Error::invalid("kc_code", format!("{kc_code:?} listed twice")).into(),
        );
      }
      kcs.push((kc_code, kc.description));
    }

    let mut goal = CurriculumGoal {
      goal_id: 0,
      code: code.clone(),
      title: input.title,
      subject: input.subject,
      grade_level: input.grade_level,
      description: input.description,
      recommended_hours_per_week: input.recommended_hours_per_week,
    };

    let row = goal.clone();
    let inserted: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if exists(&tx, "SELECT 1 FROM goals WHERE code = ?1", [&row.code])? {
          return Ok(None);
        }
        tx.execute(
          "INSERT INTO goals (code, title, subject, grade_level, description, recommended_hours_per_week)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            row.code,
            row.title,
            row.subject,
            row.grade_level,
            row.description,
            row.recommended_hours_per_week,
          ],
        )?;
        let goal_id = tx.last_insert_rowid();
        for (kc_code, description) in &kcs {
          tx.execute(
            "INSERT INTO knowledge_components (goal_id, kc_code, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![goal_id, kc_code, description],
          )?;
        }
        tx.commit()?;
        Ok(Some(goal_id))
      })
      .await?;

    goal.goal_id = inserted.ok_or(tutor_core::Error::DuplicateGoalCode(code))?;
    Ok(goal)
  }

  async fn get_goal(&self, goal_id: i64) -> Result<Option<CurriculumGoal>> {
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn
            .query_row(
              &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE goal_id = ?1"),
              [goal_id],
              goal_from_row,
            )
            .optional()?)
        })
        .await?,
    )
  }

  async fn get_goal_by_code(&self, code: String) -> Result<Option<CurriculumGoal>> {
    let code = normalize_code(&code).to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn
            .query_row(
              &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE code = ?1"),
              [code],
              goal_from_row,
            )
            .optional()?)
        })
        .await?,
    )
  }

  async fn resolve_goal_code(&self, code: String) -> Result<Option<i64>> {
    let code = normalize_code(&code).to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn
            .query_row("SELECT goal_id FROM goals WHERE code = ?1", [code], |r| r.get(0))
            .optional()?)
        })
        .await?,
    )
  }

  async fn goal_has_kc(&self, goal_id: i64, kc_code: String) -> Result<bool> {
    let kc_code = normalize_code(&kc_code).to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(exists(
            conn,
            "SELECT 1 FROM knowledge_components WHERE goal_id = ?1 AND kc_code = ?2",
            rusqlite::params![goal_id, kc_code],
          )?)
        })
        .await?,
    )
  }

  async fn list_knowledge_components(&self, goal_id: i64) -> Result<Vec<KnowledgeComponent>> {
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(
            "SELECT goal_id, kc_code, description FROM knowledge_components
             WHERE goal_id = ?1 ORDER BY kc_code",
          )?;
          let rows = stmt
            .query_map([goal_id], kc_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  async fn add_prerequisite(
    &self,
    goal_id: i64,
    required_goal_id: i64,
    kc_code: String,
  ) -> Result<Prerequisite> {
    let kc_code = normalize_code(&kc_code).to_owned();
    let kc = kc_code.clone();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for id in [goal_id, required_goal_id] {
          if !exists(&tx, "SELECT 1 FROM goals WHERE goal_id = ?1", [id])? {
            return Ok(PrerequisiteOutcome::MissingGoal(id));
          }
        }
        if !exists(
          &tx,
          "SELECT 1 FROM knowledge_components WHERE goal_id = ?1 AND kc_code = ?2",
          rusqlite::params![required_goal_id, kc],
        )? {
          return Ok(PrerequisiteOutcome::MissingKc);
        }

        let edges: Vec<(i64, i64)> = {
          let mut stmt =
            tx.prepare("SELECT DISTINCT goal_id, required_goal_id FROM goal_prerequisites")?;
          stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        if would_create_cycle(&edges, goal_id, required_goal_id) {
          return Ok(PrerequisiteOutcome::Cycle);
        }

        tx.execute(
          "INSERT OR IGNORE INTO goal_prerequisites (goal_id, required_goal_id, kc_code)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![goal_id, required_goal_id, kc],
        )?;
        tx.commit()?;
        Ok(PrerequisiteOutcome::Added)
      })
      .await?;

    match outcome {
      PrerequisiteOutcome::Added => Ok(Prerequisite { goal_id, required_goal_id, kc_code }),
      PrerequisiteOutcome::MissingGoal(id) => {
        Err(tutor_core::Error::GoalNotFound(id.to_string()).into())
      }
      PrerequisiteOutcome::MissingKc => Err(
        tutor_core::Error::KnowledgeComponentNotFound { goal_id: required_goal_id, kc_code }
          .into(),
      ),
      PrerequisiteOutcome::Cycle => {
        Err(tutor_core::Error::PrerequisiteCycle { goal_id, required_goal_id }.into())
      }
    }
  }

  async fn prerequisites(&self, goal_id: i64) -> Result<Vec<Prerequisite>> {
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(
            "SELECT goal_id, required_goal_id, kc_code FROM goal_prerequisites
             WHERE goal_id = ?1 ORDER BY required_goal_id, kc_code",
          )?;
          let rows = stmt
            .query_map([goal_id], |r| {
              Ok(Prerequisite {
                goal_id:          r.get(0)?,
                required_goal_id: r.get(1)?,
                kc_code:          r.get(2)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }
}

// ─── Mastery ─────────────────────────────────────────────────────────────────

enum Missing {
  Student,
  Goal,
  Kc,
}

impl MasteryStore for SqliteStore {
  async fn upsert_mastery(
    &self,
    student_id: Uuid,
    goal_id: i64,
    kc_code: Option<String>,
    mastery_percentage: f64,
  ) -> Result<MasteryRecord> {
    let mastery_percentage = validate_percentage(mastery_percentage)?;
    let kc_code = kc_code.map(|k| normalize_code(&k).to_owned());
    let last_updated = now();

    let sid = encode_uuid(student_id);
    let at  = encode_dt(last_updated);
    let kc  = kc_code.clone();

    let outcome = self
      .conn
      .call(move |conn| {
        if !student_exists(conn, &sid)? {
          return Ok(Err(Missing::Student));
        }
        if !exists(conn, "SELECT 1 FROM goals WHERE goal_id = ?1", [goal_id])? {
          return Ok(Err(Missing::Goal));
        }
        match kc {
          None => {
            conn.execute(
              "INSERT INTO goal_progress (student_id, goal_id, mastery_percentage, last_updated)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT (student_id, goal_id) DO UPDATE SET
                 mastery_percentage = excluded.mastery_percentage,
                 last_updated       = excluded.last_updated",
              rusqlite::params![sid, goal_id, mastery_percentage, at],
            )?;
          }
          Some(kc) => {
            if !exists(
              conn,
              "SELECT 1 FROM knowledge_components WHERE goal_id = ?1 AND kc_code = ?2",
              rusqlite::params![goal_id, kc],
            )? {
              return Ok(Err(Missing::Kc));
            }
            conn.execute(
              "INSERT INTO kc_progress (student_id, goal_id, kc_code, mastery_percentage, last_updated)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT (student_id, goal_id, kc_code) DO UPDATE SET
                 mastery_percentage = excluded.mastery_percentage,
                 last_updated       = excluded.last_updated",
              rusqlite::params![sid, goal_id, kc, mastery_percentage, at],
            )?;
          }
        }
        Ok(Ok(()))
      })
      .await?;

    match outcome {
      Ok(()) => Ok(MasteryRecord {
        student_id,
        goal_id,
        kc_code,
        mastery_percentage,
        last_updated,
      }),
      Err(Missing::Student) => Err(tutor_core::Error::StudentNotFound(student_id).into()),
      Err(Missing::Goal) => Err(tutor_core::Error::GoalNotFound(goal_id.to_string()).into()),
      Err(Missing::Kc) => Err(
        tutor_core::Error::KnowledgeComponentNotFound {
          goal_id,
          kc_code: kc_code.unwrap_or_default(),
        }
        .into(),
      ),
    }
  }

  async fn upsert_mastery_batch(
    &self,
    student_id: Uuid,
    goal_id: i64,
    entries: Vec<(String, f64)>,
  ) -> Result<Partial<MasteryRecord>> {
    let mut outcome = Partial::default();

    for (kc_code, pct) in entries {
      let mut result = self.upsert_mastery(student_id, goal_id, Some(kc_code.clone()), pct).await;
      if matches!(&result, Err(e) if e.kind() == ErrorKind::Conflict) {
        result = self.upsert_mastery(student_id, goal_id, Some(kc_code.clone()), pct).await;
      }

      match result {
        Ok(record) => outcome.applied.push(record),
        Err(e) if e.kind().is_reportable() => {
          outcome.errors.push(ItemError::from_error(DeltaArea::Mastery, kc_code, &e));
        }
        Err(e) => return Err(e),
      }
    }

    Ok(outcome)
  }

  async fn list_progress(&self, student_id: Uuid) -> Result<Vec<ProgressEntry>> {
    let sid = encode_uuid(student_id);

    let raws: Vec<RawProgress> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(PROGRESS_SQL)?;
        let rows = stmt
          .query_map([sid], RawProgress::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProgress::into_entry).collect()
  }

  async fn get_incomplete(&self, student_id: Uuid, threshold: f64) -> Result<Vec<ProgressEntry>> {
    let mut entries = self.list_progress(student_id).await?;
    entries.retain(|e| e.mastery_percentage < threshold);
    entries.sort_by(weakest_first);
    Ok(entries)
  }

  async fn get_mastery_map(&self, student_id: Uuid) -> Result<MasteryMap> {
    let entries = self.list_progress(student_id).await?;
    Ok(MasteryMap::build(student_id, entries))
  }
}

// ─── Profiles ────────────────────────────────────────────────────────────────

enum ProfileWrite {
  MissingStudent,
  Unchanged,
  Appended(RawProfile),
}

/// Inside a connection closure: the latest snapshot for a student.
fn latest_profile(
  conn: &rusqlite::Connection,
  sid: &str,
) -> Result<Option<StudentProfile>, tokio_rusqlite::Error> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {} FROM student_profiles WHERE student_id = ?1 ORDER BY as_of DESC LIMIT 1",
        RawProfile::COLUMNS
      ),
      [sid],
      RawProfile::from_row,
    )
    .optional()?;
  raw
    .map(RawProfile::into_profile)
    .transpose()
    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
}

/// Inside a connection closure: append a snapshot after `previous`.
fn append_profile(
  conn: &rusqlite::Connection,
  sid: String,
  previous: Option<DateTime<Utc>>,
  narrative: String,
  traits: &Traits,
) -> Result<RawProfile, tokio_rusqlite::Error> {
  let raw = RawProfile {
    profile_id: encode_uuid(Uuid::new_v4()),
    student_id: sid,
    as_of:      encode_dt(next_as_of(previous, Utc::now())),
    narrative,
    traits:     encode_traits(traits).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?,
  };
  conn.execute(
    "INSERT INTO student_profiles (profile_id, student_id, as_of, narrative, traits)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![raw.profile_id, raw.student_id, raw.as_of, raw.narrative, raw.traits],
  )?;
  Ok(raw)
}

impl ProfileStore for SqliteStore {
  async fn current_profile(&self, student_id: Uuid) -> Result<Option<StudentProfile>> {
    let sid = encode_uuid(student_id);
    Ok(self.conn.call(move |conn| latest_profile(conn, &sid)).await?)
  }

  async fn add_profile_version(
    &self,
    student_id: Uuid,
    narrative: String,
    traits: Traits,
  ) -> Result<StudentProfile> {
    let sid = encode_uuid(student_id);

    let write = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !student_exists(&tx, &sid)? {
          return Ok(ProfileWrite::MissingStudent);
        }
        let previous = latest_profile(&tx, &sid)?.map(|p| p.as_of);
        let raw = append_profile(&tx, sid, previous, narrative, &traits)?;
        tx.commit()?;
        Ok(ProfileWrite::Appended(raw))
      })
      .await?;

    match write {
      ProfileWrite::Appended(raw) => raw.into_profile(),
      _ => Err(tutor_core::Error::StudentNotFound(student_id).into()),
    }
  }

  async fn apply_profile_delta(
    &self,
    student_id: Uuid,
    delta: ProfileDelta,
  ) -> Result<Option<StudentProfile>> {
    let sid = encode_uuid(student_id);

    // Read, merge and append in one transaction so concurrent deltas for the
    // same student serialise instead of dropping each other's traits.
    let write = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !student_exists(&tx, &sid)? {
          return Ok(ProfileWrite::MissingStudent);
        }
        let current = latest_profile(&tx, &sid)?;
        let Some(draft) = delta.merge(current.as_ref()) else {
          return Ok(ProfileWrite::Unchanged);
        };
        let raw = append_profile(
          &tx,
          sid,
          current.map(|p| p.as_of),
          draft.narrative,
          &draft.traits,
        )?;
        tx.commit()?;
        Ok(ProfileWrite::Appended(raw))
      })
      .await?;

    match write {
      ProfileWrite::Appended(raw) => raw.into_profile().map(Some),
      ProfileWrite::Unchanged => Ok(None),
      ProfileWrite::MissingStudent => Err(tutor_core::Error::StudentNotFound(student_id).into()),
    }
  }

  async fn profile_history(&self, student_id: Uuid) -> Result<Vec<StudentProfile>> {
    let sid = encode_uuid(student_id);

    let raws: Vec<RawProfile> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM student_profiles WHERE student_id = ?1 ORDER BY as_of",
          RawProfile::COLUMNS
        ))?;
        let rows = stmt
          .query_map([sid], RawProfile::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProfile::into_profile).collect()
  }
}

// ─── Memories ────────────────────────────────────────────────────────────────

impl MemoryStore for SqliteStore {
  async fn set_memory(
    &self,
    student_id: Uuid,
    key: String,
    value: String,
    scope: MemoryScope,
    expires_at: Option<DateTime<Utc>>,
  ) -> Result<MemoryEntry> {
    let key = key.trim().to_owned();
    if key.is_empty() {
      return Err(tutor_core::Error::invalid("memory key", "must not be empty").into());
    }
    if let Some(at) = expires_at
      && !(0..=9999).contains(&at.year())
    {
      return Err(
        tutor_core::Error::invalid("expires_at", "must fall within years 0000-9999").into(),
      );
    }

    let entry = MemoryEntry {
      student_id,
      key,
      scope,
      value,
      expires_at,
      updated_at: now(),
    };

    let sid        = encode_uuid(student_id);
    let key        = entry.key.clone();
    let scope_str  = encode_scope(scope);
    let value      = entry.value.clone();
    let expires    = entry.expires_at.map(encode_dt);
    let updated_at = encode_dt(entry.updated_at);

    let written = self
      .conn
      .call(move |conn| {
        if !student_exists(conn, &sid)? {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO student_memories (student_id, memory_key, scope, value, expires_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (student_id, memory_key) DO UPDATE SET
             scope      = excluded.scope,
             value      = excluded.value,
             expires_at = excluded.expires_at,
             updated_at = excluded.updated_at",
          rusqlite::params![sid, key, scope_str, value, expires, updated_at],
        )?;
        Ok(true)
      })
      .await?;

    if !written {
      return Err(tutor_core::Error::StudentNotFound(student_id).into());
    }
    Ok(entry)
  }

  async fn apply_memory_delta(
    &self,
    student_id: Uuid,
    patches: Vec<MemoryPatch>,
  ) -> Result<Partial<MemoryEntry>> {
    let mut outcome = Partial::default();
    let policy = self.memory_policy;

    for patch in patches {
      let label = patch.label();
      let scope = match MemoryScope::parse(&patch.scope) {
        Ok(scope) => scope,
        Err(e) => {
          outcome.errors.push(ItemError::from_error(DeltaArea::Memory, label, &e));
          continue;
        }
      };

      let expires_at = match policy.expires_at(scope, Utc::now(), patch.ttl) {
        Ok(at) => at,
        Err(e) => {
          outcome.errors.push(ItemError::from_error(DeltaArea::Memory, label, &e));
          continue;
        }
      };
      let value = encode_value(&patch.value);

      match self.set_memory(student_id, patch.key, value, scope, expires_at).await {
        Ok(entry) => outcome.applied.push(entry),
        Err(e) if e.kind().is_reportable() => {
          outcome.errors.push(ItemError::from_error(DeltaArea::Memory, label, &e));
        }
        Err(e) => return Err(e),
      }
    }

    Ok(outcome)
  }

  async fn get_unexpired_memories(
    &self,
    student_id: Uuid,
    scope: Option<MemoryScope>,
  ) -> Result<Vec<MemoryEntry>> {
    let sid       = encode_uuid(student_id);
    let now_str   = encode_dt(Utc::now());
    let scope_str = scope.map(encode_scope);

    let raws: Vec<RawMemory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM student_memories
           WHERE student_id = ?1
             AND (expires_at IS NULL OR expires_at > ?2)
             AND (?3 IS NULL OR scope = ?3)
           ORDER BY scope, memory_key",
          RawMemory::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![sid, now_str, scope_str], RawMemory::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMemory::into_entry).collect()
  }

  async fn all_memories(&self, student_id: Uuid) -> Result<Vec<MemoryEntry>> {
    let sid = encode_uuid(student_id);

    let raws: Vec<RawMemory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM student_memories WHERE student_id = ?1 ORDER BY scope, memory_key",
          RawMemory::COLUMNS
        ))?;
        let rows = stmt
          .query_map([sid], RawMemory::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMemory::into_entry).collect()
  }

  async fn purge_expired_memories(&self) -> Result<usize> {
    let now_str = encode_dt(Utc::now());

    let purged = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM student_memories WHERE expires_at IS NOT NULL AND expires_at <= ?1",
          [now_str],
        )?)
      })
      .await?;

    tracing::info!(purged, "swept expired memories");
    Ok(purged)
  }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

impl SessionStore for SqliteStore {
  async fn record_session(&self, input: NewSession) -> Result<SessionRecord> {
    let call_id = input
      .call_id
      .map(|c| c.trim().to_owned())
      .filter(|c| !c.is_empty());

    let raw = RawSession {
      session_id:       encode_uuid(Uuid::new_v4()),
      student_id:       encode_uuid(input.student_id),
      call_id,
      started_at:       encode_dt(input.started_at),
      duration_seconds: input.duration_seconds,
      transcript:       input.transcript,
      summary:          input.summary,
      recorded_at:      encode_dt(now()),
    };

    let stored: Option<RawSession> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if let Some(call_id) = &raw.call_id {
          let existing = tx
            .query_row(
              &format!("SELECT {} FROM sessions WHERE call_id = ?1", RawSession::COLUMNS),
              [call_id],
              RawSession::from_row,
            )
            .optional()?;
          if existing.is_some() {
            return Ok(existing);
          }
        }
        if !student_exists(&tx, &raw.student_id)? {
          return Ok(None);
        }
        tx.execute(
          "INSERT INTO sessions (
             session_id, student_id, call_id, started_at,
             duration_seconds, transcript, summary, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            raw.session_id,
            raw.student_id,
            raw.call_id,
            raw.started_at,
            raw.duration_seconds,
            raw.transcript,
            raw.summary,
            raw.recorded_at,
          ],
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    stored
      .ok_or(tutor_core::Error::StudentNotFound(input.student_id))?
      .into_record()
  }

  async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>> {
    let id_str = encode_uuid(session_id);

    let raw: Option<RawSession> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM sessions WHERE session_id = ?1", RawSession::COLUMNS),
            [id_str],
            RawSession::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSession::into_record).transpose()
  }

  async fn recent_sessions(&self, student_id: Uuid, limit: usize) -> Result<Vec<SessionRecord>> {
    let sid = encode_uuid(student_id);
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawSession> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM sessions WHERE student_id = ?1
           ORDER BY started_at DESC, recorded_at DESC LIMIT ?2",
          RawSession::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![sid, limit_val], RawSession::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSession::into_record).collect()
  }
}
