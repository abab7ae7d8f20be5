//! SQL schema for the tutoring SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS students (
    student_id    TEXT PRIMARY KEY,
    display_name  TEXT NOT NULL,
    grade_level   TEXT,
    phone_number  TEXT,
    created_at    TEXT NOT NULL
);

-- Curriculum graph: shared by all students.
CREATE TABLE IF NOT EXISTS goals (
    goal_id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    code                       TEXT NOT NULL UNIQUE COLLATE NOCASE,
    title                      TEXT NOT NULL,
    subject                    TEXT NOT NULL,
    grade_level                TEXT NOT NULL,
    description                TEXT,
    recommended_hours_per_week REAL
);

CREATE TABLE IF NOT EXISTS knowledge_components (
    goal_id     INTEGER NOT NULL REFERENCES goals(goal_id) ON DELETE CASCADE,
    kc_code     TEXT NOT NULL,
    description TEXT NOT NULL,
    PRIMARY KEY (goal_id, kc_code)
);

-- goal_id requires kc_code of required_goal_id. Acyclicity is checked on
-- insert.
CREATE TABLE IF NOT EXISTS goal_prerequisites (
    goal_id          INTEGER NOT NULL REFERENCES goals(goal_id) ON DELETE CASCADE,
    required_goal_id INTEGER NOT NULL,
    kc_code          TEXT NOT NULL,
    PRIMARY KEY (goal_id, required_goal_id, kc_code),
    FOREIGN KEY (required_goal_id, kc_code)
        REFERENCES knowledge_components(goal_id, kc_code) ON DELETE CASCADE,
    CHECK (goal_id != required_goal_id)
);

-- At most one row per (student, goal); written only by upsert.
CREATE TABLE IF NOT EXISTS goal_progress (
    student_id         TEXT NOT NULL REFERENCES students(student_id) ON DELETE CASCADE,
    goal_id            INTEGER NOT NULL REFERENCES goals(goal_id),
    mastery_percentage REAL NOT NULL CHECK (mastery_percentage BETWEEN 0.0 AND 100.0),
    last_updated       TEXT NOT NULL,
    PRIMARY KEY (student_id, goal_id)
);

-- At most one row per (student, goal, kc); the KC must exist.
CREATE TABLE IF NOT EXISTS kc_progress (
    student_id         TEXT NOT NULL REFERENCES students(student_id) ON DELETE CASCADE,
    goal_id            INTEGER NOT NULL,
    kc_code            TEXT NOT NULL,
    mastery_percentage REAL NOT NULL CHECK (mastery_percentage BETWEEN 0.0 AND 100.0),
    last_updated       TEXT NOT NULL,
    PRIMARY KEY (student_id, goal_id, kc_code),
    FOREIGN KEY (goal_id, kc_code) REFERENCES knowledge_components(goal_id, kc_code)
);

-- Profile snapshots are strictly append-only.
-- No UPDATE is ever issued against this table.
CREATE TABLE IF NOT EXISTS student_profiles (
    profile_id TEXT PRIMARY KEY,
    student_id TEXT NOT NULL REFERENCES students(student_id) ON DELETE CASCADE,
    as_of      TEXT NOT NULL,   -- fixed-width RFC 3339 UTC; sorts lexically
    narrative  TEXT NOT NULL,
    traits     TEXT NOT NULL DEFAULT '{}',
    UNIQUE (student_id, as_of)
);

-- Memories are upserted in place per key. Expired rows linger until swept.
CREATE TABLE IF NOT EXISTS student_memories (
    student_id TEXT NOT NULL REFERENCES students(student_id) ON DELETE CASCADE,
    memory_key TEXT NOT NULL,
    scope      TEXT NOT NULL,   -- 'personal_fact' | 'game_state' | 'strategy_log'
    value      TEXT NOT NULL,
    expires_at TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (student_id, memory_key)
);

-- Sessions are immutable once written.
CREATE TABLE IF NOT EXISTS sessions (
    session_id       TEXT PRIMARY KEY,
    student_id       TEXT NOT NULL REFERENCES students(student_id) ON DELETE CASCADE,
    call_id          TEXT UNIQUE,
    started_at       TEXT NOT NULL,
    duration_seconds INTEGER,
    transcript       TEXT NOT NULL,
    summary          TEXT,
    recorded_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS profiles_student_idx ON student_profiles(student_id, as_of);
CREATE INDEX IF NOT EXISTS memories_expiry_idx  ON student_memories(expires_at);
CREATE INDEX IF NOT EXISTS sessions_student_idx ON sessions(student_id, started_at);

PRAGMA user_version = 1;
";
