//! SQL schema for the PIES SQLite store.
//!
//! Executed once at connection startup. SQLite has no named schemas, so the
//! dedicated namespace is a `pies_` table prefix. Reference tables carry the
//! standard audit columns; reference rows are never updated or deleted, so
//! only the creation pair is populated there.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS pies_system (
    system_id  TEXT PRIMARY KEY,   -- natural key, e.g. 'ITSM-5917'
    created_at TEXT NOT NULL,
    created_by TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pies_version (
    version_id TEXT PRIMARY KEY,   -- natural key, e.g. '0.1.0'
    created_at TEXT NOT NULL,
    created_by TEXT NOT NULL
);

-- Controlled-vocabulary terms. Immutable; never deleted, since historical
-- events may reference them after a record's events are pruned.
CREATE TABLE IF NOT EXISTS pies_coding (
    coding_id   TEXT PRIMARY KEY,
    code        TEXT NOT NULL,
    code_system TEXT NOT NULL,
    version_id  TEXT NOT NULL REFERENCES pies_version(version_id),
    created_at  TEXT NOT NULL,
    created_by  TEXT NOT NULL,
    UNIQUE (code, code_system, version_id)
);

CREATE TABLE IF NOT EXISTS pies_record_kind (
    record_kind_id TEXT PRIMARY KEY,
    kind           TEXT NOT NULL,
    version_id     TEXT NOT NULL REFERENCES pies_version(version_id),
    created_at     TEXT NOT NULL,
    created_by     TEXT NOT NULL,
    UNIQUE (version_id, kind)
);

CREATE TABLE IF NOT EXISTS pies_system_record (
    system_record_id TEXT PRIMARY KEY,
    system_id        TEXT NOT NULL REFERENCES pies_system(system_id),
    record_id        TEXT NOT NULL,
    record_kind_id   TEXT NOT NULL REFERENCES pies_record_kind(record_kind_id),
    created_at       TEXT NOT NULL,
    created_by       TEXT NOT NULL,
    updated_at       TEXT,
    updated_by       TEXT,
    UNIQUE (system_id, record_id)
);

-- Idempotency guard: one row per accepted write transaction id.
CREATE TABLE IF NOT EXISTS pies_transaction (
    transaction_id TEXT PRIMARY KEY,
    created_at     TEXT NOT NULL,
    created_by     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pies_process_event (
    process_event_id   TEXT PRIMARY KEY,
    system_record_id   TEXT NOT NULL
        REFERENCES pies_system_record(system_record_id) ON DELETE CASCADE,
    transaction_id     TEXT NOT NULL REFERENCES pies_transaction(transaction_id),
    coding_id          TEXT NOT NULL REFERENCES pies_coding(coding_id),
    status             TEXT,
    status_code        TEXT,
    status_description TEXT,
    start_date         TEXT NOT NULL,  -- YYYY-MM-DD
    start_time         TEXT,           -- HH:MM:SS[.mmm], UTC; NULL = all-day
    end_date           TEXT,
    end_time           TEXT,
    created_at         TEXT NOT NULL,
    created_by         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pies_on_hold_event (
    on_hold_event_id   TEXT PRIMARY KEY,
    system_record_id   TEXT NOT NULL
        REFERENCES pies_system_record(system_record_id) ON DELETE CASCADE,
    transaction_id     TEXT NOT NULL REFERENCES pies_transaction(transaction_id),
    coding_id          TEXT NOT NULL REFERENCES pies_coding(coding_id),
    status             TEXT,
    status_code        TEXT,
    status_description TEXT,
    start_date         TEXT NOT NULL,
    start_time         TEXT,
    end_date           TEXT,
    end_time           TEXT,
    created_at         TEXT NOT NULL,
    created_by         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pies_record_linkage (
    record_linkage_id       TEXT PRIMARY KEY,
    transaction_id          TEXT NOT NULL REFERENCES pies_transaction(transaction_id),
    system_record_id        TEXT NOT NULL
        REFERENCES pies_system_record(system_record_id) ON DELETE CASCADE,
    linked_system_record_id TEXT NOT NULL
        REFERENCES pies_system_record(system_record_id) ON DELETE CASCADE,
    created_at              TEXT NOT NULL,
    created_by              TEXT NOT NULL,
    UNIQUE (system_record_id, linked_system_record_id),
    CHECK  (system_record_id != linked_system_record_id)
);

-- A linkage is logically undirected: inserting A->B when B->A exists must
-- conflict. min()/max() canonicalise the pair regardless of direction.
CREATE UNIQUE INDEX IF NOT EXISTS pies_record_linkage_undirected_idx
    ON pies_record_linkage (
        min(system_record_id, linked_system_record_id),
        max(system_record_id, linked_system_record_id)
    );

CREATE INDEX IF NOT EXISTS pies_process_event_record_idx
    ON pies_process_event(system_record_id);
CREATE INDEX IF NOT EXISTS pies_on_hold_event_record_idx
    ON pies_on_hold_event(system_record_id);
CREATE INDEX IF NOT EXISTS pies_system_record_record_idx
    ON pies_system_record(record_id);

PRAGMA user_version = 1;
";
