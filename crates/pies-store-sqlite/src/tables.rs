//! Table descriptors and the generic data-access helpers built over them.
//!
//! One [`Table`] constant per entity plus free functions for the shared
//! access patterns (find by key, insert-or-ignore, delete by predicate),
//! composed rather than inherited. Typed row structs cover the fact tables
//! whose rows are read back wholesale (events, records, linkages).

use chrono::Utc;
use rusqlite::{params_from_iter, types::Value, OptionalExtension as _, Transaction};
use uuid::Uuid;

use crate::Result;

/// Audit actor recorded on every row this service writes.
pub const AUDIT_USER: &str = "pies-api";

// ─── Descriptors ─────────────────────────────────────────────────────────────

/// Identity of one relational table: its name and surrogate/natural id
/// column. Natural keys are supplied per call site.
pub struct Table {
  pub name:      &'static str,
  pub id_column: &'static str,
}

pub const SYSTEM: Table =
  Table { name: "pies_system", id_column: "system_id" };
pub const VERSION: Table =
  Table { name: "pies_version", id_column: "version_id" };
pub const CODING: Table =
  Table { name: "pies_coding", id_column: "coding_id" };
pub const RECORD_KIND: Table =
  Table { name: "pies_record_kind", id_column: "record_kind_id" };
pub const SYSTEM_RECORD: Table =
  Table { name: "pies_system_record", id_column: "system_record_id" };
pub const TRANSACTION: Table =
  Table { name: "pies_transaction", id_column: "transaction_id" };
pub const PROCESS_EVENT: Table =
  Table { name: "pies_process_event", id_column: "process_event_id" };
pub const ON_HOLD_EVENT: Table =
  Table { name: "pies_on_hold_event", id_column: "on_hold_event_id" };
pub const RECORD_LINKAGE: Table =
  Table { name: "pies_record_linkage", id_column: "record_linkage_id" };

/// Column/value pairs for a filter or insert payload.
pub type ColumnValues<'a> = &'a [(&'static str, Value)];

pub fn text(s: impl Into<String>) -> Value {
  Value::Text(s.into())
}

pub fn now_utc() -> String {
  Utc::now().to_rfc3339()
}

pub fn new_id() -> String {
  Uuid::new_v4().hyphenated().to_string()
}

// ─── Generic access ──────────────────────────────────────────────────────────

fn where_clause(key: ColumnValues) -> String {
  key
    .iter()
    .map(|(col, _)| format!("{col} = ?"))
    .collect::<Vec<_>>()
    .join(" AND ")
}

fn params(key: ColumnValues) -> impl Iterator<Item = &Value> {
  key.iter().map(|(_, v)| v)
}

/// Find the id of the row matching `key`, if any.
pub fn find_id(
  tx: &Transaction<'_>,
  table: &Table,
  key: ColumnValues,
) -> Result<Option<String>> {
  let sql = format!(
    "SELECT {} FROM {} WHERE {}",
    table.id_column,
    table.name,
    where_clause(key)
  );
  let id = tx
    .query_row(&sql, params_from_iter(params(key)), |row| row.get(0))
    .optional()?;
  Ok(id)
}

/// Insert with on-conflict-do-nothing against the table's declared unique
/// constraints. Returns the number of rows actually inserted (0 on conflict).
pub fn insert_or_ignore(
  tx: &Transaction<'_>,
  table: &Table,
  values: ColumnValues,
) -> Result<usize> {
  let columns: Vec<&str> = values.iter().map(|(col, _)| *col).collect();
  let placeholders = vec!["?"; values.len()].join(", ");
  let sql = format!(
    "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
    table.name,
    columns.join(", "),
    placeholders
  );
  let changed = tx.execute(&sql, params_from_iter(params(values)))?;
  Ok(changed)
}

/// Delete all rows matching `key`; returns the number deleted.
pub fn delete_where(
  tx: &Transaction<'_>,
  table: &Table,
  key: ColumnValues,
) -> Result<usize> {
  let sql =
    format!("DELETE FROM {} WHERE {}", table.name, where_clause(key));
  let deleted = tx.execute(&sql, params_from_iter(params(key)))?;
  Ok(deleted)
}

// ─── System records ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SystemRecordRow {
  pub system_record_id: String,
  pub system_id:        String,
  pub record_id:        String,
  pub record_kind_id:   String,
}

const SYSTEM_RECORD_COLS: &str =
  "system_record_id, system_id, record_id, record_kind_id";

fn system_record_from_row(
  row: &rusqlite::Row<'_>,
) -> rusqlite::Result<SystemRecordRow> {
  Ok(SystemRecordRow {
    system_record_id: row.get(0)?,
    system_id:        row.get(1)?,
    record_id:        row.get(2)?,
    record_kind_id:   row.get(3)?,
  })
}

pub fn find_system_record(
  tx: &Transaction<'_>,
  system_id: &str,
  record_id: &str,
) -> Result<Option<SystemRecordRow>> {
  let sql = format!(
    "SELECT {SYSTEM_RECORD_COLS} FROM pies_system_record
     WHERE system_id = ?1 AND record_id = ?2"
  );
  let row = tx
    .query_row(&sql, rusqlite::params![system_id, record_id], |row| {
      system_record_from_row(row)
    })
    .optional()?;
  Ok(row)
}

/// All system records sharing a record id, across source systems.
pub fn find_system_records_by_record_id(
  tx: &Transaction<'_>,
  record_id: &str,
) -> Result<Vec<SystemRecordRow>> {
  let sql = format!(
    "SELECT {SYSTEM_RECORD_COLS} FROM pies_system_record
     WHERE record_id = ?1 ORDER BY system_id"
  );
  let mut stmt = tx.prepare(&sql)?;
  let rows = stmt
    .query_map(rusqlite::params![record_id], system_record_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

pub fn system_record_by_id(
  tx: &Transaction<'_>,
  system_record_id: &str,
) -> Result<Option<SystemRecordRow>> {
  let sql = format!(
    "SELECT {SYSTEM_RECORD_COLS} FROM pies_system_record
     WHERE system_record_id = ?1"
  );
  let row = tx
    .query_row(&sql, rusqlite::params![system_record_id], |row| {
      system_record_from_row(row)
    })
    .optional()?;
  Ok(row)
}

/// Resolve a record kind surrogate back to its (kind, version) natural key.
pub fn record_kind_parts(
  tx: &Transaction<'_>,
  record_kind_id: &str,
) -> Result<Option<(String, String)>> {
  let parts = tx
    .query_row(
      "SELECT kind, version_id FROM pies_record_kind WHERE record_kind_id = ?1",
      rusqlite::params![record_kind_id],
      |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?;
  Ok(parts)
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// One persisted event row, as read back for diffing.
#[derive(Debug, Clone)]
pub struct EventRow {
  pub event_id:           String,
  pub coding_id:          String,
  pub status:             Option<String>,
  pub status_code:        Option<String>,
  pub status_description: Option<String>,
  pub start_date:         String,
  pub start_time:         Option<String>,
  pub end_date:           Option<String>,
  pub end_time:           Option<String>,
}

/// An incoming event row, minted against a reconciled coding id but not yet
/// persisted (no surrogate id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEventRow {
  pub coding_id:          String,
  pub status:             Option<String>,
  pub status_code:        Option<String>,
  pub status_description: Option<String>,
  pub start_date:         String,
  pub start_time:         Option<String>,
  pub end_date:           Option<String>,
  pub end_time:           Option<String>,
}

/// An event row joined with its coding's natural key, for reassembly.
#[derive(Debug, Clone)]
pub struct EventWithCoding {
  pub row:         EventRow,
  pub code:        String,
  pub code_system: String,
}

const EVENT_COLS: &str = "coding_id, status, status_code, status_description,
                          start_date, start_time, end_date, end_time";

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
  Ok(EventRow {
    event_id:           row.get(0)?,
    coding_id:          row.get(1)?,
    status:             row.get(2)?,
    status_code:        row.get(3)?,
    status_description: row.get(4)?,
    start_date:         row.get(5)?,
    start_time:         row.get(6)?,
    end_date:           row.get(7)?,
    end_time:           row.get(8)?,
  })
}

pub fn load_events(
  tx: &Transaction<'_>,
  table: &Table,
  system_record_id: &str,
) -> Result<Vec<EventRow>> {
  let sql = format!(
    "SELECT {id}, {EVENT_COLS} FROM {t} WHERE system_record_id = ?1",
    id = table.id_column,
    t = table.name,
  );
  let mut stmt = tx.prepare(&sql)?;
  let rows = stmt
    .query_map(rusqlite::params![system_record_id], event_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

/// Load events joined with their codings, ordered for stable read output.
pub fn load_events_with_coding(
  tx: &Transaction<'_>,
  table: &Table,
  system_record_id: &str,
) -> Result<Vec<EventWithCoding>> {
  let sql = format!(
    "SELECT e.{id}, e.{EVENT_COLS_Q}, c.code, c.code_system
     FROM {t} e
     JOIN pies_coding c ON c.coding_id = e.coding_id
     WHERE e.system_record_id = ?1
     ORDER BY e.start_date, e.start_time, c.code",
    id = table.id_column,
    t = table.name,
    EVENT_COLS_Q = "coding_id, e.status, e.status_code, e.status_description,
                    e.start_date, e.start_time, e.end_date, e.end_time",
  );
  let mut stmt = tx.prepare(&sql)?;
  let rows = stmt
    .query_map(rusqlite::params![system_record_id], |row| {
      Ok(EventWithCoding {
        row:         event_from_row(row)?,
        code:        row.get(9)?,
        code_system: row.get(10)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

pub fn insert_event(
  tx: &Transaction<'_>,
  table: &Table,
  system_record_id: &str,
  transaction_id: &str,
  row: &NewEventRow,
) -> Result<()> {
  let sql = format!(
    "INSERT INTO {t} ({id}, system_record_id, transaction_id, {EVENT_COLS},
                      created_at, created_by)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    t = table.name,
    id = table.id_column,
  );
  tx.execute(&sql, rusqlite::params![
    new_id(),
    system_record_id,
    transaction_id,
    row.coding_id,
    row.status,
    row.status_code,
    row.status_description,
    row.start_date,
    row.start_time,
    row.end_date,
    row.end_time,
    now_utc(),
    AUDIT_USER,
  ])?;
  Ok(())
}

pub fn delete_events(
  tx: &Transaction<'_>,
  table: &Table,
  event_ids: &[String],
) -> Result<()> {
  let sql = format!(
    "DELETE FROM {} WHERE {} = ?1",
    table.name, table.id_column
  );
  let mut stmt = tx.prepare(&sql)?;
  for id in event_ids {
    stmt.execute(rusqlite::params![id])?;
  }
  Ok(())
}

// ─── Linkages ────────────────────────────────────────────────────────────────

/// Insert a linkage edge; a conflict on the undirected uniqueness index
/// means the assertion already holds and is reported as `false`, not an
/// error.
pub fn insert_linkage(
  tx: &Transaction<'_>,
  transaction_id: &str,
  system_record_id: &str,
  linked_system_record_id: &str,
) -> Result<bool> {
  let changed = insert_or_ignore(tx, &RECORD_LINKAGE, &[
    ("record_linkage_id", text(new_id())),
    ("transaction_id", text(transaction_id)),
    ("system_record_id", text(system_record_id)),
    ("linked_system_record_id", text(linked_system_record_id)),
    ("created_at", text(now_utc())),
    ("created_by", text(AUDIT_USER)),
  ])?;
  Ok(changed > 0)
}

/// Remove the edge between two records, whichever direction it is stored in.
pub fn delete_linkage(
  tx: &Transaction<'_>,
  a: &str,
  b: &str,
) -> Result<usize> {
  let deleted = tx.execute(
    "DELETE FROM pies_record_linkage
     WHERE (system_record_id = ?1 AND linked_system_record_id = ?2)
        OR (system_record_id = ?2 AND linked_system_record_id = ?1)",
    rusqlite::params![a, b],
  )?;
  Ok(deleted)
}

/// Ids of all records directly linked to the given one, either direction.
pub fn linked_record_ids(
  tx: &Transaction<'_>,
  system_record_id: &str,
) -> Result<Vec<String>> {
  let mut stmt = tx.prepare(
    "SELECT CASE WHEN system_record_id = ?1
                 THEN linked_system_record_id
                 ELSE system_record_id END
     FROM pies_record_linkage
     WHERE system_record_id = ?1 OR linked_system_record_id = ?1
     ORDER BY 1",
  )?;
  let ids = stmt
    .query_map(rusqlite::params![system_record_id], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(ids)
}
