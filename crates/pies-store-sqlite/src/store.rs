//! The [`SqliteStore`] orchestrator: one method per store operation, each
//! running as a single retried transaction.
//!
//! Write flow for a process event set: validate and disassemble the document
//! outside the transaction, then inside it record the transaction id
//! (idempotency guard), reconcile reference data to surrogate ids, diff the
//! incoming event rows against storage, and apply the minimal delete/insert
//! sets. On any error the whole transaction rolls back, the idempotency row
//! included, so a failed write can be retried with the same transaction id.

use std::time::Duration;

use pies_core::{
  document::{
    self, assemble_event, DisassembledEvent, ProcessEventSet,
    RecordLinkageDoc, RecordLinkageView,
  },
  store::{LinkageDeleteRequest, LinkageQuery, RecordQuery, RecordStore},
};
use rusqlite::Transaction;

use crate::{
  cache::{RefCache, StagedCache},
  diff::diff_events,
  reconcile::{find_or_create, find_or_create_cached},
  retry::{AccessMode, RetryPolicy},
  schema,
  tables::{
    self, new_id, now_utc, text, NewEventRow, SystemRecordRow, AUDIT_USER,
  },
  Error, Result,
};

/// Tunables applied when opening a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
  pub cache_capacity: usize,
  pub cache_ttl:      Duration,
  pub retry:          RetryPolicy,
}

impl Default for StoreOptions {
  fn default() -> Self {
    StoreOptions {
      cache_capacity: 256,
      cache_ttl:      Duration::from_secs(300),
      retry:          RetryPolicy::default(),
    }
  }
}

/// SQLite-backed [`RecordStore`]. Cloning shares the underlying connection
/// and reference cache.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  cache: RefCache,
  retry: RetryPolicy,
}

impl SqliteStore {
  /// Open (creating if needed) the database at `path` and apply the schema.
  pub async fn open(
    path: impl AsRef<std::path::Path>,
    options: StoreOptions,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, options).await
  }

  /// In-memory store, used by tests.
  pub async fn open_in_memory(options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, options).await
  }

  async fn init(
    conn: tokio_rusqlite::Connection,
    options: StoreOptions,
  ) -> Result<Self> {
    conn
      .call(|conn| conn.execute_batch(schema::SCHEMA).map_err(Into::into))
      .await?;
    Ok(SqliteStore {
      conn,
      cache: RefCache::new(options.cache_capacity, options.cache_ttl),
      retry: options.retry,
    })
  }

  #[cfg(test)]
  pub(crate) fn connection(&self) -> &tokio_rusqlite::Connection {
    &self.conn
  }

  async fn read<T, F>(&self, work: F) -> Result<T, pies_core::Error>
  where
    F: Fn(&Transaction<'_>, &StagedCache) -> Result<T>
      + Send
      + Sync
      + 'static,
    T: Send + 'static,
  {
    self
      .retry
      .run(&self.conn, &self.cache, AccessMode::ReadOnly, work)
      .await
      .map_err(Error::surface)
  }

  async fn write<T, F>(&self, work: F) -> Result<T, pies_core::Error>
  where
    F: Fn(&Transaction<'_>, &StagedCache) -> Result<T>
      + Send
      + Sync
      + 'static,
    T: Send + 'static,
  {
    self
      .retry
      .run(&self.conn, &self.cache, AccessMode::ReadWrite, work)
      .await
      .map_err(Error::surface)
  }
}

// ─── Transaction-scoped helpers ──────────────────────────────────────────────

/// Record the write's transaction id, failing with a conflict when it was
/// already processed. Rolls back with the transaction, so only committed
/// writes burn their id.
fn record_transaction(
  tx: &Transaction<'_>,
  transaction_id: &str,
) -> Result<()> {
  let changed = tables::insert_or_ignore(tx, &tables::TRANSACTION, &[
    ("transaction_id", text(transaction_id)),
    ("created_at", text(now_utc())),
    ("created_by", text(AUDIT_USER)),
  ])?;
  if changed == 0 {
    return Err(Error::Core(pies_core::Error::Conflict(format!(
      "transaction {transaction_id} already processed"
    ))));
  }
  Ok(())
}

fn reconcile_version(
  tx: &Transaction<'_>,
  staged: &StagedCache,
  version: &str,
) -> Result<String> {
  find_or_create_cached(
    tx,
    staged,
    &tables::VERSION,
    &[("version_id", text(version))],
    &[
      ("version_id", text(version)),
      ("created_at", text(now_utc())),
      ("created_by", text(AUDIT_USER)),
    ],
  )
}

fn reconcile_record_kind(
  tx: &Transaction<'_>,
  staged: &StagedCache,
  kind: &str,
  version_id: &str,
) -> Result<String> {
  find_or_create_cached(
    tx,
    staged,
    &tables::RECORD_KIND,
    &[("kind", text(kind)), ("version_id", text(version_id))],
    &[
      ("record_kind_id", text(new_id())),
      ("kind", text(kind)),
      ("version_id", text(version_id)),
      ("created_at", text(now_utc())),
      ("created_by", text(AUDIT_USER)),
    ],
  )
}

/// Find-or-create the system and its record. The record kind is fixed at
/// creation; a later write naming a different kind for the same record does
/// not change it.
fn reconcile_system_record(
  tx: &Transaction<'_>,
  staged: &StagedCache,
  system_id: &str,
  record_id: &str,
  kind: &str,
  version_id: &str,
) -> Result<String> {
  find_or_create_cached(
    tx,
    staged,
    &tables::SYSTEM,
    &[("system_id", text(system_id))],
    &[
      ("system_id", text(system_id)),
      ("created_at", text(now_utc())),
      ("created_by", text(AUDIT_USER)),
    ],
  )?;
  let record_kind_id = reconcile_record_kind(tx, staged, kind, version_id)?;
  // Uncached: system records are high-cardinality and rarely re-written.
  find_or_create(
    tx,
    &tables::SYSTEM_RECORD,
    &[("system_id", text(system_id)), ("record_id", text(record_id))],
    &[
      ("system_record_id", text(new_id())),
      ("system_id", text(system_id)),
      ("record_id", text(record_id)),
      ("record_kind_id", text(record_kind_id.as_str())),
      ("created_at", text(now_utc())),
      ("created_by", text(AUDIT_USER)),
    ],
  )
}

fn validate_query_system_id(
  system_id: Option<&str>,
) -> Result<(), pies_core::Error> {
  match system_id {
    Some(sys) => document::validate_system_id(sys),
    None => Ok(()),
  }
}

/// Resolve a query to exactly one system record. Without a `system_id` the
/// record id must be unambiguous across systems.
fn resolve_record(
  tx: &Transaction<'_>,
  record_id: &str,
  system_id: Option<&str>,
) -> Result<SystemRecordRow> {
  match system_id {
    Some(sys) => {
      tables::find_system_record(tx, sys, record_id)?.ok_or_else(|| {
        Error::Core(pies_core::Error::NotFound(format!(
          "record {record_id} in system {sys}"
        )))
      })
    }
    None => {
      let mut rows = tables::find_system_records_by_record_id(tx, record_id)?;
      match rows.len() {
        0 => Err(Error::Core(pies_core::Error::NotFound(format!(
          "record {record_id}"
        )))),
        1 => Ok(rows.remove(0)),
        n => Err(Error::Core(pies_core::Error::Conflict(format!(
          "record id {record_id} exists in {n} systems, supply system_id"
        )))),
      }
    }
  }
}

/// Bring one event table in line with the submitted set: reconcile codings,
/// diff against storage, apply deletes then inserts. Returns whether any row
/// changed.
fn sync_events(
  tx: &Transaction<'_>,
  staged: &StagedCache,
  table: &tables::Table,
  system_record_id: &str,
  transaction_id: &str,
  version_id: &str,
  events: &[DisassembledEvent],
) -> Result<bool> {
  let stored = tables::load_events(tx, table, system_record_id)?;

  let mut incoming = Vec::with_capacity(events.len());
  for ev in events {
    let coding_id = find_or_create_cached(
      tx,
      staged,
      &tables::CODING,
      &[
        ("code", text(ev.code.as_str())),
        ("code_system", text(ev.code_system.as_str())),
        ("version_id", text(version_id)),
      ],
      &[
        ("coding_id", text(new_id())),
        ("code", text(ev.code.as_str())),
        ("code_system", text(ev.code_system.as_str())),
        ("version_id", text(version_id)),
        ("created_at", text(now_utc())),
        ("created_by", text(AUDIT_USER)),
      ],
    )?;
    incoming.push(NewEventRow {
      coding_id,
      status: ev.status.clone(),
      status_code: ev.status_code.clone(),
      status_description: ev.status_description.clone(),
      start_date: ev.start_date.clone(),
      start_time: ev.start_time.clone(),
      end_date: ev.end_date.clone(),
      end_time: ev.end_time.clone(),
    });
  }

  let diff = diff_events(&stored, &incoming);
  if diff.is_empty() {
    return Ok(false);
  }
  tracing::debug!(
    table = table.name,
    deleted = diff.delete.len(),
    inserted = diff.insert.len(),
    "event set reconciled"
  );
  tables::delete_events(tx, table, &diff.delete)?;
  for row in &diff.insert {
    tables::insert_event(tx, table, system_record_id, transaction_id, row)?;
  }
  Ok(true)
}

fn touch_record(
  tx: &Transaction<'_>,
  system_record_id: &str,
) -> Result<()> {
  tx.execute(
    "UPDATE pies_system_record SET updated_at = ?1, updated_by = ?2
     WHERE system_record_id = ?3",
    rusqlite::params![now_utc(), AUDIT_USER, system_record_id],
  )?;
  Ok(())
}

fn assemble_all(
  rows: Vec<tables::EventWithCoding>,
) -> Result<Vec<document::Event>> {
  rows
    .into_iter()
    .map(|ev| {
      assemble_event(
        ev.code,
        ev.code_system,
        ev.row.status,
        ev.row.status_code,
        ev.row.status_description,
        &ev.row.start_date,
        ev.row.start_time.as_deref(),
        ev.row.end_date.as_deref(),
        ev.row.end_time.as_deref(),
      )
      .map_err(Error::Core)
    })
    .collect()
}

fn linkage_view(
  tx: &Transaction<'_>,
  system_record_id: &str,
) -> Result<RecordLinkageView> {
  let record =
    tables::system_record_by_id(tx, system_record_id)?
      .ok_or(Error::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;
  let (kind, _version) =
    tables::record_kind_parts(tx, &record.record_kind_id)?
      .ok_or(Error::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;
  Ok(RecordLinkageView {
    system_id: record.system_id,
    record_id: record.record_id,
    kind,
  })
}

// ─── Trait impl ──────────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  async fn replace_process_events(
    &self,
    doc: ProcessEventSet,
  ) -> Result<(), pies_core::Error> {
    document::validate_system_id(&doc.system_id)?;
    let transaction_id =
      document::require_transaction_id(doc.transaction_id)?;

    let process: Vec<DisassembledEvent> = doc
      .process_event
      .iter()
      .map(document::Event::disassemble)
      .collect::<Result<_, _>>()?;
    let on_hold: Vec<DisassembledEvent> = doc
      .on_hold_event
      .iter()
      .map(document::Event::disassemble)
      .collect::<Result<_, _>>()?;

    let txid = transaction_id.hyphenated().to_string();
    let ProcessEventSet { version, kind, system_id, record_id, .. } = doc;

    self
      .write(move |tx, staged| {
        record_transaction(tx, &txid)?;
        let version_id = reconcile_version(tx, staged, &version)?;
        let system_record_id = reconcile_system_record(
          tx, staged, &system_id, &record_id, &kind, &version_id,
        )?;

        let changed_process = sync_events(
          tx,
          staged,
          &tables::PROCESS_EVENT,
          &system_record_id,
          &txid,
          &version_id,
          &process,
        )?;
        let changed_on_hold = sync_events(
          tx,
          staged,
          &tables::ON_HOLD_EVENT,
          &system_record_id,
          &txid,
          &version_id,
          &on_hold,
        )?;

        if changed_process || changed_on_hold {
          touch_record(tx, &system_record_id)?;
        }
        Ok(())
      })
      .await
  }

  async fn find_process_events(
    &self,
    query: RecordQuery,
  ) -> Result<ProcessEventSet, pies_core::Error> {
    let RecordQuery { record_id, system_id } = query;
    validate_query_system_id(system_id.as_deref())?;

    self
      .read(move |tx, _staged| {
        let record = resolve_record(tx, &record_id, system_id.as_deref())?;
        let (kind, version) =
          tables::record_kind_parts(tx, &record.record_kind_id)?
            .ok_or(Error::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;

        let process = tables::load_events_with_coding(
          tx,
          &tables::PROCESS_EVENT,
          &record.system_record_id,
        )?;
        let on_hold = tables::load_events_with_coding(
          tx,
          &tables::ON_HOLD_EVENT,
          &record.system_record_id,
        )?;
        if process.is_empty() && on_hold.is_empty() {
          // A record without events has no wire representation.
          return Err(Error::Core(pies_core::Error::NotFound(format!(
            "record {} has no events",
            record.record_id
          ))));
        }

        Ok(ProcessEventSet {
          transaction_id: None,
          version,
          kind,
          system_id: record.system_id,
          record_id: record.record_id,
          process_event: assemble_all(process)?,
          on_hold_event: assemble_all(on_hold)?,
        })
      })
      .await
  }

  async fn prune_process_events(
    &self,
    query: RecordQuery,
  ) -> Result<(), pies_core::Error> {
    let RecordQuery { record_id, system_id } = query;
    validate_query_system_id(system_id.as_deref())?;

    self
      .write(move |tx, _staged| {
        let record = resolve_record(tx, &record_id, system_id.as_deref())?;
        let key =
          [("system_record_id", text(record.system_record_id.as_str()))];
        tables::delete_where(tx, &tables::PROCESS_EVENT, &key)?;
        tables::delete_where(tx, &tables::ON_HOLD_EVENT, &key)?;
        touch_record(tx, &record.system_record_id)?;
        Ok(())
      })
      .await
  }

  async fn delete_system_record(
    &self,
    query: RecordQuery,
  ) -> Result<(), pies_core::Error> {
    let RecordQuery { record_id, system_id } = query;
    validate_query_system_id(system_id.as_deref())?;

    self
      .write(move |tx, _staged| {
        let record = resolve_record(tx, &record_id, system_id.as_deref())?;
        // Events and linkages go with it via cascade.
        tables::delete_where(tx, &tables::SYSTEM_RECORD, &[(
          "system_record_id",
          text(record.system_record_id.as_str()),
        )])?;
        Ok(())
      })
      .await
  }

  async fn create_record_linkage(
    &self,
    doc: RecordLinkageDoc,
  ) -> Result<(), pies_core::Error> {
    document::validate_system_id(&doc.system_id)?;
    document::validate_system_id(&doc.linked_system_id)?;
    let transaction_id =
      document::require_transaction_id(doc.transaction_id)?;
    if doc.system_id == doc.linked_system_id
      && doc.record_id == doc.linked_record_id
    {
      return Err(pies_core::Error::Validation(
        "a record cannot be linked to itself".into(),
      ));
    }

    let txid = transaction_id.hyphenated().to_string();
    let linked_kind = doc.linked_kind.clone().unwrap_or_else(|| doc.kind.clone());
    let RecordLinkageDoc {
      version,
      kind,
      system_id,
      record_id,
      linked_system_id,
      linked_record_id,
      ..
    } = doc;

    self
      .write(move |tx, staged| {
        record_transaction(tx, &txid)?;
        let version_id = reconcile_version(tx, staged, &version)?;
        let a = reconcile_system_record(
          tx, staged, &system_id, &record_id, &kind, &version_id,
        )?;
        let b = reconcile_system_record(
          tx,
          staged,
          &linked_system_id,
          &linked_record_id,
          &linked_kind,
          &version_id,
        )?;
        // Re-asserting an existing edge (either direction) is a no-op.
        tables::insert_linkage(tx, &txid, &a, &b)?;
        Ok(())
      })
      .await
  }

  async fn delete_record_linkage(
    &self,
    request: LinkageDeleteRequest,
  ) -> Result<(), pies_core::Error> {
    let LinkageDeleteRequest {
      record_id,
      system_id,
      linked_record_id,
      linked_system_id,
    } = request;
    validate_query_system_id(system_id.as_deref())?;
    validate_query_system_id(linked_system_id.as_deref())?;

    self
      .write(move |tx, _staged| {
        let a = resolve_record(tx, &record_id, system_id.as_deref())?;
        let b =
          resolve_record(tx, &linked_record_id, linked_system_id.as_deref())?;
        let deleted = tables::delete_linkage(
          tx,
          &a.system_record_id,
          &b.system_record_id,
        )?;
        if deleted == 0 {
          return Err(Error::Core(pies_core::Error::NotFound(format!(
            "no linkage between {} and {}",
            a.record_id, b.record_id
          ))));
        }
        Ok(())
      })
      .await
  }

  async fn find_record_linkages(
    &self,
    query: LinkageQuery,
  ) -> Result<Vec<RecordLinkageView>, pies_core::Error> {
    let LinkageQuery { record_id, system_id, depth: _depth } = query;
    validate_query_system_id(system_id.as_deref())?;

    self
      .read(move |tx, _staged| {
        let record = resolve_record(tx, &record_id, system_id.as_deref())?;
        tables::linked_record_ids(tx, &record.system_record_id)?
          .iter()
          .map(|id| linkage_view(tx, id))
          .collect()
      })
      .await
  }
}
