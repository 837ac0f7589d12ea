//! Find-or-create reconciliation for reference data.
//!
//! The idempotent lookup-then-upsert pattern: look the row up by its natural
//! key; on a miss, insert with on-conflict-do-nothing and look it up again.
//! A concurrent writer winning the race is indistinguishable from a hit —
//! callers always receive the surviving row's id. At-most-one logical row
//! per unique key, regardless of concurrent callers.

use rusqlite::Transaction;

use crate::{
  cache::{CacheKey, StagedCache},
  tables::{self, ColumnValues, Table},
  Error, Result,
};

/// Resolve `key` to an id in `table`, inserting `insert` (which must contain
/// the id column) when absent.
pub fn find_or_create(
  tx: &Transaction<'_>,
  table: &Table,
  key: ColumnValues,
  insert: ColumnValues,
) -> Result<String> {
  if let Some(id) = tables::find_id(tx, table, key)? {
    return Ok(id);
  }
  tables::insert_or_ignore(tx, table, insert)?;
  // Re-select rather than trusting the insert: on conflict the pre-existing
  // row, not ours, is the one to return.
  tables::find_id(tx, table, key)?
    .ok_or(Error::UpsertReturnedNothing { table: table.name })
}

/// Cache-wrapped variant for the low-cardinality reference entities. The
/// resolved id is staged, not published — see [`crate::cache::StagedCache`].
pub fn find_or_create_cached(
  tx: &Transaction<'_>,
  cache: &StagedCache,
  table: &Table,
  key: ColumnValues,
  insert: ColumnValues,
) -> Result<String> {
  let cache_key = CacheKey::new(table.name, key);
  if let Some(id) = cache.get(&cache_key) {
    return Ok(id);
  }
  let id = find_or_create(tx, table, key, insert)?;
  cache.stage(cache_key, id.clone());
  Ok(id)
}
