//! Transaction retry wrapper.
//!
//! Runs a unit of work inside one SQLite transaction, retrying busy/locked
//! failures with exponential backoff. This is the only place retries occur;
//! every store operation goes through [`RetryPolicy::run`] rather than
//! carrying its own retry logic.

use std::{sync::Arc, time::Duration};

use rusqlite::TransactionBehavior;

use crate::{
  cache::{RefCache, StagedCache},
  Result,
};

/// Transaction access mode.
///
/// `ReadWrite` takes the write lock up front (`BEGIN IMMEDIATE`), the SQLite
/// analogue of a strict isolation level — SQLite transactions are themselves
/// serializable. `ReadOnly` defers lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
  ReadOnly,
  ReadWrite,
}

impl AccessMode {
  fn behavior(self) -> TransactionBehavior {
    match self {
      AccessMode::ReadOnly => TransactionBehavior::Deferred,
      AccessMode::ReadWrite => TransactionBehavior::Immediate,
    }
  }
}

/// Retry budget for transient (busy/locked) store failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  /// Guarded retries after the first attempt; one more unguarded attempt
  /// follows, whose failure propagates.
  pub max_retries:   u32,
  pub initial_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    RetryPolicy { max_retries: 3, initial_delay: Duration::from_millis(100) }
  }
}

impl RetryPolicy {
  /// Execute `work` inside a transaction with the given access mode.
  ///
  /// On commit, cache entries staged by the work are published; on any
  /// failure (including a retried attempt) they are discarded with the
  /// rolled-back transaction. Transient failures are retried with
  /// `initial_delay * 2^attempt` backoff; all other errors propagate
  /// immediately.
  pub async fn run<T, F>(
    &self,
    conn: &tokio_rusqlite::Connection,
    cache: &RefCache,
    mode: AccessMode,
    work: F,
  ) -> Result<T>
  where
    F: Fn(&rusqlite::Transaction<'_>, &StagedCache) -> Result<T>
      + Send
      + Sync
      + 'static,
    T: Send + 'static,
  {
    let work = Arc::new(work);
    let mut attempt: u32 = 0;
    loop {
      match attempt_once(conn, cache.clone(), mode, Arc::clone(&work)).await {
        Ok(value) => return Ok(value),
        Err(e) if e.is_transient() && attempt < self.max_retries => {
          // Operator-configured budgets can push the exponent past u32.
          let delay =
            self.initial_delay.saturating_mul(2u32.saturating_pow(attempt));
          tracing::debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "transient store failure, retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }
}

async fn attempt_once<T, F>(
  conn: &tokio_rusqlite::Connection,
  cache: RefCache,
  mode: AccessMode,
  work: Arc<F>,
) -> Result<T>
where
  F: Fn(&rusqlite::Transaction<'_>, &StagedCache) -> Result<T>
    + Send
    + Sync
    + 'static,
  T: Send + 'static,
{
  conn
    .call(move |conn| {
      let outcome: Result<T> = (|| {
        let tx = conn.transaction_with_behavior(mode.behavior())?;
        let staged = StagedCache::new(cache);
        let value = work(&tx, &staged)?;
        tx.commit()?;
        staged.publish();
        Ok(value)
      })();
      Ok(outcome)
    })
    .await?
}

// ─── Tests ───────────────────────────────────────────────────────────────────
