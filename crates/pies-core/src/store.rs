//! The `RecordStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `pies-store-sqlite`).
//! The HTTP layer depends on this abstraction, not on any concrete backend.
//!
//! Unlike the backend-internal errors, the trait surfaces [`crate::Error`]
//! directly: the HTTP boundary needs the error kind (conflict, not-found,
//! validation) to pick a status code, so an opaque associated error type
//! would not do.

use std::future::Future;

use crate::{
  document::{ProcessEventSet, RecordLinkageDoc, RecordLinkageView},
  Error,
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Identifies one system record, possibly ambiguously.
///
/// When `system_id` is absent the record id must resolve to exactly one
/// record; zero is a not-found error and more than one is a conflict that
/// demands a `system_id`.
#[derive(Debug, Clone)]
pub struct RecordQuery {
  pub record_id: String,
  pub system_id: Option<String>,
}

/// Parameters for [`RecordStore::find_record_linkages`].
#[derive(Debug, Clone)]
pub struct LinkageQuery {
  pub record_id: String,
  pub system_id: Option<String>,
  /// Traversal depth. Accepted for wire compatibility; only direct edges
  /// (depth 1) are returned until multi-hop semantics are specified.
  pub depth:     Option<u32>,
}

/// Identifies one linkage edge by its two endpoints.
#[derive(Debug, Clone)]
pub struct LinkageDeleteRequest {
  pub record_id:        String,
  pub system_id:        Option<String>,
  pub linked_record_id: String,
  pub linked_system_id: Option<String>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a PIES record store backend.
///
/// Writes are full-state-transfer replaces: after
/// [`replace_process_events`](RecordStore::replace_process_events) the stored
/// event set exactly equals the submitted one, applied as a minimal diff.
/// Every write is atomic — on error nothing is persisted, including the
/// transaction-id idempotency row.
pub trait RecordStore: Send + Sync {
  /// Replace the stored event sets for the document's record with the
  /// submitted ones, creating any missing reference data on the way.
  ///
  /// Fails with [`Error::Conflict`] if the document's transaction id was
  /// already processed.
  fn replace_process_events(
    &self,
    doc: ProcessEventSet,
  ) -> impl Future<Output = Result<(), Error>> + Send + '_;

  /// Reconstruct the wire document for one record from normalized storage.
  ///
  /// A record with no events is not representable and yields
  /// [`Error::NotFound`].
  fn find_process_events(
    &self,
    query: RecordQuery,
  ) -> impl Future<Output = Result<ProcessEventSet, Error>> + Send + '_;

  /// Delete all process and on-hold events for the record, keeping the
  /// record itself.
  fn prune_process_events(
    &self,
    query: RecordQuery,
  ) -> impl Future<Output = Result<(), Error>> + Send + '_;

  /// Delete the record and, by cascade, its events and linkages.
  fn delete_system_record(
    &self,
    query: RecordQuery,
  ) -> impl Future<Output = Result<(), Error>> + Send + '_;

  /// Assert a linkage between two records, find-or-creating either endpoint.
  /// Asserting an edge that already holds (in either direction) is a no-op.
  fn create_record_linkage(
    &self,
    doc: RecordLinkageDoc,
  ) -> impl Future<Output = Result<(), Error>> + Send + '_;

  /// Remove a linkage edge, whichever direction it is stored in.
  fn delete_record_linkage(
    &self,
    request: LinkageDeleteRequest,
  ) -> impl Future<Output = Result<(), Error>> + Send + '_;

  /// List the records directly linked to the queried one.
  fn find_record_linkages(
    &self,
    query: LinkageQuery,
  ) -> impl Future<Output = Result<Vec<RecordLinkageView>, Error>> + Send + '_;
}
