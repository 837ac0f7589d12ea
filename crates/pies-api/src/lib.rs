//! JSON REST API for the PIES record service.
//!
//! Exposes an axum [`Router`] backed by any [`pies_core::store::RecordStore`].
//! Structural schema validation, auth, and TLS are upstream concerns; the
//! handlers here deserialise documents, delegate to the store, and render
//! core errors as RFC 7807 problem responses.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api/v1", pies_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod linkages;
pub mod records;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{delete, get},
};
use pies_core::store::RecordStore;
use pies_store_sqlite::{RetryPolicy, StoreOptions};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` layered
/// with `PIES_`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                   String,
  #[serde(default = "default_port")]
  pub port:                   u16,
  #[serde(default = "default_store_path")]
  pub store_path:             PathBuf,
  #[serde(default = "default_cache_capacity")]
  pub cache_capacity:         usize,
  #[serde(default = "default_cache_ttl_secs")]
  pub cache_ttl_secs:         u64,
  #[serde(default = "default_max_retries")]
  pub max_retries:            u32,
  #[serde(default = "default_retry_initial_delay_ms")]
  pub retry_initial_delay_ms: u64,
}

fn default_host() -> String {
  "127.0.0.1".to_string()
}
fn default_port() -> u16 {
  8080
}
fn default_store_path() -> PathBuf {
  PathBuf::from("pies.db")
}
fn default_cache_capacity() -> usize {
  256
}
fn default_cache_ttl_secs() -> u64 {
  300
}
fn default_max_retries() -> u32 {
  3
}
fn default_retry_initial_delay_ms() -> u64 {
  100
}

impl Default for ServerConfig {
  fn default() -> Self {
    ServerConfig {
      host:                   default_host(),
      port:                   default_port(),
      store_path:             default_store_path(),
      cache_capacity:         default_cache_capacity(),
      cache_ttl_secs:         default_cache_ttl_secs(),
      max_retries:            default_max_retries(),
      retry_initial_delay_ms: default_retry_initial_delay_ms(),
    }
  }
}

impl ServerConfig {
  /// Store tunables derived from this configuration.
  pub fn store_options(&self) -> StoreOptions {
    StoreOptions {
      cache_capacity: self.cache_capacity,
      cache_ttl:      Duration::from_secs(self.cache_ttl_secs),
      retry:          RetryPolicy {
        max_retries:   self.max_retries,
        initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
      },
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: RecordStore + 'static,
{
  Router::new()
    .route(
      "/records/process-events",
      get(records::find::<S>)
        .put(records::replace::<S>)
        .delete(records::prune::<S>),
    )
    .route("/records", delete(records::delete::<S>))
    .route(
      "/records/linkages",
      get(linkages::list::<S>)
        .put(linkages::create::<S>)
        .delete(linkages::remove::<S>),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(store)
}

// ─── Integration tests ───────────────────────────────────────────────────────
