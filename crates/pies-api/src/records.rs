//! Handlers for `/records` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `PUT`    | `/records/process-events` | Body: process event set document |
//! | `GET`    | `/records/process-events` | `?record_id=&system_id=` |
//! | `DELETE` | `/records/process-events` | Prune events, keep the record |
//! | `DELETE` | `/records` | Delete the record and everything under it |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
};
use pies_core::{
  document::ProcessEventSet,
  store::{RecordQuery, RecordStore},
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RecordParams {
  pub record_id: String,
  pub system_id: Option<String>,
}

impl From<RecordParams> for RecordQuery {
  fn from(params: RecordParams) -> Self {
    RecordQuery {
      record_id: params.record_id,
      system_id: params.system_id,
    }
  }
}

/// `PUT /records/process-events`
pub async fn replace<S>(
  State(store): State<Arc<S>>,
  Json(doc): Json<ProcessEventSet>,
) -> Result<StatusCode, ApiError>
where
  S: RecordStore,
{
  store.replace_process_events(doc).await?;
  Ok(StatusCode::CREATED)
}

/// `GET /records/process-events?record_id=<id>[&system_id=<id>]`
pub async fn find<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<RecordParams>,
) -> Result<Json<ProcessEventSet>, ApiError>
where
  S: RecordStore,
{
  let doc = store.find_process_events(params.into()).await?;
  Ok(Json(doc))
}

/// `DELETE /records/process-events?record_id=<id>[&system_id=<id>]`
pub async fn prune<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<RecordParams>,
) -> Result<StatusCode, ApiError>
where
  S: RecordStore,
{
  store.prune_process_events(params.into()).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /records?record_id=<id>[&system_id=<id>]`
pub async fn delete<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<RecordParams>,
) -> Result<StatusCode, ApiError>
where
  S: RecordStore,
{
  store.delete_system_record(params.into()).await?;
  Ok(StatusCode::NO_CONTENT)
}
