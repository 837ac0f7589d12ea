//! Handlers for `/records/linkages` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `PUT`    | `/records/linkages` | Body: record linkage document |
//! | `GET`    | `/records/linkages` | `?record_id=&system_id=&depth=` |
//! | `DELETE` | `/records/linkages` | JSON body naming both endpoints |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
};
use pies_core::{
  document::{RecordLinkageDoc, RecordLinkageView},
  store::{LinkageDeleteRequest, LinkageQuery, RecordStore},
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct LinkageParams {
  pub record_id: String,
  pub system_id: Option<String>,
  pub depth:     Option<u32>,
}

/// `PUT /records/linkages` — re-asserting an existing edge is still a 201.
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(doc): Json<RecordLinkageDoc>,
) -> Result<StatusCode, ApiError>
where
  S: RecordStore,
{
  store.create_record_linkage(doc).await?;
  Ok(StatusCode::CREATED)
}

/// `GET /records/linkages?record_id=<id>[&system_id=<id>][&depth=<n>]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<LinkageParams>,
) -> Result<Json<Vec<RecordLinkageView>>, ApiError>
where
  S: RecordStore,
{
  let links = store
    .find_record_linkages(LinkageQuery {
      record_id: params.record_id,
      system_id: params.system_id,
      depth:     params.depth,
    })
    .await?;
  Ok(Json(links))
}

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
  pub record_id:        String,
  pub system_id:        Option<String>,
  pub linked_record_id: String,
  pub linked_system_id: Option<String>,
}

/// `DELETE /records/linkages` — the edge is named in the JSON body.
pub async fn remove<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<DeleteBody>,
) -> Result<StatusCode, ApiError>
where
  S: RecordStore,
{
  store
    .delete_record_linkage(LinkageDeleteRequest {
      record_id:        body.record_id,
      system_id:        body.system_id,
      linked_record_id: body.linked_record_id,
      linked_system_id: body.linked_system_id,
    })
    .await?;
  Ok(StatusCode::NO_CONTENT)
}
