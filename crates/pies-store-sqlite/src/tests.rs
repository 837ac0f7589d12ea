use pies_core::{
  codes::APPLICATION_PROCESS,
  document::{Event, ProcessEventSet, RecordLinkageDoc},
  store::{LinkageDeleteRequest, LinkageQuery, RecordQuery, RecordStore as _},
};
use uuid::Uuid;

use crate::{SqliteStore, StoreOptions};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory(StoreOptions::default()).await.unwrap()
}

fn event(code: &str, start: &str) -> Event {
  Event {
    code:               code.into(),
    code_system:        APPLICATION_PROCESS.into(),
    code_display:       None,
    code_set:           vec![],
    status:             Some("Accepted".into()),
    status_code:        None,
    status_description: None,
    start_date:         None,
    start_datetime:     Some(start.into()),
    end_date:           None,
    end_datetime:       None,
  }
}

fn doc(system_id: &str, record_id: &str, events: Vec<Event>) -> ProcessEventSet {
  ProcessEventSet {
    transaction_id: Some(Uuid::now_v7()),
    version:        "0.1.0".into(),
    kind:           "Permit".into(),
    system_id:      system_id.into(),
    record_id:      record_id.into(),
    process_event:  events,
    on_hold_event:  vec![],
  }
}

fn linkage(
  system_id: &str,
  record_id: &str,
  linked_system_id: &str,
  linked_record_id: &str,
) -> RecordLinkageDoc {
  RecordLinkageDoc {
    transaction_id:   Some(Uuid::now_v7()),
    version:          "0.1.0".into(),
    kind:             "Permit".into(),
    system_id:        system_id.into(),
    record_id:        record_id.into(),
    linked_system_id: linked_system_id.into(),
    linked_record_id: linked_record_id.into(),
    linked_kind:      None,
  }
}

fn query(system_id: &str, record_id: &str) -> RecordQuery {
  RecordQuery {
    record_id: record_id.into(),
    system_id: Some(system_id.into()),
  }
}

async fn count_rows(store: &SqliteStore, table: &'static str) -> i64 {
  store
    .connection()
    .call(move |conn| {
      conn
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
          row.get(0)
        })
        .map_err(Into::into)
    })
    .await
    .unwrap()
}

// ─── Process events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn replace_then_find_round_trips() {
  let store = store().await;
  store
    .replace_process_events(doc("ITSM-5917", "rec-1", vec![
      event("PRE_APPLICATION", "2024-11-30T00:21:20.575Z"),
      event("SUBMITTED", "2024-12-01T09:00:00Z"),
    ]))
    .await
    .unwrap();

  let found =
    store.find_process_events(query("ITSM-5917", "rec-1")).await.unwrap();
  assert!(found.transaction_id.is_none());
  assert_eq!(found.version, "0.1.0");
  assert_eq!(found.kind, "Permit");
  assert_eq!(found.system_id, "ITSM-5917");
  assert_eq!(found.record_id, "rec-1");
  assert_eq!(found.process_event.len(), 2);

  // Ordered by start, enriched from the coding dictionary.
  let first = &found.process_event[0];
  assert_eq!(first.code, "PRE_APPLICATION");
  assert_eq!(
    first.start_datetime.as_deref(),
    Some("2024-11-30T00:21:20.575Z")
  );
  assert!(first.code_display.is_some());
  assert!(!first.code_set.is_empty());
}

#[tokio::test]
async fn on_hold_events_round_trip() {
  let store = store().await;
  let mut d = doc("ITSM-5917", "rec-1", vec![event(
    "SUBMITTED",
    "2024-12-01T09:00:00Z",
  )]);
  d.on_hold_event = vec![event("ON_HOLD", "2024-12-02T00:00:00Z")];
  store.replace_process_events(d).await.unwrap();

  let found =
    store.find_process_events(query("ITSM-5917", "rec-1")).await.unwrap();
  assert_eq!(found.on_hold_event.len(), 1);
  assert_eq!(found.on_hold_event[0].code, "ON_HOLD");
}

#[tokio::test]
async fn replace_is_full_state_transfer() {
  let store = store().await;
  store
    .replace_process_events(doc("ITSM-5917", "rec-1", vec![
      event("PRE_APPLICATION", "2024-11-30T00:00:00Z"),
      event("SUBMITTED", "2024-12-01T00:00:00Z"),
    ]))
    .await
    .unwrap();
  store
    .replace_process_events(doc("ITSM-5917", "rec-1", vec![
      event("SUBMITTED", "2024-12-01T00:00:00Z"),
      event("ISSUED", "2024-12-10T00:00:00Z"),
    ]))
    .await
    .unwrap();

  let found =
    store.find_process_events(query("ITSM-5917", "rec-1")).await.unwrap();
  let codes: Vec<&str> =
    found.process_event.iter().map(|e| e.code.as_str()).collect();
  assert_eq!(codes, vec!["SUBMITTED", "ISSUED"]);
}

#[tokio::test]
async fn identical_replay_with_fresh_transaction_id_is_a_no_op() {
  let store = store().await;
  let events = vec![event("SUBMITTED", "2024-12-01T00:00:00Z")];
  store
    .replace_process_events(doc("ITSM-5917", "rec-1", events.clone()))
    .await
    .unwrap();
  let before =
    store.find_process_events(query("ITSM-5917", "rec-1")).await.unwrap();

  store
    .replace_process_events(doc("ITSM-5917", "rec-1", events))
    .await
    .unwrap();
  let after =
    store.find_process_events(query("ITSM-5917", "rec-1")).await.unwrap();
  assert_eq!(before.process_event, after.process_event);
}

#[tokio::test]
async fn duplicate_transaction_id_conflicts() {
  let store = store().await;
  let mut d =
    doc("ITSM-5917", "rec-1", vec![event("SUBMITTED", "2024-12-01T00:00:00Z")]);
  d.transaction_id = Some(Uuid::now_v7());
  store.replace_process_events(d.clone()).await.unwrap();

  let err = store.replace_process_events(d).await.unwrap_err();
  assert!(matches!(err, pies_core::Error::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn failed_write_does_not_burn_its_transaction_id() {
  let store = store().await;
  let mut d =
    doc("ITSM-5917", "rec-1", vec![event("NOT_A_CODE", "2024-12-01T00:00:00Z")]);
  d.transaction_id = Some(Uuid::now_v7());
  let err = store.replace_process_events(d.clone()).await.unwrap_err();
  assert!(matches!(err, pies_core::Error::Validation(_)), "got {err:?}");

  // Same transaction id succeeds once the document is fixed.
  d.process_event = vec![event("SUBMITTED", "2024-12-01T00:00:00Z")];
  store.replace_process_events(d).await.unwrap();
}

#[tokio::test]
async fn sub_millisecond_timestamps_are_rejected_on_write() {
  let store = store().await;
  let err = store
    .replace_process_events(doc("ITSM-5917", "rec-1", vec![event(
      "SUBMITTED",
      "2024-12-01T09:00:00.575123Z",
    )]))
    .await
    .unwrap_err();
  assert!(matches!(err, pies_core::Error::Validation(_)), "got {err:?}");

  // Rejected up front: no half-written record to read back.
  let err =
    store.find_process_events(query("ITSM-5917", "rec-1")).await.unwrap_err();
  assert!(matches!(err, pies_core::Error::NotFound(_)));
}

#[tokio::test]
async fn write_requires_transaction_id() {
  let store = store().await;
  let mut d =
    doc("ITSM-5917", "rec-1", vec![event("SUBMITTED", "2024-12-01T00:00:00Z")]);
  d.transaction_id = None;
  let err = store.replace_process_events(d).await.unwrap_err();
  assert!(matches!(err, pies_core::Error::Validation(_)));
}

#[tokio::test]
async fn write_rejects_non_time_ordered_transaction_id() {
  let store = store().await;
  let mut d =
    doc("ITSM-5917", "rec-1", vec![event("SUBMITTED", "2024-12-01T00:00:00Z")]);
  d.transaction_id = Some(Uuid::new_v4());
  let err = store.replace_process_events(d).await.unwrap_err();
  assert!(matches!(err, pies_core::Error::Validation(_)));
}

#[tokio::test]
async fn write_rejects_malformed_system_id() {
  let store = store().await;
  let err = store
    .replace_process_events(doc("itsm", "rec-1", vec![event(
      "SUBMITTED",
      "2024-12-01T00:00:00Z",
    )]))
    .await
    .unwrap_err();
  assert!(matches!(err, pies_core::Error::Validation(_)));
}

#[tokio::test]
async fn find_unknown_record_is_not_found() {
  let store = store().await;
  let err =
    store.find_process_events(query("ITSM-5917", "nope")).await.unwrap_err();
  assert!(matches!(err, pies_core::Error::NotFound(_)));
}

#[tokio::test]
async fn shared_reference_data_reconciles_to_single_rows() {
  let store = store().await;
  // Two records in the same system, same version, kind, and coding.
  for rec in ["rec-1", "rec-2"] {
    store
      .replace_process_events(doc("ITSM-5917", rec, vec![event(
        "SUBMITTED",
        "2024-12-01T09:00:00Z",
      )]))
      .await
      .unwrap();
  }

  // At most one reference row per natural key, however many writers.
  assert_eq!(count_rows(&store, "pies_system").await, 1);
  assert_eq!(count_rows(&store, "pies_version").await, 1);
  assert_eq!(count_rows(&store, "pies_record_kind").await, 1);
  assert_eq!(count_rows(&store, "pies_coding").await, 1);
  assert_eq!(count_rows(&store, "pies_system_record").await, 2);

  // Replaying one of the documents creates nothing new.
  store
    .replace_process_events(doc("ITSM-5917", "rec-1", vec![event(
      "SUBMITTED",
      "2024-12-01T09:00:00Z",
    )]))
    .await
    .unwrap();
  assert_eq!(count_rows(&store, "pies_coding").await, 1);
  assert_eq!(count_rows(&store, "pies_system_record").await, 2);
}

#[tokio::test]
async fn record_kind_is_fixed_at_creation() {
  let store = store().await;
  store
    .replace_process_events(doc("ITSM-5917", "rec-1", vec![event(
      "SUBMITTED",
      "2024-12-01T00:00:00Z",
    )]))
    .await
    .unwrap();

  let mut d = doc("ITSM-5917", "rec-1", vec![event(
    "ISSUED",
    "2024-12-10T00:00:00Z",
  )]);
  d.kind = "Project".into();
  store.replace_process_events(d).await.unwrap();

  let found =
    store.find_process_events(query("ITSM-5917", "rec-1")).await.unwrap();
  assert_eq!(found.kind, "Permit");
}

// ─── Ambiguous record ids ────────────────────────────────────────────────────

#[tokio::test]
async fn bare_record_id_resolves_when_unambiguous() {
  let store = store().await;
  store
    .replace_process_events(doc("ITSM-5917", "rec-1", vec![event(
      "SUBMITTED",
      "2024-12-01T00:00:00Z",
    )]))
    .await
    .unwrap();

  let found = store
    .find_process_events(RecordQuery {
      record_id: "rec-1".into(),
      system_id: None,
    })
    .await
    .unwrap();
  assert_eq!(found.system_id, "ITSM-5917");
}

#[tokio::test]
async fn bare_record_id_conflicts_across_systems() {
  let store = store().await;
  for sys in ["ITSM-5917", "ATS-001"] {
    store
      .replace_process_events(doc(sys, "rec-1", vec![event(
        "SUBMITTED",
        "2024-12-01T00:00:00Z",
      )]))
      .await
      .unwrap();
  }

  let err = store
    .find_process_events(RecordQuery {
      record_id: "rec-1".into(),
      system_id: None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, pies_core::Error::Conflict(_)), "got {err:?}");

  // Qualified queries still resolve.
  store.find_process_events(query("ATS-001", "rec-1")).await.unwrap();
}

// ─── Prune and delete ────────────────────────────────────────────────────────

#[tokio::test]
async fn prune_removes_events_but_keeps_the_record() {
  let store = store().await;
  store
    .replace_process_events(doc("ITSM-5917", "rec-1", vec![event(
      "SUBMITTED",
      "2024-12-01T00:00:00Z",
    )]))
    .await
    .unwrap();

  store.prune_process_events(query("ITSM-5917", "rec-1")).await.unwrap();

  // No events left: the document is no longer representable.
  let err =
    store.find_process_events(query("ITSM-5917", "rec-1")).await.unwrap_err();
  assert!(matches!(err, pies_core::Error::NotFound(_)));

  // The record itself survives, so a prune on it still resolves.
  store.prune_process_events(query("ITSM-5917", "rec-1")).await.unwrap();
}

#[tokio::test]
async fn prune_unknown_record_is_not_found() {
  let store = store().await;
  let err =
    store.prune_process_events(query("ITSM-5917", "nope")).await.unwrap_err();
  assert!(matches!(err, pies_core::Error::NotFound(_)));
}

#[tokio::test]
async fn delete_record_cascades_to_events_and_linkages() {
  let store = store().await;
  store
    .replace_process_events(doc("ITSM-5917", "rec-1", vec![event(
      "SUBMITTED",
      "2024-12-01T00:00:00Z",
    )]))
    .await
    .unwrap();
  store
    .create_record_linkage(linkage("ITSM-5917", "rec-1", "ATS-001", "rec-2"))
    .await
    .unwrap();

  store.delete_system_record(query("ITSM-5917", "rec-1")).await.unwrap();

  let err =
    store.find_process_events(query("ITSM-5917", "rec-1")).await.unwrap_err();
  assert!(matches!(err, pies_core::Error::NotFound(_)));

  // The linked record's edge is gone too.
  let links = store
    .find_record_linkages(LinkageQuery {
      record_id: "rec-2".into(),
      system_id: Some("ATS-001".into()),
      depth:     None,
    })
    .await
    .unwrap();
  assert!(links.is_empty());
}

#[tokio::test]
async fn deleted_record_can_be_recreated() {
  let store = store().await;
  store
    .replace_process_events(doc("ITSM-5917", "rec-1", vec![event(
      "SUBMITTED",
      "2024-12-01T00:00:00Z",
    )]))
    .await
    .unwrap();
  store.delete_system_record(query("ITSM-5917", "rec-1")).await.unwrap();

  store
    .replace_process_events(doc("ITSM-5917", "rec-1", vec![event(
      "ISSUED",
      "2024-12-10T00:00:00Z",
    )]))
    .await
    .unwrap();

  let found =
    store.find_process_events(query("ITSM-5917", "rec-1")).await.unwrap();
  assert_eq!(found.process_event.len(), 1);
  assert_eq!(found.process_event[0].code, "ISSUED");
}

#[tokio::test]
async fn queries_reject_malformed_system_id() {
  let store = store().await;
  let err =
    store.find_process_events(query("itsm", "rec-1")).await.unwrap_err();
  assert!(matches!(err, pies_core::Error::Validation(_)));
}

// ─── Linkages ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn linkage_create_find_delete() {
  let store = store().await;
  store
    .create_record_linkage(linkage("ITSM-5917", "rec-1", "ATS-001", "rec-2"))
    .await
    .unwrap();

  let links = store
    .find_record_linkages(LinkageQuery {
      record_id: "rec-1".into(),
      system_id: Some("ITSM-5917".into()),
      depth:     None,
    })
    .await
    .unwrap();
  assert_eq!(links.len(), 1);
  assert_eq!(links[0].system_id, "ATS-001");
  assert_eq!(links[0].record_id, "rec-2");
  assert_eq!(links[0].kind, "Permit");

  store
    .delete_record_linkage(LinkageDeleteRequest {
      record_id:        "rec-1".into(),
      system_id:        Some("ITSM-5917".into()),
      linked_record_id: "rec-2".into(),
      linked_system_id: Some("ATS-001".into()),
    })
    .await
    .unwrap();

  let links = store
    .find_record_linkages(LinkageQuery {
      record_id: "rec-1".into(),
      system_id: Some("ITSM-5917".into()),
      depth:     None,
    })
    .await
    .unwrap();
  assert!(links.is_empty());
}

#[tokio::test]
async fn linkage_is_undirected() {
  let store = store().await;
  store
    .create_record_linkage(linkage("ITSM-5917", "rec-1", "ATS-001", "rec-2"))
    .await
    .unwrap();
  // Reverse assertion is a no-op, not an error.
  store
    .create_record_linkage(linkage("ATS-001", "rec-2", "ITSM-5917", "rec-1"))
    .await
    .unwrap();

  // The edge is visible from both ends, exactly once.
  for (sys, rec, other) in
    [("ITSM-5917", "rec-1", "rec-2"), ("ATS-001", "rec-2", "rec-1")]
  {
    let links = store
      .find_record_linkages(LinkageQuery {
        record_id: rec.into(),
        system_id: Some(sys.into()),
        depth:     None,
      })
      .await
      .unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].record_id, other);
  }

  // Deleting by the reverse direction removes it.
  store
    .delete_record_linkage(LinkageDeleteRequest {
      record_id:        "rec-2".into(),
      system_id:        Some("ATS-001".into()),
      linked_record_id: "rec-1".into(),
      linked_system_id: Some("ITSM-5917".into()),
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn linkage_rejects_self_link() {
  let store = store().await;
  let err = store
    .create_record_linkage(linkage("ITSM-5917", "rec-1", "ITSM-5917", "rec-1"))
    .await
    .unwrap_err();
  assert!(matches!(err, pies_core::Error::Validation(_)));
}

#[tokio::test]
async fn linkage_honours_linked_kind() {
  let store = store().await;
  let mut l = linkage("ITSM-5917", "rec-1", "ATS-001", "rec-2");
  l.linked_kind = Some("Project".into());
  store.create_record_linkage(l).await.unwrap();

  let links = store
    .find_record_linkages(LinkageQuery {
      record_id: "rec-1".into(),
      system_id: Some("ITSM-5917".into()),
      depth:     None,
    })
    .await
    .unwrap();
  assert_eq!(links[0].kind, "Project");
}

#[tokio::test]
async fn delete_unknown_linkage_is_not_found() {
  let store = store().await;
  store
    .create_record_linkage(linkage("ITSM-5917", "rec-1", "ATS-001", "rec-2"))
    .await
    .unwrap();
  store
    .create_record_linkage(linkage("ITSM-5917", "rec-3", "ATS-001", "rec-4"))
    .await
    .unwrap();

  // Both endpoints exist but no edge joins them.
  let err = store
    .delete_record_linkage(LinkageDeleteRequest {
      record_id:        "rec-1".into(),
      system_id:        Some("ITSM-5917".into()),
      linked_record_id: "rec-4".into(),
      linked_system_id: Some("ATS-001".into()),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, pies_core::Error::NotFound(_)));
}

#[tokio::test]
async fn linkage_write_requires_transaction_id() {
  let store = store().await;
  let mut l = linkage("ITSM-5917", "rec-1", "ATS-001", "rec-2");
  l.transaction_id = None;
  let err = store.create_record_linkage(l).await.unwrap_err();
  assert!(matches!(err, pies_core::Error::Validation(_)));
}
