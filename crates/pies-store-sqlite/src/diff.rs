//! Event-set diff pipeline: incoming event rows → minimal store operations.
//!
//! Replace semantics are full-state-transfer: after applying the diff the
//! stored set exactly equals the incoming set. Rows present on both sides
//! (by comparison key) are left untouched — an event is immutable once
//! written, so "no change" means no write touches that row at all.

use std::collections::HashMap;

use crate::tables::{EventRow, NewEventRow};

/// The result of diffing an incoming event set against the stored one.
#[derive(Debug, Default)]
pub struct EventDiff {
  /// Full row payloads to insert (keys absent from storage).
  pub insert: Vec<NewEventRow>,
  /// Surrogate ids to delete (keys absent from the incoming set).
  pub delete: Vec<String>,
}

impl EventDiff {
  pub fn is_empty(&self) -> bool {
    self.insert.is_empty() && self.delete.is_empty()
  }
}

/// Natural identity of an event: its coding plus all value fields. Two rows
/// with equal keys are the same logical event.
#[derive(Debug, PartialEq, Eq, Hash)]
struct EventKey<'a> {
  coding_id:          &'a str,
  status:             Option<&'a str>,
  status_code:        Option<&'a str>,
  status_description: Option<&'a str>,
  start_date:         &'a str,
  start_time:         Option<&'a str>,
  end_date:           Option<&'a str>,
  end_time:           Option<&'a str>,
}

impl<'a> EventKey<'a> {
  fn of_stored(row: &'a EventRow) -> Self {
    EventKey {
      coding_id:          &row.coding_id,
      status:             row.status.as_deref(),
      status_code:        row.status_code.as_deref(),
      status_description: row.status_description.as_deref(),
      start_date:         &row.start_date,
      start_time:         row.start_time.as_deref(),
      end_date:           row.end_date.as_deref(),
      end_time:           row.end_time.as_deref(),
    }
  }

  fn of_incoming(row: &'a NewEventRow) -> Self {
    EventKey {
      coding_id:          &row.coding_id,
      status:             row.status.as_deref(),
      status_code:        row.status_code.as_deref(),
      status_description: row.status_description.as_deref(),
      start_date:         &row.start_date,
      start_time:         row.start_time.as_deref(),
      end_date:           row.end_date.as_deref(),
      end_time:           row.end_time.as_deref(),
    }
  }
}

/// Compute the minimal insert/delete sets transitioning `stored` to exactly
/// match `incoming`.
///
/// Multiset semantics: duplicate keys are matched one-for-one. When stored
/// duplicates outnumber incoming ones the tie is broken deterministically —
/// rows with the smallest surrogate ids survive, later ones are deleted —
/// so repeated replays of the same document never reshuffle row identities.
/// An empty incoming set deletes everything (the standalone prune
/// operation).
pub fn diff_events(
  stored: &[EventRow],
  incoming: &[NewEventRow],
) -> EventDiff {
  // Bucket stored rows by key, earliest surrogate ids first.
  let mut buckets: HashMap<EventKey<'_>, Vec<&EventRow>> = HashMap::new();
  for row in stored {
    buckets.entry(EventKey::of_stored(row)).or_default().push(row);
  }
  for bucket in buckets.values_mut() {
    bucket.sort_by(|a, b| a.event_id.cmp(&b.event_id));
  }

  let mut insert = Vec::new();
  for row in incoming {
    let key = EventKey::of_incoming(row);
    // A match consumes the earliest surviving stored row for that key.
    match buckets.get_mut(&key) {
      Some(bucket) if !bucket.is_empty() => {
        bucket.remove(0);
      }
      _ => insert.push(row.clone()),
    }
  }

  let mut delete: Vec<String> = buckets
    .into_values()
    .flatten()
    .map(|row| row.event_id.clone())
    .collect();
  delete.sort();

  EventDiff { insert, delete }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
