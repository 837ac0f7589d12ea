//! Wire-format documents: the PIES process event set and record linkage
//! shapes, plus the semantic checks the core performs on them.
//!
//! Structural JSON-schema validation happens before these types are reached;
//! the checks here are the semantic ones a schema cannot express (timestamp
//! plausibility, coding validity, interval ordering).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  codes,
  datetime::{self, SplitDateTime},
  Error, Result,
};

// Tolerated forward clock skew when checking a transaction id's timestamp.
const MAX_CLOCK_SKEW_SECS: i64 = 5;

// ─── Process event set ───────────────────────────────────────────────────────

/// One submitted (or reconstructed) process event set for a single record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEventSet {
  /// Required on writes; omitted from reconstructed read documents, which
  /// have no single originating transaction.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub transaction_id: Option<Uuid>,
  /// Specification version the document complies with (e.g. `0.1.0`).
  pub version:        String,
  /// Record kind (e.g. `Permit`).
  pub kind:           String,
  pub system_id:      String,
  pub record_id:      String,
  #[serde(default)]
  pub process_event:  Vec<Event>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub on_hold_event:  Vec<Event>,
}

/// One process or on-hold event. Exactly one of `start_date` /
/// `start_datetime` must be present; the end pair is optional but likewise
/// mutually exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub code:               String,
  pub code_system:        String,
  /// Display name from the coding dictionary; populated on read, ignored on
  /// write.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub code_display:       Option<String>,
  /// Hierarchical code-set path from the coding dictionary; read-side only.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub code_set:           Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status:             Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status_code:        Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status_description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_date:         Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_datetime:     Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_date:           Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_datetime:       Option<String>,
}

/// An [`Event`] decomposed into the columns the store persists, with the
/// coding still expressed by its natural key (reconciled to a surrogate id
/// inside the write transaction).
#[derive(Debug, Clone)]
pub struct DisassembledEvent {
  pub code:               String,
  pub code_system:        String,
  pub status:             Option<String>,
  pub status_code:        Option<String>,
  pub status_description: Option<String>,
  pub start_date:         String,
  pub start_time:         Option<String>,
  pub end_date:           Option<String>,
  pub end_time:           Option<String>,
}

impl Event {
  /// Split the wire timestamps into storage columns, checking the coding
  /// against the static dictionary and the interval ordering.
  pub fn disassemble(&self) -> Result<DisassembledEvent> {
    codes::validate(&self.code_system, &self.code)?;

    let start = split_endpoint(
      "start",
      self.start_date.as_deref(),
      self.start_datetime.as_deref(),
    )?
    .ok_or_else(|| {
      Error::Validation(format!(
        "event {} has neither start_date nor start_datetime",
        self.code
      ))
    })?;

    let end = split_endpoint(
      "end",
      self.end_date.as_deref(),
      self.end_datetime.as_deref(),
    )?;

    if let Some(end) = &end
      && end.as_instant()? < start.as_instant()?
    {
      return Err(Error::Validation(format!(
        "event {} ends before it starts",
        self.code
      )));
    }

    Ok(DisassembledEvent {
      code: self.code.clone(),
      code_system: self.code_system.clone(),
      status: self.status.clone(),
      status_code: self.status_code.clone(),
      status_description: self.status_description.clone(),
      start_date: start.date,
      start_time: start.time,
      end_date: end.as_ref().map(|e| e.date.clone()),
      end_time: end.and_then(|e| e.time),
    })
  }
}

/// Reassemble a wire [`Event`] from storage columns, enriching the coding
/// with display metadata from the static dictionary.
#[allow(clippy::too_many_arguments)]
pub fn assemble_event(
  code: String,
  code_system: String,
  status: Option<String>,
  status_code: Option<String>,
  status_description: Option<String>,
  start_date: &str,
  start_time: Option<&str>,
  end_date: Option<&str>,
  end_time: Option<&str>,
) -> Result<Event> {
  let info = codes::lookup(&code_system, &code);

  let start_merged = datetime::merge(start_date, start_time)?;
  let (start_date_out, start_datetime_out) = if start_time.is_some() {
    (None, Some(start_merged))
  } else {
    (Some(start_merged), None)
  };

  let (end_date_out, end_datetime_out) = match end_date {
    Some(d) => {
      let merged = datetime::merge(d, end_time)?;
      if end_time.is_some() {
        (None, Some(merged))
      } else {
        (Some(merged), None)
      }
    }
    None => (None, None),
  };

  Ok(Event {
    code,
    code_system,
    code_display: info.map(|i| i.display.to_string()),
    code_set: info
      .map(|i| i.code_set.iter().map(|s| s.to_string()).collect())
      .unwrap_or_default(),
    status,
    status_code,
    status_description,
    start_date: start_date_out,
    start_datetime: start_datetime_out,
    end_date: end_date_out,
    end_datetime: end_datetime_out,
  })
}

fn split_endpoint(
  name: &str,
  date: Option<&str>,
  dt: Option<&str>,
) -> Result<Option<SplitDateTime>> {
  match (date, dt) {
    (Some(_), Some(_)) => Err(Error::Validation(format!(
      "both {name}_date and {name}_datetime given"
    ))),
    (Some(d), None) => Ok(Some(datetime::split_date(d)?)),
    (None, Some(d)) => Ok(Some(datetime::split_datetime(d)?)),
    (None, None) => Ok(None),
  }
}

// ─── Record linkage ──────────────────────────────────────────────────────────

/// A submitted assertion that two records in (usually different) systems
/// refer to the same logical entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordLinkageDoc {
  pub transaction_id:   Option<Uuid>,
  pub version:          String,
  pub kind:             String,
  pub system_id:        String,
  pub record_id:        String,
  pub linked_system_id: String,
  pub linked_record_id: String,
  /// Kind of the linked record; defaults to `kind` when absent.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub linked_kind:      Option<String>,
}

/// One direct linkage edge as returned by reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLinkageView {
  pub system_id: String,
  pub record_id: String,
  pub kind:      String,
}

// ─── Identifier checks ───────────────────────────────────────────────────────

/// Source system ids follow a fixed `PREFIX-digits` pattern, e.g. `ITSM-5917`.
pub fn validate_system_id(system_id: &str) -> Result<()> {
  let valid = system_id.split_once('-').is_some_and(|(prefix, digits)| {
    !prefix.is_empty()
      && prefix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
      && !digits.is_empty()
      && digits.chars().all(|c| c.is_ascii_digit())
  });
  if valid {
    Ok(())
  } else {
    Err(Error::Validation(format!("invalid system_id {system_id:?}")))
  }
}

/// Transaction ids are caller-supplied, time-ordered UUIDv7 values. The
/// embedded timestamp must not be in the future (beyond minor clock skew).
pub fn validate_transaction_id(id: Uuid) -> Result<()> {
  let ts = id.get_timestamp().ok_or_else(|| {
    Error::Validation(format!("transaction_id {id} is not time-ordered"))
  })?;
  let (secs, _nanos) = ts.to_unix();
  let now = Utc::now().timestamp();
  if secs as i64 > now + MAX_CLOCK_SKEW_SECS {
    return Err(Error::Validation(format!(
      "transaction_id {id} carries a future timestamp"
    )));
  }
  Ok(())
}

/// Require a transaction id on a write document and check its plausibility.
pub fn require_transaction_id(id: Option<Uuid>) -> Result<Uuid> {
  let id =
    id.ok_or_else(|| Error::Validation("transaction_id is required".into()))?;
  validate_transaction_id(id)?;
  Ok(id)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codes::APPLICATION_PROCESS;

  fn event(code: &str) -> Event {
    Event {
      code:               code.into(),
      code_system:        APPLICATION_PROCESS.into(),
      code_display:       None,
      code_set:           vec![],
      status:             Some("Accepted".into()),
      status_code:        None,
      status_description: None,
      start_date:         None,
      start_datetime:     Some("2024-11-30T00:21:20.575Z".into()),
      end_date:           None,
      end_datetime:       None,
    }
  }

  #[test]
  fn disassemble_splits_datetime() {
    let d = event("PRE_APPLICATION").disassemble().unwrap();
    assert_eq!(d.start_date, "2024-11-30");
    assert_eq!(d.start_time.as_deref(), Some("00:21:20.575"));
    assert!(d.end_date.is_none());
  }

  #[test]
  fn disassemble_rejects_unknown_code() {
    let ev = event("NOT_A_CODE");
    assert!(matches!(ev.disassemble(), Err(Error::Validation(_))));
  }

  #[test]
  fn disassemble_rejects_double_start() {
    let mut ev = event("PRE_APPLICATION");
    ev.start_date = Some("2024-11-30".into());
    assert!(matches!(ev.disassemble(), Err(Error::Validation(_))));
  }

  #[test]
  fn disassemble_rejects_missing_start() {
    let mut ev = event("PRE_APPLICATION");
    ev.start_datetime = None;
    assert!(matches!(ev.disassemble(), Err(Error::Validation(_))));
  }

  #[test]
  fn disassemble_rejects_inverted_interval() {
    let mut ev = event("PRE_APPLICATION");
    ev.end_datetime = Some("2024-11-29T00:00:00Z".into());
    assert!(matches!(ev.disassemble(), Err(Error::Validation(_))));
  }

  #[test]
  fn assemble_round_trips_disassemble() {
    let ev = event("PRE_APPLICATION");
    let d = ev.disassemble().unwrap();
    let back = assemble_event(
      d.code,
      d.code_system,
      d.status,
      d.status_code,
      d.status_description,
      &d.start_date,
      d.start_time.as_deref(),
      d.end_date.as_deref(),
      d.end_time.as_deref(),
    )
    .unwrap();
    assert_eq!(back.start_datetime, ev.start_datetime);
    assert_eq!(back.code, ev.code);
    assert!(back.code_display.is_some());
    assert!(!back.code_set.is_empty());
  }

  #[test]
  fn assemble_all_day_event_keeps_bare_date() {
    let back = assemble_event(
      "PRE_APPLICATION".into(),
      APPLICATION_PROCESS.into(),
      None,
      None,
      None,
      "2024-11-30",
      None,
      None,
      None,
    )
    .unwrap();
    assert_eq!(back.start_date.as_deref(), Some("2024-11-30"));
    assert!(back.start_datetime.is_none());
  }

  #[test]
  fn system_id_pattern() {
    assert!(validate_system_id("ITSM-5917").is_ok());
    assert!(validate_system_id("E2-123").is_ok());
    assert!(validate_system_id("itsm-5917").is_err());
    assert!(validate_system_id("ITSM5917").is_err());
    assert!(validate_system_id("ITSM-").is_err());
    assert!(validate_system_id("-5917").is_err());
  }

  #[test]
  fn transaction_id_must_be_v7() {
    assert!(validate_transaction_id(Uuid::new_v4()).is_err());
    assert!(validate_transaction_id(Uuid::now_v7()).is_ok());
  }

  #[test]
  fn future_transaction_id_rejected() {
    let future = Uuid::new_v7(uuid::Timestamp::from_unix(
      uuid::NoContext,
      (Utc::now().timestamp() + 3600) as u64,
      0,
    ));
    assert!(matches!(
      validate_transaction_id(future),
      Err(Error::Validation(_))
    ));
  }
}
