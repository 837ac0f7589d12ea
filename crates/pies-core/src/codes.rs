//! Static coding dictionary.
//!
//! A read-only, process-wide mapping from code system URI → code →
//! display metadata. Used to validate that a submitted (code_system, code)
//! pair is known and to enrich stored codes on read. The dictionary is part
//! of the specification, not of any one record, so it lives in code rather
//! than in the database.

use std::{collections::HashMap, sync::LazyLock};

use crate::{Error, Result};

/// URI of the application-process code system.
pub const APPLICATION_PROCESS: &str =
  "https://bcgov.github.io/nr-pies/docs/spec/code_system/application_process";

/// Display metadata for one controlled-vocabulary term.
#[derive(Debug, Clone, Copy)]
pub struct CodeInfo {
  pub display:  &'static str,
  /// Hierarchical path of the code within its code set, root first.
  pub code_set: &'static [&'static str],
}

type CodeTable = HashMap<&'static str, CodeInfo>;

static DICTIONARY: LazyLock<HashMap<&'static str, CodeTable>> =
  LazyLock::new(|| {
    let mut application_process: CodeTable = HashMap::new();
    for (code, display, path) in APPLICATION_PROCESS_CODES {
      application_process
        .insert(code, CodeInfo { display, code_set: path });
    }

    let mut systems = HashMap::new();
    systems.insert(APPLICATION_PROCESS, application_process);
    systems
  });

#[rustfmt::skip]
const APPLICATION_PROCESS_CODES: &[(&str, &str, &[&str])] = &[
  ("PRE_APPLICATION", "Pre-Application", &["Application Process", "Pre-Application"]),
  ("APPLICATION",     "Application",     &["Application Process", "Application"]),
  ("SUBMITTED",       "Submitted",       &["Application Process", "Application", "Submitted"]),
  ("TECH_REVIEW",     "Technical Review",&["Application Process", "Application", "Technical Review"]),
  ("REFERRAL",        "Referral",        &["Application Process", "Application", "Referral"]),
  ("DECISION",        "Decision",        &["Application Process", "Decision"]),
  ("ALLOWED",         "Allowed",         &["Application Process", "Decision", "Allowed"]),
  ("DISALLOWED",      "Disallowed",      &["Application Process", "Decision", "Disallowed"]),
  ("ISSUED",          "Issued",          &["Application Process", "Decision", "Allowed", "Issued"]),
  ("POST_DECISION",   "Post-Decision",   &["Application Process", "Post-Decision"]),
  ("ON_HOLD",         "On Hold",         &["Application Process", "On Hold"]),
  ("WITHDRAWN",       "Withdrawn",       &["Application Process", "Withdrawn"]),
];

/// Look up display metadata for a (code_system, code) pair.
pub fn lookup(code_system: &str, code: &str) -> Option<&'static CodeInfo> {
  DICTIONARY.get(code_system).and_then(|table| table.get(code))
}

/// Reject pairs the dictionary does not know.
pub fn validate(code_system: &str, code: &str) -> Result<()> {
  let Some(table) = DICTIONARY.get(code_system) else {
    return Err(Error::Validation(format!(
      "unknown code system {code_system:?}"
    )));
  };
  if table.contains_key(code) {
    Ok(())
  } else {
    Err(Error::Validation(format!(
      "unknown code {code:?} in {code_system:?}"
    )))
  }
}
