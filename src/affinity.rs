//! SQL Affinity Detector (spec §4.10, C17): a lightweight prefix matcher
//! flagging statements that require session stickiness (temp tables,
//! session-scoped `SET`, `PREPARE`). Never parses SQL beyond this
//! (explicit non-goal, spec §1).

use once_cell::sync::Lazy;
use regex::RegexSet;

use crate::common::DatabaseFlavor;

/// Only the leading slice is inspected: the spec caps this at ~200 chars
/// so a huge statement body never costs more than a bounded regex scan.
const PREFIX_LEN: usize = 200;

static AFFINITY_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)^\s*create\s+(global\s+|local\s+)?temp(orary)?\s+table",
        r"(?i)^\s*create\s+table\s+#[^#]",
        r"(?i)^\s*set\s+@",
        r"(?i)^\s*set\s+session\b",
        r"(?i)^\s*set\s+local\b",
        r"(?i)^\s*prepare\b",
    ])
    .expect("affinity pattern set is a fixed, valid literal")
});

/// Returns true if `sql` requires the statement to run on the same
/// physical connection as whatever follows it in the same session (spec
/// §8 "Affinity detection"). `flavor` is accepted for future
/// vendor-specific extension but unused by the current pattern set —
/// every existing rule is already flavor-agnostic at the syntax level.
pub fn requires_affinity(sql: &str, _flavor: DatabaseFlavor) -> bool {
    let prefix: String = sql.chars().take(PREFIX_LEN).collect();
    AFFINITY_PATTERNS.is_match(&prefix)
}
