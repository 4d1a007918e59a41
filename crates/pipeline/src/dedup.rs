//! Stable issue identity hashes
//!
//! The hash only needs to be a pure, deterministic function of the four
//! normalized fields so the same real-world issue maps to the same
//! identifier across iterations. It is a dedup key, not a cryptographic
//! digest.

use std::collections::HashSet;

use crate::config::PriorFinding;

/// Compute the stable identity hash for a finding.
///
/// Summary, file and category are lower-cased and trimmed before hashing
/// so case and whitespace differences in otherwise identical reports do
/// not defeat deduplication.
pub fn issue_hash(summary: &str, file: Option<&str>, line: Option<u32>, category: &str) -> String {
    let normalized = format!(
        "{}|{}|{}|{}",
        summary.trim().to_lowercase(),
        file.unwrap_or("").trim().to_lowercase(),
        line.map(|l| l.to_string()).unwrap_or_default(),
        category.trim().to_lowercase(),
    );

    let mut hash: i64 = 0;
    for byte in normalized.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(byte as i64);
    }
    format!("{:x}", hash.unsigned_abs())
}

/// Collect the hashes of previously reported findings for set-difference
pub fn seen_hashes(memory: &[PriorFinding]) -> HashSet<String> {
    memory.iter().map(|f| f.hash.clone()).collect()
}
