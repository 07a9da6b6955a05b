//! Aggregate statistics and report generation for a consolidated dataset.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::arith::{PrimeRecord, SplitClass};

/// Current report schema version. Bump when field semantics change.
pub const SCHEMA_VERSION: &str = "fibonacci-cm-v2";

/// Crate version from Cargo.toml, embedded at compile time.
pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Summary statistics over a consolidated dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub schema_version: String,
    pub crate_version: String,
    pub total_primes: usize,
    /// Count of p ≡ 1 (mod 4).
    pub split_mod4: usize,
    /// Count of p ≡ 3 (mod 4).
    pub inert_mod4: usize,
    /// Empirical inert fraction; Chebotarev predicts 0.5.
    pub inert_ratio: f64,
    /// Largest prime in the dataset (0 when empty).
    pub max_p: u64,
    pub max_pisano_period: u64,
    pub max_weil_ratio: f64,
    /// Inert (mod 4) rows whose trace is nonzero. Must be 0.
    pub cm_violations: usize,
    /// Rows where trace != -char_sum. Must be 0.
    pub identity_violations: usize,
}

pub fn summarize(records: &[PrimeRecord]) -> DatasetSummary {
    let total = records.len();
    let inert = records.iter().filter(|r| r.class_mod4 == SplitClass::Inert).count();
    let cm_violations = records
        .iter()
        .filter(|r| r.class_mod4 == SplitClass::Inert && r.trace != 0)
        .count();
    let identity_violations = records.iter().filter(|r| r.trace != -r.char_sum).count();

    DatasetSummary {
        schema_version: SCHEMA_VERSION.to_string(),
        crate_version: CRATE_VERSION.to_string(),
        total_primes: total,
        split_mod4: total - inert,
        inert_mod4: inert,
        inert_ratio: if total > 0 { inert as f64 / total as f64 } else { 0.0 },
        max_p: records.iter().map(|r| r.p).max().unwrap_or(0),
        max_pisano_period: records.iter().map(|r| r.pisano_period).max().unwrap_or(0),
        max_weil_ratio: records.iter().map(|r| r.weil_ratio).fold(0.0, f64::max),
        cm_violations,
        identity_violations,
    }
}

/// Print a formatted summary block to stderr.
pub fn print_summary(summary: &DatasetSummary) {
    eprintln!();
    eprintln!("{}", "-".repeat(52));
    eprintln!("  Total primes           : {}", summary.total_primes);
    eprintln!("  Split  (p = 1 mod 4)   : {}", summary.split_mod4);
    eprintln!("  Inert  (p = 3 mod 4)   : {}", summary.inert_mod4);
    eprintln!(
        "  Empirical inert ratio  : {:.6}  (theory: 0.500000)",
        summary.inert_ratio
    );
    eprintln!(
        "  Max Weil ratio         : {:.6}  (bound: 1.000000)",
        summary.max_weil_ratio
    );
    eprintln!("  Max Pisano period      : {}", summary.max_pisano_period);
    eprintln!("  Verification range     : 3  to  {}", summary.max_p);
    eprintln!("{}", "-".repeat(52));

    if summary.cm_violations == 0 && summary.identity_violations == 0 {
        eprintln!(
            "  [OK] CM property verified: a_p = 0 for all {} inert primes.",
            summary.inert_mod4
        );
    } else {
        eprintln!(
            "  [ERROR] {} CM violation(s), {} identity violation(s)!",
            summary.cm_violations, summary.identity_violations
        );
    }
}

/// Write the summary as pretty-printed JSON.
pub fn write_summary_json(summary: &DatasetSummary, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arith::compute_record;
    use crate::sieve::primes_in_range;

    fn records_to(bound: u64) -> Vec<PrimeRecord> {
        primes_in_range(3, bound).into_iter().map(|p| compute_record(p).unwrap()).collect()
    }

    #[test]
    fn test_summarize_counts() {
        let summary = summarize(&records_to(30));
        // {3,7,11,19,23} inert, {5,13,17,29} split
        assert_eq!(summary.total_primes, 9);
        assert_eq!(summary.inert_mod4, 5);
        assert_eq!(summary.split_mod4, 4);
        assert_eq!(summary.max_p, 29);
        assert_eq!(summary.cm_violations, 0);
        assert_eq!(summary.identity_violations, 0);
        assert!(summary.max_weil_ratio < 1.0);
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_primes, 0);
        assert_eq!(summary.inert_ratio, 0.0);
        assert_eq!(summary.max_p, 0);
    }

    #[test]
    fn test_summarize_flags_violations() {
        let mut records = records_to(30);
        records[0].trace = 5; // p = 3 is inert, trace must be 0
        let summary = summarize(&records);
        assert_eq!(summary.cm_violations, 1);
        assert_eq!(summary.identity_violations, 1);
    }

    #[test]
    fn test_summary_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_summary.json");
        let summary = summarize(&records_to(30));
        write_summary_json(&summary, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: DatasetSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.total_primes, summary.total_primes);
        assert_eq!(parsed.schema_version, SCHEMA_VERSION);
    }
}
