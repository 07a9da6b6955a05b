//! Integration tests for the checkpointed computation pipeline.
//!
//! Covers:
//! - Golden end-to-end run at a small bound
//! - Restart / resume / replay equivalence
//! - Recovery from a torn trailing row
//! - Legacy-schema datasets surviving consolidation

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use fibonacci_cm::arith::SplitClass;
use fibonacci_cm::pipeline::{run, Mode};
use fibonacci_cm::store::{CheckpointStore, DATASET_FILENAME, HEADER};

fn store_at(dir: &Path) -> CheckpointStore {
    CheckpointStore::new(dir.join(DATASET_FILENAME))
}

// ---------------------------------------------------------------------------
// Golden run
// ---------------------------------------------------------------------------

#[test]
fn test_restart_bound_30_golden() {
    let dir = tempfile::tempdir().unwrap();
    let records = run(dir.path(), 30, Mode::Restart).unwrap();

    let ps: Vec<u64> = records.iter().map(|r| r.p).collect();
    assert_eq!(ps, vec![3, 5, 7, 11, 13, 17, 19, 23, 29]);

    for rec in &records {
        assert_eq!(rec.trace, -rec.char_sum, "identity at p = {}", rec.p);
        if rec.class_mod4 == SplitClass::Inert {
            assert_eq!(rec.trace, 0, "CM property at p = {}", rec.p);
        }
        assert!(rec.weil_ratio < 1.0, "Hasse bound at p = {}", rec.p);
        assert!(
            (rec.weil_ratio - rec.norm_trace.abs() / 2.0).abs() < 1e-9,
            "weil ratio identity at p = {}",
            rec.p
        );
    }

    let rec5 = records.iter().find(|r| r.p == 5).unwrap();
    assert_eq!(rec5.class_mod4, SplitClass::Split);
    assert_eq!(rec5.pisano_period, 20);
    assert_eq!(rec5.trace, 2);
    assert!((rec5.norm_trace - 0.8944).abs() < 1e-3);
    assert!((rec5.weil_ratio - 0.4472).abs() < 1e-3);

    let rec13 = records.iter().find(|r| r.p == 13).unwrap();
    assert_eq!(rec13.pisano_period, 28);
    assert_eq!(rec13.trace, -6);
}

#[test]
fn test_dataset_file_has_canonical_header() {
    let dir = tempfile::tempdir().unwrap();
    run(dir.path(), 20, Mode::Restart).unwrap();

    let content = fs::read_to_string(dir.path().join(DATASET_FILENAME)).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some(HEADER));
    assert_eq!(lines.count(), 7); // primes in [3, 20]
}

// ---------------------------------------------------------------------------
// Mode equivalences
// ---------------------------------------------------------------------------

#[test]
fn test_restart_then_replay_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    let first = run(dir.path(), 50, Mode::Restart).unwrap();
    let bytes_after_restart = fs::read_to_string(dir.path().join(DATASET_FILENAME)).unwrap();

    let replayed = run(dir.path(), 0, Mode::Replay).unwrap();
    assert_eq!(replayed, first);

    // Consolidation is idempotent at the byte level
    let bytes_after_replay = fs::read_to_string(dir.path().join(DATASET_FILENAME)).unwrap();
    assert_eq!(bytes_after_replay, bytes_after_restart);
}

#[test]
fn test_resume_equals_single_restart() {
    let full_dir = tempfile::tempdir().unwrap();
    let split_dir = tempfile::tempdir().unwrap();

    let full = run(full_dir.path(), 100, Mode::Restart).unwrap();

    let partial = run(split_dir.path(), 40, Mode::Restart).unwrap();
    assert!(partial.len() < full.len());
    let resumed = run(split_dir.path(), 100, Mode::Resume).unwrap();

    assert_eq!(resumed, full);
}

#[test]
fn test_resume_on_missing_store_behaves_like_restart() {
    let dir = tempfile::tempdir().unwrap();
    let records = run(dir.path(), 20, Mode::Resume).unwrap();
    let ps: Vec<u64> = records.iter().map(|r| r.p).collect();
    assert_eq!(ps, vec![3, 5, 7, 11, 13, 17, 19]);
}

#[test]
fn test_replay_without_data_falls_back_to_restart() {
    let dir = tempfile::tempdir().unwrap();
    let records = run(dir.path(), 20, Mode::Replay).unwrap();
    assert_eq!(records.len(), 7);
}

#[test]
fn test_restart_discards_previous_data() {
    let dir = tempfile::tempdir().unwrap();
    run(dir.path(), 30, Mode::Restart).unwrap();
    let records = run(dir.path(), 13, Mode::Restart).unwrap();
    let ps: Vec<u64> = records.iter().map(|r| r.p).collect();
    assert_eq!(ps, vec![3, 5, 7, 11, 13]);
}

#[test]
fn test_resume_already_complete_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let first = run(dir.path(), 30, Mode::Restart).unwrap();
    let again = run(dir.path(), 30, Mode::Resume).unwrap();
    assert_eq!(again, first);
}

// ---------------------------------------------------------------------------
// Interruption recovery
// ---------------------------------------------------------------------------

#[test]
fn test_torn_tail_recovers_via_full_recompute() {
    let dir = tempfile::tempdir().unwrap();
    run(dir.path(), 30, Mode::Restart).unwrap();

    // Simulate a write torn mid-row by a kill
    let path = dir.path().join(DATASET_FILENAME);
    let mut f = OpenOptions::new().append(true).open(&path).unwrap();
    write!(f, "NOT_AN_INT,iner").unwrap();
    drop(f);

    assert_eq!(store_at(dir.path()).last_checkpointed_prime(), 1);

    // Resume recomputes from the start; duplicates collapse on load
    let resumed = run(dir.path(), 30, Mode::Resume).unwrap();
    let ps: Vec<u64> = resumed.iter().map(|r| r.p).collect();
    assert_eq!(ps, vec![3, 5, 7, 11, 13, 17, 19, 23, 29]);

    let clean_dir = tempfile::tempdir().unwrap();
    let clean = run(clean_dir.path(), 30, Mode::Restart).unwrap();
    assert_eq!(resumed, clean);
}

#[test]
fn test_torn_tail_after_key_recomputes_the_torn_prime() {
    let dir = tempfile::tempdir().unwrap();
    run(dir.path(), 30, Mode::Restart).unwrap();

    // Replace the last row with a fragment torn after the key. The intact
    // key must not count as a checkpoint, or 29 would never be recomputed.
    let path = dir.path().join(DATASET_FILENAME);
    let content = fs::read_to_string(&path).unwrap();
    let mut lines: Vec<&str> = content.lines().collect();
    assert!(lines.last().unwrap().starts_with("29,"));
    lines.pop();
    fs::write(&path, format!("{}\n29,split", lines.join("\n"))).unwrap();

    assert_eq!(store_at(dir.path()).last_checkpointed_prime(), 1);

    let resumed = run(dir.path(), 30, Mode::Resume).unwrap();
    let ps: Vec<u64> = resumed.iter().map(|r| r.p).collect();
    assert_eq!(ps, vec![3, 5, 7, 11, 13, 17, 19, 23, 29]);

    let rec29 = resumed.iter().find(|r| r.p == 29).unwrap();
    assert_eq!(rec29.pisano_period, 14);
    assert_eq!(rec29.trace, 10);
}

#[test]
fn test_header_only_store_resumes_from_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DATASET_FILENAME);
    fs::write(&path, format!("{}\n", HEADER)).unwrap();

    assert_eq!(store_at(dir.path()).last_checkpointed_prime(), 1);
    let records = run(dir.path(), 20, Mode::Resume).unwrap();
    assert_eq!(records.len(), 7);
}

// ---------------------------------------------------------------------------
// Schema migration
// ---------------------------------------------------------------------------

#[test]
fn test_legacy_dataset_replays_and_consolidates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DATASET_FILENAME);
    fs::write(
        &path,
        "p,class_mod4,pisano_period,trace,norm_trace,weil_ratio\n\
         13,split,28,-6,-1.6641,0.8321\n\
         7,inert,16,0,0,0\n",
    )
    .unwrap();

    let records = run(dir.path(), 0, Mode::Replay).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].p, 7);
    assert_eq!(records[0].char_sum, 0);
    assert_eq!(records[1].p, 13);
    assert_eq!(records[1].char_sum, 6);
    assert_eq!(records[1].class_mod5, SplitClass::Inert);

    // Consolidation upgraded the file to the current layout, sorted by p
    let content = fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some(HEADER));
    assert!(lines.next().unwrap().starts_with("7,"));
    assert!(lines.next().unwrap().starts_with("13,"));
}

#[test]
fn test_resume_on_legacy_dataset_upgrades_then_continues() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DATASET_FILENAME);
    fs::write(
        &path,
        "p,class_mod4,pisano_period,trace,norm_trace,weil_ratio\n\
         3,inert,8,0,0,0\n\
         5,split,20,2,0.8944271909999159,0.4472135954999579\n\
         7,inert,16,0,0,0\n",
    )
    .unwrap();

    let records = run(dir.path(), 30, Mode::Resume).unwrap();
    let ps: Vec<u64> = records.iter().map(|r| r.p).collect();
    assert_eq!(ps, vec![3, 5, 7, 11, 13, 17, 19, 23, 29]);

    // Migrated rows carry derived fields; new rows are computed directly
    let rec5 = records.iter().find(|r| r.p == 5).unwrap();
    assert_eq!(rec5.char_sum, -2);
    let rec13 = records.iter().find(|r| r.p == 13).unwrap();
    assert_eq!(rec13.trace, -6);

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().next(), Some(HEADER));
}
