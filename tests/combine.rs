mod common;

use common::{arc_set, line_set};
use std::fs;
use tempfile::tempdir;
use tracecov::{
    CoverageData, Error, combine_directory, combine_files, combine_stores, find_store_files,
};

fn lines_store(file: &str, lines: &[i64]) -> CoverageData {
    let mut data = CoverageData::new();
    data.add_lines(file, lines.iter().copied()).unwrap();
    data
}

#[test]
fn combining_unions_line_sets() {
    let a = lines_store("x.rs", &[1, 2]);
    let b = lines_store("x.rs", &[2, 3]);

    let combined = combine_stores(&[&a, &b]).unwrap();
    assert_eq!(combined.lines_for("x.rs", None), Some(line_set(&[1, 2, 3])));
}

#[test]
fn combining_unions_files_and_arcs() {
    let mut a = CoverageData::new();
    a.add_arcs("x.rs", arc_set(&[(-1, 1), (1, -1)])).unwrap();
    let mut b = CoverageData::new();
    b.add_arcs("x.rs", arc_set(&[(-1, 2), (2, -1)])).unwrap();
    b.add_arcs("y.rs", arc_set(&[(-1, 7), (7, -1)])).unwrap();

    let combined = combine_stores(&[&a, &b]).unwrap();
    assert_eq!(
        combined.arcs_for("x.rs", None),
        Some(arc_set(&[(-1, 1), (1, -1), (-1, 2), (2, -1)]))
    );
    assert_eq!(combined.measured_files(), vec!["x.rs", "y.rs"]);
}

#[test]
fn combining_unions_context_partitions() {
    let mut a = CoverageData::new();
    a.set_context("test_a");
    a.add_lines("x.rs", [5]).unwrap();
    let mut b = CoverageData::new();
    b.set_context("test_b");
    b.add_lines("x.rs", [5]).unwrap();

    let combined = combine_stores(&[&a, &b]).unwrap();
    // The line is attributed to both contexts in the result.
    assert_eq!(
        combined.contexts_for("x.rs", 5),
        vec!["test_a".to_string(), "test_b".to_string()]
    );
}

#[test]
fn combining_is_associative_and_commutative() {
    let a = lines_store("x.rs", &[1]);
    let b = lines_store("x.rs", &[2]);
    let c = lines_store("y.rs", &[3]);

    let left = {
        let ab = combine_stores(&[&a, &b]).unwrap();
        combine_stores(&[&ab, &c]).unwrap()
    };
    let right = {
        let bc = combine_stores(&[&b, &c]).unwrap();
        combine_stores(&[&a, &bc]).unwrap()
    };
    let shuffled = combine_stores(&[&c, &b, &a]).unwrap();

    assert_eq!(left, right);
    assert_eq!(left, shuffled);
}

#[test]
fn combining_mixed_granularities_fails() {
    let lines = lines_store("x.rs", &[1]);
    let mut arcs = CoverageData::new();
    arcs.add_arcs("x.rs", arc_set(&[(1, 2)])).unwrap();

    let err = combine_stores(&[&lines, &arcs]).unwrap_err();
    assert!(matches!(err, Error::GranularityMismatch { .. }));
}

#[test]
fn hash_disagreement_marks_file_stale() {
    let mut a = lines_store("x.rs", &[1]);
    a.set_file_hash("x.rs", "h1");
    let mut b = lines_store("x.rs", &[2]);
    b.set_file_hash("x.rs", "h2");

    let combined = combine_stores(&[&a, &b]).unwrap();
    let entry = combined.file_entry("x.rs").unwrap();
    assert!(entry.stale);
    assert_eq!(entry.hash, None);
    // Counts still accumulate despite the disagreement.
    assert_eq!(combined.lines_for("x.rs", None), Some(line_set(&[1, 2])));
}

#[test]
fn staleness_is_order_independent() {
    let mut a = lines_store("x.rs", &[1]);
    a.set_file_hash("x.rs", "h1");
    let mut b = lines_store("x.rs", &[2]);
    b.set_file_hash("x.rs", "h2");
    let mut c = lines_store("x.rs", &[3]);
    c.set_file_hash("x.rs", "h1");

    let one = {
        let ab = combine_stores(&[&a, &b]).unwrap();
        combine_stores(&[&ab, &c]).unwrap()
    };
    let two = {
        let ac = combine_stores(&[&a, &c]).unwrap();
        combine_stores(&[&ac, &b]).unwrap()
    };

    assert_eq!(one, two);
    assert!(one.file_entry("x.rs").unwrap().stale);
}

#[test]
fn agreeing_hashes_stay_trusted() {
    let mut a = lines_store("x.rs", &[1]);
    a.set_file_hash("x.rs", "h1");
    let b = lines_store("x.rs", &[2]);

    let combined = combine_stores(&[&a, &b]).unwrap();
    let entry = combined.file_entry("x.rs").unwrap();
    assert!(!entry.stale);
    assert_eq!(entry.hash.as_deref(), Some("h1"));
}

#[test]
fn combining_nothing_yields_an_empty_store() {
    let combined = combine_stores(&[]).unwrap();
    assert!(combined.is_empty());
}

#[test]
fn combine_persisted_worker_stores() {
    let dir = tempdir().unwrap();

    let mut a = lines_store("x.rs", &[1, 2]);
    a.write(&dir.path().join("coverage.worker1")).unwrap();
    let mut b = lines_store("x.rs", &[2, 3]);
    b.write(&dir.path().join("coverage.worker2")).unwrap();
    // Distractors: an unrelated file and a leftover temporary.
    fs::write(dir.path().join("notes.txt"), "n/a").unwrap();
    fs::write(dir.path().join("coverage.worker3.tmp"), "partial").unwrap();

    let found = find_store_files(dir.path(), "coverage").unwrap();
    assert_eq!(found.len(), 2);

    let combined = combine_files(&found).unwrap();
    assert_eq!(combined.lines_for("x.rs", None), Some(line_set(&[1, 2, 3])));

    let direct = combine_directory(dir.path(), "coverage").unwrap();
    assert_eq!(direct, combined);
}

#[test]
fn combine_files_propagates_corrupt_stores() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("coverage.worker1");
    fs::write(&path, "garbage").unwrap();

    let err = combine_files(&[path]).unwrap_err();
    assert!(matches!(err, Error::CorruptStore { .. }));
}
