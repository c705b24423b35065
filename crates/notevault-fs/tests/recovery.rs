use std::fs;
use std::path::Path;

use notevault_fs::{atomic_write_bytes, commit_path_for, recover_atomic_file};

fn remaining_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read_dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn interrupted_rename_is_completed_by_recovery() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("vault.db");
    atomic_write_bytes(&dest, b"stale snapshot").expect("initial write");

    // Crash after the commit file was written but before it replaced the target.
    fs::write(commit_path_for(&dest), b"fresh snapshot").expect("write commit file");

    let outcome = recover_atomic_file(&dest).expect("recover");
    assert!(outcome.promoted);
    assert_eq!(fs::read(&dest).expect("read dest"), b"fresh snapshot");
    assert_eq!(remaining_files(dir.path()), vec!["vault.db".to_string()]);
}

#[test]
fn interrupted_first_write_creates_the_target() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("vault.db");
    fs::write(commit_path_for(&dest), b"first snapshot").expect("write commit file");

    let outcome = recover_atomic_file(&dest).expect("recover");
    assert!(outcome.promoted);
    assert_eq!(fs::read(&dest).expect("read dest"), b"first snapshot");
}

#[test]
fn recovery_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("vault.db");
    fs::write(&dest, b"old").expect("write dest");
    fs::write(commit_path_for(&dest), b"new").expect("write commit file");

    assert!(recover_atomic_file(&dest).expect("first recovery").promoted);
    let second = recover_atomic_file(&dest).expect("second recovery");
    assert!(second.is_clean());
    assert_eq!(fs::read(&dest).expect("read dest"), b"new");
}

#[test]
fn torn_scratch_files_are_discarded_not_promoted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("vault.db");
    fs::write(&dest, b"committed").expect("write dest");
    fs::write(dir.path().join(".vault.db.x1y2z3.partial"), b"torn").expect("write scratch");
    // Scratch files belonging to another destination are left alone.
    fs::write(dir.path().join(".key.q9w8e7.partial"), b"other").expect("write other scratch");

    let outcome = recover_atomic_file(&dest).expect("recover");
    assert!(!outcome.promoted);
    assert_eq!(outcome.discarded_scratch_files, 1);
    assert_eq!(fs::read(&dest).expect("read dest"), b"committed");
    assert_eq!(
        remaining_files(dir.path()),
        vec![".key.q9w8e7.partial".to_string(), "vault.db".to_string()]
    );
}

#[test]
fn repeated_writes_leave_no_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("vault.db");
    for round in 0..5u8 {
        atomic_write_bytes(&dest, &[round; 64]).expect("write");
    }
    assert_eq!(fs::read(&dest).expect("read"), vec![4u8; 64]);
    assert_eq!(remaining_files(dir.path()), vec!["vault.db".to_string()]);
}

#[test]
fn recovery_leaves_scratch_files_of_longer_siblings_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("vault.db");
    fs::write(&dest, b"committed").expect("write dest");
    // In-flight write of `vault.db.x`, a different destination sharing the prefix.
    fs::write(dir.path().join(".vault.db.x.AbC123.partial"), b"sibling").expect("write scratch");
    fs::write(dir.path().join(".vault.db.Zz9Yy8.partial"), b"torn").expect("write own scratch");

    let outcome = recover_atomic_file(&dest).expect("recover");
    assert_eq!(outcome.discarded_scratch_files, 1);
    assert_eq!(
        remaining_files(dir.path()),
        vec![".vault.db.x.AbC123.partial".to_string(), "vault.db".to_string()]
    );
}

#[test]
fn user_files_with_temp_like_names_are_never_promoted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("notes.txt");
    atomic_write_bytes(&dest, b"original").expect("write dest");
    atomic_write_bytes(dir.path().join("notes.txt.tmp"), b"other file").expect("write sibling");

    assert!(recover_atomic_file(&dest).expect("recover").is_clean());
    assert_eq!(fs::read(&dest).expect("read dest"), b"original");
    assert_eq!(
        fs::read(dir.path().join("notes.txt.tmp")).expect("read sibling"),
        b"other file"
    );
}
