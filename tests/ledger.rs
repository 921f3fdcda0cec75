use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use schemact::ledger::{compute_hash, Ledger, LedgerState};
use schemact::lock::{self, LockOptions, LockOwner};
use schemact::Error;
use tempfile::TempDir;

fn ledger_in(dir: &TempDir) -> Ledger {
    Ledger::new(dir.path().join(".schemact_ledger.json"))
}

fn batch(files: &[(&str, &str)]) -> Vec<(String, Vec<u8>)> {
    files
        .iter()
        .map(|(name, content)| (name.to_string(), content.as_bytes().to_vec()))
        .collect()
}

#[test]
fn absent_ledger_loads_empty() {
    let dir = TempDir::new().unwrap();
    let state = ledger_in(&dir).load().unwrap();
    assert_eq!(state, LedgerState::default());
    assert_eq!(state.current_batch, 0);
}

#[test]
fn corrupted_ledger_is_an_integrity_error() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger_in(&dir);
    std::fs::write(ledger.path(), "{ not json").unwrap();
    let err = ledger.load().unwrap_err();
    match err {
        Error::Integrity(message) => assert!(message.contains("corrupted")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn record_batch_assigns_one_batch_and_timestamp() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger_in(&dir);
    let state = ledger
        .record_batch(&batch(&[("001_a.sigl", "alpha"), ("002_b.sigl", "beta")]))
        .unwrap();

    assert_eq!(state.current_batch, 1);
    assert_eq!(state.migrations.len(), 2);
    assert!(state.migrations.iter().all(|e| e.batch == 1));
    assert_eq!(
        state.migrations[0].applied_at, state.migrations[1].applied_at,
        "entries of one batch share one timestamp"
    );
    assert_eq!(state.migrations[0].hash, compute_hash(b"alpha"));

    // Atomic persist leaves no temp file and no lock behind.
    assert!(!ledger.temp_path().exists());
    assert!(!ledger.lock_path().exists());

    // The on-disk document uses the documented key names.
    let text = std::fs::read_to_string(ledger.path()).unwrap();
    assert!(text.contains("\"currentBatch\": 1"));
    assert!(text.contains("\"appliedAt\""));
    assert!(text.contains("\"hash\""));
}

#[test]
fn empty_record_batch_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger_in(&dir);
    let state = ledger.record_batch(&[]).unwrap();
    assert_eq!(state, LedgerState::default());
    assert!(!ledger.path().exists(), "no-op must not create the ledger");
}

#[test]
fn record_then_rollback_restores_previous_state() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger_in(&dir);
    let before = ledger
        .record_batch(&batch(&[("001_a.sigl", "alpha")]))
        .unwrap();

    ledger
        .record_batch(&batch(&[("002_b.sigl", "beta"), ("003_c.sigl", "gamma")]))
        .unwrap();
    let after = ledger.rollback_last_batch().unwrap();

    assert_eq!(after, before);
    assert_eq!(ledger.load().unwrap(), before);
}

#[test]
fn rollback_on_empty_ledger_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger_in(&dir);
    let state = ledger.rollback_last_batch().unwrap();
    assert_eq!(state.current_batch, 0);
}

#[test]
fn pending_preserves_discovery_order() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger_in(&dir);
    let state = ledger
        .record_batch(&batch(&[("002_b.sigl", "beta")]))
        .unwrap();

    let discovered = vec![
        "001_a.sigl".to_string(),
        "002_b.sigl".to_string(),
        "003_c.sigl".to_string(),
    ];
    assert_eq!(
        state.pending(&discovered),
        vec!["001_a.sigl".to_string(), "003_c.sigl".to_string()]
    );
}

#[test]
fn last_batch_entries_come_back_reversed() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger_in(&dir);
    let state = ledger
        .record_batch(&batch(&[("001_a.sigl", "a"), ("002_b.sigl", "b")]))
        .unwrap();
    let entries = state.last_batch_entries();
    assert_eq!(entries[0].filename, "002_b.sigl");
    assert_eq!(entries[1].filename, "001_a.sigl");
}

#[test]
fn integrity_detects_missing_and_modified_files() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger_in(&dir);
    let state = ledger
        .record_batch(&batch(&[("001_a.sigl", "original")]))
        .unwrap();

    let empty: HashMap<String, Vec<u8>> = HashMap::new();
    let err = state.validate_integrity(&empty).unwrap_err();
    assert!(matches!(&err, Error::Integrity(m) if m.contains("missing")));
    assert!(err.to_string().contains("001_a.sigl"));

    let mut modified = HashMap::new();
    modified.insert("001_a.sigl".to_string(), b"tampered".to_vec());
    let err = state.validate_integrity(&modified).unwrap_err();
    assert!(matches!(&err, Error::Integrity(m) if m.contains("modified")));

    let mut intact = HashMap::new();
    intact.insert("001_a.sigl".to_string(), b"original".to_vec());
    state.validate_integrity(&intact).unwrap();
}

// --- lock behavior ---

fn quick_lock() -> LockOptions {
    LockOptions {
        acquire_timeout_ms: 200,
        retry_delay_ms: 10,
        ..LockOptions::default()
    }
}

#[test]
fn lock_is_exclusive_until_released() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.lock");

    let guard = lock::acquire(&path, &quick_lock()).unwrap();
    let err = lock::acquire(&path, &quick_lock()).unwrap_err();
    match err {
        Error::Integrity(message) => {
            assert!(message.contains("could not acquire ledger lock"));
            assert!(message.contains(&std::process::id().to_string()));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    guard.release().unwrap();
    lock::acquire(&path, &quick_lock()).unwrap().release().unwrap();
}

#[test]
fn concurrent_acquirers_never_overlap() {
    let dir = TempDir::new().unwrap();
    let path = Arc::new(dir.path().join("ledger.lock"));
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let path = Arc::clone(&path);
        let inside = Arc::clone(&inside);
        let overlaps = Arc::clone(&overlaps);
        handles.push(std::thread::spawn(move || {
            let options = LockOptions {
                acquire_timeout_ms: 5_000,
                retry_delay_ms: 5,
                ..LockOptions::default()
            };
            let guard = lock::acquire(&path, &options).unwrap();
            if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(25));
            inside.fetch_sub(1, Ordering::SeqCst);
            guard.release().unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

fn write_lock_file(path: &std::path::Path, owner: &LockOwner) {
    std::fs::write(path, serde_json::to_string_pretty(owner).unwrap()).unwrap();
}

fn dead_pid() -> u32 {
    // A child that has already been reaped is guaranteed dead.
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();
    pid
}

#[test]
fn stale_same_host_lock_from_dead_process_is_stolen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.lock");
    write_lock_file(
        &path,
        &LockOwner {
            pid: dead_pid(),
            hostname: lock::local_hostname(),
            lock_id: "11111111-1111-1111-1111-111111111111".to_string(),
            acquired_at: (chrono::Utc::now() - chrono::Duration::hours(2)).to_rfc3339(),
        },
    );

    let guard = lock::acquire(&path, &quick_lock()).unwrap();
    guard.release().unwrap();
}

#[test]
fn foreign_host_lock_is_never_stolen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.lock");
    write_lock_file(
        &path,
        &LockOwner {
            pid: dead_pid(),
            hostname: "definitely-not-this-host".to_string(),
            lock_id: "22222222-2222-2222-2222-222222222222".to_string(),
            acquired_at: (chrono::Utc::now() - chrono::Duration::hours(2)).to_rfc3339(),
        },
    );

    let err = lock::acquire(&path, &quick_lock()).unwrap_err();
    assert!(matches!(&err, Error::Integrity(m) if m.contains("definitely-not-this-host")));
    assert!(path.exists());
}

#[test]
fn fresh_lock_from_dead_process_is_not_stolen() {
    // Dead owner, but younger than the staleness threshold: wait it out.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.lock");
    write_lock_file(
        &path,
        &LockOwner {
            pid: dead_pid(),
            hostname: lock::local_hostname(),
            lock_id: "33333333-3333-3333-3333-333333333333".to_string(),
            acquired_at: chrono::Utc::now().to_rfc3339(),
        },
    );

    let err = lock::acquire(&path, &quick_lock()).unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));
    assert!(path.exists());
}

#[test]
fn corrupt_lock_file_is_an_integrity_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.lock");
    std::fs::write(&path, "garbage").unwrap();

    let err = lock::acquire(&path, &quick_lock()).unwrap_err();
    assert!(matches!(&err, Error::Integrity(m) if m.contains("corrupted")));
}

#[test]
fn force_unlock_removes_any_lock() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger_in(&dir);
    std::fs::write(ledger.lock_path(), "whatever").unwrap();
    assert!(ledger.force_unlock().unwrap());
    assert!(!ledger.lock_path().exists());
    assert!(!ledger.force_unlock().unwrap());
}

#[test]
fn record_batch_times_out_while_lock_is_held() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".schemact_ledger.json");
    let ledger = Ledger::with_lock_options(&path, quick_lock());

    let holder = lock::acquire(&ledger.lock_path(), &quick_lock()).unwrap();
    let err = ledger
        .record_batch(&batch(&[("001_a.sigl", "a")]))
        .unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));
    assert!(!path.exists(), "ledger must stay untouched on lock timeout");
    holder.release().unwrap();
}
