//! Chaos testing for concurrent access.
//!
//! Tests concurrent operations to find race conditions and deadlocks:
//! - Concurrent writers on one handle
//! - Readers and writers mixed with transactions
//! - Concurrent temporary namespace creation
//! - Prefix processors that call back into the handle

// Chaos tests use expect/unwrap/panic for simplicity - panics are acceptable in tests
// Excessive nesting is acceptable in concurrent test code with thread spawns
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::excessive_nesting
)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use sqlkv::storage::sql::new_open_db;
use sqlkv::{PrefixReader, Reader, SqlStorage, Storage, StorageConfig, Transaction, Writer};
use tempfile::TempDir;

const THREADS: usize = 8;
const OPS_PER_THREAD: usize = 50;

fn shared_memory_db() -> Arc<SqlStorage> {
    Arc::new(new_open_db("sqlite3", ":memory:", "chaos").unwrap())
}

/// Test: concurrent puts from many threads all land.
#[test]
fn test_concurrent_puts() {
    let db = shared_memory_db();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    let key = format!("t{t:02}/k{i:03}");
                    db.put(key.as_bytes(), &[t as u8]).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    assert_eq!(db.keys_by_prefix(b"").unwrap().len(), THREADS * OPS_PER_THREAD);
    for t in 0..THREADS {
        let prefix = format!("t{t:02}/");
        let values = db.fetch_by_prefix(prefix.as_bytes()).unwrap();
        assert_eq!(values.len(), OPS_PER_THREAD);
        assert!(values.iter().all(|v| v == &[t as u8]));
    }
}

/// Test: readers never observe uncommitted transaction writes.
#[test]
fn test_readers_never_see_uncommitted_writes() {
    let db = shared_memory_db();
    let violations = Arc::new(AtomicUsize::new(0));

    let writers: Vec<_> = (0..THREADS / 2)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    let mut tx = db.open_transaction().unwrap();
                    let key = format!("pending/{t}/{i}");
                    tx.put(key.as_bytes(), b"uncommitted").unwrap();
                    if i % 2 == 0 {
                        tx.discard().unwrap();
                    } else {
                        tx.put(key.as_bytes(), b"committed").unwrap();
                        tx.commit().unwrap();
                    }
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..THREADS / 2)
        .map(|_| {
            let db = Arc::clone(&db);
            let violations = Arc::clone(&violations);
            thread::spawn(move || {
                for _ in 0..OPS_PER_THREAD {
                    for value in db.fetch_by_prefix(b"pending/").unwrap() {
                        if value != b"committed" {
                            violations.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().expect("thread panicked");
    }

    assert_eq!(violations.load(Ordering::Relaxed), 0);
    assert_eq!(
        db.keys_by_prefix(b"pending/").unwrap().len(),
        (THREADS / 2) * (OPS_PER_THREAD / 2)
    );
}

/// Test: concurrent temporary namespaces get distinct tables.
#[test]
fn test_concurrent_create_temporary() {
    let db = shared_memory_db();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let temp = db.create_temporary().unwrap();
                temp.put(b"owner", &[t as u8]).unwrap();
                assert_eq!(temp.get(b"owner").unwrap(), vec![t as u8]);
                temp.table_name().to_string()
            })
        })
        .collect();

    let names: HashSet<String> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread panicked"))
        .collect();
    assert_eq!(names.len(), THREADS);
    assert!(!db.has_prefix(b"owner").unwrap());
}

/// Test: a prefix processor can write through the same handle without deadlocking.
#[test]
fn test_processor_reentry_does_not_deadlock() {
    let db = shared_memory_db();
    for i in 0..20 {
        db.put(format!("src/{i:02}").as_bytes(), b"v").unwrap();
    }

    db.process_by_prefix(b"src/", |key, value| {
        let mut copy = b"dst/".to_vec();
        copy.extend_from_slice(&key[4..]);
        db.put(&copy, value)?;
        db.delete(key)
    })
    .unwrap();

    assert!(!db.has_prefix(b"src/").unwrap());
    assert_eq!(db.keys_by_prefix(b"dst/").unwrap().len(), 20);
}

/// Test: separate handles on one file database interleave writes safely.
#[test]
fn test_concurrent_handles_on_file_database() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::default()
        .with_data_source(dir.path().join("chaos.db").to_string_lossy())
        .with_table_name("shared");

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let config = config.clone();
            thread::spawn(move || {
                let db = SqlStorage::from_config(&config).unwrap();
                for i in 0..OPS_PER_THREAD {
                    db.put(format!("h{t}/{i:03}").as_bytes(), b"x").unwrap();
                }
                db.close().unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    let db = SqlStorage::from_config(&config).unwrap();
    assert_eq!(db.keys_by_prefix(b"h").unwrap().len(), 4 * OPS_PER_THREAD);
}
