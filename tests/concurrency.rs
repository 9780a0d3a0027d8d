use json_docstore::queue::SerialQueue;
use json_docstore::{Error, Patch, Store};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Store {
    Store::builder()
        .path(dir.path())
        .backups(false)
        .build()
        .unwrap()
}

// ---- store --------------------------------------------------------------------

#[test]
fn concurrent_adds_lose_nothing() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open(&dir));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..25)
                    .map(|i| store.add(json!({ "t": t, "i": i })).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for h in handles {
        ids.extend(h.join().unwrap());
    }
    assert_eq!(ids.len(), 200);
    assert_eq!(store.len().unwrap(), 200);
    assert_eq!(store.version().unwrap(), 200);

    // the file agrees with memory
    drop(store);
    let reopened = open(&dir);
    assert_eq!(reopened.len().unwrap(), 200);
}

#[test]
fn concurrent_edits_on_one_record_all_apply() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open(&dir));
    let id = store.add(json!({ "base": true })).unwrap();

    let handles: Vec<_> = (0..10)
        .map(|t| {
            let store = Arc::clone(&store);
            let id = id.clone();
            thread::spawn(move || {
                store
                    .edit(id.as_str(), Patch::new().set(format!("f{t}"), t))
                    .unwrap()
            })
        })
        .collect();
    for h in handles {
        assert!(h.join().unwrap());
    }

    let rec = store.get(&id).unwrap().unwrap();
    for t in 0..10 {
        assert_eq!(rec[&format!("f{t}")], json!(t));
    }
}

#[test]
fn concurrent_sweeps_never_double_count() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open(&dir));
    store.add_many((0..50).map(|n| json!({ "n": n }))).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store
                    .sweep(json_docstore::Filter::predicate(|_| true))
                    .unwrap()
            })
        })
        .collect();
    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 50);
    assert!(store.is_empty().unwrap());
}

// ---- queue --------------------------------------------------------------------

#[test]
fn queue_runs_in_submission_order() {
    let (queue, worker) = SerialQueue::start("test-queue", Vec::<u32>::new()).unwrap();
    let pending: Vec<_> = (0..100)
        .map(|i| queue.submit(move |log: &mut Vec<u32>| {
            log.push(i);
            Ok(log.len())
        }))
        .collect();
    let lens: Vec<usize> = pending.into_iter().map(|p| p.wait().unwrap()).collect();
    assert_eq!(lens, (1..=100).collect::<Vec<_>>());

    let log = queue.submit(|log: &mut Vec<u32>| Ok(log.clone())).wait().unwrap();
    assert_eq!(log, (0..100).collect::<Vec<_>>());
    drop(queue);
    drop(worker);
}

#[test]
fn queue_survives_errors_and_panics() {
    let (queue, worker) = SerialQueue::start("test-queue", 0u32).unwrap();

    let failed = queue.submit(|_: &mut u32| -> json_docstore::Result<()> {
        Err(Error::Validation("nope".into()))
    });
    let panicked = queue.submit(|_: &mut u32| -> json_docstore::Result<()> { panic!("boom") });
    let after = queue.submit(|n: &mut u32| {
        *n += 1;
        Ok(*n)
    });

    assert_eq!(failed.wait(), Err(Error::Validation("nope".into())));
    assert_eq!(panicked.wait(), Err(Error::TaskPanicked("boom".into())));
    assert_eq!(after.wait(), Ok(1));
    drop(queue);
    drop(worker);
}

#[test]
fn dropped_pending_does_not_stall_queue() {
    let (queue, worker) = SerialQueue::start("test-queue", 0u32).unwrap();
    drop(queue.submit(|n: &mut u32| {
        *n += 1;
        Ok(())
    }));
    assert_eq!(queue.submit(|n: &mut u32| Ok(*n)).wait(), Ok(1));
    drop(queue);
    drop(worker);
}

#[test]
fn queue_drains_before_worker_exits() {
    let (queue, worker) = SerialQueue::start("test-queue", 0u32).unwrap();
    let pending: Vec<_> = (0..10)
        .map(|_| {
            queue.submit(|n: &mut u32| {
                *n += 1;
                Ok(*n)
            })
        })
        .collect();
    drop(queue);
    drop(worker);
    let last = pending.into_iter().map(|p| p.wait().unwrap()).last();
    assert_eq!(last, Some(10));
}
