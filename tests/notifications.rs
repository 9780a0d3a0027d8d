use json_docstore::{Event, Filter, Notifier, Patch, Store};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::{mpsc, Arc, Weak};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn open_with(dir: &TempDir, notifier: &Arc<Notifier>) -> Store {
    Store::builder()
        .path(dir.path())
        .backups(false)
        .sink(notifier.clone())
        .build()
        .unwrap()
}

#[test]
fn mutation_events_in_order() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(Notifier::new());
    let rx = notifier.subscribe();
    let store = open_with(&dir, &notifier);

    let id = store.add(json!({ "n": 1 })).unwrap();
    store.edit(id.as_str(), Patch::new().set("n", 2)).unwrap();
    store.replace(id.as_str(), json!({ "m": 3 })).unwrap();
    store.delete(id.as_str()).unwrap();
    store.empty().unwrap();

    let events: Vec<Event> = rx.try_iter().collect();
    let topics: Vec<_> = events.iter().map(Event::topic).collect();
    assert_eq!(topics, vec!["added", "edited", "replaced", "deleted", "emptied"]);

    match &events[1] {
        Event::Edited { old, new } => {
            assert_eq!(old["n"], json!(1));
            assert_eq!(new["n"], json!(2));
        }
        other => panic!("unexpected {other:?}"),
    }
    match &events[2] {
        Event::Replaced { old, new } => {
            assert_eq!(old["n"], json!(2));
            assert_eq!(Value::Object(new.clone()), json!({ "m": 3, "_id": id }));
        }
        other => panic!("unexpected {other:?}"),
    }
    match &events[3] {
        Event::Deleted { record } => assert_eq!(record["m"], json!(3)),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn batch_add_is_one_event() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(Notifier::new());
    let rx = notifier.subscribe();
    let store = open_with(&dir, &notifier);

    store.add_many(vec![json!({ "a": 1 }), json!({ "b": 2 })]).unwrap();
    let events: Vec<Event> = rx.try_iter().collect();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::Added { records } => {
            assert_eq!(records.len(), 2);
            assert!(records.iter().all(|r| r.contains_key("_id")));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn no_event_when_target_missing_or_invalid() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(Notifier::new());
    let rx = notifier.subscribe();
    let store = open_with(&dir, &notifier);

    store.edit("nope", Patch::new().set("a", 1)).unwrap();
    store.delete("nope").unwrap();
    let _ = store.add(json!({}));
    assert!(rx.try_recv().is_err());
}

#[test]
fn sweep_emits_one_delete_per_record() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(Notifier::new());
    let store = open_with(&dir, &notifier);
    store.add_many((0..4).map(|n| json!({ "n": n }))).unwrap();

    let deletes = notifier.subscribe_to(&["deleted"]);
    assert_eq!(store.sweep(Filter::predicate(|_| true)).unwrap(), 4);
    assert_eq!(deletes.try_iter().count(), 4);
}

#[test]
fn topic_filter_and_pruning() {
    let notifier = Notifier::new();
    let only_added = notifier.subscribe_to(&["added"]);
    let dropped = notifier.subscribe();
    drop(dropped);
    assert_eq!(notifier.subscriber_count(), 2);

    use json_docstore::NotificationSink;
    notifier.publish(&Event::Emptied);
    notifier.publish(&Event::Added { records: vec![] });

    assert_eq!(notifier.subscriber_count(), 1);
    let got: Vec<_> = only_added.try_iter().map(|e| e.topic()).collect();
    assert_eq!(got, vec!["added"]);
}

#[test]
fn closure_sink() {
    let dir = TempDir::new().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_sink = Arc::clone(&seen);
    let store = Store::builder()
        .path(dir.path())
        .backups(false)
        .sink(Arc::new(move |e: &Event| seen_in_sink.lock().push(e.topic())))
        .build()
        .unwrap();

    store.add(json!({ "a": 1 })).unwrap();
    store.empty().unwrap();
    assert_eq!(*seen.lock(), vec!["added", "emptied"]);
}

#[test]
fn sink_can_call_back_into_store() {
    let dir = TempDir::new().unwrap();
    let handle: Arc<OnceCell<Weak<Store>>> = Arc::new(OnceCell::new());
    let lens = Arc::new(Mutex::new(Vec::new()));

    let sink_handle = Arc::clone(&handle);
    let sink_lens = Arc::clone(&lens);
    let store = Arc::new(
        Store::builder()
            .path(dir.path())
            .backups(false)
            .sink(Arc::new(move |e: &Event| {
                let Event::Added { records } = e else { return };
                let Some(store) = sink_handle.get().and_then(Weak::upgrade) else {
                    return;
                };
                sink_lens.lock().push(store.len().unwrap());
                let id = records[0]["_id"].as_str().unwrap();
                store.edit(id, Patch::new().set("seen", true)).unwrap();
            }))
            .build()
            .unwrap(),
    );
    handle.set(Arc::downgrade(&store)).unwrap();

    let (tx, rx) = mpsc::channel();
    let worker_store = Arc::clone(&store);
    thread::spawn(move || {
        let _ = tx.send(worker_store.add(json!({ "a": 1 })));
    });
    let id = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("add did not finish")
        .unwrap();

    assert_eq!(*lens.lock(), vec![1]);
    assert_eq!(store.get(&id).unwrap().unwrap()["seen"], json!(true));
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn panicking_sink_does_not_fail_the_write() {
    let dir = TempDir::new().unwrap();
    let store = Store::builder()
        .path(dir.path())
        .backups(false)
        .sink(Arc::new(|_: &Event| panic!("listener bug")))
        .build()
        .unwrap();

    let id = store.add(json!({ "a": 1 })).unwrap();
    assert_eq!(store.len().unwrap(), 1);
    assert!(store.edit(id.as_str(), Patch::new().set("a", 2)).unwrap());
    assert!(store.delete(id.as_str()).unwrap());
    store.empty().unwrap();
    store.backup().unwrap();
    store.restore().unwrap();
    assert!(store.is_empty().unwrap());
}

#[test]
fn events_serialize_with_topic_tag() {
    let event = Event::Backup {
        path: "/tmp/x--backup.json".into(),
        scheduled: false,
    };
    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        json!({ "topic": "backup", "path": "/tmp/x--backup.json", "scheduled": false })
    );
    assert_eq!(
        serde_json::to_value(Event::BackupsStarted).unwrap(),
        json!({ "topic": "backupsStarted" })
    );
}
