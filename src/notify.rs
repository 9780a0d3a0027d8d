//! Change notifications.
//!
//! The store publishes an [`Event`] to its [`NotificationSink`] after every
//! successful mutation and backup action. Events are published on the calling
//! thread once the change has been written, never from the queue worker.

use crate::queue::panic_message;
use crate::record::Record;
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc;

/// Something that happened to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic", rename_all = "camelCase")]
pub enum Event {
    /// One or more records were added in a single write.
    Added {
        /// The stored records, `_id` included.
        records: Vec<Record>,
    },
    /// A record was patched.
    Edited {
        /// Record before the edit.
        old: Record,
        /// Record after the edit.
        new: Record,
    },
    /// A record was swapped out wholesale.
    Replaced {
        /// Record before the replace.
        old: Record,
        /// Record after the replace.
        new: Record,
    },
    /// A record was removed.
    Deleted {
        /// The removed record.
        record: Record,
    },
    /// Every record was removed.
    Emptied,
    /// The backup timer started.
    BackupsStarted,
    /// The backup timer stopped.
    BackupsStopped,
    /// A snapshot was written.
    Backup {
        /// Where the snapshot lives.
        path: PathBuf,
        /// `true` when the timer triggered it.
        scheduled: bool,
    },
    /// The table was restored from its snapshot.
    Restore,
}

impl Event {
    /// Topic name, e.g. `"added"` or `"backupsStarted"`.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Event::Added { .. } => "added",
            Event::Edited { .. } => "edited",
            Event::Replaced { .. } => "replaced",
            Event::Deleted { .. } => "deleted",
            Event::Emptied => "emptied",
            Event::BackupsStarted => "backupsStarted",
            Event::BackupsStopped => "backupsStopped",
            Event::Backup { .. } => "backup",
            Event::Restore => "restore",
        }
    }
}

/// Receives store events.
///
/// `publish` runs on the thread whose operation produced the event, after the
/// write has landed and outside the operation queue. A sink may call back into
/// the store, including further mutations. Each publish holds up only the
/// caller that triggered it; for scheduled backups that is the timer thread,
/// so a sink must not call [`Store::stop_backups`](crate::Store::stop_backups)
/// while handling [`Event::Backup`] with `scheduled` set. A panicking sink is
/// logged and does not turn the operation into an error.
pub trait NotificationSink: Send + Sync {
    /// Deliver one event.
    fn publish(&self, event: &Event);
}

impl<F> NotificationSink for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn publish(&self, event: &Event) {
        self(event)
    }
}

/// Hand `event` to `sink`, logging a panic instead of unwinding into the
/// caller. The change the event describes has already been written.
pub(crate) fn deliver(sink: &dyn NotificationSink, event: &Event) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| sink.publish(event))) {
        let msg = panic_message(payload.as_ref());
        tracing::warn!(topic = event.topic(), panic = %msg, "notification sink panicked");
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn publish(&self, _event: &Event) {}
}

struct Subscriber {
    topics: Option<Vec<String>>,
    tx: mpsc::Sender<Event>,
}

/// Channel fan-out sink. Each subscriber gets its own receiver; receivers
/// that have been dropped are pruned on the next publish.
#[derive(Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Notifier {
    /// No subscribers yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event.
    pub fn subscribe(&self) -> mpsc::Receiver<Event> {
        self.add(None)
    }

    /// Receive only events whose [`topic`](Event::topic) is in `topics`.
    pub fn subscribe_to(&self, topics: &[&str]) -> mpsc::Receiver<Event> {
        self.add(Some(topics.iter().map(|t| (*t).to_owned()).collect()))
    }

    /// Live subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn add(&self, topics: Option<Vec<String>>) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(Subscriber { topics, tx });
        rx
    }
}

impl NotificationSink for Notifier {
    fn publish(&self, event: &Event) {
        let topic = event.topic();
        self.subscribers.lock().retain(|sub| {
            let wanted = sub
                .topics
                .as_ref()
                .map_or(true, |t| t.iter().any(|x| x == topic));
            !wanted || sub.tx.send(event.clone()).is_ok()
        });
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
