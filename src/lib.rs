//! Embedded single-file JSON document store.
//!
//! Records are JSON objects keyed by a unique `_id`, kept together in one
//! file. Every read and write runs on a single serial queue, so concurrent
//! callers never lose each other's updates. Field and predicate queries,
//! partial edits, change notifications, and periodic backups come built in.
//!
//! ```rust,no_run
//! use json_docstore::{FilterOptions, Patch, Store};
//! use serde_json::json;
//!
//! let store = Store::builder().name("users").backups(false).build().unwrap();
//! let id = store.add(json!({ "name": "Ada" })).unwrap();
//! store.edit(id.as_str(), Patch::new().set("role", "admin")).unwrap();
//! let admins = store.only(json!({ "role": "ADMIN" }), FilterOptions::default()).unwrap();
//! assert_eq!(admins.len(), 1);
//! ```
//!
//! **Single-process only.** Calls are ordered within one process. If multiple
//! processes open the same file they will clobber each other.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod backup;
pub mod config;
pub mod duration;
pub mod error;
pub mod filter;
pub mod notify;
pub mod persist;
pub mod queue;
pub mod record;
pub mod serializer;
pub mod store;
pub mod table;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use filter::{Filter, FilterOptions, Patch};
pub use notify::{Event, NotificationSink, Notifier, NullSink};
pub use record::{Record, Table, ID_FIELD};
pub use store::{EnsureOutcome, Store, StoreBuilder, UpsertOutcome};
