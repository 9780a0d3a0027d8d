//! Core store type and builder.

use crate::backup::BackupScheduler;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterOptions, Patch};
use crate::notify::{deliver, Event, NotificationSink, NullSink};
use crate::queue::{QueueWorker, SerialQueue};
use crate::record::{into_record, supplied_id, to_record, Record, Table, ID_FIELD};
use crate::serializer::JsonSerializer;
use crate::table::TableFile;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// What [`Store::ensure`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// A matching record was already there; nothing was written.
    Exists,
    /// No match, so the record was added under this identifier.
    Added(String),
}

/// What [`Store::upsert`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The matching record was patched.
    Updated(String),
    /// No match, so a new record was added.
    Inserted(String),
}

/// Embedded JSON document store backed by a single file.
///
/// Every read and write goes through one serial queue, so operations from any
/// number of threads are applied one at a time in submission order, and each
/// read-modify-write sees the result of every write submitted before it. The
/// store is `Send + Sync`; share it behind an `Arc`.
///
/// Dropping the store stops the backup timer, lets queued operations finish,
/// and joins the worker thread.
pub struct Store {
    config: StoreConfig,
    interval: Duration,
    table_path: PathBuf,
    backup_path: PathBuf,
    sink: Arc<dyn NotificationSink>,
    // Field order is drop order: the timer holds a queue handle, and the
    // worker only exits once every queue handle is gone.
    backups: Mutex<Option<BackupScheduler>>,
    queue: SerialQueue<TableFile>,
    _worker: QueueWorker,
}

impl Store {
    /// Open (or create) a store with the given config.
    pub fn open(config: StoreConfig) -> Result<Self> {
        StoreBuilder::from_config(config).build()
    }

    /// Start configuring a new store with default settings.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    // ---- reads ----

    /// Record stored under `id`, or `None`.
    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        let id = id.to_owned();
        self.queue
            .submit(move |tf| Ok(tf.table().get(&id).cloned()))
            .wait()
    }

    /// Like [`get`](Self::get), deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>> {
        self.get(id)?
            .map(|r| {
                serde_json::from_value(Value::Object(r)).map_err(|e| Error::Format(e.to_string()))
            })
            .transpose()
    }

    /// Every record, in table order.
    pub fn all(&self) -> Result<Vec<Record>> {
        self.queue
            .submit(|tf| Ok(tf.table().records().cloned().collect()))
            .wait()
    }

    /// Snapshot of the whole table, keyed by identifier.
    pub fn object(&self) -> Result<Table> {
        self.queue.submit(|tf| Ok(tf.table().clone())).wait()
    }

    /// Records carrying every key/value pair of `fields`.
    ///
    /// Strings compare case-insensitively unless `options.strict` is set.
    pub fn only<T: Serialize>(&self, fields: T, options: FilterOptions) -> Result<Vec<Record>> {
        let filter = match Filter::fields(fields)? {
            Filter::ByFields { fields, .. } => Filter::ByFields { fields, options },
            other => other,
        };
        self.select(filter)
    }

    /// Records the predicate accepts, in table order.
    pub fn filter<F>(&self, pred: F) -> Result<Vec<Record>>
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.select(Filter::predicate(pred))
    }

    /// First record the predicate accepts.
    pub fn first<F>(&self, pred: F) -> Result<Option<Record>>
    where
        F: Fn(&Record) -> bool + Send + 'static,
    {
        self.queue
            .submit(move |tf| Ok(tf.table().records().find(|r| pred(r)).cloned()))
            .wait()
    }

    /// Records selected by any kind of filter.
    pub fn select(&self, filter: impl Into<Filter>) -> Result<Vec<Record>> {
        let filter = filter.into();
        self.queue
            .submit(move |tf| {
                Ok(tf
                    .table()
                    .entries()
                    .filter(|(id, r)| filter.matches(id, r))
                    .map(|(_, r)| r.clone())
                    .collect())
            })
            .wait()
    }

    /// `true` if the filter selects at least one record.
    pub fn has(&self, filter: impl Into<Filter>) -> Result<bool> {
        Ok(self.resolve_id(filter)?.is_some())
    }

    /// Identifier of the first record the filter selects.
    pub fn resolve_id(&self, filter: impl Into<Filter>) -> Result<Option<String>> {
        let filter = filter.into();
        self.queue
            .submit(move |tf| Ok(resolve_in(tf.table(), &filter)))
            .wait()
    }

    /// Number of records.
    pub fn len(&self) -> Result<usize> {
        self.queue.submit(|tf| Ok(tf.table().len())).wait()
    }

    /// `true` when the store holds no records.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of table writes since the store was opened.
    pub fn version(&self) -> Result<u64> {
        self.queue.submit(|tf| Ok(tf.version())).wait()
    }

    /// Path of the live table file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.table_path
    }

    /// Path of the backup snapshot.
    #[must_use]
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Config the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ---- writes ----

    /// Add one record and return its identifier.
    ///
    /// The record must serialize to a non-empty JSON object. A string `_id`
    /// is kept (and overwrites any record already stored under it); otherwise
    /// a fresh identifier is generated and stamped into `_id`.
    pub fn add<T: Serialize>(&self, doc: T) -> Result<String> {
        let record = to_record(doc, "value")?;
        let wanted = supplied_id(&record)?;
        let (id, event) = self
            .queue
            .submit(move |tf| {
                let mut next = tf.table().clone();
                let (id, stored) = insert_record(&mut next, record, wanted);
                tf.commit(next)?;
                tracing::debug!(id = %id, "added record");
                Ok((id, Event::Added { records: vec![stored] }))
            })
            .wait()?;
        self.notify(&event);
        Ok(id)
    }

    /// Add several records in a single write. Nothing is written if any of
    /// them is invalid.
    pub fn add_many<I, T>(&self, docs: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = T>,
        T: Serialize,
    {
        let mut batch = Vec::new();
        for (index, doc) in docs.into_iter().enumerate() {
            let record = to_record(doc, &format!("value [{index}]"))?;
            let wanted = supplied_id(&record)?;
            batch.push((record, wanted));
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let (ids, event) = self
            .queue
            .submit(move |tf| {
                let mut next = tf.table().clone();
                let mut ids = Vec::with_capacity(batch.len());
                let mut records = Vec::with_capacity(batch.len());
                for (record, wanted) in batch {
                    let (id, stored) = insert_record(&mut next, record, wanted);
                    ids.push(id);
                    records.push(stored);
                }
                tf.commit(next)?;
                tracing::debug!(count = ids.len(), "added records");
                Ok((ids, Event::Added { records }))
            })
            .wait()?;
        self.notify(&event);
        Ok(ids)
    }

    /// Patch the first record the filter selects. Returns `false` if nothing
    /// matched.
    pub fn edit(&self, filter: impl Into<Filter>, patch: impl Into<Patch>) -> Result<bool> {
        let filter = filter.into();
        let patch = patch.into();
        let event = self
            .queue
            .submit(move |tf| {
                let Some(id) = resolve_in(tf.table(), &filter) else {
                    return Ok(None);
                };
                let mut next = tf.table().clone();
                let (old, new) = apply_patch(&mut next, &id, &patch)?;
                tf.commit(next)?;
                tracing::debug!(id = %id, "edited record");
                Ok(Some(Event::Edited { old, new }))
            })
            .wait()?;
        Ok(self.notify_changed(event))
    }

    /// Swap the first record the filter selects for `doc`, keeping its
    /// identifier. Returns `false` if nothing matched.
    pub fn replace<T: Serialize>(&self, filter: impl Into<Filter>, doc: T) -> Result<bool> {
        let filter = filter.into();
        let mut record = to_record(doc, "replacement")?;
        let event = self
            .queue
            .submit(move |tf| {
                let Some(id) = resolve_in(tf.table(), &filter) else {
                    return Ok(None);
                };
                let mut next = tf.table().clone();
                record.insert(ID_FIELD.to_owned(), Value::String(id.clone()));
                let old = next
                    .insert(id.clone(), record.clone())
                    .ok_or_else(|| Error::NotFound(id.clone()))?;
                tf.commit(next)?;
                tracing::debug!(id = %id, "replaced record");
                Ok(Some(Event::Replaced { old, new: record }))
            })
            .wait()?;
        Ok(self.notify_changed(event))
    }

    /// Patch the first record the filter selects, or add the patch's fields
    /// as a new record when nothing matches. An identifier filter names the
    /// new record.
    pub fn upsert(
        &self,
        filter: impl Into<Filter>,
        patch: impl Into<Patch>,
    ) -> Result<UpsertOutcome> {
        let filter = filter.into();
        let patch = patch.into();
        let (outcome, event) = self
            .queue
            .submit(move |tf| {
                let mut next = tf.table().clone();
                if let Some(id) = resolve_in(tf.table(), &filter) {
                    let (old, new) = apply_patch(&mut next, &id, &patch)?;
                    tf.commit(next)?;
                    tracing::debug!(id = %id, "upsert edited record");
                    return Ok((UpsertOutcome::Updated(id), Event::Edited { old, new }));
                }
                let record =
                    into_record(Value::Object(patch.to_new_record()), "upsert value")?;
                let (id, stored) = insert_record(&mut next, record, forced_id(&filter));
                tf.commit(next)?;
                tracing::debug!(id = %id, "upsert added record");
                Ok((
                    UpsertOutcome::Inserted(id),
                    Event::Added { records: vec![stored] },
                ))
            })
            .wait()?;
        self.notify(&event);
        Ok(outcome)
    }

    /// Remove the first record the filter selects. Returns `false` if nothing
    /// matched.
    pub fn delete(&self, filter: impl Into<Filter>) -> Result<bool> {
        let filter = filter.into();
        let event = self
            .queue
            .submit(move |tf| {
                let Some(id) = resolve_in(tf.table(), &filter) else {
                    return Ok(None);
                };
                let mut next = tf.table().clone();
                let record = next
                    .remove(&id)
                    .ok_or_else(|| Error::NotFound(id.clone()))?;
                tf.commit(next)?;
                tracing::debug!(id = %id, "deleted record");
                Ok(Some(Event::Deleted { record }))
            })
            .wait()?;
        Ok(self.notify_changed(event))
    }

    /// Delete every record the filter selects, one queued delete each.
    ///
    /// Returns how many deletes went through. A failed delete is logged and
    /// skipped, so the count can be lower than the number of matches.
    pub fn sweep(&self, filter: impl Into<Filter>) -> Result<usize> {
        let filter = filter.into();
        let ids: Vec<String> = self
            .queue
            .submit(move |tf| {
                Ok(tf
                    .table()
                    .entries()
                    .filter(|(id, r)| filter.matches(id, r))
                    .map(|(id, _)| id.clone())
                    .collect())
            })
            .wait()?;

        let mut deleted = 0;
        for id in ids {
            match self.delete(Filter::ById(id.clone())) {
                Ok(true) => deleted += 1,
                Ok(false) => tracing::debug!(id = %id, "sweep target already gone"),
                Err(err) => tracing::warn!(id = %id, error = %err, "sweep delete failed"),
            }
        }
        Ok(deleted)
    }

    /// Remove every record. Only [`restore`](Self::restore) brings them back.
    pub fn empty(&self) -> Result<()> {
        self.queue
            .submit(|tf| {
                tf.commit(Table::new())?;
                tracing::debug!("emptied table");
                Ok(())
            })
            .wait()?;
        self.notify(&Event::Emptied);
        Ok(())
    }

    /// Add `doc` unless the filter already selects a record.
    ///
    /// With an identifier filter, the new record is stored under that
    /// identifier. `doc` is only validated when it is actually added.
    pub fn ensure<T: Serialize>(
        &self,
        filter: impl Into<Filter>,
        doc: T,
    ) -> Result<EnsureOutcome> {
        let filter = filter.into();
        let value = serde_json::to_value(doc).map_err(|e| Error::Serialize(e.to_string()))?;
        let added = self
            .queue
            .submit(move |tf| {
                if resolve_in(tf.table(), &filter).is_some() {
                    return Ok(None);
                }
                let record = into_record(value, "value")?;
                let wanted = match forced_id(&filter) {
                    Some(id) => Some(id),
                    None => supplied_id(&record)?,
                };
                let mut next = tf.table().clone();
                let (id, stored) = insert_record(&mut next, record, wanted);
                tf.commit(next)?;
                tracing::debug!(id = %id, "ensure added record");
                Ok(Some((id, Event::Added { records: vec![stored] })))
            })
            .wait()?;
        match added {
            Some((id, event)) => {
                self.notify(&event);
                Ok(EnsureOutcome::Added(id))
            }
            None => Ok(EnsureOutcome::Exists),
        }
    }

    fn notify(&self, event: &Event) {
        deliver(self.sink.as_ref(), event);
    }

    /// Publish `event` if there is one. Returns whether anything changed.
    fn notify_changed(&self, event: Option<Event>) -> bool {
        match event {
            Some(event) => {
                self.notify(&event);
                true
            }
            None => false,
        }
    }

    // ---- backups ----

    /// Start the recurring backup timer.
    ///
    /// Fails with [`Error::State`] if it is already running.
    pub fn start_backups(&self) -> Result<()> {
        let mut slot = self.backups.lock();
        if slot.is_some() {
            return Err(Error::State("backups already running".into()));
        }
        let queue = self.queue.clone();
        let sink = Arc::clone(&self.sink);
        let scheduler = BackupScheduler::start(self.interval, move || {
            if let Err(err) = run_backup(&queue, &sink, true) {
                tracing::warn!(error = %err, "scheduled backup failed");
            }
        })?;
        *slot = Some(scheduler);
        drop(slot);
        tracing::info!(interval = ?self.interval, "backups started");
        self.notify(&Event::BackupsStarted);
        Ok(())
    }

    /// Stop the backup timer. A backup already queued still runs.
    ///
    /// Fails with [`Error::State`] if the timer is not running.
    pub fn stop_backups(&self) -> Result<()> {
        let scheduler = self
            .backups
            .lock()
            .take()
            .ok_or_else(|| Error::State("backups are not running".into()))?;
        drop(scheduler);
        tracing::info!("backups stopped");
        self.notify(&Event::BackupsStopped);
        Ok(())
    }

    /// `true` while the backup timer is running.
    #[must_use]
    pub fn backups_running(&self) -> bool {
        self.backups.lock().is_some()
    }

    /// Snapshot the table file now, replacing the previous snapshot.
    pub fn backup(&self) -> Result<()> {
        run_backup(&self.queue, &self.sink, false)
    }

    /// Replace the table with the last snapshot.
    ///
    /// Fails with [`Error::NotFound`] if no snapshot exists. The data
    /// directory and table file are recreated if they were removed.
    pub fn restore(&self) -> Result<()> {
        if !self.backup_path.exists() {
            return Err(Error::NotFound(format!(
                "no backup at {}",
                self.backup_path.display()
            )));
        }
        self.queue.submit(|tf| tf.restore()).wait()?;
        self.notify(&Event::Restore);
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.table_path)
            .field("backup_path", &self.backup_path)
            .field("backups_running", &self.backups_running())
            .finish_non_exhaustive()
    }
}

fn run_backup(
    queue: &SerialQueue<TableFile>,
    sink: &Arc<dyn NotificationSink>,
    scheduled: bool,
) -> Result<()> {
    let path = queue
        .submit(|tf| Ok(tf.backup()?.to_path_buf()))
        .wait()?;
    deliver(sink.as_ref(), &Event::Backup { path, scheduled });
    Ok(())
}

/// First identifier the filter selects in `table`.
fn resolve_in(table: &Table, filter: &Filter) -> Option<String> {
    match filter {
        Filter::ById(id) => table.contains(id).then(|| id.clone()),
        _ => table
            .entries()
            .find(|(id, r)| filter.matches(id, r))
            .map(|(id, _)| id.clone()),
    }
}

fn forced_id(filter: &Filter) -> Option<String> {
    match filter {
        Filter::ById(id) => Some(id.clone()),
        _ => None,
    }
}

/// Stamp `_id` and store. Uses `wanted` when given, else a fresh identifier.
fn insert_record(
    table: &mut Table,
    mut record: Record,
    wanted: Option<String>,
) -> (String, Record) {
    let id = wanted.unwrap_or_else(|| table.fresh_id());
    record.insert(ID_FIELD.to_owned(), Value::String(id.clone()));
    table.insert(id.clone(), record.clone());
    (id, record)
}

fn apply_patch(table: &mut Table, id: &str, patch: &Patch) -> Result<(Record, Record)> {
    let record = table
        .get_mut(id)
        .ok_or_else(|| Error::NotFound(id.to_owned()))?;
    let old = record.clone();
    patch.apply(record);
    Ok((old, record.clone()))
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures and opens a [`Store`].
///
/// ```rust,no_run
/// use json_docstore::Store;
///
/// let store = Store::builder()
///     .name("users")
///     .path("/var/lib/myapp")
///     .backup_interval("1 hour")
///     .build()
///     .unwrap();
/// ```
pub struct StoreBuilder {
    config: StoreConfig,
    sink: Arc<dyn NotificationSink>,
}

impl StoreBuilder {
    fn new() -> Self {
        Self::from_config(StoreConfig::default())
    }

    /// Start from an existing config.
    pub fn from_config(config: StoreConfig) -> Self {
        Self {
            config,
            sink: Arc::new(NullSink),
        }
    }

    /// Store name (default: `"store"`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Data directory (default: `<cwd>/XennonStore`).
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.path = path.as_ref().to_path_buf();
        self
    }

    /// Start the backup timer on open (default: `true`).
    pub fn backups(mut self, enabled: bool) -> Self {
        self.config.backups_enabled = enabled;
        self
    }

    /// Time between scheduled backups (default: `"30 minutes"`).
    pub fn backup_interval(mut self, interval: impl Into<String>) -> Self {
        self.config.backups_interval = interval.into();
        self
    }

    /// Write human-readable JSON with indentation (default: compact).
    pub fn pretty(mut self, yes: bool) -> Self {
        self.config.pretty = yes;
        self
    }

    /// Where events go (default: nowhere).
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Create the directory and table file if needed, load the table, and
    /// start the queue worker (and the backup timer, if enabled).
    pub fn build(self) -> Result<Store> {
        let interval = self.config.validate()?;
        let serializer = if self.config.pretty {
            JsonSerializer::pretty()
        } else {
            JsonSerializer::new()
        };

        let table_path = self.config.table_path();
        let backup_path = self.config.backup_path();
        let table_file = TableFile::open(
            self.config.dir().to_path_buf(),
            table_path.clone(),
            backup_path.clone(),
            serializer,
        )?;
        let (queue, worker) = SerialQueue::start("docstore-queue", table_file)?;

        let store = Store {
            config: self.config,
            interval,
            table_path,
            backup_path,
            sink: self.sink,
            backups: Mutex::new(None),
            queue,
            _worker: worker,
        };
        if store.config.backups_enabled {
            store.start_backups()?;
        }
        Ok(store)
    }
}

impl std::fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
