//! Recurring backup timer.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Background thread that calls a backup closure once per interval.
///
/// Dropping the scheduler wakes the thread immediately and joins it. A backup
/// that is already running finishes first; a backup already handed to the
/// operation queue still runs.
pub struct BackupScheduler {
    interval: Duration,
    stop_tx: Option<mpsc::SyncSender<()>>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl BackupScheduler {
    /// Spawn the timer. The first backup fires one `interval` from now.
    pub fn start<F>(interval: Duration, backup_fn: F) -> std::io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::sync_channel::<()>(0);

        let join_handle = thread::Builder::new()
            .name("docstore-backups".to_owned())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => backup_fn(),
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            interval,
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        })
    }

    /// Time between backups.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(h) = self.join_handle.take() {
            let _ = h.join();
        }
    }
}

impl std::fmt::Debug for BackupScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupScheduler")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
