//! Background cleanup thread
//!
//! Runs [`ExpiringCollection::cleanup`] on a fixed interval. The thread holds
//! only a weak reference, so it exits on its own once the collection is
//! dropped. Dropping the [`Cleaner`] stops and joins the thread.

use log::{debug, warn};
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::clock::Clock;
use super::collection::ExpiringCollection;
use crate::config::{ExpiryConfig, MIN_CLEANUP_INTERVAL_MS};

/// Handle to a running cleanup thread
pub struct Cleaner {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Cleaner {
    /// Start a thread that runs a cleanup pass every `interval`.
    ///
    /// Intervals shorter than [`MIN_CLEANUP_INTERVAL_MS`] are raised to it.
    pub fn spawn<T, C>(collection: &Arc<ExpiringCollection<T, C>>, interval: Duration) -> io::Result<Self>
    where
        T: Send + Sync + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let interval = interval.max(Duration::from_millis(MIN_CLEANUP_INTERVAL_MS));
        let weak: Weak<ExpiringCollection<T, C>> = Arc::downgrade(collection);
        let (stop, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("expiry-cleaner".to_string())
            .spawn(move || {
                debug!("cleaner started ({:?} interval)", interval);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => match weak.upgrade() {
                            Some(collection) => {
                                collection.cleanup();
                            }
                            None => break,
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("cleaner stopped");
            })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Start a cleaner using `cleanup_interval_ms` from the configuration.
    pub fn from_config<T, C>(collection: &Arc<ExpiringCollection<T, C>>, config: &ExpiryConfig) -> io::Result<Self>
    where
        T: Send + Sync + 'static,
        C: Clock + Send + Sync + 'static,
    {
        Self::spawn(collection, config.cleanup_interval())
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            // The receiver is gone if the thread already exited
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("cleaner thread panicked");
            }
        }
    }
}

impl Drop for Cleaner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
