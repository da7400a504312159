//! Thread-safe night store with a live "all nights" listing.
//!
//! # Responsibility
//! - Own one migrated SQLite connection and serialize access to it.
//! - Run every repository operation under that lock.
//! - Re-notify listing subscribers after each committed write.
//!
//! # Invariants
//! - Writes are totally ordered by the connection lock.
//! - A change signal is enqueued before the writer releases the lock, so
//!   notification order follows commit order.
//! - Reads observe every write that returned before them.
//! - Callbacks run on the dispatcher thread with no store lock held.

pub mod live;

use crate::db::{open_db_with, DbError, StoreConfig, StoreLocation};
use crate::model::sleep_night::{NightId, SleepNight};
use crate::repo::night_repo::{NightRepository, RepoError, RepoResult, SqliteNightRepository};
use live::{lock, DispatchSignal, SubscriberTable};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

pub use live::{NightsCallback, SubscriptionId};

const DISPATCHER_THREAD_NAME: &str = "sleepnight-live";

struct StoreState {
    conn: Connection,
    signals: Option<Sender<DispatchSignal>>,
}

impl StoreState {
    fn signal(&self, signal: DispatchSignal) {
        if let Some(signals) = &self.signals {
            // Send only fails once the dispatcher is gone, i.e. during close.
            let _ = signals.send(signal);
        }
    }
}

struct Shared {
    state: Mutex<StoreState>,
    subscribers: Mutex<SubscriberTable>,
}

impl Shared {
    fn load_all(&self) -> RepoResult<Vec<SleepNight>> {
        let state = lock(&self.state);
        SqliteNightRepository::new(&state.conn).get_all_nights()
    }
}

/// Durable single-table store of sleep nights.
///
/// Construct with one of the `open*` functions and share it by reference or
/// `Arc`; every operation blocks the caller until SQLite has finished.
pub struct NightStore {
    shared: Arc<Shared>,
    dispatcher: Option<JoinHandle<()>>,
    dispatcher_thread: ThreadId,
}

impl NightStore {
    /// Opens (or creates) a durable store at `path`.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::open_with(
            &StoreLocation::File(path.as_ref().to_path_buf()),
            &StoreConfig::default(),
        )
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> RepoResult<Self> {
        Self::open_with(&StoreLocation::Memory, &StoreConfig::default())
    }

    /// Opens a store at `location` and starts its listing dispatcher.
    pub fn open_with(location: &StoreLocation, config: &StoreConfig) -> RepoResult<Self> {
        let conn = open_db_with(location, config)?;
        let (signals, receiver) = mpsc::channel();

        let shared = Arc::new(Shared {
            state: Mutex::new(StoreState {
                conn,
                signals: Some(signals),
            }),
            subscribers: Mutex::new(SubscriberTable::default()),
        });

        let dispatcher_shared = Arc::clone(&shared);
        let dispatcher = thread::Builder::new()
            .name(DISPATCHER_THREAD_NAME.to_string())
            .spawn(move || {
                live::run_dispatcher(receiver, &dispatcher_shared.subscribers, || {
                    dispatcher_shared.load_all()
                });
            })
            .map_err(DbError::Io)?;
        let dispatcher_thread = dispatcher.thread().id();

        Ok(Self {
            shared,
            dispatcher: Some(dispatcher),
            dispatcher_thread,
        })
    }

    /// Registers `callback` for the live listing.
    ///
    /// The callback first receives the current listing, then the full
    /// recomputed listing after committed writes. Bursts of writes may be
    /// folded into one delivery; the last delivery always reflects the
    /// latest committed state.
    pub fn subscribe_all_nights<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[SleepNight]) + Send + 'static,
    {
        let id = lock(&self.shared.subscribers).register(Box::new(callback));
        lock(&self.shared.state).signal(DispatchSignal::Subscribed(id));
        debug!("event=live_subscribe module=store status=ok subscription_id={id}");
        id
    }

    /// Cancels a subscription. Returns `false` when `id` is not active.
    ///
    /// After this returns the callback is not invoked again and has been
    /// dropped, unless it is the callback currently running the unsubscribe,
    /// in which case it is dropped as soon as it returns.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = lock(&self.shared.subscribers).remove(id);
        match removed {
            Some(subscriber) => {
                subscriber.release(thread::current().id() == self.dispatcher_thread);
                debug!("event=live_unsubscribe module=store status=ok subscription_id={id}");
                true
            }
            None => false,
        }
    }

    /// Number of active listing subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }

    /// Stops the dispatcher and closes the connection.
    ///
    /// Pending notifications are delivered before the dispatcher exits.
    pub fn close(mut self) -> RepoResult<()> {
        self.stop_dispatcher();
        let shared = Arc::clone(&self.shared);
        drop(self);

        match Arc::try_unwrap(shared) {
            Ok(shared) => {
                let state = shared
                    .state
                    .into_inner()
                    .unwrap_or_else(PoisonError::into_inner);
                state
                    .conn
                    .close()
                    .map_err(|(_, err)| RepoError::from(err))?;
                info!("event=store_close module=store status=ok");
                Ok(())
            }
            Err(_) => {
                warn!(
                    "event=store_close module=store status=deferred reason=closed_from_dispatcher"
                );
                Ok(())
            }
        }
    }

    fn stop_dispatcher(&mut self) {
        lock(&self.shared.state).signals.take();

        if let Some(handle) = self.dispatcher.take() {
            // Joining from a callback would wait on ourselves.
            if thread::current().id() == self.dispatcher_thread {
                return;
            }
            if handle.join().is_err() {
                error!("event=store_close module=store status=error error_code=dispatcher_panicked");
            }
        }
    }

    fn read<T>(
        &self,
        event: &'static str,
        op: impl FnOnce(&SqliteNightRepository<'_>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let state = lock(&self.shared.state);
        let result = op(&SqliteNightRepository::new(&state.conn));
        if let Err(err) = &result {
            error!("event={event} module=store status=error error={err}");
        }
        result
    }

    fn write<T>(
        &self,
        event: &'static str,
        op: impl FnOnce(&SqliteNightRepository<'_>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let started_at = Instant::now();
        let state = lock(&self.shared.state);
        let result = op(&SqliteNightRepository::new(&state.conn));

        match &result {
            Ok(_) => {
                state.signal(DispatchSignal::Changed);
                debug!(
                    "event={event} module=store status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
            }
            Err(RepoError::NotFound(id)) => {
                warn!("event={event} module=store status=error error_code=not_found night_id={id}");
            }
            Err(err) => {
                error!(
                    "event={event} module=store status=error duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
            }
        }

        result
    }
}

impl NightRepository for NightStore {
    fn insert(&self, night: &SleepNight) -> RepoResult<NightId> {
        self.write("night_insert", |repo| repo.insert(night))
    }

    fn update(&self, night: &SleepNight) -> RepoResult<()> {
        self.write("night_update", |repo| repo.update(night))
    }

    fn get(&self, key: NightId) -> RepoResult<Option<SleepNight>> {
        self.read("night_get", |repo| repo.get(key))
    }

    fn clear(&self) -> RepoResult<()> {
        self.write("night_clear", |repo| repo.clear())
    }

    fn get_tonight(&self) -> RepoResult<Option<SleepNight>> {
        self.read("night_get_tonight", |repo| repo.get_tonight())
    }

    fn get_all_nights(&self) -> RepoResult<Vec<SleepNight>> {
        self.read("night_list", |repo| repo.get_all_nights())
    }
}

impl Drop for NightStore {
    fn drop(&mut self) {
        self.stop_dispatcher();
    }
}
