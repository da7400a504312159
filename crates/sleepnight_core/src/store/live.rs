//! Live listing subscriptions and their dispatcher thread.
//!
//! # Responsibility
//! - Track registered listing callbacks under stable subscription ids.
//! - Re-deliver the full night listing after each committed write.
//!
//! # Invariants
//! - Signals are consumed in the order writers enqueued them, which is
//!   commit order.
//! - Queued signals are coalesced; only the latest listing is delivered.
//! - No store lock is held while a callback runs.
//! - Once a subscription is released its callback is never invoked again.

use crate::model::sleep_night::SleepNight;
use crate::repo::night_repo::RepoResult;
use log::{debug, error, info};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Instant;

/// Callback receiving the full listing, newest night first.
pub type NightsCallback = Box<dyn Fn(&[SleepNight]) + Send + 'static>;

/// Handle returned by `NightStore::subscribe_all_nights`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work item sent from writers and subscribers to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchSignal {
    /// A write committed; every subscriber needs a fresh listing.
    Changed,
    /// A subscriber registered and still needs its first listing.
    Subscribed(SubscriptionId),
}

pub(crate) struct Subscriber {
    callback: Mutex<Option<NightsCallback>>,
}

impl Subscriber {
    fn deliver(&self, id: SubscriptionId, nights: &[SleepNight]) {
        let guard = lock(&self.callback);
        let Some(callback) = guard.as_ref() else {
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| callback(nights))).is_err() {
            error!(
                "event=live_dispatch module=store status=error subscription_id={id} error_code=subscriber_panicked"
            );
        }
    }

    /// Drops the callback so it is never called again.
    ///
    /// Off the dispatcher thread this waits for an in-flight delivery to
    /// finish. On the dispatcher thread the lock may be held by the very
    /// callback doing the unsubscribe; that delivery is the last one since
    /// the entry already left the table.
    pub(crate) fn release(&self, on_dispatcher_thread: bool) {
        if !on_dispatcher_thread {
            lock(&self.callback).take();
            return;
        }

        match self.callback.try_lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().take();
            }
            Err(TryLockError::WouldBlock) => {}
        }
    }
}

/// Registered subscribers keyed by id.
#[derive(Default)]
pub(crate) struct SubscriberTable {
    next_id: u64,
    entries: BTreeMap<SubscriptionId, Arc<Subscriber>>,
}

impl SubscriberTable {
    pub(crate) fn register(&mut self, callback: NightsCallback) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.insert(
            id,
            Arc::new(Subscriber {
                callback: Mutex::new(Some(callback)),
            }),
        );
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> Option<Arc<Subscriber>> {
        self.entries.remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn all(&self) -> Vec<(SubscriptionId, Arc<Subscriber>)> {
        self.entries
            .iter()
            .map(|(id, subscriber)| (*id, Arc::clone(subscriber)))
            .collect()
    }

    fn select(&self, ids: &BTreeSet<SubscriptionId>) -> Vec<(SubscriptionId, Arc<Subscriber>)> {
        ids.iter()
            .filter_map(|id| {
                self.entries
                    .get(id)
                    .map(|subscriber| (*id, Arc::clone(subscriber)))
            })
            .collect()
    }
}

/// Dispatcher loop. Returns once every signal sender is dropped.
///
/// `load` recomputes the listing; it takes the connection lock itself, so
/// the lock is released again before callbacks run.
pub(crate) fn run_dispatcher<L>(
    signals: Receiver<DispatchSignal>,
    subscribers: &Mutex<SubscriberTable>,
    load: L,
) where
    L: Fn() -> RepoResult<Vec<SleepNight>>,
{
    info!("event=live_dispatch module=store status=start");

    while let Ok(first) = signals.recv() {
        let started_at = Instant::now();
        let mut changed = false;
        let mut joined = BTreeSet::new();
        let mut coalesced = 0usize;

        for signal in std::iter::once(first).chain(signals.try_iter()) {
            coalesced += 1;
            match signal {
                DispatchSignal::Changed => changed = true,
                DispatchSignal::Subscribed(id) => {
                    joined.insert(id);
                }
            }
        }

        let targets = {
            let table = lock(subscribers);
            if changed {
                table.all()
            } else {
                table.select(&joined)
            }
        };
        if targets.is_empty() {
            continue;
        }

        let nights = match load() {
            Ok(nights) => nights,
            Err(err) => {
                error!(
                    "event=live_dispatch module=store status=error error_code=listing_query_failed error={err}"
                );
                continue;
            }
        };

        for (id, subscriber) in &targets {
            subscriber.deliver(*id, &nights);
        }

        debug!(
            "event=live_dispatch module=store status=ok subscribers={} rows={} signals={} duration_ms={}",
            targets.len(),
            nights.len(),
            coalesced,
            started_at.elapsed().as_millis()
        );
    }

    info!("event=live_dispatch module=store status=stop");
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
///
/// Every guarded value here stays consistent across a panic: SQLite
/// statements are atomic and subscriber maps are updated in one call.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
