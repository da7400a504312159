use sleepnight_core::{NightRepository, NightStore, SleepNight, QUALITY_UNSET};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn night(start: i64) -> SleepNight {
    SleepNight::starting_at(start)
}

fn ids(nights: &[SleepNight]) -> Vec<i64> {
    nights.iter().map(|n| n.night_id).collect()
}

fn subscribe(store: &NightStore) -> (sleepnight_core::SubscriptionId, Receiver<Vec<i64>>) {
    let (tx, rx) = mpsc::channel();
    let id = store.subscribe_all_nights(move |nights| {
        let _ = tx.send(ids(nights));
    });
    (id, rx)
}

/// Waits until a delivered listing equals `expected`.
fn wait_for(rx: &Receiver<Vec<i64>>, expected: &[i64]) {
    loop {
        let listing = rx
            .recv_timeout(WAIT)
            .unwrap_or_else(|_| panic!("listing {expected:?} was never delivered"));
        if listing == expected {
            return;
        }
    }
}

#[test]
fn new_subscriber_receives_current_listing() {
    let store = NightStore::open_in_memory().unwrap();
    store.insert(&night(1)).unwrap();
    store.insert(&night(2)).unwrap();

    let (_, rx) = subscribe(&store);

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), vec![2, 1]);
}

#[test]
fn every_write_kind_renotifies_with_full_listing() {
    let store = NightStore::open_in_memory().unwrap();
    let (_, rx) = subscribe(&store);
    wait_for(&rx, &[]);

    store.insert(&night(1)).unwrap();
    wait_for(&rx, &[1]);

    store.insert(&night(2)).unwrap();
    wait_for(&rx, &[2, 1]);

    let mut first = store.get(1).unwrap().unwrap();
    first.sleep_quality = 4;
    store.update(&first).unwrap();
    wait_for(&rx, &[2, 1]);

    store.clear().unwrap();
    wait_for(&rx, &[]);
}

#[test]
fn update_is_visible_in_delivered_rows() {
    let store = NightStore::open_in_memory().unwrap();
    let id = store.insert(&night(1)).unwrap();

    let (tx, rx) = mpsc::channel();
    store.subscribe_all_nights(move |nights| {
        let _ = tx.send(nights.to_vec());
    });
    let initial = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(initial[0].sleep_quality, QUALITY_UNSET);

    let mut rated = initial[0].clone();
    rated.sleep_quality = 2;
    store.update(&rated).unwrap();

    // The insert above may still be reported once more before the update.
    let updated = loop {
        let listing = rx.recv_timeout(WAIT).unwrap();
        if listing[0].sleep_quality != QUALITY_UNSET {
            break listing;
        }
    };
    assert_eq!(updated, vec![SleepNight { night_id: id, ..rated }]);
}

#[test]
fn burst_of_writes_converges_to_latest_state() {
    let store = NightStore::open_in_memory().unwrap();
    let (_, rx) = subscribe(&store);

    for start in 1..=20 {
        store.insert(&night(start)).unwrap();
    }

    let expected: Vec<i64> = (1..=20).rev().collect();
    wait_for(&rx, &expected);
}

#[test]
fn failed_update_does_not_notify() {
    let store = NightStore::open_in_memory().unwrap();
    let (_, rx) = subscribe(&store);
    wait_for(&rx, &[]);

    let mut missing = night(1);
    missing.night_id = 5;
    assert!(store.update(&missing).is_err());

    store.close().unwrap();
    assert!(rx.try_iter().next().is_none());
}

#[test]
fn unsubscribe_stops_delivery_and_drops_callback() {
    let store = NightStore::open_in_memory().unwrap();
    let (first_id, first_rx) = subscribe(&store);
    wait_for(&first_rx, &[]);

    assert!(store.unsubscribe(first_id));
    assert!(!store.unsubscribe(first_id));
    assert_eq!(store.subscriber_count(), 0);
    assert!(matches!(
        first_rx.try_recv(),
        Err(TryRecvError::Disconnected)
    ));

    store.insert(&night(1)).unwrap();
    let (_, second_rx) = subscribe(&store);
    wait_for(&second_rx, &[1]);
}

#[test]
fn callback_can_use_the_store_and_unsubscribe_itself() {
    let store = Arc::new(NightStore::open_in_memory().unwrap());
    let own_id = Arc::new(Mutex::new(None));
    let (tx, rx) = mpsc::channel();

    let id = {
        let store_in_callback = Arc::downgrade(&store);
        let own_id = Arc::clone(&own_id);
        store.subscribe_all_nights(move |nights| {
            let Some(store) = store_in_callback.upgrade() else {
                return;
            };
            let tonight = store.get_tonight().unwrap().map(|n| n.night_id);
            let _ = tx.send((nights.len(), tonight));
            if !nights.is_empty() {
                if let Some(id) = *own_id.lock().unwrap() {
                    store.unsubscribe(id);
                }
            }
        })
    };
    *own_id.lock().unwrap() = Some(id);

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), (0, None));

    store.insert(&night(1)).unwrap();
    let (len, tonight) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(len, 1);
    assert_eq!(tonight, Some(1));

    store.insert(&night(2)).unwrap();
    // The callback dropped its sender when it left the table.
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
    assert_eq!(store.subscriber_count(), 0);
}

#[test]
fn close_delivers_pending_notifications_first() {
    let store = NightStore::open_in_memory().unwrap();
    let (_, rx) = subscribe(&store);

    store.insert(&night(1)).unwrap();
    store.close().unwrap();

    let delivered: Vec<_> = rx.try_iter().collect();
    assert_eq!(delivered.last().unwrap(), &vec![1]);
}
