use sleepnight_core::db::open_db_in_memory;
use sleepnight_core::{
    NightRepository, NightStore, RepoError, SleepNight, SqliteNightRepository, QUALITY_UNSET,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn night(start: i64, end: i64, quality: i32) -> SleepNight {
    SleepNight {
        night_id: 0,
        start_time_milli: start,
        end_time_milli: end,
        sleep_quality: quality,
    }
}

#[test]
fn insert_assigns_increasing_keys_and_get_roundtrips() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteNightRepository::new(&conn);

    let first = night(1_000, 2_000, 3);
    let second = night(3_000, 4_000, QUALITY_UNSET);
    let first_id = repo.insert(&first).unwrap();
    let second_id = repo.insert(&second).unwrap();

    assert_ne!(first_id, second_id);
    assert!(second_id > first_id);

    let loaded = repo.get(first_id).unwrap().unwrap();
    assert_eq!(
        loaded,
        SleepNight {
            night_id: first_id,
            ..first
        }
    );
}

#[test]
fn insert_ignores_caller_supplied_key() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteNightRepository::new(&conn);

    let mut supplied = night(1_000, 1_000, QUALITY_UNSET);
    supplied.night_id = 42;
    let id = repo.insert(&supplied).unwrap();

    assert_eq!(id, 1);
    assert!(repo.get(42).unwrap().is_none());
}

#[test]
fn get_missing_key_returns_none() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteNightRepository::new(&conn);

    assert!(repo.get(7).unwrap().is_none());
    assert!(repo.get_tonight().unwrap().is_none());
    assert!(repo.get_all_nights().unwrap().is_empty());
}

#[test]
fn update_replaces_full_row_and_keeps_key() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteNightRepository::new(&conn);

    let id = repo.insert(&night(1_000, 1_000, QUALITY_UNSET)).unwrap();
    let replacement = SleepNight {
        night_id: id,
        start_time_milli: 900,
        end_time_milli: 30_000,
        sleep_quality: 5,
    };
    repo.update(&replacement).unwrap();

    assert_eq!(repo.get(id).unwrap().unwrap(), replacement);
}

#[test]
fn update_not_found_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteNightRepository::new(&conn);

    let mut missing = night(1_000, 2_000, 1);
    missing.night_id = 99;
    let err = repo.update(&missing).unwrap_err();

    assert!(matches!(err, RepoError::NotFound(99)));
    assert!(repo.get_all_nights().unwrap().is_empty());
}

#[test]
fn listing_is_newest_first_and_tonight_is_max_key() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteNightRepository::new(&conn);

    let k1 = repo.insert(&night(1, 1, QUALITY_UNSET)).unwrap();
    let k2 = repo.insert(&night(2, 2, QUALITY_UNSET)).unwrap();
    let k3 = repo.insert(&night(3, 3, QUALITY_UNSET)).unwrap();

    let ids: Vec<_> = repo
        .get_all_nights()
        .unwrap()
        .into_iter()
        .map(|n| n.night_id)
        .collect();
    assert_eq!(ids, vec![k3, k2, k1]);
    assert_eq!(repo.get_tonight().unwrap().unwrap().night_id, k3);
}

#[test]
fn clear_removes_everything_and_keys_are_not_reused() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteNightRepository::new(&conn);

    let k1 = repo.insert(&night(1, 1, QUALITY_UNSET)).unwrap();
    let k2 = repo.insert(&night(2, 2, QUALITY_UNSET)).unwrap();
    repo.clear().unwrap();

    assert!(repo.get(k1).unwrap().is_none());
    assert!(repo.get(k2).unwrap().is_none());
    assert!(repo.get_tonight().unwrap().is_none());
    assert!(repo.get_all_nights().unwrap().is_empty());

    let k3 = repo.insert(&night(3, 3, QUALITY_UNSET)).unwrap();
    assert!(k3 > k2);
}

#[test]
fn store_runs_the_tracking_scenario() {
    let store = NightStore::open_in_memory().unwrap();

    let a = night(1_000, 1_000, QUALITY_UNSET);
    let a_id = store.insert(&a).unwrap();
    assert_eq!(a_id, 1);

    let mut tonight = store.get_tonight().unwrap().unwrap();
    assert_eq!(tonight, SleepNight { night_id: 1, ..a });

    tonight.sleep_quality = 3;
    store.update(&tonight).unwrap();
    assert_eq!(store.get(1).unwrap().unwrap().sleep_quality, 3);

    let b_id = store.insert(&night(5_000, 5_000, QUALITY_UNSET)).unwrap();
    assert_eq!(b_id, 2);

    let ids: Vec<_> = store
        .get_all_nights()
        .unwrap()
        .into_iter()
        .map(|n| n.night_id)
        .collect();
    assert_eq!(ids, vec![2, 1]);

    store.clear().unwrap();
    assert!(store.get_all_nights().unwrap().is_empty());
    assert!(store.get_tonight().unwrap().is_none());

    store.close().unwrap();
}

#[test]
fn store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nights.db");

    let store = NightStore::open(&path).unwrap();
    let id = store.insert(&night(10, 20, 4)).unwrap();
    store.close().unwrap();

    let reopened = NightStore::open(&path).unwrap();
    let loaded = reopened.get(id).unwrap().unwrap();
    assert_eq!(loaded.start_time_milli, 10);
    assert_eq!(loaded.end_time_milli, 20);
    assert_eq!(loaded.sleep_quality, 4);

    reopened.clear().unwrap();
    let next = reopened.insert(&night(30, 30, QUALITY_UNSET)).unwrap();
    assert!(next > id);
}

#[test]
fn concurrent_inserts_get_unique_keys() {
    let store = Arc::new(NightStore::open_in_memory().unwrap());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..25)
                    .map(|i| store.insert(&night(worker * 100 + i, 0, QUALITY_UNSET)).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let ids: HashSet<_> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(ids.len(), 100);
    assert_eq!(store.get_all_nights().unwrap().len(), 100);
    assert_eq!(store.get_tonight().unwrap().unwrap().night_id, 100);
}

#[test]
fn store_works_as_generic_repository() {
    fn count<R: NightRepository>(repo: R) -> usize {
        repo.get_all_nights().unwrap().len()
    }

    let store = NightStore::open_in_memory().unwrap();
    store.insert(&night(1, 1, QUALITY_UNSET)).unwrap();

    assert_eq!(count(&store), 1);
}
