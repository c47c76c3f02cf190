//! Store contract tests, run unmodified against every backend

use chrono::{DateTime, TimeDelta, Utc};
use liveness::{CallsignEmail, MemoryStore, RedbStore, SharedStore};
use std::sync::Arc;
use std::time::Duration;

/// A store plus whatever must outlive it
struct Fixture {
    store: SharedStore,
    _dir: Option<tempfile::TempDir>,
}

async fn open_memory() -> Fixture {
    Fixture {
        store: Arc::new(MemoryStore::new()),
        _dir: None,
    }
}

async fn open_redb() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbStore::open(dir.path().join("conformance.redb"), Duration::from_secs(5))
        .await
        .unwrap();
    Fixture {
        store: Arc::new(store),
        _dir: Some(dir),
    }
}

/// Timestamp strictly after everything written so far
async fn tick() -> DateTime<Utc> {
    tokio::time::sleep(Duration::from_millis(2)).await;
    let ts = Utc::now();
    tokio::time::sleep(Duration::from_millis(2)).await;
    ts
}

fn callsigns(list: &[liveness::CallsignTime]) -> Vec<&str> {
    list.iter().map(|c| c.callsign.as_str()).collect()
}

macro_rules! store_conformance {
    ($($backend:ident => $open:ident),* $(,)?) => {$(
        mod $backend {
            use super::*;

            #[tokio::test]
            async fn add_live_new() {
                let f = $open().await;
                let before = tick().await;
                f.store.add_live("FOO").await.unwrap();
                let after = tick().await;

                let ts = f.store.get_live("FOO").await.unwrap().expect("live record");
                assert!(before < ts && ts < after);
                assert_eq!(f.store.get_dead("FOO").await.unwrap(), None);
            }

            #[tokio::test]
            async fn add_live_existing_takes_latest_time() {
                let f = $open().await;
                f.store.add_live("FOO").await.unwrap();
                let between = tick().await;
                f.store.add_live("FOO").await.unwrap();
                let after = tick().await;

                let ts = f.store.get_live("FOO").await.unwrap().expect("live record");
                assert!(between < ts && ts < after);
                assert_eq!(f.store.count_live().await.unwrap(), 1);
            }

            #[tokio::test]
            async fn add_live_clears_dead() {
                let f = $open().await;
                f.store.add_dead("FOO", Utc::now()).await.unwrap();
                f.store.add_live("FOO").await.unwrap();

                assert_eq!(f.store.get_dead("FOO").await.unwrap(), None);
                assert_eq!(f.store.count_dead().await.unwrap(), 0);
                assert_eq!(f.store.count_live().await.unwrap(), 1);
            }

            #[tokio::test]
            async fn get_live_missing() {
                let f = $open().await;
                assert_eq!(f.store.get_live("NOEXIST").await.unwrap(), None);
            }

            #[tokio::test]
            async fn remove_live() {
                let f = $open().await;
                assert!(!f.store.remove_live("FOO", Utc::now()).await.unwrap());

                f.store.add_live("FOO").await.unwrap();
                assert!(f.store.get_live("FOO").await.unwrap().is_some());

                let cutoff = tick().await;
                assert!(f.store.remove_live("FOO", cutoff).await.unwrap());
                assert_eq!(f.store.get_live("FOO").await.unwrap(), None);
            }

            #[tokio::test]
            async fn remove_live_keeps_newer_record() {
                let f = $open().await;
                let cutoff = tick().await;
                f.store.add_live("FOO").await.unwrap();
                let stored = f.store.get_live("FOO").await.unwrap();

                assert!(!f.store.remove_live("FOO", cutoff).await.unwrap());
                assert_eq!(f.store.get_live("FOO").await.unwrap(), stored);
            }

            #[tokio::test]
            async fn list_live() {
                let f = $open().await;
                let start = Utc::now();
                assert!(f.store.list_live(Utc::now()).await.unwrap().is_empty());

                for call in ["FOO1", "FOO2", "FOO3"] {
                    f.store.add_live(call).await.unwrap();
                }
                let ts = tick().await;
                for call in ["FOO4", "FOO5"] {
                    f.store.add_live(call).await.unwrap();
                }

                let list = f.store.list_live(ts).await.unwrap();
                assert_eq!(callsigns(&list), ["FOO1", "FOO2", "FOO3"]);

                let list = f.store.list_live(tick().await).await.unwrap();
                assert_eq!(callsigns(&list), ["FOO1", "FOO2", "FOO3", "FOO4", "FOO5"]);

                let mut last_seen = start;
                for entry in &list {
                    assert!(last_seen < entry.last_seen);
                    last_seen = entry.last_seen;
                }
            }

            #[tokio::test]
            async fn list_live_orders_by_callsign() {
                let f = $open().await;
                for call in ["W7ZED", "AA1ABC", "KF7ABC"] {
                    f.store.add_live(call).await.unwrap();
                }

                let list = f.store.list_live(tick().await).await.unwrap();
                assert_eq!(callsigns(&list), ["AA1ABC", "KF7ABC", "W7ZED"]);
            }

            #[tokio::test]
            async fn count_live() {
                let f = $open().await;
                assert_eq!(f.store.count_live().await.unwrap(), 0);

                for (i, call) in ["FOO1", "FOO2", "FOO3"].iter().enumerate() {
                    f.store.add_live(call).await.unwrap();
                    assert_eq!(f.store.count_live().await.unwrap(), i + 1);
                }

                let cutoff = tick().await;
                for (i, call) in ["FOO1", "FOO2", "FOO3"].iter().enumerate() {
                    f.store.remove_live(call, cutoff).await.unwrap();
                    assert_eq!(f.store.count_live().await.unwrap(), 2 - i);
                }
            }

            #[tokio::test]
            async fn add_dead_new() {
                let f = $open().await;
                let last_seen = Utc::now() - TimeDelta::hours(30);
                f.store.add_dead("FOO", last_seen).await.unwrap();

                assert_eq!(f.store.get_dead("FOO").await.unwrap(), Some(last_seen));
            }

            #[tokio::test]
            async fn add_dead_existing_overwrites() {
                let f = $open().await;
                f.store.add_dead("FOO", Utc::now() - TimeDelta::hours(2)).await.unwrap();
                let newer = Utc::now();
                f.store.add_dead("FOO", newer).await.unwrap();

                assert_eq!(f.store.get_dead("FOO").await.unwrap(), Some(newer));
                assert_eq!(f.store.count_dead().await.unwrap(), 1);
            }

            #[tokio::test]
            async fn get_dead_missing() {
                let f = $open().await;
                assert_eq!(f.store.get_dead("NOEXIST").await.unwrap(), None);
            }

            #[tokio::test]
            async fn remove_dead() {
                let f = $open().await;
                f.store.remove_dead("FOO").await.unwrap();

                f.store.add_dead("FOO", Utc::now()).await.unwrap();
                assert!(f.store.get_dead("FOO").await.unwrap().is_some());

                f.store.remove_dead("FOO").await.unwrap();
                assert_eq!(f.store.get_dead("FOO").await.unwrap(), None);
            }

            #[tokio::test]
            async fn list_dead() {
                let f = $open().await;
                assert!(f.store.list_dead().await.unwrap().is_empty());

                for call in ["FOO3", "FOO1", "FOO5", "FOO2", "FOO4"] {
                    f.store.add_dead(call, Utc::now()).await.unwrap();
                }

                let list = f.store.list_dead().await.unwrap();
                assert_eq!(callsigns(&list), ["FOO1", "FOO2", "FOO3", "FOO4", "FOO5"]);
            }

            #[tokio::test]
            async fn count_dead() {
                let f = $open().await;
                assert_eq!(f.store.count_dead().await.unwrap(), 0);

                for call in ["FOO1", "FOO2", "FOO3"] {
                    f.store.add_dead(call, Utc::now()).await.unwrap();
                }
                assert_eq!(f.store.count_dead().await.unwrap(), 3);

                f.store.remove_dead("FOO1").await.unwrap();
                f.store.remove_dead("FOO2").await.unwrap();
                assert_eq!(f.store.count_dead().await.unwrap(), 1);
            }

            #[tokio::test]
            async fn demote_moves_and_preserves_last_seen() {
                let f = $open().await;
                f.store.add_live("FOO").await.unwrap();
                let seen = f.store.get_live("FOO").await.unwrap().unwrap();

                let demoted = f.store.demote("FOO", tick().await).await.unwrap();

                assert_eq!(demoted, Some(seen));
                assert_eq!(f.store.get_live("FOO").await.unwrap(), None);
                assert_eq!(f.store.get_dead("FOO").await.unwrap(), Some(seen));
            }

            #[tokio::test]
            async fn demote_skips_fresh_and_missing() {
                let f = $open().await;
                let cutoff = tick().await;
                f.store.add_live("FOO").await.unwrap();

                assert_eq!(f.store.demote("FOO", cutoff).await.unwrap(), None);
                assert_eq!(f.store.demote("NOEXIST", Utc::now()).await.unwrap(), None);
                assert!(f.store.get_live("FOO").await.unwrap().is_some());
                assert_eq!(f.store.count_dead().await.unwrap(), 0);
            }

            #[tokio::test]
            async fn email_round_trip() {
                let f = $open().await;
                f.store.remove_email("foo").await.unwrap();
                f.store.remove_email("foo").await.unwrap();
                assert_eq!(f.store.get_email("foo").await.unwrap(), None);

                f.store.add_email("foo", "bar").await.unwrap();
                assert_eq!(f.store.get_email("foo").await.unwrap().as_deref(), Some("bar"));

                f.store.add_email("foo", "bar,jitsu").await.unwrap();
                assert_eq!(
                    f.store.get_email("foo").await.unwrap().as_deref(),
                    Some("bar,jitsu")
                );

                f.store.remove_email("foo").await.unwrap();
                assert_eq!(f.store.get_email("foo").await.unwrap(), None);
            }

            #[tokio::test]
            async fn list_email() {
                let f = $open().await;
                assert!(f.store.list_email().await.unwrap().is_empty());

                for i in [3, 1, 5, 2, 4] {
                    f.store
                        .add_email(&format!("foo{i}"), &format!("bar{i}"))
                        .await
                        .unwrap();
                }
                let expected: Vec<CallsignEmail> = (1..=5)
                    .map(|i| CallsignEmail::new(format!("foo{i}"), format!("bar{i}")))
                    .collect();
                assert_eq!(f.store.list_email().await.unwrap(), expected);

                f.store.remove_email("foo4").await.unwrap();
                f.store.remove_email("foo5").await.unwrap();
                assert_eq!(f.store.list_email().await.unwrap(), expected[..3]);
            }

            #[tokio::test]
            async fn email_outlives_liveness_records() {
                let f = $open().await;
                f.store.add_email("FOO", "op@example.com").await.unwrap();
                f.store.add_live("FOO").await.unwrap();
                f.store.demote("FOO", tick().await).await.unwrap();
                f.store.remove_dead("FOO").await.unwrap();

                assert_eq!(
                    f.store.get_email("FOO").await.unwrap().as_deref(),
                    Some("op@example.com")
                );
            }
        }
    )*};
}

store_conformance! {
    memory => open_memory,
    redb => open_redb,
}
