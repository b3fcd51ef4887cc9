use crate::{
    Alphabet, DEFAULT_BUSY_TIMEOUT, DEFAULT_ID_LENGTH, Error, IdAuthority, Result, Store,
    TimeSource, UniformSource, eligible_rows,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tempfile::TempDir;

/// Returns a fixed position inside the window and records every window it
/// was asked for.
struct Scripted {
    pick_last: bool,
    windows: parking_lot::Mutex<Vec<u32>>,
}

impl Scripted {
    fn first() -> Self {
        Self {
            pick_last: false,
            windows: parking_lot::Mutex::new(Vec::new()),
        }
    }

    fn last() -> Self {
        Self {
            pick_last: true,
            ..Self::first()
        }
    }
}

impl UniformSource for Scripted {
    async fn uniform(&self, min: u32, max: u32) -> Result<u32> {
        self.windows.lock().push(max);
        Ok(if self.pick_last { max - 1 } else { min })
    }
}

/// Advances one millisecond per reading so insertion order is total.
struct StepClock(AtomicI64);

impl TimeSource for StepClock {
    fn current_millis(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

fn authority() -> Arc<IdAuthority> {
    Arc::new(IdAuthority::with_os_entropy(Alphabet::default(), DEFAULT_ID_LENGTH, 1024).unwrap())
}

async fn open<U: UniformSource>(dir: &TempDir, selector: U) -> Store<U, StepClock> {
    Store::open_with(
        dir.path().join("db"),
        DEFAULT_BUSY_TIMEOUT,
        authority(),
        selector,
        StepClock(AtomicI64::new(1_000)),
    )
    .await
    .unwrap()
}

async fn set_count<U: UniformSource>(store: &Store<U, StepClock>, id: &str, count: i64) {
    sqlx::query("UPDATE datas SET count = ? WHERE id = ?")
        .bind(count)
        .bind(id)
        .execute(&store.pool)
        .await
        .unwrap();
}

#[test]
fn eligible_rows_is_half_rounded_up_with_floor_of_one() {
    assert_eq!(eligible_rows(0), 1);
    assert_eq!(eligible_rows(1), 1);
    assert_eq!(eligible_rows(2), 1);
    assert_eq!(eligible_rows(3), 2);
    assert_eq!(eligible_rows(4), 2);
    assert_eq!(eligible_rows(5), 3);
    assert_eq!(eligible_rows(u32::MAX), 1 << 31);
}

#[tokio::test]
async fn created_hub_is_active_and_valid() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, Scripted::first()).await;

    let hub = store.create_hub().await.unwrap();
    assert!(store.ids().validate(&hub.id));
    assert!(hub.active);
    assert_eq!(hub.created, 1_000);
    assert_eq!(store.get_hub(&hub.id).await.unwrap(), Some(hub));
}

#[tokio::test]
async fn schema_bootstrap_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let hub_id = {
        let store = open(&dir, Scripted::first()).await;
        let hub = store.create_hub().await.unwrap();
        store.close().await;
        hub.id
    };

    let store = open(&dir, Scripted::first()).await;
    assert!(store.get_hub(&hub_id).await.unwrap().is_some());
}

#[tokio::test]
async fn selection_round_trips_content_and_counts_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, Scripted::first()).await;
    let hub = store.create_hub().await.unwrap();

    let content = vec![0_u8, 159, 146, 150, b'h', b't', 0xFF];
    let added = store.add_item(&hub.id, content.clone()).await.unwrap();
    assert_eq!(added.count, 0);
    assert!(added.active);

    let picked = store.select_item(&hub.id).await.unwrap().unwrap();
    assert_eq!(picked.id, added.id);
    assert_eq!(picked.content, content);
    assert_eq!(picked.count, 0);

    let after = store.get_item(&added.id).await.unwrap().unwrap();
    assert_eq!(after.count, 1);
}

#[tokio::test]
async fn empty_or_unknown_hub_selects_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, Scripted::first()).await;
    let hub = store.create_hub().await.unwrap();

    assert_eq!(store.select_item(&hub.id).await.unwrap(), None);
    assert_eq!(store.select_item("NoSuchHub0").await.unwrap(), None);
}

#[tokio::test]
async fn selection_never_crosses_hubs() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, authority()).await;
    let a = store.create_hub().await.unwrap();
    let b = store.create_hub().await.unwrap();

    for i in 0..5 {
        store.add_item(&a.id, format!("a{i}").into_bytes()).await.unwrap();
        store.add_item(&b.id, format!("b{i}").into_bytes()).await.unwrap();
    }

    for _ in 0..50 {
        let item = store.select_item(&a.id).await.unwrap().unwrap();
        assert_eq!(item.hub_id, a.id);
        assert!(item.content.starts_with(b"a"));
    }
}

#[tokio::test]
async fn only_the_least_used_half_is_eligible() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, Scripted::last()).await;
    let hub = store.create_hub().await.unwrap();

    let mut items = Vec::new();
    for count in [0, 0, 1, 1] {
        let item = store.add_item(&hub.id, vec![]).await.unwrap();
        set_count(&store, &item.id, count).await;
        items.push(item);
    }

    let picked = store.select_item(&hub.id).await.unwrap().unwrap();
    assert_eq!(*store.selector.windows.lock(), vec![2]);
    // Last slot of the window is the second count-0 item in insertion order.
    assert_eq!(picked.id, items[1].id);
    assert_eq!(picked.count, 0);
}

#[tokio::test]
async fn two_items_alternate() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, authority()).await;
    let hub = store.create_hub().await.unwrap();
    store.add_item(&hub.id, b"http://a".to_vec()).await.unwrap();
    store.add_item(&hub.id, b"http://b".to_vec()).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..6 {
        let item = store.select_item(&hub.id).await.unwrap().unwrap();
        seen.push(item.content_str().unwrap().to_owned());
    }
    assert_eq!(
        seen,
        ["http://a", "http://b", "http://a", "http://b", "http://a", "http://b"]
    );
}

#[tokio::test]
async fn deactivated_item_is_never_selected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, authority()).await;
    let hub = store.create_hub().await.unwrap();
    let gone = store.add_item(&hub.id, b"http://a".to_vec()).await.unwrap();
    let kept = store.add_item(&hub.id, b"http://b".to_vec()).await.unwrap();

    let deactivated = store.deactivate_item(&gone.id).await.unwrap().unwrap();
    assert!(!deactivated.active);
    assert_eq!(store.count_active_items(&hub.id).await.unwrap(), 1);

    for _ in 0..100 {
        let item = store.select_item(&hub.id).await.unwrap().unwrap();
        assert_eq!(item.id, kept.id);
    }

    // Idempotent; the row is still there.
    let again = store.deactivate_item(&gone.id).await.unwrap().unwrap();
    assert!(!again.active);
    assert_eq!(again.count, 0);

    store.deactivate_item(&kept.id).await.unwrap();
    assert_eq!(store.select_item(&hub.id).await.unwrap(), None);
}

#[tokio::test]
async fn deactivating_unknown_rows_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, Scripted::first()).await;
    assert_eq!(store.deactivate_item("NoSuchItem").await.unwrap(), None);
    assert_eq!(store.deactivate_hub("NoSuchHub0").await.unwrap(), None);
}

#[tokio::test]
async fn hub_deactivation_does_not_cascade() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, Scripted::first()).await;
    let hub = store.create_hub().await.unwrap();
    let item = store.add_item(&hub.id, b"x".to_vec()).await.unwrap();

    let hub = store.deactivate_hub(&hub.id).await.unwrap().unwrap();
    assert!(!hub.active);
    assert!(!store.get_hub(&hub.id).await.unwrap().unwrap().active);

    let picked = store.select_item(&hub.id).await.unwrap().unwrap();
    assert_eq!(picked.id, item.id);
}

#[tokio::test]
async fn items_may_reference_unknown_hubs() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, Scripted::first()).await;
    let item = store.add_item("OrphanHub0", b"x".to_vec()).await.unwrap();
    assert_eq!(item.hub_id, "OrphanHub0");
    assert!(store.get_hub("OrphanHub0").await.unwrap().is_none());
}

#[tokio::test]
async fn minted_item_ids_are_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, Scripted::first()).await;
    let hub = store.create_hub().await.unwrap();

    let mut ids = HashSet::new();
    for _ in 0..200 {
        let item = store.add_item(&hub.id, vec![1]).await.unwrap();
        assert!(store.ids().validate(&item.id));
        assert!(ids.insert(item.id));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_selections_do_not_lose_counts() {
    const SELECTIONS: usize = 40;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open(&dir, authority()).await);
    let hub = store.create_hub().await.unwrap();
    let item = store.add_item(&hub.id, b"only".to_vec()).await.unwrap();

    let handles: Vec<_> = (0..SELECTIONS)
        .map(|_| {
            let store = Arc::clone(&store);
            let hub_id = hub.id.clone();
            tokio::spawn(async move { store.select_item(&hub_id).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_some());
    }

    let item = store.get_item(&item.id).await.unwrap().unwrap();
    assert_eq!(item.count, SELECTIONS as i64);
}

#[tokio::test]
async fn closed_store_reports_storage_errors() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, Scripted::first()).await;
    store.close().await;

    let err = store.create_hub().await.unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));
    assert!(err.to_string().starts_with("could not create hub"));
}
