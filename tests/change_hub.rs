use async_trait::async_trait;
use serde_json::json;
use showroom_sync::components::change_hub::{
    callback, ChangeEvent, ChangeHub, ChangeKind, ChangeSource, ChangeStream, ChangeTopic,
    LocalChangeSource, ViewSubscriptions,
};
use showroom_sync::error::{subscription_error, SyncResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn counter() -> (Arc<AtomicUsize>, showroom_sync::components::change_hub::ChangeCallback) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let cb = callback(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (count, cb)
}

fn change(topic: ChangeTopic) -> ChangeEvent {
    ChangeEvent::new(topic, ChangeKind::Update, json!({"id": 42}))
}

/// Takes a while to open, then fails
struct SlowFailingSource;

#[async_trait]
impl ChangeSource for SlowFailingSource {
    async fn open(&self, _topic: ChangeTopic) -> SyncResult<ChangeStream> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Err(subscription_error("connection reset"))
    }

    fn name(&self) -> &'static str {
        "slow-failing"
    }
}

/// Local bus that takes a while to open and counts how often it was opened
struct SlowLocalSource {
    bus: LocalChangeSource,
    opens: AtomicUsize,
}

#[async_trait]
impl ChangeSource for SlowLocalSource {
    async fn open(&self, topic: ChangeTopic) -> SyncResult<ChangeStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.bus.open(topic).await
    }

    fn name(&self) -> &'static str {
        "slow-local"
    }
}

struct FailingSource;

#[async_trait]
impl ChangeSource for FailingSource {
    async fn open(&self, _topic: ChangeTopic) -> SyncResult<ChangeStream> {
        Err(subscription_error("connection refused"))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[tokio::test]
async fn test_every_subscriber_sees_event_once() {
    let hub = ChangeHub::detached();
    let (a, cb_a) = counter();
    let (b, cb_b) = counter();
    let (c, cb_c) = counter();

    hub.subscribe(ChangeTopic::Clients, cb_a).await.unwrap();
    hub.subscribe(ChangeTopic::Clients, cb_b).await.unwrap();
    let handle_c = hub.subscribe(ChangeTopic::Clients, cb_c).await.unwrap();

    assert_eq!(hub.dispatch(&change(ChangeTopic::Clients)), 3);
    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 1);
    assert_eq!(c.load(Ordering::SeqCst), 1);

    assert!(hub.unsubscribe(&handle_c));
    assert_eq!(hub.dispatch(&change(ChangeTopic::Clients)), 2);
    assert_eq!(a.load(Ordering::SeqCst), 2);
    assert_eq!(b.load(Ordering::SeqCst), 2);
    assert_eq!(c.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unsubscribe_before_event() {
    let hub = ChangeHub::detached();
    let (a, cb_a) = counter();
    let (b, cb_b) = counter();

    hub.subscribe(ChangeTopic::Vehicles, cb_a).await.unwrap();
    let handle_b = hub.subscribe(ChangeTopic::Vehicles, cb_b).await.unwrap();
    hub.unsubscribe(&handle_b);

    hub.dispatch(&change(ChangeTopic::Vehicles));
    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 0);

    // Second release is a no-op
    assert!(!hub.unsubscribe(&handle_b));
    assert!(!hub.is_active(&handle_b));
}

#[tokio::test]
async fn test_topics_are_isolated() {
    let hub = ChangeHub::detached();
    let (clients, cb) = counter();
    hub.subscribe(ChangeTopic::Clients, cb).await.unwrap();

    assert_eq!(hub.dispatch(&change(ChangeTopic::Vehicles)), 0);
    assert_eq!(clients.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_duplicate_registration_is_collapsed() {
    let hub = ChangeHub::detached();
    let (count, cb) = counter();

    let first = hub.subscribe(ChangeTopic::Chats, cb.clone()).await.unwrap();
    let second = hub.subscribe(ChangeTopic::Chats, cb.clone()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(hub.subscriber_count(ChangeTopic::Chats), 1);

    hub.dispatch(&change(ChangeTopic::Chats));
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // Same callback on another topic is a separate subscription
    let other = hub.subscribe(ChangeTopic::Documents, cb).await.unwrap();
    assert_ne!(first, other);
}

#[tokio::test]
async fn test_panicking_callback_does_not_block_others() {
    let hub = ChangeHub::detached();
    let (a, cb_a) = counter();
    let (b, cb_b) = counter();

    hub.subscribe(ChangeTopic::Employees, cb_a).await.unwrap();
    hub.subscribe(
        ChangeTopic::Employees,
        callback(|_| panic!("view already torn down")),
    )
    .await
    .unwrap();
    hub.subscribe(ChangeTopic::Employees, cb_b).await.unwrap();

    assert_eq!(hub.dispatch(&change(ChangeTopic::Employees)), 2);
    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_view_releases_on_drop() {
    let hub = ChangeHub::detached();
    let (count, cb) = counter();

    {
        let mut view = ViewSubscriptions::new(hub.clone(), "dashboard");
        view.watch_all(
            &[ChangeTopic::Clients, ChangeTopic::Vehicles, ChangeTopic::Appointments],
            cb,
        )
        .await
        .unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(hub.active_topics().len(), 3);

        hub.dispatch(&change(ChangeTopic::Vehicles));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    assert!(hub.active_topics().is_empty());
    assert_eq!(hub.dispatch(&change(ChangeTopic::Vehicles)), 0);
}

#[tokio::test]
async fn test_upstream_follows_subscribers() {
    let source = LocalChangeSource::new();
    let hub = ChangeHub::new(Arc::new(source.clone()));
    let (tx, mut rx) = mpsc::unbounded_channel();

    assert!(!hub.is_listening(ChangeTopic::Appointments));

    let handle = hub
        .subscribe(
            ChangeTopic::Appointments,
            callback(move |event| {
                let _ = tx.send(event.clone());
            }),
        )
        .await
        .unwrap();
    assert!(hub.is_listening(ChangeTopic::Appointments));

    source.emit(ChangeTopic::Clients, ChangeKind::Insert, json!({"id": 1}));
    source.emit(ChangeTopic::Appointments, ChangeKind::Delete, json!({"id": 2}));

    let event = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.topic, ChangeTopic::Appointments);
    assert_eq!(event.kind, ChangeKind::Delete);
    assert_eq!(event.payload, json!({"id": 2}));

    hub.unsubscribe(&handle);
    assert!(!hub.is_listening(ChangeTopic::Appointments));
}

#[tokio::test]
async fn test_failed_upstream_rolls_back_subscription() {
    let hub = ChangeHub::new(Arc::new(FailingSource));
    let (_, cb) = counter();

    assert!(hub.subscribe(ChangeTopic::Documents, cb).await.is_err());
    assert_eq!(hub.subscriber_count(ChangeTopic::Documents), 0);
    assert!(hub.active_topics().is_empty());
}

#[tokio::test]
async fn test_shutdown_rejects_new_subscriptions() {
    let hub = ChangeHub::detached();
    let (count, cb) = counter();
    hub.subscribe(ChangeTopic::GroupMessages, cb.clone())
        .await
        .unwrap();

    hub.shutdown();

    assert_eq!(hub.dispatch(&change(ChangeTopic::GroupMessages)), 0);
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(hub.subscribe(ChangeTopic::GroupMessages, cb).await.is_err());
}

#[tokio::test]
async fn test_failed_open_fails_every_waiting_subscriber() {
    let hub = ChangeHub::new(Arc::new(SlowFailingSource));
    let (_, cb_a) = counter();
    let (_, cb_b) = counter();

    let first_hub = hub.clone();
    let first =
        tokio::spawn(async move { first_hub.subscribe(ChangeTopic::Clients, cb_a).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = hub.subscribe(ChangeTopic::Clients, cb_b).await;

    assert!(first.await.unwrap().is_err());
    assert!(second.is_err());
    assert_eq!(hub.subscriber_count(ChangeTopic::Clients), 0);
    assert!(!hub.is_listening(ChangeTopic::Clients));
}

#[tokio::test]
async fn test_concurrent_subscribers_share_one_upstream() {
    let source = Arc::new(SlowLocalSource {
        bus: LocalChangeSource::new(),
        opens: AtomicUsize::new(0),
    });
    let hub = ChangeHub::new(source.clone());
    let (a, cb_a) = counter();
    let (b, cb_b) = counter();

    let first_hub = hub.clone();
    let first =
        tokio::spawn(async move { first_hub.subscribe(ChangeTopic::Vehicles, cb_a).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    hub.subscribe(ChangeTopic::Vehicles, cb_b).await.unwrap();
    first.await.unwrap().unwrap();

    assert_eq!(source.opens.load(Ordering::SeqCst), 1);
    assert!(hub.is_listening(ChangeTopic::Vehicles));

    source
        .bus
        .emit(ChangeTopic::Vehicles, ChangeKind::Update, json!({"id": 7}));

    timeout(Duration::from_secs(1), async {
        while a.load(Ordering::SeqCst) == 0 || b.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_local_bus_released_after_last_unsubscribe() {
    let source = LocalChangeSource::new();
    let hub = ChangeHub::new(Arc::new(source.clone()));
    let (_, cb_a) = counter();
    let (_, cb_b) = counter();

    let handle_a = hub.subscribe(ChangeTopic::Documents, cb_a).await.unwrap();
    let handle_b = hub.subscribe(ChangeTopic::Documents, cb_b).await.unwrap();
    assert_eq!(source.listener_count(), 1);

    hub.unsubscribe(&handle_a);
    assert!(hub.is_listening(ChangeTopic::Documents));

    hub.unsubscribe(&handle_b);
    assert!(!hub.is_listening(ChangeTopic::Documents));

    // Nothing is published, the forwarder must still let go of the bus
    timeout(Duration::from_secs(1), async {
        while source.listener_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
