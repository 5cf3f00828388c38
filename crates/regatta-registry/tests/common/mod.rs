//! Shared test bootstrap.

use regatta_registry::{Event, EventType, Store, DEFAULT_URI};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Dial the embedded engine, wipe the root and bootstrap it.
pub async fn setup(root: &str) -> Store {
    let store = Store::dial_uri(DEFAULT_URI, root)
        .await
        .expect("dial embedded engine");
    let store = store.reset().await.expect("reset tree");
    store.init().await.expect("init tree")
}

/// Receive the next event and assert its type.
#[allow(dead_code)]
pub async fn expect_event(rx: &mut mpsc::Receiver<Event>, kind: EventType) -> Event {
    match timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(event)) => {
            assert_eq!(event.kind, kind, "unexpected event {event:?}");
            event
        }
        Ok(None) => panic!("watcher hung up while waiting for {kind}"),
        Err(_) => panic!("timed out waiting for {kind}"),
    }
}
