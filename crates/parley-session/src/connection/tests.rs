use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::memory::{MemoryChannel, MemoryConnector};

const POLL: Duration = Duration::from_millis(10);

fn manager(connector: &Arc<MemoryConnector>) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(
        Arc::clone(connector) as Arc<dyn Connector>,
        ChannelOptions::default(),
        POLL,
    ))
}

async fn nth_channel(connector: &MemoryConnector, n: usize) -> Arc<MemoryChannel> {
    for _ in 0..500 {
        if let Some(channel) = connector.channels().get(n - 1) {
            return Arc::clone(channel);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("channel #{n} was never opened");
}

#[tokio::test]
async fn connects_lazily_and_reuses_ready_channel() {
    let connector = Arc::new(MemoryConnector::new());
    let manager = manager(&connector);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(connector.open_count(), 0);

    let cancel = CancellationToken::new();
    let cred = Credential::new("t");
    let first = manager
        .ensure_ready(&cred, Duration::from_secs(1), &cancel)
        .await
        .unwrap();
    assert_eq!(manager.state(), ConnectionState::Ready);

    let second = manager
        .ensure_ready(&cred, Duration::from_secs(1), &cancel)
        .await
        .unwrap();
    assert_eq!(first.generation, second.generation);
    assert_eq!(connector.open_count(), 1);
    assert!(manager.is_current(first.generation));
}

#[tokio::test]
async fn reconnect_cap_fails_after_three_errors() {
    let connector = Arc::new(MemoryConnector::manual());
    let manager = manager(&connector);

    let task = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .ensure_ready(
                    &Credential::new("t"),
                    Duration::from_secs(5),
                    &CancellationToken::new(),
                )
                .await
        })
    };

    let channel = nth_channel(&connector, 1).await;
    for n in 1..=4 {
        channel.fire(events::CONNECT_ERROR, json!({ "message": format!("refused {n}") }));
    }

    let result = task.await.unwrap();
    assert_eq!(result.err(), Some(ConnectError::Failed("refused 3".into())));
    assert_eq!(manager.state(), ConnectionState::Failed);
    assert_eq!(manager.failed_attempts(), 3);
    assert!(channel.is_disconnected());
}

#[tokio::test]
async fn failed_state_retries_on_next_ensure_ready() {
    let connector = Arc::new(MemoryConnector::manual());
    let manager = manager(&connector);
    let cred = Credential::new("t");

    let task = {
        let manager = Arc::clone(&manager);
        let cred = cred.clone();
        tokio::spawn(async move {
            manager
                .ensure_ready(&cred, Duration::from_secs(5), &CancellationToken::new())
                .await
        })
    };
    let first = nth_channel(&connector, 1).await;
    for _ in 0..3 {
        first.fire(events::CONNECT_ERROR, json!("unreachable"));
    }
    assert!(task.await.unwrap().is_err());

    let task = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .ensure_ready(&cred, Duration::from_secs(5), &CancellationToken::new())
                .await
        })
    };
    let second = nth_channel(&connector, 2).await;
    second.fire(events::CONNECT, json!(null));

    assert!(task.await.unwrap().is_ok());
    assert_eq!(manager.state(), ConnectionState::Ready);
    assert_eq!(manager.failed_attempts(), 0);
}

#[tokio::test]
async fn connect_resets_error_count() {
    let connector = Arc::new(MemoryConnector::manual());
    let manager = manager(&connector);

    let task = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .ensure_ready(
                    &Credential::new("t"),
                    Duration::from_secs(5),
                    &CancellationToken::new(),
                )
                .await
        })
    };
    let channel = nth_channel(&connector, 1).await;
    channel.fire(events::CONNECT_ERROR, json!("flaky"));
    channel.fire(events::CONNECT_ERROR, json!("flaky"));
    channel.fire(events::CONNECT, json!(null));

    assert!(task.await.unwrap().is_ok());
    assert_eq!(manager.failed_attempts(), 0);
}

#[tokio::test]
async fn disconnect_event_leaves_ready() {
    let connector = Arc::new(MemoryConnector::new());
    let manager = manager(&connector);
    let ready = manager
        .ensure_ready(
            &Credential::new("t"),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    connector
        .last_channel()
        .unwrap()
        .fire(events::DISCONNECT, json!("transport close"));

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.is_current(ready.generation));
}

#[tokio::test]
async fn events_from_discarded_channel_are_ignored() {
    let connector = Arc::new(MemoryConnector::new());
    let manager = manager(&connector);
    let cancel = CancellationToken::new();

    manager
        .ensure_ready(&Credential::new("t"), Duration::from_secs(1), &cancel)
        .await
        .unwrap();
    let old = connector.last_channel().unwrap();

    manager.disconnect();
    manager
        .ensure_ready(&Credential::new("t"), Duration::from_secs(1), &cancel)
        .await
        .unwrap();
    assert_eq!(connector.open_count(), 2);

    old.fire(events::DISCONNECT, json!("late"));
    old.fire(events::CONNECT_ERROR, json!("late"));
    assert_eq!(manager.state(), ConnectionState::Ready);
    assert_eq!(manager.failed_attempts(), 0);
}

#[tokio::test]
async fn credential_change_discards_channel() {
    let connector = Arc::new(MemoryConnector::new());
    let manager = manager(&connector);
    let cancel = CancellationToken::new();

    manager
        .ensure_ready(&Credential::new("old"), Duration::from_secs(1), &cancel)
        .await
        .unwrap();
    let first = connector.last_channel().unwrap();

    manager
        .ensure_ready(&Credential::new("new"), Duration::from_secs(1), &cancel)
        .await
        .unwrap();
    let second = connector.last_channel().unwrap();

    assert!(first.is_disconnected());
    assert!(!second.is_disconnected());
    assert_eq!(second.credential().token(), "new");
    assert_eq!(connector.open_count(), 2);
}

#[tokio::test]
async fn invalidate_credential_disconnects_proactively() {
    let connector = Arc::new(MemoryConnector::new());
    let manager = manager(&connector);
    manager
        .ensure_ready(
            &Credential::new("t"),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    manager.invalidate_credential();

    assert!(connector.last_channel().unwrap().is_disconnected());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn no_connect_event_times_out_and_tears_down() {
    let connector = Arc::new(MemoryConnector::manual());
    let manager = manager(&connector);

    let result = manager
        .ensure_ready(
            &Credential::new("t"),
            Duration::from_millis(60),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(
        result.err(),
        Some(ConnectError::TimedOut(Duration::from_millis(60)))
    );
    let channel = connector.last_channel().unwrap();
    assert!(channel.emitted().is_empty());
    assert!(channel.is_disconnected());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn cancel_while_connecting_keeps_channel() {
    let connector = Arc::new(MemoryConnector::manual());
    let manager = manager(&connector);
    let cancel = CancellationToken::new();

    let task = {
        let manager = Arc::clone(&manager);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            manager
                .ensure_ready(&Credential::new("t"), Duration::from_secs(5), &cancel)
                .await
        })
    };
    let channel = nth_channel(&connector, 1).await;
    cancel.cancel();

    assert_eq!(task.await.unwrap().err(), Some(ConnectError::Cancelled));
    assert!(!channel.is_disconnected());
    assert_eq!(manager.state(), ConnectionState::Connecting);
}

#[test]
fn describe_extracts_message() {
    assert_eq!(describe(&json!(null)), "");
    assert_eq!(describe(&json!("plain")), "plain");
    assert_eq!(describe(&json!({ "message": "bad token" })), "bad token");
    assert_eq!(describe(&json!({ "code": 1 })), "{\"code\":1}");
}

async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
    for _ in 0..200 {
        if manager.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("manager never reached {}", state.as_str());
}

#[tokio::test]
async fn credential_rotation_tears_down_without_an_ask() {
    let connector = Arc::new(MemoryConnector::new());
    let manager = manager(&connector);
    let (rotate, changes) = watch::channel(Credential::new("old"));
    manager.follow_credential(changes);

    manager
        .ensure_ready(&Credential::new("old"), Duration::from_secs(1), &CancellationToken::new())
        .await
        .unwrap();

    rotate.send_replace(Credential::new("old"));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(manager.state(), ConnectionState::Ready);
    assert!(!connector.last_channel().unwrap().is_disconnected());

    rotate.send_replace(Credential::new("new"));
    wait_for_state(&manager, ConnectionState::Disconnected).await;
    assert!(connector.last_channel().unwrap().is_disconnected());
    assert_eq!(connector.open_count(), 1);
}
