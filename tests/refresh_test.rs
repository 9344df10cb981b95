//! Order and balance refreshes against a loopback REST server.
//!
//! These run on the real clock: the HTTP client needs actual I/O.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use tradewire::api::ApiClient;
use tradewire::config::SyncConfig;
use tradewire::credentials::Credential;
use tradewire::event::SyncEvent;
use tradewire::models::OrderView;
use tradewire::websocket::{ConnectionState, ConnectionSupervisor, SupervisorHandle};

use common::http::{Reply, Request, StubApi};
use common::{MockConnector, accept, collect_until, order_json, states};

use ConnectionState::{Connected, Connecting, Failed, Idle};

const ORDERS: &str = "/order/all";
const BALANCE: &str = "/user-panel/get-balance";

fn spawn_supervisor(
    connector: MockConnector,
    api_url: &str,
) -> (SupervisorHandle, mpsc::UnboundedReceiver<SyncEvent>, JoinHandle<()>) {
    let config = SyncConfig {
        reconnect_delay: Duration::from_millis(50),
        resync_interval: Duration::from_secs(3600),
        ..SyncConfig::default()
    };
    let api = ApiClient::new(api_url).expect("Failed to build client");
    let (tx, rx) = mpsc::unbounded_channel();
    let (supervisor, handle) = ConnectionSupervisor::new(connector, config, tx);
    let task = tokio::spawn(supervisor.with_api(api).run());
    (handle, rx, task)
}

fn orders_body(ids: &[u64]) -> String {
    let orders: Vec<String> = ids.iter().map(|id| order_json(*id, "PENDING")).collect();
    format!(r#"{{"message":"ok","data":[{}]}}"#, orders.join(","))
}

fn healthy(request: &Request) -> Reply {
    match request.path.as_str() {
        ORDERS => Reply::ok(orders_body(&[])),
        BALANCE => Reply::ok(r#"{"message":"ok","data":20}"#),
        _ => Reply::status(404),
    }
}

fn is_state(state: ConnectionState) -> impl Fn(&SyncEvent) -> bool {
    move |event| *event == SyncEvent::StateChanged(state)
}

fn is_balance(event: &SyncEvent) -> bool {
    matches!(event, SyncEvent::Balance(_))
}

fn order_views(events: &[SyncEvent]) -> Vec<&OrderView> {
    events
        .iter()
        .filter_map(|event| match event {
            SyncEvent::Orders(view) => Some(view),
            _ => None,
        })
        .collect()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_connect_applies_order_snapshot_and_publishes_balance() {
    let mut api = StubApi::serve(|request| match request.path.as_str() {
        ORDERS => Reply::ok(orders_body(&[7])),
        BALANCE => Reply::ok(r#"{"message":"ok","data":1500.25}"#),
        _ => Reply::status(404),
    })
    .await;
    let (step, _server) = accept();
    let (handle, mut rx, _task) = spawn_supervisor(MockConnector::new(vec![step]), &api.url);

    handle.start(Credential::new("token-a"));
    let events = collect_until(&mut rx, is_balance).await;

    let views = order_views(&events);
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].orders.len(), 1);
    assert_eq!(views[0].orders[0].id, 7);
    assert_eq!(views[0].active_count, 1);
    assert_eq!(events.last(), Some(&SyncEvent::Balance(dec!(1500.25))));

    let first = api.next_request().await;
    assert_eq!(first.path, ORDERS);
    assert_eq!(first.authorization.as_deref(), Some("Bearer token-a"));
    let second = api.next_request().await;
    assert_eq!(second.path, BALANCE);
    assert_eq!(second.authorization.as_deref(), Some("Bearer token-a"));
}

#[tokio::test]
async fn test_refresh_command_fetches_again() {
    let mut api = StubApi::serve(healthy).await;
    let (step, _server) = accept();
    let (handle, mut rx, _task) = spawn_supervisor(MockConnector::new(vec![step]), &api.url);

    handle.start(Credential::new("token-a"));
    collect_until(&mut rx, is_balance).await;
    handle.refresh();
    collect_until(&mut rx, is_balance).await;

    let paths: Vec<String> = [
        api.next_request().await,
        api.next_request().await,
        api.next_request().await,
        api.next_request().await,
    ]
    .into_iter()
    .map(|request| request.path)
    .collect();
    assert_eq!(paths, [ORDERS, BALANCE, ORDERS, BALANCE]);
}

#[tokio::test]
async fn test_rest_unauthorized_fails_the_credential() {
    let api = StubApi::serve(|_| Reply::status(401)).await;
    let (step, server) = accept();
    let connector = MockConnector::new(vec![step]);
    let (handle, mut rx, _task) = spawn_supervisor(connector.clone(), &api.url);

    handle.start(Credential::new("token-a"));
    let events = collect_until(&mut rx, |e| matches!(e, SyncEvent::ReauthRequired { .. })).await;

    assert_eq!(states(&events), [Connecting, Connected, Failed]);
    assert_eq!(handle.state(), Failed);
    assert!(server.to_client.is_closed());
    assert!(events.iter().all(|e| !is_balance(e)));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn test_late_rejection_of_previous_credential_is_ignored() {
    let gate = Arc::new(Notify::new());
    let held = Arc::clone(&gate);
    let mut api = StubApi::serve(move |request| {
        if request.authorization.as_deref() == Some("Bearer token-a") {
            Reply::status(401).held(&held)
        } else {
            healthy(request)
        }
    })
    .await;
    let (first, _first_server) = accept();
    let (second, _second_server) = accept();
    let (handle, mut rx, _task) =
        spawn_supervisor(MockConnector::new(vec![first, second]), &api.url);

    handle.start(Credential::new("token-a"));
    collect_until(&mut rx, is_state(Connected)).await;
    assert_eq!(api.next_request().await.authorization.as_deref(), Some("Bearer token-a"));

    handle.stop();
    collect_until(&mut rx, is_state(Idle)).await;
    handle.start(Credential::new("token-b"));
    collect_until(&mut rx, is_balance).await;

    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let late = drain(&mut rx);
    assert!(
        late.iter().all(|e| !matches!(e, SyncEvent::ReauthRequired { .. })),
        "unexpected events: {late:?}"
    );
    assert!(states(&late).is_empty());
    assert_eq!(handle.state(), Connected);
}

#[tokio::test]
async fn test_late_rejection_after_credential_switch_is_ignored() {
    let gate = Arc::new(Notify::new());
    let held = Arc::clone(&gate);
    let mut api = StubApi::serve(move |request| {
        if request.authorization.as_deref() == Some("Bearer token-a") {
            Reply::status(401).held(&held)
        } else {
            healthy(request)
        }
    })
    .await;
    let (first, _first_server) = accept();
    let (second, _second_server) = accept();
    let (handle, mut rx, _task) =
        spawn_supervisor(MockConnector::new(vec![first, second]), &api.url);

    handle.start(Credential::new("token-a"));
    collect_until(&mut rx, is_state(Connected)).await;
    assert_eq!(api.next_request().await.authorization.as_deref(), Some("Bearer token-a"));
    handle.start(Credential::new("token-b"));
    collect_until(&mut rx, is_balance).await;

    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(drain(&mut rx).iter().all(|e| !matches!(e, SyncEvent::ReauthRequired { .. })));
    assert_eq!(handle.state(), Connected);
}

#[tokio::test]
async fn test_snapshot_in_flight_during_reset_is_discarded() {
    let gate = Arc::new(Notify::new());
    let held = Arc::clone(&gate);
    let mut api = StubApi::serve(move |request| match request.path.as_str() {
        ORDERS => Reply::ok(orders_body(&[7, 8])).held(&held),
        _ => healthy(request),
    })
    .await;
    let (step, _server) = accept();
    let (handle, mut rx, _task) = spawn_supervisor(MockConnector::new(vec![step]), &api.url);

    handle.start(Credential::new("token-a"));
    collect_until(&mut rx, is_state(Connected)).await;
    assert_eq!(api.next_request().await.path, ORDERS);

    handle.stop();
    collect_until(&mut rx, is_state(Idle)).await;
    handle.reset_session();
    collect_until(&mut rx, |e| *e == SyncEvent::SessionReset).await;

    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.apply_snapshot(Vec::new());
    let events = collect_until(&mut rx, |e| matches!(e, SyncEvent::Orders(_))).await;

    let views = order_views(&events);
    assert_eq!(views.len(), 1);
    assert!(views[0].orders.is_empty());
    assert_eq!(views[0].active_count, 0);
}
