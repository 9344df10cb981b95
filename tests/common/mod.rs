//! Shared test utilities: a scripted in-memory transport and builders.

#![allow(dead_code)]

pub mod http;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;

use tradewire::credentials::Credential;
use tradewire::event::SyncEvent;
use tradewire::models::{OrderRecord, OrderSide, OrderStatus};
use tradewire::websocket::{Command, Connector, Frame, Link};
use tradewire::{Result, TradewireError};

/// What the next connect attempt does.
pub enum Scripted {
    Accept(MockLink),
    Fail(TradewireError),
    /// Never completes the handshake.
    Hang,
}

/// Server end of an accepted [`MockLink`].
pub struct ServerSide {
    pub to_client: mpsc::UnboundedSender<Frame>,
    pub from_client: mpsc::UnboundedReceiver<Frame>,
}

impl ServerSide {
    /// Reads the SUBSCRIBE frames sent after connect, keyed by destination.
    pub async fn subscriptions(&mut self, count: usize) -> HashMap<String, String> {
        let mut ids = HashMap::new();
        while ids.len() < count {
            let frame = self
                .from_client
                .recv()
                .await
                .expect("client hung up before subscribing");
            if frame.command == Command::Subscribe {
                ids.insert(
                    frame.get("destination").unwrap().to_string(),
                    frame.get("id").unwrap().to_string(),
                );
            }
        }
        ids
    }

    /// Pushes a MESSAGE frame to the client.
    pub fn push(&self, subscription: &str, destination: &str, body: &str) {
        self.to_client
            .send(message(subscription, destination, body))
            .expect("client link dropped");
    }
}

/// Builds a MESSAGE frame as the broker sends it.
pub fn message(subscription: &str, destination: &str, body: &str) -> Frame {
    Frame::new(Command::Message)
        .header("destination", destination)
        .header("subscription", subscription)
        .header("message-id", "m-1")
        .header("content-type", "application/json")
        .with_body(body)
}

/// In-memory link; frames sent by the client are forwarded to the
/// [`ServerSide`]. Dropping `to_client` simulates a transport drop.
pub struct MockLink {
    inbound: mpsc::UnboundedReceiver<Frame>,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl Link for MockLink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        // A server that already went away just loses the frame.
        let _ = self.outbound.send(frame);
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

/// Creates a link and the server end controlling it.
pub fn accept() -> (Scripted, ServerSide) {
    let (to_client, inbound) = mpsc::unbounded_channel();
    let (outbound, from_client) = mpsc::unbounded_channel();
    (
        Scripted::Accept(MockLink { inbound, outbound }),
        ServerSide {
            to_client,
            from_client,
        },
    )
}

/// Connector that plays back a script of connect outcomes.
#[derive(Clone)]
pub struct MockConnector {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    attempts: Arc<AtomicUsize>,
    probes: Arc<AtomicUsize>,
    bearers: Arc<Mutex<Vec<String>>>,
    reachable: bool,
}

impl MockConnector {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            attempts: Arc::new(AtomicUsize::new(0)),
            probes: Arc::new(AtomicUsize::new(0)),
            bearers: Arc::new(Mutex::new(Vec::new())),
            reachable: true,
        }
    }

    /// A connector whose endpoint never resolves.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn push(&self, step: Scripted) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// The `Authorization` value of every connect attempt, in order.
    pub fn bearers(&self) -> Vec<String> {
        self.bearers.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    type Link = MockLink;

    async fn probe(&mut self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable
    }

    async fn connect(&mut self, credential: &Credential) -> Result<MockLink> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.bearers
            .lock()
            .unwrap()
            .push(credential.bearer().to_string());
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Scripted::Accept(link)) => Ok(link),
            Some(Scripted::Fail(e)) => Err(e),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(TradewireError::ConnectionClosed("connection refused".into())),
        }
    }
}

/// Receives events until `done` matches one, returning everything seen.
pub async fn collect_until<F>(rx: &mut mpsc::UnboundedReceiver<SyncEvent>, done: F) -> Vec<SyncEvent>
where
    F: Fn(&SyncEvent) -> bool,
{
    let mut seen = Vec::new();
    let result = tokio::time::timeout(Duration::from_secs(600), async {
        while let Some(event) = rx.recv().await {
            let finished = done(&event);
            seen.push(event);
            if finished {
                return;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out; events so far: {seen:?}");
    seen
}

/// The states carried by `StateChanged` events, in order.
pub fn states(events: &[SyncEvent]) -> Vec<tradewire::websocket::ConnectionState> {
    events
        .iter()
        .filter_map(|event| match event {
            SyncEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

pub fn order(id: u64, status: OrderStatus) -> OrderRecord {
    OrderRecord {
        id,
        symbol: "AAPL".to_string(),
        side: OrderSide::Buy,
        quantity: 10,
        price: Decimal::new(10150, 2),
        status,
        timestamp: None,
        remaining_quantity: None,
    }
}

/// JSON body of an order update as the server pushes it.
pub fn order_json(id: u64, status: &str) -> String {
    format!(
        r#"{{"id":{id},"stock":{{"id":1,"symbol":"AAPL"}},"quantity":10,"price":101.50,"type":"BUY","status":"{status}","timestamp":"2024-05-01T10:00:00","remainingQuantity":10}}"#
    )
}
