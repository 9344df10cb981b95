//! WebSocket connection lifecycle management.
//!
//! [`ConnectionSupervisor`] handles connecting, reading frames, automatic
//! reconnection after a fixed delay, credential rejection, and
//! re-subscription to every registered channel after each connect.
//!
//! The supervisor task is the single dispatch queue of the crate: frames,
//! commands from [`SupervisorHandle`], REST results and timers are all
//! multiplexed in one `select!`, so every state mutation is serialized.

use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{Command, Connector, Frame, Link, SubscriptionRegistry};
use crate::api::ApiClient;
use crate::config::SyncConfig;
use crate::credentials::Credential;
use crate::event::SyncEvent;
use crate::models::{Notification, OrderRecord};
use crate::state::{MarketState, is_auth_failure};
use crate::TradewireError;

/// Lifecycle of the supervised connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    /// The credential was rejected; waiting for a fresh one.
    Failed,
}

/// Commands sent from a [`SupervisorHandle`] to the supervisor task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Connect with the given credential.
    Start(Credential),
    /// Close the transport and cancel any pending reconnect.
    Stop,
    /// Re-read orders and balance from the REST collaborator.
    Refresh,
    /// Merge an order snapshot obtained elsewhere.
    ApplySnapshot(Vec<OrderRecord>),
    /// Discard all session state (logout).
    ResetSession,
}

/// Cloneable front end of a running [`ConnectionSupervisor`].
///
/// Every method is fire-and-forget and never fails; once the supervisor
/// has shut down, commands are dropped.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl SupervisorHandle {
    pub fn start(&self, credential: Credential) {
        self.send(SessionCommand::Start(credential));
    }

    /// Idempotent; safe to call in any state.
    pub fn stop(&self) {
        self.send(SessionCommand::Stop);
    }

    pub fn refresh(&self) {
        self.send(SessionCommand::Refresh);
    }

    pub fn apply_snapshot(&self, orders: Vec<OrderRecord>) {
        self.send(SessionCommand::ApplySnapshot(orders));
    }

    pub fn reset_session(&self) {
        self.send(SessionCommand::ResetSession);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to connection state changes.
    pub fn on_state_change(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            debug!("Supervisor already shut down, dropping command");
        }
    }
}

/// Results posted back by spawned REST fetches.
enum RestOutcome {
    Orders(Vec<OrderRecord>),
    Balance(Decimal),
    Rejected(String),
}

/// A [`RestOutcome`] stamped with the refresh generation it was fetched in.
struct RestResult {
    generation: u64,
    outcome: RestOutcome,
}

/// Whether the supervisor task keeps running.
enum Exit {
    Continue,
    Shutdown,
}

/// Why a live session ended.
enum Disconnect {
    Stopped,
    Shutdown,
    /// A different credential was supplied; reconnect with it at once.
    Switched,
    Rejected(String),
    Lost(String),
}

/// Outcome of one connect attempt.
enum Attempt<L> {
    Connected(L),
    Failed(TradewireError),
    Stopped,
    Shutdown,
    Switched(Credential),
}

/// Outcome of a cancellable wait.
enum Wait {
    Elapsed,
    Stopped,
    Shutdown,
    Rejected(String),
}

/// Owns the transport and the whole per-session object graph.
pub struct ConnectionSupervisor<C: Connector> {
    connector: C,
    config: SyncConfig,
    registry: SubscriptionRegistry,
    api: Option<ApiClient>,
    tx: mpsc::UnboundedSender<SyncEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    state: watch::Sender<ConnectionState>,
    rest_tx: mpsc::UnboundedSender<RestResult>,
    rest_rx: mpsc::UnboundedReceiver<RestResult>,
    /// Bumped whenever in-flight fetches must no longer apply.
    generation: u64,
    refreshes: Vec<AbortHandle>,
    credential: Option<Credential>,
    rejected: Option<Credential>,
    discovered: bool,
}

impl<C: Connector> ConnectionSupervisor<C> {
    /// Creates a supervisor and the handle that drives it.
    ///
    /// Events are published on `tx`. Spawn [`run`](Self::run) to start
    /// processing commands.
    pub fn new(
        connector: C,
        config: SyncConfig,
        tx: mpsc::UnboundedSender<SyncEvent>,
    ) -> (Self, SupervisorHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (rest_tx, rest_rx) = mpsc::unbounded_channel();
        let registry =
            SubscriptionRegistry::with_default_channels(MarketState::new(config.feed_capacity));

        let supervisor = Self {
            connector,
            config,
            registry,
            api: None,
            tx,
            commands: cmd_rx,
            state: state_tx,
            rest_tx,
            rest_rx,
            generation: 0,
            refreshes: Vec::new(),
            credential: None,
            rejected: None,
            discovered: false,
        };
        let handle = SupervisorHandle {
            commands: cmd_tx,
            state: state_rx,
        };

        (supervisor, handle)
    }

    /// Attaches the REST collaborator used for order and balance refreshes.
    #[must_use]
    pub fn with_api(mut self, api: ApiClient) -> Self {
        self.api = Some(api);
        self
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Processes commands until every [`SupervisorHandle`] is dropped.
    pub async fn run(mut self) {
        info!("Connection supervisor started");

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    match command {
                        SessionCommand::Start(credential) => {
                            if self.admit(credential)
                                && let Exit::Shutdown = self.drive().await
                            {
                                break;
                            }
                        }
                        SessionCommand::Stop => self.halt(),
                        other => self.handle_passive(other),
                    }
                }
                Some(result) = self.rest_rx.recv() => {
                    if let Some(reason) = self.on_rest(result) {
                        debug!(%reason, "Ignoring REST rejection while no session is running");
                    }
                }
            }
        }

        self.set_state(ConnectionState::Idle);
        info!("Connection supervisor shutting down");
    }

    /// Accepts a credential for a new session unless it was already rejected.
    fn admit(&mut self, credential: Credential) -> bool {
        if credential.is_empty() {
            self.require_reauth("no credential supplied".to_string());
            return false;
        }
        if self.rejected.as_ref() == Some(&credential) {
            warn!("Refusing to reconnect with a credential the server rejected");
            self.require_reauth("credential was already rejected".to_string());
            return false;
        }

        self.rejected = None;
        self.credential = Some(credential);
        true
    }

    /// Connects, serves the session and reconnects until stopped or the
    /// credential is rejected.
    async fn drive(&mut self) -> Exit {
        if !self.discovered {
            match self.discover().await {
                Some(exit) => return exit,
                None => self.discovered = true,
            }
        }

        loop {
            let Some(credential) = self.credential.clone() else {
                self.set_state(ConnectionState::Idle);
                return Exit::Continue;
            };

            self.set_state(ConnectionState::Connecting);
            info!("Connecting to WebSocket");

            match self.attempt(&credential).await {
                Attempt::Connected(link) => match self.session(link).await {
                    Disconnect::Stopped => {
                        self.halt();
                        return Exit::Continue;
                    }
                    Disconnect::Shutdown => return Exit::Shutdown,
                    Disconnect::Switched => continue,
                    Disconnect::Rejected(reason) => {
                        self.fail_credential(reason);
                        return Exit::Continue;
                    }
                    Disconnect::Lost(reason) => {
                        warn!(%reason, "Connection lost");
                    }
                },
                Attempt::Failed(e) => {
                    if let Some(reason) = credential_failure(&e) {
                        self.fail_credential(reason);
                        return Exit::Continue;
                    }
                    warn!("Connection failed: {e}");
                }
                Attempt::Stopped => {
                    self.halt();
                    return Exit::Continue;
                }
                Attempt::Shutdown => return Exit::Shutdown,
                Attempt::Switched(next) => {
                    self.switch_credential(next);
                    continue;
                }
            }

            self.set_state(ConnectionState::Reconnecting);
            let delay = self.config.reconnect_delay;
            info!(delay_secs = delay.as_secs(), "Backing off before retry");

            match self.wait(delay).await {
                Wait::Elapsed => {}
                Wait::Stopped => {
                    self.halt();
                    return Exit::Continue;
                }
                Wait::Shutdown => return Exit::Shutdown,
                Wait::Rejected(reason) => {
                    self.fail_credential(reason);
                    return Exit::Continue;
                }
            }
        }
    }

    /// Waits for the transport endpoint to become reachable, within the
    /// startup budget. Returns `None` once it is.
    async fn discover(&mut self) -> Option<Exit> {
        let attempts = self.config.discovery_attempts.max(1);

        for attempt in 1..=attempts {
            if self.connector.probe().await {
                return None;
            }
            warn!(attempt, attempts, "Transport not ready yet, retrying");

            if attempt == attempts {
                break;
            }
            match self.wait(self.config.discovery_interval).await {
                Wait::Elapsed => {}
                Wait::Stopped => {
                    self.halt();
                    return Some(Exit::Continue);
                }
                Wait::Shutdown => return Some(Exit::Shutdown),
                Wait::Rejected(reason) => {
                    self.fail_credential(reason);
                    return Some(Exit::Continue);
                }
            }
        }

        let e = TradewireError::TransportUnavailable(format!("no answer after {attempts} attempts"));
        error!("{e}");
        self.emit(SyncEvent::Notice(Notification::error(
            "Live update client failed: transport unavailable",
        )));
        self.set_state(ConnectionState::Idle);
        Some(Exit::Continue)
    }

    /// One bounded connect attempt. `stop()` and a different credential
    /// interrupt it; other commands are applied once the attempt has
    /// resolved.
    async fn attempt(&mut self, credential: &Credential) -> Attempt<C::Link> {
        let timeout = self.config.handshake_timeout;
        let mut deferred = Vec::new();

        let attempt = {
            let connect = tokio::time::timeout(timeout, self.connector.connect(credential));
            tokio::pin!(connect);

            loop {
                tokio::select! {
                    result = &mut connect => {
                        break match result {
                            Ok(Ok(link)) => Attempt::Connected(link),
                            Ok(Err(e)) => Attempt::Failed(e),
                            Err(_) => Attempt::Failed(TradewireError::HandshakeTimeout(timeout)),
                        };
                    }
                    command = self.commands.recv() => match command {
                        None => break Attempt::Shutdown,
                        Some(SessionCommand::Stop) => break Attempt::Stopped,
                        Some(SessionCommand::Start(next))
                            if !next.is_empty()
                                && self.credential.as_ref() != Some(&next)
                                && self.rejected.as_ref() != Some(&next) =>
                        {
                            break Attempt::Switched(next);
                        }
                        Some(other) => deferred.push(other),
                    },
                }
            }
        };

        for command in deferred {
            self.handle_passive(command);
        }
        attempt
    }

    /// Serves a connected link until it ends.
    async fn session(&mut self, mut link: C::Link) -> Disconnect {
        self.set_state(ConnectionState::Connected);
        self.emit(SyncEvent::Notice(Notification::info(
            "Connected to live updates",
        )));

        if let Err(e) = self.registry.on_connected(&mut link).await {
            link.close().await;
            self.registry.on_disconnected();
            return Disconnect::Lost(format!("subscribe failed: {e}"));
        }
        info!("WebSocket connected and subscribed");
        self.request_refresh();

        let every = self.config.resync_interval;
        let mut resync = tokio::time::interval_at(Instant::now() + every, every);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                frame = link.next_frame() => match frame {
                    Some(Ok(frame)) => {
                        if let Some(reason) = self.on_frame(frame) {
                            break reason;
                        }
                    }
                    Some(Err(TradewireError::MalformedFrame(e))) => {
                        warn!("Dropping malformed frame: {e}");
                    }
                    Some(Err(e)) => break Disconnect::Lost(e.to_string()),
                    None => break Disconnect::Lost("transport closed".to_string()),
                },
                command = self.commands.recv() => match command {
                    None => break Disconnect::Shutdown,
                    Some(SessionCommand::Stop) => break Disconnect::Stopped,
                    Some(SessionCommand::Start(next)) => {
                        if self.switch_credential(next) {
                            break Disconnect::Switched;
                        }
                    }
                    Some(other) => self.handle_passive(other),
                },
                Some(result) = self.rest_rx.recv() => {
                    if let Some(reason) = self.on_rest(result) {
                        break Disconnect::Rejected(reason);
                    }
                }
                _ = resync.tick() => self.request_refresh(),
            }
        };

        link.close().await;
        self.registry.on_disconnected();
        self.cancel_refreshes();
        reason
    }

    /// Applies one inbound frame. Returns a reason when the session must end.
    fn on_frame(&mut self, frame: Frame) -> Option<Disconnect> {
        match frame.command {
            Command::Message => match self.registry.route(&frame) {
                Ok(routed) => {
                    for event in routed.events {
                        self.emit(event);
                    }
                    routed.reauthenticate.map(Disconnect::Rejected)
                }
                Err(e) => {
                    warn!(
                        destination = frame.get("destination").unwrap_or_default(),
                        "Dropping frame: {e}"
                    );
                    None
                }
            },
            Command::Error => {
                let text = frame.error_text();
                if is_auth_failure(&text) {
                    Some(Disconnect::Rejected(text))
                } else {
                    warn!(%text, "Server sent an ERROR frame");
                    Some(Disconnect::Lost(format!("server error: {text}")))
                }
            }
            other => {
                debug!(command = %other, "Ignoring frame");
                None
            }
        }
    }

    /// Sleeps for `delay` while still serving commands and REST results.
    async fn wait(&mut self, delay: Duration) -> Wait {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return Wait::Elapsed,
                command = self.commands.recv() => match command {
                    None => return Wait::Shutdown,
                    Some(SessionCommand::Stop) => return Wait::Stopped,
                    Some(other) => self.handle_passive(other),
                },
                Some(result) = self.rest_rx.recv() => {
                    if let Some(reason) = self.on_rest(result) {
                        return Wait::Rejected(reason);
                    }
                }
            }
        }
    }

    /// Commands that never change the connection state.
    fn handle_passive(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start(credential) => {
                self.switch_credential(credential);
            }
            SessionCommand::Stop => {}
            SessionCommand::Refresh => self.request_refresh(),
            SessionCommand::ApplySnapshot(records) => {
                let event = self.registry.apply_snapshot(records);
                self.emit(event);
            }
            SessionCommand::ResetSession => {
                info!("Resetting session state");
                self.cancel_refreshes();
                self.registry.reset();
                self.emit(SyncEvent::SessionReset);
            }
        }
    }

    /// Adopts `next` for the following connects. Returns `true` if it
    /// replaced a different credential, in which case a live session must
    /// be re-established under it.
    fn switch_credential(&mut self, next: Credential) -> bool {
        if next.is_empty() {
            warn!("Ignoring an empty credential");
            return false;
        }
        if self.rejected.as_ref() == Some(&next) {
            warn!("Ignoring a credential the server already rejected");
            return false;
        }
        if self.credential.as_ref() == Some(&next) {
            return false;
        }

        info!("Credential changed");
        self.credential = Some(next);
        self.cancel_refreshes();
        true
    }

    /// Spawns a REST fetch of orders and balance; results come back
    /// through the dispatch queue stamped with the current generation.
    fn request_refresh(&mut self) {
        let (Some(api), Some(credential)) = (self.api.clone(), self.credential.clone()) else {
            return;
        };
        let tx = self.rest_tx.clone();
        let generation = self.generation;
        let post = move |outcome| {
            let _ = tx.send(RestResult {
                generation,
                outcome,
            });
        };

        self.refreshes.retain(|task| !task.is_finished());
        let task = tokio::spawn(async move {
            match api.fetch_orders(&credential).await {
                Ok(orders) => post(RestOutcome::Orders(orders)),
                Err(TradewireError::CredentialRejected(reason)) => {
                    post(RestOutcome::Rejected(reason));
                    return;
                }
                Err(e) => warn!("Order snapshot fetch failed: {e}"),
            }

            match api.fetch_balance(&credential).await {
                Ok(balance) => post(RestOutcome::Balance(balance)),
                Err(TradewireError::CredentialRejected(reason)) => {
                    post(RestOutcome::Rejected(reason));
                }
                Err(e) => warn!("Balance fetch failed: {e}"),
            }
        });
        self.refreshes.push(task.abort_handle());
    }

    /// Ends any activity for a `stop()`.
    fn halt(&mut self) {
        self.cancel_refreshes();
        self.set_state(ConnectionState::Idle);
    }

    /// Aborts in-flight fetches and discards any result they already posted.
    fn cancel_refreshes(&mut self) {
        self.generation += 1;
        for task in self.refreshes.drain(..) {
            task.abort();
        }
    }

    /// Applies a REST result. Returns the reason if the credential was refused.
    fn on_rest(&mut self, result: RestResult) -> Option<String> {
        if result.generation != self.generation {
            debug!(
                generation = result.generation,
                current = self.generation,
                "Discarding REST result from an earlier session"
            );
            return None;
        }

        match result.outcome {
            RestOutcome::Orders(records) => {
                let event = self.registry.apply_snapshot(records);
                self.emit(event);
                None
            }
            RestOutcome::Balance(balance) => {
                self.emit(SyncEvent::Balance(balance));
                None
            }
            RestOutcome::Rejected(reason) => Some(reason),
        }
    }

    /// The single re-authentication path, shared by handshake rejections,
    /// auth ERROR frames, error-queue notices and REST 401/403 responses.
    fn fail_credential(&mut self, reason: String) {
        error!(%reason, "Credential rejected");
        self.cancel_refreshes();
        self.rejected = self.credential.take();
        self.require_reauth(reason);
    }

    /// Parks the supervisor in `Failed` and asks the auth collaborator for
    /// a fresh credential.
    fn require_reauth(&mut self, reason: String) {
        self.set_state(ConnectionState::Failed);
        self.emit(SyncEvent::Notice(Notification::error(
            "Live update connection failed (Auth). Please log in again.",
        )));
        self.emit(SyncEvent::ReauthRequired { reason });
    }

    fn set_state(&mut self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(state = ?next, "Connection state changed");
            self.emit(SyncEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: SyncEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

/// Extracts the rejection reason if `error` means the credential is invalid.
fn credential_failure(error: &TradewireError) -> Option<String> {
    match error {
        TradewireError::CredentialRejected(reason) => Some(reason.clone()),
        TradewireError::ServerError(text) if is_auth_failure(text) => Some(text.clone()),
        _ => None,
    }
}
