//! Channel registration, (re)subscription and frame routing.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::{Frame, Link};
use crate::event::SyncEvent;
use crate::models::{Channel, ChannelKind, Notification, OrderRecord, QuotePayload, TradePrint};
use crate::state::{ErrorDisposition, MarketState, MergeOutcome};
use crate::{Result, TradewireError};

/// Result of routing one MESSAGE frame.
#[derive(Debug, Default)]
pub struct Routed {
    /// Snapshots to publish, in order.
    pub events: Vec<SyncEvent>,
    /// Set when the frame reported an authorization failure.
    pub reauthenticate: Option<String>,
}

/// Declares the logical channels and binds inbound frames to the state
/// component that handles them.
///
/// Owns the [`MarketState`] so that every mutation happens inside routing.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    channels: Vec<Channel>,
    /// Subscription id currently active per channel on the live session.
    active: HashMap<ChannelKind, String>,
    /// Reverse lookup from subscription id to channel.
    bindings: HashMap<String, ChannelKind>,
    next_id: u64,
    state: MarketState,
}

impl SubscriptionRegistry {
    pub fn new(state: MarketState) -> Self {
        Self {
            channels: Vec::new(),
            active: HashMap::new(),
            bindings: HashMap::new(),
            next_id: 0,
            state,
        }
    }

    /// Registry with the platform's four channels registered.
    pub fn with_default_channels(state: MarketState) -> Self {
        let mut registry = Self::new(state);
        for kind in ChannelKind::ALL {
            registry.register_channel(Channel::new(kind));
        }
        registry
    }

    /// Registers a channel. Its handler is the state component matching
    /// `channel.kind`. Registering a kind again replaces the destination.
    pub fn register_channel(&mut self, channel: Channel) {
        debug!(
            channel = channel.kind.as_str(),
            destination = %channel.destination,
            scope = ?channel.scope,
            "Registered channel"
        );
        match self.channels.iter_mut().find(|c| c.kind == channel.kind) {
            Some(existing) => *existing = channel,
            None => self.channels.push(channel),
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Subscribes every registered channel on a freshly connected link.
    ///
    /// A subscription still active from this session is cancelled first,
    /// so calling this twice never leaves duplicates behind.
    ///
    /// # Errors
    ///
    /// Returns a [`TradewireError`] if a frame cannot be sent.
    pub async fn on_connected<L: Link>(&mut self, link: &mut L) -> Result<()> {
        for channel in &self.channels {
            if let Some(previous) = self.active.remove(&channel.kind) {
                self.bindings.remove(&previous);
                link.send(Frame::unsubscribe(&previous)).await?;
                debug!(channel = channel.kind.as_str(), id = %previous, "Unsubscribed from channel");
            }

            let id = format!("sub-{}", self.next_id);
            self.next_id += 1;

            link.send(Frame::subscribe(&id, &channel.destination)).await?;
            self.active.insert(channel.kind, id.clone());
            self.bindings.insert(id.clone(), channel.kind);
            info!(
                channel = channel.kind.as_str(),
                destination = %channel.destination,
                id = %id,
                "Subscribed to channel"
            );
        }

        Ok(())
    }

    /// Forgets the session's subscriptions after the transport dropped.
    pub fn on_disconnected(&mut self) {
        self.active.clear();
        self.bindings.clear();
    }

    /// Number of subscriptions active on the current session.
    pub fn active_subscriptions(&self) -> usize {
        self.active.len()
    }

    /// Resolves which channel a MESSAGE frame belongs to.
    fn channel_of(&self, frame: &Frame) -> Result<ChannelKind> {
        if let Some(kind) = frame
            .get("subscription")
            .and_then(|id| self.bindings.get(id))
        {
            return Ok(*kind);
        }

        let destination = frame.get("destination").unwrap_or_default();
        self.channels
            .iter()
            .find(|channel| channel.destination == destination)
            .map(|channel| channel.kind)
            .ok_or_else(|| {
                TradewireError::UnknownChannel(format!(
                    "subscription {:?} destination {destination:?}",
                    frame.get("subscription")
                ))
            })
    }

    /// Decodes a MESSAGE frame and applies it to the bound component.
    ///
    /// # Errors
    ///
    /// Returns [`TradewireError::UnknownChannel`] for an unbound frame and
    /// [`TradewireError::Json`] for a body that is not valid for its
    /// channel. Either way the state is left untouched.
    pub fn route(&mut self, frame: &Frame) -> Result<Routed> {
        let kind = self.channel_of(frame)?;
        let mut routed = Routed::default();

        match kind {
            ChannelKind::Prices => {
                let payload: QuotePayload = serde_json::from_str(&frame.body)?;
                for update in self.state.prices.on_quotes(payload.into_quotes()) {
                    routed.events.push(SyncEvent::Price(update));
                }
            }
            ChannelKind::Trades => {
                let print: TradePrint = serde_json::from_str(&frame.body)?;
                debug!(trade_id = print.id, symbol = %print.stock_symbol, "Trade print");
                self.state.feed.push(print);
                routed.events.push(SyncEvent::Feed(self.state.feed.snapshot()));
            }
            ChannelKind::OrderUpdates => {
                let record: OrderRecord = serde_json::from_str(&frame.body)?;
                let notice = Notification::info(format!(
                    "Order update: {} status is now {}",
                    record.symbol,
                    record.status.as_str()
                ));
                match self.state.orders.apply_push_update(record) {
                    MergeOutcome::DiscardedStale => {}
                    MergeOutcome::Inserted | MergeOutcome::Replaced => {
                        routed.events.push(SyncEvent::Orders(self.state.orders.view()));
                        routed.events.push(SyncEvent::Notice(notice));
                    }
                }
            }
            ChannelKind::Errors => {
                let (notice, disposition) = self.state.errors.on_error_frame(&frame.body);
                warn!(
                    notice = %notice.message,
                    surfaced = self.state.errors.surfaced(),
                    "Server pushed an error"
                );
                routed.events.push(SyncEvent::Notice(notice));
                if let ErrorDisposition::Reauthenticate(reason) = disposition {
                    routed.reauthenticate = Some(reason);
                }
            }
        }

        Ok(routed)
    }

    /// Merges a REST order snapshot and returns the resulting view.
    pub fn apply_snapshot(&mut self, records: Vec<OrderRecord>) -> SyncEvent {
        let outcomes = self.state.orders.apply_snapshot(records);
        let stale = outcomes
            .iter()
            .filter(|o| **o == MergeOutcome::DiscardedStale)
            .count();
        debug!(records = outcomes.len(), stale, "Applied order snapshot");
        SyncEvent::Orders(self.state.orders.view())
    }

    pub fn state(&self) -> &MarketState {
        &self.state
    }

    /// Clears all session state (logout).
    pub fn reset(&mut self) {
        self.state.reset();
    }
}
