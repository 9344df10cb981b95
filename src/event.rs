//! Events published by the synchronization layer.

use rust_decimal::Decimal;

use crate::models::{Notification, OrderView, PriceUpdate, TradePrint};
use crate::websocket::ConnectionState;

/// Everything a consumer needs to render the live view.
///
/// Payloads are snapshots; the supervisor keeps the authoritative state.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The connection state machine moved.
    StateChanged(ConnectionState),
    /// A quote moved an instrument's price.
    Price(PriceUpdate),
    /// A trade print arrived; carries the whole feed, most recent first.
    Feed(Vec<TradePrint>),
    /// The reconciled order view changed.
    Orders(OrderView),
    /// Account balance from the REST collaborator.
    Balance(Decimal),
    /// Something to show on the notification surface.
    Notice(Notification),
    /// The credential was rejected; a fresh one is needed before `start`.
    ReauthRequired { reason: String },
    /// All session state was discarded.
    SessionReset,
}
