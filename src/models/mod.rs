//! Shared models for the platform's real-time channels and REST envelope.
//!
//! Contains the channel definitions the client subscribes to and the
//! payload types carried on each of them.

pub mod notice;
pub mod order;
pub mod quote;
pub mod trade;

use serde::Deserialize;

pub use notice::{ErrorNotice, NoticeLevel, Notification};
pub use order::{OrderRecord, OrderSide, OrderStatus, OrderView};
pub use quote::{Direction, PriceUpdate, QuoteEvent, QuotePayload};
pub use trade::TradePrint;

/// The logical channels pushed by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Public price stream (wire destination: `/topic/prices`).
    Prices,
    /// Public trade prints (wire destination: `/topic/trades`).
    Trades,
    /// The authenticated user's order updates (`/user/queue/orders`).
    OrderUpdates,
    /// The authenticated user's error notices (`/user/queue/errors`).
    Errors,
}

impl ChannelKind {
    /// All channels in subscription order.
    pub const ALL: [ChannelKind; 4] = [
        Self::Prices,
        Self::Trades,
        Self::OrderUpdates,
        Self::Errors,
    ];

    /// Returns the STOMP destination the server publishes on.
    pub fn destination(self) -> &'static str {
        match self {
            Self::Prices => "/topic/prices",
            Self::Trades => "/topic/trades",
            Self::OrderUpdates => "/user/queue/orders",
            Self::Errors => "/user/queue/errors",
        }
    }

    /// Returns whether the channel is bound to the authenticated user.
    pub fn scope(self) -> ChannelScope {
        match self {
            Self::Prices | Self::Trades => ChannelScope::Public,
            Self::OrderUpdates | Self::Errors => ChannelScope::UserScoped,
        }
    }

    /// Looks up a channel by its wire destination.
    pub fn from_destination(destination: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.destination() == destination)
    }

    /// Short name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prices => "prices",
            Self::Trades => "trades",
            Self::OrderUpdates => "orders",
            Self::Errors => "errors",
        }
    }
}

/// Whether a channel needs an authenticated transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelScope {
    Public,
    /// The user is implied by the authenticated session, never by a parameter.
    UserScoped,
}

/// A subscription target registered with the
/// [`SubscriptionRegistry`](crate::websocket::SubscriptionRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub kind: ChannelKind,
    pub destination: String,
    pub scope: ChannelScope,
}

impl Channel {
    /// Builds the channel with the platform's standard destination.
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            destination: kind.destination().to_string(),
            scope: kind.scope(),
        }
    }
}

/// Envelope wrapping every REST response body.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub message: Option<String>,
    /// Payload; older builds of the server call this field `object`.
    #[serde(alias = "object")]
    pub data: Option<T>,
}
