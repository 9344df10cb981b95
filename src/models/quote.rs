//! Price channel models.

use rust_decimal::Decimal;
use serde::Deserialize;

/// One instrument quote pushed on the price channel.
///
/// The server sends its stock DTO; fields beyond these are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteEvent {
    #[serde(default)]
    pub symbol: String,
    pub current_price: Decimal,
    #[serde(default)]
    pub open_price: Option<Decimal>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A price frame body: a single quote or a batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum QuotePayload {
    Batch(Vec<QuoteEvent>),
    Single(QuoteEvent),
}

impl QuotePayload {
    /// Flattens the payload into the quotes it carries, in frame order.
    pub fn into_quotes(self) -> Vec<QuoteEvent> {
        match self {
            Self::Batch(quotes) => quotes,
            Self::Single(quote) => vec![quote],
        }
    }
}

/// Sign of a price move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    pub fn of(delta: Decimal) -> Self {
        if delta > Decimal::ZERO {
            Self::Up
        } else if delta < Decimal::ZERO {
            Self::Down
        } else {
            Self::Flat
        }
    }
}

/// Result of applying one quote to the price cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: Decimal,
    pub delta: Decimal,
    pub direction: Direction,
}
