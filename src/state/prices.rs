//! Last-known price per instrument and signed deltas per quote.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{Direction, PriceUpdate, QuoteEvent};

/// Keeps the last price seen for every symbol.
#[derive(Debug, Default)]
pub struct PriceTracker {
    cache: HashMap<String, Decimal>,
}

impl PriceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one quote and returns the move it represents.
    ///
    /// The delta is taken against the cached price, else against the
    /// quote's open price, else it is zero. The cache is written after the
    /// delta is computed.
    pub fn on_quote(&mut self, quote: QuoteEvent) -> PriceUpdate {
        let price = quote.current_price;
        let delta = match (self.cache.get(&quote.symbol), quote.open_price) {
            (Some(last), _) => price - *last,
            (None, Some(open)) => price - open,
            (None, None) => Decimal::ZERO,
        };

        self.cache.insert(quote.symbol.clone(), price);
        debug!(symbol = %quote.symbol, %price, %delta, "Price updated");

        PriceUpdate {
            symbol: quote.symbol,
            price,
            delta,
            direction: Direction::of(delta),
        }
    }

    /// Applies a batch in order; quotes without a symbol are skipped.
    pub fn on_quotes(&mut self, quotes: Vec<QuoteEvent>) -> Vec<PriceUpdate> {
        quotes
            .into_iter()
            .filter(|quote| !quote.symbol.is_empty())
            .map(|quote| self.on_quote(quote))
            .collect()
    }

    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.cache.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
