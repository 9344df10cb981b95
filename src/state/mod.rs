//! Derived market state maintained from pushed frames.
//!
//! Each component owns its data exclusively and is mutated only from the
//! supervisor's dispatch loop. Consumers receive cloned snapshots through
//! [`SyncEvent`](crate::event::SyncEvent).

mod errors;
mod feed;
mod orders;
mod prices;

pub use errors::{ErrorChannelHandler, ErrorDisposition, is_auth_failure};
pub use feed::LiveFeedBuffer;
pub use orders::{MergeOutcome, OrderStateReconciler};
pub use prices::PriceTracker;

/// Every piece of per-session state, owned by the subscription registry.
#[derive(Debug)]
pub struct MarketState {
    pub prices: PriceTracker,
    pub feed: LiveFeedBuffer,
    pub orders: OrderStateReconciler,
    pub errors: ErrorChannelHandler,
}

impl MarketState {
    pub fn new(feed_capacity: usize) -> Self {
        Self {
            prices: PriceTracker::new(),
            feed: LiveFeedBuffer::new(feed_capacity),
            orders: OrderStateReconciler::new(),
            errors: ErrorChannelHandler::new(),
        }
    }

    /// Forgets everything learned in this session (logout).
    pub fn reset(&mut self) {
        self.prices.clear();
        self.feed.clear();
        self.orders.clear();
    }
}
