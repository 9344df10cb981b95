//! Reconciliation of pushed order updates with REST snapshots.
//!
//! Push updates and snapshots can arrive in any order relative to each
//! other, so a terminal status (`Filled`, `Cancelled`) is treated as
//! monotonic: a record carrying a non-terminal status never replaces one
//! that is already terminal.

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::{OrderRecord, OrderView};

/// What a merge did to the held record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    /// The incoming record would have regressed a terminal status.
    DiscardedStale,
}

/// Authoritative order map keyed by order id.
#[derive(Debug, Default)]
pub struct OrderStateReconciler {
    orders: BTreeMap<u64, OrderRecord>,
    active_count: usize,
}

impl OrderStateReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a full REST snapshot. Held orders missing from the snapshot
    /// are kept.
    pub fn apply_snapshot(&mut self, records: Vec<OrderRecord>) -> Vec<MergeOutcome> {
        records
            .into_iter()
            .map(|record| self.merge(record))
            .collect()
    }

    /// Merges one record pushed on the order-update channel.
    pub fn apply_push_update(&mut self, record: OrderRecord) -> MergeOutcome {
        self.merge(record)
    }

    fn merge(&mut self, incoming: OrderRecord) -> MergeOutcome {
        let outcome = match self.orders.get(&incoming.id) {
            Some(held) if held.status.is_terminal() && !incoming.status.is_terminal() => {
                debug!(
                    order_id = incoming.id,
                    held = held.status.as_str(),
                    incoming = incoming.status.as_str(),
                    "Discarding stale order record"
                );
                MergeOutcome::DiscardedStale
            }
            Some(_) => {
                self.orders.insert(incoming.id, incoming);
                MergeOutcome::Replaced
            }
            None => {
                self.orders.insert(incoming.id, incoming);
                MergeOutcome::Inserted
            }
        };

        self.recount();
        outcome
    }

    fn recount(&mut self) {
        self.active_count = self
            .orders
            .values()
            .filter(|order| order.status.is_active())
            .count();
    }

    /// Number of held orders that are `Pending` or `PartiallyFilled`.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn get(&self, id: u64) -> Option<&OrderRecord> {
        self.orders.get(&id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Copies the held orders, sorted by id.
    pub fn view(&self) -> OrderView {
        OrderView {
            orders: self.orders.values().cloned().collect(),
            active_count: self.active_count,
        }
    }

    pub fn clear(&mut self) {
        self.orders.clear();
        self.active_count = 0;
    }
}
