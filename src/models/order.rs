//! Order models shared by the order-update channel and the REST snapshot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Lifecycle status of an order as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
}

impl OrderStatus {
    /// `Filled` and `Cancelled` never transition back.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled)
    }

    /// Counted as an open order.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Wire name, as shown to the user.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// One of the user's orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OrderWire", rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub quantity: u64,
    pub price: Decimal,
    pub status: OrderStatus,
    pub timestamp: Option<String>,
    pub remaining_quantity: Option<u64>,
}

/// Nested stock reference carried by the server's order entity.
#[derive(Deserialize)]
struct StockRef {
    symbol: String,
}

/// Accepts both the flat shape and the server entity with `stock.symbol`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderWire {
    id: u64,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    stock: Option<StockRef>,
    #[serde(rename = "type")]
    side: OrderSide,
    quantity: u64,
    price: Decimal,
    status: OrderStatus,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    remaining_quantity: Option<u64>,
}

impl TryFrom<OrderWire> for OrderRecord {
    type Error = String;

    fn try_from(wire: OrderWire) -> Result<Self, Self::Error> {
        let symbol = wire
            .symbol
            .or_else(|| wire.stock.map(|stock| stock.symbol))
            .ok_or_else(|| format!("order {} carries no symbol", wire.id))?;

        Ok(OrderRecord {
            id: wire.id,
            symbol,
            side: wire.side,
            quantity: wire.quantity,
            price: wire.price,
            status: wire.status,
            timestamp: wire.timestamp,
            remaining_quantity: wire.remaining_quantity,
        })
    }
}

/// Read-only snapshot of the reconciled order map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderView {
    /// Held orders, sorted by id.
    pub orders: Vec<OrderRecord>,
    /// Orders still `Pending` or `PartiallyFilled`.
    pub active_count: usize,
}
