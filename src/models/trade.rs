//! Trade channel models.

use rust_decimal::Decimal;
use serde::Deserialize;

/// A single executed trade, for display only.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePrint {
    pub id: u64,
    pub stock_symbol: String,
    pub price: Decimal,
    pub quantity: u64,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub buyer_username: Option<String>,
    #[serde(default)]
    pub seller_username: Option<String>,
}
