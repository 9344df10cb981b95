//! Real-time market synchronization client for a STOMP-over-WebSocket
//! trading platform.
//!
//! Maintains an authenticated connection, re-subscribes the platform's
//! price, trade, order and error channels after every connect, and keeps a
//! reconciled view of prices, recent trades and the user's orders. See
//! [`websocket::ConnectionSupervisor`] for the entry point.

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod event;
pub mod models;
pub mod state;
pub mod websocket;

pub use error::{Result, TradewireError};
