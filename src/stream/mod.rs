//! Stream module - transaction feed ingestion
//!
//! One persistent WebSocket subscription filtered to the tracked mint, parsed
//! defensively into typed notifications, reduced to qualifying buy events.

pub mod listener;
pub mod notification;

pub use listener::{FeedListener, FeedListenerConfig};
pub use notification::{BuyEvent, Notification, SubscribeRequest};
