//! Counterflow Bot Library
//!
//! Watches a Solana transaction feed for large purchases of a tracked token
//! and counter-trades each one with a wallet-rotated sell/buy sequence routed
//! through the Jupiter aggregator.

pub mod balance;
pub mod config;
pub mod error;
pub mod sequencer;
pub mod stream;
pub mod trading;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
