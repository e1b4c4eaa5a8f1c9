//! Trading module - Jupiter aggregator client and swap execution

pub mod executor;
pub mod jupiter;

pub use executor::{SwapExecutor, SwapPipeline};
pub use jupiter::{JupiterClient, Quote};
