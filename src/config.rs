//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::str::FromStr;

/// Wrapped SOL mint, the native side of every swap pair
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub jupiter: JupiterConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub wallets: WalletsConfig,
    #[serde(default)]
    pub sequencer: SequencerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    /// Upper bound on waiting for finalized confirmation of one submission
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    #[serde(default = "default_confirm_poll_interval_ms")]
    pub confirm_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_ws_endpoint")]
    pub ws_endpoint: String,
    /// Fixed delay before re-establishing a dropped subscription
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JupiterConfig {
    #[serde(default = "default_quote_url")]
    pub quote_url: String,
    #[serde(default = "default_swap_url")]
    pub swap_url: String,
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Tracked token mint (base58)
    #[serde(default = "default_token_mint")]
    pub token_mint: String,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    #[serde(default = "default_priority_fee")]
    pub priority_fee_lamports: u64,
    /// Minimum SOL spend for a buy to qualify as a trigger
    #[serde(default = "default_min_buy_threshold")]
    pub min_buy_threshold_lamports: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletsConfig {
    /// Base58 secret keys of the five liquidation wallets
    #[serde(default = "default_liquidation_keys")]
    pub liquidation_keys: Vec<String>,
    /// Signer addresses whose own traffic must never trigger a run
    #[serde(default = "default_excluded_signers")]
    pub excluded_signers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SequencerConfig {
    /// Randomized pause between steps, [min, max) milliseconds
    #[serde(default = "default_step_delay_min_ms")]
    pub step_delay_min_ms: u64,
    #[serde(default = "default_step_delay_max_ms")]
    pub step_delay_max_ms: u64,
    /// Step 2 buy window, [min, max) lamports
    #[serde(default = "default_large_buy_min")]
    pub large_buy_min_lamports: u64,
    #[serde(default = "default_large_buy_max")]
    pub large_buy_max_lamports: u64,
    /// Steps 4 and 5 buy window, [min, max) lamports
    #[serde(default = "default_small_buy_min")]
    pub small_buy_min_lamports: u64,
    #[serde(default = "default_small_buy_max")]
    pub small_buy_max_lamports: u64,
}

// Default value functions
fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_default()
}

fn default_ws_endpoint() -> String {
    std::env::var("WEBSOCKET_ENDPOINT").unwrap_or_default()
}

fn default_quote_url() -> String {
    "https://jupiter-swap-lb.solanatracker.io/jupiter/quote".into()
}

fn default_swap_url() -> String {
    "https://jupiter-swap-lb.solanatracker.io/jupiter/swap".into()
}

fn default_api_key() -> String {
    std::env::var("JUPITER_API_KEY").unwrap_or_default()
}

fn default_token_mint() -> String {
    std::env::var("OUTPUT_MINT").unwrap_or_default()
}

fn default_liquidation_keys() -> Vec<String> {
    split_env_list("LIQUIDATION_WALLETS")
}

fn default_excluded_signers() -> Vec<String> {
    split_env_list("VOLUME_BOT_WALLETS")
}

fn split_env_list(var: &str) -> Vec<String> {
    std::env::var(var)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn default_confirm_timeout_ms() -> u64 {
    90_000
}

fn default_confirm_poll_interval_ms() -> u64 {
    500
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_slippage_bps() -> u32 {
    1_000
}

fn default_priority_fee() -> u64 {
    150_000
}

fn default_min_buy_threshold() -> u64 {
    69_000_000 // 0.069 SOL
}

fn default_step_delay_min_ms() -> u64 {
    1_000
}

fn default_step_delay_max_ms() -> u64 {
    5_000
}

fn default_large_buy_min() -> u64 {
    10_000_000
}

fn default_large_buy_max() -> u64 {
    15_000_000
}

fn default_small_buy_min() -> u64 {
    2_000_000
}

fn default_small_buy_max() -> u64 {
    5_000_000
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
            confirm_poll_interval_ms: default_confirm_poll_interval_ms(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_endpoint: default_ws_endpoint(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            quote_url: default_quote_url(),
            swap_url: default_swap_url(),
            api_key: default_api_key(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            token_mint: default_token_mint(),
            slippage_bps: default_slippage_bps(),
            priority_fee_lamports: default_priority_fee(),
            min_buy_threshold_lamports: default_min_buy_threshold(),
        }
    }
}

impl Default for WalletsConfig {
    fn default() -> Self {
        Self {
            liquidation_keys: default_liquidation_keys(),
            excluded_signers: default_excluded_signers(),
        }
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            step_delay_min_ms: default_step_delay_min_ms(),
            step_delay_max_ms: default_step_delay_max_ms(),
            large_buy_min_lamports: default_large_buy_min(),
            large_buy_max_lamports: default_large_buy_max(),
            small_buy_min_lamports: default_small_buy_min(),
            small_buy_max_lamports: default_small_buy_max(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            feed: FeedConfig::default(),
            jupiter: JupiterConfig::default(),
            trading: TradingConfig::default(),
            wallets: WalletsConfig::default(),
            sequencer: SequencerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix COUNTERFLOW_)
            .add_source(
                config::Environment::with_prefix("COUNTERFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.rpc.endpoint.is_empty() {
            anyhow::bail!("rpc.endpoint is required (RPC_ENDPOINT)");
        }

        if self.feed.ws_endpoint.is_empty() {
            anyhow::bail!("feed.ws_endpoint is required (WEBSOCKET_ENDPOINT)");
        }

        if self.jupiter.api_key.is_empty() {
            anyhow::bail!("jupiter.api_key is required (JUPITER_API_KEY)");
        }

        if self.trading.token_mint.is_empty() {
            anyhow::bail!("trading.token_mint is required (OUTPUT_MINT)");
        }

        Pubkey::from_str(&self.trading.token_mint)
            .with_context(|| format!("Invalid token mint: {}", self.trading.token_mint))?;

        if self.trading.token_mint == NATIVE_MINT {
            anyhow::bail!("trading.token_mint must differ from the native mint");
        }

        if self.trading.slippage_bps > 10_000 {
            anyhow::bail!("slippage_bps cannot exceed 10000 (100%)");
        }

        if self.trading.min_buy_threshold_lamports == 0 {
            anyhow::bail!("min_buy_threshold_lamports must be positive");
        }

        // The rotation policy is defined over exactly five wallets
        if self.wallets.liquidation_keys.len() != 5 {
            anyhow::bail!(
                "Exactly 5 liquidation wallets required, got {}",
                self.wallets.liquidation_keys.len()
            );
        }

        for signer in &self.wallets.excluded_signers {
            Pubkey::from_str(signer)
                .with_context(|| format!("Invalid excluded signer address: {}", signer))?;
        }

        if self.sequencer.step_delay_min_ms >= self.sequencer.step_delay_max_ms {
            anyhow::bail!("step_delay_min_ms must be below step_delay_max_ms");
        }

        if self.sequencer.large_buy_min_lamports >= self.sequencer.large_buy_max_lamports
            || self.sequencer.small_buy_min_lamports >= self.sequencer.small_buy_max_lamports
        {
            anyhow::bail!("buy amount windows must satisfy min < max");
        }

        Ok(())
    }

    /// Parsed tracked token mint
    pub fn token_mint(&self) -> Pubkey {
        // Validated at load time
        Pubkey::from_str(&self.trading.token_mint).unwrap_or_default()
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    confirm_timeout: {}ms
  Feed:
    ws_endpoint: {}
    reconnect_delay: {}ms
  Jupiter:
    quote_url: {}
    swap_url: {}
    api_key: {}
  Trading:
    token_mint: {}
    slippage: {}bps
    priority_fee: {} lamports
    min_buy_threshold: {} lamports
  Wallets:
    liquidation: {} configured
    excluded_signers: {}
  Sequencer:
    step_delay: {}-{}ms
    large_buy: {}-{} lamports
    small_buy: {}-{} lamports
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.confirm_timeout_ms,
            mask_url(&self.feed.ws_endpoint),
            self.feed.reconnect_delay_ms,
            mask_url(&self.jupiter.quote_url),
            mask_url(&self.jupiter.swap_url),
            if self.jupiter.api_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.trading.token_mint,
            self.trading.slippage_bps,
            self.trading.priority_fee_lamports,
            self.trading.min_buy_threshold_lamports,
            self.wallets.liquidation_keys.len(),
            self.wallets.excluded_signers.len(),
            self.sequencer.step_delay_min_ms,
            self.sequencer.step_delay_max_ms,
            self.sequencer.large_buy_min_lamports,
            self.sequencer.large_buy_max_lamports,
            self.sequencer.small_buy_min_lamports,
            self.sequencer.small_buy_max_lamports,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> Config {
        let mut config = Config::default();
        config.rpc.endpoint = "https://rpc.example.com".into();
        config.feed.ws_endpoint = "wss://feed.example.com".into();
        config.jupiter.api_key = "key".into();
        config.trading.token_mint = Pubkey::new_unique().to_string();
        config.wallets.liquidation_keys = vec![String::from("k"); 5];
        config
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.trading.slippage_bps, 1_000);
        assert_eq!(config.trading.priority_fee_lamports, 150_000);
        assert_eq!(config.trading.min_buy_threshold_lamports, 69_000_000);
        assert_eq!(config.feed.reconnect_delay_ms, 5_000);
        assert_eq!(config.sequencer.large_buy_min_lamports, 10_000_000);
        assert_eq!(config.sequencer.small_buy_max_lamports, 5_000_000);
    }

    #[test]
    fn test_validate_accepts_filled_config() {
        assert!(filled().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_wallet_count() {
        let mut config = filled();
        config.wallets.liquidation_keys.pop();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Exactly 5 liquidation wallets"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_native_mint_as_token() {
        let mut config = filled();
        config.trading.token_mint = NATIVE_MINT.into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_excess_slippage() {
        let mut config = filled();
        config.trading.slippage_bps = 10_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://api.example.com?key=secret"),
            "https://api.example.com?***"
        );
        assert_eq!(
            mask_url("https://api.example.com"),
            "https://api.example.com"
        );
    }
}
