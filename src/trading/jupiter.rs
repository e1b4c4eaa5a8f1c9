//! Jupiter aggregator HTTP client
//!
//! Two request/response calls per trade: a priced quote for a mint pair and
//! amount, then an unsigned swap transaction built from that quote. The route
//! inside a quote is opaque to us; it is passed back to the swap endpoint
//! verbatim and consumed exactly once.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::JupiterConfig;
use crate::error::{Error, Result};

/// An opaque priced route returned by the quote endpoint
///
/// Never cached; every swap step requests a fresh one.
#[derive(Debug, Clone)]
pub struct Quote(serde_json::Value);

impl Quote {
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

/// Swap-build request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub quote_response: serde_json::Value,
    pub user_public_key: String,
    pub wrap_and_unwrap_sol: bool,
    pub prioritization_fee_lamports: u64,
    pub api_key: String,
}

/// Swap-build response body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    /// Base64-encoded unsigned transaction
    pub swap_transaction: Option<String>,
    pub error: Option<String>,
}

/// Jupiter aggregator API client
pub struct JupiterClient {
    client: Client,
    config: JupiterConfig,
}

impl JupiterClient {
    pub fn new(config: JupiterConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Request a priced route for swapping `amount` of `input_mint` into
    /// `output_mint` at the given slippage tolerance
    pub async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u32,
    ) -> Result<Quote> {
        debug!(input_mint, output_mint, amount, "Requesting quote");

        let amount_str = amount.to_string();
        let slippage_str = slippage_bps.to_string();
        let response = self
            .client
            .get(&self.config.quote_url)
            .query(&[
                ("inputMint", input_mint),
                ("outputMint", output_mint),
                ("amount", amount_str.as_str()),
                ("slippageBps", slippage_str.as_str()),
                ("api_key", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Quote(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Quote(format!("{} - {}", status, body)));
        }

        let quote = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| Error::Quote(format!("Failed to parse quote response: {}", e)))?;

        Ok(Quote(quote))
    }

    /// Build an unsigned swap transaction from a quote for the given signer
    ///
    /// Wrap/unwrap of native SOL is always enabled; the configured priority
    /// fee is attached. Returns the base64-encoded transaction payload.
    pub async fn swap_transaction(
        &self,
        quote: Quote,
        user_public_key: &str,
        priority_fee_lamports: u64,
    ) -> Result<String> {
        let request = SwapRequest {
            quote_response: quote.into_inner(),
            user_public_key: user_public_key.to_string(),
            wrap_and_unwrap_sol: true,
            prioritization_fee_lamports: priority_fee_lamports,
            api_key: self.config.api_key.clone(),
        };

        let response = self
            .client
            .post(&self.config.swap_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::SwapBuild(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SwapBuild(format!("{} - {}", status, body)));
        }

        let swap_response: SwapResponse = response
            .json()
            .await
            .map_err(|e| Error::SwapBuild(format!("Failed to parse swap response: {}", e)))?;

        if let Some(error) = swap_response.error {
            return Err(Error::SwapBuild(error));
        }

        swap_response
            .swap_transaction
            .ok_or_else(|| Error::SwapBuild("No swapTransaction in response".to_string()))
    }
}
