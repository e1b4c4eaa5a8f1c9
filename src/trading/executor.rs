//! Swap execution pipeline: quote, build, sign, submit, confirm
//!
//! One successful call means exactly one on-chain trade. There is no retry
//! here; retry policy belongs to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::{RpcConfig, TradingConfig};
use crate::error::{Error, Result};
use crate::trading::jupiter::JupiterClient;
use crate::wallet::LiquidationWallet;

/// Executes a single swap between two mints with a given wallet
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    /// Swap `amount` smallest units of `input_mint` into `output_mint`,
    /// signed and paid by `wallet`. Returns the finalized signature.
    async fn swap(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        wallet: &LiquidationWallet,
    ) -> Result<Signature>;
}

/// Reports whether a submitted transaction has reached finalized commitment
#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    async fn is_finalized(&self, signature: &Signature) -> Result<bool>;
}

#[async_trait]
impl ConfirmationSource for RpcClient {
    async fn is_finalized(&self, signature: &Signature) -> Result<bool> {
        let confirmed = self
            .confirm_transaction_with_commitment(signature, CommitmentConfig::finalized())
            .await?;
        Ok(confirmed.value)
    }
}

/// Jupiter-routed swap pipeline
pub struct SwapPipeline {
    jupiter: JupiterClient,
    rpc: Arc<RpcClient>,
    trading: TradingConfig,
    confirm_timeout: Duration,
    confirm_poll_interval: Duration,
}

impl SwapPipeline {
    pub fn new(
        jupiter: JupiterClient,
        rpc: Arc<RpcClient>,
        trading: TradingConfig,
        rpc_config: &RpcConfig,
    ) -> Self {
        Self {
            jupiter,
            rpc,
            trading,
            confirm_timeout: Duration::from_millis(rpc_config.confirm_timeout_ms),
            confirm_poll_interval: Duration::from_millis(rpc_config.confirm_poll_interval_ms),
        }
    }

    /// Decode, sign, submit, and wait for finalized commitment
    ///
    /// Preflight is skipped; the aggregator's route is trusted as-built.
    /// A signature is only returned once the network reports it finalized.
    async fn sign_and_send(
        &self,
        serialized_tx: &str,
        wallet: &LiquidationWallet,
    ) -> Result<Signature> {
        let tx_bytes = BASE64
            .decode(serialized_tx)
            .map_err(|e| Error::Submission(format!("base64 decode failed: {}", e)))?;

        let unsigned: VersionedTransaction = bincode::deserialize(&tx_bytes)
            .map_err(|e| Error::Submission(format!("transaction decode failed: {}", e)))?;

        let transaction = VersionedTransaction::try_new(unsigned.message, &[wallet.keypair()])
            .map_err(|e| Error::Submission(format!("signing failed: {}", e)))?;

        let signature = self
            .rpc
            .send_transaction_with_config(
                &transaction,
                RpcSendTransactionConfig {
                    skip_preflight: true,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::Submission(format!("send failed: {}", e)))?;

        wait_for_finalized(
            self.rpc.as_ref(),
            &signature,
            self.confirm_timeout,
            self.confirm_poll_interval,
        )
        .await?;

        Ok(signature)
    }
}

/// Poll `source` until `signature` reaches finalized commitment
///
/// Any outcome other than an observed finalization is `Error::Submission`:
/// a poll failure, or the timeout elapsing first.
async fn wait_for_finalized(
    source: &dyn ConfirmationSource,
    signature: &Signature,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        let confirmed = source
            .is_finalized(signature)
            .await
            .map_err(|e| Error::Submission(format!("confirmation failed: {}", e)))?;

        if confirmed {
            debug!(%signature, "Transaction finalized");
            return Ok(());
        }

        if Instant::now() >= deadline {
            return Err(Error::Submission(format!(
                "confirmation timed out after {:?}: {}",
                timeout, signature
            )));
        }

        sleep(poll_interval).await;
    }
}

#[async_trait]
impl SwapExecutor for SwapPipeline {
    async fn swap(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        wallet: &LiquidationWallet,
    ) -> Result<Signature> {
        let quote = self
            .jupiter
            .quote(input_mint, output_mint, amount, self.trading.slippage_bps)
            .await?;

        let serialized_tx = self
            .jupiter
            .swap_transaction(
                quote,
                &wallet.address(),
                self.trading.priority_fee_lamports,
            )
            .await?;

        self.sign_and_send(&serialized_tx, wallet).await
    }
}

/// Derive an associated token account address for a wallet and mint
pub fn derive_ata(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address(wallet, mint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Confirmation source scripted by poll order; an exhausted script keeps
    /// answering "not finalized"
    struct ScriptedConfirmations {
        script: Mutex<VecDeque<Result<bool>>>,
    }

    impl ScriptedConfirmations {
        fn new(script: Vec<Result<bool>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl ConfirmationSource for ScriptedConfirmations {
        async fn is_finalized(&self, _signature: &Signature) -> Result<bool> {
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(false))
        }
    }

    #[test]
    fn test_derive_ata() {
        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ata = derive_ata(&wallet, &mint);

        // ATA should be deterministic
        assert_eq!(ata, derive_ata(&wallet, &mint));
        assert_ne!(ata, derive_ata(&Pubkey::new_unique(), &mint));
    }

    #[tokio::test]
    async fn test_success_only_after_finalized_report() {
        let source = ScriptedConfirmations::new(vec![Ok(false), Ok(false), Ok(true)]);

        wait_for_finalized(
            &source,
            &Signature::new_unique(),
            Duration::from_secs(5),
            Duration::from_millis(1),
        )
        .await
        .unwrap();

        // All three polls were needed; the first two never returned success
        assert!(source.script.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_never_confirming_signature_times_out_as_error() {
        let source = ScriptedConfirmations::new(vec![]);

        let err = wait_for_finalized(
            &source,
            &Signature::new_unique(),
            Duration::from_millis(30),
            Duration::from_millis(5),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Submission(_)));
    }

    #[tokio::test]
    async fn test_confirmation_poll_failure_is_submission_error() {
        let source = ScriptedConfirmations::new(vec![Err(Error::Rpc("node down".into()))]);

        let err = wait_for_finalized(
            &source,
            &Signature::new_unique(),
            Duration::from_secs(5),
            Duration::from_millis(1),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Submission(_)));
    }
}
