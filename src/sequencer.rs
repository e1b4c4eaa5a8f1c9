//! Liquidation sequencer
//!
//! Turns one qualifying buy into an ordered five-step plan of sells and buys
//! across a rotating pool of wallets: sell 50%, small buy, sell 45%, two
//! smaller buys. Every step is gated on a live balance check of the wallet
//! drawn for it; sells clamp down to the live balance, buys abort the run
//! once every wallet checked so far in the run has shown zero. Completed
//! trades are never rolled back.
//!
//! Runs are serialized: `run_worker` drains a bounded queue one event at a
//! time, so two qualifying buys can never race each other's balance checks.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::balance::TokenBalanceSource;
use crate::config::{SequencerConfig, NATIVE_MINT};
use crate::error::{Error, Result};
use crate::stream::notification::BuyEvent;
use crate::trading::SwapExecutor;
use crate::wallet::{LiquidationWallet, WalletPool};

/// Terminal state of one liquidation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every liquidation wallet was empty; no trade was attempted
    NeverStarted,
    /// All five steps were attempted
    Completed,
    /// Pool exhaustion detected at a buy step; remaining steps skipped
    Aborted { step: u8 },
}

/// Orchestrates liquidation runs over the fixed wallet set
pub struct LiquidationSequencer {
    wallets: Vec<Arc<LiquidationWallet>>,
    swap: Arc<dyn SwapExecutor>,
    balances: Arc<dyn TokenBalanceSource>,
    config: SequencerConfig,
    token_mint: String,
    dry_run: bool,
}

impl LiquidationSequencer {
    pub fn new(
        wallets: Vec<Arc<LiquidationWallet>>,
        swap: Arc<dyn SwapExecutor>,
        balances: Arc<dyn TokenBalanceSource>,
        config: SequencerConfig,
        token_mint: String,
        dry_run: bool,
    ) -> Self {
        Self {
            wallets,
            swap,
            balances,
            config,
            token_mint,
            dry_run,
        }
    }

    /// Execute one full run in reaction to `event`
    ///
    /// A swap failure at any step propagates out and abandons the remaining
    /// steps of this run only; already-executed trades stand.
    pub async fn run(&self, event: &BuyEvent) -> Result<RunOutcome> {
        info!(
            signer = %event.signer,
            tokens = event.token_delta,
            "Retail buy detected, initiating liquidation sequence"
        );

        if !self.any_wallet_holds_tokens().await {
            warn!("All liquidation wallets are empty, skipping sequence");
            return Ok(RunOutcome::NeverStarted);
        }

        let mut pool = WalletPool::new(&self.wallets);
        // True while every wallet checked so far this run showed zero
        let mut all_checked_zero = true;

        // Step 1: sell 50% of the bought amount
        self.sell_step(&mut pool, 1, event.token_delta, 50, &mut all_checked_zero)
            .await?;
        self.step_pause().await;

        // Step 2: small buy
        let amount = self.random_lamports(
            self.config.large_buy_min_lamports,
            self.config.large_buy_max_lamports,
        );
        if self
            .buy_step(&mut pool, 2, amount, &mut all_checked_zero)
            .await?
        {
            return Ok(RunOutcome::Aborted { step: 2 });
        }
        self.step_pause().await;

        // Step 3: sell 45% of the bought amount
        self.sell_step(&mut pool, 3, event.token_delta, 45, &mut all_checked_zero)
            .await?;
        self.step_pause().await;

        // Steps 4 and 5: two smaller buys
        for step in [4u8, 5] {
            let amount = self.random_lamports(
                self.config.small_buy_min_lamports,
                self.config.small_buy_max_lamports,
            );
            if self
                .buy_step(&mut pool, step, amount, &mut all_checked_zero)
                .await?
            {
                return Ok(RunOutcome::Aborted { step });
            }
            if step < 5 {
                self.step_pause().await;
            }
        }

        info!(signer = %event.signer, "Liquidation sequence completed");
        Ok(RunOutcome::Completed)
    }

    /// Pre-flight: does any liquidation wallet hold the tracked token?
    /// Reads every wallet, not just until the first hit.
    async fn any_wallet_holds_tokens(&self) -> bool {
        let mut any = false;
        for wallet in &self.wallets {
            let balance = self.balances.token_balance(&wallet.pubkey()).await;
            any |= balance > 0;
        }
        any
    }

    /// One sell step: clamp the intended fraction to the live balance
    ///
    /// A zero balance skips the trade but never aborts the run.
    async fn sell_step(
        &self,
        pool: &mut WalletPool,
        step: u8,
        bought: u64,
        percent: u64,
        all_checked_zero: &mut bool,
    ) -> Result<()> {
        let wallet = draw(pool)?;
        let balance = self.balances.token_balance(&wallet.pubkey()).await;
        if balance > 0 {
            *all_checked_zero = false;
        } else {
            warn!(step, wallet = %wallet.address(), "Wallet is empty, rotating past sell");
            return Ok(());
        }

        let amount = fraction_of(bought, percent).min(balance);
        if amount == 0 {
            warn!(step, wallet = %wallet.address(), "Sell amount truncated to zero, skipping");
            return Ok(());
        }

        self.execute(step, "sell", &self.token_mint, NATIVE_MINT, amount, &wallet)
            .await
    }

    /// One buy step; returns true when the run must abort
    ///
    /// Aborts only when this wallet and every wallet checked earlier in the
    /// run showed a zero balance, signaling full pool exhaustion.
    async fn buy_step(
        &self,
        pool: &mut WalletPool,
        step: u8,
        lamports: u64,
        all_checked_zero: &mut bool,
    ) -> Result<bool> {
        let wallet = draw(pool)?;
        let balance = self.balances.token_balance(&wallet.pubkey()).await;
        if balance > 0 {
            *all_checked_zero = false;
        } else if *all_checked_zero {
            warn!(
                step,
                wallet = %wallet.address(),
                "Every wallet checked so far is empty, aborting run"
            );
            return Ok(true);
        }

        self.execute(step, "buy", NATIVE_MINT, &self.token_mint, lamports, &wallet)
            .await?;
        Ok(false)
    }

    async fn execute(
        &self,
        step: u8,
        action: &str,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        wallet: &LiquidationWallet,
    ) -> Result<()> {
        if self.dry_run {
            info!(step, action, amount, wallet = %wallet.address(), "[dry-run] Trade skipped");
            return Ok(());
        }

        let signature = self
            .swap
            .swap(input_mint, output_mint, amount, wallet)
            .await?;

        info!(
            step,
            action,
            amount,
            wallet = %wallet.address(),
            %signature,
            "Trade executed"
        );
        Ok(())
    }

    fn random_lamports(&self, min: u64, max: u64) -> u64 {
        rand::thread_rng().gen_range(min..max)
    }

    /// Randomized pause between steps to avoid a uniform timing signature
    async fn step_pause(&self) {
        let ms = rand::thread_rng()
            .gen_range(self.config.step_delay_min_ms..self.config.step_delay_max_ms);
        sleep(Duration::from_millis(ms)).await;
    }
}

fn draw(pool: &mut WalletPool) -> Result<Arc<LiquidationWallet>> {
    pool.draw()
        .ok_or_else(|| Error::Internal("wallet pool is empty".to_string()))
}

/// Integer percentage, truncated toward zero
fn fraction_of(amount: u64, percent: u64) -> u64 {
    (amount as u128 * percent as u128 / 100) as u64
}

/// Drain the run queue, executing runs strictly one at a time
///
/// A failed run is logged and abandoned; the worker itself never exits until
/// the queue closes.
pub async fn run_worker(sequencer: Arc<LiquidationSequencer>, mut events: mpsc::Receiver<BuyEvent>) {
    while let Some(event) = events.recv().await {
        match sequencer.run(&event).await {
            Ok(outcome) => info!(signer = %event.signer, ?outcome, "Liquidation run finished"),
            Err(e) => error!(
                signer = %event.signer,
                retryable = e.is_retryable(),
                "Liquidation run failed: {}",
                e
            ),
        }
    }
    info!("Run queue closed, worker exiting");
}
