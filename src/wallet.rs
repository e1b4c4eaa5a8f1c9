//! Liquidation wallets and the per-run rotation pool
//!
//! Exactly five liquidation wallets are loaded once at startup from base58
//! secret keys and live for the process lifetime. Every liquidation run gets
//! its own fresh `WalletPool`; pools are never shared between runs.

use std::sync::Arc;

use rand::Rng;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use tracing::info;

use crate::error::{Error, Result};

/// A liquidation-capable signing wallet
pub struct LiquidationWallet {
    keypair: Keypair,
}

impl LiquidationWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Parse a wallet from a base58-encoded secret key
    pub fn from_base58(secret: &str) -> Result<Self> {
        let bytes = bs58::decode(secret.trim())
            .into_vec()
            .map_err(|e| Error::InvalidKeypair(format!("base58 decode failed: {}", e)))?;

        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| Error::InvalidKeypair(format!("keypair decode failed: {}", e)))?;

        Ok(Self { keypair })
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn address(&self) -> String {
        self.keypair.pubkey().to_string()
    }
}

impl std::fmt::Debug for LiquidationWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidationWallet")
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

/// Load the liquidation wallet set from base58 secret keys
pub fn load_liquidation_wallets(secrets: &[String]) -> Result<Vec<Arc<LiquidationWallet>>> {
    let mut wallets = Vec::with_capacity(secrets.len());

    for (i, secret) in secrets.iter().enumerate() {
        let wallet = LiquidationWallet::from_base58(secret)
            .map_err(|e| Error::InvalidKeypair(format!("liquidation wallet {}: {}", i, e)))?;
        info!(wallet = %wallet.address(), "Loaded liquidation wallet");
        wallets.push(Arc::new(wallet));
    }

    Ok(wallets)
}

/// Per-run wallet rotation pool
///
/// Hands out each wallet at most once while any undrawn wallet remains, then
/// degrades to re-selecting uniformly from already-drawn wallets. Used
/// wallets are never reintroduced as fresh.
pub struct WalletPool {
    available: Vec<Arc<LiquidationWallet>>,
    used: Vec<Arc<LiquidationWallet>>,
}

impl WalletPool {
    /// Initialize a fresh pool with every wallet available
    pub fn new(wallets: &[Arc<LiquidationWallet>]) -> Self {
        Self {
            available: wallets.to_vec(),
            used: Vec::with_capacity(wallets.len()),
        }
    }

    /// Draw the next wallet for a step
    pub fn draw(&mut self) -> Option<Arc<LiquidationWallet>> {
        let mut rng = rand::thread_rng();

        if !self.available.is_empty() {
            let idx = rng.gen_range(0..self.available.len());
            let wallet = self.available.swap_remove(idx);
            self.used.push(wallet.clone());
            return Some(wallet);
        }

        if self.used.is_empty() {
            return None;
        }

        let idx = rng.gen_range(0..self.used.len());
        Some(self.used[idx].clone())
    }

    /// Number of wallets not yet drawn this run
    pub fn remaining(&self) -> usize {
        self.available.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn pool_of(n: usize) -> (Vec<Arc<LiquidationWallet>>, WalletPool) {
        let wallets: Vec<_> = (0..n)
            .map(|_| Arc::new(LiquidationWallet::new(Keypair::new())))
            .collect();
        let pool = WalletPool::new(&wallets);
        (wallets, pool)
    }

    #[test]
    fn test_from_base58_roundtrip() {
        let keypair = Keypair::new();
        let secret = bs58::encode(keypair.to_bytes()).into_string();

        let wallet = LiquidationWallet::from_base58(&secret).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_from_base58_rejects_garbage() {
        assert!(LiquidationWallet::from_base58("not-base58-!!!").is_err());
        assert!(LiquidationWallet::from_base58("1111").is_err());
    }

    #[test]
    fn test_first_five_draws_are_a_permutation() {
        let (wallets, mut pool) = pool_of(5);
        let configured: HashSet<Pubkey> = wallets.iter().map(|w| w.pubkey()).collect();

        let drawn: HashSet<Pubkey> = (0..5).map(|_| pool.draw().unwrap().pubkey()).collect();

        assert_eq!(drawn, configured);
        assert_eq!(pool.remaining(), 0);
    }

    #[test]
    fn test_exhausted_pool_recycles_used_wallets() {
        let (wallets, mut pool) = pool_of(5);
        let configured: HashSet<Pubkey> = wallets.iter().map(|w| w.pubkey()).collect();

        for _ in 0..5 {
            pool.draw().unwrap();
        }

        // Further draws come from the used set, never from thin air
        for _ in 0..20 {
            let recycled = pool.draw().unwrap();
            assert!(configured.contains(&recycled.pubkey()));
            assert_eq!(pool.remaining(), 0);
        }
    }

    #[test]
    fn test_empty_pool_draws_nothing() {
        let (_, mut pool) = pool_of(0);
        assert!(pool.draw().is_none());
    }
}
