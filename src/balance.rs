//! On-demand token balance lookups for the tracked mint

use std::sync::Arc;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use tracing::warn;

/// Source of live token balances, keyed by owner wallet
///
/// A missing token account or a failed lookup reads as zero. Callers treat
/// zero as "holds none"; transient RPC failures are therefore indistinguishable
/// from an empty wallet, which the warn log is there to surface.
#[async_trait]
pub trait TokenBalanceSource: Send + Sync {
    /// Current tracked-token balance of `owner`, in smallest units
    async fn token_balance(&self, owner: &Pubkey) -> u64;
}

/// RPC-backed balance inspector for the tracked mint
pub struct RpcBalanceInspector {
    rpc: Arc<RpcClient>,
    mint: Pubkey,
}

impl RpcBalanceInspector {
    pub fn new(rpc: Arc<RpcClient>, mint: Pubkey) -> Self {
        Self { rpc, mint }
    }

    /// Associated token account holding `owner`'s balance of the tracked mint
    pub fn token_account(&self, owner: &Pubkey) -> Pubkey {
        get_associated_token_address(owner, &self.mint)
    }
}

#[async_trait]
impl TokenBalanceSource for RpcBalanceInspector {
    async fn token_balance(&self, owner: &Pubkey) -> u64 {
        let token_account = self.token_account(owner);

        match self.rpc.get_token_account_balance(&token_account).await {
            Ok(balance) => balance.amount.parse::<u64>().unwrap_or_else(|e| {
                warn!(
                    wallet = %owner,
                    amount = %balance.amount,
                    "Unparseable token balance, treating as zero: {}",
                    e
                );
                0
            }),
            Err(e) => {
                warn!(wallet = %owner, "No token balance readable, treating as zero: {}", e);
                0
            }
        }
    }
}
