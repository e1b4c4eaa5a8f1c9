//! Feed payload parsing and buy-event extraction
//!
//! The feed is an untrusted, loosely-structured JSON stream. Everything here
//! parses into tagged variants with optional fields; any absent field means
//! "not of interest" and discards the notification, never a fault. Token
//! amounts are parsed as full-precision integers, never floats.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::debug;

use crate::trading::executor::derive_ata;

/// Subscription request for the transaction feed
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: (AccountFilter, CommitmentFilter),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountFilter {
    pub account_include: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitmentFilter {
    pub commitment: &'static str,
}

impl SubscribeRequest {
    /// Subscribe to transactions touching `mint`, at confirmed commitment
    pub fn for_mint(mint: &Pubkey) -> Self {
        Self {
            jsonrpc: "2.0",
            id: 1,
            method: "transactionSubscribe",
            params: (
                AccountFilter {
                    account_include: vec![mint.to_string()],
                },
                CommitmentFilter {
                    commitment: "confirmed",
                },
            ),
        }
    }
}

/// A qualifying retail buy of the tracked token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyEvent {
    /// Fee payer of the triggering transaction
    pub signer: Pubkey,
    /// Tokens the signer gained, smallest units (always > 0)
    pub token_delta: u64,
    /// SOL the signer spent net of the transaction fee, lamports
    pub lamports_spent: u64,
}

/// Tagged view of one inbound feed message
#[derive(Debug)]
pub enum Notification {
    /// Subscription acknowledged by the server
    Subscribed(u64),
    /// A transaction touching the tracked mint
    Transaction(TransactionNotification),
    /// Anything else; ignored
    Unknown,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    method: Option<String>,
    params: Option<NotificationParams>,
    result: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    result: Option<NotificationResult>,
}

#[derive(Debug, Deserialize)]
struct NotificationResult {
    transaction: Option<TransactionNotification>,
}

impl Notification {
    /// Parse a raw feed message; anything unrecognized is `Unknown`
    pub fn parse(text: &str) -> Self {
        let raw: RawMessage = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Unparseable feed message: {}", e);
                return Notification::Unknown;
            }
        };

        if raw.method.as_deref() == Some("transactionNotification") {
            if let Some(tx) = raw.params.and_then(|p| p.result).and_then(|r| r.transaction) {
                return Notification::Transaction(tx);
            }
            return Notification::Unknown;
        }

        if let Some(id) = raw.result.as_ref().and_then(|r| r.as_u64()) {
            return Notification::Subscribed(id);
        }

        Notification::Unknown
    }
}

/// Transaction body plus its balance-change metadata
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionNotification {
    transaction: Option<TransactionBody>,
    meta: Option<TransactionMeta>,
}

#[derive(Debug, Clone, Deserialize)]
struct TransactionBody {
    message: Option<TransactionMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMessage {
    #[serde(default)]
    account_keys: Vec<AccountKey>,
}

/// Account keys arrive either as plain strings or as parsed objects
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AccountKey {
    Plain(String),
    Parsed { pubkey: String },
}

impl AccountKey {
    fn pubkey(&self) -> &str {
        match self {
            AccountKey::Plain(s) => s,
            AccountKey::Parsed { pubkey } => pubkey,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct TransactionMeta {
    fee: Option<u64>,
    #[serde(default)]
    pre_balances: Vec<u64>,
    #[serde(default)]
    post_balances: Vec<u64>,
    #[serde(default)]
    pre_token_balances: Vec<TokenBalanceRecord>,
    #[serde(default)]
    post_token_balances: Vec<TokenBalanceRecord>,
}

/// Per-account token balance record from transaction metadata
///
/// The raw amount appears either directly on the record or nested inside the
/// standard `uiTokenAmount` object, depending on the feed provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalanceRecord {
    account_index: Option<usize>,
    amount: Option<String>,
    ui_token_amount: Option<UiTokenAmount>,
}

#[derive(Debug, Clone, Deserialize)]
struct UiTokenAmount {
    amount: Option<String>,
}

impl TokenBalanceRecord {
    fn raw_amount(&self) -> Option<u128> {
        let text = self
            .amount
            .as_deref()
            .or_else(|| self.ui_token_amount.as_ref()?.amount.as_deref())?;
        text.parse::<u128>().ok()
    }
}

impl TransactionNotification {
    /// Reduce this notification to a qualifying buy event, if it is one
    ///
    /// Returns `None` for excluded signers, transactions that never touch the
    /// signer's token account for `mint`, non-positive token deltas, and
    /// purchases below `min_spend_lamports`.
    pub fn buy_event(
        &self,
        mint: &Pubkey,
        excluded_signers: &HashSet<String>,
        min_spend_lamports: u64,
    ) -> Option<BuyEvent> {
        let message = self.transaction.as_ref()?.message.as_ref()?;
        let meta = self.meta.as_ref()?;

        let signer_str = message.account_keys.first()?.pubkey();
        if excluded_signers.contains(signer_str) {
            return None;
        }

        let signer = Pubkey::from_str(signer_str).ok()?;
        let token_account = derive_ata(&signer, mint).to_string();

        let account_index = message
            .account_keys
            .iter()
            .position(|key| key.pubkey() == token_account)?;

        let pre = find_record(&meta.pre_token_balances, account_index)?;
        let post = find_record(&meta.post_token_balances, account_index)?;

        // Full-precision integer math; feed amounts can exceed f64 range
        let delta = post as i128 - pre as i128;
        if delta <= 0 {
            return None;
        }
        let token_delta = u64::try_from(delta).ok()?;

        let fee = meta.fee.unwrap_or(0);
        let pre_lamports = *meta.pre_balances.first()? as i128;
        let post_lamports = *meta.post_balances.first()? as i128;
        let spent = pre_lamports - post_lamports - fee as i128;

        if spent < min_spend_lamports as i128 {
            return None;
        }

        Some(BuyEvent {
            signer,
            token_delta,
            lamports_spent: spent as u64,
        })
    }
}

fn find_record(records: &[TokenBalanceRecord], account_index: usize) -> Option<u128> {
    records
        .iter()
        .find(|r| r.account_index == Some(account_index))?
        .raw_amount()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification_json(
        signer: &Pubkey,
        mint: &Pubkey,
        pre_tokens: &str,
        post_tokens: &str,
        pre_lamports: u64,
        post_lamports: u64,
        fee: u64,
    ) -> String {
        let token_account = derive_ata(signer, mint);
        format!(
            r#"{{
                "jsonrpc": "2.0",
                "method": "transactionNotification",
                "params": {{
                    "subscription": 1,
                    "result": {{
                        "transaction": {{
                            "transaction": {{
                                "message": {{
                                    "accountKeys": ["{signer}", "{token_account}", "{mint}"]
                                }}
                            }},
                            "meta": {{
                                "fee": {fee},
                                "preBalances": [{pre_lamports}, 0, 0],
                                "postBalances": [{post_lamports}, 0, 0],
                                "preTokenBalances": [
                                    {{"accountIndex": 1, "amount": "{pre_tokens}"}}
                                ],
                                "postTokenBalances": [
                                    {{"accountIndex": 1, "amount": "{post_tokens}"}}
                                ]
                            }}
                        }}
                    }}
                }}
            }}"#
        )
    }

    fn parse_tx(json: &str) -> TransactionNotification {
        match Notification::parse(json) {
            Notification::Transaction(tx) => tx,
            other => panic!("expected transaction notification, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_subscription_ack() {
        let json = r#"{"jsonrpc":"2.0","result":42,"id":1}"#;
        match Notification::parse(json) {
            Notification::Subscribed(id) => assert_eq!(id, 42),
            other => panic!("expected ack, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_garbage_is_unknown() {
        assert!(matches!(Notification::parse("not json"), Notification::Unknown));
        assert!(matches!(
            Notification::parse(r#"{"method":"somethingElse"}"#),
            Notification::Unknown
        ));
    }

    #[test]
    fn test_qualifying_buy_emits_event() {
        let signer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let json = notification_json(
            &signer,
            &mint,
            "0",
            "1000000",
            500_000_000,
            430_000_000,
            5_000,
        );

        let tx = parse_tx(&json);
        let event = tx.buy_event(&mint, &HashSet::new(), 69_000_000).unwrap();

        assert_eq!(event.signer, signer);
        assert_eq!(event.token_delta, 1_000_000);
        assert_eq!(event.lamports_spent, 69_995_000);
    }

    #[test]
    fn test_excluded_signer_is_ignored() {
        let signer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let json = notification_json(&signer, &mint, "0", "1000000", 500_000_000, 400_000_000, 5_000);

        let excluded: HashSet<String> = [signer.to_string()].into();
        let tx = parse_tx(&json);
        assert!(tx.buy_event(&mint, &excluded, 0).is_none());
    }

    #[test]
    fn test_sell_delta_is_ignored() {
        let signer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        // post < pre: the signer sold, not bought
        let json = notification_json(&signer, &mint, "1000000", "400000", 500_000_000, 400_000_000, 5_000);

        let tx = parse_tx(&json);
        assert!(tx.buy_event(&mint, &HashSet::new(), 0).is_none());
    }

    #[test]
    fn test_below_threshold_is_ignored() {
        let signer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        // spent = 10_000_000 - 5_000 fee < 69_000_000 threshold
        let json = notification_json(&signer, &mint, "0", "1000000", 500_000_000, 490_000_000, 5_000);

        let tx = parse_tx(&json);
        assert!(tx.buy_event(&mint, &HashSet::new(), 69_000_000).is_none());
    }

    #[test]
    fn test_signer_without_token_account_is_ignored() {
        let signer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let other = Pubkey::new_unique();
        // Account list carries someone else's token account, not the signer's
        let token_account = derive_ata(&other, &mint);
        let json = format!(
            r#"{{
                "method": "transactionNotification",
                "params": {{"result": {{"transaction": {{
                    "transaction": {{"message": {{"accountKeys": ["{signer}", "{token_account}"]}}}},
                    "meta": {{"fee": 5000, "preBalances": [1, 1], "postBalances": [0, 1],
                             "preTokenBalances": [], "postTokenBalances": []}}
                }}}}}}
            }}"#
        );

        let tx = parse_tx(&json);
        assert!(tx.buy_event(&mint, &HashSet::new(), 0).is_none());
    }

    #[test]
    fn test_missing_balance_records_are_ignored() {
        let signer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let token_account = derive_ata(&signer, &mint);
        let json = format!(
            r#"{{
                "method": "transactionNotification",
                "params": {{"result": {{"transaction": {{
                    "transaction": {{"message": {{"accountKeys": ["{signer}", "{token_account}"]}}}},
                    "meta": {{"fee": 5000, "preBalances": [1000000000, 0], "postBalances": [0, 0],
                             "preTokenBalances": [], "postTokenBalances": [{{"accountIndex": 1, "amount": "5"}}]}}
                }}}}}}
            }}"#
        );

        let tx = parse_tx(&json);
        assert!(tx.buy_event(&mint, &HashSet::new(), 0).is_none());
    }

    #[test]
    fn test_large_amounts_keep_full_precision() {
        let signer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        // Values above 2^53 lose precision as f64; they must survive intact
        let pre = "9007199254740993";
        let post = "9007199254740995";
        let json = notification_json(&signer, &mint, pre, post, 500_000_000, 400_000_000, 5_000);

        let tx = parse_tx(&json);
        let event = tx.buy_event(&mint, &HashSet::new(), 0).unwrap();
        assert_eq!(event.token_delta, 2);
    }

    #[test]
    fn test_ui_token_amount_shape_is_accepted() {
        let signer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let token_account = derive_ata(&signer, &mint);
        let json = format!(
            r#"{{
                "method": "transactionNotification",
                "params": {{"result": {{"transaction": {{
                    "transaction": {{"message": {{"accountKeys": ["{signer}", "{token_account}"]}}}},
                    "meta": {{"fee": 5000,
                             "preBalances": [500000000, 0], "postBalances": [400000000, 0],
                             "preTokenBalances": [{{"accountIndex": 1, "uiTokenAmount": {{"amount": "100"}}}}],
                             "postTokenBalances": [{{"accountIndex": 1, "uiTokenAmount": {{"amount": "700"}}}}]}}
                }}}}}}
            }}"#
        );

        let tx = parse_tx(&json);
        let event = tx.buy_event(&mint, &HashSet::new(), 0).unwrap();
        assert_eq!(event.token_delta, 600);
    }

    #[test]
    fn test_subscribe_request_shape() {
        let mint = Pubkey::new_unique();
        let request = SubscribeRequest::for_mint(&mint);
        let json = serde_json::to_string(&request).unwrap();

        assert!(json.contains("\"method\":\"transactionSubscribe\""));
        assert!(json.contains(&format!("\"accountInclude\":[\"{}\"]", mint)));
        assert!(json.contains("\"commitment\":\"confirmed\""));
    }
}
