//! Transaction feed listener
//!
//! Holds one persistent WebSocket subscription filtered to the tracked mint
//! and reduces each notification to at most one `BuyEvent`. On any socket
//! error or close the connection is dropped and re-established after a fixed
//! delay, with identical subscription parameters, indefinitely.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::stream::notification::{BuyEvent, Notification, SubscribeRequest};

/// Listener configuration
#[derive(Debug, Clone)]
pub struct FeedListenerConfig {
    pub ws_endpoint: String,
    /// Fixed backoff between reconnect attempts
    pub reconnect_delay_ms: u64,
}

/// Long-lived feed listener; emits qualifying buy events into a bounded queue
pub struct FeedListener {
    config: FeedListenerConfig,
    mint: Pubkey,
    excluded_signers: HashSet<String>,
    min_spend_lamports: u64,
    event_tx: mpsc::Sender<BuyEvent>,
    shutdown: broadcast::Sender<()>,
}

impl FeedListener {
    pub fn new(
        config: FeedListenerConfig,
        mint: Pubkey,
        excluded_signers: HashSet<String>,
        min_spend_lamports: u64,
        event_tx: mpsc::Sender<BuyEvent>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);

        Self {
            config,
            mint,
            excluded_signers,
            min_spend_lamports,
            event_tx,
            shutdown,
        }
    }

    /// Spawn the subscribe/reconnect loop
    ///
    /// Runs until `stop()` is called; there is no retry cap and no
    /// termination condition under normal operation.
    pub fn start(&self) {
        info!(endpoint = %self.config.ws_endpoint, mint = %self.mint, "Starting feed listener");

        let config = self.config.clone();
        let mint = self.mint;
        let excluded = self.excluded_signers.clone();
        let min_spend = self.min_spend_lamports;
        let event_tx = self.event_tx.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    info!("Feed listener shutting down");
                    break;
                }

                if let Err(e) =
                    Self::connect_and_stream(&config, &mint, &excluded, min_spend, &event_tx).await
                {
                    error!("Feed transport error: {}", e);
                }

                let delay = Duration::from_millis(config.reconnect_delay_ms);
                warn!("Feed disconnected, reconnecting in {:?}", delay);
                sleep(delay).await;
            }
        });
    }

    /// Stop the listener
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    /// One connection lifetime: connect, subscribe, stream until failure
    async fn connect_and_stream(
        config: &FeedListenerConfig,
        mint: &Pubkey,
        excluded_signers: &HashSet<String>,
        min_spend_lamports: u64,
        event_tx: &mpsc::Sender<BuyEvent>,
    ) -> Result<()> {
        let url = url::Url::parse(&config.ws_endpoint)
            .map_err(|e| Error::Config(format!("Invalid WebSocket URL: {}", e)))?;

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::FeedTransport(format!("connect failed: {}", e)))?;

        info!("Connected to transaction feed");

        let (mut write, mut read) = ws_stream.split();

        // Identical subscription parameters on every (re)connect
        let subscribe = serde_json::to_string(&SubscribeRequest::for_mint(mint))?;
        write
            .send(Message::Text(subscribe))
            .await
            .map_err(|e| Error::FeedTransport(format!("subscribe failed: {}", e)))?;

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Some(event) =
                        extract_event(&text, mint, excluded_signers, min_spend_lamports)
                    {
                        dispatch(event, event_tx);
                    }
                }
                Ok(Message::Ping(payload)) => {
                    if let Err(e) = write.send(Message::Pong(payload)).await {
                        return Err(Error::FeedTransport(format!("pong failed: {}", e)));
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Feed closed by server");
                    return Ok(());
                }
                Err(e) => {
                    return Err(Error::FeedTransport(e.to_string()));
                }
                _ => {}
            }
        }

        info!("Feed stream ended");
        Ok(())
    }
}

/// Reduce one raw feed message to a qualifying buy event, if any
fn extract_event(
    text: &str,
    mint: &Pubkey,
    excluded_signers: &HashSet<String>,
    min_spend_lamports: u64,
) -> Option<BuyEvent> {
    match Notification::parse(text) {
        Notification::Subscribed(id) => {
            info!(subscription = id, "Feed subscription confirmed");
            None
        }
        Notification::Transaction(tx) => {
            tx.buy_event(mint, excluded_signers, min_spend_lamports)
        }
        Notification::Unknown => {
            debug!("Ignoring feed message of no interest");
            None
        }
    }
}

/// Hand a buy event to the run queue without blocking the socket loop
///
/// The queue is bounded; an event arriving while a run is already queued is
/// dropped, which serializes runs and keeps the listener responsive.
fn dispatch(event: BuyEvent, event_tx: &mpsc::Sender<BuyEvent>) {
    match event_tx.try_send(event.clone()) {
        Ok(()) => {
            info!(
                signer = %event.signer,
                tokens = event.token_delta,
                lamports = event.lamports_spent,
                "Qualifying buy detected, run queued"
            );
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(
                signer = %event.signer,
                "Run queue full, dropping qualifying buy"
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            warn!("Run queue closed, dropping qualifying buy");
        }
    }
}
