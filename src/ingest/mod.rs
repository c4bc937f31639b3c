//! Signal ingestion.
//!
//! Two producers feed one bounded channel of `CandidateSignal`s: a web
//! poller that scrapes configured endpoints, and an event router over a
//! subscribed messaging feed. Producers never block on a full channel;
//! a signal that does not fit is dropped with a warning, since the next
//! poll will produce a fresher one.

pub mod events;
pub mod poller;
pub mod sentiment;
pub mod telegram;
pub mod ticker;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use crate::types::CandidateSignal;

pub use events::EventRouter;
pub use poller::WebPoller;
pub use telegram::TelegramFeed;

pub type SignalSender = mpsc::Sender<CandidateSignal>;
pub type SignalReceiver = mpsc::Receiver<CandidateSignal>;

pub fn channel(capacity: usize) -> (SignalSender, SignalReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Queue a signal without waiting. Returns false once the receiver is gone.
pub(crate) fn emit(tx: &SignalSender, signal: CandidateSignal, producer: &str) -> bool {
    match tx.try_send(signal) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(signal)) => {
            warn!(producer, signal = %signal, "Signal channel full, dropping signal");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Token named by `text` if it carries a ticker and clears the sentiment bar.
pub(crate) fn extract_token(text: &str, min_sentiment: Option<f64>) -> Option<String> {
    let token = ticker::first_ticker(text)?;
    sentiment::passes(text, min_sentiment).then_some(token)
}

// ---------------------------------------------------------------------------
// HTTP fetch
// ---------------------------------------------------------------------------

/// Fetches an endpoint body as text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String>;
}

pub struct ReqwestFetcher {
    http: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent("SENTINEL/0.1.0 (signal-poller)")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?;
        resp.text()
            .await
            .with_context(|| format!("Failed to read body from {url}"))
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

/// One message from a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Chat or channel identifier, as text.
    pub origin_id: String,
    pub text: String,
}

/// A subscription that yields messages until the process stops.
///
/// Implementations retry transport errors internally; the stream ends
/// only if the feed is permanently gone.
pub trait MessageFeed: Send + Sync {
    fn subscribe(&self) -> BoxStream<'static, InboundMessage>;
}
