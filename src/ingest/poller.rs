//! Web poller: scrapes the configured signal endpoints on a fixed interval.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{emit, extract_token, HttpFetch, SignalSender};
use crate::config::IngestionConfig;
use crate::types::CandidateSignal;

pub struct WebPoller {
    fetcher: Arc<dyn HttpFetch>,
    endpoints: Vec<String>,
    source_id: String,
    timeout: Duration,
    interval: Duration,
    min_sentiment: Option<f64>,
}

impl WebPoller {
    pub fn new(fetcher: Arc<dyn HttpFetch>, cfg: &IngestionConfig) -> Self {
        Self {
            fetcher,
            endpoints: cfg.endpoints.clone(),
            source_id: cfg.web_source_id.clone(),
            timeout: Duration::from_millis(cfg.timeout_ms),
            interval: Duration::from_secs(cfg.poll_interval_secs.max(1)),
            min_sentiment: cfg.min_sentiment,
        }
    }

    /// Fetch every endpoint concurrently; at most one signal per endpoint.
    /// Unreachable endpoints are skipped.
    pub async fn poll_once(&self) -> Vec<CandidateSignal> {
        let fetches = self
            .endpoints
            .iter()
            .map(|url| async move { (url, self.fetcher.fetch(url, self.timeout).await) });

        let mut signals = Vec::new();
        for (url, result) in join_all(fetches).await {
            match result {
                Ok(body) => match extract_token(&body, self.min_sentiment) {
                    Some(token) => {
                        debug!(url = %url, token = %token, "Web signal");
                        signals.push(CandidateSignal::new(self.source_id.clone(), token));
                    }
                    None => debug!(url = %url, "No actionable ticker"),
                },
                Err(e) => debug!(url = %url, error = %e, "Endpoint unavailable"),
            }
        }
        signals
    }

    /// Poll until shutdown or until the receiver goes away.
    pub async fn run(self, tx: SignalSender, mut shutdown: broadcast::Receiver<()>) {
        info!(
            endpoints = self.endpoints.len(),
            interval_secs = self.interval.as_secs(),
            "Web poller started"
        );
        loop {
            for signal in self.poll_once().await {
                if !emit(&tx, signal, "web") {
                    warn!("Signal channel closed, web poller stopping");
                    return;
                }
            }
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Web poller: shutdown signal received");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::MockHttpFetch;
    use anyhow::anyhow;

    fn cfg(min_sentiment: Option<f64>) -> IngestionConfig {
        IngestionConfig {
            endpoints: vec!["https://a.test/latest".into(), "https://b.test/alerts".into()],
            min_sentiment,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_poll_once_extracts_tickers() {
        let mut fetch = MockHttpFetch::new();
        fetch.expect_fetch().returning(|url, timeout| {
            assert_eq!(timeout, Duration::from_millis(5000));
            if url.contains("a.test") {
                Ok(r#"{"pick":"$PEPE looks strong"}"#.to_string())
            } else {
                Ok("nothing today".to_string())
            }
        });

        let poller = WebPoller::new(Arc::new(fetch), &cfg(None));
        let signals = poller.poll_once().await;
        assert_eq!(signals, vec![CandidateSignal::new("WEB_AI", "PEPE")]);
    }

    #[tokio::test]
    async fn test_failed_endpoint_is_skipped() {
        let mut fetch = MockHttpFetch::new();
        fetch.expect_fetch().returning(|url, _| {
            if url.contains("a.test") {
                Err(anyhow!("timeout"))
            } else {
                Ok("$WIF".to_string())
            }
        });

        let poller = WebPoller::new(Arc::new(fetch), &cfg(None));
        let signals = poller.poll_once().await;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].token.as_deref(), Some("WIF"));
    }

    #[tokio::test]
    async fn test_sentiment_threshold_filters() {
        let mut fetch = MockHttpFetch::new();
        fetch.expect_fetch().returning(|url, _| {
            if url.contains("a.test") {
                Ok("$PEPE great buy".to_string())
            } else {
                Ok("$RUG scam crash".to_string())
            }
        });

        let poller = WebPoller::new(Arc::new(fetch), &cfg(Some(0.1)));
        let signals = poller.poll_once().await;
        assert_eq!(signals, vec![CandidateSignal::new("WEB_AI", "PEPE")]);
    }

    #[tokio::test]
    async fn test_run_emits_and_stops() {
        let mut fetch = MockHttpFetch::new();
        fetch.expect_fetch().returning(|_, _| Ok("$PEPE".to_string()));
        let poller = WebPoller::new(Arc::new(fetch), &cfg(None));

        let (tx, mut rx) = crate::ingest::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(poller.run(tx, shutdown_rx));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.source_id, "WEB_AI");
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
