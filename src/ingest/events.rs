//! Event router: turns messages from allow-listed chats into signals.

use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{emit, extract_token, InboundMessage, MessageFeed, SignalSender};
use crate::config::MessagingConfig;
use crate::types::CandidateSignal;

/// An allow-listed origin and the source id its signals carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedSource {
    pub name: String,
    pub chat_id: String,
}

pub struct EventRouter {
    sources: Vec<AllowedSource>,
    min_sentiment: Option<f64>,
}

impl EventRouter {
    pub fn new(sources: Vec<AllowedSource>, min_sentiment: Option<f64>) -> Self {
        Self {
            sources,
            min_sentiment,
        }
    }

    pub fn from_config(cfg: &MessagingConfig) -> Self {
        let sources = cfg
            .sources
            .iter()
            .map(|s| AllowedSource {
                name: s.name.clone(),
                chat_id: s.chat_id.clone(),
            })
            .collect();
        Self::new(sources, cfg.min_sentiment)
    }

    /// Source name for an origin. Chat ids are matched as substrings so
    /// that "-10012345678" style supergroup ids hit a bare "10012345678".
    fn source_for(&self, origin_id: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|s| !s.chat_id.is_empty() && origin_id.contains(&s.chat_id))
            .map(|s| s.name.as_str())
    }

    /// Signal for a message, if it comes from an allowed chat, names a
    /// ticker and clears the sentiment bar.
    pub fn route(&self, msg: &InboundMessage) -> Option<CandidateSignal> {
        if !msg.text.contains('$') {
            return None;
        }
        let source = self.source_for(&msg.origin_id)?;
        let token = extract_token(&msg.text, self.min_sentiment)?;
        Some(CandidateSignal::new(source, token))
    }

    /// Consume the feed until shutdown, the feed ends, or the receiver goes away.
    pub async fn run(
        self,
        feed: Box<dyn MessageFeed>,
        tx: SignalSender,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(sources = self.sources.len(), "Event router online");
        let mut messages = feed.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Event router: shutdown signal received");
                    return;
                }
                next = messages.next() => match next {
                    Some(msg) => {
                        let Some(signal) = self.route(&msg) else {
                            continue;
                        };
                        debug!(signal = %signal, "Message signal");
                        if !emit(&tx, signal, "messaging") {
                            warn!("Signal channel closed, event router stopping");
                            return;
                        }
                    }
                    None => {
                        warn!("Message feed ended");
                        return;
                    }
                },
            }
        }
    }
}
