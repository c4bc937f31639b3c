//! Telegram Bot API feed.
//!
//! Long-polls `getUpdates` and flattens messages and channel posts into an
//! endless stream of [`InboundMessage`]. Transport and API errors are
//! logged and retried after a back-off; they never end the stream.

use anyhow::{bail, Context, Result};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{InboundMessage, MessageFeed};

const API_BASE: &str = "https://api.telegram.org";
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    channel_post: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// Messages in an update batch, plus the offset that acknowledges them.
fn parse_updates(body: &str) -> Result<(Vec<InboundMessage>, Option<i64>)> {
    let resp: UpdatesResponse =
        serde_json::from_str(body).context("Malformed getUpdates response")?;
    if !resp.ok {
        bail!(
            "getUpdates refused: {}",
            resp.description.unwrap_or_else(|| "no description".into())
        );
    }

    let next_offset = resp.result.iter().map(|u| u.update_id + 1).max();
    let messages = resp
        .result
        .into_iter()
        .filter_map(|u| u.message.or(u.channel_post))
        .filter_map(|m| {
            let text = m.text.or(m.caption)?;
            Some(InboundMessage {
                origin_id: m.chat.id.to_string(),
                text,
            })
        })
        .collect();
    Ok((messages, next_offset))
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct TelegramFeed {
    http: Client,
    base_url: String,
    token: SecretString,
    long_poll: Duration,
}

impl TelegramFeed {
    pub fn new(token: SecretString, long_poll: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(long_poll + Duration::from_secs(10))
            .user_agent("SENTINEL/0.1.0")
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            http,
            base_url: API_BASE.to_string(),
            token,
            long_poll,
        })
    }

    /// Point at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_updates(&self, offset: Option<i64>) -> Result<(Vec<InboundMessage>, Option<i64>)> {
        let url = format!("{}/bot{}/getUpdates", self.base_url, self.token.expose_secret());
        let mut query = vec![
            ("timeout", self.long_poll.as_secs().to_string()),
            ("allowed_updates", r#"["message","channel_post"]"#.to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        // the URL embeds the token, so errors are reported without it
        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("getUpdates request failed: {}", e.without_url()))?;
        let body = resp
            .text()
            .await
            .map_err(|e| anyhow::anyhow!("getUpdates body unreadable: {}", e.without_url()))?;
        parse_updates(&body)
    }
}

struct PollState {
    feed: TelegramFeed,
    offset: Option<i64>,
    buffered: VecDeque<InboundMessage>,
}

impl MessageFeed for TelegramFeed {
    fn subscribe(&self) -> BoxStream<'static, InboundMessage> {
        info!("Telegram feed subscribing");
        let state = PollState {
            feed: self.clone(),
            offset: None,
            buffered: VecDeque::new(),
        };
        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(msg) = state.buffered.pop_front() {
                    return Some((msg, state));
                }
                match state.feed.get_updates(state.offset).await {
                    Ok((messages, next_offset)) => {
                        if let Some(next) = next_offset {
                            state.offset = Some(next);
                        }
                        debug!(count = messages.len(), "Telegram updates");
                        state.buffered.extend(messages);
                    }
                    Err(e) => {
                        warn!(error = %e, "Telegram poll failed, retrying");
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        })
        .boxed()
    }
}
