// src/notify/telegram.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;

use super::{render_message, NotificationEvent, Sink};

/// Chat sink over the Telegram Bot API with a bounded retry budget.
/// Unconfigured (no token/chat id in the environment) it degrades to a
/// logged no-op so local runs do not need credentials.
pub struct TelegramSink {
    credentials: Option<(String, String)>,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl TelegramSink {
    pub fn from_env(client: Client) -> Self {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok();
        Self {
            credentials: token.zip(chat_id),
            client,
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn new(token: String, chat_id: String, client: Client) -> Self {
        Self {
            credentials: Some((token, chat_id)),
            client,
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    async fn post_message(&self, token: &str, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(anyhow!("Telegram sendMessage HTTP error: {e}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(anyhow!("Telegram sendMessage request failed: {e}"));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Sink for TelegramSink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<()> {
        let Some((token, chat_id)) = &self.credentials else {
            tracing::debug!("Telegram disabled (no TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID)");
            return Ok(());
        };

        let text = render_message(event);
        self.post_message(token, chat_id, &text)
            .await
            .with_context(|| format!("deliver {} to telegram", event.key))
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
