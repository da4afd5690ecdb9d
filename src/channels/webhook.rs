//! Run summary delivery via a WeCom-style group bot webhook.
//!
//! One POST per run of `{"msgtype": "text", "text": {"content": ...}}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::NotifierConfig;
use crate::error::NotifyError;

/// Delivers the end-of-run summary.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, summary: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct TextContent<'a> {
    content: &'a str,
}

/// Webhook request body.
#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    msgtype: &'static str,
    text: TextContent<'a>,
}

impl<'a> TextMessage<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            msgtype: "text",
            text: TextContent { content },
        }
    }
}

/// Bot reply body. Rejections still arrive as HTTP 200.
#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Map a 2xx reply body to the delivery result. Non-JSON bodies count as accepted.
fn check_reply(body: &str) -> Result<(), NotifyError> {
    match serde_json::from_str::<WebhookReply>(body) {
        Ok(reply) if reply.errcode != 0 => Err(NotifyError::Rejected {
            errcode: reply.errcode,
            errmsg: reply.errmsg,
        }),
        _ => Ok(()),
    }
}

/// Posts summaries to a configured webhook URL.
///
/// Without a URL, `notify` logs a warning and does nothing.
pub struct WebhookNotifier {
    url: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig) -> Self {
        Self {
            url: config.webhook_url.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, summary: &str) -> Result<(), NotifyError> {
        let Some(url) = &self.url else {
            tracing::warn!("WECHAT_WEBHOOK_URL not set; skipping notification");
            return Ok(());
        };

        let resp = self
            .client
            .post(url)
            .json(&TextMessage::new(summary))
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        check_reply(&body)?;

        tracing::info!("Summary notification sent");
        Ok(())
    }
}
