use crate::notify::required_str;
use crate::notify::types::{AlertMessage, ChannelError};
use serde_json::Value;

/// Discord Webhook。content 上限 2000 字符，超长截断
#[derive(Debug)]
pub struct DiscordSender {
    client: reqwest::Client,
    webhook_url: String,
}

impl DiscordSender {
    pub fn from_config(client: reqwest::Client, config: &Value) -> Result<Self, ChannelError> {
        Ok(Self {
            client,
            webhook_url: required_str(config, "webhook_url")?,
        })
    }

    pub async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        let content = truncate_chars(&format!("**{}**\n{}", message.title, message.body), 2000);
        let body = serde_json::json!({ "content": content });
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        // 成功是 204 No Content，失败才有 JSON 体
        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let detail = resp
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| {
                v.get("message")
                    .and_then(|m| m.as_str())
                    .map(|m| m.to_string())
            })
            .unwrap_or_else(|| format!("status {}", status));
        Err(ChannelError::Rejected(detail))
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
