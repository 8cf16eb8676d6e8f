use crate::notify::types::{AlertMessage, ChannelError};
use crate::notify::{optional_str, required_str};
use serde_json::Value;

const DEFAULT_SERVER: &str = "https://api.day.app";

#[derive(Debug)]
pub struct BarkSender {
    client: reqwest::Client,
    device_key: String,
    server: String,
}

impl BarkSender {
    pub fn from_config(client: reqwest::Client, config: &Value) -> Result<Self, ChannelError> {
        Ok(Self {
            client,
            device_key: required_str(config, "device_key")?,
            server: optional_str(config, "server").unwrap_or_else(|| DEFAULT_SERVER.to_string()),
        })
    }

    pub async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        let url = format!("{}/push", self.server.trim_end_matches('/'));
        let body = serde_json::json!({
            "title": message.title,
            "body": message.body,
            "device_key": self.device_key,
            "group": "盘中助手",
        });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        let v: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        if v.get("code").and_then(|c| c.as_i64()) != Some(200) {
            return Err(ChannelError::Rejected(
                v.get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("未知错误")
                    .to_string(),
            ));
        }
        Ok(())
    }
}
