use crate::notify::required_str;
use crate::notify::types::{AlertMessage, ChannelError};
use serde_json::Value;

/// 企业微信群机器人
#[derive(Debug)]
pub struct WecomSender {
    client: reqwest::Client,
    webhook_url: String,
}

impl WecomSender {
    pub fn from_config(client: reqwest::Client, config: &Value) -> Result<Self, ChannelError> {
        Ok(Self {
            client,
            webhook_url: required_str(config, "webhook_url")?,
        })
    }

    pub async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "msgtype": "markdown",
            "markdown": {
                "content": format!("### {}\n{}", message.title, message.body),
            }
        });
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        let v: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        if v.get("errcode").and_then(|c| c.as_i64()) != Some(0) {
            return Err(ChannelError::Rejected(
                v.get("errmsg")
                    .and_then(|m| m.as_str())
                    .unwrap_or("未知错误")
                    .to_string(),
            ));
        }
        Ok(())
    }
}
