use crate::notify::required_str;
use crate::notify::types::{AlertMessage, ChannelError};
use serde_json::Value;

#[derive(Debug)]
pub struct PushplusSender {
    client: reqwest::Client,
    token: String,
}

impl PushplusSender {
    pub fn from_config(client: reqwest::Client, config: &Value) -> Result<Self, ChannelError> {
        Ok(Self {
            client,
            token: required_str(config, "token")?,
        })
    }

    pub async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "token": self.token,
            "title": message.title,
            "content": message.body,
            "template": "markdown",
        });
        let resp = self
            .client
            .post("https://www.pushplus.plus/send")
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
                v.get("msg")
                    .and_then(|m| m.as_str())
                    .unwrap_or("未知错误")
                    .to_string(),
            ));
        }
        Ok(())
    }
}
