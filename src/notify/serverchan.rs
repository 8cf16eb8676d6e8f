use crate::notify::required_str;
use crate::notify::types::{AlertMessage, ChannelError};
use serde_json::Value;

/// Server 酱（方糖）
#[derive(Debug)]
pub struct ServerchanSender {
    client: reqwest::Client,
    send_key: String,
}

impl ServerchanSender {
    pub fn from_config(client: reqwest::Client, config: &Value) -> Result<Self, ChannelError> {
        Ok(Self {
            client,
            send_key: required_str(config, "send_key")?,
        })
    }

    pub async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        let url = format!("https://sctapi.ftqq.com/{}.send", self.send_key);
        let resp = self
            .client
            .post(&url)
            .form(&[("title", message.title.as_str()), ("desp", message.body.as_str())])
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        let v: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        if v.get("code").and_then(|c| c.as_i64()) != Some(0) {
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
