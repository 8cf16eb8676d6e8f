use crate::notify::required_str;
use crate::notify::types::{AlertMessage, ChannelError};
use serde_json::Value;

#[derive(Debug)]
pub struct PushoverSender {
    client: reqwest::Client,
    token: String,
    user: String,
}

impl PushoverSender {
    pub fn from_config(client: reqwest::Client, config: &Value) -> Result<Self, ChannelError> {
        Ok(Self {
            client,
            token: required_str(config, "token")?,
            user: required_str(config, "user")?,
        })
    }

    pub async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post("https://api.pushover.net/1/messages.json")
            .form(&[
                ("token", self.token.as_str()),
                ("user", self.user.as_str()),
                ("title", message.title.as_str()),
                ("message", message.body.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        let v: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        if v.get("status").and_then(|s| s.as_i64()) != Some(1) {
            let errors = v
                .get("errors")
                .and_then(|e| e.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|x| x.as_str())
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "未知错误".to_string());
            return Err(ChannelError::Rejected(errors));
        }
        Ok(())
    }
}
