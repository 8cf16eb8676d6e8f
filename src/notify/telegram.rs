use crate::notify::required_str;
use crate::notify::types::{AlertMessage, ChannelError};
use serde_json::Value;

#[derive(Debug)]
pub struct TelegramSender {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramSender {
    pub fn from_config(client: reqwest::Client, config: &Value) -> Result<Self, ChannelError> {
        Ok(Self {
            client,
            bot_token: required_str(config, "bot_token")?,
            chat_id: required_str(config, "chat_id")?,
        })
    }

    pub async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": format!("{}\n\n{}", message.title, message.body),
        });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        // 失败时也返回 JSON（ok=false + description），统一走 JSON 判定
        let v: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        if v.get("ok").and_then(|o| o.as_bool()) != Some(true) {
            return Err(ChannelError::Rejected(
                v.get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or("未知错误")
                    .to_string(),
            ));
        }
        Ok(())
    }
}
