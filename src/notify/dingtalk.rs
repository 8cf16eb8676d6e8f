use crate::notify::types::{AlertMessage, ChannelError};
use crate::notify::{optional_str, required_str};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

/// 钉钉群机器人。加签机器人配 secret，关键词机器人留空。
#[derive(Debug)]
pub struct DingtalkSender {
    client: reqwest::Client,
    webhook_url: String,
    secret: Option<String>,
}

impl DingtalkSender {
    pub fn from_config(client: reqwest::Client, config: &Value) -> Result<Self, ChannelError> {
        Ok(Self {
            client,
            webhook_url: required_str(config, "webhook_url")?,
            secret: optional_str(config, "secret"),
        })
    }

    pub async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        let url = match &self.secret {
            Some(secret) => {
                let ts = chrono::Utc::now().timestamp_millis();
                let sign = sign_request(ts, secret);
                format!("{}&timestamp={}&sign={}", self.webhook_url, ts, sign)
            }
            None => self.webhook_url.clone(),
        };
        let body = serde_json::json!({
            "msgtype": "markdown",
            "markdown": {
                "title": message.title,
                "text": format!("### {}\n\n{}", message.title, message.body),
            }
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

fn sign_request(timestamp_ms: i64, secret: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;

    let string_to_sign = format!("{}\n{}", timestamp_ms, secret);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    let digest = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    percent_encode(&digest)
}

/// base64 字母表里只有 + / = 三个字符需要转义
fn percent_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '+' => out.push_str("%2B"),
            '/' => out.push_str("%2F"),
            '=' => out.push_str("%3D"),
            _ => out.push(c),
        }
    }
    out
}
