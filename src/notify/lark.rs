use crate::notify::types::{AlertMessage, ChannelError};
use crate::notify::{optional_str, required_str};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

/// 飞书自定义机器人。签名算法与钉钉不同：
/// "{timestamp}\n{secret}" 作为 HMAC 密钥，对空串取摘要。
#[derive(Debug)]
pub struct LarkSender {
    client: reqwest::Client,
    webhook_url: String,
    secret: Option<String>,
}

impl LarkSender {
    pub fn from_config(client: reqwest::Client, config: &Value) -> Result<Self, ChannelError> {
        Ok(Self {
            client,
            webhook_url: required_str(config, "webhook_url")?,
            secret: optional_str(config, "secret"),
        })
    }

    pub async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "msg_type": "text",
            "content": {
                "text": format!("{}\n{}", message.title, message.body),
            }
        });
        if let Some(secret) = &self.secret {
            let ts = chrono::Utc::now().timestamp();
            body["timestamp"] = Value::String(ts.to_string());
            body["sign"] = Value::String(sign_request(ts, secret));
        }
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
        // 新版返回 code，旧版返回 StatusCode
        let code = v
            .get("code")
            .or_else(|| v.get("StatusCode"))
            .and_then(|c| c.as_i64());
        if code != Some(0) {
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

fn sign_request(timestamp_secs: i64, secret: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;

    let key = format!("{}\n{}", timestamp_secs, secret);
    let mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_depends_on_timestamp_and_secret() {
        let a = sign_request(1717300000, "sec-a");
        let b = sign_request(1717300000, "sec-a");
        let c = sign_request(1717300001, "sec-a");
        let d = sign_request(1717300000, "sec-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
