use crate::analysis::types::{
    AnalysisError, AnalysisProvider, AnalysisRequest, AnalysisResponse,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

/// OpenAI 兼容接口（/chat/completions）。
/// DeepSeek、月之暗面、硅基流动、OpenRouter 这类服务都走这一个实现，
/// 区别只在 base_url 和 model 名。
#[derive(Clone, Debug)]
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatProvider {
    pub fn new(client: reqwest::Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl AnalysisProvider for OpenAiCompatProvider {
    async fn analyze(&self, req: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        if self.api_key.trim().is_empty() {
            return Err(AnalysisError::MissingKey);
        }
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        // 带图时 user content 是分片数组，纯文本时保持字符串，兼容旧网关
        let user_content: Value = if req.images.is_empty() {
            Value::String(req.user.clone())
        } else {
            let mut parts = vec![serde_json::json!({"type": "text", "text": req.user})];
            for img in &req.images {
                parts.push(serde_json::json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:{};base64,{}", img.mime, img.data_base64)}
                }));
            }
            Value::Array(parts)
        };

        let body = serde_json::json!({
            "model": req.model,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
            "messages": [
                {"role": "system", "content": req.system},
                {"role": "user", "content": user_content}
            ]
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout
                } else {
                    AnalysisError::Http(e.to_string())
                }
            })?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AnalysisError::Unauthorized)
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(AnalysisError::RateLimited),
            _ => {}
        }

        let status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|e| AnalysisError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(AnalysisError::Http(format!("{} {}", status.as_u16(), raw)));
        }

        let v: Value = serde_json::from_str(&raw).map_err(|e| {
            AnalysisError::InvalidResponse(format!("json parse failed: {e}, raw={raw}"))
        })?;

        let text = extract_chat_text(&v)
            .ok_or_else(|| AnalysisError::InvalidResponse(format!("missing content, raw={raw}")))?;

        Ok(AnalysisResponse {
            text,
            raw: Some(raw),
        })
    }
}

/// 兼容多种返回结构：message.content（字符串或数组）、content、text，以及顶层 output_text
fn extract_chat_text(v: &Value) -> Option<String> {
    let choice0 = v.get("choices").and_then(|c| c.get(0))?;

    let content = choice0
        .get("message")
        .and_then(|m| m.get("content"))
        .or_else(|| choice0.get("content"));

    if let Some(content) = content {
        match content {
            Value::String(s) => return Some(s.clone()),
            Value::Array(arr) => {
                let mut parts = Vec::new();
                for it in arr {
                    if let Some(t) = it.get("text").and_then(|x| x.as_str()) {
                        parts.push(t.to_string());
                    } else if let Some(t) = it.as_str() {
                        parts.push(t.to_string());
                    }
                }
                return Some(parts.join("\n"));
            }
            _ => {}
        }
    }
    if let Some(Value::String(s)) = choice0.get("text") {
        return Some(s.clone());
    }
    if let Some(Value::String(s)) = v.get("output_text") {
        return Some(s.clone());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_string_content() {
        let v: Value = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"持有，无需操作"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_chat_text(&v).as_deref(), Some("持有，无需操作"));
    }

    #[test]
    fn extracts_part_array_content() {
        let v: Value = serde_json::from_str(
            r#"{"choices":[{"message":{"content":[{"type":"text","text":"第一段"},{"type":"text","text":"第二段"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_chat_text(&v).as_deref(), Some("第一段\n第二段"));
    }

    #[test]
    fn missing_choices_yields_none() {
        let v: Value = serde_json::from_str(r#"{"error":{"message":"bad request"}}"#).unwrap();
        assert_eq!(extract_chat_text(&v), None);
    }

    #[tokio::test]
    async fn empty_key_fails_before_any_request() {
        let provider = OpenAiCompatProvider::new(
            reqwest::Client::new(),
            String::new(),
            "https://api.example.com/v1".to_string(),
        );
        let err = provider
            .analyze(AnalysisRequest::new("m", "s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MissingKey));
    }
}
