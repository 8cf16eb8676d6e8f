use crate::analysis::types::{
    AnalysisError, AnalysisProvider, AnalysisRequest, AnalysisResponse,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini（generateContent 接口），图片走 inline_data
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl AnalysisProvider for GeminiProvider {
    async fn analyze(&self, req: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        if self.api_key.trim().is_empty() {
            return Err(AnalysisError::MissingKey);
        }
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            req.model,
            self.api_key
        );

        let mut parts = vec![serde_json::json!({"text": req.user})];
        for img in &req.images {
            parts.push(serde_json::json!({
                "inline_data": {"mime_type": img.mime, "data": img.data_base64}
            }));
        }

        let body = serde_json::json!({
            "system_instruction": {"parts": [{"text": req.system}]},
            "contents": [{"role": "user", "parts": parts}],
            "generationConfig": {
                "temperature": req.temperature,
                "maxOutputTokens": req.max_tokens
            }
        });

        let resp = self
            .client
            .post(&url)
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

        let text = extract_candidate_text(&v).ok_or_else(|| {
            AnalysisError::InvalidResponse(format!("missing candidates, raw={raw}"))
        })?;

        Ok(AnalysisResponse {
            text,
            raw: Some(raw),
        })
    }
}

fn extract_candidate_text(v: &Value) -> Option<String> {
    let parts = v
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())?;

    let texts: Vec<String> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .map(|t| t.to_string())
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}
