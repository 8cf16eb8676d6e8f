use async_trait::async_trait;

/// 多模态图片分片，走 base64 内联
#[derive(Clone, Debug)]
pub struct ImagePart {
    pub mime: String,
    pub data_base64: String,
}

#[derive(Clone, Debug)]
pub struct AnalysisRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub images: Vec<ImagePart>,
}

impl AnalysisRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            user: user.into(),
            temperature: 0.3,
            max_tokens: 4096,
            images: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnalysisResponse {
    pub text: String,
    pub raw: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("模型未配置 api key")]
    MissingKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited,
    #[error("请求超时")]
    Timeout,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("未知的模型提供方: {0}")]
    UnknownProvider(String),
}

impl AnalysisError {
    /// 网络类瞬时错误可以重试，配置和校验类错误重试也没用
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnalysisError::Http(_) | AnalysisError::RateLimited | AnalysisError::Timeout
        )
    }
}

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, req: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(AnalysisError::Http("conn reset".to_string()).is_transient());
        assert!(AnalysisError::RateLimited.is_transient());
        assert!(AnalysisError::Timeout.is_transient());
        assert!(!AnalysisError::Unauthorized.is_transient());
        assert!(!AnalysisError::MissingKey.is_transient());
        assert!(!AnalysisError::InvalidResponse("bad".to_string()).is_transient());
        assert!(!AnalysisError::UnknownProvider("foo".to_string()).is_transient());
    }
}
