use crate::analysis::gemini::GeminiProvider;
use crate::analysis::openai_compat::OpenAiCompatProvider;
use crate::analysis::types::{
    AnalysisError, AnalysisProvider, AnalysisRequest, AnalysisResponse,
};
use crate::storage::entity::ai_model;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum InnerProvider {
    OpenAiCompat(OpenAiCompatProvider),
    Gemini(GeminiProvider),
}

/// 按模型行的 provider 字段选实现的统一出口
#[derive(Clone, Debug)]
pub struct AnyProvider {
    inner: InnerProvider,
}

impl AnyProvider {
    pub const KNOWN_PROVIDERS: [&'static str; 2] = ["openai_compat", "gemini"];

    pub fn from_model(
        model: &ai_model::Model,
        client: reqwest::Client,
    ) -> Result<Self, AnalysisError> {
        match model.provider.as_str() {
            "openai_compat" => {
                let base_url = model
                    .base_url
                    .clone()
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| {
                        AnalysisError::InvalidResponse(format!(
                            "模型 {} 缺少 base_url",
                            model.name
                        ))
                    })?;
                Ok(Self {
                    inner: InnerProvider::OpenAiCompat(OpenAiCompatProvider::new(
                        client,
                        model.api_key.clone(),
                        base_url,
                    )),
                })
            }
            "gemini" => Ok(Self {
                inner: InnerProvider::Gemini(GeminiProvider::new(
                    client,
                    model.api_key.clone(),
                    model.base_url.clone(),
                )),
            }),
            other => Err(AnalysisError::UnknownProvider(other.to_string())),
        }
    }
}

#[async_trait]
impl AnalysisProvider for AnyProvider {
    async fn analyze(&self, req: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        match &self.inner {
            InnerProvider::OpenAiCompat(p) => p.analyze(req).await,
            InnerProvider::Gemini(p) => p.analyze(req).await,
        }
    }
}

/// 模型行到 provider 实例的构造缝，执行器测试用 mock 工厂替换
pub trait ProviderFactory: Send + Sync {
    fn build(&self, model: &ai_model::Model) -> Result<Arc<dyn AnalysisProvider>, AnalysisError>;
}

pub struct HttpProviderFactory {
    client: reqwest::Client,
}

impl HttpProviderFactory {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn build(&self, model: &ai_model::Model) -> Result<Arc<dyn AnalysisProvider>, AnalysisError> {
        Ok(Arc::new(AnyProvider::from_model(
            model,
            self.client.clone(),
        )?))
    }
}
