use crate::market::eastmoney::EastmoneySource;
use crate::market::eastmoney_news::EastmoneyNewsSource;
use crate::market::sina::SinaSource;
use crate::market::tencent::TencentSource;
use crate::market::types::{DataItem, FetchRequest, SourceError};
use crate::market::xueqiu::XueqiuSource;
use crate::storage::entity::data_source_binding;
use async_trait::async_trait;

/// 数据源调用入口。路由层只管顺序和降级，真正"哪个提供方怎么调"收敛在这里，
/// 测试里用 mock 实现替换。
#[async_trait]
pub trait SourceDispatch: Send + Sync {
    async fn call(
        &self,
        binding: &data_source_binding::Model,
        request: &FetchRequest,
    ) -> Result<Vec<DataItem>, SourceError>;
}

/// 内置提供方注册表，按绑定的 (source_type, provider) 二元组分发
pub struct StaticDispatch {
    tencent: TencentSource,
    eastmoney: EastmoneySource,
    eastmoney_news: EastmoneyNewsSource,
    xueqiu: XueqiuSource,
    sina: SinaSource,
}

impl StaticDispatch {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            tencent: TencentSource::new(client.clone()),
            eastmoney: EastmoneySource::new(client.clone()),
            eastmoney_news: EastmoneyNewsSource::new(client.clone()),
            xueqiu: XueqiuSource::new(client.clone()),
            sina: SinaSource::new(client),
        }
    }

    async fn call_one(
        &self,
        binding: &data_source_binding::Model,
        request: &FetchRequest,
    ) -> Result<Vec<DataItem>, SourceError> {
        let symbols = &request.symbols;
        match (binding.source_type.as_str(), binding.provider.as_str()) {
            ("quote", "tencent") => self.tencent.quotes(symbols).await,
            ("kline", "tencent") => self.tencent.kline(symbols).await,
            ("capital_flow", "eastmoney") => self.eastmoney.capital_flow(symbols).await,
            ("news", "eastmoney") => self.eastmoney.announcements(symbols).await,
            ("news", "eastmoney_news") => self.eastmoney_news.news(symbols).await,
            ("news", "xueqiu") => {
                self.xueqiu
                    .timeline(symbols, binding.config.as_deref())
                    .await
            }
            ("chart", "sina") => self.sina.chart(symbols).await,
            ("chart", "eastmoney") => self.eastmoney.chart(symbols).await,
            (source_type, provider) => Err(SourceError::NotRegistered(
                source_type.to_string(),
                provider.to_string(),
            )),
        }
    }
}

#[async_trait]
impl SourceDispatch for StaticDispatch {
    async fn call(
        &self,
        binding: &data_source_binding::Model,
        request: &FetchRequest,
    ) -> Result<Vec<DataItem>, SourceError> {
        // 不支持批量的绑定按标的逐个调用，任何一只失败整次尝试失败
        if !binding.supports_batch && request.symbols.len() > 1 {
            let mut items = Vec::new();
            for symbol in &request.symbols {
                let single = FetchRequest {
                    symbols: vec![symbol.clone()],
                };
                items.extend(self.call_one(binding, &single).await?);
            }
            return Ok(items);
        }
        self.call_one(binding, request).await
    }
}
