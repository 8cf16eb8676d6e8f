use serde::Serialize;
use std::fmt;

/// 行情数据能力类型，与数据源绑定表的 source_type 字段一一对应
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CapabilityType {
    Quote,
    Kline,
    CapitalFlow,
    News,
    Chart,
}

impl CapabilityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityType::Quote => "quote",
            CapabilityType::Kline => "kline",
            CapabilityType::CapitalFlow => "capital_flow",
            CapabilityType::News => "news",
            CapabilityType::Chart => "chart",
        }
    }

    pub fn parse(text: &str) -> Option<CapabilityType> {
        match text {
            "quote" => Some(CapabilityType::Quote),
            "kline" => Some(CapabilityType::Kline),
            "capital_flow" => Some(CapabilityType::CapitalFlow),
            "news" => Some(CapabilityType::News),
            "chart" => Some(CapabilityType::Chart),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CapabilityType::Quote => "行情",
            CapabilityType::Kline => "K线",
            CapabilityType::CapitalFlow => "资金流",
            CapabilityType::News => "资讯",
            CapabilityType::Chart => "K线图",
        }
    }
}

impl fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次取数请求。symbols 为交易代码原文（600519 / 00700 / AAPL），
/// 市场前缀由各提供方自行换算。
#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub symbols: Vec<String>,
}

impl FetchRequest {
    pub fn new(symbols: &[String]) -> Self {
        Self {
            symbols: symbols.to_vec(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct QuoteData {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub prev_close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// 成交量（手）
    pub volume: f64,
    pub change_pct: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Candle {
    pub date: String,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct KlineData {
    pub symbol: String,
    pub period: String,
    pub candles: Vec<Candle>,
}

/// 单日主力资金流向汇总，金额单位为元
#[derive(Clone, Debug, Serialize)]
pub struct FlowData {
    pub symbol: String,
    pub date: String,
    pub main_net_inflow: f64,
    pub main_net_ratio: f64,
    pub super_large_net_inflow: f64,
    pub large_net_inflow: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct NewsItem {
    pub symbol: Option<String>,
    pub title: String,
    pub source: String,
    pub published_at: String,
    pub url: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChartData {
    pub symbol: String,
    pub mime: String,
    /// 图片字节的 base64 编码，直接进多模态请求
    pub image_base64: String,
}

/// 各提供方返回的统一数据条目。资讯按条展开，行情类按标的展开，
/// 这样路由日志里的 count 对人是有意义的数字。
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataItem {
    Quote(QuoteData),
    Kline(KlineData),
    CapitalFlow(FlowData),
    News(NewsItem),
    Chart(ChartData),
}

impl DataItem {
    /// 条目归属的标的代码，资讯类可能没有
    pub fn symbol(&self) -> Option<&str> {
        match self {
            DataItem::Quote(q) => Some(&q.symbol),
            DataItem::Kline(k) => Some(&k.symbol),
            DataItem::CapitalFlow(f) => Some(&f.symbol),
            DataItem::News(n) => n.symbol.as_deref(),
            DataItem::Chart(c) => Some(&c.symbol),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("数据源不可用: {0}")]
    Unavailable(String),
    #[error("http 错误: {0}")]
    Http(String),
    #[error("响应解析失败: {0}")]
    InvalidResponse(String),
    #[error("未注册的提供方: {0}/{1}")]
    NotRegistered(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_roundtrip() {
        for cap in [
            CapabilityType::Quote,
            CapabilityType::Kline,
            CapabilityType::CapitalFlow,
            CapabilityType::News,
            CapabilityType::Chart,
        ] {
            assert_eq!(CapabilityType::parse(cap.as_str()), Some(cap));
        }
        assert_eq!(CapabilityType::parse("tick"), None);
    }

    #[test]
    fn item_symbol_extraction() {
        let item = DataItem::News(NewsItem {
            symbol: None,
            title: "市场快讯".to_string(),
            source: "测试".to_string(),
            published_at: "2025-06-02 09:30".to_string(),
            url: None,
        });
        assert_eq!(item.symbol(), None);

        let item = DataItem::Quote(QuoteData {
            symbol: "600519".to_string(),
            name: "贵州茅台".to_string(),
            price: 1700.0,
            prev_close: 1690.0,
            open: 1692.0,
            high: 1710.0,
            low: 1688.0,
            volume: 25000.0,
            change_pct: 0.59,
        });
        assert_eq!(item.symbol(), Some("600519"));
    }
}
