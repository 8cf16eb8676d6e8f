use crate::market::types::{ChartData, DataItem, SourceError};
use base64::Engine;

/// 新浪日K静态图。image.sinajs.cn 有防盗链，要带财经站 Referer
pub struct SinaSource {
    client: reqwest::Client,
}

impl SinaSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn chart_code(symbol: &str) -> Option<String> {
        if symbol.len() != 6 || !symbol.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if symbol.starts_with('6') || symbol.starts_with('9') {
            Some(format!("sh{}", symbol))
        } else {
            Some(format!("sz{}", symbol))
        }
    }

    pub async fn chart(&self, symbols: &[String]) -> Result<Vec<DataItem>, SourceError> {
        let mut items = Vec::new();
        for symbol in symbols {
            let code = Self::chart_code(symbol)
                .ok_or_else(|| SourceError::Unavailable(format!("{} 不支持K线图", symbol)))?;
            let url = format!("https://image.sinajs.cn/newchart/daily/n/{}.gif", code);
            let resp = self
                .client
                .get(&url)
                .header("Referer", "https://finance.sina.com.cn")
                .send()
                .await
                .map_err(|e| SourceError::Http(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(SourceError::Http(format!("status {}", resp.status())));
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| SourceError::Http(e.to_string()))?;
            if bytes.len() < 1024 {
                return Err(SourceError::InvalidResponse(format!(
                    "{} 图片过小（{} 字节），疑似防盗链拦截",
                    symbol,
                    bytes.len()
                )));
            }
            items.push(DataItem::Chart(ChartData {
                symbol: symbol.clone(),
                mime: "image/gif".to_string(),
                image_base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
            }));
        }
        Ok(items)
    }
}
