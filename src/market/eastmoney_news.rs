use crate::market::types::{DataItem, NewsItem, SourceError};
use serde_json::Value;

/// 东方财富个股资讯列表，一次只能查一个代码
pub struct EastmoneyNewsSource {
    client: reqwest::Client,
}

impl EastmoneyNewsSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn market_code(symbol: &str) -> Option<&'static str> {
        if symbol.len() != 6 || !symbol.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if symbol.starts_with('6') || symbol.starts_with('9') {
            Some("1")
        } else {
            Some("0")
        }
    }

    pub async fn news(&self, symbols: &[String]) -> Result<Vec<DataItem>, SourceError> {
        let mut items = Vec::new();
        for symbol in symbols {
            let market = Self::market_code(symbol)
                .ok_or_else(|| SourceError::Unavailable(format!("{} 不支持个股资讯", symbol)))?;
            let url = format!(
                "https://np-listapi.eastmoney.com/comm/web/getListInfo\
                 ?cfh=1&client=web&mTypeAndCode={}.{}&type=1&pageSize=10",
                market, symbol
            );
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| SourceError::Http(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(SourceError::Http(format!("status {}", resp.status())));
            }
            let body: Value = resp
                .json()
                .await
                .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

            items.extend(parse_news(&body, symbol));
        }
        Ok(items)
    }
}

fn parse_news(body: &Value, symbol: &str) -> Vec<DataItem> {
    let list = body
        .get("data")
        .and_then(|d| d.get("list"))
        .and_then(|l| l.as_array());
    let mut items = Vec::new();
    for article in list.into_iter().flatten() {
        let title = match article.get("Art_Title").and_then(|t| t.as_str()) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => continue,
        };
        items.push(DataItem::News(NewsItem {
            symbol: Some(symbol.to_string()),
            title,
            source: article
                .get("Art_Media_Name")
                .and_then(|m| m.as_str())
                .filter(|m| !m.is_empty())
                .unwrap_or("东方财富资讯")
                .to_string(),
            published_at: article
                .get("Art_ShowTime")
                .or_else(|| article.get("Art_CreateTime"))
                .and_then(|t| t.as_str())
                .unwrap_or("")
                .to_string(),
            url: article
                .get("Art_Url")
                .and_then(|u| u.as_str())
                .map(|u| u.to_string()),
        }));
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn news_rows_carry_symbol_and_source() {
        let body: Value = serde_json::from_str(
            r#"{"data":{"list":[
                {"Art_Title":"比亚迪发布新车型","Art_Media_Name":"证券时报",
                 "Art_ShowTime":"2025-06-02 08:30:00","Art_Url":"https://example.com/a"},
                {"Art_Title":"产销快报出炉","Art_CreateTime":"2025-06-01 20:00:00"}
            ]}}"#,
        )
        .unwrap();
        let items = parse_news(&body, "002594");
        assert_eq!(items.len(), 2);
        match &items[0] {
            DataItem::News(n) => {
                assert_eq!(n.symbol.as_deref(), Some("002594"));
                assert_eq!(n.source, "证券时报");
            }
            other => panic!("期望资讯条目，得到 {:?}", other),
        }
        match &items[1] {
            DataItem::News(n) => {
                assert_eq!(n.source, "东方财富资讯");
                assert_eq!(n.published_at, "2025-06-01 20:00:00");
            }
            other => panic!("期望资讯条目，得到 {:?}", other),
        }
    }
}
