use crate::market::types::{DataItem, NewsItem, SourceError};
use chrono::{Local, TimeZone};
use serde_json::Value;

/// 雪球自选股时间线。接口要求登录态 Cookie，从数据源绑定的 config 里取，
/// 没配 Cookie 时直接报不可用，让路由切到下一个资讯源。
pub struct XueqiuSource {
    client: reqwest::Client,
}

impl XueqiuSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn xq_symbol(symbol: &str) -> String {
        if symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_digit()) {
            if symbol.starts_with('6') || symbol.starts_with('9') {
                format!("SH{}", symbol)
            } else {
                format!("SZ{}", symbol)
            }
        } else {
            symbol.to_uppercase()
        }
    }

    pub async fn timeline(
        &self,
        symbols: &[String],
        config: Option<&str>,
    ) -> Result<Vec<DataItem>, SourceError> {
        let cookie = config
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .and_then(|v| v.get("cookie").and_then(|c| c.as_str()).map(|c| c.to_string()))
            .or_else(|| std::env::var("XUEQIU_COOKIE").ok())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| SourceError::Unavailable("缺少 cookie".to_string()))?;

        let mut items = Vec::new();
        for symbol in symbols {
            let url = format!(
                "https://xueqiu.com/statuses/stock_timeline.json\
                 ?symbol_id={}&count=10&source=%E8%87%AA%E9%80%89%E8%82%A1%E6%96%B0%E9%97%BB&page=1",
                Self::xq_symbol(symbol)
            );
            let resp = self
                .client
                .get(&url)
                .header("Cookie", &cookie)
                .header(
                    "User-Agent",
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
                )
                .send()
                .await
                .map_err(|e| SourceError::Http(e.to_string()))?;
            if resp.status().as_u16() == 400 || resp.status().as_u16() == 401 {
                return Err(SourceError::Unavailable("cookie 已失效".to_string()));
            }
            if !resp.status().is_success() {
                return Err(SourceError::Http(format!("status {}", resp.status())));
            }
            let body: Value = resp
                .json()
                .await
                .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

            items.extend(parse_timeline(&body, symbol));
        }
        Ok(items)
    }
}

fn parse_timeline(body: &Value, symbol: &str) -> Vec<DataItem> {
    let list = body.get("list").and_then(|l| l.as_array());
    let mut items = Vec::new();
    for status in list.into_iter().flatten() {
        // 时间线里标题常为空，退化到正文摘要
        let title = status
            .get("title")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .or_else(|| {
                status
                    .get("description")
                    .or_else(|| status.get("text"))
                    .and_then(|t| t.as_str())
                    .map(|t| truncate_chars(&strip_tags(t), 80))
            });
        let title = match title {
            Some(t) if !t.is_empty() => t,
            _ => continue,
        };
        let published_at = status
            .get("created_at")
            .and_then(|t| t.as_i64())
            .and_then(|ms| Local.timestamp_millis_opt(ms).single())
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        items.push(DataItem::News(NewsItem {
            symbol: Some(symbol.to_string()),
            title,
            source: "雪球".to_string(),
            published_at,
            url: status
                .get("target")
                .and_then(|t| t.as_str())
                .map(|t| format!("https://xueqiu.com{}", t)),
        }));
    }
    items
}

fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_gets_exchange_prefix() {
        assert_eq!(XueqiuSource::xq_symbol("600519"), "SH600519");
        assert_eq!(XueqiuSource::xq_symbol("300750"), "SZ300750");
        assert_eq!(XueqiuSource::xq_symbol("00700"), "00700");
        assert_eq!(XueqiuSource::xq_symbol("aapl"), "AAPL");
    }

    #[test]
    fn timeline_falls_back_to_description() {
        let body: Value = serde_json::from_str(
            r#"{"list":[
                {"title":"茅台召开股东大会","created_at":1748822400000,"target":"/1234/5678"},
                {"title":"","description":"盘面<b>快讯</b>：白酒板块走强，机构席位出现净买入","created_at":1748822460000}
            ]}"#,
        )
        .unwrap();
        let items = parse_timeline(&body, "600519");
        assert_eq!(items.len(), 2);
        match &items[1] {
            DataItem::News(n) => {
                assert!(n.title.starts_with("盘面快讯"));
                assert!(!n.title.contains('<'));
            }
            other => panic!("期望资讯条目，得到 {:?}", other),
        }
    }

    #[test]
    fn strip_tags_and_truncate() {
        assert_eq!(strip_tags("<p>a<br/>b</p>"), "ab");
        assert_eq!(truncate_chars("一二三四五", 3), "一二三");
    }
}
