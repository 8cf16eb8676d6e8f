use crate::market::types::{ChartData, DataItem, FlowData, NewsItem, SourceError};
use base64::Engine;
use serde_json::Value;

/// 东方财富接口：主力资金流、公司公告、K线图。
/// 三个能力共用 secid 换算（沪市 1.xxxxxx，深市 0.xxxxxx）。
pub struct EastmoneySource {
    client: reqwest::Client,
}

impl EastmoneySource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn secid(symbol: &str) -> Option<String> {
        if symbol.len() != 6 || !symbol.chars().all(|c| c.is_ascii_digit()) {
            // 资金流和公告接口只覆盖 A 股
            return None;
        }
        if symbol.starts_with('6') || symbol.starts_with('9') {
            Some(format!("1.{}", symbol))
        } else {
            Some(format!("0.{}", symbol))
        }
    }

    pub async fn capital_flow(&self, symbols: &[String]) -> Result<Vec<DataItem>, SourceError> {
        let mut items = Vec::new();
        for symbol in symbols {
            let secid = Self::secid(symbol)
                .ok_or_else(|| SourceError::Unavailable(format!("{} 不支持资金流查询", symbol)))?;
            let url = format!(
                "https://push2his.eastmoney.com/api/qt/stock/fflow/daykline/get\
                 ?lmt=5&klt=101&fields1=f1,f2,f3,f7\
                 &fields2=f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61&secid={}",
                secid
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

            items.push(DataItem::CapitalFlow(parse_flow(&body, symbol)?));
        }
        Ok(items)
    }

    /// 公司公告，接口本身支持一次查多只
    pub async fn announcements(&self, symbols: &[String]) -> Result<Vec<DataItem>, SourceError> {
        let codes: Vec<&str> = symbols
            .iter()
            .filter(|s| Self::secid(s).is_some())
            .map(|s| s.as_str())
            .collect();
        if codes.is_empty() {
            return Err(SourceError::Unavailable("没有可查公告的 A 股代码".to_string()));
        }
        let url = format!(
            "https://np-anotice-stock.eastmoney.com/api/security/ann\
             ?sr=-1&page_size=15&page_index=1&ann_type=A&stock_list={}",
            codes.join(",")
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

        Ok(parse_announcements(&body))
    }

    /// 日K静态图，返回 GIF 字节
    pub async fn chart(&self, symbols: &[String]) -> Result<Vec<DataItem>, SourceError> {
        let mut items = Vec::new();
        for symbol in symbols {
            let secid = Self::secid(symbol)
                .ok_or_else(|| SourceError::Unavailable(format!("{} 不支持K线图", symbol)))?;
            let url = format!(
                "https://webquotepic.eastmoney.com/GetPic.aspx?nid={}&imageType=k",
                secid
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
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| SourceError::Http(e.to_string()))?;
            if bytes.len() < 1024 {
                return Err(SourceError::InvalidResponse(format!(
                    "{} 图片过小（{} 字节），疑似错误页",
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

fn parse_flow(body: &Value, symbol: &str) -> Result<FlowData, SourceError> {
    let klines = body
        .get("data")
        .and_then(|d| d.get("klines"))
        .and_then(|k| k.as_array())
        .ok_or_else(|| SourceError::InvalidResponse(format!("{} 资金流数据缺失", symbol)))?;
    // 最后一行是最近交易日
    let latest = klines
        .last()
        .and_then(|v| v.as_str())
        .ok_or_else(|| SourceError::Unavailable(format!("{} 无资金流记录", symbol)))?;

    // f51 日期, f52 主力净流入, f53 小单, f54 中单, f55 大单, f56 超大单, f57 主力净占比
    let cols: Vec<&str> = latest.split(',').collect();
    if cols.len() < 7 {
        return Err(SourceError::InvalidResponse(format!(
            "{} 资金流字段不足: {}",
            symbol,
            cols.len()
        )));
    }
    let num = |idx: usize| -> f64 { cols[idx].trim().parse().unwrap_or(0.0) };

    Ok(FlowData {
        symbol: symbol.to_string(),
        date: cols[0].to_string(),
        main_net_inflow: num(1),
        main_net_ratio: num(6),
        super_large_net_inflow: num(5),
        large_net_inflow: num(4),
    })
}

fn parse_announcements(body: &Value) -> Vec<DataItem> {
    let list = body
        .get("data")
        .and_then(|d| d.get("list"))
        .and_then(|l| l.as_array());
    let mut items = Vec::new();
    for ann in list.into_iter().flatten() {
        let title = match ann.get("title").and_then(|t| t.as_str()) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => continue,
        };
        let symbol = ann
            .get("codes")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("stock_code"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string());
        let column = ann
            .get("columns")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("column_name"))
            .and_then(|c| c.as_str())
            .unwrap_or("公告");
        let date = ann
            .get("notice_date")
            .and_then(|d| d.as_str())
            .unwrap_or("")
            .to_string();
        let url = ann
            .get("art_code")
            .and_then(|c| c.as_str())
            .map(|code| format!("https://data.eastmoney.com/notices/detail/{}.html", code));
        items.push(DataItem::News(NewsItem {
            symbol,
            title,
            source: format!("东方财富公告/{}", column),
            published_at: date,
            url,
        }));
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secid_covers_a_share_only() {
        assert_eq!(EastmoneySource::secid("600519").as_deref(), Some("1.600519"));
        assert_eq!(EastmoneySource::secid("002594").as_deref(), Some("0.002594"));
        assert_eq!(EastmoneySource::secid("300750").as_deref(), Some("0.300750"));
        assert_eq!(EastmoneySource::secid("00700"), None);
        assert_eq!(EastmoneySource::secid("AAPL"), None);
    }

    #[test]
    fn flow_takes_latest_kline() {
        let body: Value = serde_json::from_str(
            r#"{"data":{"klines":[
                "2025-05-29,-1000.0,1.0,2.0,3.0,4.0,-0.5,0,0,0,0",
                "2025-05-30,250000000.0,1.0,2.0,80000000.0,170000000.0,3.21,0,0,0,0"
            ]}}"#,
        )
        .unwrap();
        let flow = parse_flow(&body, "600519").unwrap();
        assert_eq!(flow.date, "2025-05-30");
        assert!((flow.main_net_inflow - 250000000.0).abs() < 1e-6);
        assert!((flow.main_net_ratio - 3.21).abs() < 1e-9);
        assert!((flow.super_large_net_inflow - 170000000.0).abs() < 1e-6);
    }

    #[test]
    fn announcements_skip_untitled_rows() {
        let body: Value = serde_json::from_str(
            r#"{"data":{"list":[
                {"title":"关于回购股份的公告","notice_date":"2025-06-02 00:00:00",
                 "codes":[{"stock_code":"600519"}],
                 "columns":[{"column_name":"回购"}],"art_code":"AN123"},
                {"title":"","notice_date":"2025-06-02 00:00:00"}
            ]}}"#,
        )
        .unwrap();
        let items = parse_announcements(&body);
        assert_eq!(items.len(), 1);
        match &items[0] {
            DataItem::News(n) => {
                assert_eq!(n.symbol.as_deref(), Some("600519"));
                assert!(n.source.contains("回购"));
                assert!(n.url.as_deref().unwrap().contains("AN123"));
            }
            other => panic!("期望资讯条目，得到 {:?}", other),
        }
    }
}
