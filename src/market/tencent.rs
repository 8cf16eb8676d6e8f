use crate::market::types::{Candle, DataItem, KlineData, QuoteData, SourceError};
use serde_json::Value;

/// 腾讯行情接口。
///
/// 实时行情走 qt.gtimg.cn，一次请求可带多个代码，返回 GBK 文本；
/// 日 K 走 web.ifzq.gtimg.cn，一次只能查一个代码。
pub struct TencentSource {
    client: reqwest::Client,
}

impl TencentSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// 600519 -> sh600519，002594 -> sz002594，00700 -> hk00700，AAPL -> usAAPL
    fn prefixed(symbol: &str) -> String {
        if symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_digit()) {
            if symbol.starts_with('6') || symbol.starts_with('9') {
                format!("sh{}", symbol)
            } else {
                format!("sz{}", symbol)
            }
        } else if symbol.len() == 5 && symbol.chars().all(|c| c.is_ascii_digit()) {
            format!("hk{}", symbol)
        } else {
            format!("us{}", symbol.to_uppercase())
        }
    }

    pub async fn quotes(&self, symbols: &[String]) -> Result<Vec<DataItem>, SourceError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let codes: Vec<String> = symbols.iter().map(|s| Self::prefixed(s)).collect();
        let url = format!("https://qt.gtimg.cn/q={}", codes.join(","));

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SourceError::Http(format!("status {}", resp.status())));
        }
        // 返回体是 GBK，没有 charset 头，按 GBK 兜底解码
        let body = resp
            .text_with_charset("GBK")
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;

        let mut items = Vec::new();
        for (symbol, code) in symbols.iter().zip(codes.iter()) {
            let quote = parse_quote_line(&body, symbol, code)?;
            items.push(DataItem::Quote(quote));
        }
        Ok(items)
    }

    pub async fn kline(&self, symbols: &[String]) -> Result<Vec<DataItem>, SourceError> {
        let mut items = Vec::new();
        for symbol in symbols {
            let code = Self::prefixed(symbol);
            let url = format!(
                "https://web.ifzq.gtimg.cn/appstock/app/fqkline/get?param={},day,,,60,qfq",
                code
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

            items.push(DataItem::Kline(parse_kline(&body, symbol, &code)?));
        }
        Ok(items)
    }
}

fn parse_quote_line(body: &str, symbol: &str, code: &str) -> Result<QuoteData, SourceError> {
    // 每行形如 v_sh600519="1~贵州茅台~600519~1700.00~1690.00~1692.00~...";
    let marker = format!("v_{}=", code);
    let line = body
        .lines()
        .find(|l| l.contains(&marker))
        .ok_or_else(|| SourceError::InvalidResponse(format!("缺少 {} 的行情行", symbol)))?;
    let payload = line
        .split('"')
        .nth(1)
        .ok_or_else(|| SourceError::InvalidResponse(format!("{} 行情行格式异常", symbol)))?;
    let fields: Vec<&str> = payload.split('~').collect();
    if fields.len() < 35 {
        return Err(SourceError::InvalidResponse(format!(
            "{} 行情字段不足: {}",
            symbol,
            fields.len()
        )));
    }

    let num = |idx: usize| -> f64 { fields[idx].trim().parse().unwrap_or(0.0) };

    Ok(QuoteData {
        symbol: symbol.to_string(),
        name: fields[1].to_string(),
        price: num(3),
        prev_close: num(4),
        open: num(5),
        high: num(33),
        low: num(34),
        volume: num(6),
        change_pct: num(32),
    })
}

fn parse_kline(body: &Value, symbol: &str, code: &str) -> Result<KlineData, SourceError> {
    let node = body
        .get("data")
        .and_then(|d| d.get(code))
        .ok_or_else(|| SourceError::InvalidResponse(format!("缺少 {} 的K线数据", symbol)))?;
    // 前复权键是 qfqday，部分市场只有 day
    let rows = node
        .get("qfqday")
        .or_else(|| node.get("day"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| SourceError::InvalidResponse(format!("{} K线数组缺失", symbol)))?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let cols = match row.as_array() {
            Some(c) if c.len() >= 6 => c,
            _ => continue,
        };
        let field = |idx: usize| -> f64 {
            cols[idx]
                .as_str()
                .and_then(|s| s.parse().ok())
                .or_else(|| cols[idx].as_f64())
                .unwrap_or(0.0)
        };
        candles.push(Candle {
            date: cols[0].as_str().unwrap_or_default().to_string(),
            open: field(1),
            close: field(2),
            high: field(3),
            low: field(4),
            volume: field(5),
        });
    }
    if candles.is_empty() {
        return Err(SourceError::Unavailable(format!("{} 无K线数据", symbol)));
    }

    Ok(KlineData {
        symbol: symbol.to_string(),
        period: "day".to_string(),
        candles,
    })
}
