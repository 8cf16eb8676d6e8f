use crate::analysis::ImagePart;
use crate::market::types::{CapabilityType, DataItem, QuoteData};
use crate::storage::entity::instrument;
use chrono::{DateTime, Local};
use serde_json::Value;

/// Agent 的取数计划。required 拿不到整次运行失败，
/// optional 拿不到降级继续。
pub struct DataPlan {
    pub required: Vec<CapabilityType>,
    pub optional: Vec<CapabilityType>,
}

pub fn capability_plan(agent_name: &str) -> DataPlan {
    match agent_name {
        "daily_report" => DataPlan {
            required: vec![CapabilityType::Quote, CapabilityType::Kline],
            optional: vec![CapabilityType::News],
        },
        "intraday_monitor" => DataPlan {
            required: vec![CapabilityType::Quote],
            optional: vec![CapabilityType::CapitalFlow],
        },
        "news_digest" => DataPlan {
            required: vec![CapabilityType::News],
            optional: vec![],
        },
        "premarket_outlook" => DataPlan {
            required: vec![CapabilityType::Quote],
            optional: vec![CapabilityType::News],
        },
        "chart_analyst" => DataPlan {
            required: vec![CapabilityType::Quote],
            optional: vec![CapabilityType::Chart],
        },
        // 未知 Agent 至少要有行情
        _ => DataPlan {
            required: vec![CapabilityType::Quote],
            optional: vec![],
        },
    }
}

const SINGLE_OUTPUT_CONTRACT: &str = "输出约定：若无需提醒用户，第一行只输出 [无需提醒]，后面可附一句观察；\
若需要提醒，第一行给出操作建议（买入/加仓/减仓/卖出/持有/观望之一），随后简述理由，全文控制在 150 字以内。";

const BATCH_OUTPUT_CONTRACT: &str = "输出约定：对每只股票单独成行，格式「代码 名称：建议 + 一句话理由」，\
建议从 买入/加仓/减仓/卖出/持有/观望 中选择；某只股票无值得关注的变化时在该行写 [无需提醒]。最后可加一段整体观察。";

pub fn system_prompt(agent_name: &str) -> String {
    let role = match agent_name {
        "daily_report" => "你是一名专业的投资复盘助理，负责收盘后的每日总结。结合行情、K线形态与当日资讯，评估每只自选股的走势与风险。",
        "intraday_monitor" => "你是盘中异动监控助手。根据实时行情、持仓情况与提醒规则，判断当前是否有值得立刻提醒用户的信号，宁缺毋滥。",
        "news_digest" => "你是财经资讯梳理助手。从给出的资讯与公告中筛选对持仓真正有影响的内容，忽略噪音。",
        "premarket_outlook" => "你是盘前展望助理。结合昨日收盘情况与最新消息，给出今日开盘前的关注要点。",
        "chart_analyst" => "你是技术面分析师。结合K线图与行情数据，从形态、量价关系角度给出判断。",
        _ => "你是投资分析助手。",
    };
    let contract = match agent_name {
        "intraday_monitor" | "chart_analyst" => SINGLE_OUTPUT_CONTRACT,
        _ => BATCH_OUTPUT_CONTRACT,
    };
    format!("{}\n\n{}", role, contract)
}

pub struct PromptInput<'a> {
    pub instruments: &'a [instrument::Model],
    pub items: &'a [DataItem],
    pub agent_config: &'a Value,
    pub now: DateTime<Local>,
}

/// 把取到的数据拼成用户侧 prompt。图表类条目不进文本，转成多模态图片分片。
pub fn build_user_prompt(agent_name: &str, input: &PromptInput) -> (String, Vec<ImagePart>) {
    let mut lines: Vec<String> = Vec::new();
    let mut images: Vec<ImagePart> = Vec::new();

    lines.push(format!("## 时间：{}", input.now.format("%Y-%m-%d %H:%M")));

    let quotes: Vec<&QuoteData> = input
        .items
        .iter()
        .filter_map(|item| match item {
            DataItem::Quote(q) => Some(q),
            _ => None,
        })
        .collect();

    if !quotes.is_empty() {
        lines.push("\n## 股票行情".to_string());
        for quote in &quotes {
            lines.push(format!("\n### {}（{}）", quote.name, quote.symbol));
            lines.push(format!("- 现价：{:.2}", quote.price));
            lines.push(format!("- 涨跌幅：{:+.2}%", quote.change_pct));
            lines.push(format!("- 今开：{:.2}", quote.open));
            lines.push(format!("- 最高：{:.2}", quote.high));
            lines.push(format!("- 最低：{:.2}", quote.low));
            lines.push(format!("- 昨收：{:.2}", quote.prev_close));
            if quote.volume > 0.0 {
                lines.push(format!("- 成交量：{:.0} 手", quote.volume));
            }
            if let Some(position) = position_line(input.instruments, quote) {
                lines.push(position);
            }
        }
    }

    let mut kline_lines: Vec<String> = Vec::new();
    for item in input.items {
        if let DataItem::Kline(k) = item {
            kline_lines.push(format!("\n### {} 近{}日K线", k.symbol, k.candles.len().min(10)));
            for candle in k.candles.iter().rev().take(10).rev() {
                kline_lines.push(format!(
                    "{}: 开{:.2} 收{:.2} 高{:.2} 低{:.2} 量{:.0}",
                    candle.date, candle.open, candle.close, candle.high, candle.low, candle.volume
                ));
            }
        }
    }
    if !kline_lines.is_empty() {
        lines.push("\n## K线数据".to_string());
        lines.extend(kline_lines);
    }

    let mut flow_lines: Vec<String> = Vec::new();
    for item in input.items {
        if let DataItem::CapitalFlow(flow) = item {
            flow_lines.push(format!(
                "- {}：主力净流入 {:+.2} 亿（占比 {:+.2}%），超大单 {:+.2} 亿（{}）",
                flow.symbol,
                flow.main_net_inflow / 1e8,
                flow.main_net_ratio,
                flow.super_large_net_inflow / 1e8,
                flow.date
            ));
        }
    }
    if !flow_lines.is_empty() {
        lines.push("\n## 资金流向".to_string());
        lines.extend(flow_lines);
    }

    let mut news_count = 0;
    let mut news_lines: Vec<String> = Vec::new();
    for item in input.items {
        if let DataItem::News(news) = item {
            if news_count >= 15 {
                break;
            }
            news_count += 1;
            let owner = news
                .symbol
                .as_deref()
                .map(|s| format!("[{}] ", s))
                .unwrap_or_default();
            news_lines.push(format!(
                "{}. {}{}（{}，{}）",
                news_count, owner, news.title, news.source, news.published_at
            ));
        }
    }
    if !news_lines.is_empty() {
        lines.push("\n## 最新资讯".to_string());
        lines.extend(news_lines);
    }

    for item in input.items {
        if let DataItem::Chart(chart) = item {
            images.push(ImagePart {
                mime: chart.mime.clone(),
                data_base64: chart.image_base64.clone(),
            });
            lines.push(format!("\n（附 {} 的日K线图，见图片）", chart.symbol));
        }
    }

    if agent_name == "intraday_monitor" {
        if let Some(rules) = alert_rules(input.agent_config) {
            lines.push(rules);
        }
    }

    lines.push("\n请根据以上信息给出你的判断。".to_string());
    (lines.join("\n"), images)
}

/// 有持仓补盈亏上下文，没持仓明确说明只是关注
fn position_line(instruments: &[instrument::Model], quote: &QuoteData) -> Option<String> {
    let row = instruments.iter().find(|i| i.symbol == quote.symbol)?;
    match (row.cost_price, row.shares) {
        (Some(cost), shares) if cost > 0.0 => {
            let pnl_pct = (quote.price - cost) / cost * 100.0;
            let shares_part = shares
                .filter(|s| *s > 0.0)
                .map(|s| format!(" × {:.0} 股", s))
                .unwrap_or_default();
            Some(format!(
                "- 持仓：成本 {:.2}{}，浮动盈亏 {:+.1}%",
                cost, shares_part, pnl_pct
            ))
        }
        _ => Some("- 未持仓（仅关注）".to_string()),
    }
}

fn alert_rules(config: &Value) -> Option<String> {
    let mut rules: Vec<String> = Vec::new();
    if let Some(v) = config.get("price_alert_threshold").and_then(|v| v.as_f64()) {
        rules.push(format!("- 涨跌幅超过 ±{:.1}% 视为异动", v));
    }
    if let Some(v) = config.get("volume_alert_ratio").and_then(|v| v.as_f64()) {
        rules.push(format!("- 量比超过 {:.1} 视为放量", v));
    }
    if let Some(v) = config.get("stop_loss_warning").and_then(|v| v.as_f64()) {
        rules.push(format!("- 浮亏超过 {:.1}% 提示止损", v));
    }
    if let Some(v) = config.get("take_profit_warning").and_then(|v| v.as_f64()) {
        rules.push(format!("- 浮盈超过 {:.1}% 提示止盈", v));
    }
    if rules.is_empty() {
        None
    } else {
        Some(format!("\n## 提醒规则\n{}", rules.join("\n")))
    }
}
