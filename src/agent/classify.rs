use crate::agent::model::{Action, Verdict};
use crate::storage::entity::instrument;
use regex::Regex;

const NO_ALERT_MARKER: &str = "[无需提醒]";

/// 单标的模式：整段回复只针对一只股票。
/// 第一行带 [无需提醒] 标记则不推送，建议词照常解析。
pub fn classify_single(text: &str, symbol: &str, name: &str) -> Verdict {
    let trimmed = text.trim();
    let muted = trimmed.starts_with(NO_ALERT_MARKER);

    let first_line = trimmed.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    // 约定建议写在第一行，第一行没认出来再扫全文
    let action = match_action(first_line).or_else(|| match_action(trimmed));

    Verdict {
        symbol: symbol.to_string(),
        name: name.to_string(),
        action: action.unwrap_or(Action::Watch),
        should_alert: !muted && action.is_some(),
        summary: summarize(first_line),
    }
}

/// 批量模式：AI 对每只股票单独成行，按代码或名称把行对回标的。
/// 没被提到的股票视为无事发生。
pub fn classify_batch(text: &str, instruments: &[instrument::Model]) -> Vec<Verdict> {
    instruments
        .iter()
        .map(|row| {
            let line = text
                .lines()
                .find(|l| l.contains(&row.symbol) || (!row.name.is_empty() && l.contains(&row.name)));
            match line {
                Some(line) => {
                    let muted = line.contains(NO_ALERT_MARKER);
                    let action = match_action(line);
                    Verdict {
                        symbol: row.symbol.clone(),
                        name: row.name.clone(),
                        action: action.unwrap_or(Action::Watch),
                        should_alert: !muted && action.is_some(),
                        summary: summarize(line),
                    }
                }
                None => Verdict {
                    symbol: row.symbol.clone(),
                    name: row.name.clone(),
                    action: Action::Watch,
                    should_alert: false,
                    summary: "未提及".to_string(),
                },
            }
        })
        .collect()
}

/// 取最早出现的建议词。中文词优先，英文建议词兜底。
fn match_action(text: &str) -> Option<Action> {
    const KEYWORDS: [(&str, Action); 7] = [
        ("清仓", Action::Sell),
        ("卖出", Action::Sell),
        ("减仓", Action::Reduce),
        ("建仓", Action::Buy),
        ("买入", Action::Buy),
        ("加仓", Action::Add),
        ("持有", Action::Hold),
    ];
    let mut earliest: Option<(usize, Action)> = None;
    for (word, action) in KEYWORDS {
        if let Some(idx) = text.find(word) {
            if earliest.map(|(best, _)| idx < best).unwrap_or(true) {
                earliest = Some((idx, action));
            }
        }
    }
    if text.contains("观望") {
        let idx = text.find("观望").unwrap_or(usize::MAX);
        if earliest.map(|(best, _)| idx < best).unwrap_or(true) {
            earliest = Some((idx, Action::Watch));
        }
    }
    if let Some((_, action)) = earliest {
        return Some(action);
    }

    let re = Regex::new(r"(?i)\b(sell|reduce|buy|add|hold|watch)\b").unwrap();
    re.find(text).map(|m| match m.as_str().to_lowercase().as_str() {
        "sell" => Action::Sell,
        "reduce" => Action::Reduce,
        "buy" => Action::Buy,
        "add" => Action::Add,
        "hold" => Action::Hold,
        _ => Action::Watch,
    })
}

fn summarize(line: &str) -> String {
    let cleaned = line
        .trim()
        .trim_start_matches(NO_ALERT_MARKER)
        .trim_start_matches(['-', '*', ' '])
        .trim();
    let mut out: String = cleaned.chars().take(120).collect();
    if cleaned.chars().count() > 120 {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock(id: i32, symbol: &str, name: &str) -> instrument::Model {
        instrument::Model {
            id,
            symbol: symbol.to_string(),
            name: name.to_string(),
            market: "CN".to_string(),
            enabled: true,
            cost_price: None,
            shares: None,
            created_at: 0,
        }
    }

    #[test]
    fn sell_advice_triggers_alert() {
        let verdict = classify_single(
            "卖出。跌破止损线，建议尽快离场。",
            "600519",
            "贵州茅台",
        );
        assert_eq!(verdict.action, Action::Sell);
        assert!(verdict.should_alert);
        assert!(verdict.summary.contains("跌破止损线"));
    }

    #[test]
    fn no_alert_marker_mutes_but_still_parses_action() {
        let verdict = classify_single(
            "[无需提醒] 持有观察即可，今日波动在正常范围内。",
            "600519",
            "贵州茅台",
        );
        assert_eq!(verdict.action, Action::Hold);
        assert!(!verdict.should_alert);
        assert!(!verdict.summary.starts_with("[无需提醒]"));
    }

    #[test]
    fn unrecognized_text_degrades_to_watch() {
        let verdict = classify_single("今天天气不错。", "600519", "贵州茅台");
        assert_eq!(verdict.action, Action::Watch);
        assert!(!verdict.should_alert);
    }

    #[test]
    fn liquidation_wording_counts_as_sell() {
        let verdict = classify_single("建议清仓，利空落地。", "600519", "贵州茅台");
        assert_eq!(verdict.action, Action::Sell);
        assert!(verdict.should_alert);
    }

    #[test]
    fn position_opening_wording_counts_as_buy() {
        let verdict = classify_single("可分批建仓。", "600519", "贵州茅台");
        assert_eq!(verdict.action, Action::Buy);
    }

    #[test]
    fn earliest_keyword_wins() {
        let verdict = classify_single("考虑卖出而不是加仓。", "600519", "贵州茅台");
        assert_eq!(verdict.action, Action::Sell);
    }

    #[test]
    fn english_advice_is_a_fallback() {
        let verdict = classify_single("Sell: breaking support.", "AAPL", "苹果");
        assert_eq!(verdict.action, Action::Sell);
        assert!(verdict.should_alert);
    }

    #[test]
    fn first_line_beats_later_mentions() {
        let verdict = classify_single(
            "持有。\n如果后市跌破 1600 再考虑卖出。",
            "600519",
            "贵州茅台",
        );
        assert_eq!(verdict.action, Action::Hold);
    }

    #[test]
    fn batch_lines_map_back_by_symbol_or_name() {
        let instruments = vec![
            stock(1, "600519", "贵州茅台"),
            stock(2, "601127", "赛力斯"),
            stock(3, "300750", "宁德时代"),
        ];
        let text = "600519 贵州茅台：持有，量能平稳。\n\
                    赛力斯：减仓，冲高回落放量明显。\n\
                    整体情绪偏谨慎。";
        let verdicts = classify_batch(text, &instruments);
        assert_eq!(verdicts.len(), 3);

        assert_eq!(verdicts[0].action, Action::Hold);
        assert!(verdicts[0].should_alert);

        assert_eq!(verdicts[1].action, Action::Reduce);
        assert!(verdicts[1].should_alert);

        assert_eq!(verdicts[2].action, Action::Watch);
        assert!(!verdicts[2].should_alert);
        assert_eq!(verdicts[2].summary, "未提及");
    }

    #[test]
    fn batch_line_with_marker_stays_quiet() {
        let instruments = vec![stock(1, "600519", "贵州茅台")];
        let text = "600519 贵州茅台：[无需提醒] 持有。";
        let verdicts = classify_batch(text, &instruments);
        assert_eq!(verdicts[0].action, Action::Hold);
        assert!(!verdicts[0].should_alert);
    }
}
