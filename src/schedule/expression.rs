use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Timelike};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("cron 表达式需要 5 个字段，实际 {0} 个")]
    FieldCount(usize),
    #[error("{field} 字段无法解析: {text}")]
    Malformed { field: &'static str, text: String },
    #[error("{field} 字段取值 {value} 超出范围 {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// 单个字段的归一化形式。列表/区间统一展开为有序集合，
/// 分钟字段的 `*/N` 保留为 Step，按 epoch 分钟取模判定。
#[derive(Debug, Clone, PartialEq, Eq)]
enum CronField {
    Any,
    Step(u32),
    List(BTreeSet<u32>),
}

impl CronField {
    fn contains(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::Step(_) => true, // Step 只出现在分钟字段，由 minute_matches 单独判定
            CronField::List(values) => values.contains(&value),
        }
    }
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    // 分钟字段的裸 */N 按绝对分钟线取模；其他字段展开为普通列表
    step_on_timeline: bool,
    // 星期字段 7 与 0 都是周日
    wraps_sunday: bool,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    step_on_timeline: true,
    wraps_sunday: false,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    step_on_timeline: false,
    wraps_sunday: false,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    step_on_timeline: false,
    wraps_sunday: false,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    step_on_timeline: false,
    wraps_sunday: false,
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 6,
    wraps_sunday: true,
    step_on_timeline: false,
};

/// 五字段 cron 表达式：分 时 日 月 星期。
///
/// 解析即归一化，因此相等比较可以直接用于判断配置是否真的变了。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

/// 绝对分钟刻度（epoch 秒整除 60），调度器用它去重同一分钟内的重复触发。
pub fn minute_slot(at: DateTime<Local>) -> i64 {
    at.timestamp().div_euclid(60)
}

impl Schedule {
    pub fn parse(text: &str) -> Result<Schedule, ScheduleError> {
        text.parse()
    }

    /// 时间点 at 是否命中表达式。各字段取交集；
    /// 分钟字段的 `*/N` 判定为「epoch 分钟数能被 N 整除」，跨小时边界节奏不变。
    pub fn matches(&self, at: DateTime<Local>) -> bool {
        self.minute_matches(at) && self.date_matches(at) && self.hour.contains(at.hour())
    }

    /// 判定某个 tick 是否应触发：命中表达式，且同一分钟内尚未触发过。
    pub fn is_due(&self, now: DateTime<Local>, last_fire: Option<DateTime<Local>>) -> bool {
        if !self.matches(now) {
            return false;
        }
        match last_fire {
            Some(last) => minute_slot(last) < minute_slot(now),
            None => true,
        }
    }

    /// now 之后（不含 now 所在分钟）的下一次触发时间。
    /// 一年内无命中返回 None（例如不存在的日期组合）。
    pub fn next_fire_after(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let start = minute_slot(now) + 1;
        // 最多向前扫描 366 天
        let end = start + 366 * 24 * 60;
        for slot in start..end {
            let at = Local.timestamp_opt(slot * 60, 0).single()?;
            if self.matches(at) {
                return Some(at);
            }
        }
        None
    }

    fn minute_matches(&self, at: DateTime<Local>) -> bool {
        match &self.minute {
            CronField::Step(n) => minute_slot(at).rem_euclid(i64::from(*n)) == 0,
            field => field.contains(at.minute()),
        }
    }

    fn date_matches(&self, at: DateTime<Local>) -> bool {
        self.day_of_month.contains(at.day())
            && self.month.contains(at.month())
            && self
                .day_of_week
                .contains(at.weekday().num_days_from_sunday())
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(ScheduleError::FieldCount(parts.len()));
        }
        Ok(Schedule {
            minute: parse_field(parts[0], &MINUTE)?,
            hour: parse_field(parts[1], &HOUR)?,
            day_of_month: parse_field(parts[2], &DAY_OF_MONTH)?,
            month: parse_field(parts[3], &MONTH)?,
            day_of_week: parse_field(parts[4], &DAY_OF_WEEK)?,
        })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |field: &CronField| -> String {
            match field {
                CronField::Any => "*".to_string(),
                CronField::Step(n) => format!("*/{}", n),
                CronField::List(values) => values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            }
        };
        write!(
            f,
            "{} {} {} {} {}",
            render(&self.minute),
            render(&self.hour),
            render(&self.day_of_month),
            render(&self.month),
            render(&self.day_of_week),
        )
    }
}

fn parse_field(text: &str, spec: &FieldSpec) -> Result<CronField, ScheduleError> {
    if text == "*" {
        return Ok(CronField::Any);
    }

    if let Some(step_text) = text.strip_prefix("*/") {
        // 步长不是字段取值，不做 min-max 校验；epoch 取模下 */90 也是合法节奏
        let n = parse_number(step_text, spec, text)?;
        if n == 0 {
            return Err(ScheduleError::Malformed {
                field: spec.name,
                text: text.to_string(),
            });
        }
        if spec.step_on_timeline {
            return Ok(CronField::Step(n));
        }
        // 其他字段的 */N 等价于 min-max/N
        return Ok(CronField::List(expand_range(spec.min, spec.max, n)));
    }

    let mut values = BTreeSet::new();
    for part in text.split(',') {
        let (range_text, step) = match part.split_once('/') {
            Some((range, step_text)) => {
                let n = parse_number(step_text, spec, part)?;
                if n == 0 {
                    return Err(ScheduleError::Malformed {
                        field: spec.name,
                        text: part.to_string(),
                    });
                }
                (range, n)
            }
            None => (part, 1),
        };

        match range_text.split_once('-') {
            Some((lo_text, hi_text)) => {
                let lo = parse_value(lo_text, spec)?;
                let hi = parse_value(hi_text, spec)?;
                if lo > hi {
                    return Err(ScheduleError::Malformed {
                        field: spec.name,
                        text: part.to_string(),
                    });
                }
                values.extend(expand_range(lo, hi, step));
            }
            None => {
                if step != 1 {
                    // 步长只对区间有意义，例如 9-18/2
                    return Err(ScheduleError::Malformed {
                        field: spec.name,
                        text: part.to_string(),
                    });
                }
                values.insert(parse_value(range_text, spec)?);
            }
        }
    }

    if values.is_empty() {
        return Err(ScheduleError::Malformed {
            field: spec.name,
            text: text.to_string(),
        });
    }
    Ok(CronField::List(values))
}

fn expand_range(lo: u32, hi: u32, step: u32) -> BTreeSet<u32> {
    (lo..=hi).step_by(step as usize).collect()
}

fn parse_number(text: &str, spec: &FieldSpec, part: &str) -> Result<u32, ScheduleError> {
    text.trim().parse::<u32>().map_err(|_| ScheduleError::Malformed {
        field: spec.name,
        text: part.to_string(),
    })
}

fn parse_value(text: &str, spec: &FieldSpec) -> Result<u32, ScheduleError> {
    let mut value = parse_number(text, spec, text)?;
    if spec.wraps_sunday && value == 7 {
        value = 0;
    }
    if value < spec.min || value > spec.max {
        return Err(ScheduleError::OutOfRange {
            field: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(value)
}
