use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogPhase {
    Start,
    Success,
    Error,
}

/// 一条执行日志。路由、执行器、通知分发共用同一结构，
/// 追加后不再修改，测试面板和历史记录直接渲染这串轨迹。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: i64,
    pub actor: String, // 数据源名 / Agent 名 / 通道名
    pub phase: LogPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl LogEntry {
    pub fn start(actor: impl Into<String>, message: impl Into<String>) -> Self {
        LogEntry {
            timestamp: Utc::now().timestamp(),
            actor: actor.into(),
            phase: LogPhase::Start,
            message: message.into(),
            duration_ms: None,
            count: None,
        }
    }

    pub fn success(
        actor: impl Into<String>,
        message: impl Into<String>,
        duration_ms: i64,
        count: usize,
    ) -> Self {
        LogEntry {
            timestamp: Utc::now().timestamp(),
            actor: actor.into(),
            phase: LogPhase::Success,
            message: message.into(),
            duration_ms: Some(duration_ms),
            count: Some(count),
        }
    }

    pub fn error(actor: impl Into<String>, message: impl Into<String>, duration_ms: i64) -> Self {
        LogEntry {
            timestamp: Utc::now().timestamp(),
            actor: actor.into(),
            phase: LogPhase::Error,
            message: message.into(),
            duration_ms: Some(duration_ms),
            count: None,
        }
    }
}

/// 按追加顺序收集日志的轨迹
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        RunLog::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: Vec<LogEntry>) {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_append_order() {
        let mut log = RunLog::new();
        log.push(LogEntry::start("腾讯行情", "开始获取"));
        log.push(LogEntry::success("腾讯行情", "获取成功", 120, 3));
        log.push(LogEntry::error("雪球资讯", "缺少 cookie", 5));

        let phases: Vec<LogPhase> = log.entries().iter().map(|e| e.phase).collect();
        assert_eq!(
            phases,
            vec![LogPhase::Start, LogPhase::Success, LogPhase::Error]
        );
        assert_eq!(log.entries()[1].count, Some(3));
    }

    #[test]
    fn serializes_with_snake_case_phase() {
        let entry = LogEntry::success("东方财富公告", "ok", 88, 12);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["phase"], "success");
        assert_eq!(value["count"], 12);
        assert_eq!(value["duration_ms"], 88);
    }
}
