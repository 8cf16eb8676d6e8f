use crate::runlog::RunLog;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RunErrorKind {
    Config,          // 配置错误（表达式/模型缺失），重试也没用
    DataUnavailable, // 必需数据拿不到，本次运行终止
    Analysis,        // AI 分析失败（瞬时类已在内部重试过）
    Internal,        // 本地程序/数据库异常
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub kind: RunErrorKind,
    pub message: String,
}

impl RunError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::Config,
            message: msg.into(),
        }
    }

    pub fn data_unavailable(msg: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::DataUnavailable,
            message: msg.into(),
        }
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::Analysis,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::Internal,
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            RunErrorKind::Config => "配置错误",
            RunErrorKind::DataUnavailable => "数据不可用",
            RunErrorKind::Analysis => "分析失败",
            RunErrorKind::Internal => "内部错误",
        };
        write!(f, "{}: {}", kind, self.message)
    }
}

impl From<sea_orm::DbErr> for RunError {
    fn from(e: sea_orm::DbErr) -> Self {
        RunError::internal(e.to_string())
    }
}

/// 固定操作分类。AI 原文落到这六类之一，分不出来就是 Watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Add,
    Reduce,
    Sell,
    Hold,
    Watch,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Add => "add",
            Action::Reduce => "reduce",
            Action::Sell => "sell",
            Action::Hold => "hold",
            Action::Watch => "watch",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Buy => "买入",
            Action::Add => "加仓",
            Action::Reduce => "减仓",
            Action::Sell => "卖出",
            Action::Hold => "持有",
            Action::Watch => "观望",
        }
    }
}

/// 单只标的的分类结论
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub symbol: String,
    pub name: String,
    pub action: Action,
    pub should_alert: bool,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Done,
    NoAlert,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Done => "done",
            RunStatus::NoAlert => "no_alert",
            RunStatus::Failed => "failed",
        }
    }
}

/// 一次执行的完整汇报。single 模式每只标的一份，batch 模式整体一份。
#[derive(Debug)]
pub struct RunReport {
    pub agent_name: String,
    pub instrument_symbol: Option<String>,
    pub status: RunStatus,
    pub verdicts: Vec<Verdict>,
    pub analysis: Option<String>,
    pub error: Option<RunError>,
    pub notified: bool,
    pub throttled: bool,
    pub duration_ms: i64,
    pub logs: RunLog,
}
