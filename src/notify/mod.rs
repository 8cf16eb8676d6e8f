pub mod bark;
pub mod dingtalk;
pub mod discord;
pub mod dispatch;
pub mod dispatcher;
pub mod lark;
pub mod pushover;
pub mod pushplus;
pub mod serverchan;
pub mod telegram;
pub mod throttle;
pub mod types;
pub mod wecom;

pub use dispatch::{AnyChannel, HttpSenderDispatch};
pub use dispatcher::{ChannelOutcome, DispatchOutcome, NotificationDispatcher};
pub use throttle::{GateDecision, ThrottleGate, BATCH_DIGEST_KEY, MIN_NOTIFY_INTERVAL};
pub use types::{AlertMessage, ChannelError, SenderDispatch};

use serde_json::Value;

pub(crate) fn required_str(config: &Value, key: &str) -> Result<String, ChannelError> {
    config
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ChannelError::BadConfig(format!("缺少 {}", key)))
}

pub(crate) fn optional_str(config: &Value, key: &str) -> Option<String> {
    config
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
