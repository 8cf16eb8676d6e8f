use crate::storage::entity::notify_channel;
use async_trait::async_trait;

/// 推送消息体。各通道自己决定 title 和 body 怎么拼进它的报文格式。
#[derive(Clone, Debug)]
pub struct AlertMessage {
    pub title: String,
    pub body: String,
}

impl AlertMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("通道配置缺失: {0}")]
    BadConfig(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("接口拒绝: {0}")]
    Rejected(String),
}

/// 通道发送入口。生产实现按 channel_type 分发到具体通道，
/// 调度器测试里用 mock 记录谁被发了、谁发失败。
#[async_trait]
pub trait SenderDispatch: Send + Sync {
    async fn send(
        &self,
        channel: &notify_channel::Model,
        message: &AlertMessage,
    ) -> Result<(), ChannelError>;
}
