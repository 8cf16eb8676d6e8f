use crate::notify::bark::BarkSender;
use crate::notify::dingtalk::DingtalkSender;
use crate::notify::discord::DiscordSender;
use crate::notify::lark::LarkSender;
use crate::notify::pushover::PushoverSender;
use crate::notify::pushplus::PushplusSender;
use crate::notify::serverchan::ServerchanSender;
use crate::notify::telegram::TelegramSender;
use crate::notify::types::{AlertMessage, ChannelError, SenderDispatch};
use crate::notify::wecom::WecomSender;
use crate::storage::entity::notify_channel;
use async_trait::async_trait;
use serde_json::Value;

/// 按通道行的 channel_type 字段选实现的统一出口
#[derive(Debug)]
pub enum AnyChannel {
    Telegram(TelegramSender),
    Bark(BarkSender),
    Dingtalk(DingtalkSender),
    Wecom(WecomSender),
    Lark(LarkSender),
    Serverchan(ServerchanSender),
    Pushplus(PushplusSender),
    Discord(DiscordSender),
    Pushover(PushoverSender),
}

impl AnyChannel {
    pub const KNOWN_TYPES: [&'static str; 9] = [
        "telegram",
        "bark",
        "dingtalk",
        "wecom",
        "lark",
        "serverchan",
        "pushplus",
        "discord",
        "pushover",
    ];

    pub fn build(
        channel_type: &str,
        config: &Value,
        client: reqwest::Client,
    ) -> Result<Self, ChannelError> {
        match channel_type {
            "telegram" => Ok(Self::Telegram(TelegramSender::from_config(client, config)?)),
            "bark" => Ok(Self::Bark(BarkSender::from_config(client, config)?)),
            "dingtalk" => Ok(Self::Dingtalk(DingtalkSender::from_config(client, config)?)),
            "wecom" => Ok(Self::Wecom(WecomSender::from_config(client, config)?)),
            "lark" => Ok(Self::Lark(LarkSender::from_config(client, config)?)),
            "serverchan" => Ok(Self::Serverchan(ServerchanSender::from_config(
                client, config,
            )?)),
            "pushplus" => Ok(Self::Pushplus(PushplusSender::from_config(client, config)?)),
            "discord" => Ok(Self::Discord(DiscordSender::from_config(client, config)?)),
            "pushover" => Ok(Self::Pushover(PushoverSender::from_config(client, config)?)),
            other => Err(ChannelError::BadConfig(format!("未知通道类型 {}", other))),
        }
    }

    pub async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        match self {
            Self::Telegram(s) => s.send(message).await,
            Self::Bark(s) => s.send(message).await,
            Self::Dingtalk(s) => s.send(message).await,
            Self::Wecom(s) => s.send(message).await,
            Self::Lark(s) => s.send(message).await,
            Self::Serverchan(s) => s.send(message).await,
            Self::Pushplus(s) => s.send(message).await,
            Self::Discord(s) => s.send(message).await,
            Self::Pushover(s) => s.send(message).await,
        }
    }
}

pub struct HttpSenderDispatch {
    client: reqwest::Client,
}

impl HttpSenderDispatch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SenderDispatch for HttpSenderDispatch {
    async fn send(
        &self,
        channel: &notify_channel::Model,
        message: &AlertMessage,
    ) -> Result<(), ChannelError> {
        let config: Value = match channel.config.as_deref() {
            Some(text) if !text.trim().is_empty() => serde_json::from_str(text)
                .map_err(|e| ChannelError::BadConfig(format!("config 不是合法 JSON: {}", e)))?,
            _ => serde_json::json!({}),
        };
        AnyChannel::build(&channel.channel_type, &config, self.client.clone())?
            .send(message)
            .await
    }
}
