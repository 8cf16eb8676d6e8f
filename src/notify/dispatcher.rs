use crate::notify::throttle::{GateDecision, ThrottleGate, MIN_NOTIFY_INTERVAL};
use crate::notify::types::{AlertMessage, SenderDispatch};
use crate::runlog::{LogEntry, RunLog};
use crate::storage::entity::notify_channel;
use crate::storage::repository::ChannelRepository;
use chrono::Local;
use log::{info, warn};
use sea_orm::{DatabaseConnection, DbErr};
use std::sync::Arc;
use std::time::Instant;

/// 单个通道的发送结果，失败只影响自己
#[derive(Debug, Clone)]
pub struct ChannelOutcome {
    pub channel_id: i32,
    pub channel_name: String,
    pub ok: bool,
    pub error: Option<String>,
    pub duration_ms: i64,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Sent { results: Vec<ChannelOutcome> },
    Throttled { wait_secs: i64 },
    /// 既没配通道也没有系统默认通道，运行继续但没有推送
    NoChannels,
}

/// 通知调度：解析通道列表、过节流门、并发推送。
/// 节流只拦自动链路，手动触发的 bypass 标记一路透传进来。
pub struct NotificationDispatcher {
    db: DatabaseConnection,
    gate: ThrottleGate,
    sender: Arc<dyn SenderDispatch>,
}

impl NotificationDispatcher {
    pub fn new(db: DatabaseConnection, sender: Arc<dyn SenderDispatch>) -> Self {
        let gate = ThrottleGate::new(db.clone());
        Self { db, gate, sender }
    }

    /// throttle_key 是标的 id，batch 摘要用 BATCH_DIGEST_KEY 哨兵值
    pub async fn dispatch(
        &self,
        agent_name: &str,
        throttle_key: i32,
        channel_ids: &[i32],
        message: &AlertMessage,
        bypass_throttle: bool,
        logs: &mut RunLog,
    ) -> Result<DispatchOutcome, DbErr> {
        let channels = self.resolve_channels(channel_ids).await?;
        if channels.is_empty() {
            warn!("⚠ Agent {} 没有可用通知通道，跳过推送", agent_name);
            logs.push(LogEntry::error(
                "notify",
                "没有可用的通知通道，跳过推送",
                0,
            ));
            return Ok(DispatchOutcome::NoChannels);
        }

        match self
            .gate
            .try_acquire(
                agent_name,
                throttle_key,
                Local::now(),
                MIN_NOTIFY_INTERVAL,
                bypass_throttle,
            )
            .await?
        {
            GateDecision::Allowed => {}
            GateDecision::Throttled { wait_secs } => {
                info!(
                    "通知节流: Agent {} key {} 还需等待 {}s",
                    agent_name, throttle_key, wait_secs
                );
                logs.push(LogEntry::error(
                    "notify",
                    format!("通知被节流，{}s 后解除", wait_secs),
                    0,
                ));
                return Ok(DispatchOutcome::Throttled { wait_secs });
            }
        }

        // 各通道彼此独立，并发推送；轨迹先记全部 start，结果按通道顺序补齐
        for channel in &channels {
            logs.push(LogEntry::start(
                &channel.name,
                format!("推送 [{}]", message.title),
            ));
        }
        let sends = channels.iter().map(|channel| async move {
            let started = Instant::now();
            let outcome = self.sender.send(channel, message).await;
            (channel, outcome, started.elapsed().as_millis() as i64)
        });
        let settled = futures::future::join_all(sends).await;

        let mut results = Vec::with_capacity(settled.len());
        for (channel, outcome, duration_ms) in settled {
            match outcome {
                Ok(()) => {
                    info!("✓ 通道 [{}] 推送成功，耗时 {}ms", channel.name, duration_ms);
                    logs.push(LogEntry::success(&channel.name, "推送成功", duration_ms, 1));
                    results.push(ChannelOutcome {
                        channel_id: channel.id,
                        channel_name: channel.name.clone(),
                        ok: true,
                        error: None,
                        duration_ms,
                    });
                }
                Err(e) => {
                    warn!("✗ 通道 [{}] 推送失败: {}", channel.name, e);
                    logs.push(LogEntry::error(&channel.name, e.to_string(), duration_ms));
                    results.push(ChannelOutcome {
                        channel_id: channel.id,
                        channel_name: channel.name.clone(),
                        ok: false,
                        error: Some(e.to_string()),
                        duration_ms,
                    });
                }
            }
        }
        Ok(DispatchOutcome::Sent { results })
    }

    /// 测试单个通道：只发这一个通道，不过节流门、不读默认通道
    pub async fn probe(
        &self,
        channel: &notify_channel::Model,
        message: &AlertMessage,
    ) -> (RunLog, Result<(), String>) {
        let mut logs = RunLog::new();
        logs.push(LogEntry::start(
            &channel.name,
            format!("测试推送 [{}]", message.title),
        ));
        let started = Instant::now();
        match self.sender.send(channel, message).await {
            Ok(()) => {
                let elapsed = started.elapsed().as_millis() as i64;
                logs.push(LogEntry::success(&channel.name, "推送成功", elapsed, 1));
                (logs, Ok(()))
            }
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as i64;
                logs.push(LogEntry::error(&channel.name, e.to_string(), elapsed));
                (logs, Err(e.to_string()))
            }
        }
    }

    /// 配置里给了列表就整体用列表（不做并集），空列表退回系统默认通道
    async fn resolve_channels(
        &self,
        channel_ids: &[i32],
    ) -> Result<Vec<notify_channel::Model>, DbErr> {
        if channel_ids.is_empty() {
            return Ok(ChannelRepository::get_default(&self.db)
                .await?
                .into_iter()
                .collect());
        }
        ChannelRepository::get_enabled_by_ids(&self.db, channel_ids).await
    }
}
