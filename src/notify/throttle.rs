use crate::storage::repository::ThrottleRepository;
use chrono::{DateTime, Local, TimeZone};
use sea_orm::{DatabaseConnection, DbErr};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// 同一 (agent, 标的) 键的最小通知间隔。系统级策略，固定 30 分钟，
/// 不随 Agent 配置变化。
pub const MIN_NOTIFY_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// batch 模式整体摘要的节流键，不对应任何真实标的行
pub const BATCH_DIGEST_KEY: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Throttled { wait_secs: i64 },
}

/// 通知节流门。检查与更新在同一把 key 锁里完成，
/// 并发拿同一个键时最多放行一个。
pub struct ThrottleGate {
    db: DatabaseConnection,
    locks: Mutex<HashMap<(String, i32), Arc<Mutex<()>>>>,
}

impl ThrottleGate {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn key_lock(&self, agent_name: &str, instrument_id: i32) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().await;
        map.entry((agent_name.to_string(), instrument_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn try_acquire(
        &self,
        agent_name: &str,
        instrument_id: i32,
        now: DateTime<Local>,
        min_interval: Duration,
        bypass: bool,
    ) -> Result<GateDecision, DbErr> {
        if bypass {
            // 旁路不读也不写，既有节流窗口保持原样
            return Ok(GateDecision::Allowed);
        }

        let lock = self.key_lock(agent_name, instrument_id).await;
        let _guard = lock.lock().await;

        let state = ThrottleRepository::get(&self.db, agent_name, instrument_id).await?;
        let now_ts = now.timestamp();
        let min_secs = min_interval.as_secs() as i64;

        if let Some(state) = &state {
            let elapsed = now_ts - state.last_notified_at;
            if elapsed < min_secs {
                return Ok(GateDecision::Throttled {
                    wait_secs: min_secs - elapsed,
                });
            }
        }

        // 当日累计计数，跨天从 1 重新数
        let notify_count = match &state {
            Some(s) => {
                let last_day = Local
                    .timestamp_opt(s.last_notified_at, 0)
                    .single()
                    .map(|dt| dt.date_naive());
                if last_day == Some(now.date_naive()) {
                    s.notify_count + 1
                } else {
                    1
                }
            }
            None => 1,
        };

        ThrottleRepository::record(&self.db, agent_name, instrument_id, now_ts, notify_count)
            .await?;
        Ok(GateDecision::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::establish_connection;
    use chrono::TimeZone;

    async fn gate_with(db_name: &str) -> ThrottleGate {
        let url = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);
        let db = establish_connection(&url).await.unwrap();
        ThrottleGate::new(db)
    }

    fn at(ts: i64) -> DateTime<Local> {
        Local.timestamp_opt(ts, 0).single().unwrap()
    }

    #[tokio::test]
    async fn window_blocks_until_interval_elapses() {
        let gate = gate_with("throttle_window").await;
        let interval = Duration::from_secs(60);
        let t0 = 1_750_000_000;

        let first = gate
            .try_acquire("intraday_monitor", 1, at(t0), interval, false)
            .await
            .unwrap();
        assert_eq!(first, GateDecision::Allowed);

        // 窗口内旁路放行，且不动窗口
        let bypassed = gate
            .try_acquire("intraday_monitor", 1, at(t0 + 1), interval, true)
            .await
            .unwrap();
        assert_eq!(bypassed, GateDecision::Allowed);

        let blocked = gate
            .try_acquire("intraday_monitor", 1, at(t0 + 30), interval, false)
            .await
            .unwrap();
        assert_eq!(blocked, GateDecision::Throttled { wait_secs: 30 });

        let reopened = gate
            .try_acquire("intraday_monitor", 1, at(t0 + 60), interval, false)
            .await
            .unwrap();
        assert_eq!(reopened, GateDecision::Allowed);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let gate = gate_with("throttle_keys").await;
        let interval = Duration::from_secs(600);
        let t0 = 1_750_000_000;

        assert_eq!(
            gate.try_acquire("intraday_monitor", 1, at(t0), interval, false)
                .await
                .unwrap(),
            GateDecision::Allowed
        );
        // 同 agent 不同标的、不同 agent 同标的都不受影响
        assert_eq!(
            gate.try_acquire("intraday_monitor", 2, at(t0), interval, false)
                .await
                .unwrap(),
            GateDecision::Allowed
        );
        assert_eq!(
            gate.try_acquire("chart_analyst", 1, at(t0), interval, false)
                .await
                .unwrap(),
            GateDecision::Allowed
        );
        assert!(matches!(
            gate.try_acquire("intraday_monitor", 1, at(t0 + 1), interval, false)
                .await
                .unwrap(),
            GateDecision::Throttled { .. }
        ));
    }

    #[tokio::test]
    async fn daily_count_resets_across_days() {
        let gate = gate_with("throttle_daily").await;
        let interval = Duration::from_secs(60);
        // 取本地时区某天中午，避免跨天边界歧义
        let day1_noon = Local.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let day1_later = Local.with_ymd_and_hms(2025, 6, 2, 13, 0, 0).unwrap();
        let day2 = Local.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap();

        for now in [day1_noon, day1_later] {
            assert_eq!(
                gate.try_acquire("intraday_monitor", 1, now, interval, false)
                    .await
                    .unwrap(),
                GateDecision::Allowed
            );
        }
        let state = ThrottleRepository::get(&gate.db, "intraday_monitor", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.notify_count, 2);

        gate.try_acquire("intraday_monitor", 1, day2, interval, false)
            .await
            .unwrap();
        let state = ThrottleRepository::get(&gate.db, "intraday_monitor", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.notify_count, 1);
    }

    #[tokio::test]
    async fn concurrent_same_key_admits_exactly_one() {
        let gate = Arc::new(gate_with("throttle_race").await);
        let interval = Duration::from_secs(600);
        let now = at(1_750_000_000);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.try_acquire("intraday_monitor", 7, now, interval, false)
                    .await
                    .unwrap()
            }));
        }
        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() == GateDecision::Allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 1);
    }
}
