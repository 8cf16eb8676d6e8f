use crate::agent::AgentExecutor;
use crate::resolve::{ExecutionMode, RuntimeOverride};
use crate::schedule::Schedule;
use crate::storage::entity::instrument;
use crate::storage::repository::{AgentRepository, BindingRepository, InstrumentRepository};
use chrono::{DateTime, Local};
use log::{info, warn};
use sea_orm::{DatabaseConnection, DbErr};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

const TICK: Duration = Duration::from_secs(5);

/// 一次到期触发。batch Agent 整体触发一次，
/// single Agent 按绑定逐个触发，绑定级排程覆盖在这里生效。
#[derive(Debug, Clone, PartialEq, Eq)]
enum Trigger {
    Agent(String),
    Instrument { agent: String, symbol: String },
}

/// 定时调度：每 5 秒巡检一轮启用的 Agent，命中排程的分钟内只触发一次。
/// 触发是 spawn 出去的，慢任务不会卡住巡检节拍。
pub struct SchedulerService {
    db: DatabaseConnection,
    executor: Arc<AgentExecutor>,
    fired: HashMap<String, DateTime<Local>>,
    warned: HashSet<String>,
}

impl SchedulerService {
    pub fn new(db: DatabaseConnection, executor: Arc<AgentExecutor>) -> Self {
        Self {
            db,
            executor,
            fired: HashMap::new(),
            warned: HashSet::new(),
        }
    }

    pub async fn run_forever(mut self) {
        info!("调度器启动，每 {}s 巡检一次", TICK.as_secs());
        loop {
            match self.collect_due(Local::now()).await {
                Ok(triggers) => self.spawn_all(triggers),
                Err(e) => warn!("调度巡检失败: {}", e),
            }
            tokio::time::sleep(TICK).await;
        }
    }

    /// 找出本轮到期的触发并登记触发痕迹。只做判定不做执行，方便单测。
    async fn collect_due(&mut self, now: DateTime<Local>) -> Result<Vec<Trigger>, DbErr> {
        let mut due = Vec::new();
        let agents = AgentRepository::get_enabled(&self.db).await?;

        for agent in &agents {
            match ExecutionMode::parse(&agent.execution_mode) {
                ExecutionMode::Batch => {
                    if self.is_due(&agent.name, &agent.schedule, now) {
                        due.push(Trigger::Agent(agent.name.clone()));
                    }
                }
                ExecutionMode::Single => {
                    let bindings = BindingRepository::for_agent(&self.db, &agent.name).await?;
                    if bindings.is_empty() {
                        continue;
                    }
                    let ids: Vec<i32> = bindings.iter().map(|b| b.instrument_id).collect();
                    let instruments = InstrumentRepository::get_by_ids(&self.db, &ids).await?;
                    let by_id: HashMap<i32, &instrument::Model> =
                        instruments.iter().map(|i| (i.id, i)).collect();

                    for binding in &bindings {
                        let Some(stock) = by_id.get(&binding.instrument_id) else {
                            continue;
                        };
                        if !stock.enabled {
                            continue;
                        }
                        let schedule_text = binding
                            .schedule
                            .as_deref()
                            .filter(|s| !s.trim().is_empty())
                            .unwrap_or(&agent.schedule);
                        let key = format!("{}#{}", agent.name, binding.id);
                        if self.is_due(&key, schedule_text, now) {
                            due.push(Trigger::Instrument {
                                agent: agent.name.clone(),
                                symbol: stock.symbol.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(due)
    }

    fn is_due(&mut self, key: &str, schedule_text: &str, now: DateTime<Local>) -> bool {
        if schedule_text.trim().is_empty() {
            return false;
        }
        let schedule = match Schedule::parse(schedule_text) {
            Ok(s) => {
                self.warned.remove(key);
                s
            }
            Err(e) => {
                // 坏表达式每个 key 只告警一次，修好前不再刷日志
                if self.warned.insert(key.to_string()) {
                    warn!(
                        "⚠ [{}] 排程表达式无效，跳过调度: {} ({})",
                        key, schedule_text, e
                    );
                }
                return false;
            }
        };
        let last = self.fired.get(key).copied();
        if !schedule.is_due(now, last) {
            return false;
        }
        self.fired.insert(key.to_string(), now);
        true
    }

    fn spawn_all(&self, triggers: Vec<Trigger>) {
        for trigger in triggers {
            let executor = self.executor.clone();
            tokio::spawn(async move {
                match trigger {
                    Trigger::Agent(name) => {
                        if let Err(e) = executor.run_agent(&name, &RuntimeOverride::default()).await
                        {
                            warn!("✗ 定时执行 Agent {} 失败: {}", name, e);
                        }
                    }
                    Trigger::Instrument { agent, symbol } => {
                        if let Err(e) = executor
                            .run_instrument(&agent, &symbol, &RuntimeOverride::default())
                            .await
                        {
                            warn!("✗ 定时执行 Agent {} [{}] 失败: {}", agent, symbol, e);
                        }
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, AnalysisProvider, ProviderFactory};
    use crate::market::provider::SourceDispatch;
    use crate::market::router::DataSourceRouter;
    use crate::market::types::{DataItem, FetchRequest, SourceError};
    use crate::notify::types::{AlertMessage, ChannelError, SenderDispatch};
    use crate::notify::NotificationDispatcher;
    use crate::storage::entity::{ai_model, data_source_binding, notify_channel};
    use crate::storage::establish_connection;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};

    struct NullSource;
    #[async_trait]
    impl SourceDispatch for NullSource {
        async fn call(
            &self,
            _binding: &data_source_binding::Model,
            _request: &FetchRequest,
        ) -> Result<Vec<DataItem>, SourceError> {
            Ok(Vec::new())
        }
    }

    struct NullSender;
    #[async_trait]
    impl SenderDispatch for NullSender {
        async fn send(
            &self,
            _channel: &notify_channel::Model,
            _message: &AlertMessage,
        ) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    struct NullFactory;
    impl ProviderFactory for NullFactory {
        fn build(
            &self,
            _model: &ai_model::Model,
        ) -> Result<Arc<dyn AnalysisProvider>, AnalysisError> {
            Err(AnalysisError::MissingKey)
        }
    }

    async fn service(db_name: &str) -> (DatabaseConnection, SchedulerService) {
        let url = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);
        let db = establish_connection(&url).await.unwrap();
        let router = DataSourceRouter::new(db.clone(), Arc::new(NullSource));
        let dispatcher = NotificationDispatcher::new(db.clone(), Arc::new(NullSender));
        let executor = Arc::new(AgentExecutor::new(
            db.clone(),
            router,
            dispatcher,
            Arc::new(NullFactory),
        ));
        let scheduler = SchedulerService::new(db.clone(), executor);
        (db, scheduler)
    }

    async fn seed_single_agent(db: &DatabaseConnection, schedule: &str) -> i32 {
        AgentRepository::upsert_builtin(
            db,
            "intraday_monitor",
            "盘中监测",
            "",
            true,
            schedule,
            "single",
            None,
        )
        .await
        .unwrap();
        let stock = InstrumentRepository::insert(db, "600519", "贵州茅台", "CN")
            .await
            .unwrap()
            .unwrap();
        BindingRepository::enroll(db, stock.id, "intraday_monitor")
            .await
            .unwrap();
        stock.id
    }

    fn local(h: u32, m: u32, s: u32) -> DateTime<Local> {
        // 2025-06-03 周二
        Local.with_ymd_and_hms(2025, 6, 3, h, m, s).unwrap()
    }

    #[tokio::test]
    async fn fires_once_per_minute_slot() {
        let (db, mut scheduler) = service("sched_once").await;
        seed_single_agent(&db, "* * * * *").await;

        let t = local(10, 0, 2);
        let first = scheduler.collect_due(t).await.unwrap();
        assert_eq!(
            first,
            vec![Trigger::Instrument {
                agent: "intraday_monitor".to_string(),
                symbol: "600519".to_string(),
            }]
        );

        // 同一分钟内不重复触发
        let again = scheduler.collect_due(local(10, 0, 40)).await.unwrap();
        assert!(again.is_empty());

        // 下一分钟重新触发
        let next = scheduler.collect_due(local(10, 1, 2)).await.unwrap();
        assert_eq!(next.len(), 1);
    }

    #[tokio::test]
    async fn binding_schedule_override_controls_cadence() {
        let (db, mut scheduler) = service("sched_override").await;
        let stock_id = seed_single_agent(&db, "0 9 * * *").await;
        BindingRepository::set_overrides(
            &db,
            stock_id,
            "intraday_monitor",
            Some("*/5 * * * *".to_string()),
            None,
            None,
        )
        .await
        .unwrap();

        // 10:00 不是 9 点整，但命中绑定排程的 5 分钟节奏
        let aligned = Local.timestamp_opt(1_748_916_000, 0).single().unwrap();
        let slot = crate::schedule::minute_slot(aligned);
        assert_eq!(slot % 5, 0, "测试时间点需要对齐 5 分钟");

        let due = scheduler.collect_due(aligned).await.unwrap();
        assert_eq!(due.len(), 1);

        let off = scheduler
            .collect_due(aligned + ChronoDuration::minutes(1))
            .await
            .unwrap();
        assert!(off.is_empty());
    }

    #[tokio::test]
    async fn batch_agent_fires_at_agent_level() {
        let (db, mut scheduler) = service("sched_batch").await;
        AgentRepository::upsert_builtin(
            &db,
            "daily_report",
            "每日报告",
            "",
            true,
            "* * * * *",
            "batch",
            None,
        )
        .await
        .unwrap();
        for (symbol, name) in [("600519", "贵州茅台"), ("300750", "宁德时代")] {
            let stock = InstrumentRepository::insert(&db, symbol, name, "CN")
                .await
                .unwrap()
                .unwrap();
            BindingRepository::enroll(&db, stock.id, "daily_report")
                .await
                .unwrap();
        }

        let due = scheduler.collect_due(local(16, 30, 0)).await.unwrap();
        // 绑定两只股票也只有一个整体触发
        assert_eq!(due, vec![Trigger::Agent("daily_report".to_string())]);
    }

    #[tokio::test]
    async fn malformed_schedule_warns_once_and_skips() {
        let (db, mut scheduler) = service("sched_badcron").await;
        seed_single_agent(&db, "每五分钟").await;

        assert!(scheduler.collect_due(local(10, 0, 0)).await.unwrap().is_empty());
        assert_eq!(scheduler.warned.len(), 1);

        // 第二轮不再新增告警记录，也不触发
        assert!(scheduler.collect_due(local(10, 1, 0)).await.unwrap().is_empty());
        assert_eq!(scheduler.warned.len(), 1);
    }

    #[tokio::test]
    async fn empty_schedule_never_fires() {
        let (db, mut scheduler) = service("sched_empty").await;
        seed_single_agent(&db, "").await;

        assert!(scheduler.collect_due(local(10, 0, 0)).await.unwrap().is_empty());
        assert!(scheduler.warned.is_empty());
    }

    #[tokio::test]
    async fn disabled_agent_is_ignored() {
        let (db, mut scheduler) = service("sched_disabled").await;
        seed_single_agent(&db, "* * * * *").await;
        AgentRepository::set_enabled(&db, "intraday_monitor", false)
            .await
            .unwrap();

        assert!(scheduler.collect_due(local(10, 0, 0)).await.unwrap().is_empty());
    }
}
