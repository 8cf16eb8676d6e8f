use crate::agent::{AgentExecutor, RunError, RunReport};
use crate::analysis::{AnalysisRequest, AnyProvider, ProviderFactory};
use crate::market::provider::SourceDispatch;
use crate::market::router::DataSourceRouter;
use crate::notify::types::SenderDispatch;
use crate::notify::{AlertMessage, AnyChannel, NotificationDispatcher};
use crate::resolve::RuntimeOverride;
use crate::runlog::{LogEntry, RunLog};
use crate::schedule::Schedule;
use crate::storage::entity::{
    agent_definition, agent_run, ai_model, data_source_binding, instrument,
    instrument_agent_binding, notify_channel,
};
use crate::storage::repository::{
    AgentRepository, AiModelRepository, BindingRepository, ChannelRepository,
    DataSourceRepository, InstrumentRepository, RunRepository,
};
use anyhow::{anyhow, Result};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Instant;

/// 测试连接的统一结果，数据源/模型/通道共用。
/// logs 是完整尝试轨迹，界面按轨迹逐条渲染。
#[derive(Debug)]
pub struct TestReport {
    pub target: String,
    pub success: bool,
    pub count: Option<usize>,
    pub duration_ms: i64,
    pub error: Option<String>,
    pub logs: RunLog,
}

/// 控制台命令背后的门面：触发、测试连接和全部配置维护入口。
/// 执行器共享给调度器，探测走独立实例避免节流状态串台。
pub struct AppService {
    db: DatabaseConnection,
    executor: Arc<AgentExecutor>,
    probe_router: DataSourceRouter,
    probe_dispatcher: NotificationDispatcher,
    providers: Arc<dyn ProviderFactory>,
}

impl AppService {
    pub fn new(
        db: DatabaseConnection,
        sources: Arc<dyn SourceDispatch>,
        sender: Arc<dyn SenderDispatch>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        let executor = Arc::new(AgentExecutor::new(
            db.clone(),
            DataSourceRouter::new(db.clone(), sources.clone()),
            NotificationDispatcher::new(db.clone(), sender.clone()),
            providers.clone(),
        ));
        Self {
            db: db.clone(),
            executor,
            probe_router: DataSourceRouter::new(db.clone(), sources),
            probe_dispatcher: NotificationDispatcher::new(db, sender),
            providers,
        }
    }

    pub fn executor(&self) -> Arc<AgentExecutor> {
        self.executor.clone()
    }

    // ---- 触发 ----

    pub async fn trigger_agent(
        &self,
        agent_name: &str,
        bypass_throttle: bool,
    ) -> Result<Vec<RunReport>, RunError> {
        let runtime = RuntimeOverride {
            bypass_throttle,
            ..Default::default()
        };
        self.executor.run_agent(agent_name, &runtime).await
    }

    pub async fn trigger_instrument(
        &self,
        agent_name: &str,
        symbol: &str,
        bypass_throttle: bool,
    ) -> Result<RunReport, RunError> {
        let runtime = RuntimeOverride {
            bypass_throttle,
            ..Default::default()
        };
        self.executor.run_instrument(agent_name, symbol, &runtime).await
    }

    // ---- 测试连接 ----

    pub async fn test_data_source(&self, id: i32) -> Result<TestReport> {
        let binding = DataSourceRepository::get(&self.db, id)
            .await?
            .ok_or_else(|| anyhow!("数据源不存在: id={}", id))?;
        let symbols = decode_test_symbols(binding.test_symbols.as_deref());

        let started = Instant::now();
        let (logs, result) = self.probe_router.probe(&binding, &symbols).await;
        Ok(TestReport {
            target: binding.name,
            success: result.is_ok(),
            count: result.as_ref().ok().copied(),
            duration_ms: started.elapsed().as_millis() as i64,
            error: result.err(),
            logs,
        })
    }

    pub async fn test_ai_model(&self, id: i32) -> Result<TestReport> {
        let model = AiModelRepository::get(&self.db, id)
            .await?
            .ok_or_else(|| anyhow!("模型不存在: id={}", id))?;

        let mut logs = RunLog::new();
        logs.push(LogEntry::start(&model.name, "测试模型连接"));
        let started = Instant::now();

        let outcome = match self.providers.build(&model) {
            Ok(provider) => {
                let mut request = AnalysisRequest::new(
                    &model.model_name,
                    "你是连接测试助手。",
                    "收到请回复 ok。",
                );
                request.max_tokens = 16;
                provider.analyze(request).await.map(|resp| resp.text)
            }
            Err(e) => Err(e),
        };

        let duration_ms = started.elapsed().as_millis() as i64;
        match outcome {
            Ok(text) => {
                logs.push(LogEntry::success(
                    &model.name,
                    format!("模型应答: {}", text.trim()),
                    duration_ms,
                    1,
                ));
                Ok(TestReport {
                    target: model.name,
                    success: true,
                    count: Some(1),
                    duration_ms,
                    error: None,
                    logs,
                })
            }
            Err(e) => {
                logs.push(LogEntry::error(&model.name, e.to_string(), duration_ms));
                Ok(TestReport {
                    target: model.name,
                    success: false,
                    count: None,
                    duration_ms,
                    error: Some(e.to_string()),
                    logs,
                })
            }
        }
    }

    pub async fn test_channel(&self, id: i32) -> Result<TestReport> {
        let channel = ChannelRepository::get(&self.db, id)
            .await?
            .ok_or_else(|| anyhow!("通道不存在: id={}", id))?;
        let message = AlertMessage::new(
            "【盘中助手】通道测试",
            "这是一条连接测试消息，收到即配置成功。",
        );

        let started = Instant::now();
        let (logs, result) = self.probe_dispatcher.probe(&channel, &message).await;
        Ok(TestReport {
            target: channel.name,
            success: result.is_ok(),
            count: result.as_ref().ok().map(|_| 1),
            duration_ms: started.elapsed().as_millis() as i64,
            error: result.err(),
            logs,
        })
    }

    // ---- Agent 配置 ----

    pub async fn list_agents(&self) -> Result<Vec<agent_definition::Model>> {
        Ok(AgentRepository::get_all(&self.db).await?)
    }

    pub async fn set_agent_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        if !AgentRepository::set_enabled(&self.db, name, enabled).await? {
            return Err(anyhow!("未知 Agent: {}", name));
        }
        Ok(())
    }

    /// 返回 false 表示新表达式与原排程等价，没有写库
    pub async fn update_agent_schedule(&self, name: &str, text: &str) -> Result<bool> {
        let updated = Schedule::parse(text).map_err(|e| anyhow!("排程表达式无效: {}", e))?;
        let agent = AgentRepository::get_by_name(&self.db, name)
            .await?
            .ok_or_else(|| anyhow!("未知 Agent: {}", name))?;
        if let Ok(current) = Schedule::parse(&agent.schedule) {
            if current == updated {
                return Ok(false);
            }
        }
        AgentRepository::update_schedule(&self.db, name, text).await?;
        Ok(true)
    }

    pub async fn set_agent_model(&self, name: &str, model_id: Option<i32>) -> Result<()> {
        if let Some(id) = model_id {
            if AiModelRepository::get(&self.db, id).await?.is_none() {
                return Err(anyhow!("模型不存在: id={}", id));
            }
        }
        if !AgentRepository::update_model(&self.db, name, model_id).await? {
            return Err(anyhow!("未知 Agent: {}", name));
        }
        Ok(())
    }

    pub async fn set_agent_channels(&self, name: &str, channel_ids: &[i32]) -> Result<()> {
        if !AgentRepository::update_channels(&self.db, name, channel_ids).await? {
            return Err(anyhow!("未知 Agent: {}", name));
        }
        Ok(())
    }

    // ---- 自选股与绑定 ----

    pub async fn list_stocks(&self) -> Result<Vec<instrument::Model>> {
        Ok(InstrumentRepository::get_all(&self.db).await?)
    }

    pub async fn add_stock(&self, symbol: &str, name: &str, market: &str) -> Result<instrument::Model> {
        InstrumentRepository::insert(&self.db, symbol, name, market)
            .await?
            .ok_or_else(|| anyhow!("股票已收录: {}", symbol))
    }

    pub async fn remove_stock(&self, symbol: &str) -> Result<()> {
        let stock = InstrumentRepository::get_by_symbol(&self.db, symbol)
            .await?
            .ok_or_else(|| anyhow!("未收录的股票: {}", symbol))?;
        BindingRepository::delete_for_instrument(&self.db, stock.id).await?;
        InstrumentRepository::remove(&self.db, stock.id).await?;
        Ok(())
    }

    pub async fn set_stock_enabled(&self, symbol: &str, enabled: bool) -> Result<()> {
        let stock = InstrumentRepository::get_by_symbol(&self.db, symbol)
            .await?
            .ok_or_else(|| anyhow!("未收录的股票: {}", symbol))?;
        InstrumentRepository::set_enabled(&self.db, stock.id, enabled).await?;
        Ok(())
    }

    /// cost 为 None 清除持仓信息，shares 可以缺省（只记成本）
    pub async fn set_position(
        &self,
        symbol: &str,
        cost_price: Option<f64>,
        shares: Option<f64>,
    ) -> Result<()> {
        let stock = InstrumentRepository::get_by_symbol(&self.db, symbol)
            .await?
            .ok_or_else(|| anyhow!("未收录的股票: {}", symbol))?;
        let (cost_price, shares) = match cost_price {
            Some(cost) => (Some(cost), shares),
            None => (None, None),
        };
        InstrumentRepository::set_position(&self.db, stock.id, cost_price, shares).await?;
        Ok(())
    }

    /// 返回 false 表示已绑定过
    pub async fn assign(&self, symbol: &str, agent_name: &str) -> Result<bool> {
        let stock = InstrumentRepository::get_by_symbol(&self.db, symbol)
            .await?
            .ok_or_else(|| anyhow!("未收录的股票: {}", symbol))?;
        if AgentRepository::get_by_name(&self.db, agent_name).await?.is_none() {
            return Err(anyhow!("未知 Agent: {}", agent_name));
        }
        Ok(BindingRepository::enroll(&self.db, stock.id, agent_name)
            .await?
            .is_some())
    }

    pub async fn unassign(&self, symbol: &str, agent_name: &str) -> Result<bool> {
        let stock = InstrumentRepository::get_by_symbol(&self.db, symbol)
            .await?
            .ok_or_else(|| anyhow!("未收录的股票: {}", symbol))?;
        Ok(BindingRepository::unenroll(&self.db, stock.id, agent_name).await? > 0)
    }

    // 覆盖三件套在库里是整体一行，单项修改要带上另外两项原值

    pub async fn override_binding_schedule(
        &self,
        symbol: &str,
        agent_name: &str,
        expr: Option<String>,
    ) -> Result<()> {
        if let Some(text) = expr.as_deref().filter(|s| !s.trim().is_empty()) {
            Schedule::parse(text).map_err(|e| anyhow!("排程表达式无效: {}", e))?;
        }
        let (stock, binding) = self.require_binding(symbol, agent_name).await?;
        BindingRepository::set_overrides(
            &self.db,
            stock.id,
            agent_name,
            expr,
            binding.ai_model_id,
            decode_channel_override(binding.notify_channel_ids.as_deref()),
        )
        .await?;
        Ok(())
    }

    pub async fn override_binding_model(
        &self,
        symbol: &str,
        agent_name: &str,
        model_id: Option<i32>,
    ) -> Result<()> {
        if let Some(id) = model_id {
            if AiModelRepository::get(&self.db, id).await?.is_none() {
                return Err(anyhow!("模型不存在: id={}", id));
            }
        }
        let (stock, binding) = self.require_binding(symbol, agent_name).await?;
        BindingRepository::set_overrides(
            &self.db,
            stock.id,
            agent_name,
            binding.schedule,
            model_id,
            decode_channel_override(binding.notify_channel_ids.as_deref()),
        )
        .await?;
        Ok(())
    }

    pub async fn override_binding_channels(
        &self,
        symbol: &str,
        agent_name: &str,
        channel_ids: Option<Vec<i32>>,
    ) -> Result<()> {
        let (stock, binding) = self.require_binding(symbol, agent_name).await?;
        BindingRepository::set_overrides(
            &self.db,
            stock.id,
            agent_name,
            binding.schedule,
            binding.ai_model_id,
            channel_ids,
        )
        .await?;
        Ok(())
    }

    /// 全部恢复继承 Agent 层配置
    pub async fn clear_binding_overrides(&self, symbol: &str, agent_name: &str) -> Result<()> {
        let (stock, _) = self.require_binding(symbol, agent_name).await?;
        BindingRepository::set_overrides(&self.db, stock.id, agent_name, None, None, None).await?;
        Ok(())
    }

    async fn require_binding(
        &self,
        symbol: &str,
        agent_name: &str,
    ) -> Result<(instrument::Model, instrument_agent_binding::Model)> {
        let stock = InstrumentRepository::get_by_symbol(&self.db, symbol)
            .await?
            .ok_or_else(|| anyhow!("未收录的股票: {}", symbol))?;
        let binding = BindingRepository::find(&self.db, stock.id, agent_name)
            .await?
            .ok_or_else(|| anyhow!("{} 尚未绑定 {}", symbol, agent_name))?;
        Ok((stock, binding))
    }

    // ---- 模型 ----

    pub async fn list_models(&self) -> Result<Vec<ai_model::Model>> {
        Ok(AiModelRepository::get_all(&self.db).await?)
    }

    pub async fn add_model(
        &self,
        name: &str,
        provider: &str,
        model_name: &str,
        api_key: &str,
        base_url: Option<String>,
    ) -> Result<ai_model::Model> {
        if !AnyProvider::KNOWN_PROVIDERS.contains(&provider) {
            return Err(anyhow!(
                "未知 provider: {}（支持 {}）",
                provider,
                AnyProvider::KNOWN_PROVIDERS.join("/")
            ));
        }
        Ok(AiModelRepository::create(&self.db, name, provider, model_name, api_key, base_url).await?)
    }

    pub async fn set_default_model(&self, id: i32) -> Result<()> {
        if !AiModelRepository::set_default(&self.db, id).await? {
            return Err(anyhow!("模型不存在: id={}", id));
        }
        Ok(())
    }

    pub async fn delete_model(&self, id: i32) -> Result<()> {
        if AiModelRepository::delete(&self.db, id).await? == 0 {
            return Err(anyhow!("模型不存在: id={}", id));
        }
        Ok(())
    }

    // ---- 通道 ----

    pub async fn list_channels(&self) -> Result<Vec<notify_channel::Model>> {
        Ok(ChannelRepository::get_all(&self.db).await?)
    }

    pub async fn add_channel(
        &self,
        name: &str,
        channel_type: &str,
        config: serde_json::Value,
    ) -> Result<notify_channel::Model> {
        if !AnyChannel::KNOWN_TYPES.contains(&channel_type) {
            return Err(anyhow!(
                "未知通道类型: {}（支持 {}）",
                channel_type,
                AnyChannel::KNOWN_TYPES.join("/")
            ));
        }
        Ok(ChannelRepository::create(&self.db, name, channel_type, config).await?)
    }

    pub async fn set_default_channel(&self, id: i32) -> Result<()> {
        if !ChannelRepository::set_default(&self.db, id).await? {
            return Err(anyhow!("通道不存在: id={}", id));
        }
        Ok(())
    }

    pub async fn set_channel_enabled(&self, id: i32, enabled: bool) -> Result<()> {
        if !ChannelRepository::set_enabled(&self.db, id, enabled).await? {
            return Err(anyhow!("通道不存在: id={}", id));
        }
        Ok(())
    }

    pub async fn delete_channel(&self, id: i32) -> Result<()> {
        if ChannelRepository::delete(&self.db, id).await? == 0 {
            return Err(anyhow!("通道不存在: id={}", id));
        }
        Ok(())
    }

    // ---- 数据源 ----

    pub async fn list_sources(&self) -> Result<Vec<data_source_binding::Model>> {
        Ok(DataSourceRepository::get_all(&self.db).await?)
    }

    pub async fn set_source_enabled(&self, id: i32, enabled: bool) -> Result<()> {
        if !DataSourceRepository::set_enabled(&self.db, id, enabled).await? {
            return Err(anyhow!("数据源不存在: id={}", id));
        }
        Ok(())
    }

    // ---- 运行历史 ----

    pub async fn recent_runs(
        &self,
        agent_name: Option<&str>,
        limit: u64,
    ) -> Result<Vec<agent_run::Model>> {
        Ok(RunRepository::recent(&self.db, agent_name, limit).await?)
    }
}

fn decode_test_symbols(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|text| serde_json::from_str::<Vec<String>>(text).ok())
        .filter(|symbols| !symbols.is_empty())
        .unwrap_or_else(|| vec!["600519".to_string()])
}

fn decode_channel_override(raw: Option<&str>) -> Option<Vec<i32>> {
    raw.and_then(|text| serde_json::from_str::<Vec<i32>>(text).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, AnalysisProvider};
    use crate::market::types::{DataItem, FetchRequest, SourceError};
    use crate::notify::types::ChannelError;
    use crate::storage::establish_connection;
    use async_trait::async_trait;

    struct NullSource;
    #[async_trait]
    impl SourceDispatch for NullSource {
        async fn call(
            &self,
            _binding: &data_source_binding::Model,
            request: &FetchRequest,
        ) -> Result<Vec<DataItem>, SourceError> {
            let _ = request;
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

    async fn service(db_name: &str) -> AppService {
        let url = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);
        let db = establish_connection(&url).await.unwrap();
        AppService::new(
            db,
            Arc::new(NullSource),
            Arc::new(NullSender),
            Arc::new(NullFactory),
        )
    }

    #[tokio::test]
    async fn schedule_update_skips_equivalent_expression() {
        let service = service("svc_schedule").await;
        AgentRepository::upsert_builtin(
            &service.db,
            "daily_report",
            "每日报告",
            "",
            true,
            "30 15 * * 1-5",
            "batch",
            None,
        )
        .await
        .unwrap();

        // 写法不同但归一化后等价，不算变更
        let changed = service
            .update_agent_schedule("daily_report", "30 15 * * 1,2,3,4,5")
            .await
            .unwrap();
        assert!(!changed);

        let changed = service
            .update_agent_schedule("daily_report", "0 16 * * 1-5")
            .await
            .unwrap();
        assert!(changed);

        let err = service
            .update_agent_schedule("daily_report", "每天下午")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("排程表达式无效"));
    }

    #[tokio::test]
    async fn stock_lifecycle_with_binding_cleanup() {
        let service = service("svc_stock").await;
        AgentRepository::upsert_builtin(
            &service.db,
            "intraday_monitor",
            "盘中监测",
            "",
            true,
            "*/5 9-15 * * 1-5",
            "single",
            None,
        )
        .await
        .unwrap();

        let stock = service.add_stock("600519", "贵州茅台", "CN").await.unwrap();
        assert!(service.add_stock("600519", "贵州茅台", "CN").await.is_err());

        assert!(service.assign("600519", "intraday_monitor").await.unwrap());
        // 重复绑定是无操作
        assert!(!service.assign("600519", "intraday_monitor").await.unwrap());

        service.remove_stock("600519").await.unwrap();
        assert!(BindingRepository::find(&service.db, stock.id, "intraday_monitor")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unknown_channel_type_is_rejected_up_front() {
        let service = service("svc_channel").await;
        let err = service
            .add_channel("烟雾信号", "smoke_signal", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("未知通道类型"));

        let channel = service
            .add_channel("手机推送", "bark", serde_json::json!({"device_key": "k"}))
            .await
            .unwrap();
        service.set_default_channel(channel.id).await.unwrap();
        service.delete_channel(channel.id).await.unwrap();
        assert!(service.delete_channel(channel.id).await.is_err());
    }

    #[tokio::test]
    async fn binding_override_requires_enrollment() {
        let service = service("svc_override").await;
        AgentRepository::upsert_builtin(
            &service.db,
            "intraday_monitor",
            "盘中监测",
            "",
            true,
            "*/5 9-15 * * 1-5",
            "single",
            None,
        )
        .await
        .unwrap();
        service.add_stock("601127", "赛力斯", "CN").await.unwrap();

        let err = service
            .override_binding_schedule("601127", "intraday_monitor", Some("*/10 * * * *".to_string()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("尚未绑定"));

        service.assign("601127", "intraday_monitor").await.unwrap();
        service
            .override_binding_schedule("601127", "intraday_monitor", Some("*/10 * * * *".to_string()))
            .await
            .unwrap();

        let err = service
            .override_binding_schedule("601127", "intraday_monitor", Some("垃圾表达式".to_string()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("排程表达式无效"));
    }

    #[tokio::test]
    async fn single_field_override_keeps_the_others() {
        let service = service("svc_merge").await;
        AgentRepository::upsert_builtin(
            &service.db,
            "intraday_monitor",
            "盘中监测",
            "",
            true,
            "*/5 9-15 * * 1-5",
            "single",
            None,
        )
        .await
        .unwrap();
        let model = AiModelRepository::create(
            &service.db,
            "备用模型",
            "openai_compat",
            "m",
            "sk",
            None,
        )
        .await
        .unwrap();
        let stock = service.add_stock("600519", "贵州茅台", "CN").await.unwrap();
        service.assign("600519", "intraday_monitor").await.unwrap();

        service
            .override_binding_schedule("600519", "intraday_monitor", Some("*/10 * * * *".to_string()))
            .await
            .unwrap();
        service
            .override_binding_model("600519", "intraday_monitor", Some(model.id))
            .await
            .unwrap();
        service
            .override_binding_channels("600519", "intraday_monitor", Some(vec![3, 1]))
            .await
            .unwrap();

        let binding = BindingRepository::find(&service.db, stock.id, "intraday_monitor")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(binding.schedule.as_deref(), Some("*/10 * * * *"));
        assert_eq!(binding.ai_model_id, Some(model.id));
        assert_eq!(binding.notify_channel_ids.as_deref(), Some("[3,1]"));

        service
            .clear_binding_overrides("600519", "intraday_monitor")
            .await
            .unwrap();
        let binding = BindingRepository::find(&service.db, stock.id, "intraday_monitor")
            .await
            .unwrap()
            .unwrap();
        assert!(binding.schedule.is_none());
        assert!(binding.ai_model_id.is_none());
        assert!(binding.notify_channel_ids.is_none());
    }

    #[tokio::test]
    async fn test_endpoints_survive_failures() {
        let service = service("svc_probe").await;
        DataSourceRepository::upsert_preset(
            &service.db,
            "行情源",
            "quote",
            "tencent",
            None,
            true,
            0,
            true,
            &["600519"],
        )
        .await
        .unwrap();
        let sources = service.list_sources().await.unwrap();

        // NullSource 返回 0 条也算连通
        let report = service.test_data_source(sources[0].id).await.unwrap();
        assert!(report.success);
        assert_eq!(report.count, Some(0));
        assert_eq!(report.logs.entries().len(), 2);

        // 工厂拒绝构建时测试端点给出失败报告而不是崩
        let model = AiModelRepository::create(
            &service.db,
            "坏模型",
            "openai_compat",
            "m",
            "",
            Some("https://example.test".to_string()),
        )
        .await
        .unwrap();
        let report = service.test_ai_model(model.id).await.unwrap();
        assert!(!report.success);
        assert!(report.error.is_some());

        assert!(service.test_data_source(9999).await.is_err());
    }
}
