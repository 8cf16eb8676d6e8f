use crate::agent::classify::{classify_batch, classify_single};
use crate::agent::context::{self, PromptInput};
use crate::agent::model::{RunError, RunReport, RunStatus, Verdict};
use crate::analysis::{
    AnalysisError, AnalysisProvider, AnalysisRequest, AnalysisResponse, ProviderFactory,
};
use crate::market::router::DataSourceRouter;
use crate::market::types::DataItem;
use crate::notify::{AlertMessage, DispatchOutcome, NotificationDispatcher, BATCH_DIGEST_KEY};
use crate::resolve::{self, ExecutionConfig, ExecutionMode, RuntimeOverride};
use crate::runlog::{LogEntry, RunLog};
use crate::schedule::Schedule;
use crate::storage::entity::{agent_definition, ai_model, instrument, instrument_agent_binding};
use crate::storage::repository::{
    AgentRepository, AiModelRepository, BindingRepository, InstrumentRepository, RunRepository,
};
use chrono::Local;
use log::{info, warn};
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(120);
// 只重试网络类瞬时错误，配置和校验类错误直接失败
const ANALYSIS_RETRIES: u32 = 2;

struct ExecOutcome {
    verdicts: Vec<Verdict>,
    analysis: Option<String>,
    notified: bool,
    throttled: bool,
}

/// Agent 执行器：解析配置、取数、AI 分析、分类、推送，全链路一条龙。
/// single 模式下每只标的独立走完整状态机，一只失败不影响其他标的。
pub struct AgentExecutor {
    db: DatabaseConnection,
    router: DataSourceRouter,
    dispatcher: NotificationDispatcher,
    providers: Arc<dyn ProviderFactory>,
}

impl AgentExecutor {
    pub fn new(
        db: DatabaseConnection,
        router: DataSourceRouter,
        dispatcher: NotificationDispatcher,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            db,
            router,
            dispatcher,
            providers,
        }
    }

    /// 跑一个 Agent 的全部绑定标的。
    /// 返回 Err 只发生在全局解析阶段（未知 Agent、表达式无效），此时不落任何运行记录；
    /// 进入执行后的失败都折叠成 Failed 汇报，按标的隔离。
    pub async fn run_agent(
        &self,
        agent_name: &str,
        runtime: &RuntimeOverride,
    ) -> Result<Vec<RunReport>, RunError> {
        let agent = AgentRepository::get_by_name(&self.db, agent_name)
            .await?
            .ok_or_else(|| RunError::config(format!("未知 Agent: {}", agent_name)))?;

        // 表达式先验，手动触发传错参数不留痕迹
        let preflight = resolve::resolve(&agent, None, runtime);
        Schedule::parse(&preflight.schedule)
            .map_err(|e| RunError::config(format!("排程表达式无效: {}", e)))?;

        let bindings = BindingRepository::for_agent(&self.db, agent_name).await?;
        let ids: Vec<i32> = bindings.iter().map(|b| b.instrument_id).collect();
        let instruments: Vec<instrument::Model> = InstrumentRepository::get_by_ids(&self.db, &ids)
            .await?
            .into_iter()
            .filter(|i| i.enabled)
            .collect();
        if instruments.is_empty() {
            info!("Agent {} 没有启用的绑定标的，跳过本次执行", agent_name);
            return Ok(Vec::new());
        }

        info!(
            "[触发] Agent={} | 股票=[{}] | 模式={} | 旁路节流={}",
            agent.name,
            instruments
                .iter()
                .map(|i| i.symbol.as_str())
                .collect::<Vec<_>>()
                .join(","),
            preflight.execution_mode.as_str(),
            runtime.bypass_throttle
        );

        match preflight.execution_mode {
            ExecutionMode::Single => {
                let by_instrument: HashMap<i32, &instrument_agent_binding::Model> =
                    bindings.iter().map(|b| (b.instrument_id, b)).collect();
                let mut reports = Vec::with_capacity(instruments.len());
                for stock in &instruments {
                    let binding = by_instrument.get(&stock.id).copied();
                    reports.push(self.run_for_instrument(&agent, stock, binding, runtime).await);
                }
                Ok(reports)
            }
            ExecutionMode::Batch => Ok(vec![self.run_batch(&agent, &instruments, runtime).await]),
        }
    }

    /// 对单只股票手动触发。未绑定的股票也能跑，当作一次性的临时体检。
    pub async fn run_instrument(
        &self,
        agent_name: &str,
        symbol: &str,
        runtime: &RuntimeOverride,
    ) -> Result<RunReport, RunError> {
        let agent = AgentRepository::get_by_name(&self.db, agent_name)
            .await?
            .ok_or_else(|| RunError::config(format!("未知 Agent: {}", agent_name)))?;
        let preflight = resolve::resolve(&agent, None, runtime);
        Schedule::parse(&preflight.schedule)
            .map_err(|e| RunError::config(format!("排程表达式无效: {}", e)))?;

        let stock = InstrumentRepository::get_by_symbol(&self.db, symbol)
            .await?
            .ok_or_else(|| RunError::config(format!("未收录的股票: {}", symbol)))?;
        let binding = BindingRepository::find(&self.db, stock.id, agent_name).await?;
        Ok(self
            .run_for_instrument(&agent, &stock, binding.as_ref(), runtime)
            .await)
    }

    async fn run_for_instrument(
        &self,
        agent: &agent_definition::Model,
        stock: &instrument::Model,
        binding: Option<&instrument_agent_binding::Model>,
        runtime: &RuntimeOverride,
    ) -> RunReport {
        let started = Instant::now();
        let mut logs = RunLog::new();
        let config = resolve::resolve(agent, binding, runtime);
        let outcome = self
            .execute_single(agent, stock, &config, &mut logs)
            .await;
        self.seal_report(&agent.name, Some(stock.symbol.clone()), outcome, started, logs)
            .await
    }

    async fn run_batch(
        &self,
        agent: &agent_definition::Model,
        instruments: &[instrument::Model],
        runtime: &RuntimeOverride,
    ) -> RunReport {
        let started = Instant::now();
        let mut logs = RunLog::new();
        // batch 的模型和通道按 Agent 层配置走，绑定覆盖只在 single 模式生效
        let config = resolve::resolve(agent, None, runtime);
        let outcome = self
            .execute_batch(agent, instruments, &config, &mut logs)
            .await;
        self.seal_report(&agent.name, None, outcome, started, logs)
            .await
    }

    async fn execute_single(
        &self,
        agent: &agent_definition::Model,
        stock: &instrument::Model,
        config: &ExecutionConfig,
        logs: &mut RunLog,
    ) -> Result<ExecOutcome, RunError> {
        // Agent 层表达式已在入口校验过，这里拦的是绑定覆盖
        Schedule::parse(&config.schedule)
            .map_err(|e| RunError::config(format!("排程表达式无效: {}", e)))?;

        let symbols = vec![stock.symbol.clone()];
        let items = self.gather_data(&agent.name, &symbols, logs).await?;
        let text = self
            .analyze(agent, std::slice::from_ref(stock), &items, config, logs)
            .await?;

        let verdict = classify_single(&text, &stock.symbol, &stock.name);
        info!(
            "Agent {} [{}] 结论: {}，alert={}",
            agent.name,
            stock.symbol,
            verdict.action.label(),
            verdict.should_alert
        );

        let mut notified = false;
        let mut throttled = false;
        if verdict.should_alert {
            let message = AlertMessage::new(single_title(agent, stock, &items), text.trim());
            match self
                .dispatcher
                .dispatch(
                    &agent.name,
                    stock.id,
                    &config.notify_channel_ids,
                    &message,
                    config.bypass_throttle,
                    logs,
                )
                .await?
            {
                DispatchOutcome::Sent { results } => notified = results.iter().any(|r| r.ok),
                DispatchOutcome::Throttled { .. } => throttled = true,
                DispatchOutcome::NoChannels => {}
            }
        }

        Ok(ExecOutcome {
            verdicts: vec![verdict],
            analysis: Some(text),
            notified,
            throttled,
        })
    }

    /// batch 模式：全部标的合进一次取数和一次分析，再把结论逐行对回标的。
    async fn execute_batch(
        &self,
        agent: &agent_definition::Model,
        instruments: &[instrument::Model],
        config: &ExecutionConfig,
        logs: &mut RunLog,
    ) -> Result<ExecOutcome, RunError> {
        let symbols: Vec<String> = instruments.iter().map(|i| i.symbol.clone()).collect();
        let items = self.gather_data(&agent.name, &symbols, logs).await?;
        let text = self.analyze(agent, instruments, &items, config, logs).await?;

        let verdicts = classify_batch(&text, instruments);
        let alerting = verdicts.iter().filter(|v| v.should_alert).count();

        let mut notified = false;
        let mut throttled = false;
        if alerting > 0 {
            let title = format!("【{}】{} 只股票需要关注", agent.display_name, alerting);
            let message = AlertMessage::new(title, text.trim());
            match self
                .dispatcher
                .dispatch(
                    &agent.name,
                    BATCH_DIGEST_KEY,
                    &config.notify_channel_ids,
                    &message,
                    config.bypass_throttle,
                    logs,
                )
                .await?
            {
                DispatchOutcome::Sent { results } => notified = results.iter().any(|r| r.ok),
                DispatchOutcome::Throttled { .. } => throttled = true,
                DispatchOutcome::NoChannels => {}
            }
        }

        Ok(ExecOutcome {
            verdicts,
            analysis: Some(text),
            notified,
            throttled,
        })
    }

    /// 按取数计划过一遍路由。必需能力失败或为空整次终止，
    /// 可选能力失败只在轨迹里留痕然后降级继续。
    async fn gather_data(
        &self,
        agent_name: &str,
        symbols: &[String],
        logs: &mut RunLog,
    ) -> Result<Vec<DataItem>, RunError> {
        let plan = context::capability_plan(agent_name);
        let mut items = Vec::new();

        for capability in &plan.required {
            match self.router.fetch(*capability, symbols).await {
                Ok(success) => {
                    logs.extend(success.logs.into_entries());
                    if success.items.is_empty() {
                        return Err(RunError::data_unavailable(format!(
                            "{}数据为空",
                            capability.label()
                        )));
                    }
                    items.extend(success.items);
                }
                Err(e) => {
                    let message = e.to_string();
                    logs.extend(e.logs.into_entries());
                    return Err(RunError::data_unavailable(message));
                }
            }
        }

        for capability in &plan.optional {
            match self.router.fetch(*capability, symbols).await {
                Ok(success) => {
                    logs.extend(success.logs.into_entries());
                    items.extend(success.items);
                }
                Err(e) => {
                    warn!("⚠ 可选{}数据获取失败，降级继续", capability.label());
                    logs.extend(e.logs.into_entries());
                }
            }
        }
        Ok(items)
    }

    async fn analyze(
        &self,
        agent: &agent_definition::Model,
        instruments: &[instrument::Model],
        items: &[DataItem],
        config: &ExecutionConfig,
        logs: &mut RunLog,
    ) -> Result<String, RunError> {
        let model_row = self.pick_model(config.ai_model_id).await?;
        let provider = self
            .providers
            .build(&model_row)
            .map_err(|e| RunError::config(e.to_string()))?;

        let system = context::system_prompt(&agent.name);
        let (user, images) = context::build_user_prompt(
            &agent.name,
            &PromptInput {
                instruments,
                items,
                agent_config: &config.agent_config,
                now: Local::now(),
            },
        );
        let mut request = AnalysisRequest::new(&model_row.model_name, system, user);
        request.images = images;

        logs.push(LogEntry::start(
            "AI",
            format!("开始分析（模型 [{}]）", model_row.name),
        ));
        let started = Instant::now();
        match analyze_with_retry(provider.as_ref(), request).await {
            Ok(resp) => {
                let elapsed = started.elapsed().as_millis() as i64;
                info!("✓ AI 分析完成，模型 [{}]，耗时 {}ms", model_row.name, elapsed);
                logs.push(LogEntry::success("AI", "分析完成", elapsed, 1));
                Ok(resp.text)
            }
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as i64;
                logs.push(LogEntry::error("AI", e.to_string(), elapsed));
                Err(RunError::analysis(e.to_string()))
            }
        }
    }

    /// 模型兜底链：指定模型 > 系统默认 > 第一个启用的。
    /// 指定的模型失效只告警不失败，给换模型或删模型留余地。
    async fn pick_model(&self, preferred: Option<i32>) -> Result<ai_model::Model, RunError> {
        if let Some(id) = preferred {
            match AiModelRepository::get(&self.db, id).await? {
                Some(m) if m.enabled => return Ok(m),
                Some(m) => warn!("⚠ 配置的 AI 模型 [{}] 已停用，改用默认模型", m.name),
                None => warn!("⚠ 配置的 AI 模型 id={} 不存在，改用默认模型", id),
            }
        }
        if let Some(m) = AiModelRepository::get_default(&self.db).await? {
            return Ok(m);
        }
        if let Some(m) = AiModelRepository::first_enabled(&self.db).await? {
            return Ok(m);
        }
        Err(RunError::config("没有可用的 AI 模型"))
    }

    async fn seal_report(
        &self,
        agent_name: &str,
        instrument_symbol: Option<String>,
        outcome: Result<ExecOutcome, RunError>,
        started: Instant,
        logs: RunLog,
    ) -> RunReport {
        let duration_ms = started.elapsed().as_millis() as i64;
        let report = match outcome {
            Ok(exec) => {
                let status = if exec.verdicts.iter().any(|v| v.should_alert) {
                    RunStatus::Done
                } else {
                    RunStatus::NoAlert
                };
                RunReport {
                    agent_name: agent_name.to_string(),
                    instrument_symbol,
                    status,
                    verdicts: exec.verdicts,
                    analysis: exec.analysis,
                    error: None,
                    notified: exec.notified,
                    throttled: exec.throttled,
                    duration_ms,
                    logs,
                }
            }
            Err(e) => {
                warn!("✗ Agent {} 运行失败: {}", agent_name, e);
                RunReport {
                    agent_name: agent_name.to_string(),
                    instrument_symbol,
                    status: RunStatus::Failed,
                    verdicts: Vec::new(),
                    analysis: None,
                    error: Some(e),
                    notified: false,
                    throttled: false,
                    duration_ms,
                    logs,
                }
            }
        };
        self.persist(&report).await;
        report
    }

    /// 历史记录落库失败不影响本次汇报，只告警
    async fn persist(&self, report: &RunReport) {
        let result = if report.verdicts.is_empty() && report.analysis.is_none() {
            None
        } else {
            Some(serde_json::json!({
                "verdicts": report.verdicts,
                "notified": report.notified,
                "throttled": report.throttled,
            }))
        };
        let error = report.error.as_ref().map(|e| e.to_string());
        if let Err(e) = RunRepository::append(
            &self.db,
            &report.agent_name,
            report.instrument_symbol.clone(),
            report.status.as_str(),
            result,
            error,
            report.duration_ms,
            Some(report.logs.to_json()),
        )
        .await
        {
            warn!("⚠ 运行记录写入失败: {}", e);
        }
    }
}

fn single_title(
    agent: &agent_definition::Model,
    stock: &instrument::Model,
    items: &[DataItem],
) -> String {
    let quote = items.iter().find_map(|item| match item {
        DataItem::Quote(q) if q.symbol == stock.symbol => Some(q),
        _ => None,
    });
    match quote {
        Some(q) => format!("【{}】{} {:+.2}%", agent.display_name, stock.name, q.change_pct),
        None => format!("【{}】{}", agent.display_name, stock.name),
    }
}

async fn analyze_with_retry(
    provider: &dyn AnalysisProvider,
    request: AnalysisRequest,
) -> Result<AnalysisResponse, AnalysisError> {
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(ANALYSIS_TIMEOUT, provider.analyze(request.clone()))
            .await
        {
            Ok(inner) => inner,
            Err(_) => Err(AnalysisError::Timeout),
        };
        match result {
            Err(e) if e.is_transient() && attempt < ANALYSIS_RETRIES => {
                attempt += 1;
                let delay = backoff_delay(attempt);
                warn!(
                    "✗ AI 分析失败，{}ms 后第 {} 次重试: {}",
                    delay.as_millis(),
                    attempt,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

// 指数退避（最简：base=1s，cap=8s，带少量 jitter）
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = (1000u64 << (attempt - 1).min(3)).min(8_000);
    let jitter = (base_ms / 5) * (rand::random::<u8>() as u64 % 5) / 5;
    Duration::from_millis(base_ms + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::model::{Action, RunErrorKind};
    use crate::market::provider::SourceDispatch;
    use crate::market::types::{Candle, FetchRequest, KlineData, QuoteData, SourceError};
    use crate::notify::types::{ChannelError, SenderDispatch};
    use crate::runlog::LogPhase;
    use crate::storage::entity::{data_source_binding, notify_channel};
    use crate::storage::establish_connection;
    use crate::storage::repository::{ChannelRepository, DataSourceRepository};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CannedSource {
        fail_symbols: HashSet<String>,
    }

    #[async_trait]
    impl SourceDispatch for CannedSource {
        async fn call(
            &self,
            binding: &data_source_binding::Model,
            request: &FetchRequest,
        ) -> Result<Vec<DataItem>, SourceError> {
            if request.symbols.iter().any(|s| self.fail_symbols.contains(s)) {
                return Err(SourceError::Unavailable("模拟断线".to_string()));
            }
            match binding.source_type.as_str() {
                "quote" => Ok(request
                    .symbols
                    .iter()
                    .map(|s| {
                        DataItem::Quote(QuoteData {
                            symbol: s.clone(),
                            name: format!("股票{}", s),
                            price: 95.8,
                            prev_close: 100.0,
                            open: 99.5,
                            high: 100.2,
                            low: 95.0,
                            volume: 120000.0,
                            change_pct: -4.2,
                        })
                    })
                    .collect()),
                "kline" => Ok(request
                    .symbols
                    .iter()
                    .map(|s| {
                        DataItem::Kline(KlineData {
                            symbol: s.clone(),
                            period: "day".to_string(),
                            candles: vec![Candle {
                                date: "2025-06-02".to_string(),
                                open: 99.5,
                                close: 95.8,
                                high: 100.2,
                                low: 95.0,
                                volume: 120000.0,
                            }],
                        })
                    })
                    .collect()),
                _ => Ok(Vec::new()),
            }
        }
    }

    struct CannedProvider {
        answer: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AnalysisProvider for CannedProvider {
        async fn analyze(&self, _req: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AnalysisResponse {
                text: self.answer.clone(),
                raw: Some(serde_json::json!({}).to_string()),
            })
        }
    }

    struct CannedFactory {
        answer: String,
        calls: Arc<AtomicUsize>,
    }

    impl ProviderFactory for CannedFactory {
        fn build(
            &self,
            _model: &ai_model::Model,
        ) -> Result<Arc<dyn AnalysisProvider>, AnalysisError> {
            Ok(Arc::new(CannedProvider {
                answer: self.answer.clone(),
                calls: self.calls.clone(),
            }))
        }
    }

    struct RecordingSender {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SenderDispatch for RecordingSender {
        async fn send(
            &self,
            channel: &notify_channel::Model,
            message: &AlertMessage,
        ) -> Result<(), ChannelError> {
            self.sent
                .lock()
                .unwrap()
                .push(format!("{}|{}", channel.name, message.title));
            Ok(())
        }
    }

    struct Rig {
        db: DatabaseConnection,
        executor: AgentExecutor,
        sender: Arc<RecordingSender>,
        ai_calls: Arc<AtomicUsize>,
    }

    async fn rig(
        db_name: &str,
        agent: (&str, &str, &str),
        answer: &str,
        fail_symbols: &[&str],
    ) -> Rig {
        let url = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);
        let db = establish_connection(&url).await.unwrap();

        let (name, display, mode) = agent;
        AgentRepository::upsert_builtin(
            &db,
            name,
            display,
            "测试用",
            true,
            "*/5 9-15 * * 1-5",
            mode,
            None,
        )
        .await
        .unwrap();

        AiModelRepository::create(
            &db,
            "默认模型",
            "openai_compat",
            "gpt-test",
            "sk-test",
            Some("https://example.test/v1".to_string()),
        )
        .await
        .unwrap();

        let channel = ChannelRepository::create(&db, "测试通道", "bark", serde_json::json!({}))
            .await
            .unwrap();
        ChannelRepository::set_default(&db, channel.id).await.unwrap();

        DataSourceRepository::upsert_preset(
            &db, "行情源", "quote", "tencent", None, true, 0, true, &["600519"],
        )
        .await
        .unwrap();
        DataSourceRepository::upsert_preset(
            &db, "K线源", "kline", "tencent", None, true, 0, false, &["600519"],
        )
        .await
        .unwrap();

        let source = Arc::new(CannedSource {
            fail_symbols: fail_symbols.iter().map(|s| s.to_string()).collect(),
        });
        let router = DataSourceRouter::new(db.clone(), source);
        let sender = Arc::new(RecordingSender {
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = NotificationDispatcher::new(db.clone(), sender.clone());
        let ai_calls = Arc::new(AtomicUsize::new(0));
        let factory = Arc::new(CannedFactory {
            answer: answer.to_string(),
            calls: ai_calls.clone(),
        });
        let executor = AgentExecutor::new(db.clone(), router, dispatcher, factory);

        Rig {
            db,
            executor,
            sender,
            ai_calls,
        }
    }

    async fn enroll_stock(rig: &Rig, agent: &str, symbol: &str, name: &str) -> instrument::Model {
        let stock = InstrumentRepository::insert(&rig.db, symbol, name, "CN")
            .await
            .unwrap()
            .unwrap();
        BindingRepository::enroll(&rig.db, stock.id, agent).await.unwrap();
        stock
    }

    #[tokio::test]
    async fn intraday_sell_alert_goes_end_to_end() {
        let rig = rig(
            "exec_sell",
            ("intraday_monitor", "盘中监测", "single"),
            "卖出。跌破止损位，建议注意风险。",
            &[],
        )
        .await;
        enroll_stock(&rig, "intraday_monitor", "600519", "贵州茅台").await;

        let reports = rig
            .executor
            .run_agent("intraday_monitor", &RuntimeOverride::default())
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.status, RunStatus::Done);
        assert_eq!(report.verdicts[0].action, Action::Sell);
        assert!(report.verdicts[0].should_alert);
        assert!(report.notified);
        assert!(!report.throttled);
        assert_eq!(report.instrument_symbol.as_deref(), Some("600519"));

        // 推送标题带涨跌幅
        let sent = rig.sender.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("【盘中监测】贵州茅台 -4.20%"));

        // 轨迹含取数和 AI 两个阶段
        let actors: Vec<&str> = report.logs.entries().iter().map(|e| e.actor.as_str()).collect();
        assert!(actors.contains(&"行情源"));
        assert!(actors.contains(&"AI"));

        // 运行记录落库
        let rows = RunRepository::recent(&rig.db, Some("intraday_monitor"), 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "done");
        assert_eq!(rows[0].instrument_symbol.as_deref(), Some("600519"));
    }

    #[tokio::test]
    async fn no_alert_marker_keeps_quiet() {
        let rig = rig(
            "exec_quiet",
            ("intraday_monitor", "盘中监测", "single"),
            "[无需提醒] 持有观察，波动在正常范围内。",
            &[],
        )
        .await;
        enroll_stock(&rig, "intraday_monitor", "600519", "贵州茅台").await;

        let reports = rig
            .executor
            .run_agent("intraday_monitor", &RuntimeOverride::default())
            .await
            .unwrap();

        assert_eq!(reports[0].status, RunStatus::NoAlert);
        assert!(!reports[0].notified);
        assert!(rig.sender.sent.lock().unwrap().is_empty());

        let rows = RunRepository::recent(&rig.db, None, 10).await.unwrap();
        assert_eq!(rows[0].status, "no_alert");
    }

    #[tokio::test]
    async fn single_mode_isolates_per_instrument_failures() {
        let rig = rig(
            "exec_isolate",
            ("intraday_monitor", "盘中监测", "single"),
            "卖出。",
            &["300750"],
        )
        .await;
        enroll_stock(&rig, "intraday_monitor", "600519", "贵州茅台").await;
        enroll_stock(&rig, "intraday_monitor", "300750", "宁德时代").await;

        let reports = rig
            .executor
            .run_agent("intraday_monitor", &RuntimeOverride::default())
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].status, RunStatus::Done);
        let failed = &reports[1];
        assert_eq!(failed.status, RunStatus::Failed);
        let error = failed.error.as_ref().unwrap();
        assert_eq!(error.kind, RunErrorKind::DataUnavailable);
        // 失败标的的轨迹里有数据源的 error 记录
        assert!(failed
            .logs
            .entries()
            .iter()
            .any(|e| e.phase == LogPhase::Error));

        // 两条运行记录都在
        let rows = RunRepository::recent(&rig.db, None, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn batch_mode_runs_one_analysis_pass() {
        let rig = rig(
            "exec_batch",
            ("daily_report", "每日报告", "batch"),
            "600519 贵州茅台：持有，量能平稳。\n300750 宁德时代：减仓，高位放量滞涨。",
            &[],
        )
        .await;
        enroll_stock(&rig, "daily_report", "600519", "贵州茅台").await;
        enroll_stock(&rig, "daily_report", "300750", "宁德时代").await;

        let reports = rig
            .executor
            .run_agent("daily_report", &RuntimeOverride::default())
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(rig.ai_calls.load(Ordering::SeqCst), 1);

        let report = &reports[0];
        assert!(report.instrument_symbol.is_none());
        assert_eq!(report.verdicts.len(), 2);
        assert_eq!(report.verdicts[0].action, Action::Hold);
        assert_eq!(report.verdicts[1].action, Action::Reduce);
        assert_eq!(report.status, RunStatus::Done);
        assert!(report.notified);

        // 摘要标题只统计需要关注的标的
        let sent = rig.sender.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("【每日报告】2 只股票需要关注"));
    }

    #[tokio::test]
    async fn unknown_agent_is_a_config_error() {
        let rig = rig(
            "exec_unknown",
            ("intraday_monitor", "盘中监测", "single"),
            "卖出。",
            &[],
        )
        .await;

        let err = rig
            .executor
            .run_agent("no_such_agent", &RuntimeOverride::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, RunErrorKind::Config);
        assert!(err.message.contains("未知 Agent"));
    }

    #[tokio::test]
    async fn bad_runtime_schedule_leaves_no_trace() {
        let rig = rig(
            "exec_badcron",
            ("intraday_monitor", "盘中监测", "single"),
            "卖出。",
            &[],
        )
        .await;
        enroll_stock(&rig, "intraday_monitor", "600519", "贵州茅台").await;

        let runtime = RuntimeOverride {
            schedule: Some("每五分钟".to_string()),
            ..Default::default()
        };
        let err = rig
            .executor
            .run_agent("intraday_monitor", &runtime)
            .await
            .unwrap_err();
        assert_eq!(err.kind, RunErrorKind::Config);

        // 配置错误不产生任何副作用
        assert!(rig.sender.sent.lock().unwrap().is_empty());
        assert!(RunRepository::recent(&rig.db, None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_required_source_fails_the_run() {
        // news_digest 必需资讯源，rig 只种了行情和K线
        let rig = rig(
            "exec_nosource",
            ("news_digest", "资讯摘要", "batch"),
            "卖出。",
            &[],
        )
        .await;
        enroll_stock(&rig, "news_digest", "600519", "贵州茅台").await;

        let reports = rig
            .executor
            .run_agent("news_digest", &RuntimeOverride::default())
            .await
            .unwrap();

        let report = &reports[0];
        assert_eq!(report.status, RunStatus::Failed);
        let error = report.error.as_ref().unwrap();
        assert_eq!(error.kind, RunErrorKind::DataUnavailable);
        assert!(rig.ai_calls.load(Ordering::SeqCst) == 0);
        assert!(report
            .logs
            .entries()
            .iter()
            .any(|e| e.message.contains("没有启用的资讯数据源")));
    }

    #[tokio::test]
    async fn optional_source_failure_degrades_gracefully() {
        // daily_report 的资讯是可选能力，没有资讯源照样跑完
        let rig = rig(
            "exec_degrade",
            ("daily_report", "每日报告", "batch"),
            "600519 贵州茅台：[无需提醒] 持有。",
            &[],
        )
        .await;
        enroll_stock(&rig, "daily_report", "600519", "贵州茅台").await;

        let reports = rig
            .executor
            .run_agent("daily_report", &RuntimeOverride::default())
            .await
            .unwrap();

        assert_eq!(reports[0].status, RunStatus::NoAlert);
        assert_eq!(rig.ai_calls.load(Ordering::SeqCst), 1);
        // 可选能力的失败轨迹保留
        assert!(reports[0]
            .logs
            .entries()
            .iter()
            .any(|e| e.message.contains("没有启用的资讯数据源")));
    }

    #[tokio::test]
    async fn second_alert_in_window_is_throttled_until_bypassed() {
        let rig = rig(
            "exec_throttle",
            ("intraday_monitor", "盘中监测", "single"),
            "卖出。",
            &[],
        )
        .await;
        enroll_stock(&rig, "intraday_monitor", "600519", "贵州茅台").await;

        let first = rig
            .executor
            .run_agent("intraday_monitor", &RuntimeOverride::default())
            .await
            .unwrap();
        assert!(first[0].notified);

        let second = rig
            .executor
            .run_agent("intraday_monitor", &RuntimeOverride::default())
            .await
            .unwrap();
        assert!(second[0].throttled);
        assert!(!second[0].notified);
        assert_eq!(second[0].status, RunStatus::Done);
        assert_eq!(rig.sender.sent.lock().unwrap().len(), 1);

        // 手动旁路立即放行
        let runtime = RuntimeOverride {
            bypass_throttle: true,
            ..Default::default()
        };
        let third = rig
            .executor
            .run_agent("intraday_monitor", &runtime)
            .await
            .unwrap();
        assert!(third[0].notified);
        assert_eq!(rig.sender.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn manual_instrument_trigger_works_without_binding() {
        let rig = rig(
            "exec_adhoc",
            ("intraday_monitor", "盘中监测", "single"),
            "卖出。",
            &[],
        )
        .await;
        // 只收录不绑定
        InstrumentRepository::insert(&rig.db, "601127", "赛力斯", "CN")
            .await
            .unwrap()
            .unwrap();

        let report = rig
            .executor
            .run_instrument("intraday_monitor", "601127", &RuntimeOverride::default())
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Done);
        assert_eq!(report.instrument_symbol.as_deref(), Some("601127"));

        let err = rig
            .executor
            .run_instrument("intraday_monitor", "999999", &RuntimeOverride::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, RunErrorKind::Config);
        assert!(err.message.contains("未收录"));
    }
}
