use crate::market::provider::SourceDispatch;
use crate::market::types::{CapabilityType, DataItem, FetchRequest, SourceError};
use crate::runlog::{LogEntry, RunLog};
use crate::storage::entity::data_source_binding;
use crate::storage::repository::DataSourceRepository;
use log::{info, warn};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Instant;

/// 某个数据源成功返回后的路由结果
#[derive(Debug)]
pub struct FetchSuccess {
    pub items: Vec<DataItem>,
    /// 实际提供数据的绑定名称
    pub served_by: String,
    pub logs: RunLog,
}

/// 所有候选源都试过仍没拿到数据。日志轨迹里有每一次尝试的起止和失败原因，
/// 测试连接界面渲染的就是这条轨迹。
#[derive(thiserror::Error, Debug)]
#[error("没有可用的{}数据源", source_type.label())]
pub struct NoProviderAvailable {
    pub source_type: CapabilityType,
    pub logs: RunLog,
}

/// 数据源路由：按 priority 升序逐个尝试启用的绑定，第一个成功者胜出。
/// 路由不关心批量拆分，那是调用层（分发注册表）的事。
pub struct DataSourceRouter {
    db: DatabaseConnection,
    dispatch: Arc<dyn SourceDispatch>,
}

impl DataSourceRouter {
    pub fn new(db: DatabaseConnection, dispatch: Arc<dyn SourceDispatch>) -> Self {
        Self { db, dispatch }
    }

    pub async fn fetch(
        &self,
        capability: CapabilityType,
        symbols: &[String],
    ) -> Result<FetchSuccess, NoProviderAvailable> {
        let bindings = match DataSourceRepository::enabled_by_type(&self.db, capability.as_str())
            .await
        {
            Ok(b) => b,
            Err(e) => {
                let mut logs = RunLog::new();
                logs.push(LogEntry::error(
                    "router",
                    format!("数据源查询失败: {}", e),
                    0,
                ));
                return Err(NoProviderAvailable {
                    source_type: capability,
                    logs,
                });
            }
        };

        route_over(self.dispatch.as_ref(), capability, &bindings, symbols).await
    }

    /// 探测单个绑定，测试连接入口用。成功与否都带完整轨迹。
    pub async fn probe(
        &self,
        binding: &data_source_binding::Model,
        symbols: &[String],
    ) -> (RunLog, Result<usize, String>) {
        let mut logs = RunLog::new();
        let request = FetchRequest::new(symbols);
        logs.push(LogEntry::start(
            &binding.name,
            format!("开始获取{}数据: {}", label_of(&binding.source_type), symbols.join(",")),
        ));
        let started = Instant::now();
        match self.dispatch.call(binding, &request).await {
            Ok(items) => {
                let elapsed = started.elapsed().as_millis() as i64;
                logs.push(LogEntry::success(
                    &binding.name,
                    format!("获取成功，{} 条数据", items.len()),
                    elapsed,
                    items.len(),
                ));
                (logs, Ok(items.len()))
            }
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as i64;
                logs.push(LogEntry::error(&binding.name, e.to_string(), elapsed));
                (logs, Err(e.to_string()))
            }
        }
    }
}

fn label_of(source_type: &str) -> &str {
    CapabilityType::parse(source_type)
        .map(|c| c.label())
        .unwrap_or(source_type)
}

/// 路由核心循环。绑定列表的顺序由存储层保证（priority 升序，id 升序打平），
/// 这里只负责逐个尝试并记录轨迹。
async fn route_over(
    dispatch: &dyn SourceDispatch,
    capability: CapabilityType,
    bindings: &[data_source_binding::Model],
    symbols: &[String],
) -> Result<FetchSuccess, NoProviderAvailable> {
    let mut logs = RunLog::new();

    if bindings.is_empty() {
        logs.push(LogEntry::error(
            "router",
            format!("没有启用的{}数据源", capability.label()),
            0,
        ));
        return Err(NoProviderAvailable {
            source_type: capability,
            logs,
        });
    }

    let request = FetchRequest::new(symbols);
    for binding in bindings {
        logs.push(LogEntry::start(
            &binding.name,
            format!("开始获取{}数据: {}", capability.label(), symbols.join(",")),
        ));
        let started = Instant::now();
        match dispatch.call(binding, &request).await {
            Ok(items) => {
                let elapsed = started.elapsed().as_millis() as i64;
                info!(
                    "✓ 数据源 [{}] {} 返回 {} 条，耗时 {}ms",
                    binding.name,
                    capability.as_str(),
                    items.len(),
                    elapsed
                );
                logs.push(LogEntry::success(
                    &binding.name,
                    format!("获取成功，{} 条数据", items.len()),
                    elapsed,
                    items.len(),
                ));
                return Ok(FetchSuccess {
                    items,
                    served_by: binding.name.clone(),
                    logs,
                });
            }
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as i64;
                warn!(
                    "✗ 数据源 [{}] {} 失败，切换下一个: {}",
                    binding.name,
                    capability.as_str(),
                    e
                );
                logs.push(LogEntry::error(&binding.name, e.to_string(), elapsed));
            }
        }
    }

    Err(NoProviderAvailable {
        source_type: capability,
        logs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::{QuoteData, SourceError as SE};
    use crate::runlog::LogPhase;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct ScriptedDispatch {
        fail_names: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedDispatch {
        fn new(fail_names: &[&str]) -> Self {
            Self {
                fail_names: fail_names.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SourceDispatch for ScriptedDispatch {
        async fn call(
            &self,
            binding: &data_source_binding::Model,
            request: &FetchRequest,
        ) -> Result<Vec<DataItem>, SE> {
            self.calls.lock().unwrap().push(binding.name.clone());
            if self.fail_names.contains(&binding.name) {
                return Err(SE::Unavailable("模拟故障".to_string()));
            }
            Ok(request
                .symbols
                .iter()
                .map(|s| {
                    DataItem::Quote(QuoteData {
                        symbol: s.clone(),
                        name: "测试".to_string(),
                        price: 10.0,
                        prev_close: 9.9,
                        open: 9.95,
                        high: 10.1,
                        low: 9.8,
                        volume: 1000.0,
                        change_pct: 1.01,
                    })
                })
                .collect())
        }
    }

    fn binding(id: i32, name: &str, priority: i32) -> data_source_binding::Model {
        data_source_binding::Model {
            id,
            name: name.to_string(),
            source_type: "quote".to_string(),
            provider: "tencent".to_string(),
            config: None,
            enabled: true,
            priority,
            supports_batch: true,
            test_symbols: None,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn first_failure_falls_through_to_next() {
        // A 已被存储层过滤（disabled），候选只有 B、C；B 失败后轮到 C
        let dispatch = ScriptedDispatch::new(&["B"]);
        let bindings = vec![binding(2, "B", 1), binding(3, "C", 2)];
        let symbols = vec!["600519".to_string()];

        let ok = route_over(&dispatch, CapabilityType::Quote, &bindings, &symbols)
            .await
            .unwrap();
        assert_eq!(ok.served_by, "C");
        assert_eq!(ok.items.len(), 1);
        assert_eq!(*dispatch.calls.lock().unwrap(), vec!["B", "C"]);

        // 轨迹：B start、B error、C start、C success
        let phases: Vec<(String, LogPhase)> = ok
            .logs
            .entries()
            .iter()
            .map(|e| (e.actor.clone(), e.phase))
            .collect();
        assert_eq!(
            phases,
            vec![
                ("B".to_string(), LogPhase::Start),
                ("B".to_string(), LogPhase::Error),
                ("C".to_string(), LogPhase::Start),
                ("C".to_string(), LogPhase::Success),
            ]
        );
        let success = &ok.logs.entries()[3];
        assert_eq!(success.count, Some(1));
        assert!(success.duration_ms.is_some());
    }

    #[tokio::test]
    async fn exhausted_candidates_return_full_trail() {
        let dispatch = ScriptedDispatch::new(&["B", "C"]);
        let bindings = vec![binding(2, "B", 1), binding(3, "C", 2)];
        let symbols = vec!["600519".to_string()];

        let err = route_over(&dispatch, CapabilityType::Quote, &bindings, &symbols)
            .await
            .unwrap_err();
        assert_eq!(err.source_type, CapabilityType::Quote);
        assert_eq!(err.logs.entries().len(), 4);
        assert!(err.to_string().contains("行情"));
        let error_messages: Vec<&str> = err
            .logs
            .entries()
            .iter()
            .filter(|e| e.phase == LogPhase::Error)
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(error_messages.len(), 2);
        assert!(error_messages.iter().all(|m| m.contains("模拟故障")));
    }

    #[tokio::test]
    async fn no_enabled_binding_short_circuits() {
        let dispatch = ScriptedDispatch::new(&[]);
        let err = route_over(&dispatch, CapabilityType::News, &[], &["600519".to_string()])
            .await
            .unwrap_err();
        assert!(dispatch.calls.lock().unwrap().is_empty());
        assert_eq!(err.logs.entries().len(), 1);
        assert!(err.logs.entries()[0].message.contains("没有启用的"));
    }

    #[tokio::test]
    async fn zero_items_still_counts_as_success() {
        struct EmptyDispatch;
        #[async_trait]
        impl SourceDispatch for EmptyDispatch {
            async fn call(
                &self,
                _binding: &data_source_binding::Model,
                _request: &FetchRequest,
            ) -> Result<Vec<DataItem>, SE> {
                Ok(Vec::new())
            }
        }
        let bindings = vec![binding(1, "B", 0)];
        let ok = route_over(
            &EmptyDispatch,
            CapabilityType::News,
            &bindings,
            &["600519".to_string()],
        )
        .await
        .unwrap();
        assert!(ok.items.is_empty());
        assert_eq!(ok.logs.entries()[1].count, Some(0));
    }
}
