use crate::storage::entity::{agent_definition, instrument_agent_binding};
use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Single,
    Batch,
}

impl ExecutionMode {
    pub fn parse(text: &str) -> ExecutionMode {
        match text {
            "single" => ExecutionMode::Single,
            _ => ExecutionMode::Batch,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Single => "single",
            ExecutionMode::Batch => "batch",
        }
    }
}

/// 手动触发时携带的运行期覆盖，优先级最高
#[derive(Debug, Clone, Default)]
pub struct RuntimeOverride {
    pub bypass_throttle: bool,
    pub schedule: Option<String>,
    pub ai_model_id: Option<i32>,
    pub notify_channel_ids: Option<Vec<i32>>,
}

/// 一次执行生效的配置快照。
/// ai_model_id 为 None 时在执行阶段走模型注册表兜底；
/// notify_channel_ids 为空时由默认通道补位。
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub agent_name: String,
    pub schedule: String,
    pub execution_mode: ExecutionMode,
    pub ai_model_id: Option<i32>,
    pub notify_channel_ids: Vec<i32>,
    pub bypass_throttle: bool,
    pub agent_config: serde_json::Value,
}

/// 三层配置合并：运行期覆盖 > 绑定覆盖（非空） > Agent 默认。
/// 通道列表是整体替换而不是并集，保证「谁会收到通知」只看一层配置。
pub fn resolve(
    agent: &agent_definition::Model,
    binding: Option<&instrument_agent_binding::Model>,
    runtime: &RuntimeOverride,
) -> ExecutionConfig {
    let schedule = runtime
        .schedule
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            binding
                .and_then(|b| b.schedule.as_deref())
                .filter(|s| !s.trim().is_empty())
        })
        .unwrap_or(&agent.schedule)
        .to_string();

    let ai_model_id = runtime
        .ai_model_id
        .or_else(|| binding.and_then(|b| b.ai_model_id))
        .or(agent.ai_model_id);

    let notify_channel_ids = runtime
        .notify_channel_ids
        .clone()
        .filter(|ids| !ids.is_empty())
        .or_else(|| {
            binding
                .and_then(|b| decode_id_list(b.notify_channel_ids.as_deref()))
                .filter(|ids| !ids.is_empty())
        })
        .or_else(|| decode_id_list(agent.notify_channel_ids.as_deref()))
        .unwrap_or_default();

    ExecutionConfig {
        agent_name: agent.name.clone(),
        schedule,
        execution_mode: ExecutionMode::parse(&agent.execution_mode),
        ai_model_id,
        notify_channel_ids,
        bypass_throttle: runtime.bypass_throttle,
        agent_config: decode_config(agent.name.as_str(), agent.config.as_deref()),
    }
}

fn decode_id_list(raw: Option<&str>) -> Option<Vec<i32>> {
    let text = raw?.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<Vec<i32>>(text) {
        Ok(ids) => Some(ids),
        Err(e) => {
            warn!("⚠ 通道列表解析失败，按未配置处理: {} ({})", text, e);
            None
        }
    }
}

fn decode_config(agent_name: &str, raw: Option<&str>) -> serde_json::Value {
    match raw {
        Some(text) if !text.trim().is_empty() => match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("⚠ Agent {} 配置解析失败，使用空配置: {}", agent_name, e);
                serde_json::json!({})
            }
        },
        _ => serde_json::json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_row() -> agent_definition::Model {
        agent_definition::Model {
            id: 1,
            name: "intraday_monitor".to_string(),
            display_name: "盘中监测".to_string(),
            description: String::new(),
            enabled: true,
            schedule: "*/5 9-15 * * 1-5".to_string(),
            execution_mode: "single".to_string(),
            ai_model_id: Some(10),
            notify_channel_ids: Some("[1,2]".to_string()),
            config: Some(r#"{"throttle_minutes": 30}"#.to_string()),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn binding_row(
        schedule: Option<&str>,
        model: Option<i32>,
        channels: Option<&str>,
    ) -> instrument_agent_binding::Model {
        instrument_agent_binding::Model {
            id: 7,
            instrument_id: 3,
            agent_name: "intraday_monitor".to_string(),
            schedule: schedule.map(|s| s.to_string()),
            ai_model_id: model,
            notify_channel_ids: channels.map(|s| s.to_string()),
            created_at: 0,
        }
    }

    #[test]
    fn empty_binding_schedule_inherits_default() {
        let agent = agent_row();
        let binding = binding_row(Some(""), None, None);
        let config = resolve(&agent, Some(&binding), &RuntimeOverride::default());
        assert_eq!(config.schedule, agent.schedule);

        let config = resolve(&agent, None, &RuntimeOverride::default());
        assert_eq!(config.schedule, agent.schedule);
    }

    #[test]
    fn binding_schedule_wins_without_runtime_override() {
        let agent = agent_row();
        let binding = binding_row(Some("0 10 * * 1-5"), None, None);
        let config = resolve(&agent, Some(&binding), &RuntimeOverride::default());
        assert_eq!(config.schedule, "0 10 * * 1-5");
    }

    #[test]
    fn runtime_override_tops_everything() {
        let agent = agent_row();
        let binding = binding_row(Some("0 10 * * 1-5"), Some(20), None);
        let runtime = RuntimeOverride {
            bypass_throttle: true,
            schedule: Some("0 11 * * *".to_string()),
            ai_model_id: Some(30),
            notify_channel_ids: Some(vec![9]),
        };
        let config = resolve(&agent, Some(&binding), &runtime);
        assert_eq!(config.schedule, "0 11 * * *");
        assert_eq!(config.ai_model_id, Some(30));
        assert_eq!(config.notify_channel_ids, vec![9]);
        assert!(config.bypass_throttle);
    }

    #[test]
    fn channel_list_replaces_instead_of_merging() {
        let agent = agent_row();
        let binding = binding_row(None, None, Some("[5]"));
        let config = resolve(&agent, Some(&binding), &RuntimeOverride::default());
        // 不是 [1,2,5]，是整体替换
        assert_eq!(config.notify_channel_ids, vec![5]);
    }

    #[test]
    fn model_falls_back_layer_by_layer() {
        let agent = agent_row();
        let binding = binding_row(None, Some(20), None);
        let config = resolve(&agent, Some(&binding), &RuntimeOverride::default());
        assert_eq!(config.ai_model_id, Some(20));

        let binding = binding_row(None, None, None);
        let config = resolve(&agent, Some(&binding), &RuntimeOverride::default());
        assert_eq!(config.ai_model_id, Some(10));

        let mut agent = agent_row();
        agent.ai_model_id = None;
        let config = resolve(&agent, None, &RuntimeOverride::default());
        assert_eq!(config.ai_model_id, None);
    }

    #[test]
    fn bad_json_degrades_to_empty() {
        let mut agent = agent_row();
        agent.notify_channel_ids = Some("not-json".to_string());
        agent.config = Some("{broken".to_string());
        let config = resolve(&agent, None, &RuntimeOverride::default());
        assert!(config.notify_channel_ids.is_empty());
        assert_eq!(config.agent_config, serde_json::json!({}));
    }

    #[test]
    fn execution_mode_comes_from_agent_only() {
        let agent = agent_row();
        let config = resolve(&agent, None, &RuntimeOverride::default());
        assert_eq!(config.execution_mode, ExecutionMode::Single);

        let mut batch_agent = agent_row();
        batch_agent.execution_mode = "batch".to_string();
        let config = resolve(&batch_agent, None, &RuntimeOverride::default());
        assert_eq!(config.execution_mode, ExecutionMode::Batch);
    }
}
