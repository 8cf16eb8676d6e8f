pub mod agent_definition;
pub mod agent_run;
pub mod ai_model;
pub mod data_source_binding;
pub mod instrument;
pub mod instrument_agent_binding;
pub mod notify_channel;
pub mod throttle_state;

pub use agent_definition::Entity as AgentDefinition;
pub use agent_run::Entity as AgentRun;
pub use ai_model::Entity as AiModel;
pub use data_source_binding::Entity as DataSourceBinding;
pub use instrument::Entity as Instrument;
pub use instrument_agent_binding::Entity as InstrumentAgentBinding;
pub use notify_channel::Entity as NotifyChannel;
pub use throttle_state::Entity as ThrottleState;
