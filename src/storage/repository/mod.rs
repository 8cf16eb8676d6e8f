pub mod agent_repo;
pub mod ai_model_repo;
pub mod binding_repo;
pub mod channel_repo;
pub mod data_source_repo;
pub mod instrument_repo;
pub mod run_repo;
pub mod throttle_repo;

pub use agent_repo::AgentRepository;
pub use ai_model_repo::AiModelRepository;
pub use binding_repo::BindingRepository;
pub use channel_repo::ChannelRepository;
pub use data_source_repo::DataSourceRepository;
pub use instrument_repo::InstrumentRepository;
pub use run_repo::RunRepository;
pub use throttle_repo::ThrottleRepository;
