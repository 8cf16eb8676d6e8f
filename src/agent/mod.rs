pub mod classify;
pub mod context;
pub mod executor;
pub mod model;

pub use classify::{classify_batch, classify_single};
pub use executor::AgentExecutor;
pub use model::{Action, RunError, RunErrorKind, RunReport, RunStatus, Verdict};
