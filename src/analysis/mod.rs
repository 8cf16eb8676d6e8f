pub mod dispatch;
pub mod gemini;
pub mod openai_compat;
pub mod types;

pub use dispatch::{AnyProvider, HttpProviderFactory, ProviderFactory};
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use types::{AnalysisError, AnalysisProvider, AnalysisRequest, AnalysisResponse, ImagePart};
