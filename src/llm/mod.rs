//! LLM 层：客户端抽象与实现（Mock / 后端注册表）

pub mod backends;
pub mod mock;
pub mod traits;

pub use backends::BackendRegistry;
pub use mock::MockLlmClient;
pub use traits::{LlmClient, LlmError, ModelSettings};
