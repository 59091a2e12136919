//! LLM 客户端抽象
//!
//! 动作执行期对外部语言模型的唯一边界：complete(prompt, settings)。
//! 连通性错误与内容拒绝必须区分——前者可切换供应商，后者属于执行失败。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 模型调用参数（随配置传入，后端按需取用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    /// 每分钟请求上限；None 表示不限
    pub rate_limit: Option<u32>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.7,
            rate_limit: None,
        }
    }
}

/// LLM 边界错误：调用方据此决定重试还是切换供应商
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 不可达（DNS / 连接拒绝 / 网关超时）
    #[error("Connectivity: {0}")]
    Connectivity(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// 内容 / 安全策略拒绝（与连通性错误不同类）
    #[error("Content rejected: {0}")]
    ContentRejected(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// LLM 客户端 trait：所有后端（Mock 与未来的真实供应商）实现非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, prompt: &str, settings: &ModelSettings) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
