//! 引擎错误类型
//!
//! 与角色回退策略配合：ActionFailure / ActionTimeout / ConnectivityError 可按 FallbackPolicy 重试，
//! PolicyViolation 永不自动重试，ConfigurationError 仅在启动期出现并阻止启动。

use thiserror::Error;

use crate::llm::LlmError;

/// 引擎运行过程中可能出现的错误（执行、超时、门控、配置、取消等）
#[derive(Error, Debug)]
pub enum EngineError {
    /// 动作执行失败（可按回退策略重试）
    #[error("Action failed: {0}")]
    ActionFailure(String),

    /// 动作超时（ActionFailure 的可重试子类）
    #[error("Action timed out after {0}s")]
    ActionTimeout(u64),

    /// 合规门控拒绝；需要修改提案，永不自动重试
    #[error("Policy violation: compliance {score:.2} below minimum {minimum:.2}")]
    PolicyViolation { score: f64, minimum: f64 },

    /// 角色没有可执行的动作；回到 IDLE，不向上抛
    #[error("No eligible action")]
    NoEligibleAction,

    /// 外部协作方不可达（与内容拒绝区分，便于切换供应商）
    #[error("Connectivity error: {0}")]
    ConnectivityError(String),

    /// 启动期配置错误（权重不合法、重复注册、回退模型未注册等）
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// 调用方参数错误（如 max_concurrent < 1）
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 非法生命周期迁移（状态机拒绝）
    #[error("Illegal lifecycle transition: {0}")]
    IllegalTransition(String),

    #[error("Cancelled")]
    Cancelled,

    /// 存储不可用：对单次操作致命，对进程不致命
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// 预算用尽（LLM 调用次数超过上限）
    #[error("Budget exhausted: spent {spent} of {limit} LLM calls")]
    BudgetExhausted { spent: u64, limit: u64 },
}

impl EngineError {
    /// 是否可按回退策略重试（PolicyViolation / 配置类错误不可）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ActionFailure(_)
                | EngineError::ActionTimeout(_)
                | EngineError::ConnectivityError(_)
        )
    }
}

impl From<LlmError> for EngineError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Connectivity(msg) => EngineError::ConnectivityError(msg),
            LlmError::RateLimited { retry_after_ms } => {
                EngineError::ActionFailure(format!("rate limited, retry after {retry_after_ms}ms"))
            }
            LlmError::ContentRejected(msg) => {
                EngineError::ActionFailure(format!("content rejected: {msg}"))
            }
            LlmError::Backend(msg) => EngineError::ActionFailure(msg),
        }
    }
}
