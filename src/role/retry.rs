//! 失败回退策略
//!
//! 重试沿「主模型 + fallback_sequence」的链依次换模型，链耗尽即放弃；
//! 只有可重试类错误（ActionFailure / ActionTimeout / ConnectivityError）
//! 才进入回退，合规拒绝等语义性失败立即放弃。

use serde::{Deserialize, Serialize};

use crate::core::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackPolicy {
    /// 主模型失败后依次尝试的后备模型
    #[serde(default)]
    pub fallback_sequence: Vec<String>,
    /// 关闭后任何失败都不重试
    #[serde(default = "default_retry_on_failure")]
    pub retry_on_failure: bool,
}

fn default_retry_on_failure() -> bool {
    true
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            fallback_sequence: Vec::new(),
            retry_on_failure: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// 换用指定模型再试一次
    Retry { model: String },
    GiveUp,
}

impl FallbackPolicy {
    /// 完整尝试链：主模型在前，后备模型依序在后
    pub fn chain(&self, primary: &str) -> Vec<String> {
        let mut chain = Vec::with_capacity(1 + self.fallback_sequence.len());
        chain.push(primary.to_string());
        chain.extend(self.fallback_sequence.iter().cloned());
        chain
    }

    /// 根据失败原因与已用尝试数裁决下一步；attempts_used 含刚失败的这一次
    pub fn decide(&self, error: &EngineError, primary: &str, attempts_used: usize) -> RetryDecision {
        if !self.retry_on_failure || !error.is_retryable() {
            return RetryDecision::GiveUp;
        }
        match self.chain(primary).get(attempts_used) {
            Some(model) => RetryDecision::Retry {
                model: model.clone(),
            },
            None => RetryDecision::GiveUp,
        }
    }
}
