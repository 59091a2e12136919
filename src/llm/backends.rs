//! 后端注册表
//!
//! 按模型标识注册 LlmClient，角色回退链（primary + fallback_sequence）从这里解析；
//! 链中模型是否全部注册由 EnvironmentBuilder 在启动期校验。

use std::collections::HashMap;
use std::sync::Arc;

use crate::llm::LlmClient;

/// 模型标识 -> 客户端 的注册表
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn LlmClient>>,
    default_model: String,
}

impl BackendRegistry {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            backends: HashMap::new(),
            default_model: default_model.into(),
        }
    }

    pub fn register(&mut self, model: impl Into<String>, client: Arc<dyn LlmClient>) {
        self.backends.insert(model.into(), client);
    }

    pub fn get(&self, model: &str) -> Option<Arc<dyn LlmClient>> {
        self.backends.get(model).cloned()
    }

    pub fn contains(&self, model: &str) -> bool {
        self.backends.contains_key(model)
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn models(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    /// 所有后端的累计 token 用量之和：(prompt, completion, total)
    pub fn total_token_usage(&self) -> (u64, u64, u64) {
        let mut acc = (0u64, 0u64, 0u64);
        for client in self.backends.values() {
            let (p, c, t) = client.token_usage();
            acc.0 += p;
            acc.1 += c;
            acc.2 += t;
        }
        acc
    }
}
