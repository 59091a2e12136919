//! Mock LLM 客户端（用于测试与本地跑通，无需 API）
//!
//! 取 Prompt 的最后一个非空行（通常是触发消息的 payload），回显为确定性输出。

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, ModelSettings};

/// Mock 客户端：确定性回显，统计调用量
#[derive(Debug, Default)]
pub struct MockLlmClient {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str, _settings: &ModelSettings) -> Result<String, LlmError> {
        let last_line = prompt
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("(no input)")
            .trim();

        let output = format!("[mock] done: {last_line}");

        // 粗略按空白分词计数，足够做预算与用量展示
        self.prompt_tokens
            .fetch_add(prompt.split_whitespace().count() as u64, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(output.split_whitespace().count() as u64, Ordering::Relaxed);

        Ok(output)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        let prompt = self.prompt_tokens.load(Ordering::Relaxed);
        let completion = self.completion_tokens.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}
