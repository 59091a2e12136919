//! 动作执行器
//!
//! 持有后端注册表与全局超时，execute(spec, ctx) 渲染提示词后在超时内调用所选模型，
//! 超时或失败时转为 EngineError（ActionTimeout / ActionFailure 等）；每次调用输出
//! 结构化审计日志（JSON），并累计 LLM 调用数供预算核算。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::action::ActionSpec;
use crate::core::EngineError;
use crate::llm::{BackendRegistry, ModelSettings};
use crate::memory::Message;

/// 角色前缀模板：所有提示词的第一行
pub const ROLE_PREFIX_TEMPLATE: &str =
    "You are a {profile}, named {name}, your goal is {goal}, and the constraint is {constraints}.";

/// 一次动作执行的角色侧上下文：身份 + 记忆摘录 + 触发消息
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub role_name: String,
    pub profile: String,
    pub goal: String,
    pub constraints: String,
    /// 角色近期记忆的 payload 摘录，旧在前
    pub history: Vec<String>,
    pub trigger: Message,
}

/// 渲染完整提示词：角色前缀 + 任务段（描述或模板）+ 历史 + 触发消息
pub fn build_prompt(spec: &ActionSpec, ctx: &ActionContext) -> String {
    let prefix = ROLE_PREFIX_TEMPLATE
        .replace("{profile}", &ctx.profile)
        .replace("{name}", &ctx.role_name)
        .replace("{goal}", &ctx.goal)
        .replace("{constraints}", &ctx.constraints);

    let history = ctx.history.join("\n");
    let task = match &spec.prompt_template {
        Some(template) => template
            .replace("{payload}", &ctx.trigger.payload)
            .replace("{history}", &history),
        None => spec.description.clone(),
    };

    format!(
        "{prefix}\n\n## Task\n{task}\n\n## History\n{history}\n\n## Trigger\n{payload}",
        payload = ctx.trigger.payload
    )
}

/// 动作执行器：对每次模型调用施加超时，并将结果映射为 EngineError
pub struct ActionRunner {
    backends: Arc<BackendRegistry>,
    settings: ModelSettings,
    timeout: Duration,
    calls: AtomicU64,
}

impl ActionRunner {
    pub fn new(backends: Arc<BackendRegistry>, settings: ModelSettings, timeout_secs: u64) -> Self {
        Self {
            backends,
            settings,
            timeout: Duration::from_secs(timeout_secs),
            calls: AtomicU64::new(0),
        }
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 已发起的 LLM 调用数（含失败与超时的尝试）
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// 用指定模型执行动作；取消立即返回 Cancelled，超时返回 ActionTimeout，
    /// 模型错误按可重试性映射；输出 JSON 审计日志
    pub async fn execute(
        &self,
        spec: &ActionSpec,
        ctx: &ActionContext,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let client = self.backends.get(model).ok_or_else(|| {
            EngineError::ConnectivityError(format!("unknown model backend: {model}"))
        })?;

        let prompt = build_prompt(spec, ctx);
        let start = Instant::now();
        self.calls.fetch_add(1, Ordering::Relaxed);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = timeout(self.timeout, client.complete(&prompt, &self.settings)) => Some(r),
        };

        let (ok, outcome): (bool, &str) = match &result {
            Some(Ok(Ok(_))) => (true, "ok"),
            Some(Ok(Err(_))) => (false, "error"),
            Some(Err(_)) => (false, "timeout"),
            None => (false, "cancelled"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "action_audit",
            "action": spec.kind,
            "role": ctx.role_name,
            "model": model,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "prompt_preview": prompt_preview(&prompt),
        });
        tracing::info!(audit = %audit.to_string(), "action");

        match result {
            Some(Ok(Ok(content))) => Ok(content),
            Some(Ok(Err(e))) => Err(e.into()),
            Some(Err(_)) => Err(EngineError::ActionTimeout(self.timeout.as_secs())),
            None => Err(EngineError::Cancelled),
        }
    }
}

fn prompt_preview(prompt: &str) -> String {
    if prompt.len() > 200 {
        format!("{}...", prompt.chars().take(200).collect::<String>())
    } else {
        prompt.to_string()
    }
}
