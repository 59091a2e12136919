//! 动作规格与注册表
//!
//! 每种动作以 ActionSpec 声明（种类、描述、资格约束、可选提示词模板），
//! 由 ActionRegistry 按种类注册与查找；重复注册是配置错误，启动期即失败。

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::memory::ActionKind;

/// 动作规格：角色能执行什么、对谁开放、需要什么触发上下文
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    pub kind: ActionKind,
    /// 动作描述（进入提示词，供模型理解任务）
    pub description: String,
    /// 允许执行的角色画像；空表示不限
    #[serde(default)]
    pub allowed_profiles: Vec<String>,
    /// 触发消息必须携带的上下文字段；空表示不限
    #[serde(default)]
    pub required_context: Vec<String>,
    /// 首选后端模型；None 时用默认模型
    #[serde(default)]
    pub model: Option<String>,
    /// 自定义提示词模板，支持 {payload} 与 {history} 占位符
    #[serde(default)]
    pub prompt_template: Option<String>,
    /// 产出免于合规门控（如原始需求的转录类动作）
    #[serde(default)]
    pub exempt_from_gate: bool,
}

impl ActionSpec {
    pub fn new(kind: impl Into<ActionKind>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            allowed_profiles: Vec::new(),
            required_context: Vec::new(),
            model: None,
            prompt_template: None,
            exempt_from_gate: false,
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.allowed_profiles.push(profile.into());
        self
    }

    pub fn with_required_context(mut self, field: impl Into<String>) -> Self {
        self.required_context.push(field.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    pub fn with_gate_exemption(mut self) -> Self {
        self.exempt_from_gate = true;
        self
    }

    /// 画像资格：allowed_profiles 为空则对所有画像开放
    pub fn permits(&self, profile: &str) -> bool {
        self.allowed_profiles.is_empty() || self.allowed_profiles.iter().any(|p| p == profile)
    }

    /// 上下文资格：触发消息必须携带全部 required_context 字段
    pub fn context_satisfied(&self, fields: &HashSet<String>) -> bool {
        self.required_context.iter().all(|f| fields.contains(f))
    }
}

/// 动作注册表：按种类存储 ActionSpec，供角色选择与环境校验
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<ActionKind, ActionSpec>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册动作；同种类重复注册返回 ConfigurationError
    pub fn register(&mut self, spec: ActionSpec) -> Result<(), EngineError> {
        if self.actions.contains_key(&spec.kind) {
            return Err(EngineError::ConfigurationError(format!(
                "duplicate action kind: {}",
                spec.kind
            )));
        }
        self.actions.insert(spec.kind.clone(), spec);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&ActionSpec> {
        self.actions.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.actions.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    /// 返回 (kind, description) 列表，用于日志与启动摘要
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.actions
            .iter()
            .map(|(kind, spec)| (kind.clone(), spec.description.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
