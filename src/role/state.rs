//! 角色生命周期状态机
//!
//! 六态循环：Idle → Observing → Selecting → Executing → Reflecting → Idle，
//! Selecting/Executing/Reflecting 可进入 Error，Executing 可自环（重试换模型）。
//! 迁移由 transition 统一执行：边不合法或 current_action 与目标态不配即拒绝，
//! 因此「current_action 非空当且仅当 Selecting/Executing」由构造保证。

use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::memory::{ActionKind, RoleId};
use crate::role::RoleDescriptor;

/// 角色所处的生命周期阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Observing,
    Selecting,
    Executing,
    Reflecting,
    Error,
}

impl LifecycleState {
    /// Selecting 与 Executing 必须携带 current_action，其余状态必须为空
    pub fn needs_action(self) -> bool {
        matches!(self, LifecycleState::Selecting | LifecycleState::Executing)
    }

    fn can_transition(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, Observing)
                | (Observing, Selecting)
                | (Observing, Idle)
                | (Selecting, Executing)
                | (Selecting, Idle)
                | (Selecting, Error)
                | (Executing, Executing)
                | (Executing, Reflecting)
                | (Executing, Error)
                | (Reflecting, Idle)
                | (Reflecting, Error)
                | (Error, Idle)
        )
    }
}

/// 角色的身份与运行态；生命周期字段私有，只能经 transition 变更
#[derive(Debug, Clone)]
pub struct RoleState {
    /// 名字即身份：消息的 sender、记忆分区键都用它
    pub name: RoleId,
    pub profile: String,
    pub goal: String,
    pub constraints: String,
    /// 该角色观察的消息种类
    pub watch: Vec<ActionKind>,
    lifecycle: LifecycleState,
    current_action: Option<ActionKind>,
}

impl RoleState {
    pub fn from_descriptor(descriptor: &RoleDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            profile: descriptor.profile.clone(),
            goal: descriptor.goal.clone(),
            constraints: descriptor.constraints.clone(),
            watch: descriptor.watch.clone(),
            lifecycle: LifecycleState::Idle,
            current_action: None,
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    pub fn current_action(&self) -> Option<&str> {
        self.current_action.as_deref()
    }

    pub fn watches(&self, kind: &str) -> bool {
        self.watch.iter().any(|k| k == kind)
    }

    /// 执行一次生命周期迁移；非法的边或动作配属返回 IllegalTransition，状态不变
    pub fn transition(
        &mut self,
        next: LifecycleState,
        action: Option<ActionKind>,
    ) -> Result<(), EngineError> {
        if !self.lifecycle.can_transition(next) {
            return Err(EngineError::IllegalTransition(format!(
                "role {}: {:?} -> {next:?} is not a legal edge",
                self.name, self.lifecycle
            )));
        }
        if next.needs_action() != action.is_some() {
            return Err(EngineError::IllegalTransition(format!(
                "role {}: {next:?} requires current_action to be {}",
                self.name,
                if next.needs_action() { "set" } else { "empty" }
            )));
        }
        self.lifecycle = next;
        self.current_action = action;
        Ok(())
    }
}
