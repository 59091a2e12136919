//! 角色描述符
//!
//! 声明一个角色的静态配置：身份四元组（名字/画像/目标/约束）、
//! 观察的消息种类、可执行的动作种类、可选的目标归属。

use serde::{Deserialize, Serialize};

use crate::memory::ActionKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDescriptor {
    /// 名字在一个环境内唯一，兼作消息 sender 与记忆分区键
    pub name: String,
    pub profile: String,
    pub goal: String,
    pub constraints: String,
    /// 观察的消息种类；路由只投递这些
    #[serde(default)]
    pub watch: Vec<ActionKind>,
    /// 可执行的动作种类，按声明顺序作为选择优先级
    #[serde(default)]
    pub actions: Vec<ActionKind>,
    /// 产出消息归入的目标；None 表示不挂目标
    #[serde(default)]
    pub objective: Option<String>,
}

impl RoleDescriptor {
    pub fn new(
        name: impl Into<String>,
        profile: impl Into<String>,
        goal: impl Into<String>,
        constraints: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            profile: profile.into(),
            goal: goal.into(),
            constraints: constraints.into(),
            watch: Vec::new(),
            actions: Vec::new(),
            objective: None,
        }
    }

    pub fn with_watch(mut self, kind: impl Into<ActionKind>) -> Self {
        self.watch.push(kind.into());
        self
    }

    pub fn with_action(mut self, kind: impl Into<ActionKind>) -> Self {
        self.actions.push(kind.into());
        self
    }

    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = Some(objective.into());
        self
    }
}
