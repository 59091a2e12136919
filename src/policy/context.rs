//! 业务动机模型（BMM）上下文
//!
//! 愿景 / 使命 / 目标 / 政策 / 规则 / 影响因素。规则的判定条件是可序列化的数据
//! （RulePredicate），新增规则是配置而非新代码路径。上下文由环境持有，
//! 门控与角色以引用共享，读多写少。

use serde::{Deserialize, Serialize};

use crate::memory::Message;

/// 规则判定条件：对提案消息的 payload（以及发送方最近的已提交 payload）求布尔值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RulePredicate {
    /// payload 包含关键词
    Contains(String),
    /// payload 不包含关键词（禁用词）
    NotContains(String),
    /// payload 非空
    NonEmpty,
    /// payload 长度不超过上限（字符数）
    MaxLength(usize),
    /// 发送角色在白名单内
    SenderIn(Vec<String>),
    /// 与发送方最近 window 条已提交 payload 均不相同（重复提案检查，需读记忆）
    NotRepeated { window: usize },
}

impl RulePredicate {
    /// recent_payloads：发送方分区最近的已提交 payload（最新在末尾），
    /// 仅 NotRepeated 使用；无记忆可读时传空切片
    pub fn check(&self, message: &Message, recent_payloads: &[String]) -> bool {
        match self {
            RulePredicate::Contains(keyword) => message.payload.contains(keyword),
            RulePredicate::NotContains(keyword) => !message.payload.contains(keyword),
            RulePredicate::NonEmpty => !message.payload.trim().is_empty(),
            RulePredicate::MaxLength(limit) => message.payload.chars().count() <= *limit,
            RulePredicate::SenderIn(senders) => senders.iter().any(|s| s == &message.sender),
            RulePredicate::NotRepeated { window } => {
                let skip = recent_payloads.len().saturating_sub(*window);
                !recent_payloads[skip..].iter().any(|p| p == &message.payload)
            }
        }
    }
}

/// 业务规则：id 唯一，definition 为人类可读定义，predicate 为机器可判定条件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRule {
    pub id: String,
    pub definition: String,
    pub predicate: RulePredicate,
    /// 出处（政策名 / 监管要求 / 团队约定）
    #[serde(default)]
    pub source: String,
}

impl BusinessRule {
    pub fn new(id: impl Into<String>, definition: impl Into<String>, predicate: RulePredicate) -> Self {
        Self {
            id: id.into(),
            definition: definition.into(),
            predicate,
            source: String::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// 业务政策：一组规则的载体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessPolicy {
    pub name: String,
    pub description: String,
    pub rules: Vec<BusinessRule>,
}

impl BusinessPolicy {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: BusinessRule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// 影响因素：内部（资源、文化）与外部（市场、监管）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Influencers {
    #[serde(default)]
    pub internal: Vec<String>,
    #[serde(default)]
    pub external: Vec<String>,
}

/// BMM 上下文：环境持有的战略背景，目标有序
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessContext {
    #[serde(default)]
    pub vision: String,
    #[serde(default)]
    pub mission: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub policies: Vec<BusinessPolicy>,
    #[serde(default)]
    pub rules: Vec<BusinessRule>,
    #[serde(default)]
    pub influencers: Influencers,
}

impl BusinessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vision(mut self, vision: impl Into<String>) -> Self {
        self.vision = vision.into();
        self
    }

    pub fn with_mission(mut self, mission: impl Into<String>) -> Self {
        self.mission = mission.into();
        self
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goals.push(goal.into());
        self
    }

    pub fn with_policy(mut self, policy: BusinessPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn with_rule(mut self, rule: BusinessRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_influencers(mut self, influencers: Influencers) -> Self {
        self.influencers = influencers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &str) -> Message {
        Message::new("planner", "plan", payload)
    }

    #[test]
    fn test_keyword_predicates() {
        let msg = message("ship the beta safely");
        assert!(RulePredicate::Contains("beta".into()).check(&msg, &[]));
        assert!(!RulePredicate::Contains("gamma".into()).check(&msg, &[]));
        assert!(RulePredicate::NotContains("password".into()).check(&msg, &[]));
        assert!(RulePredicate::NonEmpty.check(&msg, &[]));
        assert!(!RulePredicate::NonEmpty.check(&message("   "), &[]));
        assert!(RulePredicate::MaxLength(100).check(&msg, &[]));
        assert!(!RulePredicate::MaxLength(3).check(&msg, &[]));
    }

    #[test]
    fn test_sender_predicate() {
        let msg = message("body");
        assert!(RulePredicate::SenderIn(vec!["planner".into(), "reviewer".into()]).check(&msg, &[]));
        assert!(!RulePredicate::SenderIn(vec!["executor".into()]).check(&msg, &[]));
    }

    #[test]
    fn test_not_repeated_respects_window() {
        let msg = message("same proposal");
        let history = vec![
            "same proposal".to_string(),
            "other".to_string(),
            "another".to_string(),
        ];

        // 近两条里没有重复
        assert!(RulePredicate::NotRepeated { window: 2 }.check(&msg, &history));
        // 放宽窗口后命中最旧那条
        assert!(!RulePredicate::NotRepeated { window: 3 }.check(&msg, &history));
        assert!(RulePredicate::NotRepeated { window: 5 }.check(&msg, &[]));
    }

    #[test]
    fn test_context_builder() {
        let context = BusinessContext::new()
            .with_vision("reliable automation")
            .with_goal("ship weekly")
            .with_goal("stay compliant")
            .with_policy(
                BusinessPolicy::new("quality", "outputs must be reviewable").with_rule(
                    BusinessRule::new("q-1", "non-empty output", RulePredicate::NonEmpty),
                ),
            );

        assert_eq!(context.goals.len(), 2);
        assert_eq!(context.policies[0].rules.len(), 1);
    }
}
