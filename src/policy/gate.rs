//! 合规门控
//!
//! 对提案消息计算加权合规分：policy / rule / goal_alignment 三类子分各取
//! 该类检查的通过率，compliance_score 为加权和，低于 minimum_compliance_score
//! 即拒绝。权重在启动期校验（和必须为 1.0，绝不静默钳制）。
//! 活动规则集以 ArcSwap 快照共享：register_* 对后续评估可见，
//! 正在进行的评估始终基于进入时加载的快照。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::memory::{ActionKind, MemoryStore, Message};
use crate::policy::{BusinessContext, BusinessPolicy, BusinessRule};

const WEIGHT_SUM_EPS: f64 = 1e-9;

/// 门控权重与阈值（配置输入，不得硬编码）
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateWeights {
    pub policy_weight: f64,
    pub rule_weight: f64,
    pub goal_alignment_weight: f64,
    pub minimum_compliance_score: f64,
}

impl Default for GateWeights {
    fn default() -> Self {
        Self {
            policy_weight: 0.4,
            rule_weight: 0.3,
            goal_alignment_weight: 0.3,
            minimum_compliance_score: 0.8,
        }
    }
}

impl GateWeights {
    /// 启动期校验：三个权重均在 [0,1] 且和为 1.0，阈值在 [0,1]
    pub fn validate(&self) -> Result<(), EngineError> {
        let weights = [
            self.policy_weight,
            self.rule_weight,
            self.goal_alignment_weight,
        ];
        if weights.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return Err(EngineError::ConfigurationError(format!(
                "gate weights must be within [0, 1], got {weights:?}"
            )));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPS {
            return Err(EngineError::ConfigurationError(format!(
                "gate weights must sum to 1.0, got {sum}"
            )));
        }
        if !(0.0..=1.0).contains(&self.minimum_compliance_score) {
            return Err(EngineError::ConfigurationError(format!(
                "minimum_compliance_score must be within [0, 1], got {}",
                self.minimum_compliance_score
            )));
        }
        Ok(())
    }

    /// 加权聚合；对每个子分单调不减
    pub fn aggregate(&self, policy_score: f64, rule_score: f64, goal_alignment_score: f64) -> f64 {
        self.policy_weight * policy_score
            + self.rule_weight * rule_score
            + self.goal_alignment_weight * goal_alignment_score
    }
}

/// 单次提案的合规评估：每次评估重新计算，只记日志，不作为可变状态持久化
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceAssessment {
    /// 逐规则得分（1.0 通过 / 0.0 未过），键为规则 id
    pub rule_scores: HashMap<String, f64>,
    pub policy_score: f64,
    pub rule_score: f64,
    pub goal_alignment_score: f64,
    pub compliance_score: f64,
    pub passed: bool,
}

/// 活动规则集（不可变值，整体替换）
#[derive(Debug, Clone, Default)]
struct RuleSet {
    policies: Vec<BusinessPolicy>,
    rules: Vec<BusinessRule>,
}

impl RuleSet {
    fn max_repeat_window(&self) -> usize {
        self.policies
            .iter()
            .flat_map(|p| p.rules.iter())
            .chain(self.rules.iter())
            .filter_map(|r| match r.predicate {
                crate::policy::RulePredicate::NotRepeated { window } => Some(window),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }
}

/// 合规门控：权重固定（启动期校验），规则集可在运行中注册扩展
pub struct PolicyGate {
    weights: GateWeights,
    rules: ArcSwap<RuleSet>,
    /// NotRepeated 谓词读取发送方分区的记忆
    store: Option<Arc<MemoryStore>>,
    /// 免检的动作种类（配置级豁免；ActionSpec 级豁免由角色判断）
    exempt_kinds: HashSet<ActionKind>,
}

impl PolicyGate {
    /// 规则集以 BusinessContext 里已有的政策与规则为初始值
    pub fn new(weights: GateWeights, context: &BusinessContext) -> Result<Self, EngineError> {
        weights.validate()?;
        let seed = RuleSet {
            policies: context.policies.clone(),
            rules: context.rules.clone(),
        };
        Ok(Self {
            weights,
            rules: ArcSwap::from_pointee(seed),
            store: None,
            exempt_kinds: HashSet::new(),
        })
    }

    pub fn with_store(mut self, store: Arc<MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_exempt_kinds(mut self, kinds: impl IntoIterator<Item = ActionKind>) -> Self {
        self.exempt_kinds.extend(kinds);
        self
    }

    pub fn is_exempt(&self, kind: &str) -> bool {
        self.exempt_kinds.contains(kind)
    }

    pub fn minimum(&self) -> f64 {
        self.weights.minimum_compliance_score
    }

    /// 注册政策：对后续评估可见，不影响正在进行的评估
    pub fn register_policy(&self, policy: BusinessPolicy) {
        self.rules.rcu(|current| {
            let mut next = RuleSet::clone(current);
            next.policies.push(policy.clone());
            next
        });
    }

    /// 注册独立规则
    pub fn register_rule(&self, rule: BusinessRule) {
        self.rules.rcu(|current| {
            let mut next = RuleSet::clone(current);
            next.rules.push(rule.clone());
            next
        });
    }

    /// 评估一条提案消息；快照在进入时加载，整个评估只看这一份规则集
    pub async fn evaluate(
        &self,
        message: &Message,
        context: &BusinessContext,
    ) -> ComplianceAssessment {
        let snapshot = self.rules.load_full();

        let recent = match (&self.store, snapshot.max_repeat_window()) {
            (Some(store), window) if window > 0 => {
                store.recent_payloads(&message.sender, window).await
            }
            _ => Vec::new(),
        };

        let mut rule_scores = HashMap::new();
        let policy_score = Self::class_pass_rate(
            snapshot.policies.iter().flat_map(|p| p.rules.iter()),
            message,
            &recent,
            &mut rule_scores,
        );
        let rule_score =
            Self::class_pass_rate(snapshot.rules.iter(), message, &recent, &mut rule_scores);
        let goal_alignment_score = Self::goal_alignment(&context.goals, &message.payload);

        let compliance_score =
            self.weights
                .aggregate(policy_score, rule_score, goal_alignment_score);
        let passed = compliance_score >= self.weights.minimum_compliance_score;

        tracing::debug!(
            sender = %message.sender,
            action_kind = %message.action_kind,
            policy_score,
            rule_score,
            goal_alignment_score,
            compliance_score,
            passed,
            "compliance assessment"
        );

        ComplianceAssessment {
            rule_scores,
            policy_score,
            rule_score,
            goal_alignment_score,
            compliance_score,
            passed,
        }
    }

    /// 一类检查的通过率；空类视为空缺省通过（1.0），部分配置的部署才可用
    fn class_pass_rate<'a>(
        rules: impl Iterator<Item = &'a BusinessRule>,
        message: &Message,
        recent: &[String],
        rule_scores: &mut HashMap<String, f64>,
    ) -> f64 {
        let mut total = 0usize;
        let mut passed = 0usize;
        for rule in rules {
            let ok = rule.predicate.check(message, recent);
            rule_scores.insert(rule.id.clone(), if ok { 1.0 } else { 0.0 });
            total += 1;
            if ok {
                passed += 1;
            }
        }
        if total == 0 {
            1.0
        } else {
            passed as f64 / total as f64
        }
    }

    /// 目标对齐：与 payload 有词重叠的目标占比；无目标视为 1.0
    fn goal_alignment(goals: &[String], payload: &str) -> f64 {
        if goals.is_empty() {
            return 1.0;
        }
        let payload_tokens = tokenize_lower(payload);
        let aligned = goals
            .iter()
            .filter(|goal| {
                tokenize_lower(goal)
                    .intersection(&payload_tokens)
                    .next()
                    .is_some()
            })
            .count();
        aligned as f64 / goals.len() as f64
    }
}

/// 将文本切分为小写词集合，用于简单的词重叠对齐
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}
