//! 策略模块：BMM 业务上下文与合规门控

pub mod context;
pub mod gate;

pub use context::{BusinessContext, BusinessPolicy, BusinessRule, Influencers, RulePredicate};
pub use gate::{ComplianceAssessment, GateWeights, PolicyGate};
