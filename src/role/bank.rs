//! 内置角色库
//!
//! 开箱即用的三角色流水线：Planner 观察需求出计划，Executor 观察计划出执行，
//! Reviewer 观察执行出评审。配套默认动作规格与一份保守的业务上下文。

use crate::action::ActionSpec;
use crate::policy::{BusinessContext, BusinessPolicy, BusinessRule, RulePredicate};
use crate::role::RoleDescriptor;

pub const KIND_REQUIREMENT: &str = "requirement";
pub const KIND_PLAN: &str = "plan";
pub const KIND_EXECUTION: &str = "execution";
pub const KIND_REVIEW: &str = "review";

/// 流水线三件动作：计划 / 执行 / 评审
pub fn default_actions() -> Vec<ActionSpec> {
    vec![
        ActionSpec::new(KIND_PLAN, "break the requirement into a short numbered plan")
            .with_profile("planner")
            .with_required_context("content")
            .with_prompt_template(
                "Break the requirement into a short numbered plan.\nRequirement: {payload}",
            ),
        ActionSpec::new(KIND_EXECUTION, "carry out the plan step by step")
            .with_profile("executor")
            .with_required_context("content")
            .with_prompt_template(
                "Carry out the plan below and report the result.\nPlan: {payload}\nEarlier work:\n{history}",
            ),
        ActionSpec::new(KIND_REVIEW, "review the execution result against the plan")
            .with_profile("reviewer")
            .with_required_context("content")
            .with_prompt_template(
                "Review the execution result and state whether it is acceptable.\nResult: {payload}",
            ),
    ]
}

/// 流水线三角色：观察种类首尾相接
pub fn default_roles() -> Vec<RoleDescriptor> {
    vec![
        RoleDescriptor::new(
            "Planner",
            "planner",
            "break requirements into executable plans",
            "plans stay under ten steps",
        )
        .with_watch(KIND_REQUIREMENT)
        .with_action(KIND_PLAN),
        RoleDescriptor::new(
            "Executor",
            "executor",
            "carry plans out and report results",
            "report only what was actually done",
        )
        .with_watch(KIND_PLAN)
        .with_action(KIND_EXECUTION),
        RoleDescriptor::new(
            "Reviewer",
            "reviewer",
            "review execution results for quality",
            "be specific about defects",
        )
        .with_watch(KIND_EXECUTION)
        .with_action(KIND_REVIEW),
    ]
}

/// 保守的默认业务上下文：产出非空、不过长、同角色不重复表态
pub fn default_business() -> BusinessContext {
    BusinessContext::new()
        .with_vision("deliver useful results end to end")
        .with_mission("turn requirements into reviewed work")
        .with_policy(
            BusinessPolicy::new("output-quality", "every published output is substantive")
                .with_rule(BusinessRule::new(
                    "q-nonempty",
                    "output must not be empty",
                    RulePredicate::NonEmpty,
                ))
                .with_rule(BusinessRule::new(
                    "q-bounded",
                    "output stays within a sane length",
                    RulePredicate::MaxLength(4000),
                )),
        )
        .with_rule(BusinessRule::new(
            "r-no-repeat",
            "a role must not repeat its own recent output",
            RulePredicate::NotRepeated { window: 5 },
        ))
}
