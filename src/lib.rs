//! Hive - Rust 多智能体协同引擎
//!
//! 模块划分：
//! - **action**: 动作规格、注册表与带超时的执行器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、过程事件、有界调度、运行监管与环境主循环
//! - **llm**: LLM 客户端抽象、后端注册表与回显 Mock
//! - **memory**: 按角色分区的分层记忆（短期/长期）、目标索引与归档
//! - **policy**: BMM 业务上下文与加权合规门控
//! - **role**: 角色描述符、生命周期状态机、回退策略与内置角色库

pub mod action;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod policy;
pub mod role;

pub use crate::core::{
    Environment, EnvironmentBuilder, EngineError, EngineEvent, RunOutcome, RunSupervisor,
};
pub use crate::memory::{MemoryStore, MemoryTier, Message};
pub use crate::policy::{BusinessContext, GateWeights, PolicyGate};
pub use crate::role::{FallbackPolicy, Role, RoleDescriptor};
