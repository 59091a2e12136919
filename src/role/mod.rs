//! 角色模块：描述符、生命周期状态机、回退策略与角色运行时

pub mod bank;
pub mod descriptor;
pub mod retry;
pub mod role;
pub mod state;

pub use descriptor::RoleDescriptor;
pub use retry::{FallbackPolicy, RetryDecision};
pub use role::{Role, RoleContext, StepReport};
pub use state::{LifecycleState, RoleState};
