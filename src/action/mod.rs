//! 动作模块：动作规格、注册表与带超时的执行器

pub mod runner;
pub mod spec;

pub use runner::{build_prompt, ActionContext, ActionRunner, ROLE_PREFIX_TEMPLATE};
pub use spec::{ActionRegistry, ActionSpec};
