//! 核心编排层：错误分类、过程事件、有界调度、运行监管与环境主循环

pub mod builder;
pub mod dispatcher;
pub mod environment;
pub mod error;
pub mod events;
pub mod supervisor;

pub use builder::EnvironmentBuilder;
pub use dispatcher::Dispatcher;
pub use environment::{Environment, RoundFailure, RunOutcome};
pub use error::EngineError;
pub use events::EngineEvent;
pub use supervisor::RunSupervisor;
