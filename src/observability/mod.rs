//! 可观测性：结构化日志初始化
//!
//! RUST_LOG 可覆盖默认级别；动作审计与合规评估分别以 info/debug 输出。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();
}
