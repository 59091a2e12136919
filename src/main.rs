//! Hive - Rust 多智能体协同引擎
//!
//! 入口：初始化日志、加载配置、装配默认三角色流水线环境，
//! 把命令行需求作为引导消息发布后运行到终局；Ctrl+C 优雅取消。

use anyhow::Context;
use hive::config::{load_config, AppConfig};
use hive::core::EnvironmentBuilder;
use hive::role::bank;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let config = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    // 需求从命令行取，缺省给一个演示需求
    let requirement = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let requirement = if requirement.is_empty() {
        "write a weekly report about engine progress".to_string()
    } else {
        requirement
    };

    let (mut env, mut events) = EnvironmentBuilder::from_config(&config)
        .context("Failed to prepare environment")?
        .with_business(bank::default_business())
        .with_actions(bank::default_actions())
        .with_roles(bank::default_roles())
        .build()
        .context("Failed to build environment")?;

    // 过程事件逐条打到 stdout（JSON 行）
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
        }
    });

    // Ctrl+C 触发取消，运行在下一个调度间隙收敛
    let cancel = env.supervisor().cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    env.publish_requirement(&requirement).await;
    let outcome = env.run_to_completion().await;

    println!();
    println!("== run {outcome} after {} rounds ==", env.rounds());
    for message in env.history() {
        println!("[{}] {}: {}", message.action_kind, message.sender, message.payload);
    }
    for failure in env.failures() {
        eprintln!(
            "round {} role {} failed: {}",
            failure.round, failure.role_id, failure.error
        );
    }

    drop(env);
    let _ = printer.await;
    Ok(())
}
