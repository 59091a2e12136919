//! 运行监管：取消令牌的持有者
//!
//! 持有 CancellationToken，外部（Ctrl+C、上层服务）触发 cancel 后，
//! 调度器停止放行新任务，在飞动作在下一个检查点收敛，运行以 Cancelled 收场。

use tokio_util::sync::CancellationToken;

/// 运行级生命周期管理：一次 cancel，处处生效
#[derive(Debug)]
pub struct RunSupervisor {
    cancel_token: CancellationToken,
}

impl RunSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 触发取消（幂等）
    pub fn cancel(&self) {
        tracing::info!("run cancellation requested");
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 创建子 token（用于单个动作）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

impl Default for RunSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
