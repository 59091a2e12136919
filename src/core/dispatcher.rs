//! 有界并发调度
//!
//! run_bounded 用 Semaphore 限制同时在飞的任务数，准入按提交顺序逐个拿许可；
//! 结果向量与任务向量按下标一一对应。单任务 panic 只污染自己的槽位；
//! 取消令牌在准入间隙优先生效：已起飞的任务照常收尾、结果保留，
//! 未获准入的任务以 Cancelled 落位。

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::EngineError;

/// 有界调度器：并发上限在构造期固定
pub struct Dispatcher {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl Dispatcher {
    /// 上限必须为正；0 是配置错误
    pub fn new(limit: usize) -> Result<Self, EngineError> {
        if limit == 0 {
            return Err(EngineError::InvalidArgument(
                "dispatcher concurrency limit must be positive".to_string(),
            ));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 执行一批任务，返回与入参同长同序的结果向量。
    /// 取消只阻止后续准入；在飞任务等它收尾，未准入的槽位记 Cancelled。
    pub async fn run_bounded<T, F>(
        &self,
        tasks: Vec<F>,
        cancel: &CancellationToken,
    ) -> Vec<Result<T, EngineError>>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        let total = tasks.len();
        let mut handles: Vec<JoinHandle<Result<T, EngineError>>> = Vec::with_capacity(total);

        for task in tasks {
            // biased：已触发的取消优先于可用许可
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = self.semaphore.clone().acquire_owned() => {
                    permit.expect("semaphore closed")
                }
            };
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                task.await
            }));
        }

        let mut results = Vec::with_capacity(total);
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(err) => results.push(Err(EngineError::ActionFailure(format!(
                    "task panicked: {err}"
                )))),
            }
        }
        // 准入按提交顺序，未准入的恰是尾段
        while results.len() < total {
            results.push(Err(EngineError::Cancelled));
        }
        results
    }
}
