//! 运行环境：消息总线 + 轮次调度
//!
//! 环境持有全部角色与共享服务，按轮推进：收集有触发消息的角色，
//! 交给有界调度器并发执行各自的生命周期 step，再把本轮产出按观察列表
//! 路由给下一批角色。单角色失败只记入失败记录，不中断运行；
//! 运行以 Completed / Timeout / BudgetExhausted / Cancelled 之一收场。

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use crate::core::{Dispatcher, EngineError, EngineEvent, RunSupervisor};
use crate::memory::{MemoryStore, Message, MessageId, RoleId};
use crate::policy::PolicyGate;
use crate::role::bank::KIND_REQUIREMENT;
use crate::role::{Role, RoleContext, RoleDescriptor, StepReport};

/// 一次运行的终局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// 所有角色空闲且无待投递消息
    Completed,
    /// 轮次达到上限仍有待处理工作
    Timeout,
    /// LLM 调用预算耗尽
    BudgetExhausted,
    /// 运行被外部取消
    Cancelled,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Timeout => "timeout",
            RunOutcome::BudgetExhausted => "budget_exhausted",
            RunOutcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// 失败记录条目：哪一轮、哪个角色、被什么触发、败因
#[derive(Debug, Clone, Serialize)]
pub struct RoundFailure {
    pub round: u64,
    pub role_id: RoleId,
    /// 触发消息 id；任务级失败（panic）时为 None
    pub message_id: Option<MessageId>,
    pub error: String,
}

/// 多角色运行环境
pub struct Environment {
    roles: Vec<Arc<Mutex<Role>>>,
    /// 与 roles 同序的静态描述，路由与归因不必加锁
    descriptors: Vec<RoleDescriptor>,
    ctx: Arc<RoleContext>,
    dispatcher: Dispatcher,
    supervisor: RunSupervisor,
    history: Vec<Message>,
    failures: Vec<RoundFailure>,
    round: u64,
    max_rounds: u64,
    /// LLM 调用预算；None 不设限
    budget: Option<u64>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl Environment {
    pub(crate) fn new(
        ctx: Arc<RoleContext>,
        dispatcher: Dispatcher,
        supervisor: RunSupervisor,
        max_rounds: u64,
        budget: Option<u64>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            roles: Vec::new(),
            descriptors: Vec::new(),
            ctx,
            dispatcher,
            supervisor,
            history: Vec::new(),
            failures: Vec::new(),
            round: 0,
            max_rounds,
            budget,
            events,
        }
    }

    /// 注册角色：名字唯一，声明的动作必须已在注册表中
    pub fn register_role(&mut self, descriptor: RoleDescriptor) -> Result<(), EngineError> {
        if self.descriptors.iter().any(|d| d.name == descriptor.name) {
            return Err(EngineError::ConfigurationError(format!(
                "duplicate role name: {}",
                descriptor.name
            )));
        }
        for kind in &descriptor.actions {
            if !self.ctx.actions.contains(kind) {
                return Err(EngineError::ConfigurationError(format!(
                    "role {} declares unknown action kind: {kind}",
                    descriptor.name
                )));
            }
        }
        self.roles
            .push(Arc::new(Mutex::new(Role::new(descriptor.clone()))));
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// 发布一条消息：入历史、按观察列表路由到各角色收件箱
    pub async fn publish(&mut self, message: Message) {
        self.emit(EngineEvent::MessagePublished {
            message_id: message.id.clone(),
            sender: message.sender.clone(),
            action_kind: message.action_kind.clone(),
        });
        tracing::debug!(
            message_id = %message.id,
            sender = %message.sender,
            action_kind = %message.action_kind,
            "message published"
        );
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            if descriptor.watch.contains(&message.action_kind) {
                self.roles[i].lock().await.deliver(message.clone());
                let _ = self.events.send(EngineEvent::MessageRouted {
                    message_id: message.id.clone(),
                    recipient: descriptor.name.clone(),
                });
            }
        }
        self.history.push(message);
    }

    /// 以用户名义发布一条需求消息，作为一次运行的引导
    pub async fn publish_requirement(&mut self, text: impl Into<String>) {
        self.publish(Message::new("user", KIND_REQUIREMENT, text))
            .await;
    }

    /// 是否还有角色收件箱非空
    pub async fn has_pending_work(&self) -> bool {
        for role in &self.roles {
            if role.lock().await.has_pending() {
                return true;
            }
        }
        false
    }

    /// 推进一轮：并发 step 所有有活的角色，路由本轮产出。
    /// 返回 Ok(false) 表示本轮无事可做。
    pub async fn step(&mut self) -> Result<bool, EngineError> {
        if let Some(limit) = self.budget {
            let spent = self.ctx.runner.calls();
            if spent >= limit {
                return Err(EngineError::BudgetExhausted { spent, limit });
            }
        }

        let mut pending: Vec<usize> = Vec::new();
        for (i, role) in self.roles.iter().enumerate() {
            if role.lock().await.has_pending() {
                pending.push(i);
            }
        }
        if pending.is_empty() {
            return Ok(false);
        }

        self.round += 1;
        self.emit(EngineEvent::RoundStarted { round: self.round });
        tracing::debug!(round = self.round, roles = pending.len(), "scheduling round");

        let cancel = self.supervisor.cancel_token();
        let tasks: Vec<_> = pending
            .iter()
            .map(|&i| {
                let role = self.roles[i].clone();
                let ctx = self.ctx.clone();
                let cancel = cancel.clone();
                async move {
                    let mut role = role.lock().await;
                    Ok::<StepReport, EngineError>(role.step(&ctx, &cancel).await)
                }
            })
            .collect();

        let results = self.dispatcher.run_bounded(tasks, &cancel).await;

        // 下标对应：results[j] 即 pending[j] 号角色的结果
        let mut produced = Vec::new();
        for (j, result) in results.into_iter().enumerate() {
            match result {
                Ok(report) => {
                    if let Some(err) = &report.failure {
                        self.failures.push(RoundFailure {
                            round: self.round,
                            role_id: report.role_id.clone(),
                            message_id: report.trigger.clone(),
                            error: err.to_string(),
                        });
                    }
                    if let Some(message) = report.produced {
                        produced.push(message);
                    }
                }
                Err(err) => {
                    self.failures.push(RoundFailure {
                        round: self.round,
                        role_id: self.descriptors[pending[j]].name.clone(),
                        message_id: None,
                        error: err.to_string(),
                    });
                }
            }
        }

        for message in produced {
            self.publish(message).await;
        }
        Ok(true)
    }

    /// 运行到终局：取消优先，其次做完判定，再轮次上限，预算在 step 内部把关
    pub async fn run_to_completion(&mut self) -> RunOutcome {
        let outcome = loop {
            if self.supervisor.is_cancelled() {
                break RunOutcome::Cancelled;
            }
            if !self.has_pending_work().await {
                break RunOutcome::Completed;
            }
            if self.round >= self.max_rounds {
                tracing::warn!(
                    rounds = self.round,
                    max_rounds = self.max_rounds,
                    "round cap reached with work pending"
                );
                break RunOutcome::Timeout;
            }
            match self.step().await {
                Ok(true) => {}
                Ok(false) => break RunOutcome::Completed,
                Err(EngineError::BudgetExhausted { spent, limit }) => {
                    tracing::warn!(spent, limit, "llm call budget exhausted");
                    break RunOutcome::BudgetExhausted;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "round aborted");
                    break RunOutcome::Cancelled;
                }
            }
        };

        self.emit(EngineEvent::RunFinished {
            outcome: outcome.to_string(),
            rounds: self.round,
        });
        tracing::info!(
            outcome = %outcome,
            rounds = self.round,
            failures = self.failures.len(),
            llm_calls = self.ctx.runner.calls(),
            "run finished"
        );
        outcome
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn failures(&self) -> &[RoundFailure] {
        &self.failures
    }

    pub fn rounds(&self) -> u64 {
        self.round
    }

    pub fn supervisor(&self) -> &RunSupervisor {
        &self.supervisor
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.ctx.store.clone()
    }

    pub fn gate(&self) -> Arc<PolicyGate> {
        self.ctx.gate.clone()
    }

    pub fn llm_calls(&self) -> u64 {
        self.ctx.runner.calls()
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}
