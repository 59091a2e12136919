//! 角色运行时
//!
//! 一次 step 消费收件箱最旧的一条触发消息，走完整生命周期：
//! 观察（含同触发去重）→ 选择动作 → 执行（失败沿回退链换模型重试）→
//! 反思（合规门控 + 写入记忆）→ 回到空闲。任何失败都就地收敛：
//! 角色经 Error 归位 Idle，失败原因随 StepReport 上报，不影响其他角色。

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::action::{ActionContext, ActionRegistry, ActionRunner, ActionSpec};
use crate::core::{EngineError, EngineEvent};
use crate::memory::{MemoryStore, MemoryTier, Message, MessageId, RoleId};
use crate::policy::{BusinessContext, PolicyGate};
use crate::role::{FallbackPolicy, LifecycleState, RetryDecision, RoleDescriptor, RoleState};

/// 角色共享的运行环境：记忆、门控、执行器、动作注册表与事件通道
pub struct RoleContext {
    pub store: Arc<MemoryStore>,
    pub gate: Arc<PolicyGate>,
    pub runner: Arc<ActionRunner>,
    pub actions: Arc<ActionRegistry>,
    pub business: Arc<BusinessContext>,
    pub fallback: FallbackPolicy,
    /// 提示词里携带的近期记忆条数
    pub history_window: usize,
    pub events: mpsc::UnboundedSender<EngineEvent>,
}

/// 一次 step 的结果：触发了什么、产出了什么、败在哪里
#[derive(Debug)]
pub struct StepReport {
    pub role_id: RoleId,
    pub trigger: Option<MessageId>,
    pub produced: Option<Message>,
    pub failure: Option<EngineError>,
}

impl StepReport {
    fn idle(role_id: RoleId) -> Self {
        Self {
            role_id,
            trigger: None,
            produced: None,
            failure: None,
        }
    }
}

/// 角色：静态描述 + 生命周期状态 + 先进先出收件箱
pub struct Role {
    descriptor: RoleDescriptor,
    state: RoleState,
    inbox: VecDeque<Message>,
}

impl Role {
    pub fn new(descriptor: RoleDescriptor) -> Self {
        let state = RoleState::from_descriptor(&descriptor);
        Self {
            descriptor,
            state,
            inbox: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn state(&self) -> &RoleState {
        &self.state
    }

    pub fn descriptor(&self) -> &RoleDescriptor {
        &self.descriptor
    }

    /// 投递一条观察到的消息；按到达顺序排队
    pub fn deliver(&mut self, message: Message) {
        self.inbox.push_back(message);
    }

    pub fn has_pending(&self) -> bool {
        !self.inbox.is_empty()
    }

    /// 消费一条触发消息并走完生命周期；收件箱为空时原地返回
    pub async fn step(&mut self, ctx: &RoleContext, cancel: &CancellationToken) -> StepReport {
        let Some(trigger) = self.inbox.pop_front() else {
            return StepReport::idle(self.state.name.clone());
        };

        match self.run_pipeline(&trigger, ctx, cancel).await {
            Ok(produced) => StepReport {
                role_id: self.state.name.clone(),
                trigger: Some(trigger.id.clone()),
                produced,
                failure: None,
            },
            Err(err) => {
                tracing::warn!(role = %self.state.name, error = %err, "role step failed");
                self.fail_to_idle();
                self.emit(
                    ctx,
                    EngineEvent::RoleFailed {
                        role: self.state.name.clone(),
                        error: err.to_string(),
                    },
                );
                StepReport {
                    role_id: self.state.name.clone(),
                    trigger: Some(trigger.id.clone()),
                    produced: None,
                    failure: Some(err),
                }
            }
        }
    }

    async fn run_pipeline(
        &mut self,
        trigger: &Message,
        ctx: &RoleContext,
        cancel: &CancellationToken,
    ) -> Result<Option<Message>, EngineError> {
        self.state.transition(LifecycleState::Observing, None)?;

        // 同一触发只响应一次：重复投递在观察期即放下
        if ctx.store.has_response(&self.state.name, &trigger.id).await {
            self.state.transition(LifecycleState::Idle, None)?;
            return Ok(None);
        }

        // 无可选动作不是错误，角色安静回到空闲
        let Some(spec) = self.select_action(trigger, &ctx.actions) else {
            self.state.transition(LifecycleState::Idle, None)?;
            return Ok(None);
        };
        self.state
            .transition(LifecycleState::Selecting, Some(spec.kind.clone()))?;
        self.state
            .transition(LifecycleState::Executing, Some(spec.kind.clone()))?;

        let history = ctx
            .store
            .recent_payloads(&self.state.name, ctx.history_window)
            .await;
        let action_ctx = ActionContext {
            role_name: self.state.name.clone(),
            profile: self.state.profile.clone(),
            goal: self.state.goal.clone(),
            constraints: self.state.constraints.clone(),
            history,
            trigger: trigger.clone(),
        };

        let output = self
            .execute_with_fallback(&spec, &action_ctx, ctx, cancel)
            .await?;
        self.state.transition(LifecycleState::Reflecting, None)?;

        let produced =
            Message::new(self.state.name.clone(), spec.kind.clone(), output).with_cause(trigger);

        if !spec.exempt_from_gate && !ctx.gate.is_exempt(&spec.kind) {
            let assessment = ctx.gate.evaluate(&produced, &ctx.business).await;
            if !assessment.passed {
                self.emit(
                    ctx,
                    EngineEvent::PolicyRejected {
                        role: self.state.name.clone(),
                        action: spec.kind.clone(),
                        score: assessment.compliance_score,
                        minimum: ctx.gate.minimum(),
                    },
                );
                return Err(EngineError::PolicyViolation {
                    score: assessment.compliance_score,
                    minimum: ctx.gate.minimum(),
                });
            }
        }

        let entry_id = ctx
            .store
            .append(
                produced.clone(),
                MemoryTier::ShortTerm,
                self.descriptor.objective.clone(),
            )
            .await?;
        self.emit(
            ctx,
            EngineEvent::MemoryCommitted {
                role: self.state.name.clone(),
                entry_id,
            },
        );
        self.emit(
            ctx,
            EngineEvent::ActionCompleted {
                role: self.state.name.clone(),
                action: spec.kind.clone(),
                message_id: produced.id.clone(),
            },
        );

        self.state.transition(LifecycleState::Idle, None)?;
        Ok(Some(produced))
    }

    /// 按声明顺序挑第一个资格齐备的动作：画像允许且触发上下文满足
    fn select_action(&self, trigger: &Message, registry: &ActionRegistry) -> Option<ActionSpec> {
        let fields = trigger.context_fields();
        self.descriptor.actions.iter().find_map(|kind| {
            registry
                .get(kind)
                .filter(|spec| {
                    spec.permits(&self.state.profile) && spec.context_satisfied(&fields)
                })
                .cloned()
        })
    }

    /// 沿「主模型 + 回退链」执行；每次换模型都是一次 Executing 自环
    async fn execute_with_fallback(
        &mut self,
        spec: &ActionSpec,
        action_ctx: &ActionContext,
        ctx: &RoleContext,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        let primary = spec
            .model
            .clone()
            .unwrap_or_else(|| ctx.runner.backends().default_model().to_string());
        let mut model = primary.clone();
        let mut attempts: usize = 0;

        self.emit(
            ctx,
            EngineEvent::ActionStarted {
                role: self.state.name.clone(),
                action: spec.kind.clone(),
                model: model.clone(),
            },
        );

        loop {
            attempts += 1;
            match ctx.runner.execute(spec, action_ctx, &model, cancel).await {
                Ok(output) => return Ok(output),
                Err(err) => match ctx.fallback.decide(&err, &primary, attempts) {
                    RetryDecision::Retry { model: next } => {
                        self.state
                            .transition(LifecycleState::Executing, Some(spec.kind.clone()))?;
                        tracing::warn!(
                            role = %self.state.name,
                            action = %spec.kind,
                            model = %next,
                            attempt = attempts + 1,
                            error = %err,
                            "retrying with fallback model"
                        );
                        self.emit(
                            ctx,
                            EngineEvent::ActionRetried {
                                role: self.state.name.clone(),
                                action: spec.kind.clone(),
                                model: next.clone(),
                                attempt: (attempts + 1) as u32,
                            },
                        );
                        model = next;
                    }
                    RetryDecision::GiveUp => return Err(err),
                },
            }
        }
    }

    /// 失败收敛：经 Error 归位 Idle（观察期失败直接回 Idle）
    fn fail_to_idle(&mut self) {
        use LifecycleState::*;
        let _ = match self.state.lifecycle() {
            Selecting | Executing | Reflecting => self
                .state
                .transition(Error, None)
                .and_then(|_| self.state.transition(Idle, None)),
            Observing | Error => self.state.transition(Idle, None),
            Idle => Ok(()),
        };
    }

    fn emit(&self, ctx: &RoleContext, event: EngineEvent) {
        let _ = ctx.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{BackendRegistry, LlmClient, LlmError, MockLlmClient, ModelSettings};
    use crate::policy::{BusinessRule, GateWeights, RulePredicate};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct FailingClient {
        label: String,
        log: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl LlmClient for FailingClient {
        async fn complete(
            &self,
            _prompt: &str,
            _settings: &ModelSettings,
        ) -> Result<String, LlmError> {
            self.log.lock().unwrap().push(self.label.clone());
            Err(LlmError::Connectivity("backend unreachable".to_string()))
        }
    }

    fn planner() -> Role {
        Role::new(
            RoleDescriptor::new(
                "Planner",
                "planner",
                "turn requirements into plans",
                "keep plans short",
            )
            .with_watch("requirement")
            .with_action("plan"),
        )
    }

    fn plan_registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry
            .register(ActionSpec::new("plan", "draft a short plan"))
            .unwrap();
        registry
    }

    fn mock_backends() -> BackendRegistry {
        let mut backends = BackendRegistry::new("mock");
        backends.register("mock", Arc::new(MockLlmClient::default()));
        backends
    }

    fn test_context(
        backends: BackendRegistry,
        registry: ActionRegistry,
        business: BusinessContext,
        fallback: FallbackPolicy,
    ) -> (RoleContext, mpsc::UnboundedReceiver<EngineEvent>) {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(
            PolicyGate::new(GateWeights::default(), &business)
                .unwrap()
                .with_store(store.clone()),
        );
        let runner = Arc::new(ActionRunner::new(
            Arc::new(backends),
            ModelSettings::default(),
            30,
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = RoleContext {
            store,
            gate,
            runner,
            actions: Arc::new(registry),
            business: Arc::new(business),
            fallback,
            history_window: 10,
            events: tx,
        };
        (ctx, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_step_produces_and_commits() {
        let (ctx, mut rx) = test_context(
            mock_backends(),
            plan_registry(),
            BusinessContext::new(),
            FallbackPolicy::default(),
        );
        let mut role = planner();
        let trigger = Message::new("user", "requirement", "build a todo app");
        role.deliver(trigger.clone());

        let report = role.step(&ctx, &CancellationToken::new()).await;

        let produced = report.produced.unwrap();
        assert_eq!(produced.sender, "Planner");
        assert_eq!(produced.action_kind, "plan");
        assert_eq!(produced.caused_by.as_deref(), Some(trigger.id.as_str()));
        assert!(produced.payload.starts_with("[mock] done:"));
        assert!(report.failure.is_none());
        assert_eq!(role.state().lifecycle(), LifecycleState::Idle);
        assert_eq!(ctx.store.partition_len("Planner").await, 1);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::ActionStarted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::MemoryCommitted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::ActionCompleted { .. })));
    }

    #[tokio::test]
    async fn test_fallback_walks_models_in_order() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut backends = BackendRegistry::new("primary");
        for label in ["primary", "alt-a", "alt-b"] {
            backends.register(
                label,
                Arc::new(FailingClient {
                    label: label.to_string(),
                    log: log.clone(),
                }),
            );
        }
        let fallback = FallbackPolicy {
            fallback_sequence: vec!["alt-a".to_string(), "alt-b".to_string()],
            retry_on_failure: true,
        };
        let (ctx, mut rx) = test_context(backends, plan_registry(), BusinessContext::new(), fallback);
        let mut role = planner();
        role.deliver(Message::new("user", "requirement", "build a todo app"));

        let report = role.step(&ctx, &CancellationToken::new()).await;

        assert!(matches!(
            report.failure,
            Some(EngineError::ConnectivityError(_))
        ));
        assert!(report.produced.is_none());
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "primary".to_string(),
                "alt-a".to_string(),
                "alt-b".to_string()
            ]
        );
        // 失败后角色归位，记忆无残留
        assert_eq!(role.state().lifecycle(), LifecycleState::Idle);
        assert_eq!(ctx.store.partition_len("Planner").await, 0);

        let events = drain(&mut rx);
        let retries = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::ActionRetried { .. }))
            .count();
        assert_eq!(retries, 2);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::RoleFailed { .. })));
    }

    #[tokio::test]
    async fn test_no_eligible_action_is_silent() {
        let mut registry = ActionRegistry::new();
        registry
            .register(ActionSpec::new("plan", "draft a short plan").with_profile("reviewer"))
            .unwrap();
        let (ctx, _rx) = test_context(
            mock_backends(),
            registry,
            BusinessContext::new(),
            FallbackPolicy::default(),
        );
        let mut role = planner();
        role.deliver(Message::new("user", "requirement", "build a todo app"));

        let report = role.step(&ctx, &CancellationToken::new()).await;

        assert!(report.produced.is_none());
        assert!(report.failure.is_none());
        assert_eq!(role.state().lifecycle(), LifecycleState::Idle);
        assert_eq!(ctx.store.partition_len("Planner").await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_trigger_handled_once() {
        let (ctx, _rx) = test_context(
            mock_backends(),
            plan_registry(),
            BusinessContext::new(),
            FallbackPolicy::default(),
        );
        let mut role = planner();
        let trigger = Message::new("user", "requirement", "build a todo app");

        role.deliver(trigger.clone());
        let first = role.step(&ctx, &CancellationToken::new()).await;
        assert!(first.produced.is_some());

        role.deliver(trigger.clone());
        let second = role.step(&ctx, &CancellationToken::new()).await;
        assert!(second.produced.is_none());
        assert!(second.failure.is_none());
        assert_eq!(ctx.store.partition_len("Planner").await, 1);
    }

    #[tokio::test]
    async fn test_policy_rejection_commits_nothing() {
        let business = BusinessContext::new().with_rule(BusinessRule::new(
            "r-ban",
            "must not mention forbidden words",
            RulePredicate::NotContains("forbidden".into()),
        ));
        let (ctx, mut rx) = test_context(
            mock_backends(),
            plan_registry(),
            business,
            FallbackPolicy::default(),
        );
        let mut role = planner();
        // mock 回显触发 payload，产出必然含违禁词
        role.deliver(Message::new("user", "requirement", "use the forbidden word"));

        let report = role.step(&ctx, &CancellationToken::new()).await;

        assert!(matches!(
            report.failure,
            Some(EngineError::PolicyViolation { .. })
        ));
        assert!(report.produced.is_none());
        assert_eq!(ctx.store.partition_len("Planner").await, 0);
        assert_eq!(role.state().lifecycle(), LifecycleState::Idle);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::PolicyRejected { .. })));
    }

    #[tokio::test]
    async fn test_inbox_is_fifo() {
        let (ctx, _rx) = test_context(
            mock_backends(),
            plan_registry(),
            BusinessContext::new(),
            FallbackPolicy::default(),
        );
        let mut role = planner();
        let first = Message::new("user", "requirement", "first requirement");
        let second = Message::new("user", "requirement", "second requirement");
        role.deliver(first.clone());
        role.deliver(second.clone());

        let report = role.step(&ctx, &CancellationToken::new()).await;
        assert_eq!(report.trigger.as_deref(), Some(first.id.as_str()));

        let report = role.step(&ctx, &CancellationToken::new()).await;
        assert_eq!(report.trigger.as_deref(), Some(second.id.as_str()));
    }
}
