//! 环境装配
//!
//! 把后端、动作、角色、门控、预算等零件拼成可运行的 Environment。
//! 所有引用完整性检查（默认模型、动作首选模型、回退链、角色声明的动作、
//! 门控权重）都在 build 时一次做完，坏配置在启动期就报 ConfigurationError。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::action::{ActionRegistry, ActionRunner, ActionSpec};
use crate::config::AppConfig;
use crate::core::{Dispatcher, EngineError, EngineEvent, Environment, RunSupervisor};
use crate::llm::{BackendRegistry, MockLlmClient, ModelSettings};
use crate::memory::{ActionKind, MemoryArchive, MemoryStore};
use crate::policy::{BusinessContext, GateWeights, PolicyGate};
use crate::role::{FallbackPolicy, RoleContext, RoleDescriptor};

pub struct EnvironmentBuilder {
    backends: Option<BackendRegistry>,
    settings: ModelSettings,
    business: BusinessContext,
    weights: GateWeights,
    actions: Vec<ActionSpec>,
    roles: Vec<RoleDescriptor>,
    fallback: FallbackPolicy,
    exempt_kinds: Vec<ActionKind>,
    archive: Option<MemoryArchive>,
    history_window: usize,
    action_timeout_secs: u64,
    concurrency: usize,
    max_rounds: u64,
    max_llm_calls: Option<u64>,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentBuilder {
    pub fn new() -> Self {
        Self {
            backends: None,
            settings: ModelSettings::default(),
            business: BusinessContext::new(),
            weights: GateWeights::default(),
            actions: Vec::new(),
            roles: Vec::new(),
            fallback: FallbackPolicy::default(),
            exempt_kinds: Vec::new(),
            archive: None,
            history_window: 10,
            action_timeout_secs: 60,
            concurrency: 4,
            max_rounds: 16,
            max_llm_calls: None,
        }
    }

    /// 按配置文件预填各参数；归档文件打不开返回 StorageUnavailable
    pub fn from_config(config: &AppConfig) -> Result<Self, EngineError> {
        let mut builder = Self::new()
            .with_settings(ModelSettings {
                max_tokens: config.llm.max_tokens,
                temperature: config.llm.temperature,
                rate_limit: config.llm.rate_limit,
            })
            .with_weights(GateWeights {
                policy_weight: config.policy.policy_weight,
                rule_weight: config.policy.rule_weight,
                goal_alignment_weight: config.policy.goal_alignment_weight,
                minimum_compliance_score: config.policy.minimum_compliance_score,
            })
            .with_fallback(FallbackPolicy {
                fallback_sequence: config.llm.fallback_sequence.clone(),
                retry_on_failure: config.llm.retry_on_failure,
            })
            .with_history_window(config.memory.history_window)
            .with_action_timeout(config.llm.action_timeout_secs)
            .with_concurrency(config.dispatcher.concurrency)
            .with_max_rounds(config.budget.max_rounds);

        for kind in &config.policy.exempt_kinds {
            builder = builder.with_exempt_kind(kind.clone());
        }
        if let Some(limit) = config.budget.max_llm_calls {
            builder = builder.with_max_llm_calls(limit);
        }
        if let Some(path) = &config.memory.archive_path {
            let archive = MemoryArchive::with_file(path)
                .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
            builder = builder.with_archive(archive);
        }
        Ok(builder)
    }

    pub fn with_backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_business(mut self, business: BusinessContext) -> Self {
        self.business = business;
        self
    }

    pub fn with_weights(mut self, weights: GateWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_action(mut self, spec: ActionSpec) -> Self {
        self.actions.push(spec);
        self
    }

    pub fn with_actions(mut self, specs: impl IntoIterator<Item = ActionSpec>) -> Self {
        self.actions.extend(specs);
        self
    }

    pub fn with_role(mut self, descriptor: RoleDescriptor) -> Self {
        self.roles.push(descriptor);
        self
    }

    pub fn with_roles(mut self, descriptors: impl IntoIterator<Item = RoleDescriptor>) -> Self {
        self.roles.extend(descriptors);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_exempt_kind(mut self, kind: impl Into<ActionKind>) -> Self {
        self.exempt_kinds.push(kind.into());
        self
    }

    pub fn with_archive(mut self, archive: MemoryArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_action_timeout(mut self, secs: u64) -> Self {
        self.action_timeout_secs = secs;
        self
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u64) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_max_llm_calls(mut self, limit: u64) -> Self {
        self.max_llm_calls = Some(limit);
        self
    }

    /// 装配并校验；返回环境与事件接收端
    pub fn build(self) -> Result<(Environment, mpsc::UnboundedReceiver<EngineEvent>), EngineError> {
        // 未配置后端时给一个回显 mock，便于离线运行与测试
        let backends = self.backends.unwrap_or_else(|| {
            let mut registry = BackendRegistry::new("mock");
            registry.register("mock", Arc::new(MockLlmClient::default()));
            registry
        });
        if !backends.contains(backends.default_model()) {
            return Err(EngineError::ConfigurationError(format!(
                "default model is not registered: {}",
                backends.default_model()
            )));
        }
        for model in &self.fallback.fallback_sequence {
            if !backends.contains(model) {
                return Err(EngineError::ConfigurationError(format!(
                    "fallback model is not registered: {model}"
                )));
            }
        }

        let mut registry = ActionRegistry::new();
        for spec in self.actions {
            if let Some(model) = &spec.model {
                if !backends.contains(model) {
                    return Err(EngineError::ConfigurationError(format!(
                        "action {} prefers unregistered model: {model}",
                        spec.kind
                    )));
                }
            }
            registry.register(spec)?;
        }

        let store = Arc::new(match self.archive {
            Some(archive) => MemoryStore::with_archive(archive),
            None => MemoryStore::new(),
        });
        let gate = Arc::new(
            PolicyGate::new(self.weights, &self.business)?
                .with_store(store.clone())
                .with_exempt_kinds(self.exempt_kinds),
        );
        let runner = Arc::new(ActionRunner::new(
            Arc::new(backends),
            self.settings,
            self.action_timeout_secs,
        ));
        let dispatcher = Dispatcher::new(self.concurrency)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(RoleContext {
            store,
            gate,
            runner,
            actions: Arc::new(registry),
            business: Arc::new(self.business),
            fallback: self.fallback,
            history_window: self.history_window,
            events: tx.clone(),
        });

        let mut environment = Environment::new(
            ctx,
            dispatcher,
            RunSupervisor::new(),
            self.max_rounds,
            self.max_llm_calls,
            tx,
        );
        for descriptor in self.roles {
            environment.register_role(descriptor)?;
        }
        Ok((environment, rx))
    }
}
