//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，
//! 如 `HIVE__POLICY__MINIMUM_COMPLIANCE_SCORE=0.9`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub dispatcher: DispatcherSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub budget: BudgetSection,
}

/// [app] 段：应用名
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：默认模型、采样参数、单次调用超时与回退链
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model_name")]
    pub default_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// 每分钟请求上限；None 不设限
    #[serde(default)]
    pub rate_limit: Option<u32>,
    /// 单次动作调用超时（秒）
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    /// 主模型失败后依次尝试的后备模型
    #[serde(default)]
    pub fallback_sequence: Vec<String>,
    #[serde(default = "default_retry_on_failure")]
    pub retry_on_failure: bool,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            default_model: default_model_name(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            rate_limit: None,
            action_timeout_secs: default_action_timeout_secs(),
            fallback_sequence: Vec::new(),
            retry_on_failure: default_retry_on_failure(),
        }
    }
}

fn default_model_name() -> String {
    "mock".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

fn default_action_timeout_secs() -> u64 {
    60
}

fn default_retry_on_failure() -> bool {
    true
}

/// [dispatcher] 段：每轮并发执行的角色数上限
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// [policy] 段：合规门控权重与豁免动作
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySection {
    #[serde(default = "default_policy_weight")]
    pub policy_weight: f64,
    #[serde(default = "default_rule_weight")]
    pub rule_weight: f64,
    #[serde(default = "default_goal_alignment_weight")]
    pub goal_alignment_weight: f64,
    #[serde(default = "default_minimum_compliance_score")]
    pub minimum_compliance_score: f64,
    /// 免检的动作种类
    #[serde(default)]
    pub exempt_kinds: Vec<String>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            policy_weight: default_policy_weight(),
            rule_weight: default_rule_weight(),
            goal_alignment_weight: default_goal_alignment_weight(),
            minimum_compliance_score: default_minimum_compliance_score(),
            exempt_kinds: Vec::new(),
        }
    }
}

fn default_policy_weight() -> f64 {
    0.4
}

fn default_rule_weight() -> f64 {
    0.3
}

fn default_goal_alignment_weight() -> f64 {
    0.3
}

fn default_minimum_compliance_score() -> f64 {
    0.8
}

/// [memory] 段：归档文件、短期记忆保留期与提示词历史窗口
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    /// 逐出条目的归档 JSON 文件；未设置则仅内存归档
    #[serde(default)]
    pub archive_path: Option<PathBuf>,
    /// 短期记忆保留期（秒），超期条目可被逐出
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// 提示词携带的近期记忆条数
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            archive_path: None,
            retention_secs: default_retention_secs(),
            history_window: default_history_window(),
        }
    }
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_history_window() -> usize {
    10
}

/// [budget] 段：轮次上限与 LLM 调用预算
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetSection {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u64,
    /// LLM 调用总数上限；None 不设限
    #[serde(default)]
    pub max_llm_calls: Option<u64>,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_llm_calls: None,
        }
    }
}

fn default_max_rounds() -> u64 {
    16
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            dispatcher: DispatcherSection::default(),
            policy: PolicySection::default(),
            memory: MemorySection::default(),
            budget: BudgetSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置（用于运行中按新权重或预算重建环境）
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
