//! 消息：角色间交换的不可变事件
//!
//! 由动作成功产出或外部注入，按 action_kind 路由到 watch 它的角色；
//! caused_by 指向父消息，id 在构造时生成，链条天然无环。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// 角色 ID（注册表键，取自描述符的 name）
pub type RoleId = String;
/// 消息 ID（"msg_" + UUID v4）
pub type MessageId = String;
/// 动作种类（ActionSpec 的唯一标识）
pub type ActionKind = String;

/// 单条消息：创建后不可变，所有权随 append 转移给存储
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: RoleId,
    pub action_kind: ActionKind,
    pub payload: String,
    pub caused_by: Option<MessageId>,
    /// 毫秒时间戳
    pub timestamp: i64,
}

impl Message {
    pub fn new(
        sender: impl Into<RoleId>,
        action_kind: impl Into<ActionKind>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            sender: sender.into(),
            action_kind: action_kind.into(),
            payload: payload.into(),
            caused_by: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_cause(mut self, parent: &Message) -> Self {
        self.caused_by = Some(parent.id.clone());
        self
    }

    /// 提取上下文字段集合，供动作资格判定（required_context_fields）使用：
    /// payload 为 JSON 对象时取其键；非空 payload 恒有 "content"
    pub fn context_fields(&self) -> HashSet<String> {
        let mut fields = HashSet::new();
        if !self.payload.trim().is_empty() {
            fields.insert("content".to_string());
        }
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(&self.payload) {
            for key in map.keys() {
                fields.insert(key.clone());
            }
        }
        fields
    }
}
