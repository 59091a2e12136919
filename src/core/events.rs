//! 引擎过程事件：用于结构化观察一轮运行内发生了什么

use serde::Serialize;

use crate::memory::{ActionKind, EntryId, MessageId, RoleId};

/// 运行期事件（可序列化为 JSON 供日志与外部消费）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// 新一轮调度开始
    RoundStarted { round: u64 },
    /// 一条消息进入总线历史
    MessagePublished {
        message_id: MessageId,
        sender: RoleId,
        action_kind: ActionKind,
    },
    /// 消息按观察列表投递给某个角色
    MessageRouted {
        message_id: MessageId,
        recipient: RoleId,
    },
    /// 角色开始执行动作（首个模型）
    ActionStarted {
        role: RoleId,
        action: ActionKind,
        model: String,
    },
    /// 失败换模型重试（attempt 从 2 起计）
    ActionRetried {
        role: RoleId,
        action: ActionKind,
        model: String,
        attempt: u32,
    },
    /// 动作成功并发布产出
    ActionCompleted {
        role: RoleId,
        action: ActionKind,
        message_id: MessageId,
    },
    /// 产出未过合规门控
    PolicyRejected {
        role: RoleId,
        action: ActionKind,
        score: f64,
        minimum: f64,
    },
    /// 产出写入记忆
    MemoryCommitted { role: RoleId, entry_id: EntryId },
    /// 角色本步失败（已就地收敛回 Idle）
    RoleFailed { role: RoleId, error: String },
    /// 运行结束
    RunFinished { outcome: String, rounds: u64 },
}
