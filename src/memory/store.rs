//! 分层记忆存储
//!
//! 每个角色一个只追加的分区日志（分区键 = message.sender），外加三类查询索引：
//! 按新近度、按动作种类、按业务目标（跨角色，追加时增量维护）。
//! 条目写入后不可变；short_term 提升到 long_term 是新条目而非原地修改；
//! 淘汰只作用于过期的 short_term 条目，移出快速索引后交给归档日志。

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::EngineError;
use crate::memory::{ActionKind, MemoryArchive, Message, MessageId, RoleId};

/// 条目 ID（存储内单调递增序号）
pub type EntryId = u64;

/// 记忆层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    ShortTerm,
    LongTerm,
}

/// 单条记忆：写入后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: EntryId,
    pub message: Message,
    pub tier: MemoryTier,
    pub objective_id: Option<String>,
    /// 入库毫秒时间戳；同分区内单调不减
    pub indexed_at: i64,
    /// 提升来源（仅 long_term 提升条目持有）
    pub promoted_from: Option<EntryId>,
}

#[derive(Default)]
struct StoreInner {
    next_id: EntryId,
    entries: HashMap<EntryId, MemoryEntry>,
    /// 角色分区：追加顺序的条目 id 列表
    partitions: HashMap<RoleId, Vec<EntryId>>,
    /// 业务目标索引：追加时增量维护
    by_objective: HashMap<String, Vec<EntryId>>,
    /// 已提升的 short_term 条目 -> 对应 long_term 条目（保证提升幂等）
    promoted: HashMap<EntryId, EntryId>,
}

/// 分层记忆存储：多角色并发追加安全（各角色只写自己的分区）
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
    archive: Option<MemoryArchive>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            archive: None,
        }
    }

    pub fn with_archive(archive: MemoryArchive) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            archive: Some(archive),
        }
    }

    /// 追加一条记忆；分区取 message.sender，时间戳向分区尾部钳制以保持单调
    pub async fn append(
        &self,
        message: Message,
        tier: MemoryTier,
        objective_id: Option<String>,
    ) -> Result<EntryId, EngineError> {
        let mut inner = self.inner.write().await;
        let id = inner.next_id;
        inner.next_id += 1;

        let now = chrono::Utc::now().timestamp_millis();
        let floor = Self::partition_tail_ts(&inner, &message.sender);
        let entry = MemoryEntry {
            id,
            message,
            tier,
            objective_id,
            indexed_at: now.max(floor),
            promoted_from: None,
        };

        Self::index_entry(&mut inner, entry);
        Ok(id)
    }

    /// window 内的条目，最新在末尾
    pub async fn query_recent(&self, role_id: &str, window: Duration) -> Vec<MemoryEntry> {
        let cutoff = chrono::Utc::now().timestamp_millis() - window.as_millis() as i64;
        let inner = self.inner.read().await;
        Self::partition_entries(&inner, role_id)
            .filter(|e| e.indexed_at >= cutoff)
            .cloned()
            .collect()
    }

    /// 按动作种类过滤，保持追加顺序
    pub async fn query_by_action(
        &self,
        role_id: &str,
        kinds: &HashSet<ActionKind>,
    ) -> Vec<MemoryEntry> {
        let inner = self.inner.read().await;
        Self::partition_entries(&inner, role_id)
            .filter(|e| kinds.contains(&e.message.action_kind))
            .cloned()
            .collect()
    }

    /// 跨角色按业务目标查询（靠追加时维护的索引，O(k)）
    pub async fn query_by_objective(&self, objective_id: &str) -> Vec<MemoryEntry> {
        let inner = self.inner.read().await;
        inner
            .by_objective
            .get(objective_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.entries.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 提升为 long_term：产生引用原条目的新条目；幂等——
    /// 对 long_term 条目提升返回其自身 id，对已提升条目返回先前的 long_term id
    pub async fn promote(&self, entry_id: EntryId) -> Result<EntryId, EngineError> {
        let mut inner = self.inner.write().await;
        let original = inner
            .entries
            .get(&entry_id)
            .cloned()
            .ok_or_else(|| EngineError::InvalidArgument(format!("unknown entry: {entry_id}")))?;

        if original.tier == MemoryTier::LongTerm {
            return Ok(entry_id);
        }
        if let Some(&long_term_id) = inner.promoted.get(&entry_id) {
            return Ok(long_term_id);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let now = chrono::Utc::now().timestamp_millis();
        let floor = Self::partition_tail_ts(&inner, &original.message.sender);
        let entry = MemoryEntry {
            id,
            message: original.message,
            tier: MemoryTier::LongTerm,
            objective_id: original.objective_id,
            indexed_at: now.max(floor),
            promoted_from: Some(entry_id),
        };

        Self::index_entry(&mut inner, entry);
        inner.promoted.insert(entry_id, id);
        Ok(id)
    }

    /// 淘汰早于保留期的 short_term 条目：先整批写入归档（若配置），再移出快速索引；
    /// long_term 条目不受影响。返回淘汰条数
    pub async fn evict_expired(&self, retention: Duration) -> Result<usize, EngineError> {
        let cutoff = chrono::Utc::now().timestamp_millis() - retention.as_millis() as i64;
        let mut inner = self.inner.write().await;

        let expired: HashSet<EntryId> = inner
            .entries
            .values()
            .filter(|e| e.tier == MemoryTier::ShortTerm && e.indexed_at < cutoff)
            .map(|e| e.id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        if let Some(ref archive) = self.archive {
            let batch: Vec<MemoryEntry> = expired
                .iter()
                .filter_map(|id| inner.entries.get(id).cloned())
                .collect();
            archive
                .store_many(batch)
                .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        }

        for id in &expired {
            inner.entries.remove(id);
        }
        for ids in inner.partitions.values_mut() {
            ids.retain(|id| !expired.contains(id));
        }
        for ids in inner.by_objective.values_mut() {
            ids.retain(|id| !expired.contains(id));
        }
        inner.promoted.retain(|original, _| !expired.contains(original));

        Ok(expired.len())
    }

    /// 快速索引中按 id 查找（归档条目请走 archive().get）
    pub async fn get(&self, entry_id: EntryId) -> Option<MemoryEntry> {
        self.inner.read().await.entries.get(&entry_id).cloned()
    }

    pub fn archive(&self) -> Option<&MemoryArchive> {
        self.archive.as_ref()
    }

    pub async fn partition_len(&self, role_id: &str) -> usize {
        self.inner
            .read()
            .await
            .partitions
            .get(role_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// 分区里是否已有对某触发消息的回应（role 去重用）
    pub async fn has_response(&self, role_id: &str, trigger_id: &MessageId) -> bool {
        let inner = self.inner.read().await;
        let found = Self::partition_entries(&inner, role_id)
            .any(|e| e.message.caused_by.as_ref() == Some(trigger_id));
        found
    }

    /// 分区最近 n 条 payload，最新在末尾（Prompt 历史与重复提案检查用）
    pub async fn recent_payloads(&self, role_id: &str, n: usize) -> Vec<String> {
        let inner = self.inner.read().await;
        let payloads: Vec<String> = Self::partition_entries(&inner, role_id)
            .map(|e| e.message.payload.clone())
            .collect();
        let skip = payloads.len().saturating_sub(n);
        payloads.into_iter().skip(skip).collect()
    }

    fn partition_entries<'a>(
        inner: &'a StoreInner,
        role_id: &str,
    ) -> impl Iterator<Item = &'a MemoryEntry> + 'a {
        inner
            .partitions
            .get(role_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.entries.get(id))
    }

    fn partition_tail_ts(inner: &StoreInner, role_id: &str) -> i64 {
        inner
            .partitions
            .get(role_id)
            .and_then(|ids| ids.last())
            .and_then(|id| inner.entries.get(id))
            .map(|e| e.indexed_at)
            .unwrap_or(i64::MIN)
    }

    fn index_entry(inner: &mut StoreInner, entry: MemoryEntry) {
        inner
            .partitions
            .entry(entry.message.sender.clone())
            .or_default()
            .push(entry.id);
        if let Some(ref objective) = entry.objective_id {
            inner
                .by_objective
                .entry(objective.clone())
                .or_default()
                .push(entry.id);
        }
        inner.entries.insert(entry.id, entry);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn append_plain(store: &MemoryStore, sender: &str, payload: &str) -> EntryId {
        store
            .append(Message::new(sender, "plan", payload), MemoryTier::ShortTerm, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_append_keeps_partition_timestamps_monotonic() {
        let store = MemoryStore::new();
        for i in 0..20 {
            append_plain(&store, "planner", &format!("step {i}")).await;
        }

        let entries = store.query_recent("planner", Duration::from_secs(60)).await;
        assert_eq!(entries.len(), 20);
        for pair in entries.windows(2) {
            assert!(pair[0].indexed_at <= pair[1].indexed_at);
        }
        // 最新在末尾
        assert_eq!(entries.last().unwrap().message.payload, "step 19");
    }

    #[tokio::test]
    async fn test_query_by_action_preserves_order() {
        let store = MemoryStore::new();
        store
            .append(Message::new("planner", "plan", "a"), MemoryTier::ShortTerm, None)
            .await
            .unwrap();
        store
            .append(Message::new("planner", "review", "b"), MemoryTier::ShortTerm, None)
            .await
            .unwrap();
        store
            .append(Message::new("planner", "plan", "c"), MemoryTier::ShortTerm, None)
            .await
            .unwrap();

        let kinds: HashSet<ActionKind> = ["plan".to_string()].into_iter().collect();
        let entries = store.query_by_action("planner", &kinds).await;
        let payloads: Vec<&str> = entries.iter().map(|e| e.message.payload.as_str()).collect();
        assert_eq!(payloads, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_objective_index_is_cross_role() {
        let store = MemoryStore::new();
        store
            .append(
                Message::new("planner", "plan", "plan body"),
                MemoryTier::ShortTerm,
                Some("launch".to_string()),
            )
            .await
            .unwrap();
        store
            .append(
                Message::new("executor", "execution", "exec body"),
                MemoryTier::ShortTerm,
                Some("launch".to_string()),
            )
            .await
            .unwrap();
        store
            .append(
                Message::new("executor", "execution", "other"),
                MemoryTier::ShortTerm,
                Some("research".to_string()),
            )
            .await
            .unwrap();

        let entries = store.query_by_objective("launch").await;
        assert_eq!(entries.len(), 2);
        let senders: Vec<&str> = entries.iter().map(|e| e.message.sender.as_str()).collect();
        assert_eq!(senders, vec!["planner", "executor"]);
    }

    #[tokio::test]
    async fn test_promote_is_idempotent() {
        let store = MemoryStore::new();
        let original = append_plain(&store, "planner", "keep this").await;

        let promoted = store.promote(original).await.unwrap();
        assert_ne!(promoted, original);
        assert_eq!(
            store.get(promoted).await.unwrap().promoted_from,
            Some(original)
        );

        // 再次提升原条目：返回先前的 long_term id
        assert_eq!(store.promote(original).await.unwrap(), promoted);
        // 提升 long_term 条目：no-op，返回自身
        assert_eq!(store.promote(promoted).await.unwrap(), promoted);

        assert!(matches!(
            store.promote(9999).await,
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_eviction_spares_long_term_and_archives_short_term() {
        let store = MemoryStore::with_archive(MemoryArchive::in_memory());
        let short = append_plain(&store, "planner", "ephemeral").await;
        let keep = append_plain(&store, "planner", "important").await;
        let long_term = store.promote(keep).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let evicted = store.evict_expired(Duration::from_millis(10)).await.unwrap();
        assert_eq!(evicted, 2); // short + keep 原条目；long_term 拷贝保留

        let recent = store.query_recent("planner", Duration::from_secs(60)).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, long_term);

        // 被淘汰的条目可从归档按 id 取回
        let archive = store.archive().unwrap();
        assert_eq!(archive.get(short).unwrap().message.payload, "ephemeral");
        assert_eq!(archive.get(keep).unwrap().message.payload, "important");
        assert!(store.get(short).await.is_none());
    }

    #[tokio::test]
    async fn test_has_response_and_recent_payloads() {
        let store = MemoryStore::new();
        let trigger = Message::new("user", "requirement", "do it");
        let reply = Message::new("planner", "plan", "done").with_cause(&trigger);
        store
            .append(reply, MemoryTier::ShortTerm, None)
            .await
            .unwrap();

        assert!(store.has_response("planner", &trigger.id).await);
        assert!(!store.has_response("executor", &trigger.id).await);

        append_plain(&store, "planner", "second").await;
        let payloads = store.recent_payloads("planner", 1).await;
        assert_eq!(payloads, vec!["second"]);
    }
}
