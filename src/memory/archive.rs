//! 记忆归档
//!
//! 接收被淘汰的短期条目，仅支持按 id 精确取回；可选落盘为单文件 JSON
//! （打开时加载，批量写入时整体重写），不做任何查询索引。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::memory::{EntryId, MemoryEntry};

/// 归档日志：内存表 + 可选 JSON 文件
#[derive(Debug)]
pub struct MemoryArchive {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<EntryId, MemoryEntry>>,
}

impl MemoryArchive {
    /// 纯内存归档（进程退出即丢失）
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 文件归档；文件已存在时加载其中的条目
    pub fn with_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries = HashMap::new();
        if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let loaded: Vec<MemoryEntry> = serde_json::from_str(&data)?;
            for entry in loaded {
                entries.insert(entry.id, entry);
            }
        }
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    /// 批量归档（淘汰一批条目时整体写盘一次）
    pub fn store_many(&self, batch: Vec<MemoryEntry>) -> anyhow::Result<()> {
        let mut entries = self.entries.write().unwrap();
        for entry in batch {
            entries.insert(entry.id, entry);
        }
        if let Some(ref path) = self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut all: Vec<&MemoryEntry> = entries.values().collect();
            all.sort_by_key(|e| e.id);
            std::fs::write(path, serde_json::to_string_pretty(&all)?)?;
        }
        Ok(())
    }

    /// 按 id 精确取回
    pub fn get(&self, id: EntryId) -> Option<MemoryEntry> {
        self.entries.read().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Message, MemoryTier};

    fn entry(id: EntryId) -> MemoryEntry {
        MemoryEntry {
            id,
            message: Message::new("planner", "plan", format!("payload {id}")),
            tier: MemoryTier::ShortTerm,
            objective_id: None,
            indexed_at: chrono::Utc::now().timestamp_millis(),
            promoted_from: None,
        }
    }

    #[test]
    fn test_in_memory_archive_roundtrip() {
        let archive = MemoryArchive::in_memory();
        archive.store_many(vec![entry(1), entry(2)]).unwrap();

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.get(1).unwrap().message.payload, "payload 1");
        assert!(archive.get(9).is_none());
    }

    #[test]
    fn test_file_archive_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.json");

        let archive = MemoryArchive::with_file(&path).unwrap();
        archive.store_many(vec![entry(7)]).unwrap();
        drop(archive);

        let reopened = MemoryArchive::with_file(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(7).unwrap().message.payload, "payload 7");
    }
}
