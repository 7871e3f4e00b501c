//! File-backed stack store
//!
//! Persists one JSON document per stack under a base directory. Writes
//! land in a temp file first and are renamed into place so readers never
//! observe a partial document. Intended for development and single-node
//! setups.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use strata_core::PlatformId;
use tracing::debug;

use super::{StackFilter, StackStore};
use crate::error::{Result, StackError};
use crate::stack::Stack;

/// File-backed stack store
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_dir`, creating the directory if
    /// needed
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn stack_path(&self, id: PlatformId) -> PathBuf {
        self.base_dir.join(format!("{}.json", id))
    }

    fn write_stack(&self, stack: &Stack) -> Result<()> {
        let path = self.stack_path(stack.id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(stack)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &path)?;
        debug!(stack_id = %stack.id, path = %path.display(), "persisted stack");
        Ok(())
    }

    fn read_stack(&self, path: &Path) -> Result<Stack> {
        let body = std::fs::read(path)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl StackStore for FileStore {
    async fn create_stack(&self, stack: &Stack) -> Result<()> {
        if self.stack_path(stack.id).exists() {
            return Err(StackError::StackAlreadyExists { id: stack.id });
        }
        self.write_stack(stack)
    }

    async fn read_stack_by_id(&self, id: PlatformId) -> Result<Stack> {
        let path = self.stack_path(id);
        if !path.exists() {
            return Err(StackError::StackNotFound { id });
        }
        self.read_stack(&path)
    }

    async fn list_stacks(&self, org_id: PlatformId, filter: StackFilter) -> Result<Vec<Stack>> {
        let mut stacks = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stack = self.read_stack(&path)?;
            if stack.org_id == org_id && filter.matches(&stack) {
                stacks.push(stack);
            }
        }
        stacks.sort_by_key(|stack| stack.id);
        Ok(stacks)
    }

    async fn update_stack(&self, stack: &Stack) -> Result<()> {
        if !self.stack_path(stack.id).exists() {
            return Err(StackError::StackNotFound { id: stack.id });
        }
        self.write_stack(stack)
    }

    async fn delete_stack(&self, id: PlatformId) -> Result<()> {
        let path = self.stack_path(id);
        if !path.exists() {
            return Err(StackError::StackNotFound { id });
        }
        std::fs::remove_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (_dir, store) = temp_store();
        let stack = Stack::new(PlatformId(1), "prod", "desc", vec![]);

        store.create_stack(&stack).await.unwrap();
        let read = store.read_stack_by_id(stack.id).await.unwrap();
        assert_eq!(read, stack);
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let (_dir, store) = temp_store();
        let stack = Stack::new(PlatformId(1), "prod", "", vec![]);

        store.create_stack(&stack).await.unwrap();
        assert!(matches!(
            store.create_stack(&stack).await,
            Err(StackError::StackAlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_skips_other_orgs() {
        let (_dir, store) = temp_store();
        store.create_stack(&Stack::new(PlatformId(1), "a", "", vec![])).await.unwrap();
        store.create_stack(&Stack::new(PlatformId(2), "b", "", vec![])).await.unwrap();

        let stacks = store.list_stacks(PlatformId(1), StackFilter::default()).await.unwrap();
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].name(), "a");
    }

    #[tokio::test]
    async fn test_update_then_read_sees_new_events() {
        let (_dir, store) = temp_store();
        let mut stack = Stack::new(PlatformId(1), "prod", "", vec![]);
        store.create_stack(&stack).await.unwrap();

        stack.record_apply(vec![]);
        store.update_stack(&stack).await.unwrap();

        let read = store.read_stack_by_id(stack.id).await.unwrap();
        assert_eq!(read.events.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_fails() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.delete_stack(PlatformId(9)).await,
            Err(StackError::StackNotFound { .. })
        ));
    }
}
