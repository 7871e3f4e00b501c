//! In-memory stack store
//!
//! Stores stacks in a process-local map. Useful for unit tests and
//! embedded callers that do not need durability.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use strata_core::PlatformId;

use super::{StackFilter, StackStore};
use crate::error::{Result, StackError};
use crate::stack::Stack;

/// In-memory stack store
#[derive(Clone, Default)]
pub struct MemoryStore {
    stacks: Arc<RwLock<HashMap<PlatformId, Stack>>>,

    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub creates: usize,
    pub reads: usize,
    pub lists: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated stacks
    pub fn with_stacks(stacks: Vec<Stack>) -> Self {
        let store = Self::new();
        {
            let mut map = store.stacks.write().unwrap();
            for stack in stacks {
                map.insert(stack.id, stack);
            }
        }
        store
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    /// Count stored stacks
    pub fn stack_count(&self) -> usize {
        self.stacks.read().unwrap().len()
    }
}

#[async_trait]
impl StackStore for MemoryStore {
    async fn create_stack(&self, stack: &Stack) -> Result<()> {
        self.operations.write().unwrap().creates += 1;

        let mut map = self.stacks.write().unwrap();
        if map.contains_key(&stack.id) {
            return Err(StackError::StackAlreadyExists { id: stack.id });
        }
        map.insert(stack.id, stack.clone());
        Ok(())
    }

    async fn read_stack_by_id(&self, id: PlatformId) -> Result<Stack> {
        self.operations.write().unwrap().reads += 1;

        self.stacks
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StackError::StackNotFound { id })
    }

    async fn list_stacks(&self, org_id: PlatformId, filter: StackFilter) -> Result<Vec<Stack>> {
        self.operations.write().unwrap().lists += 1;

        let mut stacks: Vec<Stack> = self
            .stacks
            .read()
            .unwrap()
            .values()
            .filter(|stack| stack.org_id == org_id && filter.matches(stack))
            .cloned()
            .collect();
        stacks.sort_by_key(|stack| stack.id);
        Ok(stacks)
    }

    async fn update_stack(&self, stack: &Stack) -> Result<()> {
        self.operations.write().unwrap().updates += 1;

        let mut map = self.stacks.write().unwrap();
        if !map.contains_key(&stack.id) {
            return Err(StackError::StackNotFound { id: stack.id });
        }
        map.insert(stack.id, stack.clone());
        Ok(())
    }

    async fn delete_stack(&self, id: PlatformId) -> Result<()> {
        self.operations.write().unwrap().deletes += 1;

        self.stacks
            .write()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(StackError::StackNotFound { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_read() {
        let store = MemoryStore::new();
        let stack = Stack::new(PlatformId(1), "prod", "", vec![]);

        store.create_stack(&stack).await.unwrap();
        let read = store.read_stack_by_id(stack.id).await.unwrap();
        assert_eq!(read, stack);

        let counts = store.operation_counts();
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.reads, 1);
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let store = MemoryStore::new();
        let stack = Stack::new(PlatformId(1), "prod", "", vec![]);

        store.create_stack(&stack).await.unwrap();
        let result = store.create_stack(&stack).await;
        assert!(matches!(result, Err(StackError::StackAlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_read_missing_fails() {
        let store = MemoryStore::new();
        let result = store.read_stack_by_id(PlatformId(42)).await;
        assert!(matches!(result, Err(StackError::StackNotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_filters_by_org() {
        let store = MemoryStore::with_stacks(vec![
            Stack::new(PlatformId(1), "a", "", vec![]),
            Stack::new(PlatformId(1), "b", "", vec![]),
            Stack::new(PlatformId(2), "c", "", vec![]),
        ]);

        let in_org = store.list_stacks(PlatformId(1), StackFilter::default()).await.unwrap();
        assert_eq!(in_org.len(), 2);
    }

    #[tokio::test]
    async fn test_list_filters_by_name() {
        let store = MemoryStore::with_stacks(vec![
            Stack::new(PlatformId(1), "a", "", vec![]),
            Stack::new(PlatformId(1), "b", "", vec![]),
        ]);

        let filter = StackFilter {
            names: vec!["b".to_string()],
            ..StackFilter::default()
        };
        let named = store.list_stacks(PlatformId(1), filter).await.unwrap();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].name(), "b");
    }

    #[tokio::test]
    async fn test_update_requires_existing() {
        let store = MemoryStore::new();
        let stack = Stack::new(PlatformId(1), "prod", "", vec![]);

        let result = store.update_stack(&stack).await;
        assert!(matches!(result, Err(StackError::StackNotFound { .. })));

        store.create_stack(&stack).await.unwrap();
        store.update_stack(&stack).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_stack() {
        let store = MemoryStore::new();
        let stack = Stack::new(PlatformId(1), "prod", "", vec![]);

        store.create_stack(&stack).await.unwrap();
        store.delete_stack(stack.id).await.unwrap();
        assert_eq!(store.stack_count(), 0);

        let result = store.delete_stack(stack.id).await;
        assert!(matches!(result, Err(StackError::StackNotFound { .. })));
    }
}
