//! Storage drivers for persisting stacks
//!
//! Two drivers ship with the crate:
//! - **Memory**: in-process map, used by tests and embedded callers
//! - **File**: one JSON document per stack under a base directory, for
//!   development setups
//!
//! Production deployments implement [`StackStore`] over their own
//! persistence.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::{MemoryStore, OperationCounts};

use async_trait::async_trait;
use strata_core::PlatformId;

use crate::error::Result;
use crate::stack::Stack;

/// Storage driver trait for stack persistence
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait StackStore: Send + Sync {
    /// Persist a freshly initialized stack
    async fn create_stack(&self, stack: &Stack) -> Result<()>;

    /// Read a stack by its identifier
    async fn read_stack_by_id(&self, id: PlatformId) -> Result<Stack>;

    /// List stacks in an organization, narrowed by an optional filter
    async fn list_stacks(&self, org_id: PlatformId, filter: StackFilter) -> Result<Vec<Stack>>;

    /// Replace a stack's persisted state
    async fn update_stack(&self, stack: &Stack) -> Result<()>;

    /// Remove a stack
    async fn delete_stack(&self, id: PlatformId) -> Result<()>;
}

/// Filter for [`StackStore::list_stacks`]
///
/// Values within a field are OR'd; fields are AND'd together. Names
/// match the latest event's name.
#[derive(Debug, Clone, Default)]
pub struct StackFilter {
    pub ids: Vec<PlatformId>,

    pub names: Vec<String>,
}

impl StackFilter {
    /// Check whether a stack passes this filter
    pub fn matches(&self, stack: &Stack) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&stack.id) {
            return false;
        }
        if !self.names.is_empty() && !self.names.iter().any(|n| n == stack.name()) {
            return false;
        }
        true
    }
}
