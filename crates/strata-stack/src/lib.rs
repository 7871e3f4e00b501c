//! Strata Stack - persistent template-to-resource bindings
//!
//! This crate provides:
//! - **Stack Model**: Append-only event logs binding a template instance
//!   to the platform identities it realized
//! - **State Machine**: Created, Active, and terminal Uninstalled states
//!   derived from the event tail
//! - **Storage Drivers**: Persist stacks in memory or as local JSON files

pub mod error;
pub mod stack;
pub mod store;

pub use error::{Result, StackError};
pub use stack::{
    AdditionalResource, EventType, Stack, StackAssociation, StackEvent, StackResource, StackState,
    StackUpdate,
};
pub use store::{FileStore, MemoryStore, OperationCounts, StackFilter, StackStore};
