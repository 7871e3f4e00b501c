//! Error types for the reconciliation engine

use strata_core::{Kind, ValidationDefect};
use thiserror::Error;

/// Result type for strata-engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by planning, applying, and exporting
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Aggregate of every template defect found during an invocation
    #[error("template validation failed with {} defect(s)", defects.len())]
    Validation { defects: Vec<ValidationDefect> },

    /// Aggregate of every unresolved cross-reference
    #[error("{} unresolved reference(s)", missing.len())]
    RefMissing { missing: Vec<MissingReference> },

    /// A referenced entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with current state (missing org,
    /// uninstalled stack, duplicate stack)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Upstream resource service failure
    #[error("remote service failure: {0}")]
    Remote(String),

    /// Apply failed and compensating rollback ran
    ///
    /// `diagnostics` carries rollback steps that themselves failed; it
    /// never masks the root cause.
    #[error("apply failed after rolling back {} change(s): {cause}", rolled_back.len())]
    Rollback {
        cause: Box<EngineError>,
        /// Human-readable descriptions of the changes that were undone
        rolled_back: Vec<String>,
        /// Rollback steps that failed, best-effort logged
        diagnostics: Vec<String>,
    },

    /// The caller's cancellation handle fired
    #[error("operation cancelled")]
    Cancelled,

    /// Invariant violation inside the engine or a store failure
    #[error("internal error: {0}")]
    Internal(String),
}

/// A reference that did not resolve within the template or bound stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingReference {
    /// Kind of the resource holding the reference
    pub kind: Kind,

    /// MetaName of the resource holding the reference
    pub meta_name: String,

    /// Field carrying the reference
    pub field: String,

    /// The MetaName that failed to resolve
    pub reference: String,
}

impl std::fmt::Display for MissingReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}: {} references unknown '{}'",
            self.kind, self.meta_name, self.field, self.reference
        )
    }
}

impl EngineError {
    /// Root cause, unwrapping rollback wrappers
    pub fn root_cause(&self) -> &EngineError {
        match self {
            EngineError::Rollback { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root_cause(), EngineError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), EngineError::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), EngineError::Cancelled)
    }
}

impl From<crate::services::ServiceError> for EngineError {
    fn from(err: crate::services::ServiceError) -> Self {
        use crate::services::ServiceError;
        match err {
            ServiceError::Cancelled => EngineError::Cancelled,
            ServiceError::NotFound => EngineError::NotFound("resource".to_string()),
            ServiceError::Conflict(msg) => EngineError::Conflict(msg),
            ServiceError::Invalid(msg) => EngineError::Internal(msg),
            ServiceError::Remote(msg) => EngineError::Remote(msg),
        }
    }
}

impl From<strata_core::CoreError> for EngineError {
    fn from(err: strata_core::CoreError) -> Self {
        match err {
            strata_core::CoreError::Validation { defects } => EngineError::Validation { defects },
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<strata_stack::StackError> for EngineError {
    fn from(err: strata_stack::StackError) -> Self {
        match err {
            strata_stack::StackError::StackNotFound { id } => {
                EngineError::NotFound(format!("stack '{}'", id))
            }
            strata_stack::StackError::StackAlreadyExists { id } => {
                EngineError::Conflict(format!("stack '{}' already exists", id))
            }
            other => EngineError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_rollback() {
        let err = EngineError::Rollback {
            cause: Box::new(EngineError::Cancelled),
            rolled_back: vec!["Label/one".to_string()],
            diagnostics: vec![],
        };
        assert!(err.is_cancelled());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_stack_errors_map_to_taxonomy() {
        let not_found: EngineError =
            strata_stack::StackError::StackNotFound { id: strata_core::PlatformId(1) }.into();
        assert!(not_found.is_not_found());

        let conflict: EngineError =
            strata_stack::StackError::StackAlreadyExists { id: strata_core::PlatformId(1) }.into();
        assert!(conflict.is_conflict());
    }
}
