//! Core error types

use thiserror::Error;

use crate::kind::Kind;

/// Result type for strata-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while parsing or validating templates
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Failed to parse a YAML template stream
    #[error("failed to parse yaml template: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Failed to parse a JSON template stream
    #[error("failed to parse json template: {0}")]
    Json(#[from] serde_json::Error),

    /// Template object declared a kind outside the closed set
    #[error("unknown resource kind '{kind}'")]
    UnknownKind { kind: String },

    /// Aggregate of every defect found during validation
    ///
    /// Validation never stops at the first defect: a template with N
    /// problems reports all N.
    #[error("template validation failed with {} defect(s)", defects.len())]
    Validation { defects: Vec<ValidationDefect> },

    /// IO error while reading a template source
    #[error("template io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Collect a defect list into a validation error, or `Ok(())` when empty
    pub fn from_defects(defects: Vec<ValidationDefect>) -> Result<()> {
        if defects.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation { defects })
        }
    }

    /// Defects carried by a validation error, empty for other variants
    pub fn defects(&self) -> &[ValidationDefect] {
        match self {
            CoreError::Validation { defects } => defects,
            _ => &[],
        }
    }
}

/// A single field-level problem found during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDefect {
    /// Kind of the offending resource, if known
    pub kind: Option<Kind>,

    /// MetaName of the offending resource ("" for template-level defects)
    pub meta_name: String,

    /// Dotted path of the offending field
    pub field: String,

    /// Human-readable reason
    pub reason: String,
}

impl ValidationDefect {
    /// Defect attached to a specific resource field
    pub fn resource(kind: Kind, meta_name: impl Into<String>, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            meta_name: meta_name.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Defect that applies to the template as a whole
    pub fn template(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: None,
            meta_name: String::new(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ValidationDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Some(kind) => write!(f, "{}/{}: {}: {}", kind, self.meta_name, self.field, self.reason),
            None => write!(f, "template: {}: {}", self.field, self.reason),
        }
    }
}
