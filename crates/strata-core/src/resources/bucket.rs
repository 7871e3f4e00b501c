//! Bucket declarations

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::WithMetaName;
use crate::error::ValidationDefect;
use crate::kind::Kind;

/// A declared storage bucket
///
/// Retention is accepted in human-readable form (`30h`, `7d`) and compared
/// against live state in whole nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    #[serde(skip)]
    pub meta_name: String,

    /// Display name; falls back to the meta-name when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Retention period; `None` keeps data forever
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub retention: Option<Duration>,

    /// Opaque explicit measurement schema payload, when the bucket uses
    /// an explicit schema type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_schemas: Option<Value>,

    /// MetaNames of associated labels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<String>,
}

impl Bucket {
    /// Display name with meta-name fallback
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.meta_name)
    }

    pub fn validate(&self) -> Vec<ValidationDefect> {
        let mut defects = Vec::new();
        if matches!(self.name.as_deref(), Some("")) {
            defects.push(ValidationDefect::resource(
                Kind::Bucket,
                &self.meta_name,
                "name",
                "name must not be empty when set",
            ));
        }
        if self.retention == Some(Duration::ZERO) {
            defects.push(ValidationDefect::resource(
                Kind::Bucket,
                &self.meta_name,
                "retention",
                "retention must be greater than zero; omit it for infinite retention",
            ));
        }
        defects
    }
}

impl WithMetaName for Bucket {
    fn set_meta_name(&mut self, meta_name: &str) {
        self.meta_name = meta_name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(spec: Value) -> Bucket {
        let mut bucket: Bucket = serde_json::from_value(spec).unwrap();
        bucket.set_meta_name("bkt-1");
        bucket
    }

    #[test]
    fn test_retention_parses_humantime() {
        let bucket = decode(json!({"name": "rucket-11", "retention": "30h"}));
        assert_eq!(bucket.retention, Some(Duration::from_secs(30 * 3600)));
    }

    #[test]
    fn test_zero_retention_is_a_defect() {
        let bucket = decode(json!({"retention": "0s"}));
        let defects = bucket.validate();
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].field, "retention");
    }

    #[test]
    fn test_empty_name_is_a_defect() {
        let bucket = decode(json!({"name": ""}));
        assert_eq!(bucket.validate()[0].field, "name");
    }

    #[test]
    fn test_minimal_bucket_is_valid() {
        let bucket = decode(json!({}));
        assert!(bucket.validate().is_empty());
        assert_eq!(bucket.display_name(), "bkt-1");
    }
}
