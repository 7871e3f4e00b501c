//! Label declarations

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::WithMetaName;
use crate::error::ValidationDefect;
use crate::kind::Kind;

/// A declared label
///
/// Labels carry no references of their own; every other kind may
/// associate to them by meta-name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    #[serde(skip)]
    pub meta_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Hex color, with or without a leading `#`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Label {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.meta_name)
    }

    /// Properties map used for semantic comparison against live state
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        if let Some(color) = &self.color {
            props.insert("color".to_string(), color.clone());
        }
        if let Some(description) = &self.description {
            props.insert("description".to_string(), description.clone());
        }
        props
    }

    pub fn validate(&self) -> Vec<ValidationDefect> {
        let mut defects = Vec::new();
        if let Some(color) = &self.color {
            let digits = color.strip_prefix('#').unwrap_or(color);
            if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                defects.push(ValidationDefect::resource(
                    Kind::Label,
                    &self.meta_name,
                    "color",
                    format!("'{}' is not a 6-digit hex color", color),
                ));
            }
        }
        defects
    }
}

impl WithMetaName for Label {
    fn set_meta_name(&mut self, meta_name: &str) {
        self.meta_name = meta_name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(color: Option<&str>) -> Label {
        Label {
            meta_name: "lbl-1".to_string(),
            name: None,
            color: color.map(str::to_string),
            description: Some("a label".to_string()),
        }
    }

    #[test]
    fn test_valid_colors() {
        assert!(label(Some("#aabbcc")).validate().is_empty());
        assert!(label(Some("AABB00")).validate().is_empty());
        assert!(label(None).validate().is_empty());
    }

    #[test]
    fn test_invalid_color_is_a_defect() {
        let defects = label(Some("not-a-color")).validate();
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].field, "color");
    }

    #[test]
    fn test_properties_map() {
        let props = label(Some("#010203")).properties();
        assert_eq!(props.get("color").map(String::as_str), Some("#010203"));
        assert_eq!(props.get("description").map(String::as_str), Some("a label"));
    }
}
