//! Telegraf configuration declarations

use serde::{Deserialize, Serialize};

use super::WithMetaName;
use crate::error::ValidationDefect;
use crate::kind::Kind;

/// A declared telegraf agent configuration
///
/// The config body is raw TOML text; the orchestrator stores and compares
/// it opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telegraf {
    #[serde(skip)]
    pub meta_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub config: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<String>,
}

impl Telegraf {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.meta_name)
    }

    pub fn validate(&self) -> Vec<ValidationDefect> {
        let mut defects = Vec::new();
        if self.config.trim().is_empty() {
            defects.push(ValidationDefect::resource(
                Kind::Telegraf,
                &self.meta_name,
                "config",
                "a telegraf config body is required",
            ));
        }
        defects
    }
}

impl WithMetaName for Telegraf {
    fn set_meta_name(&mut self, meta_name: &str) {
        self.meta_name = meta_name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_a_defect() {
        let telegraf = Telegraf {
            meta_name: "tele-1".to_string(),
            ..Telegraf::default()
        };
        assert_eq!(telegraf.validate()[0].field, "config");
    }

    #[test]
    fn test_config_body_is_valid() {
        let telegraf = Telegraf {
            meta_name: "tele-1".to_string(),
            config: "[[inputs.cpu]]\n".to_string(),
            ..Telegraf::default()
        };
        assert!(telegraf.validate().is_empty());
    }
}
