//! Notification rule declarations

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::check::Level;
use super::{Status, WithMetaName};
use crate::error::ValidationDefect;
use crate::kind::Kind;

/// A declared notification rule
///
/// Rules reference their endpoint by meta-name; the reference must
/// resolve within the same template or to an endpoint already owned by
/// the bound stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRule {
    #[serde(skip)]
    pub meta_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MetaName of the endpoint this rule notifies
    #[serde(default)]
    pub endpoint_name: String,

    #[serde(default, with = "humantime_serde")]
    pub every: Duration,

    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub offset: Option<Duration>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message_template: String,

    #[serde(default)]
    pub status: Status,

    /// Level transitions that trigger a notification
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_rules: Vec<StatusRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_rules: Vec<TagRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<String>,
}

/// A level transition that fires the rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRule {
    pub current: Level,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Level>,
}

/// A tag predicate narrowing which series the rule applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRule {
    pub key: String,

    pub value: String,

    #[serde(default)]
    pub operator: TagRuleOperator,
}

/// Tag predicate operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagRuleOperator {
    #[default]
    Equal,
    NotEqual,
    EqualRegex,
    NotEqualRegex,
}

impl NotificationRule {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.meta_name)
    }

    pub fn validate(&self) -> Vec<ValidationDefect> {
        let mut defects = Vec::new();
        let defect = |field: &str, reason: &str| {
            ValidationDefect::resource(Kind::NotificationRule, &self.meta_name, field, reason)
        };

        if self.endpoint_name.is_empty() {
            defects.push(defect("endpointName", "a rule must reference an endpoint"));
        }
        if self.every.is_zero() {
            defects.push(defect("every", "an evaluation interval is required"));
        }
        if self.status_rules.is_empty() {
            defects.push(defect("statusRules", "at least one status rule is required"));
        }
        for (i, tag_rule) in self.tag_rules.iter().enumerate() {
            if tag_rule.key.is_empty() {
                defects.push(ValidationDefect::resource(
                    Kind::NotificationRule,
                    &self.meta_name,
                    format!("tagRules[{}].key", i),
                    "tag rule key must not be empty",
                ));
            }
        }
        defects
    }
}

impl WithMetaName for NotificationRule {
    fn set_meta_name(&mut self, meta_name: &str) {
        self.meta_name = meta_name.to_string();
    }
}
