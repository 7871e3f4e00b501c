//! Task declarations

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Status, WithMetaName};
use crate::error::ValidationDefect;
use crate::kind::Kind;

/// A declared task
///
/// Scheduling takes exactly one of `every` or `cron`. The flux source may
/// reference buckets or variables by name; those references are textual
/// and not resolved by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(skip)]
    pub meta_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Flux source without the `option task = {...}` preamble
    #[serde(default)]
    pub query: String,

    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub every: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,

    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub offset: Option<Duration>,

    #[serde(default)]
    pub status: Status,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<String>,
}

impl Task {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.meta_name)
    }

    pub fn validate(&self) -> Vec<ValidationDefect> {
        let mut defects = Vec::new();
        let defect = |field: &str, reason: &str| {
            ValidationDefect::resource(Kind::Task, &self.meta_name, field, reason)
        };

        if self.query.trim().is_empty() {
            defects.push(defect("query", "a flux query is required"));
        }
        match (&self.every, &self.cron) {
            (Some(_), Some(_)) => {
                defects.push(defect("every", "every and cron are mutually exclusive"));
            }
            (None, None) => {
                defects.push(defect("every", "one of every or cron is required"));
            }
            _ => {}
        }
        defects
    }
}

impl WithMetaName for Task {
    fn set_meta_name(&mut self, meta_name: &str) {
        self.meta_name = meta_name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(spec: serde_json::Value) -> Task {
        let mut task: Task = serde_json::from_value(spec).unwrap();
        task.set_meta_name("task-1");
        task
    }

    #[test]
    fn test_every_schedule_is_valid() {
        let task = decode(json!({"query": "buckets()", "every": "10m", "offset": "30s"}));
        assert!(task.validate().is_empty());
        assert_eq!(task.every, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_cron_schedule_is_valid() {
        let task = decode(json!({"query": "buckets()", "cron": "0 9 * * *"}));
        assert!(task.validate().is_empty());
    }

    #[test]
    fn test_both_schedules_is_a_defect() {
        let task = decode(json!({"query": "q", "every": "1m", "cron": "* * * * *"}));
        assert_eq!(task.validate()[0].reason, "every and cron are mutually exclusive");
    }

    #[test]
    fn test_no_schedule_is_a_defect() {
        let task = decode(json!({"query": "q"}));
        assert_eq!(task.validate()[0].reason, "one of every or cron is required");
    }

    #[test]
    fn test_empty_query_is_a_defect() {
        let task = decode(json!({"every": "1m"}));
        assert_eq!(task.validate()[0].field, "query");
    }
}
