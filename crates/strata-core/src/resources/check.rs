//! Check declarations
//!
//! Threshold and deadman checks share scheduling and status fields; the
//! variant payload is a tagged sum type selected by the template object's
//! concrete kind.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Status, WithMetaName};
use crate::error::ValidationDefect;
use crate::kind::Kind;

/// Tag key injected into the spec payload to steer variant decoding
const CHECK_TYPE_TAG: &str = "checkType";

/// A declared check (threshold or deadman)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    #[serde(skip)]
    pub meta_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Evaluation interval
    #[serde(default, with = "humantime_serde")]
    pub every: Duration,

    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub offset: Option<Duration>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_message_template: String,

    #[serde(default)]
    pub status: Status,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tags: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<String>,

    #[serde(flatten)]
    pub spec: CheckSpec,
}

/// Kind-specific check payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "checkType", rename_all = "camelCase")]
pub enum CheckSpec {
    Threshold(ThresholdCheckSpec),
    Deadman(DeadmanCheckSpec),
}

/// Threshold check payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdCheckSpec {
    #[serde(default)]
    pub query: String,

    #[serde(default)]
    pub thresholds: Vec<Threshold>,
}

/// Deadman check payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadmanCheckSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// How long without data before the check fires
    #[serde(default, with = "humantime_serde")]
    pub time_since: Duration,

    /// How long after firing before the series is considered stale
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub stale_time: Option<Duration>,

    #[serde(default)]
    pub report_zero: bool,

    #[serde(default = "default_deadman_level")]
    pub level: Level,
}

fn default_deadman_level() -> Level {
    Level::Crit
}

/// A single threshold bound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threshold {
    pub level: Level,

    #[serde(rename = "type")]
    pub threshold_type: ThresholdType,

    /// Bound for scalar threshold types
    #[serde(default)]
    pub value: f64,

    /// Lower bound for range threshold types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Upper bound for range threshold types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default)]
    pub all_values: bool,
}

/// Threshold comparison shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdType {
    Lesser,
    Greater,
    InsideRange,
    OutsideRange,
}

impl ThresholdType {
    pub fn is_range(&self) -> bool {
        matches!(self, ThresholdType::InsideRange | ThresholdType::OutsideRange)
    }
}

/// Check severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Ok,
    Info,
    Warn,
    Crit,
}

impl Check {
    /// Decode a check spec for the given concrete kind
    pub fn from_spec(kind: Kind, meta_name: &str, mut spec: Value) -> Result<Check, serde_json::Error> {
        let tag = match kind {
            Kind::CheckDeadman => "deadman",
            _ => "threshold",
        };
        if let Value::Object(map) = &mut spec {
            map.insert(CHECK_TYPE_TAG.to_string(), Value::String(tag.to_string()));
        }
        let mut check: Check = serde_json::from_value(spec)?;
        check.set_meta_name(meta_name);
        Ok(check)
    }

    /// Concrete kind determined by the payload variant
    pub fn kind(&self) -> Kind {
        match self.spec {
            CheckSpec::Threshold(_) => Kind::CheckThreshold,
            CheckSpec::Deadman(_) => Kind::CheckDeadman,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.meta_name)
    }

    pub fn validate(&self) -> Vec<ValidationDefect> {
        let mut defects = Vec::new();
        let defect = |field: &str, reason: &str| {
            ValidationDefect::resource(self.kind(), &self.meta_name, field, reason)
        };

        if self.every.is_zero() {
            defects.push(defect("every", "an evaluation interval is required"));
        }

        match &self.spec {
            CheckSpec::Threshold(spec) => {
                if spec.query.trim().is_empty() {
                    defects.push(defect("query", "a query is required for threshold checks"));
                }
                if spec.thresholds.is_empty() {
                    defects.push(defect("thresholds", "at least one threshold is required"));
                }
                for (i, threshold) in spec.thresholds.iter().enumerate() {
                    if threshold.threshold_type.is_range() {
                        match (threshold.min, threshold.max) {
                            (Some(min), Some(max)) if min <= max => {}
                            (Some(_), Some(_)) => defects.push(ValidationDefect::resource(
                                self.kind(),
                                &self.meta_name,
                                format!("thresholds[{}]", i),
                                "range thresholds require min <= max",
                            )),
                            _ => defects.push(ValidationDefect::resource(
                                self.kind(),
                                &self.meta_name,
                                format!("thresholds[{}]", i),
                                "range thresholds require both min and max",
                            )),
                        }
                    }
                }
            }
            CheckSpec::Deadman(spec) => {
                if spec.time_since.is_zero() {
                    defects.push(defect("timeSince", "timeSince is required for deadman checks"));
                }
            }
        }
        defects
    }
}

impl WithMetaName for Check {
    fn set_meta_name(&mut self, meta_name: &str) {
        self.meta_name = meta_name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_threshold_check_decodes() {
        let check = Check::from_spec(
            Kind::CheckThreshold,
            "check-1",
            json!({
                "name": "cpu high",
                "every": "1m",
                "query": "from(bucket: \"telegraf\")",
                "thresholds": [
                    {"level": "CRIT", "type": "greater", "value": 90.0},
                    {"level": "WARN", "type": "inside_range", "min": 50.0, "max": 90.0},
                ],
            }),
        )
        .unwrap();

        assert_eq!(check.kind(), Kind::CheckThreshold);
        assert!(check.validate().is_empty());
        match &check.spec {
            CheckSpec::Threshold(spec) => {
                assert_eq!(spec.thresholds.len(), 2);
                assert_eq!(spec.thresholds[0].level, Level::Crit);
            }
            CheckSpec::Deadman(_) => unreachable!("decoded wrong variant"),
        }
    }

    #[test]
    fn test_deadman_check_decodes() {
        let check = Check::from_spec(
            Kind::CheckDeadman,
            "check-2",
            json!({"every": "5m", "timeSince": "90s", "reportZero": true}),
        )
        .unwrap();

        assert_eq!(check.kind(), Kind::CheckDeadman);
        assert!(check.validate().is_empty());
    }

    #[test]
    fn test_threshold_check_requires_query_and_thresholds() {
        let check =
            Check::from_spec(Kind::CheckThreshold, "check-3", json!({"every": "1m"})).unwrap();
        let defects = check.validate();
        let fields: Vec<&str> = defects.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["query", "thresholds"]);
    }

    #[test]
    fn test_range_threshold_requires_ordered_bounds() {
        let check = Check::from_spec(
            Kind::CheckThreshold,
            "check-4",
            json!({
                "every": "1m",
                "query": "q",
                "thresholds": [{"level": "WARN", "type": "outside_range", "min": 9.0, "max": 1.0}],
            }),
        )
        .unwrap();
        let defects = check.validate();
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].field, "thresholds[0]");
    }

    #[test]
    fn test_missing_every_is_a_defect() {
        let check = Check::from_spec(
            Kind::CheckDeadman,
            "check-5",
            json!({"timeSince": "30s"}),
        )
        .unwrap();
        assert_eq!(check.validate()[0].field, "every");
    }

    #[test]
    fn test_spec_round_trips_through_value() {
        let check = Check::from_spec(
            Kind::CheckThreshold,
            "check-6",
            json!({"every": "1m", "query": "q", "thresholds": [{"level": "OK", "type": "lesser", "value": 1.0}]}),
        )
        .unwrap();

        let value = serde_json::to_value(&check).unwrap();
        let back = Check::from_spec(Kind::CheckThreshold, "check-6", value).unwrap();
        assert_eq!(back, check);
    }
}
