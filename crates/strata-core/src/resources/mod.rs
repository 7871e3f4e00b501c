//! Typed resource model
//!
//! Each template object decodes into one of these kind-specific structs.
//! Checks, endpoints, and variable arguments are tagged variants rather
//! than trait objects; polymorphic operations are matched functions on
//! [`Resource`].

mod bucket;
mod check;
mod dashboard;
mod endpoint;
mod label;
mod rule;
mod task;
mod telegraf;
mod variable;

pub use bucket::Bucket;
pub use check::{Check, CheckSpec, DeadmanCheckSpec, Level, Threshold, ThresholdCheckSpec, ThresholdType};
pub use dashboard::{Chart, ChartKind, Dashboard};
pub use endpoint::{
    EndpointSpec, HttpAuthMethod, HttpEndpointSpec, HttpMethod, NotificationEndpoint,
    PagerDutyEndpointSpec, SlackEndpointSpec,
};
pub use label::Label;
pub use rule::{NotificationRule, StatusRule, TagRule, TagRuleOperator};
pub use task::Task;
pub use telegraf::Telegraf;
pub use variable::{Variable, VariableArgs};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationDefect;
use crate::kind::Kind;

/// Activation status shared by checks, endpoints, rules, and tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Inactive,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Active => write!(f, "active"),
            Status::Inactive => write!(f, "inactive"),
        }
    }
}

/// A sensitive field: either an inline literal or a secret-store reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecretField {
    /// `{"secretRef": {"key": "..."}}`
    Ref {
        #[serde(rename = "secretRef")]
        secret_ref: SecretRef,
    },
    /// Inline literal value
    Literal(String),
}

/// Reference into the platform secret store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub key: String,
}

impl SecretField {
    /// Secret-store key referenced by this field, if any
    pub fn secret_key(&self) -> Option<&str> {
        match self {
            SecretField::Ref { secret_ref } => Some(&secret_ref.key),
            SecretField::Literal(_) => None,
        }
    }

    /// True when the field carries neither a literal nor a reference
    pub fn is_empty(&self) -> bool {
        match self {
            SecretField::Ref { secret_ref } => secret_ref.key.is_empty(),
            SecretField::Literal(value) => value.is_empty(),
        }
    }
}

impl From<&str> for SecretField {
    fn from(value: &str) -> Self {
        SecretField::Literal(value.to_string())
    }
}

impl Default for SecretField {
    fn default() -> Self {
        SecretField::Literal(String::new())
    }
}

/// A declared resource of any kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    Bucket(Bucket),
    Check(Check),
    Dashboard(Dashboard),
    Label(Label),
    NotificationEndpoint(NotificationEndpoint),
    NotificationRule(NotificationRule),
    Task(Task),
    Telegraf(Telegraf),
    Variable(Variable),
}

impl Resource {
    /// Decode a template object's spec into the typed resource for `kind`
    pub fn from_spec(kind: Kind, meta_name: &str, spec: Value) -> Result<Resource, ValidationDefect> {
        let decode_err = |err: serde_json::Error| {
            ValidationDefect::resource(kind, meta_name, "spec", err.to_string())
        };

        let resource = match kind {
            Kind::Bucket => Resource::Bucket(decode::<Bucket>(meta_name, spec).map_err(decode_err)?),
            Kind::Label => Resource::Label(decode::<Label>(meta_name, spec).map_err(decode_err)?),
            Kind::Dashboard => {
                Resource::Dashboard(decode::<Dashboard>(meta_name, spec).map_err(decode_err)?)
            }
            Kind::CheckDeadman | Kind::CheckThreshold => {
                Resource::Check(Check::from_spec(kind, meta_name, spec).map_err(decode_err)?)
            }
            Kind::NotificationEndpointHttp
            | Kind::NotificationEndpointPagerDuty
            | Kind::NotificationEndpointSlack => Resource::NotificationEndpoint(
                NotificationEndpoint::from_spec(kind, meta_name, spec).map_err(decode_err)?,
            ),
            Kind::NotificationRule => Resource::NotificationRule(
                decode::<NotificationRule>(meta_name, spec).map_err(decode_err)?,
            ),
            Kind::Task => Resource::Task(decode::<Task>(meta_name, spec).map_err(decode_err)?),
            Kind::Telegraf => {
                Resource::Telegraf(decode::<Telegraf>(meta_name, spec).map_err(decode_err)?)
            }
            Kind::Variable => {
                Resource::Variable(decode::<Variable>(meta_name, spec).map_err(decode_err)?)
            }
            Kind::Check | Kind::NotificationEndpoint => {
                return Err(ValidationDefect::resource(
                    kind,
                    meta_name,
                    "kind",
                    "group kinds cannot be declared directly; use a concrete variant",
                ));
            }
        };
        Ok(resource)
    }

    /// Concrete kind of this resource
    pub fn kind(&self) -> Kind {
        match self {
            Resource::Bucket(_) => Kind::Bucket,
            Resource::Check(check) => check.kind(),
            Resource::Dashboard(_) => Kind::Dashboard,
            Resource::Label(_) => Kind::Label,
            Resource::NotificationEndpoint(endpoint) => endpoint.kind(),
            Resource::NotificationRule(_) => Kind::NotificationRule,
            Resource::Task(_) => Kind::Task,
            Resource::Telegraf(_) => Kind::Telegraf,
            Resource::Variable(_) => Kind::Variable,
        }
    }

    /// Template-local identity
    pub fn meta_name(&self) -> &str {
        match self {
            Resource::Bucket(r) => &r.meta_name,
            Resource::Check(r) => &r.meta_name,
            Resource::Dashboard(r) => &r.meta_name,
            Resource::Label(r) => &r.meta_name,
            Resource::NotificationEndpoint(r) => &r.meta_name,
            Resource::NotificationRule(r) => &r.meta_name,
            Resource::Task(r) => &r.meta_name,
            Resource::Telegraf(r) => &r.meta_name,
            Resource::Variable(r) => &r.meta_name,
        }
    }

    /// Display name: the `name` field, falling back to the meta-name
    pub fn display_name(&self) -> &str {
        let name = match self {
            Resource::Bucket(r) => &r.name,
            Resource::Check(r) => &r.name,
            Resource::Dashboard(r) => &r.name,
            Resource::Label(r) => &r.name,
            Resource::NotificationEndpoint(r) => &r.name,
            Resource::NotificationRule(r) => &r.name,
            Resource::Task(r) => &r.name,
            Resource::Telegraf(r) => &r.name,
            Resource::Variable(r) => &r.name,
        };
        name.as_deref().unwrap_or_else(|| self.meta_name())
    }

    /// MetaNames of associated labels (empty for labels themselves)
    pub fn label_associations(&self) -> &[String] {
        match self {
            Resource::Bucket(r) => &r.associations,
            Resource::Check(r) => &r.associations,
            Resource::Dashboard(r) => &r.associations,
            Resource::Label(_) => &[],
            Resource::NotificationEndpoint(r) => &r.associations,
            Resource::NotificationRule(r) => &r.associations,
            Resource::Task(r) => &r.associations,
            Resource::Telegraf(r) => &r.associations,
            Resource::Variable(r) => &r.associations,
        }
    }

    /// Secret-store keys referenced by this resource
    pub fn secret_keys(&self) -> Vec<String> {
        match self {
            Resource::NotificationEndpoint(endpoint) => endpoint.secret_keys(),
            _ => Vec::new(),
        }
    }

    /// Field-level validation; collects every defect rather than stopping
    pub fn validate(&self) -> Vec<ValidationDefect> {
        match self {
            Resource::Bucket(r) => r.validate(),
            Resource::Check(r) => r.validate(),
            Resource::Dashboard(r) => r.validate(),
            Resource::Label(r) => r.validate(),
            Resource::NotificationEndpoint(r) => r.validate(),
            Resource::NotificationRule(r) => r.validate(),
            Resource::Task(r) => r.validate(),
            Resource::Telegraf(r) => r.validate(),
            Resource::Variable(r) => r.validate(),
        }
    }

    /// Encode the kind-specific spec back into its template form
    pub fn to_spec_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn decode<T>(meta_name: &str, spec: Value) -> Result<T, serde_json::Error>
where
    T: serde::de::DeserializeOwned + WithMetaName,
{
    let mut resource: T = serde_json::from_value(spec)?;
    resource.set_meta_name(meta_name);
    Ok(resource)
}

/// Decoded resources carry their meta-name outside the spec payload
pub(crate) trait WithMetaName {
    fn set_meta_name(&mut self, meta_name: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_spec_dispatches_by_kind() {
        let bucket = Resource::from_spec(
            Kind::Bucket,
            "bkt-1",
            json!({"name": "rucket-11", "retention": "30h"}),
        )
        .unwrap();
        assert_eq!(bucket.kind(), Kind::Bucket);
        assert_eq!(bucket.meta_name(), "bkt-1");
        assert_eq!(bucket.display_name(), "rucket-11");
    }

    #[test]
    fn test_display_name_falls_back_to_meta_name() {
        let label = Resource::from_spec(Kind::Label, "meta-label", json!({})).unwrap();
        assert_eq!(label.display_name(), "meta-label");
    }

    #[test]
    fn test_group_kind_is_rejected() {
        let err = Resource::from_spec(Kind::Check, "c1", json!({})).unwrap_err();
        assert_eq!(err.field, "kind");
    }

    #[test]
    fn test_secret_field_forms() {
        let literal: SecretField = serde_json::from_value(json!("hunter2")).unwrap();
        assert_eq!(literal.secret_key(), None);
        assert!(!literal.is_empty());

        let reference: SecretField =
            serde_json::from_value(json!({"secretRef": {"key": "routing-key"}})).unwrap();
        assert_eq!(reference.secret_key(), Some("routing-key"));
    }

    #[test]
    fn test_status_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Active).unwrap(), "\"active\"");
        let status: Status = serde_json::from_str("\"inactive\"").unwrap();
        assert_eq!(status, Status::Inactive);
    }
}
