//! Strata Core - template model for declarative resource orchestration
//!
//! This crate provides:
//! - **Resource Kinds**: The closed set of declarable resource kinds
//! - **Typed Resources**: Kind-specific structs with field-level validation
//! - **Templates**: Ordered `(Kind, MetaName)` bundles with JSON/YAML
//!   interchange and last-write-wins merging
//! - **Environment References**: Late-bound placeholders resolved at
//!   plan/apply time
//! - **URL Normalization**: Canonical forms for remote template sources

pub mod env;
pub mod error;
pub mod id;
pub mod kind;
pub mod resources;
pub mod template;
pub mod urls;

pub use env::{EnvRef, EnvRefValue};
pub use error::{CoreError, Result, ValidationDefect};
pub use id::PlatformId;
pub use kind::Kind;
pub use resources::{
    Bucket, Chart, ChartKind, Check, CheckSpec, Dashboard, DeadmanCheckSpec, EndpointSpec,
    HttpAuthMethod, HttpEndpointSpec, HttpMethod, Label, Level, NotificationEndpoint,
    NotificationRule, PagerDutyEndpointSpec, Resource, SecretField, SecretRef, SlackEndpointSpec,
    Status, StatusRule, TagRule, TagRuleOperator, Task, Telegraf, Threshold, ThresholdCheckSpec,
    ThresholdType, Variable, VariableArgs,
};
pub use template::{Template, TemplateFormat, TemplateObject, API_VERSION};
pub use urls::{normalize_remote_url, normalize_remote_urls};
