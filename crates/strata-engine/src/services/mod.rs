//! Resource service interfaces
//!
//! The engine never talks to the platform directly; it drives these
//! narrow traits. Every method takes the caller's cancellation handle so
//! in-flight applies can stop scheduling writes mid-run. Implementations
//! must be Send + Sync.

pub mod mock;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use strata_core::{
    ChartKind, CheckSpec, EndpointSpec, Kind, PlatformId, Status, StatusRule, TagRule,
    VariableArgs,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result type for service calls
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Errors surfaced by resource services
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("resource not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("remote failure: {0}")]
    Remote(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Task type the platform assigns to operator-authored tasks
pub const TASK_TYPE_SYSTEM: &str = "system";

/// A live bucket
#[derive(Debug, Clone, PartialEq)]
pub struct BucketRecord {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: Option<String>,
    pub retention: Option<Duration>,
}

/// A live label
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRecord {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

/// A label-to-resource binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelMapping {
    pub label_id: PlatformId,
    pub resource_id: PlatformId,
    pub resource_kind: Kind,
}

/// A live dashboard; cell views are stored separately
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardRecord {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: Option<String>,
    pub cells: Vec<CellRecord>,
}

/// One dashboard cell; `view` is populated on create and by
/// [`DashboardService::find_dashboard_view`], not by dashboard reads
#[derive(Debug, Clone, PartialEq)]
pub struct CellRecord {
    pub id: PlatformId,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub view: Option<ViewRecord>,
}

/// A cell's view payload
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRecord {
    pub name: String,
    pub kind: ChartKind,
    pub queries: Vec<String>,
    pub properties: Value,
}

/// A live check; `task_id` is the platform-owned task evaluating it
#[derive(Debug, Clone, PartialEq)]
pub struct CheckRecord {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub task_id: PlatformId,
    pub name: String,
    pub description: Option<String>,
    pub every: Duration,
    pub offset: Option<Duration>,
    pub status_message_template: String,
    pub status: Status,
    pub tags: IndexMap<String, String>,
    pub spec: CheckSpec,
}

/// A live notification endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointRecord {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: Option<String>,
    pub status: Status,
    pub spec: EndpointSpec,
}

/// A live notification rule; `task_id` is the platform-owned task
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRecord {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub task_id: PlatformId,
    pub endpoint_id: PlatformId,
    pub name: String,
    pub description: Option<String>,
    pub every: Duration,
    pub offset: Option<Duration>,
    pub message_template: String,
    pub status: Status,
    pub status_rules: Vec<StatusRule>,
    pub tag_rules: Vec<TagRule>,
}

/// A live task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: Option<String>,
    pub flux: String,
    pub every: Option<Duration>,
    pub cron: Option<String>,
    pub offset: Option<Duration>,
    pub status: Status,
    /// Platform task class; operator-authored tasks are "system"
    pub task_type: String,
}

/// A live telegraf configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TelegrafRecord {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: Option<String>,
    pub config: String,
}

/// A live variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRecord {
    pub id: PlatformId,
    pub org_id: PlatformId,
    pub name: String,
    pub description: Option<String>,
    pub args: VariableArgs,
    pub selected: Vec<String>,
}

/// Shared handles to every service the engine consumes
#[derive(Clone)]
pub struct ServiceHandles {
    pub orgs: std::sync::Arc<dyn OrganizationService>,
    pub secrets: std::sync::Arc<dyn SecretService>,
    pub buckets: std::sync::Arc<dyn BucketService>,
    pub labels: std::sync::Arc<dyn LabelService>,
    pub dashboards: std::sync::Arc<dyn DashboardService>,
    pub checks: std::sync::Arc<dyn CheckService>,
    pub endpoints: std::sync::Arc<dyn NotificationEndpointService>,
    pub rules: std::sync::Arc<dyn NotificationRuleService>,
    pub tasks: std::sync::Arc<dyn TaskService>,
    pub telegrafs: std::sync::Arc<dyn TelegrafService>,
    pub variables: std::sync::Arc<dyn VariableService>,
}

#[async_trait]
pub trait BucketService: Send + Sync {
    async fn create_bucket(&self, ctx: &CancellationToken, bucket: BucketRecord) -> ServiceResult<BucketRecord>;
    async fn update_bucket(&self, ctx: &CancellationToken, bucket: BucketRecord) -> ServiceResult<BucketRecord>;
    async fn delete_bucket(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()>;
    async fn find_bucket_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<BucketRecord>;
    async fn find_bucket_by_name(&self, ctx: &CancellationToken, org_id: PlatformId, name: &str) -> ServiceResult<Option<BucketRecord>>;
    async fn list_buckets(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<BucketRecord>>;
}

#[async_trait]
pub trait LabelService: Send + Sync {
    async fn create_label(&self, ctx: &CancellationToken, label: LabelRecord) -> ServiceResult<LabelRecord>;
    async fn update_label(&self, ctx: &CancellationToken, label: LabelRecord) -> ServiceResult<LabelRecord>;
    async fn delete_label(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()>;
    async fn find_label_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<LabelRecord>;
    async fn find_label_by_name(&self, ctx: &CancellationToken, org_id: PlatformId, name: &str) -> ServiceResult<Option<LabelRecord>>;
    async fn list_labels(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<LabelRecord>>;

    /// Bind a label to a resource; returns false when the mapping
    /// already existed
    async fn create_label_mapping(&self, ctx: &CancellationToken, mapping: LabelMapping) -> ServiceResult<bool>;
    async fn delete_label_mapping(&self, ctx: &CancellationToken, mapping: LabelMapping) -> ServiceResult<()>;
    async fn find_labels_for(&self, ctx: &CancellationToken, resource_id: PlatformId, resource_kind: Kind) -> ServiceResult<Vec<LabelRecord>>;
}

#[async_trait]
pub trait DashboardService: Send + Sync {
    async fn create_dashboard(&self, ctx: &CancellationToken, dashboard: DashboardRecord) -> ServiceResult<DashboardRecord>;
    async fn delete_dashboard(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()>;
    async fn find_dashboard_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<DashboardRecord>;
    async fn list_dashboards(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<DashboardRecord>>;

    /// Fetch one cell's view; views are stored apart from the dashboard
    async fn find_dashboard_view(&self, ctx: &CancellationToken, dashboard_id: PlatformId, cell_id: PlatformId) -> ServiceResult<ViewRecord>;
}

#[async_trait]
pub trait CheckService: Send + Sync {
    async fn create_check(&self, ctx: &CancellationToken, check: CheckRecord) -> ServiceResult<CheckRecord>;
    async fn update_check(&self, ctx: &CancellationToken, check: CheckRecord) -> ServiceResult<CheckRecord>;
    async fn delete_check(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()>;
    async fn find_check_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<CheckRecord>;

    /// Filter checks by name; callers take the first exact-name match
    async fn find_checks(&self, ctx: &CancellationToken, org_id: PlatformId, name: Option<&str>) -> ServiceResult<Vec<CheckRecord>>;
}

#[async_trait]
pub trait NotificationEndpointService: Send + Sync {
    async fn create_endpoint(&self, ctx: &CancellationToken, endpoint: EndpointRecord) -> ServiceResult<EndpointRecord>;
    async fn update_endpoint(&self, ctx: &CancellationToken, endpoint: EndpointRecord) -> ServiceResult<EndpointRecord>;
    async fn delete_endpoint(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()>;
    async fn find_endpoint_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<EndpointRecord>;

    /// Filter endpoints by name; callers take the first exact-name match
    async fn find_endpoints(&self, ctx: &CancellationToken, org_id: PlatformId, name: Option<&str>) -> ServiceResult<Vec<EndpointRecord>>;
}

#[async_trait]
pub trait NotificationRuleService: Send + Sync {
    async fn create_rule(&self, ctx: &CancellationToken, rule: RuleRecord) -> ServiceResult<RuleRecord>;
    async fn update_rule(&self, ctx: &CancellationToken, rule: RuleRecord) -> ServiceResult<RuleRecord>;
    async fn delete_rule(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()>;
    async fn find_rule_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<RuleRecord>;
    async fn find_rule_by_name(&self, ctx: &CancellationToken, org_id: PlatformId, name: &str) -> ServiceResult<Option<RuleRecord>>;
    async fn list_rules(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<RuleRecord>>;
}

#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create_task(&self, ctx: &CancellationToken, task: TaskRecord) -> ServiceResult<TaskRecord>;
    async fn update_task(&self, ctx: &CancellationToken, task: TaskRecord) -> ServiceResult<TaskRecord>;
    async fn delete_task(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()>;
    async fn find_task_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<TaskRecord>;
    async fn find_task_by_name(&self, ctx: &CancellationToken, org_id: PlatformId, name: &str) -> ServiceResult<Option<TaskRecord>>;
    async fn list_tasks(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<TaskRecord>>;
}

#[async_trait]
pub trait TelegrafService: Send + Sync {
    async fn create_telegraf(&self, ctx: &CancellationToken, telegraf: TelegrafRecord) -> ServiceResult<TelegrafRecord>;
    async fn update_telegraf(&self, ctx: &CancellationToken, telegraf: TelegrafRecord) -> ServiceResult<TelegrafRecord>;
    async fn delete_telegraf(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()>;
    async fn find_telegraf_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<TelegrafRecord>;
    async fn find_telegraf_by_name(&self, ctx: &CancellationToken, org_id: PlatformId, name: &str) -> ServiceResult<Option<TelegrafRecord>>;
    async fn list_telegrafs(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<TelegrafRecord>>;
}

#[async_trait]
pub trait VariableService: Send + Sync {
    async fn create_variable(&self, ctx: &CancellationToken, variable: VariableRecord) -> ServiceResult<VariableRecord>;
    async fn update_variable(&self, ctx: &CancellationToken, variable: VariableRecord) -> ServiceResult<VariableRecord>;
    async fn delete_variable(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()>;
    async fn find_variable_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<VariableRecord>;
    async fn find_variable_by_name(&self, ctx: &CancellationToken, org_id: PlatformId, name: &str) -> ServiceResult<Option<VariableRecord>>;
    async fn list_variables(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<VariableRecord>>;
}

#[async_trait]
pub trait SecretService: Send + Sync {
    /// Keys present in the org's secret store; values never leave it
    async fn list_secret_keys(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<String>>;
}

#[async_trait]
pub trait OrganizationService: Send + Sync {
    async fn organization_exists(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<bool>;
}
