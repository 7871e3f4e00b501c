//! Strata Engine - reconciliation for declarative resource templates
//!
//! This crate provides:
//! - **Service Interfaces**: Narrow async traits over the platform's
//!   resource services, with an in-memory mock for tests
//! - **State Differ**: Per-kind diffs of declared versus live state
//! - **Planner**: Skip filters, secret and env-ref diagnostics, and the
//!   impact summary
//! - **Applier**: Dependency-ordered execution with a compensating
//!   rollback journal
//! - **Exporter**: Turns existing resources back into templates
//! - **Stack Lifecycle**: Init, update, uninstall, and delete operations
//!   over the persistent template-to-resource binding

mod apply;
pub mod diff;
pub mod error;
mod export;
pub mod options;
mod resolver;
pub mod service;
pub mod services;

pub use diff::{
    Diff, DiffBucket, DiffCheck, DiffDashboard, DiffIdentifier, DiffLabel,
    DiffNotificationEndpoint, DiffNotificationRule, DiffTask, DiffTelegraf, DiffVariable, Diffs,
    ImpactSummary, StateStatus, SummaryResource, TemplateSummary,
};
pub use error::{EngineError, MissingReference, Result};
pub use options::{ApplyOptions, ExportOptions, OrgExportFilter, ResourceToClone};
pub use service::{Orchestrator, OrchestratorBuilder};
pub use services::{
    mock::MockPlatform, BucketRecord, BucketService, CellRecord, CheckRecord, CheckService,
    DashboardRecord, DashboardService, EndpointRecord, LabelMapping, LabelRecord, LabelService,
    NotificationEndpointService, NotificationRuleService, OrganizationService, RuleRecord,
    SecretService, ServiceError, ServiceHandles, ServiceResult, TaskRecord, TaskService,
    TelegrafRecord, TelegrafService, VariableRecord, VariableService, ViewRecord,
};
