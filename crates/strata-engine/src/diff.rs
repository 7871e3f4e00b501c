//! Diff model and state differ
//!
//! For every declared resource the differ queries live state by display
//! name (dashboards excepted) and produces a per-resource diff. Snapshots
//! compare kind-specific fields only; server-managed timestamps and
//! identifiers never participate in equality.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use strata_core::{
    Bucket, Check, CheckSpec, Dashboard, EndpointSpec, Kind, Label, NotificationEndpoint,
    NotificationRule, PlatformId, Resource, Status, StatusRule, TagRule, Task, Telegraf, Variable,
    VariableArgs,
};
use strata_stack::Stack;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::services::{
    BucketRecord, CheckRecord, DashboardRecord, EndpointRecord, LabelRecord, RuleRecord,
    ServiceError, ServiceHandles, TaskRecord, TelegrafRecord, VariableRecord,
};

/// Planned disposition of one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateStatus {
    /// No live match; a create will be issued
    New,

    /// Live match found; an update is issued only when fields differ
    Exists,

    /// Owned by the stack but absent from the template; a delete will be
    /// issued
    Remove,
}

/// Identity portion of a diff entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffIdentifier {
    /// Platform identity; absent until the resource is realized
    pub id: Option<PlatformId>,

    pub meta_name: String,

    pub kind: Kind,

    pub state: StateStatus,
}

/// A per-resource record of desired versus live state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff<T> {
    pub identifier: DiffIdentifier,

    /// Live snapshot, present for `Exists` and `Remove`
    pub old: Option<T>,

    /// Desired snapshot, absent for `Remove`
    pub new: Option<T>,
}

impl<T: PartialEq> Diff<T> {
    pub fn is_new(&self) -> bool {
        self.identifier.state == StateStatus::New
    }

    pub fn is_remove(&self) -> bool {
        self.identifier.state == StateStatus::Remove
    }

    /// Whether applying this diff issues a write
    pub fn has_change(&self) -> bool {
        match self.identifier.state {
            StateStatus::New | StateStatus::Remove => true,
            StateStatus::Exists => self.old != self.new,
        }
    }
}

/// Bucket snapshot; retention compares in whole nanoseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffBucket {
    pub name: String,
    pub description: Option<String>,
    pub retention: Option<Duration>,
}

impl DiffBucket {
    pub fn from_declared(bucket: &Bucket) -> Self {
        Self {
            name: bucket.display_name().to_string(),
            description: bucket.description.clone(),
            retention: bucket.retention,
        }
    }

    pub fn from_record(record: &BucketRecord) -> Self {
        Self {
            name: record.name.clone(),
            description: record.description.clone(),
            retention: record.retention,
        }
    }
}

/// Label snapshot; properties compare as a map, not a string
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLabel {
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

impl DiffLabel {
    pub fn from_declared(label: &Label) -> Self {
        Self {
            name: label.display_name().to_string(),
            properties: label.properties(),
        }
    }

    pub fn from_record(record: &LabelRecord) -> Self {
        Self {
            name: record.name.clone(),
            properties: record.properties.clone(),
        }
    }
}

/// Dashboard snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffDashboard {
    pub name: String,
    pub description: Option<String>,
    pub chart_count: usize,
}

impl DiffDashboard {
    pub fn from_declared(dashboard: &Dashboard) -> Self {
        Self {
            name: dashboard.display_name().to_string(),
            description: dashboard.description.clone(),
            chart_count: dashboard.charts.len(),
        }
    }

    pub fn from_record(record: &DashboardRecord) -> Self {
        Self {
            name: record.name.clone(),
            description: record.description.clone(),
            chart_count: record.cells.len(),
        }
    }
}

/// Check snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffCheck {
    pub name: String,
    pub description: Option<String>,
    pub every: Duration,
    pub offset: Option<Duration>,
    pub status_message_template: String,
    pub status: Status,
    pub tags: IndexMap<String, String>,
    pub spec: CheckSpec,
}

impl DiffCheck {
    pub fn from_declared(check: &Check) -> Self {
        Self {
            name: check.display_name().to_string(),
            description: check.description.clone(),
            every: check.every,
            offset: check.offset,
            status_message_template: check.status_message_template.clone(),
            status: check.status,
            tags: check.tags.clone(),
            spec: check.spec.clone(),
        }
    }

    pub fn from_record(record: &CheckRecord) -> Self {
        Self {
            name: record.name.clone(),
            description: record.description.clone(),
            every: record.every,
            offset: record.offset,
            status_message_template: record.status_message_template.clone(),
            status: record.status,
            tags: record.tags.clone(),
            spec: record.spec.clone(),
        }
    }
}

/// Endpoint snapshot; server-generated timestamps are excluded by
/// construction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffNotificationEndpoint {
    pub name: String,
    pub description: Option<String>,
    pub status: Status,
    pub spec: EndpointSpec,
}

impl DiffNotificationEndpoint {
    pub fn from_declared(endpoint: &NotificationEndpoint) -> Self {
        Self {
            name: endpoint.display_name().to_string(),
            description: endpoint.description.clone(),
            status: endpoint.status,
            spec: endpoint.spec.clone(),
        }
    }

    pub fn from_record(record: &EndpointRecord) -> Self {
        Self {
            name: record.name.clone(),
            description: record.description.clone(),
            status: record.status,
            spec: record.spec.clone(),
        }
    }
}

/// Rule snapshot; the endpoint is compared by platform identity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffNotificationRule {
    pub name: String,
    pub description: Option<String>,
    /// MetaName of the endpoint within the template; informational only
    pub endpoint_meta_name: String,
    pub endpoint_id: Option<PlatformId>,
    pub every: Duration,
    pub offset: Option<Duration>,
    pub message_template: String,
    pub status: Status,
    pub status_rules: Vec<StatusRule>,
    pub tag_rules: Vec<TagRule>,
}

impl DiffNotificationRule {
    pub fn from_declared(rule: &NotificationRule, endpoint_id: Option<PlatformId>) -> Self {
        Self {
            name: rule.display_name().to_string(),
            description: rule.description.clone(),
            endpoint_meta_name: rule.endpoint_name.clone(),
            endpoint_id,
            every: rule.every,
            offset: rule.offset,
            message_template: rule.message_template.clone(),
            status: rule.status,
            status_rules: rule.status_rules.clone(),
            tag_rules: rule.tag_rules.clone(),
        }
    }

    pub fn from_record(record: &RuleRecord, endpoint_meta_name: &str) -> Self {
        Self {
            name: record.name.clone(),
            description: record.description.clone(),
            endpoint_meta_name: endpoint_meta_name.to_string(),
            endpoint_id: Some(record.endpoint_id),
            every: record.every,
            offset: record.offset,
            message_template: record.message_template.clone(),
            status: record.status,
            status_rules: record.status_rules.clone(),
            tag_rules: record.tag_rules.clone(),
        }
    }
}

/// Task snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffTask {
    pub name: String,
    pub description: Option<String>,
    pub flux: String,
    pub every: Option<Duration>,
    pub cron: Option<String>,
    pub offset: Option<Duration>,
    pub status: Status,
}

impl DiffTask {
    pub fn from_declared(task: &Task) -> Self {
        Self {
            name: task.display_name().to_string(),
            description: task.description.clone(),
            flux: task.query.clone(),
            every: task.every,
            cron: task.cron.clone(),
            offset: task.offset,
            status: task.status,
        }
    }

    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            name: record.name.clone(),
            description: record.description.clone(),
            flux: record.flux.clone(),
            every: record.every,
            cron: record.cron.clone(),
            offset: record.offset,
            status: record.status,
        }
    }
}

/// Telegraf snapshot; the config body compares as raw text
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffTelegraf {
    pub name: String,
    pub description: Option<String>,
    pub config: String,
}

impl DiffTelegraf {
    pub fn from_declared(telegraf: &Telegraf) -> Self {
        Self {
            name: telegraf.display_name().to_string(),
            description: telegraf.description.clone(),
            config: telegraf.config.clone(),
        }
    }

    pub fn from_record(record: &TelegrafRecord) -> Self {
        Self {
            name: record.name.clone(),
            description: record.description.clone(),
            config: record.config.clone(),
        }
    }
}

/// Variable snapshot; compared on arguments and description
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffVariable {
    pub name: String,
    pub description: Option<String>,
    pub args: VariableArgs,
}

impl DiffVariable {
    pub fn from_declared(variable: &Variable) -> Self {
        Self {
            name: variable.display_name().to_string(),
            description: variable.description.clone(),
            args: variable.args.clone(),
        }
    }

    pub fn from_record(record: &VariableRecord) -> Self {
        Self {
            name: record.name.clone(),
            description: record.description.clone(),
            args: record.args.clone(),
        }
    }
}

/// Every diff produced for one plan, grouped by kind in apply order
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diffs {
    pub labels: Vec<Diff<DiffLabel>>,
    pub buckets: Vec<Diff<DiffBucket>>,
    pub variables: Vec<Diff<DiffVariable>>,
    pub telegrafs: Vec<Diff<DiffTelegraf>>,
    pub checks: Vec<Diff<DiffCheck>>,
    pub endpoints: Vec<Diff<DiffNotificationEndpoint>>,
    pub rules: Vec<Diff<DiffNotificationRule>>,
    pub tasks: Vec<Diff<DiffTask>>,
    pub dashboards: Vec<Diff<DiffDashboard>>,
}

impl Diffs {
    /// Total number of diff entries across every kind
    pub fn total(&self) -> usize {
        self.labels.len()
            + self.buckets.len()
            + self.variables.len()
            + self.telegrafs.len()
            + self.checks.len()
            + self.endpoints.len()
            + self.rules.len()
            + self.tasks.len()
            + self.dashboards.len()
    }

    /// Count of entries in a given state across every kind
    pub fn count_in_state(&self, state: StateStatus) -> usize {
        self.identifiers().filter(|i| i.state == state).count()
    }

    /// Count of `Exists` entries whose fields differ
    pub fn changed_count(&self) -> usize {
        fn changed<T: PartialEq>(diffs: &[Diff<T>]) -> usize {
            diffs
                .iter()
                .filter(|d| d.identifier.state == StateStatus::Exists && d.has_change())
                .count()
        }
        changed(&self.labels)
            + changed(&self.buckets)
            + changed(&self.variables)
            + changed(&self.telegrafs)
            + changed(&self.checks)
            + changed(&self.endpoints)
            + changed(&self.rules)
            + changed(&self.tasks)
            + changed(&self.dashboards)
    }

    /// Identifiers of every diff entry
    pub fn identifiers(&self) -> impl Iterator<Item = &DiffIdentifier> {
        let mut out: Vec<&DiffIdentifier> = Vec::with_capacity(self.total());
        out.extend(self.labels.iter().map(|d| &d.identifier));
        out.extend(self.buckets.iter().map(|d| &d.identifier));
        out.extend(self.variables.iter().map(|d| &d.identifier));
        out.extend(self.telegrafs.iter().map(|d| &d.identifier));
        out.extend(self.checks.iter().map(|d| &d.identifier));
        out.extend(self.endpoints.iter().map(|d| &d.identifier));
        out.extend(self.rules.iter().map(|d| &d.identifier));
        out.extend(self.tasks.iter().map(|d| &d.identifier));
        out.extend(self.dashboards.iter().map(|d| &d.identifier));
        out.into_iter()
    }

    /// Drop every diff matched by a kind skip; group kinds expand
    pub fn apply_kind_skips(&mut self, kinds: &[Kind]) {
        fn keep<T>(diffs: &mut Vec<Diff<T>>, kinds: &[Kind]) {
            diffs.retain(|d| !kinds.iter().any(|k| k.matches(d.identifier.kind)));
        }
        keep(&mut self.labels, kinds);
        keep(&mut self.buckets, kinds);
        keep(&mut self.variables, kinds);
        keep(&mut self.telegrafs, kinds);
        keep(&mut self.checks, kinds);
        keep(&mut self.endpoints, kinds);
        keep(&mut self.rules, kinds);
        keep(&mut self.tasks, kinds);
        keep(&mut self.dashboards, kinds);
    }

    /// Drop single diffs matched by `(Kind, MetaName)` skips
    pub fn apply_resource_skips(&mut self, skips: &[(Kind, String)]) {
        fn keep<T>(diffs: &mut Vec<Diff<T>>, skips: &[(Kind, String)]) {
            diffs.retain(|d| {
                !skips.iter().any(|(kind, meta_name)| {
                    kind.matches(d.identifier.kind) && *meta_name == d.identifier.meta_name
                })
            });
        }
        keep(&mut self.labels, skips);
        keep(&mut self.buckets, skips);
        keep(&mut self.variables, skips);
        keep(&mut self.telegrafs, skips);
        keep(&mut self.checks, skips);
        keep(&mut self.endpoints, skips);
        keep(&mut self.rules, skips);
        keep(&mut self.tasks, skips);
        keep(&mut self.dashboards, skips);
    }
}

/// Post-apply view of realized resources
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub resources: Vec<SummaryResource>,
}

/// One realized resource in the post-apply view
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResource {
    pub kind: Kind,
    pub meta_name: String,
    pub id: PlatformId,
    pub name: String,
    pub associations: Vec<String>,
}

/// The planner's output: ordered diffs plus plan-level diagnostics
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactSummary {
    /// Stack the plan is bound to, when any
    pub stack_id: Option<PlatformId>,

    pub diffs: Diffs,

    /// Filled after a successful apply
    pub summary: TemplateSummary,

    /// Secret keys referenced by the template but absent from the store
    pub missing_secrets: Vec<String>,

    /// Env-ref keys the caller did not bind; fatal on apply only
    pub missing_env_refs: Vec<String>,
}

/// Diffs a compiled template against live state
pub(crate) struct StateDiffer<'a> {
    pub services: &'a ServiceHandles,
    pub org_id: PlatformId,
    pub stack: Option<&'a Stack>,
}

impl StateDiffer<'_> {
    /// Produce diffs for every declared resource, plus `Remove` entries
    /// for stack-owned resources missing from the template
    pub async fn diff(
        &self,
        ctx: &CancellationToken,
        resources: &[Resource],
    ) -> Result<Diffs> {
        let mut diffs = Diffs::default();

        for resource in resources {
            match resource {
                Resource::Label(label) => diffs.labels.push(self.diff_label(ctx, label).await?),
                Resource::Bucket(bucket) => diffs.buckets.push(self.diff_bucket(ctx, bucket).await?),
                Resource::Variable(variable) => {
                    diffs.variables.push(self.diff_variable(ctx, variable).await?)
                }
                Resource::Telegraf(telegraf) => {
                    diffs.telegrafs.push(self.diff_telegraf(ctx, telegraf).await?)
                }
                Resource::Check(check) => diffs.checks.push(self.diff_check(ctx, check).await?),
                Resource::NotificationEndpoint(endpoint) => {
                    diffs.endpoints.push(self.diff_endpoint(ctx, endpoint).await?)
                }
                Resource::NotificationRule(rule) => {
                    let endpoint_id = self.resolve_endpoint_id(ctx, resources, &rule.endpoint_name).await?;
                    diffs.rules.push(self.diff_rule(ctx, rule, endpoint_id).await?)
                }
                Resource::Task(task) => diffs.tasks.push(self.diff_task(ctx, task).await?),
                Resource::Dashboard(dashboard) => {
                    diffs.dashboards.push(self.diff_dashboard(ctx, dashboard).await?)
                }
            }
        }

        self.append_removals(ctx, resources, &mut diffs).await?;
        Ok(diffs)
    }

    async fn diff_label(&self, ctx: &CancellationToken, label: &Label) -> Result<Diff<DiffLabel>> {
        let new = DiffLabel::from_declared(label);
        let live = self
            .services
            .labels
            .find_label_by_name(ctx, self.org_id, &new.name)
            .await?;
        Ok(match live {
            Some(record) => Diff {
                identifier: identifier(Some(record.id), &label.meta_name, Kind::Label, StateStatus::Exists),
                old: Some(DiffLabel::from_record(&record)),
                new: Some(new),
            },
            None => Diff {
                identifier: identifier(None, &label.meta_name, Kind::Label, StateStatus::New),
                old: None,
                new: Some(new),
            },
        })
    }

    async fn diff_bucket(&self, ctx: &CancellationToken, bucket: &Bucket) -> Result<Diff<DiffBucket>> {
        let new = DiffBucket::from_declared(bucket);
        let live = self
            .services
            .buckets
            .find_bucket_by_name(ctx, self.org_id, &new.name)
            .await?;
        Ok(match live {
            Some(record) => Diff {
                identifier: identifier(Some(record.id), &bucket.meta_name, Kind::Bucket, StateStatus::Exists),
                old: Some(DiffBucket::from_record(&record)),
                new: Some(new),
            },
            None => Diff {
                identifier: identifier(None, &bucket.meta_name, Kind::Bucket, StateStatus::New),
                old: None,
                new: Some(new),
            },
        })
    }

    async fn diff_variable(&self, ctx: &CancellationToken, variable: &Variable) -> Result<Diff<DiffVariable>> {
        let new = DiffVariable::from_declared(variable);
        let live = self
            .services
            .variables
            .find_variable_by_name(ctx, self.org_id, &new.name)
            .await?;
        Ok(match live {
            Some(record) => Diff {
                identifier: identifier(Some(record.id), &variable.meta_name, Kind::Variable, StateStatus::Exists),
                old: Some(DiffVariable::from_record(&record)),
                new: Some(new),
            },
            None => Diff {
                identifier: identifier(None, &variable.meta_name, Kind::Variable, StateStatus::New),
                old: None,
                new: Some(new),
            },
        })
    }

    async fn diff_telegraf(&self, ctx: &CancellationToken, telegraf: &Telegraf) -> Result<Diff<DiffTelegraf>> {
        let new = DiffTelegraf::from_declared(telegraf);
        let live = self
            .services
            .telegrafs
            .find_telegraf_by_name(ctx, self.org_id, &new.name)
            .await?;
        Ok(match live {
            Some(record) => Diff {
                identifier: identifier(Some(record.id), &telegraf.meta_name, Kind::Telegraf, StateStatus::Exists),
                old: Some(DiffTelegraf::from_record(&record)),
                new: Some(new),
            },
            None => Diff {
                identifier: identifier(None, &telegraf.meta_name, Kind::Telegraf, StateStatus::New),
                old: None,
                new: Some(new),
            },
        })
    }

    async fn diff_check(&self, ctx: &CancellationToken, check: &Check) -> Result<Diff<DiffCheck>> {
        let new = DiffCheck::from_declared(check);
        // The check filter API returns a list; first exact-name match wins
        let candidates = self
            .services
            .checks
            .find_checks(ctx, self.org_id, Some(&new.name))
            .await?;
        let live = candidates.into_iter().find(|c| c.name == new.name);
        Ok(match live {
            Some(record) => Diff {
                identifier: identifier(Some(record.id), &check.meta_name, check.kind(), StateStatus::Exists),
                old: Some(DiffCheck::from_record(&record)),
                new: Some(new),
            },
            None => Diff {
                identifier: identifier(None, &check.meta_name, check.kind(), StateStatus::New),
                old: None,
                new: Some(new),
            },
        })
    }

    async fn diff_endpoint(
        &self,
        ctx: &CancellationToken,
        endpoint: &NotificationEndpoint,
    ) -> Result<Diff<DiffNotificationEndpoint>> {
        let new = DiffNotificationEndpoint::from_declared(endpoint);
        let candidates = self
            .services
            .endpoints
            .find_endpoints(ctx, self.org_id, Some(&new.name))
            .await?;
        let live = candidates.into_iter().find(|e| e.name == new.name);
        Ok(match live {
            Some(record) => Diff {
                identifier: identifier(Some(record.id), &endpoint.meta_name, endpoint.kind(), StateStatus::Exists),
                old: Some(DiffNotificationEndpoint::from_record(&record)),
                new: Some(new),
            },
            None => Diff {
                identifier: identifier(None, &endpoint.meta_name, endpoint.kind(), StateStatus::New),
                old: None,
                new: Some(new),
            },
        })
    }

    /// Resolve the platform identity a rule's endpoint will have, when
    /// already knowable at plan time
    async fn resolve_endpoint_id(
        &self,
        ctx: &CancellationToken,
        resources: &[Resource],
        endpoint_meta_name: &str,
    ) -> Result<Option<PlatformId>> {
        // Declared in the template: adopt the live endpoint's identity
        // if it matches by name, else it is created during apply.
        let declared = resources.iter().find_map(|r| match r {
            Resource::NotificationEndpoint(e) if e.meta_name == endpoint_meta_name => Some(e),
            _ => None,
        });
        if let Some(endpoint) = declared {
            let candidates = self
                .services
                .endpoints
                .find_endpoints(ctx, self.org_id, Some(endpoint.display_name()))
                .await?;
            return Ok(candidates
                .into_iter()
                .find(|e| e.name == endpoint.display_name())
                .map(|e| e.id));
        }

        // Otherwise the reference must point at a stack-owned endpoint
        Ok(self.stack_resource_id(endpoint_meta_name, &[
            Kind::NotificationEndpointHttp,
            Kind::NotificationEndpointPagerDuty,
            Kind::NotificationEndpointSlack,
        ]))
    }

    async fn diff_rule(
        &self,
        ctx: &CancellationToken,
        rule: &NotificationRule,
        endpoint_id: Option<PlatformId>,
    ) -> Result<Diff<DiffNotificationRule>> {
        let new = DiffNotificationRule::from_declared(rule, endpoint_id);
        let live = self
            .services
            .rules
            .find_rule_by_name(ctx, self.org_id, &new.name)
            .await?;
        Ok(match live {
            Some(record) => Diff {
                identifier: identifier(Some(record.id), &rule.meta_name, Kind::NotificationRule, StateStatus::Exists),
                old: Some(DiffNotificationRule::from_record(&record, &rule.endpoint_name)),
                new: Some(new),
            },
            None => Diff {
                identifier: identifier(None, &rule.meta_name, Kind::NotificationRule, StateStatus::New),
                old: None,
                new: Some(new),
            },
        })
    }

    async fn diff_task(&self, ctx: &CancellationToken, task: &Task) -> Result<Diff<DiffTask>> {
        let new = DiffTask::from_declared(task);
        let live = self
            .services
            .tasks
            .find_task_by_name(ctx, self.org_id, &new.name)
            .await?;
        Ok(match live {
            Some(record) => Diff {
                identifier: identifier(Some(record.id), &task.meta_name, Kind::Task, StateStatus::Exists),
                old: Some(DiffTask::from_record(&record)),
                new: Some(new),
            },
            None => Diff {
                identifier: identifier(None, &task.meta_name, Kind::Task, StateStatus::New),
                old: None,
                new: Some(new),
            },
        })
    }

    /// Dashboards are never matched by name; they stay `New` unless the
    /// bound stack owns them, in which case they are left in place
    async fn diff_dashboard(
        &self,
        ctx: &CancellationToken,
        dashboard: &Dashboard,
    ) -> Result<Diff<DiffDashboard>> {
        let new = DiffDashboard::from_declared(dashboard);
        if let Some(id) = self.stack_resource_id(&dashboard.meta_name, &[Kind::Dashboard]) {
            match self.services.dashboards.find_dashboard_by_id(ctx, id).await {
                Ok(record) => {
                    return Ok(Diff {
                        identifier: identifier(Some(id), &dashboard.meta_name, Kind::Dashboard, StateStatus::Exists),
                        old: Some(DiffDashboard::from_record(&record)),
                        new: Some(new),
                    });
                }
                Err(ServiceError::NotFound) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Diff {
            identifier: identifier(None, &dashboard.meta_name, Kind::Dashboard, StateStatus::New),
            old: None,
            new: Some(new),
        })
    }

    fn stack_resource_id(&self, meta_name: &str, kinds: &[Kind]) -> Option<PlatformId> {
        let stack = self.stack?;
        stack
            .latest_event()
            .resources
            .iter()
            .find(|r| r.meta_name == meta_name && kinds.contains(&r.kind))
            .map(|r| r.id)
    }

    /// Stack-owned resources absent from the template become removals
    async fn append_removals(
        &self,
        ctx: &CancellationToken,
        resources: &[Resource],
        diffs: &mut Diffs,
    ) -> Result<()> {
        let Some(stack) = self.stack else {
            return Ok(());
        };
        let declared: HashSet<(Kind, &str)> = resources
            .iter()
            .map(|r| (r.kind(), r.meta_name()))
            .collect();

        for owned in &stack.latest_event().resources {
            if declared.contains(&(owned.kind, owned.meta_name.as_str())) {
                continue;
            }
            let ident = identifier(Some(owned.id), &owned.meta_name, owned.kind, StateStatus::Remove);
            match owned.kind {
                Kind::Label => {
                    if let Some(record) = not_found_ok(self.services.labels.find_label_by_id(ctx, owned.id).await)? {
                        diffs.labels.push(Diff { identifier: ident, old: Some(DiffLabel::from_record(&record)), new: None });
                    }
                }
                Kind::Bucket => {
                    if let Some(record) = not_found_ok(self.services.buckets.find_bucket_by_id(ctx, owned.id).await)? {
                        diffs.buckets.push(Diff { identifier: ident, old: Some(DiffBucket::from_record(&record)), new: None });
                    }
                }
                Kind::Variable => {
                    if let Some(record) = not_found_ok(self.services.variables.find_variable_by_id(ctx, owned.id).await)? {
                        diffs.variables.push(Diff { identifier: ident, old: Some(DiffVariable::from_record(&record)), new: None });
                    }
                }
                Kind::Telegraf => {
                    if let Some(record) = not_found_ok(self.services.telegrafs.find_telegraf_by_id(ctx, owned.id).await)? {
                        diffs.telegrafs.push(Diff { identifier: ident, old: Some(DiffTelegraf::from_record(&record)), new: None });
                    }
                }
                Kind::CheckDeadman | Kind::CheckThreshold => {
                    if let Some(record) = not_found_ok(self.services.checks.find_check_by_id(ctx, owned.id).await)? {
                        diffs.checks.push(Diff { identifier: ident, old: Some(DiffCheck::from_record(&record)), new: None });
                    }
                }
                Kind::NotificationEndpointHttp
                | Kind::NotificationEndpointPagerDuty
                | Kind::NotificationEndpointSlack => {
                    if let Some(record) = not_found_ok(self.services.endpoints.find_endpoint_by_id(ctx, owned.id).await)? {
                        diffs.endpoints.push(Diff { identifier: ident, old: Some(DiffNotificationEndpoint::from_record(&record)), new: None });
                    }
                }
                Kind::NotificationRule => {
                    if let Some(record) = not_found_ok(self.services.rules.find_rule_by_id(ctx, owned.id).await)? {
                        diffs.rules.push(Diff { identifier: ident, old: Some(DiffNotificationRule::from_record(&record, "")), new: None });
                    }
                }
                Kind::Task => {
                    if let Some(record) = not_found_ok(self.services.tasks.find_task_by_id(ctx, owned.id).await)? {
                        diffs.tasks.push(Diff { identifier: ident, old: Some(DiffTask::from_record(&record)), new: None });
                    }
                }
                Kind::Dashboard => {
                    if let Some(record) = not_found_ok(self.services.dashboards.find_dashboard_by_id(ctx, owned.id).await)? {
                        diffs.dashboards.push(Diff { identifier: ident, old: Some(DiffDashboard::from_record(&record)), new: None });
                    }
                }
                Kind::Check | Kind::NotificationEndpoint => {}
            }
        }
        Ok(())
    }
}

fn identifier(id: Option<PlatformId>, meta_name: &str, kind: Kind, state: StateStatus) -> DiffIdentifier {
    DiffIdentifier {
        id,
        meta_name: meta_name.to_string(),
        kind,
        state,
    }
}

/// Treat a missing live resource as absent rather than an error
fn not_found_ok<T>(result: std::result::Result<T, ServiceError>) -> Result<Option<T>> {
    match result {
        Ok(record) => Ok(Some(record)),
        Err(ServiceError::NotFound) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exists_diff_with_equal_sides_has_no_change() {
        let snapshot = DiffBucket {
            name: "b".to_string(),
            description: None,
            retention: Some(Duration::from_secs(3600)),
        };
        let diff = Diff {
            identifier: identifier(Some(PlatformId(1)), "b", Kind::Bucket, StateStatus::Exists),
            old: Some(snapshot.clone()),
            new: Some(snapshot),
        };
        assert!(!diff.has_change());
    }

    #[test]
    fn test_new_and_remove_always_change() {
        let snapshot = DiffLabel {
            name: "l".to_string(),
            properties: BTreeMap::new(),
        };
        let new = Diff {
            identifier: identifier(None, "l", Kind::Label, StateStatus::New),
            old: None,
            new: Some(snapshot.clone()),
        };
        let remove = Diff {
            identifier: identifier(Some(PlatformId(2)), "l", Kind::Label, StateStatus::Remove),
            old: Some(snapshot),
            new: None,
        };
        assert!(new.has_change());
        assert!(remove.has_change());
    }

    #[test]
    fn test_kind_skip_expands_group_kinds() {
        let mut diffs = Diffs::default();
        let snapshot = DiffCheck {
            name: "c".to_string(),
            description: None,
            every: Duration::from_secs(60),
            offset: None,
            status_message_template: String::new(),
            status: Status::Active,
            tags: IndexMap::new(),
            spec: CheckSpec::Threshold(strata_core::ThresholdCheckSpec {
                query: "q".to_string(),
                thresholds: vec![],
            }),
        };
        diffs.checks.push(Diff {
            identifier: identifier(None, "c", Kind::CheckThreshold, StateStatus::New),
            old: None,
            new: Some(snapshot),
        });

        diffs.apply_kind_skips(&[Kind::Check]);
        assert_eq!(diffs.total(), 0);
    }

    #[test]
    fn test_resource_skip_drops_one_entry() {
        let mut diffs = Diffs::default();
        for name in ["a", "b"] {
            diffs.labels.push(Diff {
                identifier: identifier(None, name, Kind::Label, StateStatus::New),
                old: None,
                new: Some(DiffLabel {
                    name: name.to_string(),
                    properties: BTreeMap::new(),
                }),
            });
        }

        diffs.apply_resource_skips(&[(Kind::Label, "a".to_string())]);
        assert_eq!(diffs.total(), 1);
        assert_eq!(diffs.labels[0].identifier.meta_name, "b");
    }
}
