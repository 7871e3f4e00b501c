//! The applier
//!
//! Executes a plan's creates, updates, and deletes in dependency order:
//! labels first, then buckets/variables/telegrafs, checks, endpoints,
//! rules, tasks, dashboards, and finally label mappings. Within one kind
//! creates run before updates, deletes last.
//!
//! No backing service is transactional, so atomicity is software-only:
//! every write appends a compensating entry to a per-invocation journal.
//! On failure the journal drains in reverse insertion order with a fresh
//! cancellation handle, deleting what was created, restoring what was
//! updated, and recreating what was deleted. Compensation failures are
//! collected as diagnostics; they never mask the root cause.

use std::collections::HashMap;

use strata_core::{Kind, PlatformId, Resource};
use strata_stack::{StackAssociation, StackResource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::diff::{
    DiffBucket, DiffCheck, DiffLabel, DiffNotificationEndpoint, DiffNotificationRule, DiffTask,
    DiffTelegraf, DiffVariable, Diffs, StateStatus,
};
use crate::error::{EngineError, Result};
use crate::services::{
    BucketRecord, CellRecord, CheckRecord, DashboardRecord, EndpointRecord, LabelMapping,
    LabelRecord, RuleRecord, ServiceError, ServiceHandles, TaskRecord, TelegrafRecord,
    VariableRecord, ViewRecord, TASK_TYPE_SYSTEM,
};

/// Endpoint kinds a realized rule endpoint may carry
const ENDPOINT_KINDS: [Kind; 3] = [
    Kind::NotificationEndpointHttp,
    Kind::NotificationEndpointPagerDuty,
    Kind::NotificationEndpointSlack,
];

/// Snapshot of live state captured for compensation
#[derive(Debug, Clone)]
enum PriorState {
    Bucket(BucketRecord),
    Label(LabelRecord),
    Check(CheckRecord),
    Endpoint(EndpointRecord),
    Rule(RuleRecord),
    Task(TaskRecord),
    Telegraf(TelegrafRecord),
    Variable(VariableRecord),
}

/// One compensating step in the rollback journal
#[derive(Debug, Clone)]
enum RollbackAction {
    /// Delete a resource created during this invocation
    DeleteCreated { kind: Kind, id: PlatformId },

    /// Restore the state a resource had before this invocation updated it
    RestorePrior(Box<PriorState>),

    /// Recreate a resource this invocation deleted
    Recreate(Box<PriorState>),

    /// Remove a label mapping created during this invocation
    RemoveMapping(LabelMapping),
}

struct JournalEntry {
    action: RollbackAction,
    description: String,
}

/// Drives one apply invocation
pub(crate) struct Applier<'a> {
    services: &'a ServiceHandles,
    org_id: PlatformId,
    journal: Vec<JournalEntry>,
    /// Platform identities realized so far, template-declared and
    /// stack-owned alike
    realized: HashMap<(Kind, String), PlatformId>,
}

impl<'a> Applier<'a> {
    pub fn new(services: &'a ServiceHandles, org_id: PlatformId) -> Self {
        Self {
            services,
            org_id,
            journal: Vec::new(),
            realized: HashMap::new(),
        }
    }

    /// Adopt identities already owned by the bound stack
    pub fn seed_realized(&mut self, owned: &[StackResource]) {
        for resource in owned {
            self.realized
                .insert((resource.kind, resource.meta_name.clone()), resource.id);
        }
    }

    /// Execute the plan; on failure every change is compensated before
    /// the error is returned
    pub async fn execute(
        &mut self,
        ctx: &CancellationToken,
        resources: &[Resource],
        diffs: &mut Diffs,
    ) -> Result<Vec<StackResource>> {
        match self.run(ctx, resources, diffs).await {
            Ok(()) => Ok(self.realized_stack_resources(resources)),
            Err(cause) => {
                // Compensating deletes must survive the triggering
                // cancellation, so rollback gets a fresh handle.
                let rollback_ctx = CancellationToken::new();
                let (rolled_back, diagnostics) = self.rollback(&rollback_ctx).await;
                Err(EngineError::Rollback {
                    cause: Box::new(cause),
                    rolled_back,
                    diagnostics,
                })
            }
        }
    }

    async fn run(
        &mut self,
        ctx: &CancellationToken,
        resources: &[Resource],
        diffs: &mut Diffs,
    ) -> Result<()> {
        self.apply_labels(ctx, &mut diffs.labels).await?;
        self.apply_buckets(ctx, &mut diffs.buckets).await?;
        self.apply_variables(ctx, resources, &mut diffs.variables).await?;
        self.apply_telegrafs(ctx, &mut diffs.telegrafs).await?;
        self.apply_checks(ctx, &mut diffs.checks).await?;
        self.apply_endpoints(ctx, &mut diffs.endpoints).await?;
        self.apply_rules(ctx, &mut diffs.rules).await?;
        self.apply_tasks(ctx, &mut diffs.tasks).await?;
        self.apply_dashboards(ctx, resources, &mut diffs.dashboards).await?;
        self.apply_mappings(ctx, resources).await?;
        Ok(())
    }

    fn guard(&self, ctx: &CancellationToken) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    fn record_realized(&mut self, kind: Kind, meta_name: &str, id: PlatformId) -> Result<()> {
        if !id.is_set() {
            return Err(EngineError::Internal(format!(
                "{}/{} realized with a zero platform id",
                kind, meta_name
            )));
        }
        self.realized.insert((kind, meta_name.to_string()), id);
        Ok(())
    }

    fn journal_created(&mut self, kind: Kind, meta_name: &str, id: PlatformId) {
        self.journal.push(JournalEntry {
            action: RollbackAction::DeleteCreated { kind, id },
            description: format!("created {}/{}", kind, meta_name),
        });
    }

    fn journal_updated(&mut self, kind: Kind, meta_name: &str, prior: PriorState) {
        self.journal.push(JournalEntry {
            action: RollbackAction::RestorePrior(Box::new(prior)),
            description: format!("updated {}/{}", kind, meta_name),
        });
    }

    fn journal_deleted(&mut self, kind: Kind, meta_name: &str, prior: PriorState) {
        self.journal.push(JournalEntry {
            action: RollbackAction::Recreate(Box::new(prior)),
            description: format!("deleted {}/{}", kind, meta_name),
        });
    }

    async fn apply_labels(
        &mut self,
        ctx: &CancellationToken,
        diffs: &mut [crate::diff::Diff<DiffLabel>],
    ) -> Result<()> {
        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::New) {
            self.guard(ctx)?;
            let Some(new) = diff.new.clone() else { continue };
            let created = self
                .services
                .labels
                .create_label(ctx, LabelRecord {
                    id: PlatformId::ZERO,
                    org_id: self.org_id,
                    name: new.name,
                    properties: new.properties,
                })
                .await?;
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(Kind::Label, &meta_name, created.id)?;
            self.journal_created(Kind::Label, &meta_name, created.id);
            diff.identifier.id = Some(created.id);
        }

        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::Exists) {
            let id = diff.identifier.id.unwrap_or(PlatformId::ZERO);
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(Kind::Label, &meta_name, id)?;
            if !diff.has_change() {
                continue;
            }
            self.guard(ctx)?;
            let (Some(old), Some(new)) = (diff.old.clone(), diff.new.clone()) else { continue };
            self.services
                .labels
                .update_label(ctx, LabelRecord {
                    id,
                    org_id: self.org_id,
                    name: new.name,
                    properties: new.properties,
                })
                .await?;
            self.journal_updated(Kind::Label, &meta_name, PriorState::Label(LabelRecord {
                id,
                org_id: self.org_id,
                name: old.name,
                properties: old.properties,
            }));
        }

        for diff in diffs.iter().filter(|d| d.identifier.state == StateStatus::Remove) {
            self.guard(ctx)?;
            let Some(id) = diff.identifier.id else { continue };
            let Some(old) = diff.old.clone() else { continue };
            self.delete_tolerating_missing(self.services.labels.delete_label(ctx, id).await)?;
            self.journal_deleted(Kind::Label, &diff.identifier.meta_name, PriorState::Label(LabelRecord {
                id,
                org_id: self.org_id,
                name: old.name,
                properties: old.properties,
            }));
        }
        Ok(())
    }

    async fn apply_buckets(
        &mut self,
        ctx: &CancellationToken,
        diffs: &mut [crate::diff::Diff<DiffBucket>],
    ) -> Result<()> {
        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::New) {
            self.guard(ctx)?;
            let Some(new) = diff.new.clone() else { continue };
            let created = self
                .services
                .buckets
                .create_bucket(ctx, self.bucket_record(PlatformId::ZERO, &new))
                .await?;
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(Kind::Bucket, &meta_name, created.id)?;
            self.journal_created(Kind::Bucket, &meta_name, created.id);
            diff.identifier.id = Some(created.id);
        }

        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::Exists) {
            let id = diff.identifier.id.unwrap_or(PlatformId::ZERO);
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(Kind::Bucket, &meta_name, id)?;
            if !diff.has_change() {
                continue;
            }
            self.guard(ctx)?;
            let (Some(old), Some(new)) = (diff.old.clone(), diff.new.clone()) else { continue };
            self.services
                .buckets
                .update_bucket(ctx, self.bucket_record(id, &new))
                .await?;
            self.journal_updated(Kind::Bucket, &meta_name, PriorState::Bucket(self.bucket_record(id, &old)));
        }

        for diff in diffs.iter().filter(|d| d.identifier.state == StateStatus::Remove) {
            self.guard(ctx)?;
            let Some(id) = diff.identifier.id else { continue };
            let Some(old) = diff.old.clone() else { continue };
            self.delete_tolerating_missing(self.services.buckets.delete_bucket(ctx, id).await)?;
            self.journal_deleted(Kind::Bucket, &diff.identifier.meta_name, PriorState::Bucket(self.bucket_record(id, &old)));
        }
        Ok(())
    }

    fn bucket_record(&self, id: PlatformId, snapshot: &DiffBucket) -> BucketRecord {
        BucketRecord {
            id,
            org_id: self.org_id,
            name: snapshot.name.clone(),
            description: snapshot.description.clone(),
            retention: snapshot.retention,
        }
    }

    async fn apply_variables(
        &mut self,
        ctx: &CancellationToken,
        resources: &[Resource],
        diffs: &mut [crate::diff::Diff<DiffVariable>],
    ) -> Result<()> {
        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::New) {
            self.guard(ctx)?;
            let Some(new) = diff.new.clone() else { continue };
            let meta_name = diff.identifier.meta_name.clone();
            let selected = declared_variable_selected(resources, &meta_name);
            let created = self
                .services
                .variables
                .create_variable(ctx, self.variable_record(PlatformId::ZERO, &new, selected))
                .await?;
            self.record_realized(Kind::Variable, &meta_name, created.id)?;
            self.journal_created(Kind::Variable, &meta_name, created.id);
            diff.identifier.id = Some(created.id);
        }

        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::Exists) {
            let id = diff.identifier.id.unwrap_or(PlatformId::ZERO);
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(Kind::Variable, &meta_name, id)?;
            if !diff.has_change() {
                continue;
            }
            self.guard(ctx)?;
            let (Some(old), Some(new)) = (diff.old.clone(), diff.new.clone()) else { continue };
            let selected = declared_variable_selected(resources, &meta_name);
            self.services
                .variables
                .update_variable(ctx, self.variable_record(id, &new, selected))
                .await?;
            self.journal_updated(Kind::Variable, &meta_name, PriorState::Variable(self.variable_record(id, &old, Vec::new())));
        }

        for diff in diffs.iter().filter(|d| d.identifier.state == StateStatus::Remove) {
            self.guard(ctx)?;
            let Some(id) = diff.identifier.id else { continue };
            let Some(old) = diff.old.clone() else { continue };
            self.delete_tolerating_missing(self.services.variables.delete_variable(ctx, id).await)?;
            self.journal_deleted(Kind::Variable, &diff.identifier.meta_name, PriorState::Variable(self.variable_record(id, &old, Vec::new())));
        }
        Ok(())
    }

    fn variable_record(&self, id: PlatformId, snapshot: &DiffVariable, selected: Vec<String>) -> VariableRecord {
        VariableRecord {
            id,
            org_id: self.org_id,
            name: snapshot.name.clone(),
            description: snapshot.description.clone(),
            args: snapshot.args.clone(),
            selected,
        }
    }

    async fn apply_telegrafs(
        &mut self,
        ctx: &CancellationToken,
        diffs: &mut [crate::diff::Diff<DiffTelegraf>],
    ) -> Result<()> {
        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::New) {
            self.guard(ctx)?;
            let Some(new) = diff.new.clone() else { continue };
            let created = self
                .services
                .telegrafs
                .create_telegraf(ctx, self.telegraf_record(PlatformId::ZERO, &new))
                .await?;
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(Kind::Telegraf, &meta_name, created.id)?;
            self.journal_created(Kind::Telegraf, &meta_name, created.id);
            diff.identifier.id = Some(created.id);
        }

        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::Exists) {
            let id = diff.identifier.id.unwrap_or(PlatformId::ZERO);
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(Kind::Telegraf, &meta_name, id)?;
            if !diff.has_change() {
                continue;
            }
            self.guard(ctx)?;
            let (Some(old), Some(new)) = (diff.old.clone(), diff.new.clone()) else { continue };
            self.services
                .telegrafs
                .update_telegraf(ctx, self.telegraf_record(id, &new))
                .await?;
            self.journal_updated(Kind::Telegraf, &meta_name, PriorState::Telegraf(self.telegraf_record(id, &old)));
        }

        for diff in diffs.iter().filter(|d| d.identifier.state == StateStatus::Remove) {
            self.guard(ctx)?;
            let Some(id) = diff.identifier.id else { continue };
            let Some(old) = diff.old.clone() else { continue };
            self.delete_tolerating_missing(self.services.telegrafs.delete_telegraf(ctx, id).await)?;
            self.journal_deleted(Kind::Telegraf, &diff.identifier.meta_name, PriorState::Telegraf(self.telegraf_record(id, &old)));
        }
        Ok(())
    }

    fn telegraf_record(&self, id: PlatformId, snapshot: &DiffTelegraf) -> TelegrafRecord {
        TelegrafRecord {
            id,
            org_id: self.org_id,
            name: snapshot.name.clone(),
            description: snapshot.description.clone(),
            config: snapshot.config.clone(),
        }
    }

    async fn apply_checks(
        &mut self,
        ctx: &CancellationToken,
        diffs: &mut [crate::diff::Diff<DiffCheck>],
    ) -> Result<()> {
        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::New) {
            self.guard(ctx)?;
            let Some(new) = diff.new.clone() else { continue };
            let kind = diff.identifier.kind;
            let created = self
                .services
                .checks
                .create_check(ctx, self.check_record(PlatformId::ZERO, PlatformId::ZERO, &new))
                .await?;
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(kind, &meta_name, created.id)?;
            self.journal_created(kind, &meta_name, created.id);
            diff.identifier.id = Some(created.id);
        }

        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::Exists) {
            let id = diff.identifier.id.unwrap_or(PlatformId::ZERO);
            let kind = diff.identifier.kind;
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(kind, &meta_name, id)?;
            if !diff.has_change() {
                continue;
            }
            self.guard(ctx)?;
            let (Some(old), Some(new)) = (diff.old.clone(), diff.new.clone()) else { continue };
            self.services
                .checks
                .update_check(ctx, self.check_record(id, PlatformId::ZERO, &new))
                .await?;
            self.journal_updated(kind, &meta_name, PriorState::Check(self.check_record(id, PlatformId::ZERO, &old)));
        }

        for diff in diffs.iter().filter(|d| d.identifier.state == StateStatus::Remove) {
            self.guard(ctx)?;
            let Some(id) = diff.identifier.id else { continue };
            let Some(old) = diff.old.clone() else { continue };
            self.delete_tolerating_missing(self.services.checks.delete_check(ctx, id).await)?;
            self.journal_deleted(diff.identifier.kind, &diff.identifier.meta_name, PriorState::Check(self.check_record(id, PlatformId::ZERO, &old)));
        }
        Ok(())
    }

    fn check_record(&self, id: PlatformId, task_id: PlatformId, snapshot: &DiffCheck) -> CheckRecord {
        CheckRecord {
            id,
            org_id: self.org_id,
            task_id,
            name: snapshot.name.clone(),
            description: snapshot.description.clone(),
            every: snapshot.every,
            offset: snapshot.offset,
            status_message_template: snapshot.status_message_template.clone(),
            status: snapshot.status,
            tags: snapshot.tags.clone(),
            spec: snapshot.spec.clone(),
        }
    }

    async fn apply_endpoints(
        &mut self,
        ctx: &CancellationToken,
        diffs: &mut [crate::diff::Diff<DiffNotificationEndpoint>],
    ) -> Result<()> {
        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::New) {
            self.guard(ctx)?;
            let Some(new) = diff.new.clone() else { continue };
            let kind = diff.identifier.kind;
            let created = self
                .services
                .endpoints
                .create_endpoint(ctx, self.endpoint_record(PlatformId::ZERO, &new))
                .await?;
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(kind, &meta_name, created.id)?;
            self.journal_created(kind, &meta_name, created.id);
            diff.identifier.id = Some(created.id);
        }

        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::Exists) {
            let id = diff.identifier.id.unwrap_or(PlatformId::ZERO);
            let kind = diff.identifier.kind;
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(kind, &meta_name, id)?;
            if !diff.has_change() {
                continue;
            }
            self.guard(ctx)?;
            let (Some(old), Some(new)) = (diff.old.clone(), diff.new.clone()) else { continue };
            self.services
                .endpoints
                .update_endpoint(ctx, self.endpoint_record(id, &new))
                .await?;
            self.journal_updated(kind, &meta_name, PriorState::Endpoint(self.endpoint_record(id, &old)));
        }

        for diff in diffs.iter().filter(|d| d.identifier.state == StateStatus::Remove) {
            self.guard(ctx)?;
            let Some(id) = diff.identifier.id else { continue };
            let Some(old) = diff.old.clone() else { continue };
            self.delete_tolerating_missing(self.services.endpoints.delete_endpoint(ctx, id).await)?;
            self.journal_deleted(diff.identifier.kind, &diff.identifier.meta_name, PriorState::Endpoint(self.endpoint_record(id, &old)));
        }
        Ok(())
    }

    fn endpoint_record(&self, id: PlatformId, snapshot: &DiffNotificationEndpoint) -> EndpointRecord {
        EndpointRecord {
            id,
            org_id: self.org_id,
            name: snapshot.name.clone(),
            description: snapshot.description.clone(),
            status: snapshot.status,
            spec: snapshot.spec.clone(),
        }
    }

    async fn apply_rules(
        &mut self,
        ctx: &CancellationToken,
        diffs: &mut [crate::diff::Diff<DiffNotificationRule>],
    ) -> Result<()> {
        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::New) {
            self.guard(ctx)?;
            let Some(new) = diff.new.clone() else { continue };
            let endpoint_id = self.rule_endpoint_id(&new)?;
            let created = self
                .services
                .rules
                .create_rule(ctx, self.rule_record(PlatformId::ZERO, endpoint_id, &new))
                .await?;
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(Kind::NotificationRule, &meta_name, created.id)?;
            self.journal_created(Kind::NotificationRule, &meta_name, created.id);
            diff.identifier.id = Some(created.id);
        }

        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::Exists) {
            let id = diff.identifier.id.unwrap_or(PlatformId::ZERO);
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(Kind::NotificationRule, &meta_name, id)?;
            if !diff.has_change() {
                continue;
            }
            self.guard(ctx)?;
            let (Some(old), Some(new)) = (diff.old.clone(), diff.new.clone()) else { continue };
            let endpoint_id = self.rule_endpoint_id(&new)?;
            self.services
                .rules
                .update_rule(ctx, self.rule_record(id, endpoint_id, &new))
                .await?;
            let prior_endpoint = old.endpoint_id.unwrap_or(PlatformId::ZERO);
            self.journal_updated(Kind::NotificationRule, &meta_name, PriorState::Rule(self.rule_record(id, prior_endpoint, &old)));
        }

        for diff in diffs.iter().filter(|d| d.identifier.state == StateStatus::Remove) {
            self.guard(ctx)?;
            let Some(id) = diff.identifier.id else { continue };
            let Some(old) = diff.old.clone() else { continue };
            self.delete_tolerating_missing(self.services.rules.delete_rule(ctx, id).await)?;
            let prior_endpoint = old.endpoint_id.unwrap_or(PlatformId::ZERO);
            self.journal_deleted(Kind::NotificationRule, &diff.identifier.meta_name, PriorState::Rule(self.rule_record(id, prior_endpoint, &old)));
        }
        Ok(())
    }

    /// A rule write needs its endpoint realized: template-realized
    /// first, else the identity the planner resolved from live state
    fn rule_endpoint_id(&self, snapshot: &DiffNotificationRule) -> Result<PlatformId> {
        for kind in ENDPOINT_KINDS {
            if let Some(id) = self.realized.get(&(kind, snapshot.endpoint_meta_name.clone())) {
                return Ok(*id);
            }
        }
        snapshot.endpoint_id.ok_or_else(|| {
            EngineError::Internal(format!(
                "rule endpoint '{}' has no realized platform id",
                snapshot.endpoint_meta_name
            ))
        })
    }

    fn rule_record(&self, id: PlatformId, endpoint_id: PlatformId, snapshot: &DiffNotificationRule) -> RuleRecord {
        RuleRecord {
            id,
            org_id: self.org_id,
            task_id: PlatformId::ZERO,
            endpoint_id,
            name: snapshot.name.clone(),
            description: snapshot.description.clone(),
            every: snapshot.every,
            offset: snapshot.offset,
            message_template: snapshot.message_template.clone(),
            status: snapshot.status,
            status_rules: snapshot.status_rules.clone(),
            tag_rules: snapshot.tag_rules.clone(),
        }
    }

    async fn apply_tasks(
        &mut self,
        ctx: &CancellationToken,
        diffs: &mut [crate::diff::Diff<DiffTask>],
    ) -> Result<()> {
        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::New) {
            self.guard(ctx)?;
            let Some(new) = diff.new.clone() else { continue };
            let created = self
                .services
                .tasks
                .create_task(ctx, self.task_record(PlatformId::ZERO, &new))
                .await?;
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(Kind::Task, &meta_name, created.id)?;
            self.journal_created(Kind::Task, &meta_name, created.id);
            diff.identifier.id = Some(created.id);
        }

        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::Exists) {
            let id = diff.identifier.id.unwrap_or(PlatformId::ZERO);
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(Kind::Task, &meta_name, id)?;
            if !diff.has_change() {
                continue;
            }
            self.guard(ctx)?;
            let (Some(old), Some(new)) = (diff.old.clone(), diff.new.clone()) else { continue };
            self.services
                .tasks
                .update_task(ctx, self.task_record(id, &new))
                .await?;
            self.journal_updated(Kind::Task, &meta_name, PriorState::Task(self.task_record(id, &old)));
        }

        for diff in diffs.iter().filter(|d| d.identifier.state == StateStatus::Remove) {
            self.guard(ctx)?;
            let Some(id) = diff.identifier.id else { continue };
            let Some(old) = diff.old.clone() else { continue };
            self.delete_tolerating_missing(self.services.tasks.delete_task(ctx, id).await)?;
            self.journal_deleted(Kind::Task, &diff.identifier.meta_name, PriorState::Task(self.task_record(id, &old)));
        }
        Ok(())
    }

    fn task_record(&self, id: PlatformId, snapshot: &DiffTask) -> TaskRecord {
        TaskRecord {
            id,
            org_id: self.org_id,
            name: snapshot.name.clone(),
            description: snapshot.description.clone(),
            flux: snapshot.flux.clone(),
            every: snapshot.every,
            cron: snapshot.cron.clone(),
            offset: snapshot.offset,
            status: snapshot.status,
            task_type: TASK_TYPE_SYSTEM.to_string(),
        }
    }

    async fn apply_dashboards(
        &mut self,
        ctx: &CancellationToken,
        resources: &[Resource],
        diffs: &mut [crate::diff::Diff<crate::diff::DiffDashboard>],
    ) -> Result<()> {
        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::New) {
            self.guard(ctx)?;
            let meta_name = diff.identifier.meta_name.clone();
            let Some(declared) = declared_dashboard(resources, &meta_name) else { continue };
            let cells = declared
                .charts
                .iter()
                .map(|chart| CellRecord {
                    id: PlatformId::ZERO,
                    x: chart.x_pos,
                    y: chart.y_pos,
                    width: chart.width,
                    height: chart.height,
                    view: Some(ViewRecord {
                        name: chart.name.clone(),
                        kind: chart.kind,
                        queries: chart.queries.clone(),
                        properties: chart.properties.clone(),
                    }),
                })
                .collect();
            let created = self
                .services
                .dashboards
                .create_dashboard(ctx, DashboardRecord {
                    id: PlatformId::ZERO,
                    org_id: self.org_id,
                    name: declared.display_name().to_string(),
                    description: declared.description.clone(),
                    cells,
                })
                .await?;
            self.record_realized(Kind::Dashboard, &meta_name, created.id)?;
            self.journal_created(Kind::Dashboard, &meta_name, created.id);
            diff.identifier.id = Some(created.id);
        }

        // Stack-owned dashboards are left in place; content changes land
        // through remove and re-create, never an in-place update.
        for diff in diffs.iter_mut().filter(|d| d.identifier.state == StateStatus::Exists) {
            let id = diff.identifier.id.unwrap_or(PlatformId::ZERO);
            let meta_name = diff.identifier.meta_name.clone();
            self.record_realized(Kind::Dashboard, &meta_name, id)?;
        }

        for diff in diffs.iter().filter(|d| d.identifier.state == StateStatus::Remove) {
            self.guard(ctx)?;
            let Some(id) = diff.identifier.id else { continue };
            self.delete_tolerating_missing(self.services.dashboards.delete_dashboard(ctx, id).await)?;
            // Dashboard views cannot be re-synthesized from a summary
            // snapshot; removal is logged without a recreate entry.
            debug!(dashboard_id = %id, "deleted stack-owned dashboard");
        }
        Ok(())
    }

    /// Associate realized resources with realized labels
    async fn apply_mappings(&mut self, ctx: &CancellationToken, resources: &[Resource]) -> Result<()> {
        for resource in resources {
            let associations = resource.label_associations();
            if associations.is_empty() {
                continue;
            }
            let kind = resource.kind();
            let meta_name = resource.meta_name();
            let resource_id = self
                .realized
                .get(&(kind, meta_name.to_string()))
                .copied()
                .filter(PlatformId::is_set)
                .ok_or_else(|| {
                    EngineError::Internal(format!(
                        "cannot map labels onto {}/{} with a zero platform id",
                        kind, meta_name
                    ))
                })?;

            for association in associations {
                self.guard(ctx)?;
                let label_id = self
                    .realized
                    .get(&(Kind::Label, association.clone()))
                    .copied()
                    .filter(PlatformId::is_set)
                    .ok_or_else(|| {
                        EngineError::Internal(format!(
                            "label '{}' has no realized platform id",
                            association
                        ))
                    })?;
                let mapping = LabelMapping {
                    label_id,
                    resource_id,
                    resource_kind: kind,
                };
                let created = self.services.labels.create_label_mapping(ctx, mapping).await?;
                if created {
                    self.journal.push(JournalEntry {
                        action: RollbackAction::RemoveMapping(mapping),
                        description: format!("mapped {}/{} to label '{}'", kind, meta_name, association),
                    });
                }
            }
        }
        Ok(())
    }

    /// Build the stack's resource list from realized identities
    fn realized_stack_resources(&self, resources: &[Resource]) -> Vec<StackResource> {
        resources
            .iter()
            .filter_map(|resource| {
                let kind = resource.kind();
                let id = self
                    .realized
                    .get(&(kind, resource.meta_name().to_string()))
                    .copied()?;
                Some(StackResource {
                    api_version: strata_core::API_VERSION.to_string(),
                    id,
                    kind,
                    meta_name: resource.meta_name().to_string(),
                    associations: resource
                        .label_associations()
                        .iter()
                        .map(|meta_name| StackAssociation {
                            kind: Kind::Label,
                            meta_name: meta_name.clone(),
                        })
                        .collect(),
                })
            })
            .collect()
    }

    /// A delete may find the resource already gone; that is not a failure
    fn delete_tolerating_missing(&self, result: std::result::Result<(), ServiceError>) -> Result<()> {
        match result {
            Ok(()) | Err(ServiceError::NotFound) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Drain the journal in reverse insertion order with best-effort
    /// compensation; returns descriptions of undone changes and of
    /// compensation steps that failed
    async fn rollback(&mut self, ctx: &CancellationToken) -> (Vec<String>, Vec<String>) {
        let mut rolled_back = Vec::new();
        let mut diagnostics = Vec::new();

        for entry in self.journal.drain(..).rev() {
            let outcome = match &entry.action {
                RollbackAction::DeleteCreated { kind, id } => {
                    delete_by_kind(self.services, ctx, *kind, *id).await
                }
                RollbackAction::RestorePrior(prior) => restore_prior(self.services, ctx, prior).await,
                RollbackAction::Recreate(prior) => recreate_prior(self.services, ctx, prior).await,
                RollbackAction::RemoveMapping(mapping) => self
                    .services
                    .labels
                    .delete_label_mapping(ctx, *mapping)
                    .await
                    .map_err(|e| e.to_string()),
            };
            match outcome {
                Ok(()) => {
                    debug!(step = %entry.description, "rolled back");
                    rolled_back.push(entry.description);
                }
                Err(reason) => {
                    warn!(step = %entry.description, %reason, "rollback step failed");
                    diagnostics.push(format!("failed to roll back '{}': {}", entry.description, reason));
                }
            }
        }
        (rolled_back, diagnostics)
    }
}

fn declared_dashboard<'r>(resources: &'r [Resource], meta_name: &str) -> Option<&'r strata_core::Dashboard> {
    resources.iter().find_map(|r| match r {
        Resource::Dashboard(d) if d.meta_name == meta_name => Some(d),
        _ => None,
    })
}

fn declared_variable_selected(resources: &[Resource], meta_name: &str) -> Vec<String> {
    resources
        .iter()
        .find_map(|r| match r {
            Resource::Variable(v) if v.meta_name == meta_name => Some(v.selected.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

async fn delete_by_kind(
    services: &ServiceHandles,
    ctx: &CancellationToken,
    kind: Kind,
    id: PlatformId,
) -> std::result::Result<(), String> {
    let result = match kind {
        Kind::Label => services.labels.delete_label(ctx, id).await,
        Kind::Bucket => services.buckets.delete_bucket(ctx, id).await,
        Kind::Variable => services.variables.delete_variable(ctx, id).await,
        Kind::Telegraf => services.telegrafs.delete_telegraf(ctx, id).await,
        Kind::CheckDeadman | Kind::CheckThreshold => services.checks.delete_check(ctx, id).await,
        Kind::NotificationEndpointHttp
        | Kind::NotificationEndpointPagerDuty
        | Kind::NotificationEndpointSlack => services.endpoints.delete_endpoint(ctx, id).await,
        Kind::NotificationRule => services.rules.delete_rule(ctx, id).await,
        Kind::Task => services.tasks.delete_task(ctx, id).await,
        Kind::Dashboard => services.dashboards.delete_dashboard(ctx, id).await,
        Kind::Check | Kind::NotificationEndpoint => Ok(()),
    };
    match result {
        Ok(()) | Err(ServiceError::NotFound) => Ok(()),
        Err(err) => Err(err.to_string()),
    }
}

async fn restore_prior(
    services: &ServiceHandles,
    ctx: &CancellationToken,
    prior: &PriorState,
) -> std::result::Result<(), String> {
    let result = match prior {
        PriorState::Bucket(record) => services.buckets.update_bucket(ctx, record.clone()).await.map(|_| ()),
        PriorState::Label(record) => services.labels.update_label(ctx, record.clone()).await.map(|_| ()),
        PriorState::Check(record) => services.checks.update_check(ctx, record.clone()).await.map(|_| ()),
        PriorState::Endpoint(record) => services.endpoints.update_endpoint(ctx, record.clone()).await.map(|_| ()),
        PriorState::Rule(record) => services.rules.update_rule(ctx, record.clone()).await.map(|_| ()),
        PriorState::Task(record) => services.tasks.update_task(ctx, record.clone()).await.map(|_| ()),
        PriorState::Telegraf(record) => services.telegrafs.update_telegraf(ctx, record.clone()).await.map(|_| ()),
        PriorState::Variable(record) => services.variables.update_variable(ctx, record.clone()).await.map(|_| ()),
    };
    result.map_err(|err| err.to_string())
}

async fn recreate_prior(
    services: &ServiceHandles,
    ctx: &CancellationToken,
    prior: &PriorState,
) -> std::result::Result<(), String> {
    let result = match prior {
        PriorState::Bucket(record) => services.buckets.create_bucket(ctx, record.clone()).await.map(|_| ()),
        PriorState::Label(record) => services.labels.create_label(ctx, record.clone()).await.map(|_| ()),
        PriorState::Check(record) => services.checks.create_check(ctx, record.clone()).await.map(|_| ()),
        PriorState::Endpoint(record) => services.endpoints.create_endpoint(ctx, record.clone()).await.map(|_| ()),
        PriorState::Rule(record) => services.rules.create_rule(ctx, record.clone()).await.map(|_| ()),
        PriorState::Task(record) => services.tasks.create_task(ctx, record.clone()).await.map(|_| ()),
        PriorState::Telegraf(record) => services.telegrafs.create_telegraf(ctx, record.clone()).await.map(|_| ()),
        PriorState::Variable(record) => services.variables.create_variable(ctx, record.clone()).await.map(|_| ()),
    };
    result.map_err(|err| err.to_string())
}
