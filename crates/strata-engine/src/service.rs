//! The orchestrator facade
//!
//! Entry point for callers: dry-run, apply, export, and the stack
//! lifecycle. The orchestrator owns trait handles to every resource
//! service plus the stack store; it is stateless across invocations and
//! callers serialize concurrent applies to the same stack themselves.

use std::collections::HashSet;
use std::sync::Arc;

use strata_core::{Kind, PlatformId, Resource, Template, ValidationDefect};
use strata_stack::{Stack, StackFilter, StackStore, StackUpdate};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::apply::Applier;
use crate::diff::{ImpactSummary, StateDiffer, SummaryResource, TemplateSummary};
use crate::error::{EngineError, Result};
use crate::export::Exporter;
use crate::options::{ApplyOptions, ExportOptions, ResourceToClone};
use crate::resolver::resolve_references;
use crate::services::{
    BucketService, CheckService, DashboardService, LabelService, NotificationEndpointService,
    NotificationRuleService, OrganizationService, SecretService, ServiceHandles, TaskService,
    TelegrafService, VariableService,
};

/// Declarative resource orchestrator
pub struct Orchestrator {
    services: ServiceHandles,
    store: Arc<dyn StackStore>,
}

/// Builder wiring service handles into an [`Orchestrator`]
#[derive(Default)]
pub struct OrchestratorBuilder {
    store: Option<Arc<dyn StackStore>>,
    orgs: Option<Arc<dyn OrganizationService>>,
    secrets: Option<Arc<dyn SecretService>>,
    buckets: Option<Arc<dyn BucketService>>,
    labels: Option<Arc<dyn LabelService>>,
    dashboards: Option<Arc<dyn DashboardService>>,
    checks: Option<Arc<dyn CheckService>>,
    endpoints: Option<Arc<dyn NotificationEndpointService>>,
    rules: Option<Arc<dyn NotificationRuleService>>,
    tasks: Option<Arc<dyn TaskService>>,
    telegrafs: Option<Arc<dyn TelegrafService>>,
    variables: Option<Arc<dyn VariableService>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: Arc<dyn StackStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Wire every resource service from one implementation
    pub fn with_platform<P>(mut self, platform: Arc<P>) -> Self
    where
        P: OrganizationService
            + SecretService
            + BucketService
            + LabelService
            + DashboardService
            + CheckService
            + NotificationEndpointService
            + NotificationRuleService
            + TaskService
            + TelegrafService
            + VariableService
            + 'static,
    {
        self.orgs = Some(platform.clone());
        self.secrets = Some(platform.clone());
        self.buckets = Some(platform.clone());
        self.labels = Some(platform.clone());
        self.dashboards = Some(platform.clone());
        self.checks = Some(platform.clone());
        self.endpoints = Some(platform.clone());
        self.rules = Some(platform.clone());
        self.tasks = Some(platform.clone());
        self.telegrafs = Some(platform.clone());
        self.variables = Some(platform);
        self
    }

    pub fn with_organization_service(mut self, svc: Arc<dyn OrganizationService>) -> Self {
        self.orgs = Some(svc);
        self
    }

    pub fn with_secret_service(mut self, svc: Arc<dyn SecretService>) -> Self {
        self.secrets = Some(svc);
        self
    }

    pub fn with_bucket_service(mut self, svc: Arc<dyn BucketService>) -> Self {
        self.buckets = Some(svc);
        self
    }

    pub fn with_label_service(mut self, svc: Arc<dyn LabelService>) -> Self {
        self.labels = Some(svc);
        self
    }

    pub fn with_dashboard_service(mut self, svc: Arc<dyn DashboardService>) -> Self {
        self.dashboards = Some(svc);
        self
    }

    pub fn with_check_service(mut self, svc: Arc<dyn CheckService>) -> Self {
        self.checks = Some(svc);
        self
    }

    pub fn with_endpoint_service(mut self, svc: Arc<dyn NotificationEndpointService>) -> Self {
        self.endpoints = Some(svc);
        self
    }

    pub fn with_rule_service(mut self, svc: Arc<dyn NotificationRuleService>) -> Self {
        self.rules = Some(svc);
        self
    }

    pub fn with_task_service(mut self, svc: Arc<dyn TaskService>) -> Self {
        self.tasks = Some(svc);
        self
    }

    pub fn with_telegraf_service(mut self, svc: Arc<dyn TelegrafService>) -> Self {
        self.telegrafs = Some(svc);
        self
    }

    pub fn with_variable_service(mut self, svc: Arc<dyn VariableService>) -> Self {
        self.variables = Some(svc);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let missing = |what: &str| EngineError::Internal(format!("orchestrator builder missing {what}"));
        Ok(Orchestrator {
            services: ServiceHandles {
                orgs: self.orgs.ok_or_else(|| missing("organization service"))?,
                secrets: self.secrets.ok_or_else(|| missing("secret service"))?,
                buckets: self.buckets.ok_or_else(|| missing("bucket service"))?,
                labels: self.labels.ok_or_else(|| missing("label service"))?,
                dashboards: self.dashboards.ok_or_else(|| missing("dashboard service"))?,
                checks: self.checks.ok_or_else(|| missing("check service"))?,
                endpoints: self.endpoints.ok_or_else(|| missing("endpoint service"))?,
                rules: self.rules.ok_or_else(|| missing("rule service"))?,
                tasks: self.tasks.ok_or_else(|| missing("task service"))?,
                telegrafs: self.telegrafs.ok_or_else(|| missing("telegraf service"))?,
                variables: self.variables.ok_or_else(|| missing("variable service"))?,
            },
            store: self.store.ok_or_else(|| missing("stack store"))?,
        })
    }
}

struct Plan {
    resources: Vec<Resource>,
    stack: Option<Stack>,
    summary: ImpactSummary,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Plan a template against live state without writing anything
    pub async fn dry_run(
        &self,
        ctx: &CancellationToken,
        org_id: PlatformId,
        opts: ApplyOptions,
    ) -> Result<ImpactSummary> {
        debug!(org_id = %org_id, "dry run");
        let plan = self.plan(ctx, org_id, &opts, false).await?;
        Ok(plan.summary)
    }

    /// Apply a template: execute the plan transactionally and bind the
    /// outcome to a stack
    pub async fn apply(
        &self,
        ctx: &CancellationToken,
        org_id: PlatformId,
        opts: ApplyOptions,
    ) -> Result<ImpactSummary> {
        debug!(org_id = %org_id, stack_id = ?opts.stack_id, "apply");
        let mut plan = self.plan(ctx, org_id, &opts, true).await?;

        let mut stack = match plan.stack.take() {
            Some(stack) => stack,
            None => self.init_stack(ctx, org_id, "", "", Vec::new()).await?,
        };
        plan.summary.stack_id = Some(stack.id);

        // Resources whose diffs were skip-filtered take no part in the
        // apply, the stack event, or label mappings
        let active: HashSet<(Kind, String)> = plan
            .summary
            .diffs
            .identifiers()
            .map(|i| (i.kind, i.meta_name.clone()))
            .collect();
        let resources: Vec<Resource> = plan
            .resources
            .into_iter()
            .filter(|r| active.contains(&(r.kind(), r.meta_name().to_string())))
            .collect();

        let mut applier = Applier::new(&self.services, org_id);
        applier.seed_realized(&stack.latest_event().resources);
        let stack_resources = applier
            .execute(ctx, &resources, &mut plan.summary.diffs)
            .await?;

        stack.record_apply(stack_resources.clone());
        self.store.update_stack(&stack).await?;

        plan.summary.summary = TemplateSummary {
            resources: stack_resources
                .iter()
                .map(|r| SummaryResource {
                    kind: r.kind,
                    meta_name: r.meta_name.clone(),
                    id: r.id,
                    name: resources
                        .iter()
                        .find(|declared| {
                            declared.kind() == r.kind && declared.meta_name() == r.meta_name
                        })
                        .map(|declared| declared.display_name().to_string())
                        .unwrap_or_else(|| r.meta_name.clone()),
                    associations: r.associations.iter().map(|a| a.meta_name.clone()).collect(),
                })
                .collect(),
        };
        Ok(plan.summary)
    }

    async fn plan(
        &self,
        ctx: &CancellationToken,
        org_id: PlatformId,
        opts: &ApplyOptions,
        for_apply: bool,
    ) -> Result<Plan> {
        // Merge templates, later over earlier
        let mut template = Template::default();
        for layer in opts.templates.iter().cloned() {
            template = template.merge(layer);
        }
        let template = template.bind_env_refs(&opts.env_refs);
        let missing_env_refs = template.missing_env_refs().to_vec();
        if for_apply && !missing_env_refs.is_empty() {
            return Err(EngineError::Validation {
                defects: missing_env_refs
                    .iter()
                    .map(|key| {
                        ValidationDefect::template("envRef", format!("unbound env ref '{}'", key))
                    })
                    .collect(),
            });
        }

        let resources = template.compile()?;

        let stack = match opts.stack_id {
            Some(stack_id) => {
                let stack = self.store.read_stack_by_id(stack_id).await?;
                if stack.org_id != org_id {
                    return Err(EngineError::Conflict(format!(
                        "stack '{}' belongs to another organization",
                        stack_id
                    )));
                }
                if stack.is_uninstalled() {
                    return Err(EngineError::Conflict(format!(
                        "stack '{}' is uninstalled",
                        stack_id
                    )));
                }
                Some(stack)
            }
            None => None,
        };

        resolve_references(&resources, stack.as_ref())?;

        let differ = StateDiffer {
            services: &self.services,
            org_id,
            stack: stack.as_ref(),
        };
        let mut diffs = differ.diff(ctx, &resources).await?;
        diffs.apply_kind_skips(&opts.kind_skips);
        diffs.apply_resource_skips(&opts.resource_skips);

        let referenced = template.secret_keys();
        let missing_secrets = if referenced.is_empty() {
            Vec::new()
        } else {
            let mut present: HashSet<String> = self
                .services
                .secrets
                .list_secret_keys(ctx, org_id)
                .await?
                .into_iter()
                .collect();
            present.extend(opts.secrets.keys().cloned());
            referenced
                .into_iter()
                .filter(|key| !present.contains(key))
                .collect()
        };

        Ok(Plan {
            resources,
            summary: ImpactSummary {
                stack_id: stack.as_ref().map(|s| s.id),
                diffs,
                summary: TemplateSummary::default(),
                missing_secrets,
                missing_env_refs,
            },
            stack,
        })
    }

    /// Export existing resources (explicit list, stack-owned, or a whole
    /// organization) as a template
    pub async fn export(&self, ctx: &CancellationToken, opts: ExportOptions) -> Result<Template> {
        let mut clones = opts.resources.clone();
        if let Some(stack_id) = opts.stack_id {
            let stack = self.store.read_stack_by_id(stack_id).await?;
            clones.extend(stack.latest_event().resources.iter().map(|r| ResourceToClone {
                kind: r.kind,
                id: r.id,
                name: None,
            }));
        }
        let exporter = Exporter {
            services: &self.services,
        };
        exporter.export(ctx, clones, opts.org_filter.as_ref()).await
    }

    /// Initialize a stack in an organization
    pub async fn init_stack(
        &self,
        ctx: &CancellationToken,
        org_id: PlatformId,
        name: impl Into<String>,
        description: impl Into<String>,
        template_urls: Vec<String>,
    ) -> Result<Stack> {
        if !self.services.orgs.organization_exists(ctx, org_id).await? {
            return Err(EngineError::Conflict(format!(
                "organization '{}' does not exist",
                org_id
            )));
        }
        let stack = Stack::new(org_id, name, description, template_urls);
        self.store
            .create_stack(&stack)
            .await
            .map_err(|err| EngineError::Internal(err.to_string()))?;
        debug!(stack_id = %stack.id, org_id = %org_id, "initialized stack");
        Ok(stack)
    }

    pub async fn read_stack(&self, id: PlatformId) -> Result<Stack> {
        Ok(self.store.read_stack_by_id(id).await?)
    }

    pub async fn list_stacks(&self, org_id: PlatformId, filter: StackFilter) -> Result<Vec<Stack>> {
        Ok(self.store.list_stacks(org_id, filter).await?)
    }

    /// Apply a partial update to a stack's latest event
    pub async fn update_stack(&self, id: PlatformId, update: StackUpdate) -> Result<Stack> {
        let mut stack = self.store.read_stack_by_id(id).await?;
        if stack.is_uninstalled() {
            return Err(EngineError::Conflict(format!("stack '{}' is uninstalled", id)));
        }
        stack.apply_update(update);
        self.store.update_stack(&stack).await?;
        Ok(stack)
    }

    /// Remove a stack's persisted state; realized resources are left
    /// untouched
    pub async fn delete_stack(&self, id: PlatformId) -> Result<()> {
        match self.store.delete_stack(id).await {
            Ok(()) => Ok(()),
            Err(strata_stack::StackError::StackNotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete every resource a stack owns, then mark it uninstalled
    pub async fn uninstall(
        &self,
        ctx: &CancellationToken,
        org_id: PlatformId,
        stack_id: PlatformId,
    ) -> Result<Stack> {
        debug!(stack_id = %stack_id, "uninstall");
        let mut stack = self.store.read_stack_by_id(stack_id).await?;
        if stack.org_id != org_id {
            return Err(EngineError::Conflict(format!(
                "stack '{}' belongs to another organization",
                stack_id
            )));
        }
        if stack.is_uninstalled() {
            return Err(EngineError::Conflict(format!(
                "stack '{}' is uninstalled",
                stack_id
            )));
        }

        // Reconciling an empty template against the stack turns every
        // owned resource into a removal, with the usual rollback safety
        let differ = StateDiffer {
            services: &self.services,
            org_id,
            stack: Some(&stack),
        };
        let mut diffs = differ.diff(ctx, &[]).await?;
        let mut applier = Applier::new(&self.services, org_id);
        applier.execute(ctx, &[], &mut diffs).await?;

        stack.record_uninstall();
        self.store.update_stack(&stack).await?;
        Ok(stack)
    }
}
