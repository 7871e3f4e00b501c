//! The exporter
//!
//! Runs the pipeline in reverse: reads existing resources and emits a
//! normalized template that reproduces them. Labels associated with any
//! exported resource are pulled in automatically, dashboard cell views
//! are fetched and embedded, and task flux is stripped of its schedule
//! preamble so the exported schedule fields are authoritative.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};
use strata_core::{
    Bucket, Chart, Check, Dashboard, Kind, Label, NotificationEndpoint, NotificationRule,
    PlatformId, Resource, Task, Telegraf, Template, Variable,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::options::{OrgExportFilter, ResourceToClone};
use crate::services::{
    CheckRecord, DashboardRecord, EndpointRecord, LabelRecord, RuleRecord, ServiceError,
    ServiceHandles, TaskRecord, TelegrafRecord, VariableRecord, TASK_TYPE_SYSTEM,
};

/// Hex digits of the identity hash used in generated meta-names
const META_SLUG_LEN: usize = 8;

pub(crate) struct Exporter<'a> {
    pub services: &'a ServiceHandles,
}

/// Exported resources grouped by kind, plus identity bookkeeping
#[derive(Default)]
struct ExportState {
    labels: Vec<Label>,
    buckets: Vec<Bucket>,
    variables: Vec<Variable>,
    telegrafs: Vec<Telegraf>,
    checks: Vec<Check>,
    endpoints: Vec<NotificationEndpoint>,
    rules: Vec<NotificationRule>,
    tasks: Vec<Task>,
    dashboards: Vec<Dashboard>,

    /// One canonical meta-name per exported label identity
    label_meta_by_id: HashMap<PlatformId, String>,

    /// One canonical meta-name per exported endpoint identity
    endpoint_meta_by_id: HashMap<PlatformId, String>,

    /// Families already exported, keyed by platform identity
    seen: HashSet<(&'static str, PlatformId)>,
}

impl ExportState {
    fn mark_seen(&mut self, family: &'static str, id: PlatformId) -> bool {
        self.seen.insert((family, id))
    }

    fn into_template(self) -> Template {
        let mut resources: Vec<Resource> = Vec::new();
        resources.extend(self.labels.into_iter().map(Resource::Label));
        resources.extend(self.buckets.into_iter().map(Resource::Bucket));
        resources.extend(self.variables.into_iter().map(Resource::Variable));
        resources.extend(self.telegrafs.into_iter().map(Resource::Telegraf));
        resources.extend(self.checks.into_iter().map(Resource::Check));
        resources.extend(self.endpoints.into_iter().map(Resource::NotificationEndpoint));
        resources.extend(self.rules.into_iter().map(Resource::NotificationRule));
        resources.extend(self.tasks.into_iter().map(Resource::Task));
        resources.extend(self.dashboards.into_iter().map(Resource::Dashboard));
        Template::from_resources(resources)
    }
}

impl Exporter<'_> {
    /// Export the requested clones plus, optionally, every resource of
    /// an organization
    pub async fn export(
        &self,
        ctx: &CancellationToken,
        mut clones: Vec<ResourceToClone>,
        org_filter: Option<&OrgExportFilter>,
    ) -> Result<Template> {
        if let Some(filter) = org_filter {
            clones.extend(self.org_clones(ctx, filter).await?);
        }

        let mut state = ExportState::default();

        // Labels and endpoints first so later resources can reference
        // their canonical meta-names
        for clone in clones.iter().filter(|c| c.kind.matches(Kind::Label)) {
            self.export_label(ctx, clone, &mut state).await?;
        }
        for clone in clones
            .iter()
            .filter(|c| Kind::NotificationEndpoint.matches(c.kind))
        {
            self.export_endpoint(ctx, clone, &mut state).await?;
        }

        for clone in &clones {
            match clone.kind {
                Kind::Bucket => self.export_bucket(ctx, clone, &mut state).await?,
                Kind::Check | Kind::CheckDeadman | Kind::CheckThreshold => {
                    self.export_check(ctx, clone, &mut state).await?
                }
                Kind::Dashboard => self.export_dashboard(ctx, clone, &mut state).await?,
                Kind::NotificationRule => self.export_rule(ctx, clone, &mut state).await?,
                Kind::Task => self.export_task(ctx, clone, &mut state).await?,
                Kind::Telegraf => self.export_telegraf(ctx, clone, &mut state).await?,
                Kind::Variable => self.export_variable(ctx, clone, &mut state).await?,
                Kind::Label
                | Kind::NotificationEndpoint
                | Kind::NotificationEndpointHttp
                | Kind::NotificationEndpointPagerDuty
                | Kind::NotificationEndpointSlack => {}
            }
        }

        Ok(state.into_template())
    }

    /// Expand an org-wide export into concrete clone requests
    async fn org_clones(
        &self,
        ctx: &CancellationToken,
        filter: &OrgExportFilter,
    ) -> Result<Vec<ResourceToClone>> {
        let org_id = filter.org_id;
        let wants = |kind: Kind| {
            filter.resource_kinds.is_empty()
                || filter
                    .resource_kinds
                    .iter()
                    .any(|k| k.matches(kind) || kind.matches(*k))
        };
        let mut clones = Vec::new();

        if wants(Kind::Label) {
            for label in self.services.labels.list_labels(ctx, org_id).await? {
                if !filter.label_names.is_empty() && !filter.label_names.contains(&label.name) {
                    continue;
                }
                clones.push(clone_of(Kind::Label, label.id));
            }
        }
        if wants(Kind::Bucket) {
            for bucket in self.services.buckets.list_buckets(ctx, org_id).await? {
                clones.push(clone_of(Kind::Bucket, bucket.id));
            }
        }
        if wants(Kind::Variable) {
            for variable in self.services.variables.list_variables(ctx, org_id).await? {
                clones.push(clone_of(Kind::Variable, variable.id));
            }
        }
        if wants(Kind::Telegraf) {
            for telegraf in self.services.telegrafs.list_telegrafs(ctx, org_id).await? {
                clones.push(clone_of(Kind::Telegraf, telegraf.id));
            }
        }
        if wants(Kind::Dashboard) {
            for dashboard in self.services.dashboards.list_dashboards(ctx, org_id).await? {
                clones.push(clone_of(Kind::Dashboard, dashboard.id));
            }
        }

        let checks = self.services.checks.find_checks(ctx, org_id, None).await?;
        let rules = self.services.rules.list_rules(ctx, org_id).await?;
        if wants(Kind::Check) {
            for check in &checks {
                clones.push(clone_of(Kind::Check, check.id));
            }
        }
        if wants(Kind::NotificationEndpoint) {
            for endpoint in self.services.endpoints.find_endpoints(ctx, org_id, None).await? {
                clones.push(clone_of(Kind::NotificationEndpoint, endpoint.id));
            }
        }
        if wants(Kind::NotificationRule) {
            for rule in &rules {
                clones.push(clone_of(Kind::NotificationRule, rule.id));
            }
        }
        if wants(Kind::Task) {
            // Tasks owned by a check or rule are exported through their
            // parent resource, never on their own
            let owned: HashSet<PlatformId> = checks
                .iter()
                .map(|c| c.task_id)
                .chain(rules.iter().map(|r| r.task_id))
                .collect();
            for task in self.services.tasks.list_tasks(ctx, org_id).await? {
                if task.task_type != TASK_TYPE_SYSTEM || owned.contains(&task.id) {
                    continue;
                }
                clones.push(clone_of(Kind::Task, task.id));
            }
        }

        debug!(count = clones.len(), org_id = %org_id, "expanded org export");
        Ok(clones)
    }

    async fn export_label(
        &self,
        ctx: &CancellationToken,
        clone: &ResourceToClone,
        state: &mut ExportState,
    ) -> Result<()> {
        if !state.mark_seen("label", clone.id) {
            return Ok(());
        }
        let record = self.services.labels.find_label_by_id(ctx, clone.id).await?;
        self.push_label(record, clone.name.clone(), state);
        Ok(())
    }

    fn push_label(&self, record: LabelRecord, name_override: Option<String>, state: &mut ExportState) {
        let (name, meta_name) = naming(name_override, &record.name, Kind::Label, record.id);
        state.label_meta_by_id.insert(record.id, meta_name.clone());
        state.labels.push(Label {
            meta_name,
            name: Some(name),
            color: record.properties.get("color").cloned(),
            description: record.properties.get("description").cloned(),
        });
    }

    /// Fetch the labels mapped onto a resource, exporting any not yet
    /// present, and return their canonical meta-names
    async fn backfill_labels(
        &self,
        ctx: &CancellationToken,
        state: &mut ExportState,
        resource_id: PlatformId,
        resource_kind: Kind,
    ) -> Result<Vec<String>> {
        let mut associations = Vec::new();
        for label in self
            .services
            .labels
            .find_labels_for(ctx, resource_id, resource_kind)
            .await?
        {
            if let Some(meta_name) = state.label_meta_by_id.get(&label.id) {
                associations.push(meta_name.clone());
                continue;
            }
            state.mark_seen("label", label.id);
            self.push_label(label.clone(), None, state);
            associations.push(state.label_meta_by_id[&label.id].clone());
        }
        Ok(associations)
    }

    async fn export_bucket(
        &self,
        ctx: &CancellationToken,
        clone: &ResourceToClone,
        state: &mut ExportState,
    ) -> Result<()> {
        if !state.mark_seen("bucket", clone.id) {
            return Ok(());
        }
        let record = self.services.buckets.find_bucket_by_id(ctx, clone.id).await?;
        let associations = self.backfill_labels(ctx, state, record.id, Kind::Bucket).await?;
        let (name, meta_name) = naming(clone.name.clone(), &record.name, Kind::Bucket, record.id);
        state.buckets.push(Bucket {
            meta_name,
            name: Some(name),
            description: record.description,
            retention: record.retention,
            measurement_schemas: None,
            associations,
        });
        Ok(())
    }

    async fn export_check(
        &self,
        ctx: &CancellationToken,
        clone: &ResourceToClone,
        state: &mut ExportState,
    ) -> Result<()> {
        if !state.mark_seen("check", clone.id) {
            return Ok(());
        }
        let record: CheckRecord = self.services.checks.find_check_by_id(ctx, clone.id).await?;
        let kind = match record.spec {
            strata_core::CheckSpec::Threshold(_) => Kind::CheckThreshold,
            strata_core::CheckSpec::Deadman(_) => Kind::CheckDeadman,
        };
        let associations = self.backfill_labels(ctx, state, record.id, kind).await?;
        let (name, meta_name) = naming(clone.name.clone(), &record.name, kind, record.id);
        state.checks.push(Check {
            meta_name,
            name: Some(name),
            description: record.description,
            every: record.every,
            offset: record.offset,
            status_message_template: record.status_message_template,
            status: record.status,
            tags: record.tags,
            associations,
            spec: record.spec,
        });
        Ok(())
    }

    async fn export_dashboard(
        &self,
        ctx: &CancellationToken,
        clone: &ResourceToClone,
        state: &mut ExportState,
    ) -> Result<()> {
        if !state.mark_seen("dashboard", clone.id) {
            return Ok(());
        }
        let record: DashboardRecord = self
            .services
            .dashboards
            .find_dashboard_by_id(ctx, clone.id)
            .await?;
        let associations = self.backfill_labels(ctx, state, record.id, Kind::Dashboard).await?;

        // Views are stored apart from the dashboard; fetch each cell's
        // view and embed it into the exported chart
        let mut charts = Vec::with_capacity(record.cells.len());
        for cell in &record.cells {
            let view = match self
                .services
                .dashboards
                .find_dashboard_view(ctx, record.id, cell.id)
                .await
            {
                Ok(view) => view,
                Err(ServiceError::NotFound) => continue,
                Err(err) => return Err(err.into()),
            };
            charts.push(Chart {
                kind: view.kind,
                name: view.name,
                x_pos: cell.x,
                y_pos: cell.y,
                width: cell.width,
                height: cell.height,
                queries: view.queries,
                properties: view.properties,
            });
        }

        let (name, meta_name) = naming(clone.name.clone(), &record.name, Kind::Dashboard, record.id);
        state.dashboards.push(Dashboard {
            meta_name,
            name: Some(name),
            description: record.description,
            charts,
            associations,
        });
        Ok(())
    }

    async fn export_endpoint(
        &self,
        ctx: &CancellationToken,
        clone: &ResourceToClone,
        state: &mut ExportState,
    ) -> Result<()> {
        if !state.mark_seen("endpoint", clone.id) {
            return Ok(());
        }
        let record = self
            .services
            .endpoints
            .find_endpoint_by_id(ctx, clone.id)
            .await?;
        self.push_endpoint(ctx, record, clone.name.clone(), state).await
    }

    async fn push_endpoint(
        &self,
        ctx: &CancellationToken,
        record: EndpointRecord,
        name_override: Option<String>,
        state: &mut ExportState,
    ) -> Result<()> {
        let endpoint = NotificationEndpoint {
            meta_name: String::new(),
            name: None,
            description: record.description.clone(),
            status: record.status,
            associations: self.backfill_labels(ctx, state, record.id, endpoint_kind(&record)).await?,
            spec: record.spec.clone(),
        };
        let (name, meta_name) = naming(name_override, &record.name, endpoint.kind(), record.id);
        state.endpoint_meta_by_id.insert(record.id, meta_name.clone());
        state.endpoints.push(NotificationEndpoint {
            meta_name,
            name: Some(name),
            ..endpoint
        });
        Ok(())
    }

    async fn export_rule(
        &self,
        ctx: &CancellationToken,
        clone: &ResourceToClone,
        state: &mut ExportState,
    ) -> Result<()> {
        if !state.mark_seen("rule", clone.id) {
            return Ok(());
        }
        let record: RuleRecord = self.services.rules.find_rule_by_id(ctx, clone.id).await?;

        // The rule's endpoint must appear in the same export under one
        // canonical meta-name per platform identity
        if !state.endpoint_meta_by_id.contains_key(&record.endpoint_id) {
            if state.mark_seen("endpoint", record.endpoint_id) {
                let endpoint = self
                    .services
                    .endpoints
                    .find_endpoint_by_id(ctx, record.endpoint_id)
                    .await?;
                self.push_endpoint(ctx, endpoint, None, state).await?;
            }
        }
        let endpoint_name = state
            .endpoint_meta_by_id
            .get(&record.endpoint_id)
            .cloned()
            .ok_or_else(|| {
                EngineError::Internal(format!(
                    "rule '{}' endpoint {} missing from export",
                    record.name, record.endpoint_id
                ))
            })?;

        let associations = self
            .backfill_labels(ctx, state, record.id, Kind::NotificationRule)
            .await?;
        let (name, meta_name) = naming(clone.name.clone(), &record.name, Kind::NotificationRule, record.id);
        state.rules.push(NotificationRule {
            meta_name,
            name: Some(name),
            description: record.description,
            endpoint_name,
            every: record.every,
            offset: record.offset,
            message_template: record.message_template,
            status: record.status,
            status_rules: record.status_rules,
            tag_rules: record.tag_rules,
            associations,
        });
        Ok(())
    }

    async fn export_task(
        &self,
        ctx: &CancellationToken,
        clone: &ResourceToClone,
        state: &mut ExportState,
    ) -> Result<()> {
        if !state.mark_seen("task", clone.id) {
            return Ok(());
        }
        let record: TaskRecord = self.services.tasks.find_task_by_id(ctx, clone.id).await?;
        let associations = self.backfill_labels(ctx, state, record.id, Kind::Task).await?;
        let (name, meta_name) = naming(clone.name.clone(), &record.name, Kind::Task, record.id);
        state.tasks.push(Task {
            meta_name,
            name: Some(name),
            description: record.description,
            // Schedule fields come from the task record, not the flux text
            query: strip_task_option(&record.flux),
            every: record.every,
            cron: record.cron,
            offset: record.offset,
            status: record.status,
            associations,
        });
        Ok(())
    }

    async fn export_telegraf(
        &self,
        ctx: &CancellationToken,
        clone: &ResourceToClone,
        state: &mut ExportState,
    ) -> Result<()> {
        if !state.mark_seen("telegraf", clone.id) {
            return Ok(());
        }
        let record: TelegrafRecord = self
            .services
            .telegrafs
            .find_telegraf_by_id(ctx, clone.id)
            .await?;
        let associations = self.backfill_labels(ctx, state, record.id, Kind::Telegraf).await?;
        let (name, meta_name) = naming(clone.name.clone(), &record.name, Kind::Telegraf, record.id);
        state.telegrafs.push(Telegraf {
            meta_name,
            name: Some(name),
            description: record.description,
            config: record.config,
            associations,
        });
        Ok(())
    }

    async fn export_variable(
        &self,
        ctx: &CancellationToken,
        clone: &ResourceToClone,
        state: &mut ExportState,
    ) -> Result<()> {
        if !state.mark_seen("variable", clone.id) {
            return Ok(());
        }
        let record: VariableRecord = self
            .services
            .variables
            .find_variable_by_id(ctx, clone.id)
            .await?;
        let associations = self.backfill_labels(ctx, state, record.id, Kind::Variable).await?;
        let (name, meta_name) = naming(clone.name.clone(), &record.name, Kind::Variable, record.id);
        state.variables.push(Variable {
            meta_name,
            name: Some(name),
            description: record.description,
            args: record.args,
            selected: record.selected,
            associations,
        });
        Ok(())
    }
}

fn clone_of(kind: Kind, id: PlatformId) -> ResourceToClone {
    ResourceToClone { kind, id, name: None }
}

fn endpoint_kind(record: &EndpointRecord) -> Kind {
    match record.spec {
        strata_core::EndpointSpec::Http(_) => Kind::NotificationEndpointHttp,
        strata_core::EndpointSpec::PagerDuty(_) => Kind::NotificationEndpointPagerDuty,
        strata_core::EndpointSpec::Slack(_) => Kind::NotificationEndpointSlack,
    }
}

/// Exported (name, meta-name) for a live resource
///
/// A caller-supplied name becomes both; otherwise the live name is kept
/// and the meta-name is a hash-derived slug so resources sharing a
/// display name cannot collide.
fn naming(
    name_override: Option<String>,
    live_name: &str,
    kind: Kind,
    id: PlatformId,
) -> (String, String) {
    match name_override {
        Some(name) => (name.clone(), name),
        None => (live_name.to_string(), meta_slug(kind, id)),
    }
}

/// Deterministic meta-name slug derived from a resource's identity
pub(crate) fn meta_slug(kind: Kind, id: PlatformId) -> String {
    let digest = Sha256::digest(format!("{}/{}", kind, id).as_bytes());
    format!(
        "{}-{}",
        kind_slug(kind),
        &hex::encode(digest)[..META_SLUG_LEN]
    )
}

fn kind_slug(kind: Kind) -> String {
    let mut slug = String::new();
    let mut prev_upper = true;
    for c in kind.as_str().chars() {
        if c.is_ascii_uppercase() {
            if !prev_upper {
                slug.push('-');
            }
            slug.push(c.to_ascii_lowercase());
            prev_upper = true;
        } else {
            slug.push(c);
            prev_upper = false;
        }
    }
    slug
}

/// Strip the leading `option task = { ... }` preamble from flux source
///
/// Schedule fields are re-synthesized from the task record, so the
/// preamble would otherwise duplicate (and possibly contradict) them.
pub(crate) fn strip_task_option(flux: &str) -> String {
    let trimmed = flux.trim_start();
    if !trimmed.starts_with("option task") {
        return flux.to_string();
    }
    let Some(open) = trimmed.find('{') else {
        return flux.to_string();
    };
    let mut depth = 0usize;
    for (offset, c) in trimmed[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return trimmed[open + offset + 1..].trim_start().to_string();
                }
            }
            _ => {}
        }
    }
    flux.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_task_option_removes_preamble() {
        let flux = "option task = { name: \"t\", every: 1h }\n\nfrom(bucket: \"b\") |> range(start: -1h)";
        assert_eq!(
            strip_task_option(flux),
            "from(bucket: \"b\") |> range(start: -1h)"
        );
    }

    #[test]
    fn test_strip_task_option_handles_nested_braces() {
        let flux = "option task = { name: \"t\", tags: { a: 1 } }\nbuckets()";
        assert_eq!(strip_task_option(flux), "buckets()");
    }

    #[test]
    fn test_strip_task_option_leaves_plain_flux_alone() {
        assert_eq!(strip_task_option("buckets()"), "buckets()");
    }

    #[test]
    fn test_meta_slug_is_deterministic_and_distinct() {
        let a = meta_slug(Kind::Bucket, PlatformId(1));
        let b = meta_slug(Kind::Bucket, PlatformId(1));
        let c = meta_slug(Kind::Bucket, PlatformId(2));
        let d = meta_slug(Kind::Label, PlatformId(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert!(a.starts_with("bucket-"));
    }

    #[test]
    fn test_kind_slug_breaks_on_case() {
        assert_eq!(kind_slug(Kind::CheckThreshold), "check-threshold");
        assert_eq!(kind_slug(Kind::NotificationEndpointPagerDuty), "notification-endpoint-pager-duty");
    }

    #[test]
    fn test_naming_prefers_caller_override() {
        let (name, meta) = naming(Some("custom".to_string()), "live", Kind::Bucket, PlatformId(1));
        assert_eq!(name, "custom");
        assert_eq!(meta, "custom");

        let (name, meta) = naming(None, "live", Kind::Bucket, PlatformId(1));
        assert_eq!(name, "live");
        assert!(meta.starts_with("bucket-"));
    }
}
