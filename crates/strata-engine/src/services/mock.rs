//! Mock platform for testing
//!
//! One in-memory fake backs every service trait, so tests wire a single
//! [`MockPlatform`] into the orchestrator. Operation counts and
//! scriptable failure injection support assertions about exactly which
//! writes the engine issued.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use strata_core::{Kind, PlatformId};
use tokio_util::sync::CancellationToken;

use super::{
    BucketRecord, BucketService, CheckRecord, CheckService, DashboardRecord,
    DashboardService, EndpointRecord, LabelMapping, LabelRecord, LabelService,
    NotificationEndpointService, NotificationRuleService, OrganizationService, RuleRecord,
    SecretService, ServiceError, ServiceResult, TaskRecord, TaskService, TelegrafRecord,
    TelegrafService, VariableRecord, VariableService, ViewRecord,
};

/// In-memory implementation of every resource service
#[derive(Clone, Default)]
pub struct MockPlatform {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    orgs: HashSet<PlatformId>,
    secrets: HashMap<PlatformId, Vec<String>>,
    buckets: HashMap<PlatformId, BucketRecord>,
    labels: HashMap<PlatformId, LabelRecord>,
    mappings: HashSet<(PlatformId, PlatformId, Kind)>,
    dashboards: HashMap<PlatformId, DashboardRecord>,
    views: HashMap<(PlatformId, PlatformId), ViewRecord>,
    checks: HashMap<PlatformId, CheckRecord>,
    endpoints: HashMap<PlatformId, EndpointRecord>,
    rules: HashMap<PlatformId, RuleRecord>,
    tasks: HashMap<PlatformId, TaskRecord>,
    telegrafs: HashMap<PlatformId, TelegrafRecord>,
    variables: HashMap<PlatformId, VariableRecord>,
    counts: HashMap<(String, String), usize>,
    failures: HashMap<(String, String), HashSet<usize>>,
}

impl Inner {
    fn alloc_id(&mut self, requested: PlatformId) -> PlatformId {
        if requested.is_set() {
            self.next_id = self.next_id.max(requested.0);
            return requested;
        }
        self.next_id += 1;
        PlatformId(self.next_id)
    }
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an organization as existing
    pub fn seed_org(&self, org_id: PlatformId) -> &Self {
        self.inner.lock().unwrap().orgs.insert(org_id);
        self
    }

    /// Populate the org's secret store key set
    pub fn seed_secret_keys(&self, org_id: PlatformId, keys: &[&str]) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .secrets
            .insert(org_id, keys.iter().map(|k| k.to_string()).collect());
        self
    }

    /// Insert a live bucket; a zero ID gets a fresh one. Returns the
    /// stored record.
    pub fn seed_bucket(&self, mut bucket: BucketRecord) -> BucketRecord {
        let mut inner = self.inner.lock().unwrap();
        bucket.id = inner.alloc_id(bucket.id);
        inner.buckets.insert(bucket.id, bucket.clone());
        bucket
    }

    pub fn seed_label(&self, mut label: LabelRecord) -> LabelRecord {
        let mut inner = self.inner.lock().unwrap();
        label.id = inner.alloc_id(label.id);
        inner.labels.insert(label.id, label.clone());
        label
    }

    pub fn seed_endpoint(&self, mut endpoint: EndpointRecord) -> EndpointRecord {
        let mut inner = self.inner.lock().unwrap();
        endpoint.id = inner.alloc_id(endpoint.id);
        inner.endpoints.insert(endpoint.id, endpoint.clone());
        endpoint
    }

    pub fn seed_check(&self, mut check: CheckRecord) -> CheckRecord {
        let mut inner = self.inner.lock().unwrap();
        check.id = inner.alloc_id(check.id);
        check.task_id = inner.alloc_id(check.task_id);
        inner.checks.insert(check.id, check.clone());
        check
    }

    pub fn seed_task(&self, mut task: TaskRecord) -> TaskRecord {
        let mut inner = self.inner.lock().unwrap();
        task.id = inner.alloc_id(task.id);
        inner.tasks.insert(task.id, task.clone());
        task
    }

    pub fn seed_telegraf(&self, mut telegraf: TelegrafRecord) -> TelegrafRecord {
        let mut inner = self.inner.lock().unwrap();
        telegraf.id = inner.alloc_id(telegraf.id);
        inner.telegrafs.insert(telegraf.id, telegraf.clone());
        telegraf
    }

    pub fn seed_variable(&self, mut variable: VariableRecord) -> VariableRecord {
        let mut inner = self.inner.lock().unwrap();
        variable.id = inner.alloc_id(variable.id);
        inner.variables.insert(variable.id, variable.clone());
        variable
    }

    pub fn seed_dashboard(&self, mut dashboard: DashboardRecord) -> DashboardRecord {
        let mut inner = self.inner.lock().unwrap();
        dashboard.id = inner.alloc_id(dashboard.id);
        for cell in &mut dashboard.cells {
            cell.id = inner.alloc_id(cell.id);
            if let Some(view) = cell.view.take() {
                inner.views.insert((dashboard.id, cell.id), view);
            }
        }
        inner.dashboards.insert(dashboard.id, dashboard.clone());
        dashboard
    }

    pub fn seed_rule(&self, mut rule: RuleRecord) -> RuleRecord {
        let mut inner = self.inner.lock().unwrap();
        rule.id = inner.alloc_id(rule.id);
        rule.task_id = inner.alloc_id(rule.task_id);
        inner.rules.insert(rule.id, rule.clone());
        rule
    }

    /// Make the `nth` (1-indexed) call of `op` on `resource` fail with a
    /// remote error
    pub fn fail_on(&self, resource: &str, op: &str, nth: usize) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .failures
            .entry((resource.to_string(), op.to_string()))
            .or_default()
            .insert(nth);
        self
    }

    /// Number of `op` calls observed on `resource`
    pub fn op_count(&self, resource: &str, op: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .counts
            .get(&(resource.to_string(), op.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Count of live resources of one family ("bucket", "label", ...)
    pub fn live_count(&self, resource: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        match resource {
            "bucket" => inner.buckets.len(),
            "label" => inner.labels.len(),
            "mapping" => inner.mappings.len(),
            "dashboard" => inner.dashboards.len(),
            "check" => inner.checks.len(),
            "endpoint" => inner.endpoints.len(),
            "rule" => inner.rules.len(),
            "task" => inner.tasks.len(),
            "telegraf" => inner.telegrafs.len(),
            "variable" => inner.variables.len(),
            _ => 0,
        }
    }

    /// Total live resources across every family
    pub fn total_live(&self) -> usize {
        ["bucket", "label", "dashboard", "check", "endpoint", "rule", "task", "telegraf", "variable"]
            .iter()
            .map(|family| self.live_count(family))
            .sum()
    }

    fn enter(
        &self,
        ctx: &CancellationToken,
        resource: &str,
        op: &str,
    ) -> ServiceResult<MutexGuard<'_, Inner>> {
        if ctx.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        let mut inner = self.inner.lock().unwrap();
        let key = (resource.to_string(), op.to_string());
        let count = inner.counts.entry(key.clone()).or_insert(0);
        *count += 1;
        let call_number = *count;
        if inner
            .failures
            .get(&key)
            .is_some_and(|set| set.contains(&call_number))
        {
            return Err(ServiceError::Remote(format!(
                "injected failure on {} {} #{}",
                resource, op, call_number
            )));
        }
        Ok(inner)
    }
}

#[async_trait]
impl BucketService for MockPlatform {
    async fn create_bucket(&self, ctx: &CancellationToken, mut bucket: BucketRecord) -> ServiceResult<BucketRecord> {
        let mut inner = self.enter(ctx, "bucket", "create")?;
        bucket.id = inner.alloc_id(PlatformId::ZERO);
        inner.buckets.insert(bucket.id, bucket.clone());
        Ok(bucket)
    }

    async fn update_bucket(&self, ctx: &CancellationToken, bucket: BucketRecord) -> ServiceResult<BucketRecord> {
        let mut inner = self.enter(ctx, "bucket", "update")?;
        if !inner.buckets.contains_key(&bucket.id) {
            return Err(ServiceError::NotFound);
        }
        inner.buckets.insert(bucket.id, bucket.clone());
        Ok(bucket)
    }

    async fn delete_bucket(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()> {
        let mut inner = self.enter(ctx, "bucket", "delete")?;
        inner.buckets.remove(&id).map(|_| ()).ok_or(ServiceError::NotFound)
    }

    async fn find_bucket_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<BucketRecord> {
        let inner = self.enter(ctx, "bucket", "find")?;
        inner.buckets.get(&id).cloned().ok_or(ServiceError::NotFound)
    }

    async fn find_bucket_by_name(&self, ctx: &CancellationToken, org_id: PlatformId, name: &str) -> ServiceResult<Option<BucketRecord>> {
        let inner = self.enter(ctx, "bucket", "find")?;
        Ok(inner
            .buckets
            .values()
            .find(|b| b.org_id == org_id && b.name == name)
            .cloned())
    }

    async fn list_buckets(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<BucketRecord>> {
        let inner = self.enter(ctx, "bucket", "list")?;
        let mut buckets: Vec<BucketRecord> =
            inner.buckets.values().filter(|b| b.org_id == org_id).cloned().collect();
        buckets.sort_by_key(|b| b.id);
        Ok(buckets)
    }
}

#[async_trait]
impl LabelService for MockPlatform {
    async fn create_label(&self, ctx: &CancellationToken, mut label: LabelRecord) -> ServiceResult<LabelRecord> {
        let mut inner = self.enter(ctx, "label", "create")?;
        label.id = inner.alloc_id(PlatformId::ZERO);
        inner.labels.insert(label.id, label.clone());
        Ok(label)
    }

    async fn update_label(&self, ctx: &CancellationToken, label: LabelRecord) -> ServiceResult<LabelRecord> {
        let mut inner = self.enter(ctx, "label", "update")?;
        if !inner.labels.contains_key(&label.id) {
            return Err(ServiceError::NotFound);
        }
        inner.labels.insert(label.id, label.clone());
        Ok(label)
    }

    async fn delete_label(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()> {
        let mut inner = self.enter(ctx, "label", "delete")?;
        inner.labels.remove(&id).map(|_| ()).ok_or(ServiceError::NotFound)
    }

    async fn find_label_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<LabelRecord> {
        let inner = self.enter(ctx, "label", "find")?;
        inner.labels.get(&id).cloned().ok_or(ServiceError::NotFound)
    }

    async fn find_label_by_name(&self, ctx: &CancellationToken, org_id: PlatformId, name: &str) -> ServiceResult<Option<LabelRecord>> {
        let inner = self.enter(ctx, "label", "find")?;
        Ok(inner
            .labels
            .values()
            .find(|l| l.org_id == org_id && l.name == name)
            .cloned())
    }

    async fn list_labels(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<LabelRecord>> {
        let inner = self.enter(ctx, "label", "list")?;
        let mut labels: Vec<LabelRecord> =
            inner.labels.values().filter(|l| l.org_id == org_id).cloned().collect();
        labels.sort_by_key(|l| l.id);
        Ok(labels)
    }

    async fn create_label_mapping(&self, ctx: &CancellationToken, mapping: LabelMapping) -> ServiceResult<bool> {
        let mut inner = self.enter(ctx, "mapping", "create")?;
        if !mapping.label_id.is_set() || !mapping.resource_id.is_set() {
            return Err(ServiceError::Invalid("mapping ids must be non-zero".to_string()));
        }
        Ok(inner
            .mappings
            .insert((mapping.label_id, mapping.resource_id, mapping.resource_kind)))
    }

    async fn delete_label_mapping(&self, ctx: &CancellationToken, mapping: LabelMapping) -> ServiceResult<()> {
        let mut inner = self.enter(ctx, "mapping", "delete")?;
        inner
            .mappings
            .remove(&(mapping.label_id, mapping.resource_id, mapping.resource_kind));
        Ok(())
    }

    async fn find_labels_for(&self, ctx: &CancellationToken, resource_id: PlatformId, resource_kind: Kind) -> ServiceResult<Vec<LabelRecord>> {
        let inner = self.enter(ctx, "mapping", "list")?;
        let label_ids: Vec<PlatformId> = inner
            .mappings
            .iter()
            .filter(|(_, rid, rkind)| *rid == resource_id && *rkind == resource_kind)
            .map(|(lid, _, _)| *lid)
            .collect();
        let mut labels: Vec<LabelRecord> = label_ids
            .into_iter()
            .filter_map(|lid| inner.labels.get(&lid).cloned())
            .collect();
        labels.sort_by_key(|l| l.id);
        Ok(labels)
    }
}

#[async_trait]
impl DashboardService for MockPlatform {
    async fn create_dashboard(&self, ctx: &CancellationToken, mut dashboard: DashboardRecord) -> ServiceResult<DashboardRecord> {
        let mut inner = self.enter(ctx, "dashboard", "create")?;
        dashboard.id = inner.alloc_id(PlatformId::ZERO);
        for cell in &mut dashboard.cells {
            cell.id = inner.alloc_id(PlatformId::ZERO);
            if let Some(view) = cell.view.take() {
                inner.views.insert((dashboard.id, cell.id), view);
            }
        }
        inner.dashboards.insert(dashboard.id, dashboard.clone());
        Ok(dashboard)
    }

    async fn delete_dashboard(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()> {
        let mut inner = self.enter(ctx, "dashboard", "delete")?;
        inner.views.retain(|(dash_id, _), _| *dash_id != id);
        inner.dashboards.remove(&id).map(|_| ()).ok_or(ServiceError::NotFound)
    }

    async fn find_dashboard_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<DashboardRecord> {
        let inner = self.enter(ctx, "dashboard", "find")?;
        inner.dashboards.get(&id).cloned().ok_or(ServiceError::NotFound)
    }

    async fn list_dashboards(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<DashboardRecord>> {
        let inner = self.enter(ctx, "dashboard", "list")?;
        let mut dashboards: Vec<DashboardRecord> =
            inner.dashboards.values().filter(|d| d.org_id == org_id).cloned().collect();
        dashboards.sort_by_key(|d| d.id);
        Ok(dashboards)
    }

    async fn find_dashboard_view(&self, ctx: &CancellationToken, dashboard_id: PlatformId, cell_id: PlatformId) -> ServiceResult<ViewRecord> {
        let inner = self.enter(ctx, "dashboard", "find")?;
        inner
            .views
            .get(&(dashboard_id, cell_id))
            .cloned()
            .ok_or(ServiceError::NotFound)
    }
}

#[async_trait]
impl CheckService for MockPlatform {
    async fn create_check(&self, ctx: &CancellationToken, mut check: CheckRecord) -> ServiceResult<CheckRecord> {
        let mut inner = self.enter(ctx, "check", "create")?;
        check.id = inner.alloc_id(PlatformId::ZERO);
        // The platform spawns a task that evaluates the check
        check.task_id = inner.alloc_id(PlatformId::ZERO);
        inner.checks.insert(check.id, check.clone());
        Ok(check)
    }

    async fn update_check(&self, ctx: &CancellationToken, check: CheckRecord) -> ServiceResult<CheckRecord> {
        let mut inner = self.enter(ctx, "check", "update")?;
        if !inner.checks.contains_key(&check.id) {
            return Err(ServiceError::NotFound);
        }
        inner.checks.insert(check.id, check.clone());
        Ok(check)
    }

    async fn delete_check(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()> {
        let mut inner = self.enter(ctx, "check", "delete")?;
        inner.checks.remove(&id).map(|_| ()).ok_or(ServiceError::NotFound)
    }

    async fn find_check_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<CheckRecord> {
        let inner = self.enter(ctx, "check", "find")?;
        inner.checks.get(&id).cloned().ok_or(ServiceError::NotFound)
    }

    async fn find_checks(&self, ctx: &CancellationToken, org_id: PlatformId, name: Option<&str>) -> ServiceResult<Vec<CheckRecord>> {
        let inner = self.enter(ctx, "check", "list")?;
        let mut checks: Vec<CheckRecord> = inner
            .checks
            .values()
            .filter(|c| c.org_id == org_id && name.map_or(true, |n| c.name == n))
            .cloned()
            .collect();
        checks.sort_by_key(|c| c.id);
        Ok(checks)
    }
}

#[async_trait]
impl NotificationEndpointService for MockPlatform {
    async fn create_endpoint(&self, ctx: &CancellationToken, mut endpoint: EndpointRecord) -> ServiceResult<EndpointRecord> {
        let mut inner = self.enter(ctx, "endpoint", "create")?;
        endpoint.id = inner.alloc_id(PlatformId::ZERO);
        inner.endpoints.insert(endpoint.id, endpoint.clone());
        Ok(endpoint)
    }

    async fn update_endpoint(&self, ctx: &CancellationToken, endpoint: EndpointRecord) -> ServiceResult<EndpointRecord> {
        let mut inner = self.enter(ctx, "endpoint", "update")?;
        if !inner.endpoints.contains_key(&endpoint.id) {
            return Err(ServiceError::NotFound);
        }
        inner.endpoints.insert(endpoint.id, endpoint.clone());
        Ok(endpoint)
    }

    async fn delete_endpoint(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()> {
        let mut inner = self.enter(ctx, "endpoint", "delete")?;
        inner.endpoints.remove(&id).map(|_| ()).ok_or(ServiceError::NotFound)
    }

    async fn find_endpoint_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<EndpointRecord> {
        let inner = self.enter(ctx, "endpoint", "find")?;
        inner.endpoints.get(&id).cloned().ok_or(ServiceError::NotFound)
    }

    async fn find_endpoints(&self, ctx: &CancellationToken, org_id: PlatformId, name: Option<&str>) -> ServiceResult<Vec<EndpointRecord>> {
        let inner = self.enter(ctx, "endpoint", "list")?;
        let mut endpoints: Vec<EndpointRecord> = inner
            .endpoints
            .values()
            .filter(|e| e.org_id == org_id && name.map_or(true, |n| e.name == n))
            .cloned()
            .collect();
        endpoints.sort_by_key(|e| e.id);
        Ok(endpoints)
    }
}

#[async_trait]
impl NotificationRuleService for MockPlatform {
    async fn create_rule(&self, ctx: &CancellationToken, mut rule: RuleRecord) -> ServiceResult<RuleRecord> {
        let mut inner = self.enter(ctx, "rule", "create")?;
        if !rule.endpoint_id.is_set() {
            return Err(ServiceError::Invalid("rule endpoint id must be non-zero".to_string()));
        }
        rule.id = inner.alloc_id(PlatformId::ZERO);
        rule.task_id = inner.alloc_id(PlatformId::ZERO);
        inner.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn update_rule(&self, ctx: &CancellationToken, rule: RuleRecord) -> ServiceResult<RuleRecord> {
        let mut inner = self.enter(ctx, "rule", "update")?;
        if !inner.rules.contains_key(&rule.id) {
            return Err(ServiceError::NotFound);
        }
        inner.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn delete_rule(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()> {
        let mut inner = self.enter(ctx, "rule", "delete")?;
        inner.rules.remove(&id).map(|_| ()).ok_or(ServiceError::NotFound)
    }

    async fn find_rule_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<RuleRecord> {
        let inner = self.enter(ctx, "rule", "find")?;
        inner.rules.get(&id).cloned().ok_or(ServiceError::NotFound)
    }

    async fn find_rule_by_name(&self, ctx: &CancellationToken, org_id: PlatformId, name: &str) -> ServiceResult<Option<RuleRecord>> {
        let inner = self.enter(ctx, "rule", "find")?;
        Ok(inner
            .rules
            .values()
            .find(|r| r.org_id == org_id && r.name == name)
            .cloned())
    }

    async fn list_rules(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<RuleRecord>> {
        let inner = self.enter(ctx, "rule", "list")?;
        let mut rules: Vec<RuleRecord> =
            inner.rules.values().filter(|r| r.org_id == org_id).cloned().collect();
        rules.sort_by_key(|r| r.id);
        Ok(rules)
    }
}

#[async_trait]
impl TaskService for MockPlatform {
    async fn create_task(&self, ctx: &CancellationToken, mut task: TaskRecord) -> ServiceResult<TaskRecord> {
        let mut inner = self.enter(ctx, "task", "create")?;
        task.id = inner.alloc_id(PlatformId::ZERO);
        inner.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update_task(&self, ctx: &CancellationToken, task: TaskRecord) -> ServiceResult<TaskRecord> {
        let mut inner = self.enter(ctx, "task", "update")?;
        if !inner.tasks.contains_key(&task.id) {
            return Err(ServiceError::NotFound);
        }
        inner.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn delete_task(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()> {
        let mut inner = self.enter(ctx, "task", "delete")?;
        inner.tasks.remove(&id).map(|_| ()).ok_or(ServiceError::NotFound)
    }

    async fn find_task_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<TaskRecord> {
        let inner = self.enter(ctx, "task", "find")?;
        inner.tasks.get(&id).cloned().ok_or(ServiceError::NotFound)
    }

    async fn find_task_by_name(&self, ctx: &CancellationToken, org_id: PlatformId, name: &str) -> ServiceResult<Option<TaskRecord>> {
        let inner = self.enter(ctx, "task", "find")?;
        Ok(inner
            .tasks
            .values()
            .find(|t| t.org_id == org_id && t.name == name)
            .cloned())
    }

    async fn list_tasks(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<TaskRecord>> {
        let inner = self.enter(ctx, "task", "list")?;
        let mut tasks: Vec<TaskRecord> =
            inner.tasks.values().filter(|t| t.org_id == org_id).cloned().collect();
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }
}

#[async_trait]
impl TelegrafService for MockPlatform {
    async fn create_telegraf(&self, ctx: &CancellationToken, mut telegraf: TelegrafRecord) -> ServiceResult<TelegrafRecord> {
        let mut inner = self.enter(ctx, "telegraf", "create")?;
        telegraf.id = inner.alloc_id(PlatformId::ZERO);
        inner.telegrafs.insert(telegraf.id, telegraf.clone());
        Ok(telegraf)
    }

    async fn update_telegraf(&self, ctx: &CancellationToken, telegraf: TelegrafRecord) -> ServiceResult<TelegrafRecord> {
        let mut inner = self.enter(ctx, "telegraf", "update")?;
        if !inner.telegrafs.contains_key(&telegraf.id) {
            return Err(ServiceError::NotFound);
        }
        inner.telegrafs.insert(telegraf.id, telegraf.clone());
        Ok(telegraf)
    }

    async fn delete_telegraf(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()> {
        let mut inner = self.enter(ctx, "telegraf", "delete")?;
        inner.telegrafs.remove(&id).map(|_| ()).ok_or(ServiceError::NotFound)
    }

    async fn find_telegraf_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<TelegrafRecord> {
        let inner = self.enter(ctx, "telegraf", "find")?;
        inner.telegrafs.get(&id).cloned().ok_or(ServiceError::NotFound)
    }

    async fn find_telegraf_by_name(&self, ctx: &CancellationToken, org_id: PlatformId, name: &str) -> ServiceResult<Option<TelegrafRecord>> {
        let inner = self.enter(ctx, "telegraf", "find")?;
        Ok(inner
            .telegrafs
            .values()
            .find(|t| t.org_id == org_id && t.name == name)
            .cloned())
    }

    async fn list_telegrafs(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<TelegrafRecord>> {
        let inner = self.enter(ctx, "telegraf", "list")?;
        let mut telegrafs: Vec<TelegrafRecord> =
            inner.telegrafs.values().filter(|t| t.org_id == org_id).cloned().collect();
        telegrafs.sort_by_key(|t| t.id);
        Ok(telegrafs)
    }
}

#[async_trait]
impl VariableService for MockPlatform {
    async fn create_variable(&self, ctx: &CancellationToken, mut variable: VariableRecord) -> ServiceResult<VariableRecord> {
        let mut inner = self.enter(ctx, "variable", "create")?;
        variable.id = inner.alloc_id(PlatformId::ZERO);
        inner.variables.insert(variable.id, variable.clone());
        Ok(variable)
    }

    async fn update_variable(&self, ctx: &CancellationToken, variable: VariableRecord) -> ServiceResult<VariableRecord> {
        let mut inner = self.enter(ctx, "variable", "update")?;
        if !inner.variables.contains_key(&variable.id) {
            return Err(ServiceError::NotFound);
        }
        inner.variables.insert(variable.id, variable.clone());
        Ok(variable)
    }

    async fn delete_variable(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<()> {
        let mut inner = self.enter(ctx, "variable", "delete")?;
        inner.variables.remove(&id).map(|_| ()).ok_or(ServiceError::NotFound)
    }

    async fn find_variable_by_id(&self, ctx: &CancellationToken, id: PlatformId) -> ServiceResult<VariableRecord> {
        let inner = self.enter(ctx, "variable", "find")?;
        inner.variables.get(&id).cloned().ok_or(ServiceError::NotFound)
    }

    async fn find_variable_by_name(&self, ctx: &CancellationToken, org_id: PlatformId, name: &str) -> ServiceResult<Option<VariableRecord>> {
        let inner = self.enter(ctx, "variable", "find")?;
        Ok(inner
            .variables
            .values()
            .find(|v| v.org_id == org_id && v.name == name)
            .cloned())
    }

    async fn list_variables(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<VariableRecord>> {
        let inner = self.enter(ctx, "variable", "list")?;
        let mut variables: Vec<VariableRecord> =
            inner.variables.values().filter(|v| v.org_id == org_id).cloned().collect();
        variables.sort_by_key(|v| v.id);
        Ok(variables)
    }
}

#[async_trait]
impl SecretService for MockPlatform {
    async fn list_secret_keys(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<Vec<String>> {
        let inner = self.enter(ctx, "secret", "list")?;
        Ok(inner.secrets.get(&org_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl OrganizationService for MockPlatform {
    async fn organization_exists(&self, ctx: &CancellationToken, org_id: PlatformId) -> ServiceResult<bool> {
        let inner = self.enter(ctx, "org", "find")?;
        Ok(inner.orgs.contains(&org_id))
    }
}
