//! Option builders for apply and export operations

use std::collections::HashMap;

use strata_core::{EnvRefValue, Kind, PlatformId, Template};

/// Options for dry-run and apply operations
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Templates merged in order; later templates win per
    /// `(Kind, MetaName)`
    pub templates: Vec<Template>,

    /// Existing stack to reconcile against
    pub stack_id: Option<PlatformId>,

    /// Bindings for `envRef` placeholders
    pub env_refs: HashMap<String, EnvRefValue>,

    /// Secret keys treated as present even if absent from the store
    pub secrets: HashMap<String, String>,

    /// Kinds dropped from the plan; group kinds expand to their variants
    pub kind_skips: Vec<Kind>,

    /// Single resources dropped from the plan
    pub resource_skips: Vec<(Kind, String)>,
}

impl ApplyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template to the merge set
    pub fn with_template(mut self, template: Template) -> Self {
        self.templates.push(template);
        self
    }

    /// Bind the plan to an existing stack
    pub fn with_stack_id(mut self, stack_id: PlatformId) -> Self {
        self.stack_id = Some(stack_id);
        self
    }

    /// Bind environment references
    pub fn with_env_refs(mut self, env_refs: HashMap<String, EnvRefValue>) -> Self {
        self.env_refs.extend(env_refs);
        self
    }

    /// Pre-populate secret keys treated as present
    pub fn with_secrets(mut self, secrets: HashMap<String, String>) -> Self {
        self.secrets.extend(secrets);
        self
    }

    /// Drop every diff of a kind
    pub fn with_kind_skip(mut self, kind: Kind) -> Self {
        self.kind_skips.push(kind);
        self
    }

    /// Drop one resource's diff
    pub fn with_resource_skip(mut self, kind: Kind, meta_name: impl Into<String>) -> Self {
        self.resource_skips.push((kind, meta_name.into()));
        self
    }
}

/// A single existing resource requested for export
#[derive(Debug, Clone)]
pub struct ResourceToClone {
    pub kind: Kind,

    pub id: PlatformId,

    /// Overrides both the exported name and meta-name when set
    pub name: Option<String>,
}

/// Filter for whole-organization exports
#[derive(Debug, Clone)]
pub struct OrgExportFilter {
    pub org_id: PlatformId,

    /// Restrict to these kinds; empty means every kind
    pub resource_kinds: Vec<Kind>,

    /// Restrict exported labels to these names; empty means all
    pub label_names: Vec<String>,
}

/// Options for export operations
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub resources: Vec<ResourceToClone>,

    pub org_filter: Option<OrgExportFilter>,

    pub stack_id: Option<PlatformId>,
}

impl ExportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export specific existing resources
    pub fn with_resources(mut self, resources: Vec<ResourceToClone>) -> Self {
        self.resources.extend(resources);
        self
    }

    /// Export every resource of an organization, optionally narrowed
    pub fn with_all_org_resources(mut self, filter: OrgExportFilter) -> Self {
        self.org_filter = Some(filter);
        self
    }

    /// Export the resources owned by a stack
    pub fn with_stack_id(mut self, stack_id: PlatformId) -> Self {
        self.stack_id = Some(stack_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_options_builder() {
        let opts = ApplyOptions::new()
            .with_stack_id(PlatformId(5))
            .with_kind_skip(Kind::Check)
            .with_resource_skip(Kind::Bucket, "bkt-1");

        assert_eq!(opts.stack_id, Some(PlatformId(5)));
        assert_eq!(opts.kind_skips, vec![Kind::Check]);
        assert_eq!(opts.resource_skips, vec![(Kind::Bucket, "bkt-1".to_string())]);
    }

    #[test]
    fn test_env_refs_accumulate() {
        let opts = ApplyOptions::new()
            .with_env_refs(HashMap::from([("a".to_string(), EnvRefValue::from("1"))]))
            .with_env_refs(HashMap::from([("b".to_string(), EnvRefValue::from("2"))]));
        assert_eq!(opts.env_refs.len(), 2);
    }
}
