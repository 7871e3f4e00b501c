//! Reference resolution
//!
//! Every cross-reference in a template must land on a declaration in the
//! same template or on a resource already owned by the bound stack.
//! Resolution collects every dangling reference before failing, so one
//! invocation reports all of them.

use std::collections::HashSet;

use strata_core::{Kind, Resource};
use strata_stack::Stack;

use crate::error::{EngineError, MissingReference, Result};

/// Endpoint kinds a rule reference may land on
const ENDPOINT_KINDS: [Kind; 3] = [
    Kind::NotificationEndpointHttp,
    Kind::NotificationEndpointPagerDuty,
    Kind::NotificationEndpointSlack,
];

/// Validate label associations and rule endpoint references
pub(crate) fn resolve_references(resources: &[Resource], stack: Option<&Stack>) -> Result<()> {
    let declared_labels: HashSet<&str> = resources
        .iter()
        .filter(|r| r.kind() == Kind::Label)
        .map(Resource::meta_name)
        .collect();
    let declared_endpoints: HashSet<&str> = resources
        .iter()
        .filter(|r| ENDPOINT_KINDS.contains(&r.kind()))
        .map(Resource::meta_name)
        .collect();

    let stack_resources = stack
        .map(|s| s.latest_event().resources.as_slice())
        .unwrap_or_default();
    let stack_owned = |kinds: &[Kind], meta_name: &str| {
        stack_resources
            .iter()
            .any(|r| r.meta_name == meta_name && kinds.contains(&r.kind))
    };

    let mut missing = Vec::new();
    for resource in resources {
        for association in resource.label_associations() {
            if !declared_labels.contains(association.as_str())
                && !stack_owned(&[Kind::Label], association)
            {
                missing.push(MissingReference {
                    kind: resource.kind(),
                    meta_name: resource.meta_name().to_string(),
                    field: "associations".to_string(),
                    reference: association.clone(),
                });
            }
        }
        if let Resource::NotificationRule(rule) = resource {
            if !declared_endpoints.contains(rule.endpoint_name.as_str())
                && !stack_owned(&ENDPOINT_KINDS, &rule.endpoint_name)
            {
                missing.push(MissingReference {
                    kind: Kind::NotificationRule,
                    meta_name: rule.meta_name.clone(),
                    field: "endpointName".to_string(),
                    reference: rule.endpoint_name.clone(),
                });
            }
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::RefMissing { missing })
    }
}
