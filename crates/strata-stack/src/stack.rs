//! Stack model with an append-only event log
//!
//! A stack binds a logical template instance to the platform identities
//! it realized. Every mutation appends an event; prior events are never
//! rewritten, so the tail is always the authoritative view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_core::{normalize_remote_urls, Kind, PlatformId, API_VERSION};

/// Hex digits taken from a generated ID when renaming collisions
const COLLISION_SUFFIX_LEN: usize = 8;

/// Persistent binding between a template instance and its realized
/// resources in an organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    pub id: PlatformId,

    pub org_id: PlatformId,

    pub created_at: DateTime<Utc>,

    /// Append-only event log; never empty
    pub events: Vec<StackEvent>,
}

/// One entry in a stack's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackEvent {
    pub event_type: EventType,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<StackResource>,

    pub updated_at: DateTime<Utc>,
}

/// Event log entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    Create,
    Update,
    Uninstall,
}

/// Lifecycle state derived from the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState {
    /// Initialized but nothing applied yet
    Created,

    /// At least one apply or update has landed
    Active,

    /// Terminal; further applies fail with a conflict
    Uninstalled,
}

/// A realized resource recorded on a stack event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackResource {
    pub api_version: String,

    pub id: PlatformId,

    pub kind: Kind,

    /// Unique within one event's resource list
    pub meta_name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<StackAssociation>,
}

/// A label association recorded alongside a realized resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackAssociation {
    pub kind: Kind,

    pub meta_name: String,
}

/// Partial update applied by `UpdateStack`
#[derive(Debug, Clone, Default)]
pub struct StackUpdate {
    pub name: Option<String>,

    pub description: Option<String>,

    pub template_urls: Option<Vec<String>>,

    pub additional_resources: Vec<AdditionalResource>,
}

/// A resource adopted into a stack outside of an apply
#[derive(Debug, Clone)]
pub struct AdditionalResource {
    pub kind: Kind,

    pub id: PlatformId,

    pub meta_name: String,
}

impl Stack {
    /// Create a stack with a fresh identity and a single `Create` event
    pub fn new(
        org_id: PlatformId,
        name: impl Into<String>,
        description: impl Into<String>,
        template_urls: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PlatformId::random(),
            org_id,
            created_at: now,
            events: vec![StackEvent {
                event_type: EventType::Create,
                name: name.into(),
                description: description.into(),
                template_urls: normalize_remote_urls(&template_urls),
                resources: Vec::new(),
                updated_at: now,
            }],
        }
    }

    /// The authoritative tail of the event log
    pub fn latest_event(&self) -> &StackEvent {
        self.events.last().unwrap_or_else(|| {
            // The constructor seeds one event and events are append-only
            unreachable!("stack event log is never empty")
        })
    }

    pub fn name(&self) -> &str {
        &self.latest_event().name
    }

    /// Lifecycle state derived from the event tail
    pub fn state(&self) -> StackState {
        match self.latest_event().event_type {
            EventType::Uninstall => StackState::Uninstalled,
            EventType::Create if self.events.len() == 1 && self.latest_event().resources.is_empty() => {
                StackState::Created
            }
            _ => StackState::Active,
        }
    }

    pub fn is_uninstalled(&self) -> bool {
        self.state() == StackState::Uninstalled
    }

    /// Record a successful apply
    ///
    /// The first apply on a freshly initialized stack lands as a
    /// `Create` event; every later apply appends an `Update`.
    pub fn record_apply(&mut self, mut resources: Vec<StackResource>) {
        let event_type = match self.state() {
            StackState::Created => EventType::Create,
            _ => EventType::Update,
        };
        sort_resources(&mut resources);
        let prior = self.latest_event().clone();
        self.events.push(StackEvent {
            event_type,
            name: prior.name.clone(),
            description: prior.description.clone(),
            template_urls: prior.template_urls.clone(),
            resources,
            updated_at: Utc::now(),
        });
    }

    /// Apply a partial update, merging adopted resources
    ///
    /// Adopted resources that collide on `(Kind, MetaName)` with a
    /// different platform identity are renamed deterministically; the
    /// result is sorted by `(MetaName, Kind, ID)` for stable snapshots.
    pub fn apply_update(&mut self, update: StackUpdate) {
        let prior = self.latest_event().clone();
        let mut resources = prior.resources.clone();
        let mut collisions = 0usize;

        for additional in update.additional_resources {
            if resources
                .iter()
                .any(|r| r.kind == additional.kind && r.id == additional.id)
            {
                continue;
            }
            let mut meta_name = additional.meta_name;
            if resources
                .iter()
                .any(|r| r.kind == additional.kind && r.meta_name == meta_name)
            {
                collisions += 1;
                meta_name = format!(
                    "collision-{}-{}",
                    collisions,
                    PlatformId::random().hex_suffix(COLLISION_SUFFIX_LEN)
                );
            }
            resources.push(StackResource {
                api_version: API_VERSION.to_string(),
                id: additional.id,
                kind: additional.kind,
                meta_name,
                associations: Vec::new(),
            });
        }
        sort_resources(&mut resources);

        self.events.push(StackEvent {
            event_type: EventType::Update,
            name: update.name.unwrap_or_else(|| prior.name.clone()),
            description: update.description.unwrap_or_else(|| prior.description.clone()),
            template_urls: update
                .template_urls
                .map(|urls| normalize_remote_urls(&urls))
                .unwrap_or_else(|| prior.template_urls.clone()),
            resources,
            updated_at: Utc::now(),
        });
    }

    /// Record an uninstall; the stack becomes terminal
    pub fn record_uninstall(&mut self) {
        let prior = self.latest_event().clone();
        self.events.push(StackEvent {
            event_type: EventType::Uninstall,
            name: prior.name.clone(),
            description: prior.description.clone(),
            template_urls: prior.template_urls.clone(),
            resources: Vec::new(),
            updated_at: Utc::now(),
        });
    }
}

fn sort_resources(resources: &mut [StackResource]) {
    resources.sort_by(|a, b| {
        a.meta_name
            .cmp(&b.meta_name)
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_resource(meta_name: &str, id: u64) -> StackResource {
        StackResource {
            api_version: API_VERSION.to_string(),
            id: PlatformId(id),
            kind: Kind::Label,
            meta_name: meta_name.to_string(),
            associations: Vec::new(),
        }
    }

    #[test]
    fn test_new_stack_starts_created() {
        let stack = Stack::new(PlatformId(7), "prod", "", vec![]);
        assert_eq!(stack.state(), StackState::Created);
        assert_eq!(stack.events.len(), 1);
        assert_eq!(stack.latest_event().event_type, EventType::Create);
    }

    #[test]
    fn test_first_apply_is_a_create_event() {
        let mut stack = Stack::new(PlatformId(7), "prod", "", vec![]);
        stack.record_apply(vec![label_resource("meta-label", 1)]);
        assert_eq!(stack.latest_event().event_type, EventType::Create);
        assert_eq!(stack.state(), StackState::Active);

        stack.record_apply(vec![label_resource("meta-label", 1)]);
        assert_eq!(stack.latest_event().event_type, EventType::Update);
        assert_eq!(stack.events.len(), 3);
    }

    #[test]
    fn test_uninstall_is_terminal() {
        let mut stack = Stack::new(PlatformId(7), "prod", "", vec![]);
        stack.record_apply(vec![]);
        stack.record_uninstall();
        assert!(stack.is_uninstalled());
    }

    #[test]
    fn test_update_renames_meta_name_collisions() {
        let mut stack = Stack::new(PlatformId(7), "prod", "", vec![]);
        stack.record_apply(vec![label_resource("meta-label", 1)]);

        stack.apply_update(StackUpdate {
            additional_resources: vec![
                AdditionalResource {
                    kind: Kind::Label,
                    id: PlatformId(1),
                    meta_name: "meta-label".to_string(),
                },
                AdditionalResource {
                    kind: Kind::Label,
                    id: PlatformId(2),
                    meta_name: "meta-label".to_string(),
                },
            ],
            ..StackUpdate::default()
        });

        let resources = &stack.latest_event().resources;
        assert_eq!(resources.len(), 2);

        let kept = resources.iter().find(|r| r.meta_name == "meta-label").unwrap();
        assert_eq!(kept.id, PlatformId(1));

        let renamed = resources.iter().find(|r| r.meta_name != "meta-label").unwrap();
        assert_eq!(renamed.id, PlatformId(2));
        assert!(renamed.meta_name.starts_with("collision-1-"));
        assert_eq!(renamed.meta_name.len(), "collision-1-".len() + COLLISION_SUFFIX_LEN);
    }

    #[test]
    fn test_update_never_leaves_duplicate_identities() {
        let mut stack = Stack::new(PlatformId(7), "prod", "", vec![]);
        for round in 0..5u64 {
            stack.apply_update(StackUpdate {
                additional_resources: (0..4)
                    .map(|i| AdditionalResource {
                        kind: Kind::Label,
                        id: PlatformId(round * 10 + i + 1),
                        meta_name: "shared".to_string(),
                    })
                    .collect(),
                ..StackUpdate::default()
            });
        }

        let resources = &stack.latest_event().resources;
        let mut identities: Vec<(Kind, &str)> = resources
            .iter()
            .map(|r| (r.kind, r.meta_name.as_str()))
            .collect();
        identities.sort();
        identities.dedup();
        assert_eq!(identities.len(), resources.len());
    }

    #[test]
    fn test_update_resources_are_sorted() {
        let mut stack = Stack::new(PlatformId(7), "prod", "", vec![]);
        stack.apply_update(StackUpdate {
            additional_resources: vec![
                AdditionalResource {
                    kind: Kind::Label,
                    id: PlatformId(9),
                    meta_name: "zed".to_string(),
                },
                AdditionalResource {
                    kind: Kind::Bucket,
                    id: PlatformId(3),
                    meta_name: "alpha".to_string(),
                },
            ],
            ..StackUpdate::default()
        });

        let names: Vec<&str> = stack
            .latest_event()
            .resources
            .iter()
            .map(|r| r.meta_name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "zed"]);
    }

    #[test]
    fn test_update_carries_forward_name_and_urls() {
        let mut stack = Stack::new(
            PlatformId(7),
            "prod",
            "desc",
            vec!["https://example.com/t.yml".to_string()],
        );
        stack.apply_update(StackUpdate::default());
        let event = stack.latest_event();
        assert_eq!(event.name, "prod");
        assert_eq!(event.description, "desc");
        assert_eq!(event.template_urls, vec!["https://example.com/t.yml".to_string()]);
    }

    #[test]
    fn test_update_normalizes_new_urls() {
        let mut stack = Stack::new(PlatformId(7), "prod", "", vec![]);
        stack.apply_update(StackUpdate {
            template_urls: Some(vec![
                "file:///x".to_string(),
                "https://raw.githubusercontent.com/o/r/main/f.yml".to_string(),
            ]),
            ..StackUpdate::default()
        });
        assert_eq!(
            stack.latest_event().template_urls,
            vec!["https://github.com/o/r/blob/main/f.yml".to_string()]
        );
    }

    #[test]
    fn test_prior_events_are_never_rewritten() {
        let mut stack = Stack::new(PlatformId(7), "prod", "", vec![]);
        stack.record_apply(vec![label_resource("a", 1)]);
        let snapshot = stack.events[1].clone();

        stack.apply_update(StackUpdate {
            name: Some("renamed".to_string()),
            ..StackUpdate::default()
        });
        stack.record_uninstall();

        assert_eq!(stack.events[1], snapshot);
    }
}
