//! Resource kinds

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The closed set of resource kinds a template may declare
///
/// `Check` and `NotificationEndpoint` are abstract group kinds: they never
/// appear on a realized resource but match any of their concrete variants
/// in skip filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    Bucket,
    Check,
    CheckDeadman,
    CheckThreshold,
    Dashboard,
    Label,
    NotificationEndpoint,
    NotificationEndpointHttp,
    NotificationEndpointPagerDuty,
    NotificationEndpointSlack,
    NotificationRule,
    Task,
    Telegraf,
    Variable,
}

impl Kind {
    /// Every concrete (non-group) kind, in display order
    pub const CONCRETE: &'static [Kind] = &[
        Kind::Label,
        Kind::Bucket,
        Kind::CheckDeadman,
        Kind::CheckThreshold,
        Kind::Dashboard,
        Kind::NotificationEndpointHttp,
        Kind::NotificationEndpointPagerDuty,
        Kind::NotificationEndpointSlack,
        Kind::NotificationRule,
        Kind::Task,
        Kind::Telegraf,
        Kind::Variable,
    ];

    /// Canonical template string for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Bucket => "Bucket",
            Kind::Check => "Check",
            Kind::CheckDeadman => "CheckDeadman",
            Kind::CheckThreshold => "CheckThreshold",
            Kind::Dashboard => "Dashboard",
            Kind::Label => "Label",
            Kind::NotificationEndpoint => "NotificationEndpoint",
            Kind::NotificationEndpointHttp => "NotificationEndpointHTTP",
            Kind::NotificationEndpointPagerDuty => "NotificationEndpointPagerDuty",
            Kind::NotificationEndpointSlack => "NotificationEndpointSlack",
            Kind::NotificationRule => "NotificationRule",
            Kind::Task => "Task",
            Kind::Telegraf => "Telegraf",
            Kind::Variable => "Variable",
        }
    }

    /// True for the abstract group kinds
    pub fn is_group(&self) -> bool {
        matches!(self, Kind::Check | Kind::NotificationEndpoint)
    }

    /// Concrete variants covered by a group kind (a concrete kind covers itself)
    pub fn concrete_variants(&self) -> &'static [Kind] {
        match self {
            Kind::Check => &[Kind::CheckDeadman, Kind::CheckThreshold],
            Kind::NotificationEndpoint => &[
                Kind::NotificationEndpointHttp,
                Kind::NotificationEndpointPagerDuty,
                Kind::NotificationEndpointSlack,
            ],
            Kind::Bucket => &[Kind::Bucket],
            Kind::CheckDeadman => &[Kind::CheckDeadman],
            Kind::CheckThreshold => &[Kind::CheckThreshold],
            Kind::Dashboard => &[Kind::Dashboard],
            Kind::Label => &[Kind::Label],
            Kind::NotificationEndpointHttp => &[Kind::NotificationEndpointHttp],
            Kind::NotificationEndpointPagerDuty => &[Kind::NotificationEndpointPagerDuty],
            Kind::NotificationEndpointSlack => &[Kind::NotificationEndpointSlack],
            Kind::NotificationRule => &[Kind::NotificationRule],
            Kind::Task => &[Kind::Task],
            Kind::Telegraf => &[Kind::Telegraf],
            Kind::Variable => &[Kind::Variable],
        }
    }

    /// Whether a filter on `self` applies to `other`
    ///
    /// Group kinds match their concrete variants; everything else is
    /// exact-match.
    pub fn matches(&self, other: Kind) -> bool {
        *self == other || self.concrete_variants().contains(&other)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Case-insensitive, tolerant of snake/kebab separators
        let folded: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        let kind = match folded.as_str() {
            "bucket" | "buckets" => Kind::Bucket,
            "check" | "checks" => Kind::Check,
            "checkdeadman" => Kind::CheckDeadman,
            "checkthreshold" => Kind::CheckThreshold,
            "dashboard" | "dashboards" => Kind::Dashboard,
            "label" | "labels" => Kind::Label,
            "notificationendpoint" | "notificationendpoints" => Kind::NotificationEndpoint,
            "notificationendpointhttp" => Kind::NotificationEndpointHttp,
            "notificationendpointpagerduty" => Kind::NotificationEndpointPagerDuty,
            "notificationendpointslack" => Kind::NotificationEndpointSlack,
            "notificationrule" | "notificationrules" => Kind::NotificationRule,
            "task" | "tasks" => Kind::Task,
            "telegraf" | "telegrafs" | "telegrafconfig" => Kind::Telegraf,
            "variable" | "variables" => Kind::Variable,
            _ => return Err(format!("unknown resource kind: {}", s)),
        };
        Ok(kind)
    }
}

impl Serialize for Kind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tolerates_case_and_separators() {
        assert_eq!("bucket".parse::<Kind>().unwrap(), Kind::Bucket);
        assert_eq!("check_threshold".parse::<Kind>().unwrap(), Kind::CheckThreshold);
        assert_eq!("notification-endpoint-http".parse::<Kind>().unwrap(), Kind::NotificationEndpointHttp);
        assert_eq!("NotificationEndpointHTTP".parse::<Kind>().unwrap(), Kind::NotificationEndpointHttp);
        assert!("widget".parse::<Kind>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for kind in Kind::CONCRETE {
            assert_eq!(kind.as_str().parse::<Kind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_group_kind_matches_variants() {
        assert!(Kind::Check.matches(Kind::CheckDeadman));
        assert!(Kind::Check.matches(Kind::CheckThreshold));
        assert!(Kind::NotificationEndpoint.matches(Kind::NotificationEndpointSlack));
        assert!(!Kind::Check.matches(Kind::Bucket));
        assert!(Kind::Bucket.matches(Kind::Bucket));
        assert!(!Kind::CheckDeadman.matches(Kind::Check));
    }

    #[test]
    fn test_group_kinds_are_not_concrete() {
        for kind in Kind::CONCRETE {
            assert!(!kind.is_group());
        }
        assert!(Kind::Check.is_group());
        assert!(Kind::NotificationEndpoint.is_group());
    }
}
