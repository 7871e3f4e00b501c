//! Notification endpoint declarations
//!
//! HTTP, Slack, and PagerDuty endpoints share status and description
//! fields; the variant payload is selected by the template object's
//! concrete kind. Sensitive fields are [`SecretField`]s so templates can
//! reference the platform secret store instead of inlining credentials.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{SecretField, Status, WithMetaName};
use crate::error::ValidationDefect;
use crate::kind::Kind;

/// Tag key injected into the spec payload to steer variant decoding
const ENDPOINT_TYPE_TAG: &str = "endpointType";

/// A declared notification endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEndpoint {
    #[serde(skip)]
    pub meta_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: Status,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<String>,

    #[serde(flatten)]
    pub spec: EndpointSpec,
}

/// Kind-specific endpoint payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpointType", rename_all = "camelCase")]
pub enum EndpointSpec {
    Http(HttpEndpointSpec),
    PagerDuty(PagerDutyEndpointSpec),
    Slack(SlackEndpointSpec),
}

/// HTTP endpoint payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpEndpointSpec {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default)]
    pub auth_method: HttpAuthMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<SecretField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_template: Option<String>,
}

/// PagerDuty endpoint payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagerDutyEndpointSpec {
    #[serde(default)]
    pub routing_key: SecretField,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_url: Option<String>,
}

/// Slack endpoint payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackEndpointSpec {
    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretField>,
}

/// HTTP verb used for webhook delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
}

/// Authentication scheme for HTTP endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpAuthMethod {
    #[default]
    None,
    Basic,
    Bearer,
}

impl NotificationEndpoint {
    /// Decode an endpoint spec for the given concrete kind
    pub fn from_spec(
        kind: Kind,
        meta_name: &str,
        mut spec: Value,
    ) -> Result<NotificationEndpoint, serde_json::Error> {
        let tag = match kind {
            Kind::NotificationEndpointPagerDuty => "pagerDuty",
            Kind::NotificationEndpointSlack => "slack",
            _ => "http",
        };
        if let Value::Object(map) = &mut spec {
            map.insert(ENDPOINT_TYPE_TAG.to_string(), Value::String(tag.to_string()));
        }
        let mut endpoint: NotificationEndpoint = serde_json::from_value(spec)?;
        endpoint.set_meta_name(meta_name);
        Ok(endpoint)
    }

    /// Concrete kind determined by the payload variant
    pub fn kind(&self) -> Kind {
        match self.spec {
            EndpointSpec::Http(_) => Kind::NotificationEndpointHttp,
            EndpointSpec::PagerDuty(_) => Kind::NotificationEndpointPagerDuty,
            EndpointSpec::Slack(_) => Kind::NotificationEndpointSlack,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.meta_name)
    }

    /// Secret-store keys referenced by any sensitive field
    pub fn secret_keys(&self) -> Vec<String> {
        let fields: Vec<&SecretField> = match &self.spec {
            EndpointSpec::Http(spec) => {
                [spec.username.as_ref(), spec.password.as_ref(), spec.token.as_ref()]
                    .into_iter()
                    .flatten()
                    .collect()
            }
            EndpointSpec::PagerDuty(spec) => vec![&spec.routing_key],
            EndpointSpec::Slack(spec) => spec.token.as_ref().into_iter().collect(),
        };
        fields
            .into_iter()
            .filter_map(|field| field.secret_key().map(str::to_string))
            .collect()
    }

    pub fn validate(&self) -> Vec<ValidationDefect> {
        let mut defects = Vec::new();
        let defect = |field: &str, reason: String| {
            ValidationDefect::resource(self.kind(), &self.meta_name, field, reason)
        };

        match &self.spec {
            EndpointSpec::Http(spec) => {
                if Url::parse(&spec.url).is_err() {
                    defects.push(defect("url", format!("'{}' is not a valid url", spec.url)));
                }
                match spec.auth_method {
                    HttpAuthMethod::None => {}
                    HttpAuthMethod::Basic => {
                        if spec.username.as_ref().map_or(true, SecretField::is_empty) {
                            defects.push(defect("username", "basic auth requires a username".to_string()));
                        }
                        if spec.password.as_ref().map_or(true, SecretField::is_empty) {
                            defects.push(defect("password", "basic auth requires a password".to_string()));
                        }
                    }
                    HttpAuthMethod::Bearer => {
                        if spec.token.as_ref().map_or(true, SecretField::is_empty) {
                            defects.push(defect("token", "bearer auth requires a token".to_string()));
                        }
                    }
                }
            }
            EndpointSpec::PagerDuty(spec) => {
                if spec.routing_key.is_empty() {
                    defects.push(defect("routingKey", "a routing key is required".to_string()));
                }
            }
            EndpointSpec::Slack(spec) => {
                if Url::parse(&spec.url).is_err() {
                    defects.push(defect("url", format!("'{}' is not a valid url", spec.url)));
                }
            }
        }
        defects
    }
}

impl WithMetaName for NotificationEndpoint {
    fn set_meta_name(&mut self, meta_name: &str) {
        self.meta_name = meta_name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_endpoint_decodes() {
        let endpoint = NotificationEndpoint::from_spec(
            Kind::NotificationEndpointHttp,
            "endpoint-0",
            json!({
                "name": "endpoint-0",
                "url": "https://hooks.example.com/alerts",
                "method": "POST",
                "authMethod": "bearer",
                "token": {"secretRef": {"key": "webhook-token"}},
            }),
        )
        .unwrap();

        assert_eq!(endpoint.kind(), Kind::NotificationEndpointHttp);
        assert!(endpoint.validate().is_empty());
        assert_eq!(endpoint.secret_keys(), vec!["webhook-token".to_string()]);
    }

    #[test]
    fn test_pagerduty_routing_key_secret_is_surfaced() {
        let endpoint = NotificationEndpoint::from_spec(
            Kind::NotificationEndpointPagerDuty,
            "pd-1",
            json!({"routingKey": {"secretRef": {"key": "routing-key"}}}),
        )
        .unwrap();

        assert_eq!(endpoint.kind(), Kind::NotificationEndpointPagerDuty);
        assert_eq!(endpoint.secret_keys(), vec!["routing-key".to_string()]);
        assert!(endpoint.validate().is_empty());
    }

    #[test]
    fn test_invalid_url_is_a_defect() {
        let endpoint = NotificationEndpoint::from_spec(
            Kind::NotificationEndpointSlack,
            "slack-1",
            json!({"url": "not a url"}),
        )
        .unwrap();
        assert_eq!(endpoint.validate()[0].field, "url");
    }

    #[test]
    fn test_basic_auth_requires_credentials() {
        let endpoint = NotificationEndpoint::from_spec(
            Kind::NotificationEndpointHttp,
            "http-1",
            json!({"url": "https://example.com", "authMethod": "basic"}),
        )
        .unwrap();
        let defects = endpoint.validate();
        let fields: Vec<&str> = defects.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["username", "password"]);
    }

    #[test]
    fn test_missing_routing_key_is_a_defect() {
        let endpoint = NotificationEndpoint::from_spec(
            Kind::NotificationEndpointPagerDuty,
            "pd-2",
            json!({}),
        )
        .unwrap();
        assert_eq!(endpoint.validate()[0].field, "routingKey");
    }

    #[test]
    fn test_inline_literal_secret_has_no_store_key() {
        let endpoint = NotificationEndpoint::from_spec(
            Kind::NotificationEndpointPagerDuty,
            "pd-3",
            json!({"routingKey": "inline-key"}),
        )
        .unwrap();
        assert!(endpoint.secret_keys().is_empty());
    }
}
