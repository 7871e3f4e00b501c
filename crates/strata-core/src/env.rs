//! Environment references
//!
//! A template may leave string-valued fields open with an `envRef`
//! placeholder (`{"envRef": {"key": "...", "default": ...}}`). The caller
//! binds values at plan/apply time; unbound keys are surfaced on the
//! impact summary rather than failing a dry-run.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object key that marks an environment reference placeholder
const ENV_REF_KEY: &str = "envRef";

/// An unbound environment reference found in a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvRef {
    /// Caller-facing key to bind
    pub key: String,

    /// Value used when the caller does not bind the key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<EnvRefValue>,
}

/// A caller-supplied binding for an environment reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvRefValue {
    String(String),
    Bool(bool),
    Number(f64),
    /// Binds a secret-store key rather than an inline value
    SecretKey(SecretKeyBinding),
}

/// Wrapper distinguishing a secret-key binding from a plain string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyBinding {
    pub secret_key: String,
}

impl EnvRefValue {
    /// String form substituted into the template
    pub fn render(&self) -> String {
        match self {
            EnvRefValue::String(s) => s.clone(),
            EnvRefValue::Bool(b) => b.to_string(),
            EnvRefValue::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            EnvRefValue::SecretKey(binding) => binding.secret_key.clone(),
        }
    }
}

impl From<&str> for EnvRefValue {
    fn from(s: &str) -> Self {
        EnvRefValue::String(s.to_string())
    }
}

/// Collect every `envRef` key reachable in a spec value, in stable order
pub fn collect_env_refs(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(env_ref) = as_env_ref(map) {
                out.insert(env_ref.key);
                return;
            }
            for nested in map.values() {
                collect_env_refs(nested, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_env_refs(item, out);
            }
        }
        _ => {}
    }
}

/// Substitute bound references in place
///
/// Bound keys take the caller's value; unbound keys fall back to the
/// placeholder's default when present. Keys left with neither are replaced
/// with an empty string and reported back for the impact summary.
pub fn bind_env_refs(
    value: &mut Value,
    bindings: &HashMap<String, EnvRefValue>,
    missing: &mut BTreeSet<String>,
) {
    match value {
        Value::Object(map) => {
            if let Some(env_ref) = as_env_ref(map) {
                let rendered = match bindings.get(&env_ref.key) {
                    Some(bound) => bound.render(),
                    None => {
                        missing.insert(env_ref.key.clone());
                        env_ref.default.map(|d| d.render()).unwrap_or_default()
                    }
                };
                *value = Value::String(rendered);
                return;
            }
            for nested in map.values_mut() {
                bind_env_refs(nested, bindings, missing);
            }
        }
        Value::Array(items) => {
            for item in items {
                bind_env_refs(item, bindings, missing);
            }
        }
        _ => {}
    }
}

fn as_env_ref(map: &serde_json::Map<String, Value>) -> Option<EnvRef> {
    if map.len() != 1 {
        return None;
    }
    let inner = map.get(ENV_REF_KEY)?;
    serde_json::from_value(inner.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collect_nested_refs() {
        let spec = json!({
            "name": {"envRef": {"key": "bkt-name"}},
            "charts": [{"title": {"envRef": {"key": "chart-title", "default": "cpu"}}}],
            "description": "plain",
        });

        let mut found = BTreeSet::new();
        collect_env_refs(&spec, &mut found);
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["bkt-name".to_string(), "chart-title".to_string()]
        );
    }

    #[test]
    fn test_bind_replaces_bound_keys() {
        let mut spec = json!({"name": {"envRef": {"key": "bkt-name"}}});
        let bindings = HashMap::from([("bkt-name".to_string(), EnvRefValue::from("rucket-11"))]);

        let mut missing = BTreeSet::new();
        bind_env_refs(&mut spec, &bindings, &mut missing);

        assert_eq!(spec, json!({"name": "rucket-11"}));
        assert!(missing.is_empty());
    }

    #[test]
    fn test_unbound_key_uses_default_and_is_reported() {
        let mut spec = json!({
            "name": {"envRef": {"key": "bkt-name", "default": "fallback"}},
            "description": {"envRef": {"key": "bkt-desc"}},
        });

        let mut missing = BTreeSet::new();
        bind_env_refs(&mut spec, &HashMap::new(), &mut missing);

        assert_eq!(spec["name"], "fallback");
        assert_eq!(spec["description"], "");
        assert_eq!(
            missing.into_iter().collect::<Vec<_>>(),
            vec!["bkt-desc".to_string(), "bkt-name".to_string()]
        );
    }

    #[test]
    fn test_bool_and_number_bindings_render_as_strings() {
        assert_eq!(EnvRefValue::Bool(true).render(), "true");
        assert_eq!(EnvRefValue::Number(3.0).render(), "3");
        assert_eq!(EnvRefValue::Number(1.5).render(), "1.5");
    }

    #[test]
    fn test_secret_key_binding_renders_key() {
        let value = EnvRefValue::SecretKey(SecretKeyBinding {
            secret_key: "routing-key".to_string(),
        });
        assert_eq!(value.render(), "routing-key");
    }

    #[test]
    fn test_sibling_keys_are_not_a_ref() {
        // An object with envRef plus other keys is ordinary data
        let spec = json!({"envRef": {"key": "x"}, "other": 1});
        let mut found = BTreeSet::new();
        collect_env_refs(&spec, &mut found);
        assert!(found.is_empty());
    }
}
