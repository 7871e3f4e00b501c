//! Variable declarations

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::WithMetaName;
use crate::error::ValidationDefect;
use crate::kind::Kind;

/// A declared dashboard variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    #[serde(skip)]
    pub meta_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub args: VariableArgs,

    /// Values pre-selected in the UI
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<String>,
}

/// Variable argument payload: one of the known sum-type variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VariableArgs {
    Constant {
        values: Vec<String>,
    },
    Map {
        values: IndexMap<String, String>,
    },
    Query {
        query: String,
        language: String,
    },
}

impl Variable {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.meta_name)
    }

    pub fn validate(&self) -> Vec<ValidationDefect> {
        let mut defects = Vec::new();
        let defect = |field: &str, reason: &str| {
            ValidationDefect::resource(Kind::Variable, &self.meta_name, field, reason)
        };

        match &self.args {
            VariableArgs::Constant { values } => {
                if values.is_empty() {
                    defects.push(defect("args.values", "constant variables require at least one value"));
                }
            }
            VariableArgs::Map { values } => {
                if values.is_empty() {
                    defects.push(defect("args.values", "map variables require at least one entry"));
                }
            }
            VariableArgs::Query { query, language } => {
                if query.trim().is_empty() {
                    defects.push(defect("args.query", "query variables require a query body"));
                }
                if !matches!(language.as_str(), "flux" | "influxql") {
                    defects.push(defect("args.language", "language must be flux or influxql"));
                }
            }
        }
        defects
    }
}

impl WithMetaName for Variable {
    fn set_meta_name(&mut self, meta_name: &str) {
        self.meta_name = meta_name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(spec: serde_json::Value) -> Variable {
        let mut variable: Variable = serde_json::from_value(spec).unwrap();
        variable.set_meta_name("var-1");
        variable
    }

    #[test]
    fn test_constant_variable() {
        let variable = decode(json!({"args": {"type": "constant", "values": ["a", "b"]}}));
        assert!(variable.validate().is_empty());
    }

    #[test]
    fn test_map_variable() {
        let variable = decode(json!({"args": {"type": "map", "values": {"k": "v"}}}));
        assert!(variable.validate().is_empty());
    }

    #[test]
    fn test_query_variable_language_is_checked() {
        let variable = decode(json!({
            "args": {"type": "query", "query": "buckets()", "language": "sql"},
        }));
        assert_eq!(variable.validate()[0].field, "args.language");
    }

    #[test]
    fn test_empty_constant_values_is_a_defect() {
        let variable = decode(json!({"args": {"type": "constant", "values": []}}));
        assert_eq!(variable.validate()[0].field, "args.values");
    }

    #[test]
    fn test_unknown_args_type_fails_decode() {
        let result: Result<Variable, _> =
            serde_json::from_value(json!({"args": {"type": "mystery"}}));
        assert!(result.is_err());
    }
}
