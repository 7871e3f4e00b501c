//! Dashboard declarations

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::WithMetaName;
use crate::error::ValidationDefect;
use crate::kind::Kind;

/// A declared dashboard
///
/// Dashboards are content-heavy and never matched against live state by
/// name; the planner treats them as new unless their ID is recorded in
/// the bound stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    #[serde(skip)]
    pub meta_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<Chart>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<String>,
}

/// A single chart cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub kind: ChartKind,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub x_pos: i32,

    #[serde(default)]
    pub y_pos: i32,

    pub width: i32,

    pub height: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,

    /// Free-form view payload (axes, colors, legends); carried opaquely
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
}

/// Supported chart cell kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChartKind {
    Band,
    Gauge,
    Heatmap,
    Histogram,
    Markdown,
    Mosaic,
    Scatter,
    SingleStat,
    Table,
    Xy,
}

impl Dashboard {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.meta_name)
    }

    pub fn validate(&self) -> Vec<ValidationDefect> {
        let mut defects = Vec::new();
        for (i, chart) in self.charts.iter().enumerate() {
            if chart.width <= 0 {
                defects.push(ValidationDefect::resource(
                    Kind::Dashboard,
                    &self.meta_name,
                    format!("charts[{}].width", i),
                    "width must be greater than zero",
                ));
            }
            if chart.height <= 0 {
                defects.push(ValidationDefect::resource(
                    Kind::Dashboard,
                    &self.meta_name,
                    format!("charts[{}].height", i),
                    "height must be greater than zero",
                ));
            }
            if !matches!(chart.kind, ChartKind::Markdown) && chart.queries.is_empty() {
                defects.push(ValidationDefect::resource(
                    Kind::Dashboard,
                    &self.meta_name,
                    format!("charts[{}].queries", i),
                    "at least one query is required",
                ));
            }
        }
        defects
    }
}

impl WithMetaName for Dashboard {
    fn set_meta_name(&mut self, meta_name: &str) {
        self.meta_name = meta_name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dashboard(charts: Value) -> Dashboard {
        let mut dash: Dashboard =
            serde_json::from_value(json!({"name": "dash-1", "charts": charts})).unwrap();
        dash.set_meta_name("dash-meta");
        dash
    }

    #[test]
    fn test_chart_kinds_decode_kebab_case() {
        let dash = dashboard(json!([
            {"kind": "single-stat", "width": 6, "height": 4, "queries": ["q"]},
            {"kind": "xy", "width": 6, "height": 4, "queries": ["q"]},
        ]));
        assert_eq!(dash.charts[0].kind, ChartKind::SingleStat);
        assert_eq!(dash.charts[1].kind, ChartKind::Xy);
        assert!(dash.validate().is_empty());
    }

    #[test]
    fn test_zero_geometry_is_a_defect() {
        let dash = dashboard(json!([
            {"kind": "gauge", "width": 0, "height": 4, "queries": ["q"]},
        ]));
        let defects = dash.validate();
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].field, "charts[0].width");
    }

    #[test]
    fn test_markdown_needs_no_query() {
        let dash = dashboard(json!([
            {"kind": "markdown", "width": 2, "height": 1},
        ]));
        assert!(dash.validate().is_empty());
    }

    #[test]
    fn test_non_markdown_requires_queries() {
        let dash = dashboard(json!([
            {"kind": "heatmap", "width": 2, "height": 1},
        ]));
        assert_eq!(dash.validate()[0].field, "charts[0].queries");
    }
}
