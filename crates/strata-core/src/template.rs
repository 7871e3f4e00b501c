//! Template bundles
//!
//! A template is an immutable bundle of resource declarations keyed by
//! `(Kind, MetaName)`. Declaration order is preserved: diffs and applies
//! walk resources in the order the operator wrote them.

use std::collections::{BTreeSet, HashMap};
use std::io::Read;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::env::{self, EnvRefValue};
use crate::error::{CoreError, Result, ValidationDefect};
use crate::kind::Kind;
use crate::resources::Resource;

/// API version stamped on template objects
pub const API_VERSION: &str = "strata/v1";

/// Interchange format of a template stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateFormat {
    Json,
    #[default]
    Yaml,
}

impl std::str::FromStr for TemplateFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(TemplateFormat::Json),
            "yaml" | "yml" => Ok(TemplateFormat::Yaml),
            _ => Err(format!("unknown template format: {}", s)),
        }
    }
}

/// One declaration inside a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateObject {
    pub api_version: String,

    pub kind: Kind,

    /// Template-local identity, stable across applies
    pub meta_name: String,

    /// Kind-specific payload; env refs are bound in place here
    pub spec: Value,
}

impl TemplateObject {
    /// Decode the spec into its typed resource
    pub fn resource(&self) -> std::result::Result<Resource, ValidationDefect> {
        Resource::from_spec(self.kind, &self.meta_name, self.spec.clone())
    }
}

/// Raw interchange form of a template object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawObject {
    #[serde(default = "default_api_version")]
    api_version: String,

    kind: String,

    metadata: RawMetadata,

    #[serde(default)]
    spec: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMetadata {
    name: String,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

/// An immutable bundle of resource declarations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    objects: IndexMap<(Kind, String), TemplateObject>,

    /// Defects found while assembling the bundle (unknown kinds,
    /// duplicate identities); surfaced by [`Template::compile`]
    defects: Vec<ValidationDefect>,

    /// Env-ref keys left unbound by the last [`Template::bind_env_refs`]
    missing_env: Vec<String>,
}

impl Template {
    /// Parse a template stream in the given format
    pub fn from_reader(mut reader: impl Read, format: TemplateFormat) -> Result<Template> {
        let mut source = String::new();
        reader.read_to_string(&mut source)?;
        match format {
            TemplateFormat::Yaml => Template::from_yaml(&source),
            TemplateFormat::Json => Template::from_json(&source),
        }
    }

    /// Parse a multi-document YAML stream
    pub fn from_yaml(source: &str) -> Result<Template> {
        let mut template = Template::default();
        for document in serde_yaml::Deserializer::from_str(source) {
            let value = Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }
            let raw: RawObject = serde_json::from_value(value)?;
            template.push_raw(raw);
        }
        Ok(template)
    }

    /// Parse a JSON source: either one object or an array of objects
    pub fn from_json(source: &str) -> Result<Template> {
        let value: Value = serde_json::from_str(source)?;
        let docs = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        let mut template = Template::default();
        for doc in docs {
            let raw: RawObject = serde_json::from_value(doc)?;
            template.push_raw(raw);
        }
        Ok(template)
    }

    /// Build a template from already-typed resources (the export path)
    pub fn from_resources(resources: impl IntoIterator<Item = Resource>) -> Template {
        let mut template = Template::default();
        for resource in resources {
            let object = TemplateObject {
                api_version: API_VERSION.to_string(),
                kind: resource.kind(),
                meta_name: resource.meta_name().to_string(),
                spec: resource.to_spec_value(),
            };
            template.push_object(object);
        }
        template
    }

    fn push_raw(&mut self, raw: RawObject) {
        let kind = match raw.kind.parse::<Kind>() {
            Ok(kind) if !kind.is_group() => kind,
            Ok(kind) => {
                self.defects.push(ValidationDefect::template(
                    "kind",
                    format!("group kind '{}' cannot be declared directly", kind),
                ));
                return;
            }
            Err(reason) => {
                self.defects.push(ValidationDefect::template("kind", reason));
                return;
            }
        };
        if raw.metadata.name.is_empty() {
            self.defects.push(ValidationDefect::template(
                "metadata.name",
                format!("{} declaration is missing a metadata.name", kind),
            ));
            return;
        }
        self.push_object(TemplateObject {
            api_version: raw.api_version,
            kind,
            meta_name: raw.metadata.name,
            spec: raw.spec,
        });
    }

    fn push_object(&mut self, object: TemplateObject) {
        let key = (object.kind, object.meta_name.clone());
        if self.objects.contains_key(&key) {
            self.defects.push(ValidationDefect::resource(
                object.kind,
                &object.meta_name,
                "metadata.name",
                "duplicate declaration for this kind and meta-name",
            ));
            return;
        }
        self.objects.insert(key, object);
    }

    /// Merge `later` over this template; later declarations win per
    /// `(Kind, MetaName)`
    pub fn merge(mut self, later: Template) -> Template {
        for (key, object) in later.objects {
            self.objects.insert(key, object);
        }
        self.defects.extend(later.defects);
        let mut missing: BTreeSet<String> = self.missing_env.drain(..).collect();
        missing.extend(later.missing_env);
        self.missing_env = missing.into_iter().collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Declarations in declaration order
    pub fn objects(&self) -> impl Iterator<Item = &TemplateObject> {
        self.objects.values()
    }

    pub fn get(&self, kind: Kind, meta_name: &str) -> Option<&TemplateObject> {
        self.objects.get(&(kind, meta_name.to_string()))
    }

    pub fn contains(&self, kind: Kind, meta_name: &str) -> bool {
        self.get(kind, meta_name).is_some()
    }

    /// Every env-ref key still present in the bundle
    pub fn env_ref_keys(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        for object in self.objects.values() {
            env::collect_env_refs(&object.spec, &mut keys);
        }
        keys
    }

    /// Bind environment references from caller-supplied values
    ///
    /// Unbound keys fall back to their declared default (or empty) and
    /// are recorded on [`Template::missing_env_refs`]. Binding does not
    /// fail a dry-run; the planner decides whether missing refs are
    /// fatal.
    pub fn bind_env_refs(mut self, bindings: &HashMap<String, EnvRefValue>) -> Template {
        let mut missing = BTreeSet::new();
        for object in self.objects.values_mut() {
            env::bind_env_refs(&mut object.spec, bindings, &mut missing);
        }
        self.missing_env = missing.into_iter().collect();
        self
    }

    /// Env-ref keys left unbound by the last bind pass
    pub fn missing_env_refs(&self) -> &[String] {
        &self.missing_env
    }

    /// Secret-store keys referenced anywhere in the bundle
    pub fn secret_keys(&self) -> BTreeSet<String> {
        self.objects
            .values()
            .filter_map(|object| object.resource().ok())
            .flat_map(|resource| resource.secret_keys())
            .collect()
    }

    /// Decode and validate every declaration
    ///
    /// Returns resources in declaration order, or the aggregate of every
    /// defect found: assembly defects, decode failures, field-level
    /// validation, and structural label rules. Reference resolution
    /// against a bound stack happens upstream.
    pub fn compile(&self) -> Result<Vec<Resource>> {
        let mut defects = self.defects.clone();
        let mut resources = Vec::with_capacity(self.objects.len());

        for object in self.objects.values() {
            // Labels are association targets, never association holders
            if object.kind == Kind::Label {
                if let Some(assocs) = object.spec.get("associations") {
                    if assocs.as_array().is_some_and(|a| !a.is_empty()) {
                        defects.push(ValidationDefect::resource(
                            Kind::Label,
                            &object.meta_name,
                            "associations",
                            "labels cannot carry label associations",
                        ));
                    }
                }
            }
            match object.resource() {
                Ok(resource) => {
                    defects.extend(resource.validate());
                    resources.push(resource);
                }
                Err(defect) => defects.push(defect),
            }
        }

        if defects.is_empty() {
            Ok(resources)
        } else {
            Err(CoreError::Validation { defects })
        }
    }

    /// Encode as a multi-document YAML stream
    pub fn to_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for object in self.objects.values() {
            let raw = RawObject {
                api_version: object.api_version.clone(),
                kind: object.kind.to_string(),
                metadata: RawMetadata {
                    name: object.meta_name.clone(),
                },
                spec: object.spec.clone(),
            };
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(&raw)?);
        }
        Ok(out)
    }

    /// Encode as a JSON array
    pub fn to_json(&self) -> Result<String> {
        let raws: Vec<RawObject> = self
            .objects
            .values()
            .map(|object| RawObject {
                api_version: object.api_version.clone(),
                kind: object.kind.to_string(),
                metadata: RawMetadata {
                    name: object.meta_name.clone(),
                },
                spec: object.spec.clone(),
            })
            .collect();
        Ok(serde_json::to_string_pretty(&raws)?)
    }
}
