//! The composite cluster object the installer applies (spec.md §3
//! `Application (produced)`, §6 "Produced Application shape").
//!
//! This is a small, renderer-facing model of the `core.oam.dev/v1beta1`
//! `Application` kind, not the full CRD schema -- addon-core's apply
//! boundary is responsible for turning this into whatever wire
//! representation the cluster client wants.

use std::collections::BTreeMap;
use serde_json::Value;

use crate::error::AddonError;
use crate::labels;
use crate::Result;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TraitSpec {
    pub trait_type: String,
    pub properties: Value,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Component {
    pub name: String,
    pub component_type: String,
    pub properties: Value,
    pub traits: Vec<TraitSpec>,
    /// Internal bookkeeping only (e.g. `addon.oam.dev/auxiliary-output-of`
    /// on component stubs synthesized from an app template's `outputs`
    /// map) -- not part of the `core.oam.dev/v1beta1` component wire
    /// shape, so `to_manifest` does not emit it.
    pub annotations: BTreeMap<String, String>,
}

impl Component {
    pub fn new(name: impl Into<String>, component_type: impl Into<String>, properties: Value) -> Component {
        Component {
            name: name.into(),
            component_type: component_type.into(),
            properties,
            traits: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Policy {
    pub name: String,
    pub policy_type: String,
    pub properties: Value,
}

impl Policy {
    pub fn new(name: impl Into<String>, policy_type: impl Into<String>, properties: Value) -> Policy {
        Policy { name: name.into(), policy_type: policy_type.into(), properties }
    }
}

/// The `topology` policy's properties shape (spec.md §4.7 "Policy
/// injection").
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopologyPolicySpec {
    pub clusters: Option<Vec<String>>,
    pub cluster_label_selector: Option<BTreeMap<String, String>>,
    pub namespace: Option<String>,
}

impl TopologyPolicySpec {
    pub fn to_properties(&self) -> Value {
        let mut map = serde_json::Map::new();
        if let Some(clusters) = &self.clusters {
            map.insert("clusters".into(), serde_json::json!(clusters));
        }
        if let Some(sel) = &self.cluster_label_selector {
            map.insert("clusterLabelSelector".into(), serde_json::json!(sel));
        }
        if let Some(ns) = &self.namespace {
            map.insert("namespace".into(), Value::String(ns.clone()));
        }
        Value::Object(map)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkflowStep {
    pub name: String,
    pub step_type: String,
    pub properties: Value,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workflow {
    pub steps: Vec<WorkflowStep>,
}

/// The composite cluster object the installer produces and applies.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Application {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub components: Vec<Component>,
    pub policies: Vec<Policy>,
    pub workflow: Option<Workflow>,
}

impl Application {
    /// The default skeleton used when an addon ships no app template at
    /// all (spec.md §4.7 "App template").
    pub fn default_skeleton(addon_name: &str, addon_version: &str) -> Application {
        let mut labels = BTreeMap::new();
        labels.insert(labels::LABEL_NAME.to_string(), addon_name.to_string());
        labels.insert(labels::LABEL_VERSION.to_string(), addon_version.to_string());
        Application {
            name: labels::application_name(addon_name),
            namespace: labels::APPLICATION_NAMESPACE.to_string(),
            labels,
            annotations: BTreeMap::new(),
            components: Vec::new(),
            policies: Vec::new(),
            workflow: None,
        }
    }

    /// Renders this `Application` to the `core.oam.dev/v1beta1` wire
    /// shape -- what gets applied to the cluster and what a YAML app
    /// template parses out of (spec.md §6 "Produced Application shape").
    pub fn to_manifest(&self) -> Value {
        let components: Vec<Value> = self
            .components
            .iter()
            .map(|c| {
                let mut obj = serde_json::json!({
                    "name": c.name,
                    "type": c.component_type,
                    "properties": c.properties,
                });
                if !c.traits.is_empty() {
                    obj["traits"] = serde_json::json!(c
                        .traits
                        .iter()
                        .map(|t| serde_json::json!({"type": t.trait_type, "properties": t.properties}))
                        .collect::<Vec<_>>());
                }
                obj
            })
            .collect();
        let policies: Vec<Value> = self
            .policies
            .iter()
            .map(|p| serde_json::json!({"name": p.name, "type": p.policy_type, "properties": p.properties}))
            .collect();
        let mut spec = serde_json::json!({ "components": components });
        if !policies.is_empty() {
            spec["policies"] = serde_json::json!(policies);
        }
        if let Some(wf) = &self.workflow {
            spec["workflow"] = serde_json::json!({
                "steps": wf.steps.iter().map(|s| serde_json::json!({
                    "name": s.name, "type": s.step_type, "properties": s.properties,
                })).collect::<Vec<_>>()
            });
        }
        serde_json::json!({
            "apiVersion": "core.oam.dev/v1beta1",
            "kind": "Application",
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
                "labels": self.labels,
                "annotations": self.annotations,
            },
            "spec": spec,
        })
    }

    /// Parses the same shape back into an `Application` (spec.md §4.7
    /// "App template" YAML path: a `template.yaml` app template MUST
    /// parse as an `Application` object).
    pub fn from_manifest(value: &Value) -> Result<Application> {
        let metadata = value.get("metadata").ok_or_else(|| {
            AddonError::invalid_package("app template: missing 'metadata'")
        })?;
        let name = metadata.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        let namespace = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or(labels::APPLICATION_NAMESPACE)
            .to_string();
        let labels = parse_string_map(metadata.get("labels"));
        let annotations = parse_string_map(metadata.get("annotations"));

        let spec = value.get("spec").ok_or_else(|| AddonError::invalid_package("app template: missing 'spec'"))?;
        let components = spec
            .get("components")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(parse_component)
            .collect::<Result<Vec<_>>>()?;
        let policies = spec
            .get("policies")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|p| {
                Ok(Policy {
                    name: p.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    policy_type: p.get("type").and_then(Value::as_str).unwrap_or_default().to_string(),
                    properties: p.get("properties").cloned().unwrap_or(Value::Null),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let workflow = spec.get("workflow").map(|w| {
            let steps = w
                .get("steps")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .iter()
                .map(|s| WorkflowStep {
                    name: s.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    step_type: s.get("type").and_then(Value::as_str).unwrap_or_default().to_string(),
                    properties: s.get("properties").cloned().unwrap_or(Value::Null),
                })
                .collect();
            Workflow { steps }
        });

        Ok(Application { name, namespace, labels, annotations, components, policies, workflow })
    }

    pub fn has_topology_policy(&self) -> bool {
        self.policies.iter().any(|p| p.policy_type == "topology")
    }

    /// Appends a name to the annotation for `kind`'s definitions, keeping
    /// the comma-separated value sorted and deduplicated (spec.md §4.7
    /// "Annotation of carried definitions", §3 invariants).
    pub fn carry_definition(&mut self, kind: &str, name: &str) {
        let key = match kind {
            "ComponentDefinition" => labels::ANNOTATION_COMPONENT_DEFINITIONS,
            "TraitDefinition" => labels::ANNOTATION_TRAIT_DEFINITIONS,
            "PolicyDefinition" => labels::ANNOTATION_POLICY_DEFINITIONS,
            "WorkflowStepDefinition" => labels::ANNOTATION_WORKFLOW_STEP_DEFINITIONS,
            _ => return,
        };
        let mut names: Vec<String> = self
            .annotations
            .get(key)
            .map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        names.sort();
        names.dedup();
        self.annotations.insert(key.to_string(), names.join(","));
    }
}

fn parse_string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_component(value: &Value) -> Result<Component> {
    let traits = value
        .get("traits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|t| TraitSpec {
            trait_type: t.get("type").and_then(Value::as_str).unwrap_or_default().to_string(),
            properties: t.get("properties").cloned().unwrap_or(Value::Null),
        })
        .collect();
    Ok(Component {
        name: value.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        component_type: value.get("type").and_then(Value::as_str).unwrap_or_default().to_string(),
        properties: value.get("properties").cloned().unwrap_or(Value::Null),
        traits,
        annotations: BTreeMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_definition_is_sorted_and_deduplicated() {
        let mut app = Application::default_skeleton("x", "1.0.0");
        app.carry_definition("TraitDefinition", "b-trait");
        app.carry_definition("TraitDefinition", "a-trait");
        app.carry_definition("TraitDefinition", "a-trait");
        assert_eq!(app.annotations[labels::ANNOTATION_TRAIT_DEFINITIONS], "a-trait,b-trait");
    }

    #[test]
    fn default_skeleton_has_deterministic_name_and_namespace() {
        let app = Application::default_skeleton("x", "1.0.0");
        assert_eq!(app.name, "addon-x");
        assert_eq!(app.namespace, "vela-system");
    }

    #[test]
    fn manifest_round_trips_components_and_policies() {
        let mut app = Application::default_skeleton("x", "1.0.0");
        let mut c = Component::new("web", "webservice", serde_json::json!({"image": "nginx"}));
        c.traits.push(TraitSpec { trait_type: "scaler".into(), properties: serde_json::json!({"replicas": 2}) });
        app.components.push(c);
        app.policies.push(Policy::new("topo", "topology", serde_json::json!({"clusters": ["a"]})));

        let manifest = app.to_manifest();
        let back = Application::from_manifest(&manifest).unwrap();
        assert_eq!(back.name, app.name);
        assert_eq!(back.components.len(), 1);
        assert_eq!(back.components[0].traits[0].trait_type, "scaler");
        assert_eq!(back.policies[0].policy_type, "topology");
    }
}
