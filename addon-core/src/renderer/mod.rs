//! CUE-template evaluation, resource inlining, and policy injection
//! (spec.md §4.7).

use std::collections::BTreeMap;

use addon_definitions::application::{Application, Component, Policy, TopologyPolicySpec};
use addon_definitions::error::AddonError;
use addon_definitions::labels;
use addon_definitions::package::{AppTemplate, ElementFile, InstallPackage};
use addon_definitions::{MultiError, Result};
use serde::Deserialize;
use serde_json::Value;

pub mod cue;

/// One parsed X-Definition, enough to route it to the right deploy
/// target and to annotate the `Application` that carries it.
#[derive(Clone, Debug)]
struct DefinitionDoc {
    kind: String,
    name: String,
    /// A `TraitDefinition` marked for the runtime cluster rather than the
    /// control plane (spec.md §4.7 "Definitions").
    runtime_only: bool,
    raw: Value,
}

const RUNTIME_ONLY_ANNOTATION: &str = "definition.oam.dev/runtime-only";

fn parse_definition_cue(file: &ElementFile) -> Result<DefinitionDoc> {
    let parsed = cue::parse_document(&file.data, &Value::Null)
        .map_err(|e| AddonError::parse(format!("definition '{}'", file.name), e))?;
    definition_from_value(file, parsed)
}

fn parse_definition_yaml(file: &ElementFile) -> Result<DefinitionDoc> {
    let parsed: Value = serde_yaml::from_str(&file.data)
        .map_err(|e| AddonError::parse(format!("definition '{}'", file.name), e))?;
    definition_from_value(file, parsed)
}

fn definition_from_value(file: &ElementFile, raw: Value) -> Result<DefinitionDoc> {
    let kind = raw
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| AddonError::invalid_package(format!("definition '{}' has no 'kind'", file.name)))?
        .to_string();
    let name = raw
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| AddonError::invalid_package(format!("definition '{}' has no 'metadata.name'", file.name)))?
        .to_string();
    let runtime_only = kind == "TraitDefinition"
        && raw
            .pointer(&format!("/metadata/annotations/{}", RUNTIME_ONLY_ANNOTATION.replace('/', "~1")))
            .and_then(Value::as_str)
            == Some("true");
    Ok(DefinitionDoc { kind, name, runtime_only, raw })
}

fn wrap_k8s_objects(objects: Vec<Value>) -> Value {
    serde_json::json!({ "objects": objects })
}

/// Result of one render pass: the composite `Application` plus any
/// auxiliary outputs emitted by the app template's `outputs` map,
/// kept alongside as raw text for traceability (spec.md §3 "Application
/// (produced)", §4.7 "App template").
pub struct RenderOutput {
    pub application: Application,
    pub auxiliary_outputs: Vec<ElementFile>,
}

/// Looks up the addon (if any) that already owns an existing cluster
/// definition of `(kind, name)`, excluding the addon currently being
/// rendered. Supplied by the installer, backed by the cluster client.
pub type ConflictCheck<'a> = dyn Fn(&str, &str) -> Option<String> + 'a;

/// Renders one `InstallPackage` against user-supplied `args` (spec.md
/// §4.7). `conflict_check` is consulted for every definition this addon
/// would carry; `None` means "render without cluster awareness" (used by
/// the dry-run/preview path and by tests).
pub fn render(pkg: &InstallPackage, args: &Value, conflict_check: Option<&ConflictCheck>) -> Result<RenderOutput> {
    let meta = pkg.meta();

    // 1. Parameter evaluation.
    let defaults = match &pkg.ui.parameters {
        Some(raw) => cue::parse_parameter_schema(raw)
            .map_err(|e| AddonError::invalid_package(format!("addon '{}' parameter.cue: {}", meta.name, e)))?,
        None => Value::Object(Default::default()),
    };
    reject_undeclared_fields(&defaults, args, &meta.name)?;
    let parameters = addon_definitions::merge::merge_args(&defaults, args);

    let mut addon_context: BTreeMap<String, Value> = BTreeMap::new();
    addon_context.insert("name".into(), Value::String(meta.name.clone()));
    addon_context.insert("version".into(), Value::String(meta.version.clone()));
    addon_context.insert("namespace".into(), Value::String(labels::APPLICATION_NAMESPACE.into()));
    let ctx = cue::render_context(parameters.clone(), addon_context);

    // 2. Resource components.
    let mut components = render_cue_resources(&pkg.cue_resources, meta, &ctx)?;
    components.extend(render_yaml_resources(&pkg.yaml_resources, meta)?);

    // 3. Definitions.
    let mut multi = MultiError::new(format!("rendering definitions for addon '{}'", meta.name));
    let mut definitions = Vec::new();
    for f in &pkg.cue_definitions {
        match parse_definition_cue(f) {
            Ok(d) => definitions.push(d),
            Err(e) => multi.push(e),
        }
    }
    for f in &pkg.yaml_definitions {
        match parse_definition_yaml(f) {
            Ok(d) => definitions.push(d),
            Err(e) => multi.push(e),
        }
    }
    multi.into_result().map_err(|m| -> addon_definitions::Error { m.into() })?;

    let mut conflicts = Vec::new();
    for d in &definitions {
        if let Some(check) = conflict_check {
            if let Some(owner) = check(&d.kind, &d.name) {
                if owner != meta.name {
                    conflicts.push((d.name.clone(), owner));
                }
            }
        }
    }
    if let Some((name, owner)) = conflicts.first() {
        return Err(AddonError::conflict(name, owner).into());
    }

    let control_plane_defs: Vec<&DefinitionDoc> = definitions.iter().filter(|d| !d.runtime_only).collect();
    let runtime_defs: Vec<&DefinitionDoc> = definitions.iter().filter(|d| d.runtime_only).collect();

    // 4. App template.
    let (mut app, auxiliary_outputs) = match &pkg.app_template {
        AppTemplate::Default => (Application::default_skeleton(&meta.name, &meta.version), Vec::new()),
        AppTemplate::Yaml(app) => (app.clone(), Vec::new()),
        AppTemplate::Cue(src) => {
            let doc = cue::parse_document(src, &ctx)
                .map_err(|e| AddonError::parse(format!("app template of addon '{}'", meta.name), e))?;
            let output = doc.get("output").cloned().unwrap_or_else(|| {
                Application::default_skeleton(&meta.name, &meta.version).to_manifest()
            });
            let app = Application::from_manifest(&output)
                .map_err(|e| AddonError::parse(format!("app template output of addon '{}'", meta.name), e))?;
            let outputs = doc
                .get("outputs")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let auxiliary = outputs
                .into_iter()
                .map(|(name, value)| ElementFile::new(name, serde_json::to_string_pretty(&value).unwrap_or_default()))
                .collect();
            (app, auxiliary)
        }
    };

    app.components.append(&mut components);

    for d in &control_plane_defs {
        app.components.push(Component::new(
            format!("{}-{}", meta.name, d.name),
            "k8s-objects",
            wrap_k8s_objects(vec![d.raw.clone()]),
        ));
        app.carry_definition(&d.kind, &d.name);
    }
    for d in &runtime_defs {
        app.components.push(Component::new(
            format!("{}-{}-runtime", meta.name, d.name),
            "k8s-objects",
            wrap_k8s_objects(vec![d.raw.clone()]),
        ));
        app.carry_definition(&d.kind, &d.name);
    }

    for (name, value) in &auxiliary_outputs_as_map(&auxiliary_outputs) {
        let mut c = Component::new(
            format!("{}-{}", meta.name, name),
            "k8s-objects",
            wrap_k8s_objects(vec![value.clone()]),
        );
        c.annotations.insert(labels::ANNOTATION_AUXILIARY_OUTPUT_OF.to_string(), meta.name.clone());
        app.components.push(c);
    }

    // 5. Needed namespaces.
    for ns in &meta.needNamespace {
        if ns == labels::APPLICATION_NAMESPACE {
            continue;
        }
        app.components.push(Component::new(
            format!("{}-ns-{}", meta.name, ns),
            "namespace",
            serde_json::json!({ "namespace": ns }),
        ));
    }

    // 6. Policy injection.
    if meta.deployTo.runtimeCluster && !app.has_topology_policy() {
        let clusters = args.get("clusters").and_then(Value::as_array).map(|a| {
            a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>()
        });
        let spec = match clusters {
            Some(c) if !c.is_empty() => TopologyPolicySpec {
                clusters: Some(c),
                cluster_label_selector: None,
                namespace: Some(labels::APPLICATION_NAMESPACE.to_string()),
            },
            _ => TopologyPolicySpec {
                clusters: None,
                cluster_label_selector: Some(BTreeMap::new()),
                namespace: Some(labels::APPLICATION_NAMESPACE.to_string()),
            },
        };
        app.policies.push(Policy::new("topology", "topology", spec.to_properties()));
    }

    // 7. Fixed labels (spec.md §3 invariants, §6).
    app.labels.insert(labels::LABEL_NAME.to_string(), meta.name.clone());
    app.labels.insert(labels::LABEL_VERSION.to_string(), meta.version.clone());
    if !pkg.ui.registry_name.is_empty() {
        app.labels.insert(labels::LABEL_REGISTRY.to_string(), pkg.ui.registry_name.clone());
    }

    Ok(RenderOutput { application: app, auxiliary_outputs })
}

fn auxiliary_outputs_as_map(files: &[ElementFile]) -> BTreeMap<String, Value> {
    files
        .iter()
        .filter_map(|f| serde_json::from_str::<Value>(&f.data).ok().map(|v| (f.name.clone(), v)))
        .collect()
}

fn reject_undeclared_fields(defaults: &Value, args: &Value, addon_name: &str) -> Result<()> {
    let (Some(defaults), Some(args)) = (defaults.as_object(), args.as_object()) else { return Ok(()) };
    for key in args.keys() {
        if !defaults.contains_key(key) {
            return Err(AddonError::parse(
                format!("parameters of addon '{}'", addon_name),
                format!("field '{}' is not declared in parameter.cue", key),
            )
            .into());
        }
    }
    Ok(())
}

fn has_package_header(src: &str) -> bool {
    for line in src.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        return line.starts_with("package ") || line == "package";
    }
    false
}

fn file_stem(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    base.rsplit_once('.').map(|(s, _)| s).unwrap_or(base)
}

fn render_cue_resources(files: &[ElementFile], meta: &addon_definitions::meta::Meta, ctx: &Value) -> Result<Vec<Component>> {
    let mut components = Vec::new();
    let (grouped, independent): (Vec<_>, Vec<_>) = files.iter().partition(|f| has_package_header(&f.data));

    if !grouped.is_empty() {
        let mut docs = Vec::new();
        for f in &grouped {
            let doc = cue::parse_document(&f.data, ctx)
                .map_err(|e| AddonError::parse(format!("resource '{}'", f.name), e))?;
            docs.push(doc);
        }
        let unified = cue::unify(&docs);
        let output = unified.get("output").cloned().unwrap_or(unified.clone());
        components.push(Component::new(
            format!("{}-resources", meta.name),
            "k8s-objects",
            wrap_k8s_objects(vec![output]),
        ));
    }

    for f in independent {
        let doc = cue::parse_document(&f.data, ctx)
            .map_err(|e| AddonError::parse(format!("resource '{}'", f.name), e))?;
        let Some(output) = doc.get("output").cloned() else { continue };
        components.push(Component::new(
            format!("{}-{}", meta.name, file_stem(&f.name)),
            "k8s-objects",
            wrap_k8s_objects(vec![output]),
        ));
    }
    Ok(components)
}

fn render_yaml_resources(files: &[ElementFile], meta: &addon_definitions::meta::Meta) -> Result<Vec<Component>> {
    let mut components = Vec::new();
    for f in files {
        let mut objects = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(&f.data) {
            let value = Value::deserialize(doc).map_err(|e| AddonError::parse(format!("resource '{}'", f.name), e))?;
            if !value.is_null() {
                objects.push(value);
            }
        }
        if objects.is_empty() {
            continue;
        }
        components.push(Component::new(
            format!("{}-{}", meta.name, file_stem(&f.name)),
            "k8s-objects",
            wrap_k8s_objects(objects),
        ));
    }
    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use addon_definitions::meta::{DeployTo, Meta};
    use addon_definitions::source::SourceMeta;
    use addon_definitions::uidata::UIData;

    fn pkg(meta: Meta, app_template: AppTemplate) -> InstallPackage {
        InstallPackage {
            ui: UIData {
                meta,
                api_schema: None,
                ui_schemas: Vec::new(),
                readme: None,
                definitions: Vec::new(),
                parameters: None,
                registry_name: String::new(),
                available_versions: Vec::new(),
            },
            source: SourceMeta::new("x"),
            cue_resources: Vec::new(),
            yaml_resources: Vec::new(),
            cue_views: Vec::new(),
            yaml_views: Vec::new(),
            cue_definitions: Vec::new(),
            yaml_definitions: Vec::new(),
            ui_schemas: Vec::new(),
            app_template,
        }
    }

    fn base_meta(name: &str) -> Meta {
        Meta { name: name.to_string(), version: "1.0.0".to_string(), ..Default::default() }
    }

    #[test]
    fn default_skeleton_gets_name_and_version_labels() {
        let p = pkg(base_meta("x"), AppTemplate::Default);
        let out = render(&p, &serde_json::json!({}), None).unwrap();
        assert_eq!(out.application.labels[labels::LABEL_NAME], "x");
        assert_eq!(out.application.labels[labels::LABEL_VERSION], "1.0.0");
    }

    #[test]
    fn runtime_cluster_deploy_injects_topology_policy() {
        let mut meta = base_meta("x");
        meta.deployTo = DeployTo { disableControlPlane: false, runtimeCluster: true };
        let mut p = pkg(meta, AppTemplate::Default);
        p.cue_definitions.push(ElementFile::new(
            "t.cue",
            r#"kind: "TraitDefinition", metadata: {name: "t"}"#,
        ));
        let out = render(&p, &serde_json::json!({}), None).unwrap();
        assert_eq!(out.application.policies.iter().filter(|pol| pol.policy_type == "topology").count(), 1);
        assert_eq!(out.application.annotations[labels::ANNOTATION_TRAIT_DEFINITIONS], "t");
        assert!(out.application.workflow.is_none());
    }

    #[test]
    fn multi_document_yaml_resource_becomes_one_k8s_objects_component() {
        let mut p = pkg(base_meta("x"), AppTemplate::Default);
        p.yaml_resources.push(ElementFile::new(
            "deploy.yaml",
            "kind: Deployment\nmetadata: {name: a}\n---\nkind: Deployment\nmetadata: {name: b}\n",
        ));
        let out = render(&p, &serde_json::json!({}), None).unwrap();
        let comp = out.application.components.iter().find(|c| c.component_type == "k8s-objects").unwrap();
        assert_eq!(comp.properties["objects"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn cue_resource_without_output_key_is_skipped() {
        let mut p = pkg(base_meta("x"), AppTemplate::Default);
        p.cue_resources.push(ElementFile::new("deploy.cue", r#"other: {a: 1}"#));
        let out = render(&p, &serde_json::json!({}), None).unwrap();
        assert!(out.application.components.is_empty());
    }

    #[test]
    fn undeclared_parameter_field_is_rejected() {
        let mut p = pkg(base_meta("x"), AppTemplate::Default);
        p.ui.parameters = Some("image: \"nginx\"".to_string());
        let err = render(&p, &serde_json::json!({"bogus": true}), None).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn needed_namespace_other_than_platform_emits_component() {
        let mut meta = base_meta("x");
        meta.needNamespace = vec!["vela-system".to_string(), "my-ns".to_string()];
        let p = pkg(meta, AppTemplate::Default);
        let out = render(&p, &serde_json::json!({}), None).unwrap();
        let names: Vec<&str> = out.application.components.iter().map(|c| c.name.as_str()).collect();
        assert!(names.iter().any(|n| n.contains("my-ns")));
        assert!(!names.iter().any(|n| n.contains("vela-system")));
    }

    #[test]
    fn conflict_check_blocks_definitions_owned_by_another_addon() {
        let mut p = pkg(base_meta("x"), AppTemplate::Default);
        p.cue_definitions.push(ElementFile::new("t.cue", r#"kind: "TraitDefinition", metadata: {name: "shared"}"#));
        let check = |_kind: &str, _name: &str| Some("other-addon".to_string());
        let err = render(&p, &serde_json::json!({}), Some(&check)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AddonError>().map(|e| e.kind().clone()),
            Some(addon_definitions::error::AddonErrorKind::Conflict { .. })
        ));
    }
}
