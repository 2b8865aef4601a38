//! End-to-end coverage across the reader -> cache -> loader -> renderer ->
//! resolver boundary, using the local-directory backend so the test needs
//! neither a filesystem mock nor a live cluster.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use addon_core::cache::{Cache, RegistryDirectory};
use addon_core::registry::{LocalSpec, Registry};
use addon_core::renderer;
use addon_core::resolver::{self, AddonVersions, ItemMap};
use addon_core::Result;
use serde_json::json;
use tokio_util::sync::CancellationToken;

struct FixedDirectory(BTreeMap<String, Registry>);

impl RegistryDirectory for FixedDirectory {
    fn load_registries(&self) -> Result<BTreeMap<String, Registry>> {
        Ok(self.0.clone())
    }
}

fn tempdir(tag: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("addon-core-e2e-{}-{}", tag, std::process::id()));
    p
}

fn local_registry(name: &str, path: &PathBuf) -> Registry {
    Registry { name: name.to_string(), oss: None, git: None, helm: None, local: Some(LocalSpec { path: path.to_string_lossy().to_string() }) }
}

/// Builds a one-addon fixture tree with a parameter schema, a YAML
/// resource, and a control-plane trait definition -- enough for the
/// renderer to produce a non-trivial `Application`.
fn write_fixture_addon(root: &PathBuf) {
    fs::create_dir_all(root.join("demo/resources")).unwrap();
    fs::create_dir_all(root.join("demo/definitions")).unwrap();
    fs::write(
        root.join("demo/metadata.yaml"),
        "name: demo\nversion: 1.2.0\ndescription: a demo addon\nneedNamespace:\n  - demo-system\n",
    )
    .unwrap();
    fs::write(root.join("demo/parameter.cue"), "replicas: *1 | int\n").unwrap();
    fs::write(
        root.join("demo/resources/deploy.yaml"),
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: demo\nspec:\n  replicas: 1\n",
    )
    .unwrap();
    fs::write(
        root.join("demo/definitions/webservice.yaml"),
        "apiVersion: core.oam.dev/v1beta1\nkind: ComponentDefinition\nmetadata:\n  name: demo-webservice\nspec: {}\n",
    )
    .unwrap();
}

#[test]
fn refreshes_loads_and_renders_a_local_addon() {
    let dir = tempdir("render");
    write_fixture_addon(&dir);

    let mut registries = BTreeMap::new();
    registries.insert("official".to_string(), local_registry("official", &dir));

    let cache = Cache::new();
    let errors = cache.refresh(&FixedDirectory(registries), &CancellationToken::new());
    assert!(errors.is_empty(), "unexpected refresh errors: {}", errors);

    let listed = cache.list_ui_data("official").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].meta.name, "demo");
    assert_eq!(listed[0].meta.version, "1.2.0");

    let (found_registry, ui) = cache.find_addon(None, "demo", None).unwrap();
    assert_eq!(found_registry, "official");
    assert_eq!(ui.meta.version, "1.2.0");

    let pkg = cache.load_install_package("official", "demo", "1.2.0").unwrap();
    assert_eq!(pkg.yaml_resources.len(), 1);
    assert_eq!(pkg.yaml_definitions.len(), 1);

    let rendered = renderer::render(&pkg, &json!({"replicas": 3}), None).unwrap();
    assert_eq!(rendered.application.name, "addon-demo");
    assert!(rendered.application.components.iter().any(|c| c.name == "demo-deploy"));
    assert!(rendered.application.components.iter().any(|c| c.name == "demo-ns-demo-system"));
    assert!(!rendered.application.has_topology_policy());
    assert!(rendered.application.annotations.contains_key(addon_core::labels::ANNOTATION_COMPONENT_DEFINITIONS));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn unknown_registry_is_reported_as_registry_not_exist() {
    let cache = Cache::new();
    let err = cache.list_ui_data("does-not-exist").unwrap_err();
    assert!(format!("{}", err).contains("does-not-exist"));
}

#[test]
fn resolver_prefers_the_installed_version_when_the_range_still_matches() {
    let dir = tempdir("resolver");
    write_fixture_addon(&dir);
    fs::create_dir_all(dir.join("fluxcd")).unwrap();
    fs::write(dir.join("fluxcd/metadata.yaml"), "name: fluxcd\nversion: 1.0.0\n").unwrap();

    let mut registries = BTreeMap::new();
    registries.insert("official".to_string(), local_registry("official", &dir));
    let cache = Cache::new();
    cache.refresh(&FixedDirectory(registries), &CancellationToken::new());

    let mut installed: ItemMap = ItemMap::new();
    installed.insert("fluxcd".to_string(), AddonVersions::single("fluxcd", "1.0.0"));
    let available = resolver::merge_available(
        cache
            .all_ui_data("official")
            .into_iter()
            .map(|ui| (ui.meta.name, vec![ui.meta.version])),
    );

    let dep = addon_definitions::meta::Dependency { name: "fluxcd".to_string(), version: ">=1.0.0".to_string() };
    let resolved = resolver::resolve_one("demo", &dep, &installed, &available).unwrap();
    assert_eq!(resolved, "1.0.0");

    fs::remove_dir_all(&dir).ok();
}
