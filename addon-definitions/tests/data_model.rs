//! Cross-module coverage of the pure data model: classifier -> metadata ->
//! version engine -> merge -> produced `Application`, with no reader or
//! cluster involved (spec.md §8's scenarios, exercised at the data-model
//! layer rather than through the full render pipeline).

use addon_definitions::application::Application;
use addon_definitions::classifier::{classify, Bucket, Format};
use addon_definitions::meta::Meta;
use addon_definitions::merge::merge_args;
use addon_definitions::secret::ParameterSecret;
use addon_definitions::source::Item;
use addon_definitions::version::{self, Range};
use serde_json::json;

#[test]
fn classifies_a_full_addon_tree_into_every_bucket() {
    let items = vec![
        Item::file("demo/metadata.yaml"),
        Item::file("demo/README.md"),
        Item::file("demo/parameter.cue"),
        Item::file("demo/template.cue"),
        Item::file("demo/definitions/trait.cue"),
        Item::file("demo/schemas/ui.yaml"),
        Item::file("demo/resources/deploy.yaml"),
        Item::file("demo/views/pods.cue"),
        Item::file("demo/LICENSE"),
        Item::dir("demo/resources"),
    ];
    let classified = classify("demo", &items);
    // The directory entry carries no bucket of its own.
    assert_eq!(classified.len(), 9);

    let bucket_of = |path: &str| classified.iter().find(|c| c.item.path == path).map(|c| c.bucket);
    assert_eq!(bucket_of("demo/metadata.yaml"), Some(Bucket::Metadata));
    assert_eq!(bucket_of("demo/README.md"), Some(Bucket::Detail));
    assert_eq!(bucket_of("demo/parameter.cue"), Some(Bucket::GlobalParameter));
    assert_eq!(bucket_of("demo/template.cue"), Some(Bucket::AppTemplate(Format::Cue)));
    assert_eq!(bucket_of("demo/definitions/trait.cue"), Some(Bucket::Definition(Format::Cue)));
    assert_eq!(bucket_of("demo/schemas/ui.yaml"), Some(Bucket::UISchema));
    assert_eq!(bucket_of("demo/resources/deploy.yaml"), Some(Bucket::Resource(Format::Yaml)));
    assert_eq!(bucket_of("demo/views/pods.cue"), Some(Bucket::View(Format::Cue)));
    assert_eq!(bucket_of("demo/LICENSE"), Some(Bucket::Ignored));
}

#[test]
fn metadata_without_system_requirements_parses_as_no_constraint() {
    let raw = "name: fluxcd\nversion: 2.1.0\ndependencies:\n  - name: cert-manager\n    version: \">=1.0.0, <2.0.0\"\n";
    let meta = Meta::parse(raw).unwrap();
    assert!(meta.systemRequirements.is_none());
    let dep = &meta.dependencies[0];
    let range = Range::parse(&dep.version).unwrap();
    let v = version::normalize("1.5.0").unwrap();
    assert!(range.satisfies(&v));
    let too_new = version::normalize("2.0.0").unwrap();
    assert!(!range.satisfies(&too_new));
}

#[test]
fn sort_descending_orders_pre_releases_below_their_release() {
    let versions = vec!["1.0.0", "1.0.0-rc.1", "1.2.0", "0.9.9"];
    let sorted = version::sort_descending(&versions);
    assert_eq!(sorted, vec!["1.2.0", "1.0.0", "1.0.0-rc.1", "0.9.9"]);
}

#[test]
fn merge_args_overlays_only_the_keys_present_in_the_overlay() {
    let base = json!({"replicas": 1, "image": {"tag": "v1", "repo": "acme/demo"}});
    let overlay = json!({"image": {"tag": "v2"}});
    let merged = merge_args(&base, &overlay);
    assert_eq!(merged["replicas"], 1);
    assert_eq!(merged["image"]["tag"], "v2");
    assert_eq!(merged["image"]["repo"], "acme/demo");
}

#[test]
fn produced_application_carries_definitions_and_fixed_labels() {
    let mut app = Application::default_skeleton("demo", "1.2.0");
    app.carry_definition("ComponentDefinition", "demo-webservice");
    app.carry_definition("TraitDefinition", "demo-ingress");
    app.carry_definition("TraitDefinition", "demo-ingress");
    app.labels.insert(addon_definitions::labels::LABEL_NAME.to_string(), "demo".to_string());
    app.labels.insert(addon_definitions::labels::LABEL_VERSION.to_string(), "1.2.0".to_string());

    assert_eq!(app.name, "addon-demo");
    assert_eq!(app.annotations[addon_definitions::labels::ANNOTATION_COMPONENT_DEFINITIONS], "demo-webservice");
    assert_eq!(app.annotations[addon_definitions::labels::ANNOTATION_TRAIT_DEFINITIONS], "demo-ingress");
    assert!(!app.has_topology_policy());

    let manifest = app.to_manifest();
    let round_tripped = Application::from_manifest(&manifest).unwrap();
    assert_eq!(round_tripped, app);
}

#[test]
fn parameter_secret_round_trips_through_json() {
    let secret = ParameterSecret::new("demo", json!({"replicas": 3}));
    let raw = secret.to_json_string().unwrap();
    let restored = ParameterSecret::from_json_str("demo", &raw).unwrap();
    assert_eq!(secret.secret_name(), restored.secret_name());
}
