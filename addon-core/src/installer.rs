//! `enable`/`disable` state machine (spec.md §4.8).

use std::collections::HashSet;

use addon_definitions::application::Application;
use addon_definitions::error::AddonError;
use addon_definitions::labels;
use addon_definitions::merge;
use addon_definitions::secret::ParameterSecret;
use addon_definitions::status::Status;
use addon_definitions::Result;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::cache::Cache;
use crate::kube_client::KubeClient;
use crate::platform;
use crate::reader::check_cancelled;
use crate::renderer::{self, ConflictCheck};
use crate::resolver::{self, reverse_deps, AddonVersions, ItemMap};
use crate::status_reader;

/// Orchestrates load -> validate -> resolve deps -> render -> apply ->
/// persist for one addon, and the reverse-dependency-gated disable.
/// Borrows the cache and cluster client rather than owning them (spec.md
/// §9 "inject as a parameter").
pub struct Installer<'a> {
    cache: &'a Cache,
    kube: &'a KubeClient,
}

impl<'a> Installer<'a> {
    pub fn new(cache: &'a Cache, kube: &'a KubeClient) -> Installer<'a> {
        Installer { cache, kube }
    }

    /// `enable(name, version?, args)` (spec.md §4.8). `registry` pins the
    /// search to one registry; `None` searches every registry the cache
    /// knows about and picks the first one carrying a satisfying version.
    pub fn enable(&self, registry: Option<&str>, name: &str, version: Option<&str>, args: Value, token: &CancellationToken) -> Result<Status> {
        let mut visited = HashSet::new();
        self.enable_inner(registry, name, version, args, &mut visited, token)
    }

    fn enable_inner(
        &self,
        registry: Option<&str>,
        name: &str,
        version: Option<&str>,
        args: Value,
        visited: &mut HashSet<String>,
        token: &CancellationToken,
    ) -> Result<Status> {
        check_cancelled(token)?;
        // Cyclic dependency detection (spec.md §9).
        if !visited.insert(name.to_string()) {
            return Err(AddonError::dependency_unresolvable(name, name, "cycle").into());
        }

        // 1. Load: resolve version across registries, fetch the package.
        let (registry_name, ui) = self.cache.find_addon(registry, name, version)?;
        let pkg = self.cache.load_install_package(&registry_name, name, &ui.meta.version)?;

        // 2. Validate package: non-empty name/version (metadata presence
        // is already guaranteed -- `load_install_package` fails without
        // it).
        if pkg.meta().name.is_empty() || pkg.meta().version.is_empty() {
            return Err(AddonError::invalid_package(format!("addon '{}' is missing name or version", name)).into());
        }

        // 3. Platform check.
        platform::check(pkg.meta(), self.kube)?;

        // 4. Dependency resolve + recursive enable. Cycles surface as a
        // `DependencyUnresolvable` from the recursive `enable_inner` call.
        let installed = self.installed_item_map(token)?;
        let available = self.available_item_map();
        let resolved = resolver::resolve_all(name, &pkg.meta().dependencies, &installed, &available)
            .map_err(|e| -> addon_definitions::Error { e.into() })?;
        for (dep_name, dep_version) in &resolved {
            if installed.contains_key(dep_name) {
                continue;
            }
            self.enable_inner(None, dep_name, Some(dep_version.as_str()), Value::Object(Default::default()), visited, token)?;
        }

        // 5. Merge args: deep-merge over the existing parameter secret, if
        // this is a re-enable.
        let secret_name = labels::parameter_secret_name(name);
        let existing = self.kube.get_secret_value(&secret_name, labels::APPLICATION_NAMESPACE, labels::PARAMETER_SECRET_KEY)?;
        let base = match existing {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|_| Value::Object(Default::default())),
            None => Value::Object(Default::default()),
        };
        let merged = merge::merge_args(&base, &args);

        // 6. Render.
        let conflict_check = |kind: &str, def_name: &str| self.find_definition_owner(kind, def_name, name, token);
        let checker: &ConflictCheck = &conflict_check;
        let rendered = renderer::render(&pkg, &merged, Some(checker))?;

        // 7. Apply Application (server-side idempotent apply).
        self.kube.apply_application(&rendered.application, token)?;

        // 8. Persist parameter secret keyed by addon name.
        let secret = ParameterSecret::new(name, merged);
        self.kube.apply_secret(&secret.secret_name(), labels::APPLICATION_NAMESPACE, labels::PARAMETER_SECRET_KEY, &secret.to_json_string()?)?;

        status_reader::status(self.kube, name)
    }

    /// `disable(name)`: blocked by reverse dependencies, otherwise
    /// idempotent deletion of the Application and its parameter secret
    /// (spec.md §4.6 "Reverse-dependency check at disable", §4.8
    /// "Rollback policy").
    pub fn disable(&self, name: &str, token: &CancellationToken) -> Result<()> {
        check_cancelled(token)?;
        let app_name = labels::application_name(name);
        let Some(app_value) = self.kube.get_application(&app_name, labels::APPLICATION_NAMESPACE)? else {
            return Ok(());
        };
        let app = Application::from_manifest(&app_value)?;

        let carried_names = carried_definition_names(&app);
        if !carried_names.is_empty() {
            let raw_apps = self.kube.list_applications(labels::APPLICATION_NAMESPACE, token)?;
            let parsed: Vec<Application> = raw_apps.iter().filter_map(|v| Application::from_manifest(v).ok()).collect();
            let refs: Vec<reverse_deps::ApplicationRefs> = parsed.iter().map(reverse_deps::ApplicationRefs::from_application).collect();
            let offenders = reverse_deps::offending_applications(&app.name, &carried_names, &refs);
            if !offenders.is_empty() {
                return Err(AddonError::in_use(offenders).into());
            }
        }

        self.kube.delete_application(&app_name, labels::APPLICATION_NAMESPACE)?;
        self.kube.delete_secret(&labels::parameter_secret_name(name), labels::APPLICATION_NAMESPACE)?;
        Ok(())
    }

    /// The `installed` side of the resolver's input (spec.md §4.6): every
    /// currently-enabled addon, read off the `Application`s' own labels
    /// rather than a separate install ledger.
    fn installed_item_map(&self, token: &CancellationToken) -> Result<ItemMap> {
        let apps = self.kube.list_applications(labels::APPLICATION_NAMESPACE, token)?;
        let mut map = ItemMap::new();
        for app in apps {
            let name = app.pointer("/metadata/labels/addons.oam.dev~1name").and_then(Value::as_str);
            let version = app.pointer("/metadata/labels/addons.oam.dev~1version").and_then(Value::as_str);
            if let (Some(name), Some(version)) = (name, version) {
                map.insert(name.to_string(), AddonVersions::single(name, version));
            }
        }
        Ok(map)
    }

    /// The `available` side of the resolver's input (spec.md §4.6):
    /// every version of every addon across every registry, merged and
    /// deduplicated by `resolver::merge_available`.
    fn available_item_map(&self) -> ItemMap {
        let lists = self
            .cache
            .registries()
            .into_keys()
            .flat_map(|reg| self.cache.all_ui_data(&reg))
            .map(|ui| (ui.meta.name.clone(), vec![ui.meta.version.clone()]));
        resolver::merge_available(lists)
    }

    /// Looks up the addon (if any) already owning an existing cluster
    /// definition of `(kind, name)`, excluding `exclude_addon` -- the
    /// renderer's conflict check (spec.md §4.7 "Definitions"). Scans
    /// every enabled Application's carried-definition annotations.
    fn find_definition_owner(&self, kind: &str, def_name: &str, exclude_addon: &str, token: &CancellationToken) -> Option<String> {
        let annotation_key = match kind {
            "ComponentDefinition" => labels::ANNOTATION_COMPONENT_DEFINITIONS,
            "TraitDefinition" => labels::ANNOTATION_TRAIT_DEFINITIONS,
            "PolicyDefinition" => labels::ANNOTATION_POLICY_DEFINITIONS,
            "WorkflowStepDefinition" => labels::ANNOTATION_WORKFLOW_STEP_DEFINITIONS,
            _ => return None,
        };
        let apps = self.kube.list_applications(labels::APPLICATION_NAMESPACE, token).ok()?;
        for app in &apps {
            let Some(owner) = app.pointer("/metadata/labels/addons.oam.dev~1name").and_then(Value::as_str) else {
                continue;
            };
            if owner == exclude_addon {
                continue;
            }
            let pointer = format!("/metadata/annotations/{}", annotation_key.replace('/', "~1"));
            if let Some(names) = app.pointer(&pointer).and_then(Value::as_str) {
                if names.split(',').any(|n| n == def_name) {
                    return Some(owner.to_string());
                }
            }
        }
        None
    }
}

fn carried_definition_names(app: &Application) -> Vec<String> {
    [
        labels::ANNOTATION_COMPONENT_DEFINITIONS,
        labels::ANNOTATION_TRAIT_DEFINITIONS,
        labels::ANNOTATION_POLICY_DEFINITIONS,
        labels::ANNOTATION_WORKFLOW_STEP_DEFINITIONS,
    ]
    .iter()
    .filter_map(|key| app.annotations.get(*key))
    .flat_map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_string))
    .collect()
}
