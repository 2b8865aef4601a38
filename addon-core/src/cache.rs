//! Per-process, lock-guarded registry cache with a best-effort background
//! refresh loop (spec.md §4.4, §5 "Shared resource: the cache").
//!
//! Global mutable state lives nowhere at module scope (spec.md §9):
//! callers construct a `Cache` and pass it to every entry point.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

use addon_definitions::registry::Registry;
use addon_definitions::source::SourceMeta;
use addon_definitions::uidata::UIData;
use addon_definitions::{version, AddonError, MultiError, Result};
use tokio_util::sync::CancellationToken;

use crate::loader;
use crate::reader::{check_cancelled, ChartRepo, GitReader, LocalReader, ObjectStoreReader, Reader};

/// Where the current registry list comes from -- the registry configmap
/// in production, a fixed map in tests (spec.md §9 "inject as a
/// parameter").
pub trait RegistryDirectory {
    fn load_registries(&self) -> Result<BTreeMap<String, Registry>>;
}

#[derive(Default)]
struct CacheState {
    registries: BTreeMap<String, Registry>,
    registry_meta: BTreeMap<String, BTreeMap<String, SourceMeta>>,
    ui_data: BTreeMap<String, Vec<UIData>>,
    versioned_ui_data: BTreeMap<String, BTreeMap<String, UIData>>,
}

/// The four cache maps from spec.md §4.4, behind one reader-writer lock.
/// Cross-map updates for a single registry happen under one exclusive
/// acquisition so metadata and UIData for that registry never drift out
/// of step (spec.md §5).
pub struct Cache {
    state: RwLock<CacheState>,
}

impl Default for Cache {
    fn default() -> Cache {
        Cache::new()
    }
}

impl Cache {
    pub fn new() -> Cache {
        Cache { state: RwLock::new(CacheState::default()) }
    }

    pub fn registry(&self, name: &str) -> Option<Registry> {
        self.state.read().unwrap().registries.get(name).cloned()
    }

    pub fn registries(&self) -> BTreeMap<String, Registry> {
        self.state.read().unwrap().registries.clone()
    }

    /// Unversioned listing for one registry, live-fetching on a cache
    /// miss without caching the fallback result inline (spec.md §4.4).
    pub fn list_ui_data(&self, registry_name: &str) -> Result<Vec<UIData>> {
        if let Some(data) = self.state.read().unwrap().ui_data.get(registry_name) {
            return Ok(data.clone());
        }
        let registry = self
            .registry(registry_name)
            .ok_or_else(|| AddonError::registry_not_exist(registry_name))?;
        let (data, _errors) = list_registry_live(&registry)?;
        Ok(data)
    }

    /// Every `UIData` this registry carries regardless of backend kind:
    /// the unversioned list as-is, or for a versioned-chart registry one
    /// entry per `(addon, version)` pair with the `<addon>-latest` alias
    /// entries dropped (they duplicate the highest version already in
    /// the list). Used by the installer/resolver to build the merged
    /// "available" item map across every registry (spec.md §4.6). Falls
    /// back to a live fetch on a cache miss, same non-caching rule as
    /// `list_ui_data`/`get_versioned`.
    pub fn all_ui_data(&self, registry_name: &str) -> Vec<UIData> {
        {
            let state = self.state.read().unwrap();
            if let Some(list) = state.ui_data.get(registry_name) {
                return list.clone();
            }
            if let Some(versioned) = state.versioned_ui_data.get(registry_name) {
                return versioned.iter().filter(|(k, _)| !k.ends_with("-latest")).map(|(_, v)| v.clone()).collect();
            }
        }
        let Some(registry) = self.registry(registry_name) else { return Vec::new() };
        if registry.is_versioned() {
            let Ok(repo) = ChartRepo::new(registry.helm.as_ref().unwrap()) else { return Vec::new() };
            let Ok(addons) = repo.list_addons() else { return Vec::new() };
            let mut out = Vec::new();
            for addon in addons {
                let Ok(versions) = repo.list_versions(&addon) else { continue };
                for v in version::sort_descending(&versions) {
                    let Ok(chart_reader) = repo.open_version(&addon, &v) else { continue };
                    let Ok(mut listing) = chart_reader.list_addon_meta() else { continue };
                    let Some(source) = listing.remove(&addon) else { continue };
                    if let Ok((ui, _)) = loader::load_ui_data(&chart_reader, &source, registry_name) {
                        out.push(ui);
                    }
                }
            }
            out
        } else {
            list_registry_live(&registry).map(|(data, _errors)| data).unwrap_or_default()
        }
    }

    /// Materializes the full `InstallPackage` for `(addon, version)` in
    /// `registry_name`. Never cached (spec.md §3 `InstallPackage` lifetime
    /// "Assembled on demand; not cached").
    pub fn load_install_package(&self, registry_name: &str, addon_name: &str, version: &str) -> Result<addon_definitions::package::InstallPackage> {
        let registry = self
            .registry(registry_name)
            .ok_or_else(|| AddonError::registry_not_exist(registry_name))?;
        if registry.is_versioned() {
            let repo = ChartRepo::new(registry.helm.as_ref().unwrap())?;
            let resolved_version = if version.is_empty() || version == "latest" {
                version::sort_descending(&repo.list_versions(addon_name)?)
                    .into_iter()
                    .next()
                    .ok_or_else(|| AddonError::not_found("addon version", addon_name))?
            } else {
                version.to_string()
            };
            let chart_reader = repo.open_version(addon_name, &resolved_version)?;
            let source = chart_reader
                .list_addon_meta()?
                .remove(addon_name)
                .ok_or_else(|| AddonError::not_found("addon", addon_name))?;
            let (pkg, errors) = loader::load_install_package(&chart_reader, &source, registry_name)?;
            if !errors.is_empty() {
                warn!("{}", errors);
            }
            Ok(pkg)
        } else {
            let reader = build_reader(&registry)?;
            let listing = reader.list_addon_meta()?;
            let source = listing.get(addon_name).cloned().ok_or_else(|| AddonError::not_found("addon", addon_name))?;
            let (pkg, errors) = loader::load_install_package(reader.as_ref(), &source, registry_name)?;
            if !errors.is_empty() {
                warn!("{}", errors);
            }
            Ok(pkg)
        }
    }

    /// Finds which registry carries `(addon_name, version)`, searching
    /// every registry when `registry_name` is `None` (spec.md §4.8 step 1
    /// "resolve version via [the version engine]"). When `version` is
    /// `None` too, picks the highest version found anywhere. First match
    /// wins on a name tie across registries -- registries are scanned in
    /// name order, which is deterministic but otherwise arbitrary; the
    /// installer only cares that *a* satisfying registry is found.
    pub fn find_addon(&self, registry_name: Option<&str>, addon_name: &str, version: Option<&str>) -> Result<(String, UIData)> {
        let candidates: Vec<String> = match registry_name {
            Some(r) => vec![r.to_string()],
            None => self.registries().into_keys().collect(),
        };
        let mut best: Option<(String, UIData)> = None;
        for reg in candidates {
            for ui in self.all_ui_data(&reg) {
                if ui.meta.name != addon_name {
                    continue;
                }
                if let Some(v) = version {
                    if ui.meta.version == v {
                        return Ok((reg, ui));
                    }
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some((_, cur)) => match (version::normalize(&ui.meta.version), version::normalize(&cur.meta.version)) {
                        (Some(v), Some(c)) => v > c,
                        _ => false,
                    },
                };
                if better {
                    best = Some((reg.clone(), ui));
                }
            }
        }
        best.ok_or_else(|| AddonError::not_found("addon", addon_name).into())
    }

    /// Looks up one `(addon, version)` pair in a versioned registry,
    /// resolving the `<addon>-latest` alias. Falls back to a live fetch on
    /// a miss, same non-caching rule as `list_ui_data`.
    pub fn get_versioned(&self, registry_name: &str, addon: &str, version: &str) -> Result<UIData> {
        let key = if version.is_empty() || version == "latest" {
            UIData::latest_alias(addon)
        } else {
            format!("{}-{}", addon, version)
        };
        if let Some(found) = self.state.read().unwrap().versioned_ui_data.get(registry_name).and_then(|m| m.get(&key)) {
            return Ok(found.clone());
        }
        let registry = self
            .registry(registry_name)
            .ok_or_else(|| AddonError::registry_not_exist(registry_name))?;
        let repo = ChartRepo::new(registry.helm.as_ref().ok_or_else(|| {
            AddonError::invalid_package(format!("registry '{}' is not a versioned chart registry", registry_name))
        })?)?;
        let resolved_version = if version.is_empty() || version == "latest" {
            let mut versions = version::sort_descending(&repo.list_versions(addon)?);
            versions.drain(..).next().ok_or_else(|| AddonError::not_found("addon version", addon))?
        } else {
            version.to_string()
        };
        let chart_reader = repo.open_version(addon, &resolved_version)?;
        let source = chart_reader
            .list_addon_meta()?
            .remove(addon)
            .ok_or_else(|| AddonError::not_found("addon", addon))?;
        let (mut ui, _errors) = loader::load_ui_data(&chart_reader, &source, registry_name)?;
        ui.available_versions = version::sort_descending(&repo.list_versions(addon)?);
        Ok(ui)
    }

    /// Fetches the registry list from `directory`, drops entries for
    /// registries that no longer exist, and refreshes every remaining one.
    /// A failing registry only loses its own slot; the others still
    /// refresh (spec.md §4.4, §5).
    pub fn refresh(&self, directory: &dyn RegistryDirectory, token: &CancellationToken) -> MultiError {
        let mut errors = MultiError::new("refreshing registry cache");
        let registries = match directory.load_registries() {
            Ok(r) => r,
            Err(e) => {
                errors.push(e);
                return errors;
            }
        };

        {
            let mut state = self.state.write().unwrap();
            state.registries.retain(|name, _| registries.contains_key(name));
            state.registry_meta.retain(|name, _| registries.contains_key(name));
            state.ui_data.retain(|name, _| registries.contains_key(name));
            state.versioned_ui_data.retain(|name, _| registries.contains_key(name));
            state.registries = registries.clone();
        }

        for (name, registry) in &registries {
            if check_cancelled(token).is_err() {
                break;
            }
            if let Err(e) = self.refresh_one(name, registry) {
                warn!("refreshing registry '{}' failed: {}", name, e);
                errors.push(e);
            }
        }
        errors
    }

    /// Refreshes one registry's metadata and UIData under a single
    /// exclusive lock acquisition.
    fn refresh_one(&self, name: &str, registry: &Registry) -> std::result::Result<(), failure::Error> {
        if registry.is_versioned() {
            let repo = ChartRepo::new(registry.helm.as_ref().unwrap())?;
            let mut per_addon: BTreeMap<String, UIData> = BTreeMap::new();
            let mut meta_out: BTreeMap<String, SourceMeta> = BTreeMap::new();
            for addon in repo.list_addons()? {
                let mut versions = version::sort_descending(&repo.list_versions(&addon)?);
                versions.dedup();
                let mut latest: Option<UIData> = None;
                for v in &versions {
                    let chart_reader = repo.open_version(&addon, v)?;
                    let listing = chart_reader.list_addon_meta()?;
                    let Some(source) = listing.get(&addon).cloned() else { continue };
                    let (mut ui, errors) = loader::load_ui_data(&chart_reader, &source, name)?;
                    if !errors.is_empty() {
                        warn!("{}", errors);
                    }
                    ui.available_versions = versions.clone();
                    meta_out.insert(format!("{}-{}", addon, v), source);
                    if latest.is_none() {
                        latest = Some(ui.clone());
                    }
                    per_addon.insert(format!("{}-{}", addon, v), ui);
                }
                if let Some(latest) = latest {
                    per_addon.insert(UIData::latest_alias(&addon), latest);
                }
            }
            let mut state = self.state.write().unwrap();
            state.registry_meta.insert(name.to_string(), meta_out);
            state.versioned_ui_data.insert(name.to_string(), per_addon);
        } else {
            let reader = build_reader(registry)?;
            let listing = reader.list_addon_meta()?;
            let mut ui_list = Vec::new();
            for source in listing.values() {
                let (ui, errors) = loader::load_ui_data(reader.as_ref(), source, name)?;
                if !errors.is_empty() {
                    warn!("{}", errors);
                }
                ui_list.push(ui);
            }
            let mut state = self.state.write().unwrap();
            state.registry_meta.insert(name.to_string(), listing);
            state.ui_data.insert(name.to_string(), ui_list);
        }
        Ok(())
    }
}

fn build_reader(registry: &Registry) -> Result<Box<dyn Reader>> {
    if let Some(spec) = &registry.oss {
        Ok(Box::new(ObjectStoreReader::new(spec)?))
    } else if let Some(spec) = &registry.git {
        Ok(Box::new(GitReader::new(spec)?))
    } else if let Some(spec) = &registry.local {
        Ok(Box::new(LocalReader::new(spec.path.clone())))
    } else {
        Err(AddonError::invalid_package(format!("registry '{}' has no backend configured", registry.name)).into())
    }
}

fn list_registry_live(registry: &Registry) -> Result<(Vec<UIData>, MultiError)> {
    let reader = build_reader(registry)?;
    let listing = reader.list_addon_meta()?;
    let mut out = Vec::new();
    let mut errors = MultiError::new(format!("live-listing registry '{}'", registry.name));
    for source in listing.values() {
        match loader::load_ui_data(reader.as_ref(), source, &registry.name) {
            Ok((ui, per_addon_errors)) => {
                out.push(ui);
                for e in per_addon_errors.into_errors() {
                    errors.push(e);
                }
            }
            Err(e) => errors.push(e),
        }
    }
    Ok((out, errors))
}

/// Default refresh interval (spec.md §4.4 "default ~10 min").
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

#[cfg(test)]
mod tests {
    use super::*;
    use addon_definitions::registry::LocalSpec;
    use std::fs;
    use std::path::PathBuf;

    struct FixedDirectory(BTreeMap<String, Registry>);

    impl RegistryDirectory for FixedDirectory {
        fn load_registries(&self) -> Result<BTreeMap<String, Registry>> {
            Ok(self.0.clone())
        }
    }

    fn tempdir(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("addon-core-cache-test-{}-{}", tag, std::process::id()));
        p
    }

    #[test]
    fn refresh_populates_metadata_and_ui_data_atomically() {
        let dir = tempdir("refresh");
        fs::create_dir_all(dir.join("demo")).unwrap();
        fs::write(dir.join("demo/metadata.yaml"), "name: demo\nversion: 1.0.0\n").unwrap();

        let mut registries = BTreeMap::new();
        registries.insert(
            "local".to_string(),
            Registry { name: "local".into(), oss: None, git: None, helm: None, local: Some(LocalSpec { path: dir.to_string_lossy().to_string() }) },
        );
        let cache = Cache::new();
        let errors = cache.refresh(&FixedDirectory(registries), &CancellationToken::new());
        assert!(errors.is_empty(), "{}", errors);

        let listed = cache.list_ui_data("local").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].meta.name, "demo");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_registry_is_dropped_on_next_refresh() {
        let dir = tempdir("drop");
        fs::create_dir_all(&dir).unwrap();
        let mut registries = BTreeMap::new();
        registries.insert(
            "local".to_string(),
            Registry { name: "local".into(), oss: None, git: None, helm: None, local: Some(LocalSpec { path: dir.to_string_lossy().to_string() }) },
        );
        let cache = Cache::new();
        cache.refresh(&FixedDirectory(registries), &CancellationToken::new());
        assert!(cache.registry("local").is_some());

        cache.refresh(&FixedDirectory(BTreeMap::new()), &CancellationToken::new());
        assert!(cache.registry("local").is_none());
        assert!(cache.list_ui_data("local").is_err());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn one_failing_registry_does_not_block_the_others() {
        let good_dir = tempdir("good");
        fs::create_dir_all(good_dir.join("demo")).unwrap();
        fs::write(good_dir.join("demo/metadata.yaml"), "name: demo\nversion: 1.0.0\n").unwrap();

        let mut registries = BTreeMap::new();
        registries.insert(
            "good".to_string(),
            Registry { name: "good".into(), oss: None, git: None, helm: None, local: Some(LocalSpec { path: good_dir.to_string_lossy().to_string() }) },
        );
        registries.insert(
            "broken".to_string(),
            Registry { name: "broken".into(), oss: None, git: None, helm: None, local: None },
        );

        let cache = Cache::new();
        let errors = cache.refresh(&FixedDirectory(registries), &CancellationToken::new());
        assert_eq!(errors.len(), 1);
        assert_eq!(cache.list_ui_data("good").unwrap().len(), 1);

        fs::remove_dir_all(&good_dir).ok();
    }
}
