//! Dependency resolution and version-constraint satisfaction across
//! installed/available addon sets (spec.md §4.6).
//!
//! Pure logic, no I/O: the installer gathers `installed`/`available` from
//! the cache and the cluster, and this module only does the arithmetic.

use std::collections::BTreeMap;

use addon_definitions::error::AddonError;
use addon_definitions::meta::Dependency;
use addon_definitions::version::{self, Range};
use addon_definitions::MultiError;

/// One addon's known versions, from either the installed set (a single
/// entry: the installed version) or the available set (every version
/// from every registry, merged and deduplicated -- spec.md §4.6 inputs).
#[derive(Clone, Debug, Default)]
pub struct AddonVersions {
    pub name: String,
    /// Sorted descending, per `version::sort_descending`.
    pub available_versions: Vec<String>,
}

impl AddonVersions {
    pub fn single(name: impl Into<String>, version: impl Into<String>) -> AddonVersions {
        AddonVersions { name: name.into(), available_versions: vec![version.into()] }
    }

    pub fn highest(&self) -> Option<&str> {
        self.available_versions.first().map(|s| s.as_str())
    }
}

pub type ItemMap = BTreeMap<String, AddonVersions>;

/// Merge version lists for the same addon name coming from multiple
/// registries into one descending, deduplicated list (spec.md §4.6
/// "available" input construction).
pub fn merge_available(lists: impl IntoIterator<Item = (String, Vec<String>)>) -> ItemMap {
    let mut raw: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, versions) in lists {
        raw.entry(name).or_default().extend(versions);
    }
    raw.into_iter()
        .map(|(name, versions)| {
            let mut sorted = version::sort_descending(&versions);
            sorted.dedup();
            (name.clone(), AddonVersions { name, available_versions: sorted })
        })
        .collect()
}

/// Resolves one dependency declaration against the installed/available
/// sets (spec.md §4.6, two numbered rules).
pub fn resolve_one(
    addon: &str,
    dep: &Dependency,
    installed: &ItemMap,
    available: &ItemMap,
) -> Result<String, AddonError> {
    let installed_version = installed.get(&dep.name).and_then(|a| a.available_versions.first().cloned());
    let range = dep.version.trim();

    if range.is_empty() {
        // Rule 1: empty range prefers installed, else highest available,
        // else `no-available-addon`.
        if let Some(v) = installed_version {
            return Ok(v);
        }
        if let Some(v) = available.get(&dep.name).and_then(|a| a.highest()) {
            return Ok(v.to_string());
        }
        return Err(AddonError::dependency_unresolvable(addon, &dep.name, "no-available-addon"));
    }

    let parsed_range = Range::parse(range).ok_or_else(|| {
        AddonError::dependency_unresolvable(addon, &dep.name, format!("invalid version range '{}'", range))
    })?;

    if let Some(ref v) = installed_version {
        if version::normalize(v).map(|nv| parsed_range.satisfies(&nv)).unwrap_or(false) {
            return Ok(v.clone());
        }
    }

    let best = available
        .get(&dep.name)
        .and_then(|a| a.available_versions.iter().find(|v| {
            version::normalize(v).map(|nv| parsed_range.satisfies(&nv)).unwrap_or(false)
        }));

    match best {
        Some(v) => Ok(v.clone()),
        None => {
            if installed_version.is_some() {
                Err(AddonError::dependency_unresolvable(addon, &dep.name, "installed-version-conflict"))
            } else {
                Err(AddonError::dependency_unresolvable(
                    addon,
                    &dep.name,
                    format!("no-matching-version{{available: {:?}}}", available.get(&dep.name).map(|a| &a.available_versions)),
                ))
            }
        }
    }
}

/// Resolves every declared dependency of `addon`, aggregating failures
/// instead of short-circuiting on the first one (spec.md §4.6 "Errors are
/// aggregated ... into a single multi-error; no short-circuit").
pub fn resolve_all(
    addon: &str,
    deps: &[Dependency],
    installed: &ItemMap,
    available: &ItemMap,
) -> Result<BTreeMap<String, String>, MultiError> {
    let mut resolved = BTreeMap::new();
    let mut errors = MultiError::new(format!("resolving dependencies of '{}'", addon));
    for dep in deps {
        match resolve_one(addon, dep, installed, available) {
            Ok(v) => {
                resolved.insert(dep.name.clone(), v);
            }
            Err(e) => errors.push(e.into()),
        }
    }
    errors.into_result().map(|_| resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avail(versions: &[&str]) -> ItemMap {
        let mut m = ItemMap::new();
        m.insert("A".into(), AddonVersions { name: "A".into(), available_versions: versions.iter().map(|s| s.to_string()).collect() });
        m
    }

    fn dep(range: &str) -> Dependency {
        Dependency { name: "A".into(), version: range.into() }
    }

    #[test]
    fn picks_highest_satisfying_available_version() {
        let available = avail(&["2.0.0", "1.3.0", "1.2.3", "1.0.0"]);
        let installed = ItemMap::new();
        let got = resolve_one("x", &dep(">=1.2.3, <2.0.0"), &installed, &available).unwrap();
        assert_eq!(got, "1.3.0");
    }

    #[test]
    fn prefers_installed_when_it_satisfies() {
        let available = avail(&["2.0.0", "1.3.0", "1.2.3", "1.0.0"]);
        let installed = {
            let mut m = ItemMap::new();
            m.insert("A".into(), AddonVersions::single("A", "1.2.3"));
            m
        };
        let got = resolve_one("x", &dep(">=1.2.3, <2.0.0"), &installed, &available).unwrap();
        assert_eq!(got, "1.2.3");
    }

    #[test]
    fn installed_not_satisfying_is_a_conflict() {
        let available = avail(&["2.0.0", "1.3.0", "1.2.3", "1.0.0"]);
        let installed = {
            let mut m = ItemMap::new();
            m.insert("A".into(), AddonVersions::single("A", "1.2.0"));
            m
        };
        let err = resolve_one("x", &dep(">=1.2.3, <2.0.0"), &installed, &available).unwrap_err();
        assert!(matches!(err.kind(), addon_definitions::error::AddonErrorKind::DependencyUnresolvable { reason, .. } if reason == "installed-version-conflict"));
    }

    #[test]
    fn empty_range_with_nothing_available_fails() {
        let available = ItemMap::new();
        let installed = ItemMap::new();
        let err = resolve_one("x", &dep(""), &installed, &available).unwrap_err();
        assert!(matches!(err.kind(), addon_definitions::error::AddonErrorKind::DependencyUnresolvable { reason, .. } if reason == "no-available-addon"));
    }

    #[test]
    fn aggregates_failures_across_multiple_dependencies() {
        let deps = vec![dep(">=9.0.0"), Dependency { name: "B".into(), version: "".into() }];
        let available = avail(&["1.0.0"]);
        let err = resolve_all("x", &deps, &ItemMap::new(), &available).unwrap_err();
        assert_eq!(err.len(), 2);
    }
}

/// Reverse-dependency scan at disable (spec.md §4.6): any application
/// other than the target's own that references a name carried by the
/// target addon's annotations blocks the disable.
pub mod reverse_deps {
    use addon_definitions::application::Application;

    /// One cluster `Application`'s name plus the kind names it references
    /// (component types, trait types, policy types, workflow step types).
    pub struct ApplicationRefs<'a> {
        pub name: &'a str,
        pub referenced_kinds: Vec<&'a str>,
    }

    impl<'a> ApplicationRefs<'a> {
        pub fn from_application(app: &'a Application) -> ApplicationRefs<'a> {
            let mut kinds = Vec::new();
            for c in &app.components {
                kinds.push(c.component_type.as_str());
                for t in &c.traits {
                    kinds.push(t.trait_type.as_str());
                }
            }
            for p in &app.policies {
                kinds.push(p.policy_type.as_str());
            }
            if let Some(wf) = &app.workflow {
                for s in &wf.steps {
                    kinds.push(s.step_type.as_str());
                }
            }
            ApplicationRefs { name: &app.name, referenced_kinds: kinds }
        }
    }

    /// Returns the names of every application (other than `target_app_name`)
    /// that references one of `carried_names`. Truncation to 3 entries
    /// happens at the error-construction site (`AddonError::in_use`).
    pub fn offending_applications<'a>(
        target_app_name: &str,
        carried_names: &[String],
        all_apps: &[ApplicationRefs<'a>],
    ) -> Vec<String> {
        all_apps
            .iter()
            .filter(|a| a.name != target_app_name)
            .filter(|a| a.referenced_kinds.iter().any(|k| carried_names.iter().any(|n| n == k)))
            .map(|a| a.name.to_string())
            .collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use addon_definitions::application::{Application, Component};

        #[test]
        fn finds_applications_referencing_carried_definitions() {
            let mut other = Application::default_skeleton("other", "1.0.0");
            other.name = "addon-other".into();
            other.components.push(Component::new("c1", "my-trait-consuming-component", serde_json::json!({})));

            let refs = vec![ApplicationRefs::from_application(&other)];
            let offenders = offending_applications("addon-x", &["my-trait-consuming-component".to_string()], &refs);
            assert_eq!(offenders, vec!["addon-other".to_string()]);
        }

        #[test]
        fn excludes_the_targets_own_application() {
            let mut target = Application::default_skeleton("x", "1.0.0");
            target.components.push(Component::new("c1", "some-def", serde_json::json!({})));
            let refs = vec![ApplicationRefs::from_application(&target)];
            let offenders = offending_applications(&target.name, &["some-def".to_string()], &refs);
            assert!(offenders.is_empty());
        }
    }
}
