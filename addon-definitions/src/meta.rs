//! Parsed `metadata.yaml` (spec.md §3 `Meta`, §6 "metadata.yaml shape").

use std::collections::BTreeMap;
use regex::Regex;

use crate::error::AddonError;
use crate::Result;

/// Name validation regex from spec.md §3: lower-case, dash-separated,
/// alphanumeric segments.
pub fn name_regex() -> Regex {
    Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap()
}

/// Where an addon's definitions/resources are meant to run.
#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeployTo {
    /// Components are deployed without touching the control plane (the
    /// hub cluster the addon manager itself runs in).
    #[serde(default)]
    pub disableControlPlane: bool,
    /// The addon's resources (and runtime-only trait definitions) are
    /// meant for one or more managed runtime clusters, not the hub.
    #[serde(default)]
    pub runtimeCluster: bool,
}

/// One entry of `Meta::dependencies`.
#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Dependency {
    pub name: String,
    /// A version range as understood by `crate::version::Range`. An
    /// absent or empty range means "whatever is newest" (spec.md §4.6).
    #[serde(default)]
    pub version: String,
}

/// Gate on the platform/kubernetes versions an addon requires.
#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SystemRequirements {
    #[serde(default)]
    pub platformVersion: String,
    #[serde(default)]
    pub kubernetesVersion: String,
}

/// Parsed `metadata.yaml`.
#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Meta {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deployTo: DeployTo,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub needNamespace: Vec<String>,
    #[serde(default)]
    pub invisible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systemRequirements: Option<SystemRequirements>,
}

impl Meta {
    pub fn parse(raw: &str) -> Result<Meta> {
        let meta: Meta =
            serde_yaml::from_str(raw).map_err(|e| AddonError::parse("metadata.yaml", e))?;
        meta.verify()?;
        Ok(meta)
    }

    /// Non-empty name/version and name shape. The fuller package-level
    /// checks (image, resources, ...) live on `InstallPackage`, since
    /// those depend on more than `metadata.yaml` alone -- there's no
    /// analogue here, a `Meta` on its own is just a catalog entry.
    pub fn verify(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!(AddonError::invalid_package("metadata.yaml is missing a name"));
        }
        if !name_regex().is_match(&self.name) {
            bail!(AddonError::invalid_package(format!(
                "addon name '{}' must match {}",
                self.name,
                name_regex().as_str()
            )));
        }
        if self.version.is_empty() {
            bail!(AddonError::invalid_package(format!("addon '{}' is missing a version", self.name)));
        }
        if crate::version::normalize(&self.version).is_none() {
            bail!(AddonError::invalid_package(format!(
                "addon '{}' has a non-semver-ish version '{}'",
                self.name, self.version
            )));
        }
        Ok(())
    }

    /// Dependency map keyed by name, for the resolver.
    pub fn dependency_map(&self) -> BTreeMap<String, String> {
        self.dependencies.iter().map(|d| (d.name.clone(), d.version.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_metadata() {
        let raw = "name: my-addon\nversion: 1.0.0\n";
        let m = Meta::parse(raw).unwrap();
        assert_eq!(m.name, "my-addon");
        assert_eq!(m.version, "1.0.0");
        assert!(!m.deployTo.runtimeCluster);
    }

    #[test]
    fn rejects_bad_name() {
        let raw = "name: My_Addon\nversion: 1.0.0\n";
        assert!(Meta::parse(raw).is_err());
    }

    #[test]
    fn rejects_non_semver_version() {
        let raw = "name: my-addon\nversion: not-a-version\n";
        assert!(Meta::parse(raw).is_err());
    }

    #[test]
    fn dependency_map_keys_by_name() {
        let raw = "name: my-addon\nversion: 1.0.0\ndependencies:\n  - name: fluxcd\n    version: \">=1.0.0\"\n  - name: cert-manager\n    version: \"1.2.0\"\n";
        let m = Meta::parse(raw).unwrap();
        let expected: BTreeMap<String, String> = maplit::btreemap! {
            "fluxcd".to_string() => ">=1.0.0".to_string(),
            "cert-manager".to_string() => "1.2.0".to_string(),
        };
        assert_eq!(m.dependency_map(), expected);
    }
}
