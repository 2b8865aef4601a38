//! Registry backend configuration (spec.md §3 `Registry`, §6 "Registry
//! configmap").

use std::collections::BTreeMap;

use crate::error::AddonError;
use crate::Result;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ObjectStoreSpec {
    pub endpoint: String,
    pub bucket: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub insecureSkipTLS: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GitSpec {
    pub url: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HelmSpec {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub insecureSkipTLS: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LocalSpec {
    pub path: String,
}

/// One named backend configuration, as found in the `registries` map of
/// the registry configmap. Exactly one of `oss`/`git`/`helm`/`local` is
/// set; `Registry::kind_name` reports which.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Registry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oss: Option<ObjectStoreSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalSpec>,
}

impl Registry {
    pub fn kind_name(&self) -> &'static str {
        if self.oss.is_some() {
            "object-store"
        } else if self.git.is_some() {
            "git"
        } else if self.helm.is_some() {
            "versioned-chart"
        } else if self.local.is_some() {
            "local-dir"
        } else {
            "unknown"
        }
    }

    pub fn verify(&self) -> Result<()> {
        let set = [self.oss.is_some(), self.git.is_some(), self.helm.is_some(), self.local.is_some()];
        let count = set.iter().filter(|b| **b).count();
        if count != 1 {
            bail!(AddonError::invalid_package(format!(
                "registry '{}' must set exactly one of oss/git/helm/local, found {}",
                self.name, count
            )));
        }
        Ok(())
    }

    /// A versioned registry is one whose reader exposes `(name, version)`
    /// pairs rather than a single unversioned copy per addon (spec.md §3
    /// invariants).
    pub fn is_versioned(&self) -> bool {
        self.helm.is_some()
    }
}

/// The `registries` JSON/YAML document stored in the cluster configmap
/// (spec.md §6).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RegistryConfigDocument {
    #[serde(default)]
    pub registries: BTreeMap<String, Registry>,
}

impl RegistryConfigDocument {
    pub fn parse(raw: &str) -> Result<RegistryConfigDocument> {
        let mut doc: RegistryConfigDocument =
            serde_json::from_str(raw).or_else(|_| serde_yaml::from_str(raw)).map_err(|e| {
                AddonError::parse("registry configmap", e)
            })?;
        for (key, reg) in doc.registries.iter_mut() {
            if reg.name.is_empty() {
                reg.name = key.clone();
            }
            reg.verify()?;
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_backend_document() {
        let raw = r#"{
            "registries": {
                "official": {"name": "official", "oss": {"endpoint": "https://s3.example.com", "bucket": "addons", "path": "catalog"}},
                "my-git": {"name": "my-git", "git": {"url": "https://github.com/acme/addons", "path": "addons"}},
                "charts": {"name": "charts", "helm": {"url": "https://charts.example.com"}}
            }
        }"#;
        let doc = RegistryConfigDocument::parse(raw).unwrap();
        assert_eq!(doc.registries.len(), 3);
        assert_eq!(doc.registries["official"].kind_name(), "object-store");
        assert!(doc.registries["charts"].is_versioned());
    }

    #[test]
    fn rejects_registry_with_no_backend() {
        let reg = Registry { name: "x".into(), oss: None, git: None, helm: None, local: None };
        assert!(reg.verify().is_err());
    }
}
