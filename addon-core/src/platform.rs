//! Platform/Kubernetes version gate (spec.md §4.5 "Platform-requirement
//! check").

use addon_definitions::error::AddonError;
use addon_definitions::meta::Meta;
use addon_definitions::{version, Result};

use crate::kube_client::KubeClient;

/// Namespace and controller-name label the platform's own controller
/// Deployment carries. Not configurable today -- every registry serves
/// addons for the same installed platform.
const CONTROLLER_NAMESPACE: &str = "vela-system";
const CONTROLLER_NAME: &str = "kubevela-vela-core";

/// The two cluster reads this check needs, pulled out of `KubeClient` so
/// the gate itself can be tested without a live cluster.
pub trait PlatformInfo {
    fn controller_image_tag(&self, namespace: &str, controller_name: &str) -> Result<String>;
    fn server_version(&self) -> Result<String>;
}

impl PlatformInfo for KubeClient {
    fn controller_image_tag(&self, namespace: &str, controller_name: &str) -> Result<String> {
        KubeClient::controller_image_tag(self, namespace, controller_name)
    }

    fn server_version(&self) -> Result<String> {
        KubeClient::server_version(self)
    }
}

/// Checks `meta.systemRequirements` against the installed platform and
/// Kubernetes server versions. A `None` requirement means "no constraint"
/// (SPEC_FULL addition) and the check is skipped entirely -- no cluster
/// calls are made.
pub fn check(meta: &Meta, info: &dyn PlatformInfo) -> Result<()> {
    let Some(req) = &meta.systemRequirements else { return Ok(()) };

    if !req.platformVersion.is_empty() {
        let installed = info.controller_image_tag(CONTROLLER_NAMESPACE, CONTROLLER_NAME)?;
        if !version::satisfies(&installed, &req.platformVersion) {
            return Err(AddonError::version_unmatch(&req.platformVersion, installed).into());
        }
    }

    if !req.kubernetesVersion.is_empty() {
        let installed = info.server_version()?;
        if !version::satisfies(&installed, &req.kubernetesVersion) {
            return Err(AddonError::version_unmatch(&req.kubernetesVersion, installed).into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use addon_definitions::meta::SystemRequirements;
    use std::cell::Cell;

    struct FakeInfo {
        image_tag: &'static str,
        server_version: &'static str,
        calls: Cell<u32>,
    }

    impl PlatformInfo for FakeInfo {
        fn controller_image_tag(&self, _namespace: &str, _controller_name: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.image_tag.to_string())
        }

        fn server_version(&self) -> Result<String> {
            Ok(self.server_version.to_string())
        }
    }

    fn meta_with(req: Option<SystemRequirements>) -> Meta {
        Meta { name: "x".into(), version: "1.0.0".into(), systemRequirements: req, ..Default::default() }
    }

    #[test]
    fn no_requirement_skips_cluster_reads_entirely() {
        let meta = meta_with(None);
        let info = FakeInfo { image_tag: "v1.0.0", server_version: "1.28", calls: Cell::new(0) };
        assert!(check(&meta, &info).is_ok());
        assert_eq!(info.calls.get(), 0);
    }

    #[test]
    fn satisfied_platform_version_passes() {
        let meta = meta_with(Some(SystemRequirements { platformVersion: ">=1.5.0".into(), kubernetesVersion: String::new() }));
        let info = FakeInfo { image_tag: "v1.6.0", server_version: "1.28", calls: Cell::new(0) };
        assert!(check(&meta, &info).is_ok());
    }

    #[test]
    fn mismatched_platform_version_fails() {
        let meta = meta_with(Some(SystemRequirements { platformVersion: ">=1.5.0".into(), kubernetesVersion: String::new() }));
        let info = FakeInfo { image_tag: "v1.0.0", server_version: "1.28", calls: Cell::new(0) };
        let err = check(&meta, &info).unwrap_err();
        assert!(err.to_string().contains("platform version mismatch"));
    }

    #[test]
    fn mismatched_kubernetes_version_fails() {
        let meta = meta_with(Some(SystemRequirements { platformVersion: String::new(), kubernetesVersion: ">=1.29".into() }));
        let info = FakeInfo { image_tag: "v1.0.0", server_version: "1.28", calls: Cell::new(0) };
        assert!(check(&meta, &info).is_err());
    }
}
