//! The Kubernetes apply/read boundary (spec.md §4.8, §6, §4.5 platform
//! check, §4.6 reverse-dependency scan).
//!
//! `kube`/`k8s-openapi` are async; the rest of this crate reads as a
//! blocking library the way the teacher's `helm`/`vault` clients do, so
//! this module owns one multi-threaded Tokio runtime internally and
//! bridges every call through `Runtime::block_on` (spec.md §5
//! "Concurrency & Resource Model" clarification). Cancellation is
//! checked before and after each blocking call via `CancellationToken`,
//! matching the granularity the reader backends use.

use std::collections::BTreeMap;

use addon_definitions::application::Application;
use addon_definitions::{AddonError, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams};
use kube::discovery::ApiResource;
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::reader::check_cancelled;

const APPLICATION_GROUP: &str = "core.oam.dev";
const APPLICATION_VERSION: &str = "v1beta1";
const APPLICATION_KIND: &str = "Application";
const FIELD_MANAGER: &str = "addon-core";

fn application_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(APPLICATION_GROUP, APPLICATION_VERSION, APPLICATION_KIND))
}

/// Owns the Tokio runtime and the `kube::Client` handle. One instance is
/// shared across the installer and status reader; cheap to clone (the
/// underlying `kube::Client` is itself a cheap handle).
pub struct KubeClient {
    runtime: Runtime,
    client: kube::Client,
}

impl KubeClient {
    /// Builds a client against the in-cluster or kubeconfig-resolved
    /// context (`kube::Client::try_default`'s usual resolution order).
    /// The only I/O construction does.
    pub fn new() -> Result<KubeClient> {
        let runtime = Runtime::new().map_err(AddonError::transport)?;
        let client = runtime
            .block_on(kube::Client::try_default())
            .map_err(|e| AddonError::transport(e))?;
        Ok(KubeClient { runtime, client })
    }

    fn applications(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &application_resource())
    }

    /// Server-side apply of one rendered `Application` (spec.md §4.8 step
    /// 7 "Apply Application (server-side idempotent apply)").
    pub fn apply_application(&self, app: &Application, token: &CancellationToken) -> Result<()> {
        check_cancelled(token)?;
        let manifest = app.to_manifest();
        let obj: DynamicObject = serde_json::from_value(manifest)
            .map_err(|e| AddonError::invalid_package(format!("rendered Application does not serialize: {}", e)))?;
        let api = self.applications(&app.namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.runtime
            .block_on(api.patch(&app.name, &params, &Patch::Apply(&obj)))
            .map_err(|e| AddonError::transport(e))?;
        check_cancelled(token)
    }

    /// `None` when the Application does not exist -- not an error (spec.md
    /// §4.9 "Application absent -> disabled", §4.8 "disable is idempotent").
    pub fn get_application(&self, name: &str, namespace: &str) -> Result<Option<Value>> {
        let api = self.applications(namespace);
        match self.runtime.block_on(api.get(name)) {
            Ok(obj) => Ok(Some(serde_json::to_value(obj).map_err(|e| AddonError::parse("Application", e))?)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(AddonError::transport(e).into()),
        }
    }

    /// Idempotent: a missing Application is success, not an error.
    pub fn delete_application(&self, name: &str, namespace: &str) -> Result<()> {
        let api = self.applications(namespace);
        match self.runtime.block_on(api.delete(name, &DeleteParams::default())) {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(AddonError::transport(e).into()),
        }
    }

    /// Every Application in `namespace`, for the reverse-dependency scan
    /// (spec.md §4.6).
    pub fn list_applications(&self, namespace: &str, token: &CancellationToken) -> Result<Vec<Value>> {
        check_cancelled(token)?;
        let api = self.applications(namespace);
        let list = self
            .runtime
            .block_on(api.list(&ListParams::default()))
            .map_err(|e| AddonError::transport(e))?;
        list.items
            .into_iter()
            .map(|obj| serde_json::to_value(obj).map_err(|e| AddonError::parse("Application", e).into()))
            .collect()
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Applies (creates or overwrites) the parameter secret for one addon
    /// (spec.md §4.8 step 8, §6 "Parameter secret").
    pub fn apply_secret(&self, name: &str, namespace: &str, key: &str, value: &str) -> Result<()> {
        let mut string_data = BTreeMap::new();
        string_data.insert(key.to_string(), value.to_string());
        let secret = Secret {
            metadata: kube::api::ObjectMeta { name: Some(name.to_string()), namespace: Some(namespace.to_string()), ..Default::default() },
            string_data: Some(string_data),
            ..Default::default()
        };
        let api = self.secrets(namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.runtime
            .block_on(api.patch(name, &params, &Patch::Apply(&secret)))
            .map_err(|e| AddonError::transport(e))?;
        Ok(())
    }

    /// `None` when the secret does not exist (a first-time enable).
    pub fn get_secret_value(&self, name: &str, namespace: &str, key: &str) -> Result<Option<String>> {
        let api = self.secrets(namespace);
        match self.runtime.block_on(api.get(name)) {
            Ok(secret) => {
                let value = secret
                    .data
                    .and_then(|d| d.get(key).cloned())
                    .map(|b| String::from_utf8(b.0).map_err(|e| AddonError::parse("parameter secret", e)))
                    .transpose()?;
                Ok(value)
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(AddonError::transport(e).into()),
        }
    }

    pub fn delete_secret(&self, name: &str, namespace: &str) -> Result<()> {
        let api = self.secrets(namespace);
        match self.runtime.block_on(api.delete(name, &DeleteParams::default())) {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(AddonError::transport(e).into()),
        }
    }

    /// Kubernetes server version from discovery (spec.md §4.5 "Platform-
    /// requirement check").
    pub fn server_version(&self) -> Result<String> {
        let info = self.runtime.block_on(self.client.apiserver_version()).map_err(|e| AddonError::transport(e))?;
        Ok(format!("{}.{}", info.major, info.minor.trim_end_matches('+')))
    }

    /// The container image tag of the distinguished controller Deployment,
    /// selected by its `controller-name` label (spec.md §4.5).
    pub fn controller_image_tag(&self, namespace: &str, controller_name: &str) -> Result<String> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&format!("controller-name={}", controller_name));
        let list = self.runtime.block_on(api.list(&params)).map_err(|e| AddonError::transport(e))?;
        let deployment = list.items.into_iter().next().ok_or_else(|| {
            AddonError::not_found("deployment", format!("controller-name={}", controller_name))
        })?;
        let image = deployment
            .spec
            .and_then(|s| s.template.spec)
            .and_then(|s| s.containers.into_iter().next())
            .and_then(|c| c.image)
            .ok_or_else(|| AddonError::not_found("container image", controller_name))?;
        let tag = image.rsplit_once(':').map(|(_, t)| t.to_string()).unwrap_or(image);
        Ok(tag)
    }
}
