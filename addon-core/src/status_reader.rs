//! Derives an addon's phase from its `Application` and parameter secret
//! (spec.md §4.9).

use std::collections::BTreeMap;

use addon_definitions::labels;
use addon_definitions::status::{Phase, Status};
use addon_definitions::Result;
use serde_json::Value;

use crate::kube_client::KubeClient;

/// The two cluster reads this needs, pulled out of `KubeClient` the same
/// way `crate::platform::PlatformInfo` does, so the derivation logic can
/// be tested without a live cluster.
pub trait StatusSource {
    fn get_application(&self, name: &str, namespace: &str) -> Result<Option<Value>>;
    fn get_secret_value(&self, name: &str, namespace: &str, key: &str) -> Result<Option<String>>;
}

impl StatusSource for KubeClient {
    fn get_application(&self, name: &str, namespace: &str) -> Result<Option<Value>> {
        KubeClient::get_application(self, name, namespace)
    }

    fn get_secret_value(&self, name: &str, namespace: &str, key: &str) -> Result<Option<String>> {
        KubeClient::get_secret_value(self, name, namespace, key)
    }
}

/// Looks up one addon's status (spec.md §4.9, numbered steps).
pub fn status(source: &dyn StatusSource, addon_name: &str) -> Result<Status> {
    let app_name = labels::application_name(addon_name);
    let Some(app) = source.get_application(&app_name, labels::APPLICATION_NAMESPACE)? else {
        // Step 1: Application not found -> disabled.
        return Ok(Status::disabled());
    };

    let phase = derive_phase(&app);
    let installed_version = label(&app, labels::LABEL_VERSION);
    let installed_registry = label(&app, labels::LABEL_REGISTRY);
    let per_cluster = per_cluster_resources(&app);

    // Step 4: enrich with merged parameters from the parameter secret.
    let merged_parameters = source
        .get_secret_value(&labels::parameter_secret_name(addon_name), labels::APPLICATION_NAMESPACE, labels::PARAMETER_SECRET_KEY)?
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok());

    Ok(Status { phase: Some(phase), installed_version, installed_registry, merged_parameters, per_cluster })
}

/// Steps 2-3: suspend takes priority over the raw phase mapping.
fn derive_phase(app: &Value) -> Phase {
    let suspended = app.pointer("/status/workflow/suspend").and_then(Value::as_bool).unwrap_or(false);
    if suspended {
        return Phase::Suspend;
    }
    let raw = app.pointer("/status/phase").and_then(Value::as_str).unwrap_or("");
    Phase::from_application_phase(raw)
}

fn label(app: &Value, key: &str) -> Option<String> {
    app.pointer(&format!("/metadata/labels/{}", escape_pointer_segment(key))).and_then(Value::as_str).map(str::to_string)
}

fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Groups `status.appliedResources` by cluster name into one JSON array
/// per cluster (spec.md §3 `Status` "per-cluster info").
fn per_cluster_resources(app: &Value) -> BTreeMap<String, Value> {
    let mut per_cluster: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    if let Some(resources) = app.pointer("/status/appliedResources").and_then(Value::as_array) {
        for res in resources {
            let cluster = res.get("cluster").and_then(Value::as_str).unwrap_or("local").to_string();
            per_cluster.entry(cluster).or_default().push(res.clone());
        }
    }
    per_cluster.into_iter().map(|(k, v)| (k, Value::Array(v))).collect()
}
