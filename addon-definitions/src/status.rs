//! Derived enable/disable phase for an addon (spec.md §3 `Status`, §4.9
//! "Status reader").

use std::collections::BTreeMap;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Disabled,
    Enabling,
    Enabled,
    Suspend,
    Disabling,
}

impl Phase {
    /// Maps an `Application.status.phase` string to our `Phase`, per
    /// spec.md §8 scenario 6: `Running -> enabled`, `Deleting ->
    /// disabling`, anything else (including `Rendering`) -> `enabling`.
    pub fn from_application_phase(raw: &str) -> Phase {
        match raw {
            "running" | "Running" => Phase::Enabled,
            "deleting" | "Deleting" => Phase::Disabling,
            _ => Phase::Enabling,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Phase::Disabled => "disabled",
            Phase::Enabling => "enabling",
            Phase::Enabled => "enabled",
            Phase::Suspend => "suspend",
            Phase::Disabling => "disabling",
        };
        write!(f, "{}", s)
    }
}

/// Derived phase plus enrichment from labels and the parameter secret.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Status {
    pub phase: Option<Phase>,
    pub installed_version: Option<String>,
    pub installed_registry: Option<String>,
    pub merged_parameters: Option<Value>,
    /// Cluster name -> applied-resource summary, keyed the same way the
    /// `Application`'s own per-cluster status is.
    pub per_cluster: BTreeMap<String, Value>,
}

impl Default for Phase {
    fn default() -> Phase {
        Phase::Disabled
    }
}

impl Status {
    pub fn disabled() -> Status {
        Status { phase: Some(Phase::Disabled), ..Default::default() }
    }
}
