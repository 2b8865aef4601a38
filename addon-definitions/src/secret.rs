//! Persisted user installation parameters (spec.md §3 `ParameterSecret`,
//! §6 "Parameter secret").

use serde_json::Value;

use crate::labels;

/// The JSON blob stored under `addonParameterDataKey` in a cluster
/// `Secret` named `addon-secret-<name>`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSecret {
    pub addon_name: String,
    pub data: Value,
}

impl ParameterSecret {
    pub fn new(addon_name: impl Into<String>, data: Value) -> ParameterSecret {
        ParameterSecret { addon_name: addon_name.into(), data }
    }

    pub fn empty(addon_name: impl Into<String>) -> ParameterSecret {
        ParameterSecret { addon_name: addon_name.into(), data: Value::Object(Default::default()) }
    }

    pub fn secret_name(&self) -> String {
        labels::parameter_secret_name(&self.addon_name)
    }

    pub fn to_json_string(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(&self.data)?)
    }

    pub fn from_json_str(addon_name: impl Into<String>, raw: &str) -> crate::Result<ParameterSecret> {
        let data: Value = serde_json::from_str(raw)?;
        Ok(ParameterSecret { addon_name: addon_name.into(), data })
    }
}
