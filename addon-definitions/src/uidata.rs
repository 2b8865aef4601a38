//! The lightweight catalog-listing view of an addon (spec.md §3 `UIData`,
//! §4.3 "UIData build").

use serde_json::Value;

use crate::meta::Meta;

/// A definition discovered while building `UIData`, parsed just enough
/// to report its `kind` and `name` -- not its full body (that's an
/// `InstallPackage` concern).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefinitionSummary {
    pub name: String,
    pub kind: String,
}

/// The catalog-listing view of an addon: enough to render a UI list and
/// detail page without loading every resource/view template.
#[derive(Clone, Debug)]
pub struct UIData {
    pub meta: Meta,
    /// OpenAPI-ish JSON schema derived from `parameter.cue`, or `None` if
    /// the addon declares no global parameters.
    pub api_schema: Option<Value>,
    pub ui_schemas: Vec<Value>,
    pub readme: Option<String>,
    pub definitions: Vec<DefinitionSummary>,
    /// Raw, unevaluated `parameter.cue` source.
    pub parameters: Option<String>,
    pub registry_name: String,
    /// Sorted, descending, deduplicated. Populated by the resolver/cache
    /// from `crate::version::sort_descending` over every registry that
    /// carries this addon's name.
    pub available_versions: Vec<String>,
}

impl UIData {
    pub fn cache_key(&self) -> String {
        format!("{}-{}", self.meta.name, self.meta.version)
    }

    pub fn latest_alias(name: &str) -> String {
        format!("{}-latest", name)
    }
}
