//! The materialized, renderable bundle of an addon (spec.md §3
//! `InstallPackage`, §4.3 "InstallPackage build").

use crate::application::Application;
use crate::meta::Meta;
use crate::source::SourceMeta;
use crate::uidata::UIData;

/// A named text blob -- one file's worth of CUE/YAML source, kept
/// verbatim so the renderer can evaluate or inline it later.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementFile {
    pub name: String,
    pub data: String,
}

impl ElementFile {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> ElementFile {
        ElementFile { name: name.into(), data: data.into() }
    }
}

/// What an app template resolves to before rendering: either the raw CUE
/// source to evaluate, a parsed YAML `Application` object, or the
/// skeleton default (spec.md §4.7 "App template").
#[derive(Clone, Debug)]
pub enum AppTemplate {
    Cue(String),
    Yaml(Application),
    Default,
}

/// The fully materialized bundle of one addon's files, assembled on
/// demand by `crate::package::load_install_package` (addon-core) and
/// consumed only by the renderer. Never cached (spec.md §4.4).
#[derive(Clone, Debug)]
pub struct InstallPackage {
    pub ui: UIData,
    pub source: SourceMeta,
    pub cue_resources: Vec<ElementFile>,
    pub yaml_resources: Vec<ElementFile>,
    pub cue_views: Vec<ElementFile>,
    pub yaml_views: Vec<ElementFile>,
    pub cue_definitions: Vec<ElementFile>,
    pub yaml_definitions: Vec<ElementFile>,
    pub ui_schemas: Vec<ElementFile>,
    pub app_template: AppTemplate,
}

impl InstallPackage {
    pub fn meta(&self) -> &Meta {
        &self.ui.meta
    }
}
