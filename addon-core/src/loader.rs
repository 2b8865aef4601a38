//! Assembles a `Reader` + `SourceMeta` into `UIData`/`InstallPackage`
//! (spec.md §4.3).

use addon_definitions::application::Application;
use addon_definitions::classifier::{self, Bucket, Format};
use addon_definitions::error::AddonError;
use addon_definitions::meta::Meta;
use addon_definitions::package::{AppTemplate, ElementFile, InstallPackage};
use addon_definitions::source::SourceMeta;
use addon_definitions::uidata::{DefinitionSummary, UIData};
use addon_definitions::{MultiError, Result};

use crate::reader::Reader;
use crate::renderer::cue;

fn read_text(reader: &dyn Reader, path: &str) -> Result<String> {
    let bytes = reader.read_file(path)?;
    String::from_utf8(bytes).map_err(|e| AddonError::parse(path, e).into())
}

struct Buckets {
    classified: Vec<addon_definitions::classifier::ClassifiedItem>,
}

impl Buckets {
    fn new(source: &SourceMeta) -> Buckets {
        let classified = classifier::classify(&source.name, &source.items);
        Buckets { classified }
    }

    fn find_one(&self, bucket: Bucket) -> Option<&str> {
        self.classified.iter().find(|c| c.bucket == bucket).map(|c| c.item.path.as_str())
    }

    fn find_all(&self, pred: impl Fn(Bucket) -> bool) -> Vec<&str> {
        self.classified.iter().filter(|c| pred(c.bucket)).map(|c| c.item.path.as_str()).collect()
    }
}

/// Builds the catalog-listing view of one addon (spec.md §4.3 "UIData
/// build"). Per-definition parse failures are recorded in the returned
/// `MultiError` rather than aborting the build; a missing or unparseable
/// `metadata.yaml` is the only hard failure.
pub fn load_ui_data(reader: &dyn Reader, source: &SourceMeta, registry_name: &str) -> Result<(UIData, MultiError)> {
    let buckets = Buckets::new(source);
    let mut errors = MultiError::new(format!("loading addon '{}'", source.name));

    let metadata_path = buckets
        .find_one(Bucket::Metadata)
        .ok_or_else(|| AddonError::invalid_package(format!("addon '{}' has no metadata.yaml", source.name)))?;
    let meta = Meta::parse(&read_text(reader, metadata_path)?)?;

    let readme = buckets.find_one(Bucket::Detail).and_then(|p| read_text(reader, p).ok());

    let parameters = buckets.find_one(Bucket::GlobalParameter).map(|p| read_text(reader, p)).transpose()?;
    let api_schema = match &parameters {
        Some(raw) => match cue::parse_parameter_schema(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                errors.push(AddonError::invalid_package(format!("addon '{}' parameter.cue: {}", meta.name, e)).into());
                None
            }
        },
        None => None,
    };

    let mut ui_schemas = Vec::new();
    for path in buckets.find_all(|b| b == Bucket::UISchema) {
        match read_text(reader, path).and_then(|raw| serde_yaml::from_str(&raw).map_err(|e| AddonError::parse(path, e).into())) {
            Ok(v) => ui_schemas.push(v),
            Err(e) => errors.push(e),
        }
    }

    let mut definitions = Vec::new();
    for path in buckets.find_all(|b| matches!(b, Bucket::Definition(_))) {
        match summarize_definition(reader, path) {
            Ok(d) => definitions.push(d),
            Err(e) => errors.push(e),
        }
    }

    let ui = UIData {
        meta,
        api_schema,
        ui_schemas,
        readme,
        definitions,
        parameters,
        registry_name: registry_name.to_string(),
        available_versions: Vec::new(),
    };
    Ok((ui, errors))
}

fn summarize_definition(reader: &dyn Reader, path: &str) -> Result<DefinitionSummary> {
    let raw = read_text(reader, path)?;
    let value = if path.ends_with(".cue") {
        cue::parse_document(&raw, &serde_json::Value::Null).map_err(|e| AddonError::parse(path, e))?
    } else {
        serde_yaml::from_str(&raw).map_err(|e| AddonError::parse(path, e))?
    };
    let kind = value.get("kind").and_then(|v| v.as_str()).unwrap_or("Unknown").to_string();
    let name = value
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| AddonError::invalid_package(format!("definition '{}' has no metadata.name", path)))?
        .to_string();
    Ok(DefinitionSummary { name, kind })
}

/// Builds the full, renderable bundle of one addon (spec.md §4.3
/// "InstallPackage build"). Starts from `load_ui_data`; additionally
/// loads resources, views, and the app template.
pub fn load_install_package(reader: &dyn Reader, source: &SourceMeta, registry_name: &str) -> Result<(InstallPackage, MultiError)> {
    let (ui, errors) = load_ui_data(reader, source, registry_name)?;
    let buckets = Buckets::new(source);

    let mut cue_resources = Vec::new();
    let mut yaml_resources = Vec::new();
    for c in buckets.classified.iter().filter(|c| matches!(c.bucket, Bucket::Resource(_))) {
        let file = element_file(reader, &c.item.path)?;
        match c.bucket {
            Bucket::Resource(Format::Cue) => cue_resources.push(file),
            _ => yaml_resources.push(file),
        }
    }

    let mut cue_views = Vec::new();
    let mut yaml_views = Vec::new();
    for c in buckets.classified.iter().filter(|c| matches!(c.bucket, Bucket::View(_))) {
        let file = element_file(reader, &c.item.path)?;
        match c.bucket {
            Bucket::View(Format::Cue) => cue_views.push(file),
            _ => yaml_views.push(file),
        }
    }

    let mut cue_definitions = Vec::new();
    let mut yaml_definitions = Vec::new();
    for c in buckets.classified.iter().filter(|c| matches!(c.bucket, Bucket::Definition(_))) {
        let file = element_file(reader, &c.item.path)?;
        match c.bucket {
            Bucket::Definition(Format::Cue) => cue_definitions.push(file),
            _ => yaml_definitions.push(file),
        }
    }

    let mut ui_schema_files = Vec::new();
    for path in buckets.find_all(|b| b == Bucket::UISchema) {
        ui_schema_files.push(element_file(reader, path)?);
    }

    let cue_template = buckets.find_one(Bucket::AppTemplate(Format::Cue)).map(str::to_string);
    let yaml_template = buckets.find_one(Bucket::AppTemplate(Format::Yaml)).map(str::to_string);
    let app_template = match (cue_template, yaml_template) {
        (Some(_), Some(_)) => {
            return Err(AddonError::invalid_package(format!(
                "addon '{}' ships both template.cue and template.yaml",
                ui.meta.name
            ))
            .into())
        }
        (Some(path), None) => AppTemplate::Cue(read_text(reader, &path)?),
        (None, Some(path)) => {
            let raw = read_text(reader, &path)?;
            let value: serde_json::Value = serde_yaml::from_str(&raw).map_err(|e| AddonError::parse(&path, e))?;
            AppTemplate::Yaml(Application::from_manifest(&value)?)
        }
        (None, None) => AppTemplate::Default,
    };

    let pkg = InstallPackage {
        ui,
        source: source.clone(),
        cue_resources,
        yaml_resources,
        cue_views,
        yaml_views,
        cue_definitions,
        yaml_definitions,
        ui_schemas: ui_schema_files,
        app_template,
    };
    Ok((pkg, errors))
}

fn element_file(reader: &dyn Reader, path: &str) -> Result<ElementFile> {
    Ok(ElementFile::new(path.to_string(), read_text(reader, path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::memory::{MemoryFile, MemoryReader};

    fn reader_with(files: Vec<(&str, &str)>) -> MemoryReader {
        MemoryReader::new(files.into_iter().map(|(n, d)| MemoryFile { name: n.to_string(), data: d.as_bytes().to_vec() }).collect())
    }

    #[test]
    fn loads_ui_data_from_minimal_addon() {
        let reader = reader_with(vec![("demo/metadata.yaml", "name: demo\nversion: 1.0.0\n")]);
        let source = reader.list_addon_meta().unwrap().remove("demo").unwrap();
        let (ui, errors) = load_ui_data(&reader, &source, "official").unwrap();
        assert_eq!(ui.meta.name, "demo");
        assert_eq!(ui.registry_name, "official");
        assert!(errors.is_empty());
    }

    #[test]
    fn missing_metadata_is_a_hard_failure() {
        let reader = reader_with(vec![("demo/resources/deploy.cue", "output: {}")]);
        let mut source = SourceMeta::new("demo");
        source.items.push(addon_definitions::source::Item::file("demo/resources/deploy.cue"));
        assert!(load_ui_data(&reader, &source, "official").is_err());
    }

    #[test]
    fn install_package_rejects_both_app_template_formats() {
        let reader = reader_with(vec![
            ("demo/metadata.yaml", "name: demo\nversion: 1.0.0\n"),
            ("demo/template.cue", "output: {}"),
            ("demo/template.yaml", "apiVersion: core.oam.dev/v1beta1\nkind: Application\nmetadata: {name: addon-demo}\nspec: {components: []}\n"),
        ]);
        let mut source = SourceMeta::new("demo");
        source.items.push(addon_definitions::source::Item::file("demo/metadata.yaml"));
        source.items.push(addon_definitions::source::Item::file("demo/template.cue"));
        source.items.push(addon_definitions::source::Item::file("demo/template.yaml"));
        assert!(load_install_package(&reader, &source, "official").is_err());
    }

    #[test]
    fn install_package_parses_yaml_app_template() {
        let reader = reader_with(vec![
            ("demo/metadata.yaml", "name: demo\nversion: 1.0.0\n"),
            ("demo/template.yaml", "apiVersion: core.oam.dev/v1beta1\nkind: Application\nmetadata: {name: addon-demo}\nspec: {components: []}\n"),
        ]);
        let mut source = SourceMeta::new("demo");
        source.items.push(addon_definitions::source::Item::file("demo/metadata.yaml"));
        source.items.push(addon_definitions::source::Item::file("demo/template.yaml"));
        let (pkg, _) = load_install_package(&reader, &source, "official").unwrap();
        assert!(matches!(pkg.app_template, AppTemplate::Yaml(_)));
    }
}
