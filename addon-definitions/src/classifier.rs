//! Deterministic path-to-bucket classification (spec.md §4.2).
//!
//! Given an item's path (already stripped of its addon-name prefix) and
//! its extension, decide which part of an `InstallPackage` it belongs to.
//! Unknown extensions within a known directory, and paths matching no
//! pattern at all, classify as `Bucket::Ignored` -- the classifier never
//! errors, it just sorts.

use crate::source::Item;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Cue,
    Yaml,
    Markdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    Metadata,
    Detail,
    GlobalParameter,
    AppTemplate(Format),
    Definition(Format),
    UISchema,
    Resource(Format),
    View(Format),
    Ignored,
}

#[derive(Clone, Debug)]
pub struct ClassifiedItem {
    pub item: Item,
    pub bucket: Bucket,
}

fn format_of(path: &str) -> Option<Format> {
    if path.ends_with(".cue") {
        Some(Format::Cue)
    } else if path.ends_with(".yaml") || path.ends_with(".yml") {
        Some(Format::Yaml)
    } else if path.ends_with(".md") {
        Some(Format::Markdown)
    } else {
        None
    }
}

/// Classify one relative path (addon-name prefix already stripped).
pub fn classify_path(relative: &str) -> Bucket {
    match relative {
        "metadata.yaml" => return Bucket::Metadata,
        "README.md" | "readme.md" => return Bucket::Detail,
        "parameter.cue" => return Bucket::GlobalParameter,
        "template.cue" => return Bucket::AppTemplate(Format::Cue),
        "template.yaml" => return Bucket::AppTemplate(Format::Yaml),
        _ => {}
    }

    let mut parts = relative.splitn(2, '/');
    let dir = parts.next().unwrap_or("");
    let rest = parts.next();
    let Some(rest) = rest else { return Bucket::Ignored };
    if rest.is_empty() {
        return Bucket::Ignored;
    }

    match dir {
        "definitions" => match format_of(rest) {
            Some(f @ (Format::Cue | Format::Yaml)) => Bucket::Definition(f),
            _ => Bucket::Ignored,
        },
        "schemas" => match format_of(rest) {
            Some(Format::Yaml) => Bucket::UISchema,
            _ => Bucket::Ignored,
        },
        "resources" => match format_of(rest) {
            Some(f @ (Format::Cue | Format::Yaml)) => Bucket::Resource(f),
            _ => Bucket::Ignored,
        },
        // Unlike `definitions`/`resources`, views are spec'd as `.cue`/`.yaml`
        // only (spec.md §4.2) -- `.yml` does not count.
        "views" => match format_of(rest) {
            Some(Format::Cue) => Bucket::View(Format::Cue),
            Some(Format::Yaml) if rest.ends_with(".yaml") => Bucket::View(Format::Yaml),
            _ => Bucket::Ignored,
        },
        _ => Bucket::Ignored,
    }
}

/// Classify every item of a `SourceMeta`, skipping directory entries
/// (they carry no content of their own -- only their files matter). The
/// result is idempotent and order-independent: running it twice over the
/// same item set produces the same buckets.
pub fn classify(addon_name: &str, items: &[Item]) -> Vec<ClassifiedItem> {
    items
        .iter()
        .filter(|i| i.ty == crate::source::ItemType::File)
        .map(|item| {
            let relative = item.relative_to(addon_name);
            ClassifiedItem { item: item.clone(), bucket: classify_path(&relative) }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Item;

    #[test]
    fn classifies_every_known_pattern() {
        assert_eq!(classify_path("metadata.yaml"), Bucket::Metadata);
        assert_eq!(classify_path("README.md"), Bucket::Detail);
        assert_eq!(classify_path("readme.md"), Bucket::Detail);
        assert_eq!(classify_path("parameter.cue"), Bucket::GlobalParameter);
        assert_eq!(classify_path("template.cue"), Bucket::AppTemplate(Format::Cue));
        assert_eq!(classify_path("template.yaml"), Bucket::AppTemplate(Format::Yaml));
        assert_eq!(classify_path("definitions/trait.cue"), Bucket::Definition(Format::Cue));
        assert_eq!(classify_path("definitions/trait.yml"), Bucket::Definition(Format::Yaml));
        assert_eq!(classify_path("schemas/ui.yaml"), Bucket::UISchema);
        assert_eq!(classify_path("resources/deploy.cue"), Bucket::Resource(Format::Cue));
        assert_eq!(classify_path("views/pods.cue"), Bucket::View(Format::Cue));
        assert_eq!(classify_path("views/pods.yaml"), Bucket::View(Format::Yaml));
    }

    #[test]
    fn ignores_unknown_extensions_and_paths() {
        assert_eq!(classify_path("definitions/notes.txt"), Bucket::Ignored);
        assert_eq!(classify_path("LICENSE"), Bucket::Ignored);
        assert_eq!(classify_path("resources/"), Bucket::Ignored);
    }

    #[test]
    fn views_reject_yml_unlike_definitions_and_resources() {
        assert_eq!(classify_path("views/pods.yml"), Bucket::Ignored);
    }

    #[test]
    fn classify_skips_directory_entries() {
        let items = vec![Item::dir("addon/resources"), Item::file("addon/resources/deploy.cue")];
        let out = classify("addon", &items);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bucket, Bucket::Resource(Format::Cue));
    }
}
