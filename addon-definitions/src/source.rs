//! One addon's file inventory in a registry (spec.md §3 `SourceMeta`).

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemType {
    File,
    Dir,
}

/// A single entry returned by a reader's listing call. `path` is relative
/// to the registry root (first segment is the addon name, per spec.md §4.1
/// `relativePath`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub path: String,
    pub ty: ItemType,
    pub name: String,
}

impl Item {
    pub fn file(path: impl Into<String>) -> Item {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Item { path, ty: ItemType::File, name }
    }

    pub fn dir(path: impl Into<String>) -> Item {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Item { path, ty: ItemType::Dir, name }
    }

    /// The path with the leading `<addon-name>/` segment stripped, i.e.
    /// the path the classifier matches against.
    pub fn relative_to(&self, addon_name: &str) -> String {
        let prefix = format!("{}/", addon_name);
        self.path.strip_prefix(&prefix).unwrap_or(&self.path).to_string()
    }
}

/// One addon's file inventory, as produced by `Reader::listAddonMeta`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SourceMeta {
    pub name: String,
    pub items: Vec<Item>,
}

impl SourceMeta {
    pub fn new(name: impl Into<String>) -> SourceMeta {
        SourceMeta { name: name.into(), items: Vec::new() }
    }

    /// Items within an addon are sorted lexicographically by path
    /// (spec.md §4.1 object-store contract, applied uniformly so every
    /// backend behaves the same way for the classifier).
    pub fn sorted(mut self) -> SourceMeta {
        self.items.sort_by(|a, b| a.path.cmp(&b.path));
        self
    }

    pub fn has_metadata(&self) -> bool {
        self.items.iter().any(|i| i.ty == ItemType::File && i.relative_to(&self.name) == "metadata.yaml")
    }
}
