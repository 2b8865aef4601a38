//! In-memory reader backed by a buffer list (spec.md §4.1).

use std::collections::BTreeMap;
use std::sync::RwLock;

use addon_definitions::source::{Item, SourceMeta};
use addon_definitions::{AddonError, Result};

use super::Reader;

/// One in-memory file: `name` may be either a bare file name (e.g.
/// `metadata.yaml`) or a fully addon-qualified one (`my-addon/metadata.yaml`).
#[derive(Clone, Debug)]
pub struct MemoryFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// Backed by a flat buffer list; `read_file` accepts both `name-only` and
/// `<addon>/name` forms. `list_addon_meta` populates an internal index so
/// subsequent `read_file` calls are O(1) (spec.md §4.1).
pub struct MemoryReader {
    files: Vec<MemoryFile>,
    index: RwLock<Option<BTreeMap<String, usize>>>,
}

impl MemoryReader {
    pub fn new(files: Vec<MemoryFile>) -> MemoryReader {
        MemoryReader { files, index: RwLock::new(None) }
    }

    fn ensure_index(&self) {
        if self.index.read().unwrap().is_some() {
            return;
        }
        let mut map = BTreeMap::new();
        for (i, f) in self.files.iter().enumerate() {
            map.insert(f.name.clone(), i);
        }
        *self.index.write().unwrap() = Some(map);
    }
}

impl Reader for MemoryReader {
    fn list_addon_meta(&self) -> Result<BTreeMap<String, SourceMeta>> {
        self.ensure_index();
        let mut out: BTreeMap<String, SourceMeta> = BTreeMap::new();
        for f in &self.files {
            // `<addon>/relative/path` -- single-segment names never belong
            // to an addon and are ignored by a bare listing.
            if let Some((addon, _rest)) = f.name.split_once('/') {
                let entry = out.entry(addon.to_string()).or_insert_with(|| SourceMeta::new(addon));
                entry.items.push(Item::file(f.name.clone()));
            }
        }
        Ok(out.into_iter().map(|(k, v)| (k.clone(), v.sorted())).collect())
    }

    fn read_file(&self, relative_path: &str) -> Result<Vec<u8>> {
        self.ensure_index();
        let index = self.index.read().unwrap();
        let index = index.as_ref().unwrap();
        if let Some(i) = index.get(relative_path) {
            return Ok(self.files[*i].data.clone());
        }
        // fall back to a bare-name match against the last path segment
        let bare = relative_path.rsplit('/').next().unwrap_or(relative_path);
        if let Some(i) = index.get(bare) {
            return Ok(self.files[*i].data.clone());
        }
        bail!(AddonError::not_found("file", relative_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_bare_and_qualified_names() {
        let reader = MemoryReader::new(vec![
            MemoryFile { name: "demo/metadata.yaml".into(), data: b"name: demo\nversion: 1.0.0\n".to_vec() },
        ]);
        assert!(reader.read_file("demo/metadata.yaml").is_ok());
        assert!(reader.read_file("metadata.yaml").is_ok());
        assert!(reader.read_file("missing.yaml").is_err());
    }

    #[test]
    fn lists_addons_from_qualified_names() {
        let reader = MemoryReader::new(vec![
            MemoryFile { name: "demo/metadata.yaml".into(), data: vec![] },
            MemoryFile { name: "demo/resources/deploy.cue".into(), data: vec![] },
            MemoryFile { name: "other/metadata.yaml".into(), data: vec![] },
        ]);
        let listing = reader.list_addon_meta().unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing["demo"].items.len(), 2);
    }
}
