//! Local directory reader: a recursive walk of a directory tree where
//! each top-level subdirectory is one addon (spec.md §4.1).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use addon_definitions::source::{Item, SourceMeta};
use addon_definitions::{AddonError, Result};
use walkdir::WalkDir;

use super::Reader;

pub struct LocalReader {
    root: PathBuf,
}

impl LocalReader {
    pub fn new(root: impl Into<PathBuf>) -> LocalReader {
        LocalReader { root: root.into() }
    }
}

impl Reader for LocalReader {
    fn list_addon_meta(&self) -> Result<BTreeMap<String, SourceMeta>> {
        let mut out: BTreeMap<String, SourceMeta> = BTreeMap::new();
        for entry in WalkDir::new(&self.root).min_depth(1).into_iter() {
            let entry = entry.map_err(|e| AddonError::transport(e))?;
            let rel = entry.path().strip_prefix(&self.root).map_err(|e| AddonError::transport(e))?;
            let Some(addon) = rel.components().next() else { continue };
            let addon_name = addon.as_os_str().to_string_lossy().to_string();
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            let entry_rec = out.entry(addon_name.clone()).or_insert_with(|| SourceMeta::new(&addon_name));
            if entry.file_type().is_dir() {
                if rel.components().count() > 1 {
                    entry_rec.items.push(Item::dir(rel_str));
                }
            } else {
                entry_rec.items.push(Item::file(rel_str));
            }
        }
        // items not matching any classifier pattern simply stay in the
        // bucketed package as "ignored" -- the walk itself never filters.
        Ok(out.into_iter().map(|(k, v)| (k.clone(), v.sorted())).collect())
    }

    fn read_file(&self, relative_path: &str) -> Result<Vec<u8>> {
        let path: &Path = Path::new(relative_path);
        let full = self.root.join(path);
        fs::read(&full).map_err(|e| AddonError::transport(format!("{}: {}", full.display(), e)).into())
    }
}
