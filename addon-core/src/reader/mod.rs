//! Polymorphic reader abstraction (spec.md §4.1, §9 "Polymorphic reader").
//!
//! Implemented as a variant over backend kinds rather than an inheritance
//! chain: each backend is a small value type implementing the three-op
//! `Reader` trait, and the classifier/loader above consume only that
//! surface.

use std::collections::BTreeMap;

use addon_definitions::source::{Item, SourceMeta};
use addon_definitions::Result;
use tokio_util::sync::CancellationToken;

pub mod chart;
pub mod git;
pub mod local;
pub mod memory;
pub mod object_store;

pub use chart::{ChartReader, ChartRepo};
pub use git::GitReader;
pub use local::LocalReader;
pub use memory::MemoryReader;
pub use object_store::ObjectStoreReader;

/// Three operations every backend exposes (spec.md §4.1). Readers are
/// stateless beyond their I/O handles -- constructing one never performs
/// I/O except for the Git backend's host validation.
pub trait Reader {
    /// List every addon this registry carries, keyed by addon name.
    fn list_addon_meta(&self) -> Result<BTreeMap<String, SourceMeta>>;

    /// Read one file's bytes by its registry-relative path (the same
    /// path shape `relative_path` produces).
    fn read_file(&self, relative_path: &str) -> Result<Vec<u8>>;

    /// Normalize an item's path so its first segment is the addon name.
    /// The default is a no-op because every backend in this crate already
    /// constructs `Item::path` in that normalized form.
    fn relative_path(&self, item: &Item) -> String {
        item.path.clone()
    }
}

/// Checked between blocking steps of a longer-running reader operation
/// (a multi-file walk, a paginated listing). Readers don't thread a
/// token through every single `read_file` call -- per spec.md §5, only
/// the coarser operations accept one.
pub fn check_cancelled(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        bail!(addon_definitions::AddonError::transport("operation cancelled"));
    }
    Ok(())
}
