#![allow(non_snake_case)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

extern crate addon_definitions;
pub use addon_definitions::{
    application, classifier, error, labels, merge, meta, package, registry, secret, source, status,
    uidata, version,
};
pub use addon_definitions::{AddonError, Error, MultiError, Result};

/// Per-backend addon listing/reading (spec.md §4.1).
pub mod reader;

/// Assembles a `Reader` + `SourceMeta` into `UIData`/`InstallPackage`
/// (spec.md §4.3).
pub mod loader;

/// Per-process, lock-guarded registry cache with a background refresh
/// loop (spec.md §4.4).
pub mod cache;

/// Dependency resolution and version-constraint satisfaction across
/// installed/available addon sets (spec.md §4.6).
pub mod resolver;

/// CUE-template evaluation, resource inlining, and policy injection
/// (spec.md §4.7).
pub mod renderer;

/// The Kubernetes apply/read boundary: Application CRUD, discovery, and
/// the reverse-dependency scan. The only async corner of this crate --
/// see `kube_client` module docs.
pub mod kube_client;

/// Platform/Kubernetes version gate (spec.md §4.5 "Platform-requirement
/// check").
pub mod platform;

/// `enable`/`disable` state machine (spec.md §4.8).
pub mod installer;

/// Derives an addon's phase from its Application and parameter secret
/// (spec.md §4.9).
pub mod status_reader;
