#![allow(non_snake_case)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

#[macro_use]
extern crate log;

extern crate regex;
extern crate semver;
extern crate base64;
extern crate url;

#[macro_use]
extern crate failure;

pub use failure::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every subsystem (readers, resolver, renderer,
/// installer). See `error::AddonError` for the full set of kinds.
pub mod error;
pub use error::{AddonError, MultiError};

/// Parsed `metadata.yaml` and the small value types it is built from.
pub mod meta;
pub use meta::{DeployTo, Dependency, Meta, SystemRequirements};

/// Registry configuration: the backend union and its configmap document.
pub mod registry;
pub use registry::{Registry, RegistryConfigDocument};

/// One addon's file inventory as produced by a reader's listing call.
pub mod source;
pub use source::{Item, ItemType, SourceMeta};

/// Deterministic path-to-bucket classification of a `SourceMeta`'s items.
pub mod classifier;
pub use classifier::{classify, Bucket, ClassifiedItem};

/// The lightweight catalog-listing view of an addon.
pub mod uidata;
pub use uidata::UIData;

/// The fully materialized, renderable bundle of an addon.
pub mod package;
pub use package::{ElementFile, InstallPackage};

/// The composite cluster object an installer produces.
pub mod application;
pub use application::{Application, Component, Policy, TopologyPolicySpec, Workflow};

/// Persisted installation parameters.
pub mod secret;
pub use secret::ParameterSecret;

/// Derived enable/disable phase for an addon.
pub mod status;
pub use status::{Phase, Status};

/// Semver-ish version normalization, descending ordering, and range
/// satisfaction -- the engine behind dependency resolution and platform
/// version gates.
pub mod version;

/// Deep-merge of user argument maps over previously stored ones.
pub mod merge;

/// Namespaced well-known label/annotation keys used on the produced
/// `Application`.
pub mod labels;
