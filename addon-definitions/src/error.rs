//! Error taxonomy for the addon package manager core.
//!
//! Follows the same boilerplate `failure::Context` wrapping the teacher's
//! `vault.rs` and `helm/mod.rs` modules use: a plain `Fail`-deriving enum
//! carries the discriminant and display message, and a thin wrapper struct
//! gives it a backtrace and a `cause()` chain.

use std::fmt::{self, Display};
use failure::{Backtrace, Context, Fail};

/// One error kind from spec.md §7.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum AddonErrorKind {
    #[fail(display = "no such {} named '{}'", kind, name)]
    NotFound { kind: &'static str, name: String },

    #[fail(display = "registry '{}' does not exist", _0)]
    RegistryNotExist(String),

    #[fail(display = "invalid package: {}", _0)]
    InvalidPackage(String),

    #[fail(display = "platform version mismatch: require {}, installed {}", required, installed)]
    VersionUnmatch { required: String, installed: String },

    #[fail(display = "dependency '{}' of addon '{}' could not be resolved: {}", dep, addon, reason)]
    DependencyUnresolvable { addon: String, dep: String, reason: String },

    #[fail(display = "definition '{}' already owned by addon '{}'", definition, owning_addon)]
    Conflict { definition: String, owning_addon: String },

    #[fail(display = "in use by {} application(s): {}", _0, _1)]
    InUse(usize, String),

    #[fail(display = "failed to parse {}: {}", what, cause)]
    Parse { what: String, cause: String },

    #[fail(display = "transport error: {}", _0)]
    Transport(String),
}

/// The public error type every subsystem entry point returns.
#[derive(Debug)]
pub struct AddonError {
    inner: Context<AddonErrorKind>,
}

impl AddonError {
    pub fn kind(&self) -> &AddonErrorKind {
        self.inner.get_context()
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> AddonError {
        AddonErrorKind::NotFound { kind, name: name.into() }.into()
    }

    pub fn registry_not_exist(name: impl Into<String>) -> AddonError {
        AddonErrorKind::RegistryNotExist(name.into()).into()
    }

    pub fn invalid_package(reason: impl Into<String>) -> AddonError {
        AddonErrorKind::InvalidPackage(reason.into()).into()
    }

    pub fn version_unmatch(required: impl Into<String>, installed: impl Into<String>) -> AddonError {
        AddonErrorKind::VersionUnmatch { required: required.into(), installed: installed.into() }.into()
    }

    pub fn dependency_unresolvable(
        addon: impl Into<String>,
        dep: impl Into<String>,
        reason: impl Into<String>,
    ) -> AddonError {
        AddonErrorKind::DependencyUnresolvable {
            addon: addon.into(),
            dep: dep.into(),
            reason: reason.into(),
        }
        .into()
    }

    pub fn conflict(definition: impl Into<String>, owning_addon: impl Into<String>) -> AddonError {
        AddonErrorKind::Conflict { definition: definition.into(), owning_addon: owning_addon.into() }.into()
    }

    /// `applications` is truncated to 3 entries with a `"... and N more"` tail,
    /// per spec.md §4.6.
    pub fn in_use(mut applications: Vec<String>) -> AddonError {
        let total = applications.len();
        if applications.len() > 3 {
            applications.truncate(3);
            applications.push(format!("... and {} more", total - 3));
        }
        AddonErrorKind::InUse(total, applications.join(", ")).into()
    }

    pub fn parse(what: impl Into<String>, cause: impl Display) -> AddonError {
        AddonErrorKind::Parse { what: what.into(), cause: cause.to_string() }.into()
    }

    pub fn transport(cause: impl Display) -> AddonError {
        AddonErrorKind::Transport(cause.to_string()).into()
    }
}

impl Fail for AddonError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for AddonError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl From<AddonErrorKind> for AddonError {
    fn from(kind: AddonErrorKind) -> AddonError {
        AddonError { inner: Context::new(kind) }
    }
}

impl From<Context<AddonErrorKind>> for AddonError {
    fn from(inner: Context<AddonErrorKind>) -> AddonError {
        AddonError { inner }
    }
}

/// Aggregates several failures into one, preserving every entry instead of
/// collapsing them into a joined string. Used by the classifier (per-file
/// parse failures), the resolver (per-dependency failures), and anywhere
/// else spec.md §7 calls for "no short-circuit" behavior.
#[derive(Debug)]
pub struct MultiError {
    context: String,
    errors: Vec<failure::Error>,
}

impl Fail for MultiError {}

impl MultiError {
    pub fn new(context: impl Into<String>) -> MultiError {
        MultiError { context: context.into(), errors: Vec::new() }
    }

    pub fn push(&mut self, err: failure::Error) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[failure::Error] {
        &self.errors
    }

    /// Consumes `self`, handing back the individual errors so a caller
    /// can fold them into a differently-scoped `MultiError`.
    pub fn into_errors(self) -> Vec<failure::Error> {
        self.errors
    }

    /// Turns an accumulated set of errors into a `Result`, consuming `self`.
    /// Returns `Ok(())` when nothing was pushed.
    pub fn into_result(self) -> Result<(), MultiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}: {} error(s)", self.context, self.errors.len())?;
        for (i, e) in self.errors.iter().enumerate() {
            writeln!(f, "  [{}] {}", i + 1, e)?;
        }
        Ok(())
    }
}
