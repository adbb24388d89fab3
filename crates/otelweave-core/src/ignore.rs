//! Ignore policy.
//!
//! Runs before any I/O on every import edge. Pure and synchronous:
//! a decision here must never suspend or touch the filesystem.

use crate::plugin::{OnResolveArgs, FILE_NAMESPACE};

/// Caller-configured exemptions from interception.
#[derive(Debug, Clone, Default)]
pub struct IgnorePolicy {
    /// Specifiers treated as external and never intercepted.
    pub external_modules: Vec<String>,
    /// Prefixes of specifiers or importers to leave alone.
    pub path_prefixes: Vec<String>,
}

impl IgnorePolicy {
    #[must_use]
    pub fn new(external_modules: Vec<String>, path_prefixes: Vec<String>) -> Self {
        Self {
            external_modules,
            path_prefixes,
        }
    }

    /// Whether this edge is exempt from interception.
    ///
    /// True when the edge was produced by another plugin (non-file
    /// namespace), the specifier is on the external-module list, or the
    /// specifier or importer matches a configured path prefix.
    #[must_use]
    pub fn should_ignore(&self, args: &OnResolveArgs) -> bool {
        if args.namespace != FILE_NAMESPACE {
            return true;
        }
        if self.external_modules.iter().any(|m| m == &args.path) {
            return true;
        }
        self.path_prefixes
            .iter()
            .any(|prefix| args.path.starts_with(prefix) || args.importer.starts_with(prefix))
    }
}
