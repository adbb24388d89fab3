//! Import specifier classification.
//!
//! Decides, without touching the filesystem, whether an import is a
//! relative/absolute local import, a Node builtin, or a reference to an
//! external package. Only external references are candidates for
//! instrumentation; for those the package name and sub-path are
//! extracted so the rest of the pipeline can look up the installed
//! version and the registry.

/// Node builtin module names (without the `node:` prefix).
///
/// Builtins are deliberately not intercepted: the tracing SDK patches
/// them directly at process start, which still works for non-bundled
/// builtins.
pub const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// An external package reference split into its package name and the
/// remainder after the package root.
///
/// Invariant: `package` is non-empty and does not start with `.` or `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedModule {
    /// Package name, including the scope for `@scope/name` packages.
    pub package: String,
    /// Sub-path after the package root; empty for root imports.
    pub sub_path: String,
}

impl ExtractedModule {
    /// The canonical import string: `package` or `package/sub_path`.
    #[must_use]
    pub fn import_path(&self) -> String {
        if self.sub_path.is_empty() {
            self.package.clone()
        } else {
            format!("{}/{}", self.package, self.sub_path)
        }
    }
}

/// What kind of import a specifier is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Relative (`./x`, `../x`) or absolute (`/x`) import.
    Local,
    /// Node builtin (`fs`, `node:fs`, `fs/promises`, ...).
    Builtin,
    /// External package reference.
    External(ExtractedModule),
}

/// Classify an import specifier.
///
/// Returns `None` for syntactically malformed specifiers (empty string,
/// a scoped name missing its `/name` segment). Callers treat `None` as
/// "skip, do not intercept" — an unrecognized import must never break
/// the build.
#[must_use]
pub fn classify(specifier: &str) -> Option<Classification> {
    if specifier.is_empty() {
        return None;
    }

    if specifier.starts_with('.') || specifier.starts_with('/') {
        return Some(Classification::Local);
    }

    if is_builtin(specifier) {
        return Some(Classification::Builtin);
    }

    let extracted = extract_package_and_sub_path(specifier)?;
    Some(Classification::External(extracted))
}

/// Check whether a specifier names a Node builtin.
///
/// Accepts the `node:` prefix and sub-paths of builtins such as
/// `fs/promises`.
#[must_use]
pub fn is_builtin(specifier: &str) -> bool {
    let spec = specifier.strip_prefix("node:").unwrap_or(specifier);
    let root = spec.split('/').next().unwrap_or(spec);
    specifier.starts_with("node:") || NODE_BUILTINS.contains(&root)
}

/// Split a bare specifier into package name and sub-path.
///
/// Scoped packages keep `@scope/name` together as the package name.
fn extract_package_and_sub_path(specifier: &str) -> Option<ExtractedModule> {
    if specifier.starts_with('@') {
        // Scoped package: @scope/name or @scope/name/sub/path
        let mut parts = specifier.splitn(3, '/');
        let scope = parts.next()?;
        let name = parts.next()?;
        if name.is_empty() {
            return None;
        }
        Some(ExtractedModule {
            package: format!("{scope}/{name}"),
            sub_path: parts.next().unwrap_or("").to_string(),
        })
    } else {
        let mut parts = specifier.splitn(2, '/');
        let package = parts.next()?.to_string();
        if package.is_empty() {
            return None;
        }
        Some(ExtractedModule {
            package,
            sub_path: parts.next().unwrap_or("").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_specifiers() {
        assert_eq!(classify("./utils"), Some(Classification::Local));
        assert_eq!(classify("../lib/foo"), Some(Classification::Local));
        assert_eq!(classify("/abs/path"), Some(Classification::Local));
    }

    #[test]
    fn test_builtin_specifiers() {
        assert_eq!(classify("fs"), Some(Classification::Builtin));
        assert_eq!(classify("node:fs"), Some(Classification::Builtin));
        assert_eq!(classify("fs/promises"), Some(Classification::Builtin));
        assert_eq!(classify("node:test"), Some(Classification::Builtin));
    }

    #[test]
    fn test_external_bare() {
        let Classification::External(m) = classify("express").unwrap() else {
            panic!("expected external");
        };
        assert_eq!(m.package, "express");
        assert_eq!(m.sub_path, "");
        assert_eq!(m.import_path(), "express");
    }

    #[test]
    fn test_external_with_sub_path() {
        let Classification::External(m) = classify("express/lib/router").unwrap() else {
            panic!("expected external");
        };
        assert_eq!(m.package, "express");
        assert_eq!(m.sub_path, "lib/router");
        assert_eq!(m.import_path(), "express/lib/router");
    }

    #[test]
    fn test_scoped_package() {
        let Classification::External(m) = classify("@opentelemetry/api").unwrap() else {
            panic!("expected external");
        };
        assert_eq!(m.package, "@opentelemetry/api");
        assert_eq!(m.sub_path, "");

        let Classification::External(m) = classify("@babel/core/lib/parse").unwrap() else {
            panic!("expected external");
        };
        assert_eq!(m.package, "@babel/core");
        assert_eq!(m.sub_path, "lib/parse");
    }

    #[test]
    fn test_malformed_specifiers() {
        assert_eq!(classify(""), None);
        assert_eq!(classify("@scope"), None);
        assert_eq!(classify("@scope/"), None);
    }

    #[test]
    fn test_package_invariant() {
        // External packages never start with `.` or `/`
        for spec in ["express", "@scope/pkg", "kafkajs/lib/producer"] {
            if let Some(Classification::External(m)) = classify(spec) {
                assert!(!m.package.is_empty());
                assert!(!m.package.starts_with('.'));
                assert!(!m.package.starts_with('/'));
            }
        }
    }
}
