//! Module resolution seam.
//!
//! The bundler owns the dependency graph and its resolution algorithm;
//! the pipeline only needs a way to turn a specifier plus a resolving
//! directory into an absolute file path. [`ModuleResolver`] is that
//! seam. [`NodeResolver`] is a default Node-style implementation used by
//! tests and standalone embeddings; a bundler host should supply its own
//! implementation so workspace and hoisted layouts resolve identically
//! to the bundle itself.

use serde_json::Value;
use std::path::{Path, PathBuf};

/// Extensions probed when a specifier has none.
const EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".ts", ".tsx", ".jsx", ".json"];

/// Resolves an import specifier to an absolute file path.
///
/// Returning `None` means "not resolvable"; the caller fails open and
/// leaves the import untouched.
pub trait ModuleResolver: Send + Sync {
    fn resolve(&self, specifier: &str, resolve_dir: &Path) -> Option<PathBuf>;
}

/// Node-style resolver: relative and absolute paths with extension
/// probing, `node_modules` walk-up for bare specifiers, and simplified
/// package.json entry selection (`exports` root, `module`, `main`,
/// `index.js`).
#[derive(Debug, Default)]
pub struct NodeResolver;

impl NodeResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn resolve_file(target: &Path) -> Option<PathBuf> {
        if target.is_file() {
            return dunce::canonicalize(target).ok();
        }
        for ext in EXTENSIONS {
            let with_ext = PathBuf::from(format!("{}{ext}", target.display()));
            if with_ext.is_file() {
                return dunce::canonicalize(with_ext).ok();
            }
        }
        if target.is_dir() {
            for index in &["index.js", "index.mjs", "index.ts"] {
                let index_path = target.join(index);
                if index_path.is_file() {
                    return dunce::canonicalize(index_path).ok();
                }
            }
        }
        None
    }

    /// Walk up from `resolve_dir` looking for `node_modules/<package>`.
    fn locate_package_dir(package: &str, resolve_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(resolve_dir);
        while let Some(dir) = current {
            let candidate = dir.join("node_modules").join(package);
            if candidate.is_dir() {
                return Some(candidate);
            }
            current = dir.parent();
        }
        None
    }

    /// Pick the entry point of a package from its package.json.
    fn resolve_package_entry(pkg_dir: &Path) -> Option<PathBuf> {
        let descriptor = pkg_dir.join("package.json");
        if let Ok(content) = std::fs::read_to_string(&descriptor) {
            if let Ok(json) = serde_json::from_str::<Value>(&content) {
                if let Some(entry) = Self::entry_from_descriptor(&json) {
                    if let Some(found) = Self::resolve_file(&pkg_dir.join(entry)) {
                        return Some(found);
                    }
                }
            }
        }
        Self::resolve_file(&pkg_dir.join("index"))
    }

    fn entry_from_descriptor(json: &Value) -> Option<String> {
        // exports["."] (string form or conditional object), then module, then main
        if let Some(exports) = json.get("exports") {
            if let Some(entry) = Self::exports_root(exports) {
                return Some(entry);
            }
        }
        if let Some(module) = json.get("module").and_then(Value::as_str) {
            return Some(module.to_string());
        }
        json.get("main").and_then(Value::as_str).map(String::from)
    }

    fn exports_root(exports: &Value) -> Option<String> {
        match exports {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => {
                let root = map.get(".").unwrap_or(exports);
                match root {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(conditions) => conditions
                        .get("require")
                        .or_else(|| conditions.get("default"))
                        .or_else(|| conditions.get("import"))
                        .and_then(Self::exports_root),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl ModuleResolver for NodeResolver {
    fn resolve(&self, specifier: &str, resolve_dir: &Path) -> Option<PathBuf> {
        if specifier.starts_with('.') {
            return Self::resolve_file(&resolve_dir.join(specifier));
        }
        if specifier.starts_with('/') {
            return Self::resolve_file(Path::new(specifier));
        }

        let (package, sub_path) = match crate::specifier::classify(specifier)? {
            crate::specifier::Classification::External(m) => (m.package, m.sub_path),
            _ => return None,
        };

        let pkg_dir = Self::locate_package_dir(&package, resolve_dir)?;
        if sub_path.is_empty() {
            Self::resolve_package_entry(&pkg_dir)
        } else {
            Self::resolve_file(&pkg_dir.join(sub_path))
        }
    }
}
