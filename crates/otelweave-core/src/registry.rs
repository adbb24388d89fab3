//! Instrumentation registry.
//!
//! Built once per build invocation from the configured instrumentation
//! definitions. Matching is deterministic: candidates are tried in
//! declaration order, and the first definition whose version range
//! contains the installed version and whose file predicate accepts the
//! import path wins.

use crate::error::Error;
use crate::specifier::ExtractedModule;
use rustc_hash::FxHashMap;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A registered rule describing how to detect and patch one third-party
/// package.
///
/// The patch itself runs in the bundled output: the rewriter emits code
/// that imports `otel_package`, instantiates `otel_class` with the
/// merged constructor args, and applies the instrumentation's patch
/// routine to the captured module exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentationDefinition {
    /// Instrumentation name, e.g. `express`.
    pub name: String,
    /// npm package this instrumentation targets.
    pub target_package: String,
    /// Supported version range, npm syntax (`>=4.0.0 <6`, `^2.0.0`, ...).
    pub version_range: String,
    /// Internal files this instrumentation also patches, as import
    /// paths (`express/lib/router`). Root imports always match.
    #[serde(default)]
    pub files: Vec<String>,
    /// OpenTelemetry instrumentation class, e.g. `ExpressInstrumentation`.
    pub otel_class: String,
    /// Package exporting that class, e.g.
    /// `@opentelemetry/instrumentation-express`.
    pub otel_package: String,
    /// Default constructor args for the instrumentation class.
    #[serde(default)]
    pub default_config: Value,
}

/// Package-name index over the configured definitions.
///
/// A package may carry several definitions for different version ranges
/// or sub-paths; first listed wins ties.
pub struct InstrumentationRegistry {
    definitions: Vec<(InstrumentationDefinition, Vec<VersionReq>)>,
    by_package: FxHashMap<String, Vec<usize>>,
}

impl InstrumentationRegistry {
    /// Build the registry, parsing every version range eagerly.
    ///
    /// An unparseable range is a configuration error: misconfiguration
    /// must surface before any build work starts.
    pub fn new(definitions: Vec<InstrumentationDefinition>) -> Result<Self, Error> {
        let mut parsed = Vec::with_capacity(definitions.len());
        let mut by_package: FxHashMap<String, Vec<usize>> = FxHashMap::default();

        for (index, def) in definitions.into_iter().enumerate() {
            let reqs =
                parse_npm_range_alternatives(&def.version_range).map_err(|source| Error::VersionRange {
                    name: def.name.clone(),
                    range: def.version_range.clone(),
                    source,
                })?;
            by_package
                .entry(def.target_package.clone())
                .or_default()
                .push(index);
            parsed.push((def, reqs));
        }

        Ok(Self {
            definitions: parsed,
            by_package,
        })
    }

    /// Look up the instrumentation matching a package at a version.
    ///
    /// `import_path` is the canonical import string (`express` or
    /// `express/lib/router`); sub-path imports match only when the
    /// definition lists them in `files`. An unparseable installed
    /// version fails open. No match means the import is left untouched.
    #[must_use]
    pub fn find_match(
        &self,
        module: &ExtractedModule,
        version: &str,
        import_path: &str,
    ) -> Option<&InstrumentationDefinition> {
        let indices = self.by_package.get(&module.package)?;
        let version = Version::parse(version).ok()?;

        indices
            .iter()
            .map(|&i| &self.definitions[i])
            .find(|(def, reqs)| {
                reqs.iter().any(|req| req.matches(&version))
                    && matches_file(def, module, import_path)
            })
            .map(|(def, _)| def)
    }

    /// Retrieve a definition by instrumentation name (load phase).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&InstrumentationDefinition> {
        self.definitions
            .iter()
            .map(|(def, _)| def)
            .find(|def| def.name == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn matches_file(def: &InstrumentationDefinition, module: &ExtractedModule, import_path: &str) -> bool {
    if module.sub_path.is_empty() {
        return true;
    }
    def.files.iter().any(|f| f == import_path)
}

/// Parse a single range (no `||`), normalizing npm-specific syntax that
/// the `semver` crate does not accept directly.
pub(crate) fn parse_npm_range(range: &str) -> Result<VersionReq, semver::Error> {
    let range = range.trim();

    // Hyphen range: "1.0.0 - 2.0.0" -> ">=1.0.0, <=2.0.0"
    if let Some((start, end)) = range.split_once(" - ") {
        return VersionReq::parse(&format!(">={}, <={}", start.trim(), end.trim()));
    }

    // X-ranges: "1.x", "1.2.x", "*"
    if range == "*" || range == "x" || range == "X" {
        return VersionReq::parse(">=0.0.0");
    }
    if let Some(converted) = convert_x_range(range) {
        return VersionReq::parse(&converted);
    }

    // npm separates AND comparators with spaces; semver wants commas.
    VersionReq::parse(&convert_space_separated(range))
}

/// Parse an npm range that may contain `||` alternatives.
///
/// Returns every parseable alternative; matching succeeds when any one
/// contains the version.
pub(crate) fn parse_npm_range_alternatives(range: &str) -> Result<Vec<VersionReq>, semver::Error> {
    let mut reqs = Vec::new();
    let mut first_err = None;
    for alt in range.split("||") {
        match parse_npm_range(alt) {
            Ok(req) => reqs.push(req),
            Err(err) => first_err = Some(err),
        }
    }
    match (reqs.is_empty(), first_err) {
        (true, Some(err)) => Err(err),
        _ => Ok(reqs),
    }
}

fn convert_x_range(range: &str) -> Option<String> {
    if !range.contains('x') && !range.contains('X') {
        return None;
    }
    let parts: Vec<&str> = range.split('.').collect();
    match parts.as_slice() {
        [major, "x" | "X"] => {
            let m: u64 = major.parse().ok()?;
            Some(format!(">={m}.0.0, <{}.0.0", m + 1))
        }
        [major, minor, "x" | "X"] => {
            let m: u64 = major.parse().ok()?;
            let n: u64 = minor.parse().ok()?;
            Some(format!(">={m}.{n}.0, <{m}.{}.0", n + 1))
        }
        _ => None,
    }
}

/// npm allows ">= 2.1.2 < 3.0.0" meaning AND; semver wants
/// ">=2.1.2, <3.0.0".
fn convert_space_separated(range: &str) -> String {
    let mut result = String::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().any(|c| c.is_ascii_digit()) {
            if !result.is_empty() {
                result.push_str(", ");
            }
            result.push_str(&pending_op);
            result.push_str(token);
            pending_op.clear();
        } else {
            // Bare operator; attach it to the next version token.
            pending_op.push_str(token);
        }
    }

    if result.is_empty() {
        range.to_string()
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, package: &str, range: &str) -> InstrumentationDefinition {
        InstrumentationDefinition {
            name: name.to_string(),
            target_package: package.to_string(),
            version_range: range.to_string(),
            files: Vec::new(),
            otel_class: "ExpressInstrumentation".to_string(),
            otel_package: "@opentelemetry/instrumentation-express".to_string(),
            default_config: Value::Null,
        }
    }

    fn module(package: &str, sub_path: &str) -> ExtractedModule {
        ExtractedModule {
            package: package.to_string(),
            sub_path: sub_path.to_string(),
        }
    }

    #[test]
    fn test_match_in_range() {
        let registry = InstrumentationRegistry::new(vec![def("express", "express", ">=4.0.0")]).unwrap();
        let m = module("express", "");
        assert!(registry.find_match(&m, "4.19.2", "express").is_some());
        assert!(registry.find_match(&m, "3.9.0", "express").is_none());
    }

    #[test]
    fn test_unknown_package() {
        let registry = InstrumentationRegistry::new(vec![def("express", "express", ">=4.0.0")]).unwrap();
        let m = module("koa", "");
        assert!(registry.find_match(&m, "2.0.0", "koa").is_none());
    }

    #[test]
    fn test_first_listed_wins() {
        let mut a = def("express-a", "express", ">=4.0.0");
        a.otel_class = "FirstInstrumentation".to_string();
        let b = def("express-b", "express", ">=4.0.0");
        let registry = InstrumentationRegistry::new(vec![a, b]).unwrap();

        let m = module("express", "");
        let matched = registry.find_match(&m, "4.19.2", "express").unwrap();
        assert_eq!(matched.name, "express-a");
    }

    #[test]
    fn test_sub_path_requires_files_entry() {
        let mut d = def("express", "express", ">=4.0.0");
        d.files = vec!["express/lib/router".to_string()];
        let registry = InstrumentationRegistry::new(vec![d]).unwrap();

        let router = module("express", "lib/router");
        assert!(registry
            .find_match(&router, "4.19.2", "express/lib/router")
            .is_some());

        let other = module("express", "lib/view");
        assert!(registry
            .find_match(&other, "4.19.2", "express/lib/view")
            .is_none());
    }

    #[test]
    fn test_invalid_installed_version_fails_open() {
        let registry = InstrumentationRegistry::new(vec![def("express", "express", ">=4.0.0")]).unwrap();
        let m = module("express", "");
        assert!(registry.find_match(&m, "not-a-version", "express").is_none());
    }

    #[test]
    fn test_invalid_range_is_fatal() {
        let result = InstrumentationRegistry::new(vec![def("express", "express", "totally @@ bad")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_npm_range_syntax() {
        let req = parse_npm_range(">=4.0.0 <5.0.0").unwrap();
        assert!(req.matches(&Version::parse("4.19.2").unwrap()));
        assert!(!req.matches(&Version::parse("5.0.0").unwrap()));

        let req = parse_npm_range("1.0.0 - 2.0.0").unwrap();
        assert!(req.matches(&Version::parse("1.5.0").unwrap()));

        let req = parse_npm_range("2.x").unwrap();
        assert!(req.matches(&Version::parse("2.9.1").unwrap()));
        assert!(!req.matches(&Version::parse("3.0.0").unwrap()));

        let req = parse_npm_range("*").unwrap();
        assert!(req.matches(&Version::parse("0.1.0").unwrap()));
    }

    #[test]
    fn test_or_range_alternatives() {
        let reqs = parse_npm_range_alternatives("^1.0.0 || ^2.0.0").unwrap();
        let v1 = Version::parse("1.3.0").unwrap();
        let v2 = Version::parse("2.1.0").unwrap();
        let v3 = Version::parse("3.0.0").unwrap();
        assert!(reqs.iter().any(|r| r.matches(&v1)));
        assert!(reqs.iter().any(|r| r.matches(&v2)));
        assert!(!reqs.iter().any(|r| r.matches(&v3)));
    }
}
