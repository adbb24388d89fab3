//! The bundler-facing plugin: resolve and load hooks.
//!
//! The host bundler invokes [`OtelPlugin::on_resolve`] for every import
//! edge it discovers and [`OtelPlugin::on_load`] for every path the
//! resolve hook claimed. Hooks for different edges run concurrently
//! with no ordering guarantee; the only cross-edge shared state is the
//! single-flight version cache inside [`VersionResolver`].
//!
//! Every per-edge problem short-circuits to "decline the hook" so the
//! bundler falls back to default resolution and the import passes
//! through untouched.

use crate::config::{PluginConfig, LEGACY_START_FN};
use crate::ignore::IgnorePolicy;
use crate::registry::InstrumentationRegistry;
use crate::resolver::ModuleResolver;
use crate::rewrite::{wrap_module, RewriteContext};
use crate::specifier::{classify, Classification, ExtractedModule};
use crate::version::VersionResolver;
use crate::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The bundler's default namespace for on-disk files. Edges in any
/// other namespace were produced by another plugin and are not
/// reprocessed.
pub const FILE_NAMESPACE: &str = "file";

/// One import edge at the moment of resolution.
#[derive(Debug, Clone)]
pub struct OnResolveArgs {
    /// The import specifier as written.
    pub path: String,
    /// Absolute path of the importing file.
    pub importer: String,
    /// Directory to resolve relative to.
    pub resolve_dir: PathBuf,
    /// Namespace the edge was discovered in.
    pub namespace: String,
}

/// Resolution-phase metadata attached to a claimed edge, consumed
/// exactly once by the load hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Name of the matched instrumentation definition.
    pub instrumentation_name: String,
    /// The classified external module.
    pub extracted_module: ExtractedModule,
    /// Installed version of the package.
    pub module_version: String,
}

/// Result of a claimed resolution.
#[derive(Debug, Clone)]
pub struct OnResolveResult {
    /// Resolved absolute path.
    pub path: PathBuf,
    /// Optional namespace tag for the load phase.
    pub namespace: Option<String>,
    /// Metadata for the load phase.
    pub plugin_data: Option<MatchResult>,
}

/// Input to the load hook.
#[derive(Debug, Clone)]
pub struct OnLoadArgs {
    /// Absolute path returned by the resolve phase.
    pub path: PathBuf,
    /// Metadata attached at resolution time.
    pub plugin_data: Option<MatchResult>,
}

/// Syntax the bundler should parse the returned contents as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    Js,
    Ts,
}

impl Loader {
    /// Infer the loader from a file extension.
    #[must_use]
    pub fn infer(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts" | "tsx" | "mts" | "cts") => Self::Ts,
            _ => Self::Js,
        }
    }
}

/// Result of a claimed load.
#[derive(Debug, Clone)]
pub struct OnLoadResult {
    /// Source text handed back to the bundler.
    pub contents: String,
    /// Loader for the contents.
    pub loader: Loader,
    /// Directory used to resolve imports inside the contents.
    pub resolve_dir: PathBuf,
}

/// Terminal disposition of one edge through the pipeline. Every
/// non-`Matched` state means "pass through unmodified".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// Exempt per the ignore policy.
    Ignored,
    /// Relative or absolute import.
    Local,
    /// Node builtin; the SDK patches these at process start.
    Builtin,
    /// Syntactically malformed specifier.
    Malformed,
    /// Package descriptor not resolvable or without a version.
    NoVersion,
    /// No registered instrumentation covers this package at this
    /// version and import path.
    Unmatched,
    /// Matched an instrumentation definition.
    Matched(MatchResult),
}

/// The instrumentation-injection plugin.
pub struct OtelPlugin {
    config: PluginConfig,
    registry: InstrumentationRegistry,
    ignore: IgnorePolicy,
    versions: VersionResolver,
    resolver: Arc<dyn ModuleResolver>,
}

impl OtelPlugin {
    /// Construct the plugin for one build invocation.
    ///
    /// Fails only on misconfiguration (empty instrumentation list,
    /// unparseable version range); everything discovered later per edge
    /// degrades gracefully instead.
    pub fn new(config: PluginConfig, resolver: Arc<dyn ModuleResolver>) -> Result<Self, Error> {
        config.validate()?;
        let registry = InstrumentationRegistry::new(config.instrumentations.clone())?;
        let ignore = IgnorePolicy::new(
            config.external_modules.clone(),
            config.path_prefixes_to_ignore.clone(),
        );
        Ok(Self {
            config,
            registry,
            ignore,
            versions: VersionResolver::new(),
            resolver,
        })
    }

    /// Walk one edge through the pipeline and report where it lands.
    ///
    /// Cheap synchronous checks (ignore policy, classification) run
    /// first; only surviving edges pay for descriptor I/O and registry
    /// lookup.
    pub async fn evaluate_edge(&self, args: &OnResolveArgs) -> EdgeOutcome {
        if self.ignore.should_ignore(args) {
            return EdgeOutcome::Ignored;
        }

        let module = match classify(&args.path) {
            Some(Classification::Local) => return EdgeOutcome::Local,
            Some(Classification::Builtin) => return EdgeOutcome::Builtin,
            Some(Classification::External(module)) => module,
            None => return EdgeOutcome::Malformed,
        };

        let Some(version) = self
            .versions
            .resolve_version(&module, &args.resolve_dir, self.resolver.as_ref())
            .await
        else {
            return EdgeOutcome::NoVersion;
        };

        let import_path = module.import_path();
        match self.registry.find_match(&module, &version, &import_path) {
            Some(def) => EdgeOutcome::Matched(MatchResult {
                instrumentation_name: def.name.clone(),
                extracted_module: module,
                module_version: version,
            }),
            None => EdgeOutcome::Unmatched,
        }
    }

    /// Resolution hook.
    ///
    /// Returns `Ok(None)` to let default resolution proceed; returns a
    /// result with attached [`MatchResult`] metadata for edges that
    /// should be rewritten at load time.
    pub async fn on_resolve(&self, args: &OnResolveArgs) -> Result<Option<OnResolveResult>, Error> {
        let matched = match self.evaluate_edge(args).await {
            EdgeOutcome::Matched(matched) => matched,
            outcome => {
                tracing::debug!(specifier = %args.path, ?outcome, "edge passed through");
                return Ok(None);
            }
        };

        let Some(resolved) = self.resolver.resolve(&args.path, &args.resolve_dir) else {
            // Matched but unresolvable: let the bundler surface its own
            // resolution error (or treat the import as external).
            tracing::warn!(specifier = %args.path, "matched module did not resolve");
            return Ok(None);
        };

        tracing::debug!(
            specifier = %args.path,
            instrumentation = %matched.instrumentation_name,
            version = %matched.module_version,
            "intercepting import"
        );
        Ok(Some(OnResolveResult {
            path: resolved,
            namespace: None,
            plugin_data: Some(matched),
        }))
    }

    /// Load hook.
    ///
    /// Reads the matched module's source and returns the wrapped form.
    /// Declines edges without resolution metadata. If the definition
    /// named at resolve time is gone (cannot happen within one run, but
    /// handled defensively), returns the original source unmodified.
    pub async fn on_load(&self, args: &OnLoadArgs) -> Result<Option<OnLoadResult>, Error> {
        let Some(matched) = &args.plugin_data else {
            return Ok(None);
        };

        let source = match tokio::fs::read_to_string(&args.path).await {
            Ok(source) => source,
            Err(err) => {
                tracing::warn!(path = %args.path.display(), %err, "failed to read matched module");
                return Ok(None);
            }
        };

        let resolve_dir = args
            .path
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);
        let loader = Loader::infer(&args.path);

        let Some(def) = self.registry.get(&matched.instrumentation_name) else {
            tracing::warn!(
                instrumentation = %matched.instrumentation_name,
                "definition missing at load time, passing source through"
            );
            return Ok(Some(OnLoadResult {
                contents: source,
                loader,
                resolve_dir,
            }));
        };

        let ctx = RewriteContext {
            import_path: matched.extracted_module.import_path(),
            package_name: matched.extracted_module.package.clone(),
            module_version: matched.module_version.clone(),
            otel_class: def.otel_class.clone(),
            otel_package: def.otel_package.clone(),
            constructor_args: self.config.constructor_args(def),
            sdk_module: self.config.sdk_module.clone(),
            start_fn: self.config.start_fn.clone(),
            legacy_start_fn: LEGACY_START_FN.to_string(),
            once_flag: self.config.once_flag.clone(),
        };

        Ok(Some(OnLoadResult {
            contents: wrap_module(&source, &ctx),
            loader,
            resolve_dir,
        }))
    }

    /// The per-build version cache, exposed for diagnostics.
    pub fn version_resolver(&self) -> &VersionResolver {
        &self.versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InstrumentationDefinition;
    use crate::resolver::NodeResolver;
    use serde_json::Value;
    use std::fs;
    use tempfile::tempdir;

    fn express_def() -> InstrumentationDefinition {
        InstrumentationDefinition {
            name: "express".to_string(),
            target_package: "express".to_string(),
            version_range: ">=4.0.0".to_string(),
            files: Vec::new(),
            otel_class: "ExpressInstrumentation".to_string(),
            otel_package: "@opentelemetry/instrumentation-express".to_string(),
            default_config: Value::Null,
        }
    }

    fn plugin(defs: Vec<InstrumentationDefinition>) -> OtelPlugin {
        OtelPlugin::new(PluginConfig::new(defs), Arc::new(NodeResolver::new())).unwrap()
    }

    fn install(root: &std::path::Path, name: &str, version: &str, body: &str) {
        let dir = root.join("node_modules").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("package.json"),
            format!(r#"{{"name": "{name}", "version": "{version}", "main": "index.js"}}"#),
        )
        .unwrap();
        fs::write(dir.join("index.js"), body).unwrap();
    }

    fn edge(specifier: &str, resolve_dir: &std::path::Path) -> OnResolveArgs {
        OnResolveArgs {
            path: specifier.to_string(),
            importer: resolve_dir.join("index.js").display().to_string(),
            resolve_dir: resolve_dir.to_path_buf(),
            namespace: FILE_NAMESPACE.to_string(),
        }
    }

    #[test]
    fn test_empty_config_is_fatal() {
        let result = OtelPlugin::new(PluginConfig::default(), Arc::new(NodeResolver::new()));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_local_and_builtin_edges_pass_through() {
        let dir = tempdir().unwrap();
        let plugin = plugin(vec![express_def()]);

        let outcome = plugin.evaluate_edge(&edge("./utils", dir.path())).await;
        assert_eq!(outcome, EdgeOutcome::Local);

        let outcome = plugin.evaluate_edge(&edge("node:fs", dir.path())).await;
        assert_eq!(outcome, EdgeOutcome::Builtin);

        assert!(plugin
            .on_resolve(&edge("./utils", dir.path()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unresolvable_package_passes_through() {
        let dir = tempdir().unwrap();
        let plugin = plugin(vec![express_def()]);

        let outcome = plugin.evaluate_edge(&edge("express", dir.path())).await;
        assert_eq!(outcome, EdgeOutcome::NoVersion);
    }

    #[tokio::test]
    async fn test_version_outside_range_unmatched() {
        let dir = tempdir().unwrap();
        install(dir.path(), "express", "3.9.0", "module.exports = {};");
        let plugin = plugin(vec![express_def()]);

        let outcome = plugin.evaluate_edge(&edge("express", dir.path())).await;
        assert_eq!(outcome, EdgeOutcome::Unmatched);
        assert!(plugin
            .on_resolve(&edge("express", dir.path()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_matched_edge_carries_plugin_data() {
        let dir = tempdir().unwrap();
        install(dir.path(), "express", "4.19.2", "module.exports = {};");
        let plugin = plugin(vec![express_def()]);

        let result = plugin
            .on_resolve(&edge("express", dir.path()))
            .await
            .unwrap()
            .unwrap();
        assert!(result.path.ends_with("node_modules/express/index.js"));

        let matched = result.plugin_data.unwrap();
        assert_eq!(matched.instrumentation_name, "express");
        assert_eq!(matched.module_version, "4.19.2");
        assert_eq!(matched.extracted_module.package, "express");
    }

    #[tokio::test]
    async fn test_ignored_namespace() {
        let dir = tempdir().unwrap();
        install(dir.path(), "express", "4.19.2", "module.exports = {};");
        let plugin = plugin(vec![express_def()]);

        let mut args = edge("express", dir.path());
        args.namespace = "virtual".to_string();
        assert_eq!(plugin.evaluate_edge(&args).await, EdgeOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_load_without_plugin_data_declines() {
        let dir = tempdir().unwrap();
        let plugin = plugin(vec![express_def()]);

        let result = plugin
            .on_load(&OnLoadArgs {
                path: dir.path().join("whatever.js"),
                plugin_data: None,
            })
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_load_wraps_matched_module() {
        let dir = tempdir().unwrap();
        let body = "module.exports = function express() {};";
        install(dir.path(), "express", "4.19.2", body);
        let plugin = plugin(vec![express_def()]);

        let resolved = plugin
            .on_resolve(&edge("express", dir.path()))
            .await
            .unwrap()
            .unwrap();
        let loaded = plugin
            .on_load(&OnLoadArgs {
                path: resolved.path.clone(),
                plugin_data: resolved.plugin_data,
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(loaded.loader, Loader::Js);
        assert_eq!(loaded.resolve_dir, resolved.path.parent().unwrap());
        assert!(loaded.contents.contains(body));
        assert!(loaded.contents.contains("new ExpressInstrumentation()"));
        assert!(loaded.contents.contains("export default __otelWeaveExports;"));
    }

    #[tokio::test]
    async fn test_load_with_stale_definition_passes_source_through() {
        let dir = tempdir().unwrap();
        let body = "module.exports = {};";
        install(dir.path(), "express", "4.19.2", body);
        let plugin = plugin(vec![express_def()]);

        let loaded = plugin
            .on_load(&OnLoadArgs {
                path: dir.path().join("node_modules/express/index.js"),
                plugin_data: Some(MatchResult {
                    instrumentation_name: "reconfigured-away".to_string(),
                    extracted_module: ExtractedModule {
                        package: "express".to_string(),
                        sub_path: String::new(),
                    },
                    module_version: "4.19.2".to_string(),
                }),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.contents, body);
    }

    #[test]
    fn test_loader_inference() {
        assert_eq!(Loader::infer(Path::new("a/b.ts")), Loader::Ts);
        assert_eq!(Loader::infer(Path::new("a/b.tsx")), Loader::Ts);
        assert_eq!(Loader::infer(Path::new("a/b.js")), Loader::Js);
        assert_eq!(Loader::infer(Path::new("a/b.cjs")), Loader::Js);
    }
}
