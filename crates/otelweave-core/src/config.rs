//! Plugin configuration.

use crate::error::Error;
use crate::registry::InstrumentationDefinition;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default SDK module whose start entry point boots the tracing runtime.
pub const DEFAULT_SDK_MODULE: &str = "@splunk/otel";
/// Preferred start function name on the SDK module.
pub const DEFAULT_START_FN: &str = "start";
/// Legacy start function name, tried when the preferred one is absent.
pub const LEGACY_START_FN: &str = "startTracing";
/// Global flag guarding against repeated SDK starts across wrapped modules.
pub const DEFAULT_ONCE_FLAG: &str = "__otelweaveStarted";

/// Caller-supplied configuration, validated at plugin construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Instrumentation definitions to register. Must be non-empty.
    pub instrumentations: Vec<InstrumentationDefinition>,
    /// SDK module identifier imported by rewritten sources.
    pub sdk_module: String,
    /// Preferred start function name on the SDK module.
    pub start_fn: String,
    /// Name of the process-wide once-guard flag on `globalThis`.
    pub once_flag: String,
    /// Specifiers never intercepted.
    pub external_modules: Vec<String>,
    /// Specifier/importer prefixes never intercepted.
    pub path_prefixes_to_ignore: Vec<String>,
    /// Constructor-arg overrides keyed by instrumentation package name,
    /// deep-merged over each definition's `default_config`.
    pub instrumentation_overrides: FxHashMap<String, Value>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            instrumentations: Vec::new(),
            sdk_module: DEFAULT_SDK_MODULE.to_string(),
            start_fn: DEFAULT_START_FN.to_string(),
            once_flag: DEFAULT_ONCE_FLAG.to_string(),
            external_modules: Vec::new(),
            path_prefixes_to_ignore: Vec::new(),
            instrumentation_overrides: FxHashMap::default(),
        }
    }
}

impl PluginConfig {
    /// Create a config with the given instrumentations and defaults for
    /// everything else.
    #[must_use]
    pub fn new(instrumentations: Vec<InstrumentationDefinition>) -> Self {
        Self {
            instrumentations,
            ..Self::default()
        }
    }

    /// Set the SDK module identifier.
    pub fn sdk_module(mut self, module: impl Into<String>) -> Self {
        self.sdk_module = module.into();
        self
    }

    /// Set the preferred start function name.
    pub fn start_fn(mut self, name: impl Into<String>) -> Self {
        self.start_fn = name.into();
        self
    }

    /// Set the once-guard flag name.
    pub fn once_flag(mut self, name: impl Into<String>) -> Self {
        self.once_flag = name.into();
        self
    }

    /// Add a specifier to the external-module exclusion list.
    pub fn external_module(mut self, specifier: impl Into<String>) -> Self {
        self.external_modules.push(specifier.into());
        self
    }

    /// Add a path prefix exclusion.
    pub fn ignore_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefixes_to_ignore.push(prefix.into());
        self
    }

    /// Override constructor args for one instrumentation package.
    pub fn override_config(mut self, otel_package: impl Into<String>, config: Value) -> Self {
        self.instrumentation_overrides
            .insert(otel_package.into(), config);
        self
    }

    /// Validate top-level configuration.
    ///
    /// An empty instrumentation list is the one fatal misconfiguration:
    /// a plugin that can never match anything is a setup mistake, and
    /// catching it here means no build work is wasted.
    pub fn validate(&self) -> Result<(), Error> {
        if self.instrumentations.is_empty() {
            return Err(Error::config(
                "provide at least one instrumentation definition",
            ));
        }
        Ok(())
    }

    /// Constructor args for an instrumentation: its `default_config`
    /// deep-merged with any caller override for `otel_package`.
    #[must_use]
    pub fn constructor_args(&self, def: &InstrumentationDefinition) -> Value {
        match self.instrumentation_overrides.get(&def.otel_package) {
            Some(overrides) => merge(&def.default_config, overrides),
            None => def.default_config.clone(),
        }
    }
}

/// Deep-merge JSON values: objects merge key-by-key, anything else is
/// replaced by the override.
fn merge(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in override_map {
                let entry = merged
                    .get(key)
                    .map_or_else(|| value.clone(), |existing| merge(existing, value));
                merged.insert(key.clone(), entry);
            }
            Value::Object(merged)
        }
        _ => overrides.clone(),
    }
}
