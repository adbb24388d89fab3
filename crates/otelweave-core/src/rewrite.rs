//! Source rewriter.
//!
//! Takes the original source of a matched module and produces the
//! wrapped source the bundler inlines instead. The wrapper, in order:
//!
//! 1. starts the tracing SDK behind a process-wide once-guard,
//! 2. evaluates the original source with synthetic CommonJS bindings so
//!    its exports are captured locally,
//! 3. instantiates the matched instrumentation class and applies its
//!    patch routine to the captured exports (failure degrades to the
//!    unpatched exports),
//! 4. re-exports the result as the module's default export.
//!
//! The guard and the patch both run when the bundle executes, so a
//! package imported from fifty files still starts the SDK exactly once.

use serde_json::Value;

/// Transient input to one rewrite. Produced at load time from the
/// resolution-phase match plus the plugin configuration, discarded
/// immediately after the wrapped source is emitted.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    /// Canonical import path of the matched module (`express`,
    /// `express/lib/router`).
    pub import_path: String,
    /// Package name handed to the instrumentation's patch routine.
    pub package_name: String,
    /// Installed version of the package.
    pub module_version: String,
    /// Instrumentation class to instantiate.
    pub otel_class: String,
    /// Package exporting the instrumentation class.
    pub otel_package: String,
    /// Constructor args for the instrumentation class; `Null` means
    /// construct with no arguments.
    pub constructor_args: Value,
    /// SDK module whose start entry point boots the tracing runtime.
    pub sdk_module: String,
    /// Preferred start function name on the SDK module.
    pub start_fn: String,
    /// Legacy start function name, tried second.
    pub legacy_start_fn: String,
    /// Once-guard flag name on `globalThis`.
    pub once_flag: String,
}

/// Wrap original module source into its instrumented form.
#[must_use]
pub fn wrap_module(source: &str, ctx: &RewriteContext) -> String {
    let sdk = js_escape(&ctx.sdk_module);
    let otel_package = js_escape(&ctx.otel_package);
    let class = &ctx.otel_class;
    let start_fn = js_escape(&ctx.start_fn);
    let legacy_fn = js_escape(&ctx.legacy_start_fn);
    let flag = js_escape(&ctx.once_flag);
    let package = js_escape(&ctx.package_name);
    let version = js_escape(&ctx.module_version);
    let args = match &ctx.constructor_args {
        Value::Null => String::new(),
        other => other.to_string(),
    };

    format!(
        r"// Wrapped by otelweave: {import_path}@{raw_version}
import * as __otelWeaveSdk from '{sdk}';
import {{ {class} }} from '{otel_package}';

// Start the tracing runtime once per process, no matter how many
// wrapped modules execute this header.
(function () {{
  const g = globalThis;
  if (!g['{flag}']) {{
    const start = __otelWeaveSdk['{start_fn}'] || __otelWeaveSdk['{legacy_fn}'] || __otelWeaveSdk.start;
    if (typeof start === 'function') {{
      start();
    }} else {{
      console.warn('[otelweave] no start function found on {sdk}');
    }}
    g['{flag}'] = true;
  }}
}})();

// Evaluate the original module body with synthetic CommonJS bindings so
// its exports land in a local value instead of leaking into this scope.
const __otelWeaveModule = {{ exports: {{}} }};
(function (module, exports) {{
{source}
}})(__otelWeaveModule, __otelWeaveModule.exports);
let __otelWeaveExports = __otelWeaveModule.exports ?? {{}};

function __otelWeaveApplyPatch(instrumentation, moduleExports, name, version) {{
  const defs = typeof instrumentation.getModuleDefinitions === 'function'
    ? instrumentation.getModuleDefinitions()
    : instrumentation._modules;
  if (!Array.isArray(defs)) {{
    console.warn('[otelweave] no module definitions on instrumentation for', name);
    return moduleExports;
  }}
  const def = defs.find((d) => d.name === name);
  if (!def || typeof def.patch !== 'function') {{
    console.warn('[otelweave] no patch routine for', name);
    return moduleExports;
  }}
  return def.patch(moduleExports, version) ?? moduleExports;
}}

try {{
  const __otelWeaveInstrumentation = new {class}({args});
  __otelWeaveExports = __otelWeaveApplyPatch(
    __otelWeaveInstrumentation,
    __otelWeaveExports,
    '{package}',
    '{version}'
  );
}} catch (e) {{
  console.warn('[otelweave] patching {package} failed:', e);
}}

export default __otelWeaveExports;
",
        import_path = ctx.import_path,
        raw_version = ctx.module_version,
    )
}

/// Escape a string for interpolation inside a single-quoted JS literal.
fn js_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}
