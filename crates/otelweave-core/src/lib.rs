#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! Build-time instrumentation injection for bundled Node.js applications.
//!
//! Runtime auto-instrumentation patches modules as `require` loads them.
//! Once a bundler inlines every module into a single file those patch
//! points no longer exist, so nothing gets instrumented. This crate moves
//! the patching to build time: it hooks the bundler's resolve and load
//! phases, decides which imported packages have a registered
//! instrumentation for their installed version, and rewrites matched
//! module sources so the bundled output starts the tracing SDK once and
//! exports a patched module object.
//!
//! ## Pipeline
//!
//! For every import edge the bundler discovers:
//!
//! 1. **Ignore policy** and **specifier classifier** run first (pure,
//!    no I/O) to short-circuit local imports, builtins, and excluded
//!    modules.
//! 2. Surviving edges pay for **version resolution**: the package's
//!    `package.json` is located with the same algorithm the bundler
//!    uses and its `version` field is read (cached, single-flight).
//! 3. The **instrumentation registry** is consulted for a definition
//!    whose version range contains the installed version.
//! 4. Matched edges reach the **source rewriter**, which wraps the
//!    original source before the bundler inlines it.
//!
//! Anything that goes wrong per edge fails open: the import is left
//! untouched and the build continues. Only misconfiguration at plugin
//! construction is fatal.

pub mod config;
pub mod error;
pub mod ignore;
pub mod plugin;
pub mod registry;
pub mod resolver;
pub mod rewrite;
pub mod specifier;
pub mod version;

pub use config::PluginConfig;
pub use error::Error;
pub use ignore::IgnorePolicy;
pub use plugin::{
    EdgeOutcome, Loader, MatchResult, OnLoadArgs, OnLoadResult, OnResolveArgs, OnResolveResult,
    OtelPlugin, FILE_NAMESPACE,
};
pub use registry::{InstrumentationDefinition, InstrumentationRegistry};
pub use resolver::{ModuleResolver, NodeResolver};
pub use rewrite::{wrap_module, RewriteContext};
pub use specifier::{classify, Classification, ExtractedModule};
pub use version::VersionResolver;
