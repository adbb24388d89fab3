//! Installed-version resolution with a single-flight descriptor cache.
//!
//! Given an external package reference, locates the package's
//! `package.json` through the same resolution algorithm the bundler
//! uses and extracts its `version` field. Results are cached by the
//! descriptor's canonical path; concurrent lookups for the same
//! descriptor coalesce into one underlying read.

use crate::resolver::ModuleResolver;
use crate::specifier::ExtractedModule;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Per-build version cache.
///
/// Entries are write-once: package versions are immutable for the
/// duration of a build, so the first resolution wins and failures are
/// cached as absent. Construct a fresh resolver per build invocation;
/// reusing one across incremental builds would serve stale versions.
#[derive(Debug, Default)]
pub struct VersionResolver {
    cells: Mutex<FxHashMap<PathBuf, Arc<OnceCell<Option<String>>>>>,
    descriptor_reads: AtomicU64,
}

impl VersionResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the installed version of `module` as seen from
    /// `resolve_dir`.
    ///
    /// Returns `None` when the package or its descriptor cannot be
    /// found, the descriptor is unparseable, or it carries no `version`
    /// field — the caller must then skip instrumentation for the import
    /// rather than failing the build.
    pub async fn resolve_version(
        &self,
        module: &ExtractedModule,
        resolve_dir: &Path,
        resolver: &dyn ModuleResolver,
    ) -> Option<String> {
        let specifier = format!("{}/package.json", module.package);
        let descriptor = resolver.resolve(&specifier, resolve_dir)?;

        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            Arc::clone(cells.entry(descriptor.clone()).or_default())
        };

        cell.get_or_init(|| self.read_version(descriptor))
            .await
            .clone()
    }

    /// Number of descriptor reads actually issued. With the
    /// single-flight cache this stays at one per distinct descriptor
    /// regardless of how many imports reference the package.
    pub fn descriptor_reads(&self) -> u64 {
        self.descriptor_reads.load(Ordering::Relaxed)
    }

    async fn read_version(&self, descriptor: PathBuf) -> Option<String> {
        self.descriptor_reads.fetch_add(1, Ordering::Relaxed);
        let contents = match tokio::fs::read_to_string(&descriptor).await {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(path = %descriptor.display(), %err, "failed to read package descriptor");
                return None;
            }
        };
        let json: Value = match serde_json::from_str(&contents) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(path = %descriptor.display(), %err, "failed to parse package descriptor");
                return None;
            }
        };
        json.get("version").and_then(Value::as_str).map(String::from)
    }
}
