//! Build orchestration.
//!
//! A build walks the module graph depth-first from the configured entry
//! points, running each discovered module through the plugin pipeline
//! (load, transform) and the resolver, then materializes outputs under the
//! configured output directory, mirroring each module's project-relative
//! path. A visited set makes traversal terminate on import cycles: every
//! module is processed at most once and revisits only record the extra
//! importer edge.

pub mod graph;

use crate::config::Config;
use crate::error::Error;
use crate::imports::scan_imports;
use crate::paths::{is_script_path, rewrite_output_ext};
use crate::plugin::PluginContainer;
use crate::resolver::Resolver;
use graph::{ModuleGraph, ModuleRecord};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Final per-module build output.
#[derive(Debug, Clone)]
pub struct ModuleOutput {
    /// Transformed code.
    pub code: String,
    /// Optional source map (JSON text).
    pub map: Option<String>,
}

/// Summary of one completed build.
#[derive(Debug)]
pub struct BuildSummary {
    /// Modules discovered in the graph.
    pub modules: usize,
    /// Output files written.
    pub outputs_written: usize,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u128,
}

/// Mutable state threaded through one traversal.
struct BuildSession {
    graph: ModuleGraph,
    visited: HashSet<String>,
    outputs: HashMap<String, ModuleOutput>,
}

/// Build orchestrator for one session.
pub struct BuildEngine {
    config: Arc<Config>,
    plugins: PluginContainer,
    resolver: Resolver,
}

impl BuildEngine {
    /// Create an engine over a resolved config and plugin list.
    ///
    /// Runs the `config_resolved` hook on every plugin.
    pub fn new(config: Arc<Config>, plugins: PluginContainer) -> Result<Self, Error> {
        plugins.config_resolved(&config)?;
        let resolver = Resolver::new(&config);
        Ok(Self {
            config,
            plugins,
            resolver,
        })
    }

    /// Run a full build: traverse, transform, and write outputs.
    pub fn build(&self) -> Result<BuildSummary, Error> {
        let started = Instant::now();

        if self.config.entries.is_empty() {
            return Err(Error::NoEntries);
        }
        let mut entry_ids = Vec::new();
        for entry in self.config.entries_abs() {
            let canonical = dunce::canonicalize(&entry)
                .map_err(|_| Error::EntryNotFound { path: entry })?;
            entry_ids.push(canonical.display().to_string());
        }

        self.plugins.build_start()?;

        let mut session = BuildSession {
            graph: ModuleGraph::new(),
            visited: HashSet::new(),
            outputs: HashMap::new(),
        };
        for id in &entry_ids {
            self.visit(&mut session, id, None, true)?;
        }

        self.plugins.build_end(&session.outputs)?;

        let outputs_written = self.write_outputs(&session.outputs)?;

        self.plugins.close_bundle()?;

        let summary = BuildSummary {
            modules: session.graph.len(),
            outputs_written,
            duration_ms: started.elapsed().as_millis(),
        };
        tracing::info!(
            modules = summary.modules,
            outputs = summary.outputs_written,
            duration_ms = summary.duration_ms,
            "build finished"
        );
        Ok(summary)
    }

    /// Process one module and recurse into its resolved dependencies.
    fn visit(
        &self,
        session: &mut BuildSession,
        id: &str,
        importer: Option<&str>,
        is_entry: bool,
    ) -> Result<(), Error> {
        if session.visited.contains(id) {
            if let Some(importer) = importer {
                session.graph.add_importer(id, importer);
            }
            return Ok(());
        }
        session.visited.insert(id.to_string());

        let source = match self.load_source(id)? {
            Some(source) if !source.trim().is_empty() => source,
            _ => {
                tracing::warn!(module = id, "module source missing or empty, skipping");
                return Ok(());
            }
        };

        let transformed = self
            .plugins
            .transform(&source, id)
            .map_err(|source| Error::Transform {
                module: id.to_string(),
                source,
            })?;

        // Edges come from the transformed code, so imports a plugin
        // injects or rewrites match what is emitted.
        let mut dependencies = Vec::new();
        if should_scan(id) {
            for import in scan_imports(&transformed.code) {
                let dep = self
                    .resolver
                    .resolve(&import.raw, Path::new(id), &self.plugins)?;
                if dep.is_external {
                    dependencies.push(dep);
                    continue;
                }
                match &dep.resolved {
                    Some(child) => {
                        let child = child.clone();
                        dependencies.push(dep);
                        self.visit(session, &child, Some(id), false)?;
                    }
                    None => {
                        tracing::warn!(
                            specifier = %import.raw,
                            importer = id,
                            "unresolved import"
                        );
                        dependencies.push(dep);
                    }
                }
            }
        }

        session.graph.insert(ModuleRecord {
            id: id.to_string(),
            dependencies,
            is_entry,
        });
        session.outputs.insert(
            id.to_string(),
            ModuleOutput {
                code: transformed.code,
                map: transformed.map,
            },
        );
        Ok(())
    }

    /// Load module source: plugin `load` hooks first, then the filesystem.
    fn load_source(&self, id: &str) -> Result<Option<String>, Error> {
        if let Some(loaded) = self.plugins.load(id)? {
            return Ok(Some(loaded.code));
        }
        let path = Path::new(id);
        if path.is_file() {
            return Ok(Some(std::fs::read_to_string(path)?));
        }
        Ok(None)
    }

    /// Write outputs under the output directory, mirroring project-relative
    /// paths. Modules outside the root (virtual ids included) are skipped.
    fn write_outputs(&self, outputs: &HashMap<String, ModuleOutput>) -> Result<usize, Error> {
        // Canonicalize the root so prefix-stripping agrees with the
        // canonical module ids produced by resolution.
        let root =
            dunce::canonicalize(&self.config.root).unwrap_or_else(|_| self.config.root.clone());
        let out_dir = self.config.out_dir_abs();
        let mut written = 0;

        for (id, output) in outputs {
            let Ok(relative) = Path::new(id).strip_prefix(&root) else {
                tracing::debug!(module = id, "not under project root, not emitted");
                continue;
            };
            let target = out_dir.join(rewrite_output_ext(relative));
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut code = output.code.clone();
            if self.config.sourcemap {
                if let Some(map) = &output.map {
                    let map_path = format!("{}.map", target.display());
                    std::fs::write(&map_path, map)?;
                    if !code.contains("sourceMappingURL") {
                        let map_name = Path::new(&map_path)
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        code.push_str(&format!("\n//# sourceMappingURL={map_name}\n"));
                    }
                }
            }
            std::fs::write(&target, code)?;
            written += 1;
        }

        Ok(written)
    }

    /// The plugin container, for callers that dispatch hooks directly.
    #[must_use]
    pub fn plugins(&self) -> &PluginContainer {
        &self.plugins
    }
}

/// Whether a module id should be scanned for imports.
///
/// Virtual ids are scanned; file ids only when script-like.
fn should_scan(id: &str) -> bool {
    id.starts_with('\0') || is_script_path(Path::new(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{HookResult, Plugin, PluginContext, TransformResult};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn engine_for(root: &Path, entries: &[&str]) -> BuildEngine {
        let mut config = Config::new(root.to_path_buf());
        config.entries = entries.iter().map(PathBuf::from).collect();
        let config = Arc::new(config);
        let plugins = PluginContainer::new(Arc::clone(&config));
        BuildEngine::new(config, plugins).unwrap()
    }

    #[test]
    fn test_no_entries_is_an_error() {
        let dir = tempdir().unwrap();
        let engine = engine_for(dir.path(), &[]);
        assert!(matches!(engine.build(), Err(Error::NoEntries)));
    }

    #[test]
    fn test_missing_entry_is_an_error() {
        let dir = tempdir().unwrap();
        let engine = engine_for(dir.path(), &["missing.ts"]);
        assert!(matches!(engine.build(), Err(Error::EntryNotFound { .. })));
    }

    #[test]
    fn test_two_module_build_writes_two_outputs() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(
            src.join("index.ts"),
            "import { x } from \"./util\";\nconsole.log(x);\n",
        )
        .unwrap();
        std::fs::write(src.join("util.ts"), "export const x = 1;\n").unwrap();

        let engine = engine_for(dir.path(), &["src/index.ts"]);
        let summary = engine.build().unwrap();

        assert_eq!(summary.modules, 2);
        assert_eq!(summary.outputs_written, 2);
        assert!(dir.path().join("dist/src/index.js").is_file());
        assert!(dir.path().join("dist/src/util.js").is_file());
    }

    #[test]
    fn test_shared_dependency_visited_once() {
        struct CountTransforms(Mutex<u32>);
        impl Plugin for CountTransforms {
            fn name(&self) -> &str {
                "counter"
            }
            fn transform(
                &self,
                _code: &str,
                id: &str,
                _ctx: &PluginContext,
            ) -> HookResult<Option<TransformResult>> {
                if id.ends_with("shared.ts") {
                    *self.0.lock().unwrap() += 1;
                }
                Ok(None)
            }
        }

        let dir = tempdir().unwrap();
        // Diamond: entry imports a and b, both import shared.
        std::fs::write(
            dir.path().join("entry.ts"),
            "import \"./a\";\nimport \"./b\";\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("a.ts"), "import \"./shared\";\n").unwrap();
        std::fs::write(dir.path().join("b.ts"), "import \"./shared\";\n").unwrap();
        std::fs::write(dir.path().join("shared.ts"), "export const s = 1;\n").unwrap();

        let mut config = Config::new(dir.path().to_path_buf());
        config.entries = vec![PathBuf::from("entry.ts")];
        let config = Arc::new(config);
        let mut plugins = PluginContainer::new(Arc::clone(&config));
        let counter = Arc::new(CountTransforms(Mutex::new(0)));

        struct Shared(Arc<CountTransforms>);
        impl Plugin for Shared {
            fn name(&self) -> &str {
                self.0.name()
            }
            fn transform(
                &self,
                code: &str,
                id: &str,
                ctx: &PluginContext,
            ) -> HookResult<Option<TransformResult>> {
                self.0.transform(code, id, ctx)
            }
        }
        plugins.add(Box::new(Shared(Arc::clone(&counter))));

        let engine = BuildEngine::new(config, plugins).unwrap();
        let summary = engine.build().unwrap();

        assert_eq!(summary.modules, 4);
        assert_eq!(*counter.0.lock().unwrap(), 1);
    }

    #[test]
    fn test_transform_injected_imports_enter_the_graph() {
        struct Inject;
        impl Plugin for Inject {
            fn name(&self) -> &str {
                "inject"
            }
            fn transform(
                &self,
                code: &str,
                id: &str,
                _ctx: &PluginContext,
            ) -> HookResult<Option<TransformResult>> {
                if id.ends_with("index.ts") {
                    return Ok(Some(TransformResult::code(format!(
                        "import \"./injected\";\n{code}"
                    ))));
                }
                Ok(None)
            }
        }

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("index.ts"), "console.log(1);\n").unwrap();
        std::fs::write(dir.path().join("injected.ts"), "export const i = 1;\n").unwrap();

        let mut config = Config::new(dir.path().to_path_buf());
        config.entries = vec![PathBuf::from("index.ts")];
        let config = Arc::new(config);
        let mut plugins = PluginContainer::new(Arc::clone(&config));
        plugins.add(Box::new(Inject));

        let engine = BuildEngine::new(config, plugins).unwrap();
        let summary = engine.build().unwrap();

        assert_eq!(summary.modules, 2);
        assert!(dir.path().join("dist/injected.js").is_file());
        let emitted = std::fs::read_to_string(dir.path().join("dist/index.js")).unwrap();
        assert!(emitted.contains("./injected"));
    }

    #[test]
    fn test_cyclic_imports_terminate() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "import \"./b\";\nexport const a = 1;\n")
            .unwrap();
        std::fs::write(dir.path().join("b.ts"), "import \"./a\";\nexport const b = 2;\n")
            .unwrap();

        let engine = engine_for(dir.path(), &["a.ts"]);
        let summary = engine.build().unwrap();
        assert_eq!(summary.modules, 2);
    }

    #[test]
    fn test_external_imports_are_not_traversed() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.ts"),
            "import _ from \"lodash\";\nimport \"https://cdn.example.com/x.js\";\n",
        )
        .unwrap();

        let engine = engine_for(dir.path(), &["index.ts"]);
        let summary = engine.build().unwrap();
        assert_eq!(summary.modules, 1);
    }

    #[test]
    fn test_build_end_sees_full_output_map() {
        struct Recorder {
            seen: Mutex<Vec<String>>,
        }

        impl Plugin for Recorder {
            fn name(&self) -> &str {
                "recorder"
            }
            fn build_end(
                &self,
                outputs: &HashMap<String, ModuleOutput>,
                _ctx: &PluginContext,
            ) -> HookResult<()> {
                let mut seen = self.seen.lock().unwrap();
                *seen = outputs.keys().cloned().collect();
                Ok(())
            }
        }

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("index.ts"), "import \"./dep\";\n").unwrap();
        std::fs::write(dir.path().join("dep.ts"), "export {};\n").unwrap();

        let mut config = Config::new(dir.path().to_path_buf());
        config.entries = vec![PathBuf::from("index.ts")];
        let config = Arc::new(config);
        let mut plugins = PluginContainer::new(Arc::clone(&config));
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });

        struct Shared(Arc<Recorder>);
        impl Plugin for Shared {
            fn name(&self) -> &str {
                self.0.name()
            }
            fn build_end(
                &self,
                outputs: &HashMap<String, ModuleOutput>,
                ctx: &PluginContext,
            ) -> HookResult<()> {
                self.0.build_end(outputs, ctx)
            }
        }
        plugins.add(Box::new(Shared(Arc::clone(&recorder))));

        let engine = BuildEngine::new(config, plugins).unwrap();
        engine.build().unwrap();

        assert_eq!(recorder.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_transform_failure_aborts_build() {
        struct Boom;
        impl Plugin for Boom {
            fn name(&self) -> &str {
                "boom"
            }
            fn transform(
                &self,
                _code: &str,
                _id: &str,
                _ctx: &PluginContext,
            ) -> HookResult<Option<TransformResult>> {
                Err(crate::plugin::PluginError::msg("bad parse"))
            }
        }

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("index.ts"), "const x = 1;\n").unwrap();

        let mut config = Config::new(dir.path().to_path_buf());
        config.entries = vec![PathBuf::from("index.ts")];
        let config = Arc::new(config);
        let mut plugins = PluginContainer::new(Arc::clone(&config));
        plugins.add(Box::new(Boom));

        let engine = BuildEngine::new(config, plugins).unwrap();
        let err = engine.build().unwrap_err();
        assert!(matches!(err, Error::Transform { .. }));
        assert!(err.to_string().contains("bad parse"));
    }

    #[test]
    fn test_sourcemap_sibling_written_when_enabled() {
        struct MapMaker;
        impl Plugin for MapMaker {
            fn name(&self) -> &str {
                "mapmaker"
            }
            fn transform(
                &self,
                code: &str,
                _id: &str,
                _ctx: &PluginContext,
            ) -> HookResult<Option<TransformResult>> {
                Ok(Some(TransformResult {
                    code: code.to_string(),
                    map: Some("{\"version\":3}".to_string()),
                }))
            }
        }

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("index.ts"), "const x = 1;\n").unwrap();

        let mut config = Config::new(dir.path().to_path_buf());
        config.entries = vec![PathBuf::from("index.ts")];
        config.sourcemap = true;
        let config = Arc::new(config);
        let mut plugins = PluginContainer::new(Arc::clone(&config));
        plugins.add(Box::new(MapMaker));

        let engine = BuildEngine::new(config, plugins).unwrap();
        engine.build().unwrap();

        let out = dir.path().join("dist/index.js");
        assert!(out.is_file());
        let code = std::fs::read_to_string(&out).unwrap();
        assert!(code.contains("sourceMappingURL=index.js.map"));
        assert!(dir.path().join("dist/index.js.map").is_file());
    }
}
