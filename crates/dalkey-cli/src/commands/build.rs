//! `dalkey build` command implementation.

use dalkey_core::plugin::{JsonPlugin, ReplacePlugin};
use dalkey_core::{BuildEngine, Config, PluginContainer};
use miette::{miette, IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Build action resolved from CLI flags.
#[derive(Debug, Clone)]
pub struct BuildAction {
    /// Project root.
    pub cwd: PathBuf,
    /// Entry points from the command line (override config entries).
    pub entries: Vec<PathBuf>,
    /// Output directory override.
    pub out_dir: Option<PathBuf>,
    /// Force sourcemap emission on.
    pub sourcemap: bool,
}

/// Run a build and print a summary.
pub fn run(action: BuildAction, json: bool) -> Result<()> {
    let mut config = Config::load(&action.cwd).into_diagnostic()?;
    if !action.entries.is_empty() {
        config.entries = action.entries.clone();
    }
    if let Some(out_dir) = &action.out_dir {
        config.out_dir = out_dir.clone();
    }
    if action.sourcemap {
        config.sourcemap = true;
    }
    let config = Arc::new(config);

    let plugins = default_plugins(&config);
    let engine = BuildEngine::new(Arc::clone(&config), plugins)
        .map_err(|e| miette!("{e}"))?;
    let summary = engine.build().map_err(|e| miette!("{e}"))?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "modules": summary.modules,
                "outputs": summary.outputs_written,
                "durationMs": summary.duration_ms,
                "outDir": config.out_dir_abs(),
            })
        );
    } else {
        println!(
            "  Built {} modules ({} files written) in {}ms",
            summary.modules, summary.outputs_written, summary.duration_ms
        );
        println!("  Output: {}", config.out_dir_abs().display());
    }

    Ok(())
}

/// Built-in plugin list shared by build and dev sessions.
pub fn default_plugins(config: &Arc<Config>) -> PluginContainer {
    let mut plugins = PluginContainer::new(Arc::clone(config));

    if !config.define.is_empty() {
        let mut replace = ReplacePlugin::new();
        for (from, to) in &config.define {
            replace = replace.replace(from, to);
        }
        plugins.add(Box::new(replace));
    }
    plugins.add(Box::new(JsonPlugin));

    plugins
}
