//! Resolved project configuration.
//!
//! Configuration is resolved before the engine starts (file + CLI overrides)
//! and handed to every component by reference. The engine itself never
//! discovers or merges config files beyond the single `dalkey.config.json`
//! at the project root.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the optional project config file.
pub const CONFIG_FILE: &str = "dalkey.config.json";

/// Resolved configuration for one build or dev-server session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Project root (absolute). Set by the loader, not the config file.
    #[serde(skip)]
    pub root: PathBuf,

    /// Entry point files, relative to the root.
    pub entries: Vec<PathBuf>,

    /// Output directory for build artifacts, relative to the root.
    pub out_dir: PathBuf,

    /// Alias table: specifier prefix → replacement path.
    ///
    /// Ordered map so resolution is deterministic regardless of insertion
    /// order.
    pub alias: BTreeMap<String, String>,

    /// Extensions probed during resolution, in priority order.
    pub extensions: Vec<String>,

    /// Emit sibling `.map` files and source-map reference comments.
    pub sourcemap: bool,

    /// Compile-time replacements applied by the built-in replace plugin.
    pub define: BTreeMap<String, String>,

    /// Dev server settings.
    pub server: ServerConfig,
}

/// Dev server host/port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            entries: Vec::new(),
            out_dir: PathBuf::from("dist"),
            alias: BTreeMap::new(),
            extensions: default_extensions(),
            sourcemap: false,
            define: BTreeMap::new(),
            server: ServerConfig::default(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    [".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Config {
    /// Create a default config rooted at `root`.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Default::default()
        }
    }

    /// Load `dalkey.config.json` from `root` if present, falling back to
    /// defaults otherwise.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::new(root.to_path_buf()));
        }

        let text = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let mut config: Config =
            serde_json::from_str(&text).map_err(|source| Error::ConfigParse { path, source })?;
        config.root = root.to_path_buf();
        if config.extensions.is_empty() {
            config.extensions = default_extensions();
        }
        Ok(config)
    }

    /// Absolute path of the output directory.
    #[must_use]
    pub fn out_dir_abs(&self) -> PathBuf {
        if self.out_dir.is_absolute() {
            self.out_dir.clone()
        } else {
            self.root.join(&self.out_dir)
        }
    }

    /// Absolute paths of the configured entry points.
    #[must_use]
    pub fn entries_abs(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .map(|e| {
                if e.is_absolute() {
                    e.clone()
                } else {
                    self.root.join(e)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_no_config_file() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.root, dir.path());
        assert_eq!(config.out_dir, PathBuf::from("dist"));
        assert_eq!(config.extensions[0], ".ts");
        assert!(!config.sourcemap);
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{
                "entries": ["src/index.ts"],
                "outDir": "out",
                "alias": {"@": "./src"},
                "sourcemap": true,
                "server": {"port": 4000}
            }"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.entries, vec![PathBuf::from("src/index.ts")]);
        assert_eq!(config.out_dir, PathBuf::from("out"));
        assert_eq!(config.alias.get("@").unwrap(), "./src");
        assert!(config.sourcemap);
        assert_eq!(config.server.port, 4000);
        // Host falls back to default.
        assert_eq!(config.server.host, "localhost");
    }

    #[test]
    fn test_parse_error_carries_path() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }
}
