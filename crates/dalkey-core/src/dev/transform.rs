//! Per-request transform pipeline for unbundled dev serving.
//!
//! Each module request runs resolve → load → plugin transform and is cached
//! until the backing file changes. Script modules are served with a hot
//! context preamble; CSS is wrapped as a style-injecting JS module and JSON
//! as a default export.

use crate::config::Config;
use crate::plugin::{PluginContainer, PluginError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Error serving one module request.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Unsupported file type: {0}")]
    Unsupported(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// A transformed module ready to serve.
#[derive(Debug, Clone)]
pub struct ServedModule {
    /// Code to serve.
    pub code: String,
    /// Content-Type header value.
    pub content_type: &'static str,
    /// Backing file path (empty for virtual modules).
    pub file_path: String,
    /// When the transform ran, in milliseconds since the epoch.
    pub timestamp: u64,
}

/// Request pipeline with a transform cache.
pub struct RequestPipeline {
    config: Arc<Config>,
    plugins: Arc<PluginContainer>,
    /// URL path → cached transform.
    cache: RwLock<HashMap<String, ServedModule>>,
}

impl RequestPipeline {
    #[must_use]
    pub fn new(config: Arc<Config>, plugins: Arc<PluginContainer>) -> Self {
        Self {
            config,
            plugins,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Serve a module for a root-relative URL path.
    pub fn serve(&self, url_path: &str) -> Result<ServedModule, RequestError> {
        if let Some(cached) = self.cache.read().unwrap().get(url_path) {
            return Ok(cached.clone());
        }

        let (id, file_path) = self.resolve_url(url_path)?;
        let source = self.load(&id)?;

        let ext = PathBuf::from(&id)
            .extension()
            .and_then(|e| e.to_str())
            .map(ToString::to_string)
            .unwrap_or_default();

        let code = match ext.as_str() {
            "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => {
                let transformed = self.plugins.transform(&source, &id)?;
                with_hot_preamble(url_path, &transformed.code)
            }
            "css" => with_hot_preamble(url_path, &css_module(&source)),
            "json" => {
                let transformed = self.plugins.transform(&source, &id)?;
                // JsonPlugin may already have produced a module.
                if transformed.code.starts_with("export default") {
                    transformed.code
                } else {
                    format!("export default {};", transformed.code.trim())
                }
            }
            // Virtual modules have no extension; treat as script.
            "" if id.starts_with('\0') => {
                let transformed = self.plugins.transform(&source, &id)?;
                with_hot_preamble(url_path, &transformed.code)
            }
            other => return Err(RequestError::Unsupported(format!(".{other}"))),
        };

        let module = ServedModule {
            code,
            content_type: "application/javascript",
            file_path,
            timestamp: now_ms(),
        };
        self.cache
            .write()
            .unwrap()
            .insert(url_path.to_string(), module.clone());
        Ok(module)
    }

    /// Drop cache entries backed by a changed file. Returns the invalidated
    /// URL paths.
    pub fn invalidate(&self, file_path: &str) -> Vec<String> {
        let mut cache = self.cache.write().unwrap();
        let mut invalidated = Vec::new();
        cache.retain(|url, module| {
            if module.file_path == file_path {
                invalidated.push(url.clone());
                false
            } else {
                true
            }
        });
        invalidated
    }

    pub fn invalidate_all(&self) {
        self.cache.write().unwrap().clear();
    }

    /// Resolve a URL path to a module id. Plugins first, then filesystem
    /// probing under the project root.
    fn resolve_url(&self, url_path: &str) -> Result<(String, String), RequestError> {
        if let Some(hit) = self.plugins.resolve_id(url_path, None)? {
            if !hit.external {
                if hit.id.starts_with('\0') {
                    return Ok((hit.id, String::new()));
                }
                let path = PathBuf::from(&hit.id);
                if path.is_file() {
                    return Ok((hit.id.clone(), hit.id));
                }
            }
        }

        let stripped = url_path.strip_prefix('/').unwrap_or(url_path);
        let base = self.config.root.join(stripped);

        if base.is_file() {
            let id = base.display().to_string();
            return Ok((id.clone(), id));
        }
        for ext in &self.config.extensions {
            let candidate = PathBuf::from(format!("{}{ext}", base.display()));
            if candidate.is_file() {
                let id = candidate.display().to_string();
                return Ok((id.clone(), id));
            }
        }
        if base.is_dir() {
            for ext in &self.config.extensions {
                let candidate = base.join(format!("index{ext}"));
                if candidate.is_file() {
                    let id = candidate.display().to_string();
                    return Ok((id.clone(), id));
                }
            }
        }

        Err(RequestError::NotFound(url_path.to_string()))
    }

    /// Load module source: plugin `load` hooks first, filesystem second.
    fn load(&self, id: &str) -> Result<String, RequestError> {
        if let Some(loaded) = self.plugins.load(id)? {
            return Ok(loaded.code);
        }
        std::fs::read_to_string(id).map_err(|source| RequestError::Read {
            path: id.to_string(),
            source,
        })
    }
}

fn now_ms() -> u64 {
    u64::try_from(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}

/// Prepend the hot-context preamble to a served script module.
fn with_hot_preamble(url_path: &str, code: &str) -> String {
    format!(
        "import {{ createHotContext }} from \"/@dalkey/client\";\n\
         import.meta.hot = createHotContext({url:?});\n{code}",
        url = url_path,
        code = code
    )
}

/// Wrap CSS as a JS module that injects a `<style>` tag.
fn css_module(css: &str) -> String {
    let escaped = css
        .replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${");

    format!(
        r"const css = `{escaped}`;
const style = document.createElement('style');
style.setAttribute('data-dalkey-css', '');
style.textContent = css;
document.head.appendChild(style);

if (import.meta.hot) {{
  import.meta.hot.accept();
  import.meta.hot.dispose(() => {{
    style.remove();
  }});
}}

export default css;
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::VirtualPlugin;
    use tempfile::tempdir;

    fn pipeline(root: &std::path::Path) -> RequestPipeline {
        let config = Arc::new(Config::new(root.to_path_buf()));
        let plugins = Arc::new(PluginContainer::new(Arc::clone(&config)));
        RequestPipeline::new(config, plugins)
    }

    #[test]
    fn test_serves_script_with_preamble() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("app.ts"), "export const x = 1;\n").unwrap();

        let served = pipeline(dir.path()).serve("/app.ts").unwrap();
        assert_eq!(served.content_type, "application/javascript");
        assert!(served.code.contains("createHotContext(\"/app.ts\")"));
        assert!(served.code.contains("export const x = 1;"));
    }

    #[test]
    fn test_extensionless_url_probes_extensions() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("util.ts"), "export {};\n").unwrap();

        let served = pipeline(dir.path()).serve("/util").unwrap();
        assert!(served.file_path.ends_with("util.ts"));
    }

    #[test]
    fn test_css_served_as_injecting_module() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("style.css"), "body { color: red; }").unwrap();

        let served = pipeline(dir.path()).serve("/style.css").unwrap();
        assert_eq!(served.content_type, "application/javascript");
        assert!(served.code.contains("body { color: red; }"));
        assert!(served.code.contains("document.createElement('style')"));
    }

    #[test]
    fn test_json_served_as_default_export() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("data.json"), r#"{"a": 1}"#).unwrap();

        let served = pipeline(dir.path()).serve("/data.json").unwrap();
        assert!(served.code.contains(r#"export default {"a": 1}"#));
    }

    #[test]
    fn test_missing_module_is_not_found() {
        let dir = tempdir().unwrap();
        let err = pipeline(dir.path()).serve("/nope.ts").unwrap_err();
        assert!(matches!(err, RequestError::NotFound(_)));
    }

    #[test]
    fn test_cache_hit_and_invalidate() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("app.ts"), "export const x = 1;\n").unwrap();

        let pipeline = pipeline(dir.path());
        let first = pipeline.serve("/app.ts").unwrap();
        let second = pipeline.serve("/app.ts").unwrap();
        assert_eq!(first.timestamp, second.timestamp);

        let invalidated = pipeline.invalidate(&first.file_path);
        assert_eq!(invalidated, vec!["/app.ts".to_string()]);

        std::fs::write(dir.path().join("app.ts"), "export const x = 2;\n").unwrap();
        let third = pipeline.serve("/app.ts").unwrap();
        assert!(third.code.contains("x = 2"));
    }

    #[test]
    fn test_virtual_module_served_through_plugins() {
        let dir = tempdir().unwrap();
        let config = Arc::new(Config::new(dir.path().to_path_buf()));
        let mut plugins = PluginContainer::new(Arc::clone(&config));
        plugins.add(Box::new(
            VirtualPlugin::new().module("env", "export const mode = 'dev';"),
        ));
        let pipeline = RequestPipeline::new(config, Arc::new(plugins));

        let served = pipeline.serve("virtual:env").unwrap();
        assert!(served.code.contains("export const mode = 'dev';"));
        assert!(served.file_path.is_empty());
    }
}
