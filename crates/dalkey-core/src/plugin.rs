//! Plugin pipeline.
//!
//! Plugins are named units exposing optional lifecycle hooks. A
//! [`PluginContainer`] holds the ordered plugin list for one build or
//! dev-server session and dispatches each hook strictly sequentially in list
//! order; a plugin that does not implement a hook inherits the no-op default.
//!
//! Hook folding rules:
//! - `resolve_id` and `load`: first plugin to return `Some` wins and
//!   short-circuits the rest.
//! - `transform`: sequential fold. Each `Some` result becomes the running
//!   code handed to the next plugin, so the final value is the last
//!   non-null result and later plugins post-process earlier output.
//! - `watch_change` / `handle_hot_update`: advisory; hints from all plugins
//!   are collected.
//! - Effect-only hooks (`config_resolved`, `build_start`, `build_end`,
//!   `configure_server`, `close_bundle`) run on every plugin.
//!
//! Any hook error aborts the enclosing pipeline call and is reported with
//! the offending plugin's name and the hook name. There is no retry and no
//! partial-success swallowing.

use crate::build::ModuleOutput;
use crate::config::Config;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type for plugin hooks.
pub type HookResult<T> = Result<T, PluginError>;

/// Error raised by a plugin hook.
///
/// The container fills `plugin` and `hook` at dispatch time, so plugin
/// implementations only need to supply a message.
#[derive(Error, Debug, Clone)]
#[error("[{plugin}] {hook}: {message}")]
pub struct PluginError {
    /// Plugin name that caused the error.
    pub plugin: String,
    /// Hook that failed.
    pub hook: &'static str,
    /// Error message.
    pub message: String,
}

impl PluginError {
    /// Create an untagged error from a message. The container tags it with
    /// the plugin and hook name when the hook returns.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            plugin: String::new(),
            hook: "",
            message: message.into(),
        }
    }

    fn at(mut self, plugin: &str, hook: &'static str) -> Self {
        self.plugin = plugin.to_string();
        self.hook = hook;
        self
    }
}

/// Context passed to plugin hooks.
#[derive(Debug)]
pub struct PluginContext {
    /// The resolved configuration for this session.
    pub config: Arc<Config>,
    /// Whether this is a dev/watch session.
    pub watch: bool,
    /// Scratch metadata for inter-plugin communication.
    meta: HashMap<String, String>,
}

impl PluginContext {
    /// Create a new plugin context.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            watch: false,
            meta: HashMap::new(),
        }
    }

    /// Set a metadata value.
    pub fn set_meta(&mut self, key: &str, value: String) {
        self.meta.insert(key.to_string(), value);
    }

    /// Get a metadata value.
    #[must_use]
    pub fn get_meta(&self, key: &str) -> Option<&String> {
        self.meta.get(key)
    }
}

/// Result of the `resolve_id` hook.
#[derive(Debug, Clone)]
pub struct ResolvedId {
    /// Resolved module identity (absolute file path or virtual id).
    pub id: String,
    /// Whether the module is external (never traversed).
    pub external: bool,
}

impl ResolvedId {
    /// A resolved, traversable module identity.
    pub fn resolved(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: false,
        }
    }

    /// An external module identity.
    pub fn external(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: true,
        }
    }
}

/// Result of the `load` hook.
#[derive(Debug, Clone)]
pub struct LoadResult {
    /// Module source code.
    pub code: String,
    /// Optional source map.
    pub map: Option<String>,
}

impl LoadResult {
    /// Create a load result with code only.
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }
}

/// Result of the `transform` hook.
#[derive(Debug, Clone)]
pub struct TransformResult {
    /// Transformed code.
    pub code: String,
    /// Optional source map.
    pub map: Option<String>,
}

impl TransformResult {
    /// Create a transform result with code only.
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }
}

/// Context for the `handle_hot_update` hook.
#[derive(Debug, Clone)]
pub struct HotUpdateContext {
    /// The file that changed (absolute path).
    pub file: String,
    /// Timestamp of the change, in milliseconds since the epoch.
    pub timestamp: u64,
    /// Modules already known to be affected.
    pub modules: Vec<String>,
}

/// Dev-server context passed to `configure_server`.
///
/// Plugins can register path-prefix middlewares that are consulted before
/// the built-in handlers.
pub struct ServerContext {
    /// Project root.
    pub root: PathBuf,
    /// Registered middlewares, in registration order.
    pub middlewares: Vec<ServerMiddleware>,
}

/// A middleware registered by a plugin.
pub struct ServerMiddleware {
    /// Name for debugging.
    pub name: String,
    /// Handler: `(path, method)` → optional short-circuit response.
    pub handler: Arc<dyn Fn(&str, &str) -> Option<MiddlewareResponse> + Send + Sync>,
}

/// Response produced by a middleware.
#[derive(Debug, Clone)]
pub struct MiddlewareResponse {
    /// HTTP status code.
    pub status: u16,
    /// Content-Type header.
    pub content_type: String,
    /// Response body.
    pub body: String,
}

impl ServerContext {
    /// Create a new server context.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            middlewares: Vec::new(),
        }
    }
}

/// The plugin trait. All hooks default to no-ops.
pub trait Plugin: Send + Sync {
    /// Plugin name for error reporting and debugging.
    fn name(&self) -> &str;

    /// Called once after configuration is resolved (read-only).
    fn config_resolved(&self, _config: &Config) -> HookResult<()> {
        Ok(())
    }

    /// Called at the start of a build.
    fn build_start(&self, _ctx: &PluginContext) -> HookResult<()> {
        Ok(())
    }

    /// Resolve an import specifier to a module identity.
    ///
    /// Return `Some` to claim the resolution; the first plugin to do so
    /// wins.
    fn resolve_id(
        &self,
        _specifier: &str,
        _importer: Option<&str>,
        _ctx: &PluginContext,
    ) -> HookResult<Option<ResolvedId>> {
        Ok(None)
    }

    /// Load a module's source by identity.
    fn load(&self, _id: &str, _ctx: &PluginContext) -> HookResult<Option<LoadResult>> {
        Ok(None)
    }

    /// Transform module source. The input is the running result of earlier
    /// plugins; return `Some` to replace it.
    fn transform(
        &self,
        _code: &str,
        _id: &str,
        _ctx: &PluginContext,
    ) -> HookResult<Option<TransformResult>> {
        Ok(None)
    }

    /// Called at the end of a build with the full identity → output map.
    fn build_end(
        &self,
        _outputs: &HashMap<String, ModuleOutput>,
        _ctx: &PluginContext,
    ) -> HookResult<()> {
        Ok(())
    }

    /// Configure the dev server (register middlewares).
    fn configure_server(&self, _server: &mut ServerContext) -> HookResult<()> {
        Ok(())
    }

    /// Called when a watched file changes. May return additional affected
    /// module paths.
    fn watch_change(&self, _path: &str, _ctx: &PluginContext) -> HookResult<Option<Vec<String>>> {
        Ok(None)
    }

    /// Refine the affected-module set for a hot update. Advisory.
    fn handle_hot_update(&self, _update: &HotUpdateContext) -> HookResult<Option<Vec<String>>> {
        Ok(None)
    }

    /// Called after build outputs are materialized.
    fn close_bundle(&self, _ctx: &PluginContext) -> HookResult<()> {
        Ok(())
    }
}

/// Ordered plugin list plus the shared hook context for one session.
pub struct PluginContainer {
    plugins: Vec<Box<dyn Plugin>>,
    ctx: PluginContext,
}

impl PluginContainer {
    /// Create a container for the given resolved config.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            plugins: Vec::new(),
            ctx: PluginContext::new(config),
        }
    }

    /// Append a plugin. List order is dispatch order.
    pub fn add(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Mark this container as serving a dev/watch session.
    pub fn set_watch(&mut self, watch: bool) {
        self.ctx.watch = watch;
    }

    /// Get the context (for modification).
    pub fn context_mut(&mut self) -> &mut PluginContext {
        &mut self.ctx
    }

    /// Get the context (read-only).
    #[must_use]
    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    /// Whether any plugins are registered.
    #[must_use]
    pub fn has_plugins(&self) -> bool {
        !self.plugins.is_empty()
    }

    /// Call `config_resolved` on every plugin.
    pub fn config_resolved(&self, config: &Config) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin
                .config_resolved(config)
                .map_err(|e| e.at(plugin.name(), "configResolved"))?;
        }
        Ok(())
    }

    /// Call `build_start` on every plugin.
    pub fn build_start(&self) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin
                .build_start(&self.ctx)
                .map_err(|e| e.at(plugin.name(), "buildStart"))?;
        }
        Ok(())
    }

    /// Resolve through plugins; first `Some` wins.
    pub fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
    ) -> HookResult<Option<ResolvedId>> {
        for plugin in &self.plugins {
            if let Some(result) = plugin
                .resolve_id(specifier, importer, &self.ctx)
                .map_err(|e| e.at(plugin.name(), "resolveId"))?
            {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Load through plugins; first `Some` wins.
    pub fn load(&self, id: &str) -> HookResult<Option<LoadResult>> {
        for plugin in &self.plugins {
            if let Some(result) = plugin
                .load(id, &self.ctx)
                .map_err(|e| e.at(plugin.name(), "load"))?
            {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Transform code through every plugin in order.
    ///
    /// Each `Some` result replaces the running code, so the final value is
    /// the last non-null result. The final map is the one attached to that
    /// last result.
    pub fn transform(&self, code: &str, id: &str) -> HookResult<TransformResult> {
        let mut current = TransformResult::code(code);
        for plugin in &self.plugins {
            if let Some(result) = plugin
                .transform(&current.code, id, &self.ctx)
                .map_err(|e| e.at(plugin.name(), "transform"))?
            {
                current = result;
            }
        }
        Ok(current)
    }

    /// Call `build_end` on every plugin with the final output map.
    pub fn build_end(&self, outputs: &HashMap<String, ModuleOutput>) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin
                .build_end(outputs, &self.ctx)
                .map_err(|e| e.at(plugin.name(), "buildEnd"))?;
        }
        Ok(())
    }

    /// Call `configure_server` on every plugin.
    pub fn configure_server(&self, server: &mut ServerContext) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin
                .configure_server(server)
                .map_err(|e| e.at(plugin.name(), "configureDevServer"))?;
        }
        Ok(())
    }

    /// Collect `watch_change` hints from every plugin.
    pub fn watch_change(&self, path: &str) -> HookResult<Vec<String>> {
        let mut hints = Vec::new();
        for plugin in &self.plugins {
            if let Some(modules) = plugin
                .watch_change(path, &self.ctx)
                .map_err(|e| e.at(plugin.name(), "watchChange"))?
            {
                hints.extend(modules);
            }
        }
        Ok(hints)
    }

    /// Collect `handle_hot_update` hints from every plugin.
    pub fn handle_hot_update(&self, update: &HotUpdateContext) -> HookResult<Vec<String>> {
        let mut hints = Vec::new();
        for plugin in &self.plugins {
            if let Some(modules) = plugin
                .handle_hot_update(update)
                .map_err(|e| e.at(plugin.name(), "handleHotUpdate"))?
            {
                hints.extend(modules);
            }
        }
        Ok(hints)
    }

    /// Call `close_bundle` on every plugin.
    pub fn close_bundle(&self) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin
                .close_bundle(&self.ctx)
                .map_err(|e| e.at(plugin.name(), "closeBundle"))?;
        }
        Ok(())
    }
}

// ============================================================================
// Built-in plugins
// ============================================================================

/// Plugin that replaces identifiers with configured values.
///
/// Used to expose `define` config entries like `process.env.NODE_ENV`.
pub struct ReplacePlugin {
    replacements: Vec<(String, String)>,
}

impl ReplacePlugin {
    /// Create an empty replace plugin.
    #[must_use]
    pub fn new() -> Self {
        Self {
            replacements: Vec::new(),
        }
    }

    /// Add a replacement.
    #[must_use]
    pub fn replace(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.replacements.push((from.into(), to.into()));
        self
    }
}

impl Default for ReplacePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for ReplacePlugin {
    fn name(&self) -> &str {
        "replace"
    }

    fn transform(
        &self,
        code: &str,
        _id: &str,
        _ctx: &PluginContext,
    ) -> HookResult<Option<TransformResult>> {
        if self.replacements.is_empty() {
            return Ok(None);
        }

        let mut result = code.to_string();
        let mut changed = false;
        for (from, to) in &self.replacements {
            if result.contains(from.as_str()) {
                result = result.replace(from, to);
                changed = true;
            }
        }

        if changed {
            Ok(Some(TransformResult::code(result)))
        } else {
            Ok(None)
        }
    }
}

/// Plugin that serves modules that do not exist on disk.
pub struct VirtualPlugin {
    modules: HashMap<String, String>,
}

impl VirtualPlugin {
    /// Create an empty virtual-module plugin.
    #[must_use]
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Register a virtual module.
    #[must_use]
    pub fn module(mut self, id: impl Into<String>, code: impl Into<String>) -> Self {
        self.modules.insert(id.into(), code.into());
        self
    }
}

impl Default for VirtualPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for VirtualPlugin {
    fn name(&self) -> &str {
        "virtual"
    }

    fn resolve_id(
        &self,
        specifier: &str,
        _importer: Option<&str>,
        _ctx: &PluginContext,
    ) -> HookResult<Option<ResolvedId>> {
        if let Some(id) = specifier.strip_prefix("virtual:") {
            if self.modules.contains_key(id) {
                return Ok(Some(ResolvedId::resolved(format!("\0virtual:{id}"))));
            }
        }
        Ok(None)
    }

    fn load(&self, id: &str, _ctx: &PluginContext) -> HookResult<Option<LoadResult>> {
        if let Some(virtual_id) = id.strip_prefix("\0virtual:") {
            if let Some(code) = self.modules.get(virtual_id) {
                return Ok(Some(LoadResult::code(code)));
            }
        }
        Ok(None)
    }
}

/// Plugin that turns JSON sources into ES modules.
pub struct JsonPlugin;

impl Plugin for JsonPlugin {
    fn name(&self) -> &str {
        "json"
    }

    fn transform(
        &self,
        code: &str,
        id: &str,
        _ctx: &PluginContext,
    ) -> HookResult<Option<TransformResult>> {
        if !id.ends_with(".json") {
            return Ok(None);
        }
        Ok(Some(TransformResult::code(format!(
            "export default {};",
            code.trim()
        ))))
    }
}
