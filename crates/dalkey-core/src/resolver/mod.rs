//! Import specifier resolution.
//!
//! Turns raw import specifiers into [`DependencyInfo`] edges. Resolution
//! order, first match wins:
//!
//! 1. URL specifiers (`http:`, `https:`, `//`) are external.
//! 2. Bare specifiers (no leading `.`/`/`, no scheme) are external unless
//!    the alias table rewrites them to a path, in which case resolution
//!    continues with the rewritten path anchored at the project root.
//! 3. Plugin `resolve_id` hooks, in order; the first non-null result wins.
//! 4. Filesystem probing relative to the importer's directory: the literal
//!    path, then the path plus each configured extension, then the path as
//!    a directory with `index` plus each extension.
//!
//! A probe miss keeps the edge with `resolved = None` so the failure
//! surfaces in the graph instead of being silently dropped as external.

use crate::config::Config;
use crate::plugin::{HookResult, PluginContainer};
use std::path::{Path, PathBuf};

/// The result of resolving one import edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyInfo {
    /// The specifier exactly as written in the importer.
    pub specifier: String,
    /// Resolved module identity (canonical path or virtual id), if any.
    pub resolved: Option<String>,
    /// External edges are never traversed.
    pub is_external: bool,
}

impl DependencyInfo {
    fn external(specifier: &str) -> Self {
        Self {
            specifier: specifier.to_string(),
            resolved: None,
            is_external: true,
        }
    }

    fn resolved(specifier: &str, id: String) -> Self {
        Self {
            specifier: specifier.to_string(),
            resolved: Some(id),
            is_external: false,
        }
    }

    fn unresolved(specifier: &str) -> Self {
        Self {
            specifier: specifier.to_string(),
            resolved: None,
            is_external: false,
        }
    }
}

/// Specifier resolver for one session.
///
/// Alias table and extension list come from the resolved config, so for a
/// fixed filesystem and plugin list the same `(specifier, importer)` pair
/// always resolves identically.
pub struct Resolver {
    root: PathBuf,
    /// `(prefix, replacement)` pairs in deterministic (sorted) order.
    aliases: Vec<(String, String)>,
    extensions: Vec<String>,
}

impl Resolver {
    /// Build a resolver from the session config.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            root: config.root.clone(),
            aliases: config
                .alias
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            extensions: config.extensions.clone(),
        }
    }

    /// Resolve one specifier from `importer`.
    ///
    /// Only fails when a plugin `resolve_id` hook fails; a resolution miss
    /// is a successful return with `resolved = None`.
    pub fn resolve(
        &self,
        specifier: &str,
        importer: &Path,
        plugins: &PluginContainer,
    ) -> HookResult<DependencyInfo> {
        // 1. URLs are always external.
        if is_url(specifier) {
            return Ok(DependencyInfo::external(specifier));
        }

        // 2. Bare specifiers: external unless aliased to a path. Scheme
        // ids like `virtual:env` are not bare; plugins get first crack.
        let mut effective = specifier.to_string();
        let mut aliased = false;
        if is_bare(specifier) {
            match self.apply_alias(specifier) {
                Some(rewritten) => {
                    effective = rewritten;
                    aliased = true;
                }
                None => return Ok(DependencyInfo::external(specifier)),
            }
        }

        // 3. Plugin resolution, first non-null wins.
        let importer_str = importer.display().to_string();
        if let Some(hit) = plugins.resolve_id(&effective, Some(&importer_str))? {
            if hit.external {
                return Ok(DependencyInfo::external(specifier));
            }
            return Ok(DependencyInfo::resolved(specifier, hit.id));
        }

        // 4. Filesystem probing.
        match self.probe(&effective, importer, aliased) {
            Some(path) => Ok(DependencyInfo::resolved(
                specifier,
                path.display().to_string(),
            )),
            None => Ok(DependencyInfo::unresolved(specifier)),
        }
    }

    /// Rewrite a bare specifier through the alias table, if it matches.
    fn apply_alias(&self, specifier: &str) -> Option<String> {
        for (from, to) in &self.aliases {
            if specifier == from {
                return Some(to.clone());
            }
            if let Some(rest) = specifier.strip_prefix(from.as_str()) {
                if rest.starts_with('/') {
                    return Some(format!("{to}{rest}"));
                }
            }
        }
        None
    }

    /// Probe the filesystem for a path specifier.
    ///
    /// Alias-rewritten specifiers are project-level paths: they anchor at
    /// the project root whether or not the target was written with a
    /// leading `./`.
    fn probe(&self, specifier: &str, importer: &Path, from_alias: bool) -> Option<PathBuf> {
        let base = if specifier.starts_with('/') {
            PathBuf::from(specifier)
        } else if from_alias {
            self.root
                .join(specifier.strip_prefix("./").unwrap_or(specifier))
        } else if specifier.starts_with('.') {
            importer.parent().unwrap_or(Path::new(".")).join(specifier)
        } else {
            self.root.join(specifier)
        };

        // Literal path.
        if base.is_file() {
            return canonical(&base);
        }

        // Path + extension, in configured order.
        for ext in &self.extensions {
            let candidate = PathBuf::from(format!("{}{ext}", base.display()));
            if candidate.is_file() {
                return canonical(&candidate);
            }
        }

        // Directory index.
        if base.is_dir() {
            for ext in &self.extensions {
                let candidate = base.join(format!("index{ext}"));
                if candidate.is_file() {
                    return canonical(&candidate);
                }
            }
        }

        None
    }
}

fn canonical(path: &Path) -> Option<PathBuf> {
    dunce::canonicalize(path).ok()
}

fn is_url(specifier: &str) -> bool {
    specifier.starts_with("http:") || specifier.starts_with("https:") || specifier.starts_with("//")
}

fn is_bare(specifier: &str) -> bool {
    !specifier.starts_with('.') && !specifier.starts_with('/') && !has_scheme(specifier)
}

/// A `:` before any path separator marks scheme ids like `virtual:env`,
/// which only plugins can resolve.
fn has_scheme(specifier: &str) -> bool {
    specifier
        .split(['/', '\\'])
        .next()
        .is_some_and(|head| head.contains(':'))
}
