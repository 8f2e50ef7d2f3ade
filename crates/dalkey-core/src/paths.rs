//! Path classification helpers shared by the build and dev paths.

use std::path::Path;

/// Extensions treated as script modules (transformed before serving/emitting).
pub const SCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Source-language extensions rewritten to `.js` in build output.
const REWRITTEN_EXTENSIONS: &[&str] = &["ts", "tsx", "jsx", "mts", "cts"];

/// Check whether an extension (without the dot) is script-like.
#[must_use]
pub fn is_script_ext(ext: &str) -> bool {
    SCRIPT_EXTENSIONS.contains(&ext)
}

/// Check whether a path has a script-like extension.
#[must_use]
pub fn is_script_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(is_script_ext)
}

/// Rewrite a source-language extension to the neutral `.js` output extension.
///
/// Paths with a non-source extension (or none) are returned unchanged.
#[must_use]
pub fn rewrite_output_ext(path: &Path) -> std::path::PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if REWRITTEN_EXTENSIONS.contains(&ext) => path.with_extension("js"),
        _ => path.to_path_buf(),
    }
}
