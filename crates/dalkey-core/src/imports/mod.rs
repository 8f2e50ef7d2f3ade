//! Import specifier extraction.

mod scan;

pub use scan::{scan_imports, ImportKind, ImportSpec};
