//! Import specifier scanner.
//!
//! Extracts import/require specifiers from JavaScript/TypeScript source
//! without a full parse. Covers static `import`, dynamic `import()`,
//! `export ... from`, and `require()` forms; line and block comments are
//! skipped. Known fragility: import-like text inside ordinary string
//! literals can be misread, which is acceptable for graph discovery.

use std::collections::HashSet;

/// The syntactic form an import specifier was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import ... from "x"` or `import "x"`.
    Static,
    /// `import("x")`.
    Dynamic,
    /// `export ... from "x"`.
    ExportFrom,
    /// `require("x")`.
    Require,
}

/// One import specifier found in source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Specifier exactly as written.
    pub raw: String,
    /// Which import form it came from.
    pub kind: ImportKind,
}

/// Scan source code for import/require specifiers.
///
/// Returns specifiers in first-appearance order, deduplicated by `raw`.
#[must_use]
pub fn scan_imports(source: &str) -> Vec<ImportSpec> {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut results = Vec::new();
    let mut seen = HashSet::new();
    let mut i = 0;

    let mut push = |raw: String, kind: ImportKind, results: &mut Vec<ImportSpec>| {
        if !raw.is_empty() && seen.insert(raw.clone()) {
            results.push(ImportSpec { raw, kind });
        }
    };

    while i < len {
        // Line comments.
        if chars[i] == '/' && i + 1 < len && chars[i + 1] == '/' {
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        // Block comments.
        if chars[i] == '/' && i + 1 < len && chars[i + 1] == '*' {
            i += 2;
            while i + 1 < len && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            i = (i + 2).min(len);
            continue;
        }

        if matches_keyword(&chars, i, "import") {
            let after = i + 6;
            if let Some((spec, kind, end)) = scan_import(&chars, after) {
                push(spec, kind, &mut results);
                i = end;
                continue;
            }
            i += 1;
            continue;
        }

        if matches_keyword(&chars, i, "export") {
            let after = i + 6;
            if let Some((spec, end)) = scan_from_clause(&chars, after) {
                push(spec, ImportKind::ExportFrom, &mut results);
                i = end;
                continue;
            }
            i += 1;
            continue;
        }

        if matches_keyword(&chars, i, "require") {
            let after = i + 7;
            if let Some((spec, end)) = scan_require(&chars, after) {
                push(spec, ImportKind::Require, &mut results);
                i = end;
                continue;
            }
            i += 1;
            continue;
        }

        i += 1;
    }

    results
}

/// Check whether `keyword` occurs at `pos` with word boundaries on both sides.
fn matches_keyword(chars: &[char], pos: usize, keyword: &str) -> bool {
    let kw: Vec<char> = keyword.chars().collect();
    if pos + kw.len() > chars.len() {
        return false;
    }
    if pos > 0 && is_ident_char(chars[pos - 1]) {
        return false;
    }
    if kw.iter().enumerate().any(|(j, &c)| chars[pos + j] != c) {
        return false;
    }
    if pos + kw.len() < chars.len() && is_ident_char(chars[pos + kw.len()]) {
        return false;
    }
    true
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn skip_ws(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

/// Read a quoted string starting at `i` if one is present.
/// Returns `(contents, position after the closing quote)`.
fn read_string(chars: &[char], i: usize) -> Option<(String, usize)> {
    let quote = *chars.get(i)?;
    if quote != '"' && quote != '\'' && quote != '`' {
        return None;
    }
    let mut j = i + 1;
    let start = j;
    while j < chars.len() && chars[j] != quote {
        if chars[j] == '\\' && j + 1 < chars.len() {
            j += 2;
            continue;
        }
        j += 1;
    }
    let spec: String = chars[start..j].iter().collect();
    Some((spec, j + 1))
}

/// Scan after the `import` keyword: dynamic `import(...)`, side-effect
/// `import "x"`, or `import ... from "x"`.
fn scan_import(chars: &[char], start: usize) -> Option<(String, ImportKind, usize)> {
    let mut i = skip_ws(chars, start);

    // Dynamic import: import("x").
    if chars.get(i) == Some(&'(') {
        i = skip_ws(chars, i + 1);
        let (spec, end) = read_string(chars, i)?;
        return Some((spec, ImportKind::Dynamic, end));
    }

    // Side-effect import: import "x".
    if let Some((spec, end)) = read_string(chars, i) {
        return Some((spec, ImportKind::Static, end));
    }

    // Named/default import: scan forward for the from clause.
    scan_from_clause(chars, i).map(|(spec, end)| (spec, ImportKind::Static, end))
}

/// Scan forward (bounded) for `from "x"`.
fn scan_from_clause(chars: &[char], start: usize) -> Option<(String, usize)> {
    let limit = (start + 600).min(chars.len());
    let mut i = start;
    while i < limit {
        // Statements without a from clause end here.
        if chars[i] == ';' {
            return None;
        }
        if matches_keyword(chars, i, "from") {
            let j = skip_ws(chars, i + 4);
            return read_string(chars, j);
        }
        i += 1;
    }
    None
}

/// Scan a `require("x")` call after the keyword.
fn scan_require(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut i = skip_ws(chars, start);
    if chars.get(i) != Some(&'(') {
        return None;
    }
    i = skip_ws(chars, i + 1);
    let (spec, mut end) = read_string(chars, i)?;
    end = skip_ws(chars, end);
    if chars.get(end) == Some(&')') {
        end += 1;
    }
    Some((spec, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raws(source: &str) -> Vec<String> {
        scan_imports(source).into_iter().map(|s| s.raw).collect()
    }

    #[test]
    fn test_static_import_from() {
        let imports = scan_imports(r#"import { foo } from "./dep";"#);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].raw, "./dep");
        assert_eq!(imports[0].kind, ImportKind::Static);
    }

    #[test]
    fn test_default_and_star_imports() {
        assert_eq!(raws(r#"import foo from "lodash";"#), vec!["lodash"]);
        assert_eq!(
            raws(r#"import * as utils from "./utils";"#),
            vec!["./utils"]
        );
    }

    #[test]
    fn test_side_effect_import() {
        let imports = scan_imports(r#"import "./polyfill";"#);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].raw, "./polyfill");
        assert_eq!(imports[0].kind, ImportKind::Static);
    }

    #[test]
    fn test_dynamic_import() {
        let imports = scan_imports(r#"const mod = await import("./lazy");"#);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].raw, "./lazy");
        assert_eq!(imports[0].kind, ImportKind::Dynamic);
    }

    #[test]
    fn test_export_from() {
        let imports = scan_imports(r#"export { foo } from "./dep";"#);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].kind, ImportKind::ExportFrom);

        let imports = scan_imports(r#"export * from "./all";"#);
        assert_eq!(imports[0].raw, "./all");
    }

    #[test]
    fn test_plain_export_is_not_an_import() {
        assert!(raws("export const x = 1;").is_empty());
        assert!(raws("export function f() {}").is_empty());
    }

    #[test]
    fn test_require() {
        let imports = scan_imports(r#"const dep = require("./dep");"#);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].raw, "./dep");
        assert_eq!(imports[0].kind, ImportKind::Require);
    }

    #[test]
    fn test_comments_ignored() {
        let source = r#"
// import gone from "line-commented"
/* import gone from "block-commented" */
/*
import gone from "multiline-commented"
*/
import real from "./real";
"#;
        assert_eq!(raws(source), vec!["./real"]);
    }

    #[test]
    fn test_order_and_dedup() {
        let source = r#"
import a from "./a";
import b from "./b";
import again from "./a";
const c = require("./c");
"#;
        assert_eq!(raws(source), vec!["./a", "./b", "./c"]);
    }

    #[test]
    fn test_single_quotes_and_scoped_packages() {
        assert_eq!(raws("import x from './single';"), vec!["./single"]);
        assert_eq!(
            raws(r#"import pkg from "@scope/package";"#),
            vec!["@scope/package"]
        );
    }

    #[test]
    fn test_empty_and_plain_sources() {
        assert!(raws("").is_empty());
        assert!(raws("console.log('hello');").is_empty());
    }

    #[test]
    fn test_importer_identifier_not_matched() {
        // "importer" contains "import" but is not the keyword.
        assert!(raws(r#"const importer = "./x";"#).is_empty());
    }
}
