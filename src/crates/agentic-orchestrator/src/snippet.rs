//! Snippet normalization policies.
//!
//! Pure, deterministic text transforms applied to LLM-authored snippets
//! before they reach `SnippetRuntime::compile`: strip code-fence wrappers,
//! assign a request-scoped default package when none is declared, insert a
//! small table of commonly-missing imports, and reject anything over the
//! configured byte cap. `normalize` is idempotent — running it twice on its
//! own output is a no-op past the first pass.

use crate::domain::Diagnostic;
use regex::Regex;
use std::sync::OnceLock;

fn package_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bpackage\s+([A-Za-z_][\w.]*)\s*;").unwrap())
}

fn public_class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bpublic\s+(?:final\s+|abstract\s+)?class\s+([A-Za-z_]\w*)").unwrap())
}

fn code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_+-]*\n(.*?)\n?```\s*$").unwrap())
}

/// `{symbol -> fully-qualified name}` table for the handful of
/// commonly-used standard-library symbols the policy auto-imports when used
/// unimported. Not exhaustive by design — it covers the common cases so a
/// retry cycle isn't spent purely on import bookkeeping.
const KNOWN_IMPORTS: &[(&str, &str)] = &[
    ("List", "java.util.List"),
    ("ArrayList", "java.util.ArrayList"),
    ("Map", "java.util.Map"),
    ("HashMap", "java.util.HashMap"),
    ("Set", "java.util.Set"),
    ("HashSet", "java.util.HashSet"),
    ("Optional", "java.util.Optional"),
    ("Objects", "java.util.Objects"),
    ("Collectors", "java.util.stream.Collectors"),
    ("Stream", "java.util.stream.Stream"),
    ("IOException", "java.io.IOException"),
    ("BigDecimal", "java.math.BigDecimal"),
    ("Duration", "java.time.Duration"),
    ("Instant", "java.time.Instant"),
    ("LocalDate", "java.time.LocalDate"),
    ("LocalDateTime", "java.time.LocalDateTime"),
    ("UUID", "java.util.UUID"),
    ("Pattern", "java.util.regex.Pattern"),
    ("Matcher", "java.util.regex.Matcher"),
    ("Comparator", "java.util.Comparator"),
    ("Collections", "java.util.Collections"),
    ("Arrays", "java.util.Arrays"),
    ("AtomicInteger", "java.util.concurrent.atomic.AtomicInteger"),
    ("AtomicLong", "java.util.concurrent.atomic.AtomicLong"),
    ("TimeUnit", "java.util.concurrent.TimeUnit"),
    ("CompletableFuture", "java.util.concurrent.CompletableFuture"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSnippet {
    pub source: String,
    pub package: String,
    pub qualified_class_name: String,
}

/// Strips a wrapping code fence, if present.
pub fn strip_code_fence(snippet: &str) -> String {
    match code_fence_re().captures(snippet) {
        Some(caps) => caps[1].to_string(),
        None => snippet.to_string(),
    }
}

/// Applies every normalization step and extracts the qualified class name.
/// Returns synthetic `Diagnostic`s (not an `OrchestratorError`) so the
/// bounded retry machine can feed them back to the LLM for the next
/// attempt, mirroring a compile failure.
pub fn normalize(snippet: &str, request_default_namespace: &str, max_bytes: usize) -> Result<NormalizedSnippet, Vec<Diagnostic>> {
    let stripped = strip_code_fence(snippet);

    if stripped.len() > max_bytes {
        return Err(vec![Diagnostic {
            file: None,
            line: None,
            column: None,
            message: format!(
                "snippet is {} bytes, exceeding the {} byte cap; shorten it",
                stripped.len(),
                max_bytes
            ),
        }]);
    }

    let (package, source) = ensure_package(&stripped, request_default_namespace);
    let class_name = match public_class_re().captures(&source) {
        Some(caps) => caps[1].to_string(),
        None => {
            return Err(vec![Diagnostic {
                file: None,
                line: None,
                column: None,
                message: "no public top-level class found; declare exactly one `public class Name { ... }`".to_string(),
            }]);
        }
    };

    let matches: Vec<_> = public_class_re().captures_iter(&source).collect();
    if matches.len() > 1 {
        return Err(vec![Diagnostic {
            file: None,
            line: None,
            column: None,
            message: format!("found {} public top-level classes; exactly one is required", matches.len()),
        }]);
    }

    let source = insert_known_imports(&source);

    Ok(NormalizedSnippet {
        qualified_class_name: format!("{package}.{class_name}"),
        source,
        package,
    })
}

fn ensure_package(source: &str, request_default_namespace: &str) -> (String, String) {
    if let Some(caps) = package_re().captures(source) {
        return (caps[1].to_string(), source.to_string());
    }
    let with_package = format!("package {request_default_namespace};\n\n{source}");
    (request_default_namespace.to_string(), with_package)
}

fn insert_known_imports(source: &str) -> String {
    let already_imported: Vec<&str> = source
        .lines()
        .filter_map(|line| line.trim().strip_prefix("import ")?.strip_suffix(';'))
        .collect();

    let mut missing = Vec::new();
    for (symbol, fqn) in KNOWN_IMPORTS {
        if already_imported.contains(fqn) {
            continue;
        }
        if uses_symbol(source, symbol) {
            missing.push(*fqn);
        }
    }

    if missing.is_empty() {
        return source.to_string();
    }

    // Insert right after the package declaration so the result stays
    // idempotent (re-running `normalize` sees the imports already present).
    let insertion_point = package_re()
        .find(source)
        .map(|m| m.end())
        .unwrap_or(0);
    let mut out = String::with_capacity(source.len() + missing.len() * 32);
    out.push_str(&source[..insertion_point]);
    out.push('\n');
    for fqn in missing {
        out.push_str("import ");
        out.push_str(fqn);
        out.push_str(";\n");
    }
    out.push_str(&source[insertion_point..]);
    out
}

/// Word-boundary search: a symbol "is used" if it appears as a standalone
/// identifier, not merely as a substring of another identifier.
fn uses_symbol(source: &str, symbol: &str) -> bool {
    let bytes = source.as_bytes();
    let symbol_bytes = symbol.as_bytes();
    let mut start = 0;
    while let Some(pos) = source[start..].find(symbol) {
        let idx = start + pos;
        let before_ok = idx == 0 || !is_ident_byte(bytes[idx - 1]);
        let after_idx = idx + symbol_bytes.len();
        let after_ok = after_idx >= bytes.len() || !is_ident_byte(bytes[after_idx]);
        if before_ok && after_ok {
            return true;
        }
        start = idx + 1;
    }
    false
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_code_fence_wrapper() {
        let wrapped = "```java\npublic class X {}\n```";
        assert_eq!(strip_code_fence(wrapped), "public class X {}");
    }

    #[test]
    fn leaves_unfenced_snippet_untouched() {
        let plain = "public class X {}";
        assert_eq!(strip_code_fence(plain), plain);
    }

    #[test]
    fn assigns_default_namespace_when_package_missing() {
        let result = normalize("public class Foo {}", "core.req_abc123", 1_000).unwrap();
        assert_eq!(result.package, "core.req_abc123");
        assert_eq!(result.qualified_class_name, "core.req_abc123.Foo");
        assert!(result.source.starts_with("package core.req_abc123;"));
    }

    #[test]
    fn preserves_declared_package() {
        let result = normalize("package com.example; public class Foo {}", "core.default", 1_000).unwrap();
        assert_eq!(result.package, "com.example");
        assert_eq!(result.qualified_class_name, "com.example.Foo");
    }

    #[test]
    fn rejects_snippet_with_no_public_class() {
        let err = normalize("package p; class Foo {}", "core.default", 1_000).unwrap_err();
        assert!(err[0].message.contains("no public top-level class"));
    }

    #[test]
    fn rejects_snippet_with_multiple_public_classes() {
        let src = "package p; public class A {} public class B {}";
        let err = normalize(src, "core.default", 1_000).unwrap_err();
        assert!(err[0].message.contains("exactly one is required"));
    }

    #[test]
    fn rejects_oversized_snippet() {
        let huge = format!("package p; public class Foo {{ {} }}", "x".repeat(2_000));
        let err = normalize(&huge, "core.default", 100).unwrap_err();
        assert!(err[0].message.contains("byte cap"));
    }

    #[test]
    fn inserts_missing_known_imports() {
        let src = "package p;\npublic class Foo { List<String> xs; }";
        let result = normalize(src, "core.default", 10_000).unwrap();
        assert!(result.source.contains("import java.util.List;"));
    }

    #[test]
    fn does_not_duplicate_existing_import() {
        let src = "package p;\nimport java.util.List;\npublic class Foo { List<String> xs; }";
        let result = normalize(src, "core.default", 10_000).unwrap();
        assert_eq!(result.source.matches("import java.util.List;").count(), 1);
    }

    #[test]
    fn does_not_import_symbols_that_are_only_substrings() {
        // "Sets" should not trigger an import of `Set`.
        let src = "package p;\npublic class Foo { String Sets = \"x\"; }";
        let result = normalize(src, "core.default", 10_000).unwrap();
        assert!(!result.source.contains("import java.util.Set;"));
    }

    #[test]
    fn normalize_is_idempotent() {
        let src = "public class Foo { List<String> xs; }";
        let once = normalize(src, "core.default", 10_000).unwrap();
        let twice = normalize(&once.source, "core.default", 10_000).unwrap();
        assert_eq!(once.source, twice.source);
        assert_eq!(once.qualified_class_name, twice.qualified_class_name);
    }
}
