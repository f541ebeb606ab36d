//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the knowbot sources:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//! - No panicking shortcuts in the core library
//!
//! The helpers here scan source text; they are line-based on purpose and
//! rely on one convention: a file's `#[cfg(test)]` module comes last.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["knowbot/core/src", "knowbot/cli/src"];

/// Core library source directory, relative to the workspace root
pub const CORE_DIR: &str = "knowbot/core/src";

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the line is in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What rule it breaks
    pub rule: &'static str,
    /// The line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.rule,
            self.text
        )
    }
}

/// A source file loaded for scanning
pub struct SourceFile {
    /// Path on disk
    pub path: PathBuf,
    /// Raw lines
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Load a file; `None` if it cannot be read
    pub fn load(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        Some(Self {
            path: path.to_path_buf(),
            lines: content.lines().map(str::to_string).collect(),
        })
    }

    /// Non-test lines with comments stripped, as `(index, code)`
    ///
    /// Stops at the first `#[cfg(test)]`.
    pub fn production_lines(&self) -> Vec<(usize, &str)> {
        self.lines
            .iter()
            .enumerate()
            .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
            .map(|(idx, line)| (idx, strip_comment(line)))
            .filter(|(_, code)| !code.trim().is_empty())
            .collect()
    }

    /// Whether the function enclosing line `idx` is `async`
    pub fn in_async_fn(&self, idx: usize) -> bool {
        for line in self.lines[..=idx].iter().rev() {
            let code = strip_comment(line);
            if let Some(pos) = code.find("fn ") {
                let before = &code[..pos];
                let is_item = before
                    .split_whitespace()
                    .all(|w| matches!(w, "pub" | "pub(crate)" | "async" | "const" | "unsafe"));
                if is_item {
                    return before.contains("async");
                }
            }
        }
        false
    }

    /// Record a violation for line `idx`
    pub fn violation(&self, idx: usize, rule: &'static str) -> Violation {
        Violation {
            path: self.path.clone(),
            line: idx + 1,
            rule,
            text: self.lines[idx].trim().to_string(),
        }
    }
}

/// Drop a trailing `//` comment
pub fn strip_comment(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Workspace root (two levels above this package)
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Every `.rs` file under `dir` (relative to the workspace root)
pub fn rust_files(dir: &str) -> Vec<SourceFile> {
    let root = workspace_root().join(dir);
    if !root.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter_map(|e| SourceFile::load(e.path()))
        .collect()
}

/// Print violations and fail the test
pub fn report(title: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n{title}\n");
    for violation in violations {
        eprintln!("  {violation}");
    }
    panic!(
        "\nFound {} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(src: &str) -> SourceFile {
        SourceFile {
            path: PathBuf::from("mem.rs"),
            lines: src.lines().map(str::to_string).collect(),
        }
    }

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let f = file("fn a() {}\n// note\nfn b() {}\n#[cfg(test)]\nmod tests {}\n");
        let idx: Vec<_> = f.production_lines().iter().map(|(i, _)| *i).collect();
        assert_eq!(idx, vec![0, 2]);
    }

    #[test]
    fn test_in_async_fn() {
        let f = file("pub async fn a() {\n    x();\n}\nfn b() {\n    y();\n}\n");
        assert!(f.in_async_fn(1));
        assert!(!f.in_async_fn(4));
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("x(); // y"), "x(); ");
    }

    #[test]
    fn test_workspace_root_has_core() {
        assert!(workspace_root().join(CORE_DIR).exists());
    }
}
