//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async functions MUST NOT use blocking I/O.
//! **Required**: `tokio::net`, `tokio::io`, async `reqwest`.
//! **Acceptable**: non-async functions (config loading at startup) and test code.

use architectural_enforcement::{report, rust_files, Violation, PRODUCTION_DIRS};

const FORBIDDEN: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
];

#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations: Vec<Violation> = Vec::new();

    for dir in PRODUCTION_DIRS {
        for file in rust_files(dir) {
            for (idx, code) in file.production_lines() {
                for (pattern, rule) in FORBIDDEN {
                    if code.contains(pattern) && file.in_async_fn(idx) {
                        violations.push(file.violation(idx, rule));
                    }
                }
            }
        }
    }

    report(
        "Blocking I/O found in async production code! Use tokio equivalents.",
        &violations,
    );
}

#[test]
fn test_no_blocking_http_client_anywhere() {
    let mut violations: Vec<Violation> = Vec::new();

    for dir in PRODUCTION_DIRS {
        for file in rust_files(dir) {
            for (idx, code) in file.production_lines() {
                if code.contains("reqwest::blocking") {
                    violations.push(file.violation(idx, "Blocking HTTP client"));
                }
            }
        }
    }

    report("reqwest::blocking is not allowed", &violations);
}
