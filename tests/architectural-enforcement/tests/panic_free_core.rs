//! Integration Test: Panic-Free Core
//!
//! **Policy**: The core library propagates errors or degrades (skips a
//! frame, fails a stream); it never panics on bad input or a bad network.
//! **Exceptions**: test code.

use architectural_enforcement::{report, rust_files, Violation, CORE_DIR};

const FORBIDDEN: &[(&str, &str)] = &[
    (".unwrap()", "unwrap"),
    (".expect(", "expect"),
    ("panic!(", "panic"),
    ("todo!(", "todo"),
    ("unimplemented!(", "unimplemented"),
];

#[test]
fn test_no_panicking_shortcuts_in_core() {
    let mut violations: Vec<Violation> = Vec::new();

    for file in rust_files(CORE_DIR) {
        for (idx, code) in file.production_lines() {
            for (pattern, rule) in FORBIDDEN {
                if code.contains(pattern) {
                    violations.push(file.violation(idx, rule));
                }
            }
        }
    }

    report(
        "Panicking calls found in knowbot-core! Return a Result instead.",
        &violations,
    );
}
