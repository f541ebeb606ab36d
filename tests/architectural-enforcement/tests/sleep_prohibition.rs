//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. The stream
//! controller waits on channels; nothing polls on a timer.
//! **Exceptions**: test code.

use architectural_enforcement::{report, rust_files, Violation, PRODUCTION_DIRS};

#[test]
fn test_no_sleep_in_production_code() {
    let mut violations: Vec<Violation> = Vec::new();

    for dir in PRODUCTION_DIRS {
        for file in rust_files(dir) {
            for (idx, code) in file.production_lines() {
                if code.contains("::sleep(") || code.contains(".sleep(") {
                    violations.push(file.violation(idx, "sleep call"));
                }
            }
        }
    }

    report(
        "Sleep calls found in production code! Wait on I/O or channels instead.",
        &violations,
    );
}
