//! Diagnostic reporting for the anc compiler.
//!
//! Compact rustc-style error output: a colored `error:` header, a
//! `file:line:col` location, the offending source line, and caret markers
//! under the reported span. Lowering keeps walking after an error so a
//! single run can surface several diagnostics; tests silence output with
//! the RAII `suppress()` guard.

use crate::ast::Loc;
use std::sync::atomic::{AtomicBool, Ordering};

static DIAGNOSTICS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Prints an error with source context to stderr.
///
/// `source` is the full text of the unit being compiled; the line named by
/// `loc` is excerpted with a caret run covering the span when the span stays
/// on one line.
pub fn report_error(file: &str, source: &str, loc: Loc, message: &str) {
    if !DIAGNOSTICS_ENABLED.load(Ordering::SeqCst) {
        return;
    }
    let red = "\x1b[31m";
    let bold = "\x1b[1m";
    let reset = "\x1b[0m";

    eprintln!("{}{}error{}: {}", bold, red, reset, message);
    eprintln!("  --> {}:{}:{}", file, loc.line, loc.col);

    if let Some(line) = source.lines().nth(loc.line.saturating_sub(1) as usize) {
        eprintln!("{:4} | {}", loc.line, line);
        let mut caret = String::new();
        for _ in 1..loc.col {
            caret.push(' ');
        }
        let width = if loc.end_line == loc.line && loc.end_col >= loc.col {
            (loc.end_col - loc.col + 1) as usize
        } else {
            1
        };
        for _ in 0..width {
            caret.push('^');
        }
        eprintln!("     | {}{}{}", red, caret, reset);
    }
}

/// Prints a note without source context, e.g. for driver-level failures.
pub fn report_note(message: &str) {
    if !DIAGNOSTICS_ENABLED.load(Ordering::SeqCst) {
        return;
    }
    let blue = "\x1b[34m";
    let reset = "\x1b[0m";
    eprintln!("{}note{}: {}", blue, reset, message);
}

/// Temporarily silences diagnostic output; used by tests that exercise
/// error paths. The previous state is restored when the guard drops.
pub fn suppress() -> SuppressGuard {
    let prev = DIAGNOSTICS_ENABLED.swap(false, Ordering::SeqCst);
    SuppressGuard { prev }
}

pub struct SuppressGuard {
    prev: bool,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        DIAGNOSTICS_ENABLED.store(self.prev, Ordering::SeqCst);
    }
}
