// SPDX-License-Identifier: Apache-2.0
//! Repairs user-authored "glob-ish" patterns into valid regex text.
//!
//! Applied on rule load, not at evaluation time, per the design notes: a
//! pattern flagged `regex` gets this treatment before being compiled;
//! `formal-regex` patterns are left strict, with the same fixup tried once
//! as a fallback only if the strict compile fails.

use regex::{Regex, RegexBuilder};

use crate::error::KernelError;

/// Rewrite every `*` not preceded by `.` into `.*`, and escape any unescaped
/// `(`/`)` so a bare glob like `web*(prod)` becomes a valid anchorable regex.
pub fn autofix(pattern: &str) -> String {
    let starred = rewrite_stars(pattern);
    escape_parens(&starred)
}

fn rewrite_stars(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut prev = None;
    for ch in pattern.chars() {
        if ch == '*' && prev != Some('.') {
            out.push_str(".*");
        } else {
            out.push(ch);
        }
        prev = Some(ch);
    }
    out
}

fn escape_parens(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut prev = None;
    for ch in pattern.chars() {
        if (ch == '(' || ch == ')') && prev != Some('\\') {
            out.push('\\');
        }
        out.push(ch);
        prev = Some(ch);
    }
    out
}

/// Compile `pattern` as a "broken-regex"-flagged pattern: autofix first,
/// then compile. Signals [`KernelError::InvalidRegex`] if it still fails.
pub fn compile_broken(pattern: &str) -> Result<Regex, KernelError> {
    let fixed = autofix(pattern);
    Regex::new(&fixed).map_err(|source| KernelError::InvalidRegex {
        pattern: fixed,
        source,
    })
}

/// Same as [`compile_broken`], but case-insensitive — the `=`/`IN` family
/// of operators compare a `regex`-kind atom case-insensitively.
pub fn compile_broken_ci(pattern: &str) -> Result<Regex, KernelError> {
    let fixed = autofix(pattern);
    RegexBuilder::new(&fixed)
        .case_insensitive(true)
        .build()
        .map_err(|source| KernelError::InvalidRegex {
            pattern: fixed,
            source,
        })
}

/// Compile `pattern` strictly (no autofix), falling back to one autofix
/// attempt if the strict compile fails. Used for `formal-regex` atoms.
pub fn compile_formal(pattern: &str) -> Result<Regex, KernelError> {
    match Regex::new(pattern) {
        Ok(re) => Ok(re),
        Err(_) => {
            tracing::warn!(pattern, "formal-regex failed to compile, retrying with autofix");
            compile_broken(pattern)
        }
    }
}
