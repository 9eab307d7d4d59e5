// SPDX-License-Identifier: Apache-2.0
//! Error types shared by the path accessor, BPQL parser, and regex normalizer.

use thiserror::Error;

/// Errors raised while reading or writing a [`crate::record::Record`] by path,
/// parsing BPQL text, or normalizing a "broken" regex pattern.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A `set` traversed a path segment that addresses a scalar which is
    /// neither absent nor itself a map, so no map can be created there.
    #[error("path {path:?} is not addressable: segment {segment:?} is not a map")]
    PathNotAMap {
        /// The full dotted path being written.
        path: String,
        /// The offending segment.
        segment: String,
    },

    /// A regex pattern failed to compile, even after the broken-regex
    /// autofix was applied.
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        /// The pattern that failed to compile (post-autofix, if attempted).
        pattern: String,
        /// The underlying compile error.
        #[source]
        source: regex::Error,
    },

    /// BPQL text referenced a comparison operator outside `{=, !=, IN, NOT IN}`.
    #[error("unsupported operator {0:?}")]
    UnsupportedOperator(String),

    /// BPQL text could not be tokenized or parsed into a condition.
    #[error("invalid BPQL condition: {0}")]
    ParseError(String),
}
