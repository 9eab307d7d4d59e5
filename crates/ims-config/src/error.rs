// SPDX-License-Identifier: Apache-2.0
//! Configuration errors.

use thiserror::Error;

/// Errors raised while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric environment variable held a non-numeric value.
    #[error("{var} is not a valid number: {value:?}")]
    InvalidNumber {
        /// The offending variable's name.
        var: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },

    /// A JSON-typed environment variable failed to parse.
    #[error("{var} is not valid JSON: {source}")]
    InvalidJson {
        /// The offending variable's name.
        var: &'static str,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}
