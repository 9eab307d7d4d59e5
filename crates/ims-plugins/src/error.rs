// SPDX-License-Identifier: Apache-2.0
//! Errors surfaced by the plugin chain.

use thiserror::Error;

/// A plugin returned a shape that doesn't satisfy its operation's contract
///. Treated as a no-op: the caller logs and continues with the
/// pre-filter value.
#[derive(Debug, Error)]
pub enum PluginError {
    /// `filter_event`/`filter_webhook` returned something other than
    /// `null`, a map, or the expected tuple shape.
    #[error("plugin {plugin} returned an invalid shape for {op}: {reason}")]
    BadReturn {
        /// The plugin's name, for logging.
        plugin: &'static str,
        /// Which operation was invoked.
        op: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The plugin itself raised an error running the operation.
    #[error("plugin {plugin} failed during {op}: {source}")]
    Failed {
        /// The plugin's name, for logging.
        plugin: &'static str,
        /// Which operation was invoked.
        op: &'static str,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },
}
