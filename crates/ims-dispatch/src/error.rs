// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy for the dispatcher, activity poller, and scheduled
//! fetchers.

use thiserror::Error;

/// The outcome of one HTTP dispatch attempt.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Network failure or timeout. Retried with exponential backoff.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// HTTP 429. Retried with jittered backoff, uncapped.
    #[error("throttled (429)")]
    Throttled,

    /// HTTP 4xx other than 429. Logged, dropped, never retried.
    #[error("client error: HTTP {0}")]
    ClientInvalid(u16),

    /// HTTP 5xx. Retried with backoff up to the caller's cap.
    #[error("server error: HTTP {0}")]
    ServerError(u16),
}

/// Errors from loading/validating inbound payloads at the ingress adapter
/// or while reconstructing webhooks from activity entries.
#[derive(Debug, Error)]
pub enum InvalidPayload {
    /// The v2 ingress payload failed structural validation.
    #[error("Invalid PD events v2 payload")]
    BadV2Payload,
    /// The routing key didn't match either integration-key pattern.
    #[error("Invalid routing key")]
    BadRoutingKey,
    /// The request body was empty.
    #[error("empty body")]
    EmptyBody,
}
