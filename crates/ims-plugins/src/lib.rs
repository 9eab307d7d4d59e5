// SPDX-License-Identifier: Apache-2.0
//! Plugin-filter chain for the IMS gateway: ordered filters run over
//! outbound events and webhooks, plus scheduled event sources.

pub mod chain;
pub mod error;

pub use chain::{validate_event_return, EventOutcome, FetchSchedule, PluginChain, PluginFilter, WebhookOutcome};
pub use error::PluginError;
