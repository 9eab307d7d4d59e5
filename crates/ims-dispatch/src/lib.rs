// SPDX-License-Identifier: Apache-2.0
//! Dispatcher, activity poller, and scheduled fetchers for the IMS gateway.

pub mod activity_client;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod poller;
pub mod sender;
pub mod webhook;

pub use activity_client::ActivityLogClient;
pub use error::{DispatchError, InvalidPayload};
pub use fetcher::{run_fetch_source, spawn_fetch_loops};
pub use model::{validate_v2_payload, DestinationType};
pub use poller::{ActivityApi, ActivityPoller, DedupeStore, InMemoryDedupeStore, DEFAULT_RETENTION};
pub use sender::{send_event, send_webhook, EventTask, EventWorkers, IncidentChains, WebhookTask};
