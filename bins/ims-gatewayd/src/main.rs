// SPDX-License-Identifier: Apache-2.0
//! IMS event gateway daemon: HTTP ingress, rule-driven enrichment,
//! the plugin chain, the dispatcher, the activity poller, and
//! scheduled fetchers, wired together the way
//! `bins/jitosd/src/main.rs` wires the JITOS kernel behind an `axum`
//! router.

mod enrichment_plugin;
mod routes;
mod rule_source;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use ims_config::Config;
use ims_dispatch::{
    spawn_fetch_loops, ActivityLogClient, ActivityPoller, EventWorkers, IncidentChains, InMemoryDedupeStore,
};
use ims_plugins::PluginChain;
use ims_rules::RuleStore;

use enrichment_plugin::EnrichmentPlugin;
use rule_source::EmptyRuleSource;

/// Process-level flags, distinct from the feature-level environment
/// variables in the configuration table.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Port for the HTTP ingress adapter.
    #[clap(short, long, default_value_t = 3000)]
    port: u16,

    /// Number of background workers draining the event-dispatch queue.
    #[clap(long, default_value_t = 4)]
    event_workers: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env().context("loading configuration from environment")?;

    let filter = if config.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(Level::INFO.to_string())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(port = args.port, "starting ims-gatewayd");

    let rule_store = Arc::new(RuleStore::new(EmptyRuleSource));
    rule_store.load().await.context("initial rule store load")?;
    tokio::spawn(Arc::clone(&rule_store).run_refresh_loop(ims_rules::DEFAULT_REFRESH_INTERVAL));

    let enrich_config = ims_rules::EnrichConfig {
        debug_trace: config.debug,
        ..ims_rules::EnrichConfig::default()
    };
    let plugins = Arc::new(PluginChain::new(vec![Box::new(EnrichmentPlugin::new(
        Arc::clone(&rule_store),
        enrich_config,
    ))]));
    let http_client = reqwest::Client::new();
    let event_workers = Arc::new(EventWorkers::spawn(http_client.clone(), Arc::clone(&plugins), args.event_workers));

    {
        let event_workers = Arc::clone(&event_workers);
        let base_url = config.base_url.clone();
        spawn_fetch_loops(Arc::clone(&plugins), base_url, move |task| event_workers.enqueue(task));
    }

    if let (Some(token), Some(webhook_url)) = (config.api_token.clone(), config.webhook_dest_url.clone()) {
        let dedupe = Arc::new(InMemoryDedupeStore::default());
        let chains = IncidentChains::new(http_client.clone(), Arc::clone(&plugins));
        let api = ActivityLogClient::new(http_client.clone(), token);
        let poller = Arc::new(ActivityPoller::new(
            api,
            Arc::clone(&dedupe),
            chains,
            config.webhook_services_list.clone(),
            config.webhook_config_json.clone(),
            webhook_url,
            config.is_overview(),
            config.polling_interval.max(Duration::from_secs(1)),
        ));
        tokio::spawn(Arc::clone(&poller).run(|| chrono::Utc::now().timestamp()));
        tokio::spawn(sweep_dedupe_periodically(dedupe, config.keep_activity));
        info!("activity poller enabled");
    } else {
        info!("activity poller disabled: API_TOKEN or WEBHOOK_DEST_URL not configured");
    }

    let state = routes::AppState {
        event_workers,
        base_url: config.base_url.clone(),
        config: Arc::new(config),
    };
    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", args.port).parse::<std::net::SocketAddr>()?;
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP ingress listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}

/// Sweep the dedupe store's retention window once an hour.
async fn sweep_dedupe_periodically(dedupe: Arc<InMemoryDedupeStore>, retention: Duration) {
    use ims_dispatch::DedupeStore;
    let mut ticker = tokio::time::interval(Duration::from_secs(3600));
    loop {
        ticker.tick().await;
        dedupe.sweep(retention, chrono::Utc::now().timestamp()).await;
    }
}
