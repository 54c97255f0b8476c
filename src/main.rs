//! Bootstrap binary: wires the command-and-control core's adapters and
//! services together and runs the retention sweep on a timer.
//!
//! This binary intentionally does not expose an HTTP/REST surface or the
//! node-facing WebSocket transport — those are a separate deployment
//! concern that embeds this crate and drives `CommandRouter`/`HostAggregator`
//! from its own connection-handling loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::time::{interval, Duration};

use woly_coreplane::adapters::node_registry::InMemoryNodeRegistry;
use woly_coreplane::adapters::sqlite::{initialize_configured_database, SqliteCommandStore, SqliteHostStore, SqlitePushStore, SqliteWebhookStore};
use woly_coreplane::domain::ports::NullPushProvider;
use woly_coreplane::infrastructure::config::ConfigLoader;
use woly_coreplane::infrastructure::logging::{LogConfig, LoggerImpl};
use woly_coreplane::services::{CommandRouter, EventBus, HostAggregator, PluginEventBridge, PushDispatcher, RetentionSweeper, RouterConfig, WebhookDispatcher};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;

    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging)).context("failed to initialize logging")?;

    let pool = initialize_configured_database(&config.database).await.context("failed to initialize database")?;

    let command_store = Arc::new(SqliteCommandStore::new(pool.clone()));
    let host_store = Arc::new(SqliteHostStore::new(pool.clone()));
    let webhook_store = Arc::new(SqliteWebhookStore::new(pool.clone()));
    let push_store = Arc::new(SqlitePushStore::new(pool.clone()));

    let host_aggregator = Arc::new(HostAggregator::new(host_store.clone()));
    let node_registry = Arc::new(InMemoryNodeRegistry::new(config.node.timeout_ms));

    let event_bus = Arc::new(EventBus::new());
    let event_bridge = Arc::new(PluginEventBridge::new(event_bus.clone()));
    event_bridge.attach_to_registry(node_registry.as_ref());

    let webhook_dispatcher = Arc::new(WebhookDispatcher::new(webhook_store.clone(), config.webhook.delivery_timeout_ms, config.webhook.retry_base_delay_ms));
    webhook_dispatcher.attach_to_bus(&event_bus);

    let push_dispatcher = Arc::new(PushDispatcher::new(push_store.clone(), Arc::new(NullPushProvider), config.push.enabled));
    push_dispatcher.attach_to_bus(&event_bus);

    let router_config = RouterConfig {
        command_timeout_ms: config.command.timeout_ms,
        max_retries: config.command.max_retries,
        retry_base_delay_ms: config.command.retry_base_delay_ms,
        offline_command_ttl_ms: config.command.offline_ttl_ms,
    };
    let command_router = Arc::new(CommandRouter::new(command_store.clone(), node_registry.clone(), host_aggregator.clone(), router_config));
    command_router.attach_to_registry();
    command_router.reconcile_stale_in_flight().await.context("failed to reconcile stale in-flight commands")?;

    let retention_sweeper = RetentionSweeper::new(command_store.clone(), host_store.clone(), config.command.retention_days, config.command.retention_days);

    tracing::info!(database = %config.database.path, "woly-coreplane core initialized");

    let mut retention_tick = interval(Duration::from_secs(24 * 60 * 60));
    loop {
        tokio::select! {
            _ = retention_tick.tick() => {
                match retention_sweeper.run_once().await {
                    Ok(report) => tracing::info!(?report, "retention sweep complete"),
                    Err(err) => tracing::error!(%err, "retention sweep failed"),
                }
            }
            _ = signal::ctrl_c() => {
                tracing::info!("received shutdown signal, exiting");
                break;
            }
        }
    }

    Ok(())
}
