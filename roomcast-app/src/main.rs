//! Composition root: builds the component graph once, wires every
//! adapter into the coordinator, starts the background tasks and the HTTP
//! ambient surface, then runs until shutdown.

mod knx_transport;
mod observer;
mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use roomcast_adapters::{InboundTelegram, KnxEgress, KnxIngress, MqttAdapter, MqttEgress, SnapcastEgress};
use roomcast_catalog::{CatalogBackend, CatalogProvider, StaticCatalogBackend};
use roomcast_config::Config;
use roomcast_coordinator::{Coordinator, Deps};
use roomcast_core::StateStore;
use roomcast_pipeline::PipelineManager;
use roomcast_reconciler::Reconciler;
use roomcast_server::{AppState, HttpEgress, Readiness};
use roomcast_snapcast::{ConnectionState, SnapcastClient};

use knx_transport::LoggingKnxTransport;

/// How long the composition root waits for the first Snapcast connection
/// before giving up. `SnapcastClient` itself retries
/// forever with backoff once connected at least once; this budget only
/// bounds the very first attempt at startup.
const STARTUP_CONNECT_BUDGET: Duration = Duration::from_secs(30);
const STARTUP_CONNECT_POLL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::load(None) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(2);
        }
    };
    roomcast_config::init_global(config.clone());

    let initial_snapshot = snapshot::build(&config);
    let store = Arc::new(StateStore::new(initial_snapshot));

    tokio::fs::create_dir_all(config.sink_dir())
        .await
        .with_context(|| format!("creating pipeline sink directory {}", config.sink_dir().display()))?;

    let snapcast = Arc::new(SnapcastClient::new(
        config.snapcast_host(),
        config.snapcast_port(),
        Duration::from_millis(config.snapcast_rpc_timeout_ms()),
        Duration::from_millis(config.snapcast_reconnect_backoff_max_ms()),
    ));
    snapcast.connect().await;
    wait_for_initial_connection(&snapcast).await;

    let reconciler = Arc::new(Reconciler::new(snapcast.clone(), store.clone(), config.reconciler_max_concurrent_groups()));

    let pipeline = PipelineManager::new(
        config.decoder_bin(),
        config.sink_dir(),
        Duration::from_millis(config.sink_flush_interval_ms()),
        Duration::from_millis(config.pipeline_stop_deadline_ms()),
    );

    let catalog_backend: Arc<dyn CatalogBackend> = match config.catalog_source_path() {
        Some(path) => {
            let backend = StaticCatalogBackend::from_file(&path).with_context(|| {
                format!("loading catalog source {} (catalog.source_path)", path.display())
            })?;
            Arc::new(backend)
        }
        None => {
            info!("catalog.source_path not configured; starting with an empty catalog");
            Arc::new(StaticCatalogBackend::empty())
        }
    };
    let catalog = Arc::new(CatalogProvider::new(catalog_backend, Duration::from_secs(config.catalog_cache_ttl_secs())));

    let deps = Deps { store: store.clone(), reconciler: reconciler.clone(), pipeline: pipeline.clone(), catalog: catalog.clone() };
    let coordinator = Coordinator::new(
        deps,
        config.inbound_queue_capacity(),
        Duration::from_millis(config.debounce_ms()),
        Duration::from_millis(config.echo_suppression_ms()),
    );

    let readiness = Readiness::new();
    let app_state = AppState::new(store.clone(), coordinator.clone(), readiness.clone());

    coordinator.register_egress(Arc::new(HttpEgress::new(app_state.status_tx.clone()))).await;
    coordinator.register_egress(Arc::new(SnapcastEgress::new(snapcast.clone(), store.clone()))).await;

    // Keeps the KNX inbound channel open for the lifetime of the process,
    // even though nothing feeds it yet: real bus/gateway wire framing is out
    // of scope, so this is the hook a future `KnxTransport`-
    // paired ingress driver would send `InboundTelegram`s into.
    let mut _knx_telegram_tx = None;

    if config.mqtt_enabled() {
        match start_mqtt(&config, &coordinator).await {
            Ok(()) => info!(broker = %config.mqtt_broker_url(), "mqtt adapter connected"),
            Err(e) => warn!(error = %e, "mqtt adapter disabled: failed to connect to broker"),
        }
    }

    if config.knx_enabled() {
        let (telegram_tx, telegram_rx) = tokio::sync::mpsc::channel::<InboundTelegram>(64);
        let (cmd_tx, mut cmd_rx) = tokio::sync::mpsc::channel(256);
        KnxIngress::new().spawn(telegram_rx, cmd_tx);
        let knx_coordinator = coordinator.clone();
        tokio::spawn(async move {
            while let Some(tagged) = cmd_rx.recv().await {
                knx_coordinator.submit(tagged.source, tagged.command).await;
            }
        });
        coordinator.register_egress(Arc::new(KnxEgress::new(Arc::new(LoggingKnxTransport)))).await;
        _knx_telegram_tx = Some(telegram_tx);
        info!(gateway = %config.knx_gateway_addr(), "knx adapter registered (logging transport, no gateway wired)");
    }

    coordinator.spawn_workers();

    observer::spawn_snapcast_observer(snapcast.clone(), store.clone(), coordinator.clone(), reconciler.clone(), readiness.clone());
    observer::spawn_connection_state_watcher(snapcast.clone(), readiness.clone());
    observer::spawn_pipeline_observer(pipeline.clone(), store.clone(), coordinator.clone());
    spawn_reconciliation_ticker(reconciler.clone(), readiness.clone(), config.reconcile_interval_secs());

    let listener = TcpListener::bind(("0.0.0.0", config.http_port()))
        .await
        .with_context(|| format!("binding http listener on port {}", config.http_port()))?;
    info!(port = config.http_port(), base_url = %config.base_url(), "http surface listening");

    axum::serve(listener, roomcast_server::router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    info!("shutdown signal received; stopping active pipelines");
    pipeline.shutdown_all().await;
    snapcast.disconnect().await;
    info!("shutdown complete");
    Ok(())
}

async fn wait_for_initial_connection(snapcast: &Arc<SnapcastClient>) {
    let deadline = tokio::time::Instant::now() + STARTUP_CONNECT_BUDGET;
    loop {
        if snapcast.state().await == ConnectionState::Connected {
            info!("snapcast daemon connection established");
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            error!(budget = ?STARTUP_CONNECT_BUDGET, "snapcast daemon unreachable within the startup retry budget");
            std::process::exit(3);
        }
        tokio::time::sleep(STARTUP_CONNECT_POLL).await;
    }
}

async fn start_mqtt(config: &Config, coordinator: &Arc<Coordinator>) -> Result<(), roomcast_adapters::AdapterError> {
    let (command_tx, mut command_rx) = tokio::sync::mpsc::channel(256);
    let (adapter, driver) = MqttAdapter::connect(&config.mqtt_broker_url(), &config.mqtt_topic_root(), command_tx).await?;
    tokio::spawn(driver);

    coordinator.register_egress(Arc::new(MqttEgress::new(&adapter))).await;

    let mqtt_coordinator = coordinator.clone();
    tokio::spawn(async move {
        while let Some(tagged) = command_rx.recv().await {
            mqtt_coordinator.submit(tagged.source, tagged.command).await;
        }
    });

    // The adapter's `AsyncClient` handle is cheap to clone and already
    // captured by the egress and the background event loop; the adapter
    // value itself has nothing left to own once both are spawned.
    drop(adapter);
    Ok(())
}

fn spawn_reconciliation_ticker(reconciler: Arc<Reconciler>, readiness: Arc<Readiness>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            let report = reconciler.reconcile().await;
            if !report.errors.is_empty() {
                warn!(errors = ?report.errors, "periodic reconciliation reported errors");
            }
            readiness.mark_reconciled();
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install ctrl-c handler; shutting down anyway");
    }
}
