use space_search::{
    api::{build_router, AppState},
    config::Config,
    index::IndexRegistry,
    ingestion::{event_channel, BasicExtractor, EventConsumer, Extractor, NatsEventBridge, PlainTextExtractor},
    search::SearchService,
    storage::{MemoryGateway, StorageGateway},
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    init_tracing(&config);

    if let Some(e) = config_error {
        tracing::warn!(error = %e, "Failed to load configuration, using defaults");
    }

    tracing::info!("Starting space-search v{}", env!("CARGO_PKG_VERSION"));

    // Storage gateway
    let gateway: Arc<dyn StorageGateway> = match &config.storage.fixture_path {
        Some(path) => {
            let gateway = MemoryGateway::from_fixture(path)?;
            tracing::info!(fixture = %path.display(), "Storage gateway loaded from fixture");
            Arc::new(gateway)
        }
        None => {
            tracing::warn!("No storage fixture configured, serving empty storage");
            Arc::new(MemoryGateway::new())
        }
    };

    // Per-space index partitions
    tracing::info!(backend = %config.index.backend, path = %config.index.path.display(), "Index backend selected");
    let indexes = Arc::new(IndexRegistry::new(config.index.clone()));

    let extractor: Arc<dyn Extractor> = if config.ingestion.extract_content {
        Arc::new(PlainTextExtractor::new(
            gateway.clone(),
            config.ingestion.max_content_bytes,
        ))
    } else {
        Arc::new(BasicExtractor)
    };

    let service = Arc::new(SearchService::new(
        gateway,
        indexes,
        extractor,
        config.search.clone(),
        config.ingestion.clone(),
    ));
    tracing::info!(
        per_space_timeout_ms = config.search.per_space_timeout_ms,
        max_concurrent_spaces = config.search.max_concurrent_spaces,
        "Search service initialized"
    );

    let shutdown = CancellationToken::new();
    let mut app_state = AppState::new(service.clone())
        .with_request_timeout(Duration::from_secs(config.server.request_timeout_secs))
        .with_prometheus(config.observability.prometheus_enabled);

    // Lifecycle event bus
    let mut consumer_handle = None;
    if config.events.enabled {
        let (sender, receiver) = event_channel(config.events.channel_capacity);
        let consumer = EventConsumer::new(service.pipeline(), receiver, shutdown.clone());
        consumer_handle = Some(tokio::spawn(consumer.run()));
        tracing::info!(capacity = config.events.channel_capacity, "Event consumer started");

        if let Some(url) = &config.events.nats_url {
            match NatsEventBridge::connect(url, config.events.subject.clone(), sender.clone()).await {
                Ok(bridge) => {
                    let cancel = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.run(cancel).await {
                            tracing::error!(error = %e, "NATS event bridge failed");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "NATS bridge unavailable, continuing with HTTP events only");
                }
            }
        }

        app_state = app_state.with_events(sender);
    } else {
        tracing::info!("Event ingestion disabled in configuration");
    }

    let app = build_router(app_state);

    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;

    tracing::info!("HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Search API: http://{}/v1/search", http_addr);

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        signal.cancel();
    });

    let graceful = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { graceful.cancelled().await })
        .await?;

    // Stop background tasks once the server has drained
    shutdown.cancel();
    if let Some(handle) = consumer_handle {
        match handle.await {
            Ok(handled) => tracing::info!(handled, "Event consumer drained"),
            Err(e) => tracing::warn!(error = %e, "Event consumer task aborted"),
        }
    }

    tracing::info!("Shut down gracefully");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "space_search={},tower_http=info",
            config.observability.log_level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
