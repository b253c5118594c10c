use anyhow::{Context, Result};
use std::sync::Arc;
use todo_service::api::{start_api_server, AppState};
use todo_service::{
    Config, KafkaPublisher, PgTodoRepository, RetryPolicy, S3FileStorage, TodoService,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Todo Service"
    );

    init_metrics(config.service.metrics_port)?;

    let repository = Arc::new(
        PgTodoRepository::new(&config.database)
            .await
            .context("Failed to initialize todo repository")?,
    );

    if config.database.run_migrations {
        repository
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let file_storage = Arc::new(
        S3FileStorage::new(&config.s3)
            .await
            .context("Failed to initialize S3 file storage")?,
    );

    let publisher =
        Arc::new(KafkaPublisher::new(&config.kafka).context("Failed to initialize Kafka publisher")?);

    info!(
        bucket = %file_storage.bucket(),
        topic = %publisher.topic(),
        "Todo collaborators ready"
    );

    let pool = repository.pool().clone();
    let todo_service = Arc::new(
        TodoService::new(repository, file_storage, publisher)
            .with_publish_retry(RetryPolicy::from_config(&config.publish)),
    );

    let shutdown = CancellationToken::new();
    let api_state = AppState {
        todo_service,
        pool,
        request_timeout: config.request_timeout(),
        shutdown: shutdown.clone(),
    };

    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Todo service started successfully");

    shutdown_signal().await;

    info!("Shutting down todo service");

    // Stops the listener and aborts creations still in flight
    shutdown.cancel();
    if let Err(e) = api_handle.await {
        error!(error = %e, "API server task failed");
    }

    info!("Todo service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
