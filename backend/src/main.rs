//! Smart Irrigation Platform - Backend Server
//!
//! Learns per field how far rain forecasts can be trusted and turns that,
//! together with live moisture readings, into pump decisions.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use shared::FieldScope;
use smart_irrigation_backend::{
    config::Config,
    create_app,
    external::WeatherClient,
    ml::{FsArtifactStore, JsonFileRegistry},
    scheduler::{PeriodicTask, RainCheckJob, RetrainJob},
    services::{FieldRepository, IrrigationService, PgFieldRepository, PgNotificationSink, PredictionService},
    AppState,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "irrigation_server=debug,smart_irrigation_backend=debug,tower_http=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Smart Irrigation Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    // Model storage
    let artifacts = Arc::new(FsArtifactStore::new(&config.ml.models_dir)?);
    let registry = Arc::new(JsonFileRegistry::in_dir(&config.ml.models_dir));
    tracing::info!("Model directory: {}", config.ml.models_dir.display());

    // Services
    let fields: Arc<dyn FieldRepository> = Arc::new(PgFieldRepository::new(db_pool.clone()));
    let prediction = Arc::new(PredictionService::new(
        fields.clone(),
        artifacts,
        registry,
        config.ml.clone(),
    ));
    let irrigation = Arc::new(IrrigationService::new(
        fields.clone(),
        Arc::new(WeatherClient::new(&config.weather)),
        prediction.clone(),
        config.weather.timeout(),
    ));

    // Background jobs
    let mut tasks = Vec::new();
    if config.scheduler.enabled {
        let rain_check = RainCheckJob::new(
            fields.clone(),
            irrigation.clone(),
            Arc::new(PgNotificationSink::new(db_pool.clone())),
            FieldScope::All,
        );
        tasks.push(PeriodicTask::start(
            Arc::new(rain_check),
            Duration::from_secs(config.scheduler.rain_check_interval_secs),
        ));
        tasks.push(PeriodicTask::start(
            Arc::new(RetrainJob::new(prediction.clone())),
            Duration::from_secs(config.scheduler.retrain_interval_secs),
        ));
    }

    // Create application state
    let state = AppState {
        fields,
        prediction,
        irrigation,
        config: Arc::new(config.clone()),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in tasks {
        task.stop().await;
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
