mod client;
mod config;
mod consumer;
mod publisher;
mod recorder;
mod repository;
mod routes;
mod vision;

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use starscore_core::{GeoResolver, telemetry};
use tokio::signal;
use tracing::{error, info, warn};

use config::Config;
use consumer::{EventConsumer, TelemetryConsumer, TelemetryHandler};
use publisher::EventPublisher;
use recorder::{AccessEventRecorder, ResponseEventRecorder};
use repository::{EventStore, PgEventStore};
use vision::{RecognitionClient, VisionApiClient};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub event_publisher: Arc<dyn EventPublisher>,
    /// `None` when no vision API key is configured.
    pub vision: Option<Arc<dyn RecognitionClient>>,
    pub geo: Arc<GeoResolver>,
    /// Body size limit for the recognize route.
    pub max_body_bytes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _guard = telemetry::init_tracing(&config.observability_config(), "starscore-service")?;

    let db_config = config.database_config();
    let db_pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .connect(db_config.url.expose())
        .await?;

    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let store: Arc<dyn EventStore> = Arc::new(PgEventStore::new(db_pool));
    let geo = Arc::new(GeoResolver::builtin(config.geo_cache_capacity));

    let vision_config = config.vision_config();
    let vision = match vision_config.api_key.clone() {
        Some(api_key) => Some(
            Arc::new(VisionApiClient::new(&vision_config, api_key)?) as Arc<dyn RecognitionClient>
        ),
        None => {
            warn!("VISION_API_KEY is not set, recognition requests will fail");
            None
        }
    };

    let queue_config = config.telemetry_queue_config();
    let (event_publisher, receiver) = publisher::channel(queue_config.capacity);
    let handler = TelemetryHandler::new(
        AccessEventRecorder::new(Arc::clone(&store), Arc::clone(&geo), config.session_window()),
        ResponseEventRecorder::new(Arc::clone(&store)),
    );
    let consumer = TelemetryConsumer::new(receiver, handler, queue_config.concurrency);
    let consumer_task = tokio::spawn(async move {
        if let Err(e) = consumer.start_consuming().await {
            error!("Telemetry consumer stopped: {:?}", e);
        }
    });

    let state = AppState {
        store,
        event_publisher: Arc::new(event_publisher),
        vision,
        geo,
        max_body_bytes: config.max_body_bytes,
    };
    let app = routes::router(state);

    let addr = config.server_addr();
    info!("Starting starscore-service on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // The router, and with it the last publisher, is gone; let the consumer
    // flush what is still queued.
    consumer_task.await?;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received terminate signal, shutting down"),
    }
}
