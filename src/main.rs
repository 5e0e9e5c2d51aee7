use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use lume_discovery::config::Settings;
use lume_discovery::core::{
    Clock, CompatibilityScorer, DailyPickSelector, InteractionLedger, Matcher, SystemClock, UndoController,
};
use lume_discovery::routes::{self, AppState};
use lume_discovery::services::{AppwriteClient, AppwriteCollections, CacheManager, PostgresClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_tracing() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn io_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

/// Periodically drop expired undo slots and daily picks from past days
fn spawn_cleanup(undo: Arc<UndoController>, daily: Arc<DailyPickSelector>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;

            match undo.purge_expired().await {
                Ok(0) => {}
                Ok(n) => info!("Purged {} expired undo slots", n),
                Err(e) => warn!("Undo slot cleanup failed: {}", e),
            }

            let yesterday = daily.today().pred_opt().unwrap_or_else(|| daily.today());
            if let Err(e) = daily.purge_before(yesterday).await {
                warn!("Daily pick cleanup failed: {}", e);
            }
        }
    });
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    init_tracing();

    info!("Starting Lume discovery service...");

    let settings = Settings::load().map_err(|e| io_error("Failed to load configuration", e))?;

    info!("Configuration loaded successfully");

    let appwrite = Arc::new(
        AppwriteClient::new(
            settings.appwrite.endpoint.clone(),
            settings.appwrite.api_key.clone(),
            settings.appwrite.project_id.clone(),
            settings.appwrite.database_id.clone(),
            AppwriteCollections {
                profiles: settings.collection.profiles.clone(),
                blocks: settings.collection.blocks.clone(),
            },
        )
        .map_err(|e| io_error("Failed to build Appwrite client", e))?,
    );

    info!("Appwrite client initialized");

    let cache = Arc::new(
        CacheManager::new(
            &settings.cache.redis_url,
            settings.cache.l1_cache_size,
            settings.cache.ttl_secs,
            settings.cache.l1_ttl_secs,
        )
        .await
        .map_err(|e| io_error("Failed to connect to Redis", e))?,
    );

    info!(
        "Cache manager initialized (L1: {} entries, TTL: {}s)",
        settings.cache.l1_cache_size, settings.cache.ttl_secs
    );

    let postgres = Arc::new(
        PostgresClient::from_settings(
            &settings.database.url,
            settings.database.max_connections,
            settings.database.min_connections,
            settings.database.acquire_timeout_secs,
            settings.database.idle_timeout_secs,
        )
        .await
        .map_err(|e| io_error("Failed to connect to PostgreSQL", e))?,
    );

    info!("PostgreSQL client initialized");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let weights = settings.scoring.weights.to_weights();
    let scorer = CompatibilityScorer::new(weights, settings.scoring.age_tolerance_years)
        .map_err(|e| io_error("Invalid scoring configuration", e))?;

    info!("Scorer initialized with weights: {:?}", weights);

    let undo = Arc::new(UndoController::new(
        postgres.clone(),
        postgres.clone(),
        clock.clone(),
        chrono::Duration::seconds(settings.matching.undo_window_secs),
    ));
    let offset = settings
        .matching
        .utc_offset()
        .map_err(|e| io_error("Invalid matching configuration", e))?;
    let ledger = Arc::new(
        InteractionLedger::new(
            postgres.clone(),
            appwrite.clone(),
            appwrite.clone(),
            undo.clone(),
            clock.clone(),
            settings.matching.decision_policy,
        )
        .with_daily_like_limit(settings.matching.like_limit(), offset),
    );
    let matcher = Arc::new(Matcher::new(scorer, postgres.clone(), appwrite.clone()));
    let daily = Arc::new(DailyPickSelector::new(
        appwrite.clone(),
        postgres.clone(),
        appwrite.clone(),
        cache.clone(),
        clock,
        offset,
    ));

    spawn_cleanup(
        undo.clone(),
        daily.clone(),
        Duration::from_secs(settings.matching.cleanup_interval_secs.max(1)),
    );

    let app_state = AppState {
        profiles: appwrite,
        matcher,
        ledger,
        undo,
        daily,
        matching: settings.matching.clone(),
        postgres: Some(postgres),
        cache: Some(cache),
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
