mod auto_apply;
mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auto_apply::activity::ActivityLog;
use crate::auto_apply::duplicate::DuplicateDetector;
use crate::auto_apply::engine::{build_scheduler, AutoApplyEngine};
use crate::auto_apply::orchestrator::{Collaborators, CycleOrchestrator};
use crate::auto_apply::platforms::{default_registry, PlatformRegistry};
use crate::auto_apply::providers::{
    parse_search_sources, DisabledEmailSender, EmailSender, HttpEmailSender,
    HttpJobSearchProvider, LlmCoverLetterProvider, PgApplicationRepository,
};
use crate::auto_apply::queue::ReviewQueue;
use crate::auto_apply::rate_limiter::RateLimiter;
use crate::auto_apply::submit::{BrowserSubmit, DirectSubmit, EmailSubmit, Handlers};
use crate::auto_apply::webdriver::WebDriverBrowser;
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::PgStore;
use crate::store::redis::RedisStore;
use crate::store::s3::S3ArtifactStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Auto-Apply API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let pg = Arc::new(PgStore::new(db.clone()));

    // Initialize Redis
    let redis = Arc::new(RedisStore::new(::redis::Client::open(config.redis_url.clone())?));
    info!("Redis client initialized");

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let artifacts = Arc::new(S3ArtifactStore::new(s3, config.s3_bucket.clone()));
    info!("S3 client initialized");

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let registry = Arc::new(match &config.platforms_file {
        Some(path) => PlatformRegistry::from_file(path)?,
        None => default_registry(),
    });
    info!("Platform registry loaded ({} platforms)", registry.len());

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")?;

    let sources = match &config.search_api_url {
        Some(raw) => parse_search_sources(raw).map_err(anyhow::Error::msg)?,
        None => {
            warn!("SEARCH_API_URL is not set; cycles will fail at search");
            vec![]
        }
    };

    let email: Arc<dyn EmailSender> = match &config.email {
        Some(email) => Arc::new(HttpEmailSender::new(
            http.clone(),
            email.api_url.clone(),
            email.api_key.clone(),
            email.from.clone(),
        )),
        None => {
            warn!("EMAIL_API_URL is not set; email applications will be refused");
            Arc::new(DisabledEmailSender)
        }
    };

    let handlers = Handlers::new(
        registry.clone(),
        DirectSubmit::new(http.clone()),
        BrowserSubmit,
        EmailSubmit::new(email),
        Duration::from_millis(config.retry_backoff_ms),
    );

    let applications = Arc::new(PgApplicationRepository::new(db));
    let activity = Arc::new(ActivityLog::new(pg.clone(), artifacts));
    let queue = ReviewQueue::new(pg.clone());

    let orchestrator = CycleOrchestrator::new(
        Collaborators {
            search: Arc::new(HttpJobSearchProvider::new(http, sources)),
            resumes: applications.clone(),
            cover_letters: Arc::new(LlmCoverLetterProvider::new(llm)),
            applications,
            browser: Arc::new(WebDriverBrowser::new(
                config.webdriver_url.clone(),
                config.browser_headless,
            )),
        },
        Arc::new(handlers),
        RateLimiter::new(registry, redis.clone()),
        DuplicateDetector::new(redis),
        queue.clone(),
        activity.clone(),
    );

    let engine = Arc::new(AutoApplyEngine::new(pg, orchestrator, activity, queue));

    // Initialize the cycle scheduler
    let _scheduler = if config.scheduler_enabled {
        let scheduler = build_scheduler(engine.clone(), &config.auto_apply_cron).await?;
        scheduler.start().await.context("starting scheduler")?;
        info!("Auto-apply scheduler running ({})", config.auto_apply_cron);
        Some(scheduler)
    } else {
        info!("Auto-apply scheduler disabled");
        None
    };

    // Build router
    let app = build_router(AppState { engine })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "autoapply-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    let s3 = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(s3)
}
