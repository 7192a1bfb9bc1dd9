/// Identity Service Main Entry Point
///
/// Starts the actix-web auth API with:
/// - PostgreSQL pool and migrations (or in-memory stores)
/// - Redis connection manager for token revocation (or in-memory)
/// - Google / Facebook token verification
use actix_middleware::RequestLogging;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use identity_service::{
    config::{RevocationBackend, Settings, StorageBackend},
    configure,
    db::{
        IdentityRepository, MemoryIdentityRepository, PgIdentityRepository, PgOtpStore, MIGRATOR,
    },
    security::{
        InMemoryOtpStore, InMemoryRevocationStore, OtpStore, RedisRevocationStore,
        spawn_otp_sweeper, RevocationStore, TokenService,
    },
    services::{AuthOptions, HttpSocialVerifier, LogOtpSender},
    AppState,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const OTP_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("identity_service=info,actix_web=info")),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Identity Service");

    let settings = Settings::load().context("Failed to load configuration")?;
    info!(environment = %settings.app.environment, "Configuration loaded successfully");

    let (users, otps): (Arc<dyn IdentityRepository>, Arc<dyn OtpStore>) =
        match settings.database.backend {
            StorageBackend::Postgres => {
                let url = settings
                    .database
                    .url
                    .as_deref()
                    .context("DATABASE_URL must be set when STORAGE_BACKEND=postgres")?;
                let pool = PgPoolOptions::new()
                    .max_connections(settings.database.max_connections)
                    .acquire_timeout(Duration::from_secs(5))
                    .connect(url)
                    .await
                    .context("Failed to connect to PostgreSQL")?;
                info!(
                    "Database pool initialized with {} max connections",
                    settings.database.max_connections
                );

                MIGRATOR
                    .run(&pool)
                    .await
                    .context("Failed to run database migrations")?;
                info!("Database migrations completed");

                (
                    Arc::new(PgIdentityRepository::new(pool.clone())),
                    Arc::new(PgOtpStore::new(pool, settings.otp.policy())),
                )
            }
            StorageBackend::Memory => {
                warn!("Using in-memory storage; state is lost on restart and not shared between instances");
                (
                    Arc::new(MemoryIdentityRepository::new()),
                    Arc::new(InMemoryOtpStore::new(settings.otp.policy())),
                )
            }
        };

    spawn_otp_sweeper(otps.clone(), OTP_SWEEP_INTERVAL);

    let revocations: Arc<dyn RevocationStore> = match settings.revocation.backend {
        RevocationBackend::Redis => {
            let url = settings
                .revocation
                .redis_url
                .as_deref()
                .context("REDIS_URL must be set when REVOCATION_BACKEND=redis")?;
            let client = redis::Client::open(url).context("Invalid REDIS_URL")?;
            let manager = redis::aio::ConnectionManager::new(client)
                .await
                .context("Failed to connect to Redis")?;
            info!("Redis connection manager initialized");
            Arc::new(RedisRevocationStore::new(manager))
        }
        RevocationBackend::Memory => {
            info!("Token revocation kept in process memory");
            Arc::new(InMemoryRevocationStore::new())
        }
    };

    let keys = settings.jwt.keys().context("Failed to initialize JWT keys")?;
    info!(algorithm = ?keys.algorithm(), "JWT keys initialized");
    let tokens = Arc::new(TokenService::new(
        keys,
        settings.jwt.access_ttl(),
        settings.jwt.refresh_ttl(),
        revocations,
    ));

    if !settings.oauth.google_configured() {
        warn!("GOOGLE_CLIENT_ID not set; Google sign-in will fail");
    }
    if !settings.oauth.facebook_configured() {
        warn!("FB_APP_ID / FB_APP_SECRET not set; Facebook sign-in will fail");
    }
    let verifier = HttpSocialVerifier::new(settings.oauth.clone())
        .context("Failed to build social verifier HTTP client")?;

    let expose_code = settings.otp.expose_code;
    if expose_code {
        warn!("OTP codes are returned in API responses; never enable outside development");
    }

    let state = AppState::new(
        users,
        otps,
        tokens,
        Arc::new(LogOtpSender::new(settings.app.is_dev())),
        Arc::new(verifier),
        AuthOptions {
            default_country_code: settings.app.default_country_code.clone(),
            expose_code,
        },
    );

    let bind_address = format!("{}:{}", settings.server.host, settings.server.port);
    info!(workers = settings.server.workers, "Starting HTTP server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(RequestLogging)
            .configure(configure)
    })
    .workers(settings.server.workers)
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await
    .context("HTTP server error")?;

    info!("Identity Service shut down");
    Ok(())
}
