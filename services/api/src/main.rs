use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use api::{
    config,
    repositories::{TagRepository, TagStore, UserRepository, UserStore},
    routes,
    services::{ExpansionService, TagService, UserService},
    state::AppState,
};
use common::alarm::Alarm;
use common::cache::{CacheService, RedisStore};
use common::database::DatabaseProvider;
use common::google::GoogleService;
use common::mail::EmailService;
use tokio::net::TcpListener;

/// One alarm mail per window for a flapping connection
const ALARM_THROTTLE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let (_cli, settings) = config::load_with_cli()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.to_string()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        "Starting {} ({})",
        settings.app.name,
        settings.app.environment.as_str()
    );

    let mailer = EmailService::new(&settings.email);
    mailer.start();

    let alarm = Alarm::new(
        mailer.clone(),
        settings.app.name.clone(),
        settings.app.admin_email.clone(),
        "Redis Error!",
    )
    .throttled(ALARM_THROTTLE);
    let database_alarm = alarm.with_subject("Postgres Error!").throttled(ALARM_THROTTLE);

    let store = RedisStore::new(settings.redis.clone(), Some(alarm))?;
    store.start();
    let cache = CacheService::new(store);

    let database = DatabaseProvider::connect(settings.database.clone(), Some(database_alarm)).await?;
    database.migrate(&sqlx::migrate!("../../migrations")).await?;
    database.start_monitor();

    let google = GoogleService::from_file(&settings.google.service_account_file);
    if !google.is_initialized() {
        warn!("Google integration disabled");
    }

    let user_store: Arc<dyn UserStore> = Arc::new(UserRepository::new(database.pool().clone()));
    let tag_store: Arc<dyn TagStore> = Arc::new(TagRepository::new(database.pool().clone()));

    let expansion = ExpansionService::start(
        &cache,
        Arc::clone(&user_store),
        Arc::clone(&tag_store),
        google,
    )
    .await?;

    let state = AppState {
        settings: Arc::new(settings),
        cache: cache.clone(),
        database: database.tracker().clone(),
        users: UserService::new(user_store, cache.clone()),
        tags: TagService::new(tag_store, cache),
        expansion,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.app.port));
    let app = routes::create_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("API service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
