use bootcamp_api::auth::JwtKeys;
use bootcamp_api::config::{load_env_files, GeocoderProvider};
use bootcamp_api::geo::{DisabledGeocoder, Geocoder, MapQuestGeocoder};
use bootcamp_api::model::{BOOTCAMPS, COURSES};
use bootcamp_api::{
    build_app, ensure_tables, shutdown_signal, watch_store, AppConfig, AppState, MemoryStore, PgStore,
    ResourceStore, Supervisor,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    load_env_files();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bootcamp_api=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    tracing::info!(?config, "configuration loaded");

    let store: Arc<dyn ResourceStore> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, config.db_max_connections, &config.db_schema).await?;
            ensure_tables(pg.pool(), pg.schema(), &[&BOOTCAMPS, &COURSES]).await?;
            tracing::info!(schema = %config.db_schema, "using postgres store");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let geocoder: Arc<dyn Geocoder> = match (&config.geocoder_provider, &config.geocoder_api_key) {
        (GeocoderProvider::MapQuest, Some(key)) => Arc::new(MapQuestGeocoder::new(key.clone())?),
        (_, None) => {
            tracing::warn!("GEOCODER_API_KEY not set; geocoding disabled");
            Arc::new(DisabledGeocoder)
        }
    };

    let state = AppState::new(store.clone(), geocoder, JwtKeys::from_secret(config.jwt_secret.as_bytes()));
    let app = build_app(state, config.body_limit_bytes);

    let supervisor = Supervisor::new();
    if config.store_max_failed_pings > 0 {
        supervisor.spawn_guarded(
            "store watchdog",
            watch_store(store, config.store_ping_interval, config.store_max_failed_pings),
        );
    }

    let listener = TcpListener::bind(config.bind_addr()).await?;
    let exit = supervisor.run(listener, app, shutdown_signal()).await?;
    if let bootcamp_api::Exit::Fatal(reason) = &exit {
        tracing::error!(%reason, "exiting after fatal failure");
    }
    Ok(exit.code())
}
