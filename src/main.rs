use std::sync::Arc;

use merchflow::config::Config;
use merchflow::server::{self, AppState};
use merchflow::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();

    log::info!("🚀 Starting merchflow...");
    log::info!("📊 Configuration:");
    log::info!("   Database: {}", config.db_path);
    log::info!("   Bind address: {}", config.bind_addr);
    log::info!(
        "   Trigger auth: {}",
        if config.cron_secret.is_some() {
            "shared secret"
        } else {
            "OPEN (no CRON_SECRET set)"
        }
    );
    log::info!(
        "   Page size: {} (max {} pages per pass)",
        config.page_size,
        config.max_pages
    );

    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    log::info!("✅ Store ready at {}", config.db_path);

    let bind_addr = config.bind_addr.clone();
    let app = server::router(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("✅ Listening on {bind_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
