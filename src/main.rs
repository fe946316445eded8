use std::sync::Arc;

use dotenv::dotenv;
use listing_scraper::api::{self, AppState};
use listing_scraper::browser::chrome::ChromeLauncher;
use listing_scraper::config::ServiceConfig;
use listing_scraper::orchestrator::Scraper;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()?;
    let launcher = ChromeLauncher::new(config.headless, config.chrome_path.clone());
    let scraper = Scraper::new(Arc::new(launcher), config.scrape.clone());

    let app = api::build_router(AppState {
        scraper: Arc::new(scraper),
        max_pages_cap: config.max_pages_cap,
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 listening on {}", listener.local_addr()?);
    info!("📖 API docs at /swagger-ui");
    axum::serve(listener, app).await?;

    Ok(())
}
