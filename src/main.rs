use hydro::config::{Config, CONFIG_FILE};
use hydro::device::interface::HttpRelayDevice;
use hydro::environment::weather::MeteoFeed;
use hydro::error::AppError;
use hydro::scheduling::factory::{build_scheduler, primary_device};
use hydro::time::RealTimeProvider;
use hydro::utils::start_log;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    start_log();

    let config = Config::load(CONFIG_FILE)?;
    let entry = primary_device(&config)?;
    info!("Driving '{}' at {}", entry.name, entry.address);

    let device = Arc::new(HttpRelayDevice::new(entry.address.clone())?);
    let feed = MeteoFeed::new()?;
    let time = Arc::new(RealTimeProvider);

    let scheduler = build_scheduler(&config, device, feed, time)?;
    scheduler.start().await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Signal listener failed: {}", e);
    }
    info!("Shutdown requested");
    scheduler.stop().await?;
    Ok(())
}
