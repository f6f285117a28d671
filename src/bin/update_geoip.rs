//! update-geoip - scheduled GeoLite2 Country dataset refresh
//!
//! Meant to run from cron or a systemd timer. Exits non-zero when the
//! refresh fails; the previously installed dataset is left in place.

use country_sites::application::{DatasetUpdater, UpdateOutcome};
use country_sites::config::load_config;
use country_sites::UpdateError;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config()?;

    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let updater = DatasetUpdater::new(cfg.updater_settings())?;

    match updater.check_and_update().await {
        Ok(result) => {
            match result.outcome {
                UpdateOutcome::NoOp => {
                    tracing::info!("GeoIP dataset {} is already current", result.version)
                }
                UpdateOutcome::Updated => {
                    tracing::info!("GeoIP dataset updated to {} ({})", result.version, result.archive)
                }
            }
            Ok(())
        }
        Err(UpdateError::Misconfigured(reason)) => {
            tracing::error!("GeoIP update skipped: {}", reason);
            Err(anyhow::anyhow!("GeoIP updater misconfigured: {}", reason))
        }
        Err(e) => {
            tracing::error!("GeoIP update failed, keeping installed dataset: {}", e);
            Err(e.into())
        }
    }
}
