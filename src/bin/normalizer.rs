//! Entrypoint: consumes `hl7:raw` under a consumer group and publishes
//! normalized events to `hl7:norm` (or the DLQ) as it goes.

use onco_broker::{Broker, RedisBroker};
use onco_config::Settings;
use onco_pipeline::Normalizer;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let broker: Arc<dyn Broker> = Arc::new(RedisBroker::connect(&settings.streams.redis_url).await?);
    let normalizer = Normalizer::new(broker, settings.streams);
    normalizer.ensure_group().await?;

    tracing::info!("starting HL7 normalizer");
    loop {
        match normalizer.run_once().await {
            Ok(0) => continue,
            Ok(count) => tracing::debug!(count, "processed raw HL7 entries"),
            Err(e) => {
                tracing::warn!(error = %e, "normalizer iteration failed, retrying shortly");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
