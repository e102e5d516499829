//! Entrypoint: polls the HL7 feed and appends every message to `hl7:raw`.

use onco_broker::{Broker, RedisBroker};
use onco_clients::Hl7FeedClient;
use onco_config::Settings;
use onco_pipeline::Ingestor;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let feed = Hl7FeedClient::new(settings.clients.hl7_base.clone());
    let broker: Arc<dyn Broker> = Arc::new(RedisBroker::connect(&settings.streams.redis_url).await?);

    tracing::info!(stream = %settings.streams.raw_stream, "starting HL7 ingestor");
    Ingestor::new(feed, broker, settings.streams).run().await
}
