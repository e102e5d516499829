//! Polls the HL7 feed and appends each message to `hl7:raw`.
//!
//! Backoff is additive-jittered and resets to the floor on the first
//! success after a failure, mirroring the upstream ingestor worker rather
//! than the library's multiplicative [`onco_clients`]-style retry policy:
//! a feed outage should back off gently and recover immediately once the
//! feed answers again, not ride out a fixed attempt budget.

use onco_broker::Broker;
use onco_clients::Hl7FeedClient;
use onco_config::StreamSettings;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const BACKOFF_FLOOR_SECS: f64 = 1.0;
const BACKOFF_CAP_SECS: f64 = 30.0;

/// Next backoff delay given the current one: additive jitter up to 1s,
/// doubled for the following attempt, capped at 30s.
fn jittered_sleep_secs(current: f64) -> f64 {
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    (current + jitter).min(BACKOFF_CAP_SECS)
}

fn doubled(current: f64) -> f64 {
    (current * 2.0).min(BACKOFF_CAP_SECS)
}

pub struct Ingestor {
    feed: Hl7FeedClient,
    broker: Arc<dyn Broker>,
    settings: StreamSettings,
}

impl Ingestor {
    pub fn new(feed: Hl7FeedClient, broker: Arc<dyn Broker>, settings: StreamSettings) -> Self {
        Self { feed, broker, settings }
    }

    /// Fetch the feed once and append every message returned. Returns the
    /// number of messages appended.
    pub async fn run_once(&self) -> onco_core::error::Result<usize> {
        let messages = self.feed.get_hl7_messages().await?;
        let mut appended = 0;
        for message in messages {
            if message.message.trim().is_empty() {
                continue;
            }
            self.broker
                .append(&self.settings.raw_stream, &message.to_fields(), self.settings.raw_maxlen, true)
                .await?;
            appended += 1;
        }
        Ok(appended)
    }

    /// Poll forever: on success, sleep `poll_interval` and reset backoff to
    /// the floor; on failure, sleep the jittered backoff and double it for
    /// next time, capped at 30s. Never terminates on its own.
    pub async fn run(&self) -> ! {
        let mut backoff = BACKOFF_FLOOR_SECS;
        loop {
            match self.run_once().await {
                Ok(count) => {
                    if count > 0 {
                        info!(count, "ingested HL7 messages");
                    }
                    backoff = BACKOFF_FLOOR_SECS;
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
                Err(e) => {
                    warn!(error = %e, backoff, "HL7 feed poll failed, backing off");
                    tokio::time::sleep(Duration::from_secs_f64(jittered_sleep_secs(backoff))).await;
                    backoff = doubled(backoff);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubled_caps_at_thirty() {
        assert_eq!(doubled(20.0), 30.0);
        assert_eq!(doubled(1.0), 2.0);
    }

    #[test]
    fn jittered_sleep_never_exceeds_cap() {
        for _ in 0..100 {
            assert!(jittered_sleep_secs(29.5) <= BACKOFF_CAP_SECS);
        }
    }
}
