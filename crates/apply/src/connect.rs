//! Bounded connect retry with a fixed delay.

use std::time::Duration;

use kumasync_hub::{Connector, Endpoint};
use metrics::counter;
use tracing::{info, warn};

use crate::{Phase, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connect attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Sleep between two consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 10, delay: Duration::from_secs(10) }
    }
}

/// Connect and authenticate, retrying every failure the same way.
///
/// Exhaustion is fatal for the run and reported against `phase`.
pub async fn connect_with_retry<C: Connector>(
    connector: &C,
    endpoint: &Endpoint,
    policy: RetryPolicy,
    phase: Phase,
) -> Result<C::Client, SyncError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        info!(endpoint = %endpoint.label, url = %endpoint.url, attempt, attempts, "connecting");
        match connector.connect(endpoint).await {
            Ok(client) => {
                info!(endpoint = %endpoint.label, attempt, "connected");
                counter!("kumasync_connect_total", 1u64, "outcome" => "ok");
                return Ok(client);
            }
            Err(e) if attempt >= attempts => {
                counter!("kumasync_connect_total", 1u64, "outcome" => "exhausted");
                return Err(SyncError::Unreachable { phase, endpoint: endpoint.label.clone(), attempts, source: e });
            }
            Err(e) => {
                warn!(endpoint = %endpoint.label, attempt, error = %e, delay_ms = policy.delay.as_millis() as u64, "connect attempt failed");
                counter!("kumasync_connect_total", 1u64, "outcome" => "retry");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
