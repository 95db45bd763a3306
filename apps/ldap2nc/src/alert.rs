//! Alert sink used by the binary.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use ldap2nc_sync::AlertSink;

/// Holds a failing run open for the grace period so that log shippers
/// watching stderr can pick up the error before the process exits.
#[derive(Debug, Clone)]
pub struct GraceDelaySink {
    grace: Duration,
}

impl GraceDelaySink {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

#[async_trait]
impl AlertSink for GraceDelaySink {
    async fn flush(&self) {
        if self.grace.is_zero() {
            return;
        }
        warn!(grace_secs = self.grace.as_secs(), "Delaying abort");
        tokio::time::sleep(self.grace).await;
    }
}
