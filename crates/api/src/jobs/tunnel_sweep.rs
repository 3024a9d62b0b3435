//! Drops live tunnel sessions that have gone quiet.
//!
//! A device that stops talking without closing its connection would otherwise
//! keep receiving live sends that never land. Once swept it is served by the
//! command log alone until it reconnects.

use domain::services::TunnelRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::scheduler::{Job, JobError, JobFrequency};
use crate::middleware::record_connected_tunnels;

pub struct TunnelSweepJob {
    tunnels: Arc<TunnelRegistry>,
    max_idle: Duration,
}

impl TunnelSweepJob {
    pub fn new(tunnels: Arc<TunnelRegistry>, max_idle: Duration) -> Self {
        Self { tunnels, max_idle }
    }
}

#[async_trait::async_trait]
impl Job for TunnelSweepJob {
    fn name(&self) -> &'static str {
        "tunnel_sweep"
    }

    fn frequency(&self) -> JobFrequency {
        // Four sweeps per idle window, at most once a minute
        JobFrequency::Seconds((self.max_idle.as_secs() / 4).clamp(1, 60))
    }

    async fn execute(&self) -> Result<(), JobError> {
        let dropped = self.tunnels.sweep_idle(self.max_idle).await;
        if !dropped.is_empty() {
            info!(count = dropped.len(), endpoints = ?dropped, "Swept idle tunnels");
        }
        record_connected_tunnels(self.tunnels.connected_count().await);
        Ok(())
    }
}
