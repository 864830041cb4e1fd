// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ingest::{run_pass, types::MatchProvider, IngestReport};
use crate::retention;
use crate::store::Store;

#[derive(Clone, Copy, Debug)]
pub struct IngestSchedulerCfg {
    pub interval: Duration,
    pub retention_days: u32,
}

/// Periodic ingestion: fetch → normalize → upsert, followed by a retention prune.
pub struct Ingestor {
    providers: Vec<Box<dyn MatchProvider>>,
    store: Arc<Store>,
    team_filter: Vec<String>,
    team_ids_configured: bool,
    cfg: IngestSchedulerCfg,
}

impl Ingestor {
    pub fn new(
        providers: Vec<Box<dyn MatchProvider>>,
        store: Arc<Store>,
        team_filter: Vec<String>,
        team_ids_configured: bool,
        cfg: IngestSchedulerCfg,
    ) -> Self {
        Self {
            providers,
            store,
            team_filter,
            team_ids_configured,
            cfg,
        }
    }

    /// One pass plus pruning. Prune runs even if the pass failed on a store write.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<IngestReport> {
        let pass = run_pass(
            &self.providers,
            &self.store,
            &self.team_filter,
            self.team_ids_configured,
        )
        .await;
        counter!("ingest_runs_total").increment(1);

        if let Err(e) = retention::prune(&self.store, now, self.cfg.retention_days) {
            tracing::error!(target: "retention", error = %format!("{e:#}"), "prune failed");
        }
        pass
    }

    /// Runs a pass immediately, then every `cfg.interval`, until `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.cfg.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                target: "ingest",
                interval_secs = self.cfg.interval.as_secs(),
                providers = self.providers.len(),
                "ingest loop started"
            );
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    res = self.tick(Utc::now()) => match res {
                        Ok(r) => tracing::info!(
                            target: "ingest",
                            fetched = r.fetched,
                            stored = r.stored,
                            provider_errors = r.provider_errors,
                            "ingest tick"
                        ),
                        Err(e) => tracing::error!(target: "ingest", error = %format!("{e:#}"), "ingest tick failed"),
                    }
                }
            }
            tracing::info!(target: "ingest", "ingest loop stopped");
        })
    }
}
