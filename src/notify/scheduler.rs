// src/notify/scheduler.rs
//! Periodic notification cycle.
//!
//! Per (match, destination) the state is Pending until `now` enters the half-open window
//! `[start - lead, start)`, and Notified once delivery succeeded and the receipt is stored.
//! A window that closes without a receipt is never caught up on.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{format_match_message, Destination, Mentions};
use crate::model::Match;
use crate::store::Store;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("notify_sent_total", "Match notifications delivered and recorded.");
        describe_counter!(
            "notify_delivery_failures_total",
            "Deliveries that exhausted every retry within a cycle."
        );
        describe_counter!("notify_cycle_errors_total", "Cycles aborted by a store error.");
        describe_gauge!("notify_last_cycle_ts", "Unix ts of the last notification cycle.");
    });
}

/// Bounded exponential backoff within one cycle: `base`, `2*base`, `4*base`, ...
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub candidates: usize,
    pub in_window: usize,
    pub already_notified: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct NotificationScheduler {
    store: Arc<Store>,
    destination: Arc<dyn Destination>,
    mentions: Mentions,
    lead: chrono::Duration,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

impl NotificationScheduler {
    pub fn new(store: Arc<Store>, destination: Arc<dyn Destination>, lead_minutes: u32) -> Self {
        Self {
            store,
            destination,
            mentions: Mentions::default(),
            lead: chrono::Duration::minutes(i64::from(lead_minutes)),
            retry: RetryPolicy::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_mentions(mut self, mentions: Mentions) -> Self {
        self.mentions = mentions;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// `now ∈ [start - lead, start)`.
    pub fn in_window(&self, m: &Match, now: DateTime<Utc>) -> bool {
        now >= m.start_time_utc - self.lead && now < m.start_time_utc
    }

    /// One pass over stored matches: announce every in-window match that has no receipt yet.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        ensure_metrics_described();
        let dest_id = self.destination.destination_id();

        // start ∈ [now, now + lead]; the half-open window is re-checked per match below.
        let candidates = self.store.upcoming_matches(now, now + self.lead)?;
        let mut report = CycleReport {
            candidates: candidates.len(),
            ..CycleReport::default()
        };

        for m in &candidates {
            if self.shutdown.is_cancelled() {
                break;
            }
            if !self.in_window(m, now) {
                continue;
            }
            report.in_window += 1;

            if self.store.is_notified(&m.id, dest_id)? {
                report.already_notified += 1;
                continue;
            }

            let message = format_match_message(m, &self.mentions);
            if self.deliver_with_retry(&m.id, &message).await {
                // Wall-clock delivery time, not the cycle's `now`.
                self.store.record_receipt(&m.id, dest_id, Utc::now())?;
                report.delivered += 1;
                counter!("notify_sent_total").increment(1);
                tracing::info!(
                    target: "notify",
                    match_id = %m.id,
                    home = %m.home_team,
                    away = %m.away_team,
                    start = %m.start_time_utc,
                    "notified about match"
                );
            } else {
                report.failed += 1;
                counter!("notify_delivery_failures_total").increment(1);
            }
        }

        gauge!("notify_last_cycle_ts").set(now.timestamp() as f64);
        Ok(report)
    }

    /// Up to `max_attempts` deliveries with doubling backoff. Never holds the store.
    async fn deliver_with_retry(&self, match_id: &str, message: &str) -> bool {
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.destination.deliver(message).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(target: "notify", %match_id, attempt, error = %format!("{e:#}"), "delivery failed");
                }
            }
            if attempt == attempts {
                break;
            }
            let wait = self.retry.delay_after(attempt);
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        tracing::error!(target: "notify", %match_id, attempts, "giving up until next cycle");
        false
    }

    /// Run cycles every `every` until the shutdown token fires.
    pub async fn run(self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(target: "notify", every_secs = every.as_secs(), lead_minutes = self.lead.num_minutes(), "notification loop started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.run_cycle(Utc::now()).await {
                Ok(r) if r.delivered > 0 || r.failed > 0 => {
                    tracing::info!(target: "notify", delivered = r.delivered, failed = r.failed, "notification cycle");
                }
                Ok(r) => {
                    tracing::trace!(target: "notify", candidates = r.candidates, "nothing to notify");
                }
                Err(e) => {
                    counter!("notify_cycle_errors_total").increment(1);
                    tracing::error!(target: "notify", error = %format!("{e:#}"), "notification cycle failed");
                }
            }
        }
        tracing::info!(target: "notify", "notification loop stopped");
    }

    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(self.run(every))
    }
}
