// src/ingest/types.rs
use anyhow::Result;

use crate::model::Match;

/// A producer of raw match records (calendar feed, schedule page, ...).
///
/// Implementations must drop entries they cannot fully populate (both team names and a
/// start time) instead of emitting half-filled records.
#[async_trait::async_trait]
pub trait MatchProvider: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Match>>;
    /// Source identifier used in logs, e.g. the team id of a calendar feed.
    fn name(&self) -> &str;
}
