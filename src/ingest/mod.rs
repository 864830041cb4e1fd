// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::ingest::types::MatchProvider;
use crate::model::{normalize_team_name, Match};
use crate::store::Store;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use similar::TextDiff;
use std::collections::HashMap;

/// Minimum fuzzy similarity for a team name to count as matching an allow-list entry.
pub const TEAM_SIMILARITY_THRESHOLD: f64 = 0.8;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Completed ingestion passes.");
        describe_counter!("ingest_matches_total", "Raw matches returned by providers.");
        describe_counter!(
            "ingest_dedup_total",
            "Matches merged away as cross-source duplicates."
        );
        describe_counter!(
            "ingest_filtered_total",
            "Matches dropped by the team allow-list or as malformed."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest pipeline last ran."
        );
    });
}

/// Canonical grouping key for cross-source duplicates: sorted lowercase team pair plus
/// the start time truncated down to its UTC clock hour.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub first: String,
    pub second: String,
    pub hour_bucket: i64,
}

pub fn dedup_key(m: &Match) -> DedupKey {
    let mut pair = [
        normalize_team_name(&m.home_team).to_lowercase(),
        normalize_team_name(&m.away_team).to_lowercase(),
    ];
    pair.sort();
    let [first, second] = pair;
    DedupKey {
        first,
        second,
        hour_bucket: m.start_time_utc.timestamp().div_euclid(3600),
    }
}

/// Sequence-match ratio `2 * matched / (len(a) + len(b))` over characters, in `[0.0, 1.0]`,
/// for two already lowercased team names. A shared city prefix alone stays below the threshold.
pub fn team_similarity(a: &str, b: &str) -> f64 {
    f64::from(TextDiff::from_chars(a, b).ratio())
}

/// Normalize allow-list entries the same way team names are normalized, lowercased,
/// with empties removed.
pub fn prepare_team_filter(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .map(|e| normalize_team_name(e).to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// True if `team` matches any prepared filter entry by substring or fuzzy similarity.
pub fn team_matches_filter(team: &str, prepared_filter: &[String]) -> bool {
    let team = normalize_team_name(team).to_lowercase();
    prepared_filter
        .iter()
        .any(|f| team.contains(f.as_str()) || team_similarity(&team, f) >= TEAM_SIMILARITY_THRESHOLD)
}

/// Counters describing one normalization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub input: usize,
    pub malformed: usize,
    pub deduped: usize,
    pub filtered: usize,
}

/// Clean names, merge duplicates (latest `created_at` wins), then apply the optional
/// team allow-list. Output keeps first-seen order of each dedup group.
pub fn normalize_matches(raw: Vec<Match>, team_filter: Option<&[String]>) -> Vec<Match> {
    normalize_with_stats(raw, team_filter).0
}

pub fn normalize_with_stats(
    raw: Vec<Match>,
    team_filter: Option<&[String]>,
) -> (Vec<Match>, NormalizeStats) {
    let mut stats = NormalizeStats {
        input: raw.len(),
        ..NormalizeStats::default()
    };

    // 1) Names. The id is left untouched: producers fix it per record.
    let mut cleaned = Vec::with_capacity(raw.len());
    for mut m in raw {
        m.home_team = normalize_team_name(&m.home_team);
        m.away_team = normalize_team_name(&m.away_team);
        if m.home_team.is_empty() || m.away_team.is_empty() {
            tracing::warn!(target: "ingest", match_id = %m.id, source = %m.source, "dropping match with empty team name");
            stats.malformed += 1;
            continue;
        }
        cleaned.push(m);
    }

    // 2) Dedup. Strictly-later created_at replaces; ties keep the earlier record.
    let mut slots: HashMap<DedupKey, usize> = HashMap::with_capacity(cleaned.len());
    let mut unique: Vec<Match> = Vec::with_capacity(cleaned.len());
    for m in cleaned {
        let key = dedup_key(&m);
        match slots.get(&key) {
            Some(&idx) => {
                stats.deduped += 1;
                if m.created_at > unique[idx].created_at {
                    tracing::debug!(target: "ingest", kept = %m.source, dropped = %unique[idx].source, "duplicate replaced by newer record");
                    unique[idx] = m;
                } else {
                    tracing::debug!(target: "ingest", home = %m.home_team, away = %m.away_team, "duplicate dropped");
                }
            }
            None => {
                slots.insert(key, unique.len());
                unique.push(m);
            }
        }
    }

    // 3) Team filter.
    let prepared = team_filter.map(prepare_team_filter).unwrap_or_default();
    if prepared.is_empty() {
        return (unique, stats);
    }
    let before = unique.len();
    let kept: Vec<Match> = unique
        .into_iter()
        .filter(|m| {
            team_matches_filter(&m.home_team, &prepared)
                || team_matches_filter(&m.away_team, &prepared)
        })
        .collect();
    stats.filtered = before - kept.len();
    (kept, stats)
}

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub fetched: usize,
    pub kept: usize,
    pub stored: usize,
    pub provider_errors: usize,
    pub no_team_ids: bool,
}

/// Run one ingestion pass: fetch every provider, normalize the union, upsert the result.
///
/// A failing provider contributes nothing and is logged; only store errors fail the pass.
pub async fn run_pass(
    providers: &[Box<dyn MatchProvider>],
    store: &Store,
    team_filter: &[String],
    team_ids_configured: bool,
) -> Result<IngestReport> {
    ensure_metrics_described();

    let mut report = IngestReport {
        no_team_ids: !team_ids_configured,
        ..IngestReport::default()
    };

    let mut raw = Vec::new();
    for p in providers {
        match p.fetch().await {
            Ok(mut v) => {
                tracing::debug!(target: "ingest", provider = p.name(), count = v.len(), "provider fetched");
                raw.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, provider = p.name(), "provider error");
                counter!("ingest_provider_errors_total").increment(1);
                report.provider_errors += 1;
            }
        }
    }
    report.fetched = raw.len();
    counter!("ingest_matches_total").increment(raw.len() as u64);

    if raw.is_empty() {
        if report.no_team_ids {
            tracing::warn!(
                target: "ingest",
                "no matches found and no team ids configured; set TEAM_IDS or provide TEAM_ICS_FILE"
            );
        } else {
            tracing::warn!(target: "ingest", providers = providers.len(), "no matches found from any source");
        }
        return Ok(report);
    }

    let filter = (!team_filter.is_empty()).then_some(team_filter);
    let (kept, stats) = normalize_with_stats(raw, filter);
    report.kept = kept.len();
    report.stored = store.upsert_matches(&kept)?;

    counter!("ingest_dedup_total").increment(stats.deduped as u64);
    counter!("ingest_filtered_total").increment((stats.filtered + stats.malformed) as u64);
    gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

    tracing::info!(
        target: "ingest",
        fetched = report.fetched,
        kept = report.kept,
        deduped = stats.deduped,
        filtered = stats.filtered,
        "processed and stored matches"
    );
    Ok(report)
}
