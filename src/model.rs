// src/model.rs
//! Core records: scheduled matches and notification receipts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single scheduled game, as produced by a provider and persisted by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Match {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    pub start_time_utc: DateTime<Utc>,
    pub source: String, // e.g. "ics", "schedule"
    pub created_at: DateTime<Utc>,
    pub url: Option<String>,
    pub description: Option<String>,
}

impl Match {
    /// Build a match with its deterministic id derived from the team pair and start date.
    pub fn new(
        home_team: impl Into<String>,
        away_team: impl Into<String>,
        start_time_utc: DateTime<Utc>,
        source: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let home_team = home_team.into();
        let away_team = away_team.into();
        Self {
            id: match_id(&home_team, &away_team, start_time_utc),
            home_team,
            away_team,
            start_time_utc,
            source: source.into(),
            created_at,
            url: None,
            description: None,
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// Proof that a match was announced to a destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationReceipt {
    pub match_id: String,
    pub destination_id: String,
    pub notified_at: DateTime<Utc>,
}

/// Stable id for a fixture: unordered, case-insensitive team pair plus the UTC calendar date.
///
/// Team names are whitespace-collapsed before hashing so cosmetic differences between
/// feeds never split one match into two ids.
pub fn match_id(home_team: &str, away_team: &str, start_time_utc: DateTime<Utc>) -> String {
    let mut pair = [id_component(home_team), id_component(away_team)];
    pair.sort();
    let date = start_time_utc.format("%Y-%m-%d");

    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", pair[0], pair[1], date).as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(6 + 16);
    out.push_str("match_");
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn id_component(team: &str) -> String {
    normalize_team_name(team).to_lowercase()
}

/// Collapse internal whitespace runs to single spaces and trim both ends.
pub fn normalize_team_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn id_ignores_order_case_and_spacing() {
        let t = Utc.with_ymd_and_hms(2025, 1, 10, 18, 0, 0).unwrap();
        let a = match_id("OpTic Texas", "Atlanta FaZe", t);
        let b = match_id("atlanta  faze ", "OPTIC TEXAS", t);
        assert_eq!(a, b);
        assert!(a.starts_with("match_"));
        assert_eq!(a.len(), "match_".len() + 16);
    }

    #[test]
    fn id_depends_on_calendar_day_only() {
        let morning = Utc.with_ymd_and_hms(2025, 1, 10, 1, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2025, 1, 10, 23, 30, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2025, 1, 11, 1, 0, 0).unwrap();
        assert_eq!(match_id("A", "B", morning), match_id("A", "B", evening));
        assert_ne!(match_id("A", "B", morning), match_id("A", "B", next_day));
    }
}
