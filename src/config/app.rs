// src/config/app.rs
use anyhow::{anyhow, bail, Context, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::config::{clean_list, load_ics_links, load_team_filter_from, split_list};
use crate::ingest::providers::ics::DEFAULT_ICS_BASE_URL;
use crate::ingest::providers::schedule_page::DEFAULT_SCHEDULE_URL;
use crate::notify::discord::DEFAULT_API_BASE;
use crate::notify::{Mentions, RetryPolicy};

/// Everything the daemon needs, validated up front.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub discord_bot_token: String,
    pub discord_channel_id: String,
    pub discord_api_base: String,
    pub mentions: Mentions,
    /// Empty = no team filtering.
    pub teams: Vec<String>,
    pub notify_minutes_before: u32,
    pub notify_check_interval: Duration,
    pub schedule_fetch_interval: Duration,
    pub retention_days: u32,
    pub retry: RetryPolicy,
    pub ics_base_url: String,
    pub team_ids: Vec<String>,
    pub schedule_page_url: String,
    pub database_path: PathBuf,
    pub metrics_addr: Option<SocketAddr>,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; files named by `TEAM_FILTER_PATH` / `TEAM_ICS_FILE` are read.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let discord_bot_token = get("DISCORD_BOT_TOKEN")
            .ok_or_else(|| anyhow!("required environment variable DISCORD_BOT_TOKEN is not set"))?;
        let discord_channel_id = get("DISCORD_CHANNEL_ID")
            .ok_or_else(|| anyhow!("required environment variable DISCORD_CHANNEL_ID is not set"))?;
        if discord_channel_id.parse::<u64>().is_err() {
            bail!("DISCORD_CHANNEL_ID must be a numeric channel ID");
        }

        let role_id = get("DISCORD_MENTION_ROLE_ID");
        if let Some(r) = &role_id {
            if r.parse::<u64>().is_err() {
                bail!("DISCORD_MENTION_ROLE_ID must be a numeric role ID");
            }
        }
        let mentions = Mentions {
            everyone: get("DISCORD_PING_EVERYONE")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            role_id,
        };

        // Parsed straight into the target widths so out-of-range values fail instead of wrapping.
        let notify_minutes_before: u32 = parse_num(&get, "NOTIFY_MINUTES_BEFORE", 15)?;
        let check_secs: u64 = parse_num(&get, "NOTIFY_CHECK_INTERVAL_SECS", 30)?;
        if check_secs < 1 {
            bail!("NOTIFY_CHECK_INTERVAL_SECS must be at least 1 second");
        }
        let fetch_minutes: u64 = parse_num(&get, "SCHEDULE_FETCH_INTERVAL", 60)?;
        if fetch_minutes < 1 {
            bail!("SCHEDULE_FETCH_INTERVAL must be at least 1 minute");
        }
        let Some(fetch_secs) = fetch_minutes.checked_mul(60) else {
            bail!("SCHEDULE_FETCH_INTERVAL is out of range");
        };
        let retention_days: u32 = parse_num(&get, "RETENTION_DAYS", 30)?;
        if retention_days < 1 {
            bail!("RETENTION_DAYS must be at least 1 day");
        }
        let max_attempts: u32 = parse_num(&get, "DELIVERY_MAX_ATTEMPTS", 3)?;
        if max_attempts < 1 {
            bail!("DELIVERY_MAX_ATTEMPTS must be at least 1");
        }
        let base_delay_ms: u64 = parse_num(&get, "DELIVERY_BASE_DELAY_MS", 1000)?;

        if check_secs >= u64::from(notify_minutes_before.max(1)) * 60 {
            tracing::warn!(
                target: "config",
                check_secs,
                notify_minutes_before,
                "check interval is not shorter than the notification lead; windows may be missed"
            );
        }

        // Team allow-list: TEAM_FILTER_PATH file entries first, then TEAMS.
        let mut teams = Vec::new();
        if let Some(p) = get("TEAM_FILTER_PATH") {
            teams.extend(load_team_filter_from(Path::new(&p))?);
        }
        if let Some(t) = get("TEAMS") {
            teams.extend(split_list(&t));
        }
        let teams = clean_list(teams);

        // Team ids: links file first, then TEAM_IDS, unique.
        let ics_file = get("TEAM_ICS_FILE").unwrap_or_else(|| "ical_links.txt".to_string());
        let mut team_ids = load_ics_links(Path::new(&ics_file))?;
        if let Some(ids) = get("TEAM_IDS") {
            team_ids.extend(split_list(&ids));
        }
        let team_ids = clean_list(team_ids);

        let metrics_addr = match get("METRICS_ADDR") {
            Some(a) => Some(
                a.parse::<SocketAddr>()
                    .with_context(|| format!("METRICS_ADDR is not a socket address: {a}"))?,
            ),
            None => None,
        };

        Ok(Self {
            discord_bot_token,
            discord_channel_id,
            discord_api_base: get("DISCORD_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            mentions,
            teams,
            notify_minutes_before,
            notify_check_interval: Duration::from_secs(check_secs),
            schedule_fetch_interval: Duration::from_secs(fetch_secs),
            retention_days,
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(base_delay_ms),
            },
            ics_base_url: get("ICS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ICS_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            team_ids,
            schedule_page_url: get("SCHEDULE_PAGE_URL")
                .unwrap_or_else(|| DEFAULT_SCHEDULE_URL.to_string()),
            database_path: PathBuf::from(
                get("DATABASE_PATH").unwrap_or_else(|| "data/bot.db".to_string()),
            ),
            metrics_addr,
        })
    }

    /// Startup summary without secrets.
    pub fn log_summary(&self) {
        tracing::info!(
            target: "config",
            lead_minutes = self.notify_minutes_before,
            fetch_interval_minutes = self.schedule_fetch_interval.as_secs() / 60,
            check_interval_secs = self.notify_check_interval.as_secs(),
            retention_days = self.retention_days,
            team_ids = self.team_ids.len(),
            token_len = self.discord_bot_token.len(),
            "configuration loaded"
        );
        if self.teams.is_empty() {
            tracing::info!(target: "config", "team filter: all matches");
        } else {
            tracing::info!(target: "config", teams = %self.teams.join(", "), "team filter");
        }
    }
}

fn parse_num<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v
            .parse::<T>()
            .map_err(|_| anyhow!("{key} must be a whole number, got {v:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    const BASE: [(&str, &str); 3] = [
        ("DISCORD_BOT_TOKEN", "tok"),
        ("DISCORD_CHANNEL_ID", "1234"),
        ("TEAM_ICS_FILE", "/nonexistent/ical_links.txt"),
    ];

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(cfg.notify_minutes_before, 15);
        assert_eq!(cfg.notify_check_interval, Duration::from_secs(30));
        assert_eq!(cfg.schedule_fetch_interval, Duration::from_secs(3600));
        assert_eq!(cfg.retention_days, 30);
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert!(cfg.teams.is_empty());
        assert!(cfg.team_ids.is_empty());
        assert_eq!(cfg.database_path, PathBuf::from("data/bot.db"));
        assert_eq!(cfg.mentions, Mentions::default());
        assert!(cfg.metrics_addr.is_none());
    }

    #[test]
    fn missing_token_is_fatal() {
        let err = AppConfig::from_lookup(lookup(&[("DISCORD_CHANNEL_ID", "1")])).unwrap_err();
        assert!(err.to_string().contains("DISCORD_BOT_TOKEN"));
    }

    #[test]
    fn invalid_ranges_are_fatal() {
        for (k, v) in [
            ("DISCORD_CHANNEL_ID", "general"),
            ("NOTIFY_MINUTES_BEFORE", "-1"),
            ("SCHEDULE_FETCH_INTERVAL", "0"),
            ("RETENTION_DAYS", "0"),
            ("RETENTION_DAYS", "4294967297"),
            ("NOTIFY_MINUTES_BEFORE", "4294967311"),
            ("DELIVERY_MAX_ATTEMPTS", "4294967296"),
            ("SCHEDULE_FETCH_INTERVAL", "307445734561825861"),
            ("DELIVERY_MAX_ATTEMPTS", "zero"),
            ("METRICS_ADDR", "nowhere"),
        ] {
            let mut pairs = BASE.to_vec();
            pairs.retain(|(key, _)| *key != k);
            pairs.push((k, v));
            assert!(AppConfig::from_lookup(lookup(&pairs)).is_err(), "{k}={v} accepted");
        }
    }

    #[test]
    fn large_in_range_values_are_kept_exactly() {
        let mut pairs = BASE.to_vec();
        pairs.push(("RETENTION_DAYS", "4294967295"));
        pairs.push(("NOTIFY_MINUTES_BEFORE", "0"));
        let cfg = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.retention_days, u32::MAX);
        assert_eq!(cfg.notify_minutes_before, 0);
    }

    #[test]
    fn lists_are_split_and_merged() {
        let mut pairs = BASE.to_vec();
        pairs.push(("TEAMS", "OpTic Texas, Atlanta FaZe ,,OpTic Texas"));
        pairs.push(("TEAM_IDS", "b1,b2, b1"));
        pairs.push(("DISCORD_PING_EVERYONE", "TRUE"));
        pairs.push(("DISCORD_MENTION_ROLE_ID", "555"));
        let cfg = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.teams, vec!["OpTic Texas".to_string(), "Atlanta FaZe".to_string()]);
        assert_eq!(cfg.team_ids, vec!["b1".to_string(), "b2".to_string()]);
        assert!(cfg.mentions.everyone);
        assert_eq!(cfg.mentions.role_id.as_deref(), Some("555"));
    }
}
