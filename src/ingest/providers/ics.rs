// src/ingest/providers/ics.rs
//! Per-team calendar feed (RFC 5545 `.ics`) provider.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

use crate::ingest::types::MatchProvider;
use crate::model::Match;

pub const DEFAULT_ICS_BASE_URL: &str =
    "https://cdl-public-archive.s3.us-east-2.amazonaws.com/CDL-calendar-sync/2026";

const SOURCE: &str = "ics";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct IcsFeedProvider {
    team_id: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl IcsFeedProvider {
    /// Feed at `{base_url}/{team_id}.ics`; `webcal://` is fetched over https.
    pub fn new(base_url: &str, team_id: impl Into<String>, client: reqwest::Client) -> Self {
        let team_id = team_id.into();
        let url = feed_url(base_url, &team_id);
        Self {
            team_id,
            mode: Mode::Http { url, client },
        }
    }

    /// Serve a fixed calendar body instead of fetching.
    pub fn from_fixture(team_id: impl Into<String>, content: &str) -> Self {
        Self {
            team_id: team_id.into(),
            mode: Mode::Fixture(content.to_string()),
        }
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }
}

pub fn feed_url(base_url: &str, team_id: &str) -> String {
    let url = format!("{}/{}.ics", base_url.trim_end_matches('/'), team_id);
    match url.strip_prefix("webcal://") {
        Some(rest) => format!("https://{rest}"),
        None => url,
    }
}

#[async_trait]
impl MatchProvider for IcsFeedProvider {
    async fn fetch(&self) -> Result<Vec<Match>> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { url, client } => {
                tracing::debug!(target: "ingest", %url, "fetching ics feed");
                client
                    .get(url)
                    .timeout(FETCH_TIMEOUT)
                    .send()
                    .await
                    .with_context(|| format!("ics http get {url}"))?
                    .error_for_status()
                    .with_context(|| format!("ics http status {url}"))?
                    .text()
                    .await
                    .context("ics http .text()")?
            }
        };
        let out = parse_ics(&body, SOURCE, Utc::now());
        tracing::info!(target: "ingest", team_id = %self.team_id(), count = out.len(), "parsed matches from ics feed");
        Ok(out)
    }

    fn name(&self) -> &str {
        self.team_id()
    }
}

/// Parse every `VEVENT` into a match. Events without a start time or without both team
/// names are dropped with a warning.
pub fn parse_ics(content: &str, source: &str, now: DateTime<Utc>) -> Vec<Match> {
    let mut out = Vec::new();
    let mut current: Option<Vec<Property>> = None;

    for line in unfold_lines(content) {
        if line.eq_ignore_ascii_case("BEGIN:VEVENT") {
            current = Some(Vec::new());
            continue;
        }
        if line.eq_ignore_ascii_case("END:VEVENT") {
            if let Some(props) = current.take() {
                if let Some(m) = event_to_match(&props, source, now) {
                    out.push(m);
                }
            }
            continue;
        }
        if let Some(props) = current.as_mut() {
            if let Some(p) = parse_property(&line) {
                props.push(p);
            }
        }
    }
    out
}

#[derive(Debug)]
struct Property {
    name: String,
    params: String,
    value: String,
}

/// RFC 5545 line unfolding: a line starting with space/tab continues the previous one.
fn unfold_lines(content: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in content.lines() {
        let raw = raw.trim_end_matches('\r');
        if let Some(cont) = raw.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(cont);
                continue;
            }
        }
        if !raw.is_empty() {
            lines.push(raw.to_string());
        }
    }
    lines
}

fn parse_property(line: &str) -> Option<Property> {
    let (head, value) = line.split_once(':')?;
    let (name, params) = match head.split_once(';') {
        Some((n, p)) => (n, p),
        None => (head, ""),
    };
    Some(Property {
        name: name.trim().to_ascii_uppercase(),
        params: params.to_string(),
        value: value.to_string(),
    })
}

fn event_to_match(props: &[Property], source: &str, now: DateTime<Utc>) -> Option<Match> {
    let get = |name: &str| props.iter().find(|p| p.name == name);

    let dtstart = get("DTSTART")?;
    let Some(start) = parse_dtstart(&dtstart.value, &dtstart.params) else {
        tracing::warn!(target: "ingest", value = %dtstart.value, "unparseable DTSTART, skipping event");
        return None;
    };

    let summary = get("SUMMARY").map(|p| unescape_text(&p.value)).unwrap_or_default();
    let Some((home, away)) = parse_teams(&summary) else {
        tracing::warn!(target: "ingest", %summary, "could not parse teams from summary");
        return None;
    };

    let url = get("URL")
        .map(|p| p.value.trim().to_string())
        .filter(|s| !s.is_empty());
    let description = get("DESCRIPTION")
        .map(|p| unescape_text(&p.value))
        .filter(|s| !s.is_empty());

    Some(
        Match::new(home, away, start, source, now)
            .with_url(url)
            .with_description(description),
    )
}

/// `YYYYMMDDTHHMMSSZ` (UTC), floating `YYYYMMDDTHHMMSS`, or `YYYYMMDD` (midnight).
/// Floating and `TZID=` times are taken as UTC.
fn parse_dtstart(value: &str, params: &str) -> Option<DateTime<Utc>> {
    let v = value.trim();
    if v.len() == 8 {
        let d = NaiveDate::parse_from_str(v, "%Y%m%d").ok()?;
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
    }
    let (naive, zulu) = match v.strip_suffix('Z') {
        Some(stripped) => (stripped, true),
        None => (v, false),
    };
    if !zulu && params.to_ascii_uppercase().contains("TZID=") {
        tracing::debug!(target: "ingest", %params, "TZID start time treated as UTC");
    }
    NaiveDateTime::parse_from_str(naive, "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

static RE_TEAMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(.+?)\s+(?:vs\.?|v|@)\s+(.+?)\s*$").expect("summary regex")
});
static RE_LEADING_VS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^vs\.?\s+").expect("leading vs regex"));

/// Split a summary like `"Team A vs Team B"` into both team names.
pub fn parse_teams(summary: &str) -> Option<(String, String)> {
    let caps = RE_TEAMS.captures(summary)?;
    let clean = |s: &str| RE_LEADING_VS.replace(s.trim(), "").trim().to_string();
    let home = clean(caps.get(1)?.as_str());
    let away = clean(caps.get(2)?.as_str());
    if home.is_empty() || away.is_empty() {
        counter!("ingest_malformed_events_total").increment(1);
        return None;
    }
    Some((home, away))
}

fn unescape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    html_escape::decode_html_entities(out.trim()).to_string()
}
