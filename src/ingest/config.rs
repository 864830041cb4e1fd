// src/ingest/config.rs
//! Loaders for the team allow-list and for calendar-feed team identifiers.

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Load a team allow-list from an explicit path. Supports TOML (`teams = [...]`) or a JSON array.
pub fn load_team_filter_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading team filter from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_team_filter(&content, ext.as_str())
}

fn parse_team_filter(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains("teams");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported team filter format"))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlTeams {
        teams: Vec<String>,
    }
    let v: TomlTeams = toml::from_str(s)?;
    Ok(clean_list(v.teams))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Split a comma-separated env value into trimmed, non-empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    clean_list(raw.split(',').map(str::to_string).collect())
}

/// Trim, drop empties, drop later duplicates; first-seen order is kept.
pub fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

static RE_TEAM_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/([^/?#]+)\.ics").expect("team id regex"));

/// Extract the team identifier (the file stem before `.ics`) from a feed URL.
pub fn team_id_from_url(url: &str) -> Option<String> {
    let url = url.trim().replacen("webcal://", "https://", 1);
    RE_TEAM_ID
        .captures(&url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse `Team Name: webcal://.../<team_id>.ics` lines into team identifiers.
pub fn parse_ics_links(content: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((_name, url)) = line.split_once(':') else {
            tracing::warn!(target: "config", line = idx + 1, "ics links line has no ':' separator, skipping");
            continue;
        };
        match team_id_from_url(url) {
            Some(id) => ids.push(id),
            None => {
                tracing::warn!(target: "config", line = idx + 1, url = url.trim(), "could not extract team id, skipping");
            }
        }
    }
    ids
}

/// Read team identifiers from an ICS links file. A missing file yields an empty list.
pub fn load_ics_links(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        tracing::warn!(target: "config", path = %path.display(), "ics links file not found");
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading ics links from {}", path.display()))?;
    let ids = parse_ics_links(&content);
    tracing::info!(target: "config", count = ids.len(), path = %path.display(), "parsed team ids");
    Ok(ids)
}
