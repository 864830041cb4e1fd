// tests/ingest_config.rs
use std::fs;

use cdl_match_notifier::config::AppConfig;
use cdl_match_notifier::ingest::config::{load_ics_links, load_team_filter_from};

#[test]
fn team_filter_from_toml_and_json() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("teams.toml");
    fs::write(
        &p_toml,
        r#"
teams = [" OpTic Texas ", "", "Atlanta FaZe", "Atlanta FaZe"]
"#,
    )
    .unwrap();
    let v = load_team_filter_from(&p_toml).unwrap();
    assert_eq!(v, vec!["OpTic Texas".to_string(), "Atlanta FaZe".to_string()]);

    let p_json = dir.path().join("teams.json");
    fs::write(&p_json, r#"["Toronto Ultra"," Boston Breach  ", ""]"#).unwrap();
    let vj = load_team_filter_from(&p_json).unwrap();
    assert_eq!(vj, vec!["Toronto Ultra".to_string(), "Boston Breach".to_string()]);

    let p_bad = dir.path().join("teams.txt");
    fs::write(&p_bad, "not a list").unwrap();
    assert!(load_team_filter_from(&p_bad).is_err());
}

#[test]
fn ics_links_file_yields_team_ids() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("ical_links.txt");
    fs::write(
        &p,
        "OpTic Texas: webcal://cdl.example/CDL-calendar-sync/2026/optic_texas.ics\n\
         \n\
         Atlanta FaZe: https://cdl.example/CDL-calendar-sync/2026/atlanta_faze.ics?v=2\n\
         garbage line without separator\n\
         Broken: https://cdl.example/nothing-here\n",
    )
    .unwrap();
    let ids = load_ics_links(&p).unwrap();
    assert_eq!(ids, vec!["optic_texas".to_string(), "atlanta_faze".to_string()]);

    assert!(load_ics_links(&dir.path().join("missing.txt")).unwrap().is_empty());
}

#[serial_test::serial]
#[test]
fn app_config_reads_process_env_and_files() {
    let dir = tempfile::tempdir().unwrap();
    let links = dir.path().join("links.txt");
    fs::write(&links, "OpTic Texas: webcal://cdl.example/2026/optic_texas.ics\n").unwrap();
    let filter = dir.path().join("teams.json");
    fs::write(&filter, r#"["OpTic Texas"]"#).unwrap();

    let vars = [
        ("DISCORD_BOT_TOKEN", "token-from-env"),
        ("DISCORD_CHANNEL_ID", "987654321"),
        ("NOTIFY_MINUTES_BEFORE", "10"),
        ("TEAMS", "Atlanta FaZe"),
        ("TEAM_IDS", "atlanta_faze"),
    ];
    for (k, v) in vars {
        std::env::set_var(k, v);
    }
    std::env::set_var("TEAM_ICS_FILE", links.display().to_string());
    std::env::set_var("TEAM_FILTER_PATH", filter.display().to_string());

    let cfg = AppConfig::from_env();

    for (k, _) in vars {
        std::env::remove_var(k);
    }
    std::env::remove_var("TEAM_ICS_FILE");
    std::env::remove_var("TEAM_FILTER_PATH");

    let cfg = cfg.unwrap();
    assert_eq!(cfg.discord_channel_id, "987654321");
    assert_eq!(cfg.notify_minutes_before, 10);
    assert_eq!(cfg.teams, vec!["OpTic Texas".to_string(), "Atlanta FaZe".to_string()]);
    assert_eq!(cfg.team_ids, vec!["optic_texas".to_string(), "atlanta_faze".to_string()]);
}
