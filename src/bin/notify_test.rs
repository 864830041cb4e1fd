//! Manual end-to-end check of the notification path.
//!
//! `--immediate` posts a message for a synthetic match straight to the configured channel.
//! Without it a synthetic match is stored so the running daemon announces it on its own.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;

use cdl_match_notifier::config::AppConfig;
use cdl_match_notifier::model::Match;
use cdl_match_notifier::notify::{format_match_message, Destination, DiscordChannel};
use cdl_match_notifier::store::Store;

#[derive(Parser)]
#[command(name = "notify_test", version, about = "Send or schedule a test match notification")]
struct Cli {
    /// Send the message now instead of storing a match for the daemon
    #[arg(long)]
    immediate: bool,

    /// Minutes from now until the stored match starts
    #[arg(long, default_value_t = 20)]
    minutes: i64,

    /// Home team name
    #[arg(long, default_value = "Test Team A")]
    team1: String,

    /// Away team name
    #[arg(long, default_value = "Test Team B")]
    team2: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let cli = Cli::parse();
    let cfg = AppConfig::from_env().context("invalid configuration")?;
    let now = Utc::now();

    if cli.immediate {
        let m = Match::new(&cli.team1, &cli.team2, now + Duration::minutes(1), "test", now);
        let channel = DiscordChannel::new(cfg.discord_bot_token.clone(), cfg.discord_channel_id.clone())
            .with_api_base(cfg.discord_api_base.clone());
        channel
            .deliver(&format_match_message(&m, &cfg.mentions))
            .await
            .context("test notification failed")?;
        println!("sent test notification for {} vs {}", m.home_team, m.away_team);
        return Ok(());
    }

    let store = Store::open(&cfg.database_path)
        .with_context(|| format!("opening database {}", cfg.database_path.display()))?;
    let start = now + Duration::minutes(cli.minutes);
    let m = Match::new(&cli.team1, &cli.team2, start, "test", now)
        .with_description(Some("Synthetic test match".to_string()));
    store.upsert_match(&m)?;

    println!(
        "stored {} ({} vs {}) starting {}; expect a message about {} min before start",
        m.id, m.home_team, m.away_team, m.start_time_utc, cfg.notify_minutes_before
    );
    if store.is_notified(&m.id, &cfg.discord_channel_id)? {
        println!("note: this pairing was already announced today; pick other --team1/--team2 names");
    }
    Ok(())
}
