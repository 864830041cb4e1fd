// src/notify/mod.rs
pub mod discord;
pub mod scheduler;

use anyhow::Result;

use crate::model::Match;

pub use discord::DiscordChannel;
pub use scheduler::{CycleReport, NotificationScheduler, RetryPolicy};

/// A chat destination that accepts a formatted message.
///
/// Every error is treated as retryable by the scheduler.
#[async_trait::async_trait]
pub trait Destination: Send + Sync {
    /// Stable id used as the receipt key (e.g. the channel id).
    fn destination_id(&self) -> &str;
    async fn deliver(&self, message: &str) -> Result<()>;
}

/// Who gets pinged on top of the announcement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mentions {
    pub everyone: bool,
    pub role_id: Option<String>,
}

impl Mentions {
    fn prefix(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.everyone {
            parts.push("@everyone".to_string());
        }
        if let Some(role) = &self.role_id {
            parts.push(format!("<@&{role}>"));
        }
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

/// Chat message announcing a match. Start time uses Discord's `<t:unix:F>` markup so each
/// reader sees it in their own timezone.
pub fn format_match_message(m: &Match, mentions: &Mentions) -> String {
    let ts = m.start_time_utc.timestamp();
    let mut lines = vec![
        "🔔 **CDL Match Starting Soon!**".to_string(),
        format!("{} vs {}", m.home_team, m.away_team),
        format!("Start time: <t:{ts}:F> (<t:{ts}:R>)"),
    ];
    if let Some(url) = &m.url {
        lines.push(format!("More info: {url}"));
    }
    let body = lines.join("\n");
    match mentions.prefix() {
        Some(p) => format!("{p}\n{body}"),
        None => body,
    }
}
