use super::Destination;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Posts messages to one Discord text channel through the bot REST API.
#[derive(Clone)]
pub struct DiscordChannel {
    api_base: String,
    token: String,
    channel_id: String,
    client: Client,
    timeout: Duration,
}

impl DiscordChannel {
    pub fn new(token: String, channel_id: String) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token,
            channel_id,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn messages_url(&self) -> String {
        format!("{}/channels/{}/messages", self.api_base, self.channel_id)
    }
}

#[async_trait::async_trait]
impl Destination for DiscordChannel {
    fn destination_id(&self) -> &str {
        &self.channel_id
    }

    async fn deliver(&self, message: &str) -> Result<()> {
        let payload = CreateMessage::new(message);
        let rsp = self
            .client
            .post(self.messages_url())
            .timeout(self.timeout)
            .header("Authorization", format!("Bot {}", self.token))
            .json(&payload)
            .send()
            .await
            .context("discord request failed")?;

        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            return Err(anyhow!("discord HTTP {status}: {body}"));
        }
        tracing::info!(target: "notify", channel_id = %self.channel_id, "message posted");
        Ok(())
    }
}

#[derive(Serialize)]
struct AllowedMentions {
    parse: Vec<&'static str>,
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
    allowed_mentions: AllowedMentions,
}

impl<'a> CreateMessage<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            content,
            allowed_mentions: AllowedMentions {
                parse: vec!["everyone", "roles"],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_and_id() {
        let ch = DiscordChannel::new("t".into(), "123".into())
            .with_api_base("http://127.0.0.1:9/api/")
            .with_timeout(1);
        assert_eq!(ch.destination_id(), "123");
        assert_eq!(ch.messages_url(), "http://127.0.0.1:9/api/channels/123/messages");
    }

    #[test]
    fn payload_allows_role_and_everyone_pings() {
        let v = serde_json::to_value(CreateMessage::new("hi")).unwrap();
        assert_eq!(v["content"], "hi");
        assert_eq!(v["allowed_mentions"]["parse"], serde_json::json!(["everyone", "roles"]));
    }
}
