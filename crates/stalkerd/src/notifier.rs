use async_trait::async_trait;
use stalker_core::NameChange;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook transport error: {0}")]
    Transport(String),
    #[error("webhook delivery rejected ({status})")]
    Rejected { status: u16 },
}

impl From<reqwest::Error> for NotifyError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// Delivers a name-change event to the operator channel. Failures are the
/// caller's to log; delivery is never retried within the same cycle.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NameChange) -> Result<(), NotifyError>;
}

/// The operator-facing message. When the profile already changed names
/// before, the original name rides along.
pub fn render_message(event: &NameChange) -> String {
    let profile_url = event.profile_url();
    if event.has_prior_changes {
        format!(
            "{} (og: {}) has changed their name to [{}]({profile_url})",
            event.previous_name, event.original_name, event.new_name
        )
    } else {
        format!(
            "{} has changed their name to [{}]({profile_url})",
            event.previous_name, event.new_name
        )
    }
}

/// Posts rendered events to a Discord-compatible webhook.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &NameChange) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "content": render_message(event) }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Used when no webhook is configured: changes end up in the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &NameChange) -> Result<(), NotifyError> {
        info!(event = "name_change", message = %render_message(event));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stalker_core::SteamId;

    fn event(has_prior_changes: bool) -> NameChange {
        NameChange {
            id: SteamId::parse("76561198000000001").expect("valid id"),
            original_name: "alice".to_string(),
            previous_name: "alicia".to_string(),
            new_name: "al1cia".to_string(),
            has_prior_changes,
        }
    }

    #[test]
    fn first_change_omits_the_original_name() {
        let rendered = render_message(&event(false));
        assert_eq!(
            rendered,
            "alicia has changed their name to [al1cia](https://steamcommunity.com/profiles/76561198000000001)"
        );
    }

    #[test]
    fn later_changes_mention_the_original_name() {
        let rendered = render_message(&event(true));
        assert_eq!(
            rendered,
            "alicia (og: alice) has changed their name to [al1cia](https://steamcommunity.com/profiles/76561198000000001)"
        );
    }
}
