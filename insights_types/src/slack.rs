use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::records::StoredMessage;

const URL_VERIFICATION: &str = "url_verification";
const MESSAGE_EVENT: &str = "message";
const SUBTYPE_CHANGED: &str = "message_changed";
const SUBTYPE_DELETED: &str = "message_deleted";
const SUBTYPE_BOT: &str = "bot_message";

/// Body of a Slack Events API request.
///
/// Every field is optional so that unexpected envelopes still deserialize and
/// fall through to [`WebhookAction::Ignore`].
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct WebhookPayload {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub event: Option<SlackEvent>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct SlackEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookAction {
    /// Slack is verifying the endpoint; echo the challenge back.
    Challenge(String),
    Store(StoredMessage),
    Ignore(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotAMessage,
    Edited,
    Deleted,
    FromBot,
    MissingChannel,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::NotAMessage => "not_a_message",
            IgnoreReason::Edited => "edited",
            IgnoreReason::Deleted => "deleted",
            IgnoreReason::FromBot => "from_bot",
            IgnoreReason::MissingChannel => "missing_channel",
        }
    }
}

impl WebhookPayload {
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).context("decode slack webhook payload")
    }

    pub fn classify(self, now: DateTime<Utc>) -> WebhookAction {
        if self.kind.as_deref() == Some(URL_VERIFICATION) {
            return WebhookAction::Challenge(self.challenge.unwrap_or_default());
        }

        let Some(event) = self.event else {
            return WebhookAction::Ignore(IgnoreReason::NotAMessage);
        };
        if event.kind.as_deref() != Some(MESSAGE_EVENT) {
            return WebhookAction::Ignore(IgnoreReason::NotAMessage);
        }

        match event.subtype.as_deref() {
            Some(SUBTYPE_CHANGED) => return WebhookAction::Ignore(IgnoreReason::Edited),
            Some(SUBTYPE_DELETED) => return WebhookAction::Ignore(IgnoreReason::Deleted),
            Some(SUBTYPE_BOT) => return WebhookAction::Ignore(IgnoreReason::FromBot),
            _ => {}
        }
        if event.bot_id.is_some() {
            return WebhookAction::Ignore(IgnoreReason::FromBot);
        }

        let Some(channel) = event.channel.clone().filter(|c| !c.trim().is_empty()) else {
            return WebhookAction::Ignore(IgnoreReason::MissingChannel);
        };

        WebhookAction::Store(StoredMessage::from_event(self.team_id, channel, event, now))
    }
}
