use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::slack::SlackEvent;

/// Placeholder used in transcripts when Slack omitted the author.
pub const UNKNOWN_USER: &str = "unknown";

/// A raw Slack message as persisted by the webhook receiver.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub(crate) fn from_event(
        team_id: Option<String>,
        channel_id: String,
        event: SlackEvent,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id,
            channel_id,
            user_id: event.user,
            text: event.text.unwrap_or_default(),
            ts: event.ts,
            thread_ts: event.thread_ts,
            processed: false,
            created_at: now,
        }
    }

    pub fn transcript_line(&self) -> String {
        let user = self.user_id.as_deref().unwrap_or(UNKNOWN_USER);
        format!("User {user}: {}", self.text)
    }
}

/// Structured analysis of one channel's batch of messages.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Insight {
    pub id: Uuid,
    pub channel_id: String,
    pub analysis: serde_json::Value,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(channel_id: impl Into<String>, analysis: serde_json::Value, message_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel_id: channel_id.into(),
            analysis,
            message_count,
            created_at: Utc::now(),
        }
    }
}
