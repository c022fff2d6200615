mod records;
mod slack;

pub use records::{Insight, StoredMessage, UNKNOWN_USER};
pub use slack::{IgnoreReason, SlackEvent, WebhookAction, WebhookPayload};
