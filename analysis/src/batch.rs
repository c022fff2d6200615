use anyhow::{Context, Result};
use chrono::Utc;
use insights_store::Store;
use insights_types::{Insight, StoredMessage};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info};

use crate::llm::ChannelAnalyst;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub messages: usize,
    pub channels: usize,
    pub analyzed: usize,
    pub failed: usize,
}

/// Buckets messages by channel, keeping each channel's messages in input order.
pub fn group_by_channel(messages: Vec<StoredMessage>) -> BTreeMap<String, Vec<StoredMessage>> {
    let mut channels: BTreeMap<String, Vec<StoredMessage>> = BTreeMap::new();
    for msg in messages {
        channels.entry(msg.channel_id.clone()).or_default().push(msg);
    }
    channels
}

pub fn format_transcript(messages: &[StoredMessage]) -> String {
    messages
        .iter()
        .map(StoredMessage::transcript_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Analyzes one channel's batch and stores the result. The insight and the
/// processed marks are written together, so a failure leaves the batch pending.
pub async fn analyze_channel(
    store: &Store,
    analyst: &dyn ChannelAnalyst,
    channel_id: &str,
    messages: &[StoredMessage],
) -> Result<Option<Insight>> {
    if messages.is_empty() {
        return Ok(None);
    }

    let transcript = format_transcript(messages);
    let analysis = analyst
        .analyze(&transcript)
        .await
        .with_context(|| format!("analyze channel {channel_id}"))?;

    let insight = Insight::new(channel_id, analysis, messages.len());
    let ids: Vec<_> = messages.iter().map(|m| m.id).collect();
    let marked = store
        .record_insight(&insight, &ids)
        .with_context(|| format!("store insight for channel {channel_id}"))?;
    tracing::debug!(channel = %channel_id, marked, "marked messages processed");

    Ok(Some(insight))
}

pub async fn run_analysis(
    store: &Store,
    analyst: &dyn ChannelAnalyst,
    lookback: Duration,
) -> Result<RunSummary> {
    let started = Utc::now();
    info!(at = %started, "starting analysis");

    let cutoff = chrono::Duration::from_std(lookback)
        .ok()
        .and_then(|lookback| started.checked_sub_signed(lookback))
        .context("lookback out of range")?;
    let messages = store
        .unprocessed_since(cutoff)
        .context("load unprocessed messages")?;
    info!(count = messages.len(), "found unprocessed messages");

    let mut summary = RunSummary {
        messages: messages.len(),
        ..RunSummary::default()
    };
    let channels = group_by_channel(messages);
    summary.channels = channels.len();

    for (channel_id, batch) in &channels {
        info!(channel = %channel_id, count = batch.len(), "analyzing channel");
        match analyze_channel(store, analyst, channel_id, batch).await {
            Ok(Some(_)) => {
                summary.analyzed += 1;
                info!(channel = %channel_id, "analysis complete");
            }
            Ok(None) => {}
            Err(e) => {
                summary.failed += 1;
                error!(channel = %channel_id, err = ?e, "channel analysis failed");
            }
        }
    }

    info!(
        analyzed = summary.analyzed,
        failed = summary.failed,
        at = %Utc::now(),
        "analysis completed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Records every transcript and fails on any that mentions "boom".
    #[derive(Default)]
    struct ScriptedAnalyst {
        transcripts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChannelAnalyst for ScriptedAnalyst {
        async fn analyze(&self, transcript: &str) -> Result<Value> {
            self.transcripts.lock().unwrap().push(transcript.to_string());
            if transcript.contains("boom") {
                bail!("model unavailable");
            }
            Ok(json!({"sentiment_summary": "ok", "lines": transcript.lines().count()}))
        }
    }

    fn message(channel: &str, user: &str, text: &str) -> StoredMessage {
        StoredMessage {
            id: Uuid::new_v4(),
            team_id: None,
            channel_id: channel.to_string(),
            user_id: Some(user.to_string()),
            text: text.to_string(),
            ts: Some(Uuid::new_v4().to_string()),
            thread_ts: None,
            processed: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn groups_preserve_order_within_channel() {
        let msgs = vec![
            message("C2", "U1", "a"),
            message("C1", "U1", "b"),
            message("C2", "U2", "c"),
        ];
        let grouped = group_by_channel(msgs);
        assert_eq!(grouped.len(), 2);
        let c2: Vec<_> = grouped["C2"].iter().map(|m| m.text.as_str()).collect();
        assert_eq!(c2, vec!["a", "c"]);
        assert_eq!(grouped["C1"].len(), 1);
    }

    #[test]
    fn transcript_joins_lines() {
        let msgs = vec![message("C1", "U1", "hello"), message("C1", "U2", "hi there")];
        assert_eq!(format_transcript(&msgs), "User U1: hello\nUser U2: hi there");
    }

    #[tokio::test]
    async fn empty_batch_is_skipped() -> Result<()> {
        let store = Store::open_in_memory()?;
        let analyst = ScriptedAnalyst::default();
        let result = analyze_channel(&store, &analyst, "C1", &[]).await?;
        assert!(result.is_none());
        assert!(analyst.transcripts.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn run_stores_insights_and_marks_messages() -> Result<()> {
        let store = Store::open_in_memory()?;
        for m in [
            message("C1", "U1", "release slipped"),
            message("C1", "U2", "need more QA"),
            message("C2", "U3", "customer renewed"),
        ] {
            store.insert_message(&m)?;
        }

        let analyst = ScriptedAnalyst::default();
        let summary = run_analysis(&store, &analyst, Duration::from_secs(24 * 3600)).await?;
        assert_eq!(
            summary,
            RunSummary {
                messages: 3,
                channels: 2,
                analyzed: 2,
                failed: 0
            }
        );
        assert_eq!(store.pending_count()?, 0);

        let insights = store.recent_insights(10, Some("C1"))?;
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].message_count, 2);
        assert_eq!(insights[0].analysis["lines"], 2);

        let transcripts = analyst.transcripts.lock().unwrap();
        assert!(transcripts.contains(&"User U1: release slipped\nUser U2: need more QA".to_string()));

        // A second pass finds nothing left to do.
        drop(transcripts);
        let again = run_analysis(&store, &analyst, Duration::from_secs(24 * 3600)).await?;
        assert_eq!(again, RunSummary::default());
        Ok(())
    }

    #[tokio::test]
    async fn failed_channel_stays_pending() -> Result<()> {
        let store = Store::open_in_memory()?;
        store.insert_message(&message("C1", "U1", "boom goes the deploy"))?;
        store.insert_message(&message("C2", "U2", "all quiet"))?;

        let analyst = ScriptedAnalyst::default();
        let summary = run_analysis(&store, &analyst, Duration::from_secs(3600)).await?;
        assert_eq!(summary.analyzed, 1);
        assert_eq!(summary.failed, 1);

        let pending = store.unprocessed_since(Utc::now() - chrono::Duration::hours(1))?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].channel_id, "C1");
        assert!(store.recent_insights(10, Some("C1"))?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn messages_outside_lookback_are_left_alone() -> Result<()> {
        let store = Store::open_in_memory()?;
        let mut old = message("C1", "U1", "ancient history");
        old.created_at = Utc::now() - chrono::Duration::hours(48);
        store.insert_message(&old)?;

        let analyst = ScriptedAnalyst::default();
        let summary = run_analysis(&store, &analyst, Duration::from_secs(24 * 3600)).await?;
        assert_eq!(summary.messages, 0);
        assert_eq!(store.pending_count()?, 1);
        Ok(())
    }
}
