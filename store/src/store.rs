//! SQLite-backed document store with two collections: `messages` and `insights`.
//!
//! Each record is kept whole as a JSON document; the handful of fields that
//! queries filter or sort on are mirrored into indexed columns.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use insights_types::{Insight, StoredMessage};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY,
    channel_id  TEXT NOT NULL,
    ts          TEXT,
    processed   INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL,
    doc         TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS messages_channel_ts ON messages (channel_id, ts);
CREATE INDEX IF NOT EXISTS messages_pending ON messages (processed, created_at);

CREATE TABLE IF NOT EXISTS insights (
    id          TEXT PRIMARY KEY,
    channel_id  TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    doc         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS insights_created ON insights (created_at);
";

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("create store dir {dir:?}"))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open document store at {path:?}"))?;
        tracing::debug!(path = ?path, "opened document store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory document store")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("apply store schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("document store lock poisoned"))
    }

    /// Inserts a raw message. Returns `false` when the same `(channel_id, ts)`
    /// was already stored, which happens when Slack redelivers an event.
    pub fn insert_message(&self, message: &StoredMessage) -> Result<bool> {
        let doc = serde_json::to_string(message).context("serialize message")?;
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO messages (id, channel_id, ts, processed, created_at, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    message.channel_id,
                    message.ts.as_deref(),
                    message.processed,
                    message.created_at.timestamp_millis(),
                    doc,
                ],
            )
            .context("insert message")?;
        Ok(changed == 1)
    }

    /// Unprocessed messages created at or after `cutoff`, oldest first.
    pub fn unprocessed_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<StoredMessage>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT doc FROM messages
             WHERE processed = 0 AND created_at >= ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([cutoff.timestamp_millis()], |row| row.get::<_, String>(0))?;

        let mut messages = Vec::new();
        for row in rows {
            let doc = row?;
            let message = serde_json::from_str::<StoredMessage>(&doc)
                .context("decode stored message document")?;
            messages.push(message);
        }
        Ok(messages)
    }

    /// Stores `insight` and marks `message_ids` processed in a single
    /// transaction. Returns how many messages were marked.
    pub fn record_insight(&self, insight: &Insight, message_ids: &[Uuid]) -> Result<usize> {
        let doc = serde_json::to_string(insight).context("serialize insight")?;
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("begin insight transaction")?;

        tx.execute(
            "INSERT INTO insights (id, channel_id, created_at, doc) VALUES (?1, ?2, ?3, ?4)",
            params![
                insight.id.to_string(),
                insight.channel_id,
                insight.created_at.timestamp_millis(),
                doc,
            ],
        )
        .context("insert insight")?;

        let mut marked = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE messages
                 SET processed = 1, doc = json_set(doc, '$.processed', json('true'))
                 WHERE id = ?1 AND processed = 0",
            )?;
            for id in message_ids {
                marked += stmt
                    .execute([id.to_string()])
                    .with_context(|| format!("mark message {id} processed"))?;
            }
        }

        tx.commit().context("commit insight transaction")?;
        Ok(marked)
    }

    /// Most recent insights first, optionally restricted to one channel.
    pub fn recent_insights(&self, limit: usize, channel: Option<&str>) -> Result<Vec<Insight>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT doc FROM insights
             WHERE ?1 IS NULL OR channel_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![channel, limit], |row| row.get::<_, String>(0))?;

        let mut insights = Vec::new();
        for row in rows {
            let doc = row?;
            insights.push(
                serde_json::from_str::<Insight>(&doc).context("decode insight document")?,
            );
        }
        Ok(insights)
    }

    /// Number of messages still waiting for analysis, regardless of age.
    pub fn pending_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages WHERE processed = 0", [], |row| {
                row.get(0)
            })
            .context("count pending messages")?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
