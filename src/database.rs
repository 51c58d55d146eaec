// ABOUTME: SQLite persistence gateway for conversations, messages, daily analyses, jobs, and metrics
// ABOUTME: Idempotent upserts, single-transaction ingest, and per-job result transactions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Database Management
//!
//! All persistence flows through this gateway. Transaction discipline:
//! ingest of one upload's raw data runs in a single transaction; each
//! job's result update is its own transaction, so one failed job cannot
//! roll back another's success. `upsert_conversation` is keyed on
//! `chat_id` and daily-analysis seeding on `(conversation_id, date)`, so
//! re-ingest conflicts return the existing rows.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::ingest::grouper::ChatGroup;
use crate::models::{
    Conversation, DailyAnalysis, Job, JobStatus, Metric, MessageDirection, ProcessedChat,
    StoredMessage,
};

/// Metric cache key for the system-level CSI
pub const METRIC_OVERALL_CSI: &str = "overall_csi_score";
/// Metric cache key for the mean effectiveness pillar
pub const METRIC_AVG_EFFECTIVENESS: &str = "avg_effectiveness_score";
/// Metric cache key for the mean effort pillar
pub const METRIC_AVG_EFFORT: &str = "avg_effort_score";
/// Metric cache key for the mean efficiency pillar
pub const METRIC_AVG_EFFICIENCY: &str = "avg_efficiency_score";
/// Metric cache key for the mean empathy pillar
pub const METRIC_AVG_EMPATHY: &str = "avg_empathy_score";
/// Metric cache key for the count of scored days
pub const METRIC_TOTAL_DAYS: &str = "total_days_analyzed";
/// Metric cache key for the count of ingested conversations
pub const METRIC_TOTAL_CONVERSATIONS: &str = "total_conversations";

/// A chat ingested by [`Database::ingest_upload`], with its seeded rows
#[derive(Debug, Clone)]
pub struct IngestedChat {
    /// Conversation row id
    pub conversation_id: i64,
    /// External chat identifier
    pub chat_id: String,
    /// Messages stored for this chat
    pub message_count: i64,
    /// Seeded daily-analysis rows, chronological
    pub days: Vec<SeededDay>,
}

/// A daily-analysis row seeded during ingest
#[derive(Debug, Clone, Copy)]
pub struct SeededDay {
    /// Daily-analysis row id
    pub daily_analysis_id: i64,
    /// UTC calendar date
    pub analysis_date: NaiveDate,
}

/// Column values written to a daily-analysis row when its job finishes
#[derive(Debug, Clone, Default)]
pub struct DailyUpdate {
    /// Target row
    pub daily_analysis_id: i64,
    /// Customer sentiment, 0-10
    pub sentiment_score: Option<f64>,
    /// Sentiment change, -5..+5
    pub sentiment_shift: Option<f64>,
    /// Resolution degree, 0-10
    pub resolution_achieved: Option<f64>,
    /// FCR likelihood, 0-10
    pub fcr_score: Option<f64>,
    /// Customer Effort Score, 1-7
    pub ces: Option<f64>,
    /// Seconds until the first agent reply
    pub first_response_time: Option<f64>,
    /// Mean response seconds
    pub avg_response_time: Option<f64>,
    /// Handling minutes
    pub total_handling_time: Option<f64>,
    /// Effectiveness pillar
    pub effectiveness_score: Option<f64>,
    /// Effort pillar
    pub effort_score: Option<f64>,
    /// Efficiency pillar
    pub efficiency_score: Option<f64>,
    /// Empathy pillar
    pub empathy_score: Option<f64>,
    /// Composite CSI, 0-100
    pub csi_score: Option<f64>,
    /// Failure marker (`analysis_failed` or `cancelled`)
    pub error: Option<String>,
}

/// Everything persisted when a job reaches a terminal state
#[derive(Debug, Clone)]
pub struct JobCompletion {
    /// Target job
    pub job_id: i64,
    /// Terminal status
    pub status: JobStatus,
    /// Structured per-item outcomes and/or error details
    pub result: serde_json::Value,
    /// Terminal-state time
    pub completed_at: DateTime<Utc>,
    /// Daily-analysis rows to update in the same transaction
    pub rows: Vec<DailyUpdate>,
    /// Topics to merge into conversations, keyed by conversation row id
    pub topic_updates: Vec<(i64, Vec<String>)>,
}

/// Database gateway over a SQLite connection pool
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or migration fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("invalid DATABASE_URL")?
            .create_if_missing(true)
            .foreign_keys(true);

        // In-memory SQLite lives inside one connection; a wider pool would
        // hand each worker its own empty database
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .context("failed to connect to in-memory database")?
        } else {
            SqlitePoolOptions::new()
                .connect_with(options)
                .await
                .context("failed to connect to database")?
        };

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Run database migrations (additive only)
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT UNIQUE NOT NULL,
                customer_name TEXT,
                total_messages INTEGER NOT NULL DEFAULT 0,
                customer_messages INTEGER NOT NULL DEFAULT 0,
                agent_messages INTEGER NOT NULL DEFAULT 0,
                first_message_time TEXT,
                last_message_time TEXT,
                common_topics TEXT, -- JSON array
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_conversations_chat_id ON conversations(chat_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT NOT NULL,
                conversation_id INTEGER NOT NULL,
                message_content TEXT NOT NULL,
                direction TEXT NOT NULL, -- 'to_company' or 'to_client'
                social_create_time TEXT NOT NULL,
                agent_info TEXT, -- JSON
                created_at TEXT NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES conversations (id) ON DELETE CASCADE
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation_time ON messages(conversation_id, social_create_time)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS daily_analyses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL,
                analysis_date TEXT NOT NULL, -- YYYY-MM-DD (UTC)
                sentiment_score REAL,
                sentiment_shift REAL,
                resolution_achieved REAL,
                fcr_score REAL,
                ces REAL,
                first_response_time REAL, -- seconds
                avg_response_time REAL,   -- seconds
                total_handling_time REAL, -- minutes
                effectiveness_score REAL,
                effort_score REAL,
                efficiency_score REAL,
                empathy_score REAL,
                csi_score REAL,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (conversation_id, analysis_date),
                FOREIGN KEY (conversation_id) REFERENCES conversations (id) ON DELETE CASCADE
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                upload_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                completed_at TEXT,
                result TEXT -- JSON
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_upload_id ON jobs(upload_id)")
            .execute(&self.pool)
            .await?;

        // Weak many-to-many link: neither side owns the other
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS job_daily_analyses (
                job_id INTEGER NOT NULL,
                daily_analysis_id INTEGER NOT NULL,
                PRIMARY KEY (job_id, daily_analysis_id),
                FOREIGN KEY (job_id) REFERENCES jobs (id) ON DELETE CASCADE,
                FOREIGN KEY (daily_analysis_id) REFERENCES daily_analyses (id) ON DELETE CASCADE
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS processed_chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT UNIQUE NOT NULL,
                processed_at TEXT NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                metric_name TEXT UNIQUE NOT NULL,
                metric_value REAL NOT NULL,
                metric_metadata TEXT, -- JSON
                calculated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        debug!("Database migrations applied");
        Ok(())
    }

    /// Whether a chat id completed a previous upload
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn is_chat_processed(&self, chat_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM processed_chats WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Ingest one upload's raw data in a single transaction.
    ///
    /// For each chat: upserts the conversation (keyed on `chat_id`),
    /// replaces its message rows, and seeds one daily-analysis row per
    /// calendar day (keyed on `(conversation_id, date)`; conflicts return
    /// the existing row).
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; the whole upload rolls back.
    pub async fn ingest_upload(&self, groups: &[ChatGroup]) -> Result<Vec<IngestedChat>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        let mut ingested = Vec::with_capacity(groups.len());

        for group in groups {
            let conversation_id: i64 = sqlx::query(
                r"
                INSERT INTO conversations (
                    chat_id, total_messages, customer_messages, agent_messages,
                    first_message_time, last_message_time, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (chat_id) DO UPDATE SET
                    total_messages = excluded.total_messages,
                    customer_messages = excluded.customer_messages,
                    agent_messages = excluded.agent_messages,
                    first_message_time = excluded.first_message_time,
                    last_message_time = excluded.last_message_time,
                    updated_at = excluded.updated_at
                RETURNING id
                ",
            )
            .bind(&group.chat_id)
            .bind(group.total_messages)
            .bind(group.customer_messages)
            .bind(group.agent_messages)
            .bind(group.first_message_time.to_rfc3339())
            .bind(group.last_message_time.to_rfc3339())
            .bind(&now)
            .bind(&now)
            .fetch_one(&mut *tx)
            .await?
            .get(0);

            // A re-ingest (force reprocess) replaces the chat's messages
            // rather than appending duplicates
            sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
                .bind(conversation_id)
                .execute(&mut *tx)
                .await?;

            let mut message_count: i64 = 0;
            for day in &group.days {
                for message in &day.messages {
                    let agent_info = message
                        .agent_info
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?;
                    sqlx::query(
                        r"
                        INSERT INTO messages (
                            chat_id, conversation_id, message_content, direction,
                            social_create_time, agent_info, created_at
                        )
                        VALUES (?, ?, ?, ?, ?, ?, ?)
                        ",
                    )
                    .bind(&group.chat_id)
                    .bind(conversation_id)
                    .bind(&message.message_content)
                    .bind(message.direction.as_str())
                    .bind(message.social_create_time.to_rfc3339())
                    .bind(agent_info)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;
                    message_count += 1;
                }
            }

            let mut days = Vec::with_capacity(group.days.len());
            for day in &group.days {
                let daily_analysis_id: i64 = sqlx::query(
                    r"
                    INSERT INTO daily_analyses (conversation_id, analysis_date, created_at, updated_at)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT (conversation_id, analysis_date) DO UPDATE SET
                        updated_at = excluded.updated_at
                    RETURNING id
                    ",
                )
                .bind(conversation_id)
                .bind(day.analysis_date.to_string())
                .bind(&now)
                .bind(&now)
                .fetch_one(&mut *tx)
                .await?
                .get(0);

                days.push(SeededDay {
                    daily_analysis_id,
                    analysis_date: day.analysis_date,
                });
            }

            ingested.push(IngestedChat {
                conversation_id,
                chat_id: group.chat_id.clone(),
                message_count,
                days,
            });
        }

        tx.commit().await?;
        info!(chats = ingested.len(), "Upload raw data ingested");
        Ok(ingested)
    }

    /// Create a job over a set of daily-analysis rows
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_job(&self, upload_id: &str, daily_ids: &[i64]) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let job_id: i64 = sqlx::query(
            "INSERT INTO jobs (upload_id, status, created_at) VALUES (?, 'pending', ?) RETURNING id",
        )
        .bind(upload_id)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&mut *tx)
        .await?
        .get(0);

        for daily_id in daily_ids {
            sqlx::query("INSERT INTO job_daily_analyses (job_id, daily_analysis_id) VALUES (?, ?)")
                .bind(job_id)
                .bind(daily_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(job_id)
    }

    /// Transition a job to `in_progress`
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_job_in_progress(&self, job_id: i64) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'in_progress' WHERE id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist a job's terminal state, its daily-analysis updates, and its
    /// conversation topic merges in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; the whole job result rolls
    /// back, leaving peer jobs untouched.
    pub async fn complete_job(&self, completion: &JobCompletion) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        for row in &completion.rows {
            sqlx::query(
                r"
                UPDATE daily_analyses SET
                    sentiment_score = ?,
                    sentiment_shift = ?,
                    resolution_achieved = ?,
                    fcr_score = ?,
                    ces = ?,
                    first_response_time = ?,
                    avg_response_time = ?,
                    total_handling_time = ?,
                    effectiveness_score = ?,
                    effort_score = ?,
                    efficiency_score = ?,
                    empathy_score = ?,
                    csi_score = ?,
                    error = ?,
                    updated_at = ?
                WHERE id = ?
                ",
            )
            .bind(row.sentiment_score)
            .bind(row.sentiment_shift)
            .bind(row.resolution_achieved)
            .bind(row.fcr_score)
            .bind(row.ces)
            .bind(row.first_response_time)
            .bind(row.avg_response_time)
            .bind(row.total_handling_time)
            .bind(row.effectiveness_score)
            .bind(row.effort_score)
            .bind(row.efficiency_score)
            .bind(row.empathy_score)
            .bind(row.csi_score)
            .bind(row.error.as_deref())
            .bind(&now)
            .bind(row.daily_analysis_id)
            .execute(&mut *tx)
            .await?;
        }

        for (conversation_id, topics) in &completion.topic_updates {
            if topics.is_empty() {
                continue;
            }
            let current: Option<String> =
                sqlx::query("SELECT common_topics FROM conversations WHERE id = ?")
                    .bind(conversation_id)
                    .fetch_one(&mut *tx)
                    .await?
                    .get(0);

            let mut merged: Vec<String> = current
                .as_deref()
                .and_then(|json| serde_json::from_str(json).ok())
                .unwrap_or_default();
            for topic in topics {
                if !merged.iter().any(|t| t == topic) {
                    merged.push(topic.clone());
                }
            }

            sqlx::query("UPDATE conversations SET common_topics = ?, updated_at = ? WHERE id = ?")
                .bind(serde_json::to_string(&merged)?)
                .bind(&now)
                .bind(conversation_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE jobs SET status = ?, result = ?, completed_at = ? WHERE id = ?")
            .bind(completion.status.as_str())
            .bind(serde_json::to_string(&completion.result)?)
            .bind(completion.completed_at.to_rfc3339())
            .bind(completion.job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Record chat ids as processed (idempotent; updates the timestamp and
    /// count on re-processing)
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn mark_processed(&self, chats: &[(String, i64)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        for (chat_id, message_count) in chats {
            sqlx::query(
                r"
                INSERT INTO processed_chats (chat_id, processed_at, message_count)
                VALUES (?, ?, ?)
                ON CONFLICT (chat_id) DO UPDATE SET
                    processed_at = excluded.processed_at,
                    message_count = excluded.message_count
                ",
            )
            .bind(chat_id)
            .bind(&now)
            .bind(message_count)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Rewrite the metric cache wholesale
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub async fn replace_metrics(&self, snapshot: &[Metric]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM metrics").execute(&mut *tx).await?;

        for metric in snapshot {
            let metadata = metric
                .metric_metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            sqlx::query(
                "INSERT INTO metrics (metric_name, metric_value, metric_metadata, calculated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&metric.metric_name)
            .bind(metric.metric_value)
            .bind(metadata)
            .bind(metric.calculated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(metrics = snapshot.len(), "Metric cache rewritten");
        Ok(())
    }

    /// Compute the system-level aggregate snapshot from daily analyses.
    ///
    /// The system-level CSI averages across all scored daily-analysis rows
    /// (each day is one sample, not each conversation).
    ///
    /// # Errors
    ///
    /// Returns an error if the aggregate query fails.
    pub async fn compute_metric_snapshot(&self) -> Result<Vec<Metric>> {
        let row = sqlx::query(
            r"
            SELECT
                AVG(csi_score) AS overall_csi,
                AVG(effectiveness_score) AS avg_effectiveness,
                AVG(effort_score) AS avg_effort,
                AVG(efficiency_score) AS avg_efficiency,
                AVG(empathy_score) AS avg_empathy,
                COUNT(csi_score) AS total_days
            FROM daily_analyses
            ",
        )
        .fetch_one(&self.pool)
        .await?;

        let total_conversations: i64 = sqlx::query("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool)
            .await?
            .get(0);

        let calculated_at = Utc::now();
        let metric = |name: &str, value: f64| Metric {
            metric_name: name.to_owned(),
            metric_value: value,
            metric_metadata: None,
            calculated_at,
        };

        Ok(vec![
            metric(METRIC_OVERALL_CSI, row.get::<Option<f64>, _>(0).unwrap_or(0.0)),
            metric(METRIC_AVG_EFFECTIVENESS, row.get::<Option<f64>, _>(1).unwrap_or(0.0)),
            metric(METRIC_AVG_EFFORT, row.get::<Option<f64>, _>(2).unwrap_or(0.0)),
            metric(METRIC_AVG_EFFICIENCY, row.get::<Option<f64>, _>(3).unwrap_or(0.0)),
            metric(METRIC_AVG_EMPATHY, row.get::<Option<f64>, _>(4).unwrap_or(0.0)),
            metric(METRIC_TOTAL_DAYS, row.get::<i64, _>(5) as f64),
            metric(METRIC_TOTAL_CONVERSATIONS, total_conversations as f64),
        ])
    }

    /// Read the cached metric snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_metrics(&self) -> Result<Vec<Metric>> {
        let rows = sqlx::query(
            "SELECT metric_name, metric_value, metric_metadata, calculated_at FROM metrics ORDER BY metric_name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let metadata: Option<String> = row.get(2);
                Ok(Metric {
                    metric_name: row.get(0),
                    metric_value: row.get(1),
                    metric_metadata: metadata
                        .as_deref()
                        .map(serde_json::from_str)
                        .transpose()?,
                    calculated_at: parse_timestamp(&row.get::<String, _>(3))?,
                })
            })
            .collect()
    }

    /// Mean CSI over one conversation's scored days
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn conversation_csi(&self, conversation_id: i64) -> Result<Option<f64>> {
        let row = sqlx::query("SELECT AVG(csi_score) FROM daily_analyses WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }

    /// Fetch a conversation by chat id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_conversation(&self, chat_id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            r"
            SELECT id, chat_id, customer_name, total_messages, customer_messages,
                   agent_messages, first_message_time, last_message_time,
                   common_topics, created_at, updated_at
            FROM conversations WHERE chat_id = ?
            ",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let topics: Option<String> = row.get(8);
            Ok(Conversation {
                id: row.get(0),
                chat_id: row.get(1),
                customer_name: row.get(2),
                total_messages: row.get(3),
                customer_messages: row.get(4),
                agent_messages: row.get(5),
                first_message_time: parse_optional_timestamp(row.get(6))?,
                last_message_time: parse_optional_timestamp(row.get(7))?,
                common_topics: topics
                    .as_deref()
                    .and_then(|json| serde_json::from_str(json).ok())
                    .unwrap_or_default(),
                created_at: parse_timestamp(&row.get::<String, _>(9))?,
                updated_at: parse_timestamp(&row.get::<String, _>(10))?,
            })
        })
        .transpose()
    }

    /// Fetch a conversation's messages in timestamp order
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_messages(&self, conversation_id: i64) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            r"
            SELECT id, chat_id, conversation_id, message_content, direction,
                   social_create_time, agent_info
            FROM messages WHERE conversation_id = ?
            ORDER BY social_create_time, id
            ",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let direction: String = row.get(4);
                let agent_info: Option<String> = row.get(6);
                Ok(StoredMessage {
                    id: row.get(0),
                    chat_id: row.get(1),
                    conversation_id: row.get(2),
                    message_content: row.get(3),
                    direction: MessageDirection::parse(&direction)
                        .context("unknown direction in database")?,
                    social_create_time: parse_timestamp(&row.get::<String, _>(5))?,
                    agent_info: agent_info
                        .as_deref()
                        .map(serde_json::from_str)
                        .transpose()?,
                })
            })
            .collect()
    }

    /// Fetch a conversation's daily analyses, chronological
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_daily_analyses(&self, conversation_id: i64) -> Result<Vec<DailyAnalysis>> {
        let rows = sqlx::query(
            r"
            SELECT id, conversation_id, analysis_date, sentiment_score, sentiment_shift,
                   resolution_achieved, fcr_score, ces, first_response_time,
                   avg_response_time, total_handling_time, effectiveness_score,
                   effort_score, efficiency_score, empathy_score, csi_score, error
            FROM daily_analyses WHERE conversation_id = ?
            ORDER BY analysis_date
            ",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| daily_from_row(&row)).collect()
    }

    /// Fetch one job
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_job(&self, job_id: i64) -> Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT id, upload_id, status, created_at, completed_at, result FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| job_from_row(&row)).transpose()
    }

    /// Fetch an upload's jobs in creation (dispatch) order
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_jobs(&self, upload_id: &str) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            "SELECT id, upload_id, status, created_at, completed_at, result FROM jobs WHERE upload_id = ? ORDER BY id",
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    /// Count the daily-analysis rows linked to a job
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn job_unit_count(&self, job_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM job_daily_analyses WHERE job_id = ?")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }

    /// Fetch the processed-chat marker for a chat id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_processed_chat(&self, chat_id: &str) -> Result<Option<ProcessedChat>> {
        let row = sqlx::query(
            "SELECT chat_id, processed_at, message_count FROM processed_chats WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(ProcessedChat {
                chat_id: row.get(0),
                processed_at: parse_timestamp(&row.get::<String, _>(1))?,
                message_count: row.get(2),
            })
        })
        .transpose()
    }

    /// Delete a conversation; messages and daily analyses cascade
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_conversation(&self, chat_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM conversations WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Row counts used by invariant checks: (conversations, messages,
    /// daily analyses, jobs)
    ///
    /// # Errors
    ///
    /// Returns an error if any count query fails.
    pub async fn table_counts(&self) -> Result<(i64, i64, i64, i64)> {
        let conversations: i64 = sqlx::query("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool)
            .await?
            .get(0);
        let messages: i64 = sqlx::query("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?
            .get(0);
        let daily: i64 = sqlx::query("SELECT COUNT(*) FROM daily_analyses")
            .fetch_one(&self.pool)
            .await?
            .get(0);
        let jobs: i64 = sqlx::query("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?
            .get(0);
        Ok((conversations, messages, daily, jobs))
    }
}

/// Build a `DailyAnalysis` from a full row
fn daily_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DailyAnalysis> {
    let date: String = row.get(2);
    Ok(DailyAnalysis {
        id: row.get(0),
        conversation_id: row.get(1),
        analysis_date: date.parse().context("invalid analysis_date in database")?,
        sentiment_score: row.get(3),
        sentiment_shift: row.get(4),
        resolution_achieved: row.get(5),
        fcr_score: row.get(6),
        ces: row.get(7),
        first_response_time: row.get(8),
        avg_response_time: row.get(9),
        total_handling_time: row.get(10),
        effectiveness_score: row.get(11),
        effort_score: row.get(12),
        efficiency_score: row.get(13),
        empathy_score: row.get(14),
        csi_score: row.get(15),
        error: row.get(16),
    })
}

/// Build a `Job` from a full row
fn job_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Job> {
    let status: String = row.get(2);
    let completed_at: Option<String> = row.get(4);
    let result: Option<String> = row.get(5);
    Ok(Job {
        id: row.get(0),
        upload_id: row.get(1),
        status: JobStatus::parse(&status).context("unknown job status in database")?,
        created_at: parse_timestamp(&row.get::<String, _>(3))?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        result: result.as_deref().map(serde_json::from_str).transpose()?,
    })
}

/// Parse a stored RFC 3339 timestamp
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp in database: {s}"))?
        .with_timezone(&Utc))
}

/// Parse an optional stored timestamp
fn parse_optional_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_timestamp).transpose()
}
