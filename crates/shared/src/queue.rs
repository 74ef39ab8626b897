//! Redis-backed delayed job queue
//!
//! Jobs live in a sorted set scored by their run-at time (unix millis).
//! Workers claim due jobs with `ZRANGEBYSCORE` + `ZREM`; only the worker whose
//! `ZREM` actually removed the member owns the job, so several workers can
//! poll the same queue. Failed jobs are retried with exponential backoff and
//! parked on a failure list once their attempts run out.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

const DELAYED_KEY: &str = "supportly:jobs:delayed";
const FAILED_KEY: &str = "supportly:jobs:failed";

/// Attempts before a job is considered permanently failed
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between attempts
pub const BACKOFF_BASE: Duration = Duration::from_secs(2);

/// How long before a session starts its reminder is sent
pub const REMINDER_LEAD: time::Duration = time::Duration::minutes(15);

/// Failure records kept on the failed list
pub const FAILED_HISTORY: isize = 1000;

/// Work items the worker knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Tell customer and agent a session has been booked
    BookingConfirmation { session_id: Uuid },
    /// "Starts in 15 minutes" email to both parties
    SessionReminder { session_id: Uuid },
    /// Post-call summary email to both parties
    CallSummary { session_id: Uuid },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BookingConfirmation { .. } => "booking_confirmation",
            Self::SessionReminder { .. } => "session_reminder",
            Self::CallSummary { .. } => "call_summary",
        }
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            Self::BookingConfirmation { session_id }
            | Self::SessionReminder { session_id }
            | Self::CallSummary { session_id } => *session_id,
        }
    }
}

/// A queued job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: JobKind,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub enqueued_at: OffsetDateTime,
    /// Recipients already notified by an earlier attempt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delivered: Vec<Uuid>,
}

impl Job {
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            enqueued_at: OffsetDateTime::now_utc(),
            delivered: Vec::new(),
        }
    }

    /// Whether another attempt is allowed after `self.attempts` failures
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Record pushed onto the failed list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
    pub job: Job,
    pub error: String,
    #[serde(with = "time::serde::rfc3339")]
    pub failed_at: OffsetDateTime,
}

/// Outcome of [`JobQueue::retry_or_fail`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Rescheduled { attempt: u32, delay: Duration },
    Failed { attempts: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Job serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Delay before retry number `attempt` (1-based): base · 2^(attempt-1)
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    BACKOFF_BASE * 2u32.pow(exponent)
}

/// When to send the reminder for a session starting at `scheduled_at`.
///
/// Returns `None` if the reminder moment has already passed.
pub fn reminder_run_at(scheduled_at: OffsetDateTime, now: OffsetDateTime) -> Option<OffsetDateTime> {
    let run_at = scheduled_at - REMINDER_LEAD;
    (run_at > now).then_some(run_at)
}

fn score(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Handle to the job queue
#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
}

impl JobQueue {
    /// Connect to Redis and build a queue handle
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    /// Schedule a job to run at `run_at`
    pub async fn enqueue(&self, kind: JobKind, run_at: OffsetDateTime) -> Result<Job, QueueError> {
        let job = Job::new(kind);
        self.schedule(&job, run_at).await?;

        tracing::info!(
            job_id = %job.id,
            job_kind = kind.name(),
            session_id = %kind.session_id(),
            run_at = %run_at,
            "Job enqueued"
        );

        Ok(job)
    }

    /// Schedule a job to run as soon as a worker picks it up
    pub async fn enqueue_now(&self, kind: JobKind) -> Result<Job, QueueError> {
        self.enqueue(kind, OffsetDateTime::now_utc()).await
    }

    async fn schedule(&self, job: &Job, run_at: OffsetDateTime) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(DELAYED_KEY, payload, score(run_at)).await?;
        Ok(())
    }

    /// Claim up to `limit` jobs whose run-at time is not after `now`
    pub async fn claim_due(&self, now: OffsetDateTime, limit: isize) -> Result<Vec<Job>, QueueError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .zrangebyscore_limit(DELAYED_KEY, "-inf", score(now), 0, limit)
            .await?;

        let mut claimed = Vec::with_capacity(members.len());
        for member in members {
            let removed: i64 = conn.zrem(DELAYED_KEY, &member).await?;
            if removed != 1 {
                // Another worker got there first
                continue;
            }

            match serde_json::from_str::<Job>(&member) {
                Ok(job) => claimed.push(job),
                Err(e) => {
                    tracing::error!(error = %e, payload = %member, "Dropping undecodable job");
                }
            }
        }

        Ok(claimed)
    }

    /// Record a failed attempt: reschedule with backoff while attempts remain,
    /// otherwise park the job on the failed list.
    pub async fn retry_or_fail(&self, mut job: Job, error: &str) -> Result<RetryOutcome, QueueError> {
        job.attempts += 1;

        if job.can_retry() {
            let delay = backoff_delay(job.attempts);
            let run_at = OffsetDateTime::now_utc() + delay;
            self.schedule(&job, run_at).await?;

            tracing::warn!(
                job_id = %job.id,
                job_kind = job.kind.name(),
                attempts = job.attempts,
                max_attempts = job.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Job failed, will retry"
            );

            return Ok(RetryOutcome::Rescheduled {
                attempt: job.attempts,
                delay,
            });
        }

        let attempts = job.attempts;
        tracing::error!(
            job_id = %job.id,
            job_kind = job.kind.name(),
            attempts = attempts,
            error = %error,
            "Job permanently failed after max retries"
        );

        let record = FailedJob {
            job,
            error: error.to_string(),
            failed_at: OffsetDateTime::now_utc(),
        };
        let payload = serde_json::to_string(&record)?;

        let mut conn = self.conn.clone();
        let _: () = conn.lpush(FAILED_KEY, payload).await?;
        let _: () = conn.ltrim(FAILED_KEY, 0, FAILED_HISTORY - 1).await?;

        Ok(RetryOutcome::Failed { attempts })
    }

    /// Number of jobs waiting (due or not)
    pub async fn pending_count(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(DELAYED_KEY).await?)
    }

    /// Trim the failed list to the most recent `keep` records
    pub async fn trim_failed(&self, keep: isize) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = conn.ltrim(FAILED_KEY, 0, keep.max(1) - 1).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        // Attempt 0 is treated like the first retry
        assert_eq!(backoff_delay(0), Duration::from_secs(2));
    }

    #[test]
    fn test_third_failure_is_final() {
        let mut job = Job::new(JobKind::CallSummary {
            session_id: Uuid::new_v4(),
        });
        job.attempts = 1;
        assert!(job.can_retry());
        job.attempts = 2;
        assert!(job.can_retry());
        job.attempts = 3;
        assert!(!job.can_retry());
    }

    #[test]
    fn test_reminder_fifteen_minutes_before() {
        let now = datetime!(2025-03-03 10:00 UTC);
        let start = datetime!(2025-03-03 11:00 UTC);
        assert_eq!(reminder_run_at(start, now), Some(datetime!(2025-03-03 10:45 UTC)));
    }

    #[test]
    fn test_no_reminder_in_the_past() {
        let now = datetime!(2025-03-03 10:50 UTC);
        let start = datetime!(2025-03-03 11:00 UTC);
        assert_eq!(reminder_run_at(start, now), None);
    }

    #[test]
    fn test_job_wire_format() {
        let session_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let job = Job::new(JobKind::SessionReminder { session_id });

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["kind"], "session_reminder");
        assert_eq!(json["session_id"], "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(json["max_attempts"], 3);
        assert!(json.get("delivered").is_none());

        let decoded: Job = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.id, job.id);
        assert_eq!(decoded.kind, job.kind);
        assert_eq!(decoded.attempts, 0);
    }

    #[test]
    fn test_delivered_recipients_survive_reschedule() {
        let customer = Uuid::new_v4();
        let mut job = Job::new(JobKind::BookingConfirmation {
            session_id: Uuid::new_v4(),
        });
        job.delivered.push(customer);

        let payload = serde_json::to_string(&job).unwrap();
        let decoded: Job = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded.delivered, vec![customer]);
    }

    #[test]
    fn test_score_is_millis() {
        assert_eq!(score(datetime!(1970-01-01 00:00:01.5 UTC)), 1500);
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_claim_is_exclusive() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let queue = JobQueue::connect(&url).await.unwrap();
        let session_id = Uuid::new_v4();

        queue
            .enqueue_now(JobKind::BookingConfirmation { session_id })
            .await
            .unwrap();

        let now = OffsetDateTime::now_utc() + time::Duration::seconds(1);
        let first = queue.claim_due(now, 100).await.unwrap();
        let second = queue.claim_due(now, 100).await.unwrap();

        assert!(first.iter().any(|j| j.kind.session_id() == session_id));
        assert!(!second.iter().any(|j| j.kind.session_id() == session_id));
    }
}
