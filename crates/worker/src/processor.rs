//! Notification job processor
//!
//! Claims due jobs from the Redis queue and turns them into emails. A job
//! that fails is handed back to the queue, which reschedules it with backoff
//! or parks it on the failed list once attempts run out. Recipients reached
//! before the failure are recorded on the job and skipped on the retry.

use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use supportly_api::email::{EmailError, EmailMessage, NotificationEmailService};
use supportly_shared::{
    queue::RetryOutcome, store, Job, JobKind, JobQueue, Session, SessionStatus, StoreError, User,
};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Email error: {0}")]
    Email(#[from] EmailError),
}

/// What a job amounted to when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Emails delivered to this many recipients
    Sent(usize),
    /// Nothing to do
    Skipped(&'static str),
}

/// Reminders only go out while the call can still happen as booked
pub fn should_send_reminder(status: SessionStatus) -> bool {
    matches!(status, SessionStatus::Pending | SessionStatus::Active)
}

/// Totals for one poll
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub sent: usize,
    pub skipped: usize,
    pub retried: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct JobProcessor {
    pool: PgPool,
    queue: JobQueue,
    email: NotificationEmailService,
    batch_size: isize,
}

impl JobProcessor {
    pub fn new(
        pool: PgPool,
        queue: JobQueue,
        email: NotificationEmailService,
        batch_size: isize,
    ) -> Self {
        Self {
            pool,
            queue,
            email,
            batch_size,
        }
    }

    /// Claim and run every job that is due now
    pub async fn process_due_jobs(&self) -> BatchReport {
        let mut report = BatchReport::default();

        let jobs = match self
            .queue
            .claim_due(OffsetDateTime::now_utc(), self.batch_size)
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Failed to claim due jobs");
                return report;
            }
        };

        if jobs.is_empty() {
            return report;
        }

        info!(count = jobs.len(), "Processing due jobs");

        for mut job in jobs {
            match self.run(&mut job).await {
                Ok(JobOutcome::Sent(recipients)) => {
                    report.sent += 1;
                    info!(
                        job_id = %job.id,
                        job_kind = job.kind.name(),
                        session_id = %job.kind.session_id(),
                        recipients = recipients,
                        "Job completed"
                    );
                }
                Ok(JobOutcome::Skipped(reason)) => {
                    report.skipped += 1;
                    debug!(
                        job_id = %job.id,
                        job_kind = job.kind.name(),
                        reason = reason,
                        "Job skipped"
                    );
                }
                Err(e) => {
                    let message = e.to_string();
                    match self.queue.retry_or_fail(job, &message).await {
                        Ok(RetryOutcome::Rescheduled { .. }) => report.retried += 1,
                        Ok(RetryOutcome::Failed { .. }) => report.failed += 1,
                        Err(queue_err) => {
                            report.failed += 1;
                            error!(
                                error = %queue_err,
                                job_error = %message,
                                "Failed to record job failure, job dropped"
                            );
                        }
                    }
                }
            }
        }

        report
    }

    /// Drop old records from the failed list
    pub async fn trim_failed(&self, keep: isize) {
        match self.queue.trim_failed(keep).await {
            Ok(()) => info!(keep = keep, "Trimmed failed job history"),
            Err(e) => warn!(error = %e, "Failed to trim failed job history"),
        }
    }

    async fn run(&self, job: &mut Job) -> Result<JobOutcome, ProcessError> {
        let session_id = job.kind.session_id();
        let Some(session) = store::fetch_session(&self.pool, session_id).await? else {
            warn!(job_id = %job.id, session_id = %session_id, "Session no longer exists");
            return Ok(JobOutcome::Skipped("session not found"));
        };

        match job.kind {
            JobKind::BookingConfirmation { .. } => {
                self.notify_participants(&session, &mut job.delivered, |s, u| {
                    self.email.booking_confirmation(s, u)
                })
                .await
            }
            JobKind::SessionReminder { .. } => {
                if !should_send_reminder(session.status) {
                    return Ok(JobOutcome::Skipped("session is no longer upcoming"));
                }
                self.notify_participants(&session, &mut job.delivered, |s, u| {
                    self.email.session_reminder(s, u)
                })
                .await
            }
            JobKind::CallSummary { .. } => {
                if session.video_call.is_none() {
                    return Ok(JobOutcome::Skipped("session has no call record"));
                }
                self.notify_participants(&session, &mut job.delivered, |s, u| {
                    self.email.call_summary(s, u)
                })
                .await
            }
        }
    }

    async fn notify_participants<F>(
        &self,
        session: &Session,
        delivered: &mut Vec<Uuid>,
        render: F,
    ) -> Result<JobOutcome, ProcessError>
    where
        F: Fn(&Session, &User) -> EmailMessage,
    {
        let recipients = self.load_recipients(session).await?;
        if recipients.is_empty() {
            return Ok(JobOutcome::Skipped("no recipients"));
        }

        let sent = deliver(&self.email, session, &recipients, delivered, render).await?;
        Ok(JobOutcome::Sent(sent))
    }

    async fn load_recipients(&self, session: &Session) -> Result<Vec<User>, ProcessError> {
        let mut users = Vec::with_capacity(2);
        for user_id in session.participant_ids() {
            match store::fetch_user(&self.pool, user_id).await? {
                Some(user) => users.push(user),
                None => warn!(session_id = %session.id, user_id = %user_id, "Recipient not found"),
            }
        }
        Ok(users)
    }
}

/// Send one rendered email to each recipient not yet in `delivered`,
/// adding every success to it. All pending recipients are attempted; the
/// first failure is returned so the job is retried for the rest.
async fn deliver<F>(
    email: &NotificationEmailService,
    session: &Session,
    recipients: &[User],
    delivered: &mut Vec<Uuid>,
    render: F,
) -> Result<usize, EmailError>
where
    F: Fn(&Session, &User) -> EmailMessage,
{
    let mut first_error = None;
    let mut sent = 0;

    for user in recipients {
        if delivered.contains(&user.id) {
            debug!(session_id = %session.id, user_id = %user.id, "Already notified, skipping");
            continue;
        }

        let message = render(session, user);
        match email.send(&user.email, &message).await {
            Ok(()) => {
                delivered.push(user.id);
                sent += 1;
            }
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    user_id = %user.id,
                    error = %e,
                    "Notification email failed"
                );
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(sent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use supportly_api::email::EmailConfig;
    use supportly_shared::Role;
    use time::macros::datetime;

    fn email_service(api_base: &str) -> NotificationEmailService {
        NotificationEmailService::new(EmailConfig {
            resend_api_key: "re_test".to_string(),
            email_from: "Supportly <noreply@example.com>".to_string(),
            app_name: "Supportly".to_string(),
            app_url: "https://app.example.com".to_string(),
            api_base: api_base.to_string(),
        })
    }

    fn user(email: &str, role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: "Sam".to_string(),
            role,
            team_id: None,
            created_at: datetime!(2025-01-01 00:00 UTC),
        }
    }

    fn session(customer: &User, agent: &User) -> Session {
        Session {
            id: Uuid::new_v4(),
            title: "Laptop will not boot".to_string(),
            description: None,
            customer_id: customer.id,
            agent_id: Some(agent.id),
            team_id: None,
            status: SessionStatus::Pending,
            scheduled_at: datetime!(2025-03-03 14:00 UTC),
            duration_minutes: 30,
            video_call: None,
            created_at: datetime!(2025-03-01 09:00 UTC),
            updated_at: datetime!(2025-03-01 09:00 UTC),
        }
    }

    fn to(address: &str) -> Matcher {
        Matcher::PartialJsonString(format!(r#"{{"to":["{address}"]}}"#))
    }

    #[tokio::test]
    async fn test_retry_only_emails_recipients_not_yet_reached() {
        let mut server = mockito::Server::new_async().await;
        let service = email_service(&server.url());
        let customer = user("casey@example.com", Role::Customer);
        let agent = user("alex@example.com", Role::SupportAgent);
        let session = session(&customer, &agent);
        let recipients = vec![customer.clone(), agent.clone()];

        let customer_mock = server
            .mock("POST", "/emails")
            .match_body(to(&customer.email))
            .with_status(200)
            .with_body(r#"{"id":"email_1"}"#)
            .expect(1)
            .create_async()
            .await;
        let agent_down = server
            .mock("POST", "/emails")
            .match_body(to(&agent.email))
            .with_status(500)
            .with_body("upstream error")
            .expect(1)
            .create_async()
            .await;

        let mut delivered = Vec::new();
        let first = deliver(&service, &session, &recipients, &mut delivered, |s, u| {
            service.booking_confirmation(s, u)
        })
        .await;
        assert!(matches!(first, Err(EmailError::Rejected { status: 500, .. })));
        assert_eq!(delivered, vec![customer.id]);
        agent_down.assert_async().await;
        agent_down.remove_async().await;

        let agent_up = server
            .mock("POST", "/emails")
            .match_body(to(&agent.email))
            .with_status(200)
            .with_body(r#"{"id":"email_2"}"#)
            .expect(1)
            .create_async()
            .await;

        let second = deliver(&service, &session, &recipients, &mut delivered, |s, u| {
            service.booking_confirmation(s, u)
        })
        .await;
        assert_eq!(second.unwrap(), 1);
        assert_eq!(delivered, vec![customer.id, agent.id]);

        // The customer was emailed exactly once across both attempts
        customer_mock.assert_async().await;
        agent_up.assert_async().await;
    }

    #[tokio::test]
    async fn test_nothing_sent_when_everyone_was_reached() {
        let server = mockito::Server::new_async().await;
        let service = email_service(&server.url());
        let customer = user("casey@example.com", Role::Customer);
        let agent = user("alex@example.com", Role::SupportAgent);
        let session = session(&customer, &agent);

        let mut delivered = vec![customer.id, agent.id];
        let sent = deliver(
            &service,
            &session,
            &[customer, agent],
            &mut delivered,
            |s, u| service.session_reminder(s, u),
        )
        .await
        .unwrap();
        assert_eq!(sent, 0);
    }

    #[test]
    fn test_reminder_only_for_upcoming_sessions() {
        assert!(should_send_reminder(SessionStatus::Pending));
        assert!(should_send_reminder(SessionStatus::Active));
        assert!(!should_send_reminder(SessionStatus::Escalated));
        assert!(!should_send_reminder(SessionStatus::Resolved));
        assert!(!should_send_reminder(SessionStatus::Closed));
    }

    #[test]
    fn test_process_error_messages() {
        let err = ProcessError::from(StoreError::NotFound("session"));
        assert_eq!(err.to_string(), "Store error: Not found: session");

        let err = ProcessError::from(EmailError::Rejected {
            status: 422,
            body: "invalid".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Email error: Email provider returned 422: invalid"
        );
    }

    #[test]
    fn test_batch_report_default_is_empty() {
        assert_eq!(
            BatchReport::default(),
            BatchReport {
                sent: 0,
                skipped: 0,
                retried: 0,
                failed: 0
            }
        );
    }
}
