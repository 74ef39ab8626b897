//! Email notifications for session events
//!
//! Sends transactional emails via the Resend API: booking confirmations,
//! "starts in 15 minutes" reminders and post-call summaries. The worker calls
//! these from queued jobs, so failures are returned rather than swallowed and
//! the queue decides whether to retry.

use supportly_shared::{Session, User};
use time::format_description::well_known::Rfc2822;

const RESEND_API_URL: &str = "https://api.resend.com";

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key
    pub resend_api_key: String,
    /// From address for emails
    pub email_from: String,
    /// App name for branding
    pub app_name: String,
    /// Base URL of the web app, used for links
    pub app_url: String,
    /// Resend API base URL
    pub api_base: String,
}

impl EmailConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            resend_api_key: std::env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Supportly <noreply@localhost>".to_string()),
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "Supportly".to_string()),
            app_url: std::env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            api_base: RESEND_API_URL.to_string(),
        }
    }

    /// Check if email sending is enabled
    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Email request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Email provider returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// A rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub html: String,
}

/// Session notification email service
#[derive(Clone)]
pub struct NotificationEmailService {
    config: EmailConfig,
    client: reqwest::Client,
}

impl NotificationEmailService {
    /// Create a new email service
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Check if email sending is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Send an email via Resend API
    pub async fn send(&self, to: &str, message: &EmailMessage) -> Result<(), EmailError> {
        if !self.config.is_enabled() {
            tracing::warn!(subject = %message.subject, "Email not configured, skipping");
            return Ok(());
        }

        let body = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": message.subject,
            "html": message.html
        });

        let resp = self
            .client
            .post(format!("{}/emails", self.config.api_base))
            .header("Authorization", format!("Bearer {}", self.config.resend_api_key))
            .json(&body)
            .send()
            .await?;

        if resp.status().is_success() {
            tracing::info!(to = %to, subject = %message.subject, "Notification email sent");
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(status = status, body = %body, "Failed to send notification email");
            Err(EmailError::Rejected { status, body })
        }
    }

    fn session_link(&self, session: &Session) -> String {
        format!("{}/sessions/{}", self.config.app_url, session.id)
    }

    fn layout(&self, heading: &str, body: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #4f46e5;">{heading}</h2>
    {body}
    <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
    <p style="color: #999; font-size: 12px;">{app_name}</p>
</body>
</html>"#,
            heading = heading,
            body = body,
            app_name = self.config.app_name,
        )
    }

    fn button(&self, href: &str, label: &str) -> String {
        format!(
            r#"<p><a href="{href}" style="display: inline-block; padding: 12px 24px; background-color: #4f46e5; color: white; text-decoration: none; border-radius: 6px; font-weight: bold;">{label}</a></p>"#
        )
    }

    /// Booking confirmation sent right after a session is booked
    pub fn booking_confirmation(&self, session: &Session, recipient: &User) -> EmailMessage {
        let body = format!(
            r#"<p>Hi {name},</p>
    <p>Your support session <strong>{title}</strong> is booked for <strong>{when}</strong> ({minutes} minutes).</p>
    {button}"#,
            name = escape_html(&recipient.name),
            title = escape_html(&session.title),
            when = format_when(session),
            minutes = session.duration_minutes,
            button = self.button(&self.session_link(session), "View Session"),
        );

        EmailMessage {
            subject: format!("Session booked: {}", session.title),
            html: self.layout("Your session is booked", &body),
        }
    }

    /// Reminder sent 15 minutes before the session starts
    pub fn session_reminder(&self, session: &Session, recipient: &User) -> EmailMessage {
        let body = format!(
            r#"<p>Hi {name},</p>
    <p>Your support session <strong>{title}</strong> starts in 15 minutes ({when}).</p>
    <div style="background-color: #eef2ff; border-left: 4px solid #4f46e5; padding: 16px; margin: 20px 0;">
        <p style="margin: 0;">Join from a browser with camera and microphone access.</p>
    </div>
    {button}"#,
            name = escape_html(&recipient.name),
            title = escape_html(&session.title),
            when = format_when(session),
            button = self.button(&self.session_link(session), "Join Call"),
        );

        EmailMessage {
            subject: format!("Starting in 15 minutes: {}", session.title),
            html: self.layout("Your session starts soon", &body),
        }
    }

    /// Post-call summary
    pub fn call_summary(&self, session: &Session, recipient: &User) -> EmailMessage {
        let summary = session
            .video_call
            .as_ref()
            .and_then(|c| c.summary.as_deref())
            .map(|s| format!("<p style=\"white-space: pre-wrap;\">{}</p>", escape_html(s)))
            .unwrap_or_else(|| "<p>No summary was generated for this call.</p>".to_string());

        let duration = session
            .video_call
            .as_ref()
            .and_then(|c| c.duration_seconds())
            .map(|s| format!("<p style=\"color: #666; font-size: 14px;\">Call length: {} min</p>", (s + 59) / 60))
            .unwrap_or_default();

        let body = format!(
            r#"<p>Hi {name},</p>
    <p>Your support session <strong>{title}</strong> has ended with status <strong>{status}</strong>.</p>
    <div style="background-color: #f9fafb; border-left: 4px solid #4f46e5; padding: 16px; margin: 20px 0;">
        {summary}
    </div>
    {duration}
    {button}"#,
            name = escape_html(&recipient.name),
            title = escape_html(&session.title),
            status = session.status,
            summary = summary,
            duration = duration,
            button = self.button(&self.session_link(session), "View Session"),
        );

        EmailMessage {
            subject: format!("Session summary: {}", session.title),
            html: self.layout("Call summary", &body),
        }
    }
}

fn format_when(session: &Session) -> String {
    session
        .scheduled_at
        .format(&Rfc2822)
        .unwrap_or_else(|_| session.scheduled_at.to_string())
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
