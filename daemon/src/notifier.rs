use anyhow::Result;
use common::Severity;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::watcher::WatchEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationChannel {
    Email {
        to: String,
        #[serde(default)]
        subject: Option<String>,
    },
    Webhook {
        url: String,
        #[serde(default)]
        headers: Option<HashMap<String, String>>,
    },
    Discord {
        webhook_url: String,
    },
    Slack {
        webhook_url: String,
    },
}

pub struct Notifier {
    channels: Vec<NotificationChannel>,
    http: reqwest::Client,
}

impl Notifier {
    pub fn new(channels: Vec<NotificationChannel>) -> Self {
        Self { channels, http: reqwest::Client::new() }
    }

    /// Deliver `event` on every configured channel. Delivery failures are logged only.
    pub async fn notify(&self, event: &WatchEvent) {
        for channel in &self.channels {
            if let Err(e) = self.send(event, channel).await {
                log::error!(
                    "Failed to send {} notification via {:?}: {}",
                    event.kind(),
                    channel,
                    e
                );
            }
        }
    }

    async fn send(&self, event: &WatchEvent, channel: &NotificationChannel) -> Result<()> {
        match channel {
            NotificationChannel::Email { to, subject } => {
                self.send_email(event, to, subject.as_deref()).await
            }
            NotificationChannel::Webhook { url, headers } => {
                let mut request = self.http.post(url);
                for (key, value) in headers.iter().flatten() {
                    request = request.header(key, value);
                }
                self.deliver("Webhook", request.json(&webhook_payload(event))).await
            }
            NotificationChannel::Discord { webhook_url } => {
                let request = self.http.post(webhook_url).json(&discord_payload(event));
                self.deliver("Discord", request).await
            }
            NotificationChannel::Slack { webhook_url } => {
                let request = self.http.post(webhook_url).json(&slack_payload(event));
                self.deliver("Slack", request).await
            }
        }
    }

    async fn deliver(&self, channel: &str, request: reqwest::RequestBuilder) -> Result<()> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("{} endpoint answered {}", channel, status);
        }
        log::debug!("{} notification delivered", channel);
        Ok(())
    }

    async fn send_email(&self, event: &WatchEvent, to: &str, subject: Option<&str>) -> Result<()> {
        use lettre::message::header::ContentType;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{Message, SmtpTransport, Transport};

        let (Ok(server), Ok(username), Ok(password)) = (
            std::env::var("ASSISTDESK_SMTP_SERVER"),
            std::env::var("ASSISTDESK_SMTP_USERNAME"),
            std::env::var("ASSISTDESK_SMTP_PASSWORD"),
        ) else {
            log::warn!("SMTP not configured, skipping email to {}", to);
            return Ok(());
        };

        let from = std::env::var("ASSISTDESK_EMAIL_FROM")
            .unwrap_or_else(|_| "assistdesk@localhost".to_string());
        let subject = subject
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("AssistDesk: {}", event.title()));
        let email = Message::builder()
            .from(from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email_body(event))?;

        let mailer = SmtpTransport::relay(&server)?
            .credentials(Credentials::new(username, password))
            .build();
        // The SMTP transport blocks
        tokio::task::spawn_blocking(move || mailer.send(&email)).await??;
        log::info!("Email notification sent to {} for {}", to, event.kind());
        Ok(())
    }
}

fn email_body(event: &WatchEvent) -> String {
    let mut body = format!("Event: {}\n{}\n\n{}\n", event.kind(), event.title(), event.message());
    if let Some(id) = event.job_id() {
        body.push_str(&format!("Job: {}\n", id));
    }
    body.push_str(&format!("Time: {}\n", chrono::Utc::now().to_rfc3339()));
    body
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Success => "success",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

pub fn webhook_payload(event: &WatchEvent) -> Value {
    json!({
        "event": event.kind(),
        "severity": severity_label(event.severity()),
        "title": event.title(),
        "message": event.message(),
        "job_id": event.job_id(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

pub fn discord_payload(event: &WatchEvent) -> Value {
    let color = match event.severity() {
        Severity::Success => 0x00ff00,
        Severity::Error => 0xff0000,
        Severity::Warning => 0xffa500,
        Severity::Info => 0x0000ff,
    };
    let mut fields = vec![json!({"name": "Event", "value": event.kind(), "inline": true})];
    if let Some(id) = event.job_id() {
        fields.push(json!({"name": "Job ID", "value": id, "inline": true}));
    }
    json!({
        "embeds": [{
            "title": event.title(),
            "description": event.message(),
            "color": color,
            "fields": fields,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }]
    })
}

pub fn slack_payload(event: &WatchEvent) -> Value {
    let emoji = match event.kind() {
        "job_completed" => ":white_check_mark:",
        "job_failed" => ":x:",
        "pending_increased" => ":inbox_tray:",
        "health_degraded" => ":warning:",
        "health_recovered" => ":green_heart:",
        _ => ":grey_question:",
    };
    json!({
        "text": format!("{} {}", emoji, event.title()),
        "blocks": [{
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*{}*\n{}", event.title(), event.message()),
            }
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{JobStatus, TrainingJob};
    use mockito::{Matcher, Server};

    fn failed_job() -> WatchEvent {
        let mut job = TrainingJob::queued("j7", "Manuals");
        job.status = JobStatus::Failed;
        job.error = Some("Out of memory".into());
        WatchEvent::JobFinished(job)
    }

    #[test]
    fn test_payloads() {
        let event = failed_job();

        let hook = webhook_payload(&event);
        assert_eq!(hook["event"], "job_failed");
        assert_eq!(hook["severity"], "error");
        assert_eq!(hook["job_id"], "j7");

        let discord = discord_payload(&event);
        assert_eq!(discord["embeds"][0]["color"], 0xff0000);
        assert_eq!(discord["embeds"][0]["fields"][1]["value"], "j7");

        let slack = slack_payload(&WatchEvent::HealthRecovered);
        assert_eq!(slack["text"], ":green_heart: AI service recovered");

        let pending = webhook_payload(&WatchEvent::PendingIncreased { previous: 1, current: 2 });
        assert!(pending["job_id"].is_null());
    }

    #[test]
    fn test_email_body() {
        let body = email_body(&failed_job());
        assert!(body.starts_with("Event: job_failed\nTraining Manuals failed\n"));
        assert!(body.contains("Job j7 failed: Out of memory"));
        assert!(body.contains("Job: j7\n"));
    }

    #[test]
    fn test_channel_config_shape() {
        let channel: NotificationChannel = serde_json::from_value(json!({
            "type": "discord",
            "webhook_url": "https://discord.test/x"
        }))
        .unwrap();
        assert!(matches!(channel, NotificationChannel::Discord { .. }));
    }

    #[tokio::test]
    async fn test_webhook_delivery_with_headers() {
        let mut server = Server::new_async().await;
        let hook = server
            .mock("POST", "/hook")
            .match_header("authorization", "Bearer hook-secret")
            .match_body(Matcher::PartialJson(json!({"event": "health_recovered"})))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let headers =
            HashMap::from([("Authorization".to_string(), "Bearer hook-secret".to_string())]);
        let notifier = Notifier::new(vec![NotificationChannel::Webhook {
            url: format!("{}/hook", server.url()),
            headers: Some(headers),
        }]);
        notifier.notify(&WatchEvent::HealthRecovered).await;
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_delivery_is_an_error() {
        let mut server = Server::new_async().await;
        let _slack = server.mock("POST", "/slack").with_status(500).create_async().await;

        let notifier = Notifier::new(Vec::new());
        let channel = NotificationChannel::Slack { webhook_url: format!("{}/slack", server.url()) };
        assert!(notifier.send(&WatchEvent::HealthRecovered, &channel).await.is_err());
    }
}
