use async_trait::async_trait;
use logger_redacted::PhiRedactor;
use prescription_lifecycle::gateways::{NotificationDispatcher, NotificationEvent, Recipient};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmailConfig;
use crate::error::{EmailError, EmailResult};
use crate::templates::NotificationTemplates;

/// Payload key carrying a base64 PDF to attach.
const LETTER_KEY: &str = "letter_pdf_base64";

/// Addressing for one outbound message. Patients and clinicians are
/// addressed by profile id and resolved by the email provider; the care
/// team by its shared inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Destination {
    Profile { id: String },
    Address { email: String },
}

impl Destination {
    fn for_recipient(recipient: &Recipient, care_team_address: &str) -> Self {
        match recipient {
            Recipient::Patient(id) | Recipient::Clinician(id) => Destination::Profile { id: id.to_string() },
            Recipient::CareTeam => Destination::Address {
                email: care_team_address.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: Destination,
    subject: String,
    body: String,
    message_type: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attachments: BTreeMap<String, String>,
    message_data: &'a Value,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    delivery_id: String,
}

/// Sends lifecycle notifications through a transactional email API.
///
/// Delivery is fire-and-forget: failures are logged with the recipient
/// address redacted and never reach the caller.
pub struct EmailNotificationDispatcher {
    http: reqwest::Client,
    config: EmailConfig,
    templates: NotificationTemplates,
    redactor: PhiRedactor,
}

impl EmailNotificationDispatcher {
    pub fn new(config: EmailConfig, redactor: PhiRedactor) -> EmailResult<Self> {
        reqwest::Url::parse(&config.api_url)
            .map_err(|e| EmailError::Config(format!("invalid api url '{}': {e}", config.api_url)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmailError::Config(e.to_string()))?;
        Ok(Self {
            http,
            config,
            templates: NotificationTemplates::new()?,
            redactor,
        })
    }

    pub fn with_templates(mut self, templates: NotificationTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Render and send one message, returning the provider's delivery id.
    pub async fn send(&self, recipient: &Recipient, event: NotificationEvent, payload: &Value) -> EmailResult<String> {
        let rendered = self.templates.render(event, payload)?;

        let mut attachments = BTreeMap::new();
        if let Some(letter) = payload.get(LETTER_KEY).and_then(Value::as_str) {
            let name = match payload.get("prescription_id").and_then(Value::as_str) {
                Some(id) => format!("clinician-letter-{id}.pdf"),
                None => "clinician-letter.pdf".to_string(),
            };
            attachments.insert(name, letter.to_string());
        }

        // The attachment already travels separately; keep message data small.
        let message_data = match payload {
            Value::Object(fields) if fields.contains_key(LETTER_KEY) => {
                let mut fields = fields.clone();
                fields.remove(LETTER_KEY);
                Value::Object(fields)
            }
            other => other.clone(),
        };

        let request = SendRequest {
            from: &self.config.sender,
            to: Destination::for_recipient(recipient, &self.config.care_team_address),
            subject: rendered.subject,
            body: rendered.body,
            message_type: event.as_str(),
            attachments,
            message_data: &message_data,
        };

        let url = format!("{}/v1/send/email", self.config.api_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(EmailError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| EmailError::SendFailed(format!("unexpected response: {e}")))?;
        Ok(sent.delivery_id)
    }

    fn describe(&self, recipient: &Recipient) -> String {
        match recipient {
            Recipient::CareTeam => self.redactor.redact(&self.config.care_team_address),
            other => json!(other).to_string(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for EmailNotificationDispatcher {
    async fn notify(&self, recipient: &Recipient, event: NotificationEvent, payload: Value) {
        match self.send(recipient, event, &payload).await {
            Ok(delivery_id) => {
                debug!(event = event.as_str(), delivery_id = %delivery_id, "Notification sent");
            }
            Err(e) => {
                warn!(
                    event = event.as_str(),
                    recipient = %self.describe(recipient),
                    error = %self.redactor.redact(&e.to_string()),
                    "Notification delivery failed"
                );
            }
        }
    }
}
