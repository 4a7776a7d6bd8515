use handlebars::Handlebars;
use prescription_lifecycle::gateways::NotificationEvent;
use serde::Serialize;

use crate::error::EmailResult;

const EVENTS: [NotificationEvent; 4] = [
    NotificationEvent::PrescriptionActivated,
    NotificationEvent::SubscriptionCancelled,
    NotificationEvent::RefillRequired,
    NotificationEvent::ClinicianLetter,
];

fn default_subject(event: NotificationEvent) -> &'static str {
    match event {
        NotificationEvent::PrescriptionActivated => "Your {{medication}} prescription is active",
        NotificationEvent::SubscriptionCancelled => "Your subscription has been cancelled",
        NotificationEvent::RefillRequired => "Refill required: {{default medication \"unlinked subscription\"}}",
        NotificationEvent::ClinicianLetter => "Prescription activated: {{medication}}",
    }
}

fn default_body(event: NotificationEvent) -> &'static str {
    match event {
        NotificationEvent::PrescriptionActivated => {
            "Your prescriber has signed your {{medication}} prescription.\n\
             {{#if replacement}}It replaces your previous prescription and your plan has been updated.\n\
             {{else}}Your first order is being prepared.\n{{/if}}"
        }
        NotificationEvent::SubscriptionCancelled => {
            "Your upcoming renewal has been cancelled because it is no longer backed by a valid prescription.\n\
             Reason: {{reason}}\n\
             Contact your care team to renew your prescription."
        }
        NotificationEvent::RefillRequired => {
            "Subscription {{subscription_id}} for patient {{patient_id}} renews on {{next_charge_at}}.\n\
             {{#if prescription_id}}Prescription {{prescription_id}} needs a refill before then.\n\
             {{else}}No prescription is linked to this subscription.\n{{/if}}"
        }
        NotificationEvent::ClinicianLetter => {
            "The prescription {{prescription_id}} you signed for patient {{patient_id}} is now active.\n\
             The clinician letter is attached."
        }
    }
}

/// Subject and body text for a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Handlebars subject/body pairs, one per notification event.
pub struct NotificationTemplates {
    registry: Handlebars<'static>,
}

impl NotificationTemplates {
    pub fn new() -> EmailResult<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_helper("default", Box::new(default_helper));
        let mut templates = Self { registry };
        for event in EVENTS {
            templates.register(event, default_subject(event), default_body(event))?;
        }
        Ok(templates)
    }

    /// Replace the wording used for one event.
    pub fn register(&mut self, event: NotificationEvent, subject: &str, body: &str) -> EmailResult<()> {
        self.registry
            .register_template_string(&subject_name(event), subject)?;
        self.registry.register_template_string(&body_name(event), body)?;
        Ok(())
    }

    pub fn render<T: Serialize>(&self, event: NotificationEvent, data: &T) -> EmailResult<RenderedMessage> {
        Ok(RenderedMessage {
            subject: self.registry.render(&subject_name(event), data)?,
            body: self.registry.render(&body_name(event), data)?,
        })
    }
}

fn subject_name(event: NotificationEvent) -> String {
    format!("{}.subject", event.as_str())
}

fn body_name(event: NotificationEvent) -> String {
    format!("{}.body", event.as_str())
}

/// `{{default value "fallback"}}` renders the fallback when value is missing or null.
fn default_helper(
    helper: &handlebars::Helper<'_, '_>,
    _: &Handlebars<'_>,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext<'_, '_>,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = helper
        .param(0)
        .map(|param| param.value())
        .filter(|value| !value.is_null());
    let rendered = match value {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => helper
            .param(1)
            .and_then(|param| param.value().as_str())
            .unwrap_or_default()
            .to_string(),
    };
    out.write(&rendered)?;
    Ok(())
}
