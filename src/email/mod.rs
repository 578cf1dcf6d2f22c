use crate::shared::config::SmtpConfig;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use log::{error, info};
use serde::Serialize;
use uuid::Uuid;

/// Delivery outcome. Failure is reported, never raised: the approval
/// decision stays durable whether or not the email went out.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub delivered: bool,
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn delivered() -> Self {
        Self {
            delivered: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            delivered: false,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        to_email: &str,
        to_name: &str,
        subject: &str,
        body: &str,
        ticket_id: Uuid,
    ) -> DeliveryResult;
}

/// SMTP notifier with a console demo mode. With `SMTP_ENABLED=false` the
/// outgoing message is logged instead of transmitted, which keeps the
/// approval workflow fully exercisable without a mail relay.
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        if config.enabled {
            info!("email notifier: SMTP enabled ({}:{})", config.host, config.port);
        } else {
            info!("email notifier: console demo mode");
        }
        Self { config }
    }

    fn send_smtp(
        &self,
        to_email: &str,
        subject: &str,
        body: &str,
        ticket_id: Uuid,
    ) -> DeliveryResult {
        let from = match self.config.from.parse() {
            Ok(from) => from,
            Err(e) => return DeliveryResult::failed(format!("invalid from address: {e}")),
        };
        let to = match to_email.parse() {
            Ok(to) => to,
            Err(e) => return DeliveryResult::failed(format!("invalid to address: {e}")),
        };

        let email = match Message::builder()
            .from(from)
            .to(to)
            .subject(format!("Re: {subject} [Ticket #{ticket_id}]"))
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
        {
            Ok(email) => email,
            Err(e) => return DeliveryResult::failed(format!("failed to build email: {e}")),
        };

        let mailer = if let (Some(user), Some(pass)) =
            (self.config.user.clone(), self.config.password.clone())
        {
            let creds = Credentials::new(user, pass);
            match SmtpTransport::relay(&self.config.host) {
                Ok(relay) => relay.credentials(creds).build(),
                Err(e) => return DeliveryResult::failed(format!("SMTP relay error: {e}")),
            }
        } else {
            SmtpTransport::builder_dangerous(&self.config.host).build()
        };

        match mailer.send(&email) {
            Ok(_) => {
                info!("email sent via SMTP to {to_email} (ticket {ticket_id})");
                DeliveryResult::delivered()
            }
            Err(e) => {
                error!("SMTP send failed for ticket {ticket_id}: {e}");
                DeliveryResult::failed(e.to_string())
            }
        }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(
        &self,
        to_email: &str,
        to_name: &str,
        subject: &str,
        body: &str,
        ticket_id: Uuid,
    ) -> DeliveryResult {
        if !self.config.enabled {
            info!(
                "EMAIL (demo mode, not sent)\nTo: {to_name} <{to_email}>\nFrom: {}\nSubject: Re: {subject} [Ticket #{ticket_id}]\n\n{body}",
                self.config.from
            );
            return DeliveryResult::delivered();
        }

        self.send_smtp(to_email, subject, body, ticket_id)
    }
}
