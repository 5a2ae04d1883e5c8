//! Outgoing email delivery.
//!
//! With `MAIL_API_URL` / `MAIL_API_KEY` configured, messages are POSTed as
//! JSON to the transactional mail API with a bearer key. Without them the
//! message is logged and kept in an in-memory outbox that tests can read.

use reqwest::Client;
use serde::Serialize;
use std::sync::{Arc, RwLock};

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to reach mail API: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Mail API rejected message with status {0}")]
    Rejected(u16),
}

#[derive(Clone)]
struct HttpMailer {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Clone)]
pub struct Mailer {
    from: String,
    http: Option<HttpMailer>,
    outbox: Arc<RwLock<Vec<OutgoingMail>>>,
}

impl Mailer {
    pub fn from_config(config: &Config) -> Self {
        let http = match (config.mail_api_url(), config.mail_api_key()) {
            (Some(url), Some(api_key)) => Some(HttpMailer {
                client: Client::new(),
                url: url.to_owned(),
                api_key: api_key.to_owned(),
            }),
            _ => {
                tracing::warn!("Mail API not configured, outgoing mail is only logged");
                None
            }
        };

        Self {
            from: config.mail_from().to_owned(),
            http,
            outbox: Arc::default(),
        }
    }

    pub fn new_for_test() -> Self {
        Self {
            from: "no-reply@carrental.test".to_owned(),
            http: None,
            outbox: Arc::default(),
        }
    }

    /// Messages delivered without a mail API, oldest first.
    pub fn outbox(&self) -> Vec<OutgoingMail> {
        self.outbox.read().expect("lock poisoned").clone()
    }

    pub async fn send(
        &self,
        to: &str,
        subject: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), MailError> {
        let mail = OutgoingMail {
            from: self.from.clone(),
            to: to.to_owned(),
            subject: subject.into(),
            text: text.into(),
        };

        let Some(http) = &self.http else {
            tracing::info!(to = %mail.to, subject = %mail.subject, "Mail API disabled, message kept in outbox");
            self.outbox.write().expect("lock poisoned").push(mail);
            return Ok(());
        };

        let response = http
            .client
            .post(&http.url)
            .bearer_auth(&http.api_key)
            .json(&mail)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected(status.as_u16()));
        }

        tracing::debug!(to = %mail.to, "Mail delivered");
        Ok(())
    }
}
