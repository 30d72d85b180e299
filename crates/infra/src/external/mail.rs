use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use kiosk_core::MailSendHistoryId;

use crate::store::{MailHistoryStore, StoreError};

/// Outbound mail transport.
#[async_trait::async_trait]
pub trait MailSendClient: Send + Sync {
    /// Returns whether the message was accepted for delivery.
    async fn send_email(&self, from: &str, to: &str, subject: &str, content: &str) -> bool;
}

#[async_trait::async_trait]
impl<C> MailSendClient for Arc<C>
where
    C: MailSendClient + ?Sized,
{
    async fn send_email(&self, from: &str, to: &str, subject: &str, content: &str) -> bool {
        (**self).send_email(from, to, subject, content).await
    }
}

/// Client that writes the message to the log instead of a mail server.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMailSendClient;

#[async_trait::async_trait]
impl MailSendClient for LoggingMailSendClient {
    async fn send_email(&self, from: &str, to: &str, subject: &str, content: &str) -> bool {
        info!(from, to, subject, content, "mail sent");
        true
    }
}

/// A delivered mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSendHistory {
    pub id: MailSendHistoryId,
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Sends mail and records every successful delivery.
pub struct MailService<C, H> {
    client: C,
    history: H,
}

impl<C, H> MailService<C, H>
where
    C: MailSendClient,
    H: MailHistoryStore,
{
    pub fn new(client: C, history: H) -> Self {
        Self { client, history }
    }

    /// Returns `Ok(false)` when the client rejects the message; nothing is
    /// recorded in that case.
    #[instrument(skip(self, content), err)]
    pub async fn send_mail(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        content: &str,
    ) -> Result<bool, StoreError> {
        if !self.client.send_email(from, to, subject, content).await {
            warn!("mail client rejected message");
            return Ok(false);
        }

        self.history
            .save_history(MailSendHistory {
                id: MailSendHistoryId::new(),
                from_email: from.to_string(),
                to_email: to.to_string(),
                subject: subject.to_string(),
                content: content.to_string(),
                sent_at: Utc::now(),
            })
            .await?;
        Ok(true)
    }

    pub fn history(&self) -> &H {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    struct RejectingClient;

    #[async_trait::async_trait]
    impl MailSendClient for RejectingClient {
        async fn send_email(&self, _: &str, _: &str, _: &str, _: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn successful_send_is_recorded() {
        let store = Arc::new(InMemoryStore::new());
        let service = MailService::new(LoggingMailSendClient, store.clone());

        let sent = service
            .send_mail("no-reply@cafekiosk.com", "owner@cafekiosk.com", "subject", "body")
            .await
            .unwrap();

        assert!(sent);
        let history = store.find_all_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].to_email, "owner@cafekiosk.com");
        assert_eq!(history[0].subject, "subject");
    }

    #[tokio::test]
    async fn rejected_send_leaves_no_history() {
        let store = Arc::new(InMemoryStore::new());
        let service = MailService::new(RejectingClient, store.clone());

        let sent = service.send_mail("a@b.c", "d@e.f", "subject", "body").await.unwrap();

        assert!(!sent);
        assert!(store.find_all_history().await.unwrap().is_empty());
    }
}
