use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{error, info};
use mongodb::bson::{oid::ObjectId, DateTime};

use crate::models::{
    ContactFilter, ContactMessage, ContactPage, ContactReply, ContactStats, ContactStatus,
    ContactUpdate,
};
use crate::services::email::{EmailService, MailError};
use crate::store::{ContactStore, StoreError};

const ACTIVITY_DAYS: i64 = 7;

#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    #[error("Message not found")]
    NotFound,
    #[error("Nothing to update")]
    EmptyUpdate,
    #[error("failed to send reply: {0}")]
    Delivery(#[from] MailError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn now() -> DateTime {
    DateTime::from_millis(Utc::now().timestamp_millis())
}

/// Admin-side operations over stored contact messages.
#[derive(Clone)]
pub struct Inbox {
    contacts: Arc<dyn ContactStore>,
    email: EmailService,
}

impl Inbox {
    pub fn new(contacts: Arc<dyn ContactStore>, email: EmailService) -> Self {
        Inbox { contacts, email }
    }

    pub async fn list(&self, filter: &ContactFilter) -> Result<ContactPage, InboxError> {
        Ok(self.contacts.list(filter).await?)
    }

    pub async fn get(&self, id: &ObjectId) -> Result<ContactMessage, InboxError> {
        self.contacts.get(id).await?.ok_or(InboxError::NotFound)
    }

    /// `new` becomes `read`; later statuses are kept.
    pub async fn mark_read(&self, id: &ObjectId) -> Result<ContactMessage, InboxError> {
        let current = self.get(id).await?;

        let mut update = ContactUpdate::default();
        if current.read_at.is_none() {
            update.read_at = Some(now());
        }
        if current.status == ContactStatus::New {
            update.status = Some(ContactStatus::Read);
        }

        if update.is_empty() {
            return Ok(current);
        }

        self.contacts
            .update(id, &update, now())
            .await?
            .ok_or(InboxError::NotFound)
    }

    pub async fn update(
        &self,
        id: &ObjectId,
        status: Option<ContactStatus>,
        is_spam: Option<bool>,
    ) -> Result<ContactMessage, InboxError> {
        let update = ContactUpdate {
            status,
            is_spam,
            ..Default::default()
        };
        if update.is_empty() {
            return Err(InboxError::EmptyUpdate);
        }

        self.contacts
            .update(id, &update, now())
            .await?
            .ok_or(InboxError::NotFound)
    }

    /// Mails the reply first; the message is only marked replied once delivery succeeded.
    pub async fn reply(&self, id: &ObjectId, reply: &str) -> Result<ContactMessage, InboxError> {
        let contact = self.get(id).await?;

        self.email.send_reply(&contact, reply).await.map_err(|e| {
            error!("Failed to send reply to {}: {}", contact.email, e);
            e
        })?;
        info!("Reply sent to {}", contact.email);

        let replied_at = now();
        let update = ContactUpdate {
            status: Some(ContactStatus::Replied),
            read_at: contact.read_at.is_none().then_some(replied_at),
            reply: Some(ContactReply {
                message: reply.to_string(),
                replied_at,
            }),
            ..Default::default()
        };

        self.contacts
            .update(id, &update, replied_at)
            .await?
            .ok_or(InboxError::NotFound)
    }

    pub async fn delete(&self, id: &ObjectId) -> Result<(), InboxError> {
        if self.contacts.delete(id).await? {
            info!("Contact message {} deleted", id.to_hex());
            Ok(())
        } else {
            Err(InboxError::NotFound)
        }
    }

    pub async fn stats(&self) -> Result<ContactStats, InboxError> {
        let since = Utc::now() - Duration::days(ACTIVITY_DAYS);
        Ok(self
            .contacts
            .stats(DateTime::from_millis(since.timestamp_millis()))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientInfo, SubmitContactDto};
    use crate::services::email::testing::RecordingMailer;
    use crate::store::memory::MemoryContactStore;

    async fn inbox_with_message(mailer: RecordingMailer) -> (Inbox, Arc<RecordingMailer>, ObjectId) {
        let contacts = Arc::new(MemoryContactStore::default());
        let mailer = Arc::new(mailer);
        let email = EmailService::new(mailer.clone(), "Owner", "owner@example.com", "https://example.com");

        let form = SubmitContactDto {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            otp: String::new(),
            subject: "Project inquiry".to_string(),
            message: "I would love to work with you.".to_string(),
        };
        let saved = contacts
            .save(ContactMessage::new(&form, ClientInfo::default(), now()))
            .await
            .unwrap();

        (Inbox::new(contacts, email), mailer, saved.id.unwrap())
    }

    #[tokio::test]
    async fn mark_read_sets_status_once() {
        let (inbox, _, id) = inbox_with_message(RecordingMailer::default()).await;

        let read = inbox.mark_read(&id).await.unwrap();
        assert_eq!(read.status, ContactStatus::Read);
        let first_read = read.read_at.unwrap();

        let again = inbox.mark_read(&id).await.unwrap();
        assert_eq!(again.read_at, Some(first_read));
    }

    #[tokio::test]
    async fn mark_read_does_not_downgrade_replied() {
        let (inbox, _, id) = inbox_with_message(RecordingMailer::default()).await;
        inbox.reply(&id, "Thanks, let's talk").await.unwrap();

        let after = inbox.mark_read(&id).await.unwrap();
        assert_eq!(after.status, ContactStatus::Replied);
    }

    #[tokio::test]
    async fn reply_records_after_delivery() {
        let (inbox, mailer, id) = inbox_with_message(RecordingMailer::default()).await;

        let replied = inbox.reply(&id, "Thanks, let's talk").await.unwrap();
        assert_eq!(replied.status, ContactStatus::Replied);
        assert_eq!(replied.reply.unwrap().message, "Thanks, let's talk");
        assert!(replied.read_at.is_some());
        assert_eq!(mailer.sent()[0].subject, "Re: Project inquiry");
    }

    #[tokio::test]
    async fn failed_reply_leaves_message_untouched() {
        let (inbox, _, id) = inbox_with_message(RecordingMailer::failing_for("ada@example.com")).await;

        assert!(matches!(
            inbox.reply(&id, "Thanks").await,
            Err(InboxError::Delivery(_))
        ));
        let current = inbox.get(&id).await.unwrap();
        assert_eq!(current.status, ContactStatus::New);
        assert!(current.reply.is_none());
    }

    #[tokio::test]
    async fn update_requires_a_field() {
        let (inbox, _, id) = inbox_with_message(RecordingMailer::default()).await;

        assert!(matches!(
            inbox.update(&id, None, None).await,
            Err(InboxError::EmptyUpdate)
        ));

        let spam = inbox.update(&id, None, Some(true)).await.unwrap();
        assert!(spam.is_spam);
        assert_eq!(inbox.stats().await.unwrap().spam, 1);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let (inbox, _, id) = inbox_with_message(RecordingMailer::default()).await;
        let missing = ObjectId::new();

        assert!(matches!(inbox.get(&missing).await, Err(InboxError::NotFound)));
        assert!(matches!(inbox.mark_read(&missing).await, Err(InboxError::NotFound)));

        inbox.delete(&id).await.unwrap();
        assert!(matches!(inbox.delete(&id).await, Err(InboxError::NotFound)));
    }

    #[tokio::test]
    async fn stats_count_todays_message() {
        let (inbox, _, _) = inbox_with_message(RecordingMailer::default()).await;
        let stats = inbox.stats().await.unwrap();

        assert_eq!(stats.total, 1);
        assert_eq!(stats.new, 1);
        assert_eq!(stats.recent_activity.len(), 1);
        assert_eq!(stats.recent_activity[0].count, 1);
    }
}
