//! Two-phase contact submission: a visitor first requests a passcode for
//! their email, then submits it together with the form. Nothing is persisted
//! unless the passcode verifies.

use std::sync::Arc;

use chrono::Utc;
use log::{error, info};
use mongodb::bson::DateTime;
use validator::Validate;

use crate::models::{ClientInfo, ContactMessage, SubmitContactDto};
use crate::services::email::{EmailService, MailError};
use crate::services::otp::{OtpError, OtpService};
use crate::store::{ContactStore, StoreError};
use crate::utils::validation::validation_messages;
use crate::utils::{normalize_email, validate_email};

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Email is required")]
    MissingEmail,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Validation failed")]
    InvalidForm(Vec<String>),
    #[error(transparent)]
    Otp(#[from] OtpError),
    #[error("failed to deliver OTP: {0}")]
    Delivery(#[from] MailError),
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

#[derive(Clone)]
pub struct ContactGate {
    otp: OtpService,
    contacts: Arc<dyn ContactStore>,
    email: EmailService,
}

impl ContactGate {
    pub fn new(otp: OtpService, contacts: Arc<dyn ContactStore>, email: EmailService) -> Self {
        ContactGate { otp, contacts, email }
    }

    pub fn otp(&self) -> &OtpService {
        &self.otp
    }

    /// Phase one: issue a code for `email` and mail it out.
    pub async fn request_code(&self, email: &str, name: Option<&str>) -> Result<(), GateError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(GateError::MissingEmail);
        }
        if !validate_email(&email) {
            return Err(GateError::InvalidEmail);
        }

        let code = self.otp.issue(&email).await?;
        self.email
            .send_otp_email(&email, name, &code, self.otp.ttl().num_minutes())
            .await?;

        Ok(())
    }

    /// Phase two: validate the form, consume the code, then persist and notify.
    ///
    /// Notification failures after the message is saved do not fail the submission.
    pub async fn submit(
        &self,
        form: SubmitContactDto,
        client: ClientInfo,
    ) -> Result<ContactMessage, GateError> {
        let form = form.normalized();
        form.validate()
            .map_err(|e| GateError::InvalidForm(validation_messages(&e)))?;

        self.otp.verify(&form.email, &form.otp).await?;

        let now = DateTime::from_millis(Utc::now().timestamp_millis());
        let contact = self
            .contacts
            .save(ContactMessage::new(&form, client, now))
            .await
            .map_err(|e| {
                error!("Failed to save contact message from {}: {}", form.email, e);
                e
            })?;

        info!(
            "Contact message {} saved from {}",
            contact.id.map(|id| id.to_hex()).unwrap_or_default(),
            contact.email
        );

        self.email.send_admin_notification(&contact).await;
        self.email.send_auto_reply(&contact).await;

        Ok(contact)
    }
}
