use std::sync::Arc;

use lettre::{
    Message, SmtpTransport, Transport,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use log::{error, info, warn};

use crate::config::Config;
use crate::models::ContactMessage;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("email not configured")]
    NotConfigured,
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build email: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("mail task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A rendered email, independent of the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[rocket::async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// --------------------
/// SMTP transport
/// --------------------
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config() -> Result<Self, MailError> {
        let mail_user = Config::mail_user();
        let mail_password = Config::mail_password();

        if mail_user.is_empty() || mail_password.is_empty() {
            return Err(MailError::NotConfigured);
        }

        let host = Config::mail_host();
        let port = Config::mail_port();

        // 465 is implicit TLS, anything else upgrades with STARTTLS
        let builder = if port == 465 {
            SmtpTransport::relay(&host)?
        } else {
            SmtpTransport::starttls_relay(&host)?
        };

        let transport = builder
            .port(port)
            .credentials(Credentials::new(mail_user, mail_password))
            .build();

        let from = Mailbox::new(Some(Config::mail_from_name()), Config::mail_from().parse()?);

        info!("SMTP mailer ready ({}:{})", host, port);
        Ok(SmtpMailer { transport, from })
    }
}

#[rocket::async_trait]
impl Mailer for SmtpMailer {
    async fn send_mail(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(mail.to.parse::<Mailbox>()?)
            .subject(mail.subject);

        if let Some(reply_to) = mail.reply_to {
            builder = builder.reply_to(reply_to.parse::<Mailbox>()?);
        }

        let message = builder.multipart(MultiPart::alternative_plain_html(mail.text, mail.html))?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message)).await??;
        Ok(())
    }
}

/// Development stand-in that writes mail to the log instead of sending it.
pub struct LogMailer;

#[rocket::async_trait]
impl Mailer for LogMailer {
    async fn send_mail(&self, mail: OutgoingMail) -> Result<(), MailError> {
        info!(
            "[mail] to={} subject={:?}\n{}",
            mail.to, mail.subject, mail.text
        );
        Ok(())
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn paragraphs(input: &str) -> String {
    escape_html(input).replace('\n', "<br>")
}

/// Composes the contact flow's emails and hands them to a [`Mailer`].
#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
    from_name: String,
    admin_email: String,
    site_url: String,
}

impl EmailService {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        from_name: impl Into<String>,
        admin_email: impl Into<String>,
        site_url: impl Into<String>,
    ) -> Self {
        EmailService {
            mailer,
            from_name: from_name.into(),
            admin_email: admin_email.into(),
            site_url: site_url.into(),
        }
    }

    pub fn from_config(mailer: Arc<dyn Mailer>) -> Self {
        Self::new(
            mailer,
            Config::mail_from_name(),
            Config::admin_email(),
            Config::site_url(),
        )
    }

    /// Delivery failure is returned to the caller; the flow cannot continue without the code.
    pub async fn send_otp_email(
        &self,
        email: &str,
        name: Option<&str>,
        otp: &str,
        valid_minutes: i64,
    ) -> Result<(), MailError> {
        let mail = self.otp_mail(email, name, otp, valid_minutes);
        match self.mailer.send_mail(mail).await {
            Ok(_) => {
                info!("OTP email sent successfully to {}", email);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send OTP email to {}: {}", email, e);
                Err(e)
            }
        }
    }

    /// New-message alert for the site owner. Failures are only logged.
    pub async fn send_admin_notification(&self, contact: &ContactMessage) -> bool {
        if self.admin_email.is_empty() {
            warn!("Admin email not configured. Skipping new-message alert.");
            return false;
        }

        match self.mailer.send_mail(self.admin_mail(contact)).await {
            Ok(_) => {
                info!("Notification email sent to {}", self.admin_email);
                true
            }
            Err(e) => {
                error!("Failed to send notification email: {}", e);
                false
            }
        }
    }

    /// Confirmation to the sender. Failures are only logged.
    pub async fn send_auto_reply(&self, contact: &ContactMessage) -> bool {
        match self.mailer.send_mail(self.auto_reply_mail(contact)).await {
            Ok(_) => {
                info!("Auto-reply email sent to {}", contact.email);
                true
            }
            Err(e) => {
                error!("Failed to send auto-reply to {}: {}", contact.email, e);
                false
            }
        }
    }

    pub async fn send_reply(&self, contact: &ContactMessage, reply: &str) -> Result<(), MailError> {
        self.mailer.send_mail(self.reply_mail(contact, reply)).await
    }

    fn otp_mail(&self, email: &str, name: Option<&str>, otp: &str, valid_minutes: i64) -> OutgoingMail {
        let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or("there");

        OutgoingMail {
            to: email.to_string(),
            reply_to: None,
            subject: "Your OTP for Contact Form".to_string(),
            text: format!(
                "Hi {},\n\nYour OTP is: {}. It will expire in {} minutes.\n\nIf you didn't request this OTP, please ignore this email.",
                name, otp, valid_minutes
            ),
            html: format!(
                r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <p>Hi {},</p>
    <p>Use this code to confirm your email address on the contact form:</p>
    <div style="font-size: 32px; font-weight: bold; letter-spacing: 5px; color: #667eea;">{}</div>
    <p style="color: #666; font-size: 14px;">Valid for {} minutes</p>
    <p>If you didn't request this OTP, please ignore this email.</p>
</body>
</html>"#,
                escape_html(name),
                otp,
                valid_minutes
            ),
        }
    }

    fn admin_mail(&self, contact: &ContactMessage) -> OutgoingMail {
        let id = contact.id.map(|id| id.to_hex()).unwrap_or_default();
        let ip = contact.ip_address.as_deref().unwrap_or("unknown");
        let agent = contact.user_agent.as_deref().unwrap_or("unknown");

        OutgoingMail {
            to: self.admin_email.clone(),
            reply_to: Some(contact.email.clone()),
            subject: format!("New Contact Form Message from {}", contact.name),
            text: format!(
                "Name: {}\nEmail: {}\nSubject: {}\nMessage:\n{}\n\nIP: {} | User-Agent: {}\nID: {}",
                contact.name, contact.email, contact.subject, contact.message, ip, agent, id
            ),
            html: format!(
                r#"<h2>New Contact Form Message</h2>
<p><strong>Name:</strong> {}</p>
<p><strong>Email:</strong> <a href="mailto:{email}">{email}</a></p>
<p><strong>Subject:</strong> {}</p>
<p><strong>Message:</strong><br/>{}</p>
<hr/>
<small>IP: {} | User-Agent: {} | ID: {}</small>"#,
                escape_html(&contact.name),
                escape_html(&contact.subject),
                paragraphs(&contact.message),
                escape_html(ip),
                escape_html(agent),
                id,
                email = escape_html(&contact.email),
            ),
        }
    }

    fn auto_reply_mail(&self, contact: &ContactMessage) -> OutgoingMail {
        OutgoingMail {
            to: contact.email.clone(),
            reply_to: None,
            subject: format!("Thank you for contacting me - {}", contact.subject),
            text: format!(
                "Hi {},\n\nThanks for reaching out! I have received your message and will get back to you soon.\n\nSubject: {}\n\n{}\n\n- {}\n{}",
                contact.name, contact.subject, contact.message, self.from_name, self.site_url
            ),
            html: format!(
                r#"<p>Hi <strong>{}</strong>,</p>
<p>Thanks for reaching out! I have received your message and will get back to you soon.</p>
<blockquote style="border-left: 4px solid #667eea; padding-left: 12px;">
    <p><strong>Subject:</strong> {}</p>
    <p>{}</p>
</blockquote>
<p>- {}</p>
<p><a href="{}">Visit my portfolio</a></p>"#,
                escape_html(&contact.name),
                escape_html(&contact.subject),
                paragraphs(&contact.message),
                escape_html(&self.from_name),
                escape_html(&self.site_url),
            ),
        }
    }

    fn reply_mail(&self, contact: &ContactMessage, reply: &str) -> OutgoingMail {
        OutgoingMail {
            to: contact.email.clone(),
            reply_to: if self.admin_email.is_empty() {
                None
            } else {
                Some(self.admin_email.clone())
            },
            subject: format!("Re: {}", contact.subject),
            text: reply.to_string(),
            html: format!("<p>{}</p>", paragraphs(reply)),
        }
    }
}
