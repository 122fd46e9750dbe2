use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use mongodb::{Client, Database};
use rocket::fairing::AdHoc;

use crate::config::{Config, StorageBackend, DEV_JWT_SECRET};
use crate::guards::RateLimiter;
use crate::services::{ContactGate, EmailService, Inbox, LogMailer, Mailer, OtpService, SmtpMailer};
use crate::services::email::MailError;
use crate::store::{Backends, StoreError};

/// Builds the stores and mailer, then manages the services the routes use.
/// Ignition fails when the signing key, backend or mailer cannot be set up.
pub fn init() -> AdHoc {
    AdHoc::try_on_ignite("Contact services", |rocket| async {
        let jwt_secret = Config::jwt_secret_configured();
        if !jwt_secret_ready(jwt_secret.as_deref(), Config::is_development()) {
            error!("✗ jwt_secret must be set outside the debug profile");
            return Err(rocket);
        }
        if jwt_secret.is_none() {
            warn!("jwt_secret not set; using the development signing key");
        }

        let backends = match Config::storage() {
            StorageBackend::Memory => {
                warn!("Using in-memory storage; data is lost on restart");
                Backends::memory()
            }
            StorageBackend::MongoDb => match connect().await {
                Ok(backends) => {
                    info!("✓ MongoDB connected successfully");
                    backends
                }
                Err(e) => {
                    error!("✗ Failed to connect to MongoDB: {}", e);
                    return Err(rocket);
                }
            },
        };

        let mailer: Arc<dyn Mailer> = match SmtpMailer::from_config() {
            Ok(mailer) => Arc::new(mailer),
            Err(MailError::NotConfigured) if Config::is_development() => {
                warn!("SMTP credentials missing; mail will be written to the log");
                Arc::new(LogMailer)
            }
            Err(e) => {
                error!("✗ Failed to configure mail transport: {}", e);
                return Err(rocket);
            }
        };

        let email = EmailService::from_config(mailer);
        let otp = OtpService::new(
            backends.otps,
            chrono::Duration::seconds(Config::otp_ttl_secs()),
        );

        Ok(rocket
            .manage(ContactGate::new(otp, backends.contacts.clone(), email.clone()))
            .manage(Inbox::new(backends.contacts, email))
            .manage(RateLimiter::from_config(backends.rate_limits)))
    })
}

/// Periodically drops expired OTP records. MongoDB's TTL index does the
/// same lazily; this keeps the in-memory backend bounded too.
pub fn sweeper() -> AdHoc {
    AdHoc::on_liftoff("OTP sweeper", |rocket| {
        Box::pin(async move {
            let Some(gate) = rocket.state::<ContactGate>().cloned() else {
                warn!("OTP sweeper not started: contact services are not managed");
                return;
            };

            let period = Duration::from_secs(Config::otp_sweep_secs().max(1));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    ticker.tick().await;
                    match gate.otp().purge_expired().await {
                        Ok(0) => {}
                        Ok(n) => info!("Purged {} expired OTP record(s)", n),
                        Err(e) => error!("OTP sweep failed: {}", e),
                    }
                }
            });
        })
    })
}

/// Admin tokens must be signed with a private key unless running a debug build.
pub(crate) fn jwt_secret_ready(configured: Option<&str>, development: bool) -> bool {
    development || configured.is_some_and(|secret| secret != DEV_JWT_SECRET)
}

async fn connect() -> Result<Backends, StoreError> {
    let database = connect_database().await?;
    Backends::mongo(&database).await
}

async fn connect_database() -> Result<Database, mongodb::error::Error> {
    let uri = Config::mongodb_uri();
    let client = Client::with_uri_str(&uri).await?;

    // Test connection
    client
        .database("admin")
        .run_command(mongodb::bson::doc! {"ping": 1}, None)
        .await?;

    Ok(client.database(&Config::mongodb_database()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_requires_a_private_jwt_secret() {
        assert!(!jwt_secret_ready(None, false));
        assert!(!jwt_secret_ready(Some(DEV_JWT_SECRET), false));
        assert!(jwt_secret_ready(Some("4f1c0e9a7b"), false));
    }

    #[test]
    fn debug_falls_back_to_the_development_key() {
        assert!(jwt_secret_ready(None, true));
    }
}
