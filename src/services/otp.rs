use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{info, warn};
use mongodb::bson::DateTime;
use rand::Rng;

use crate::models::OtpRecord;
use crate::store::{OtpStore, StoreError};
use crate::utils::normalize_email;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("Invalid OTP")]
    InvalidCode,
    #[error("OTP expired")]
    Expired,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Six digits in [100000, 999999].
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}

fn to_bson(at: chrono::DateTime<Utc>) -> DateTime {
    DateTime::from_millis(at.timestamp_millis())
}

/// Issues and verifies email passcodes against an [`OtpStore`].
#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn OtpStore>,
    ttl: Duration,
}

impl OtpService {
    pub fn new(store: Arc<dyn OtpStore>, ttl: Duration) -> Self {
        OtpService { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn issue(&self, email: &str) -> Result<String, OtpError> {
        self.issue_at(email, Utc::now()).await
    }

    /// Replaces every outstanding code for `email` with a fresh one.
    ///
    /// Delete and insert are two store calls; concurrent issuances for the
    /// same address may interleave and the later one wins.
    pub async fn issue_at(
        &self,
        email: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<String, OtpError> {
        let email = normalize_email(email);
        let code = generate_code();

        let replaced = self.store.delete_all_for_email(&email).await?;
        self.store
            .insert(OtpRecord {
                id: None,
                email: email.clone(),
                code: code.clone(),
                expires_at: to_bson(now + self.ttl),
                created_at: to_bson(now),
            })
            .await?;

        info!("Issued OTP for {} ({} previous code(s) invalidated)", email, replaced);
        Ok(code)
    }

    pub async fn verify(&self, email: &str, code: &str) -> Result<(), OtpError> {
        self.verify_at(email, code, Utc::now()).await
    }

    /// Consumes the matching code. An expired match is reported but left for
    /// the expiry sweep.
    pub async fn verify_at(
        &self,
        email: &str,
        code: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), OtpError> {
        let email = normalize_email(email);
        let code = code.trim();

        let record = match self.store.find_by_email_and_code(&email, code).await? {
            Some(record) => record,
            None => {
                warn!("OTP verification failed for {}: no matching code", email);
                return Err(OtpError::InvalidCode);
            }
        };

        if record.is_expired_at(to_bson(now)) {
            warn!("OTP verification failed for {}: code expired", email);
            return Err(OtpError::Expired);
        }

        match record.id {
            Some(ref id) => {
                self.store.delete_by_id(id).await?;
            }
            None => {
                self.store.delete_all_for_email(&email).await?;
            }
        }

        info!("OTP verified for {}", email);
        Ok(())
    }

    /// Drops every expired record; returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, OtpError> {
        Ok(self.store.purge_expired(to_bson(Utc::now())).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryOtpStore;

    fn service() -> (OtpService, Arc<MemoryOtpStore>) {
        let store = Arc::new(MemoryOtpStore::default());
        (OtpService::new(store.clone(), Duration::minutes(5)), store)
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..1_000 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let n: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&n));
        }
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_code() {
        let (otp, store) = service();
        let now = Utc::now();

        let mut code1 = otp.issue_at("a@x.com", now).await.unwrap();
        let mut code2 = otp.issue_at("a@x.com", now).await.unwrap();
        // collisions are possible with 900k codes; reissue until distinct
        while code2 == code1 {
            code1 = code2;
            code2 = otp.issue_at("a@x.com", now).await.unwrap();
        }
        assert_eq!(store.len(), 1);

        assert!(matches!(
            otp.verify_at("a@x.com", &code1, now).await,
            Err(OtpError::InvalidCode)
        ));
        otp.verify_at("a@x.com", &code2, now).await.unwrap();
    }

    #[tokio::test]
    async fn code_is_single_use() {
        let (otp, store) = service();
        let now = Utc::now();
        let code = otp.issue_at("a@x.com", now).await.unwrap();

        otp.verify_at("a@x.com", &code, now).await.unwrap();
        assert_eq!(store.len(), 0);
        assert!(matches!(
            otp.verify_at("a@x.com", &code, now).await,
            Err(OtpError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn expiry_boundary() {
        let (otp, store) = service();
        let issued = Utc::now();
        let epsilon = Duration::milliseconds(1);

        let code = otp.issue_at("a@x.com", issued).await.unwrap();
        let late = issued + Duration::minutes(5) + epsilon;
        let err = otp.verify_at("a@x.com", &code, late).await.unwrap_err();
        assert!(matches!(err, OtpError::Expired));
        assert_eq!(err.to_string(), "OTP expired");
        // left in place for the sweep
        assert_eq!(store.len(), 1);

        let code = otp.issue_at("a@x.com", issued).await.unwrap();
        let just_in_time = issued + Duration::minutes(5) - epsilon;
        otp.verify_at("a@x.com", &code, just_in_time).await.unwrap();
    }

    #[tokio::test]
    async fn never_issued_is_invalid() {
        let (otp, _) = service();
        let err = otp.verify("b@y.com", "123456").await.unwrap_err();
        assert!(matches!(err, OtpError::InvalidCode));
        assert_eq!(err.to_string(), "Invalid OTP");
    }

    #[tokio::test]
    async fn email_is_normalized_on_both_sides() {
        let (otp, _) = service();
        let code = otp.issue("  A@X.com ").await.unwrap();
        otp.verify("a@x.COM", &format!(" {} ", code)).await.unwrap();
    }

    #[tokio::test]
    async fn codes_are_scoped_per_email() {
        let (otp, _) = service();
        let code = otp.issue("a@x.com").await.unwrap();
        assert!(matches!(
            otp.verify("b@y.com", &code).await,
            Err(OtpError::InvalidCode)
        ));
        otp.verify("a@x.com", &code).await.unwrap();
    }
}
