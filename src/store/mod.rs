//! Persistence seams. Services only see these traits; MongoDB backs them in
//! production and the in-memory versions back local development and tests.

pub mod memory;
pub mod mongo;

use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, DateTime};
use mongodb::Database;

use crate::models::{ContactFilter, ContactMessage, ContactPage, ContactStats, ContactUpdate, OtpRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("malformed document: {0}")]
    Malformed(String),
}

#[rocket::async_trait]
pub trait OtpStore: Send + Sync {
    async fn insert(&self, record: OtpRecord) -> Result<ObjectId, StoreError>;

    async fn delete_all_for_email(&self, email: &str) -> Result<u64, StoreError>;

    async fn find_by_email_and_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<Option<OtpRecord>, StoreError>;

    async fn delete_by_id(&self, id: &ObjectId) -> Result<bool, StoreError>;

    /// Removes every record whose `expires_at` lies before `now`.
    async fn purge_expired(&self, now: DateTime) -> Result<u64, StoreError>;
}

#[rocket::async_trait]
pub trait ContactStore: Send + Sync {
    /// Persists a new message and returns it with its id assigned.
    async fn save(&self, message: ContactMessage) -> Result<ContactMessage, StoreError>;

    async fn list(&self, filter: &ContactFilter) -> Result<ContactPage, StoreError>;

    async fn get(&self, id: &ObjectId) -> Result<Option<ContactMessage>, StoreError>;

    /// Applies `update` and returns the updated message, `None` when absent.
    async fn update(
        &self,
        id: &ObjectId,
        update: &ContactUpdate,
        now: DateTime,
    ) -> Result<Option<ContactMessage>, StoreError>;

    async fn delete(&self, id: &ObjectId) -> Result<bool, StoreError>;

    /// Status and spam counts plus per-day activity since `since`.
    async fn stats(&self, since: DateTime) -> Result<ContactStats, StoreError>;
}

#[rocket::async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records one hit for `key` in a fixed window. Returns `false` once
    /// `limit` hits have already been counted in the current window.
    async fn hit(
        &self,
        key: &str,
        limit: i32,
        window_ms: i64,
        now: DateTime,
    ) -> Result<bool, StoreError>;
}

/// The set of stores the services run against.
#[derive(Clone)]
pub struct Backends {
    pub otps: Arc<dyn OtpStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
}

impl Backends {
    pub fn memory() -> Self {
        Backends {
            otps: Arc::new(memory::MemoryOtpStore::default()),
            contacts: Arc::new(memory::MemoryContactStore::default()),
            rate_limits: Arc::new(memory::MemoryRateLimitStore::default()),
        }
    }

    /// MongoDB-backed stores; creates the collection indexes first.
    pub async fn mongo(db: &Database) -> Result<Self, StoreError> {
        let otps = mongo::MongoOtpStore::new(db);
        let contacts = mongo::MongoContactStore::new(db);
        let rate_limits = mongo::MongoRateLimitStore::new(db);

        otps.ensure_indexes().await?;
        contacts.ensure_indexes().await?;
        rate_limits.ensure_indexes().await?;

        Ok(Backends {
            otps: Arc::new(otps),
            contacts: Arc::new(contacts),
            rate_limits: Arc::new(rate_limits),
        })
    }
}

/// `YYYY-MM-DD` (UTC) bucket for activity stats.
pub(crate) fn day_of(at: DateTime) -> String {
    chrono::DateTime::from_timestamp_millis(at.timestamp_millis())
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
