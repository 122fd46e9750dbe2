use std::time::Duration;

use mongodb::bson::{self, doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Collection, Database, IndexModel};
use rocket::futures::TryStreamExt;

use super::{ContactStore, OtpStore, RateLimitStore, StoreError};
use crate::models::{
    ContactFilter, ContactMessage, ContactPage, ContactStats, ContactStatus, ContactUpdate,
    DailyCount, OtpRecord,
};

const OTPS: &str = "otps";
const CONTACTS: &str = "contacts";
const RATE_LIMITS: &str = "rate_limits";

/// TTL index: MongoDB drops documents once `field` is in the past.
fn expiry_index(field: &str, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(doc! { field: 1 })
        .options(
            IndexOptions::builder()
                .expire_after(Duration::from_secs(0))
                .name(name.to_string())
                .build(),
        )
        .build()
}

fn index(keys: Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

/// --------------------
/// OTP records
/// --------------------
pub struct MongoOtpStore {
    collection: Collection<OtpRecord>,
}

impl MongoOtpStore {
    pub fn new(db: &Database) -> Self {
        MongoOtpStore {
            collection: db.collection::<OtpRecord>(OTPS),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        self.collection
            .create_indexes(
                [
                    expiry_index("expires_at", "otp_expiry"),
                    index(doc! { "email": 1, "code": 1 }),
                ],
                None,
            )
            .await?;
        Ok(())
    }
}

#[rocket::async_trait]
impl OtpStore for MongoOtpStore {
    async fn insert(&self, record: OtpRecord) -> Result<ObjectId, StoreError> {
        let res = self.collection.insert_one(&record, None).await?;
        res.inserted_id
            .as_object_id()
            .ok_or_else(|| StoreError::Malformed("inserted OTP id is not an ObjectId".to_string()))
    }

    async fn delete_all_for_email(&self, email: &str) -> Result<u64, StoreError> {
        let res = self
            .collection
            .delete_many(doc! { "email": email }, None)
            .await?;
        Ok(res.deleted_count)
    }

    async fn find_by_email_and_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<Option<OtpRecord>, StoreError> {
        Ok(self
            .collection
            .find_one(doc! { "email": email, "code": code }, None)
            .await?)
    }

    async fn delete_by_id(&self, id: &ObjectId) -> Result<bool, StoreError> {
        let res = self.collection.delete_one(doc! { "_id": id }, None).await?;
        Ok(res.deleted_count > 0)
    }

    async fn purge_expired(&self, now: DateTime) -> Result<u64, StoreError> {
        let res = self
            .collection
            .delete_many(doc! { "expires_at": { "$lt": now } }, None)
            .await?;
        Ok(res.deleted_count)
    }
}

/// --------------------
/// Contact messages
/// --------------------
pub struct MongoContactStore {
    collection: Collection<ContactMessage>,
}

impl MongoContactStore {
    pub fn new(db: &Database) -> Self {
        MongoContactStore {
            collection: db.collection::<ContactMessage>(CONTACTS),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        self.collection
            .create_indexes(
                [
                    index(doc! { "created_at": -1 }),
                    index(doc! { "email": 1 }),
                    index(doc! { "status": 1 }),
                ],
                None,
            )
            .await?;
        Ok(())
    }

    fn filter_document(filter: &ContactFilter) -> Document {
        let mut query = doc! {};

        if !filter.include_spam {
            query.insert("is_spam", false);
        }
        if let Some(status) = filter.status {
            query.insert("status", status.as_str());
        }
        if let Some(ref pattern) = filter.search {
            let any_field: Vec<Document> = ["name", "email", "subject", "message"]
                .into_iter()
                .map(|field| doc! { field: { "$regex": pattern.as_str(), "$options": "i" } })
                .collect();
            query.insert("$or", any_field);
        }

        query
    }

    async fn count(&self, query: Document) -> Result<u64, StoreError> {
        Ok(self.collection.count_documents(query, None).await?)
    }
}

fn as_count(value: Option<&Bson>) -> u64 {
    match value {
        Some(Bson::Int32(n)) => (*n).max(0) as u64,
        Some(Bson::Int64(n)) => (*n).max(0) as u64,
        _ => 0,
    }
}

#[rocket::async_trait]
impl ContactStore for MongoContactStore {
    async fn save(&self, mut message: ContactMessage) -> Result<ContactMessage, StoreError> {
        let res = self.collection.insert_one(&message, None).await?;
        message.id = Some(res.inserted_id.as_object_id().ok_or_else(|| {
            StoreError::Malformed("inserted contact id is not an ObjectId".to_string())
        })?);
        Ok(message)
    }

    async fn list(&self, filter: &ContactFilter) -> Result<ContactPage, StoreError> {
        let query = Self::filter_document(filter);
        let direction = if filter.newest_first { -1 } else { 1 };

        let options = FindOptions::builder()
            .sort(doc! { "created_at": direction, "_id": direction })
            .skip(filter.skip())
            .limit(filter.limit as i64)
            .build();

        let messages: Vec<ContactMessage> = self
            .collection
            .find(query.clone(), options)
            .await?
            .try_collect()
            .await?;

        let total = self.count(query).await?;

        Ok(ContactPage { messages, total })
    }

    async fn get(&self, id: &ObjectId) -> Result<Option<ContactMessage>, StoreError> {
        Ok(self.collection.find_one(doc! { "_id": id }, None).await?)
    }

    async fn update(
        &self,
        id: &ObjectId,
        update: &ContactUpdate,
        now: DateTime,
    ) -> Result<Option<ContactMessage>, StoreError> {
        let mut set = doc! { "updated_at": now };

        if let Some(status) = update.status {
            set.insert("status", status.as_str());
        }
        if let Some(is_spam) = update.is_spam {
            set.insert("is_spam", is_spam);
        }
        if let Some(read_at) = update.read_at {
            set.insert("read_at", read_at);
        }
        if let Some(ref reply) = update.reply {
            let reply = bson::to_bson(reply).map_err(|e| StoreError::Malformed(e.to_string()))?;
            set.insert("reply", reply);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        Ok(self
            .collection
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set }, options)
            .await?)
    }

    async fn delete(&self, id: &ObjectId) -> Result<bool, StoreError> {
        let res = self.collection.delete_one(doc! { "_id": id }, None).await?;
        Ok(res.deleted_count > 0)
    }

    async fn stats(&self, since: DateTime) -> Result<ContactStats, StoreError> {
        let mut stats = ContactStats {
            total: self.count(doc! { "is_spam": false }).await?,
            spam: self.count(doc! { "is_spam": true }).await?,
            ..Default::default()
        };

        for status in ContactStatus::ALL {
            let n = self
                .count(doc! { "status": status.as_str(), "is_spam": false })
                .await?;
            match status {
                ContactStatus::New => stats.new = n,
                ContactStatus::Read => stats.read = n,
                ContactStatus::Replied => stats.replied = n,
                ContactStatus::Archived => stats.archived = n,
            }
        }

        let pipeline = [
            doc! { "$match": { "created_at": { "$gte": since }, "is_spam": false } },
            doc! {
                "$group": {
                    "_id": { "$dateToString": { "format": "%Y-%m-%d", "date": "$created_at" } },
                    "count": { "$sum": 1 }
                }
            },
            doc! { "$sort": { "_id": 1 } },
        ];

        let days: Vec<Document> = self
            .collection
            .aggregate(pipeline, None)
            .await?
            .try_collect()
            .await?;

        stats.recent_activity = days
            .iter()
            .map(|d| DailyCount {
                date: d.get_str("_id").unwrap_or_default().to_string(),
                count: as_count(d.get("count")),
            })
            .collect();

        Ok(stats)
    }
}

/// --------------------
/// Fixed-window rate limits
/// --------------------
pub struct MongoRateLimitStore {
    collection: Collection<Document>,
}

impl MongoRateLimitStore {
    pub fn new(db: &Database) -> Self {
        MongoRateLimitStore {
            collection: db.collection::<Document>(RATE_LIMITS),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        self.collection
            .create_indexes(
                [
                    expiry_index("expires_at", "rate_limit_expiry"),
                    index(doc! { "key": 1 }),
                ],
                None,
            )
            .await?;
        Ok(())
    }
}

#[rocket::async_trait]
impl RateLimitStore for MongoRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        limit: i32,
        window_ms: i64,
        now: DateTime,
    ) -> Result<bool, StoreError> {
        let window_expires = DateTime::from_millis(now.timestamp_millis() + window_ms);

        let current = self.collection.find_one(doc! { "key": key }, None).await?;

        match current {
            // First request
            None => {
                self.collection
                    .insert_one(
                        doc! {
                            "key": key,
                            "count": 1,
                            "expires_at": window_expires
                        },
                        None,
                    )
                    .await?;
                Ok(true)
            }

            Some(d) => {
                let count = d.get_i32("count").unwrap_or(0);
                let expires_at = d.get_datetime("expires_at").ok();

                // Window expired → reset
                if expires_at.map(|e| *e < now).unwrap_or(true) {
                    self.collection
                        .update_one(
                            doc! { "key": key },
                            doc! {
                                "$set": {
                                    "count": 1,
                                    "expires_at": window_expires
                                }
                            },
                            None,
                        )
                        .await?;
                    return Ok(true);
                }

                if count >= limit {
                    return Ok(false);
                }

                self.collection
                    .update_one(doc! { "key": key }, doc! { "$inc": { "count": 1 } }, None)
                    .await?;

                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_document_excludes_spam_by_default() {
        let query = MongoContactStore::filter_document(&ContactFilter::default());
        assert_eq!(query, doc! { "is_spam": false });
    }

    #[test]
    fn filter_document_combines_status_and_search() {
        let filter = ContactFilter {
            status: Some(ContactStatus::Read),
            search: Some("ada".to_string()),
            include_spam: true,
            ..Default::default()
        };
        let query = MongoContactStore::filter_document(&filter);

        assert_eq!(query.get_str("status").unwrap(), "read");
        assert!(query.get("is_spam").is_none());
        assert_eq!(query.get_array("$or").unwrap().len(), 4);
    }

    #[test]
    fn aggregate_counts_accept_either_width() {
        assert_eq!(as_count(Some(&Bson::Int32(3))), 3);
        assert_eq!(as_count(Some(&Bson::Int64(4))), 4);
        assert_eq!(as_count(None), 0);
    }
}
