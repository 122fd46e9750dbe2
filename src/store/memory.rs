use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use mongodb::bson::{oid::ObjectId, DateTime};
use regex::RegexBuilder;

use super::{day_of, ContactStore, OtpStore, RateLimitStore, StoreError};
use crate::models::{
    ContactFilter, ContactMessage, ContactPage, ContactStats, ContactStatus, ContactUpdate,
    DailyCount, OtpRecord,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemoryOtpStore {
    records: Mutex<Vec<OtpRecord>>,
}

impl MemoryOtpStore {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }
}

#[rocket::async_trait]
impl OtpStore for MemoryOtpStore {
    async fn insert(&self, mut record: OtpRecord) -> Result<ObjectId, StoreError> {
        let id = ObjectId::new();
        record.id = Some(id);
        lock(&self.records).push(record);
        Ok(id)
    }

    async fn delete_all_for_email(&self, email: &str) -> Result<u64, StoreError> {
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|r| r.email != email);
        Ok((before - records.len()) as u64)
    }

    async fn find_by_email_and_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<Option<OtpRecord>, StoreError> {
        Ok(lock(&self.records)
            .iter()
            .find(|r| r.email == email && r.code == code)
            .cloned())
    }

    async fn delete_by_id(&self, id: &ObjectId) -> Result<bool, StoreError> {
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|r| r.id.as_ref() != Some(id));
        Ok(records.len() != before)
    }

    async fn purge_expired(&self, now: DateTime) -> Result<u64, StoreError> {
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|r| !r.is_expired_at(now));
        Ok((before - records.len()) as u64)
    }
}

/// Insertion-ordered message list.
#[derive(Default)]
pub struct MemoryContactStore {
    messages: Mutex<Vec<ContactMessage>>,
}

impl MemoryContactStore {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        lock(&self.messages).len()
    }
}

#[rocket::async_trait]
impl ContactStore for MemoryContactStore {
    async fn save(&self, mut message: ContactMessage) -> Result<ContactMessage, StoreError> {
        message.id = Some(ObjectId::new());
        lock(&self.messages).push(message.clone());
        Ok(message)
    }

    async fn list(&self, filter: &ContactFilter) -> Result<ContactPage, StoreError> {
        let search = match filter.search {
            Some(ref pattern) => Some(
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| StoreError::Malformed(e.to_string()))?,
            ),
            None => None,
        };

        let messages = lock(&self.messages);
        let mut matched: Vec<&ContactMessage> = messages
            .iter()
            .filter(|m| filter.include_spam || !m.is_spam)
            .filter(|m| filter.status.is_none_or(|s| m.status == s))
            .filter(|m| {
                search.as_ref().is_none_or(|re| {
                    [&m.name, &m.email, &m.subject, &m.message]
                        .iter()
                        .any(|field| re.is_match(field))
                })
            })
            .collect();

        // stable sort keeps insertion order between equal timestamps
        matched.sort_by_key(|m| m.created_at);
        if filter.newest_first {
            matched.reverse();
        }

        let total = matched.len() as u64;
        let page = matched
            .into_iter()
            .skip(filter.skip() as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect();

        Ok(ContactPage { messages: page, total })
    }

    async fn get(&self, id: &ObjectId) -> Result<Option<ContactMessage>, StoreError> {
        Ok(lock(&self.messages)
            .iter()
            .find(|m| m.id.as_ref() == Some(id))
            .cloned())
    }

    async fn update(
        &self,
        id: &ObjectId,
        update: &ContactUpdate,
        now: DateTime,
    ) -> Result<Option<ContactMessage>, StoreError> {
        let mut messages = lock(&self.messages);
        Ok(messages
            .iter_mut()
            .find(|m| m.id.as_ref() == Some(id))
            .map(|m| {
                m.apply(update, now);
                m.clone()
            }))
    }

    async fn delete(&self, id: &ObjectId) -> Result<bool, StoreError> {
        let mut messages = lock(&self.messages);
        let before = messages.len();
        messages.retain(|m| m.id.as_ref() != Some(id));
        Ok(messages.len() != before)
    }

    async fn stats(&self, since: DateTime) -> Result<ContactStats, StoreError> {
        let messages = lock(&self.messages);
        let mut stats = ContactStats::default();
        let mut days: BTreeMap<String, u64> = BTreeMap::new();

        for m in messages.iter() {
            if m.is_spam {
                stats.spam += 1;
                continue;
            }

            stats.total += 1;
            match m.status {
                ContactStatus::New => stats.new += 1,
                ContactStatus::Read => stats.read += 1,
                ContactStatus::Replied => stats.replied += 1,
                ContactStatus::Archived => stats.archived += 1,
            }

            if m.created_at >= since {
                *days.entry(day_of(m.created_at)).or_default() += 1;
            }
        }

        stats.recent_activity = days
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect();

        Ok(stats)
    }
}

#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: Mutex<HashMap<String, (i32, DateTime)>>,
}

impl MemoryRateLimitStore {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        lock(&self.windows).len()
    }
}

#[rocket::async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        limit: i32,
        window_ms: i64,
        now: DateTime,
    ) -> Result<bool, StoreError> {
        let window_expires = DateTime::from_millis(now.timestamp_millis() + window_ms);
        let mut windows = lock(&self.windows);

        // drop closed windows
        windows.retain(|_, (_, expires_at)| *expires_at >= now);

        let (count, _) = windows
            .entry(key.to_string())
            .or_insert((0, window_expires));

        if *count >= limit {
            return Ok(false);
        }
        *count += 1;
        Ok(true)
    }
}
