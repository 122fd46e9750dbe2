use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use std::str::FromStr;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    New,
    Read,
    Replied,
    Archived,
}

impl ContactStatus {
    pub const ALL: [ContactStatus; 4] = [
        ContactStatus::New,
        ContactStatus::Read,
        ContactStatus::Replied,
        ContactStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::New => "new",
            ContactStatus::Read => "read",
            ContactStatus::Replied => "replied",
            ContactStatus::Archived => "archived",
        }
    }
}

impl FromStr for ContactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("{} is not a valid status", s))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContactReply {
    pub message: String,
    pub replied_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContactMessage {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub status: ContactStatus,
    pub is_spam: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub read_at: Option<DateTime>,
    pub reply: Option<ContactReply>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Request metadata recorded alongside a submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

impl ContactMessage {
    pub fn new(form: &SubmitContactDto, client: ClientInfo, now: DateTime) -> Self {
        ContactMessage {
            id: None,
            name: form.name.clone(),
            email: form.email.clone(),
            subject: form.subject.clone(),
            message: form.message.clone(),
            status: ContactStatus::New,
            is_spam: false,
            ip_address: client.ip_address,
            user_agent: client.user_agent,
            referrer: client.referrer,
            read_at: None,
            reply: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a patch in place, bumping `updated_at`.
    pub fn apply(&mut self, update: &ContactUpdate, now: DateTime) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(is_spam) = update.is_spam {
            self.is_spam = is_spam;
        }
        if let Some(read_at) = update.read_at {
            self.read_at = Some(read_at);
        }
        if let Some(ref reply) = update.reply {
            self.reply = Some(reply.clone());
        }
        self.updated_at = now;
    }
}

/// Partial update of a stored message; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactUpdate {
    pub status: Option<ContactStatus>,
    pub is_spam: Option<bool>,
    pub read_at: Option<DateTime>,
    pub reply: Option<ContactReply>,
}

impl ContactUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.is_spam.is_none()
            && self.read_at.is_none()
            && self.reply.is_none()
    }
}

// ---------------- Requests ----------------

#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
pub struct SubmitContactDto {
    #[serde(default)]
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[serde(default)]
    pub otp: String,
    #[serde(default)]
    #[validate(length(min = 5, max = 200, message = "Subject must be between 5 and 200 characters"))]
    pub subject: String,
    #[serde(default)]
    #[validate(length(min = 10, max = 1000, message = "Message must be between 10 and 1000 characters"))]
    pub message: String,
}

impl SubmitContactDto {
    /// Trims every field and normalizes the email before validation.
    pub fn normalized(self) -> Self {
        SubmitContactDto {
            name: self.name.trim().to_string(),
            email: crate::utils::normalize_email(&self.email),
            otp: self.otp.trim().to_string(),
            subject: self.subject.trim().to_string(),
            message: self.message.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateContactDto {
    pub status: Option<ContactStatus>,
    pub is_spam: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct ReplyDto {
    #[serde(default)]
    #[validate(length(min = 1, max = 5000, message = "Reply message must be between 1 and 5000 characters"))]
    pub reply_message: String,
}

#[derive(Debug, FromForm, Deserialize, JsonSchema)]
pub struct ContactQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub include_spam: Option<bool>,
    pub sort: Option<String>,
}

// ---------------- Listing ----------------

pub const DEFAULT_PAGE_LIMIT: u64 = 10;
pub const MAX_PAGE_LIMIT: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ContactFilter {
    pub status: Option<ContactStatus>,
    /// Already escaped; matched case-insensitively.
    pub search: Option<String>,
    pub include_spam: bool,
    pub newest_first: bool,
    pub page: u64,
    pub limit: u64,
}

impl Default for ContactFilter {
    fn default() -> Self {
        ContactFilter {
            status: None,
            search: None,
            include_spam: false,
            newest_first: true,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl ContactFilter {
    /// Saturates instead of overflowing; capped so MongoDB still accepts it as an i64.
    pub fn skip(&self) -> u64 {
        self.page
            .saturating_sub(1)
            .saturating_mul(self.limit)
            .min(i64::MAX as u64)
    }
}

impl TryFrom<ContactQuery> for ContactFilter {
    type Error = String;

    fn try_from(query: ContactQuery) -> Result<Self, Self::Error> {
        let status = match query.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(s) => Some(s.parse::<ContactStatus>()?),
        };

        let newest_first = match query.sort.as_deref().map(str::trim) {
            None | Some("") | Some("newest") | Some("-createdAt") => true,
            Some("oldest") | Some("createdAt") => false,
            Some(other) => return Err(format!("{} is not a valid sort order", other)),
        };

        Ok(ContactFilter {
            status,
            search: query.search.as_deref().and_then(crate::utils::validation::search_pattern),
            include_spam: query.include_spam.unwrap_or(false),
            newest_first,
            page: query.page.unwrap_or(1).max(1),
            limit: query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ContactPage {
    pub messages: Vec<ContactMessage>,
    pub total: u64,
}

#[derive(Debug, Serialize, JsonSchema, PartialEq)]
pub struct Pagination {
    pub current: u64,
    pub pages: u64,
    pub total: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let pages = total.div_ceil(limit.max(1));
        Pagination {
            current: page,
            pages,
            total,
            has_next: page < pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema, Clone, PartialEq, Eq)]
pub struct DailyCount {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Serialize, JsonSchema, Clone, Default, PartialEq, Eq)]
pub struct ContactStats {
    pub total: u64,
    pub new: u64,
    pub read: u64,
    pub replied: u64,
    pub archived: u64,
    pub spam: u64,
    pub recent_activity: Vec<DailyCount>,
}

// ---------------- Responses ----------------

#[derive(Debug, Serialize, JsonSchema)]
pub struct ReplyResponse {
    pub message: String,
    pub replied_at: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ContactResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub status: ContactStatus,
    pub is_spam: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub read_at: Option<String>,
    pub reply: Option<ReplyResponse>,
    pub created_at: String,
    pub updated_at: String,
}

fn rfc3339(at: DateTime) -> String {
    at.try_to_rfc3339_string().unwrap_or_default()
}

impl From<ContactMessage> for ContactResponse {
    fn from(contact: ContactMessage) -> Self {
        ContactResponse {
            id: contact.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: contact.name,
            email: contact.email,
            subject: contact.subject,
            message: contact.message,
            status: contact.status,
            is_spam: contact.is_spam,
            ip_address: contact.ip_address,
            user_agent: contact.user_agent,
            referrer: contact.referrer,
            read_at: contact.read_at.map(rfc3339),
            reply: contact.reply.map(|r| ReplyResponse {
                message: r.message,
                replied_at: rfc3339(r.replied_at),
            }),
            created_at: rfc3339(contact.created_at),
            updated_at: rfc3339(contact.updated_at),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ContactListResponse {
    pub messages: Vec<ContactResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SubmissionResponse {
    pub message_id: String,
    pub status: ContactStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> ContactQuery {
        ContactQuery {
            page: None,
            limit: None,
            status: None,
            search: None,
            include_spam: None,
            sort: None,
        }
    }

    #[test]
    fn query_defaults() {
        let filter = ContactFilter::try_from(query()).unwrap();
        assert_eq!(filter, ContactFilter::default());
    }

    #[test]
    fn query_clamps_paging_and_parses_status() {
        let filter = ContactFilter::try_from(ContactQuery {
            page: Some(0),
            limit: Some(500),
            status: Some("Replied".to_string()),
            sort: Some("oldest".to_string()),
            ..query()
        })
        .unwrap();

        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, MAX_PAGE_LIMIT);
        assert_eq!(filter.status, Some(ContactStatus::Replied));
        assert!(!filter.newest_first);
    }

    #[test]
    fn huge_page_does_not_overflow_skip() {
        let filter = ContactFilter::try_from(ContactQuery {
            page: Some(u64::MAX),
            limit: Some(MAX_PAGE_LIMIT),
            ..query()
        })
        .unwrap();

        assert_eq!(filter.skip(), i64::MAX as u64);
        assert_eq!(ContactFilter { page: 3, ..Default::default() }.skip(), 20);
    }

    #[test]
    fn query_all_status_means_no_filter() {
        let filter = ContactFilter::try_from(ContactQuery {
            status: Some("all".to_string()),
            ..query()
        })
        .unwrap();
        assert_eq!(filter.status, None);
    }

    #[test]
    fn query_rejects_unknown_status() {
        let err = ContactFilter::try_from(ContactQuery {
            status: Some("pending".to_string()),
            ..query()
        })
        .unwrap_err();
        assert_eq!(err, "pending is not a valid status");
    }

    #[test]
    fn pagination_metadata() {
        assert_eq!(
            Pagination::new(2, 10, 25),
            Pagination { current: 2, pages: 3, total: 25, has_next: true, has_prev: true }
        );
        assert_eq!(
            Pagination::new(1, 10, 0),
            Pagination { current: 1, pages: 0, total: 0, has_next: false, has_prev: false }
        );
    }

    #[test]
    fn submission_is_trimmed_before_validation() {
        let dto = SubmitContactDto {
            name: "  Ada  ".to_string(),
            email: " Ada@Example.COM ".to_string(),
            otp: " 123456 ".to_string(),
            subject: "Hello there".to_string(),
            message: "  too short ".to_string(),
        }
        .normalized();

        assert_eq!(dto.name, "Ada");
        assert_eq!(dto.email, "ada@example.com");
        assert_eq!(dto.otp, "123456");
        assert_eq!(dto.message, "too short");
        // 9 chars once trimmed
        assert!(dto.validate().is_err());
    }
}
