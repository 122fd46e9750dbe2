use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

/// One issued passcode. Only the newest record per email is ever usable.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OtpRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub code: String,
    pub expires_at: DateTime,
    pub created_at: DateTime,
}

impl OtpRecord {
    /// Expired strictly after `expires_at`.
    pub fn is_expired_at(&self, now: DateTime) -> bool {
        self.expires_at < now
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SendOtpDto {
    #[serde(default)]
    pub email: String,
    pub name: Option<String>,
}
