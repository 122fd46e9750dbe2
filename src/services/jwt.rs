use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: String, // User ID
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TokenError {
    #[error("Token has expired. Please login again.")]
    Expired,
    #[error("Invalid token. Please login again.")]
    Invalid,
    #[error("Failed to sign token")]
    Signing,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        }
    }
}

pub struct JwtService;

impl JwtService {
    pub fn generate_access_token(
        user_id: &str,
        email: &str,
        role: &str,
        expires_in_secs: i64,
    ) -> Result<String, TokenError> {
        Self::generate_with_secret(&crate::config::Config::jwt_secret(), user_id, email, role, expires_in_secs)
    }

    fn generate_with_secret(
        secret: &str,
        user_id: &str,
        email: &str,
        role: &str,
        expires_in_secs: i64,
    ) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            exp: now + expires_in_secs,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|_| TokenError::Signing)
    }

    pub fn verify_token(token: &str) -> Result<Claims, TokenError> {
        Self::verify_with_secret(&crate::config::Config::jwt_secret(), token)
    }

    fn verify_with_secret(secret: &str, token: &str) -> Result<Claims, TokenError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}
