use rocket::figment::{Figment, Profile, providers::{Env, Format, Toml}};
use rocket::Config as RocketConfig;
use std::env;

pub const DEFAULT_OTP_TTL_SECS: i64 = 5 * 60;

/// Signing key used when none is configured. Only accepted in the debug profile.
pub const DEV_JWT_SECRET: &str = "default-secret";

/// Which persistence backend the stores run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    MongoDb,
    Memory,
}

/// Same rule Rocket applies: `ROCKET_PROFILE`, else `debug`/`release` by build.
fn resolve_profile(requested: Option<String>) -> Profile {
    requested
        .filter(|p| !p.trim().is_empty())
        .map(|p| Profile::new(p.trim()))
        .unwrap_or(RocketConfig::DEFAULT_PROFILE)
}

fn storage_in(figment: &Figment) -> StorageBackend {
    let value: String = figment
        .extract_inner("storage")
        .unwrap_or_else(|_| "mongodb".to_string());

    match value.to_lowercase().as_str() {
        "memory" => StorageBackend::Memory,
        _ => StorageBackend::MongoDb,
    }
}

pub struct Config;

impl Config {
    fn profile() -> Profile {
        resolve_profile(env::var("ROCKET_PROFILE").ok())
    }

    fn figment_for(profile: &Profile) -> Figment {
        Figment::from(RocketConfig::default())
            .merge(Toml::file("Rocket.toml").nested())
            .select(profile.clone())
            .merge(Env::prefixed("ROCKET_"))
    }

    fn figment() -> Figment {
        Self::figment_for(&Self::profile())
    }

    pub fn is_development() -> bool {
        Self::profile() == RocketConfig::DEBUG_PROFILE
    }

    /// MongoDB unless `storage = "memory"` is set explicitly.
    pub fn storage() -> StorageBackend {
        storage_in(&Self::figment())
    }

    pub fn mongodb_uri() -> String {
        Self::figment()
            .extract_inner("mongodb_uri")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
    }

    pub fn mongodb_database() -> String {
        Self::figment()
            .extract_inner("mongodb_database")
            .unwrap_or_else(|_| "portfolio".to_string())
    }

    /// The configured signing key, if any non-blank one is set.
    pub fn jwt_secret_configured() -> Option<String> {
        Self::figment()
            .extract_inner::<String>("jwt_secret")
            .ok()
            .filter(|s| !s.trim().is_empty())
    }

    pub fn jwt_secret() -> String {
        Self::jwt_secret_configured().unwrap_or_else(|| DEV_JWT_SECRET.to_string())
    }

    pub fn mail_host() -> String {
        Self::figment()
            .extract_inner("mail_host")
            .unwrap_or_else(|_| "smtp.gmail.com".to_string())
    }

    pub fn mail_port() -> u16 {
        Self::figment()
            .extract_inner("mail_port")
            .unwrap_or(587)
    }

    pub fn mail_user() -> String {
        Self::figment()
            .extract_inner("mail_user")
            .unwrap_or_default()
    }

    pub fn mail_password() -> String {
        Self::figment()
            .extract_inner("mail_password")
            .unwrap_or_default()
    }

    pub fn mail_from_name() -> String {
        Self::figment()
            .extract_inner("mail_from_name")
            .unwrap_or_else(|_| "Portfolio Contact".to_string())
    }

    /// Sender address; falls back to the SMTP user like most relays expect.
    pub fn mail_from() -> String {
        Self::figment()
            .extract_inner("mail_from")
            .unwrap_or_else(|_| Self::mail_user())
    }

    /// Where new-message alerts go; defaults to the sender address.
    pub fn admin_email() -> String {
        Self::figment()
            .extract_inner("admin_email")
            .unwrap_or_else(|_| Self::mail_from())
    }

    pub fn site_url() -> String {
        Self::figment()
            .extract_inner("site_url")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
    }

    pub fn otp_ttl_secs() -> i64 {
        Self::figment()
            .extract_inner("otp_ttl_secs")
            .unwrap_or(DEFAULT_OTP_TTL_SECS)
    }

    pub fn otp_sweep_secs() -> u64 {
        Self::figment()
            .extract_inner("otp_sweep_secs")
            .unwrap_or(60)
    }

    pub fn rate_limit_max() -> i32 {
        Self::figment()
            .extract_inner("rate_limit_max")
            .unwrap_or(100)
    }

    pub fn rate_limit_window_secs() -> i64 {
        Self::figment()
            .extract_inner("rate_limit_window_secs")
            .unwrap_or(15 * 60)
    }

    pub fn cors_origins() -> Vec<String> {
        Self::figment()
            .extract_inner("cors_origins")
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3001".to_string(),
                ]
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_defaults_to_rockets_build_profile() {
        assert_eq!(resolve_profile(None), RocketConfig::DEFAULT_PROFILE);
        assert_eq!(resolve_profile(Some("  ".to_string())), RocketConfig::DEFAULT_PROFILE);
        if cfg!(debug_assertions) {
            assert_eq!(resolve_profile(None), RocketConfig::DEBUG_PROFILE);
        } else {
            assert_eq!(resolve_profile(None), RocketConfig::RELEASE_PROFILE);
        }
    }

    #[test]
    fn explicit_profile_wins() {
        assert_eq!(resolve_profile(Some("release".to_string())), RocketConfig::RELEASE_PROFILE);
    }

    #[test]
    fn memory_storage_is_opt_in() {
        let release = Config::figment_for(&RocketConfig::RELEASE_PROFILE);
        assert_eq!(storage_in(&release), StorageBackend::MongoDb);

        let debug = Config::figment_for(&RocketConfig::DEBUG_PROFILE);
        assert_eq!(storage_in(&debug), StorageBackend::MongoDb);

        let opted_in = Figment::new().merge(("storage", "Memory"));
        assert_eq!(storage_in(&opted_in), StorageBackend::Memory);
    }
}
