#[macro_use]
extern crate rocket;

mod config;
mod db;
mod guards;
mod models;
mod routes;
mod services;
mod store;
mod utils;

use dotenvy::dotenv;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::serde::json::{Value, json};
use rocket::{Build, Request, Response, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};

use crate::config::Config;
use crate::guards::AuthFailure;
use crate::guards::throttle::TOO_MANY_REQUESTS;
use crate::services::JwtService;
use crate::services::jwt::ADMIN_ROLE;

/* ----------------------------- CORS ----------------------------- */

pub struct Cors {
    origins: Vec<String>,
}

impl Cors {
    fn allows(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == "*" || o == origin)
    }
}

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        match request.headers().get_one("Origin") {
            Some(origin) if self.allows(origin) => {
                response.set_header(Header::new("Access-Control-Allow-Origin", origin.to_string()));
            }
            _ => return,
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, PATCH, DELETE, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- OPTIONS ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- ERRORS ----------------------------- */

fn error_body(message: &str) -> Value {
    json!({
        "success": false,
        "message": message
    })
}

#[catch(400)]
fn bad_request() -> Value {
    error_body("Bad request")
}

#[catch(401)]
fn unauthorized(req: &Request) -> Value {
    let AuthFailure(message) = req.local_cache(AuthFailure::default);
    error_body(message.as_deref().unwrap_or("Unauthorized"))
}

#[catch(403)]
fn forbidden(req: &Request) -> Value {
    let AuthFailure(message) = req.local_cache(AuthFailure::default);
    error_body(message.as_deref().unwrap_or("Forbidden"))
}

#[catch(404)]
fn not_found() -> Value {
    error_body("Resource not found")
}

#[catch(422)]
fn unprocessable() -> Value {
    error_body("Invalid request body")
}

#[catch(429)]
fn too_many_requests() -> Value {
    error_body(TOO_MANY_REQUESTS)
}

#[catch(500)]
fn internal_error() -> Value {
    error_body("Internal server error")
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/api/openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- SERVER ----------------------------- */

/// Routes, catchers and CORS; services are managed by [`db::init`].
pub fn server() -> Rocket<Build> {
    rocket::build()
        .attach(Cors {
            origins: Config::cors_origins(),
        })
        .mount("/", routes![options_handler])
        .mount(
            "/api",
            openapi_get_routes![
                // Health
                routes::health::health,
                // Contact
                routes::contact::send_otp,
                routes::contact::send_message,
                // Contact - Admin
                routes::contact::list_messages,
                routes::contact::get_stats,
                routes::contact::get_message,
                routes::contact::mark_read,
                routes::contact::update_message,
                routes::contact::reply_message,
                routes::contact::delete_message,
            ],
        )
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                too_many_requests,
                internal_error
            ],
        )
}

/* ----------------------------- LAUNCH ----------------------------- */

const ADMIN_TOKEN_USAGE: &str = "usage: portfolio-contact-api admin-token <email> [hours]";

/// Token lifetime for `[hours]`, 24 when omitted. `None` for anything unusable.
fn token_lifetime_secs(hours: Option<&str>) -> Option<i64> {
    let hours: i64 = match hours {
        Some(h) => h.trim().parse().ok()?,
        None => 24,
    };
    if hours <= 0 {
        return None;
    }
    hours.checked_mul(3600)
}

/// `admin-token <email> [hours]` prints a signed admin token instead of serving.
fn issue_admin_token(args: &[String]) -> i32 {
    let (Some(email), Some(lifetime)) = (
        args.first(),
        token_lifetime_secs(args.get(1).map(String::as_str)),
    ) else {
        eprintln!("{}", ADMIN_TOKEN_USAGE);
        return 2;
    };

    if !db::jwt_secret_ready(Config::jwt_secret_configured().as_deref(), Config::is_development()) {
        eprintln!("jwt_secret must be set outside the debug profile");
        return 1;
    }

    match JwtService::generate_access_token(email, email, ADMIN_ROLE, lifetime) {
        Ok(token) => {
            println!("{}", token);
            0
        }
        Err(e) => {
            eprintln!("failed to issue token: {}", e);
            1
        }
    }
}

#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    dotenv().ok();
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some((command, rest)) = args.split_first() {
        if command == "admin-token" {
            std::process::exit(issue_admin_token(rest));
        }
    }

    println!("🚀 Portfolio API running");
    println!("📚 Swagger UI → http://localhost:8000/api/docs");

    server()
        .attach(db::init())
        .attach(db::sweeper())
        .launch()
        .await?;

    Ok(())
}

#[cfg(test)]
pub mod testing {
    use std::sync::Arc;

    use rocket::{Build, Rocket};

    use crate::guards::RateLimiter;
    use crate::services::email::testing::RecordingMailer;
    use crate::services::{ContactGate, EmailService, Inbox, OtpService};
    use crate::store::Backends;

    /// The full server over in-memory stores and a recording mailer.
    pub fn app(mailer: Arc<RecordingMailer>, rate_limit: i32) -> Rocket<Build> {
        let backends = Backends::memory();
        let email = EmailService::new(mailer, "Owner", "owner@example.com", "https://example.com");
        let otp = OtpService::new(backends.otps, chrono::Duration::minutes(5));

        super::server()
            .manage(ContactGate::new(otp, backends.contacts.clone(), email.clone()))
            .manage(Inbox::new(backends.contacts, email))
            .manage(RateLimiter::new(
                backends.rate_limits,
                rate_limit,
                chrono::Duration::minutes(15),
            ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rocket::http::{Header, Status};
    use rocket::local::asynchronous::Client;

    use crate::services::email::testing::RecordingMailer;

    #[rocket::async_test]
    async fn health_and_docs_are_served() {
        let client = Client::tracked(super::testing::app(Arc::new(RecordingMailer::default()), 100))
            .await
            .unwrap();

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["status"], "OK");

        let response = client.get("/api/openapi.json").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[test]
    fn token_lifetime_rejects_overflow() {
        assert_eq!(super::token_lifetime_secs(None), Some(24 * 3600));
        assert_eq!(super::token_lifetime_secs(Some("2")), Some(7200));
        assert_eq!(super::token_lifetime_secs(Some(&i64::MAX.to_string())), None);
        assert_eq!(super::token_lifetime_secs(Some("0")), None);
        assert_eq!(super::token_lifetime_secs(Some("soon")), None);
    }

    #[test]
    fn admin_token_needs_an_email() {
        assert_eq!(super::issue_admin_token(&[]), 2);
        assert_eq!(
            super::issue_admin_token(&["owner@example.com".to_string(), "-1".to_string()]),
            2
        );
    }

    #[rocket::async_test]
    async fn unknown_routes_get_json_404() {
        let client = Client::tracked(super::testing::app(Arc::new(RecordingMailer::default()), 100))
            .await
            .unwrap();

        let response = client.get("/api/nope").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["success"], false);
    }

    #[rocket::async_test]
    async fn cors_echoes_allowed_origin_only() {
        let client = Client::tracked(super::testing::app(Arc::new(RecordingMailer::default()), 100))
            .await
            .unwrap();

        let response = client
            .get("/api/health")
            .header(Header::new("Origin", "http://localhost:3000"))
            .dispatch()
            .await;
        assert_eq!(
            response.headers().get_one("Access-Control-Allow-Origin"),
            Some("http://localhost:3000")
        );

        let response = client
            .get("/api/health")
            .header(Header::new("Origin", "https://evil.example"))
            .dispatch()
            .await;
        assert!(response.headers().get_one("Access-Control-Allow-Origin").is_none());
    }
}
