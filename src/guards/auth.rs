use rocket::request::{self, FromRequest, Request, Outcome};
use rocket::http::Status;
use log::warn;

// === OpenAPI (compatible with rocket_okapi 0.8.0 / 0.8.1) ===
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use rocket_okapi::r#gen::OpenApiGenerator;

use crate::services::jwt::{JwtService, ADMIN_ROLE};

/// Why the admin guard rejected a request; read back by the 401/403 catchers.
#[derive(Debug, Clone, Default)]
pub struct AuthFailure(pub Option<String>);

/// JWT-based guard for the site owner's endpoints.
pub struct AdminGuard {
    pub user_id: String,
    pub email: String,
}

/// Bearer header first, then a `token` cookie, then a `token` query parameter.
fn token_from(req: &Request<'_>) -> Option<String> {
    if let Some(header) = req.headers().get_one("Authorization") {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    if let Some(cookie) = req.cookies().get("token") {
        return Some(cookie.value().to_string());
    }

    req.query_value::<String>("token").and_then(Result::ok)
}

fn reject<'r>(req: &'r Request<'_>, status: Status, message: impl Into<String>) -> Outcome<AdminGuard, ()> {
    let message = message.into();
    req.local_cache(|| AuthFailure(Some(message)));
    Outcome::Error((status, ()))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let Some(token) = token_from(req).filter(|t| !t.is_empty()) else {
            return reject(req, Status::Unauthorized, "Access denied. No token provided.");
        };

        match JwtService::verify_token(&token) {
            Ok(claims) if claims.role == ADMIN_ROLE => Outcome::Success(AdminGuard {
                user_id: claims.sub,
                email: claims.email,
            }),
            Ok(claims) => {
                warn!("Rejected non-admin token for {}", claims.email);
                reject(req, Status::Forbidden, "Access denied. Insufficient permissions.")
            }
            Err(e) => reject(req, Status::Unauthorized, e.to_string()),
        }
    }
}

/// === OpenAPI Integration (Fallback for older versions) ===
/// The guard doesn't contribute any special header/parameter for docs.
impl<'a> OpenApiFromRequest<'a> for AdminGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
