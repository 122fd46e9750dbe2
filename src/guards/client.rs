use std::convert::Infallible;

use rocket::request::{self, FromRequest, Request, Outcome};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use rocket_okapi::r#gen::OpenApiGenerator;

use crate::models::ClientInfo;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientInfo {
    type Error = Infallible;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let header = |name: &str| {
            req.headers()
                .get_one(name)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Outcome::Success(ClientInfo {
            ip_address: req.client_ip().map(|ip| ip.to_string()),
            user_agent: header("User-Agent"),
            referrer: header("Referer"),
        })
    }
}

impl<'a> OpenApiFromRequest<'a> for ClientInfo {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
