use log::{error, info};
use mongodb::bson::oid::ObjectId;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use validator::Validate;

use crate::guards::{AdminGuard, Throttle};
use crate::models::{
    ClientInfo, ContactFilter, ContactListResponse, ContactQuery, ContactResponse, ContactStats,
    Pagination, ReplyDto, SendOtpDto, SubmissionResponse, SubmitContactDto, UpdateContactDto,
};
use crate::services::{ContactGate, GateError, Inbox, InboxError, OtpError};
use crate::utils::validation::validation_messages;
use crate::utils::{ApiError, ApiResponse};

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::MissingEmail | GateError::InvalidEmail => ApiError::bad_request(e.to_string()),
            GateError::InvalidForm(errors) => ApiError::validation(errors),
            GateError::Otp(OtpError::InvalidCode | OtpError::Expired) => {
                ApiError::bad_request(e.to_string())
            }
            GateError::Otp(OtpError::Store(_)) | GateError::Delivery(_) | GateError::Persistence(_) => {
                error!("Contact gate failure: {}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<InboxError> for ApiError {
    fn from(e: InboxError) -> Self {
        match e {
            InboxError::NotFound => ApiError::not_found(e.to_string()),
            InboxError::EmptyUpdate => ApiError::bad_request(e.to_string()),
            InboxError::Delivery(_) => {
                error!("Inbox failure: {}", e);
                ApiError::internal_error("Failed to send reply")
            }
            InboxError::Store(_) => {
                error!("Inbox failure: {}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

fn parse_id(id: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(id).map_err(|_| ApiError::bad_request("Invalid message ID"))
}

/// --------------------
/// Request OTP
/// --------------------
#[openapi(tag = "Contact")]
#[post("/contact/otp", data = "<dto>")]
pub async fn send_otp(
    _throttle: Throttle,
    gate: &State<ContactGate>,
    dto: Json<SendOtpDto>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    gate.request_code(&dto.email, dto.name.as_deref())
        .await
        .map_err(|e| match ApiError::from(e) {
            err if err.status == Status::InternalServerError => {
                ApiError::internal_error("Failed to send OTP")
            }
            err => err,
        })?;

    Ok(Json(ApiResponse::message("OTP sent to email")))
}

/// --------------------
/// Verify OTP + submit message
/// --------------------
#[openapi(tag = "Contact")]
#[post("/contact/send", data = "<dto>")]
pub async fn send_message(
    _throttle: Throttle,
    client: ClientInfo,
    gate: &State<ContactGate>,
    dto: Json<SubmitContactDto>,
) -> Result<Json<ApiResponse<SubmissionResponse>>, ApiError> {
    let contact = gate.submit(dto.into_inner(), client).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Message sent successfully. Thank you for reaching out!",
        SubmissionResponse {
            message_id: contact.id.map(|id| id.to_hex()).unwrap_or_default(),
            status: contact.status,
        },
    )))
}

/// --------------------
/// Admin: list messages
/// --------------------
#[openapi(tag = "Contact - Admin")]
#[get("/contact?<query..>")]
pub async fn list_messages(
    _admin: AdminGuard,
    inbox: &State<Inbox>,
    query: ContactQuery,
) -> Result<Json<ApiResponse<ContactListResponse>>, ApiError> {
    let filter = ContactFilter::try_from(query).map_err(ApiError::bad_request)?;
    let page = inbox.list(&filter).await?;

    Ok(Json(ApiResponse::success(ContactListResponse {
        pagination: Pagination::new(filter.page, filter.limit, page.total),
        messages: page.messages.into_iter().map(ContactResponse::from).collect(),
    })))
}

#[openapi(tag = "Contact - Admin")]
#[get("/contact/stats/overview")]
pub async fn get_stats(
    _admin: AdminGuard,
    inbox: &State<Inbox>,
) -> Result<Json<ApiResponse<ContactStats>>, ApiError> {
    Ok(Json(ApiResponse::success(inbox.stats().await?)))
}

#[openapi(tag = "Contact - Admin")]
#[get("/contact/<id>")]
pub async fn get_message(
    _admin: AdminGuard,
    inbox: &State<Inbox>,
    id: &str,
) -> Result<Json<ApiResponse<ContactResponse>>, ApiError> {
    let contact = inbox.get(&parse_id(id)?).await?;
    Ok(Json(ApiResponse::success(contact.into())))
}

#[openapi(tag = "Contact - Admin")]
#[put("/contact/<id>/read")]
pub async fn mark_read(
    _admin: AdminGuard,
    inbox: &State<Inbox>,
    id: &str,
) -> Result<Json<ApiResponse<ContactResponse>>, ApiError> {
    let contact = inbox.mark_read(&parse_id(id)?).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Message marked as read",
        contact.into(),
    )))
}

#[openapi(tag = "Contact - Admin")]
#[patch("/contact/<id>", data = "<dto>")]
pub async fn update_message(
    _admin: AdminGuard,
    inbox: &State<Inbox>,
    id: &str,
    dto: Json<UpdateContactDto>,
) -> Result<Json<ApiResponse<ContactResponse>>, ApiError> {
    let id = parse_id(id)?;
    let contact = inbox.update(&id, dto.status, dto.is_spam).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Message updated successfully",
        contact.into(),
    )))
}

#[openapi(tag = "Contact - Admin")]
#[post("/contact/<id>/reply", data = "<dto>")]
pub async fn reply_message(
    admin: AdminGuard,
    inbox: &State<Inbox>,
    id: &str,
    dto: Json<ReplyDto>,
) -> Result<Json<ApiResponse<ContactResponse>>, ApiError> {
    let id = parse_id(id)?;
    let dto = ReplyDto {
        reply_message: dto.reply_message.trim().to_string(),
    };
    dto.validate()
        .map_err(|e| ApiError::validation(validation_messages(&e)))?;

    let contact = inbox.reply(&id, &dto.reply_message).await?;
    info!("{} replied to message {}", admin.email, id.to_hex());

    Ok(Json(ApiResponse::success_with_message(
        "Reply sent successfully",
        contact.into(),
    )))
}

#[openapi(tag = "Contact - Admin")]
#[delete("/contact/<id>")]
pub async fn delete_message(
    _admin: AdminGuard,
    inbox: &State<Inbox>,
    id: &str,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    inbox.delete(&parse_id(id)?).await?;
    Ok(Json(ApiResponse::message("Message deleted successfully")))
}
