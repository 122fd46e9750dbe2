pub mod email;
pub mod gate;
pub mod inbox;
pub mod jwt;
pub mod otp;

pub use email::{EmailService, LogMailer, Mailer, SmtpMailer};
pub use gate::{ContactGate, GateError};
pub use inbox::{Inbox, InboxError};
pub use jwt::JwtService;
pub use otp::{OtpError, OtpService};
