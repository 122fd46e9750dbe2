pub mod contact;
pub mod otp;

pub use contact::*;
pub use otp::*;
