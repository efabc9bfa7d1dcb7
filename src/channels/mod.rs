//! Outbound channel collaborators.

pub mod email;
pub mod messaging;

pub use email::{DisabledEmailSender, EmailSender, SmtpConfig, SmtpEmailSender};
pub use messaging::{
    DisabledMessagingSender, HttpMessagingSender, MessagingConfig, MessagingSender,
};
