//! External service clients/adapters.

pub mod mail;

pub use mail::{LoggingMailSendClient, MailSendClient, MailSendHistory, MailService};
