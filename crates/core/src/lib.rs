//! `kiosk-core`: shared building blocks for the kiosk domain crates.
//!
//! Pure domain primitives only: error model, identifiers, modelling traits and
//! time ranges. Storage and transport live in `kiosk-infra` / `kiosk-api`.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod time;
pub mod value_object;

pub use aggregate::AggregateRoot;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{MailSendHistoryId, OrderId};
pub use time::DateRange;
pub use value_object::ValueObject;
