mod attempt;
mod coordinator;
mod error;
mod validation;

pub use attempt::{AttemptKind, AttemptState, BookingAttempt};
pub use coordinator::{BookingCoordinator, CoordinatorSettings};
pub use error::BookingError;
pub use validation::{validate_date, validate_duration, BookingDraft, ValidationError};
