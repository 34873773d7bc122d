pub mod http;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::*;

pub use http::HttpAppointmentApi;
pub use memory::InMemoryAppointmentApi;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("slot no longer available: {0}")]
    Conflict(ConflictKind),
    #[error("rejected by appointment store ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            ApiError::Conflict(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Worth resubmitting unchanged. Conflicts never are: the slot is gone.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) | ApiError::Timeout(_) => true,
            ApiError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Error body sent by the appointment store.
#[derive(Debug, Deserialize)]
struct FailureBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Decode a non-success response. Conflict codes are recognised here and
/// nowhere else; store-specific spellings never travel further in.
pub fn decode_failure(status: u16, body: &str) -> ApiError {
    let parsed: Option<FailureBody> = serde_json::from_str(body).ok();
    let (error, message) = match parsed {
        Some(b) => (b.error, b.message),
        None => (None, None),
    };

    if let Some(kind) = error.as_deref().and_then(ConflictKind::from_code) {
        return ApiError::Conflict(kind);
    }

    let message = message
        .or(error)
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    if status == 404 {
        ApiError::NotFound(message)
    } else {
        ApiError::Rejected { status, message }
    }
}

/// Body of `PUT appointments/{id}/reschedule`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleBody {
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub duration_minutes: Minutes,
}

/// The authoritative appointment store. Implementations enforce
/// at-most-one booking per slot; callers only react to what they report.
#[async_trait]
pub trait AppointmentApi: Send + Sync {
    async fn working_hours(&self, business: &BusinessId) -> Result<WorkingHours, ApiError>;

    /// Booked appointments for a business, optionally narrowed to one date.
    async fn booked_slots(
        &self,
        business: &BusinessId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<BookedAppointment>, ApiError>;

    async fn create_appointment(&self, request: &BookingRequest) -> Result<Appointment, ApiError>;

    async fn reschedule_appointment(
        &self,
        id: &AppointmentId,
        date: NaiveDate,
        time: TimeOfDay,
        duration_minutes: Minutes,
    ) -> Result<Appointment, ApiError>;

    async fn cancel_appointment(&self, id: &AppointmentId) -> Result<(), ApiError>;
}
