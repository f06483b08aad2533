use thiserror::Error;

use crate::bill::BillId;

/// Rejections raised at the input boundary. A bill that fails validation is
/// never persisted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("bill name is required")]
    EmptyName,
    #[error("amount must be a positive number, got {0}")]
    InvalidAmount(f64),
    #[error("due date is required")]
    MissingDueDate,
    #[error(transparent)]
    DueDate(#[from] DueDateError),
    #[error("recurrence interval must be at least 1")]
    ZeroInterval,
    #[error("unknown recurrence type code {0}")]
    UnknownRecurrence(i64),
}

/// A stored due date that is not a valid `YYYY-MM-DD` calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid due date `{raw}`: {reason}")]
pub struct DueDateError {
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bill {0} does not exist")]
    NotFound(BillId),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A reminder setting outside the range the scheduler can work with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("catch_up_delay_minutes must be between 0 and {max}, got {value}")]
    CatchUpDelay { value: i64, max: i64 },
    #[error("catch_up_window_days must not be negative, got {0}")]
    CatchUpWindow(i64),
    #[error("due_soon_days must not be negative, got {0}")]
    DueSoonDays(i64),
}

/// Failures reported by the host alarm facility.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlarmError {
    #[error("exact alarm permission denied")]
    ExactDenied,
    #[error("alarm facility unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by [`crate::service::BillService`]. Reminder scheduling
/// problems are logged, never returned.
#[derive(Debug, Error)]
pub enum BillError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("bill {0} not found")]
    NotFound(BillId),
    #[error(transparent)]
    Store(StoreError),
    #[error("bill service requires {0}")]
    MissingCollaborator(&'static str),
    #[error("invalid reminder configuration: {0}")]
    Config(#[from] ConfigError),
}

impl From<StoreError> for BillError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => BillError::NotFound(id),
            other => BillError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, BillError>;
