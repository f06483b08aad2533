use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bill::{Bill, BillId};
use crate::error::AlarmError;

/// Data carried with a registered wake-up so the dispatcher can still say
/// something useful if the store is unreachable when it fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderPayload {
    pub bill_id: BillId,
    pub name: String,
    pub amount: f64,
    pub due_date: String,
}

impl From<&Bill> for ReminderPayload {
    fn from(bill: &Bill) -> Self {
        Self {
            bill_id: bill.id,
            name: bill.name.clone(),
            amount: bill.amount,
            due_date: bill.due_date.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Timing {
    Exact,
    /// Best effort; the host may batch or delay delivery.
    Inexact,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timing::Exact => f.write_str("exact"),
            Timing::Inexact => f.write_str("inexact"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WakeupRequest {
    pub key: BillId,
    pub fire_at: NaiveDateTime,
    pub timing: Timing,
    pub payload: ReminderPayload,
}

/// Host alarm/timer facility. Registrations are keyed by bill id; registering
/// an existing key replaces it.
pub trait AlarmFacility: Send + Sync {
    fn register_wakeup(&self, request: WakeupRequest) -> Result<(), AlarmError>;
    /// Cancelling an unknown key is not an error.
    fn cancel_wakeup(&self, key: BillId) -> Result<(), AlarmError>;
    fn can_schedule_exact(&self) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub key: BillId,
    pub title: String,
    pub body: String,
}

/// User-visible alert channel provided by the host.
/// Emitting twice with the same key replaces the visible alert.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, notification: Notification);
}
