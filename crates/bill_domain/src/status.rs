use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bills due within this many days (but not today) are "due soon".
pub const DEFAULT_DUE_SOON_DAYS: i64 = 3;

/// Urgency tier of a bill. Declaration order is the display priority used
/// when sorting by status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DueStatus {
    Overdue,
    DueToday,
    DueSoon,
    Upcoming,
    Paid,
}

impl DueStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DueStatus::Overdue => "overdue",
            DueStatus::DueToday => "due today",
            DueStatus::DueSoon => "due soon",
            DueStatus::Upcoming => "upcoming",
            DueStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for DueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whole calendar days from `today` to `due`; negative when overdue.
pub fn days_until_due(due: NaiveDate, today: NaiveDate) -> i64 {
    due.signed_duration_since(today).num_days()
}

pub fn classify(due: NaiveDate, is_paid: bool, today: NaiveDate) -> DueStatus {
    classify_with(due, is_paid, today, DEFAULT_DUE_SOON_DAYS)
}

pub fn classify_with(
    due: NaiveDate,
    is_paid: bool,
    today: NaiveDate,
    due_soon_days: i64,
) -> DueStatus {
    if is_paid {
        return DueStatus::Paid;
    }
    match days_until_due(due, today) {
        days if days < 0 => DueStatus::Overdue,
        0 => DueStatus::DueToday,
        days if days <= due_soon_days => DueStatus::DueSoon,
        _ => DueStatus::Upcoming,
    }
}
