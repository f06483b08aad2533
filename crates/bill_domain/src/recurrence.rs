use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

pub const RECURRENCE_NONE: i64 = 0;
pub const RECURRENCE_DAILY: i64 = 1;
pub const RECURRENCE_WEEKLY: i64 = 2;
pub const RECURRENCE_MONTHLY: i64 = 3;
pub const RECURRENCE_YEARLY: i64 = 4;

/// How a paid bill spawns its next instance. The payload is the interval in
/// units of the variant.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Recurrence {
    #[default]
    None,
    Daily(u32),
    Weekly(u32),
    Monthly(u32),
    Yearly(u32),
}

impl Recurrence {
    /// Rebuild a rule from its persisted `(recurrence_type, recurrence_interval)`
    /// columns.
    pub fn from_parts(code: i64, interval: i64) -> Result<Self, ValidationError> {
        if code == RECURRENCE_NONE {
            return Ok(Recurrence::None);
        }
        if interval < 1 {
            return Err(ValidationError::ZeroInterval);
        }
        let interval = u32::try_from(interval).unwrap_or(u32::MAX);
        match code {
            RECURRENCE_DAILY => Ok(Recurrence::Daily(interval)),
            RECURRENCE_WEEKLY => Ok(Recurrence::Weekly(interval)),
            RECURRENCE_MONTHLY => Ok(Recurrence::Monthly(interval)),
            RECURRENCE_YEARLY => Ok(Recurrence::Yearly(interval)),
            other => Err(ValidationError::UnknownRecurrence(other)),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Recurrence::None => RECURRENCE_NONE,
            Recurrence::Daily(_) => RECURRENCE_DAILY,
            Recurrence::Weekly(_) => RECURRENCE_WEEKLY,
            Recurrence::Monthly(_) => RECURRENCE_MONTHLY,
            Recurrence::Yearly(_) => RECURRENCE_YEARLY,
        }
    }

    /// Interval column value; `1` for non-recurring bills.
    pub fn interval(&self) -> u32 {
        match self {
            Recurrence::None => 1,
            Recurrence::Daily(n)
            | Recurrence::Weekly(n)
            | Recurrence::Monthly(n)
            | Recurrence::Yearly(n) => *n,
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, Recurrence::None)
    }

    /// Parse a compact token such as `none`, `1d`, `+2w`, `3m` or `1y`.
    pub fn parse_token(token: &str) -> Option<Self> {
        let normalized = token.trim().trim_start_matches('+');
        if normalized.eq_ignore_ascii_case("none") {
            return Some(Recurrence::None);
        }
        let unit = normalized.chars().last()?;
        let value_part = &normalized[..normalized.len() - unit.len_utf8()];
        let quantity: u32 = if value_part.is_empty() {
            1
        } else {
            value_part.parse().ok()?
        };
        let quantity = quantity.max(1);
        match unit {
            'd' | 'D' => Some(Recurrence::Daily(quantity)),
            'w' | 'W' => Some(Recurrence::Weekly(quantity)),
            'm' | 'M' => Some(Recurrence::Monthly(quantity)),
            'y' | 'Y' => Some(Recurrence::Yearly(quantity)),
            _ => None,
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recurrence::None => write!(f, "none"),
            Recurrence::Daily(n) => write!(f, "every {n} day(s)"),
            Recurrence::Weekly(n) => write!(f, "every {n} week(s)"),
            Recurrence::Monthly(n) => write!(f, "every {n} month(s)"),
            Recurrence::Yearly(n) => write!(f, "every {n} year(s)"),
        }
    }
}

/// Next due date of a recurring bill.
///
/// `Recurrence::None` returns `due` unchanged; callers treat that as "no next
/// occurrence". Month and year steps keep the day of month when it exists in
/// the target month and otherwise clamp to the month's last day, so
/// 2024-01-31 + 1 month is 2024-02-29 and 2024-02-29 + 1 year is 2025-02-28.
/// Results past the representable calendar saturate to `NaiveDate::MAX`.
pub fn next_due_date(due: NaiveDate, recurrence: Recurrence) -> NaiveDate {
    let next = match recurrence {
        Recurrence::None => return due,
        Recurrence::Daily(n) => due.checked_add_days(Days::new(u64::from(n.max(1)))),
        Recurrence::Weekly(n) => due.checked_add_days(Days::new(7 * u64::from(n.max(1)))),
        Recurrence::Monthly(n) => due.checked_add_months(Months::new(n.max(1))),
        Recurrence::Yearly(n) => due.checked_add_months(Months::new(n.max(1).saturating_mul(12))),
    };
    next.unwrap_or(NaiveDate::MAX)
}
