use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DueDateError, ValidationError};
use crate::recurrence::Recurrence;
use crate::status::{self, DueStatus};

pub type BillId = i64;

/// ISO-8601 calendar date format used for persistence and ordering.
pub const DUE_DATE_FORMAT: &str = "%Y-%m-%d";
/// Display format for dates in lists and notifications, e.g. `05 Mar 2024`.
pub const DISPLAY_DATE_FORMAT: &str = "%d %b %Y";

/// One obligation instance. Recurring bills form a chain of instances, each
/// paid independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bill {
    pub id: BillId,
    pub name: String,
    pub amount: f64,
    /// Stored as text; may fail to parse if the record was written by
    /// something other than this crate.
    pub due_date: String,
    pub is_paid: bool,
    pub recurrence: Recurrence,
}

/// A bill that has not been persisted yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBill {
    pub name: String,
    pub amount: f64,
    pub due_date: NaiveDate,
    pub is_paid: bool,
    pub recurrence: Recurrence,
}

impl NewBill {
    pub fn new(name: impl Into<String>, amount: f64, due_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            amount,
            due_date,
            is_paid: false,
            recurrence: Recurrence::None,
        }
    }

    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = recurrence;
        self
    }

    pub fn paid(mut self, is_paid: bool) -> Self {
        self.is_paid = is_paid;
        self
    }

    /// Trim the name and check the invariants every stored bill must hold.
    pub fn validate(mut self) -> Result<Self, ValidationError> {
        self.name = validate_name(&self.name)?;
        validate_amount(self.amount)?;
        validate_recurrence(self.recurrence)?;
        Ok(self)
    }

    pub fn into_bill(self, id: BillId) -> Bill {
        Bill {
            id,
            name: self.name,
            amount: self.amount,
            due_date: self.due_date.format(DUE_DATE_FORMAT).to_string(),
            is_paid: self.is_paid,
            recurrence: self.recurrence,
        }
    }
}

impl Bill {
    pub fn parsed_due_date(&self) -> Result<NaiveDate, DueDateError> {
        parse_due_date(&self.due_date)
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_recurring()
    }

    /// Status tier for `today`. An unparseable due date classifies as
    /// [`DueStatus::Upcoming`] unless the bill is paid.
    pub fn status(&self, today: NaiveDate, due_soon_days: i64) -> DueStatus {
        if self.is_paid {
            return DueStatus::Paid;
        }
        match self.parsed_due_date() {
            Ok(due) => status::classify_with(due, false, today, due_soon_days),
            Err(err) => {
                tracing::warn!(bill_id = self.id, %err, "classifying bill with unreadable due date as upcoming");
                DueStatus::Upcoming
            }
        }
    }

    pub fn formatted_amount(&self, currency_suffix: &str) -> String {
        format_amount(self.amount, currency_suffix)
    }

    /// Display form of the due date, or the raw stored text if it cannot be
    /// parsed.
    pub fn formatted_due_date(&self) -> String {
        match self.parsed_due_date() {
            Ok(due) => due.format(DISPLAY_DATE_FORMAT).to_string(),
            Err(_) => self.due_date.clone(),
        }
    }

    /// Checks the same invariants as [`NewBill::validate`] plus due date
    /// parseability, for edits arriving from the UI.
    pub fn validate(mut self) -> Result<Self, ValidationError> {
        self.name = validate_name(&self.name)?;
        validate_amount(self.amount)?;
        if self.due_date.trim().is_empty() {
            return Err(ValidationError::MissingDueDate);
        }
        let due = parse_due_date(&self.due_date)?;
        self.due_date = due.format(DUE_DATE_FORMAT).to_string();
        validate_recurrence(self.recurrence)?;
        Ok(self)
    }
}

pub fn parse_due_date(raw: &str) -> Result<NaiveDate, DueDateError> {
    NaiveDate::parse_from_str(raw.trim(), DUE_DATE_FORMAT).map_err(|err| DueDateError {
        raw: raw.to_string(),
        reason: err.to_string(),
    })
}

pub fn format_amount(amount: f64, currency_suffix: &str) -> String {
    if currency_suffix.is_empty() {
        format!("{amount:.2}")
    } else {
        format!("{amount:.2} {currency_suffix}")
    }
}

fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(trimmed.to_string())
}

fn validate_amount(amount: f64) -> Result<(), ValidationError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::InvalidAmount(amount));
    }
    Ok(())
}

fn validate_recurrence(recurrence: Recurrence) -> Result<(), ValidationError> {
    if recurrence.is_recurring() && recurrence.interval() == 0 {
        return Err(ValidationError::ZeroInterval);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn validate_trims_name_and_rejects_bad_input() {
        let bill = NewBill::new("  Rent ", 950.0, date(2024, 3, 1))
            .validate()
            .expect("valid bill");
        assert_eq!(bill.name, "Rent");

        assert_eq!(
            NewBill::new("   ", 10.0, date(2024, 3, 1)).validate(),
            Err(ValidationError::EmptyName)
        );
        assert!(matches!(
            NewBill::new("Water", 0.0, date(2024, 3, 1)).validate(),
            Err(ValidationError::InvalidAmount(_))
        ));
        assert!(matches!(
            NewBill::new("Water", f64::NAN, date(2024, 3, 1)).validate(),
            Err(ValidationError::InvalidAmount(_))
        ));
        assert_eq!(
            NewBill::new("Gym", 30.0, date(2024, 3, 1))
                .with_recurrence(Recurrence::Monthly(0))
                .validate(),
            Err(ValidationError::ZeroInterval)
        );
    }

    #[test]
    fn edited_bill_requires_parseable_due_date() {
        let mut bill = NewBill::new("Phone", 25.0, date(2024, 6, 9)).into_bill(3);
        bill.due_date = String::new();
        assert_eq!(bill.clone().validate(), Err(ValidationError::MissingDueDate));
        bill.due_date = "2024-13-40".into();
        assert!(matches!(bill.validate(), Err(ValidationError::DueDate(_))));
    }

    #[test]
    fn into_bill_stores_iso_date() {
        let bill = NewBill::new("Internet", 39.99, date(2024, 7, 5)).into_bill(7);
        assert_eq!(bill.id, 7);
        assert_eq!(bill.due_date, "2024-07-05");
        assert_eq!(bill.parsed_due_date().unwrap(), date(2024, 7, 5));
        assert!(!bill.is_paid);
    }

    #[test]
    fn formats_amount_and_date_for_display() {
        let bill = NewBill::new("Electricity", 120.5, date(2024, 3, 5)).into_bill(1);
        assert_eq!(bill.formatted_amount("DH"), "120.50 DH");
        assert_eq!(bill.formatted_amount(""), "120.50");
        assert_eq!(bill.formatted_due_date(), "05 Mar 2024");
    }

    #[test]
    fn unreadable_due_date_falls_back() {
        let mut bill = NewBill::new("Legacy", 10.0, date(2024, 3, 5)).into_bill(1);
        bill.due_date = "05/03/2024".into();
        assert!(bill.parsed_due_date().is_err());
        assert_eq!(bill.formatted_due_date(), "05/03/2024");
        assert_eq!(bill.status(date(2024, 3, 5), 3), DueStatus::Upcoming);
        bill.is_paid = true;
        assert_eq!(bill.status(date(2024, 3, 5), 3), DueStatus::Paid);
    }
}
