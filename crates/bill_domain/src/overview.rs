//! List views over stored bills: sorting, filtering and the dashboard
//! summary.

use std::cmp::Ordering;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::bill::Bill;
use crate::status::days_until_due;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    DueDate,
    /// Largest amount first.
    Amount,
    Name,
    /// Overdue, due today, due soon, upcoming, then paid.
    Status,
}

/// Selection criteria; the enabled criteria are OR-ed together and an empty
/// filter selects everything.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BillFilter {
    pub unpaid: bool,
    pub overdue: bool,
    pub this_month: bool,
}

impl BillFilter {
    pub fn all() -> Self {
        Self::default()
    }

    fn selects_all(&self) -> bool {
        !(self.unpaid || self.overdue || self.this_month)
    }

    pub fn matches(&self, bill: &Bill, today: NaiveDate) -> bool {
        if self.selects_all() {
            return true;
        }
        let due = bill.parsed_due_date().ok();
        (self.unpaid && !bill.is_paid)
            || (self.overdue && is_overdue(bill, today))
            || (self.this_month && due.is_some_and(|due| same_month(due, today)))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BillSummary {
    /// Sum of unpaid amounts due in the current calendar month.
    pub month_total: f64,
    pub overdue_count: usize,
    pub unpaid_count: usize,
    pub total_count: usize,
}

pub fn summarize(bills: &[Bill], today: NaiveDate) -> BillSummary {
    let mut summary = BillSummary {
        total_count: bills.len(),
        ..BillSummary::default()
    };
    for bill in bills.iter().filter(|bill| !bill.is_paid) {
        summary.unpaid_count += 1;
        let Ok(due) = bill.parsed_due_date() else {
            continue;
        };
        if due < today {
            summary.overdue_count += 1;
        }
        if same_month(due, today) {
            summary.month_total += bill.amount;
        }
    }
    summary
}

pub fn filter_bills(bills: Vec<Bill>, filter: BillFilter, today: NaiveDate) -> Vec<Bill> {
    bills
        .into_iter()
        .filter(|bill| filter.matches(bill, today))
        .collect()
}

pub fn sort_bills(bills: &mut [Bill], order: SortOrder, today: NaiveDate, due_soon_days: i64) {
    match order {
        SortOrder::DueDate => bills.sort_by(compare_due),
        SortOrder::Amount => bills.sort_by(|a, b| {
            b.amount
                .partial_cmp(&a.amount)
                .unwrap_or(Ordering::Equal)
                .then_with(|| compare_due(a, b))
        }),
        SortOrder::Name => bills.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| compare_due(a, b))
        }),
        SortOrder::Status => bills.sort_by(|a, b| {
            a.status(today, due_soon_days)
                .cmp(&b.status(today, due_soon_days))
                .then_with(|| compare_due(a, b))
        }),
    }
}

/// Days left until the bill is due, for "N days remaining" labels.
pub fn days_remaining(bill: &Bill, today: NaiveDate) -> Option<i64> {
    bill.parsed_due_date()
        .ok()
        .map(|due| days_until_due(due, today))
}

fn is_overdue(bill: &Bill, today: NaiveDate) -> bool {
    !bill.is_paid && bill.parsed_due_date().is_ok_and(|due| due < today)
}

fn same_month(due: NaiveDate, today: NaiveDate) -> bool {
    due.year() == today.year() && due.month() == today.month()
}

/// Parseable dates first in calendar order, unreadable ones after.
fn compare_due(a: &Bill, b: &Bill) -> Ordering {
    match (a.parsed_due_date().ok(), b.parsed_due_date().ok()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.due_date.cmp(&b.due_date),
    }
    .then(a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::NewBill;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2024, 5, 15)
    }

    fn fixture() -> Vec<Bill> {
        let mut gas = NewBill::new("gas", 60.0, date(2024, 5, 20)).into_bill(4);
        gas.is_paid = true;
        let mut legacy = NewBill::new("Legacy", 5.0, date(2024, 5, 1)).into_bill(6);
        legacy.due_date = "n/a".into();
        vec![
            NewBill::new("Rent", 900.0, date(2024, 6, 1)).into_bill(1),
            NewBill::new("water", 30.0, date(2024, 5, 10)).into_bill(2),
            NewBill::new("Phone", 25.0, date(2024, 5, 15)).into_bill(3),
            gas,
            NewBill::new("Internet", 40.0, date(2024, 5, 17)).into_bill(5),
            legacy,
        ]
    }

    fn ids(bills: &[Bill]) -> Vec<i64> {
        bills.iter().map(|bill| bill.id).collect()
    }

    #[test]
    fn summary_counts_overdue_and_month_total() {
        let summary = summarize(&fixture(), today());
        assert_eq!(summary.overdue_count, 1);
        assert_eq!(summary.month_total, 30.0 + 25.0 + 40.0);
        assert_eq!(summary.unpaid_count, 5);
        assert_eq!(summary.total_count, 6);
    }

    #[test]
    fn sorts_by_each_order() {
        let mut bills = fixture();
        sort_bills(&mut bills, SortOrder::DueDate, today(), 3);
        assert_eq!(ids(&bills), vec![2, 3, 5, 4, 1, 6]);

        sort_bills(&mut bills, SortOrder::Amount, today(), 3);
        assert_eq!(ids(&bills), vec![1, 4, 5, 2, 3, 6]);

        sort_bills(&mut bills, SortOrder::Name, today(), 3);
        assert_eq!(ids(&bills), vec![4, 5, 6, 3, 1, 2]);

        sort_bills(&mut bills, SortOrder::Status, today(), 3);
        assert_eq!(ids(&bills), vec![2, 3, 5, 1, 6, 4]);
    }

    #[test]
    fn filters_combine_with_or() {
        let overdue = BillFilter {
            overdue: true,
            ..BillFilter::default()
        };
        assert_eq!(ids(&filter_bills(fixture(), overdue, today())), vec![2]);

        let month_or_overdue = BillFilter {
            overdue: true,
            this_month: true,
            ..BillFilter::default()
        };
        assert_eq!(
            ids(&filter_bills(fixture(), month_or_overdue, today())),
            vec![2, 3, 4, 5]
        );

        let unpaid = BillFilter {
            unpaid: true,
            ..BillFilter::default()
        };
        assert_eq!(ids(&filter_bills(fixture(), unpaid, today())), vec![1, 2, 3, 5, 6]);
        assert_eq!(filter_bills(fixture(), BillFilter::all(), today()).len(), 6);
    }

    #[test]
    fn days_remaining_for_labels() {
        let bills = fixture();
        assert_eq!(days_remaining(&bills[0], today()), Some(17));
        assert_eq!(days_remaining(&bills[1], today()), Some(-5));
        assert_eq!(days_remaining(&bills[5], today()), None);
    }
}
