use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use parking_lot::RwLock;

use crate::bill::{Bill, BillId, NewBill, DUE_DATE_FORMAT};
use crate::error::StoreError;

/// Outcome of [`BillStore::settle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The bill was unpaid and is now stored as paid, together with the
    /// successor row when one was supplied.
    Settled { next_id: Option<BillId> },
    /// Some other writer marked the bill paid first; nothing was written.
    AlreadyPaid,
}

/// Durable record store. The store is the only source of truth for bills;
/// every write must be atomic per record.
pub trait BillStore: Send + Sync {
    fn insert(&self, bill: &NewBill) -> Result<BillId, StoreError>;
    /// Fails with [`StoreError::NotFound`] when the id is unknown.
    fn update(&self, bill: &Bill) -> Result<(), StoreError>;
    /// Store `bill` as paid only if the stored row is still unpaid, inserting
    /// `next` in the same transaction. Fails with [`StoreError::NotFound`]
    /// when the id is unknown.
    fn settle(&self, bill: &Bill, next: Option<&NewBill>) -> Result<Settlement, StoreError>;
    /// Returns whether a row was removed.
    fn delete(&self, id: BillId) -> Result<bool, StoreError>;
    fn get(&self, id: BillId) -> Result<Option<Bill>, StoreError>;
    /// All bills ordered by due date.
    fn all(&self) -> Result<Vec<Bill>, StoreError>;
    /// Unpaid bills whose due date lies in `[today, today + days]`, ordered by
    /// due date.
    fn unpaid_due_within(&self, today: NaiveDate, days: u32) -> Result<Vec<Bill>, StoreError>;
}

/// Due-date window bounds as ISO strings, inclusive on both ends.
pub fn due_window(today: NaiveDate, days: u32) -> (String, String) {
    let end = today
        .checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX);
    (
        today.format(DUE_DATE_FORMAT).to_string(),
        end.format(DUE_DATE_FORMAT).to_string(),
    )
}

#[derive(Debug, Default)]
struct MemoryState {
    bills: BTreeMap<BillId, Bill>,
    last_id: BillId,
}

/// Process-local store, used by tests and hosts without persistence.
#[derive(Debug, Default)]
pub struct InMemoryBillStore {
    state: RwLock<MemoryState>,
}

impl InMemoryBillStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record verbatim, bypassing validation. Lets tests model rows
    /// written by older or foreign writers.
    pub fn insert_raw(&self, mut bill: Bill) -> BillId {
        let mut state = self.state.write();
        state.last_id += 1;
        bill.id = state.last_id;
        state.bills.insert(bill.id, bill);
        state.last_id
    }

    fn sorted(mut bills: Vec<Bill>) -> Vec<Bill> {
        bills.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        bills
    }
}

impl BillStore for InMemoryBillStore {
    fn insert(&self, bill: &NewBill) -> Result<BillId, StoreError> {
        let mut state = self.state.write();
        state.last_id += 1;
        let id = state.last_id;
        state.bills.insert(id, bill.clone().into_bill(id));
        Ok(id)
    }

    fn update(&self, bill: &Bill) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let slot = state
            .bills
            .get_mut(&bill.id)
            .ok_or(StoreError::NotFound(bill.id))?;
        *slot = bill.clone();
        Ok(())
    }

    fn settle(&self, bill: &Bill, next: Option<&NewBill>) -> Result<Settlement, StoreError> {
        let mut state = self.state.write();
        let slot = state
            .bills
            .get_mut(&bill.id)
            .ok_or(StoreError::NotFound(bill.id))?;
        if slot.is_paid {
            return Ok(Settlement::AlreadyPaid);
        }
        *slot = Bill {
            is_paid: true,
            ..bill.clone()
        };
        let next_id = next.map(|next| {
            state.last_id += 1;
            let id = state.last_id;
            state.bills.insert(id, next.clone().into_bill(id));
            id
        });
        Ok(Settlement::Settled { next_id })
    }

    fn delete(&self, id: BillId) -> Result<bool, StoreError> {
        Ok(self.state.write().bills.remove(&id).is_some())
    }

    fn get(&self, id: BillId) -> Result<Option<Bill>, StoreError> {
        Ok(self.state.read().bills.get(&id).cloned())
    }

    fn all(&self) -> Result<Vec<Bill>, StoreError> {
        let bills = self.state.read().bills.values().cloned().collect();
        Ok(Self::sorted(bills))
    }

    fn unpaid_due_within(&self, today: NaiveDate, days: u32) -> Result<Vec<Bill>, StoreError> {
        let (start, end) = due_window(today, days);
        let bills = self
            .state
            .read()
            .bills
            .values()
            .filter(|bill| !bill.is_paid)
            .filter(|bill| {
                bill.due_date.as_str() >= start.as_str() && bill.due_date.as_str() <= end.as_str()
            })
            .cloned()
            .collect();
        Ok(Self::sorted(bills))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn ids_are_never_reused() {
        let store = InMemoryBillStore::new();
        let first = store.insert(&NewBill::new("A", 1.0, date(2024, 1, 1))).unwrap();
        assert!(store.delete(first).unwrap());
        let second = store.insert(&NewBill::new("B", 1.0, date(2024, 1, 1))).unwrap();
        assert!(second > first);
        assert!(!store.delete(first).unwrap());
    }

    #[test]
    fn update_of_unknown_id_is_not_found() {
        let store = InMemoryBillStore::new();
        let ghost = NewBill::new("Ghost", 5.0, date(2024, 1, 1)).into_bill(42);
        assert!(matches!(store.update(&ghost), Err(StoreError::NotFound(42))));
    }

    #[test]
    fn settle_writes_once_and_adds_the_successor() {
        let store = InMemoryBillStore::new();
        let id = store.insert(&NewBill::new("Rent", 900.0, date(2024, 1, 31))).unwrap();
        let bill = store.get(id).unwrap().unwrap();
        let next = NewBill::new("Rent", 900.0, date(2024, 2, 29));

        let first = store.settle(&bill, Some(&next)).unwrap();
        let Settlement::Settled { next_id: Some(next_id) } = first else {
            panic!("expected a successor, got {first:?}");
        };
        assert!(store.get(id).unwrap().unwrap().is_paid);
        assert_eq!(store.get(next_id).unwrap().unwrap().due_date, "2024-02-29");

        assert_eq!(store.settle(&bill, Some(&next)).unwrap(), Settlement::AlreadyPaid);
        assert_eq!(store.all().unwrap().len(), 2);

        let ghost = NewBill::new("Ghost", 1.0, date(2024, 1, 1)).into_bill(99);
        assert!(matches!(store.settle(&ghost, None), Err(StoreError::NotFound(99))));
    }

    #[test]
    fn due_window_is_inclusive_and_skips_paid() {
        let store = InMemoryBillStore::new();
        let today = date(2024, 4, 1);
        store.insert(&NewBill::new("yesterday", 1.0, date(2024, 3, 31))).unwrap();
        store.insert(&NewBill::new("today", 1.0, today)).unwrap();
        store.insert(&NewBill::new("edge", 1.0, date(2024, 5, 1))).unwrap();
        store.insert(&NewBill::new("beyond", 1.0, date(2024, 5, 2))).unwrap();
        store
            .insert(&NewBill::new("paid", 1.0, date(2024, 4, 3)).paid(true))
            .unwrap();

        let names: Vec<String> = store
            .unpaid_due_within(today, 30)
            .unwrap()
            .into_iter()
            .map(|bill| bill.name)
            .collect();
        assert_eq!(names, vec!["today", "edge"]);
    }

    #[test]
    fn all_is_ordered_by_due_date() {
        let store = InMemoryBillStore::new();
        store.insert(&NewBill::new("late", 1.0, date(2024, 9, 1))).unwrap();
        store.insert(&NewBill::new("early", 1.0, date(2024, 2, 1))).unwrap();
        let all = store.all().unwrap();
        assert_eq!(all[0].name, "early");
        assert_eq!(all[1].name, "late");
    }
}
