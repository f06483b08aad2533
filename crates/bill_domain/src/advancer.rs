use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bill::{Bill, NewBill};
use crate::error::StoreError;
use crate::recurrence::next_due_date;
use crate::scheduler::ReminderScheduler;
use crate::store::{BillStore, Settlement};

#[derive(Debug, Clone, PartialEq)]
pub enum PayOutcome {
    /// This call marked the bill paid; `next` is the successor it created.
    Paid { next: Option<Bill> },
    AlreadyPaid,
}

/// The unpaid next instance of `bill`. `None` for one-off bills and for
/// bills whose due date cannot be read.
pub fn successor(bill: &Bill) -> Option<NewBill> {
    if !bill.is_recurring() {
        return None;
    }
    match bill.parsed_due_date() {
        Ok(due) => Some(NewBill {
            name: bill.name.clone(),
            amount: bill.amount,
            due_date: next_due_date(due, bill.recurrence),
            is_paid: false,
            recurrence: bill.recurrence,
        }),
        Err(err) => {
            warn!(bill_id = bill.id, %err, "cannot advance recurring bill");
            None
        }
    }
}

/// Settles bills and spawns the next instance of recurring ones.
pub struct RecurrenceAdvancer {
    store: Arc<dyn BillStore>,
    scheduler: Arc<ReminderScheduler>,
}

impl RecurrenceAdvancer {
    pub fn new(store: Arc<dyn BillStore>, scheduler: Arc<ReminderScheduler>) -> Self {
        Self { store, scheduler }
    }

    /// Mark `bill` paid and persist its successor in one store write, then
    /// cancel the bill's reminder and schedule the successor's. Only the
    /// caller that flips the stored row from unpaid creates a successor.
    pub fn pay(&self, bill: &Bill) -> Result<PayOutcome, StoreError> {
        let next = successor(bill);
        let settlement = self.store.settle(bill, next.as_ref())?;
        self.scheduler.cancel(bill.id);

        let Settlement::Settled { next_id } = settlement else {
            debug!(bill_id = bill.id, "bill was already paid");
            return Ok(PayOutcome::AlreadyPaid);
        };
        let created = next.zip(next_id).map(|(next, id)| next.into_bill(id));
        if let Some(created) = &created {
            info!(
                bill_id = bill.id,
                next_id = created.id,
                due_date = %created.due_date,
                "created next occurrence"
            );
            self.scheduler.schedule(created);
        }
        Ok(PayOutcome::Paid { next: created })
    }
}
