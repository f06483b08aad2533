use std::sync::Arc;

use tracing::{debug, info};

use crate::advancer::{PayOutcome, RecurrenceAdvancer};
use crate::bill::{Bill, BillId, NewBill};
use crate::clock::{Clock, SystemClock};
use crate::config::ReminderConfig;
use crate::dispatcher::{DispatchOutcome, RecoveryReport, ReminderDispatcher};
use crate::error::{BillError, Result};
use crate::locks::BillLocks;
use crate::notifications::{AlarmFacility, NotificationSink, ReminderPayload};
use crate::overview::{self, BillFilter, BillSummary, SortOrder};
use crate::scheduler::ReminderScheduler;
use crate::store::BillStore;

/// Result of an edit: the stored bill plus the successor created when a
/// recurring bill was paid.
#[derive(Debug, Clone, PartialEq)]
pub struct BillUpdate {
    pub bill: Bill,
    pub next: Option<Bill>,
}

pub struct BillService {
    store: Arc<dyn BillStore>,
    scheduler: Arc<ReminderScheduler>,
    dispatcher: ReminderDispatcher,
    advancer: RecurrenceAdvancer,
    edits: BillLocks,
}

#[derive(Default)]
pub struct BillServiceBuilder {
    store: Option<Arc<dyn BillStore>>,
    alarms: Option<Arc<dyn AlarmFacility>>,
    notification_sink: Option<Arc<dyn NotificationSink>>,
    clock: Option<Arc<dyn Clock>>,
    config: ReminderConfig,
}

impl BillServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: Arc<dyn BillStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_alarm_facility(mut self, alarms: Arc<dyn AlarmFacility>) -> Self {
        self.alarms = Some(alarms);
        self
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_config(mut self, config: ReminderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<BillService> {
        let store = self.store.ok_or(BillError::MissingCollaborator("a bill store"))?;
        let alarms = self
            .alarms
            .ok_or(BillError::MissingCollaborator("an alarm facility"))?;
        let sink = self
            .notification_sink
            .ok_or(BillError::MissingCollaborator("a notification sink"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        self.config.validate()?;

        let scheduler = Arc::new(ReminderScheduler::new(alarms, clock, self.config));
        Ok(BillService {
            dispatcher: ReminderDispatcher::new(store.clone(), scheduler.clone(), sink),
            advancer: RecurrenceAdvancer::new(store.clone(), scheduler.clone()),
            store,
            scheduler,
            edits: BillLocks::new(),
        })
    }
}

impl BillService {
    pub fn builder() -> BillServiceBuilder {
        BillServiceBuilder::new()
    }

    pub fn scheduler(&self) -> &Arc<ReminderScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &ReminderConfig {
        self.scheduler.config()
    }

    pub fn add_bill(&self, bill: NewBill) -> Result<Bill> {
        let bill = bill.validate()?;
        let id = self.store.insert(&bill)?;
        let stored = bill.into_bill(id);
        info!(bill_id = id, name = %stored.name, due_date = %stored.due_date, "bill added");
        if !stored.is_paid {
            self.scheduler.schedule(&stored);
        }
        Ok(stored)
    }

    /// Persist an edit and bring the bill's reminder in line with it. Edits of
    /// one bill are applied one at a time.
    pub fn update_bill(&self, bill: Bill) -> Result<BillUpdate> {
        let bill = bill.validate()?;
        self.edits.with(bill.id, || self.apply_update(bill))
    }

    pub fn mark_paid(&self, id: BillId) -> Result<BillUpdate> {
        self.edits.with(id, || self.apply_payment(id))
    }

    /// Returns whether a row was removed. The reminder is cancelled either
    /// way.
    pub fn delete_bill(&self, id: BillId) -> Result<bool> {
        self.edits.with(id, || self.apply_delete(id))
    }

    pub fn get_bill(&self, id: BillId) -> Result<Option<Bill>> {
        Ok(self.store.get(id)?)
    }

    pub fn list_bills(&self, filter: BillFilter, order: SortOrder) -> Result<Vec<Bill>> {
        let today = self.scheduler.clock().today();
        let mut bills = overview::filter_bills(self.store.all()?, filter, today);
        overview::sort_bills(&mut bills, order, today, self.config().due_soon_days);
        Ok(bills)
    }

    pub fn summary(&self) -> Result<BillSummary> {
        let today = self.scheduler.clock().today();
        Ok(overview::summarize(&self.store.all()?, today))
    }

    pub fn handle_wakeup(&self, payload: &ReminderPayload) -> DispatchOutcome {
        self.dispatcher.on_wakeup(payload)
    }

    pub fn handle_restart(&self) -> RecoveryReport {
        self.dispatcher.on_restart()
    }

    pub fn resync_reminders(&self) -> RecoveryReport {
        self.dispatcher.resync_all()
    }

    fn apply_update(&self, bill: Bill) -> Result<BillUpdate> {
        let previous = self
            .store
            .get(bill.id)?
            .ok_or(BillError::NotFound(bill.id))?;
        if !previous.is_paid && bill.is_paid {
            return self.settle(bill);
        }
        self.store.update(&bill)?;
        debug!(bill_id = bill.id, "bill updated");
        match (previous.is_paid, bill.is_paid) {
            (true, false) => {
                self.scheduler.schedule(&bill);
            }
            (false, false) if previous != bill => {
                self.scheduler.reschedule(&bill);
            }
            _ => {}
        }
        Ok(BillUpdate { bill, next: None })
    }

    fn apply_payment(&self, id: BillId) -> Result<BillUpdate> {
        let bill = self.store.get(id)?.ok_or(BillError::NotFound(id))?;
        if bill.is_paid {
            debug!(bill_id = id, "bill already paid");
            return Ok(BillUpdate { bill, next: None });
        }
        self.settle(Bill {
            is_paid: true,
            ..bill
        })
    }

    fn apply_delete(&self, id: BillId) -> Result<bool> {
        let removed = self.store.delete(id);
        self.scheduler.cancel(id);
        let removed = removed?;
        info!(bill_id = id, removed, "bill deleted");
        Ok(removed)
    }

    /// Unpaid to paid. When another writer got there first the stored row is
    /// returned as is and this edit is dropped.
    fn settle(&self, bill: Bill) -> Result<BillUpdate> {
        match self.advancer.pay(&bill)? {
            PayOutcome::Paid { next } => {
                info!(bill_id = bill.id, next_id = ?next.as_ref().map(|n| n.id), "bill paid");
                Ok(BillUpdate { bill, next })
            }
            PayOutcome::AlreadyPaid => {
                let current = self.store.get(bill.id)?.ok_or(BillError::NotFound(bill.id))?;
                Ok(BillUpdate {
                    bill: current,
                    next: None,
                })
            }
        }
    }
}
