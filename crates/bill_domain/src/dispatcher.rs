//! Handles wake-ups delivered by the host: fired reminders and restart
//! recovery.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bill::{format_amount, parse_due_date, Bill, DISPLAY_DATE_FORMAT};
use crate::config::ReminderConfig;
use crate::notifications::{Notification, NotificationSink, ReminderPayload};
use crate::scheduler::{ReminderScheduler, ScheduleOutcome};
use crate::store::BillStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered(Notification),
    /// The bill was deleted after its reminder was registered.
    SuppressedMissing,
    /// The bill was paid after its reminder was registered.
    SuppressedPaid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub examined: usize,
    pub scheduled: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RecoveryReport {
    fn record(&mut self, outcome: &ScheduleOutcome) {
        self.examined += 1;
        match outcome {
            ScheduleOutcome::Scheduled { .. } => self.scheduled += 1,
            ScheduleOutcome::Failed(_) => self.failed += 1,
            _ => self.skipped += 1,
        }
    }
}

pub struct ReminderDispatcher {
    store: Arc<dyn BillStore>,
    scheduler: Arc<ReminderScheduler>,
    sink: Arc<dyn NotificationSink>,
}

impl ReminderDispatcher {
    pub fn new(
        store: Arc<dyn BillStore>,
        scheduler: Arc<ReminderScheduler>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            scheduler,
            sink,
        }
    }

    /// A registered wake-up fired. Current store data wins over the payload;
    /// the payload is only used when the store cannot be read.
    pub fn on_wakeup(&self, payload: &ReminderPayload) -> DispatchOutcome {
        let config = self.scheduler.config();
        let notification = match self.store.get(payload.bill_id) {
            Ok(Some(bill)) if bill.is_paid => {
                debug!(bill_id = bill.id, "reminder fired for a paid bill; suppressed");
                return DispatchOutcome::SuppressedPaid;
            }
            Ok(Some(bill)) => notification_for_bill(&bill, config),
            Ok(None) => {
                debug!(bill_id = payload.bill_id, "reminder fired for a deleted bill; suppressed");
                return DispatchOutcome::SuppressedMissing;
            }
            Err(err) => {
                warn!(bill_id = payload.bill_id, %err, "store unreadable; notifying from payload");
                notification_for_payload(payload, config)
            }
        };
        self.sink.emit(notification.clone());
        DispatchOutcome::Delivered(notification)
    }

    /// Rebuild alarms lost on restart from the unpaid bills due inside the
    /// recovery window.
    pub fn on_restart(&self) -> RecoveryReport {
        let config = self.scheduler.config();
        let today = self.scheduler.clock().today();
        let bills = match self
            .store
            .unpaid_due_within(today, config.recovery_window_days)
        {
            Ok(bills) => bills,
            Err(err) => {
                error!(%err, "restart recovery could not read bills");
                return RecoveryReport::default();
            }
        };
        let report = self.schedule_all(&bills);
        info!(
            examined = report.examined,
            scheduled = report.scheduled,
            "restart recovery complete"
        );
        report
    }

    /// Re-run scheduling for every unpaid bill regardless of due date, e.g.
    /// after the user grants notification permission.
    pub fn resync_all(&self) -> RecoveryReport {
        let bills = match self.store.all() {
            Ok(bills) => bills,
            Err(err) => {
                error!(%err, "reminder resync could not read bills");
                return RecoveryReport::default();
            }
        };
        let unpaid: Vec<Bill> = bills.into_iter().filter(|bill| !bill.is_paid).collect();
        self.schedule_all(&unpaid)
    }

    fn schedule_all(&self, bills: &[Bill]) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        for bill in bills {
            let outcome = self.scheduler.schedule(bill);
            report.record(&outcome);
        }
        report
    }
}

pub fn notification_for_bill(bill: &Bill, config: &ReminderConfig) -> Notification {
    Notification {
        key: bill.id,
        title: config.notification_title.clone(),
        body: format!(
            "{}: {} due on {}",
            bill.name,
            bill.formatted_amount(&config.currency_suffix),
            bill.formatted_due_date()
        ),
    }
}

pub fn notification_for_payload(payload: &ReminderPayload, config: &ReminderConfig) -> Notification {
    let due = parse_due_date(&payload.due_date)
        .map(|date| date.format(DISPLAY_DATE_FORMAT).to_string())
        .unwrap_or_else(|_| payload.due_date.clone());
    Notification {
        key: payload.bill_id,
        title: config.notification_title.clone(),
        body: format!(
            "{}: {} due on {}",
            payload.name,
            format_amount(payload.amount, &config.currency_suffix),
            due
        ),
    }
}
