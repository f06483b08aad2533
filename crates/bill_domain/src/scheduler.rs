//! Decides when a bill's reminder fires and keeps at most one wake-up
//! registered per bill with the host alarm facility.

use std::sync::Arc;

use chrono::{Days, Duration, NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::bill::{Bill, BillId};
use crate::clock::Clock;
use crate::config::ReminderConfig;
use crate::error::AlarmError;
use crate::locks::BillLocks;
use crate::notifications::{AlarmFacility, ReminderPayload, Timing, WakeupRequest};
use crate::status::days_until_due;

/// Registrations closer than this are fired immediately.
const IMMEDIATE_THRESHOLD_SECS: i64 = 60;

/// When a reminder should fire, before any host registration happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirePlan {
    pub fire_at: NaiveDateTime,
    /// The regular fire time had passed and this is the grace reminder.
    pub catch_up: bool,
}

/// Pure fire-time policy.
///
/// The regular fire time is `lead_days` before `due` at `notify_time`. If that
/// has already passed, a bill due within `catch_up_window_days` (and not
/// overdue) gets a catch-up reminder `catch_up_delay_minutes` from now;
/// anything else gets no reminder, as does a catch-up delay that overflows the
/// calendar. A fire time less than a minute away is pulled forward to `now`.
pub fn plan_fire_time(due: NaiveDate, now: NaiveDateTime, config: &ReminderConfig) -> Option<FirePlan> {
    let reminder_day = due
        .checked_sub_days(Days::new(u64::from(config.lead_days)))
        .unwrap_or(NaiveDate::MIN);
    let regular = reminder_day.and_time(config.notify_time);

    let plan = if regular < now {
        let days_left = days_until_due(due, now.date());
        if !(0..=config.catch_up_window_days).contains(&days_left) {
            return None;
        }
        let fire_at = Duration::try_minutes(config.catch_up_delay_minutes)
            .and_then(|delay| now.checked_add_signed(delay))?;
        FirePlan {
            fire_at,
            catch_up: true,
        }
    } else {
        FirePlan {
            fire_at: regular,
            catch_up: false,
        }
    };

    if plan.fire_at - now < Duration::seconds(IMMEDIATE_THRESHOLD_SECS) {
        return Some(FirePlan {
            fire_at: now,
            ..plan
        });
    }
    Some(plan)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    Scheduled {
        fire_at: NaiveDateTime,
        timing: Timing,
        catch_up: bool,
    },
    SkippedPaid,
    SkippedInvalidDueDate,
    /// The bill is too far past its reminder window.
    SkippedElapsed,
    /// The host refused the registration; logged and otherwise ignored.
    Failed(AlarmError),
}

impl ScheduleOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, ScheduleOutcome::Scheduled { .. })
    }
}

pub struct ReminderScheduler {
    alarms: Arc<dyn AlarmFacility>,
    clock: Arc<dyn Clock>,
    config: ReminderConfig,
    locks: BillLocks,
}

impl ReminderScheduler {
    pub fn new(alarms: Arc<dyn AlarmFacility>, clock: Arc<dyn Clock>, config: ReminderConfig) -> Self {
        Self {
            alarms,
            clock,
            config,
            locks: BillLocks::new(),
        }
    }

    pub fn config(&self) -> &ReminderConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Register the bill's reminder, replacing any earlier one.
    pub fn schedule(&self, bill: &Bill) -> ScheduleOutcome {
        self.locks.with(bill.id, || {
            self.cancel_locked(bill.id);
            self.schedule_locked(bill)
        })
    }

    /// Drop the bill's pending reminder, if any.
    pub fn cancel(&self, bill_id: BillId) {
        self.locks.with(bill_id, || self.cancel_locked(bill_id));
    }

    /// Cancel then schedule as one step with respect to other calls for the
    /// same bill.
    pub fn reschedule(&self, bill: &Bill) -> ScheduleOutcome {
        self.schedule(bill)
    }

    fn cancel_locked(&self, bill_id: BillId) {
        if let Err(err) = self.alarms.cancel_wakeup(bill_id) {
            warn!(bill_id, %err, "failed to cancel reminder");
        }
    }

    fn schedule_locked(&self, bill: &Bill) -> ScheduleOutcome {
        if bill.is_paid {
            debug!(bill_id = bill.id, "bill is paid; no reminder");
            return ScheduleOutcome::SkippedPaid;
        }
        let due = match bill.parsed_due_date() {
            Ok(due) => due,
            Err(err) => {
                warn!(bill_id = bill.id, %err, "skipping reminder for unreadable due date");
                return ScheduleOutcome::SkippedInvalidDueDate;
            }
        };

        let now = self.clock.now();
        let Some(plan) = plan_fire_time(due, now, &self.config) else {
            debug!(bill_id = bill.id, due_date = %due, "reminder window has passed");
            return ScheduleOutcome::SkippedElapsed;
        };

        let timing = if self.alarms.can_schedule_exact() {
            Timing::Exact
        } else {
            warn!(bill_id = bill.id, "exact alarms unavailable; using inexact timing");
            Timing::Inexact
        };

        match self.register(bill, plan, timing) {
            Ok(timing) => {
                info!(
                    bill_id = bill.id,
                    fire_at = %plan.fire_at,
                    %timing,
                    catch_up = plan.catch_up,
                    "reminder scheduled"
                );
                ScheduleOutcome::Scheduled {
                    fire_at: plan.fire_at,
                    timing,
                    catch_up: plan.catch_up,
                }
            }
            Err(err) => {
                warn!(bill_id = bill.id, %err, "reminder registration failed");
                ScheduleOutcome::Failed(err)
            }
        }
    }

    fn register(&self, bill: &Bill, plan: FirePlan, timing: Timing) -> Result<Timing, AlarmError> {
        let request = WakeupRequest {
            key: bill.id,
            fire_at: plan.fire_at,
            timing,
            payload: ReminderPayload::from(bill),
        };
        match self.alarms.register_wakeup(request.clone()) {
            Err(AlarmError::ExactDenied) if timing == Timing::Exact => {
                warn!(bill_id = bill.id, "exact alarm denied; retrying inexact");
                self.alarms.register_wakeup(WakeupRequest {
                    timing: Timing::Inexact,
                    ..request
                })?;
                Ok(Timing::Inexact)
            }
            result => result.map(|()| timing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::NewBill;
    use crate::clock::FixedClock;
    use crate::testing::{AlarmCall, RecordingAlarms};
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, min, 0).unwrap()
    }

    fn scheduler_at(
        now: NaiveDateTime,
        alarms: RecordingAlarms,
    ) -> (ReminderScheduler, Arc<RecordingAlarms>) {
        let alarms = Arc::new(alarms);
        let scheduler = ReminderScheduler::new(
            alarms.clone(),
            Arc::new(FixedClock::new(now)),
            ReminderConfig::default(),
        );
        (scheduler, alarms)
    }

    fn unpaid(id: BillId, due: NaiveDate) -> Bill {
        NewBill::new("Water", 42.0, due).into_bill(id)
    }

    #[test]
    fn regular_fire_time_is_day_before_at_notify_hour() {
        let plan = plan_fire_time(date(2024, 6, 10), at(2024, 6, 1, 8, 0), &ReminderConfig::default())
            .expect("plan");
        assert_eq!(plan.fire_at, at(2024, 6, 9, 10, 0));
        assert!(!plan.catch_up);
    }

    #[test]
    fn catch_up_for_bill_due_tomorrow_after_notify_hour() {
        let now = at(2024, 6, 9, 15, 30);
        let plan = plan_fire_time(date(2024, 6, 10), now, &ReminderConfig::default()).expect("plan");
        assert_eq!(plan.fire_at, now + Duration::hours(1));
        assert!(plan.catch_up);
    }

    #[test]
    fn catch_up_for_bill_due_today() {
        let now = at(2024, 6, 10, 7, 0);
        let plan = plan_fire_time(date(2024, 6, 10), now, &ReminderConfig::default()).expect("plan");
        assert_eq!(plan.fire_at, at(2024, 6, 10, 8, 0));
    }

    #[test]
    fn no_reminder_for_overdue_bill() {
        assert_eq!(
            plan_fire_time(date(2024, 6, 9), at(2024, 6, 10, 7, 0), &ReminderConfig::default()),
            None
        );
    }

    #[test]
    fn imminent_fire_time_is_immediate() {
        let now = at(2024, 6, 9, 9, 59) + Duration::seconds(30);
        let plan = plan_fire_time(date(2024, 6, 10), now, &ReminderConfig::default()).expect("plan");
        assert_eq!(plan.fire_at, now);
        assert!(!plan.catch_up);
    }

    #[test]
    fn oversized_catch_up_delay_yields_no_plan() {
        let config = ReminderConfig {
            catch_up_delay_minutes: i64::MAX,
            ..ReminderConfig::default()
        };
        assert_eq!(
            plan_fire_time(date(2024, 6, 10), at(2024, 6, 9, 15, 0), &config),
            None
        );
        let regular = plan_fire_time(date(2024, 6, 10), at(2024, 6, 1, 8, 0), &config).expect("plan");
        assert_eq!(regular.fire_at, at(2024, 6, 9, 10, 0));
    }

    #[test]
    fn configured_lead_and_hour_are_honoured() {
        let config = ReminderConfig {
            lead_days: 3,
            notify_time: NaiveTime::from_hms_opt(18, 45, 0).unwrap(),
            ..ReminderConfig::default()
        };
        let plan = plan_fire_time(date(2024, 6, 10), at(2024, 6, 1, 8, 0), &config).expect("plan");
        assert_eq!(plan.fire_at, at(2024, 6, 7, 18, 45));
    }

    #[test]
    fn scheduling_twice_leaves_one_wakeup() {
        let (scheduler, alarms) = scheduler_at(at(2024, 6, 1, 8, 0), RecordingAlarms::new());
        let bill = unpaid(5, date(2024, 6, 10));
        assert!(scheduler.schedule(&bill).is_scheduled());
        let mut moved = bill.clone();
        moved.due_date = "2024-06-20".into();
        assert!(scheduler.schedule(&moved).is_scheduled());

        let pending = alarms.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fire_at, at(2024, 6, 19, 10, 0));
        assert_eq!(
            alarms.calls().iter().filter(|c| matches!(c, AlarmCall::Cancel(5))).count(),
            2
        );
    }

    #[test]
    fn cancel_without_pending_wakeup_is_harmless() {
        let (scheduler, alarms) = scheduler_at(at(2024, 6, 1, 8, 0), RecordingAlarms::new());
        scheduler.cancel(99);
        assert!(alarms.pending().is_empty());
    }

    #[test]
    fn per_bill_locks_do_not_accumulate() {
        let (scheduler, _alarms) = scheduler_at(at(2024, 6, 1, 8, 0), RecordingAlarms::new());
        for id in 1..=20 {
            scheduler.schedule(&unpaid(id, date(2024, 6, 10)));
            scheduler.cancel(id);
        }
        assert!(scheduler.locks.is_empty());
    }

    #[test]
    fn paid_and_unreadable_bills_are_skipped() {
        let (scheduler, alarms) = scheduler_at(at(2024, 6, 1, 8, 0), RecordingAlarms::new());
        let mut paid = unpaid(1, date(2024, 6, 10));
        paid.is_paid = true;
        assert_eq!(scheduler.schedule(&paid), ScheduleOutcome::SkippedPaid);

        let mut garbled = unpaid(2, date(2024, 6, 10));
        garbled.due_date = "tomorrow".into();
        assert_eq!(scheduler.schedule(&garbled), ScheduleOutcome::SkippedInvalidDueDate);
        assert!(alarms.pending().is_empty());
    }

    #[test]
    fn missing_exact_permission_degrades_to_inexact() {
        let (scheduler, alarms) = scheduler_at(
            at(2024, 6, 1, 8, 0),
            RecordingAlarms::new().without_exact_permission(),
        );
        let outcome = scheduler.schedule(&unpaid(3, date(2024, 6, 10)));
        assert!(matches!(
            outcome,
            ScheduleOutcome::Scheduled {
                timing: Timing::Inexact,
                ..
            }
        ));
        assert_eq!(alarms.pending_for(3).unwrap().timing, Timing::Inexact);
    }

    #[test]
    fn exact_denial_at_registration_retries_inexact() {
        let (scheduler, alarms) =
            scheduler_at(at(2024, 6, 1, 8, 0), RecordingAlarms::new().rejecting_exact());
        let outcome = scheduler.schedule(&unpaid(4, date(2024, 6, 10)));
        assert!(outcome.is_scheduled());
        assert_eq!(alarms.pending_for(4).unwrap().timing, Timing::Inexact);
    }

    #[test]
    fn unavailable_facility_reports_failure_without_panicking() {
        let (scheduler, alarms) = scheduler_at(at(2024, 6, 1, 8, 0), RecordingAlarms::new());
        alarms.set_unavailable(true);
        let outcome = scheduler.schedule(&unpaid(6, date(2024, 6, 10)));
        assert!(matches!(outcome, ScheduleOutcome::Failed(AlarmError::Unavailable(_))));
    }

    #[test]
    fn concurrent_schedules_for_one_bill_leave_one_wakeup() {
        let (scheduler, alarms) = scheduler_at(at(2024, 6, 1, 8, 0), RecordingAlarms::new());
        let scheduler = Arc::new(scheduler);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let scheduler = scheduler.clone();
                std::thread::spawn(move || {
                    let bill = unpaid(11, date(2024, 6, 10 + i));
                    scheduler.reschedule(&bill);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(alarms.pending().len(), 1);

        let calls = alarms.calls();
        for pair in calls.chunks(2) {
            assert!(matches!(pair[0], AlarmCall::Cancel(11)));
            assert!(matches!(pair[1], AlarmCall::Register(_)));
        }
    }
}
