//! In-process stand-ins for the host alarm and notification facilities.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::bill::BillId;
use crate::error::AlarmError;
use crate::notifications::{AlarmFacility, Notification, NotificationSink, Timing, WakeupRequest};

#[derive(Debug, Clone, PartialEq)]
pub enum AlarmCall {
    Register(WakeupRequest),
    Cancel(BillId),
}

#[derive(Debug)]
struct AlarmState {
    pending: HashMap<BillId, WakeupRequest>,
    calls: Vec<AlarmCall>,
    exact_allowed: bool,
    reject_exact: bool,
    unavailable: bool,
}

/// Alarm facility that keeps pending wake-ups in memory and records every
/// call in order.
#[derive(Debug)]
pub struct RecordingAlarms {
    state: Mutex<AlarmState>,
}

impl Default for RecordingAlarms {
    fn default() -> Self {
        Self {
            state: Mutex::new(AlarmState {
                pending: HashMap::new(),
                calls: Vec::new(),
                exact_allowed: true,
                reject_exact: false,
                unavailable: false,
            }),
        }
    }
}

impl RecordingAlarms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report exact timing as unavailable from the capability query.
    pub fn without_exact_permission(self) -> Self {
        self.state.lock().exact_allowed = false;
        self
    }

    /// Claim exact timing is available but refuse exact registrations, as a
    /// host does when the permission is revoked between query and use.
    pub fn rejecting_exact(self) -> Self {
        self.state.lock().reject_exact = true;
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn pending(&self) -> Vec<WakeupRequest> {
        let mut pending: Vec<WakeupRequest> = self.state.lock().pending.values().cloned().collect();
        pending.sort_by_key(|request| request.key);
        pending
    }

    pub fn pending_for(&self, key: BillId) -> Option<WakeupRequest> {
        self.state.lock().pending.get(&key).cloned()
    }

    pub fn calls(&self) -> Vec<AlarmCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Drop every pending wake-up, as a device reboot does.
    pub fn wipe(&self) {
        self.state.lock().pending.clear();
    }
}

impl AlarmFacility for RecordingAlarms {
    fn register_wakeup(&self, request: WakeupRequest) -> Result<(), AlarmError> {
        let mut state = self.state.lock();
        if state.unavailable {
            return Err(AlarmError::Unavailable("alarm service offline".into()));
        }
        if request.timing == Timing::Exact && (state.reject_exact || !state.exact_allowed) {
            return Err(AlarmError::ExactDenied);
        }
        state.calls.push(AlarmCall::Register(request.clone()));
        state.pending.insert(request.key, request);
        Ok(())
    }

    fn cancel_wakeup(&self, key: BillId) -> Result<(), AlarmError> {
        let mut state = self.state.lock();
        state.calls.push(AlarmCall::Cancel(key));
        state.pending.remove(&key);
        Ok(())
    }

    fn can_schedule_exact(&self) -> bool {
        self.state.lock().exact_allowed
    }
}

/// Notification sink that keeps the latest alert per key plus a full log.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    emitted: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> Vec<Notification> {
        self.emitted.lock().clone()
    }

    /// Alerts currently visible, one per key.
    pub fn visible(&self) -> Vec<Notification> {
        let mut latest: HashMap<BillId, Notification> = HashMap::new();
        for notification in self.emitted.lock().iter() {
            latest.insert(notification.key, notification.clone());
        }
        let mut visible: Vec<Notification> = latest.into_values().collect();
        visible.sort_by_key(|notification| notification.key);
        visible
    }
}

impl NotificationSink for RecordingNotifier {
    fn emit(&self, notification: Notification) {
        self.emitted.lock().push(notification);
    }
}
