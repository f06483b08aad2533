use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::status::DEFAULT_DUE_SOON_DAYS;

/// Longest accepted catch-up delay: one week.
pub const MAX_CATCH_UP_DELAY_MINUTES: i64 = 7 * 24 * 60;

/// Tunables of the reminder engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReminderConfig {
    /// Local time of day at which reminders fire.
    pub notify_time: NaiveTime,
    /// Days before the due date on which the reminder fires.
    pub lead_days: u32,
    /// Delay of the catch-up reminder when the regular fire time has passed.
    pub catch_up_delay_minutes: i64,
    /// A bill due at most this many days from today still gets a catch-up
    /// reminder once its regular fire time has passed.
    pub catch_up_window_days: i64,
    /// Look-ahead window used when rebuilding alarms after a restart.
    pub recovery_window_days: u32,
    pub due_soon_days: i64,
    /// Appended to formatted amounts, e.g. `120.00 DH`.
    pub currency_suffix: String,
    pub notification_title: String,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            notify_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
            lead_days: 1,
            catch_up_delay_minutes: 60,
            catch_up_window_days: 1,
            recovery_window_days: 30,
            due_soon_days: DEFAULT_DUE_SOON_DAYS,
            currency_suffix: "DH".to_string(),
            notification_title: "Bill reminder".to_string(),
        }
    }
}

impl ReminderConfig {
    /// Reports the first setting that is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=MAX_CATCH_UP_DELAY_MINUTES).contains(&self.catch_up_delay_minutes) {
            return Err(ConfigError::CatchUpDelay {
                value: self.catch_up_delay_minutes,
                max: MAX_CATCH_UP_DELAY_MINUTES,
            });
        }
        if self.catch_up_window_days < 0 {
            return Err(ConfigError::CatchUpWindow(self.catch_up_window_days));
        }
        if self.due_soon_days < 0 {
            return Err(ConfigError::DueSoonDays(self.due_soon_days));
        }
        Ok(())
    }

    /// Resets every out-of-range setting to its default and returns what was
    /// rejected.
    pub fn sanitize(&mut self) -> Vec<ConfigError> {
        let defaults = Self::default();
        let mut rejected = Vec::new();
        while let Err(err) = self.validate() {
            match err {
                ConfigError::CatchUpDelay { .. } => {
                    self.catch_up_delay_minutes = defaults.catch_up_delay_minutes;
                }
                ConfigError::CatchUpWindow(_) => {
                    self.catch_up_window_days = defaults.catch_up_window_days;
                }
                ConfigError::DueSoonDays(_) => self.due_soon_days = defaults.due_soon_days,
            }
            rejected.push(err);
        }
        rejected
    }
}
