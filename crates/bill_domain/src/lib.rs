pub mod advancer;
pub mod bill;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod locks;
pub mod notifications;
pub mod overview;
pub mod recurrence;
pub mod scheduler;
pub mod service;
pub mod status;
pub mod store;
pub mod testing;

pub use crate::bill::{Bill, BillId, NewBill};
pub use crate::error::{BillError, ConfigError, StoreError, ValidationError};
pub use crate::recurrence::{next_due_date, Recurrence};
pub use crate::service::{BillService, BillServiceBuilder, BillUpdate};
pub use crate::status::DueStatus;
