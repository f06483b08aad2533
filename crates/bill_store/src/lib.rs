//! SQLite persistence for bills and their pending wake-ups.

pub mod alarms;
mod schema;
pub mod sqlite;

pub use crate::alarms::SqliteAlarmFacility;
pub use crate::schema::CURRENT_SCHEMA_VERSION;
pub use crate::sqlite::{SqliteBillStore, SqliteStoreError, BUSY_TIMEOUT};
