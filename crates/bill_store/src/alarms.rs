//! Pending wake-ups kept in the bill database, standing in for the OS alarm
//! manager. Every change is a single statement or an immediate transaction,
//! so separate processes sharing the file never lose each other's writes.

use std::path::Path;

use bill_domain::error::AlarmError;
use bill_domain::notifications::{AlarmFacility, ReminderPayload, Timing, WakeupRequest};
use bill_domain::BillId;
use chrono::NaiveDateTime;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use tracing::debug;

use crate::schema::apply_schema;
use crate::sqlite::{open_connection, SqliteStoreError};

const FIRE_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SELECT_WAKEUPS: &str = "SELECT bill_id, fire_at, timing, payload FROM wakeups";

pub struct SqliteAlarmFacility {
    conn: Mutex<Connection>,
    exact_allowed: bool,
}

impl SqliteAlarmFacility {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqliteStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SqliteStoreError::Io(e.to_string()))?;
        }
        Ok(Self::with_connection(open_connection(path)?))
    }

    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            exact_allowed: true,
        }
    }

    /// Report exact timing as unavailable, as on a host where the user has
    /// not granted the exact-alarm permission.
    pub fn inexact_only(mut self) -> Self {
        self.exact_allowed = false;
        self
    }

    /// Pending wake-ups ordered by fire time.
    pub fn pending(&self) -> Result<Vec<WakeupRequest>, SqliteStoreError> {
        let conn = self.lock();
        query_wakeups(&conn, &format!("{SELECT_WAKEUPS} ORDER BY fire_at, bill_id"), [])
    }

    /// Remove and return every wake-up due at or before `now`. The removal is
    /// committed before the caller dispatches them.
    pub fn take_due(&self, now: NaiveDateTime) -> Result<Vec<WakeupRequest>, SqliteStoreError> {
        let conn = self.lock();
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let cutoff = now.format(FIRE_AT_FORMAT).to_string();
        let due = query_wakeups(
            &tx,
            &format!("{SELECT_WAKEUPS} WHERE fire_at <= ?1 ORDER BY fire_at, bill_id"),
            params![cutoff],
        )?;
        tx.execute("DELETE FROM wakeups WHERE fire_at <= ?1", params![cutoff])?;
        tx.commit()?;
        Ok(due)
    }

    /// Remove and return one wake-up regardless of its fire time.
    pub fn take(&self, key: BillId) -> Result<Option<WakeupRequest>, SqliteStoreError> {
        let conn = self.lock();
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let request = tx
            .query_row(
                &format!("{SELECT_WAKEUPS} WHERE bill_id = ?1"),
                params![key],
                row_to_wakeup,
            )
            .optional()?;
        if request.is_some() {
            tx.execute("DELETE FROM wakeups WHERE bill_id = ?1", params![key])?;
        }
        tx.commit()?;
        Ok(request)
    }

    /// Drop every pending wake-up, as a device reboot does.
    pub fn clear(&self) -> Result<(), SqliteStoreError> {
        self.lock().execute("DELETE FROM wakeups", [])?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    fn insert(&self, request: &WakeupRequest) -> Result<(), SqliteStoreError> {
        let payload = serde_json::to_string(&request.payload)?;
        self.lock().execute(
            "INSERT OR REPLACE INTO wakeups (bill_id, fire_at, timing, payload) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                request.key,
                request.fire_at.format(FIRE_AT_FORMAT).to_string(),
                request.timing.to_string(),
                payload,
            ],
        )?;
        Ok(())
    }
}

impl AlarmFacility for SqliteAlarmFacility {
    fn register_wakeup(&self, request: WakeupRequest) -> Result<(), AlarmError> {
        debug!(bill_id = request.key, fire_at = %request.fire_at, "persisting wake-up");
        self.insert(&request).map_err(unavailable)
    }

    fn cancel_wakeup(&self, key: BillId) -> Result<(), AlarmError> {
        self.lock()
            .execute("DELETE FROM wakeups WHERE bill_id = ?1", params![key])
            .map(|_| ())
            .map_err(|err| unavailable(err.into()))
    }

    fn can_schedule_exact(&self) -> bool {
        self.exact_allowed
    }
}

fn unavailable(err: SqliteStoreError) -> AlarmError {
    AlarmError::Unavailable(err.to_string())
}

fn query_wakeups(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<WakeupRequest>, SqliteStoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, row_to_wakeup)?;
    let mut requests = Vec::new();
    for row in rows {
        requests.push(row?);
    }
    Ok(requests)
}

fn row_to_wakeup(row: &Row<'_>) -> rusqlite::Result<WakeupRequest> {
    let fire_at: String = row.get(1)?;
    let fire_at = NaiveDateTime::parse_from_str(&fire_at, FIRE_AT_FORMAT)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(err)))?;
    let timing: String = row.get(2)?;
    let timing = match timing.as_str() {
        "exact" => Timing::Exact,
        _ => Timing::Inexact,
    };
    let payload: String = row.get(3)?;
    let payload: ReminderPayload = serde_json::from_str(&payload)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(err)))?;
    Ok(WakeupRequest {
        key: row.get(0)?,
        fire_at,
        timing,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn request(key: BillId, fire_at: NaiveDateTime) -> WakeupRequest {
        WakeupRequest {
            key,
            fire_at,
            timing: Timing::Exact,
            payload: ReminderPayload {
                bill_id: key,
                name: format!("bill {key}"),
                amount: 10.0,
                due_date: "2024-06-30".into(),
            },
        }
    }

    #[test]
    fn registrations_replace_by_key_and_persist() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bills.db");
        let alarms = SqliteAlarmFacility::open(&path).unwrap();
        alarms.register_wakeup(request(1, at(5, 10))).unwrap();
        alarms.register_wakeup(request(1, at(6, 10))).unwrap();
        alarms
            .register_wakeup(WakeupRequest {
                timing: Timing::Inexact,
                ..request(2, at(4, 10))
            })
            .unwrap();

        let reopened = SqliteAlarmFacility::open(&path).unwrap();
        let pending = reopened.pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].key, 2);
        assert_eq!(pending[0].timing, Timing::Inexact);
        assert_eq!(pending[1], request(1, at(6, 10)));

        reopened.cancel_wakeup(1).unwrap();
        reopened.cancel_wakeup(42).unwrap();
        assert_eq!(alarms.pending().unwrap().len(), 1);
    }

    #[test]
    fn take_due_removes_only_elapsed_wakeups() {
        let alarms = SqliteAlarmFacility::open_in_memory().unwrap();
        alarms.register_wakeup(request(1, at(5, 10))).unwrap();
        alarms.register_wakeup(request(2, at(7, 10))).unwrap();
        alarms.register_wakeup(request(3, at(4, 9))).unwrap();

        let due = alarms.take_due(at(5, 10)).unwrap();
        let keys: Vec<BillId> = due.iter().map(|request| request.key).collect();
        assert_eq!(keys, vec![3, 1]);
        assert_eq!(alarms.pending().unwrap().len(), 1);
        assert!(alarms.take_due(at(5, 10)).unwrap().is_empty());

        assert_eq!(alarms.take(2).unwrap().map(|r| r.key), Some(2));
        assert_eq!(alarms.take(2).unwrap(), None);
    }

    #[test]
    fn writers_in_separate_connections_do_not_lose_wakeups() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bills.db");
        SqliteAlarmFacility::open(&path).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|writer| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let alarms = SqliteAlarmFacility::open(&path).unwrap();
                    for n in 0..10 {
                        let key = writer * 100 + n;
                        alarms.register_wakeup(request(key, at(20, 10))).unwrap();
                        if n % 3 == 0 {
                            alarms.take_due(at(1, 0)).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let alarms = SqliteAlarmFacility::open(&path).unwrap();
        assert_eq!(alarms.pending().unwrap().len(), 40);
        assert_eq!(alarms.take_due(at(20, 10)).unwrap().len(), 40);
        assert!(alarms.pending().unwrap().is_empty());
    }

    #[test]
    fn inexact_only_withholds_exact_permission() {
        let alarms = SqliteAlarmFacility::open_in_memory().unwrap();
        assert!(alarms.can_schedule_exact());
        assert!(!alarms.inexact_only().can_schedule_exact());
    }

    #[test]
    fn unreadable_row_surfaces_as_an_error() {
        let alarms = SqliteAlarmFacility::open_in_memory().unwrap();
        alarms
            .lock()
            .execute(
                "INSERT INTO wakeups (bill_id, fire_at, timing, payload) \
                 VALUES (1, 'soon', 'exact', '{}')",
                [],
            )
            .unwrap();
        assert!(alarms.pending().is_err());
        alarms.clear().unwrap();
        assert!(alarms.pending().unwrap().is_empty());
    }
}
