//! SQLite-backed [`BillStore`].
//!
//! One database file holds the `bills` table. Every write runs inside a
//! transaction so a crash mid-write cannot leave a half-updated row. Several
//! processes may share the file; writers wait on each other up to
//! [`BUSY_TIMEOUT`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use bill_domain::bill::{Bill, BillId, NewBill, DUE_DATE_FORMAT};
use bill_domain::error::StoreError;
use bill_domain::recurrence::Recurrence;
use bill_domain::store::{due_window, BillStore, Settlement};
use chrono::NaiveDate;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::schema::{apply_schema, read_schema_version};

/// How long a connection waits for another writer before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_COLUMNS: &str =
    "SELECT id, name, amount, due_date, is_paid, recurrence_type, recurrence_interval FROM bills";

#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Thread-safe via an internal mutex around the single connection.
pub struct SqliteBillStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteBillStore {
    /// Open (or create) the database at `path`, creating parent directories
    /// and applying the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqliteStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SqliteStoreError::Io(e.to_string()))?;
        }
        let conn = open_connection(path)?;
        debug!(path = %path.display(), "bill database opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Database file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> Result<Option<u32>, SqliteStoreError> {
        Ok(read_schema_version(&self.lock())?)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    fn query_bills(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Bill>, SqliteStoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_bill)?;
        let mut bills = Vec::new();
        for row in rows {
            bills.push(row?);
        }
        Ok(bills)
    }

    fn insert_row(&self, bill: &NewBill) -> Result<BillId, SqliteStoreError> {
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        let id = insert_bill(&tx, bill)?;
        tx.commit()?;
        Ok(id)
    }

    /// `None` when the id is unknown.
    fn settle_row(
        &self,
        bill: &Bill,
        next: Option<&NewBill>,
    ) -> Result<Option<Settlement>, SqliteStoreError> {
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE bills SET name = ?1, amount = ?2, due_date = ?3, is_paid = 1, \
             recurrence_type = ?4, recurrence_interval = ?5 WHERE id = ?6 AND is_paid = 0",
            params![
                bill.name,
                bill.amount,
                bill.due_date,
                bill.recurrence.code(),
                bill.recurrence.interval(),
                bill.id,
            ],
        )?;
        if changed == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM bills WHERE id = ?1)",
                params![bill.id],
                |row| row.get(0),
            )?;
            return Ok(exists.then_some(Settlement::AlreadyPaid));
        }
        let next_id = match next {
            Some(next) => Some(insert_bill(&tx, next)?),
            None => None,
        };
        tx.commit()?;
        Ok(Some(Settlement::Settled { next_id }))
    }

    fn update_row(&self, bill: &Bill) -> Result<usize, SqliteStoreError> {
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE bills SET name = ?1, amount = ?2, due_date = ?3, is_paid = ?4, \
             recurrence_type = ?5, recurrence_interval = ?6 WHERE id = ?7",
            params![
                bill.name,
                bill.amount,
                bill.due_date,
                bill.is_paid,
                bill.recurrence.code(),
                bill.recurrence.interval(),
                bill.id,
            ],
        )?;
        tx.commit()?;
        Ok(changed)
    }

    fn delete_row(&self, id: BillId) -> Result<usize, SqliteStoreError> {
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        let changed = tx.execute("DELETE FROM bills WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(changed)
    }

    fn get_row(&self, id: BillId) -> Result<Option<Bill>, SqliteStoreError> {
        let conn = self.lock();
        let bill = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                row_to_bill,
            )
            .optional()?;
        Ok(bill)
    }
}

impl BillStore for SqliteBillStore {
    fn insert(&self, bill: &NewBill) -> Result<BillId, StoreError> {
        Ok(self.insert_row(bill)?)
    }

    fn update(&self, bill: &Bill) -> Result<(), StoreError> {
        match self.update_row(bill)? {
            0 => Err(StoreError::NotFound(bill.id)),
            _ => Ok(()),
        }
    }

    fn settle(&self, bill: &Bill, next: Option<&NewBill>) -> Result<Settlement, StoreError> {
        self.settle_row(bill, next)?
            .ok_or(StoreError::NotFound(bill.id))
    }

    fn delete(&self, id: BillId) -> Result<bool, StoreError> {
        Ok(self.delete_row(id)? > 0)
    }

    fn get(&self, id: BillId) -> Result<Option<Bill>, StoreError> {
        Ok(self.get_row(id)?)
    }

    fn all(&self) -> Result<Vec<Bill>, StoreError> {
        Ok(self.query_bills(&format!("{SELECT_COLUMNS} ORDER BY due_date, id"), [])?)
    }

    fn unpaid_due_within(&self, today: NaiveDate, days: u32) -> Result<Vec<Bill>, StoreError> {
        let (start, end) = due_window(today, days);
        Ok(self.query_bills(
            &format!(
                "{SELECT_COLUMNS} WHERE is_paid = 0 AND due_date BETWEEN ?1 AND ?2 \
                 ORDER BY due_date, id"
            ),
            params![start, end],
        )?)
    }
}

/// Open `path` with the schema applied and the busy timeout set.
pub(crate) fn open_connection(path: &Path) -> Result<Connection, SqliteStoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    apply_schema(&conn)?;
    Ok(conn)
}

fn insert_bill(conn: &Connection, bill: &NewBill) -> rusqlite::Result<BillId> {
    conn.execute(
        "INSERT INTO bills (name, amount, due_date, is_paid, recurrence_type, recurrence_interval) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            bill.name,
            bill.amount,
            bill.due_date.format(DUE_DATE_FORMAT).to_string(),
            bill.is_paid,
            bill.recurrence.code(),
            bill.recurrence.interval(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn row_to_bill(row: &Row<'_>) -> rusqlite::Result<Bill> {
    let id: BillId = row.get(0)?;
    let code: i64 = row.get(5)?;
    let interval: i64 = row.get(6)?;
    let recurrence = Recurrence::from_parts(code, interval).unwrap_or_else(|err| {
        warn!(bill_id = id, %err, "unreadable recurrence rule; treating bill as one-off");
        Recurrence::None
    });
    Ok(Bill {
        id,
        name: row.get(1)?,
        amount: row.get(2)?,
        due_date: row.get(3)?,
        is_paid: row.get(4)?,
        recurrence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn insert_get_update_delete() {
        let store = SqliteBillStore::open_in_memory().unwrap();
        let id = store
            .insert(
                &NewBill::new("Rent", 950.0, date(2024, 1, 31))
                    .with_recurrence(Recurrence::Monthly(1)),
            )
            .unwrap();

        let mut bill = store.get(id).unwrap().expect("stored");
        assert_eq!(bill.name, "Rent");
        assert_eq!(bill.due_date, "2024-01-31");
        assert_eq!(bill.recurrence, Recurrence::Monthly(1));
        assert!(!bill.is_paid);

        bill.is_paid = true;
        store.update(&bill).unwrap();
        assert!(store.get(id).unwrap().unwrap().is_paid);

        assert!(store.delete(id).unwrap());
        assert!(!store.delete(id).unwrap());
        assert_eq!(store.get(id).unwrap(), None);
    }

    #[test]
    fn update_of_unknown_bill_is_not_found() {
        let store = SqliteBillStore::open_in_memory().unwrap();
        let ghost = NewBill::new("Ghost", 1.0, date(2024, 1, 1)).into_bill(77);
        assert!(matches!(store.update(&ghost), Err(StoreError::NotFound(77))));
    }

    #[test]
    fn settle_is_conditional_on_the_row_being_unpaid() {
        let store = SqliteBillStore::open_in_memory().unwrap();
        let id = store
            .insert(&NewBill::new("Gym", 30.0, date(2024, 1, 10)).with_recurrence(Recurrence::Monthly(1)))
            .unwrap();
        let bill = store.get(id).unwrap().unwrap();
        let next = NewBill::new("Gym", 30.0, date(2024, 2, 10)).with_recurrence(Recurrence::Monthly(1));

        let Settlement::Settled { next_id: Some(next_id) } = store.settle(&bill, Some(&next)).unwrap()
        else {
            panic!("first settle should insert the successor");
        };
        assert!(store.get(id).unwrap().unwrap().is_paid);
        assert_eq!(store.get(next_id).unwrap().unwrap().due_date, "2024-02-10");

        assert_eq!(store.settle(&bill, Some(&next)).unwrap(), Settlement::AlreadyPaid);
        assert_eq!(store.all().unwrap().len(), 2);

        let ghost = NewBill::new("Ghost", 1.0, date(2024, 1, 1)).into_bill(404);
        assert!(matches!(store.settle(&ghost, None), Err(StoreError::NotFound(404))));
    }

    #[test]
    fn failed_successor_insert_leaves_the_bill_unpaid() {
        let store = SqliteBillStore::open_in_memory().unwrap();
        let id = store.insert(&NewBill::new("Rent", 900.0, date(2024, 1, 31))).unwrap();
        let bill = store.get(id).unwrap().unwrap();
        // Refused by the amount CHECK constraint.
        let broken = NewBill::new("Rent", 0.0, date(2024, 2, 29));

        assert!(store.settle(&bill, Some(&broken)).is_err());
        assert!(!store.get(id).unwrap().unwrap().is_paid);
        assert_eq!(store.all().unwrap().len(), 1);
    }

    #[test]
    fn unknown_recurrence_code_loads_as_one_off() {
        let store = SqliteBillStore::open_in_memory().unwrap();
        store
            .lock()
            .execute(
                "INSERT INTO bills (name, amount, due_date, recurrence_type, recurrence_interval) \
                 VALUES ('Odd', 5.0, '2024-02-01', 9, 1)",
                [],
            )
            .unwrap();
        let bills = store.all().unwrap();
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].recurrence, Recurrence::None);
    }

    #[test]
    fn window_is_inclusive_and_skips_paid() {
        let store = SqliteBillStore::open_in_memory().unwrap();
        let today = date(2024, 5, 1);
        let edge = store.insert(&NewBill::new("Edge", 1.0, date(2024, 5, 31))).unwrap();
        let first = store.insert(&NewBill::new("Today", 1.0, today)).unwrap();
        store.insert(&NewBill::new("Late", 1.0, date(2024, 4, 30))).unwrap();
        store.insert(&NewBill::new("Far", 1.0, date(2024, 6, 1))).unwrap();
        store
            .insert(&NewBill::new("Paid", 1.0, date(2024, 5, 10)).paid(true))
            .unwrap();

        let ids: Vec<BillId> = store
            .unpaid_due_within(today, 30)
            .unwrap()
            .iter()
            .map(|bill| bill.id)
            .collect();
        assert_eq!(ids, vec![first, edge]);
    }
}
