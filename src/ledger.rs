// ⚖️ Ledger - wallet debits and the transaction journal
// The balance decrease and its journal row commit as one unit, or not at all

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

// ============================================================================
// TRANSACTION RECORD
// ============================================================================

/// Immutable journal row. `amount` is 0 for free-but-logged access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,

    /// Stable identity, independent of the rowid
    pub tx_uuid: String,

    pub student_id: i64,

    /// Display name joined from the roster (not stored on the row)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,

    pub service_type: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// DEBIT
// ============================================================================

/// Conditional debit: check-and-decrement against the *stored* balance and
/// the matching journal append, committed as a single SQL transaction.
///
/// Returns `Some(new_balance)` on success - the UPDATE's RETURNING value is
/// the single source of truth, no re-read. Returns `None` when the stored
/// balance no longer covers the amount (a concurrent tap won the race);
/// nothing is written in that case.
pub fn debit(
    conn: &mut Connection,
    student_id: i64,
    amount: f64,
    service_type: &str,
) -> Result<Option<f64>> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("Failed to begin debit transaction")?;

    let new_balance: Option<f64> = tx
        .query_row(
            "UPDATE students
             SET wallet_balance = wallet_balance - ?1
             WHERE id = ?2 AND wallet_balance >= ?1
             RETURNING wallet_balance",
            params![amount, student_id],
            |row| row.get(0),
        )
        .optional()
        .context("Conditional debit failed")?;

    match new_balance {
        Some(balance) => {
            append_transaction(&tx, student_id, service_type, amount)?;
            tx.commit().context("Failed to commit debit")?;
            Ok(Some(balance))
        }
        None => {
            // Condition failed at the store: no debit, no journal row
            Ok(None)
        }
    }
}

/// Journal a free service access with amount 0, so paid and free taps are
/// auditable in the same place. Unconditional - never touches the balance.
pub fn record_free_access(conn: &Connection, student_id: i64, service_type: &str) -> Result<()> {
    append_transaction(conn, student_id, service_type, 0.0)
}

fn append_transaction(
    conn: &Connection,
    student_id: i64,
    service_type: &str,
    amount: f64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO transactions (tx_uuid, student_id, service_type, amount, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            uuid::Uuid::new_v4().to_string(),
            student_id,
            service_type.to_lowercase(),
            amount,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("Failed to append transaction")?;

    Ok(())
}

// ============================================================================
// JOURNAL QUERIES
// ============================================================================

fn record_from_row(row: &rusqlite::Row) -> rusqlite::Result<TransactionRecord> {
    let timestamp_str: String = row.get(5)?;

    Ok(TransactionRecord {
        id: row.get(0)?,
        tx_uuid: row.get(1)?,
        student_id: row.get(2)?,
        student_name: row.get(6)?,
        service_type: row.get(3)?,
        amount: row.get(4)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|_| rusqlite::Error::InvalidQuery)?
            .with_timezone(&Utc),
    })
}

/// Most recent journal rows with student names, newest first.
pub fn list_transactions(conn: &Connection, limit: usize) -> Result<Vec<TransactionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.tx_uuid, t.student_id, t.service_type, t.amount, t.timestamp, s.name
         FROM transactions t
         JOIN students s ON t.student_id = s.id
         ORDER BY t.timestamp DESC, t.id DESC
         LIMIT ?1",
    )?;

    let records = stmt
        .query_map(params![limit as i64], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn transactions_for_student(conn: &Connection, student_id: i64) -> Result<Vec<TransactionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.tx_uuid, t.student_id, t.service_type, t.amount, t.timestamp, s.name
         FROM transactions t
         JOIN students s ON t.student_id = s.id
         WHERE t.student_id = ?1
         ORDER BY t.timestamp DESC, t.id DESC",
    )?;

    let records = stmt
        .query_map(params![student_id], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{find_student_by_identifier, seed_demo_data, setup_database};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        seed_demo_data(&conn).unwrap();
        conn
    }

    fn student_id(conn: &Connection, rfid: &str) -> i64 {
        find_student_by_identifier(conn, rfid).unwrap().unwrap().id
    }

    #[test]
    fn test_debit_decrements_and_journals() {
        let mut conn = test_conn();
        let id = student_id(&conn, "RFID_001"); // balance 500

        let new_balance = debit(&mut conn, id, 50.0, "mess").unwrap();
        assert_eq!(new_balance, Some(450.0));

        let records = transactions_for_student(&conn, id).unwrap();
        assert_eq!(records.len(), 1, "exactly one journal row per debit");
        assert_eq!(records[0].amount, 50.0);
        assert_eq!(records[0].service_type, "mess");
    }

    #[test]
    fn test_debit_insufficient_writes_nothing() {
        let mut conn = test_conn();
        let id = student_id(&conn, "RFID_003"); // balance 200

        let result = debit(&mut conn, id, 500.0, "mess").unwrap();
        assert_eq!(result, None);

        let balance = crate::db::get_student_balance(&conn, id).unwrap();
        assert_eq!(balance, 200.0, "failed debit leaves balance unchanged");

        let records = transactions_for_student(&conn, id).unwrap();
        assert!(records.is_empty(), "failed debit leaves no journal row");
    }

    #[test]
    fn test_debit_to_exactly_zero() {
        let mut conn = test_conn();
        let id = student_id(&conn, "RFID_003"); // balance 200

        let new_balance = debit(&mut conn, id, 200.0, "mess").unwrap();
        assert_eq!(new_balance, Some(0.0));

        // And one more is refused - the balance never goes negative
        let again = debit(&mut conn, id, 200.0, "mess").unwrap();
        assert_eq!(again, None);
    }

    #[test]
    fn test_free_access_journals_zero_amount() {
        let conn = test_conn();
        let id = student_id(&conn, "RFID_002");

        record_free_access(&conn, id, "Library").unwrap();

        let records = transactions_for_student(&conn, id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 0.0);
        assert_eq!(records[0].service_type, "library");

        let balance = crate::db::get_student_balance(&conn, id).unwrap();
        assert_eq!(balance, 300.0, "free access never touches the balance");
    }

    #[test]
    fn test_repeated_debits_are_independent() {
        // No idempotence: two identical debits are two effects
        let mut conn = test_conn();
        let id = student_id(&conn, "RFID_001"); // balance 500

        debit(&mut conn, id, 50.0, "mess").unwrap();
        debit(&mut conn, id, 50.0, "mess").unwrap();

        let balance = crate::db::get_student_balance(&conn, id).unwrap();
        assert_eq!(balance, 400.0);

        let records = transactions_for_student(&conn, id).unwrap();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].tx_uuid, records[1].tx_uuid);
    }

    #[test]
    fn test_list_transactions_joins_names() {
        let mut conn = test_conn();
        let id = student_id(&conn, "RFID_004");

        debit(&mut conn, id, 20.0, "transport").unwrap();

        let records = list_transactions(&conn, 100).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student_name.as_deref(), Some("Saniya Khan"));
    }

    #[test]
    fn test_concurrent_debits_bounded_by_balance() {
        // N concurrent debits of A against balance B: exactly floor(B/A)
        // succeed, regardless of arrival order. Shared on-disk WAL database,
        // one connection per thread.
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("concurrent.db");

        {
            let conn = crate::db::open_database(&db_path).unwrap();
            setup_database(&conn).unwrap();
            seed_demo_data(&conn).unwrap();
        }

        let id = {
            let conn = crate::db::open_database(&db_path).unwrap();
            student_id(&conn, "RFID_001") // balance 500
        };

        let amount = 90.0; // floor(500 / 90) = 5 of 8 attempts succeed
        let attempts = 8;

        let handles: Vec<_> = (0..attempts)
            .map(|_| {
                let path = db_path.clone();
                std::thread::spawn(move || {
                    let mut conn = crate::db::open_database(&path).unwrap();
                    debit(&mut conn, id, amount, "mess").unwrap().is_some()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 5);

        let conn = crate::db::open_database(&db_path).unwrap();
        let balance = crate::db::get_student_balance(&conn, id).unwrap();
        assert_eq!(balance, 50.0, "500 - 5 * 90 = 50, never negative");

        let records = transactions_for_student(&conn, id).unwrap();
        assert_eq!(records.len(), 5, "one journal row per successful debit");
    }
}
