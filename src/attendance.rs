// Attendance Log - append-only presence records
// Decoupled from the ledger: nothing here reads or writes a wallet

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

// ============================================================================
// ATTENDANCE RECORD
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: i64,

    /// Where the tap happened ("attendance", a room, a lecture code...)
    pub service_context: String,

    /// Day of the record, YYYY-MM-DD
    pub date: String,

    pub timestamp: DateTime<Utc>,

    // Joined from the roster for reporting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
}

/// Optional report filters, all on academic attributes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttendanceFilter {
    pub branch: Option<String>,
    pub section: Option<String>,
    pub program: Option<String>,
    pub year: Option<i64>,
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Unconditional append of a presence event.
pub fn record_attendance(conn: &Connection, student_id: i64, context: &str) -> Result<()> {
    let now = Utc::now();

    conn.execute(
        "INSERT INTO attendance (student_id, service_context, date, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            student_id,
            context,
            now.format("%Y-%m-%d").to_string(),
            now.to_rfc3339(),
        ],
    )
    .context("Failed to record attendance")?;

    Ok(())
}

/// Attendance report joined with academic attributes, newest first.
pub fn list_attendance(conn: &Connection, filter: &AttendanceFilter) -> Result<Vec<AttendanceRecord>> {
    let mut sql = String::from(
        "SELECT a.id, a.student_id, a.service_context, a.date, a.timestamp,
                s.name, s.branch, s.section, s.program, s.year
         FROM attendance a
         JOIN students s ON a.student_id = s.id
         WHERE 1 = 1",
    );

    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(branch) = &filter.branch {
        sql.push_str(&format!(" AND s.branch = ?{}", bound.len() + 1));
        bound.push(Box::new(branch.clone()));
    }
    if let Some(section) = &filter.section {
        sql.push_str(&format!(" AND s.section = ?{}", bound.len() + 1));
        bound.push(Box::new(section.clone()));
    }
    if let Some(program) = &filter.program {
        sql.push_str(&format!(" AND s.program = ?{}", bound.len() + 1));
        bound.push(Box::new(program.clone()));
    }
    if let Some(year) = filter.year {
        sql.push_str(&format!(" AND s.year = ?{}", bound.len() + 1));
        bound.push(Box::new(year));
    }

    sql.push_str(" ORDER BY a.timestamp DESC, a.id DESC");

    let mut stmt = conn.prepare(&sql)?;

    let records = stmt
        .query_map(rusqlite::params_from_iter(bound.iter().map(|p| p.as_ref())), |row| {
            let timestamp_str: String = row.get(4)?;

            Ok(AttendanceRecord {
                id: row.get(0)?,
                student_id: row.get(1)?,
                service_context: row.get(2)?,
                date: row.get(3)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                student_name: row.get(5)?,
                branch: row.get(6)?,
                section: row.get(7)?,
                program: row.get(8)?,
                year: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn attendance_count(conn: &Connection, student_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attendance WHERE student_id = ?1",
        params![student_id],
        |row| row.get(0),
    )?;

    Ok(count)
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

    #[test]
    fn test_record_never_touches_wallet() {
        let conn = test_conn();
        let student = find_student_by_identifier(&conn, "RFID_002")
            .unwrap()
            .unwrap();

        record_attendance(&conn, student.id, "attendance").unwrap();
        record_attendance(&conn, student.id, "attendance").unwrap();

        assert_eq!(attendance_count(&conn, student.id).unwrap(), 2);

        let balance = crate::db::get_student_balance(&conn, student.id).unwrap();
        assert_eq!(balance, student.wallet_balance);

        // And no journal rows either
        let journal = crate::ledger::transactions_for_student(&conn, student.id).unwrap();
        assert!(journal.is_empty());
    }

    #[test]
    fn test_record_carries_context_and_date() {
        let conn = test_conn();
        let student = find_student_by_identifier(&conn, "RFID_001")
            .unwrap()
            .unwrap();

        record_attendance(&conn, student.id, "lecture_cs101").unwrap();

        let records = list_attendance(&conn, &AttendanceFilter::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].service_context, "lecture_cs101");
        assert_eq!(
            records[0].date,
            records[0].timestamp.format("%Y-%m-%d").to_string()
        );
        assert_eq!(records[0].student_name.as_deref(), Some("Yasharth Singh"));
    }

    #[test]
    fn test_filters_on_academic_attributes() {
        let conn = test_conn();

        conn.execute(
            "UPDATE students SET branch = 'CSE', section = 'A', year = 2
             WHERE rfid_uid = 'RFID_001'",
            [],
        )
        .unwrap();
        conn.execute(
            "UPDATE students SET branch = 'ECE', section = 'B', year = 3
             WHERE rfid_uid = 'RFID_002'",
            [],
        )
        .unwrap();

        let cse = find_student_by_identifier(&conn, "RFID_001").unwrap().unwrap();
        let ece = find_student_by_identifier(&conn, "RFID_002").unwrap().unwrap();

        record_attendance(&conn, cse.id, "attendance").unwrap();
        record_attendance(&conn, ece.id, "attendance").unwrap();

        let all = list_attendance(&conn, &AttendanceFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let filter = AttendanceFilter {
            branch: Some("CSE".to_string()),
            ..Default::default()
        };
        let cse_only = list_attendance(&conn, &filter).unwrap();
        assert_eq!(cse_only.len(), 1);
        assert_eq!(cse_only[0].student_id, cse.id);

        let filter = AttendanceFilter {
            branch: Some("ECE".to_string()),
            year: Some(3),
            ..Default::default()
        };
        let ece_y3 = list_attendance(&conn, &filter).unwrap();
        assert_eq!(ece_y3.len(), 1);

        let filter = AttendanceFilter {
            branch: Some("ECE".to_string()),
            year: Some(2),
            ..Default::default()
        };
        assert!(list_attendance(&conn, &filter).unwrap().is_empty());
    }
}
