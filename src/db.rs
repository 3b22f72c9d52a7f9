// UniID - Database Layer
// Schema setup, identity store, roster import and demo data

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// STUDENT STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    /// Account in good standing - taps are processed
    Active,

    /// Suspended or deactivated - every tap is denied
    #[serde(other)]
    Inactive,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Inactive => "inactive",
        }
    }

    /// Parse a stored status string. Anything that is not "active"
    /// (e.g. "inactive", "suspended") reads as Inactive.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("active") {
            StudentStatus::Active
        } else {
            StudentStatus::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, StudentStatus::Active)
    }
}

// ============================================================================
// STUDENT ENTITY
// ============================================================================

/// Student record - the only thing the card itself carries is `rfid_uid`;
/// everything else lives here, server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub roll_no: String,

    /// Card identifier (unique, immutable)
    pub rfid_uid: String,

    /// Wallet balance, two-fraction-digit currency. Mutated only by the ledger.
    pub wallet_balance: f64,

    pub status: StudentStatus,

    // Academic attributes - used for filtering/reporting, never for policy
    pub branch: Option<String>,
    pub section: Option<String>,
    pub program: Option<String>,
    pub year: Option<i64>,
}

impl Student {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Roster row as it appears in an enrollment CSV export
#[derive(Debug, Clone, Deserialize)]
pub struct RosterRow {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Roll_No")]
    pub roll_no: String,

    #[serde(rename = "RFID_UID")]
    pub rfid_uid: String,

    #[serde(rename = "Wallet_Balance")]
    #[serde(default)]
    pub wallet_balance: f64,

    #[serde(rename = "Status")]
    #[serde(default = "default_status")]
    pub status: String,

    #[serde(rename = "Branch")]
    #[serde(default)]
    pub branch: Option<String>,

    #[serde(rename = "Section")]
    #[serde(default)]
    pub section: Option<String>,

    #[serde(rename = "Program")]
    #[serde(default)]
    pub program: Option<String>,

    #[serde(rename = "Year")]
    #[serde(default)]
    pub year: Option<i64>,
}

fn default_status() -> String {
    "active".to_string()
}

// ============================================================================
// DATABASE SETUP
// ============================================================================

/// Open the database with the settings every connection needs.
/// Call once at process start and pass the handle down - there is no
/// hidden lazy-init state anywhere in this crate.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {:?}", path))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery and concurrent readers
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            roll_no TEXT UNIQUE NOT NULL,
            rfid_uid TEXT UNIQUE NOT NULL,
            wallet_balance REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            branch TEXT,
            section TEXT,
            program TEXT,
            year INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS policies (
            service_type TEXT PRIMARY KEY,
            cost REAL NOT NULL,
            requires_payment INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // Append-only journal: one row per non-attendance access, paid or free
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tx_uuid TEXT UNIQUE NOT NULL,
            student_id INTEGER NOT NULL REFERENCES students(id),
            service_type TEXT NOT NULL,
            amount REAL NOT NULL,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    // Append-only presence log, fully decoupled from the wallet
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES students(id),
            service_context TEXT NOT NULL,
            date TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_rfid ON students(rfid_uid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_student ON transactions(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_timestamp ON transactions(timestamp)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// IDENTITY STORE
// ============================================================================

const STUDENT_COLUMNS: &str =
    "id, name, roll_no, rfid_uid, wallet_balance, status, branch, section, program, year";

fn student_from_row(row: &rusqlite::Row) -> rusqlite::Result<Student> {
    let status: String = row.get(5)?;

    Ok(Student {
        id: row.get(0)?,
        name: row.get(1)?,
        roll_no: row.get(2)?,
        rfid_uid: row.get(3)?,
        wallet_balance: row.get(4)?,
        status: StudentStatus::parse(&status),
        branch: row.get(6)?,
        section: row.get(7)?,
        program: row.get(8)?,
        year: row.get(9)?,
    })
}

/// Point lookup by card identifier. `None` means the card is unknown -
/// a terminal denial for the orchestrator, not an error.
pub fn find_student_by_identifier(conn: &Connection, rfid_uid: &str) -> Result<Option<Student>> {
    let student = conn
        .query_row(
            &format!("SELECT {} FROM students WHERE rfid_uid = ?1", STUDENT_COLUMNS),
            params![rfid_uid],
            student_from_row,
        )
        .optional()
        .context("Failed to look up student by card identifier")?;

    Ok(student)
}

pub fn list_students(conn: &Connection) -> Result<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students ORDER BY id",
        STUDENT_COLUMNS
    ))?;

    let students = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(students)
}

/// Current stored balance. Used for display after a failed debit;
/// the ledger itself never reads through this.
pub fn get_student_balance(conn: &Connection, student_id: i64) -> Result<f64> {
    let balance: f64 = conn.query_row(
        "SELECT wallet_balance FROM students WHERE id = ?1",
        params![student_id],
        |row| row.get(0),
    )?;

    Ok(balance)
}

// ============================================================================
// ROSTER IMPORT (CSV)
// ============================================================================

pub fn load_students_csv(csv_path: &Path) -> Result<Vec<RosterRow>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open roster CSV")?;

    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let row: RosterRow = result.context("Failed to deserialize roster row")?;
        rows.push(row);
    }

    Ok(rows)
}

/// Insert roster rows, skipping identifiers already enrolled.
/// Returns the number actually inserted.
pub fn insert_students(conn: &Connection, rows: &[RosterRow]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for row in rows {
        let result = conn.execute(
            "INSERT INTO students (
                name, roll_no, rfid_uid, wallet_balance, status,
                branch, section, program, year
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.name,
                row.roll_no,
                row.rfid_uid,
                row.wallet_balance,
                StudentStatus::parse(&row.status).as_str(),
                row.branch,
                row.section,
                row.program,
                row.year,
            ],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("✓ Enrolled: {} students", inserted);
    println!("✓ Skipped duplicates: {}", duplicates);

    Ok(inserted)
}

// ============================================================================
// DEMO DATA
// ============================================================================

/// Demo roster: (name, roll_no, rfid_uid, opening balance)
const DEMO_STUDENTS: [(&str, &str, &str, f64); 4] = [
    ("Yasharth Singh", "ROLL001", "RFID_001", 500.0),
    ("Mohammad Ali", "ROLL002", "RFID_002", 300.0),
    ("Vaibhav Katariya", "ROLL003", "RFID_003", 200.0),
    ("Saniya Khan", "ROLL004", "RFID_004", 400.0),
];

/// Seed students and policies on an empty database. No-op when students exist.
pub fn seed_demo_data(conn: &Connection) -> Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))?;

    if count > 0 {
        return Ok(());
    }

    for (name, roll_no, rfid_uid, balance) in DEMO_STUDENTS {
        conn.execute(
            "INSERT INTO students (name, roll_no, rfid_uid, wallet_balance)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (rfid_uid) DO NOTHING",
            params![name, roll_no, rfid_uid, balance],
        )?;
    }

    crate::policy::seed_policies(conn)?;

    Ok(())
}

/// Restore demo balances and clear the journal.
pub fn reset_demo_data(conn: &Connection) -> Result<()> {
    for (_, _, rfid_uid, balance) in DEMO_STUDENTS {
        conn.execute(
            "UPDATE students SET wallet_balance = ?1 WHERE rfid_uid = ?2",
            params![balance, rfid_uid],
        )?;
    }

    conn.execute("DELETE FROM transactions", [])?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
