// 🎫 Tap Orchestrator - one card tap, one auditable outcome
// resolve identity → classify service → policy → permission → ledger/attendance
//
// Business denials come back as TapOutcome variants, never as errors.
// Only infrastructure failures (store unreachable, corrupt row) are Err.

use crate::db::{self, Student};
use crate::permission::{self, AccessReason};
use crate::policy::{self, Policy};
use crate::{attendance, ledger};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

// ============================================================================
// ACADEMIC ATTRIBUTES (carried on success outcomes for display)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcademicInfo {
    pub branch: Option<String>,
    pub section: Option<String>,
    pub program: Option<String>,
    pub year: Option<i64>,
}

impl From<&Student> for AcademicInfo {
    fn from(student: &Student) -> Self {
        AcademicInfo {
            branch: student.branch.clone(),
            section: student.section.clone(),
            program: student.program.clone(),
            year: student.year,
        }
    }
}

// ============================================================================
// TAP OUTCOME
// ============================================================================

/// Terminal result of a tap. Each variant carries only the fields that
/// exist on its path, so callers can pattern-match exhaustively instead
/// of probing optional fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum TapOutcome {
    /// Identifier resolved to no student. Nothing was read or written
    /// beyond the lookup itself.
    CardUnknown { service: String },

    /// Student exists but is not active. Denied before any policy or
    /// ledger logic runs, on every path.
    AccountInactive {
        student_name: String,
        service: String,
        balance: f64,
    },

    /// No policy anywhere (catalog or defaults) for this service.
    /// Never charges, never logs attendance.
    UnknownService {
        student_name: String,
        service: String,
        balance: f64,
    },

    /// Permission evaluator said no (insufficient balance).
    Denied {
        student_name: String,
        service: String,
        reason: AccessReason,
        balance: f64,
    },

    /// The evaluator approved on its earlier read, but the conditional
    /// debit found the stored balance short - a concurrent tap won.
    /// Balance re-read for display, unchanged by this tap.
    TransactionFailed {
        student_name: String,
        service: String,
        balance: f64,
    },

    /// The attendance store refused the append.
    AttendanceFailed {
        student_name: String,
        service: String,
        balance: f64,
    },

    /// Access granted. `amount_deducted` is None for free services,
    /// and `balance` is then simply the unchanged wallet.
    Approved {
        student_name: String,
        service: String,
        reason: AccessReason,
        amount_deducted: Option<f64>,
        balance: f64,
        academic: AcademicInfo,
    },

    /// Presence recorded. Wallet untouched by construction.
    AttendanceMarked {
        student_name: String,
        service: String,
        balance: f64,
        academic: AcademicInfo,
        timestamp: DateTime<Utc>,
    },
}

impl TapOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TapOutcome::Approved { .. } | TapOutcome::AttendanceMarked { .. }
        )
    }

    pub fn student_name(&self) -> &str {
        match self {
            TapOutcome::CardUnknown { .. } => "Unknown",
            TapOutcome::AccountInactive { student_name, .. }
            | TapOutcome::UnknownService { student_name, .. }
            | TapOutcome::Denied { student_name, .. }
            | TapOutcome::TransactionFailed { student_name, .. }
            | TapOutcome::AttendanceFailed { student_name, .. }
            | TapOutcome::Approved { student_name, .. }
            | TapOutcome::AttendanceMarked { student_name, .. } => student_name,
        }
    }

    pub fn balance(&self) -> f64 {
        match self {
            TapOutcome::CardUnknown { .. } => 0.0,
            TapOutcome::AccountInactive { balance, .. }
            | TapOutcome::UnknownService { balance, .. }
            | TapOutcome::Denied { balance, .. }
            | TapOutcome::TransactionFailed { balance, .. }
            | TapOutcome::AttendanceFailed { balance, .. }
            | TapOutcome::Approved { balance, .. }
            | TapOutcome::AttendanceMarked { balance, .. } => *balance,
        }
    }

    /// Human-readable action line, exactly as the calling UIs render it.
    pub fn action(&self) -> String {
        match self {
            TapOutcome::CardUnknown { .. } => "Invalid Card - Identity Not Found".to_string(),
            TapOutcome::AccountInactive { .. } => AccessReason::AccountInactive.message().to_string(),
            TapOutcome::UnknownService { service, .. } => {
                format!("Unknown service: {}", service)
            }
            TapOutcome::Denied { reason, .. } => reason.message().to_string(),
            TapOutcome::TransactionFailed { .. } => "Transaction Failed".to_string(),
            TapOutcome::AttendanceFailed { .. } => "Failed to log attendance".to_string(),
            TapOutcome::Approved { reason, .. } => reason.message().to_string(),
            TapOutcome::AttendanceMarked { .. } => "Attendance Marked".to_string(),
        }
    }
}

// ============================================================================
// WIRE CONTRACT
// ============================================================================

/// Flat response shape the calling UIs consume. Field names and action
/// strings are part of the contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapResponse {
    pub success: bool,
    pub student: String,
    pub service: String,
    pub action: String,
    pub balance_remaining: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_deducted: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_timestamp: Option<DateTime<Utc>>,
}

/// Display label for a service: first letter upper-cased, rest as given.
pub fn service_label(service: &str) -> String {
    let mut chars = service.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

impl TapOutcome {
    pub fn to_response(&self, service: &str) -> TapResponse {
        let mut response = TapResponse {
            success: self.is_success(),
            student: self.student_name().to_string(),
            service: service_label(service),
            action: self.action(),
            balance_remaining: self.balance(),
            amount_deducted: None,
            branch: None,
            section: None,
            program: None,
            year: None,
            attendance_timestamp: None,
        };

        match self {
            TapOutcome::Approved {
                amount_deducted,
                academic,
                ..
            } => {
                response.amount_deducted = *amount_deducted;
                response.branch = academic.branch.clone();
                response.section = academic.section.clone();
                response.program = academic.program.clone();
                response.year = academic.year;
            }
            TapOutcome::AttendanceMarked {
                academic,
                timestamp,
                ..
            } => {
                response.branch = academic.branch.clone();
                response.section = academic.section.clone();
                response.program = academic.program.clone();
                response.year = academic.year;
                response.attendance_timestamp = Some(*timestamp);
            }
            _ => {}
        }

        response
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Process one tap: identifier + requested service → outcome.
///
/// `context` is recorded on attendance taps (room, lecture code...);
/// it defaults to the lowercased service name.
pub fn process_tap(
    conn: &mut Connection,
    identifier: &str,
    service: &str,
    context: Option<&str>,
) -> Result<TapOutcome> {
    let service_lower = service.to_lowercase();

    // Identity resolution - unknown card is terminal
    let student = match db::find_student_by_identifier(conn, identifier)? {
        Some(student) => student,
        None => {
            return Ok(TapOutcome::CardUnknown {
                service: service_lower,
            })
        }
    };

    // Inactive accounts are denied before any policy or ledger logic
    if !student.is_active() {
        return Ok(TapOutcome::AccountInactive {
            student_name: student.name,
            service: service_lower,
            balance: student.wallet_balance,
        });
    }

    // Service classification
    if service_lower == "attendance" {
        attendance_path(conn, &student, &service_lower, context)
    } else {
        payment_path(conn, &student, &service_lower)
    }
}

/// Attendance: identity-only verification, no wallet logic.
fn attendance_path(
    conn: &Connection,
    student: &Student,
    service: &str,
    context: Option<&str>,
) -> Result<TapOutcome> {
    let context = context.unwrap_or(service);

    if attendance::record_attendance(conn, student.id, context).is_err() {
        return Ok(TapOutcome::AttendanceFailed {
            student_name: student.name.clone(),
            service: service.to_string(),
            balance: student.wallet_balance,
        });
    }

    Ok(TapOutcome::AttendanceMarked {
        student_name: student.name.clone(),
        service: service.to_string(),
        balance: student.wallet_balance,
        academic: AcademicInfo::from(student),
        timestamp: Utc::now(),
    })
}

/// Everything else: policy lookup, permission check, then the ledger.
fn payment_path(conn: &mut Connection, student: &Student, service: &str) -> Result<TapOutcome> {
    let policy = match policy::find_policy(conn, service) {
        Some(policy) => policy,
        None => {
            return Ok(TapOutcome::UnknownService {
                student_name: student.name.clone(),
                service: service.to_string(),
                balance: student.wallet_balance,
            })
        }
    };

    let decision = permission::evaluate(student, &policy);

    if !decision.allowed {
        return Ok(TapOutcome::Denied {
            student_name: student.name.clone(),
            service: service.to_string(),
            reason: decision.reason,
            balance: student.wallet_balance,
        });
    }

    if policy.requires_payment && policy.cost > 0.0 {
        charge(conn, student, service, &policy, decision.reason)
    } else {
        // Free access: journal best-effort, the grant never blocks on it
        let _ = ledger::record_free_access(conn, student.id, service);

        Ok(TapOutcome::Approved {
            student_name: student.name.clone(),
            service: service.to_string(),
            reason: decision.reason,
            amount_deducted: None,
            balance: student.wallet_balance,
            academic: AcademicInfo::from(student),
        })
    }
}

fn charge(
    conn: &mut Connection,
    student: &Student,
    service: &str,
    policy: &Policy,
    reason: AccessReason,
) -> Result<TapOutcome> {
    match ledger::debit(conn, student.id, policy.cost, service)? {
        Some(new_balance) => Ok(TapOutcome::Approved {
            student_name: student.name.clone(),
            service: service.to_string(),
            reason,
            amount_deducted: Some(policy.cost),
            balance: new_balance,
            academic: AcademicInfo::from(student),
        }),
        None => {
            // The evaluator approved on a stale read; the store said no.
            // Re-read once so the outcome shows the current balance.
            let balance = db::get_student_balance(conn, student.id)?;

            Ok(TapOutcome::TransactionFailed {
                student_name: student.name.clone(),
                service: service.to_string(),
                balance,
            })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
