// UniID - Campus Identity & Access Core
// Exposes the tap processing engine for the CLI, API server, and tests

pub mod db;
pub mod policy;
pub mod permission;
pub mod ledger;
pub mod attendance;
pub mod tap;

// Re-export commonly used types
pub use db::{
    open_database, setup_database, seed_demo_data, reset_demo_data,
    find_student_by_identifier, list_students, get_student_balance,
    load_students_csv, insert_students,
    Student, StudentStatus, RosterRow,
};
pub use policy::{
    find_policy, list_policies, seed_policies, default_policy,
    Policy,
};
pub use permission::{
    evaluate, AccessReason, PermissionDecision,
};
pub use ledger::{
    debit, record_free_access, list_transactions, transactions_for_student,
    TransactionRecord,
};
pub use attendance::{
    record_attendance, list_attendance, attendance_count,
    AttendanceRecord, AttendanceFilter,
};
pub use tap::{
    process_tap, service_label,
    TapOutcome, TapResponse, AcademicInfo,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
