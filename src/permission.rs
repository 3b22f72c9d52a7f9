// Permission Evaluator - pure allow/deny decision
// No side effects: (student, policy) in, decision out

use crate::db::Student;
use crate::policy::Policy;
use serde::{Deserialize, Serialize};

// ============================================================================
// DECISION REASON
// ============================================================================

/// Why a tap was allowed or denied. The wire-facing message for each
/// reason is fixed - calling UIs render these strings verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessReason {
    /// Student status is not active
    AccountInactive,

    /// Paid service, wallet balance below cost
    InsufficientBalance,

    /// Paid service, balance covers the cost
    PaymentApproved,

    /// Free service, nothing to charge
    AccessGranted,
}

impl AccessReason {
    pub fn message(&self) -> &'static str {
        match self {
            AccessReason::AccountInactive => "Student account is not active",
            AccessReason::InsufficientBalance => "Insufficient Balance",
            AccessReason::PaymentApproved => "Payment Approved",
            AccessReason::AccessGranted => "Access Granted",
        }
    }
}

// ============================================================================
// DECISION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl PermissionDecision {
    fn deny(reason: AccessReason) -> Self {
        PermissionDecision {
            allowed: false,
            reason,
        }
    }

    fn allow(reason: AccessReason) -> Self {
        PermissionDecision {
            allowed: true,
            reason,
        }
    }
}

/// Evaluate a tap against a policy. Rules apply in strict order,
/// first match wins:
///
/// 1. Inactive student → deny (AccountInactive)
/// 2. Paid service and balance < cost → deny (InsufficientBalance)
/// 3. Otherwise allow - PaymentApproved for paid, AccessGranted for free
///
/// The balance check here reads the balance resolved earlier in the
/// request; the ledger re-checks atomically at debit time.
pub fn evaluate(student: &Student, policy: &Policy) -> PermissionDecision {
    if !student.is_active() {
        return PermissionDecision::deny(AccessReason::AccountInactive);
    }

    if policy.requires_payment && student.wallet_balance < policy.cost {
        return PermissionDecision::deny(AccessReason::InsufficientBalance);
    }

    if policy.requires_payment {
        PermissionDecision::allow(AccessReason::PaymentApproved)
    } else {
        PermissionDecision::allow(AccessReason::AccessGranted)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StudentStatus;

    fn student(status: StudentStatus, balance: f64) -> Student {
        Student {
            id: 1,
            name: "Test Student".to_string(),
            roll_no: "ROLL001".to_string(),
            rfid_uid: "RFID_001".to_string(),
            wallet_balance: balance,
            status,
            branch: None,
            section: None,
            program: None,
            year: None,
        }
    }

    fn policy(cost: f64, requires_payment: bool) -> Policy {
        Policy::new("mess", cost, requires_payment)
    }

    #[test]
    fn test_inactive_student_denied() {
        let decision = evaluate(&student(StudentStatus::Inactive, 1000.0), &policy(50.0, true));

        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::AccountInactive);
    }

    #[test]
    fn test_inactive_beats_balance_check() {
        // Status rule fires first even when the balance would also fail
        let decision = evaluate(&student(StudentStatus::Inactive, 0.0), &policy(50.0, true));

        assert_eq!(decision.reason, AccessReason::AccountInactive);
    }

    #[test]
    fn test_insufficient_balance_denied() {
        let decision = evaluate(&student(StudentStatus::Active, 10.0), &policy(20.0, true));

        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::InsufficientBalance);
    }

    #[test]
    fn test_exact_balance_is_approved() {
        let decision = evaluate(&student(StudentStatus::Active, 50.0), &policy(50.0, true));

        assert!(decision.allowed);
        assert_eq!(decision.reason, AccessReason::PaymentApproved);
    }

    #[test]
    fn test_free_service_ignores_balance() {
        // Stored cost on a free policy is never charged or checked
        let decision = evaluate(&student(StudentStatus::Active, 0.0), &policy(100.0, false));

        assert!(decision.allowed);
        assert_eq!(decision.reason, AccessReason::AccessGranted);
    }

    #[test]
    fn test_reason_messages() {
        assert_eq!(
            AccessReason::AccountInactive.message(),
            "Student account is not active"
        );
        assert_eq!(
            AccessReason::InsufficientBalance.message(),
            "Insufficient Balance"
        );
        assert_eq!(AccessReason::PaymentApproved.message(), "Payment Approved");
        assert_eq!(AccessReason::AccessGranted.message(), "Access Granted");
    }
}
