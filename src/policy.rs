// 🏷️ Policy Catalog - Service access rules as data
// One lookup function, one constant fallback table

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

// ============================================================================
// POLICY DEFINITION
// ============================================================================

/// Per-service access rule. If `requires_payment` is false the stored
/// cost is never charged, whatever its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Service name, stored lowercase
    pub service_type: String,

    /// Cost per access (non-negative)
    pub cost: f64,

    /// Whether an access debits the wallet
    pub requires_payment: bool,
}

impl Policy {
    pub fn new(service_type: &str, cost: f64, requires_payment: bool) -> Self {
        Policy {
            service_type: service_type.to_lowercase(),
            cost,
            requires_payment,
        }
    }

    pub fn is_free(&self) -> bool {
        !self.requires_payment
    }
}

// ============================================================================
// BUILT-IN DEFAULTS
// ============================================================================

/// Canonical services, used whenever the catalog has no row.
/// Keeps taps working while the persistence layer is cold or empty.
const DEFAULT_POLICIES: [(&str, f64, bool); 4] = [
    ("attendance", 0.0, false),
    ("library", 0.0, false),
    ("mess", 50.0, true),
    ("transport", 20.0, true),
];

/// Built-in policy for a canonical service; None for anything else.
pub fn default_policy(service_type: &str) -> Option<Policy> {
    let service = service_type.to_lowercase();

    DEFAULT_POLICIES
        .iter()
        .find(|(name, _, _)| *name == service)
        .map(|(name, cost, requires_payment)| Policy {
            service_type: name.to_string(),
            cost: *cost,
            requires_payment: *requires_payment,
        })
}

// ============================================================================
// CATALOG LOOKUP
// ============================================================================

/// Case-insensitive policy lookup. A stored row wins; with no row (or a
/// cold store) the built-in defaults answer for the canonical services.
/// `None` means the service is unknown everywhere - a distinct denial,
/// never a charge.
pub fn find_policy(conn: &Connection, service_type: &str) -> Option<Policy> {
    let service = service_type.to_lowercase();

    let stored = conn
        .query_row(
            "SELECT service_type, cost, requires_payment
             FROM policies WHERE service_type = ?1",
            params![service],
            policy_from_row,
        )
        .optional();

    match stored {
        Ok(Some(policy)) => Some(policy),
        // No row, or the policies table is unavailable - degrade to defaults
        Ok(None) | Err(_) => default_policy(&service),
    }
}

pub fn list_policies(conn: &Connection) -> Vec<Policy> {
    let stored = conn
        .prepare("SELECT service_type, cost, requires_payment FROM policies ORDER BY service_type")
        .and_then(|mut stmt| {
            stmt.query_map([], policy_from_row)?
                .collect::<Result<Vec<_>, _>>()
        });

    match stored {
        Ok(policies) if !policies.is_empty() => policies,
        _ => DEFAULT_POLICIES
            .iter()
            .map(|(name, cost, requires_payment)| Policy {
                service_type: name.to_string(),
                cost: *cost,
                requires_payment: *requires_payment,
            })
            .collect(),
    }
}

/// Write the default table into the catalog, keeping existing rows.
pub fn seed_policies(conn: &Connection) -> anyhow::Result<()> {
    for (service_type, cost, requires_payment) in DEFAULT_POLICIES {
        conn.execute(
            "INSERT INTO policies (service_type, cost, requires_payment)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (service_type) DO NOTHING",
            params![service_type, cost, requires_payment],
        )?;
    }

    Ok(())
}

fn policy_from_row(row: &rusqlite::Row) -> rusqlite::Result<Policy> {
    Ok(Policy {
        service_type: row.get(0)?,
        cost: row.get(1)?,
        requires_payment: row.get(2)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let conn = test_conn();
        seed_policies(&conn).unwrap();

        let lower = find_policy(&conn, "mess").unwrap();
        let upper = find_policy(&conn, "MESS").unwrap();

        assert_eq!(lower, upper);
        assert_eq!(lower.cost, 50.0);
        assert!(lower.requires_payment);
    }

    #[test]
    fn test_defaults_answer_on_empty_catalog() {
        let conn = test_conn();
        // No seed_policies - catalog is empty

        let transport = find_policy(&conn, "transport").unwrap();
        assert_eq!(transport.cost, 20.0);
        assert!(transport.requires_payment);

        let library = find_policy(&conn, "library").unwrap();
        assert!(library.is_free());
    }

    #[test]
    fn test_stored_row_overrides_default() {
        let conn = test_conn();
        seed_policies(&conn).unwrap();

        conn.execute(
            "UPDATE policies SET cost = 75.0 WHERE service_type = 'mess'",
            [],
        )
        .unwrap();

        let mess = find_policy(&conn, "mess").unwrap();
        assert_eq!(mess.cost, 75.0);
    }

    #[test]
    fn test_unknown_service_is_none() {
        let conn = test_conn();
        seed_policies(&conn).unwrap();

        assert!(find_policy(&conn, "swimming_pool").is_none());
        assert!(default_policy("swimming_pool").is_none());
    }

    #[test]
    fn test_lookup_degrades_without_policies_table() {
        // Bare connection, schema never created
        let conn = Connection::open_in_memory().unwrap();

        let mess = find_policy(&conn, "mess").unwrap();
        assert_eq!(mess.cost, 50.0);

        assert!(find_policy(&conn, "swimming_pool").is_none());

        let listed = list_policies(&conn);
        assert_eq!(listed.len(), 4);
    }

    #[test]
    fn test_list_prefers_stored_rows() {
        let conn = test_conn();
        seed_policies(&conn).unwrap();

        conn.execute(
            "INSERT INTO policies (service_type, cost, requires_payment)
             VALUES ('gym', 10.0, 1)",
            [],
        )
        .unwrap();

        let listed = list_policies(&conn);
        assert_eq!(listed.len(), 5);
        assert!(listed.iter().any(|p| p.service_type == "gym"));
    }
}
