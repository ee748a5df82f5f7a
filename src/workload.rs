//! Workload scaffolding: synthetic keys and task identities used by the
//! demos and tests.

use uuid::Uuid;

/// A fresh, collision-free key for synthetic entries.
pub fn unique_key() -> String {
    Uuid::new_v4().to_string()
}

/// The fixed universe of counting keys: `item0` through `item{n-1}`.
pub fn key_universe(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("item{}", i)).collect()
}

/// Distinct task identities for the scoped-context demos: `user-1` on up.
pub fn identities(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("user-{}", i)).collect()
}
