// crates/admission-gate-store-sqlite/tests/sqlite_policy_store.rs
// ============================================================================
// Module: SQLite Policy Store Tests
// Description: Persistence, path safety, and schema version checks.
// Purpose: Ensure policy edits survive reopen and bad databases fail closed.
// ============================================================================

//! ## Overview
//! Integration tests for [`SqlitePolicyStore`]:
//! - Set semantics for grants and rules
//! - Flag upsert and removal
//! - Persistence across reopen and seed precedence
//! - Path and schema version rejection

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use admission_gate_core::Action;
use admission_gate_core::FeatureFlag;
use admission_gate_core::PolicyRule;
use admission_gate_core::PolicySnapshot;
use admission_gate_core::PolicyStore;
use admission_gate_core::RoleAssignment;
use admission_gate_core::RoleName;
use admission_gate_store_sqlite::SqlitePolicyStore;
use admission_gate_store_sqlite::SqlitePolicyStoreConfig;
use admission_gate_store_sqlite::SqlitePolicyStoreError;
use rusqlite::Connection;
use tempfile::TempDir;

fn open_in(dir: &TempDir) -> SqlitePolicyStore {
    SqlitePolicyStore::open(&SqlitePolicyStoreConfig::new(dir.path().join("policy.db"))).unwrap()
}

fn beta_flag(public_access: bool) -> FeatureFlag {
    FeatureFlag {
        name: "beta_reports".to_string(),
        enabled: true,
        public_access,
        allowed_roles: vec![RoleName::new("analyst")],
        description: Some("quarterly reports".to_string()),
    }
}

#[test]
fn grants_and_rules_behave_as_sets() {
    let dir = TempDir::new().unwrap();
    let store = open_in(&dir);
    let grant = RoleAssignment::new("alice", "editor");
    assert!(store.grant_role(&grant).unwrap());
    assert!(!store.grant_role(&grant).unwrap());

    let rule = PolicyRule::new("editor", "inventory", Action::Write);
    assert!(store.add_rule(&rule).unwrap());
    assert!(!store.add_rule(&rule).unwrap());

    let snapshot = store.load_snapshot().unwrap();
    assert_eq!(snapshot.assignments, vec![grant.clone()]);
    assert_eq!(snapshot.rules, vec![rule.clone()]);

    assert!(store.revoke_role(&grant).unwrap());
    assert!(!store.revoke_role(&grant).unwrap());
    assert!(store.remove_rule(&rule).unwrap());
    assert!(store.load_snapshot().unwrap().rules.is_empty());
}

#[test]
fn named_actions_survive_storage() {
    let dir = TempDir::new().unwrap();
    let store = open_in(&dir);
    let rule = PolicyRule::new("ops", "deployments", Action::parse("rollback"));
    store.add_rule(&rule).unwrap();
    let loaded = store.load_snapshot().unwrap();
    assert_eq!(loaded.rules[0].action, Action::Named("rollback".to_string()));
}

#[test]
fn flags_upsert_and_remove() {
    let dir = TempDir::new().unwrap();
    let store = open_in(&dir);
    store.upsert_flag(&beta_flag(false)).unwrap();
    assert_eq!(store.feature_flag("beta_reports").unwrap(), Some(beta_flag(false)));

    store.upsert_flag(&beta_flag(true)).unwrap();
    let listed = store.list_flags().unwrap();
    assert_eq!(listed, vec![beta_flag(true)]);

    assert!(store.remove_flag("beta_reports").unwrap());
    assert!(!store.remove_flag("beta_reports").unwrap());
    assert_eq!(store.feature_flag("beta_reports").unwrap(), None);
}

#[test]
fn records_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_in(&dir);
        store.grant_role(&RoleAssignment::new("alice", "admin")).unwrap();
        store.upsert_flag(&beta_flag(true)).unwrap();
    }
    let reopened = open_in(&dir);
    let snapshot = reopened.load_snapshot().unwrap();
    assert_eq!(snapshot.assignments, vec![RoleAssignment::new("alice", "admin")]);
    assert!(reopened.feature_flag("beta_reports").unwrap().is_some());
}

#[test]
fn seeding_keeps_operator_edits() {
    let dir = TempDir::new().unwrap();
    let store = open_in(&dir);
    store.upsert_flag(&beta_flag(false)).unwrap();
    let seed = PolicySnapshot {
        assignments: vec![RoleAssignment::new("bob", "viewer")],
        rules: vec![PolicyRule::new("viewer", "reports", Action::Read)],
    };
    assert!(store.seed(&seed, &[beta_flag(true)]).unwrap());
    assert!(!store.seed(&seed, &[beta_flag(true)]).unwrap());

    let snapshot = store.load_snapshot().unwrap();
    assert_eq!(snapshot.assignments.len(), 1);
    assert_eq!(snapshot.rules.len(), 1);
    assert!(!store.feature_flag("beta_reports").unwrap().unwrap().public_access);
}

#[test]
fn revoked_seed_records_stay_revoked_after_reopen() {
    let dir = TempDir::new().unwrap();
    let seed = PolicySnapshot {
        assignments: vec![RoleAssignment::new("bob", "admin")],
        rules: Vec::new(),
    };
    {
        let store = open_in(&dir);
        assert!(store.seed(&seed, &[]).unwrap());
        assert!(store.revoke_role(&RoleAssignment::new("bob", "admin")).unwrap());
    }
    let reopened = open_in(&dir);
    assert!(!reopened.seed(&seed, &[]).unwrap());
    assert!(reopened.load_snapshot().unwrap().assignments.is_empty());
}

#[test]
fn rejects_directory_path() {
    let dir = TempDir::new().unwrap();
    let result = SqlitePolicyStore::open(&SqlitePolicyStoreConfig::new(dir.path()));
    assert!(matches!(result, Err(SqlitePolicyStoreError::Invalid(_))));
}

#[test]
fn rejects_overlong_component() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a".repeat(300));
    let result = SqlitePolicyStore::open(&SqlitePolicyStoreConfig::new(path));
    assert!(matches!(result, Err(SqlitePolicyStoreError::Invalid(_))));
}

#[test]
fn rejects_unknown_schema_version() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("policy.db");
    drop(SqlitePolicyStore::open(&SqlitePolicyStoreConfig::new(&path)).unwrap());
    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = 99", []).unwrap();
    drop(connection);

    let result = SqlitePolicyStore::open(&SqlitePolicyStoreConfig::new(&path));
    assert!(matches!(result, Err(SqlitePolicyStoreError::VersionMismatch(_))));
}

#[test]
fn malformed_flag_rows_fail_closed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("policy.db");
    drop(SqlitePolicyStore::open(&SqlitePolicyStoreConfig::new(&path)).unwrap());
    let connection = Connection::open(&path).unwrap();
    connection
        .execute(
            "INSERT INTO feature_flags (name, enabled, public_access, allowed_roles) \
             VALUES ('broken', 1, 1, 'not json')",
            [],
        )
        .unwrap();
    drop(connection);

    let store = SqlitePolicyStore::open(&SqlitePolicyStoreConfig::new(&path)).unwrap();
    assert!(store.feature_flag("broken").is_err());
    assert!(store.list_flags().is_err());
}
