// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::str::FromStr;
use std::sync::Arc;

use loom_permissions_core::{ScopeId, ScopeNode, ScopeRef};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::PermissionsConfig;
use crate::directory::StaticScopeDirectory;
use crate::schema::ensure_schema;
use crate::service::PermissionService;
use crate::store::SqlitePermissionStore;

/// Single-connection in-memory pool, so every query sees the same database.
pub async fn create_test_pool() -> SqlitePool {
	let options = SqliteConnectOptions::from_str(":memory:")
		.unwrap()
		.create_if_missing(true);

	SqlitePoolOptions::new()
		.max_connections(1)
		.connect_with(options)
		.await
		.expect("Failed to create test pool")
}

pub async fn create_permissions_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	ensure_schema(&pool).await.unwrap();
	pool
}

pub async fn make_store() -> SqlitePermissionStore {
	SqlitePermissionStore::new(create_permissions_test_pool().await)
}

/// One org with one cohort holding one individual.
pub struct TestTree {
	pub org: ScopeRef,
	pub cohort: ScopeRef,
	pub individual: ScopeRef,
	pub directory: Arc<StaticScopeDirectory>,
}

pub async fn make_tree() -> TestTree {
	let org_id = ScopeId::generate();
	let cohort_id = ScopeId::generate();
	let individual_id = ScopeId::generate();

	let directory = Arc::new(StaticScopeDirectory::new());
	directory.insert(ScopeNode::org(org_id)).await.unwrap();
	directory
		.insert(ScopeNode::cohort(cohort_id, org_id))
		.await
		.unwrap();
	directory
		.insert(ScopeNode::individual(individual_id, cohort_id))
		.await
		.unwrap();

	TestTree {
		org: ScopeRef::org(org_id),
		cohort: ScopeRef::cohort(cohort_id),
		individual: ScopeRef::individual(individual_id),
		directory,
	}
}

pub async fn make_service() -> (PermissionService, TestTree) {
	let tree = make_tree().await;
	let store = Arc::new(make_store().await);
	let service = PermissionService::new(store, tree.directory.clone());
	(service, tree)
}

/// A service on a WAL database file with a full connection pool.
///
/// Scopes start out independent. Keep the returned directory alive for as
/// long as the service is used.
pub async fn make_file_service() -> (PermissionService, TestTree, tempfile::TempDir) {
	let dir = tempfile::tempdir().unwrap();
	let mut config = PermissionsConfig::default();
	config.database.url = format!("sqlite:{}", dir.path().join("permissions.db").display());
	config.default_inherits = false;

	let tree = make_tree().await;
	let service = PermissionService::connect(config, tree.directory.clone())
		.await
		.unwrap();
	(service, tree, dir)
}
