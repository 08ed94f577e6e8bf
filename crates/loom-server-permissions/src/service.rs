// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The permission service: the single entry point for reads and writes.
//!
//! Resolution, inheritance switches and batches are implemented in their own
//! modules as further `impl PermissionService` blocks.

use std::sync::Arc;

use loom_permissions_core::{ToggleOutcome, ToggleRequest};
use tracing::instrument;

use crate::config::PermissionsConfig;
use crate::directory::ScopeDirectory;
use crate::error::Result;
use crate::locks::LockRegistry;
use crate::pool::create_pool;
use crate::schema::ensure_schema;
use crate::store::{PermissionStore, SqlitePermissionStore};

pub struct PermissionService {
	pub(crate) store: Arc<dyn PermissionStore>,
	pub(crate) directory: Arc<dyn ScopeDirectory>,
	pub(crate) locks: LockRegistry,
	pub(crate) config: PermissionsConfig,
}

impl PermissionService {
	pub fn new(store: Arc<dyn PermissionStore>, directory: Arc<dyn ScopeDirectory>) -> Self {
		Self::with_config(store, directory, PermissionsConfig::default())
	}

	pub fn with_config(
		store: Arc<dyn PermissionStore>,
		directory: Arc<dyn ScopeDirectory>,
		config: PermissionsConfig,
	) -> Self {
		Self {
			store,
			directory,
			locks: LockRegistry::new(config.lock_prune_threshold),
			config,
		}
	}

	/// Opens the configured database, creates the schema and builds a service on it.
	pub async fn connect(
		config: PermissionsConfig,
		directory: Arc<dyn ScopeDirectory>,
	) -> Result<Self> {
		let pool = create_pool(&config.database.url).await?;
		ensure_schema(&pool).await?;

		let store = SqlitePermissionStore::new(pool).with_default_inherits(config.default_inherits);
		tracing::info!(url = %config.database.url, "permission service connected");
		Ok(Self::with_config(Arc::new(store), directory, config))
	}

	pub fn store(&self) -> &Arc<dyn PermissionStore> {
		&self.store
	}

	pub fn directory(&self) -> &Arc<dyn ScopeDirectory> {
		&self.directory
	}

	pub fn config(&self) -> &PermissionsConfig {
		&self.config
	}

	/// Switches one capability level on or off for an independent scope.
	///
	/// Granting a level grants every lower level; revoking a level revokes
	/// every higher level. Repeating a toggle is a no-op.
	///
	/// # Errors
	/// - `ScopeNotIndependentConflict` if the scope inherits from its parent.
	/// - `StoreUnavailable` (database errors) if the cascade could not commit;
	///   nothing is written in that case.
	#[instrument(
		skip(self, request),
		fields(
			scope = %request.scope,
			target = %request.target,
			level = %request.level,
			desired_on = request.desired_on
		)
	)]
	pub async fn toggle(&self, request: &ToggleRequest) -> Result<ToggleOutcome> {
		let _scope_guard = self.locks.read_scope(&request.scope).await;
		let _module_guard = self
			.locks
			.lock_module(&request.scope, request.target.module_id)
			.await;

		let outcome = self
			.store
			.apply_toggle(
				&request.scope,
				&request.target,
				request.level,
				request.desired_on,
			)
			.await?;

		if outcome.is_noop() {
			tracing::debug!("toggle changed nothing");
		} else {
			tracing::info!(
				granted = outcome.granted.len(),
				revoked = outcome.revoked.len(),
				"permission toggled"
			);
		}
		Ok(outcome)
	}
}
