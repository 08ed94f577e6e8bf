// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Detaching a scope from its parent, and re-attaching it.
//!
//! Detaching copies the ancestor's effective grants onto the scope, so what
//! the scope can do is unchanged at the instant of the switch. Re-attaching
//! deletes the scope's own grants.

use async_trait::async_trait;
use loom_permissions_core::{closed_entries, GrantEntry, PermissionsError, ScopeRef};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::service::PermissionService;

/// Supplies the grants a detaching scope should start out with.
#[async_trait]
pub trait AncestorSnapshotProvider: Send + Sync {
	/// Effective grants of the parent of `scope`, across all modules.
	async fn snapshot(&self, scope: &ScopeRef) -> Result<Vec<GrantEntry>>;
}

/// A snapshot captured by the caller ahead of time.
#[derive(Debug, Clone, Default)]
pub struct FixedSnapshot(pub Vec<GrantEntry>);

#[async_trait]
impl AncestorSnapshotProvider for FixedSnapshot {
	async fn snapshot(&self, _scope: &ScopeRef) -> Result<Vec<GrantEntry>> {
		Ok(self.0.clone())
	}
}

#[async_trait]
impl AncestorSnapshotProvider for PermissionService {
	async fn snapshot(&self, scope: &ScopeRef) -> Result<Vec<GrantEntry>> {
		let parent = self.parent_for_inheritance(scope).await?;
		let holder = self.effective_holder(&parent).await?;
		let grants = self.store.scope_grants(&holder).await?;
		Ok(grants.iter().map(|g| g.entry()).collect())
	}
}

/// What a call to `set_inheritance` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InheritanceChange {
	/// The scope already had the requested flag.
	Unchanged,
	/// The scope became independent with `copied` grant rows.
	Detached { copied: usize },
	/// The scope inherits again; `removed` direct rows were deleted.
	Reattached { removed: usize },
}

impl PermissionService {
	/// Switches `scope` between inheriting and independent, using the live
	/// resolver to snapshot the parent.
	pub async fn set_inheritance(
		&self,
		scope: &ScopeRef,
		inherit: bool,
	) -> Result<InheritanceChange> {
		self.set_inheritance_with(scope, inherit, self).await
	}

	/// Switches `scope` between inheriting and independent.
	///
	/// Calling with the current flag is a no-op. While the switch runs no
	/// toggle on the scope can interleave.
	///
	/// # Errors
	/// `AncestorUnresolvable` if an organization is asked to inherit, or if the
	/// scope's parent cannot be found when detaching.
	#[instrument(skip(self, provider), fields(scope = %scope))]
	pub async fn set_inheritance_with(
		&self,
		scope: &ScopeRef,
		inherit: bool,
		provider: &dyn AncestorSnapshotProvider,
	) -> Result<InheritanceChange> {
		if !scope.scope_type.can_inherit() {
			if inherit {
				return Err(PermissionsError::AncestorUnresolvable { scope: *scope }.into());
			}
			return Ok(InheritanceChange::Unchanged);
		}

		let _guard = self.locks.write_scope(scope).await;

		if self.store.is_inheriting(scope).await? == inherit {
			tracing::debug!("inheritance already in requested state");
			return Ok(InheritanceChange::Unchanged);
		}

		if inherit {
			let removed = self.store.reattach(scope).await?;
			tracing::info!(removed, "scope re-attached to parent");
			return Ok(InheritanceChange::Reattached { removed });
		}

		self.parent_for_inheritance(scope).await?;
		let entries = closed_entries(provider.snapshot(scope).await?);
		let copied = self.store.detach(scope, &entries).await?;
		tracing::info!(copied, "scope detached from parent");
		Ok(InheritanceChange::Detached { copied })
	}
}
