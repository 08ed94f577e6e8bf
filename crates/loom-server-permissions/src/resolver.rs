// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Effective-permission resolution.
//!
//! An inheriting scope mirrors the nearest independent ancestor, so resolving
//! always means finding that holder and folding its direct grants. Nothing
//! here writes to the store.

use std::collections::HashMap;

use loom_permissions_core::{
	GrantEntry, LevelSet, PermissionsError, ResolvedPermissions, ResourceTarget, ScopeRef,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::service::PermissionService;

/// One row of the presentation tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTreeEntry {
	pub scope: ScopeRef,
	pub parent: Option<ScopeRef>,
	/// 0 for the root of the walk.
	pub depth: usize,
	pub inherits: bool,
	pub resolved: ResolvedPermissions,
}

impl PermissionService {
	/// Returns the scope whose direct grants `scope` currently sees.
	///
	/// That is `scope` itself when independent, otherwise the first
	/// independent ancestor.
	///
	/// # Errors
	/// `AncestorUnresolvable` if an inheriting scope has no parent, a parent
	/// that is not exactly one stratum above it, or a parent that has been
	/// removed from the directory.
	#[instrument(skip(self), fields(scope = %scope))]
	pub async fn effective_holder(&self, scope: &ScopeRef) -> Result<ScopeRef> {
		let mut current = *scope;
		while self.store.is_inheriting(&current).await? {
			current = self.parent_for_inheritance(&current).await?;
		}
		Ok(current)
	}

	/// The parent `scope` inherits from.
	///
	/// A parent that is still referenced but no longer registered in the
	/// directory does not count.
	pub(crate) async fn parent_for_inheritance(&self, scope: &ScopeRef) -> Result<ScopeRef> {
		let parent = match self.directory.parent_of(scope).await? {
			Some(parent) if Some(parent.scope_type) == scope.scope_type.parent_type() => parent,
			other => {
				tracing::debug!(scope = %scope, parent = ?other, "scope has no valid parent");
				return Err(PermissionsError::AncestorUnresolvable { scope: *scope }.into());
			}
		};

		if !self.directory.contains(&parent).await? {
			tracing::debug!(scope = %scope, parent = %parent, "parent is no longer registered");
			return Err(PermissionsError::AncestorUnresolvable { scope: *scope }.into());
		}
		Ok(parent)
	}

	/// Effective levels of `scope` on a module or lesson.
	///
	/// Module-wide grants count towards every lesson of the module.
	pub async fn resolve(&self, scope: &ScopeRef, target: &ResourceTarget) -> Result<LevelSet> {
		Ok(self.resolve_detailed(scope, target).await?.level_set())
	}

	/// Like [`resolve`](Self::resolve), with per-level provenance.
	#[instrument(skip(self), fields(scope = %scope, target = %target))]
	pub async fn resolve_detailed(
		&self,
		scope: &ScopeRef,
		target: &ResourceTarget,
	) -> Result<ResolvedPermissions> {
		let holder = self.effective_holder(scope).await?;
		let entries = self.store.module_grants(&holder, target.module_id).await?;
		let resolved = ResolvedPermissions::fold(*scope, holder, *target, &entries);

		tracing::debug!(holder = %holder, levels = %resolved.level_set(), "resolved");
		Ok(resolved)
	}

	/// Resolves `root` and every scope below it, parents before children.
	///
	/// Each holder's grants are read once per call, however many inheriting
	/// descendants mirror it.
	#[instrument(skip(self), fields(root = %root, target = %target))]
	pub async fn permission_tree(
		&self,
		root: &ScopeRef,
		target: &ResourceTarget,
	) -> Result<Vec<PermissionTreeEntry>> {
		let mut cache: HashMap<ScopeRef, Vec<GrantEntry>> = HashMap::new();
		let mut entries = Vec::new();

		let root_parent = self.directory.parent_of(root).await?;
		let root_holder = self.effective_holder(root).await?;
		let mut pending = vec![(*root, root_parent, 0usize, root_holder)];

		while let Some((scope, parent, depth, holder)) = pending.pop() {
			let inherits = holder != scope;
			if !cache.contains_key(&holder) {
				let grants = self.store.module_grants(&holder, target.module_id).await?;
				cache.insert(holder, grants);
			}
			let grants = cache.get(&holder).map(Vec::as_slice).unwrap_or_default();
			let resolved = ResolvedPermissions::fold(scope, holder, *target, grants);

			entries.push(PermissionTreeEntry {
				scope,
				parent,
				depth,
				inherits,
				resolved,
			});

			let children = self.directory.children_of(&scope).await?;
			for child in children.into_iter().rev() {
				let child_holder = if self.store.is_inheriting(&child).await? {
					holder
				} else {
					child
				};
				pending.push((child, Some(scope), depth + 1, child_holder));
			}
		}

		tracing::debug!(nodes = entries.len(), holders = cache.len(), "permission tree built");
		Ok(entries)
	}
}
