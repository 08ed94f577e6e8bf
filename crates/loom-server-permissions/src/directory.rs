// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scope containment as seen by the permission engine.
//!
//! Membership (which individual belongs to which cohort, which cohort to which
//! organization) is owned elsewhere. The engine only asks for parents and
//! children through [`ScopeDirectory`].

use std::collections::HashMap;

use async_trait::async_trait;
use loom_permissions_core::{PermissionsError, ScopeNode, ScopeRef, ScopeType};
use tokio::sync::RwLock;

use crate::error::Result;

#[async_trait]
pub trait ScopeDirectory: Send + Sync {
	/// The containing scope, or `None` for organizations and unknown scopes.
	async fn parent_of(&self, scope: &ScopeRef) -> Result<Option<ScopeRef>>;

	/// Direct children of a scope, in a stable order.
	async fn children_of(&self, scope: &ScopeRef) -> Result<Vec<ScopeRef>>;

	async fn contains(&self, scope: &ScopeRef) -> Result<bool>;
}

/// In-process directory backed by a map of scope to parent.
#[derive(Debug, Default)]
pub struct StaticScopeDirectory {
	parents: RwLock<HashMap<ScopeRef, Option<ScopeRef>>>,
}

impl StaticScopeDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a scope under its parent.
	///
	/// # Errors
	/// Returns `AncestorUnresolvable` if the parent is missing, is not one
	/// stratum above the scope, or is not registered yet.
	pub async fn insert(&self, node: ScopeNode) -> Result<()> {
		if !node.has_valid_parent() {
			return Err(PermissionsError::AncestorUnresolvable { scope: node.scope }.into());
		}

		let mut parents = self.parents.write().await;
		if let Some(parent) = node.parent {
			if !parents.contains_key(&parent) {
				return Err(PermissionsError::AncestorUnresolvable { scope: node.scope }.into());
			}
		}
		parents.insert(node.scope, node.parent);
		Ok(())
	}

	/// Removes a scope. Its children keep pointing at it and stop resolving.
	pub async fn remove(&self, scope: &ScopeRef) -> bool {
		self.parents.write().await.remove(scope).is_some()
	}

	/// Moves an individual to another cohort.
	pub async fn move_individual(&self, individual: &ScopeRef, cohort: &ScopeRef) -> Result<()> {
		if individual.scope_type != ScopeType::Individual || cohort.scope_type != ScopeType::Cohort {
			return Err(PermissionsError::AncestorUnresolvable { scope: *individual }.into());
		}

		let mut parents = self.parents.write().await;
		if !parents.contains_key(cohort) {
			return Err(PermissionsError::AncestorUnresolvable { scope: *individual }.into());
		}
		match parents.get_mut(individual) {
			Some(parent) => {
				*parent = Some(*cohort);
				Ok(())
			}
			None => Err(PermissionsError::AncestorUnresolvable { scope: *individual }.into()),
		}
	}

	pub async fn len(&self) -> usize {
		self.parents.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.parents.read().await.is_empty()
	}
}

#[async_trait]
impl ScopeDirectory for StaticScopeDirectory {
	async fn parent_of(&self, scope: &ScopeRef) -> Result<Option<ScopeRef>> {
		Ok(self.parents.read().await.get(scope).copied().flatten())
	}

	async fn children_of(&self, scope: &ScopeRef) -> Result<Vec<ScopeRef>> {
		let parents = self.parents.read().await;
		let mut children: Vec<ScopeRef> = parents
			.iter()
			.filter(|(_, parent)| parent.as_ref() == Some(scope))
			.map(|(child, _)| *child)
			.collect();
		children.sort();
		Ok(children)
	}

	async fn contains(&self, scope: &ScopeRef) -> Result<bool> {
		Ok(self.parents.read().await.contains_key(scope))
	}
}
