// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Keyed locks serializing permission mutations.
//!
//! Two cascades on the same `(scope, module)` never interleave, and an
//! inheritance switch on a scope excludes every cascade on that scope.
//! Work on different scopes or modules proceeds in parallel.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use loom_permissions_core::{ModuleId, ScopeRef};
use tokio::sync::{
	Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};

use crate::config::DEFAULT_LOCK_PRUNE_THRESHOLD;

type KeyedLocks<K, L> = Mutex<HashMap<K, Arc<L>>>;

/// Per-scope read/write locks plus per-`(scope, module)` mutexes.
#[derive(Debug)]
pub struct LockRegistry {
	scopes: KeyedLocks<ScopeRef, RwLock<()>>,
	modules: KeyedLocks<(ScopeRef, ModuleId), AsyncMutex<()>>,
	prune_threshold: usize,
}

impl Default for LockRegistry {
	fn default() -> Self {
		Self::new(DEFAULT_LOCK_PRUNE_THRESHOLD)
	}
}

impl LockRegistry {
	pub fn new(prune_threshold: usize) -> Self {
		Self {
			scopes: Mutex::new(HashMap::new()),
			modules: Mutex::new(HashMap::new()),
			prune_threshold,
		}
	}

	/// Shared scope lock, held by cascades.
	pub async fn read_scope(&self, scope: &ScopeRef) -> OwnedRwLockReadGuard<()> {
		self.lock_for(&self.scopes, *scope).read_owned().await
	}

	/// Exclusive scope lock, held while switching inheritance.
	pub async fn write_scope(&self, scope: &ScopeRef) -> OwnedRwLockWriteGuard<()> {
		self.lock_for(&self.scopes, *scope).write_owned().await
	}

	pub async fn lock_module(&self, scope: &ScopeRef, module_id: ModuleId) -> OwnedMutexGuard<()> {
		self.lock_for(&self.modules, (*scope, module_id)).lock_owned().await
	}

	/// Number of lock entries currently tracked.
	pub fn tracked(&self) -> usize {
		let scopes = self.scopes.lock().unwrap_or_else(|e| e.into_inner()).len();
		let modules = self.modules.lock().unwrap_or_else(|e| e.into_inner()).len();
		scopes + modules
	}

	fn lock_for<K, L>(&self, map: &KeyedLocks<K, L>, key: K) -> Arc<L>
	where
		K: Eq + Hash,
		L: Default,
	{
		let mut map = map.lock().unwrap_or_else(|e| e.into_inner());
		if map.len() >= self.prune_threshold {
			// An entry referenced only by the map is idle.
			map.retain(|_, lock| Arc::strong_count(lock) > 1);
		}
		map.entry(key).or_default().clone()
	}
}
