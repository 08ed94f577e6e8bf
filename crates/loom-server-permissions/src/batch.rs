// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One capability toggle applied to many scopes.
//!
//! Each scope gets its own cascade. There is no atomicity across scopes: a
//! failure on one does not roll back the others.

use futures::stream::{self, StreamExt};
use loom_permissions_core::{CapabilityLevel, ErrorKind, ResourceTarget, ScopeRef, ToggleRequest};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::service::PermissionService;

/// A scope whose cascade failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
	pub scope: ScopeRef,
	pub kind: ErrorKind,
	pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
	pub succeeded: usize,
	pub skipped: usize,
	pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
	pub fn failed(&self) -> usize {
		self.failures.len()
	}

	pub fn total(&self) -> usize {
		self.succeeded + self.skipped + self.failed()
	}
}

enum NodeResult {
	Succeeded,
	Skipped,
	Failed(BatchFailure),
}

impl PermissionService {
	/// Toggles `level` on `target` for every scope in `scopes`.
	///
	/// Inheriting scopes are skipped when revoking, and when granting a level
	/// they already see through their parent. A toggle that changes nothing
	/// counts as skipped. Per-scope errors are collected, never returned.
	#[instrument(
		skip(self, scopes),
		fields(count = scopes.len(), target = %target, level = %level)
	)]
	pub async fn apply_batch(
		&self,
		scopes: &[ScopeRef],
		target: &ResourceTarget,
		level: CapabilityLevel,
		desired_on: bool,
	) -> BatchOutcome {
		let concurrency = self.config.batch_concurrency.max(1);

		let results: Vec<NodeResult> = stream::iter(scopes.iter().copied())
			.map(|scope| async move {
				match self.apply_one(scope, target, level, desired_on).await {
					Ok(true) => NodeResult::Succeeded,
					Ok(false) => NodeResult::Skipped,
					Err(e) => {
						tracing::warn!(scope = %scope, error = %e, "batch cascade failed");
						NodeResult::Failed(BatchFailure {
							scope,
							kind: e.kind(),
							message: e.to_string(),
						})
					}
				}
			})
			.buffer_unordered(concurrency)
			.collect()
			.await;

		let mut outcome = BatchOutcome::default();
		for result in results {
			match result {
				NodeResult::Succeeded => outcome.succeeded += 1,
				NodeResult::Skipped => outcome.skipped += 1,
				NodeResult::Failed(failure) => outcome.failures.push(failure),
			}
		}

		tracing::info!(
			succeeded = outcome.succeeded,
			skipped = outcome.skipped,
			failed = outcome.failed(),
			"batch applied"
		);
		outcome
	}

	/// Returns true if the scope's grants changed.
	async fn apply_one(
		&self,
		scope: ScopeRef,
		target: &ResourceTarget,
		level: CapabilityLevel,
		desired_on: bool,
	) -> Result<bool> {
		if self.store.is_inheriting(&scope).await? {
			if !desired_on {
				return Ok(false);
			}
			if self.resolve(&scope, target).await?.contains(level) {
				return Ok(false);
			}
		}

		let outcome = self
			.toggle(&ToggleRequest::new(scope, *target, level, desired_on))
			.await?;
		Ok(!outcome.is_noop())
	}
}
