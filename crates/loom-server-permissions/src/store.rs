// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable storage of direct grants and inheritance flags.
//!
//! Grant rows and inheritance flags are the only persisted permission state.
//! Every mutation that touches more than one row runs in a single transaction,
//! so a failed call never leaves a partially applied cascade behind. Those
//! transactions take the write lock at `BEGIN`, and concurrent writers queue
//! on the pool's busy timeout.

use async_trait::async_trait;
use chrono::Utc;
use loom_permissions_core::{
	levels_at, plan_toggle, CapabilityLevel, Grant, GrantEntry, LessonId, LevelSet, ModuleId,
	PermissionsError, ResourceTarget, ScopeId, ScopeRef, ScopeType, ToggleOutcome,
};
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool};
use sqlx::Transaction;
use tracing::instrument;

use crate::error::{PermissionsServerError, Result};

#[async_trait]
pub trait PermissionStore: Send + Sync {
	/// Returns true if the scope currently defers to its parent.
	///
	/// Organizations never inherit. Scopes without a stored flag use the
	/// store's default.
	async fn is_inheriting(&self, scope: &ScopeRef) -> Result<bool>;

	/// Levels held directly on exactly this module or lesson.
	async fn direct_levels(&self, scope: &ScopeRef, target: &ResourceTarget) -> Result<LevelSet>;

	/// Every direct grant of the scope on one module, module-wide and per lesson.
	async fn module_grants(&self, scope: &ScopeRef, module_id: ModuleId) -> Result<Vec<GrantEntry>>;

	/// Every direct grant of the scope.
	async fn scope_grants(&self, scope: &ScopeRef) -> Result<Vec<Grant>>;

	/// Plans and applies one cascade atomically.
	///
	/// # Errors
	/// Returns `ScopeNotIndependentConflict` if the scope is inheriting at the
	/// time the transaction reads its flag.
	async fn apply_toggle(
		&self,
		scope: &ScopeRef,
		target: &ResourceTarget,
		level: CapabilityLevel,
		desired_on: bool,
	) -> Result<ToggleOutcome>;

	/// Replaces the scope's grants with `entries` and marks it independent.
	///
	/// Returns the number of rows written.
	async fn detach(&self, scope: &ScopeRef, entries: &[GrantEntry]) -> Result<usize>;

	/// Deletes the scope's grants and marks it inheriting.
	///
	/// Returns the number of rows deleted.
	async fn reattach(&self, scope: &ScopeRef) -> Result<usize>;
}

/// SQLite implementation of the permission store.
#[derive(Clone)]
pub struct SqlitePermissionStore {
	pool: SqlitePool,
	default_inherits: bool,
}

impl SqlitePermissionStore {
	/// Create a store where scopes without a stored flag inherit.
	pub fn new(pool: SqlitePool) -> Self {
		Self {
			pool,
			default_inherits: true,
		}
	}

	/// Builder: set the inheritance state of scopes without a stored flag.
	pub fn with_default_inherits(mut self, default_inherits: bool) -> Self {
		self.default_inherits = default_inherits;
		self
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	async fn read_inherits(&self, conn: &mut SqliteConnection, scope: &ScopeRef) -> Result<bool> {
		if !scope.scope_type.can_inherit() {
			return Ok(false);
		}

		let stored: Option<i64> = sqlx::query_scalar(
			r#"
			SELECT inherits
			FROM scope_inheritance
			WHERE scope_type = ? AND scope_id = ?
			"#,
		)
		.bind(scope.scope_type.as_str())
		.bind(scope.scope_id.to_string())
		.fetch_optional(&mut *conn)
		.await?;

		Ok(stored.map(|v| v != 0).unwrap_or(self.default_inherits))
	}
}

/// Opens a transaction that holds the database write lock from `BEGIN`.
///
/// A deferred transaction that reads before it writes gets `SQLITE_BUSY`
/// without waiting when another connection commits in between. `BEGIN
/// IMMEDIATE` waits out the pool's busy timeout instead.
pub(crate) async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
	Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

async fn fetch_module_rows(
	conn: &mut SqliteConnection,
	scope: &ScopeRef,
	module_id: ModuleId,
) -> Result<Vec<GrantRow>> {
	let rows = sqlx::query_as::<_, GrantRow>(
		r#"
		SELECT scope_type, scope_id, module_id, lesson_id, level, created_at
		FROM scope_grants
		WHERE scope_type = ? AND scope_id = ? AND module_id = ?
		ORDER BY lesson_id ASC, id ASC
		"#,
	)
	.bind(scope.scope_type.as_str())
	.bind(scope.scope_id.to_string())
	.bind(module_id.get())
	.fetch_all(&mut *conn)
	.await?;

	Ok(rows)
}

async fn insert_grant(
	conn: &mut SqliteConnection,
	scope: &ScopeRef,
	entry: &GrantEntry,
	created_at: &str,
) -> Result<u64> {
	let result = sqlx::query(
		r#"
		INSERT OR IGNORE INTO scope_grants (scope_type, scope_id, module_id, lesson_id, level, created_at)
		VALUES (?, ?, ?, ?, ?, ?)
		"#,
	)
	.bind(scope.scope_type.as_str())
	.bind(scope.scope_id.to_string())
	.bind(entry.module_id.get())
	.bind(entry.lesson_id.map(LessonId::get))
	.bind(entry.level.as_str())
	.bind(created_at)
	.execute(&mut *conn)
	.await?;

	Ok(result.rows_affected())
}

async fn delete_grant(
	conn: &mut SqliteConnection,
	scope: &ScopeRef,
	entry: &GrantEntry,
) -> Result<u64> {
	let result = sqlx::query(
		r#"
		DELETE FROM scope_grants
		WHERE scope_type = ? AND scope_id = ? AND module_id = ? AND lesson_id IS ? AND level = ?
		"#,
	)
	.bind(scope.scope_type.as_str())
	.bind(scope.scope_id.to_string())
	.bind(entry.module_id.get())
	.bind(entry.lesson_id.map(LessonId::get))
	.bind(entry.level.as_str())
	.execute(&mut *conn)
	.await?;

	Ok(result.rows_affected())
}

async fn delete_scope_grants(conn: &mut SqliteConnection, scope: &ScopeRef) -> Result<u64> {
	let result = sqlx::query(
		r#"
		DELETE FROM scope_grants
		WHERE scope_type = ? AND scope_id = ?
		"#,
	)
	.bind(scope.scope_type.as_str())
	.bind(scope.scope_id.to_string())
	.execute(&mut *conn)
	.await?;

	Ok(result.rows_affected())
}

async fn store_inherits(conn: &mut SqliteConnection, scope: &ScopeRef, inherits: bool) -> Result<()> {
	sqlx::query(
		r#"
		INSERT INTO scope_inheritance (scope_type, scope_id, inherits, updated_at)
		VALUES (?, ?, ?, ?)
		ON CONFLICT (scope_type, scope_id) DO UPDATE SET
			inherits = excluded.inherits,
			updated_at = excluded.updated_at
		"#,
	)
	.bind(scope.scope_type.as_str())
	.bind(scope.scope_id.to_string())
	.bind(inherits as i64)
	.bind(Utc::now().to_rfc3339())
	.execute(&mut *conn)
	.await?;

	Ok(())
}

#[async_trait]
impl PermissionStore for SqlitePermissionStore {
	#[instrument(skip(self), fields(scope = %scope))]
	async fn is_inheriting(&self, scope: &ScopeRef) -> Result<bool> {
		let mut conn = self.pool.acquire().await?;
		self.read_inherits(&mut conn, scope).await
	}

	#[instrument(skip(self), fields(scope = %scope, target = %target))]
	async fn direct_levels(&self, scope: &ScopeRef, target: &ResourceTarget) -> Result<LevelSet> {
		let rows = sqlx::query_as::<_, GrantRow>(
			r#"
			SELECT scope_type, scope_id, module_id, lesson_id, level, created_at
			FROM scope_grants
			WHERE scope_type = ? AND scope_id = ? AND module_id = ? AND lesson_id IS ?
			"#,
		)
		.bind(scope.scope_type.as_str())
		.bind(scope.scope_id.to_string())
		.bind(target.module_id.get())
		.bind(target.lesson_id.map(LessonId::get))
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().filter_map(GrantRow::into_entry).map(|e| e.level).collect())
	}

	#[instrument(skip(self), fields(scope = %scope, module_id = %module_id))]
	async fn module_grants(&self, scope: &ScopeRef, module_id: ModuleId) -> Result<Vec<GrantEntry>> {
		let mut conn = self.pool.acquire().await?;
		let rows = fetch_module_rows(&mut conn, scope, module_id).await?;
		Ok(rows.into_iter().filter_map(GrantRow::into_entry).collect())
	}

	#[instrument(skip(self), fields(scope = %scope))]
	async fn scope_grants(&self, scope: &ScopeRef) -> Result<Vec<Grant>> {
		let rows = sqlx::query_as::<_, GrantRow>(
			r#"
			SELECT scope_type, scope_id, module_id, lesson_id, level, created_at
			FROM scope_grants
			WHERE scope_type = ? AND scope_id = ?
			ORDER BY module_id ASC, lesson_id ASC, id ASC
			"#,
		)
		.bind(scope.scope_type.as_str())
		.bind(scope.scope_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().filter_map(GrantRow::into_grant).collect())
	}

	#[instrument(skip(self), fields(scope = %scope, target = %target, level = %level))]
	async fn apply_toggle(
		&self,
		scope: &ScopeRef,
		target: &ResourceTarget,
		level: CapabilityLevel,
		desired_on: bool,
	) -> Result<ToggleOutcome> {
		let mut tx = begin_write(&self.pool).await?;

		if self.read_inherits(&mut tx, scope).await? {
			return Err(PermissionsError::ScopeNotIndependentConflict { scope: *scope }.into());
		}

		let entries: Vec<GrantEntry> = fetch_module_rows(&mut tx, scope, target.module_id)
			.await?
			.into_iter()
			.filter_map(GrantRow::into_entry)
			.collect();
		let current = levels_at(&entries, target);
		let outcome = plan_toggle(current, level, desired_on);

		let now = Utc::now().to_rfc3339();
		for granted in &outcome.granted {
			insert_grant(&mut tx, scope, &GrantEntry::new(*target, *granted), &now).await?;
		}
		for revoked in &outcome.revoked {
			delete_grant(&mut tx, scope, &GrantEntry::new(*target, *revoked)).await?;
		}

		tx.commit().await?;

		tracing::debug!(
			scope = %scope,
			target = %target,
			granted = ?outcome.granted,
			revoked = ?outcome.revoked,
			"cascade committed"
		);
		Ok(outcome)
	}

	#[instrument(skip(self, entries), fields(scope = %scope, count = entries.len()))]
	async fn detach(&self, scope: &ScopeRef, entries: &[GrantEntry]) -> Result<usize> {
		let mut tx = begin_write(&self.pool).await?;

		let dormant = delete_scope_grants(&mut tx, scope).await?;
		if dormant > 0 {
			tracing::debug!(scope = %scope, dormant, "discarded dormant grants before copy");
		}

		let now = Utc::now().to_rfc3339();
		let mut written = 0u64;
		for entry in entries {
			written += insert_grant(&mut tx, scope, entry, &now).await?;
		}
		store_inherits(&mut tx, scope, false).await?;

		tx.commit().await?;
		Ok(written as usize)
	}

	#[instrument(skip(self), fields(scope = %scope))]
	async fn reattach(&self, scope: &ScopeRef) -> Result<usize> {
		let mut tx = begin_write(&self.pool).await?;

		let removed = delete_scope_grants(&mut tx, scope).await?;
		store_inherits(&mut tx, scope, true).await?;

		tx.commit().await?;
		Ok(removed as usize)
	}
}

// Database row types for sqlx

#[derive(sqlx::FromRow)]
struct GrantRow {
	scope_type: String,
	scope_id: String,
	module_id: i64,
	lesson_id: Option<i64>,
	level: String,
	created_at: String,
}

impl GrantRow {
	/// Parses the scope-independent part of the row.
	///
	/// Rows that no longer parse (stale levels from older schemas) are skipped
	/// rather than failing the whole read.
	fn into_entry(self) -> Option<GrantEntry> {
		match self.level.parse::<CapabilityLevel>() {
			Ok(level) => Some(GrantEntry {
				module_id: ModuleId(self.module_id),
				lesson_id: self.lesson_id.map(LessonId),
				level,
			}),
			Err(_) => {
				tracing::warn!(
					scope_type = %self.scope_type,
					scope_id = %self.scope_id,
					module_id = self.module_id,
					level = %self.level,
					"skipping grant row with unknown level"
				);
				None
			}
		}
	}

	fn into_grant(self) -> Option<Grant> {
		let scope = match parse_scope(&self.scope_type, &self.scope_id) {
			Ok(scope) => scope,
			Err(e) => {
				tracing::warn!(error = %e, "skipping grant row with invalid scope");
				return None;
			}
		};
		let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
			.map(|dt| dt.with_timezone(&Utc))
			.unwrap_or_else(|_| Utc::now());
		let entry = self.into_entry()?;

		Some(Grant {
			scope,
			module_id: entry.module_id,
			lesson_id: entry.lesson_id,
			level: entry.level,
			created_at,
		})
	}
}

pub(crate) fn parse_scope(scope_type: &str, scope_id: &str) -> Result<ScopeRef> {
	let scope_type: ScopeType = scope_type.parse()?;
	let scope_id: ScopeId = scope_id
		.parse()
		.map_err(|e| PermissionsServerError::Internal(format!("Invalid scope ID: {e}")))?;
	Ok(ScopeRef::new(scope_type, scope_id))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_permissions_test_pool, make_store};
	use proptest::prelude::*;
	use std::collections::HashSet;

	use CapabilityLevel::{Edit, ViewLesson, ViewPlan};

	fn org() -> ScopeRef {
		ScopeRef::org(ScopeId::generate())
	}

	fn module(id: i64) -> ResourceTarget {
		ResourceTarget::module(ModuleId(id))
	}

	#[tokio::test]
	async fn org_never_inherits() {
		let store = make_store().await;
		assert!(!store.is_inheriting(&org()).await.unwrap());
	}

	#[tokio::test]
	async fn unflagged_scopes_use_default() {
		let pool = create_permissions_test_pool().await;
		let cohort = ScopeRef::cohort(ScopeId::generate());

		let inheriting = SqlitePermissionStore::new(pool.clone());
		assert!(inheriting.is_inheriting(&cohort).await.unwrap());

		let independent = SqlitePermissionStore::new(pool).with_default_inherits(false);
		assert!(!independent.is_inheriting(&cohort).await.unwrap());
	}

	#[tokio::test]
	async fn toggle_grant_inserts_closure() {
		let store = make_store().await;
		let scope = org();

		let outcome = store.apply_toggle(&scope, &module(7), Edit, true).await.unwrap();
		assert_eq!(outcome.granted, vec![ViewLesson, ViewPlan, Edit]);

		let held = store.direct_levels(&scope, &module(7)).await.unwrap();
		assert_eq!(held, Edit.and_below());
	}

	#[tokio::test]
	async fn toggle_twice_is_idempotent() {
		let store = make_store().await;
		let scope = org();

		store.apply_toggle(&scope, &module(7), Edit, true).await.unwrap();
		let second = store.apply_toggle(&scope, &module(7), Edit, true).await.unwrap();

		assert!(second.is_noop());
		assert_eq!(store.module_grants(&scope, ModuleId(7)).await.unwrap().len(), 3);
	}

	#[tokio::test]
	async fn revoke_lowest_level_clears_everything() {
		let store = make_store().await;
		let scope = org();

		store.apply_toggle(&scope, &module(7), Edit, true).await.unwrap();
		let outcome = store
			.apply_toggle(&scope, &module(7), ViewLesson, false)
			.await
			.unwrap();

		assert_eq!(outcome.revoked, vec![ViewLesson, ViewPlan, Edit]);
		assert!(store.direct_levels(&scope, &module(7)).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn lesson_grants_are_separate_from_module_grants() {
		let store = make_store().await;
		let scope = org();
		let lesson = ResourceTarget::lesson(ModuleId(7), LessonId(3));

		store.apply_toggle(&scope, &module(7), ViewLesson, true).await.unwrap();
		let outcome = store.apply_toggle(&scope, &lesson, ViewPlan, true).await.unwrap();

		assert_eq!(outcome.granted, vec![ViewLesson, ViewPlan]);
		assert_eq!(store.direct_levels(&scope, &module(7)).await.unwrap().len(), 1);
		assert_eq!(store.direct_levels(&scope, &lesson).await.unwrap().len(), 2);

		store.apply_toggle(&scope, &lesson, ViewLesson, false).await.unwrap();
		assert_eq!(
			store.direct_levels(&scope, &module(7)).await.unwrap().to_vec(),
			vec![ViewLesson]
		);
	}

	#[tokio::test]
	async fn toggle_on_inheriting_scope_conflicts() {
		let store = make_store().await;
		let cohort = ScopeRef::cohort(ScopeId::generate());

		let err = store
			.apply_toggle(&cohort, &module(7), ViewLesson, true)
			.await
			.unwrap_err();

		assert!(matches!(
			err,
			PermissionsServerError::Permissions(PermissionsError::ScopeNotIndependentConflict { .. })
		));
		assert!(store.module_grants(&cohort, ModuleId(7)).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn detach_replaces_grants_and_flag() {
		let store = make_store().await;
		let cohort = ScopeRef::cohort(ScopeId::generate());

		let entries = vec![
			GrantEntry::new(module(7), ViewLesson),
			GrantEntry::new(module(9), ViewLesson),
			GrantEntry::new(module(9), ViewPlan),
		];
		let written = store.detach(&cohort, &entries).await.unwrap();

		assert_eq!(written, 3);
		assert!(!store.is_inheriting(&cohort).await.unwrap());
		let grants = store.scope_grants(&cohort).await.unwrap();
		assert_eq!(grants.len(), 3);
		assert!(grants.iter().all(|g| g.scope == cohort));
	}

	#[tokio::test]
	async fn reattach_deletes_grants() {
		let store = make_store().await;
		let cohort = ScopeRef::cohort(ScopeId::generate());

		store
			.detach(&cohort, &[GrantEntry::new(module(7), ViewLesson)])
			.await
			.unwrap();
		let removed = store.reattach(&cohort).await.unwrap();

		assert_eq!(removed, 1);
		assert!(store.is_inheriting(&cohort).await.unwrap());
		assert!(store.scope_grants(&cohort).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn stale_rows_are_skipped_on_read() {
		let store = make_store().await;
		let scope = org();

		sqlx::query(
			r#"
			INSERT INTO scope_grants (scope_type, scope_id, module_id, lesson_id, level, created_at)
			VALUES (?, ?, 7, NULL, 'can_view', ?)
			"#,
		)
		.bind(scope.scope_type.as_str())
		.bind(scope.scope_id.to_string())
		.bind(Utc::now().to_rfc3339())
		.execute(store.pool())
		.await
		.unwrap();

		assert!(store.direct_levels(&scope, &module(7)).await.unwrap().is_empty());
		assert!(store.scope_grants(&scope).await.unwrap().is_empty());

		let outcome = store.apply_toggle(&scope, &module(7), ViewLesson, true).await.unwrap();
		assert_eq!(outcome.granted, vec![ViewLesson]);
	}

	#[test]
	fn parse_scope_rejects_garbage() {
		let err = parse_scope("team", &ScopeId::generate().to_string()).unwrap_err();
		assert!(matches!(
			err,
			PermissionsServerError::Permissions(PermissionsError::InvalidScopeType(ref t)) if t == "team"
		));
		assert!(parse_scope("org", "not-a-uuid").is_err());
		assert!(parse_scope("cohort", &ScopeId::generate().to_string()).is_ok());
	}

	fn any_level() -> impl Strategy<Value = CapabilityLevel> {
		prop_oneof![Just(ViewLesson), Just(ViewPlan), Just(Edit)]
	}

	proptest! {
		#![proptest_config(ProptestConfig::with_cases(32))]

		#[test]
		fn stored_levels_stay_closed(ops in prop::collection::vec((any_level(), any::<bool>(), 0i64..3), 1..20)) {
			let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
			rt.block_on(async {
				let store = make_store().await;
				let scope = org();
				for (level, on, module_id) in ops {
					store.apply_toggle(&scope, &module(module_id), level, on).await.unwrap();
					let held = store.direct_levels(&scope, &module(module_id)).await.unwrap();
					assert!(held.is_closed(), "{held} is not closed");
				}

				let grants = store.scope_grants(&scope).await.unwrap();
				let unique: HashSet<_> = grants.iter().map(|g| g.entry()).collect();
				assert_eq!(unique.len(), grants.len());
			});
		}
	}
}
