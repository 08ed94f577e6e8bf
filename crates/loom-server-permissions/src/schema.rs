// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite schema for grants, inheritance flags and legacy documents.
//!
//! `scope_grants.lesson_id IS NULL` means the grant is module-wide. SQLite
//! treats NULLs as distinct in unique constraints, so uniqueness is enforced
//! through an expression index over `COALESCE(lesson_id, -1)`.
//!
//! `level` has no CHECK constraint, so rows written by older
//! schemas are tolerated and skipped on read.

use sqlx::sqlite::SqlitePool;

use crate::error::Result;
use crate::store::begin_write;

const STATEMENTS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS scope_grants (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		scope_type TEXT NOT NULL CHECK (scope_type IN ('org', 'cohort', 'individual')),
		scope_id TEXT NOT NULL,
		module_id INTEGER NOT NULL,
		lesson_id INTEGER,
		level TEXT NOT NULL,
		created_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE UNIQUE INDEX IF NOT EXISTS idx_scope_grants_unique
	ON scope_grants (scope_type, scope_id, module_id, COALESCE(lesson_id, -1), level)
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_scope_grants_scope_module
	ON scope_grants (scope_type, scope_id, module_id)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS scope_inheritance (
		scope_type TEXT NOT NULL CHECK (scope_type IN ('cohort', 'individual')),
		scope_id TEXT NOT NULL,
		inherits INTEGER NOT NULL,
		updated_at TEXT NOT NULL,
		PRIMARY KEY (scope_type, scope_id)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS permission_documents (
		id TEXT PRIMARY KEY NOT NULL,
		scope_type TEXT NOT NULL,
		scope_id TEXT NOT NULL,
		body TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
];

/// Creates the permission tables and indexes if they do not exist.
#[tracing::instrument(skip(pool))]
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
	let mut tx = begin_write(pool).await?;
	for statement in STATEMENTS {
		sqlx::query(statement).execute(&mut *tx).await?;
	}
	tx.commit().await?;

	tracing::debug!("permissions schema ensured");
	Ok(())
}
