// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stored permission documents and their one-shot schema migration.

use chrono::{DateTime, Utc};
use loom_permissions_core::{migrate_in_place, ScopeRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::error::Result;
use crate::store::{begin_write, parse_scope, SqlitePermissionStore};

/// A JSON permission document attached to a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionDocument {
	pub id: String,
	pub scope: ScopeRef,
	pub body: Value,
	pub updated_at: DateTime<Utc>,
}

impl PermissionDocument {
	pub fn new(id: impl Into<String>, scope: ScopeRef, body: Value) -> Self {
		Self {
			id: id.into(),
			scope,
			body,
			updated_at: Utc::now(),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
	pub scanned: usize,
	pub rewritten: usize,
}

impl SqlitePermissionStore {
	#[instrument(skip(self, document), fields(id = %document.id, scope = %document.scope))]
	pub async fn upsert_document(&self, document: &PermissionDocument) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO permission_documents (id, scope_type, scope_id, body, updated_at)
			VALUES (?, ?, ?, ?, ?)
			ON CONFLICT (id) DO UPDATE SET
				scope_type = excluded.scope_type,
				scope_id = excluded.scope_id,
				body = excluded.body,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(&document.id)
		.bind(document.scope.scope_type.as_str())
		.bind(document.scope.scope_id.to_string())
		.bind(serde_json::to_string(&document.body)?)
		.bind(document.updated_at.to_rfc3339())
		.execute(self.pool())
		.await?;

		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn get_document(&self, id: &str) -> Result<Option<PermissionDocument>> {
		let row = sqlx::query_as::<_, DocumentRow>(
			r#"
			SELECT id, scope_type, scope_id, body, updated_at
			FROM permission_documents
			WHERE id = ?
			"#,
		)
		.bind(id)
		.fetch_optional(self.pool())
		.await?;

		row.map(PermissionDocument::try_from).transpose()
	}

	/// Rewrites every stored legacy document into the three-level schema.
	///
	/// Only documents that actually change are written back. Running it again
	/// rewrites nothing.
	#[instrument(skip(self))]
	pub async fn migrate_documents(&self) -> Result<MigrationReport> {
		let mut tx = begin_write(self.pool()).await?;

		let rows: Vec<(String, String)> =
			sqlx::query_as("SELECT id, body FROM permission_documents ORDER BY id")
				.fetch_all(&mut *tx)
				.await?;

		let now = Utc::now().to_rfc3339();
		let mut report = MigrationReport {
			scanned: rows.len(),
			..MigrationReport::default()
		};
		for (id, body) in rows {
			let mut value: Value = match serde_json::from_str(&body) {
				Ok(value) => value,
				Err(e) => {
					tracing::warn!(id = %id, error = %e, "skipping unparseable permission document");
					continue;
				}
			};
			if !migrate_in_place(&mut value) {
				continue;
			}

			sqlx::query("UPDATE permission_documents SET body = ?, updated_at = ? WHERE id = ?")
				.bind(serde_json::to_string(&value)?)
				.bind(&now)
				.bind(&id)
				.execute(&mut *tx)
				.await?;
			report.rewritten += 1;
		}

		tx.commit().await?;

		tracing::info!(
			scanned = report.scanned,
			rewritten = report.rewritten,
			"permission documents migrated"
		);
		Ok(report)
	}
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
	id: String,
	scope_type: String,
	scope_id: String,
	body: String,
	updated_at: String,
}

impl TryFrom<DocumentRow> for PermissionDocument {
	type Error = crate::error::PermissionsServerError;

	fn try_from(row: DocumentRow) -> Result<Self> {
		Ok(PermissionDocument {
			scope: parse_scope(&row.scope_type, &row.scope_id)?,
			body: serde_json::from_str(&row.body)?,
			updated_at: DateTime::parse_from_rfc3339(&row.updated_at)
				.map(|dt| dt.with_timezone(&Utc))
				.unwrap_or_else(|_| Utc::now()),
			id: row.id,
		})
	}
}
