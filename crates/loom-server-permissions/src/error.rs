// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use loom_permissions_core::{ErrorKind, PermissionsError};

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum PermissionsServerError {
	#[error(transparent)]
	Permissions(#[from] PermissionsError),

	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),

	#[error("Internal: {0}")]
	Internal(String),
}

impl PermissionsServerError {
	/// Maps this error onto the engine's stable error kinds.
	///
	/// Anything that is not one of the engine's own failures means the store
	/// could not serve the request.
	pub fn kind(&self) -> ErrorKind {
		match self {
			PermissionsServerError::Permissions(e) => e.kind(),
			PermissionsServerError::Database(_)
			| PermissionsServerError::Serialization(_)
			| PermissionsServerError::Config(_)
			| PermissionsServerError::Internal(_) => ErrorKind::StoreUnavailable,
		}
	}
}

pub type Result<T> = std::result::Result<T, PermissionsServerError>;

#[cfg(test)]
mod tests {
	use super::*;
	use loom_permissions_core::{ScopeId, ScopeRef};

	#[test]
	fn engine_errors_keep_their_kind() {
		let scope = ScopeRef::cohort(ScopeId::generate());
		let err: PermissionsServerError =
			PermissionsError::ScopeNotIndependentConflict { scope }.into();
		assert_eq!(err.kind(), ErrorKind::ScopeNotIndependentConflict);
	}

	#[test]
	fn database_errors_are_store_unavailable() {
		let err: PermissionsServerError = sqlx::Error::PoolClosed.into();
		assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
		assert!(err.to_string().starts_with("Database error"));
	}
}
