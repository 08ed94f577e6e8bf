// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scope::ScopeRef;

/// Failures produced by the permission engine.
///
/// Every variant is returned to the immediate caller unchanged. Nothing here
/// is retried or swallowed inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionsError {
	#[error("Invalid capability level: {0}")]
	InvalidLevel(String),

	#[error("Invalid scope type: {0}")]
	InvalidScopeType(String),

	#[error("Scope {scope} inherits its permissions and must be detached before it can be changed")]
	ScopeNotIndependentConflict { scope: ScopeRef },

	#[error("No ancestor can be resolved for scope {scope}")]
	AncestorUnresolvable { scope: ScopeRef },

	#[error("Permission store unavailable: {0}")]
	StoreUnavailable(String),
}

impl PermissionsError {
	/// Returns the stable kind of this error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			PermissionsError::InvalidLevel(_) => ErrorKind::InvalidLevel,
			PermissionsError::InvalidScopeType(_) => ErrorKind::InvalidScopeType,
			PermissionsError::ScopeNotIndependentConflict { .. } => {
				ErrorKind::ScopeNotIndependentConflict
			}
			PermissionsError::AncestorUnresolvable { .. } => ErrorKind::AncestorUnresolvable,
			PermissionsError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
		}
	}
}

/// Stable error discriminant handed to presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// Malformed capability level (caller bug).
	InvalidLevel,
	/// Scope type other than org, cohort or individual (caller bug).
	InvalidScopeType,
	/// Direct mutation of a scope that is currently inheriting.
	ScopeNotIndependentConflict,
	/// Inheritance requested where no ancestor exists or can be found.
	AncestorUnresolvable,
	/// The durable store could not be reached or failed the request.
	StoreUnavailable,
}

impl ErrorKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorKind::InvalidLevel => "invalid_level",
			ErrorKind::InvalidScopeType => "invalid_scope_type",
			ErrorKind::ScopeNotIndependentConflict => "scope_not_independent_conflict",
			ErrorKind::AncestorUnresolvable => "ancestor_unresolvable",
			ErrorKind::StoreUnavailable => "store_unavailable",
		}
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

pub type Result<T> = std::result::Result<T, PermissionsError>;

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scope::{ScopeId, ScopeType};

	#[test]
	fn kinds_match_variants() {
		let scope = ScopeRef::new(ScopeType::Cohort, ScopeId::generate());

		assert_eq!(
			PermissionsError::InvalidLevel("admin".to_string()).kind(),
			ErrorKind::InvalidLevel
		);
		assert_eq!(
			PermissionsError::InvalidScopeType("team".to_string()).kind(),
			ErrorKind::InvalidScopeType
		);
		assert_eq!(
			PermissionsError::ScopeNotIndependentConflict { scope }.kind(),
			ErrorKind::ScopeNotIndependentConflict
		);
		assert_eq!(
			PermissionsError::AncestorUnresolvable { scope }.kind(),
			ErrorKind::AncestorUnresolvable
		);
		assert_eq!(
			PermissionsError::StoreUnavailable("closed".to_string()).kind(),
			ErrorKind::StoreUnavailable
		);
	}

	#[test]
	fn kind_serializes_as_snake_case() {
		let json = serde_json::to_string(&ErrorKind::ScopeNotIndependentConflict).unwrap();
		assert_eq!(json, "\"scope_not_independent_conflict\"");
		assert_eq!(
			ErrorKind::AncestorUnresolvable.to_string(),
			"ancestor_unresolvable"
		);
	}

	#[test]
	fn conflict_message_names_scope() {
		let scope = ScopeRef::new(ScopeType::Individual, ScopeId::generate());
		let err = PermissionsError::ScopeNotIndependentConflict { scope };
		assert!(err.to_string().contains(&scope.to_string()));
	}
}
