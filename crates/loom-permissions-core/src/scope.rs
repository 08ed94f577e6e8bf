// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization subjects and the content they are authorized on.
//!
//! Scopes form a fixed three-level containment tree:
//! organization → cohort → individual. The engine never creates or destroys
//! scopes; it only reads their identity and parent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PermissionsError;

/// Unique identifier for an organization, cohort or individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(Uuid);

impl ScopeId {
	pub fn new(id: Uuid) -> Self {
		Self(id)
	}

	pub fn generate() -> Self {
		Self(Uuid::new_v4())
	}

	pub fn into_inner(self) -> Uuid {
		self.0
	}

	pub fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl fmt::Display for ScopeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<Uuid> for ScopeId {
	fn from(id: Uuid) -> Self {
		Self(id)
	}
}

impl FromStr for ScopeId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}

macro_rules! define_content_id {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(
			Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
		)]
		#[serde(transparent)]
		pub struct $name(pub i64);

		impl $name {
			pub fn get(self) -> i64 {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<i64> for $name {
			fn from(id: i64) -> Self {
				Self(id)
			}
		}
	};
}

define_content_id!(ModuleId, "Identifier of a module whose content is protected.");
define_content_id!(LessonId, "Identifier of a lesson inside a module.");

/// The stratum a scope lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
	Org,
	Cohort,
	Individual,
}

impl ScopeType {
	pub fn as_str(&self) -> &'static str {
		match self {
			ScopeType::Org => "org",
			ScopeType::Cohort => "cohort",
			ScopeType::Individual => "individual",
		}
	}

	/// The stratum of this scope's parent. Organizations have none.
	pub fn parent_type(&self) -> Option<ScopeType> {
		match self {
			ScopeType::Org => None,
			ScopeType::Cohort => Some(ScopeType::Org),
			ScopeType::Individual => Some(ScopeType::Cohort),
		}
	}

	/// Organizations are always independent; everything else may inherit.
	pub fn can_inherit(&self) -> bool {
		self.parent_type().is_some()
	}
}

impl fmt::Display for ScopeType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ScopeType {
	type Err = PermissionsError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"org" => Ok(ScopeType::Org),
			"cohort" => Ok(ScopeType::Cohort),
			"individual" => Ok(ScopeType::Individual),
			other => Err(PermissionsError::InvalidScopeType(other.to_string())),
		}
	}
}

/// Reference to one authorization subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeRef {
	pub scope_type: ScopeType,
	pub scope_id: ScopeId,
}

impl ScopeRef {
	pub fn new(scope_type: ScopeType, scope_id: ScopeId) -> Self {
		Self {
			scope_type,
			scope_id,
		}
	}

	pub fn org(scope_id: ScopeId) -> Self {
		Self::new(ScopeType::Org, scope_id)
	}

	pub fn cohort(scope_id: ScopeId) -> Self {
		Self::new(ScopeType::Cohort, scope_id)
	}

	pub fn individual(scope_id: ScopeId) -> Self {
		Self::new(ScopeType::Individual, scope_id)
	}

	pub fn is_org(&self) -> bool {
		self.scope_type == ScopeType::Org
	}
}

impl fmt::Display for ScopeRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.scope_type, self.scope_id)
	}
}

/// A scope together with its containing parent, as supplied by membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeNode {
	pub scope: ScopeRef,
	pub parent: Option<ScopeRef>,
}

impl ScopeNode {
	pub fn org(scope_id: ScopeId) -> Self {
		Self {
			scope: ScopeRef::org(scope_id),
			parent: None,
		}
	}

	pub fn cohort(scope_id: ScopeId, org_id: ScopeId) -> Self {
		Self {
			scope: ScopeRef::cohort(scope_id),
			parent: Some(ScopeRef::org(org_id)),
		}
	}

	pub fn individual(scope_id: ScopeId, cohort_id: ScopeId) -> Self {
		Self {
			scope: ScopeRef::individual(scope_id),
			parent: Some(ScopeRef::cohort(cohort_id)),
		}
	}

	/// Returns true if the parent sits exactly one stratum above this scope.
	pub fn has_valid_parent(&self) -> bool {
		self.parent.map(|p| p.scope_type) == self.scope.scope_type.parent_type()
	}
}

/// A module, optionally narrowed to one lesson. `lesson_id == None` is module-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceTarget {
	pub module_id: ModuleId,
	pub lesson_id: Option<LessonId>,
}

impl ResourceTarget {
	pub fn module(module_id: ModuleId) -> Self {
		Self {
			module_id,
			lesson_id: None,
		}
	}

	pub fn lesson(module_id: ModuleId, lesson_id: LessonId) -> Self {
		Self {
			module_id,
			lesson_id: Some(lesson_id),
		}
	}

	pub fn is_module_wide(&self) -> bool {
		self.lesson_id.is_none()
	}
}

impl fmt::Display for ResourceTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.lesson_id {
			Some(lesson_id) => write!(f, "module:{}/lesson:{}", self.module_id, lesson_id),
			None => write!(f, "module:{}", self.module_id),
		}
	}
}
