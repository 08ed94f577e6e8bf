// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The effective-permission projection.
//!
//! A resolution is never stored. It is folded from the direct grants of the
//! nearest independent scope (the requested scope itself, or the ancestor it
//! inherits from) and always recomputable from grants plus inheritance flags.

use serde::{Deserialize, Serialize};

use crate::grant::GrantEntry;
use crate::level::{CapabilityLevel, LevelSet};
use crate::scope::{ResourceTarget, ScopeRef};

/// Where an effective level comes from. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PermissionSource {
	/// Held as a grant row on the scope itself.
	Direct,
	/// Mirrored from the independent ancestor `from`.
	Inherited { from: ScopeRef },
}

/// One effective level with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLevel {
	pub level: CapabilityLevel,
	pub source: PermissionSource,
	/// True when a lesson was asked for and only a module-wide grant satisfied it.
	pub module_wide: bool,
}

/// Effective levels of one scope on one module or lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPermissions {
	pub scope: ScopeRef,
	pub target: ResourceTarget,
	pub levels: Vec<ResolvedLevel>,
}

impl ResolvedPermissions {
	/// Folds the direct grants of `holder` into the view seen by `scope`.
	///
	/// `holder` is `scope` itself when it is independent, otherwise the
	/// ancestor it inherits from.
	pub fn fold<'a>(
		scope: ScopeRef,
		holder: ScopeRef,
		target: ResourceTarget,
		entries: impl IntoIterator<Item = &'a GrantEntry>,
	) -> Self {
		let mut exact = LevelSet::empty();
		let mut module_wide = LevelSet::empty();
		for entry in entries.into_iter().filter(|e| e.covers(&target)) {
			if entry.lesson_id.is_none() {
				module_wide.insert(entry.level);
			} else {
				exact.insert(entry.level);
			}
		}

		let source = if holder == scope {
			PermissionSource::Direct
		} else {
			PermissionSource::Inherited { from: holder }
		};

		let levels = exact
			.union(module_wide)
			.iter()
			.map(|level| ResolvedLevel {
				level,
				source,
				module_wide: !target.is_module_wide() && !exact.contains(level),
			})
			.collect();

		Self {
			scope,
			target,
			levels,
		}
	}

	/// A resolution with no levels, e.g. for a scope with no grants anywhere.
	pub fn empty(scope: ScopeRef, target: ResourceTarget) -> Self {
		Self {
			scope,
			target,
			levels: Vec::new(),
		}
	}

	pub fn level_set(&self) -> LevelSet {
		self.levels.iter().map(|l| l.level).collect()
	}

	pub fn allows(&self, level: CapabilityLevel) -> bool {
		self.levels.iter().any(|l| l.level == level)
	}

	pub fn source_of(&self, level: CapabilityLevel) -> Option<PermissionSource> {
		self
			.levels
			.iter()
			.find(|l| l.level == level)
			.map(|l| l.source)
	}

	/// Returns true if every level came from an ancestor.
	pub fn is_inherited(&self) -> bool {
		!self.levels.is_empty()
			&& self
				.levels
				.iter()
				.all(|l| matches!(l.source, PermissionSource::Inherited { .. }))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scope::{LessonId, ModuleId, ScopeId};

	use CapabilityLevel::{Edit, ViewLesson, ViewPlan};

	fn entries() -> Vec<GrantEntry> {
		vec![
			GrantEntry::new(ResourceTarget::module(ModuleId(7)), ViewLesson),
			GrantEntry::new(ResourceTarget::lesson(ModuleId(7), LessonId(2)), ViewLesson),
			GrantEntry::new(ResourceTarget::lesson(ModuleId(7), LessonId(2)), ViewPlan),
			GrantEntry::new(ResourceTarget::module(ModuleId(8)), Edit),
		]
	}

	#[test]
	fn direct_resolution_of_module() {
		let scope = ScopeRef::org(ScopeId::generate());
		let resolved =
			ResolvedPermissions::fold(scope, scope, ResourceTarget::module(ModuleId(7)), &entries());

		assert_eq!(resolved.level_set().to_vec(), vec![ViewLesson]);
		assert_eq!(resolved.source_of(ViewLesson), Some(PermissionSource::Direct));
		assert!(!resolved.levels[0].module_wide);
		assert!(!resolved.is_inherited());
	}

	#[test]
	fn lesson_resolution_unions_module_wide_grants() {
		let scope = ScopeRef::org(ScopeId::generate());
		let target = ResourceTarget::lesson(ModuleId(7), LessonId(2));
		let resolved = ResolvedPermissions::fold(scope, scope, target, &entries());

		assert_eq!(resolved.level_set().to_vec(), vec![ViewLesson, ViewPlan]);
		assert!(resolved.levels.iter().all(|l| !l.module_wide));
	}

	#[test]
	fn other_lesson_sees_only_module_wide_grants() {
		let scope = ScopeRef::org(ScopeId::generate());
		let target = ResourceTarget::lesson(ModuleId(7), LessonId(5));
		let resolved = ResolvedPermissions::fold(scope, scope, target, &entries());

		assert_eq!(resolved.level_set().to_vec(), vec![ViewLesson]);
		assert!(resolved.levels[0].module_wide);
		assert!(!resolved.allows(ViewPlan));
	}

	#[test]
	fn inherited_resolution_names_holder() {
		let org = ScopeRef::org(ScopeId::generate());
		let cohort = ScopeRef::cohort(ScopeId::generate());
		let resolved =
			ResolvedPermissions::fold(cohort, org, ResourceTarget::module(ModuleId(8)), &entries());

		assert_eq!(resolved.scope, cohort);
		assert_eq!(resolved.level_set().to_vec(), vec![Edit]);
		assert_eq!(
			resolved.source_of(Edit),
			Some(PermissionSource::Inherited { from: org })
		);
		assert!(resolved.is_inherited());
	}

	#[test]
	fn unknown_module_resolves_empty() {
		let scope = ScopeRef::org(ScopeId::generate());
		let resolved =
			ResolvedPermissions::fold(scope, scope, ResourceTarget::module(ModuleId(99)), &entries());
		assert!(resolved.level_set().is_empty());
		assert_eq!(
			resolved,
			ResolvedPermissions::empty(scope, ResourceTarget::module(ModuleId(99)))
		);
	}
}
