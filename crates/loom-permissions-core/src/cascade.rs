// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cascade planning for a single capability toggle.
//!
//! Granting a level also grants every level below it; revoking a level also
//! revokes every level above it. Both directions keep the direct level set of
//! an independent scope downward-closed.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::level::{CapabilityLevel, LevelSet};
use crate::scope::{ResourceTarget, ScopeRef};

/// A request to switch one capability level on or off for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleRequest {
	pub scope: ScopeRef,
	pub target: ResourceTarget,
	pub level: CapabilityLevel,
	pub desired_on: bool,
}

impl ToggleRequest {
	pub fn new(
		scope: ScopeRef,
		target: ResourceTarget,
		level: CapabilityLevel,
		desired_on: bool,
	) -> Self {
		Self {
			scope,
			target,
			level,
			desired_on,
		}
	}

	/// Builds a request from a wire level name.
	///
	/// # Errors
	/// Returns `PermissionsError::InvalidLevel` for anything other than
	/// `view_lesson`, `view_plan` or `edit`.
	pub fn parse(
		scope: ScopeRef,
		target: ResourceTarget,
		level: &str,
		desired_on: bool,
	) -> Result<Self> {
		Ok(Self::new(scope, target, level.parse()?, desired_on))
	}
}

/// The levels a toggle actually inserted and deleted.
///
/// An empty outcome is a successful no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOutcome {
	pub granted: Vec<CapabilityLevel>,
	pub revoked: Vec<CapabilityLevel>,
}

impl ToggleOutcome {
	pub fn is_noop(&self) -> bool {
		self.granted.is_empty() && self.revoked.is_empty()
	}

	/// The level set that results from applying this outcome to `current`.
	pub fn apply(&self, current: LevelSet) -> LevelSet {
		let mut next = current;
		next.extend(self.granted.iter().copied());
		for level in &self.revoked {
			next.remove(*level);
		}
		next
	}
}

/// Plans the inserts and deletes for toggling `level` given the currently held levels.
pub fn plan_toggle(current: LevelSet, level: CapabilityLevel, desired_on: bool) -> ToggleOutcome {
	if desired_on {
		ToggleOutcome {
			granted: level.and_below().difference(current).to_vec(),
			revoked: Vec::new(),
		}
	} else {
		ToggleOutcome {
			granted: Vec::new(),
			revoked: level.and_above().intersection(current).to_vec(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::PermissionsError;
	use crate::scope::{ModuleId, ScopeId};
	use proptest::prelude::*;

	use CapabilityLevel::{Edit, ViewLesson, ViewPlan};

	#[test]
	fn grant_edit_on_empty_grants_everything() {
		let plan = plan_toggle(LevelSet::empty(), Edit, true);
		assert_eq!(plan.granted, vec![ViewLesson, ViewPlan, Edit]);
		assert!(plan.revoked.is_empty());
	}

	#[test]
	fn grant_skips_levels_already_held() {
		let current = LevelSet::from_iter([ViewLesson]);
		let plan = plan_toggle(current, Edit, true);
		assert_eq!(plan.granted, vec![ViewPlan, Edit]);
	}

	#[test]
	fn grant_of_held_level_is_noop() {
		let current = Edit.and_below();
		assert!(plan_toggle(current, ViewPlan, true).is_noop());
		assert!(plan_toggle(current, Edit, true).is_noop());
	}

	#[test]
	fn revoke_lowest_level_revokes_everything() {
		let plan = plan_toggle(Edit.and_below(), ViewLesson, false);
		assert_eq!(plan.revoked, vec![ViewLesson, ViewPlan, Edit]);
		assert!(plan.granted.is_empty());
		assert!(plan.apply(Edit.and_below()).is_empty());
	}

	#[test]
	fn revoke_middle_level_keeps_lower() {
		let current = Edit.and_below();
		let plan = plan_toggle(current, ViewPlan, false);
		assert_eq!(plan.revoked, vec![ViewPlan, Edit]);
		assert_eq!(plan.apply(current).to_vec(), vec![ViewLesson]);
	}

	#[test]
	fn revoke_absent_level_is_noop() {
		let current = LevelSet::from_iter([ViewLesson]);
		assert!(plan_toggle(current, Edit, false).is_noop());
	}

	#[test]
	fn request_parse_rejects_unknown_level() {
		let scope = ScopeRef::cohort(ScopeId::generate());
		let target = ResourceTarget::module(ModuleId(7));

		let request = ToggleRequest::parse(scope, target, "view_plan", true).unwrap();
		assert_eq!(request.level, ViewPlan);

		let err = ToggleRequest::parse(scope, target, "admin", true).unwrap_err();
		assert_eq!(err, PermissionsError::InvalidLevel("admin".to_string()));
	}

	fn any_level() -> impl Strategy<Value = CapabilityLevel> {
		prop_oneof![Just(ViewLesson), Just(ViewPlan), Just(Edit)]
	}

	proptest! {
		#[test]
		fn toggles_preserve_closure(ops in prop::collection::vec((any_level(), any::<bool>()), 0..40)) {
			let mut current = LevelSet::empty();
			for (level, on) in ops {
				let plan = plan_toggle(current, level, on);
				current = plan.apply(current);
				prop_assert!(current.is_closed(), "{current} is not closed");
				prop_assert_eq!(current.contains(level), on);
			}
		}

		#[test]
		fn grant_is_idempotent(level in any_level(), start in any_level()) {
			let once = plan_toggle(start.and_below(), level, true).apply(start.and_below());
			let twice = plan_toggle(once, level, true);
			prop_assert!(twice.is_noop());
		}
	}
}
