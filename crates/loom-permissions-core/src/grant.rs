// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Direct grants, the only persisted permission state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::level::{CapabilityLevel, LevelSet};
use crate::scope::{LessonId, ModuleId, ResourceTarget, ScopeRef};

/// A level held on a module or lesson, without the owning scope.
///
/// At most one grant exists per `(scope, module_id, lesson_id, level)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantEntry {
	pub module_id: ModuleId,
	pub lesson_id: Option<LessonId>,
	pub level: CapabilityLevel,
}

impl GrantEntry {
	pub fn new(target: ResourceTarget, level: CapabilityLevel) -> Self {
		Self {
			module_id: target.module_id,
			lesson_id: target.lesson_id,
			level,
		}
	}

	pub fn target(&self) -> ResourceTarget {
		ResourceTarget {
			module_id: self.module_id,
			lesson_id: self.lesson_id,
		}
	}

	/// Returns true if this grant counts towards the given target.
	///
	/// Module-wide grants apply to every lesson of their module.
	pub fn covers(&self, target: &ResourceTarget) -> bool {
		self.module_id == target.module_id
			&& (self.lesson_id.is_none() || self.lesson_id == target.lesson_id)
	}
}

/// A stored grant row: a scope directly holds a level on a module or lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
	pub scope: ScopeRef,
	pub module_id: ModuleId,
	pub lesson_id: Option<LessonId>,
	pub level: CapabilityLevel,
	pub created_at: DateTime<Utc>,
}

impl Grant {
	pub fn new(scope: ScopeRef, entry: GrantEntry) -> Self {
		Self {
			scope,
			module_id: entry.module_id,
			lesson_id: entry.lesson_id,
			level: entry.level,
			created_at: Utc::now(),
		}
	}

	pub fn entry(&self) -> GrantEntry {
		GrantEntry {
			module_id: self.module_id,
			lesson_id: self.lesson_id,
			level: self.level,
		}
	}
}

/// Collects the levels held exactly on `target` (no module-wide fallback).
pub fn levels_at<'a>(
	entries: impl IntoIterator<Item = &'a GrantEntry>,
	target: &ResourceTarget,
) -> LevelSet {
	entries
		.into_iter()
		.filter(|e| e.module_id == target.module_id && e.lesson_id == target.lesson_id)
		.map(|e| e.level)
		.collect()
}

/// Downward-closes a set of entries per module or lesson.
///
/// Each target ends up holding every level at or below the highest level it
/// had. The result is sorted by module, then lesson (module-wide first), then level.
pub fn closed_entries(entries: impl IntoIterator<Item = GrantEntry>) -> Vec<GrantEntry> {
	let mut highest: BTreeMap<(ModuleId, Option<LessonId>), CapabilityLevel> = BTreeMap::new();
	for entry in entries {
		highest
			.entry((entry.module_id, entry.lesson_id))
			.and_modify(|level| *level = (*level).max(entry.level))
			.or_insert(entry.level);
	}

	highest
		.into_iter()
		.flat_map(|((module_id, lesson_id), level)| {
			level.and_below().to_vec().into_iter().map(move |level| GrantEntry {
				module_id,
				lesson_id,
				level,
			})
		})
		.collect()
}
