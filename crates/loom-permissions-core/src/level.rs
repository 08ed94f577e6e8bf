// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Capability levels and sets of them.
//!
//! Levels are totally ordered: `view_lesson < view_plan < edit`. Holding a
//! level implies holding every level below it on the same module or lesson,
//! which is what [`LevelSet::is_closed`] checks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PermissionsError;

/// One of the three ordered capability levels on module content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityLevel {
	/// Can open lessons of the module.
	ViewLesson,
	/// Can see the module's plan.
	ViewPlan,
	/// Can change module content.
	Edit,
}

impl CapabilityLevel {
	/// Returns every level, lowest first.
	pub fn all() -> &'static [CapabilityLevel] {
		&[
			CapabilityLevel::ViewLesson,
			CapabilityLevel::ViewPlan,
			CapabilityLevel::Edit,
		]
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			CapabilityLevel::ViewLesson => "view_lesson",
			CapabilityLevel::ViewPlan => "view_plan",
			CapabilityLevel::Edit => "edit",
		}
	}

	/// This level and every level below it.
	pub fn and_below(self) -> LevelSet {
		CapabilityLevel::all()
			.iter()
			.copied()
			.filter(|l| *l <= self)
			.collect()
	}

	/// This level and every level above it.
	pub fn and_above(self) -> LevelSet {
		CapabilityLevel::all()
			.iter()
			.copied()
			.filter(|l| *l >= self)
			.collect()
	}

	fn bit(self) -> u8 {
		1 << (self as u8)
	}
}

impl fmt::Display for CapabilityLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for CapabilityLevel {
	type Err = PermissionsError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"view_lesson" => Ok(CapabilityLevel::ViewLesson),
			"view_plan" => Ok(CapabilityLevel::ViewPlan),
			"edit" => Ok(CapabilityLevel::Edit),
			other => Err(PermissionsError::InvalidLevel(other.to_string())),
		}
	}
}

/// A set of capability levels.
///
/// Iteration is always lowest level first. Serializes as a list of level names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<CapabilityLevel>", into = "Vec<CapabilityLevel>")]
pub struct LevelSet(u8);

impl LevelSet {
	pub fn empty() -> Self {
		Self(0)
	}

	pub fn is_empty(&self) -> bool {
		self.0 == 0
	}

	pub fn len(&self) -> usize {
		self.0.count_ones() as usize
	}

	pub fn contains(&self, level: CapabilityLevel) -> bool {
		self.0 & level.bit() != 0
	}

	/// Inserts a level. Returns true if it was not already present.
	pub fn insert(&mut self, level: CapabilityLevel) -> bool {
		let added = !self.contains(level);
		self.0 |= level.bit();
		added
	}

	/// Removes a level. Returns true if it was present.
	pub fn remove(&mut self, level: CapabilityLevel) -> bool {
		let present = self.contains(level);
		self.0 &= !level.bit();
		present
	}

	pub fn union(self, other: LevelSet) -> LevelSet {
		LevelSet(self.0 | other.0)
	}

	pub fn intersection(self, other: LevelSet) -> LevelSet {
		LevelSet(self.0 & other.0)
	}

	pub fn difference(self, other: LevelSet) -> LevelSet {
		LevelSet(self.0 & !other.0)
	}

	/// The highest level in the set, if any.
	pub fn highest(&self) -> Option<CapabilityLevel> {
		self.iter().last()
	}

	/// Returns true if every held level also has all lower levels held.
	pub fn is_closed(&self) -> bool {
		self
			.iter()
			.all(|level| level.and_below().difference(*self).is_empty())
	}

	pub fn iter(&self) -> impl Iterator<Item = CapabilityLevel> + '_ {
		CapabilityLevel::all()
			.iter()
			.copied()
			.filter(move |l| self.contains(*l))
	}

	pub fn to_vec(&self) -> Vec<CapabilityLevel> {
		self.iter().collect()
	}
}

impl FromIterator<CapabilityLevel> for LevelSet {
	fn from_iter<I: IntoIterator<Item = CapabilityLevel>>(iter: I) -> Self {
		let mut set = LevelSet::empty();
		for level in iter {
			set.insert(level);
		}
		set
	}
}

impl Extend<CapabilityLevel> for LevelSet {
	fn extend<I: IntoIterator<Item = CapabilityLevel>>(&mut self, iter: I) {
		for level in iter {
			self.insert(level);
		}
	}
}

impl From<Vec<CapabilityLevel>> for LevelSet {
	fn from(levels: Vec<CapabilityLevel>) -> Self {
		levels.into_iter().collect()
	}
}

impl From<LevelSet> for Vec<CapabilityLevel> {
	fn from(set: LevelSet) -> Self {
		set.to_vec()
	}
}

impl fmt::Display for LevelSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let names: Vec<&str> = self.iter().map(|l| l.as_str()).collect();
		write!(f, "{{{}}}", names.join(", "))
	}
}
