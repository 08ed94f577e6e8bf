// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Loom module permissions.
//!
//! Module content is protected by three ordered capability levels
//! (`view_lesson < view_plan < edit`) that can be granted at three nested
//! scopes: organizations, cohorts and individuals. A cohort or individual
//! either inherits its parent's effective permissions or owns an independent
//! set of grants.
//!
//! This crate holds everything that does not touch storage:
//!
//! - [`CapabilityLevel`] and [`LevelSet`]: the ordered levels and closed sets of them
//! - [`ScopeRef`], [`ScopeType`], [`ScopeNode`]: authorization subjects
//! - [`Grant`] and [`GrantEntry`]: persisted direct grants
//! - [`plan_toggle`]: the cascade that keeps level sets downward-closed
//! - [`ResolvedPermissions`]: the effective-permission projection
//! - [`migrate`]: rewrites legacy two-level permission documents
//!
//! The server side (`loom-server-permissions`) applies these against SQLite.
//!
//! # Example
//!
//! ```
//! use loom_permissions_core::{plan_toggle, CapabilityLevel, LevelSet};
//!
//! let current = LevelSet::from_iter([CapabilityLevel::ViewLesson]);
//! let plan = plan_toggle(current, CapabilityLevel::Edit, true);
//!
//! assert_eq!(plan.granted, vec![CapabilityLevel::ViewPlan, CapabilityLevel::Edit]);
//! assert!(plan.revoked.is_empty());
//! assert!(plan.apply(current).is_closed());
//! ```

pub mod cascade;
pub mod error;
pub mod grant;
pub mod level;
pub mod migrate;
pub mod resolution;
pub mod scope;

pub use cascade::{plan_toggle, ToggleOutcome, ToggleRequest};
pub use error::{ErrorKind, PermissionsError, Result};
pub use grant::{closed_entries, levels_at, Grant, GrantEntry};
pub use level::{CapabilityLevel, LevelSet};
pub use migrate::{migrate, migrate_in_place, needs_migration};
pub use resolution::{PermissionSource, ResolvedLevel, ResolvedPermissions};
pub use scope::{LessonId, ModuleId, ResourceTarget, ScopeId, ScopeNode, ScopeRef, ScopeType};
