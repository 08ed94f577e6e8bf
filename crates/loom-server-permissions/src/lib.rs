// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cascading module permission engine for Loom server.
//!
//! Decides which capability levels (`view_lesson < view_plan < edit`) an
//! organization, cohort or individual holds on a module's content. Cohorts
//! and individuals either inherit their parent's effective permissions or
//! keep an independent set of grants.
//!
//! # Architecture
//!
//! - `store` - SQLite persistence of grants and inheritance flags
//! - `directory` - scope containment, supplied by the membership system
//! - `service` - [`PermissionService`], the only mutation path
//! - `resolver` - effective-permission resolution and the presentation tree
//! - `inheritance` - detaching from and re-attaching to a parent
//! - `batch` - one cascade applied to many scopes
//! - `documents` - rewriting stored legacy permission documents
//! - `locks` - per-scope and per-module serialization of mutations
//! - `config` - layered configuration (defaults, TOML, environment)
//!
//! # Example
//!
//! ```ignore
//! use loom_server_permissions::{load_config, PermissionService, StaticScopeDirectory};
//! use loom_permissions_core::{CapabilityLevel, ModuleId, ResourceTarget, ToggleRequest};
//!
//! let config = load_config()?;
//! let directory = Arc::new(StaticScopeDirectory::new());
//! let service = PermissionService::connect(config, directory).await?;
//!
//! let target = ResourceTarget::module(ModuleId(7));
//! service
//! 	.toggle(&ToggleRequest::new(cohort, target, CapabilityLevel::Edit, true))
//! 	.await?;
//! let levels = service.resolve(cohort, target).await?;
//! ```

pub mod batch;
pub mod config;
pub mod directory;
pub mod documents;
pub mod error;
pub mod inheritance;
pub mod locks;
pub mod pool;
pub mod resolver;
pub mod schema;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

pub use batch::{BatchFailure, BatchOutcome};
pub use config::{
	load_config, load_config_from_env, load_config_with_file, ConfigError, ConfigSource,
	DatabaseConfig, DefaultsSource, EnvSource, PermissionsConfig, PermissionsConfigLayer,
	Precedence, TomlSource,
};
pub use directory::{ScopeDirectory, StaticScopeDirectory};
pub use documents::{MigrationReport, PermissionDocument};
pub use error::{PermissionsServerError, Result};
pub use inheritance::{AncestorSnapshotProvider, FixedSnapshot, InheritanceChange};
pub use locks::LockRegistry;
pub use pool::create_pool;
pub use resolver::PermissionTreeEntry;
pub use schema::ensure_schema;
pub use service::PermissionService;
pub use store::{PermissionStore, SqlitePermissionStore};

// Re-export core types for convenience
pub use loom_permissions_core::*;
