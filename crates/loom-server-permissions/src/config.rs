// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the permission engine.
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (`LOOM_SERVER_PERMISSIONS_*`)
//! 2. Config file (`/etc/loom/permissions.toml`)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, trace};

const DEFAULT_DATABASE_URL: &str = "sqlite:./loom-permissions.db";
const DEFAULT_BATCH_CONCURRENCY: usize = 8;
pub(crate) const DEFAULT_LOCK_PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Failed to read config file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse config file {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("Invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },
}

/// Database configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
	pub url: String,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			url: DEFAULT_DATABASE_URL.to_string(),
		}
	}
}

/// Database configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: DatabaseConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
	}

	pub fn finalize(self) -> DatabaseConfig {
		DatabaseConfig {
			url: self
				.url
				.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
		}
	}
}

/// Permission engine configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct PermissionsConfig {
	pub database: DatabaseConfig,
	/// Whether a cohort or individual with no stored flag inherits from its parent.
	pub default_inherits: bool,
	/// Maximum number of per-scope cascades in flight during a batch.
	pub batch_concurrency: usize,
	/// Number of lock entries kept before idle ones are dropped.
	pub lock_prune_threshold: usize,
}

impl Default for PermissionsConfig {
	fn default() -> Self {
		Self {
			database: DatabaseConfig::default(),
			default_inherits: true,
			batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
			lock_prune_threshold: DEFAULT_LOCK_PRUNE_THRESHOLD,
		}
	}
}

/// Permission engine configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionsConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub default_inherits: Option<bool>,
	#[serde(default)]
	pub batch_concurrency: Option<usize>,
	#[serde(default)]
	pub lock_prune_threshold: Option<usize>,
}

impl PermissionsConfigLayer {
	pub fn merge(&mut self, other: PermissionsConfigLayer) {
		if let Some(other_db) = other.database {
			match self.database.as_mut() {
				Some(db) => db.merge(other_db),
				None => self.database = Some(other_db),
			}
		}
		if other.default_inherits.is_some() {
			self.default_inherits = other.default_inherits;
		}
		if other.batch_concurrency.is_some() {
			self.batch_concurrency = other.batch_concurrency;
		}
		if other.lock_prune_threshold.is_some() {
			self.lock_prune_threshold = other.lock_prune_threshold;
		}
	}

	pub fn finalize(self) -> Result<PermissionsConfig, ConfigError> {
		let batch_concurrency = self.batch_concurrency.unwrap_or(DEFAULT_BATCH_CONCURRENCY);
		if batch_concurrency == 0 {
			return Err(ConfigError::InvalidValue {
				key: "batch_concurrency".to_string(),
				message: "must be at least 1".to_string(),
			});
		}

		Ok(PermissionsConfig {
			database: self.database.unwrap_or_default().finalize(),
			default_inherits: self.default_inherits.unwrap_or(true),
			batch_concurrency,
			lock_prune_threshold: self
				.lock_prune_threshold
				.unwrap_or(DEFAULT_LOCK_PRUNE_THRESHOLD),
		})
	}
}

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<PermissionsConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<PermissionsConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(PermissionsConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/loom/permissions.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<PermissionsConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(PermissionsConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: PermissionsConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: LOOM_SERVER_PERMISSIONS_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<PermissionsConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(PermissionsConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: env_var("LOOM_SERVER_PERMISSIONS_DATABASE_URL"),
			}),
			default_inherits: env_bool("LOOM_SERVER_PERMISSIONS_DEFAULT_INHERITS"),
			batch_concurrency: env_usize("LOOM_SERVER_PERMISSIONS_BATCH_CONCURRENCY")?,
			lock_prune_threshold: env_usize("LOOM_SERVER_PERMISSIONS_LOCK_PRUNE_THRESHOLD")?,
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid usize value '{v}'"),
		}),
		None => Ok(None),
	}
}

/// Load configuration from all sources with standard precedence.
pub fn load_config() -> Result<PermissionsConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<PermissionsConfig, ConfigError> {
	load_from_sources(vec![Box::new(DefaultsSource), Box::new(EnvSource)])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<PathBuf>,
) -> Result<PermissionsConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<PermissionsConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = PermissionsConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	merged.finalize()
}
