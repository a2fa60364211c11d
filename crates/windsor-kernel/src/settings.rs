//! Kernel settings.
//!
//! Settings are plain data with serde support so they can live next to the
//! rest of an application's configuration. Every field has a default, so a
//! partial TOML table is enough:
//!
//! ```toml
//! duplicate_policy = "last_wins"
//! max_resolution_depth = 64
//! collection_resolver = true
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DiError, DiResult};

/// Default limit for nested resolution chains.
pub const DEFAULT_MAX_RESOLUTION_DEPTH: usize = 100;

/// What the registry does with a second non-keyed registration of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
	/// Reject the registration with `DuplicateRegistration`.
	#[default]
	Reject,
	/// Keep every registration; single resolution picks the earliest.
	FirstWins,
	/// Keep every registration; single resolution picks the latest.
	LastWins,
}

impl fmt::Display for DuplicatePolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Reject => write!(f, "reject"),
			Self::FirstWins => write!(f, "first_wins"),
			Self::LastWins => write!(f, "last_wins"),
		}
	}
}

/// Kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSettings {
	/// Handling of duplicate non-keyed registrations.
	pub duplicate_policy: DuplicatePolicy,
	/// Deepest resolution chain allowed before `MaxDepthExceeded`.
	pub max_resolution_depth: usize,
	/// Install the built-in collection resolver when the kernel is created.
	pub collection_resolver: bool,
	/// Whether the built-in collection resolver answers with an empty sequence
	/// when nothing is registered for the element type.
	pub allow_empty_collections: bool,
}

impl Default for KernelSettings {
	fn default() -> Self {
		Self {
			duplicate_policy: DuplicatePolicy::default(),
			max_resolution_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
			collection_resolver: false,
			allow_empty_collections: true,
		}
	}
}

impl KernelSettings {
	/// Parses settings from a TOML document.
	///
	/// # Examples
	///
	/// ```
	/// use windsor_kernel::{DuplicatePolicy, KernelSettings};
	///
	/// let settings = KernelSettings::from_toml_str("duplicate_policy = \"first_wins\"").unwrap();
	/// assert_eq!(settings.duplicate_policy, DuplicatePolicy::FirstWins);
	/// assert_eq!(settings.max_resolution_depth, 100);
	/// ```
	pub fn from_toml_str(source: &str) -> DiResult<Self> {
		let settings: Self = toml::from_str(source)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Reads and parses a TOML settings file.
	pub fn from_file(path: impl AsRef<Path>) -> DiResult<Self> {
		let source = std::fs::read_to_string(path.as_ref())?;
		Self::from_toml_str(&source)
	}

	/// Sets the duplicate registration policy.
	pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
		self.duplicate_policy = policy;
		self
	}

	/// Sets the resolution depth limit.
	pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
		self.max_resolution_depth = depth;
		self
	}

	/// Installs the collection resolver at kernel creation.
	pub fn with_collection_resolver(mut self, allow_empty: bool) -> Self {
		self.collection_resolver = true;
		self.allow_empty_collections = allow_empty;
		self
	}

	/// Checks values that serde cannot reject on its own.
	pub fn validate(&self) -> DiResult<()> {
		if self.max_resolution_depth == 0 {
			return Err(DiError::Settings(
				"max_resolution_depth must be at least 1".to_string(),
			));
		}
		Ok(())
	}
}
