//! Kernel error types.
//!
//! Every fallible kernel operation returns [`DiResult`]. Registration problems
//! are reported synchronously from `register`, resolution problems abort only
//! the failing resolution chain, and teardown failures are batched into a
//! [`TeardownError`] once every stop hook has been attempted.

use std::fmt;

use thiserror::Error;

use crate::lifecycle::HookPhase;

/// Boxed error returned by user factories and lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for kernel operations.
pub type DiResult<T> = Result<T, DiError>;

/// Kernel errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiError {
	/// A second non-keyed registration for a service, or a reused key.
	#[error("duplicate registration for {service}{}", key_suffix(.key))]
	DuplicateRegistration {
		/// Service type name.
		service: String,
		/// Selection key, when the clash is on a keyed registration.
		key: Option<String>,
	},

	/// Dependency override that does not match the parameter table.
	#[error("invalid override '{parameter}' for {service}: {reason}")]
	InvalidOverride {
		/// Service type name.
		service: String,
		/// Overridden parameter name.
		parameter: String,
		/// What is wrong with it.
		reason: String,
	},

	/// Registration options that cannot be combined.
	#[error("invalid registration for {service}: {reason}")]
	InvalidRegistration {
		/// Service type name.
		service: String,
		/// What is wrong with it.
		reason: String,
	},

	/// Mutation attempted after the kernel started serving.
	#[error("registry is frozen: cannot {0} while the kernel is serving")]
	RegistryFrozen(String),

	/// Nothing in the registry or the sub-resolver chain satisfied a request.
	#[error(
		"unresolved dependency: {service}{}",
		owner_suffix(.parameter, .owner)
	)]
	UnresolvedDependency {
		/// Requested service type name.
		service: String,
		/// Parameter being resolved, if this was a nested request.
		parameter: Option<String>,
		/// Service owning that parameter.
		owner: Option<String>,
	},

	/// The service is already being constructed further up the chain.
	#[error("circular dependency detected for {service}: {path}")]
	CircularDependency {
		/// Service that closed the cycle.
		service: String,
		/// Full chain, e.g. `A -> B -> A`.
		path: String,
	},

	/// Resolution chain deeper than the configured limit.
	#[error("maximum resolution depth {limit} exceeded while resolving {service}")]
	MaxDepthExceeded {
		/// Service that crossed the limit.
		service: String,
		/// Configured limit.
		limit: usize,
	},

	/// A lifecycle hook returned an error.
	#[error("{phase} hook failed for {service}: {source}")]
	HookExecution {
		/// Service type name.
		service: String,
		/// Phase that failed.
		phase: HookPhase,
		/// Error returned by the hook.
		#[source]
		source: BoxError,
	},

	/// Constructor or factory failure.
	#[error("failed to activate {service}: {source}")]
	Activation {
		/// Service type name.
		service: String,
		/// Error returned by the factory.
		#[source]
		source: BoxError,
	},

	/// Scoped registration resolved without an active scope.
	#[error("{0} is scoped and must be resolved inside a scope")]
	ScopeRequired(String),

	/// Resolution through a scope that has been closed.
	#[error("scope {0} is closed")]
	ScopeClosed(u64),

	/// Kernel already disposed.
	#[error("kernel has been disposed")]
	Disposed,

	/// An erased instance did not hold the expected type.
	#[error("type mismatch: expected {expected}, found {found}")]
	TypeMismatch {
		/// Expected type name.
		expected: String,
		/// Type name carried by the instance.
		found: String,
	},

	/// Stop hooks failed while tearing down.
	#[error(transparent)]
	Teardown(#[from] TeardownError),

	/// Settings could not be loaded.
	#[error("invalid kernel settings: {0}")]
	Settings(String),
}

impl DiError {
	/// Returns `true` for errors raised because nothing could satisfy a request.
	pub fn is_unresolved(&self) -> bool {
		matches!(self, Self::UnresolvedDependency { .. })
	}
}

impl From<toml::de::Error> for DiError {
	fn from(err: toml::de::Error) -> Self {
		Self::Settings(err.to_string())
	}
}

impl From<std::io::Error> for DiError {
	fn from(err: std::io::Error) -> Self {
		Self::Settings(err.to_string())
	}
}

fn key_suffix(key: &Option<String>) -> String {
	match key {
		Some(key) => format!(" with key '{key}'"),
		None => String::new(),
	}
}

fn owner_suffix(parameter: &Option<String>, owner: &Option<String>) -> String {
	match (parameter, owner) {
		(Some(parameter), Some(owner)) => format!(" (parameter '{parameter}' of {owner})"),
		(Some(parameter), None) => format!(" (parameter '{parameter}')"),
		_ => String::new(),
	}
}

/// A single stop hook failure.
#[derive(Debug)]
pub struct StopFailure {
	/// Service whose stop hook failed.
	pub service: String,
	/// Error returned by the hook.
	pub source: BoxError,
}

impl fmt::Display for StopFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.service, self.source)
	}
}

/// Stop hook failures collected during a scope or kernel teardown.
#[derive(Debug, Error)]
#[error(
	"{} stop hook(s) failed during teardown: {}",
	failure_count(.failures),
	join_failures(.failures)
)]
pub struct TeardownError {
	failures: Vec<StopFailure>,
}

impl TeardownError {
	pub(crate) fn new(failures: Vec<StopFailure>) -> Self {
		Self { failures }
	}

	/// Failures in the order the hooks ran.
	pub fn failures(&self) -> &[StopFailure] {
		&self.failures
	}

	pub(crate) fn into_failures(self) -> Vec<StopFailure> {
		self.failures
	}

	/// Services whose stop hook failed, in the order the hooks ran.
	pub fn services(&self) -> Vec<&str> {
		self.failures.iter().map(|f| f.service.as_str()).collect()
	}
}

fn failure_count(failures: &[StopFailure]) -> usize {
	failures.len()
}

fn join_failures(failures: &[StopFailure]) -> String {
	failures
		.iter()
		.map(ToString::to_string)
		.collect::<Vec<_>>()
		.join("; ")
}
