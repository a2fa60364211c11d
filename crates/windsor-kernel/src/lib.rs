//! # Windsor Kernel
//!
//! A synchronous dependency injection container core.
//!
//! ## Features
//!
//! - **Registry**: components registered per service type, optionally keyed,
//!   with per-parameter overrides
//! - **Lifestyles**: singleton, transient and scoped instances
//! - **Sub-resolvers**: pluggable fallbacks consulted when nothing is
//!   registered, including a collection resolver for "every implementation"
//!   parameters
//! - **Lifecycle hooks**: on-create, start and stop, with stop hooks run in
//!   reverse start order
//! - **Diagnostics**: cycle and depth detection during resolution, and a static
//!   dependency graph for validation
//!
//! ## Development Tools (dev-tools feature)
//!
//! With `dev-tools` enabled, [`DependencyGraph::to_dot`] renders the
//! registrations in DOT format for Graphviz.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use windsor_kernel::prelude::*;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! impl Injectable for Database {
//!     fn dependencies() -> Vec<Dependency> {
//!         vec![Dependency::service::<String>("url")]
//!     }
//!
//!     fn construct(args: &Arguments) -> DiResult<Self> {
//!         Ok(Database { url: args.value("url")? })
//!     }
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! impl Injectable for UserService {
//!     fn dependencies() -> Vec<Dependency> {
//!         vec![Dependency::service::<Database>("db")]
//!     }
//!
//!     fn construct(args: &Arguments) -> DiResult<Self> {
//!         Ok(UserService { db: args.get("db")? })
//!     }
//! }
//!
//! let kernel = Kernel::new();
//! kernel
//!     .register(
//!         ComponentRegistration::<Database>::new()
//!             .depends_on("url", DependencyOverride::value("sqlite::memory:".to_string())),
//!     )
//!     .unwrap();
//! kernel
//!     .register(ComponentRegistration::<UserService>::new().transient())
//!     .unwrap();
//!
//! let users = kernel.resolve::<UserService>().unwrap();
//! assert_eq!(users.db.url, "sqlite::memory:");
//! kernel.dispose().unwrap();
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod graph;
pub mod injectable;
pub mod kernel;
pub mod lifecycle;
mod lifestyle;
pub mod registration;
pub mod registry;
mod resolver;
pub mod scope;
pub mod service;
pub mod settings;
pub mod sub_resolver;

pub use context::{Arguments, CreationContext, FactoryContext};
pub use error::{BoxError, DiError, DiResult, StopFailure, TeardownError};
pub use graph::{DependencyGraph, GraphEdge, GraphNode};
pub use injectable::Injectable;
pub use kernel::{Kernel, KernelPhase};
pub use lifecycle::{HookPhase, HookResult};
pub use registration::{
	ComponentRegistration, Dependency, DependencyKind, DependencyOverride, Lifestyle, Registration,
	RegistrationId,
};
pub use registry::Registry;
pub use scope::Scope;
pub use service::{ElementType, Implements, InstanceHandle, ServiceType};
pub use settings::{DEFAULT_MAX_RESOLUTION_DEPTH, DuplicatePolicy, KernelSettings};
pub use sub_resolver::{CollectionResolver, DependencyRequest, Resolution, SubResolver};

/// Commonly used types.
pub mod prelude {
	pub use crate::implements;
	pub use crate::{
		Arguments, ComponentRegistration, Dependency, DependencyOverride, DiError, DiResult,
		FactoryContext, Injectable, Kernel, Lifestyle, Scope,
	};
}
