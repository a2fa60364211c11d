//! # Windsor
//!
//! A synchronous dependency injection container.
//!
//! This crate re-exports [`windsor_kernel`]: the component registry, the
//! resolver with its lifestyle manager and sub-resolver chain, and the
//! lifecycle hook invoker.
//!
//! ## Feature Flags
//!
//! - `dev-tools` - DOT rendering of the dependency graph
//!
//! ## Quick Example
//!
//! ```rust
//! use std::sync::Arc;
//! use windsor::prelude::*;
//!
//! let kernel = Kernel::new();
//! kernel
//!     .register(ComponentRegistration::instance(Arc::new(String::from("hello"))))
//!     .unwrap();
//!
//! assert_eq!(*kernel.resolve::<String>().unwrap(), "hello");
//! ```

pub use windsor_kernel::*;
