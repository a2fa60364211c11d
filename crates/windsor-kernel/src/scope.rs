//! Resolution scopes.
//!
//! A [`Scope`] owns one instance per scoped registration. Resolving through a
//! scope behaves like resolving through the kernel, except that scoped
//! registrations are cached in the scope. Closing the scope runs the stop
//! hooks of its instances in reverse order and discards them.
//! [`Kernel::reopen`] does the same to every open scope but leaves it usable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::error::{DiResult, TeardownError};
use crate::kernel::Kernel;
use crate::lifecycle::TeardownStack;
use crate::lifestyle::InstanceCache;
use crate::service::{ElementType, ServiceType};
use crate::sub_resolver::DependencyRequest;

pub(crate) struct ScopeState {
	id: u64,
	cache: InstanceCache,
	teardown: TeardownStack,
	closed: AtomicBool,
}

impl ScopeState {
	pub(crate) fn id(&self) -> u64 {
		self.id
	}

	pub(crate) fn cache(&self) -> &InstanceCache {
		&self.cache
	}

	pub(crate) fn teardown(&self) -> &TeardownStack {
		&self.teardown
	}

	pub(crate) fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Stops and discards the scoped instances, leaving the scope open.
	pub(crate) fn invalidate(&self) -> Result<(), TeardownError> {
		let result = self.teardown.unwind();
		self.cache.clear();
		result
	}
}

/// A unit of work owning scoped instances.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use windsor_kernel::{Arguments, ComponentRegistration, DiResult, Injectable, Kernel};
///
/// struct Session;
///
/// impl Injectable for Session {
///     fn construct(_: &Arguments) -> DiResult<Self> {
///         Ok(Session)
///     }
/// }
///
/// let kernel = Kernel::new();
/// kernel.register(ComponentRegistration::<Session>::new().scoped()).unwrap();
///
/// let scope = kernel.begin_scope().unwrap();
/// let a = scope.resolve::<Session>().unwrap();
/// let b = scope.resolve::<Session>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// scope.close().unwrap();
/// ```
pub struct Scope {
	kernel: Kernel,
	state: Arc<ScopeState>,
}

impl Scope {
	pub(crate) fn new(kernel: Kernel, id: u64) -> Self {
		Self {
			kernel,
			state: Arc::new(ScopeState {
				id,
				cache: InstanceCache::default(),
				teardown: TeardownStack::for_scope(id),
				closed: AtomicBool::new(false),
			}),
		}
	}

	pub(crate) fn state(&self) -> &Arc<ScopeState> {
		&self.state
	}

	/// Scope id, unique per kernel.
	pub fn id(&self) -> u64 {
		self.state.id
	}

	/// The kernel the scope belongs to.
	pub fn kernel(&self) -> &Kernel {
		&self.kernel
	}

	/// Resolves `S`, caching scoped registrations in this scope.
	pub fn resolve<S: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<S>> {
		self.kernel.resolve_root::<S>(
			Some(&self.state),
			&DependencyRequest::service(ServiceType::of::<S>()),
		)
	}

	/// Resolves the registration of `S` with selection key `key`.
	pub fn resolve_keyed<S: ?Sized + Send + Sync + 'static>(&self, key: &str) -> DiResult<Arc<S>> {
		self.kernel.resolve_root::<S>(
			Some(&self.state),
			&DependencyRequest::service(ServiceType::of::<S>()).with_key(key),
		)
	}

	/// Resolves every implementation of `T`.
	pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
		self.kernel
			.resolve_all_root::<T>(Some(&self.state), ElementType::of::<T>())
	}

	/// Like [`resolve`](Self::resolve), but `Ok(None)` when nothing is
	/// registered or handled for `S`.
	pub fn try_resolve<S: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<S>>> {
		Kernel::optional_root::<S>(self.resolve::<S>())
	}

	/// Number of scoped instances currently held.
	pub fn instance_count(&self) -> usize {
		self.state.cache.len()
	}

	/// Whether the scope has been closed.
	pub fn is_closed(&self) -> bool {
		self.state.is_closed()
	}

	/// Runs stop hooks in reverse order and discards every scoped instance.
	///
	/// Closing twice is a no-op.
	pub fn close(&self) -> Result<(), TeardownError> {
		if self.state.closed.swap(true, Ordering::AcqRel) {
			return Ok(());
		}
		let pending = self.state.teardown.len();
		let result = self.state.teardown.close();
		self.state.cache.clear();
		info!(scope = self.state.id, stopped = pending, "scope closed");
		result
	}
}

impl Drop for Scope {
	fn drop(&mut self) {
		if self.is_closed() {
			return;
		}
		warn!(scope = self.state.id, "scope dropped without close");
		if let Err(err) = self.close() {
			warn!(scope = self.state.id, error = %err, "teardown of dropped scope failed");
		}
	}
}

impl std::fmt::Debug for Scope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Scope")
			.field("id", &self.state.id)
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}
