//! Per-resolution state and constructor arguments.
//!
//! A [`CreationContext`] is created for every top-level resolution and
//! threaded through every nested one. It records the chain of services being
//! built, which is what cycle detection and the depth limit work from, and the
//! scope that scoped registrations are cached in.
//!
//! Services under construction are also recorded per thread. A top-level
//! resolution started while another one is running on the same thread and
//! kernel, for example from a factory holding a kernel handle, continues the
//! outer chain instead of starting an empty one.

use std::cell::{Ref, RefCell};
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::kernel::Kernel;
use crate::registration::Registration;
use crate::scope::ScopeState;
use crate::service::{ElementType, InstanceHandle, ServiceType};
use crate::sub_resolver::DependencyRequest;

thread_local! {
	/// Services under construction on this thread, tagged with their kernel.
	static IN_PROGRESS: RefCell<Vec<(usize, ServiceType)>> = const { RefCell::new(Vec::new()) };
}

/// Keeps `IN_PROGRESS` in step with a `track` frame, also on unwind.
struct InProgress;

impl InProgress {
	fn enter(owner: usize, service: ServiceType) -> Self {
		IN_PROGRESS.with_borrow_mut(|entries| entries.push((owner, service)));
		Self
	}
}

impl Drop for InProgress {
	fn drop(&mut self) {
		IN_PROGRESS.with_borrow_mut(|entries| {
			entries.pop();
		});
	}
}

/// State of one top-level resolution.
pub struct CreationContext {
	owner: usize,
	chain: Vec<ServiceType>,
	max_depth: usize,
	scope: Option<Arc<ScopeState>>,
}

impl CreationContext {
	/// `owner` identifies the kernel; the chain starts with whatever that
	/// kernel is already building on the current thread.
	pub(crate) fn new(owner: usize, max_depth: usize, scope: Option<Arc<ScopeState>>) -> Self {
		let chain = IN_PROGRESS.with_borrow(|entries| {
			entries
				.iter()
				.filter(|(kernel, _)| *kernel == owner)
				.map(|(_, service)| *service)
				.collect()
		});
		Self {
			owner,
			chain,
			max_depth,
			scope,
		}
	}

	/// Services currently under construction, outermost first.
	pub fn chain(&self) -> &[ServiceType] {
		&self.chain
	}

	/// Length of the chain.
	pub fn depth(&self) -> usize {
		self.chain.len()
	}

	/// Configured depth limit.
	pub fn max_depth(&self) -> usize {
		self.max_depth
	}

	/// Id of the active scope, if any.
	pub fn scope_id(&self) -> Option<u64> {
		self.scope.as_ref().map(|scope| scope.id())
	}

	pub(crate) fn scope(&self) -> Option<&Arc<ScopeState>> {
		self.scope.as_ref()
	}

	/// Runs `f` with `service` pushed on the chain.
	///
	/// Fails without running `f` when `service` is already on the chain or
	/// the chain is at the depth limit.
	pub(crate) fn track<R>(
		&mut self,
		service: ServiceType,
		f: impl FnOnce(&mut Self) -> DiResult<R>,
	) -> DiResult<R> {
		if let Some(start) = self.chain.iter().position(|s| *s == service) {
			return Err(DiError::CircularDependency {
				service: service.name().to_string(),
				path: self.cycle_path(start, service),
			});
		}
		if self.chain.len() >= self.max_depth {
			return Err(DiError::MaxDepthExceeded {
				service: service.name().to_string(),
				limit: self.max_depth,
			});
		}

		self.chain.push(service);
		let frame = InProgress::enter(self.owner, service);
		let result = f(self);
		drop(frame);
		self.chain.pop();
		result
	}

	/// Runs `f` without the active scope.
	///
	/// Singletons are built this way so they never capture a scoped instance.
	pub(crate) fn detached<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
		let scope = self.scope.take();
		let result = f(self);
		self.scope = scope;
		result
	}

	fn cycle_path(&self, start: usize, service: ServiceType) -> String {
		self.chain[start..]
			.iter()
			.chain(std::iter::once(&service))
			.map(ServiceType::name)
			.collect::<Vec<_>>()
			.join(" -> ")
	}
}

impl std::fmt::Debug for CreationContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CreationContext")
			.field("chain", &self.chain)
			.field("max_depth", &self.max_depth)
			.field("scope", &self.scope_id())
			.finish()
	}
}

/// Resolved constructor arguments, by parameter name.
#[derive(Debug)]
pub struct Arguments {
	owner: ServiceType,
	values: Vec<(&'static str, Option<InstanceHandle>)>,
}

impl Arguments {
	pub(crate) fn new(owner: ServiceType) -> Self {
		Self {
			owner,
			values: Vec::new(),
		}
	}

	pub(crate) fn insert(&mut self, name: &'static str, value: Option<InstanceHandle>) {
		self.values.push((name, value));
	}

	/// Raw handle of a resolved parameter; `None` if it was optional and
	/// unresolved, or not declared.
	pub fn handle(&self, name: &str) -> Option<&InstanceHandle> {
		self.values
			.iter()
			.find(|(n, _)| *n == name)
			.and_then(|(_, value)| value.as_ref())
	}

	/// Required parameter `name` as `Arc<T>`.
	pub fn get<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
		self.optional::<T>(name)?
			.ok_or_else(|| DiError::UnresolvedDependency {
				service: std::any::type_name::<T>().to_string(),
				parameter: Some(name.to_string()),
				owner: Some(self.owner.name().to_string()),
			})
	}

	/// Required parameter `name`, cloned out of its `Arc`.
	pub fn value<T: Clone + Send + Sync + 'static>(&self, name: &str) -> DiResult<T> {
		Ok(T::clone(&*self.get::<T>(name)?))
	}

	/// Optional parameter `name`: `Ok(None)` when nothing satisfied it.
	pub fn optional<T: ?Sized + Send + Sync + 'static>(
		&self,
		name: &str,
	) -> DiResult<Option<Arc<T>>> {
		let Some(handle) = self.handle(name) else {
			return Ok(None);
		};
		handle
			.downcast::<T>()
			.map(Some)
			.ok_or_else(|| DiError::TypeMismatch {
				expected: std::any::type_name::<T>().to_string(),
				found: handle.service().name().to_string(),
			})
	}

	/// Collection parameter `name` as `Vec<Arc<T>>`.
	pub fn all<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> DiResult<Vec<Arc<T>>> {
		Ok(Arc::unwrap_or_clone(self.get::<Vec<Arc<T>>>(name)?))
	}

	/// Parameter names in resolution order.
	pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
		self.values.iter().map(|(name, _)| *name)
	}

	/// Number of declared parameters.
	pub fn len(&self) -> usize {
		self.values.len()
	}

	/// Whether no parameters were declared.
	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

/// What a factory registration receives.
///
/// Nested resolutions made through the context share the caller's creation
/// chain, so cycles through factories are detected like any other.
pub struct FactoryContext<'a> {
	kernel: &'a Kernel,
	registration: &'a Registration,
	arguments: Arguments,
	context: RefCell<&'a mut CreationContext>,
}

impl<'a> FactoryContext<'a> {
	pub(crate) fn new(
		kernel: &'a Kernel,
		registration: &'a Registration,
		arguments: Arguments,
		context: &'a mut CreationContext,
	) -> Self {
		Self {
			kernel,
			registration,
			arguments,
			context: RefCell::new(context),
		}
	}

	/// The kernel running the factory.
	///
	/// Resolutions made through it on the factory's thread continue the
	/// current creation chain.
	pub fn kernel(&self) -> &Kernel {
		self.kernel
	}

	/// Registration being activated.
	pub fn registration(&self) -> &Registration {
		self.registration
	}

	/// Resolved declared parameters.
	pub fn arguments(&self) -> &Arguments {
		&self.arguments
	}

	/// Current creation context.
	///
	/// # Panics
	///
	/// Panics if called while a nested resolution through this context is
	/// still running, which cannot happen from the factory itself.
	pub fn creation_context(&self) -> Ref<'_, CreationContext> {
		Ref::map(self.context.borrow(), |context| &**context)
	}

	/// Resolves `T` as part of the current chain.
	pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
		self.resolve_request(&DependencyRequest::service(ServiceType::of::<T>()))
	}

	/// Resolves the registration of `T` with selection key `key`.
	pub fn resolve_keyed<T: ?Sized + Send + Sync + 'static>(&self, key: &str) -> DiResult<Arc<T>> {
		self.resolve_request(&DependencyRequest::service(ServiceType::of::<T>()).with_key(key))
	}

	/// Resolves every implementation of `T`.
	pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
		let sequence = self.resolve_request::<Vec<Arc<T>>>(&DependencyRequest::collection(
			ElementType::of::<T>(),
		))?;
		Ok(Arc::unwrap_or_clone(sequence))
	}

	/// Like [`resolve`](Self::resolve), but `Ok(None)` when nothing matches.
	pub fn try_resolve<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
		Kernel::optional_root::<T>(self.resolve::<T>())
	}

	fn resolve_request<T: ?Sized + Send + Sync + 'static>(
		&self,
		request: &DependencyRequest<'_>,
	) -> DiResult<Arc<T>> {
		let mut context = self.context.borrow_mut();
		self.kernel.resolve_typed::<T>(request, &mut **context)
	}
}
