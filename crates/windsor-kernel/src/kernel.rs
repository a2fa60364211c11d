//! The container handle.
//!
//! [`Kernel`] is a cheap-to-clone handle shared across threads. It moves
//! through three phases:
//!
//! - `Configuring`: registrations and sub-resolvers may be added.
//! - `Serving`: entered on the first resolution, scope or `start`; the
//!   registry is frozen.
//! - `Disposed`: entered by `dispose`; every call fails with `Disposed`.
//!
//! [`Kernel::reopen`] tears singletons and scoped instances down and returns
//! to `Configuring`.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{DiError, DiResult, TeardownError};
use crate::graph::DependencyGraph;
use crate::lifecycle::{self, HookPhase, TeardownStack};
use crate::lifestyle::InstanceCache;
use crate::registration::{ComponentRegistration, OverrideSource, Registration, RegistrationId};
use crate::registry::Registry;
use crate::scope::{Scope, ScopeState};
use crate::service::{ElementType, ServiceType};
use crate::settings::KernelSettings;
use crate::sub_resolver::{CollectionResolver, DependencyRequest, SubResolver};

/// Kernel lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelPhase {
	/// Accepting registrations.
	Configuring,
	/// Resolving; the registry is frozen.
	Serving,
	/// Torn down.
	Disposed,
}

impl fmt::Display for KernelPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Configuring => write!(f, "configuring"),
			Self::Serving => write!(f, "serving"),
			Self::Disposed => write!(f, "disposed"),
		}
	}
}

#[derive(Default)]
struct StartState {
	complete: bool,
	started: HashSet<RegistrationId>,
}

struct KernelInner {
	settings: KernelSettings,
	phase: RwLock<KernelPhase>,
	registry: RwLock<Registry>,
	sub_resolvers: RwLock<Vec<Arc<dyn SubResolver>>>,
	singletons: InstanceCache,
	teardown: TeardownStack,
	start: Mutex<StartState>,
	scopes: Mutex<Vec<Weak<ScopeState>>>,
	next_scope_id: AtomicU64,
}

/// Dependency injection kernel.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use windsor_kernel::{
///     implements, Arguments, ComponentRegistration, Dependency, DependencyOverride, DiResult,
///     Injectable, Kernel,
/// };
///
/// trait Notifier: Send + Sync {
///     fn notify(&self) -> String;
/// }
///
/// struct Email {
///     retries: u32,
/// }
///
/// impl Injectable for Email {
///     fn dependencies() -> Vec<Dependency> {
///         vec![Dependency::service::<u32>("retries")]
///     }
///
///     fn construct(args: &Arguments) -> DiResult<Self> {
///         Ok(Email { retries: args.value("retries")? })
///     }
/// }
///
/// impl Notifier for Email {
///     fn notify(&self) -> String {
///         format!("email x{}", self.retries)
///     }
/// }
///
/// implements!(Email => dyn Notifier);
///
/// let kernel = Kernel::new();
/// kernel
///     .register(
///         ComponentRegistration::<dyn Notifier>::implemented_by::<Email>()
///             .depends_on("retries", DependencyOverride::value(3_u32)),
///     )
///     .unwrap();
///
/// let notifier: Arc<dyn Notifier> = kernel.resolve::<dyn Notifier>().unwrap();
/// assert_eq!(notifier.notify(), "email x3");
/// ```
#[derive(Clone)]
pub struct Kernel {
	inner: Arc<KernelInner>,
}

impl Default for Kernel {
	fn default() -> Self {
		Self::new()
	}
}

impl Kernel {
	/// Creates a kernel with default settings.
	pub fn new() -> Self {
		Self::build(KernelSettings::default())
	}

	/// Creates a kernel with `settings`.
	///
	/// # Errors
	///
	/// `Settings` when the settings are invalid, e.g. a depth limit of zero.
	pub fn with_settings(settings: KernelSettings) -> DiResult<Self> {
		settings.validate()?;
		Ok(Self::build(settings))
	}

	fn build(settings: KernelSettings) -> Self {
		let mut sub_resolvers: Vec<Arc<dyn SubResolver>> = Vec::new();
		if settings.collection_resolver {
			sub_resolvers.push(Arc::new(CollectionResolver::new(
				settings.allow_empty_collections,
			)));
		}
		debug!(
			duplicate_policy = %settings.duplicate_policy,
			max_resolution_depth = settings.max_resolution_depth,
			collection_resolver = settings.collection_resolver,
			"kernel created"
		);

		Self {
			inner: Arc::new(KernelInner {
				registry: RwLock::new(Registry::new(settings.duplicate_policy)),
				settings,
				phase: RwLock::new(KernelPhase::Configuring),
				sub_resolvers: RwLock::new(sub_resolvers),
				singletons: InstanceCache::default(),
				teardown: TeardownStack::default(),
				start: Mutex::new(StartState::default()),
				scopes: Mutex::new(Vec::new()),
				next_scope_id: AtomicU64::new(1),
			}),
		}
	}

	/// Creates a kernel from a TOML settings file.
	pub fn from_settings_file(path: impl AsRef<std::path::Path>) -> DiResult<Self> {
		Self::with_settings(KernelSettings::from_file(path)?)
	}

	/// Settings the kernel was created with.
	pub fn settings(&self) -> &KernelSettings {
		&self.inner.settings
	}

	/// Current phase.
	pub fn phase(&self) -> KernelPhase {
		*self.inner.phase.read()
	}

	/// Identity shared by every clone of this kernel.
	pub(crate) fn key(&self) -> usize {
		Arc::as_ptr(&self.inner) as usize
	}

	pub(crate) fn registry(&self) -> &RwLock<Registry> {
		&self.inner.registry
	}

	pub(crate) fn singletons(&self) -> &InstanceCache {
		&self.inner.singletons
	}

	pub(crate) fn teardown(&self) -> &TeardownStack {
		&self.inner.teardown
	}

	pub(crate) fn sub_resolvers(&self) -> Vec<Arc<dyn SubResolver>> {
		self.inner.sub_resolvers.read().clone()
	}

	fn ensure_configuring(&self, phase: KernelPhase, action: impl FnOnce() -> String) -> DiResult<()> {
		match phase {
			KernelPhase::Configuring => Ok(()),
			KernelPhase::Serving => Err(DiError::RegistryFrozen(action())),
			KernelPhase::Disposed => Err(DiError::Disposed),
		}
	}

	/// Adds a component.
	///
	/// # Errors
	///
	/// `RegistryFrozen` once the kernel is serving, `Disposed` after
	/// disposal, and every registration error of the registry.
	pub fn register<S: ?Sized + Send + Sync + 'static>(
		&self,
		component: ComponentRegistration<S>,
	) -> DiResult<RegistrationId> {
		let phase = self.inner.phase.read();
		self.ensure_configuring(*phase, || format!("register {}", ServiceType::of::<S>()))?;
		self.inner.registry.write().register(component)
	}

	/// Appends a sub-resolver to the chain.
	pub fn add_sub_resolver(&self, resolver: impl SubResolver + 'static) -> DiResult<()> {
		let phase = self.inner.phase.read();
		self.ensure_configuring(*phase, || format!("add sub-resolver '{}'", resolver.name()))?;
		debug!(resolver = resolver.name(), "sub-resolver added");
		self.inner.sub_resolvers.write().push(Arc::new(resolver));
		Ok(())
	}

	/// Appends the built-in collection resolver, honoring
	/// `allow_empty_collections`.
	pub fn add_collection_resolver(&self) -> DiResult<()> {
		self.add_sub_resolver(CollectionResolver::new(
			self.inner.settings.allow_empty_collections,
		))
	}

	/// Registrations for service `S`, in registration order.
	pub fn lookup<S: ?Sized + 'static>(&self) -> Vec<Arc<Registration>> {
		self.lookup_service(ServiceType::of::<S>())
	}

	pub(crate) fn lookup_service(&self, service: ServiceType) -> Vec<Arc<Registration>> {
		self.inner.registry.read().lookup(service.id())
	}

	/// Whether anything is registered for `S`.
	pub fn is_registered<S: ?Sized + 'static>(&self) -> bool {
		self.inner.registry.read().contains(ServiceType::of::<S>().id())
	}

	/// Every registration, in registration order.
	pub fn registrations(&self) -> Vec<Arc<Registration>> {
		self.inner.registry.read().iter().cloned().collect()
	}

	/// Resolves `S`.
	///
	/// # Errors
	///
	/// `UnresolvedDependency` when neither the registry nor a sub-resolver
	/// answers, `ScopeRequired` for scoped registrations,
	/// `CircularDependency` / `MaxDepthExceeded` for broken graphs, and
	/// whatever constructors, factories and hooks report.
	pub fn resolve<S: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<S>> {
		self.resolve_root::<S>(None, &DependencyRequest::service(ServiceType::of::<S>()))
	}

	/// Resolves the registration of `S` with selection key `key`.
	pub fn resolve_keyed<S: ?Sized + Send + Sync + 'static>(&self, key: &str) -> DiResult<Arc<S>> {
		self.resolve_root::<S>(
			None,
			&DependencyRequest::service(ServiceType::of::<S>()).with_key(key),
		)
	}

	/// Resolves every registration of `T`, in registration order.
	///
	/// Returns an empty vector when nothing is registered.
	pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
		self.resolve_all_root::<T>(None, ElementType::of::<T>())
	}

	/// Like [`resolve`](Self::resolve), but `Ok(None)` when nothing answers
	/// for `S`. Errors further down the chain are still reported.
	pub fn try_resolve<S: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<S>>> {
		Self::optional_root::<S>(self.resolve::<S>())
	}

	/// Opens a scope for scoped registrations.
	pub fn begin_scope(&self) -> DiResult<Scope> {
		self.seal()?;
		let id = self.inner.next_scope_id.fetch_add(1, Ordering::Relaxed);
		let scope = Scope::new(self.clone(), id);
		{
			let mut scopes = self.inner.scopes.lock();
			scopes.retain(|state| state.strong_count() > 0);
			scopes.push(Arc::downgrade(scope.state()));
		}
		debug!(scope = id, "scope opened");
		Ok(scope)
	}

	/// Freezes the registry; called by every resolution entry point.
	pub(crate) fn seal(&self) -> DiResult<()> {
		match *self.inner.phase.read() {
			KernelPhase::Serving => return Ok(()),
			KernelPhase::Disposed => return Err(DiError::Disposed),
			KernelPhase::Configuring => {}
		}

		let mut phase = self.inner.phase.write();
		match *phase {
			KernelPhase::Configuring => {
				*phase = KernelPhase::Serving;
				info!(
					registrations = self.inner.registry.read().len(),
					"registry sealed"
				);
				Ok(())
			}
			KernelPhase::Serving => Ok(()),
			KernelPhase::Disposed => Err(DiError::Disposed),
		}
	}

	/// Whether `start` has neither completed nor is running right now.
	pub(crate) fn awaiting_start(&self) -> bool {
		self.inner
			.start
			.try_lock()
			.is_some_and(|state| !state.complete)
	}

	/// Builds eager singletons and fires start hooks.
	///
	/// Every eager singleton (including every singleton with a start hook) is
	/// constructed first; start hooks then run in registration order. Calling
	/// `start` again after it succeeded does nothing; after a failure it
	/// retries the singletons that have not started yet.
	pub fn start(&self) -> DiResult<()> {
		self.seal()?;
		let mut state = self.inner.start.lock();
		if state.complete {
			return Ok(());
		}

		let eager: Vec<Arc<Registration>> = self
			.inner
			.registry
			.read()
			.iter()
			.filter(|registration| registration.is_eager())
			.cloned()
			.collect();

		for registration in &eager {
			let mut ctx = self.creation_context(None);
			self.activate(registration, &mut ctx)?;
		}

		for registration in eager.iter().filter(|r| r.has_hook(HookPhase::Start)) {
			if state.started.contains(&registration.id()) {
				continue;
			}
			let Some(handle) = self.inner.singletons.get(registration.id()) else {
				continue;
			};
			lifecycle::invoke(registration, HookPhase::Start, &handle)?;
			state.started.insert(registration.id());
			if registration.has_hook(HookPhase::Stop) {
				self.inner.teardown.push(registration.clone(), handle)?;
			}
		}

		state.complete = true;
		info!(
			eager = eager.len(),
			started = state.started.len(),
			"kernel started"
		);
		Ok(())
	}

	/// Stops every singleton in reverse start order and disposes the kernel.
	///
	/// All stop hooks run even if some fail; failures are returned together.
	/// Disposing twice is a no-op. Open scopes are not closed.
	pub fn dispose(&self) -> Result<(), TeardownError> {
		{
			let mut phase = self.inner.phase.write();
			if *phase == KernelPhase::Disposed {
				return Ok(());
			}
			*phase = KernelPhase::Disposed;
		}

		let pending = self.inner.teardown.len();
		let result = self.inner.teardown.close();
		self.inner.singletons.clear();
		*self.inner.start.lock() = StartState::default();
		info!(stopped = pending, "kernel disposed");
		result
	}

	/// Tears singletons down and returns to `Configuring`.
	///
	/// Every open scope is invalidated first: its stop hooks run and its
	/// scoped instances are discarded, but the scope stays usable. Singleton
	/// stop hooks then run as in [`dispose`](Self::dispose) and singleton
	/// caches are discarded, so the next resolution rebuilds everything from
	/// the registry as it is then. Resolutions running concurrently with
	/// `reopen` may observe either state.
	pub fn reopen(&self) -> DiResult<()> {
		if self.phase() == KernelPhase::Disposed {
			return Err(DiError::Disposed);
		}

		let scopes: Vec<Arc<ScopeState>> = self
			.inner
			.scopes
			.lock()
			.iter()
			.filter_map(Weak::upgrade)
			.collect();
		let mut failures = Vec::new();
		for scope in &scopes {
			if let Err(err) = scope.invalidate() {
				failures.extend(err.into_failures());
			}
		}
		if let Err(err) = self.inner.teardown.unwind() {
			failures.extend(err.into_failures());
		}
		self.inner.singletons.clear();
		*self.inner.start.lock() = StartState::default();
		{
			let mut phase = self.inner.phase.write();
			if *phase == KernelPhase::Disposed {
				return Err(DiError::Disposed);
			}
			*phase = KernelPhase::Configuring;
		}
		info!(scopes = scopes.len(), "registry reopened");
		if failures.is_empty() {
			Ok(())
		} else {
			Err(TeardownError::new(failures).into())
		}
	}

	/// Static dependency graph of the current registrations.
	pub fn dependency_graph(&self) -> DependencyGraph {
		DependencyGraph::build(&self.inner.registry.read())
	}

	/// Checks the registrations without constructing anything.
	///
	/// # Errors
	///
	/// - `CircularDependency` for a cycle in the parameter tables.
	/// - `UnresolvedDependency` for a keyed override naming a key that is not
	///   registered for the parameter's type.
	/// - `InvalidRegistration` for a singleton depending on a scoped
	///   registration.
	pub fn validate(&self) -> DiResult<()> {
		let graph = self.dependency_graph();
		if let Some(cycle) = graph.find_cycle() {
			return Err(DiError::CircularDependency {
				service: cycle[0].name().to_string(),
				path: cycle
					.iter()
					.map(ServiceType::name)
					.collect::<Vec<_>>()
					.join(" -> "),
			});
		}

		let registry = self.inner.registry.read();
		for registration in registry.iter() {
			for parameter in registration.parameters() {
				let Some(OverrideSource::Keyed(key)) =
					registration.override_for(parameter.name()).map(|o| o.source())
				else {
					continue;
				};
				if registry
					.lookup_keyed(parameter.requested().id(), key)
					.is_none()
				{
					return Err(DiError::UnresolvedDependency {
						service: format!("{} with key '{key}'", parameter.requested()),
						parameter: Some(parameter.name().to_string()),
						owner: Some(registration.service().name().to_string()),
					});
				}
			}
		}

		if let Some(edge) = graph.captive_dependencies().first() {
			return Err(DiError::InvalidRegistration {
				service: graph.node(edge.from).service.name().to_string(),
				reason: format!(
					"singleton parameter '{}' depends on scoped {}",
					edge.parameter,
					graph.node(edge.to).service
				),
			});
		}
		Ok(())
	}

	/// Number of singletons currently built.
	pub fn singleton_count(&self) -> usize {
		self.inner.singletons.len()
	}
}

impl fmt::Debug for Kernel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Kernel")
			.field("phase", &self.phase())
			.field("registrations", &self.inner.registry.read().len())
			.field("sub_resolvers", &self.inner.sub_resolvers.read().len())
			.field("singletons", &self.singleton_count())
			.finish()
	}
}
