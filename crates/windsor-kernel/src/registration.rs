//! Registrations and the component registration builder.
//!
//! A [`ComponentRegistration`] collects the options for one component and is
//! turned into an immutable [`Registration`] when it is handed to the kernel.
//! All checks that can be made without resolving anything happen at that
//! point: overrides must name a declared parameter and carry a value of the
//! parameter's type, and lifestyle-dependent options must be compatible.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::{Arguments, FactoryContext};
use crate::error::{BoxError, DiError, DiResult};
use crate::injectable::Injectable;
use crate::lifecycle::{HookPhase, HookResult, LifecycleHooks, erase_hook};
use crate::service::{ElementType, ErasedInstance, Implements, InstanceHandle, ServiceType, erase};

/// Instance reuse policy of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifestyle {
	/// One instance per kernel, created on first use.
	#[default]
	Singleton,
	/// A new instance for every resolution.
	Transient,
	/// One instance per [`Scope`](crate::Scope).
	Scoped,
}

impl fmt::Display for Lifestyle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Singleton => write!(f, "singleton"),
			Self::Transient => write!(f, "transient"),
			Self::Scoped => write!(f, "scoped"),
		}
	}
}

/// Identifier assigned to a registration, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId(usize);

impl RegistrationId {
	pub(crate) fn new(index: usize) -> Self {
		Self(index)
	}

	/// Zero-based registration order.
	pub fn index(&self) -> usize {
		self.0
	}
}

impl fmt::Display for RegistrationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// What a declared parameter asks for.
#[derive(Debug, Clone, Copy)]
pub enum DependencyKind {
	/// A single service.
	Service(ServiceType),
	/// Every registered implementation of an element type, as `Vec<Arc<T>>`.
	Collection(ElementType),
}

/// One entry of a parameter table.
#[derive(Debug, Clone)]
pub struct Dependency {
	name: &'static str,
	kind: DependencyKind,
	optional: bool,
}

impl Dependency {
	/// Parameter `name` of service type `T`.
	///
	/// Plain values such as `u32` thresholds are services too: they are
	/// satisfied by a registration, a sub-resolver, or an override.
	pub fn service<T: ?Sized + Send + Sync + 'static>(name: &'static str) -> Self {
		Self {
			name,
			kind: DependencyKind::Service(ServiceType::of::<T>()),
			optional: false,
		}
	}

	/// Parameter `name` receiving every implementation of `T` as `Vec<Arc<T>>`.
	pub fn collection<T: ?Sized + Send + Sync + 'static>(name: &'static str) -> Self {
		Self {
			name,
			kind: DependencyKind::Collection(ElementType::of::<T>()),
			optional: false,
		}
	}

	/// Marks the parameter optional: it resolves to `None` instead of failing.
	pub fn optional(mut self) -> Self {
		self.optional = true;
		self
	}

	/// Parameter name.
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Parameter kind.
	pub fn kind(&self) -> DependencyKind {
		self.kind
	}

	/// Whether the parameter may stay unresolved.
	pub fn is_optional(&self) -> bool {
		self.optional
	}

	/// Type handed to the constructor for this parameter.
	pub fn requested(&self) -> ServiceType {
		match self.kind {
			DependencyKind::Service(service) => service,
			DependencyKind::Collection(element) => element.sequence(),
		}
	}

	/// Element type for collection parameters.
	pub fn element(&self) -> Option<ElementType> {
		match self.kind {
			DependencyKind::Service(_) => None,
			DependencyKind::Collection(element) => Some(element),
		}
	}
}

/// Explicit value or service reference for a named parameter.
#[derive(Clone)]
pub struct DependencyOverride {
	source: OverrideSource,
}

#[derive(Clone)]
pub(crate) enum OverrideSource {
	Value(InstanceHandle),
	Keyed(String),
}

impl DependencyOverride {
	/// A fixed value, e.g. `DependencyOverride::value(5_u32)`.
	pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
		Self::shared(Arc::new(value))
	}

	/// A fixed shared instance; also works for trait objects.
	pub fn shared<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
		Self {
			source: OverrideSource::Value(InstanceHandle::new(value)),
		}
	}

	/// The registration of the parameter's type with selection key `key`.
	pub fn keyed(key: impl Into<String>) -> Self {
		Self {
			source: OverrideSource::Keyed(key.into()),
		}
	}

	pub(crate) fn source(&self) -> &OverrideSource {
		&self.source
	}
}

impl fmt::Debug for DependencyOverride {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.source {
			OverrideSource::Value(handle) => f
				.debug_tuple("DependencyOverride::Value")
				.field(&handle.service())
				.finish(),
			OverrideSource::Keyed(key) => {
				f.debug_tuple("DependencyOverride::Keyed").field(key).finish()
			}
		}
	}
}

pub(crate) type ConstructFn = Arc<dyn Fn(&Arguments) -> DiResult<ErasedInstance> + Send + Sync>;
pub(crate) type FactoryFn =
	Arc<dyn Fn(&FactoryContext<'_>) -> Result<ErasedInstance, BoxError> + Send + Sync>;

/// How a registration produces its instance.
#[derive(Clone)]
pub(crate) enum Activator {
	Constructor(ConstructFn),
	Factory(FactoryFn),
	Instance(ErasedInstance),
}

impl Activator {
	fn kind(&self) -> &'static str {
		match self {
			Self::Constructor(_) => "constructor",
			Self::Factory(_) => "factory",
			Self::Instance(_) => "instance",
		}
	}
}

/// An immutable component registration.
pub struct Registration {
	id: RegistrationId,
	service: ServiceType,
	implementation: &'static str,
	key: Option<String>,
	lifestyle: Lifestyle,
	eager: bool,
	parameters: Vec<Dependency>,
	overrides: Vec<(String, DependencyOverride)>,
	activator: Activator,
	hooks: LifecycleHooks,
}

impl Registration {
	/// Registration id.
	pub fn id(&self) -> RegistrationId {
		self.id
	}

	/// Service type the registration answers for.
	pub fn service(&self) -> ServiceType {
		self.service
	}

	/// Implementation type name.
	pub fn implementation(&self) -> &'static str {
		self.implementation
	}

	/// Selection key.
	pub fn key(&self) -> Option<&str> {
		self.key.as_deref()
	}

	/// Lifestyle.
	pub fn lifestyle(&self) -> Lifestyle {
		self.lifestyle
	}

	/// Whether the instance is built by `Kernel::start`.
	///
	/// Singletons with a start hook are always eager.
	pub fn is_eager(&self) -> bool {
		self.lifestyle == Lifestyle::Singleton && (self.eager || self.hooks.has(HookPhase::Start))
	}

	/// Declared parameters.
	pub fn parameters(&self) -> &[Dependency] {
		&self.parameters
	}

	/// Names of overridden parameters, in the order they were given.
	pub fn overridden_parameters(&self) -> impl Iterator<Item = &str> {
		self.overrides.iter().map(|(name, _)| name.as_str())
	}

	/// Whether a hook is attached for `phase`.
	pub fn has_hook(&self, phase: HookPhase) -> bool {
		self.hooks.has(phase)
	}

	pub(crate) fn override_for(&self, parameter: &str) -> Option<&DependencyOverride> {
		self.overrides
			.iter()
			.find(|(name, _)| name == parameter)
			.map(|(_, value)| value)
	}

	pub(crate) fn activator(&self) -> &Activator {
		&self.activator
	}

	pub(crate) fn hooks(&self) -> &LifecycleHooks {
		&self.hooks
	}
}

impl fmt::Debug for Registration {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registration")
			.field("id", &self.id)
			.field("service", &self.service)
			.field("implementation", &self.implementation)
			.field("key", &self.key)
			.field("lifestyle", &self.lifestyle)
			.field("activator", &self.activator.kind())
			.field("parameters", &self.parameters)
			.field("overrides", &self.overrides)
			.field("hooks", &self.hooks)
			.finish()
	}
}

/// Builder for a registration of service `S`.
///
/// Defaults: singleton lifestyle, no key, no overrides, no hooks.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use windsor_kernel::{Arguments, ComponentRegistration, DiResult, Injectable, Kernel};
///
/// struct Counter;
///
/// impl Injectable for Counter {
///     fn construct(_: &Arguments) -> DiResult<Self> {
///         Ok(Counter)
///     }
/// }
///
/// let kernel = Kernel::new();
/// kernel
///     .register(ComponentRegistration::<Counter>::new().transient())
///     .unwrap();
/// let a = kernel.resolve::<Counter>().unwrap();
/// let b = kernel.resolve::<Counter>().unwrap();
/// assert!(!Arc::ptr_eq(&a, &b));
/// ```
pub struct ComponentRegistration<S: ?Sized> {
	implementation: &'static str,
	parameters: Vec<Dependency>,
	activator: Activator,
	key: Option<String>,
	lifestyle: Lifestyle,
	eager: bool,
	overrides: Vec<(String, DependencyOverride)>,
	hooks: LifecycleHooks,
	_service: PhantomData<fn() -> Arc<S>>,
}

impl<S: Injectable> ComponentRegistration<S> {
	/// Registers `S` as its own implementation.
	pub fn new() -> Self {
		Self::implemented_by::<S>()
	}
}

impl<S: Injectable> Default for ComponentRegistration<S> {
	fn default() -> Self {
		Self::new()
	}
}

impl<S: ?Sized + Send + Sync + 'static> ComponentRegistration<S> {
	/// Registers implementation `I` for service `S`.
	pub fn implemented_by<I>() -> Self
	where
		I: Injectable + Implements<S>,
	{
		let construct: ConstructFn = Arc::new(|args: &Arguments| {
			let implementation = I::construct(args)?;
			Ok(erase(<I as Implements<S>>::upcast(Arc::new(implementation))))
		});
		Self::with_activator(
			std::any::type_name::<I>(),
			I::dependencies(),
			Activator::Constructor(construct),
		)
	}

	/// Registers a factory closure for `S`.
	///
	/// The factory receives a [`FactoryContext`] with the kernel, this
	/// registration, the creation context and any parameters declared with
	/// [`parameters`](Self::parameters). Returning an `Arc` that is already
	/// held elsewhere keeps its identity.
	pub fn factory<F>(factory: F) -> Self
	where
		F: Fn(&FactoryContext<'_>) -> Result<Arc<S>, BoxError> + Send + Sync + 'static,
	{
		let factory: FactoryFn = Arc::new(move |ctx: &FactoryContext<'_>| factory(ctx).map(erase));
		Self::with_activator(std::any::type_name::<S>(), Vec::new(), Activator::Factory(factory))
	}

	/// Registers a pre-built instance. Instances are always singletons.
	pub fn instance(instance: Arc<S>) -> Self {
		Self::with_activator(
			std::any::type_name::<S>(),
			Vec::new(),
			Activator::Instance(erase(instance)),
		)
	}

	fn with_activator(
		implementation: &'static str,
		parameters: Vec<Dependency>,
		activator: Activator,
	) -> Self {
		Self {
			implementation,
			parameters,
			activator,
			key: None,
			lifestyle: Lifestyle::default(),
			eager: false,
			overrides: Vec::new(),
			hooks: LifecycleHooks::default(),
			_service: PhantomData,
		}
	}

	/// Sets the selection key.
	pub fn named(mut self, key: impl Into<String>) -> Self {
		self.key = Some(key.into());
		self
	}

	/// Sets the lifestyle.
	pub fn lifestyle(mut self, lifestyle: Lifestyle) -> Self {
		self.lifestyle = lifestyle;
		self
	}

	/// Singleton lifestyle (the default).
	pub fn singleton(self) -> Self {
		self.lifestyle(Lifestyle::Singleton)
	}

	/// Transient lifestyle.
	pub fn transient(self) -> Self {
		self.lifestyle(Lifestyle::Transient)
	}

	/// Scoped lifestyle.
	pub fn scoped(self) -> Self {
		self.lifestyle(Lifestyle::Scoped)
	}

	/// Builds the singleton during `Kernel::start` instead of on first use.
	pub fn eager(mut self) -> Self {
		self.eager = true;
		self
	}

	/// Declares the parameter table of a factory registration.
	///
	/// Constructor registrations take their table from
	/// [`Injectable::dependencies`]; calling this replaces it.
	pub fn parameters(mut self, parameters: Vec<Dependency>) -> Self {
		self.parameters = parameters;
		self
	}

	/// Overrides the named parameter. A later override of the same name
	/// replaces the earlier one.
	pub fn depends_on(mut self, parameter: impl Into<String>, value: DependencyOverride) -> Self {
		let parameter = parameter.into();
		self.overrides.retain(|(name, _)| *name != parameter);
		self.overrides.push((parameter, value));
		self
	}

	/// Runs `hook` right after construction, before the instance is cached or
	/// returned.
	pub fn on_create<F>(mut self, hook: F) -> Self
	where
		F: Fn(&S) -> HookResult + Send + Sync + 'static,
	{
		self.hooks.create = Some(erase_hook::<S, F>(hook));
		self
	}

	/// Runs `hook` when the instance is started.
	///
	/// Scoped and transient instances start right after construction. A
	/// singleton with a start hook is eager: [`Kernel::start`](crate::Kernel::start)
	/// builds and starts it. Resolving it before `start` hands out an instance
	/// that has not started yet; it starts, and later stops, once the kernel
	/// does.
	pub fn on_start<F>(mut self, hook: F) -> Self
	where
		F: Fn(&S) -> HookResult + Send + Sync + 'static,
	{
		self.hooks.start = Some(erase_hook::<S, F>(hook));
		self
	}

	/// Runs `hook` when the owning scope or kernel tears the instance down.
	pub fn on_stop<F>(mut self, hook: F) -> Self
	where
		F: Fn(&S) -> HookResult + Send + Sync + 'static,
	{
		self.hooks.stop = Some(erase_hook::<S, F>(hook));
		self
	}

	/// Service type of the registration being built.
	pub fn service(&self) -> ServiceType {
		ServiceType::of::<S>()
	}

	/// Selection key of the registration being built.
	pub fn key(&self) -> Option<&str> {
		self.key.as_deref()
	}

	/// Validates the options and freezes them into a [`Registration`].
	pub(crate) fn build(self, id: RegistrationId) -> DiResult<Registration> {
		let service = ServiceType::of::<S>();
		let invalid = |reason: &str| DiError::InvalidRegistration {
			service: service.name().to_string(),
			reason: reason.to_string(),
		};

		let mut seen = HashSet::new();
		for parameter in &self.parameters {
			if !seen.insert(parameter.name()) {
				return Err(invalid(&format!(
					"parameter '{}' is declared twice",
					parameter.name()
				)));
			}
		}

		for (name, value) in &self.overrides {
			validate_override(service, &self.parameters, name, value)?;
		}

		if matches!(self.activator, Activator::Instance(_)) && self.lifestyle != Lifestyle::Singleton {
			return Err(invalid("pre-built instances must be singletons"));
		}
		if self.eager && self.lifestyle != Lifestyle::Singleton {
			return Err(invalid("only singletons can be eager"));
		}
		if self.lifestyle == Lifestyle::Transient && self.hooks.has(HookPhase::Stop) {
			return Err(invalid(
				"transient instances are not tracked, so a stop hook would never run",
			));
		}

		Ok(Registration {
			id,
			service,
			implementation: self.implementation,
			key: self.key,
			lifestyle: self.lifestyle,
			eager: self.eager,
			parameters: self.parameters,
			overrides: self.overrides,
			activator: self.activator,
			hooks: self.hooks,
		})
	}
}

fn validate_override(
	service: ServiceType,
	parameters: &[Dependency],
	name: &str,
	value: &DependencyOverride,
) -> DiResult<()> {
	let invalid = |reason: String| DiError::InvalidOverride {
		service: service.name().to_string(),
		parameter: name.to_string(),
		reason,
	};

	let Some(parameter) = parameters.iter().find(|p| p.name() == name) else {
		return Err(invalid("no parameter with this name".to_string()));
	};

	match value.source() {
		OverrideSource::Value(handle) if handle.service() != parameter.requested() => {
			Err(invalid(format!(
				"expected a value of type {}, got {}",
				parameter.requested(),
				handle.service()
			)))
		}
		OverrideSource::Keyed(_) if parameter.element().is_some() => Err(invalid(
			"collection parameters cannot reference a keyed registration".to_string(),
		)),
		_ => Ok(()),
	}
}
