//! Request resolution.
//!
//! A request is answered by the registry first and by the sub-resolver chain
//! second. A matched registration is activated through its lifestyle; when it
//! has to be built, every declared parameter is resolved in table order
//! (explicit override, then a nested request) before the constructor or
//! factory runs and the on-create hook fires.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::context::{Arguments, CreationContext, FactoryContext};
use crate::error::{DiError, DiResult};
use crate::kernel::Kernel;
use crate::lifecycle::{self, HookPhase, TeardownStack};
use crate::registration::{Activator, Lifestyle, OverrideSource, Registration};
use crate::scope::ScopeState;
use crate::service::{ElementType, InstanceHandle};
use crate::sub_resolver::{DependencyRequest, Resolution};

impl Kernel {
	/// Entry point for top-level single-instance requests.
	pub(crate) fn resolve_root<S: ?Sized + Send + Sync + 'static>(
		&self,
		scope: Option<&Arc<ScopeState>>,
		request: &DependencyRequest<'_>,
	) -> DiResult<Arc<S>> {
		self.seal()?;
		let mut ctx = self.creation_context(scope);
		self.resolve_typed::<S>(request, &mut ctx)
	}

	/// Entry point for top-level "every implementation" requests.
	///
	/// Always answered from the registry, with an empty sequence when nothing
	/// is registered; the sub-resolver chain is not involved.
	pub(crate) fn resolve_all_root<T: ?Sized + Send + Sync + 'static>(
		&self,
		scope: Option<&Arc<ScopeState>>,
		element: ElementType,
	) -> DiResult<Vec<Arc<T>>> {
		self.seal()?;
		let mut ctx = self.creation_context(scope);
		let registrations = self.lookup_service(element.element());
		let sequence = self.collect(element, &registrations, &mut ctx)?;
		sequence
			.downcast::<Vec<Arc<T>>>()
			.map(Arc::unwrap_or_clone)
			.ok_or_else(|| DiError::TypeMismatch {
				expected: element.sequence().name().to_string(),
				found: sequence.service().name().to_string(),
			})
	}

	/// Maps "nothing answers for `S` itself" to `Ok(None)`.
	///
	/// Unresolved nested parameters still surface as errors.
	pub(crate) fn optional_root<S: ?Sized + 'static>(
		result: DiResult<Arc<S>>,
	) -> DiResult<Option<Arc<S>>> {
		match result {
			Ok(instance) => Ok(Some(instance)),
			Err(DiError::UnresolvedDependency {
				service,
				parameter: None,
				..
			}) if service == std::any::type_name::<S>() => Ok(None),
			Err(err) => Err(err),
		}
	}

	pub(crate) fn creation_context(&self, scope: Option<&Arc<ScopeState>>) -> CreationContext {
		CreationContext::new(
			self.key(),
			self.settings().max_resolution_depth,
			scope.cloned(),
		)
	}

	pub(crate) fn resolve_typed<S: ?Sized + Send + Sync + 'static>(
		&self,
		request: &DependencyRequest<'_>,
		ctx: &mut CreationContext,
	) -> DiResult<Arc<S>> {
		let handle = self
			.resolve_request(request, ctx)?
			.ok_or_else(|| request.unresolved())?;
		handle.downcast::<S>().ok_or_else(|| DiError::TypeMismatch {
			expected: std::any::type_name::<S>().to_string(),
			found: handle.service().name().to_string(),
		})
	}

	/// Registry first, then sub-resolvers in order. `Ok(None)` if nothing
	/// handled the request.
	pub(crate) fn resolve_request(
		&self,
		request: &DependencyRequest<'_>,
		ctx: &mut CreationContext,
	) -> DiResult<Option<InstanceHandle>> {
		let service = request.requested();
		let selected = match request.key() {
			Some(key) => self.registry().read().lookup_keyed(service.id(), key),
			None => self.registry().read().select(service.id()),
		};
		if let Some(registration) = selected {
			return self.activate(&registration, ctx).map(Some);
		}

		for resolver in self.sub_resolvers() {
			let mut resolution = Resolution::new(self, &mut *ctx);
			if let Some(handle) = resolver.try_resolve(request, &mut resolution)? {
				trace!(
					resolver = resolver.name(),
					service = service.name(),
					"resolved by sub-resolver"
				);
				return Ok(Some(handle));
			}
		}
		Ok(None)
	}

	pub(crate) fn collect(
		&self,
		element: ElementType,
		registrations: &[Arc<Registration>],
		ctx: &mut CreationContext,
	) -> DiResult<InstanceHandle> {
		let mut items = Vec::with_capacity(registrations.len());
		for registration in registrations {
			items.push(self.activate(registration, ctx)?);
		}
		element.collect(&items).ok_or_else(|| DiError::TypeMismatch {
			expected: element.element().name().to_string(),
			found: "an instance of another type".to_string(),
		})
	}

	fn resolve_arguments(
		&self,
		registration: &Registration,
		ctx: &mut CreationContext,
	) -> DiResult<Arguments> {
		let owner = registration.service();
		let mut args = Arguments::new(owner);

		for parameter in registration.parameters() {
			let request = DependencyRequest::for_parameter(parameter, owner);
			let value = match registration.override_for(parameter.name()).map(|o| o.source()) {
				Some(OverrideSource::Value(handle)) => Some(handle.clone()),
				Some(OverrideSource::Keyed(key)) => {
					self.resolve_request(&request.with_key(key), ctx)?
				}
				None => self.resolve_request(&request, ctx)?,
			};
			if value.is_none() && !parameter.is_optional() {
				return Err(request.unresolved());
			}
			args.insert(parameter.name(), value);
		}
		Ok(args)
	}

	/// Builds a new instance of `registration` and runs its creation hooks.
	///
	/// When `teardown` is given and the registration has a stop hook, the
	/// instance is pushed on it once it is live. If the owner was torn down
	/// in the meantime, the instance is stopped and the activation fails.
	pub(crate) fn instantiate(
		&self,
		registration: &Arc<Registration>,
		ctx: &mut CreationContext,
		teardown: Option<&TeardownStack>,
	) -> DiResult<InstanceHandle> {
		let service = registration.service();
		let erased = match registration.activator() {
			Activator::Constructor(construct) => {
				let args = self.resolve_arguments(registration, ctx)?;
				construct(&args)?
			}
			Activator::Factory(factory) => {
				let args = self.resolve_arguments(registration, ctx)?;
				let factory_ctx = FactoryContext::new(self, registration, args, ctx);
				factory(&factory_ctx).map_err(|source| match source.downcast::<DiError>() {
					Ok(err) => *err,
					Err(source) => DiError::Activation {
						service: service.name().to_string(),
						source,
					},
				})?
			}
			Activator::Instance(instance) => instance.clone(),
		};

		let handle = InstanceHandle::from_erased(erased, service).with_registration(registration);
		debug!(
			service = service.name(),
			implementation = registration.implementation(),
			lifestyle = %registration.lifestyle(),
			registration = %registration.id(),
			depth = ctx.depth(),
			"activated component"
		);

		lifecycle::invoke(registration, HookPhase::Create, &handle)?;
		if registration.lifestyle() != Lifestyle::Singleton {
			lifecycle::invoke(registration, HookPhase::Start, &handle)?;
		}
		if let Some(stack) = teardown {
			if registration.has_hook(HookPhase::Stop) {
				stack.push(registration.clone(), handle.clone())?;
			}
		}
		Ok(handle)
	}
}
