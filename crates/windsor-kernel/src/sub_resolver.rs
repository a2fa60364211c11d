//! Fallback resolution strategies.
//!
//! When no registration matches a request, the kernel asks each
//! [`SubResolver`] in the order they were added. The first one returning
//! `Some` wins; `None` means "not handled" and moves on to the next.

use std::sync::Arc;

use tracing::trace;

use crate::context::CreationContext;
use crate::error::{DiError, DiResult};
use crate::kernel::Kernel;
use crate::registration::{Dependency, Registration};
use crate::service::{ElementType, InstanceHandle, ServiceType};

/// A single resolution request.
#[derive(Debug, Clone, Copy)]
pub struct DependencyRequest<'a> {
	service: ServiceType,
	element: Option<ElementType>,
	key: Option<&'a str>,
	parameter: Option<&'a str>,
	owner: Option<ServiceType>,
}

impl<'a> DependencyRequest<'a> {
	/// Request for one instance of `service`.
	pub fn service(service: ServiceType) -> Self {
		Self {
			service,
			element: None,
			key: None,
			parameter: None,
			owner: None,
		}
	}

	/// Request for every implementation of `element`.
	pub fn collection(element: ElementType) -> Self {
		Self {
			service: element.sequence(),
			element: Some(element),
			key: None,
			parameter: None,
			owner: None,
		}
	}

	/// Request made to satisfy a declared parameter of `owner`.
	pub fn for_parameter(dependency: &'a Dependency, owner: ServiceType) -> Self {
		Self {
			service: dependency.requested(),
			element: dependency.element(),
			key: None,
			parameter: Some(dependency.name()),
			owner: Some(owner),
		}
	}

	/// Restricts the request to the registration with selection key `key`.
	pub fn with_key(mut self, key: &'a str) -> Self {
		self.key = Some(key);
		self
	}

	/// Requested type; for collections, the sequence type.
	pub fn requested(&self) -> ServiceType {
		self.service
	}

	/// Element type of a collection request.
	pub fn element(&self) -> Option<ElementType> {
		self.element
	}

	/// Selection key.
	pub fn key(&self) -> Option<&'a str> {
		self.key
	}

	/// Parameter being satisfied.
	pub fn parameter(&self) -> Option<&'a str> {
		self.parameter
	}

	/// Service owning the parameter.
	pub fn owner(&self) -> Option<ServiceType> {
		self.owner
	}

	pub(crate) fn unresolved(&self) -> DiError {
		DiError::UnresolvedDependency {
			service: self.service.name().to_string(),
			parameter: self.parameter.map(str::to_string),
			owner: self.owner.map(|owner| owner.name().to_string()),
		}
	}
}

/// What a sub-resolver can do while handling a request.
pub struct Resolution<'a> {
	kernel: &'a Kernel,
	context: &'a mut CreationContext,
}

impl<'a> Resolution<'a> {
	pub(crate) fn new(kernel: &'a Kernel, context: &'a mut CreationContext) -> Self {
		Self { kernel, context }
	}

	/// The kernel handling the request.
	pub fn kernel(&self) -> &Kernel {
		self.kernel
	}

	/// Creation context of the running resolution.
	pub fn context(&self) -> &CreationContext {
		&*self.context
	}

	/// Registrations for `service`, in registration order.
	pub fn registrations(&self, service: ServiceType) -> Vec<Arc<Registration>> {
		self.kernel.lookup_service(service)
	}

	/// Activates `registration` honoring its lifestyle.
	pub fn activate(&mut self, registration: &Arc<Registration>) -> DiResult<InstanceHandle> {
		self.kernel.activate(registration, &mut *self.context)
	}

	/// Activates every registration in `registrations` and assembles the
	/// instances into a sequence of `element`.
	pub fn collect(
		&mut self,
		element: ElementType,
		registrations: &[Arc<Registration>],
	) -> DiResult<InstanceHandle> {
		self.kernel.collect(element, registrations, &mut *self.context)
	}

	/// Runs a nested request through the registry and the whole chain.
	pub fn resolve(&mut self, request: &DependencyRequest<'_>) -> DiResult<Option<InstanceHandle>> {
		self.kernel.resolve_request(request, &mut *self.context)
	}
}

/// A fallback strategy consulted when no registration matches.
pub trait SubResolver: Send + Sync {
	/// Short name used in logs.
	fn name(&self) -> &str;

	/// Handles `request`, or returns `Ok(None)` to pass it on.
	fn try_resolve(
		&self,
		request: &DependencyRequest<'_>,
		resolution: &mut Resolution<'_>,
	) -> DiResult<Option<InstanceHandle>>;
}

/// Answers "sequence of T" requests with every registration of `T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionResolver {
	allow_empty: bool,
}

impl CollectionResolver {
	/// `allow_empty`: answer with an empty sequence when nothing is registered
	/// for the element type instead of passing the request on.
	pub fn new(allow_empty: bool) -> Self {
		Self { allow_empty }
	}

	/// Whether empty sequences are returned.
	pub fn allows_empty(&self) -> bool {
		self.allow_empty
	}
}

impl Default for CollectionResolver {
	fn default() -> Self {
		Self::new(true)
	}
}

impl SubResolver for CollectionResolver {
	fn name(&self) -> &str {
		"collection"
	}

	fn try_resolve(
		&self,
		request: &DependencyRequest<'_>,
		resolution: &mut Resolution<'_>,
	) -> DiResult<Option<InstanceHandle>> {
		let Some(element) = request.element() else {
			return Ok(None);
		};

		let registrations = resolution.registrations(element.element());
		if registrations.is_empty() && !self.allow_empty {
			return Ok(None);
		}
		trace!(
			element = element.element().name(),
			count = registrations.len(),
			"resolving collection"
		);

		resolution.collect(element, &registrations).map(Some)
	}
}
