//! Registration storage.
//!
//! The registry keeps every registration in registration order and indexes
//! them by service type. It never constructs anything; the kernel wraps it in
//! a lock and decides when it may change.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{DiError, DiResult};
use crate::registration::{ComponentRegistration, Registration, RegistrationId};
use crate::service::ServiceType;
use crate::settings::DuplicatePolicy;

/// Immutable registrations indexed by service type.
#[derive(Debug)]
pub struct Registry {
	registrations: Vec<Arc<Registration>>,
	by_service: HashMap<TypeId, Vec<RegistrationId>>,
	policy: DuplicatePolicy,
}

impl Default for Registry {
	fn default() -> Self {
		Self::new(DuplicatePolicy::default())
	}
}

impl Registry {
	/// Creates an empty registry.
	pub fn new(policy: DuplicatePolicy) -> Self {
		Self {
			registrations: Vec::new(),
			by_service: HashMap::new(),
			policy,
		}
	}

	/// Duplicate policy in effect.
	pub fn policy(&self) -> DuplicatePolicy {
		self.policy
	}

	/// Validates `component` and stores it.
	///
	/// # Errors
	///
	/// `DuplicateRegistration` for a second non-keyed registration under
	/// [`DuplicatePolicy::Reject`] or for a key already used by the service,
	/// plus every validation error of the builder.
	pub fn register<S: ?Sized + Send + Sync + 'static>(
		&mut self,
		component: ComponentRegistration<S>,
	) -> DiResult<RegistrationId> {
		let service = component.service();
		self.check_duplicate(service, component.key())?;

		let id = RegistrationId::new(self.registrations.len());
		let registration = component.build(id)?;
		debug!(
			service = service.name(),
			implementation = registration.implementation(),
			lifestyle = %registration.lifestyle(),
			key = registration.key(),
			registration = %id,
			"registered component"
		);

		self.by_service.entry(service.id()).or_default().push(id);
		self.registrations.push(Arc::new(registration));
		Ok(id)
	}

	fn check_duplicate(&self, service: ServiceType, key: Option<&str>) -> DiResult<()> {
		let existing = self.lookup(service.id());
		let clash = match key {
			Some(key) => existing.iter().any(|r| r.key() == Some(key)),
			None => {
				self.policy == DuplicatePolicy::Reject && existing.iter().any(|r| r.key().is_none())
			}
		};
		if clash {
			return Err(DiError::DuplicateRegistration {
				service: service.name().to_string(),
				key: key.map(str::to_string),
			});
		}
		Ok(())
	}

	/// Every registration for `service`, in registration order.
	pub fn lookup(&self, service: TypeId) -> Vec<Arc<Registration>> {
		self.by_service
			.get(&service)
			.map(|ids| {
				ids.iter()
					.map(|id| self.registrations[id.index()].clone())
					.collect()
			})
			.unwrap_or_default()
	}

	/// The registration for `service` carrying selection key `key`.
	pub fn lookup_keyed(&self, service: TypeId, key: &str) -> Option<Arc<Registration>> {
		self.lookup(service)
			.into_iter()
			.find(|r| r.key() == Some(key))
	}

	/// The registration a single, non-keyed request for `service` resolves to.
	///
	/// Non-keyed registrations are preferred over keyed ones. Among them the
	/// latest wins, unless the policy is [`DuplicatePolicy::FirstWins`].
	pub fn select(&self, service: TypeId) -> Option<Arc<Registration>> {
		let candidates = self.lookup(service);
		let (plain, keyed): (Vec<_>, Vec<_>) =
			candidates.into_iter().partition(|r| r.key().is_none());
		let pool = if plain.is_empty() { keyed } else { plain };
		match self.policy {
			DuplicatePolicy::FirstWins => pool.into_iter().next(),
			DuplicatePolicy::Reject | DuplicatePolicy::LastWins => pool.into_iter().next_back(),
		}
	}

	/// Registration by id.
	pub fn get(&self, id: RegistrationId) -> Option<Arc<Registration>> {
		self.registrations.get(id.index()).cloned()
	}

	/// Whether anything is registered for `service`.
	pub fn contains(&self, service: TypeId) -> bool {
		self.by_service.contains_key(&service)
	}

	/// All registrations, in registration order.
	pub fn iter(&self) -> impl Iterator<Item = &Arc<Registration>> {
		self.registrations.iter()
	}

	/// Number of registrations.
	pub fn len(&self) -> usize {
		self.registrations.len()
	}

	/// Whether the registry is empty.
	pub fn is_empty(&self) -> bool {
		self.registrations.is_empty()
	}
}
