//! Instance reuse per lifestyle.
//!
//! Singletons and scoped instances live in an [`InstanceCache`]: one slot per
//! registration, each behind its own mutex. The mutex covers the whole
//! check, construct and populate sequence, so concurrent first use builds the
//! instance at most once while other registrations stay unblocked.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{trace, warn};

use crate::context::CreationContext;
use crate::error::{DiError, DiResult};
use crate::kernel::Kernel;
use crate::lifecycle::HookPhase;
use crate::registration::{Lifestyle, Registration, RegistrationId};
use crate::service::InstanceHandle;

pub(crate) type Slot = Arc<Mutex<Option<InstanceHandle>>>;

/// Per-registration instance slots.
#[derive(Default)]
pub(crate) struct InstanceCache {
	slots: RwLock<HashMap<RegistrationId, Slot>>,
}

impl InstanceCache {
	pub(crate) fn slot(&self, id: RegistrationId) -> Slot {
		if let Some(slot) = self.slots.read().get(&id) {
			return slot.clone();
		}
		self.slots.write().entry(id).or_default().clone()
	}

	/// Cached instance, without waiting on a slot that is being populated.
	pub(crate) fn cached(&self, id: RegistrationId) -> Option<InstanceHandle> {
		let slot = self.slots.read().get(&id).cloned()?;
		let guard = slot.try_lock()?;
		guard.as_ref().cloned()
	}

	/// Cached instance, waiting for an in-flight construction to finish.
	pub(crate) fn get(&self, id: RegistrationId) -> Option<InstanceHandle> {
		let slot = self.slots.read().get(&id).cloned()?;
		let guard = slot.lock();
		guard.as_ref().cloned()
	}

	/// Number of populated slots. Slots under construction are not counted.
	pub(crate) fn len(&self) -> usize {
		let slots: Vec<Slot> = self.slots.read().values().cloned().collect();
		slots
			.iter()
			.filter(|slot| slot.try_lock().is_some_and(|guard| guard.is_some()))
			.count()
	}

	pub(crate) fn clear(&self) {
		self.slots.write().clear();
	}
}

/// Returns the slot's instance, building it with `create` if it is empty.
///
/// A failed `create` leaves the slot empty.
pub(crate) fn get_or_create(
	slot: &Slot,
	create: impl FnOnce() -> DiResult<InstanceHandle>,
) -> DiResult<InstanceHandle> {
	let mut guard = slot.lock();
	if let Some(existing) = guard.as_ref() {
		return Ok(existing.clone());
	}
	let instance = create()?;
	*guard = Some(instance.clone());
	Ok(instance)
}

impl Kernel {
	/// Produces an instance of `registration` according to its lifestyle.
	pub(crate) fn activate(
		&self,
		registration: &Arc<Registration>,
		ctx: &mut CreationContext,
	) -> DiResult<InstanceHandle> {
		let service = registration.service();
		let id = registration.id();

		match registration.lifestyle() {
			Lifestyle::Transient => {
				ctx.track(service, |ctx| self.instantiate(registration, ctx, None))
			}
			Lifestyle::Singleton => {
				let cache = self.singletons();
				if let Some(hit) = cache.cached(id) {
					trace!(service = service.name(), registration = %id, "singleton cache hit");
					return Ok(hit);
				}
				// Started singletons are pushed on the teardown stack by `start`.
				let teardown = (!registration.has_hook(HookPhase::Start)).then(|| self.teardown());
				let slot = cache.slot(id);
				ctx.track(service, |ctx| {
					ctx.detached(|ctx| {
						get_or_create(&slot, || {
							let handle = self.instantiate(registration, ctx, teardown)?;
							if registration.has_hook(HookPhase::Start) && self.awaiting_start() {
								warn!(
									service = service.name(),
									registration = %id,
									"singleton with a start hook resolved before Kernel::start"
								);
							}
							Ok(handle)
						})
					})
				})
			}
			Lifestyle::Scoped => {
				let Some(scope) = ctx.scope().cloned() else {
					return Err(DiError::ScopeRequired(service.name().to_string()));
				};
				if scope.is_closed() {
					return Err(DiError::ScopeClosed(scope.id()));
				}
				if let Some(hit) = scope.cache().cached(id) {
					trace!(
						service = service.name(),
						registration = %id,
						scope = scope.id(),
						"scoped cache hit"
					);
					return Ok(hit);
				}
				let slot = scope.cache().slot(id);
				ctx.track(service, |ctx| {
					get_or_create(&slot, || {
						self.instantiate(registration, ctx, Some(scope.teardown()))
					})
				})
			}
		}
	}
}
