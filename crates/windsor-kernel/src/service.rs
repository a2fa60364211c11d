//! Service identity, implementation upcasting and type-erased instances.
//!
//! Services are keyed by [`TypeId`]. A service may be a concrete type or a
//! trait object such as `dyn Greeter`; instances are always handed out as
//! `Arc<S>`. Internally an instance of service `S` is stored as
//! `Arc<dyn Any + Send + Sync>` wrapping an `Arc<S>`, which keeps the pointer
//! identity of the original allocation across every downcast.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::registration::{Lifestyle, Registration, RegistrationId};

pub(crate) type ErasedInstance = Arc<dyn Any + Send + Sync>;

/// Runtime identity of a service type.
#[derive(Clone, Copy)]
pub struct ServiceType {
	id: TypeId,
	name: &'static str,
}

impl ServiceType {
	/// Identity of `T`.
	pub fn of<T: ?Sized + 'static>() -> Self {
		Self {
			id: TypeId::of::<T>(),
			name: std::any::type_name::<T>(),
		}
	}

	/// The underlying [`TypeId`].
	pub fn id(&self) -> TypeId {
		self.id
	}

	/// Fully qualified type name, used in errors and logs.
	pub fn name(&self) -> &'static str {
		self.name
	}
}

impl PartialEq for ServiceType {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for ServiceType {}

impl Hash for ServiceType {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl fmt::Debug for ServiceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

impl fmt::Display for ServiceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

/// Element type of a "sequence of T" request.
///
/// Carries the element identity, the identity of the sequence type
/// (`Vec<Arc<T>>`) and a function that assembles resolved elements into that
/// sequence.
#[derive(Clone, Copy)]
pub struct ElementType {
	element: ServiceType,
	sequence: ServiceType,
	collect: fn(&[InstanceHandle]) -> Option<ErasedInstance>,
}

impl ElementType {
	/// Element type `T`, sequence type `Vec<Arc<T>>`.
	pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
		Self {
			element: ServiceType::of::<T>(),
			sequence: ServiceType::of::<Vec<Arc<T>>>(),
			collect: collect_sequence::<T>,
		}
	}

	/// The element service type.
	pub fn element(&self) -> ServiceType {
		self.element
	}

	/// The sequence type handed to constructors.
	pub fn sequence(&self) -> ServiceType {
		self.sequence
	}

	/// Assembles resolved elements into a sequence instance.
	///
	/// Returns `None` if any element does not hold the element type.
	pub fn collect(&self, items: &[InstanceHandle]) -> Option<InstanceHandle> {
		let erased = (self.collect)(items)?;
		Some(InstanceHandle {
			instance: erased,
			service: self.sequence,
			registration: None,
			lifestyle: None,
		})
	}
}

impl fmt::Debug for ElementType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ElementType")
			.field("element", &self.element)
			.field("sequence", &self.sequence)
			.finish()
	}
}

fn collect_sequence<T: ?Sized + Send + Sync + 'static>(
	items: &[InstanceHandle],
) -> Option<ErasedInstance> {
	let items = items
		.iter()
		.map(InstanceHandle::downcast::<T>)
		.collect::<Option<Vec<Arc<T>>>>()?;
	Some(erase(Arc::new(items)))
}

pub(crate) fn erase<S: ?Sized + Send + Sync + 'static>(instance: Arc<S>) -> ErasedInstance {
	Arc::new(instance)
}

/// Declares that an implementation can be handed out as service `S`.
///
/// Every type implements itself. Trait-object services are declared with the
/// [`implements!`](crate::implements) macro:
///
/// ```
/// use std::sync::Arc;
/// use windsor_kernel::{implements, Implements};
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
///
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".to_string()
///     }
/// }
///
/// implements!(English => dyn Greeter);
///
/// let greeter: Arc<dyn Greeter> = Implements::<dyn Greeter>::upcast(Arc::new(English));
/// assert_eq!(greeter.greet(), "hello");
/// ```
pub trait Implements<S: ?Sized>: Send + Sync + 'static {
	/// Converts a shared implementation into a shared service.
	fn upcast(self: Arc<Self>) -> Arc<S>;
}

impl<T: Send + Sync + 'static> Implements<T> for T {
	fn upcast(self: Arc<Self>) -> Arc<T> {
		self
	}
}

/// Implements [`Implements`] for trait-object services.
///
/// `implements!(Imp => dyn A, dyn B)` lets `Imp` be registered for both
/// `dyn A` and `dyn B`.
#[macro_export]
macro_rules! implements {
	($implementation:ty => $($service:ty),+ $(,)?) => {
		$(
			impl $crate::Implements<$service> for $implementation {
				fn upcast(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$service> {
					self
				}
			}
		)+
	};
}

/// A resolved, type-erased instance.
///
/// Cloning a handle clones the inner `Arc`; the instance itself is shared.
#[derive(Clone)]
pub struct InstanceHandle {
	instance: ErasedInstance,
	service: ServiceType,
	registration: Option<RegistrationId>,
	lifestyle: Option<Lifestyle>,
}

impl InstanceHandle {
	/// Wraps an instance that does not come from a registration, e.g. one
	/// produced by a custom sub-resolver.
	pub fn new<S: ?Sized + Send + Sync + 'static>(instance: Arc<S>) -> Self {
		Self {
			instance: erase(instance),
			service: ServiceType::of::<S>(),
			registration: None,
			lifestyle: None,
		}
	}

	pub(crate) fn with_registration(mut self, registration: &Registration) -> Self {
		self.registration = Some(registration.id());
		self.lifestyle = Some(registration.lifestyle());
		self
	}

	pub(crate) fn from_erased(instance: ErasedInstance, service: ServiceType) -> Self {
		Self {
			instance,
			service,
			registration: None,
			lifestyle: None,
		}
	}

	/// Returns the instance as `Arc<S>`, or `None` if it holds another type.
	pub fn downcast<S: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<S>> {
		self.instance.downcast_ref::<Arc<S>>().cloned()
	}

	/// Service type the instance was resolved as.
	pub fn service(&self) -> ServiceType {
		self.service
	}

	/// Registration that produced the instance, if any.
	pub fn registration(&self) -> Option<RegistrationId> {
		self.registration
	}

	/// Lifestyle of the producing registration, if any.
	pub fn lifestyle(&self) -> Option<Lifestyle> {
		self.lifestyle
	}

	pub(crate) fn erased(&self) -> &ErasedInstance {
		&self.instance
	}

	/// Whether two handles share the same instance.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.instance, &other.instance)
	}
}

impl fmt::Debug for InstanceHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InstanceHandle")
			.field("service", &self.service)
			.field("registration", &self.registration)
			.field("lifestyle", &self.lifestyle)
			.finish_non_exhaustive()
	}
}
