//! Lifecycle hooks and teardown ordering.
//!
//! Hooks are plain closures over the service type, erased at registration so
//! the kernel can invoke them on type-erased instances. Instances that need a
//! stop call are pushed on a teardown stack owned by the kernel (singletons)
//! or by a scope (scoped instances) at the moment they become live; teardown
//! pops the stack so stop hooks run in reverse order.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{BoxError, DiError, DiResult, StopFailure, TeardownError};
use crate::registration::Registration;
use crate::service::{ErasedInstance, InstanceHandle};

/// Result returned by lifecycle hooks.
pub type HookResult = Result<(), BoxError>;

/// Lifecycle phase a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
	/// Right after construction.
	Create,
	/// When the instance is started.
	Start,
	/// When the owning scope or kernel tears down.
	Stop,
}

impl fmt::Display for HookPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Create => write!(f, "on-create"),
			Self::Start => write!(f, "start"),
			Self::Stop => write!(f, "stop"),
		}
	}
}

pub(crate) type ErasedHook = Arc<dyn Fn(&ErasedInstance) -> HookResult + Send + Sync>;

pub(crate) fn erase_hook<S, F>(hook: F) -> ErasedHook
where
	S: ?Sized + Send + Sync + 'static,
	F: Fn(&S) -> HookResult + Send + Sync + 'static,
{
	Arc::new(move |instance: &ErasedInstance| {
		match instance.downcast_ref::<Arc<S>>() {
			Some(service) => hook(&**service),
			None => Err(DiError::TypeMismatch {
				expected: std::any::type_name::<S>().to_string(),
				found: "another service type".to_string(),
			}
			.into()),
		}
	})
}

/// At most one hook per phase.
#[derive(Clone, Default)]
pub(crate) struct LifecycleHooks {
	pub(crate) create: Option<ErasedHook>,
	pub(crate) start: Option<ErasedHook>,
	pub(crate) stop: Option<ErasedHook>,
}

impl LifecycleHooks {
	pub(crate) fn get(&self, phase: HookPhase) -> Option<&ErasedHook> {
		match phase {
			HookPhase::Create => self.create.as_ref(),
			HookPhase::Start => self.start.as_ref(),
			HookPhase::Stop => self.stop.as_ref(),
		}
	}

	pub(crate) fn has(&self, phase: HookPhase) -> bool {
		self.get(phase).is_some()
	}
}

impl fmt::Debug for LifecycleHooks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LifecycleHooks")
			.field("create", &self.create.is_some())
			.field("start", &self.start.is_some())
			.field("stop", &self.stop.is_some())
			.finish()
	}
}

/// Runs the hook of `registration` for `phase`, if any.
pub(crate) fn invoke(
	registration: &Registration,
	phase: HookPhase,
	instance: &InstanceHandle,
) -> DiResult<()> {
	let Some(hook) = registration.hooks().get(phase) else {
		return Ok(());
	};
	debug!(
		service = registration.service().name(),
		registration = %registration.id(),
		%phase,
		"running lifecycle hook"
	);
	hook(instance.erased()).map_err(|source| DiError::HookExecution {
		service: registration.service().name().to_string(),
		phase,
		source,
	})
}

struct LiveInstance {
	registration: Arc<Registration>,
	instance: InstanceHandle,
}

#[derive(Default)]
struct Entries {
	live: Vec<LiveInstance>,
	closed: bool,
}

/// Instances awaiting their stop hook, most recent last.
///
/// Once closed, the stack accepts nothing: an instance that finishes
/// construction after its owner was torn down is stopped on the spot.
#[derive(Default)]
pub(crate) struct TeardownStack {
	entries: Mutex<Entries>,
	scope: Option<u64>,
}

impl TeardownStack {
	/// Stack owned by scope `id`.
	pub(crate) fn for_scope(id: u64) -> Self {
		Self {
			entries: Mutex::default(),
			scope: Some(id),
		}
	}

	/// Records a live instance.
	///
	/// # Errors
	///
	/// `ScopeClosed` or `Disposed` when the owner has been torn down; the
	/// instance's stop hook has already run by then.
	pub(crate) fn push(
		&self,
		registration: Arc<Registration>,
		instance: InstanceHandle,
	) -> DiResult<()> {
		{
			let mut entries = self.entries.lock();
			if !entries.closed {
				entries.live.push(LiveInstance {
					registration,
					instance,
				});
				return Ok(());
			}
		}

		let service = registration.service().name();
		warn!(service, "instance became live after teardown, stopping it");
		if let Err(err) = invoke(&registration, HookPhase::Stop, &instance) {
			warn!(service, error = %err, "stop hook failed");
		}
		Err(match self.scope {
			Some(id) => DiError::ScopeClosed(id),
			None => DiError::Disposed,
		})
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.lock().live.len()
	}

	/// Runs every stop hook in reverse push order.
	///
	/// A failing hook does not stop the ones after it; failures are returned
	/// together once the stack is empty.
	pub(crate) fn unwind(&self) -> Result<(), TeardownError> {
		let live = std::mem::take(&mut self.entries.lock().live);
		run_stop_hooks(live)
	}

	/// Like [`unwind`](Self::unwind), and refuses every later push.
	pub(crate) fn close(&self) -> Result<(), TeardownError> {
		let live = {
			let mut entries = self.entries.lock();
			entries.closed = true;
			std::mem::take(&mut entries.live)
		};
		run_stop_hooks(live)
	}
}

// Hooks may touch the kernel, so they run outside the lock.
fn run_stop_hooks(live: Vec<LiveInstance>) -> Result<(), TeardownError> {
	let mut failures = Vec::new();

	for entry in live.into_iter().rev() {
		let service = entry.registration.service().name();
		if let Err(err) = invoke(&entry.registration, HookPhase::Stop, &entry.instance) {
			warn!(service, error = %err, "stop hook failed");
			let source: BoxError = match err {
				DiError::HookExecution { source, .. } => source,
				other => Box::new(other),
			};
			failures.push(StopFailure {
				service: service.to_string(),
				source,
			});
		}
	}

	if failures.is_empty() {
		Ok(())
	} else {
		Err(TeardownError::new(failures))
	}
}
