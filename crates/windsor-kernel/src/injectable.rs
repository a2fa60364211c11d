//! Constructor-injected components.
//!
//! An [`Injectable`] type declares its constructor parameters as a table of
//! [`Dependency`] descriptors and builds itself from the resolved
//! [`Arguments`]. The table is what dependency overrides are checked against
//! at registration time.

use crate::context::Arguments;
use crate::error::DiResult;
use crate::registration::Dependency;

/// A type the kernel can construct from its declared dependencies.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use windsor_kernel::{Arguments, Dependency, DiResult, Injectable};
///
/// struct Clock;
///
/// impl Injectable for Clock {
///     fn construct(_: &Arguments) -> DiResult<Self> {
///         Ok(Clock)
///     }
/// }
///
/// struct Scheduler {
///     clock: Arc<Clock>,
///     threshold: u32,
/// }
///
/// impl Injectable for Scheduler {
///     fn dependencies() -> Vec<Dependency> {
///         vec![
///             Dependency::service::<Clock>("clock"),
///             Dependency::service::<u32>("threshold"),
///         ]
///     }
///
///     fn construct(args: &Arguments) -> DiResult<Self> {
///         Ok(Scheduler {
///             clock: args.get("clock")?,
///             threshold: args.value("threshold")?,
///         })
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
	/// Constructor parameter table, in declaration order.
	fn dependencies() -> Vec<Dependency> {
		Vec::new()
	}

	/// Builds the instance from resolved arguments.
	fn construct(args: &Arguments) -> DiResult<Self>;
}
