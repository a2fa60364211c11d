//! Lifestyle and scope tests
//!
//! These tests verify:
//! 1. Singletons are built once per kernel, even under concurrent first use
//! 2. Transients are built on every request
//! 3. Scoped instances are shared within a scope and isolated across scopes
//! 4. Scoped registrations cannot be resolved without a scope or captured by
//!    singletons

use futures::future::join_all;
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use windsor_kernel::{
	Arguments, ComponentRegistration, Dependency, DiError, DiResult, Injectable, Kernel,
};

// Counts how many times it was constructed
struct Tracked {
	serial: usize,
}

static TRACKED_BUILDS: AtomicUsize = AtomicUsize::new(0);

impl Injectable for Tracked {
	fn construct(_: &Arguments) -> DiResult<Self> {
		Ok(Tracked {
			serial: TRACKED_BUILDS.fetch_add(1, Ordering::SeqCst),
		})
	}
}

// Scoped unit of work
struct Session;

impl Injectable for Session {
	fn construct(_: &Arguments) -> DiResult<Self> {
		Ok(Session)
	}
}

// Transient consumer of the scoped session
struct Handler {
	session: Arc<Session>,
}

impl Injectable for Handler {
	fn dependencies() -> Vec<Dependency> {
		vec![Dependency::service::<Session>("session")]
	}

	fn construct(args: &Arguments) -> DiResult<Self> {
		Ok(Handler {
			session: args.get("session")?,
		})
	}
}

// Singleton that would capture the scoped session
struct SessionCache {
	_session: Arc<Session>,
}

impl Injectable for SessionCache {
	fn dependencies() -> Vec<Dependency> {
		vec![Dependency::service::<Session>("session")]
	}

	fn construct(args: &Arguments) -> DiResult<Self> {
		Ok(SessionCache {
			_session: args.get("session")?,
		})
	}
}

fn counting_kernel(builds: Arc<AtomicUsize>) -> Kernel {
	let kernel = Kernel::new();
	kernel
		.register(ComponentRegistration::<String>::factory(move |_| {
			builds.fetch_add(1, Ordering::SeqCst);
			std::thread::sleep(std::time::Duration::from_millis(5));
			Ok(Arc::new("shared".to_string()))
		}))
		.unwrap();
	kernel
}

// ========================================================================
// Singleton and transient
// ========================================================================

#[rstest]
fn test_singleton_is_built_once() {
	// Arrange
	let kernel = Kernel::new();
	kernel.register(ComponentRegistration::<Tracked>::new()).unwrap();

	// Act
	let a = kernel.resolve::<Tracked>().unwrap();
	let b = kernel.resolve::<Tracked>().unwrap();

	// Assert
	assert!(Arc::ptr_eq(&a, &b));
	assert_eq!(a.serial, b.serial);
	assert_eq!(kernel.singleton_count(), 1);
}

#[rstest]
fn test_transient_is_built_per_request() {
	let kernel = Kernel::new();
	kernel
		.register(ComponentRegistration::<Session>::new().transient())
		.unwrap();

	let a = kernel.resolve::<Session>().unwrap();
	let b = kernel.resolve::<Session>().unwrap();

	assert!(!Arc::ptr_eq(&a, &b));
	assert_eq!(kernel.singleton_count(), 0);
}

#[rstest]
fn test_singleton_first_use_across_threads_builds_once() {
	// Arrange
	let builds = Arc::new(AtomicUsize::new(0));
	let kernel = counting_kernel(builds.clone());

	// Act
	let resolved: Vec<Arc<String>> = std::thread::scope(|s| {
		let handles: Vec<_> = (0..8)
			.map(|_| s.spawn(|| kernel.resolve::<String>().unwrap()))
			.collect();
		handles.into_iter().map(|h| h.join().unwrap()).collect()
	});

	// Assert
	assert_eq!(builds.load(Ordering::SeqCst), 1);
	assert!(resolved.iter().all(|s| Arc::ptr_eq(s, &resolved[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_singleton_first_use_from_blocking_tasks_builds_once() {
	// Arrange
	let builds = Arc::new(AtomicUsize::new(0));
	let kernel = counting_kernel(builds.clone());

	// Act
	let tasks = (0..16).map(|_| {
		let kernel = kernel.clone();
		tokio::task::spawn_blocking(move || kernel.resolve::<String>())
	});
	let results = join_all(tasks).await;

	// Assert
	let instances: Vec<Arc<String>> = results
		.into_iter()
		.map(|joined| joined.unwrap().unwrap())
		.collect();
	assert_eq!(builds.load(Ordering::SeqCst), 1);
	assert!(instances.iter().all(|s| Arc::ptr_eq(s, &instances[0])));
}

// ========================================================================
// Scoped
// ========================================================================

#[rstest]
fn test_scoped_instance_shared_within_scope() {
	// Arrange
	let kernel = Kernel::new();
	kernel
		.register(ComponentRegistration::<Session>::new().scoped())
		.unwrap();
	kernel
		.register(ComponentRegistration::<Handler>::new().transient())
		.unwrap();
	let scope = kernel.begin_scope().unwrap();

	// Act
	let first = scope.resolve::<Handler>().unwrap();
	let second = scope.resolve::<Handler>().unwrap();

	// Assert
	assert!(!Arc::ptr_eq(&first, &second));
	assert!(Arc::ptr_eq(&first.session, &second.session));
	assert_eq!(scope.instance_count(), 1);
	scope.close().unwrap();
}

#[rstest]
fn test_scoped_instances_isolated_across_scopes() {
	let kernel = Kernel::new();
	kernel
		.register(ComponentRegistration::<Session>::new().scoped())
		.unwrap();
	let a = kernel.begin_scope().unwrap();
	let b = kernel.begin_scope().unwrap();

	let from_a = a.resolve::<Session>().unwrap();
	let from_b = b.resolve::<Session>().unwrap();

	assert!(!Arc::ptr_eq(&from_a, &from_b));
}

#[rstest]
fn test_scoped_without_scope_is_rejected() {
	let kernel = Kernel::new();
	kernel
		.register(ComponentRegistration::<Session>::new().scoped())
		.unwrap();

	let result = kernel.resolve::<Session>();

	assert!(matches!(result, Err(DiError::ScopeRequired(_))));
}

#[rstest]
fn test_singleton_cannot_capture_scoped_dependency() {
	// Arrange
	let kernel = Kernel::new();
	kernel
		.register(ComponentRegistration::<Session>::new().scoped())
		.unwrap();
	kernel
		.register(ComponentRegistration::<SessionCache>::new())
		.unwrap();
	let scope = kernel.begin_scope().unwrap();

	// Act
	let result = scope.resolve::<SessionCache>();

	// Assert
	assert!(matches!(result, Err(DiError::ScopeRequired(_))));
	assert_eq!(scope.instance_count(), 0);
}

#[rstest]
fn test_closed_scope_rejects_scoped_resolution() {
	// Arrange
	let kernel = Kernel::new();
	kernel
		.register(ComponentRegistration::<Session>::new().scoped())
		.unwrap();
	let scope = kernel.begin_scope().unwrap();
	scope.resolve::<Session>().unwrap();

	// Act
	scope.close().unwrap();
	let result = scope.resolve::<Session>();

	// Assert
	assert!(scope.is_closed());
	assert_eq!(scope.instance_count(), 0);
	assert!(matches!(result, Err(DiError::ScopeClosed(id)) if id == scope.id()));
}

#[rstest]
fn test_scope_resolves_singletons_from_kernel() {
	let kernel = Kernel::new();
	kernel.register(ComponentRegistration::<Tracked>::new()).unwrap();
	let scope = kernel.begin_scope().unwrap();

	let through_scope = scope.resolve::<Tracked>().unwrap();
	let through_kernel = kernel.resolve::<Tracked>().unwrap();

	assert!(Arc::ptr_eq(&through_scope, &through_kernel));
	assert_eq!(scope.instance_count(), 0);
}
