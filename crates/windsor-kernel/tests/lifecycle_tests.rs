//! Lifecycle hook tests
//!
//! These tests verify:
//! 1. On-create hooks run before an instance is handed out
//! 2. Start hooks run at `Kernel::start` in registration order
//! 3. Stop hooks run in reverse start order on dispose and on scope close
//! 4. A failing stop hook does not prevent the remaining ones from running
//! 5. Instances outliving their scope or a reopen are stopped, never leaked

use parking_lot::Mutex;
use rstest::rstest;
use std::sync::{Arc, Barrier};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use windsor_kernel::{
	Arguments, ComponentRegistration, DiError, DiResult, HookPhase, Injectable, Kernel,
	KernelPhase,
};

type Journal = Arc<Mutex<Vec<String>>>;

fn journal() -> Journal {
	Arc::new(Mutex::new(Vec::new()))
}

fn entries(journal: &Journal) -> Vec<String> {
	journal.lock().clone()
}

struct Database;

impl Injectable for Database {
	fn construct(_: &Arguments) -> DiResult<Self> {
		Ok(Database)
	}
}

struct Cache;

impl Injectable for Cache {
	fn construct(_: &Arguments) -> DiResult<Self> {
		Ok(Cache)
	}
}

struct Server;

impl Injectable for Server {
	fn construct(_: &Arguments) -> DiResult<Self> {
		Ok(Server)
	}
}

fn started<S: Injectable>(name: &'static str, log: &Journal) -> ComponentRegistration<S> {
	let on_start = log.clone();
	let on_stop = log.clone();
	ComponentRegistration::<S>::new()
		.on_start(move |_| {
			on_start.lock().push(format!("start {name}"));
			Ok(())
		})
		.on_stop(move |_| {
			on_stop.lock().push(format!("stop {name}"));
			Ok(())
		})
}

// ========================================================================
// Start and stop ordering
// ========================================================================

#[rstest]
fn test_stop_hooks_run_in_reverse_start_order() {
	// Arrange
	let log = journal();
	let kernel = Kernel::new();
	kernel.register(started::<Database>("database", &log)).unwrap();
	kernel.register(started::<Cache>("cache", &log)).unwrap();
	kernel.register(started::<Server>("server", &log)).unwrap();

	// Act
	kernel.start().unwrap();
	kernel.dispose().unwrap();

	// Assert
	assert_eq!(
		entries(&log),
		vec![
			"start database",
			"start cache",
			"start server",
			"stop server",
			"stop cache",
			"stop database",
		]
	);
	assert_eq!(kernel.phase(), KernelPhase::Disposed);
}

#[rstest]
fn test_start_is_idempotent() {
	let log = journal();
	let kernel = Kernel::new();
	kernel.register(started::<Database>("database", &log)).unwrap();

	kernel.start().unwrap();
	kernel.start().unwrap();

	assert_eq!(entries(&log), vec!["start database"]);
}

#[rstest]
fn test_singleton_with_start_hook_is_built_eagerly() {
	// Arrange
	let log = journal();
	let kernel = Kernel::new();
	kernel.register(started::<Server>("server", &log)).unwrap();
	assert_eq!(kernel.singleton_count(), 0);

	// Act
	kernel.start().unwrap();

	// Assert
	assert_eq!(kernel.singleton_count(), 1);
}

#[rstest]
fn test_eager_singleton_without_hooks_is_built_by_start() {
	let kernel = Kernel::new();
	kernel
		.register(ComponentRegistration::<Cache>::new().eager())
		.unwrap();
	kernel.register(ComponentRegistration::<Database>::new()).unwrap();

	kernel.start().unwrap();

	assert_eq!(kernel.singleton_count(), 1);
}

#[rstest]
fn test_lazy_singleton_stop_hook_runs_on_dispose() {
	// Arrange
	let stopped = Arc::new(AtomicBool::new(false));
	let flag = stopped.clone();
	let kernel = Kernel::new();
	kernel
		.register(ComponentRegistration::<Cache>::new().on_stop(move |_| {
			flag.store(true, Ordering::SeqCst);
			Ok(())
		}))
		.unwrap();
	kernel.resolve::<Cache>().unwrap();

	// Act
	kernel.dispose().unwrap();

	// Assert
	assert!(stopped.load(Ordering::SeqCst));
}

#[rstest]
fn test_failing_stop_hook_does_not_block_others() {
	// Arrange
	let log = journal();
	let kernel = Kernel::new();
	kernel.register(started::<Database>("database", &log)).unwrap();
	kernel
		.register(
			ComponentRegistration::<Cache>::new()
				.on_start(|_| Ok(()))
				.on_stop(|_| Err("flush failed".into())),
		)
		.unwrap();
	kernel.register(started::<Server>("server", &log)).unwrap();
	kernel.start().unwrap();

	// Act
	let err = kernel.dispose().unwrap_err();

	// Assert
	assert_eq!(entries(&log).last().map(String::as_str), Some("stop database"));
	assert_eq!(err.failures().len(), 1);
	assert!(err.services()[0].ends_with("Cache"));
	assert!(err.to_string().contains("flush failed"));
}

#[rstest]
fn test_failing_start_hook_is_reported() {
	let kernel = Kernel::new();
	kernel
		.register(ComponentRegistration::<Server>::new().on_start(|_| Err("port in use".into())))
		.unwrap();

	let err = kernel.start().unwrap_err();

	match err {
		DiError::HookExecution { phase, .. } => assert_eq!(phase, HookPhase::Start),
		other => panic!("expected HookExecution, got {other:?}"),
	}
}

// ========================================================================
// Creation hooks and scopes
// ========================================================================

#[rstest]
fn test_on_create_runs_once_per_instance() {
	// Arrange
	let created = Arc::new(AtomicUsize::new(0));
	let counter = created.clone();
	let kernel = Kernel::new();
	kernel
		.register(
			ComponentRegistration::<Database>::new()
				.transient()
				.on_create(move |_| {
					counter.fetch_add(1, Ordering::SeqCst);
					Ok(())
				}),
		)
		.unwrap();

	// Act
	kernel.resolve::<Database>().unwrap();
	kernel.resolve::<Database>().unwrap();

	// Assert
	assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[rstest]
fn test_failing_on_create_discards_singleton() {
	let kernel = Kernel::new();
	kernel
		.register(ComponentRegistration::<Database>::new().on_create(|_| Err("migrations".into())))
		.unwrap();

	let result = kernel.resolve::<Database>();

	assert!(matches!(
		result,
		Err(DiError::HookExecution {
			phase: HookPhase::Create,
			..
		})
	));
	assert_eq!(kernel.singleton_count(), 0);
}

#[rstest]
fn test_scope_close_stops_scoped_instances_in_reverse() {
	// Arrange
	let log = journal();
	let kernel = Kernel::new();
	kernel
		.register(started::<Database>("database", &log).scoped())
		.unwrap();
	kernel.register(started::<Cache>("cache", &log).scoped()).unwrap();
	let scope = kernel.begin_scope().unwrap();

	// Act
	scope.resolve::<Database>().unwrap();
	scope.resolve::<Cache>().unwrap();
	scope.close().unwrap();
	scope.close().unwrap();

	// Assert
	assert_eq!(
		entries(&log),
		vec!["start database", "start cache", "stop cache", "stop database"]
	);
}

#[rstest]
fn test_dropped_scope_still_runs_stop_hooks() {
	let log = journal();
	let kernel = Kernel::new();
	kernel
		.register(started::<Database>("database", &log).scoped())
		.unwrap();

	{
		let scope = kernel.begin_scope().unwrap();
		scope.resolve::<Database>().unwrap();
	}

	assert_eq!(entries(&log), vec!["start database", "stop database"]);
}

#[rstest]
fn test_scope_closed_during_construction_stops_late_instance() {
	// Arrange
	let log = journal();
	let entered = Arc::new(Barrier::new(2));
	let release = Arc::new(Barrier::new(2));
	let (in_factory, hold) = (entered.clone(), release.clone());
	let on_stop = log.clone();
	let kernel = Kernel::new();
	kernel
		.register(
			ComponentRegistration::<Database>::factory(move |_| {
				in_factory.wait();
				hold.wait();
				Ok(Arc::new(Database))
			})
			.scoped()
			.on_stop(move |_| {
				on_stop.lock().push("stop database".to_string());
				Ok(())
			}),
		)
		.unwrap();
	let scope = kernel.begin_scope().unwrap();
	let scope_id = scope.id();

	// Act
	let result = std::thread::scope(|s| {
		let worker = s.spawn(|| scope.resolve::<Database>());
		entered.wait();
		scope.close().unwrap();
		release.wait();
		worker.join().unwrap()
	});

	// Assert
	assert!(matches!(result, Err(DiError::ScopeClosed(id)) if id == scope_id));
	assert_eq!(entries(&log), vec!["stop database"]);
	assert_eq!(scope.instance_count(), 0);
}

#[rstest]
fn test_stop_hook_on_transient_is_rejected() {
	let kernel = Kernel::new();

	let result = kernel.register(
		ComponentRegistration::<Database>::new()
			.transient()
			.on_stop(|_| Ok(())),
	);

	assert!(matches!(result, Err(DiError::InvalidRegistration { .. })));
}

#[rstest]
fn test_reopen_runs_stop_hooks_and_rebuilds() {
	// Arrange
	let log = journal();
	let kernel = Kernel::new();
	kernel.register(started::<Database>("database", &log)).unwrap();
	kernel.start().unwrap();

	// Act
	kernel.reopen().unwrap();
	kernel.start().unwrap();

	// Assert
	assert_eq!(
		entries(&log),
		vec!["start database", "stop database", "start database"]
	);
	assert_eq!(kernel.phase(), KernelPhase::Serving);
}

#[rstest]
fn test_reopen_invalidates_open_scopes() {
	// Arrange
	let log = journal();
	let kernel = Kernel::new();
	kernel
		.register(started::<Database>("database", &log).scoped())
		.unwrap();
	let scope = kernel.begin_scope().unwrap();
	let before = scope.resolve::<Database>().unwrap();

	// Act
	kernel.reopen().unwrap();
	kernel.register(ComponentRegistration::<Cache>::new()).unwrap();
	let after = scope.resolve::<Database>().unwrap();

	// Assert
	assert!(!Arc::ptr_eq(&before, &after));
	assert!(!scope.is_closed());
	assert_eq!(scope.instance_count(), 1);
	assert!(scope.resolve::<Cache>().is_ok());
	assert_eq!(
		entries(&log),
		vec!["start database", "stop database", "start database"]
	);
}

#[rstest]
fn test_reopen_skips_closed_and_dropped_scopes() {
	let log = journal();
	let kernel = Kernel::new();
	kernel
		.register(started::<Database>("database", &log).scoped())
		.unwrap();
	let closed = kernel.begin_scope().unwrap();
	closed.resolve::<Database>().unwrap();
	closed.close().unwrap();
	{
		let dropped = kernel.begin_scope().unwrap();
		dropped.resolve::<Database>().unwrap();
	}

	kernel.reopen().unwrap();

	assert_eq!(
		entries(&log),
		vec![
			"start database",
			"stop database",
			"start database",
			"stop database"
		]
	);
	assert!(matches!(
		closed.resolve::<Database>(),
		Err(DiError::ScopeClosed(_))
	));
}

#[rstest]
fn test_lazily_resolved_singleton_starts_with_kernel() {
	// Arrange
	let log = journal();
	let kernel = Kernel::new();
	kernel.register(started::<Database>("database", &log)).unwrap();
	let lazy = kernel.resolve::<Database>().unwrap();
	let before_start = entries(&log);

	// Act
	kernel.start().unwrap();
	let after_start = kernel.resolve::<Database>().unwrap();

	// Assert
	assert!(before_start.is_empty());
	assert_eq!(entries(&log), vec!["start database"]);
	assert!(Arc::ptr_eq(&lazy, &after_start));
}
