// ABOUTME: Integration tests for the executor service
// ABOUTME: Covers tracking, shutdown, termination, state point waits and registry views

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use taskexe::{
    from_fn, BackendError, Context, RegistryKind, StatePoint, TaskControl, TaskError, TaskExecutor,
    TaskExecutorService, TaskPanic, TaskStage, ThreadInterrupt,
};

mod common;
use common::{
    cooperative_task, counting_task, gated_task, pool_service, wait_until, Gate, ManualBackend,
};

const LONG: Duration = Duration::from_secs(10);

#[test]
fn test_single_worker_runs_one_and_queues_the_rest() {
    let (_pool, service) = pool_service(1);
    let gate = Gate::new();

    let controls: Vec<TaskControl> = (0..5)
        .map(|_| service.execute(gated_task(&gate), Context::empty()).unwrap())
        .collect();

    assert_eq!(
        controls[0].await_next_stage(TaskStage::Pending).unwrap(),
        TaskStage::Running
    );
    let running = controls
        .iter()
        .filter(|c| c.stage() == TaskStage::Running)
        .count();
    let pending = controls
        .iter()
        .filter(|c| c.stage() == TaskStage::Pending)
        .count();
    assert_eq!(running, 1);
    assert_eq!(pending, 4);
    assert_eq!(service.task_count(), 5);

    gate.open();
    service.shutdown();
    assert!(service.await_termination_timeout(LONG).unwrap());
    assert!(controls.iter().all(|c| c.stage() == TaskStage::Complete));
    assert_eq!(service.task_count(), 0);
}

#[test]
fn test_failure_cause_is_the_error_the_body_returned() {
    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom {
        serial: u32,
    }

    let (_pool, service) = pool_service(1);
    let control = service
        .execute(
            Arc::new(from_fn(|_| Err(Boom { serial: 17 }.into()))),
            Context::empty(),
        )
        .unwrap();

    assert_eq!(
        control.await_next_stage(TaskStage::Running).unwrap(),
        TaskStage::Failed
    );
    let cause = control.failure_cause().unwrap();
    assert_eq!(cause.to_string(), "boom");
    assert_eq!(cause.downcast_ref::<Boom>().unwrap().serial, 17);
    assert!(Arc::ptr_eq(&cause, &control.failure_cause().unwrap()));
}

#[test]
fn test_shutdown_before_dequeue_lets_task_complete() {
    let (_pool, service) = pool_service(1);
    let gate = Gate::new();
    let blocker = service.execute(gated_task(&gate), Context::empty()).unwrap();
    blocker.await_next_stage(TaskStage::Pending).unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    let queued = service
        .execute(counting_task(&ran), Context::empty())
        .unwrap();

    service.shutdown();
    assert!(service.is_terminating());
    assert!(!service.is_terminated());
    assert_eq!(queued.stage(), TaskStage::Pending);
    assert!(!service.await_termination_timeout(Duration::ZERO).unwrap());

    gate.open();
    service.await_termination().unwrap();
    assert_eq!(queued.stage(), TaskStage::Complete);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(service.is_terminated());
}

#[test]
fn test_shutdown_now_cancels_tasks_not_yet_started() {
    let (_pool, service) = pool_service(1);
    let gate = Gate::new();
    let blocker = service.execute(gated_task(&gate), Context::empty()).unwrap();
    blocker.await_next_stage(TaskStage::Pending).unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    let queued = service
        .execute(counting_task(&ran), Context::empty())
        .unwrap();

    service.shutdown_now();
    assert_eq!(queued.stage(), TaskStage::Cancelled);
    assert_eq!(blocker.stage(), TaskStage::Running);
    assert!(!service.is_terminated());

    gate.open();
    assert!(service.await_termination_timeout(LONG).unwrap());
    assert_eq!(blocker.stage(), TaskStage::Complete);
    assert!(wait_until(LONG, || service.task_count() == 0));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn test_denied_after_shutdown_and_after_termination() {
    let (_pool, service) = pool_service(2);
    service.shutdown();

    let err = service
        .execute(Arc::new(from_fn(|_| Ok(()))), Context::empty())
        .unwrap_err();
    assert!(matches!(err, TaskError::DeniedExecution { .. }));

    service.await_termination().unwrap();
    let executor: Arc<dyn TaskExecutor> = service.clone();
    assert!(executor
        .execute(Arc::new(from_fn(|_| Ok(()))), Context::empty())
        .unwrap_err()
        .is_denied());
}

#[test]
fn test_backend_refusal_is_denied_and_untracked() {
    let backend = ManualBackend::new();
    let service = TaskExecutorService::new(backend.clone());
    backend.refuse();

    let err = service
        .execute(Arc::new(from_fn(|_| Ok(()))), Context::empty())
        .unwrap_err();
    assert!(err.is_denied());
    assert!(matches!(err.backend_error(), Some(BackendError::ShutDown)));
    assert_eq!(service.task_count(), 0);
    assert!(!service.is_terminating());
}

#[test]
fn test_cancel_running_non_interruptible_task_is_ignored() {
    let (_pool, service) = pool_service(1);
    let gate = Gate::new();
    let control = service.execute(gated_task(&gate), Context::empty()).unwrap();
    control.await_next_stage(TaskStage::Pending).unwrap();

    control.cancel_task();
    assert_eq!(control.stage(), TaskStage::Running);

    gate.open();
    assert_eq!(
        control.await_next_stage(TaskStage::Running).unwrap(),
        TaskStage::Complete
    );
}

#[test]
fn test_shutdown_now_leaves_cooperative_task_running_until_cancelled() {
    let (_pool, service) = pool_service(1);
    let control = service.execute(cooperative_task(), Context::empty()).unwrap();
    control.await_next_stage(TaskStage::Pending).unwrap();

    service.shutdown_now();
    assert_eq!(control.stage(), TaskStage::Running);
    assert!(!service.is_terminated());

    control.cancel_task();
    assert_eq!(
        control.await_next_stage(TaskStage::Running).unwrap(),
        TaskStage::Cancelled
    );
    assert!(service.await_termination_timeout(LONG).unwrap());
}

#[test]
fn test_panic_is_recorded_and_worker_keeps_going() {
    let (pool, service) = pool_service(1);
    let control = service
        .execute(Arc::new(from_fn(|_| panic!("worker fault"))), Context::empty())
        .unwrap();

    assert_eq!(
        control.await_next_stage(TaskStage::Running).unwrap(),
        TaskStage::Failed
    );
    let cause = control.failure_cause().unwrap();
    assert_eq!(cause.downcast_ref::<TaskPanic>().unwrap().message, "worker fault");

    let next = service
        .execute(Arc::new(from_fn(|_| Ok(()))), Context::empty())
        .unwrap();
    assert_eq!(
        next.await_next_stage(TaskStage::Running).unwrap(),
        TaskStage::Complete
    );
    assert_eq!(pool.workers(), 1);
    assert!(wait_until(LONG, || service.task_count() == 0));
}

#[test]
fn test_many_tasks_across_workers() {
    let (_pool, service) = pool_service(4);
    let counter = Arc::new(AtomicUsize::new(0));

    let controls: Vec<_> = (0..100)
        .map(|_| service.execute(counting_task(&counter), Context::empty()).unwrap())
        .collect();

    service.shutdown();
    assert!(service.await_termination_timeout(LONG).unwrap());
    assert_eq!(counter.load(Ordering::SeqCst), 100);
    assert!(controls.iter().all(|c| c.stage() == TaskStage::Complete));
    assert_eq!(service.task_count(), 0);
}

#[test]
fn test_state_point_changes_with_every_action() {
    let backend = ManualBackend::new();
    let service = TaskExecutorService::new(backend.clone());

    let start = service.await_action(None).unwrap();
    assert_eq!(
        service.await_action_timeout(Some(start), Duration::ZERO).unwrap(),
        start
    );

    let control = service
        .execute(Arc::new(from_fn(|_| Ok(()))), Context::empty())
        .unwrap();
    let submitted = service.await_action(Some(start)).unwrap();
    assert_ne!(submitted, start);

    backend.run_next();
    assert_eq!(control.stage(), TaskStage::Complete);
    let finished = service.await_action(Some(submitted)).unwrap();
    assert_ne!(finished, submitted);

    let idle = service
        .await_action_timeout(Some(finished), Duration::from_millis(30))
        .unwrap();
    assert_eq!(idle, finished);
}

#[test]
fn test_observer_sees_every_change_without_missing_one() {
    let (_pool, service) = pool_service(2);
    let stop = Arc::new(AtomicBool::new(false));

    let observer = {
        let service = service.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut seen: Vec<StatePoint> = Vec::new();
            let mut last = service.await_action(None).unwrap();
            while !stop.load(Ordering::SeqCst) {
                let next = service
                    .await_action_timeout(Some(last), Duration::from_millis(20))
                    .unwrap();
                if next != last {
                    seen.push(next);
                }
                last = next;
            }
            seen
        })
    };

    for _ in 0..10 {
        service
            .execute(Arc::new(from_fn(|_| Ok(()))), Context::empty())
            .unwrap();
    }
    service.shutdown();
    service.await_termination().unwrap();
    thread::sleep(Duration::from_millis(50));
    stop.store(true, Ordering::SeqCst);

    let seen = observer.join().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|pair| pair[0] != pair[1]));
}

#[test]
fn test_ordered_view_is_live() {
    let backend = ManualBackend::new();
    let service = TaskExecutorService::new(backend.clone());
    let controls: Vec<_> = (0..3)
        .map(|_| {
            service
                .execute(Arc::new(from_fn(|_| Ok(()))), Context::empty())
                .unwrap()
        })
        .collect();

    let mut tasks = service.tasks();
    assert_eq!(tasks.next().unwrap(), controls[0]);

    // The second task finishes while the walk is positioned on the first.
    backend.run_at(1);
    assert_eq!(tasks.next().unwrap(), controls[2]);

    let late = service
        .execute(Arc::new(from_fn(|_| Ok(()))), Context::empty())
        .unwrap();
    assert_eq!(tasks.next().unwrap(), late);
    assert!(tasks.next().is_none());
    assert!(tasks.next().is_none());
}

#[test]
fn test_unordered_view_is_a_snapshot() {
    let backend = ManualBackend::new();
    let service =
        TaskExecutorService::with_registry(backend.clone(), RegistryKind::Unordered.build(), false);
    for _ in 0..3 {
        service
            .execute(Arc::new(from_fn(|_| Ok(()))), Context::empty())
            .unwrap();
    }

    let tasks = service.tasks();
    backend.run_all();
    assert_eq!(service.task_count(), 0);
    assert_eq!(tasks.count(), 3);
}

#[test]
fn test_shutdown_backend_option_stops_the_backend() {
    let backend = ManualBackend::new();
    let service =
        TaskExecutorService::with_registry(backend.clone(), RegistryKind::Ordered.build(), true);
    for _ in 0..2 {
        service
            .execute(Arc::new(from_fn(|_| Ok(()))), Context::empty())
            .unwrap();
    }

    service.shutdown_now();
    assert_eq!(backend.queued(), 0);
    assert_eq!(service.task_count(), 0);
    assert!(service.is_terminated());
}

#[test]
fn test_interrupt_breaks_service_waits() {
    let (_pool, service) = pool_service(1);
    let gate = Gate::new();
    service.execute(gated_task(&gate), Context::empty()).unwrap();
    service.shutdown();

    let (tx, rx) = std::sync::mpsc::channel();
    let waiter = {
        let service = service.clone();
        thread::spawn(move || {
            tx.send(ThreadInterrupt::current()).unwrap();
            let termination = service.await_termination();
            let point = service.state_point();
            let action = service.await_action(Some(point));
            (termination, action)
        })
    };

    let interrupt = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(30));
    interrupt.interrupt();
    assert!(wait_until(LONG, || !interrupt.is_interrupted()));
    thread::sleep(Duration::from_millis(30));
    interrupt.interrupt();

    let (termination, action) = waiter.join().unwrap();
    assert!(matches!(termination, Err(TaskError::Interrupted)));
    assert!(action.unwrap_err().is_interrupted());

    gate.open();
    assert!(service.await_termination_timeout(LONG).unwrap());
}

#[test]
fn test_cancel_races_start_with_exactly_one_winner() {
    for kind in [RegistryKind::Ordered, RegistryKind::Unordered] {
        let pool = Arc::new(taskexe::ThreadPool::new(4, "race-worker").unwrap());
        let service = TaskExecutorService::with_registry(pool, kind.build(), false);
        let body: Arc<dyn taskexe::Task> = Arc::new(from_fn(|scope| {
            if let Some(ran) = scope.context().get::<AtomicBool>() {
                ran.store(true, Ordering::SeqCst);
            }
            Ok(())
        }));

        let runs: Vec<(TaskControl, Arc<AtomicBool>)> = (0..1000)
            .map(|_| {
                let ran = Arc::new(AtomicBool::new(false));
                let control = service
                    .execute(body.clone(), Context::from_arc(ran.clone()))
                    .unwrap();
                control.cancel_task();
                (control, ran)
            })
            .collect();

        service.shutdown_now();
        assert!(service.await_termination_timeout(LONG).unwrap());
        assert!(wait_until(LONG, || service.task_count() == 0));

        for (control, ran) in &runs {
            match control.stage() {
                TaskStage::Cancelled => assert!(!ran.load(Ordering::SeqCst)),
                TaskStage::Complete => assert!(ran.load(Ordering::SeqCst)),
                other => panic!("{} ended {}", control.id(), other),
            }
        }
    }
}
