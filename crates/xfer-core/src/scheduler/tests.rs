//! Engine tests: the state machine driven directly with explicit instants.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::XferConfig;
use crate::error::{SchedulerError, TransferError};
use crate::monitor::AppLifecycle;
use crate::observe::SchedulerEvent;
use crate::registry::{TaskId, TaskInput, TaskState};

use super::engine::{Engine, Launch};
use super::executor::TransferOutcome;
use super::message::Signal;

fn engine(max_concurrency: usize) -> Engine<&'static str> {
    let cfg = XferConfig {
        max_concurrency,
        ..XferConfig::default()
    };
    Engine::new(&cfg)
}

fn enqueue_all(engine: &mut Engine<&'static str>, ids: &[&str], now: Instant) {
    for id in ids {
        engine.enqueue(TaskInput::new(*id, "payload"), now).unwrap();
    }
}

fn ids<'a>(launches: &'a [Launch<&'static str>]) -> Vec<&'a str> {
    launches.iter().map(|l| l.id.as_str()).collect()
}

fn state(engine: &Engine<&'static str>, id: &str) -> TaskState {
    engine.task(&TaskId::new(id)).unwrap().state
}

#[test]
fn nothing_is_admitted_before_start() {
    let mut e = engine(3);
    let now = Instant::now();
    enqueue_all(&mut e, &["a", "b"], now);
    assert!(e.admit(now).is_empty());
    assert!(!e.stats().is_processing);

    e.start();
    assert_eq!(ids(&e.admit(now)), vec!["a", "b"]);
    assert!(e.stats().is_processing);
}

#[test]
fn five_tasks_fill_three_slots_and_completion_admits_one() {
    let mut e = engine(3);
    let now = Instant::now();
    enqueue_all(&mut e, &["t1", "t2", "t3", "t4", "t5"], now);
    e.start();
    let launches = e.admit(now);
    assert_eq!(ids(&launches), vec!["t1", "t2", "t3"]);

    let stats = e.stats();
    assert_eq!(stats.active_uploads, 3);
    assert_eq!(stats.queue_length, 2);
    assert_eq!(stats.total_uploads, 5);
    assert_eq!(
        stats.active_ids,
        vec![TaskId::new("t1"), TaskId::new("t2"), TaskId::new("t3")]
    );

    let first = &launches[0];
    e.on_outcome(&first.id, first.run, TransferOutcome::Succeeded(None), now);
    assert_eq!(ids(&e.admit(now)), vec!["t4"]);
    let stats = e.stats();
    assert_eq!(stats.active_uploads, 3);
    assert_eq!(stats.queue_length, 1);
    assert_eq!(stats.completed_uploads, 1);
}

#[test]
fn duplicate_live_id_is_rejected() {
    let mut e = engine(3);
    let now = Instant::now();
    e.enqueue(TaskInput::new("a", "payload"), now).unwrap();
    e.start();
    e.admit(now);
    let err = e.enqueue(TaskInput::new("a", "payload"), now).unwrap_err();
    assert_eq!(err, SchedulerError::Duplicate(TaskId::new("a")));
    assert_eq!(e.stats().total_uploads, 1);
}

#[test]
fn high_priority_takes_the_next_free_slot_without_evicting() {
    let mut e = engine(1);
    let now = Instant::now();
    enqueue_all(&mut e, &["n1"], now);
    e.start();
    let running = e.admit(now);
    assert_eq!(ids(&running), vec!["n1"]);

    e.enqueue(TaskInput::new("n2", "payload"), now).unwrap();
    e.enqueue(TaskInput::new("h1", "payload").high_priority(), now)
        .unwrap();
    assert!(e.admit(now).is_empty(), "active task is never evicted");
    assert_eq!(state(&e, "n1"), TaskState::Active);

    e.on_outcome(&running[0].id, running[0].run, TransferOutcome::Succeeded(None), now);
    assert_eq!(ids(&e.admit(now)), vec!["h1"]);
}

#[test]
fn failing_task_backs_off_then_fails_after_six_attempts() {
    let mut e = engine(1);
    let mut now = Instant::now();
    enqueue_all(&mut e, &["a"], now);
    e.start();

    let mut waits = Vec::new();
    for attempt in 1..=6u32 {
        let launch = e.admit(now).pop().expect("admitted");
        assert_eq!(e.task(&launch.id).unwrap().attempt, attempt);
        e.on_outcome(
            &launch.id,
            launch.run,
            TransferOutcome::Failed(TransferError::transient("boom")),
            now,
        );
        if let Some(at) = e.next_wakeup(now) {
            let wait = at - now;
            assert!(e.admit(now).is_empty(), "not eligible before backoff ends");
            assert!(e.admit(at - Duration::from_millis(1)).is_empty());
            waits.push(wait);
            now = at;
        }
    }
    let secs: Vec<u64> = waits.iter().map(|d| d.as_secs()).collect();
    assert_eq!(secs, vec![1, 2, 4, 8, 16]);

    assert_eq!(state(&e, "a"), TaskState::Failed);
    assert_eq!(e.task(&TaskId::new("a")).unwrap().error.as_deref(), Some("boom"));
    assert!(e.admit(now + Duration::from_secs(3600)).is_empty(), "no 7th attempt");
    assert_eq!(e.stats().failed_uploads, 1);
    assert_eq!(e.announcements().last().map(String::as_str), Some("Upload failed"));
}

#[test]
fn permanent_failure_is_terminal_at_once() {
    let mut e = engine(1);
    let now = Instant::now();
    enqueue_all(&mut e, &["a"], now);
    e.start();
    let launch = e.admit(now).pop().unwrap();
    e.on_outcome(
        &launch.id,
        launch.run,
        TransferOutcome::Failed(TransferError::permanent("source missing")),
        now,
    );
    assert_eq!(state(&e, "a"), TaskState::Failed);
    assert_eq!(e.task(&launch.id).unwrap().attempt, 1);
}

#[test]
fn unrequested_abort_is_retried_as_transient() {
    let mut e = engine(1);
    let now = Instant::now();
    enqueue_all(&mut e, &["a"], now);
    e.start();
    let launch = e.admit(now).pop().unwrap();
    e.on_outcome(&launch.id, launch.run, TransferOutcome::Aborted, now);
    assert_eq!(state(&e, "a"), TaskState::Queued);
    assert_eq!(e.next_wakeup(now), Some(now + Duration::from_secs(1)));
}

#[test]
fn cancel_queued_is_immediate_and_active_waits_for_report() {
    let mut e = engine(1);
    let now = Instant::now();
    enqueue_all(&mut e, &["a", "b"], now);
    e.start();
    let launch = e.admit(now).pop().unwrap();

    assert!(e.cancel(&TaskId::new("b"), now).is_none());
    assert_eq!(state(&e, "b"), TaskState::Cancelled);

    let pending = e.cancel(&launch.id, now).expect("active cancel is pending");
    assert!(launch.token.is_aborted());
    assert!(!e.is_settled(&pending));
    assert_eq!(state(&e, "a"), TaskState::Active);

    // Whatever the executor says, a cancelled run ends cancelled.
    e.on_outcome(&launch.id, launch.run, TransferOutcome::Succeeded(None), now);
    assert!(e.is_settled(&pending));
    assert_eq!(state(&e, "a"), TaskState::Cancelled);

    let stats = e.stats();
    assert_eq!(stats.cancelled_uploads, 2);
    assert_eq!(stats.completed_uploads, 0);
    assert_eq!(stats.active_uploads, 0);
}

#[test]
fn cancel_unknown_or_finished_is_noop() {
    let mut e = engine(1);
    let now = Instant::now();
    assert!(e.cancel(&TaskId::new("ghost"), now).is_none());
    enqueue_all(&mut e, &["a"], now);
    e.start();
    let launch = e.admit(now).pop().unwrap();
    e.on_outcome(&launch.id, launch.run, TransferOutcome::Succeeded(None), now);
    assert!(e.cancel(&launch.id, now).is_none());
    assert_eq!(state(&e, "a"), TaskState::Succeeded);
    assert_eq!(e.stats().cancelled_uploads, 0);
}

#[test]
fn cancel_all_sweeps_queued_and_aborts_active() {
    let mut e = engine(3);
    let now = Instant::now();
    enqueue_all(&mut e, &["t1", "t2", "t3", "t4", "t5"], now);
    e.start();
    let launches = e.admit(now);

    let pending = e.cancel_all(now);
    assert_eq!(pending.len(), 3);
    assert_eq!(e.stats().queue_length, 0);
    assert!(e.admit(now).is_empty(), "aborting runs still hold their slots");

    for l in &launches {
        e.on_outcome(&l.id, l.run, TransferOutcome::Aborted, now);
    }
    assert!(pending.iter().all(|p| e.is_settled(p)));
    let stats = e.stats();
    assert_eq!(stats.active_uploads, 0);
    assert_eq!(stats.queue_length, 0);
    assert_eq!(stats.cancelled_uploads, 5);
}

#[test]
fn network_loss_requeues_and_readmits_when_online() {
    let mut e = engine(3);
    let now = Instant::now();
    enqueue_all(&mut e, &["a"], now);
    e.start();
    let launch = e.admit(now).pop().unwrap();

    let pending = e.signal(Signal::Network { online: false });
    assert_eq!(pending, vec![(launch.id.clone(), launch.run)]);
    assert!(launch.token.is_aborted());
    e.on_outcome(&launch.id, launch.run, TransferOutcome::Aborted, now);

    let stats = e.stats();
    assert_eq!(stats.active_uploads, 0);
    assert!(stats.is_paused);
    assert!(stats.is_network_suspended);
    assert_eq!(state(&e, "a"), TaskState::Queued);
    assert!(e.admit(now).is_empty());

    assert!(e.signal(Signal::Network { online: true }).is_empty());
    let relaunch = e.admit(now).pop().expect("re-admitted without backoff");
    assert_eq!(e.task(&relaunch.id).unwrap().attempt, 2);
    let stats = e.stats();
    assert_eq!(stats.active_uploads, 1);
    assert!(!stats.is_paused);
}

#[test]
fn network_loss_on_last_attempt_fails_the_task() {
    let cfg = XferConfig {
        retry: Some(crate::config::RetryConfig {
            max_attempts: 1,
            ..Default::default()
        }),
        ..XferConfig::default()
    };
    let mut e: Engine<&'static str> = Engine::new(&cfg);
    let now = Instant::now();
    enqueue_all(&mut e, &["a"], now);
    e.start();
    let launch = e.admit(now).pop().unwrap();
    e.signal(Signal::Network { online: false });
    e.on_outcome(&launch.id, launch.run, TransferOutcome::Aborted, now);
    assert_eq!(state(&e, "a"), TaskState::Failed);
}

#[test]
fn stale_report_from_an_old_run_is_ignored() {
    let mut e = engine(1);
    let now = Instant::now();
    enqueue_all(&mut e, &["a"], now);
    e.start();
    let old = e.admit(now).pop().unwrap();
    e.signal(Signal::Network { online: false });
    e.on_outcome(&old.id, old.run, TransferOutcome::Aborted, now);
    e.signal(Signal::Network { online: true });
    let new = e.admit(now).pop().unwrap();
    assert_ne!(old.run, new.run);

    e.on_progress(&old.id, old.run, 90);
    e.on_outcome(&old.id, old.run, TransferOutcome::Succeeded(None), now);
    assert_eq!(state(&e, "a"), TaskState::Active);
    assert_eq!(e.task(&new.id).unwrap().progress, 0);
}

#[test]
fn progress_is_clamped_monotonic_and_emitted() {
    let mut e = engine(1);
    let now = Instant::now();
    enqueue_all(&mut e, &["a"], now);
    e.start();
    let l = e.admit(now).pop().unwrap();
    e.take_events();

    e.on_progress(&l.id, l.run, 40);
    e.on_progress(&l.id, l.run, 20);
    e.on_progress(&l.id, l.run, 400);
    assert_eq!(e.task(&l.id).unwrap().progress, 100);
    assert_eq!(
        e.take_events(),
        vec![
            SchedulerEvent::Progress { id: l.id.clone(), percent: 40 },
            SchedulerEvent::Progress { id: l.id.clone(), percent: 100 },
        ]
    );
}

#[test]
fn memory_warning_caps_admission_until_restored() {
    let mut e = engine(3);
    let now = Instant::now();
    e.signal(Signal::MemoryWarning);
    enqueue_all(&mut e, &["t1", "t2", "t3", "t4", "t5"], now);
    e.start();
    assert_eq!(e.admit(now).len(), 1);
    let stats = e.stats();
    assert_eq!(stats.max_concurrency, 1);
    assert!(stats.is_memory_optimized);
    assert_eq!(stats.active_uploads, 1);
    assert_eq!(stats.queue_length, 4);

    e.signal(Signal::RestoreConcurrency);
    assert_eq!(e.admit(now).len(), 2);
    assert_eq!(e.stats().max_concurrency, 3);
}

#[test]
fn lowering_the_cap_never_evicts() {
    let mut e = engine(3);
    let now = Instant::now();
    enqueue_all(&mut e, &["t1", "t2", "t3", "t4"], now);
    e.start();
    e.admit(now);
    e.signal(Signal::SetMaxConcurrency(1));
    assert!(e.admit(now).is_empty());
    assert_eq!(e.stats().active_uploads, 3);
}

#[test]
fn pause_and_background_stop_admission_but_keep_active() {
    let mut e = engine(3);
    let now = Instant::now();
    enqueue_all(&mut e, &["t1", "t2", "t3", "t4"], now);
    e.start();
    let launches = e.admit(now);
    e.set_paused(true);
    e.on_outcome(&launches[0].id, launches[0].run, TransferOutcome::Succeeded(None), now);
    assert!(e.admit(now).is_empty());
    assert_eq!(e.stats().active_uploads, 2);
    assert!(!launches[1].token.is_aborted());

    e.signal(Signal::Lifecycle(AppLifecycle::Background));
    e.set_paused(false);
    assert!(e.admit(now).is_empty(), "background still holds admission");
    e.signal(Signal::Lifecycle(AppLifecycle::Foreground));
    assert_eq!(ids(&e.admit(now)), vec!["t4"]);
}

#[test]
fn is_processing_drops_while_any_pause_source_holds() {
    let mut e = engine(3);
    e.start();
    assert!(e.stats().is_processing);

    e.set_paused(true);
    assert!(!e.stats().is_processing);
    e.set_paused(false);
    assert!(e.stats().is_processing);

    e.signal(Signal::Network { online: false });
    assert!(!e.stats().is_processing);
    e.signal(Signal::Network { online: true });
    assert!(e.stats().is_processing);
}

#[test]
fn announcements_follow_the_lifecycle() {
    let mut e = engine(2);
    let now = Instant::now();
    enqueue_all(&mut e, &["a", "b"], now);
    e.start();
    let launches = e.admit(now);
    e.on_outcome(&launches[0].id, launches[0].run, TransferOutcome::Succeeded(None), now);
    e.cancel(&launches[1].id, now);
    e.on_outcome(&launches[1].id, launches[1].run, TransferOutcome::Aborted, now);
    assert_eq!(
        e.announcements(),
        &[
            "Upload started",
            "Upload started",
            "Upload completed",
            "Upload cancelled"
        ]
    );
}

#[test]
fn removed_failed_task_can_be_resubmitted() {
    let mut e = engine(1);
    let now = Instant::now();
    enqueue_all(&mut e, &["a"], now);
    e.start();
    let l = e.admit(now).pop().unwrap();
    e.on_outcome(
        &l.id,
        l.run,
        TransferOutcome::Failed(TransferError::permanent("nope")),
        now,
    );
    assert!(e.enqueue(TaskInput::new("a", "payload"), now).is_err());
    assert!(e.remove(&l.id).is_some());
    e.enqueue(TaskInput::new("a", "payload"), now).unwrap();
    assert_eq!(e.stats().failed_uploads, 1, "tallies survive removal");
}
