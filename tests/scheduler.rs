use std::cell::{Cell, RefCell};

use rtsched::{
    Kernel, Membership, PortHooks, SchedConfig, SchedError, TaskHandle, TaskParams, TaskState,
    Tick, WAIT_FOREVER,
};

thread_local! {
    static SWITCHES: RefCell<Vec<(Option<TaskHandle>, TaskHandle)>> = RefCell::new(Vec::new());
    static MASK_DEPTH: Cell<u32> = Cell::new(0);
    static MASK_ENTRIES: Cell<u32> = Cell::new(0);
}

fn record_switch(from: Option<TaskHandle>, to: TaskHandle) {
    SWITCHES.with(|s| s.borrow_mut().push((from, to)));
}

fn mask() -> bool {
    MASK_ENTRIES.with(|c| c.set(c.get() + 1));
    MASK_DEPTH.with(|d| {
        let prev = d.get();
        d.set(prev + 1);
        prev == 0
    })
}

fn restore(_outermost: bool) {
    MASK_DEPTH.with(|d| d.set(d.get() - 1));
}

fn switches() -> Vec<(Option<TaskHandle>, TaskHandle)> {
    SWITCHES.with(|s| s.borrow().clone())
}

fn noop(_: usize) {}

fn kernel(cfg: SchedConfig) -> Kernel {
    let hooks = PortHooks::new(record_switch).with_critical(mask, restore);
    Kernel::new(cfg, hooks).unwrap()
}

fn task(k: &mut Kernel, name: &'static str, prio: u8) -> TaskHandle {
    k.create(TaskParams::new(name, noop, prio)).unwrap()
}

/// Every live task sits on exactly one list unless it is running.
fn assert_membership_invariant(k: &Kernel) {
    let mut linked = 0;
    let mut running = 0;
    for status in k.system_state() {
        let tcb = k.get(status.handle).unwrap();
        match tcb.state() {
            TaskState::Running => {
                running += 1;
                assert_eq!(tcb.membership(), Membership::Unlinked);
            }
            TaskState::Ready => assert!(matches!(
                tcb.membership(),
                Membership::Ready(_) | Membership::PendingReady
            )),
            TaskState::Blocked => assert!(matches!(
                tcb.membership(),
                Membership::Delayed(_) | Membership::Waiting
            )),
            TaskState::Suspended => assert_eq!(tcb.membership(), Membership::Suspended),
            TaskState::Deleted => panic!("deleted task still registered"),
        }
        if tcb.state() != TaskState::Running {
            linked += 1;
        }
    }
    assert!(running <= 1);
    let listed = k.ready_len() + k.delayed_len() + k.waiting_len() + k.suspended_len() + k.pending_len();
    assert_eq!(linked, listed);
}

#[test]
fn highest_priority_runs_first() {
    let mut k = kernel(SchedConfig::new());
    let a = task(&mut k, "a", 1);
    let _b = task(&mut k, "b", 1);
    let c = task(&mut k, "c", 2);

    // Nothing is running yet and tasks are ready, so the tick asks for a switch.
    assert!(k.on_tick());
    assert_eq!(k.select_next(), Ok(c));
    assert_eq!(k.get_current_task(), Some(c));
    assert_eq!(k.get(c).unwrap().state(), TaskState::Running);

    // Block c for 5 ticks; the first priority-1 task takes over.
    k.delay(5).unwrap();
    assert_eq!(k.get_current_task(), Some(a));
    assert_eq!(k.get(c).unwrap().state(), TaskState::Blocked);

    for _ in 0..4 {
        k.on_tick();
        assert_eq!(k.get(c).unwrap().state(), TaskState::Blocked);
    }
    assert!(k.on_tick());
    assert_eq!(k.get(c).unwrap().state(), TaskState::Ready);
    assert_eq!(k.request_switch(), Some(c));
    assert_membership_invariant(&k);
}

#[test]
fn round_robin_gives_each_peer_one_slice() {
    let mut k = kernel(SchedConfig::new().with_timeslice(1));
    let hs: Vec<_> = ["p0", "p1", "p2"].into_iter().map(|n| task(&mut k, n, 3)).collect();
    assert_eq!(k.select_next(), Ok(hs[0]));

    let mut ran = Vec::new();
    for _ in 0..hs.len() {
        ran.push(k.get_current_task().unwrap());
        assert!(k.on_tick(), "slice should expire with peers ready");
        k.request_switch();
    }
    assert_eq!(ran, hs);
    assert_eq!(k.get_current_task(), Some(hs[0]));
    assert_membership_invariant(&k);
}

#[test]
fn longer_timeslice_holds_cpu() {
    let mut k = kernel(SchedConfig::new().with_timeslice(3));
    let a = task(&mut k, "a", 1);
    let b = task(&mut k, "b", 1);
    k.select_next().unwrap();

    assert!(!k.on_tick());
    assert!(!k.on_tick());
    assert!(k.on_tick());
    assert_eq!(k.request_switch(), Some(b));
    assert_eq!(k.ready_at(1), vec![a]);
}

#[test]
fn time_slicing_disabled_keeps_running_task() {
    let mut k = kernel(SchedConfig::new().with_time_slicing(false));
    let a = task(&mut k, "a", 1);
    task(&mut k, "b", 1);
    k.select_next().unwrap();
    for _ in 0..10 {
        assert!(!k.on_tick());
    }
    assert_eq!(k.request_switch(), None);
    assert_eq!(k.get_current_task(), Some(a));
}

#[test]
fn delay_across_tick_wrap_is_exact() {
    let mut k = kernel(SchedConfig::new().with_initial_tick(Tick::MAX - 2));
    k.start(noop).unwrap();
    let t = task(&mut k, "sleeper", 4);
    assert_eq!(k.request_switch(), Some(t));

    k.delay(5).unwrap();
    assert_eq!(k.get(t).unwrap().wake_tick(), Some(2));
    assert!(matches!(k.get(t).unwrap().membership(), Membership::Delayed(_)));

    for i in 1..5 {
        assert!(!k.on_tick(), "woke early at tick {}", i);
        assert_eq!(k.get(t).unwrap().state(), TaskState::Blocked);
    }
    assert_eq!(k.tick_count(), 1);
    assert!(k.on_tick());
    assert_eq!(k.tick_count(), 2);
    assert_eq!(k.get(t).unwrap().state(), TaskState::Ready);
    assert_eq!(k.overflow_count(), 1);
}

#[test]
fn nested_suspend_needs_matching_resumes() {
    let mut k = kernel(SchedConfig::new());
    k.start(noop).unwrap();
    let hi = task(&mut k, "hi", 5);
    k.request_switch();
    k.block(hi, 2).unwrap();
    k.request_switch();

    k.suspend_all();
    k.suspend_all();
    k.on_tick();
    k.on_tick();
    assert_eq!(k.pending_len(), 1);
    assert!(k.ready_at(5).is_empty());

    assert!(!k.resume_all());
    assert_eq!(k.suspension_depth(), 1);
    assert_eq!(k.pending_len(), 1);

    assert!(k.resume_all());
    assert_eq!(k.suspension_depth(), 0);
    assert_eq!(k.pending_len(), 0);
    assert_eq!(k.ready_at(5), vec![hi]);
    assert_eq!(k.request_switch(), Some(hi));
}

#[test]
fn unmatched_resume_is_noop() {
    let mut k = kernel(SchedConfig::new());
    assert!(!k.resume_all());
    assert_eq!(k.suspension_depth(), 0);
}

#[test]
fn resume_below_running_priority_reports_no_switch() {
    let mut k = kernel(SchedConfig::new());
    k.start(noop).unwrap();
    let hi = task(&mut k, "hi", 6);
    let lo = task(&mut k, "lo", 2);
    k.request_switch();
    assert_eq!(k.get_current_task(), Some(hi));
    k.block(lo, WAIT_FOREVER).unwrap();

    k.suspend_all();
    assert!(!k.wake(lo).unwrap());
    assert!(!k.resume_all());
    assert_eq!(k.ready_at(2), vec![lo]);
}

/// Replay the same wake-ups with and without the gate closed.
fn wake_sequence(suspended: bool) -> Vec<Vec<usize>> {
    let mut k = kernel(SchedConfig::new().with_max_priorities(4));
    k.start(noop).unwrap();
    let names = ["w0", "w1", "w2", "w3", "w4"];
    let prios = [2, 1, 2, 3, 1];
    let hs: Vec<_> = names.into_iter().zip(prios).map(|(n, p)| task(&mut k, n, p)).collect();
    for (i, &h) in hs.iter().enumerate() {
        if i % 2 == 0 {
            k.block(h, WAIT_FOREVER).unwrap();
        } else {
            k.block(h, 3).unwrap();
        }
    }

    if suspended {
        k.suspend_all();
    }
    k.wake(hs[2]).unwrap();
    k.wake(hs[0]).unwrap();
    k.on_tick();
    k.on_tick();
    k.wake(hs[4]).unwrap();
    k.on_tick(); // w1 and w3 time out here
    if suspended {
        assert_eq!(k.ready_len(), 0, "nothing may become ready while suspended");
        k.resume_all();
    }

    (0..4)
        .map(|p| {
            k.ready_at(p)
                .iter()
                .map(|h| hs.iter().position(|x| x == h).map_or(99, |i| i))
                .collect()
        })
        .collect()
}

#[test]
fn suspension_only_delays_wakeups() {
    let direct = wake_sequence(false);
    let deferred = wake_sequence(true);
    assert_eq!(direct, deferred);
    assert_eq!(direct[2], vec![2, 0]);
}

#[test]
fn deleting_delayed_task_leaves_no_trace() {
    let mut k = kernel(SchedConfig::new());
    k.start(noop).unwrap();
    let t = task(&mut k, "doomed", 3);
    assert_eq!(k.request_switch(), Some(t));
    k.delay(4).unwrap();
    assert_eq!(k.next_unblock_tick(), Some(4));

    k.delete(t).unwrap();
    assert_eq!(k.delayed_len(), 0);
    assert_eq!(k.next_unblock_tick(), None);
    assert_eq!(k.get(t).err(), Some(SchedError::UnknownHandle));

    for _ in 0..6 {
        assert!(!k.on_tick());
    }
    assert_eq!(k.task_count(), 1);
    assert_membership_invariant(&k);
}

#[test]
fn deleting_pending_task_unlinks_it() {
    let mut k = kernel(SchedConfig::new());
    k.start(noop).unwrap();
    let t = task(&mut k, "pending", 3);
    assert_eq!(k.request_switch(), Some(t));
    k.delay(1).unwrap();
    k.suspend_all();
    k.on_tick();
    assert_eq!(k.pending_len(), 1);

    k.delete(t).unwrap();
    assert_eq!(k.pending_len(), 0);
    assert!(!k.resume_all());
    assert_membership_invariant(&k);
}

#[test]
fn stale_handle_rejected_everywhere() {
    let mut k = kernel(SchedConfig::new().with_max_tasks(2));
    k.start(noop).unwrap();
    let old = task(&mut k, "old", 1);
    k.delete(old).unwrap();
    let new = task(&mut k, "new", 1);
    assert_eq!(new.index(), old.index());

    assert_eq!(k.delete(old), Err(SchedError::UnknownHandle));
    assert_eq!(k.wake(old), Err(SchedError::UnknownHandle));
    assert_eq!(k.suspend(old), Err(SchedError::UnknownHandle));
    assert_eq!(k.set_priority(old, 2), Err(SchedError::UnknownHandle));
    assert_eq!(k.get(new).unwrap().name(), "new");
}

#[test]
fn create_rejects_invalid_priority() {
    let mut k = kernel(SchedConfig::new().with_max_priorities(4));
    let err = k.create(TaskParams::new("x", noop, 4));
    assert_eq!(err, Err(SchedError::InvalidPriority));
    assert_eq!(k.task_count(), 0);
}

#[test]
fn empty_scheduler_is_exhausted() {
    let mut k = kernel(SchedConfig::new());
    assert_eq!(k.select_next(), Err(SchedError::SchedulerExhausted));
}

#[test]
#[should_panic(expected = "scheduler halted")]
fn dispatching_nothing_halts() {
    let mut k = kernel(SchedConfig::new());
    k.request_switch();
}

#[test]
fn running_task_keeps_cpu_while_suspended() {
    let mut k = kernel(SchedConfig::new());
    let idle = k.start(noop).unwrap();
    let a = task(&mut k, "a", 2);
    assert_eq!(k.request_switch(), Some(a));
    let seen = switches().len();

    k.suspend_all();
    assert_eq!(k.delete(a), Err(SchedError::SchedulerSuspended));
    assert_eq!(k.suspend(a), Err(SchedError::SchedulerSuspended));
    assert_eq!(k.yield_now(), None);
    assert_eq!(k.get_current_task(), Some(a));
    assert_eq!(k.ready_at(0), vec![idle]);
    assert_eq!(switches().len(), seen);

    assert!(k.resume_all());
    k.delete(a).unwrap();
    assert_eq!(k.get_current_task(), Some(idle));
    assert_membership_invariant(&k);
}

#[test]
fn nothing_dispatched_while_suspended() {
    let mut k = kernel(SchedConfig::new());
    let a = task(&mut k, "a", 1);
    k.suspend_all();

    assert_eq!(k.select_next(), Err(SchedError::SchedulerSuspended));
    assert_eq!(k.request_switch(), None);
    assert_eq!(k.ready_at(1), vec![a]);
    assert_eq!(k.get_current_task(), None);
    assert!(switches().is_empty());

    assert!(k.resume_all());
    assert_eq!(k.request_switch(), Some(a));
}

#[test]
fn mutators_mask_interrupts_but_tick_does_not() {
    let mut k = kernel(SchedConfig::new());
    let before = MASK_ENTRIES.with(|c| c.get());
    let t = task(&mut k, "a", 1);
    k.suspend(t).unwrap();
    assert!(MASK_ENTRIES.with(|c| c.get()) > before);
    assert_eq!(MASK_DEPTH.with(|d| d.get()), 0);

    let before = MASK_ENTRIES.with(|c| c.get());
    for _ in 0..10 {
        k.on_tick();
    }
    assert_eq!(MASK_ENTRIES.with(|c| c.get()), before);
}

#[test]
fn switch_hook_sees_every_change() {
    let mut k = kernel(SchedConfig::new());
    let idle = k.start(noop).unwrap();
    let a = task(&mut k, "a", 2);
    assert_eq!(k.request_switch(), Some(a));
    assert_eq!(k.request_switch(), None);
    k.delay(1).unwrap();
    assert_eq!(switches(), vec![(None, idle), (Some(idle), a), (Some(a), idle)]);
}

#[test]
fn random_lifecycle_keeps_membership_invariant() {
    let mut k = kernel(SchedConfig::new().with_max_tasks(12).with_max_priorities(5));
    k.start(noop).unwrap();
    let mut live: Vec<TaskHandle> = Vec::new();
    let mut seed: u32 = 0x2545_f491;
    let mut next = || {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (seed >> 16) as usize
    };

    for _ in 0..2000 {
        let op = next() % 10;
        let pick = next();
        let target = if live.is_empty() { None } else { Some(live[pick % live.len()]) };
        match (op, target) {
            (0 | 1, _) => {
                let prio = (pick % 5) as u8;
                let params = TaskParams::new("r", noop, prio);
                let params = if pick % 3 == 0 { params.suspended() } else { params };
                if let Ok(h) = k.create(params) {
                    live.push(h);
                }
            }
            (2, Some(h)) => {
                if k.delete(h).is_ok() {
                    live.retain(|x| *x != h);
                }
            }
            (3, Some(h)) => {
                let _ = k.block(h, (pick % 7) as Tick);
            }
            (4, Some(h)) => {
                let _ = k.wake(h);
            }
            (5, Some(h)) => {
                let _ = k.suspend(h);
            }
            (6, Some(h)) => {
                let _ = k.resume(h);
            }
            (7, _) => {
                if pick % 2 == 0 {
                    k.suspend_all();
                } else {
                    k.resume_all();
                }
            }
            (8, Some(h)) => {
                let _ = k.set_priority(h, (pick % 5) as u8);
            }
            _ => {
                if k.on_tick() && k.suspension_depth() == 0 {
                    k.request_switch();
                }
            }
        }
        assert_membership_invariant(&k);
    }

    while k.suspension_depth() > 0 {
        k.resume_all();
    }
    assert_eq!(k.pending_len(), 0);
    assert_membership_invariant(&k);
}
