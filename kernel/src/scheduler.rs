//! State-transition logic invoked from the tick callback and from the
//! cooperative entry points ([`Scheduler::yield_now`], [`Scheduler::sleep`]).
//!
//! # State machine
//!
//! ```text
//! NEW     -> RUNNING (task 0 only, at start) or READY (everyone else)
//! RUNNING -> EJECTED  (by the context-switch ISR)
//! EJECTED -> READY    (wakeup_time == SENTINEL) or PENDING (otherwise)
//! READY   -> NEXT -> RUNNING
//! PENDING -> READY    (once `tick_get() > wakeup_time`)
//! ```
//!
//! `EJECTED` and `NEXT` only exist to hand a task off between the
//! context-switch ISR (which may only touch raw bitmasks) and the next
//! scheduler entry (which classifies by `wakeup_time` and priority);
//! neither should hold a set bit for longer than that.

use core::marker::PhantomData;

use crate::arch::{Arch, TaskInit};
use crate::error::Error;
use crate::states::{bit, TaskStates};
use crate::task::{TaskControl, SENTINEL_WAKEUP};

/// The scheduler algorithm, parameterized by the architecture capability
/// set `A`.
///
/// Carries no data of its own. All kernel state — the bitmasks, the task
/// table — is owned by the architecture port (which needs it at fixed,
/// `sym`-addressable locations for its naked context-switch ISR) and
/// threaded through every call explicitly. This keeps the algorithm
/// itself host-testable: a test can hand it plain stack-allocated
/// `TaskStates`/`[TaskControl]` values and a mock [`Arch`].
pub struct Scheduler<A>(PhantomData<A>);

impl<A: Arch> Scheduler<A> {
    /// Prime every task's stack and mark task 0 RUNNING, everyone else
    /// READY.
    ///
    /// Does *not* start the tick or context-switch interrupt sources, and
    /// does not invoke `task_inits[0].entry` — both are the architecture
    /// port's responsibility, since only it knows how to wire up its own
    /// tick trampoline and how to make the initial divergent call into
    /// task 0 (which, per the state machine above, keeps running on
    /// whatever stack `start` itself was called on until its first
    /// preemption; the ISR then saves it into the sub-region primed here,
    /// like every other task).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyTasks`] if `task_inits.len()` exceeds
    /// [`crate::MAX_NUM_TASKS`], leaving `states` and `tasks` untouched.
    ///
    /// # Panics
    ///
    /// If called while a task is already RUNNING.
    pub fn start(
        states: &mut TaskStates,
        tasks: &mut [TaskControl],
        task_inits: &[TaskInit],
        stack_tops: &[*mut u32],
    ) -> Result<(), Error> {
        assert_eq!(states.running, 0, "scheduler already started");
        debug_assert_eq!(task_inits.len(), tasks.len());
        debug_assert_eq!(task_inits.len(), stack_tops.len());

        if task_inits.len() > crate::MAX_NUM_TASKS {
            return Err(Error::TooManyTasks);
        }

        for i in 0..task_inits.len() {
            let sp = A::task_stack_init(stack_tops[i], &task_inits[i]);
            tasks[i] = TaskControl {
                sp,
                prio: task_inits[i].priority,
                wakeup_time: SENTINEL_WAKEUP,
            };

            if i == 0 {
                states.running |= bit(i);
            } else {
                states.ready |= bit(i);
            }
        }

        Ok(())
    }

    /// Run the scheduler: reclassify the previously-ejected task, wake
    /// any PENDING tasks whose timer has expired, and arbitrate for a
    /// new RUNNING task if one woke.
    ///
    /// Invoked from the tick callback every tick, and implicitly from
    /// [`Scheduler::yield_now`]/[`Scheduler::sleep`].
    pub fn schedule(states: &mut TaskStates, tasks: &mut [TaskControl]) {
        Self::reclassify_ejected(states, tasks);

        if states.pending == 0 {
            return;
        }

        let original_pending = states.pending;
        let ticks = A::tick_get();

        let mut scan = states.pending;
        while scan != 0 {
            let t = A::clz(scan) as usize;
            if ticks > tasks[t].wakeup_time {
                tasks[t].wakeup_time = SENTINEL_WAKEUP;
                states.pending &= !bit(t);
                states.ready |= bit(t);
            }
            scan &= !bit(t);
        }

        // Only re-arbitrate if something actually woke up; a task of
        // lower priority than the one RUNNING otherwise waits for a
        // cooperative yield (see the design note in the crate root).
        if states.pending == original_pending {
            return;
        }

        let curr = A::clz(states.running) as usize;
        let curr_prio = tasks[curr].prio;
        let mut selected = curr;
        let mut candidates = states.ready;

        while candidates != 0 {
            let next = A::clz(candidates) as usize;
            if tasks[next].prio >= curr_prio {
                selected = next;
                break;
            }
            candidates &= !bit(next);
        }

        if selected != curr {
            states.next = bit(selected);
            states.ready &= !bit(selected);
            A::pendsv_trigger();
        }
    }

    /// Cooperatively relinquish the CPU if a same-or-higher-priority
    /// peer is READY.
    pub fn yield_now(states: &mut TaskStates, tasks: &mut [TaskControl]) {
        Self::reclassify_ejected(states, tasks);

        let mut candidates = states.ready;
        if candidates == 0 {
            return;
        }

        let curr = A::clz(states.running) as usize;
        let curr_prio = tasks[curr].prio;
        let mut next = curr;

        while candidates != 0 {
            let candidate = A::clz(candidates) as usize;
            if tasks[candidate].prio >= curr_prio {
                next = candidate;
                break;
            }
            candidates &= !bit(candidate);
        }

        if next == curr {
            if tasks[curr].wakeup_time == SENTINEL_WAKEUP {
                // No candidate, and we're not sleeping: just return.
                return;
            }

            // Called from `sleep`: the caller must leave the CPU even
            // though nothing outranks it. READY is never empty — the
            // idle task is always in it — but a hardened build checks.
            debug_assert_ne!(states.ready, 0, "idle task must always be READY");
            next = A::clz(states.ready) as usize;
        }

        states.next = bit(next);
        states.ready &= !bit(next);
        A::pendsv_trigger();
    }

    /// Record a wakeup time `ms` ticks from now on the RUNNING task, then
    /// yield. `yield_now`'s fallback path (above) is what actually moves
    /// the caller off-CPU: once ejected, `schedule`'s prelude will find
    /// its `wakeup_time` set and reclassify it into PENDING.
    pub fn sleep(states: &mut TaskStates, tasks: &mut [TaskControl], ms: u64) {
        let curr = A::clz(states.running) as usize;
        tasks[curr].wakeup_time = A::tick_get() + ms;
        Self::yield_now(states, tasks);
    }

    fn reclassify_ejected(states: &mut TaskStates, tasks: &[TaskControl]) {
        if states.ejected == 0 {
            return;
        }

        let t = A::clz(states.ejected) as usize;
        if tasks[t].wakeup_time != SENTINEL_WAKEUP {
            states.pending |= states.ejected;
        } else {
            states.ready |= states.ejected;
        }
        states.ejected = 0;
    }
}


#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use std::vec::Vec;

    static TICK: AtomicU64 = AtomicU64::new(0);
    static PENDSV_PENDING: AtomicU32 = AtomicU32::new(0);

    struct MockArch;

    impl Arch for MockArch {
        fn tick_init(_interval_ms: u32, _callback: fn()) -> Result<(), crate::ArchError> {
            Ok(())
        }

        fn tick_get() -> u64 {
            TICK.load(Ordering::SeqCst)
        }

        fn pendsv_init() {}

        fn pendsv_trigger() {
            PENDSV_PENDING.fetch_add(1, Ordering::SeqCst);
        }

        fn task_stack_init(stack_top: *mut u32, _init: &TaskInit) -> *mut u32 {
            stack_top
        }

        fn clz(word: u32) -> u32 {
            word.leading_zeros()
        }

        fn busysleep(_us: u32) {}
    }

    type Sched = Scheduler<MockArch>;

    fn dummy_entry(_a: usize, _b: usize, _c: usize) -> ! {
        loop {}
    }

    fn pendsv_fired() -> bool {
        PENDSV_PENDING.swap(0, Ordering::SeqCst) != 0
    }

    /// A harness owning one scheduler's worth of state, built from a
    /// list of task priorities (lowest-priority entry is treated as
    /// idle by convention, same as the macro-generated task list).
    struct Harness {
        states: TaskStates,
        tasks: Vec<TaskControl>,
    }

    impl Harness {
        fn new(priorities: &[u32]) -> Self {
            TICK.store(0, Ordering::SeqCst);
            PENDSV_PENDING.store(0, Ordering::SeqCst);

            let inits: Vec<TaskInit> = priorities
                .iter()
                .map(|&priority| TaskInit {
                    entry: dummy_entry,
                    arg1: 0,
                    arg2: 0,
                    arg3: 0,
                    priority,
                    stack_size: 0x100,
                })
                .collect();
            let tops: Vec<*mut u32> = (0..inits.len())
                .map(|i| (0x1000 * (i as u32 + 1)) as *mut u32)
                .collect();
            let mut tasks: Vec<TaskControl> = std::vec![TaskControl::EMPTY; inits.len()];
            let mut states = TaskStates::default();

            Sched::start(&mut states, &mut tasks, &inits, &tops).unwrap();

            Harness { states, tasks }
        }

        fn sleep(&mut self, task: usize, ms: u64) {
            assert_eq!(self.states.running, bit(task), "task {task} is not RUNNING");
            Sched::sleep(&mut self.states, &mut self.tasks, ms);
        }

        fn yield_now(&mut self) {
            Sched::yield_now(&mut self.states, &mut self.tasks);
        }

        fn tick(&mut self, n: u64) {
            for _ in 0..n {
                TICK.fetch_add(1, Ordering::SeqCst);
                Sched::schedule(&mut self.states, &mut self.tasks);
            }
        }

        /// Simulate the bitmask half of the context-switch ISR (the raw
        /// stack save/restore is architecture-port territory and is
        /// exercised by the port crate's own tests).
        fn context_switch(&mut self) {
            assert_ne!(self.states.next, 0, "no context switch pending");
            self.states.ejected = self.states.running;
            self.states.running = self.states.next;
            self.states.next = 0;
        }

        fn running(&self) -> usize {
            self.states.running.leading_zeros() as usize
        }
    }

    #[test]
    fn start_marks_task_zero_running_and_rest_ready() {
        let h = Harness::new(&[1, 1, 0]);
        assert_eq!(h.states.running, bit(0));
        assert_eq!(h.states.ready, bit(1) | bit(2));
        assert_eq!(h.states.pending, 0);
    }

    #[test]
    fn sleep_ejects_current_task_and_switches_to_idle() {
        // One real task (prio 1) plus idle (prio 0): Scenario A/D.
        let mut h = Harness::new(&[1, 0]);

        h.sleep(0, 100);
        assert!(pendsv_fired(), "sleep of the only runnable task must switch to idle");
        assert_eq!(h.states.next, bit(1));
        h.context_switch();
        assert_eq!(h.running(), 1);

        // Not yet time to wake: idle keeps running.
        h.tick(100);
        assert!(!pendsv_fired());
        assert_eq!(h.running(), 1);

        // One more tick crosses `ticks > wakeup_time` (strict inequality).
        h.tick(1);
        assert!(pendsv_fired(), "task 0 should preempt idle once its timer expires");
        assert_eq!(h.states.next, bit(0));
    }

    #[test]
    fn equal_priority_round_robin_via_yield() {
        // Scenario B: two equal-priority tasks (0 and 1) plus idle.
        let mut h = Harness::new(&[1, 1, 0]);
        let mut log = [0usize; 10];

        for slot in log.iter_mut() {
            *slot = h.running();
            h.yield_now();
            assert!(pendsv_fired());
            h.context_switch();
        }

        assert_eq!(log, [0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn lower_priority_wake_only_preempts_via_forced_handoff() {
        // Scenario C: task 0 (prio 2) is running; task 1 (prio 1) is
        // sleeping and wakes via the tick. A lower-priority wake never
        // wins ordinary arbitration or a bare yield; only task 0 itself
        // blocking (sleeping) forces the handoff.
        let mut h = Harness::new(&[2, 1, 0]);

        h.tasks[1].wakeup_time = 5;
        h.states.ready &= !bit(1);
        h.states.pending |= bit(1);

        h.tick(6); // ticks(6) > wakeup_time(5): task 1 becomes READY
        assert!(!pendsv_fired(), "a lower-priority wake must not preempt the running task");
        assert_eq!(h.states.ready, bit(1) | bit(2), "woken task becomes READY, not RUNNING");

        h.yield_now();
        assert!(!pendsv_fired(), "a bare yield never hands off to a strictly lower priority");

        h.sleep(0, 1_000); // task 0 voluntarily blocks
        assert!(pendsv_fired(), "task 0 blocking forces a handoff regardless of priority");
        assert_eq!(h.states.next, bit(1), "forced handoff picks the highest-priority-position READY task");
    }

    #[test]
    fn clz_matches_bit_encoding() {
        for i in 0..32usize {
            assert_eq!(MockArch::clz(bit(i)), i as u32);
        }
    }

    #[test]
    fn schedule_is_idempotent_with_nothing_pending_or_ejected() {
        let mut h = Harness::new(&[1, 0]);
        let before = h.states;

        h.tick(3);

        assert_eq!(before.ready, h.states.ready);
        assert_eq!(before.running, h.states.running);
        assert_eq!(before.pending, h.states.pending);
        assert_eq!(before.next, h.states.next);
    }

    #[test]
    fn too_many_tasks_is_rejected_without_mutating_state() {
        let priorities = [1u32; crate::MAX_NUM_TASKS + 1];
        let inits: Vec<TaskInit> = priorities
            .iter()
            .map(|&priority| TaskInit {
                entry: dummy_entry,
                arg1: 0,
                arg2: 0,
                arg3: 0,
                priority,
                stack_size: 0x100,
            })
            .collect();
        let tops: Vec<*mut u32> = (0..inits.len()).map(|_| core::ptr::null_mut()).collect();
        let mut tasks = std::vec![TaskControl::EMPTY; inits.len()];
        let mut states = TaskStates::default();

        let result = Sched::start(&mut states, &mut tasks, &inits, &tops);

        assert_eq!(result, Err(Error::TooManyTasks));
        assert_eq!(states.running, 0);
    }
}
