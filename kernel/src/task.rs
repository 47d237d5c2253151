//! A single task's scheduler-owned state.

/// Sentinel `wakeup_time` meaning "not sleeping".
pub const SENTINEL_WAKEUP: u64 = u64::MAX;

/// The scheduler-owned half of a task's record: the part read and
/// written on every tick.
///
/// The task's entry point, arguments and stack size are not kept here —
/// they live in the architecture port's [`crate::TaskInit`] and are
/// consumed exactly once, by stack priming, before the scheduler ever
/// touches a [`TaskControl`].
///
/// `sp` must stay the first field: the context-switch ISR computes
/// `&TASK_TABLE[i]` and stores/loads through it assuming offset 0, in
/// raw assembly that cannot see field reordering.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TaskControl {
    /// Saved stack pointer; meaningful only while the task is not RUNNING.
    pub sp: *mut u32,
    /// Immutable priority. Higher is more urgent; `0` is reserved for idle.
    pub prio: u32,
    /// Tick at which a sleeping task becomes READY, or [`SENTINEL_WAKEUP`]
    /// for a task that is not sleeping.
    pub wakeup_time: u64,
}

impl TaskControl {
    /// Placeholder record with no stack assigned; every slot is
    /// overwritten by [`crate::Scheduler::start`] before use.
    pub const EMPTY: Self = Self {
        sp: core::ptr::null_mut(),
        prio: 0,
        wakeup_time: SENTINEL_WAKEUP,
    };
}

const _: () = assert!(core::mem::offset_of!(TaskControl, sp) == 0);
