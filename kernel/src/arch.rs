//! The capability set a scheduler needs from its architecture port.
//!
//! Design note: rather than a table of function pointers populated at
//! runtime, this is a trait the port implements once for a single
//! zero-sized type; [`crate::Scheduler`] is generic over it, so every
//! call here monomorphizes away — there is no indirection on the hot
//! path (`clz`, the barriers behind `pendsv_trigger`).

/// One task's compile-time definition: entry point, its three opaque
/// arguments, priority, and stack size.
///
/// Consumed exactly once, by [`Arch::task_stack_init`], to synthesize the
/// task's initial saved context. Never read again afterward — from that
/// point on the task's state lives entirely in its primed stack and its
/// [`crate::TaskControl`].
#[derive(Clone, Copy)]
pub struct TaskInit {
    /// Task entry point. Takes three opaque arguments and never returns;
    /// a task that returns anyway lands in the architecture port's
    /// "loop forever" trap rather than in undefined behavior.
    pub entry: fn(usize, usize, usize) -> !,
    /// First argument delivered to `entry`.
    pub arg1: usize,
    /// Second argument delivered to `entry`.
    pub arg2: usize,
    /// Third argument delivered to `entry`.
    pub arg3: usize,
    /// Higher is more urgent. `0` is reserved for the idle task.
    pub priority: u32,
    /// Size in bytes of the stack region reserved for this task.
    pub stack_size: usize,
}

/// Initialization failure reported by an architecture driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchError {
    /// The tick source could not be programmed at the requested interval.
    TickSourceUnavailable,
}

/// Everything the scheduler needs from the underlying hardware.
///
/// Implemented once per target, by a single type the whole program
/// shares (the port crate's `Cortex`). Methods take no `self` — there is
/// no instance state, only hardware — so every call resolves statically.
pub trait Arch {
    /// Program the periodic tick at `interval_ms`, register `callback`
    /// to run from the tick ISR, and give the tick interrupt a priority
    /// strictly more urgent than the context-switch interrupt.
    fn tick_init(interval_ms: u32, callback: fn()) -> Result<(), ArchError>;

    /// Current value of the monotonic tick counter. Torn-read-free: a
    /// reader outside ISR context sees the same value it would see if
    /// every prior increment had fully landed.
    fn tick_get() -> u64;

    /// Configure the context-switch interrupt at a priority strictly
    /// below the tick interrupt, so the tick can always preempt it.
    fn pendsv_init();

    /// Request the context-switch interrupt to run at the next
    /// opportunity. Issues the memory and instruction barriers needed so
    /// the request is observed before this call returns.
    fn pendsv_trigger();

    /// Write a synthetic exception-return frame at the top of a fresh
    /// task's stack and return the resulting stack pointer, as if the
    /// task had just been saved by the context-switch ISR.
    fn task_stack_init(stack_top: *mut u32, init: &TaskInit) -> *mut u32;

    /// Count leading zeros of `word`; `32` when `word == 0`.
    fn clz(word: u32) -> u32;

    /// Crude, uncalibrated busy-wait of approximately `us` microseconds.
    /// Not part of the scheduling guarantees.
    fn busysleep(us: u32);
}
