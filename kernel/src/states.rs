//! The five task-state bitmasks.
//!
//! Each word is indexed by task; bit `31 - i` belongs to task `i`, so that
//! counting leading zeros on a word returns the lowest task index with a
//! bit set in it (see [`bit`]).

/// One bit per task in each of the five scheduler states.
///
/// `NEXT` and `EJECTED` are ephemeral staging states: `EJECTED` holds the
/// task the context-switch ISR just saved, until the next scheduler entry
/// reclassifies it into `PENDING` or `READY`; `NEXT` holds the task the
/// scheduler has chosen, until the context-switch ISR consumes it. Neither
/// is expected to be observed set outside of that narrow window.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskStates {
    /// Task selected to run next; consumed by the context-switch ISR.
    pub next: u32,
    /// Ready to run.
    pub ready: u32,
    /// Sleeping (or otherwise blocked) until a future tick.
    pub pending: u32,
    /// Currently executing. At most one bit set at any observable instant.
    pub running: u32,
    /// Just switched out by the context-switch ISR, not yet reclassified.
    pub ejected: u32,
}

/// Bit position for task `i`.
///
/// Deliberately MSB-first (bit `31 - i`, not bit `i`) so that a single
/// count-leading-zeros instruction on a state word returns the
/// lowest-numbered task with a bit set in it directly, with no further
/// arithmetic.
#[inline]
pub const fn bit(i: usize) -> u32 {
    1u32 << (31 - i)
}
