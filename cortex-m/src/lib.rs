//! Cortex-M33 architecture port: tick/PendSV wiring, the naked
//! context-switch interrupt, stack priming, and the task-definition
//! macros (in [`macros`]).
//!
//! Everything in here exists to implement [`corvid_kernel::Arch`] for
//! [`Cortex`] and to get a task's first instruction fetched; the
//! scheduling algorithm itself lives in `corvid-kernel` and never
//! appears below.

#![no_std]
#![feature(naked_functions)]

mod macros;

use core::arch::asm;
use core::ptr::write_volatile;

use cortex_m::interrupt::free;
use cortex_m::peripheral::SCB;

use corvid_kernel::{Arch, ArchError, Scheduler, TaskControl, TaskStates};

pub use corvid_kernel::{Error, MAX_NUM_TASKS, TaskInit};

/// Per-task stack size (all tasks but idle), in bytes. Matches the C
/// original's `TASK_STACK_SIZE` default.
pub const TASK_STACK_SIZE: usize = 0x400;

/// Idle task stack size, in bytes. Matches the C original's
/// `IDLE_STACK_SIZE` default.
pub const IDLE_STACK_SIZE: usize = 0x100;

/// Debug canary written above a freshly primed stack frame. Never read
/// by the scheduler; visible only to a debugger inspecting memory.
const SENTINEL: u32 = 0xDEAD_BEEF;

const SCS_BASE: u32 = 0xE000_E000;
const SYST_CSR: *mut u32 = (SCS_BASE + 0x10) as *mut u32;
const SYST_RVR: *mut u32 = (SCS_BASE + 0x14) as *mut u32;
const SYST_CVR: *mut u32 = (SCS_BASE + 0x18) as *mut u32;
const NVIC_SHPR3: *mut u32 = (SCS_BASE + 0xD20) as *mut u32;

const SYSTICK_PRIO_MASK: u32 = 0xFF << 24;
const PENDSV_PRIO_MASK: u32 = 0xFF << 16;
const SYSTICK_PRIO: u32 = 0xC0 << 24;
const PENDSV_PRIO: u32 = 0xD0 << 16;

static mut TASK_STATES: TaskStates = TaskStates {
    next: 0,
    ready: 0,
    pending: 0,
    running: 0,
    ejected: 0,
};

static mut TASK_TABLE: [TaskControl; MAX_NUM_TASKS] = [TaskControl::EMPTY; MAX_NUM_TASKS];

static mut TICK: u64 = 0;
static mut TICK_CALLBACK: Option<fn()> = None;
static mut CLOCK_HZ: u32 = 0;

/// The single [`Arch`] implementation this port provides. Carries no
/// state of its own; every method either touches a fixed hardware
/// register or one of the module statics above.
pub struct Cortex;

impl Cortex {
    fn configure_clock(hz: u32) {
        unsafe { CLOCK_HZ = hz };
    }
}

impl Arch for Cortex {
    fn tick_init(interval_ms: u32, callback: fn()) -> Result<(), ArchError> {
        let clock_hz = unsafe { CLOCK_HZ };
        if clock_hz == 0 || interval_ms == 0 {
            return Err(ArchError::TickSourceUnavailable);
        }

        let reload = (clock_hz as u64 / 1000) * interval_ms as u64;
        if reload == 0 || reload > (1 << 24) {
            return Err(ArchError::TickSourceUnavailable);
        }

        free(|_| unsafe {
            TICK_CALLBACK = Some(callback);

            write_volatile(SYST_RVR, (reload - 1) as u32);
            write_volatile(SYST_CVR, 0);

            let mut shpr3 = core::ptr::read_volatile(NVIC_SHPR3);
            shpr3 &= !SYSTICK_PRIO_MASK;
            shpr3 |= SYSTICK_PRIO;
            write_volatile(NVIC_SHPR3, shpr3);

            // CLKSOURCE | TICKINT | ENABLE
            write_volatile(SYST_CSR, 0x7);
        });

        Ok(())
    }

    fn tick_get() -> u64 {
        free(|_| unsafe { TICK })
    }

    fn pendsv_init() {
        unsafe {
            let mut shpr3 = core::ptr::read_volatile(NVIC_SHPR3);
            shpr3 &= !PENDSV_PRIO_MASK;
            shpr3 |= PENDSV_PRIO;
            write_volatile(NVIC_SHPR3, shpr3);
        }
    }

    fn pendsv_trigger() {
        SCB::set_pendsv();
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    fn task_stack_init(stack_top: *mut u32, init: &TaskInit) -> *mut u32 {
        unsafe {
            let mut sp = stack_top;

            macro_rules! push {
                ($value:expr) => {{
                    sp = sp.sub(1);
                    write_volatile(sp, $value);
                }};
            }

            push!(SENTINEL);
            push!(SENTINEL);
            push!(0x0100_0000); // xPSR, Thumb bit set
            push!(init.entry as usize as u32); // PC
            push!(task_trap as usize as u32); // LR
            push!(0x0C); // R12, scratch
            push!(0x03); // R3, scratch
            push!(init.arg3 as u32); // R2
            push!(init.arg2 as u32); // R1
            push!(init.arg1 as u32); // R0
            for r in (4..=11u32).rev() {
                push!(r);
            }

            sp
        }
    }

    fn clz(word: u32) -> u32 {
        word.leading_zeros()
    }

    fn busysleep(us: u32) {
        for _ in 0..us {
            for _ in 0..0x10u32 {
                cortex_m::asm::nop();
            }
        }
    }
}

/// Default idle task. Runs whenever no other task is READY; overridden by
/// passing `idle = ...` to [`tasks_init`](crate::tasks_init).
///
/// Release builds simply halt the core until the next interrupt. With the
/// `defmt` feature enabled (the `OS_DEBUG` analogue, see the crate docs),
/// it instead traces, busy-waits briefly and yields, matching the C
/// original's `OS_DEBUG`-gated idle body.
#[cfg(not(feature = "defmt"))]
pub fn idle_task(_a1: usize, _a2: usize, _a3: usize) -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

#[cfg(feature = "defmt")]
pub fn idle_task(_a1: usize, _a2: usize, _a3: usize) -> ! {
    loop {
        defmt::trace!("idle");
        Cortex::busysleep(100);
        yield_task();
    }
}

/// Installed as the LR of every freshly primed task frame. A task
/// function is declared `-> !`; landing here means one returned anyway.
fn task_trap() -> ! {
    loop {}
}

/// Run from the tick ISR. Re-evaluates readiness and, if the decision
/// changed which task is RUNNING, requests a context switch.
fn scheduler_tick() {
    #[cfg(feature = "defmt")]
    let before = unsafe { TASK_STATES.running };

    unsafe {
        Scheduler::<Cortex>::schedule(&mut TASK_STATES, &mut TASK_TABLE);
    }

    #[cfg(feature = "defmt")]
    {
        let after = unsafe { TASK_STATES.next };
        if after != 0 && after != before {
            defmt::trace!("tick: preempting running task for {=u32:b32}", after);
        }
    }
}

/// Partition a `'static` byte region into per-task initial stack-top
/// pointers, per [`TaskInit::stack_size`]: the first `N - 1` tasks get
/// `TASK_STACK_SIZE` bytes each, the last (idle) gets `IDLE_STACK_SIZE`;
/// each task's initial stack pointer is the highest address of its own
/// sub-region. Used by [`tasks_init`](crate::tasks_init).
pub fn task_stack_tops<const N: usize>(
    tasks: &[TaskInit; N],
    region: &'static mut [u8],
) -> [*mut u32; N] {
    let mut tops = [core::ptr::null_mut(); N];
    let mut offset = 0usize;

    for (i, task) in tasks.iter().enumerate() {
        offset += task.stack_size;
        debug_assert!(offset <= region.len(), "task stack region too small");
        tops[i] = unsafe { region.as_mut_ptr().add(offset) as *mut u32 };
    }

    tops
}

/// Prime every task's stack, wire up the tick and context-switch
/// interrupts, and fall directly into `task_inits[0]` on the caller's
/// own stack (the bootstrap convention spec'd for task 0: it keeps
/// running here, on whatever stack called `scheduler_start`, until its
/// first preemption hands it a primed stack of its own like every other
/// task).
///
/// Never actually returns `Ok`: either it diverges into `task_inits[0]`,
/// or it returns `Err` having touched no hardware. The return type is
/// `Result<Infallible, Error>` rather than `Result<!, Error>` because the
/// never type is not yet stable as a type argument outside of bare
/// return-type position.
///
/// # Errors
///
/// Returns `Err` without touching any hardware if `task_inits.len()`
/// exceeds [`MAX_NUM_TASKS`]; the caller should log and loop forever,
/// matching the C original's behavior for this condition.
pub fn scheduler_start(
    task_inits: &'static [TaskInit],
    stack_tops: &[*mut u32],
    clock_freq_hz: u32,
) -> Result<core::convert::Infallible, Error> {
    if task_inits.len() > MAX_NUM_TASKS {
        return Err(Error::TooManyTasks);
    }

    Cortex::configure_clock(clock_freq_hz);

    unsafe {
        Scheduler::<Cortex>::start(
            &mut TASK_STATES,
            &mut TASK_TABLE[..task_inits.len()],
            task_inits,
            stack_tops,
        )?;
    }

    #[cfg(feature = "defmt")]
    defmt::trace!("scheduler start: {} tasks", task_inits.len());

    Cortex::pendsv_init();
    Cortex::tick_init(1, scheduler_tick).expect("failed to configure the tick source");

    cortex_m::asm::dsb();
    cortex_m::asm::isb();

    let first = &task_inits[0];
    (first.entry)(first.arg1, first.arg2, first.arg3)
}

/// Voluntarily relinquish the CPU to a same-or-higher-priority READY
/// task, if one exists.
pub fn yield_task() {
    #[cfg(feature = "defmt")]
    let from = unsafe { TASK_STATES.running };

    free(|_| unsafe {
        Scheduler::<Cortex>::yield_now(&mut TASK_STATES, &mut TASK_TABLE);
    });

    #[cfg(feature = "defmt")]
    defmt::trace!("yield from {=u32:b32}", from);
}

/// Sleep the calling task for `ms` milliseconds, then yield.
pub fn sleep(ms: u64) {
    #[cfg(feature = "defmt")]
    let from = unsafe { TASK_STATES.running };
    #[cfg(feature = "defmt")]
    defmt::trace!("sleep {} ms from {=u32:b32}", ms, from);

    free(|_| unsafe {
        Scheduler::<Cortex>::sleep(&mut TASK_STATES, &mut TASK_TABLE, ms);
    });
}

/// Index of the currently RUNNING task.
pub fn current_task() -> usize {
    unsafe { Cortex::clz(TASK_STATES.running) as usize }
}

/// Current value of the monotonic tick counter.
pub fn current_tick() -> u64 {
    Cortex::tick_get()
}

/// Context-switch interrupt. Saves the outgoing task's callee-saved
/// registers to its own stack (the CPU already saved R0-R3, R12, LR,
/// PC, xPSR on exception entry), swaps `RUNNING` for `NEXT` via the
/// task-state bitmasks, and restores the incoming task's registers
/// before returning from exception into its context.
///
/// Runs entirely on the main stack (MSP); this port does not use PSP,
/// matching the bootstrap convention in [`scheduler_start`] where task
/// 0 begins life on the caller's own stack rather than a primed one.
#[naked]
#[no_mangle]
pub extern "C" fn PendSV() {
    unsafe {
        asm!(
            "mrs    r0, msp",
            "mov    r1, lr",
            "stmdb  r0!, {{r4-r11}}",
            "movs   r6, #0",
            "ldr    r2, ={states}",
            "ldr    r5, [r2, #{running}]",
            "str    r5, [r2, #{ejected}]",
            "str    r6, [r2, #{running}]",
            "clz    r5, r5",
            "ldr    r3, ={tasks}",
            "movs   r4, #{task_size}",
            "mul    r5, r4",
            "str    r0, [r3, r5]",
            "cpsid  i",
            "ldr    r5, [r2, #{next}]",
            "str    r5, [r2, #{running}]",
            "str    r6, [r2, #{next}]",
            "cpsie  i",
            "clz    r5, r5",
            "mul    r5, r4",
            "ldr    r0, [r3, r5]",
            "ldmia  r0!, {{r4-r11}}",
            "msr    msp, r0",
            "bx     r1",
            states = sym TASK_STATES,
            tasks = sym TASK_TABLE,
            running = const core::mem::offset_of!(TaskStates, running),
            ejected = const core::mem::offset_of!(TaskStates, ejected),
            next = const core::mem::offset_of!(TaskStates, next),
            task_size = const core::mem::size_of::<TaskControl>(),
            options(noreturn),
        );
    }
}

/// `SysTick` interrupt: advances the monotonic tick counter and, once
/// the scheduler has been started, runs it.
#[no_mangle]
pub extern "C" fn SysTick() {
    free(|_| unsafe {
        TICK += 1;
        if TICK_CALLBACK.is_some() {
            scheduler_tick();
        }
    });
}
