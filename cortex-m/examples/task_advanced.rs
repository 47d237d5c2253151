//! A low-priority task busy-spins and yields every iteration, logging its
//! own label. A higher-priority task sleeps 500ms at a time and logs once
//! on each wake. Because `L`'s priority never outranks `H`, `H`'s wake is
//! never delayed behind a bare yield from `L` — it preempts as soon as its
//! timer expires on the next tick.

#![no_std]
#![no_main]

mod common;

use corvid_cortex_m33 as corvid;
use defmt::info;

fn low_priority_spinner(_a1: usize, _a2: usize, _a3: usize) -> ! {
    loop {
        info!("L");
        corvid::yield_task();
    }
}

fn high_priority_waker(_a1: usize, _a2: usize, _a3: usize) -> ! {
    loop {
        corvid::sleep(500);
        info!("H woke at tick {}", corvid::current_tick());
    }
}

#[cortex_m_rt::entry]
fn main() -> ! {
    let resources = common::setup();

    info!("Initializing");
    let (tasks, stack_tops) = corvid::tasks_init!(tasks = [
        corvid::task_define!(low_priority_spinner, 0usize, 0usize, 0usize, 1),
        corvid::task_define!(high_priority_waker, 0usize, 0usize, 0usize, 2),
    ]);

    info!("Starting");
    corvid::scheduler_start(tasks, &stack_tops, resources.clocks.hclk().to_Hz())
        .unwrap_or_else(|_| loop {});
}
