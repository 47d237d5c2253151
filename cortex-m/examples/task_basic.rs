//! Two periodic tasks, with Task 1 running twice as often as Task 0. The tasks
//! share one "template" for code, with an argument to parametrize them.

#![no_std]
#![no_main]

mod common;

use corvid_cortex_m33 as corvid;
use defmt::info;

const TICKS_PER_SECOND: u64 = 1000;

fn task_template(period_s: usize, _arg2: usize, _arg3: usize) -> ! {
    let period_ticks = period_s as u64 * TICKS_PER_SECOND;
    assert!(period_ticks > 0);

    loop {
        info!("Hello from Task {}", corvid::current_task());
        corvid::sleep(period_ticks);
    }
}

#[cortex_m_rt::entry]
fn main() -> ! {
    let resources = common::setup();

    info!("Initializing");
    let (tasks, stack_tops) = corvid::tasks_init!(tasks = [
        corvid::task_define!(task_template, 2usize, 0usize, 0usize, 1),
        corvid::task_define!(task_template, 1usize, 0usize, 0usize, 2),
    ]);

    info!("Starting");
    corvid::scheduler_start(tasks, &stack_tops, resources.clocks.hclk().to_Hz())
        .unwrap_or_else(|_| loop {});
}
