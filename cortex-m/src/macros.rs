//! `task_define!`/`tasks_init!`: the compile-time analogue of the C
//! original's `OS_TASK_DEFINE`/`OS_TASKS_INIT`.

/// Build one [`TaskInit`](crate::TaskInit) literal for a task running at
/// `entry(arg1, arg2, arg3)` with the given priority.
///
/// ```ignore
/// task_define!(my_task, 1usize, 0usize, 0usize, 2)
/// ```
#[macro_export]
macro_rules! task_define {
    ($entry:expr, $arg1:expr, $arg2:expr, $arg3:expr, $priority:expr) => {
        $crate::TaskInit {
            entry: $entry,
            arg1: $arg1 as usize,
            arg2: $arg2 as usize,
            arg3: $arg3 as usize,
            priority: $priority,
            stack_size: $crate::TASK_STACK_SIZE,
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __corvid_count {
    () => {
        0usize
    };
    ($head:expr $(, $tail:expr)* $(,)?) => {
        1usize + $crate::__corvid_count!($($tail),*)
    };
}

/// Build the fixed task list (each defined with [`task_define!`]) plus an
/// appended idle task, and the `.task_stacks` region that backs all of
/// them.
///
/// Expands to a `(&'static [TaskInit], [*mut u32; N])` pair ready to hand
/// to [`scheduler_start`](crate::scheduler_start).
///
/// ```ignore
/// let (tasks, stack_tops) = tasks_init!(tasks = [
///     task_define!(producer, 0usize, 0usize, 0usize, 2),
///     task_define!(consumer, 0usize, 0usize, 0usize, 1),
/// ]);
/// ```
///
/// An `idle = <path>` argument overrides the default
/// [`idle_task`](crate::idle_task) — the macro-time substitute for the
/// weak-linkage default the C original gets from the compiler.
#[macro_export]
macro_rules! tasks_init {
    (tasks = [$($task:expr),+ $(,)?] $(, idle = $idle:expr)? $(,)?) => {{
        const TASK_COUNT: usize = $crate::__corvid_count!($($task),+) + 1;
        const _: () = assert!(
            TASK_COUNT <= $crate::MAX_NUM_TASKS,
            "task count (including the implicit idle task) exceeds MAX_NUM_TASKS"
        );
        const STACK_REGION_SIZE: usize =
            (TASK_COUNT - 1) * $crate::TASK_STACK_SIZE + $crate::IDLE_STACK_SIZE;

        static TASKS: [$crate::TaskInit; TASK_COUNT] = [
            $($task,)+
            $crate::TaskInit {
                entry: $crate::tasks_init!(@idle $($idle)?),
                arg1: 0,
                arg2: 0,
                arg3: 0,
                priority: 0,
                stack_size: $crate::IDLE_STACK_SIZE,
            },
        ];

        #[link_section = ".task_stacks"]
        static mut TASK_STACKS: [u8; STACK_REGION_SIZE] = [0; STACK_REGION_SIZE];

        let stack_tops = $crate::task_stack_tops(&TASKS, unsafe { &mut TASK_STACKS });
        (&TASKS[..], stack_tops)
    }};
    (@idle) => {
        $crate::idle_task
    };
    (@idle $idle:expr) => {
        $idle
    };
}
