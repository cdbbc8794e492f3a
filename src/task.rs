//! # Task Control Block
//!
//! Per-task bookkeeping. Control blocks live in a fixed arena owned by the
//! kernel; a [`TaskId`] is an index into that arena and is the only handle
//! that ever crosses the API boundary. The doubly linked list fields make
//! each block a member of exactly one list at rest: ready, delayed, or the
//! pending list of one semaphore or queue.

/// Entry point signature for a task. Tasks never return; a task that has
/// nothing left to do delays itself or pends forever.
pub type TaskEntry = extern "C" fn() -> !;

/// Serial number of the idle task, always the first task created.
pub const IDLE_TASK_ID: i32 = 0;

/// Serial number of the bootstrap placeholder installed by `init`. It is
/// never on any list and never runs; it exists so the first scheduling
/// decision always sees a mismatch and dispatches.
pub const BOOTSTRAP_TASK_ID: i32 = -1;

/// Handle to a task: its slot in the kernel's control-block arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(pub(crate) usize);

/// One task's control block.
///
/// `delay_ticks` is meaningful only while the task is on the delayed list,
/// where it stores the delay *delta* relative to the preceding entry; the
/// head's delta is its own absolute remaining time.
pub struct TaskControlBlock {
    /// Saved stack pointer, updated by the dispatcher on every switch.
    pub(crate) stack_pointer: *mut usize,
    /// One past the highest word of the task's stack region. Stacks grow
    /// downward from here. Kept for inspection only.
    pub(crate) stack_base: *mut usize,
    /// Monotonic serial number; 0 is idle, -1 the bootstrap placeholder.
    pub(crate) task_id: i32,
    /// Delta delay while on the delayed list.
    pub(crate) delay_ticks: u32,
    /// Scheduling priority, smaller runs first. Unique among live tasks.
    pub(crate) priority: u8,
    /// List links into the arena.
    pub(crate) prev: Option<TaskId>,
    pub(crate) next: Option<TaskId>,
}

// Safety: the raw pointers refer to the task's own stack region, and all
// access to control blocks happens inside kernel critical sections.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// An unallocated slot, used to initialize the arena.
    pub(crate) const EMPTY: Self = Self {
        stack_pointer: core::ptr::null_mut(),
        stack_base: core::ptr::null_mut(),
        task_id: BOOTSTRAP_TASK_ID,
        delay_ticks: 0,
        priority: 0,
        prev: None,
        next: None,
    };

    /// The task's serial number.
    #[inline]
    pub fn task_id(&self) -> i32 {
        self.task_id
    }

    /// The task's priority.
    #[inline]
    pub fn priority(&self) -> u8 {
        self.priority
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot_is_unlinked() {
        let tcb = TaskControlBlock::EMPTY;
        assert!(tcb.stack_pointer.is_null());
        assert_eq!(tcb.task_id(), BOOTSTRAP_TASK_ID);
        assert_eq!(tcb.prev, None);
        assert_eq!(tcb.next, None);
    }

    #[test]
    fn test_task_id_is_an_index() {
        let a = TaskId(3);
        let b = TaskId(3);
        let c = TaskId(4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
