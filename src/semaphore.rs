//! # Counting Semaphores
//!
//! A semaphore's `value` tracks credits: it always equals the initial
//! value plus posts minus pends. A pend with no credit available blocks
//! the calling task on the semaphore's pending list, ordered by priority;
//! each post releases the highest-priority waiter. While tasks are
//! blocked the value is negative and its magnitude equals the number of
//! waiters, though the wakeup decision is taken from the pending list
//! itself rather than the sign.

use crate::arch;
use crate::config::MAX_SEMAPHORES;
use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::list::TaskList;

/// Handle to a semaphore: its slot in the kernel pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreId(pub(crate) usize);

/// One semaphore pool slot.
pub(crate) struct Semaphore {
    /// Credits; negative while tasks wait.
    pub(crate) value: i32,
    /// Tasks blocked here, ascending priority.
    pub(crate) pending: TaskList,
}

impl Semaphore {
    pub(crate) const EMPTY: Self = Self {
        value: 0,
        pending: TaskList::new(),
    };
}

impl Kernel {
    /// Create a semaphore with `initial` credits (`initial >= 0`).
    /// Typically called before `start`.
    pub fn create_semaphore(&mut self, initial: i32) -> Result<SemaphoreId, KernelError> {
        if initial < 0 {
            return Err(KernelError::InvalidArgument);
        }
        let was_enabled = arch::enter_critical();
        let created = if self.semaphore_count >= MAX_SEMAPHORES {
            Err(KernelError::SemaphorePoolExhausted)
        } else {
            let id = SemaphoreId(self.semaphore_count);
            self.semaphore_count += 1;
            self.semaphores[id.0].value = initial;
            self.semaphores[id.0].pending = TaskList::new();
            Ok(id)
        };
        if was_enabled {
            arch::exit_critical();
        }
        created
    }

    /// Take one credit, blocking the calling task until one is available.
    /// Task context only; interrupt handlers must never pend.
    pub fn sem_pend(&mut self, sem: SemaphoreId) {
        debug_assert!(self.isr_nesting == 0, "pend from interrupt context");
        let was_enabled = arch::enter_critical();
        // The pre-update value answers "is a credit available": zero or
        // below means this task must wait its turn.
        let credit = self.semaphores[sem.0].value;
        self.semaphores[sem.0].value -= 1;
        if credit <= 0 {
            let current = self.current;
            self.ready.unlink(&mut self.tasks, current);
            self.semaphores[sem.0]
                .pending
                .insert_by_priority(&mut self.tasks, current);
            self.schedule();
        }
        if was_enabled {
            arch::exit_critical();
        }
    }

    /// Return one credit, waking the highest-priority waiter if any.
    /// Callable from tasks, handlers, and ISRs; from interrupt context the
    /// reschedule is left to the outermost `exit_isr`.
    pub fn sem_post(&mut self, sem: SemaphoreId) {
        let was_enabled = arch::enter_critical();
        self.semaphores[sem.0].value += 1;
        if let Some(waiter) = self.semaphores[sem.0].pending.pop_head(&mut self.tasks) {
            self.ready.insert_by_priority(&mut self.tasks, waiter);
            if self.isr_nesting == 0 {
                self.schedule();
            }
        }
        if was_enabled {
            arch::exit_critical();
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
