//! # Kernel Errors
//!
//! Error values surfaced by the creation calls. Everything here is a
//! configuration or programming mistake; once a system is sized correctly
//! none of these occur at runtime. Misuse of the runtime calls themselves
//! (delaying the idle task, pending from an interrupt handler) is treated
//! as an invariant breach and trapped with debug assertions instead.

/// Reasons a creation call can refuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// The task arena is full (`MAX_TASKS` application tasks exist).
    TaskPoolExhausted,
    /// The semaphore pool is full (`MAX_SEMAPHORES` reached).
    SemaphorePoolExhausted,
    /// The queue pool is full (`MAX_QUEUES` reached).
    QueuePoolExhausted,
    /// Another live task already holds the requested priority.
    PriorityInUse,
    /// The requested priority is `LOWEST_PRIORITY` or beyond, which is
    /// reserved for the idle task.
    PriorityReserved,
    /// A parameter is out of range: a stack too small to hold one context
    /// frame, a negative initial semaphore value, or empty queue storage.
    InvalidArgument,
}
