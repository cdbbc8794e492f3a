//! # Kestrel Configuration
//!
//! Compile-time constants governing kernel capacities. All storage is
//! reserved statically from these limits; there is no dynamic allocation.

/// Maximum number of application tasks. The kernel reserves two further
/// task slots internally, one for the idle task and one for the bootstrap
/// placeholder that is current before the first dispatch.
pub const MAX_TASKS: usize = 64;

/// Maximum number of semaphores that can be created.
pub const MAX_SEMAPHORES: usize = 64;

/// Maximum number of message queues that can be created.
pub const MAX_QUEUES: usize = 64;

/// Idle task stack size in machine words. The idle loop has no call depth
/// to speak of; this only needs to cover one context frame plus the
/// interrupt frames that may pile on top of it.
pub const IDLE_STACK_SIZE: usize = 256;

/// The lowest (numerically largest) task priority, reserved for the idle
/// task; `create_task` rejects it. Application tasks use 1 up to
/// `LOWEST_PRIORITY - 1`, smaller numbers scheduling first. Priorities are
/// unique: at most one live task per priority level.
pub const LOWEST_PRIORITY: u8 = 100;
