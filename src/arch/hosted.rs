//! # Hosted Port
//!
//! Stand-in port for builds on a development machine. The interrupt mask
//! becomes a process-wide flag, context switches are recorded instead of
//! performed, and stack frames are laid down inertly so control blocks
//! still look plausible under inspection.
//!
//! With this port a "switch" returns straight to the caller, which makes
//! the kernel's entire decision logic runnable under the ordinary test
//! harness: the test body plays the part of whichever task is current and
//! drives ticks and interrupts by calling the same hooks an ISR would.

use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::task::{TaskControlBlock, TaskEntry};

/// Words reserved for a saved context, kept equal to the Cortex-M4 frame
/// so stack sizing carries over.
pub const CONTEXT_WORDS: usize = 16;

static INTERRUPTS_ENABLED: AtomicBool = AtomicBool::new(true);
static DISPATCHES: AtomicUsize = AtomicUsize::new(0);

/// Disable the simulated interrupt mask, returning the prior state.
#[inline]
pub fn enter_critical() -> bool {
    INTERRUPTS_ENABLED.swap(false, Ordering::SeqCst)
}

/// Enable the simulated interrupt mask unconditionally.
#[inline]
pub fn exit_critical() {
    INTERRUPTS_ENABLED.store(true, Ordering::SeqCst);
}

/// Whether the simulated interrupt mask is open. Diagnostic only.
#[inline]
pub fn interrupts_enabled() -> bool {
    INTERRUPTS_ENABLED.load(Ordering::SeqCst)
}

/// Reserve a context frame on the stack and return the resulting stack
/// pointer. The entry point is parked in the frame's return slot purely
/// so a debugger (or a test) can see where the task would begin.
///
/// # Safety
/// `stack` must point to `len` writable words with `len >= CONTEXT_WORDS`.
pub unsafe fn init_stack(stack: *mut usize, len: usize, entry: TaskEntry) -> *mut usize {
    let frame = stack.add(len - CONTEXT_WORDS);
    ptr::write_bytes(frame, 0, CONTEXT_WORDS);
    ptr::write(frame.add(CONTEXT_WORDS - 2), entry as usize);
    frame
}

/// Record a context switch and return to the caller, as if the outgoing
/// task had been resumed immediately.
///
/// # Safety
/// Both pointers must refer to live control blocks.
pub unsafe fn dispatch(old: *mut TaskControlBlock, new: *mut TaskControlBlock) {
    let _ = (old, new);
    DISPATCHES.fetch_add(1, Ordering::SeqCst);
}

/// Record the launch of the first task. Unlike the hardware port this
/// returns, abandoning nothing; the caller keeps running as the bootstrap
/// context with the kernel's notion of "current" already updated.
///
/// # Safety
/// `first_sp` must be a stack pointer produced by [`init_stack`].
pub unsafe fn start_first_task(first_sp: *mut usize) {
    let _ = first_sp;
    DISPATCHES.fetch_add(1, Ordering::SeqCst);
}

/// Number of switches recorded since process start. Diagnostic only;
/// shared across every kernel instance in the process.
pub fn dispatch_count() -> usize {
    DISPATCHES.load(Ordering::SeqCst)
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
