//! # Cortex-M4 Port
//!
//! Hardware-specific code for ARM Cortex-M4 (Thumb-2) targets.
//!
//! ## Context switch mechanism
//!
//! Tasks run in Thread mode on the process stack (PSP); the kernel and all
//! exception handlers use the main stack (MSP). On exception entry the
//! hardware stacks R0-R3, R12, LR, PC and xPSR onto the process stack; the
//! PendSV handler saves and restores R4-R11 around that, completing the
//! frame described by [`CONTEXT_WORDS`].
//!
//! [`dispatch`] does not switch immediately: it records where to save the
//! outgoing stack pointer and which stack to resume, then pends PendSV.
//! PendSV is configured at the lowest exception priority, so the swap runs
//! once no other handler is active, which is exactly the "outermost
//! interrupt return" point the kernel's ISR accounting asks for. From task
//! context the switch happens as soon as the caller leaves its critical
//! section.
//!
//! ## Tick source
//!
//! SysTick is the tick interrupt. Its handler brackets the kernel tick
//! handler with `enter_isr`/`exit_isr`. The NVIC acknowledges exceptions
//! on return, so no explicit end-of-interrupt is issued here.

use core::arch::asm;
use core::ptr;

use cortex_m::interrupt;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::register;

use crate::kernel::KERNEL_PTR;
use crate::task::{TaskControlBlock, TaskEntry};

/// Words in a full saved context: the hardware exception frame (R0-R3,
/// R12, LR, PC, xPSR) plus the software-saved R4-R11.
pub const CONTEXT_WORDS: usize = 16;

/// Initial xPSR for a fresh task: Thumb bit set, nothing else.
const INITIAL_XPSR: usize = 0x0100_0000;

// ---------------------------------------------------------------------------
// Critical sections
// ---------------------------------------------------------------------------

/// Disable interrupts, returning whether they were enabled beforehand.
#[inline]
pub fn enter_critical() -> bool {
    let primask = register::primask::read();
    interrupt::disable();
    primask.is_active()
}

/// Enable interrupts unconditionally. Callers pair this with the state
/// returned by [`enter_critical`], skipping the call when interrupts were
/// already off on entry.
#[inline]
pub fn exit_critical() {
    unsafe { interrupt::enable() }
}

// ---------------------------------------------------------------------------
// Stack frame construction
// ---------------------------------------------------------------------------

/// Build the initial context frame on a task's stack and return the stack
/// pointer to store in its control block.
///
/// The frame is laid out exactly as PendSV expects to find it, so the first
/// dispatch into the task is indistinguishable from a return to a task that
/// was preempted at its entry point.
///
/// # Safety
/// `stack` must point to `len` writable words owned by this task alone,
/// with `len >= CONTEXT_WORDS`.
pub unsafe fn init_stack(stack: *mut usize, len: usize, entry: TaskEntry) -> *mut usize {
    // AAPCS wants an 8-byte aligned stack at the exception boundary.
    let top = (stack as usize + len * core::mem::size_of::<usize>()) & !0x7;
    let frame = (top - CONTEXT_WORDS * core::mem::size_of::<usize>()) as *mut usize;

    // Software-saved registers R4-R11, contents arbitrary.
    for word in 0..8 {
        ptr::write(frame.add(word), 0);
    }
    // Hardware frame: R0-R3, R12, LR, PC, xPSR.
    ptr::write(frame.add(8), 0); // R0
    ptr::write(frame.add(9), 0); // R1
    ptr::write(frame.add(10), 0); // R2
    ptr::write(frame.add(11), 0); // R3
    ptr::write(frame.add(12), 0); // R12
    ptr::write(frame.add(13), task_return_trap as usize); // LR
    ptr::write(frame.add(14), entry as usize); // PC
    ptr::write(frame.add(15), INITIAL_XPSR); // xPSR

    frame
}

/// Landing pad for a task entry that returns despite its signature.
/// Parks the CPU instead of running off into undefined memory.
extern "C" fn task_return_trap() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Where PendSV must store the outgoing stack pointer.
static mut OUTGOING_SP_SLOT: *mut *mut usize = ptr::null_mut();
/// The stack pointer PendSV must resume.
static mut INCOMING_SP: *mut usize = ptr::null_mut();

/// Switch from `old` to `new`. Called by the scheduler with interrupts
/// disabled; the swap itself is deferred to PendSV and takes effect when
/// the caller's critical section (or the outermost active exception)
/// unwinds.
///
/// # Safety
/// Both pointers must refer to live control blocks in the kernel arena,
/// `new` holding a stack pointer previously produced by [`init_stack`] or
/// by a prior save.
pub unsafe fn dispatch(old: *mut TaskControlBlock, new: *mut TaskControlBlock) {
    OUTGOING_SP_SLOT = ptr::addr_of_mut!((*old).stack_pointer);
    INCOMING_SP = (*new).stack_pointer;
    trigger_pendsv();
}

/// Launch the very first task. Consumes the bootstrap context: switches
/// Thread mode to the process stack, unstacks the task's initial frame by
/// hand, enables interrupts and jumps to its entry point.
///
/// # Safety
/// `first_sp` must be a stack pointer produced by [`init_stack`]. Must be
/// called exactly once, from the bootstrap context, with interrupts
/// disabled.
pub unsafe fn start_first_task(first_sp: *mut usize) -> ! {
    asm!(
        // Skip the software-saved half of the frame; the hand unstack
        // below consumes the hardware half.
        "adds r0, #32",
        "msr psp, r0",
        // Thread mode onto the process stack.
        "movs r0, #2",
        "msr control, r0",
        "isb",
        // Unstack R0-R3, R12, LR, PC, xPSR by hand.
        "pop {{r0-r3, r12}}",
        "pop {{r4}}", // LR (return trap, unused: entries never return)
        "pop {{r5}}", // PC, the task entry point
        "pop {{r6}}", // xPSR (rebuilt by the core)
        "cpsie i",
        "bx r5",
        in("r0") first_sp,
        options(noreturn)
    );
}

/// Pend a PendSV exception. The swap runs when no higher-priority
/// exception is active.
#[inline]
fn trigger_pendsv() {
    // ICSR, PENDSVSET bit.
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    unsafe {
        ptr::write_volatile(ICSR, 1 << 28);
    }
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// PendSV handler: the context switch proper.
///
/// Saves R4-R11 below the hardware frame on the outgoing process stack,
/// parks the resulting stack pointer in the outgoing control block, then
/// unwinds the incoming task's frame the same way in reverse.
///
/// # Safety
/// Installed in the vector table; never called from software.
#[no_mangle]
#[naked]
pub unsafe extern "C" fn PendSV() {
    asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {store_outgoing}",
        "bl {take_incoming}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "ldr r0, =0xFFFFFFFD",
        "bx r0",
        store_outgoing = sym store_outgoing_sp,
        take_incoming = sym take_incoming_sp,
        options(noreturn)
    );
}

/// Record the outgoing task's stack pointer. Called from PendSV only.
#[no_mangle]
unsafe extern "C" fn store_outgoing_sp(psp: *mut usize) {
    if !OUTGOING_SP_SLOT.is_null() {
        *OUTGOING_SP_SLOT = psp;
        OUTGOING_SP_SLOT = ptr::null_mut();
    }
}

/// Fetch the stack pointer to resume. Called from PendSV only.
#[no_mangle]
unsafe extern "C" fn take_incoming_sp() -> *mut usize {
    INCOMING_SP
}

// ---------------------------------------------------------------------------
// Tick source
// ---------------------------------------------------------------------------

/// Configure SysTick to fire the kernel tick at `hz` from the core clock
/// running at `core_hz`.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST, core_hz: u32, hz: u32) {
    syst.set_reload(core_hz / hz - 1);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Set PendSV and SysTick to the lowest exception priority so the context
/// switch never preempts another handler.
pub fn set_exception_priorities() {
    // SHPR3: SysTick priority in [31:24], PendSV in [23:16].
    const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
    unsafe {
        let value = ptr::read_volatile(SHPR3) | (0xFF << 16) | (0xFF << 24);
        ptr::write_volatile(SHPR3, value);
    }
}

/// SysTick handler: the kernel tick interrupt.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    let kernel = &mut *KERNEL_PTR;
    kernel.enter_isr();
    kernel.tick();
    kernel.exit_isr();
}
