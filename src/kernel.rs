//! # Kernel Core
//!
//! The owning state structure and the public entry points built on it.
//!
//! All process-wide state (the task arena, the ready and delayed lists,
//! the semaphore and queue pools, the counters) lives in one [`Kernel`]
//! value. The hardware build places a single instance in a static and
//! reaches it through [`KERNEL_PTR`]; on the host, tests construct their
//! own instances and drive them directly.
//!
//! ## Startup sequence
//!
//! ```text
//! main()
//!   ├─► kernel::init()          ← interrupts off, idle task installed
//!   ├─► kernel::create_task()   ← register application tasks (×N)
//!   └─► kernel::start()         ← interrupts on, first dispatch (no return)
//! ```
//!
//! ## Scheduling model
//!
//! Strict priority, preemptive, single CPU. The ready list is kept sorted
//! by ascending priority number and the head is, by definition, the task
//! that should be running. [`Kernel::schedule`] is the only place a switch
//! is decided: whenever the ready head and the current task differ it makes
//! the head current and hands both control blocks to the port dispatcher.
//! Every kernel entry point funnels into it, and `exit_isr` invokes it at
//! the outermost interrupt return, so preemption points are exactly the
//! kernel calls and interrupt exits.

use core::ptr;

use crate::arch;
use crate::config::{IDLE_STACK_SIZE, LOWEST_PRIORITY, MAX_QUEUES, MAX_SEMAPHORES, MAX_TASKS};
use crate::error::KernelError;
use crate::list::TaskList;
use crate::queue::Queue;
use crate::semaphore::Semaphore;
use crate::task::{TaskControlBlock, TaskEntry, TaskId, BOOTSTRAP_TASK_ID, IDLE_TASK_ID};

/// Arena slots: application tasks, the idle task, and the bootstrap
/// placeholder in the last slot.
pub(crate) const TASK_SLOTS: usize = MAX_TASKS + 2;
const BOOTSTRAP_SLOT: usize = TASK_SLOTS - 1;

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

static mut KERNEL: Kernel = Kernel::new();

/// Raw pointer to the global kernel, set by [`init`]. The port layer's
/// interrupt handlers go through this because they cannot hold a borrow
/// across an exception.
///
/// # Safety
/// Written once during `init()`, before interrupts are enabled; read from
/// task and interrupt context afterwards under the critical-section
/// discipline.
#[no_mangle]
pub static mut KERNEL_PTR: *mut Kernel = ptr::null_mut();

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel: disable interrupts, install the idle task and
/// the bootstrap placeholder. Must be called exactly once, before any
/// other kernel function.
pub fn init() {
    unsafe {
        KERNEL_PTR = ptr::addr_of_mut!(KERNEL);
        (*KERNEL_PTR).init();
    }
}

/// Create a task. See [`Kernel::create_task`].
pub fn create_task(
    entry: TaskEntry,
    stack: &'static mut [usize],
    priority: u8,
) -> Result<TaskId, KernelError> {
    unsafe { (*KERNEL_PTR).create_task(entry, stack, priority) }
}

/// Start multitasking. Enables interrupts and dispatches the
/// highest-priority task created so far. Does not return; the calling
/// context is abandoned.
pub fn start() -> ! {
    unsafe { (*KERNEL_PTR).start() };
    // Only a dispatcher defect can bring control back here.
    panic!("bootstrap context resumed after start");
}

/// Delay the calling task. See [`Kernel::delay`].
pub fn delay(ticks: u32) {
    unsafe { (*KERNEL_PTR).delay(ticks) }
}

/// Mark the start of an interrupt service routine. Call after the
/// hardware context save, before anything else.
pub fn enter_isr() {
    unsafe { (*KERNEL_PTR).enter_isr() }
}

/// Mark the end of an interrupt service routine; reschedules when this
/// closes the outermost interrupt. Call with interrupts disabled, after
/// any end-of-interrupt signalling the controller needs.
pub fn exit_isr() {
    unsafe { (*KERNEL_PTR).exit_isr() }
}

/// Ticks elapsed since `start`.
pub fn tick_count() -> u64 {
    unsafe { (*KERNEL_PTR).tick_count() }
}

/// Context switches performed since `start`.
pub fn context_switch_count() -> u32 {
    unsafe { (*KERNEL_PTR).context_switch_count() }
}

/// Idle-loop iterations, the raw material for utilization measurements.
pub fn idle_count() -> u32 {
    unsafe { (*KERNEL_PTR).idle_count() }
}

// ---------------------------------------------------------------------------
// Idle task
// ---------------------------------------------------------------------------

/// The idle loop. Runs at `LOWEST_PRIORITY` whenever nothing else is
/// ready. The counter increment sits in its own critical section so a
/// tick handler sampling it for utilization never reads a torn value.
extern "C" fn idle_entry() -> ! {
    loop {
        arch::enter_critical();
        unsafe {
            (*KERNEL_PTR).idle_counter += 1;
        }
        arch::exit_critical();
    }
}

// ---------------------------------------------------------------------------
// Kernel state
// ---------------------------------------------------------------------------

/// All kernel state, as one owning structure.
pub struct Kernel {
    /// Task control-block arena. List links index into this.
    pub(crate) tasks: [TaskControlBlock; TASK_SLOTS],
    /// Bump index over the arena (bootstrap slot excluded).
    pub(crate) task_count: usize,
    /// Source of task serial numbers; the idle task takes 0.
    next_serial: i32,
    /// Tasks eligible to run, ascending priority. Never empty after
    /// `init`: the idle task is always here.
    pub(crate) ready: TaskList,
    /// Sleeping tasks, delta-encoded by remaining ticks.
    pub(crate) delayed: TaskList,
    /// The running task. Equals the ready head whenever the kernel is at
    /// rest in task context.
    pub(crate) current: TaskId,
    /// Semaphore pool, bump-allocated.
    pub(crate) semaphores: [Semaphore; MAX_SEMAPHORES],
    pub(crate) semaphore_count: usize,
    /// Queue pool, bump-allocated.
    pub(crate) queues: [Queue; MAX_QUEUES],
    pub(crate) queue_count: usize,
    context_switches: u32,
    pub(crate) idle_counter: u32,
    ticks: u64,
    /// Interrupt nesting depth; nonzero means handler context.
    pub(crate) isr_nesting: u32,
    started: bool,
    /// Stack for the idle task, owned here so the kernel is
    /// self-contained.
    idle_stack: [usize; IDLE_STACK_SIZE],
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; TASK_SLOTS],
            task_count: 0,
            next_serial: 0,
            ready: TaskList::new(),
            delayed: TaskList::new(),
            current: TaskId(BOOTSTRAP_SLOT),
            semaphores: [Semaphore::EMPTY; MAX_SEMAPHORES],
            semaphore_count: 0,
            queues: [Queue::EMPTY; MAX_QUEUES],
            queue_count: 0,
            context_switches: 0,
            idle_counter: 0,
            ticks: 0,
            isr_nesting: 0,
            started: false,
            idle_stack: [0; IDLE_STACK_SIZE],
        }
    }

    /// Disable interrupts, install the idle task on the kernel-owned idle
    /// stack, and make the bootstrap placeholder current. The placeholder
    /// never runs; its serial number merely guarantees the first
    /// scheduling decision dispatches. Interrupts stay off until
    /// [`Kernel::start`].
    pub fn init(&mut self) {
        debug_assert!(self.task_count == 0, "init must run exactly once");
        arch::enter_critical();

        // The idle frame is built here, before the arena slot is claimed,
        // so nothing writes through the kernel while it is borrowed.
        let idle_stack = ptr::addr_of_mut!(self.idle_stack) as *mut usize;
        let idle_sp = unsafe { arch::init_stack(idle_stack, IDLE_STACK_SIZE, idle_entry) };
        let idle_base = unsafe { idle_stack.add(IDLE_STACK_SIZE) };
        let created = self.claim_task_slot(LOWEST_PRIORITY, idle_base, idle_sp);
        debug_assert!(created.is_ok());

        let bootstrap = &mut self.tasks[BOOTSTRAP_SLOT];
        bootstrap.task_id = BOOTSTRAP_TASK_ID;
        bootstrap.priority = LOWEST_PRIORITY;
        bootstrap.stack_pointer = ptr::null_mut();
        bootstrap.stack_base = ptr::null_mut();
        bootstrap.delay_ticks = 0;
        bootstrap.prev = None;
        bootstrap.next = None;
        self.current = TaskId(BOOTSTRAP_SLOT);
    }

    /// Create a task and make it ready.
    ///
    /// `stack` is the task's private stack region; an initial context
    /// frame is built at its top so the first dispatch lands at `entry`
    /// with interrupts enabled. Priorities must be unique, between 1 and
    /// `LOWEST_PRIORITY - 1`. Once the kernel is started, creating a task
    /// of higher priority than the caller preempts the caller before this
    /// returns.
    pub fn create_task(
        &mut self,
        entry: TaskEntry,
        stack: &'static mut [usize],
        priority: u8,
    ) -> Result<TaskId, KernelError> {
        if priority >= LOWEST_PRIORITY {
            return Err(KernelError::PriorityReserved);
        }
        if priority == 0 {
            return Err(KernelError::InvalidArgument);
        }
        if stack.len() < arch::CONTEXT_WORDS {
            return Err(KernelError::InvalidArgument);
        }
        let base = stack.as_mut_ptr();
        let len = stack.len();
        let was_enabled = arch::enter_critical();
        let sp = unsafe { arch::init_stack(base, len, entry) };
        let created = self.claim_task_slot(priority, unsafe { base.add(len) }, sp);
        if was_enabled {
            arch::exit_critical();
        }
        if created.is_ok() && self.started {
            self.schedule();
        }
        created
    }

    /// Allocate an arena slot for a task whose initial frame is already
    /// built, and insert it into the ready list. Shared by `create_task`
    /// and the idle-task installation, which is the one caller allowed to
    /// use `LOWEST_PRIORITY`. Runs inside the caller's critical section.
    fn claim_task_slot(
        &mut self,
        priority: u8,
        stack_base: *mut usize,
        stack_pointer: *mut usize,
    ) -> Result<TaskId, KernelError> {
        if self.task_count >= MAX_TASKS + 1 {
            return Err(KernelError::TaskPoolExhausted);
        }
        for slot in 0..self.task_count {
            if self.tasks[slot].priority == priority {
                return Err(KernelError::PriorityInUse);
            }
        }

        let id = TaskId(self.task_count);
        self.task_count += 1;
        let serial = self.next_serial;
        self.next_serial += 1;

        let tcb = &mut self.tasks[id.0];
        tcb.task_id = serial;
        tcb.priority = priority;
        tcb.delay_ticks = 0;
        tcb.prev = None;
        tcb.next = None;
        tcb.stack_base = stack_base;
        tcb.stack_pointer = stack_pointer;

        self.ready.insert_by_priority(&mut self.tasks, id);
        Ok(id)
    }

    /// Start multitasking: enable interrupts and dispatch the
    /// highest-priority ready task. On hardware the bootstrap context is
    /// abandoned and control never comes back; under the hosted port the
    /// call returns with the kernel's notion of "current" updated.
    pub fn start(&mut self) {
        debug_assert!(self.task_count > 0, "init must run before start");
        self.started = true;
        arch::exit_critical();
        self.schedule();
    }

    /// Put the calling task to sleep for `ticks` tick interrupts
    /// (`ticks >= 1`). Only a task may delay, and only itself; the idle
    /// task never delays.
    pub fn delay(&mut self, ticks: u32) {
        debug_assert!(ticks > 0, "delay must be at least one tick");
        debug_assert!(self.isr_nesting == 0, "delay from interrupt context");
        let was_enabled = arch::enter_critical();
        let current = self.current;
        debug_assert!(
            self.tasks[current.0].task_id != IDLE_TASK_ID,
            "idle task cannot delay"
        );
        self.ready.unlink(&mut self.tasks, current);
        self.delayed.insert_delayed(&mut self.tasks, current, ticks);
        if was_enabled {
            arch::exit_critical();
        }
        self.schedule();
    }

    /// The tick handler: advance the tick counter, age the delayed list,
    /// and ready every task whose delay has expired. Called from the tick
    /// ISR between `enter_isr` and `exit_isr`; the reschedule happens at
    /// `exit_isr`, not here.
    pub fn tick(&mut self) {
        let was_enabled = arch::enter_critical();
        self.ticks += 1;
        if let Some(head) = self.delayed.head() {
            // The head's delta is its absolute remaining time.
            let remaining = &mut self.tasks[head.0].delay_ticks;
            *remaining = remaining.saturating_sub(1);
            while let Some(id) = self.delayed.pop_expired(&mut self.tasks) {
                self.ready.insert_by_priority(&mut self.tasks, id);
            }
        }
        if was_enabled {
            arch::exit_critical();
        }
    }

    /// Note entry into an interrupt service routine.
    #[inline]
    pub fn enter_isr(&mut self) {
        self.isr_nesting += 1;
    }

    /// Note exit from an interrupt service routine. Closing the outermost
    /// interrupt is the one point where an ISR's effects may preempt the
    /// interrupted task.
    pub fn exit_isr(&mut self) {
        debug_assert!(self.isr_nesting > 0, "exit_isr without enter_isr");
        self.isr_nesting -= 1;
        if self.isr_nesting == 0 {
            self.schedule();
        }
    }

    /// Decide whether a context switch is due and perform it. The single
    /// place that decision is made: if the ready head is not the current
    /// task, the head becomes current and the port dispatcher swaps
    /// contexts. Safe to call from any kernel path; a no-op when the
    /// current task is still the one to run.
    pub(crate) fn schedule(&mut self) {
        let was_enabled = arch::enter_critical();
        let Some(head) = self.ready.head() else {
            // Unreachable once init has installed the idle task.
            debug_assert!(false, "ready list empty");
            if was_enabled {
                arch::exit_critical();
            }
            return;
        };
        if self.tasks[head.0].task_id != self.tasks[self.current.0].task_id {
            self.context_switches += 1;
            let outgoing = self.current;
            self.current = head;
            if self.tasks[outgoing.0].task_id == BOOTSTRAP_TASK_ID {
                // First dispatch: nothing to save, the bootstrap context
                // is simply abandoned.
                let first_sp = self.tasks[head.0].stack_pointer;
                unsafe { arch::start_first_task(first_sp) };
            } else {
                let old = ptr::addr_of_mut!(self.tasks[outgoing.0]);
                let new = ptr::addr_of_mut!(self.tasks[head.0]);
                unsafe { arch::dispatch(old, new) };
            }
        }
        if was_enabled {
            arch::exit_critical();
        }
    }

    /// Ticks elapsed since `start`.
    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Context switches performed since `start`.
    #[inline]
    pub fn context_switch_count(&self) -> u32 {
        self.context_switches
    }

    /// Idle-loop iterations so far.
    #[inline]
    pub fn idle_count(&self) -> u32 {
        self.idle_counter
    }

    /// Serial number of the running task (-1 until the first dispatch).
    #[inline]
    pub fn current_task_id(&self) -> i32 {
        self.tasks[self.current.0].task_id
    }
}

// ---------------------------------------------------------------------------
// Test support (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
impl Kernel {
    /// Assert every structural invariant the kernel promises. Called by
    /// tests after public operations.
    pub(crate) fn check_invariants(&self) {
        use std::vec;

        // Ready list: non-empty, strictly ascending unique priorities,
        // idle present.
        let ready = self.ready.collect(&self.tasks);
        assert!(!ready.is_empty(), "ready list empty");
        for pair in ready.windows(2) {
            assert!(
                self.tasks[pair[0].0].priority < self.tasks[pair[1].0].priority,
                "ready list out of order"
            );
        }
        assert!(
            ready.iter().any(|id| self.tasks[id.0].task_id == IDLE_TASK_ID),
            "idle task missing from ready list"
        );

        // At rest in task context the current task is the ready head.
        if self.started && self.isr_nesting == 0 {
            assert_eq!(self.current, ready[0], "current task is not the ready head");
        }

        // Every allocated task sits on exactly one list.
        let mut memberships = vec![0u32; self.task_count];
        let mut mark = |ids: &[TaskId]| {
            for id in ids {
                memberships[id.0] += 1;
            }
        };
        mark(&ready);
        mark(&self.delayed.collect(&self.tasks));
        for sem in &self.semaphores[..self.semaphore_count] {
            let pending = sem.pending.collect(&self.tasks);
            for pair in pending.windows(2) {
                assert!(self.tasks[pair[0].0].priority < self.tasks[pair[1].0].priority);
            }
            if sem.value < 0 {
                assert_eq!(pending.len() as i32, -sem.value, "semaphore waiter count");
            } else {
                assert!(pending.is_empty(), "waiters on a semaphore with credit");
            }
            mark(&pending);
        }
        for queue in &self.queues[..self.queue_count] {
            let pending = queue.pending.collect(&self.tasks);
            for pair in pending.windows(2) {
                assert!(self.tasks[pair[0].0].priority < self.tasks[pair[1].0].priority);
            }
            if !pending.is_empty() {
                assert_eq!(queue.count, 0, "waiters on a non-empty queue");
            }
            assert!(queue.count <= queue.capacity);
            mark(&pending);
        }
        for (slot, count) in memberships.iter().enumerate() {
            assert_eq!(*count, 1, "task slot {slot} is on {count} lists");
        }
    }
}


// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::testkit::*;
    use super::*;

    #[test]
    fn test_init_installs_idle_and_bootstrap() {
        let (kernel, _) = fresh(&[]);
        assert_eq!(kernel.task_count, 1);
        assert_eq!(kernel.current_task_id(), BOOTSTRAP_TASK_ID);
        let head = kernel.ready.head().unwrap();
        assert_eq!(kernel.tasks[head.0].task_id, IDLE_TASK_ID);
        assert_eq!(kernel.tasks[head.0].priority, LOWEST_PRIORITY);
        assert!(!kernel.tasks[head.0].stack_pointer.is_null());
    }

    #[test]
    fn test_start_dispatches_highest_priority_task() {
        let (mut kernel, ids) = booted(&[2, 1]);
        assert_eq!(kernel.current, ids[1]);
        assert_eq!(kernel.context_switch_count(), 1);
        kernel.check_invariants();

        // Still the right task: scheduling again is a no-op.
        kernel.schedule();
        assert_eq!(kernel.context_switch_count(), 1);
    }

    #[test]
    fn test_create_task_rejects_bad_arguments() {
        let (mut kernel, _) = fresh(&[3]);
        assert_eq!(
            kernel.create_task(spin, stack(64), LOWEST_PRIORITY),
            Err(KernelError::PriorityReserved)
        );
        assert_eq!(
            kernel.create_task(spin, stack(64), 0),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(
            kernel.create_task(spin, stack(64), 3),
            Err(KernelError::PriorityInUse)
        );
        assert_eq!(
            kernel.create_task(spin, stack(4), 4),
            Err(KernelError::InvalidArgument)
        );
    }

    #[test]
    fn test_task_pool_exhaustion() {
        let (mut kernel, _) = fresh(&[]);
        for priority in 1..=MAX_TASKS as u8 {
            kernel.create_task(spin, stack(64), priority).unwrap();
        }
        assert_eq!(
            kernel.create_task(spin, stack(64), 99),
            Err(KernelError::TaskPoolExhausted)
        );
    }

    #[test]
    fn test_higher_priority_creation_preempts() {
        let (mut kernel, ids) = booted(&[5]);
        assert_eq!(kernel.current, ids[0]);
        let hot = kernel.create_task(spin, stack(64), 2).unwrap();
        assert_eq!(kernel.current, hot);
        assert_eq!(kernel.context_switch_count(), 2);
        kernel.check_invariants();
    }

    #[test]
    fn test_strict_priority_with_delays() {
        // A(1) runs, delays; B(2) runs, delays; idle runs; five ticks
        // later A leads again.
        let (mut kernel, ids) = booted(&[1, 2]);
        let (a, b) = (ids[0], ids[1]);
        assert_eq!(kernel.current, a);

        kernel.delay(5);
        assert_eq!(kernel.current, b);
        kernel.delay(5);
        assert_eq!(kernel.current_task_id(), IDLE_TASK_ID);
        kernel.check_invariants();

        for _ in 0..4 {
            tick_isr(&mut kernel);
            assert_eq!(kernel.current_task_id(), IDLE_TASK_ID);
        }
        tick_isr(&mut kernel);
        assert_eq!(kernel.current, a);
        assert_eq!(kernel.tick_count(), 5);

        // Both sleepers came back, in priority order behind the head.
        let ready = kernel.ready.collect(&kernel.tasks);
        assert_eq!(&ready[..2], &[a, b]);
        kernel.check_invariants();
    }

    #[test]
    fn test_delay_of_one_tick_wakes_on_next_tick() {
        let (mut kernel, ids) = booted(&[7]);
        kernel.delay(1);
        assert_eq!(kernel.current_task_id(), IDLE_TASK_ID);
        tick_isr(&mut kernel);
        assert_eq!(kernel.current, ids[0]);
        kernel.check_invariants();
    }

    #[test]
    fn test_simultaneous_expiry_reorders_by_priority() {
        // Delays 3, 3, 7: after three ticks the first two wake together
        // and the remaining head holds its full residual delay.
        let (mut kernel, ids) = booted(&[1, 2, 3]);
        kernel.delay(3); // task 1
        kernel.delay(3); // task 2
        kernel.delay(7); // task 3
        assert_eq!(kernel.current_task_id(), IDLE_TASK_ID);

        for _ in 0..3 {
            tick_isr(&mut kernel);
        }
        assert_eq!(kernel.current, ids[0]);
        let ready = kernel.ready.collect(&kernel.tasks);
        assert_eq!(&ready[..2], &[ids[0], ids[1]]);

        let delayed = kernel.delayed.collect(&kernel.tasks);
        assert_eq!(delayed, [ids[2]]);
        assert_eq!(kernel.tasks[ids[2].0].delay_ticks, 4);
        kernel.check_invariants();
    }

    #[test]
    fn test_all_sleepers_rejoin_in_priority_order() {
        let (mut kernel, ids) = booted(&[1, 2, 3, 4]);
        for _ in &ids {
            kernel.delay(3);
        }
        assert_eq!(kernel.current_task_id(), IDLE_TASK_ID);
        for _ in 0..3 {
            tick_isr(&mut kernel);
        }
        let ready = kernel.ready.collect(&kernel.tasks);
        assert_eq!(&ready[..4], &ids[..]);
        assert_eq!(kernel.current, ids[0]);
        kernel.check_invariants();
    }

    #[test]
    fn test_tick_without_sleepers_only_counts() {
        let (mut kernel, ids) = booted(&[9]);
        for _ in 0..10 {
            tick_isr(&mut kernel);
        }
        assert_eq!(kernel.tick_count(), 10);
        assert_eq!(kernel.current, ids[0]);
        assert_eq!(kernel.context_switch_count(), 1);
    }

    #[test]
    #[should_panic(expected = "idle task cannot delay")]
    fn test_idle_cannot_delay() {
        let (mut kernel, _) = booted(&[]);
        assert_eq!(kernel.current_task_id(), IDLE_TASK_ID);
        kernel.delay(1);
    }
}
