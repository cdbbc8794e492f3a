//! # Message Queues
//!
//! Bounded circular queues of opaque message pointers. Storage is supplied
//! by the caller at creation, so the kernel stays free of allocation and
//! the capacity is whatever the application reserved.
//!
//! Posting to a full queue is not an error; it reports failure and the
//! caller decides whether dropping the message matters. Pending on an
//! empty queue blocks the calling task, priority ordered, and a post
//! readies the best waiter only after the message is in place, so a woken
//! consumer always finds the queue non-empty. Messages leave in arrival
//! order no matter which consumers take them.

use crate::arch;
use crate::config::MAX_QUEUES;
use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::list::TaskList;

/// Opaque message: the kernel moves these pointers around and never looks
/// through them.
pub type Message = *mut ();

/// Handle to a queue: its slot in the kernel pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueId(pub(crate) usize);

/// One queue pool slot. `read` chases `write` around the caller-supplied
/// slot buffer; `count` disambiguates full from empty.
pub(crate) struct Queue {
    pub(crate) slots: *mut Message,
    pub(crate) capacity: usize,
    pub(crate) count: usize,
    read: usize,
    write: usize,
    /// Consumers blocked waiting for a message, ascending priority.
    pub(crate) pending: TaskList,
}

// Safety: the slot pointer refers to storage the creator handed over for
// the queue's exclusive use, and all access happens inside kernel critical
// sections.
unsafe impl Send for Queue {}
unsafe impl Sync for Queue {}

impl Queue {
    pub(crate) const EMPTY: Self = Self {
        slots: core::ptr::null_mut(),
        capacity: 0,
        count: 0,
        read: 0,
        write: 0,
        pending: TaskList::new(),
    };
}

impl Kernel {
    /// Create a queue over `storage`, whose length is the capacity
    /// (at least 1). Typically called before `start`.
    pub fn create_queue(&mut self, storage: &'static mut [Message]) -> Result<QueueId, KernelError> {
        if storage.is_empty() {
            return Err(KernelError::InvalidArgument);
        }
        let was_enabled = arch::enter_critical();
        let created = if self.queue_count >= MAX_QUEUES {
            Err(KernelError::QueuePoolExhausted)
        } else {
            let id = QueueId(self.queue_count);
            self.queue_count += 1;
            let queue = &mut self.queues[id.0];
            queue.slots = storage.as_mut_ptr();
            queue.capacity = storage.len();
            queue.count = 0;
            queue.read = 0;
            queue.write = 0;
            queue.pending = TaskList::new();
            Ok(id)
        };
        if was_enabled {
            arch::exit_critical();
        }
        created
    }

    /// Take the oldest message, blocking the calling task while the queue
    /// is empty. Task context only; interrupt handlers must never pend.
    pub fn queue_pend(&mut self, queue: QueueId) -> Message {
        debug_assert!(self.isr_nesting == 0, "pend from interrupt context");
        let was_enabled = arch::enter_critical();
        if self.queues[queue.0].count == 0 {
            let current = self.current;
            self.ready.unlink(&mut self.tasks, current);
            self.queues[queue.0]
                .pending
                .insert_by_priority(&mut self.tasks, current);
            self.schedule();
        }
        // Only a post wakes a waiter, and it stores the message before
        // readying anyone, so the queue cannot be empty here.
        let slot = &mut self.queues[queue.0];
        debug_assert!(slot.count > 0, "woken with an empty queue");
        let message = unsafe { *slot.slots.add(slot.read) };
        slot.read = if slot.read + 1 == slot.capacity {
            0
        } else {
            slot.read + 1
        };
        slot.count -= 1;
        if was_enabled {
            arch::exit_critical();
        }
        message
    }

    /// Append a message. Returns `false` if the queue is full, with no
    /// side effect; the caller owns that outcome. Otherwise stores the
    /// message, wakes the highest-priority waiting consumer if any, and
    /// returns `true`. Callable from tasks, handlers, and ISRs; from
    /// interrupt context the reschedule is left to the outermost
    /// `exit_isr`.
    pub fn queue_post(&mut self, queue: QueueId, message: Message) -> bool {
        let was_enabled = arch::enter_critical();
        let slot = &mut self.queues[queue.0];
        if slot.count == slot.capacity {
            if was_enabled {
                arch::exit_critical();
            }
            return false;
        }
        unsafe {
            *slot.slots.add(slot.write) = message;
        }
        slot.write = if slot.write + 1 == slot.capacity {
            0
        } else {
            slot.write + 1
        };
        slot.count += 1;

        if let Some(waiter) = self.queues[queue.0].pending.pop_head(&mut self.tasks) {
            self.ready.insert_by_priority(&mut self.tasks, waiter);
            if self.isr_nesting == 0 {
                self.schedule();
            }
        }
        if was_enabled {
            arch::exit_critical();
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::testkit::*;
    use std::boxed::Box;
    use std::vec;

    fn storage(capacity: usize) -> &'static mut [Message] {
        Box::leak(vec![core::ptr::null_mut::<()>(); capacity].into_boxed_slice())
    }

    fn message(n: usize) -> Message {
        n as Message
    }

    #[test]
    fn test_create_queue_validates() {
        let (mut kernel, _) = fresh(&[]);
        assert_eq!(
            kernel.create_queue(storage(0)),
            Err(KernelError::InvalidArgument)
        );
        for _ in 0..MAX_QUEUES {
            kernel.create_queue(storage(1)).unwrap();
        }
        assert_eq!(
            kernel.create_queue(storage(1)),
            Err(KernelError::QueuePoolExhausted)
        );
    }

    #[test]
    fn test_messages_leave_in_arrival_order() {
        let (mut kernel, _) = booted(&[1]);
        let queue = kernel.create_queue(storage(4)).unwrap();

        for n in 1..=3 {
            assert!(kernel.queue_post(queue, message(n)));
        }
        assert_eq!(kernel.queue_pend(queue), message(1));
        assert_eq!(kernel.queue_pend(queue), message(2));
        // Wrap the cursors around the end of the slot buffer.
        for n in 4..=6 {
            assert!(kernel.queue_post(queue, message(n)));
        }
        for n in 3..=6 {
            assert_eq!(kernel.queue_pend(queue), message(n));
        }
        assert_eq!(kernel.queues[queue.0].count, 0);
        kernel.check_invariants();
    }

    #[test]
    fn test_full_queue_drops_the_post() {
        let (mut kernel, _) = booted(&[1]);
        let queue = kernel.create_queue(storage(2)).unwrap();

        assert!(kernel.queue_post(queue, message(1)));
        assert!(kernel.queue_post(queue, message(2)));
        assert!(!kernel.queue_post(queue, message(3)));
        assert_eq!(kernel.queues[queue.0].count, 2);

        assert_eq!(kernel.queue_pend(queue), message(1));
        assert_eq!(kernel.queue_pend(queue), message(2));
        kernel.check_invariants();
    }

    #[test]
    fn test_post_wakes_waiting_consumer() {
        let (mut kernel, ids) = booted(&[1, 2]);
        let (consumer, producer) = (ids[0], ids[1]);
        let queue = kernel.create_queue(storage(2)).unwrap();

        // Block the consumer on the empty queue, exactly as the blocking
        // branch of queue_pend would.
        kernel.ready.unlink(&mut kernel.tasks, consumer);
        kernel.queues[queue.0]
            .pending
            .insert_by_priority(&mut kernel.tasks, consumer);
        kernel.schedule();
        assert_eq!(kernel.current, producer);
        kernel.check_invariants();

        // The post stores first, then readies the consumer, which
        // outranks the producer and takes over immediately.
        assert!(kernel.queue_post(queue, message(7)));
        assert_eq!(kernel.current, consumer);
        assert!(kernel.queues[queue.0].pending.is_empty());
        assert_eq!(kernel.queue_pend(queue), message(7));
        assert_eq!(kernel.queues[queue.0].count, 0);
        kernel.check_invariants();
    }

    #[test]
    fn test_post_from_isr_defers_the_switch() {
        let (mut kernel, ids) = booted(&[1, 2]);
        let (consumer, producer) = (ids[0], ids[1]);
        let queue = kernel.create_queue(storage(2)).unwrap();

        kernel.ready.unlink(&mut kernel.tasks, consumer);
        kernel.queues[queue.0]
            .pending
            .insert_by_priority(&mut kernel.tasks, consumer);
        kernel.schedule();
        assert_eq!(kernel.current, producer);

        kernel.enter_isr();
        assert!(kernel.queue_post(queue, message(9)));
        assert_eq!(kernel.current, producer); // no switch inside the ISR
        assert_eq!(kernel.ready.head(), Some(consumer));
        kernel.exit_isr();
        assert_eq!(kernel.current, consumer);
        kernel.check_invariants();
    }
}
