//! # Task Lists
//!
//! Doubly linked lists threaded through the task control-block arena.
//! A [`TaskList`] stores head and tail indices; the `prev`/`next` links
//! live in the control blocks themselves, so a task can be on at most one
//! list at a time and moving it between lists never copies anything.
//!
//! Three orderings are built on the same links:
//!
//! - the **ready** list and every **pending** list are sorted by ascending
//!   priority number (head runs or wakes first), inserted with
//!   [`TaskList::insert_by_priority`];
//! - the **delayed** list is delta-encoded: each entry's `delay_ticks` is
//!   its remaining delay minus the sum of the deltas before it, so the tick
//!   handler only ever touches the head. Inserted with
//!   [`TaskList::insert_delayed`].
//!
//! None of these operations block and none of them are interrupt safe on
//! their own; callers hold the kernel critical section.

use crate::task::{TaskControlBlock, TaskId};

/// Head and tail of one list over the control-block arena.
pub(crate) struct TaskList {
    head: Option<TaskId>,
    tail: Option<TaskId>,
}

impl TaskList {
    pub(crate) const fn new() -> Self {
        Self {
            head: None,
            tail: None,
        }
    }

    #[inline]
    pub(crate) fn head(&self) -> Option<TaskId> {
        self.head
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Insert `id` before the first entry with a numerically greater
    /// priority, or at the tail if there is none. With unique priorities
    /// this keeps the list strictly ascending, head = next to run.
    pub(crate) fn insert_by_priority(&mut self, tasks: &mut [TaskControlBlock], id: TaskId) {
        let priority = tasks[id.0].priority;
        let mut cursor = self.head;
        while let Some(at) = cursor {
            if tasks[at.0].priority > priority {
                break;
            }
            cursor = tasks[at.0].next;
        }
        match cursor {
            Some(at) => self.link_before(tasks, id, at),
            None => self.push_back(tasks, id),
        }
    }

    /// Insert `id` with an absolute delay of `ticks`, converting to delta
    /// form. Walking from the head, each traversed entry's delta is
    /// subtracted from the remaining delay; the entry lands before the
    /// first successor expiring later, whose delta is reduced so it again
    /// counts from its new predecessor. Entries with an equal expiry keep
    /// insertion order.
    pub(crate) fn insert_delayed(&mut self, tasks: &mut [TaskControlBlock], id: TaskId, ticks: u32) {
        let mut remaining = ticks;
        let mut cursor = self.head;
        while let Some(at) = cursor {
            if remaining < tasks[at.0].delay_ticks {
                break;
            }
            remaining -= tasks[at.0].delay_ticks;
            cursor = tasks[at.0].next;
        }
        tasks[id.0].delay_ticks = remaining;
        match cursor {
            Some(at) => {
                tasks[at.0].delay_ticks -= remaining;
                self.link_before(tasks, id, at);
            }
            None => self.push_back(tasks, id),
        }
    }

    /// Unlink `id` from this list. The links are known, so no search.
    /// The caller guarantees `id` is actually on this list.
    pub(crate) fn unlink(&mut self, tasks: &mut [TaskControlBlock], id: TaskId) {
        let prev = tasks[id.0].prev;
        let next = tasks[id.0].next;
        match prev {
            Some(p) => tasks[p.0].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => tasks[n.0].prev = prev,
            None => self.tail = prev,
        }
        tasks[id.0].prev = None;
        tasks[id.0].next = None;
    }

    /// Remove and return the head, if any.
    pub(crate) fn pop_head(&mut self, tasks: &mut [TaskControlBlock]) -> Option<TaskId> {
        let head = self.head?;
        self.unlink(tasks, head);
        Some(head)
    }

    /// Remove and return the head if its delta has reached zero. Several
    /// entries can expire on the same tick; callers loop until this
    /// returns `None`.
    pub(crate) fn pop_expired(&mut self, tasks: &mut [TaskControlBlock]) -> Option<TaskId> {
        let head = self.head?;
        if tasks[head.0].delay_ticks != 0 {
            return None;
        }
        self.unlink(tasks, head);
        Some(head)
    }

    fn link_before(&mut self, tasks: &mut [TaskControlBlock], id: TaskId, at: TaskId) {
        let prev = tasks[at.0].prev;
        tasks[id.0].prev = prev;
        tasks[id.0].next = Some(at);
        tasks[at.0].prev = Some(id);
        match prev {
            Some(p) => tasks[p.0].next = Some(id),
            None => self.head = Some(id),
        }
    }

    fn push_back(&mut self, tasks: &mut [TaskControlBlock], id: TaskId) {
        tasks[id.0].prev = self.tail;
        tasks[id.0].next = None;
        match self.tail {
            Some(t) => tasks[t.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }
}

#[cfg(test)]
impl TaskList {
    /// Collect the list front to back. Test-side inspection only.
    pub(crate) fn collect(&self, tasks: &[TaskControlBlock]) -> std::vec::Vec<TaskId> {
        let mut out = std::vec::Vec::new();
        let mut cursor = self.head;
        while let Some(at) = cursor {
            out.push(at);
            cursor = tasks[at.0].next;
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::vec;
    use std::vec::Vec;

    fn arena(priorities: &[u8]) -> Vec<TaskControlBlock> {
        priorities
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let mut tcb = TaskControlBlock::EMPTY;
                tcb.task_id = i as i32;
                tcb.priority = p;
                tcb
            })
            .collect()
    }

    fn priorities_of(list: &TaskList, tasks: &[TaskControlBlock]) -> Vec<u8> {
        list.collect(tasks)
            .iter()
            .map(|id| tasks[id.0].priority)
            .collect()
    }

    #[test]
    fn test_priority_insert_keeps_ascending_order() {
        let mut tasks = arena(&[30, 10, 20, 40]);
        let mut list = TaskList::new();
        for i in 0..4 {
            list.insert_by_priority(&mut tasks, TaskId(i));
        }
        assert_eq!(priorities_of(&list, &tasks), [10, 20, 30, 40]);
        assert_eq!(list.head(), Some(TaskId(1)));
    }

    #[test]
    fn test_unlink_head_middle_tail() {
        let mut tasks = arena(&[1, 2, 3]);
        let mut list = TaskList::new();
        for i in 0..3 {
            list.insert_by_priority(&mut tasks, TaskId(i));
        }

        list.unlink(&mut tasks, TaskId(1)); // middle
        assert_eq!(priorities_of(&list, &tasks), [1, 3]);
        list.unlink(&mut tasks, TaskId(0)); // head
        assert_eq!(priorities_of(&list, &tasks), [3]);
        list.unlink(&mut tasks, TaskId(2)); // tail, also sole entry
        assert!(list.is_empty());
        // Links of removed entries are cleared.
        assert_eq!(tasks[1].prev, None);
        assert_eq!(tasks[1].next, None);
    }

    #[test]
    fn test_pop_head_on_single_entry_list() {
        let mut tasks = arena(&[5]);
        let mut list = TaskList::new();
        list.insert_by_priority(&mut tasks, TaskId(0));
        assert_eq!(list.pop_head(&mut tasks), Some(TaskId(0)));
        assert_eq!(list.pop_head(&mut tasks), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_delta_insert_converts_absolute_delays() {
        let mut tasks = arena(&[1, 2, 3]);
        let mut list = TaskList::new();
        // Absolute delays 5, 3, 9 in that order.
        list.insert_delayed(&mut tasks, TaskId(0), 5);
        list.insert_delayed(&mut tasks, TaskId(1), 3);
        list.insert_delayed(&mut tasks, TaskId(2), 9);
        let order = list.collect(&tasks);
        assert_eq!(order, [TaskId(1), TaskId(0), TaskId(2)]);
        let deltas: Vec<u32> = order.iter().map(|id| tasks[id.0].delay_ticks).collect();
        assert_eq!(deltas, [3, 2, 4]);
    }

    #[test]
    fn test_delta_insert_equal_expiry_keeps_insertion_order() {
        let mut tasks = arena(&[1, 2]);
        let mut list = TaskList::new();
        list.insert_delayed(&mut tasks, TaskId(0), 3);
        list.insert_delayed(&mut tasks, TaskId(1), 3);
        assert_eq!(list.collect(&tasks), [TaskId(0), TaskId(1)]);
        assert_eq!(tasks[0].delay_ticks, 3);
        assert_eq!(tasks[1].delay_ticks, 0);
    }

    #[test]
    fn test_insert_at_head_reduces_old_head_delta() {
        let mut tasks = arena(&[1, 2]);
        let mut list = TaskList::new();
        list.insert_delayed(&mut tasks, TaskId(0), 7);
        list.insert_delayed(&mut tasks, TaskId(1), 2);
        assert_eq!(list.collect(&tasks), [TaskId(1), TaskId(0)]);
        assert_eq!(tasks[1].delay_ticks, 2);
        assert_eq!(tasks[0].delay_ticks, 5);
    }

    #[test]
    fn test_pop_expired_takes_only_zero_delta_heads() {
        let mut tasks = arena(&[1, 2, 3]);
        let mut list = TaskList::new();
        list.insert_delayed(&mut tasks, TaskId(0), 3);
        list.insert_delayed(&mut tasks, TaskId(1), 3);
        list.insert_delayed(&mut tasks, TaskId(2), 7);
        assert_eq!(list.pop_expired(&mut tasks), None);

        // Three ticks against the head.
        for _ in 0..3 {
            let head = list.head().unwrap();
            tasks[head.0].delay_ticks -= 1;
        }
        assert_eq!(list.pop_expired(&mut tasks), Some(TaskId(0)));
        assert_eq!(list.pop_expired(&mut tasks), Some(TaskId(1)));
        assert_eq!(list.pop_expired(&mut tasks), None);
        // Remaining head carries the rest of its absolute delay.
        assert_eq!(tasks[2].delay_ticks, 4);
    }

    /// Prefix sums of the stored deltas equal the sorted absolute delays,
    /// whatever the insertion order.
    #[quickcheck]
    fn prop_delta_prefix_sums_match_sorted_delays(delays: Vec<u32>) -> bool {
        let delays: Vec<u32> = delays.iter().take(24).map(|d| d % 1000 + 1).collect();
        let mut tasks = arena(&vec![1; delays.len()]);
        let mut list = TaskList::new();
        for (i, &d) in delays.iter().enumerate() {
            list.insert_delayed(&mut tasks, TaskId(i), d);
        }

        let mut prefix = 0u64;
        let mut sums = Vec::new();
        for id in list.collect(&tasks) {
            prefix += u64::from(tasks[id.0].delay_ticks);
            sums.push(prefix);
        }

        let mut sorted: Vec<u64> = delays.iter().map(|&d| u64::from(d)).collect();
        sorted.sort_unstable();
        sums == sorted
    }
}
