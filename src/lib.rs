//! # Kestrel
//!
//! A compact strict-priority preemptive real-time kernel for single-CPU
//! embedded targets.
//!
//! ## Overview
//!
//! Kestrel schedules a fixed set of tasks by unique priority: the highest
//! priority ready task always runs, preemption happens at kernel calls and
//! at the outermost interrupt return, and nothing is ever allocated after
//! startup. The primitives are the classic small-RTOS set: tick-based
//! delays, counting semaphores, and bounded message queues, all blocking
//! by priority.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   Application Tasks                     │
//! ├─────────────────────────────────────────────────────────┤
//! │               Kernel API (kernel.rs)                    │
//! │   init() · create_task() · start() · delay()            │
//! │   enter_isr() / exit_isr() · counters                   │
//! ├──────────────┬──────────────────┬───────────────────────┤
//! │  Scheduler   │  Semaphores      │  Message Queues       │
//! │  kernel.rs   │  semaphore.rs    │  queue.rs             │
//! │  ─ schedule()│  ─ pend()/post() │  ─ pend()/post()      │
//! │  ─ tick()    │                  │                       │
//! ├──────────────┴──────────────────┴───────────────────────┤
//! │         Task Lists (list.rs) · TCB Arena (task.rs)      │
//! │   ready · delayed (delta-encoded) · per-primitive pend  │
//! ├─────────────────────────────────────────────────────────┤
//! │                 Arch Port (arch/)                       │
//! │   critical sections · stack frames · dispatch · tick    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory model
//!
//! - **No heap**: every task, semaphore, and queue lives in a pool sized
//!   by `config.rs`, bump-allocated by the creation calls.
//! - **One owning structure**: all kernel state sits in a single
//!   [`kernel::Kernel`] value; the hardware build keeps one in a static,
//!   tests build their own.
//! - **One lock**: the CPU interrupt mask. Every kernel entry point runs
//!   inside a critical section and restores the mask state it found.
//!
//! ## Ports
//!
//! The `arch` module selects a port by target: ARM Cortex-M4 on bare-metal
//! builds (PendSV context switch, SysTick tick), and a hosted stand-in
//! elsewhere that records dispatches instead of performing them, which is
//! what lets the scheduler logic run under the ordinary test harness.

#![no_std]
#![cfg_attr(all(target_arch = "arm", target_os = "none"), feature(naked_functions))]

#[cfg(test)]
extern crate std;

pub mod arch;
pub mod config;
pub mod error;
pub mod kernel;
mod list;
pub mod queue;
pub mod semaphore;
pub mod task;
