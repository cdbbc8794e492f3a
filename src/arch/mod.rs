//! # Architecture Port Layer
//!
//! Everything the kernel needs from the hardware, behind one small surface:
//!
//! - `enter_critical()` / `exit_critical()`: save-and-disable / enable the
//!   global interrupt mask. Every kernel entry point brackets itself with
//!   these, restoring only if interrupts were enabled on the way in, which
//!   nests correctly between task and interrupt context.
//! - `init_stack()`: lay down an initial context frame on a fresh stack so
//!   the first dispatch into the task lands at its entry point with
//!   interrupts enabled.
//! - `dispatch()` / `start_first_task()`: the context switch itself.
//!
//! The port is selected by target: the Cortex-M4 port on bare-metal ARM
//! builds, a hosted stand-in everywhere else so the kernel can be built
//! and its logic exercised on a development machine.

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod cortex_m4;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use cortex_m4::*;

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
mod hosted;
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub use hosted::*;
