//! Core traits and types for T-state accurate emulation.
//!
//! The CPU owns time. Every memory and I/O access it makes goes through a
//! host-supplied [`Bus`], and every access is charged to the CPU's tact
//! counter together with any wait states the host hands back.

mod bus;
mod cpu;
mod tacts;

pub use bus::{Bus, ReadResult, SimpleBus};
pub use cpu::Cpu;
pub use tacts::Tacts;
