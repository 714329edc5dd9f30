//! CPU core trait.

use crate::{Bus, Tacts};

/// A CPU core driven by its host.
///
/// The host calls [`Cpu::execute_cpu_cycle`] (or
/// [`Cpu::execute_instruction`]) from its frame loop and checks the tact
/// counter to decide when a frame is complete. The bus is passed in, not
/// owned, so it can be shared with other components.
pub trait Cpu {
    /// The type used for register inspection.
    type Registers;

    /// Advance the CPU by one bus step of its decode state machine.
    fn execute_cpu_cycle<B: Bus>(&mut self, bus: &mut B);

    /// Run to the next instruction boundary and return the tacts consumed.
    fn execute_instruction<B: Bus>(&mut self, bus: &mut B) -> u64;

    /// Returns the current program counter.
    fn pc(&self) -> u16;

    /// Returns a snapshot of all registers for inspection.
    fn registers(&self) -> Self::Registers;

    /// Returns true if the CPU is halted.
    fn is_halted(&self) -> bool;

    /// Elapsed T-states.
    fn tacts(&self) -> Tacts;

    /// Assert the maskable interrupt line.
    fn request_interrupt(&mut self);

    /// Latch a non-maskable interrupt.
    fn request_nmi(&mut self);

    /// Latch a reset, processed at the next instruction boundary.
    fn request_reset(&mut self);

    /// Reset the CPU immediately.
    fn reset(&mut self);
}
