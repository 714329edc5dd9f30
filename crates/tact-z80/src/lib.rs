//! T-state accurate Z80 CPU emulator.
//!
//! Each call to `execute_cpu_cycle()` performs one bus step (an opcode
//! fetch, an operand read or a HALT cycle) and charges its T-states,
//! including wait states reported by the [`tact_core::Bus`]. Undocumented
//! behaviour is modelled: the X/Y flags, MEMPTR (WZ), Q for `SCF`/`CCF`,
//! `SLL`, the index register halves and the DD CB register copies.

pub mod alu;
mod config;
mod cpu;
mod debug;
pub mod decode;
mod error;
mod flags;
mod interrupt;
mod registers;

pub use config::Z80Config;
pub use cpu::{CpuState, Z80};
pub use debug::{StepEvent, StepObserver};
pub use decode::{Condition, IndexMode, Instruction, OpKind, OpcodeTable, Operand, Prefix, lookup};
pub use error::ConfigError;
pub use flags::{CF, Flag, HF, NF, PF, SF, XF, YF, ZF};
pub use interrupt::InterruptMode;
pub use registers::{Reg8, Reg16, Registers};
