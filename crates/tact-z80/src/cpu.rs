//! Z80 CPU core and execution driver.
//!
//! The driver is a small state machine over [`DecodeState`]. Each call to
//! [`Cpu::execute_cpu_cycle`] performs one bus step: an M1 opcode or prefix
//! fetch, a displacement or operand read, a HALT NOP cycle, or the
//! acceptance of a pending signal. When the step supplies the last byte of
//! an instruction, the instruction body (its remaining memory, I/O and
//! internal cycles) runs in the same step.
//!
//! Signals are only sampled between instructions.

mod execute;
mod extended;
mod interrupts;

use tact_core::{Bus, Cpu, Tacts};
use tracing::debug;

use crate::config::Z80Config;
use crate::debug::{StepEvent, StepObserver};
use crate::decode::{DecodeState, IndexMode, Phase, Prefix, lookup};
use crate::error::ConfigError;
use crate::interrupt::{InterruptMode, InterruptState, Service};
use crate::registers::{Reg8, Reg16, Registers};

/// Complete observable CPU state, for debuggers and test harnesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CpuState {
    pub registers: Registers,
    pub iff1: bool,
    pub iff2: bool,
    pub interrupt_mode: InterruptMode,
    pub halted: bool,
    pub tacts: Tacts,
}

/// Z80 CPU.
///
/// The CPU does not own the bus. The bus is passed to each execution call
/// so the host can share it with other components and inject wait states.
pub struct Z80 {
    pub(crate) regs: Registers,
    pub(crate) int: InterruptState,
    decode: DecodeState,
    /// Flags written by the instruction in progress (0 if none yet).
    q: u8,
    /// Flags written by the previous instruction. Feeds SCF/CCF X/Y.
    prev_q: u8,
    tacts: Tacts,
    config: Z80Config,
    observer: Option<Box<dyn StepObserver + Send>>,
}

impl Z80 {
    /// Create a Z80 in its power-on state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Z80Config::default())
    }

    #[must_use]
    pub fn with_config(config: Z80Config) -> Self {
        let mut cpu = Self {
            regs: Registers::default(),
            int: InterruptState::default(),
            decode: DecodeState::default(),
            q: 0,
            prev_q: 0,
            tacts: Tacts::ZERO,
            config,
            observer: None,
        };
        cpu.power_on();
        cpu
    }

    #[must_use]
    pub const fn regs(&self) -> &Registers {
        &self.regs
    }

    /// Direct register access for debuggers. Changes take effect at the
    /// next bus step.
    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    #[must_use]
    pub fn snapshot(&self) -> CpuState {
        CpuState {
            registers: self.regs,
            iff1: self.int.iff1,
            iff2: self.int.iff2,
            interrupt_mode: self.int.mode,
            halted: self.int.halted,
            tacts: self.tacts,
        }
    }

    /// Load a previously captured state. Pending signals and any partly
    /// decoded instruction are discarded.
    pub fn restore(&mut self, state: &CpuState) {
        self.regs = state.registers;
        self.int.reset();
        self.int.iff1 = state.iff1;
        self.int.iff2 = state.iff2;
        self.int.mode = state.interrupt_mode;
        self.int.halted = state.halted;
        self.tacts = state.tacts;
        self.decode = DecodeState::default();
        self.q = 0;
        self.prev_q = 0;
    }

    #[must_use]
    pub const fn iff1(&self) -> bool {
        self.int.iff1
    }

    #[must_use]
    pub const fn iff2(&self) -> bool {
        self.int.iff2
    }

    #[must_use]
    pub const fn interrupt_mode(&self) -> InterruptMode {
        self.int.mode
    }

    /// Select an interrupt mode from host configuration.
    pub fn set_interrupt_mode(&mut self, mode: u8) -> Result<(), ConfigError> {
        self.int.mode = InterruptMode::try_from(mode)?;
        Ok(())
    }

    /// Release the INT line without it being serviced.
    pub fn clear_interrupt(&mut self) {
        self.int.int_line = false;
    }

    #[must_use]
    pub const fn is_interrupt_pending(&self) -> bool {
        self.int.int_line
    }

    /// Charge extra T-states, e.g. contention the host applies outside a
    /// bus access.
    pub fn delay(&mut self, tacts: u64) {
        self.tacts += tacts;
    }

    /// Re-base the tact counter, e.g. at the start of a frame.
    pub fn set_tacts(&mut self, tacts: Tacts) {
        self.tacts = tacts;
    }

    /// True when no instruction is partly decoded.
    #[must_use]
    pub const fn is_at_instruction_boundary(&self) -> bool {
        self.decode.at_boundary()
    }

    pub fn set_observer(&mut self, observer: Box<dyn StepObserver + Send>) {
        self.observer = Some(observer);
    }

    pub fn take_observer(&mut self) -> Option<Box<dyn StepObserver + Send>> {
        self.observer.take()
    }

    /// Length in bytes of the instruction at PC if a debugger should step
    /// over it (`CALL`, `CALL cc`, `RST`, `HALT` and the repeating block
    /// instructions), otherwise 0.
    #[must_use]
    pub fn call_instruction_length<B: Bus>(&self, bus: &B) -> u16 {
        let pc = self.regs.pc();
        let op = bus.peek(pc);
        match op {
            0xCD => 3,
            _ if op & 0xC7 == 0xC4 => 3,
            _ if op & 0xC7 == 0xC7 => 1,
            0x76 => 1,
            0xED => match bus.peek(pc.wrapping_add(1)) {
                0xB0..=0xB3 | 0xB8..=0xBB => 2,
                _ => 0,
            },
            _ => 0,
        }
    }

    fn power_on(&mut self) {
        self.regs = Registers::default();
        self.regs.set_af(self.config.reset_af);
        self.regs.set_sp(self.config.reset_sp);
        self.int.reset();
        self.decode = DecodeState::default();
        self.q = 0;
        self.prev_q = 0;
    }

    // =========================================================================
    // Bus cycles
    // =========================================================================

    /// M1 cycle: 4 T-states, refreshes R.
    fn fetch_opcode<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let pc = self.regs.pc();
        let result = bus.read(pc, true);
        self.regs.set_pc(pc.wrapping_add(1));
        self.regs.increment_r();
        self.tacts += 4 + u64::from(result.wait);
        result.data
    }

    /// Byte at PC as data: 3 T-states.
    fn read_operand<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let pc = self.regs.pc();
        self.regs.set_pc(pc.wrapping_add(1));
        self.read_mem(bus, pc)
    }

    fn read_mem<B: Bus>(&mut self, bus: &mut B, addr: u16) -> u8 {
        let result = bus.read(addr, false);
        self.tacts += 3 + u64::from(result.wait);
        result.data
    }

    fn write_mem<B: Bus>(&mut self, bus: &mut B, addr: u16, value: u8) {
        let wait = bus.write(addr, value);
        self.tacts += 3 + u64::from(wait);
    }

    fn io_read<B: Bus>(&mut self, bus: &mut B, port: u16) -> u8 {
        let result = bus.io_read(port);
        self.tacts += 4 + u64::from(result.wait);
        result.data
    }

    fn io_write<B: Bus>(&mut self, bus: &mut B, port: u16, value: u8) {
        let wait = bus.io_write(port, value);
        self.tacts += 4 + u64::from(wait);
    }

    /// Internal operation cycles with no bus activity.
    fn internal(&mut self, tacts: u64) {
        self.tacts += tacts;
    }

    fn push16<B: Bus>(&mut self, bus: &mut B, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        let sp = self.regs.sp().wrapping_sub(1);
        self.write_mem(bus, sp, hi);
        let sp = sp.wrapping_sub(1);
        self.write_mem(bus, sp, lo);
        self.regs.set_sp(sp);
    }

    fn pop16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let sp = self.regs.sp();
        let lo = self.read_mem(bus, sp);
        let hi = self.read_mem(bus, sp.wrapping_add(1));
        self.regs.set_sp(sp.wrapping_add(2));
        u16::from_le_bytes([lo, hi])
    }

    // =========================================================================
    // Decode helpers
    // =========================================================================

    /// Write F from an ALU result. Also latches Q for SCF/CCF.
    fn set_f(&mut self, f: u8) {
        self.regs.set_f(f);
        self.q = f;
    }

    /// HL, or the index register selected by a DD/FD prefix.
    fn index_reg(&self) -> Reg16 {
        match self.decode.index {
            IndexMode::None => Reg16::Hl,
            IndexMode::Ix => Reg16::Ix,
            IndexMode::Iy => Reg16::Iy,
        }
    }

    /// `rp[p]` with HL replaced under a DD/FD prefix.
    fn pair(&self, p: u8) -> Reg16 {
        if p == 2 {
            self.index_reg()
        } else {
            Reg16::from_pair_code(p)
        }
    }

    /// `rp2[p]` (AF instead of SP) with HL replaced under a DD/FD prefix.
    fn stack_pair(&self, p: u8) -> Reg16 {
        if p == 2 {
            self.index_reg()
        } else {
            Reg16::from_stack_code(p)
        }
    }

    /// `r[code]` with H and L replaced by the index halves under DD/FD.
    fn reg8(&self, code: u8) -> Reg8 {
        match (code, self.decode.index) {
            (4, IndexMode::Ix) => Reg8::Ixh,
            (5, IndexMode::Ix) => Reg8::Ixl,
            (4, IndexMode::Iy) => Reg8::Iyh,
            (5, IndexMode::Iy) => Reg8::Iyl,
            _ => Reg8::from_code(code),
        }
    }

    /// `IX+d` / `IY+d`. Also latched into WZ.
    fn indexed_address(&mut self) -> u16 {
        let base = self.regs.get16(self.index_reg());
        let addr = base.wrapping_add_signed(i16::from(self.decode.displacement()));
        self.regs.set_wz(addr);
        addr
    }

    /// Address of the `(HL)` operand, or `(IX+d)` including its 5-T
    /// address calculation.
    fn memory_operand(&mut self) -> u16 {
        if self.decode.index == IndexMode::None {
            self.regs.hl()
        } else {
            let addr = self.indexed_address();
            self.internal(5);
            addr
        }
    }

    fn notify(&mut self, event: StepEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_step_event(&event);
        }
    }

    /// Push the return address and jump.
    fn call<B: Bus>(&mut self, bus: &mut B, target: u16) {
        let return_address = self.regs.pc();
        self.notify(StepEvent::Call {
            address: self.decode.start_pc,
            target,
            return_address,
        });
        self.push16(bus, return_address);
        self.regs.set_pc(target);
        self.regs.set_wz(target);
    }

    /// Pop PC.
    fn ret<B: Bus>(&mut self, bus: &mut B) {
        let return_address = self.pop16(bus);
        self.notify(StepEvent::Return {
            address: self.decode.start_pc,
            return_address,
        });
        self.regs.set_pc(return_address);
        self.regs.set_wz(return_address);
    }

    fn jump(&mut self, target: u16) {
        self.notify(StepEvent::Branch {
            address: self.decode.start_pc,
            target,
        });
        self.regs.set_pc(target);
    }

    // =========================================================================
    // Driver
    // =========================================================================

    fn step<B: Bus>(&mut self, bus: &mut B) {
        match self.decode.phase {
            Phase::Opcode => {
                if self.decode.at_boundary() {
                    match self.int.resolve() {
                        Service::Reset => {
                            self.reset();
                            return;
                        }
                        Service::Nmi => {
                            self.accept_nmi(bus);
                            return;
                        }
                        Service::Interrupt => {
                            self.accept_interrupt(bus);
                            return;
                        }
                        Service::HaltCycle => {
                            self.regs.increment_r();
                            self.internal(4);
                            return;
                        }
                        Service::Fetch => self.decode.start_pc = self.regs.pc(),
                    }
                }
                let opcode = self.fetch_opcode(bus);
                self.decode_opcode(bus, opcode);
            }
            Phase::Displacement => {
                self.decode.operands[0] = self.read_operand(bus);
                self.decode.phase = Phase::IndexedBitOpcode;
            }
            Phase::IndexedBitOpcode => {
                // Read as data: no refresh, 3 T plus 2 internal
                self.decode.opcode = self.read_operand(bus);
                self.internal(2);
                self.run(bus);
            }
            Phase::Operands => {
                let byte = self.read_operand(bus);
                self.decode.operands[self.decode.fetched as usize] = byte;
                self.decode.fetched += 1;
                if self.decode.fetched == self.decode.needed {
                    self.run(bus);
                }
            }
        }
    }

    /// Handle a freshly fetched opcode byte: either record a prefix or
    /// start the instruction.
    fn decode_opcode<B: Bus>(&mut self, bus: &mut B, opcode: u8) {
        if self.decode.prefix == Prefix::None {
            match opcode {
                0xDD => {
                    self.decode.index = IndexMode::Ix;
                    return;
                }
                0xFD => {
                    self.decode.index = IndexMode::Iy;
                    return;
                }
                0xED => {
                    self.decode.prefix = Prefix::Extended;
                    self.decode.index = IndexMode::None;
                    return;
                }
                0xCB => {
                    self.decode.prefix = Prefix::Bit;
                    if self.decode.index != IndexMode::None {
                        self.decode.phase = Phase::Displacement;
                    }
                    return;
                }
                _ => {}
            }
        }

        self.decode.opcode = opcode;
        let needed = lookup(self.decode.table(), opcode).operand_bytes;
        if needed == 0 {
            self.run(bus);
        } else {
            self.decode.phase = Phase::Operands;
            self.decode.needed = needed;
            self.decode.fetched = 0;
        }
    }

    /// Execute the decoded instruction and return to the boundary.
    fn run<B: Bus>(&mut self, bus: &mut B) {
        self.int.ei_delay = false;
        self.int.after_ld_a_ir = false;

        match (self.decode.prefix, self.decode.index) {
            (Prefix::None, _) => self.execute_main(bus),
            (Prefix::Bit, IndexMode::None) => self.execute_bit(bus),
            (Prefix::Bit, _) => self.execute_indexed_bit(bus),
            (Prefix::Extended, _) => self.execute_extended(bus),
        }

        self.prev_q = self.q;
        self.q = 0;
        self.decode.clear();
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep copy of the CPU state. The step observer is not cloned.
impl Clone for Z80 {
    fn clone(&self) -> Self {
        Self {
            regs: self.regs,
            int: self.int,
            decode: self.decode,
            q: self.q,
            prev_q: self.prev_q,
            tacts: self.tacts,
            config: self.config,
            observer: None,
        }
    }
}

impl Cpu for Z80 {
    type Registers = Registers;

    fn execute_cpu_cycle<B: Bus>(&mut self, bus: &mut B) {
        self.step(bus);
    }

    fn execute_instruction<B: Bus>(&mut self, bus: &mut B) -> u64 {
        let start = self.tacts;
        loop {
            self.step(bus);
            if self.decode.at_boundary() {
                break;
            }
        }
        self.tacts.since(start)
    }

    fn pc(&self) -> u16 {
        self.regs.pc()
    }

    fn registers(&self) -> Self::Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        self.int.halted
    }

    fn tacts(&self) -> Tacts {
        self.tacts
    }

    fn request_interrupt(&mut self) {
        self.int.int_line = true;
    }

    fn request_nmi(&mut self) {
        self.int.nmi_pending = true;
    }

    fn request_reset(&mut self) {
        self.int.reset_pending = true;
    }

    /// Power-on state: PC, I and R zero, interrupts disabled, IM 0. The
    /// tact counter keeps running.
    fn reset(&mut self) {
        debug!(pc = self.regs.pc(), tacts = self.tacts.get(), "Z80 reset");
        self.power_on();
    }
}

#[cfg(feature = "test-utils")]
impl Z80 {
    /// Pop PC without executing a RET. Used to return from trapped calls.
    pub fn force_ret<B: Bus>(&mut self, bus: &mut B) {
        let sp = self.regs.sp();
        let target = u16::from_le_bytes([bus.peek(sp), bus.peek(sp.wrapping_add(1))]);
        self.regs.set_sp(sp.wrapping_add(2));
        self.regs.set_pc(target);
    }

    /// Flags written by the last completed instruction (Q).
    #[must_use]
    pub const fn last_q(&self) -> u8 {
        self.prev_q
    }

    pub fn set_last_q(&mut self, q: u8) {
        self.prev_q = q;
    }

    /// True directly after `EI`.
    #[must_use]
    pub const fn ei_delay(&self) -> bool {
        self.int.ei_delay
    }

    pub fn set_ei_delay(&mut self, delay: bool) {
        self.int.ei_delay = delay;
    }

    /// True directly after `LD A,I` / `LD A,R`.
    #[must_use]
    pub const fn after_ld_a_ir(&self) -> bool {
        self.int.after_ld_a_ir
    }

    pub fn set_after_ld_a_ir(&mut self, value: bool) {
        self.int.after_ld_a_ir = value;
    }
}
