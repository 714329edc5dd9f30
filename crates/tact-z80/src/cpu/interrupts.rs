//! NMI and maskable interrupt acceptance.

use tact_core::Bus;
use tracing::{trace, warn};

use crate::debug::StepEvent;
use crate::flags::PF;
use crate::interrupt::InterruptMode;

use super::Z80;

impl Z80 {
    /// Accept a pending NMI: 11 T-states, no data byte is read.
    pub(super) fn accept_nmi<B: Bus>(&mut self, bus: &mut B) {
        let pc = self.regs.pc();
        trace!(pc, "NMI accepted");

        self.int.nmi_pending = false;
        self.int.halted = false;
        self.int.iff2 = self.int.iff1;
        self.int.iff1 = false;
        self.regs.increment_r();

        self.internal(5);
        self.push16(bus, pc);
        self.regs.set_pc(0x0066);
        self.regs.set_wz(0x0066);
        self.q = 0;
        self.prev_q = 0;
        self.notify(StepEvent::Nmi { pc });
    }

    /// Accept a maskable interrupt in the current mode.
    pub(super) fn accept_interrupt<B: Bus>(&mut self, bus: &mut B) {
        let pc = self.regs.pc();
        trace!(pc, mode = u8::from(self.int.mode), "INT accepted");

        self.int.halted = false;
        self.int.iff1 = false;
        self.int.iff2 = false;
        self.int.int_line = false;
        self.regs.increment_r();

        // LD A,I / LD A,R interrupted: P/V reads as 0
        if self.int.after_ld_a_ir {
            let f = self.regs.f() & !PF;
            self.regs.set_f(f);
            self.int.after_ld_a_ir = false;
        }

        // Acknowledge cycle: M1 plus 2 wait states
        self.internal(7);

        let target = match self.int.mode {
            InterruptMode::Im0 => {
                let data = bus.interrupt_data();
                self.push16(bus, pc);
                if data & 0xC7 == 0xC7 {
                    u16::from(data & 0x38)
                } else {
                    warn!(data, "IM 0 data byte is not an RST opcode, using RST 38h");
                    0x0038
                }
            }
            InterruptMode::Im1 => {
                self.push16(bus, pc);
                0x0038
            }
            InterruptMode::Im2 => {
                let data = bus.interrupt_data();
                self.push16(bus, pc);
                let vector = u16::from_le_bytes([data & 0xFE, self.regs.i()]);
                let lo = self.read_mem(bus, vector);
                let hi = self.read_mem(bus, vector.wrapping_add(1));
                u16::from_le_bytes([lo, hi])
            }
        };

        self.regs.set_pc(target);
        self.regs.set_wz(target);
        self.q = 0;
        self.prev_q = 0;
        self.notify(StepEvent::Interrupt { pc, target });
    }
}
