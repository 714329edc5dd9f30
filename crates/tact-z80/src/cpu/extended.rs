//! ED-prefixed instructions.

use tact_core::Bus;

use crate::alu;
use crate::decode::IM_MODES;
use crate::interrupt::InterruptMode;
use crate::registers::{Reg8, Reg16};

use super::Z80;

impl Z80 {
    /// Execute an ED-prefixed opcode. Undefined slots behave as an 8-T NOP.
    pub(super) fn execute_extended<B: Bus>(&mut self, bus: &mut B) {
        let op = self.decode.opcode;
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match (x, z) {
            // IN r, (C). ED 70 sets flags only.
            (1, 0) => {
                let port = self.regs.bc();
                let value = self.io_read(bus, port);
                self.regs.set_wz(port.wrapping_add(1));
                if y != 6 {
                    self.regs.set8(Reg8::from_code(y), value);
                }
                self.set_f(alu::in_flags(value, self.regs.f()));
            }

            // OUT (C), r. ED 71 writes 0 on NMOS parts.
            (1, 1) => {
                let port = self.regs.bc();
                let value = if y == 6 {
                    0
                } else {
                    self.regs.get8(Reg8::from_code(y))
                };
                self.io_write(bus, port, value);
                self.regs.set_wz(port.wrapping_add(1));
            }

            // SBC HL, rr / ADC HL, rr
            (1, 2) => {
                self.internal(7);
                let hl = self.regs.hl();
                let rr = self.regs.get16(Reg16::from_pair_code(p));
                let carry = self.regs.carry();
                let (result, flags) = if q == 0 {
                    alu::sbc16(hl, rr, carry)
                } else {
                    alu::adc16(hl, rr, carry)
                };
                self.regs.set_wz(hl.wrapping_add(1));
                self.regs.set_hl(result);
                self.set_f(flags);
            }

            // LD (nn), rr / LD rr, (nn)
            (1, 3) => {
                let addr = self.decode.operand_word();
                let reg = Reg16::from_pair_code(p);
                if q == 0 {
                    let [lo, hi] = self.regs.get16(reg).to_le_bytes();
                    self.write_mem(bus, addr, lo);
                    self.write_mem(bus, addr.wrapping_add(1), hi);
                } else {
                    let lo = self.read_mem(bus, addr);
                    let hi = self.read_mem(bus, addr.wrapping_add(1));
                    self.regs.set16(reg, u16::from_le_bytes([lo, hi]));
                }
                self.regs.set_wz(addr.wrapping_add(1));
            }

            // NEG (and its mirrors)
            (1, 4) => {
                let result = alu::neg8(self.regs.a());
                self.regs.set_a(result.value);
                self.set_f(result.flags);
            }

            // RETN / RETI (and mirrors). Both copy IFF2 into IFF1.
            (1, 5) => {
                self.int.iff1 = self.int.iff2;
                self.ret(bus);
            }

            // IM 0/1/2 (and mirrors)
            (1, 6) => {
                self.int.mode = match IM_MODES[y as usize] {
                    1 => InterruptMode::Im1,
                    2 => InterruptMode::Im2,
                    _ => InterruptMode::Im0,
                };
            }

            (1, 7) => match y {
                // LD I, A
                0 => {
                    self.internal(1);
                    let a = self.regs.a();
                    self.regs.set_i(a);
                }
                // LD R, A
                1 => {
                    self.internal(1);
                    let a = self.regs.a();
                    self.regs.set_r(a);
                }
                // LD A, I / LD A, R
                2 | 3 => {
                    self.internal(1);
                    let value = if y == 2 { self.regs.i() } else { self.regs.r() };
                    self.regs.set_a(value);
                    self.set_f(alu::load_ir_flags(value, self.regs.f(), self.int.iff2));
                    self.int.after_ld_a_ir = true;
                }
                // RRD / RLD
                4 | 5 => {
                    let addr = self.regs.hl();
                    let value = self.read_mem(bus, addr);
                    self.internal(4);
                    let a = self.regs.a();
                    let (new_a, new_mem) = if y == 4 {
                        ((a & 0xF0) | (value & 0x0F), (a << 4) | (value >> 4))
                    } else {
                        ((a & 0xF0) | (value >> 4), (value << 4) | (a & 0x0F))
                    };
                    self.write_mem(bus, addr, new_mem);
                    self.regs.set_a(new_a);
                    self.regs.set_wz(addr.wrapping_add(1));
                    self.set_f(alu::rotate_digit_flags(new_a, self.regs.f()));
                }
                // ED 77 / ED 7F
                _ => {}
            },

            // LDI CPI INI OUTI LDD CPD IND OUTD and the repeating forms
            (2, 0..=3) if y >= 4 => self.block(bus, y, z),

            _ => {}
        }
    }

    /// Block transfer, search and I/O. `y` bit 0 selects decrement, bit 1
    /// selects the repeating form.
    fn block<B: Bus>(&mut self, bus: &mut B, y: u8, z: u8) {
        let decrement = y & 1 != 0;
        let repeat = y & 2 != 0;
        let step = |v: u16| if decrement { v.wrapping_sub(1) } else { v.wrapping_add(1) };

        let again = match z {
            // LDI / LDD
            0 => {
                let value = self.read_mem(bus, self.regs.hl());
                self.write_mem(bus, self.regs.de(), value);
                self.internal(2);
                self.regs.set_hl(step(self.regs.hl()));
                self.regs.set_de(step(self.regs.de()));
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                self.set_f(alu::block_load_flags(value, self.regs.a(), bc, self.regs.f()));
                bc != 0
            }

            // CPI / CPD
            1 => {
                let value = self.read_mem(bus, self.regs.hl());
                self.internal(5);
                self.regs.set_hl(step(self.regs.hl()));
                self.regs.set_wz(step(self.regs.wz()));
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                let a = self.regs.a();
                self.set_f(alu::block_compare_flags(a, value, bc, self.regs.f()));
                bc != 0 && a != value
            }

            // INI / IND
            2 => {
                self.internal(1);
                let port = self.regs.bc();
                let value = self.io_read(bus, port);
                self.write_mem(bus, self.regs.hl(), value);
                self.regs.set_wz(step(port));
                let b = self.regs.b().wrapping_sub(1);
                self.regs.set_b(b);
                self.regs.set_hl(step(self.regs.hl()));
                let c = if decrement {
                    self.regs.c().wrapping_sub(1)
                } else {
                    self.regs.c().wrapping_add(1)
                };
                let k = u16::from(value) + u16::from(c);
                self.set_f(alu::block_io_flags(value, k, b));
                if b != 0 && repeat {
                    self.repeat_block();
                    let pc = self.regs.pc();
                    let f = self.regs.f();
                    self.set_f(alu::block_io_repeat_flags(f, pc, value, k, b));
                }
                return;
            }

            // OUTI / OUTD
            _ => {
                self.internal(1);
                let value = self.read_mem(bus, self.regs.hl());
                let b = self.regs.b().wrapping_sub(1);
                self.regs.set_b(b);
                let port = self.regs.bc();
                self.io_write(bus, port, value);
                self.regs.set_wz(step(port));
                self.regs.set_hl(step(self.regs.hl()));
                let k = u16::from(value) + u16::from(self.regs.l());
                self.set_f(alu::block_io_flags(value, k, b));
                if b != 0 && repeat {
                    self.repeat_block();
                    let pc = self.regs.pc();
                    let f = self.regs.f();
                    self.set_f(alu::block_io_repeat_flags(f, pc, value, k, b));
                }
                return;
            }
        };

        if again && repeat {
            self.repeat_block();
            let pc = self.regs.pc();
            let f = self.regs.f();
            self.set_f(alu::block_repeat_flags(f, pc));
        }
    }

    /// Rewind PC onto the ED prefix so the instruction runs again.
    fn repeat_block(&mut self) {
        self.internal(5);
        let pc = self.regs.pc().wrapping_sub(2);
        self.regs.set_pc(pc);
        self.regs.set_wz(pc.wrapping_add(1));
    }
}
