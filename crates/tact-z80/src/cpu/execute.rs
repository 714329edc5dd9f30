//! Unprefixed, DD/FD, CB and DD/FD CB instruction bodies.
//!
//! The opcode and its operand bytes have already been fetched (and charged)
//! by the driver. These functions perform the remaining memory, I/O and
//! internal cycles.

use tact_core::Bus;

use crate::alu;
use crate::decode::{Condition, IndexMode};
use crate::flags::{CF, PF, SF, ZF};
use crate::registers::Reg8;

use super::Z80;

impl Z80 {
    // =========================================================================
    // Unprefixed and DD/FD-prefixed instructions
    // =========================================================================

    /// Execute an unprefixed opcode. Under a DD/FD prefix the same opcode
    /// space applies with HL, H, L and `(HL)` replaced by the index forms.
    pub(super) fn execute_main<B: Bus>(&mut self, bus: &mut B) {
        let op = self.decode.opcode;
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match x {
            0 => match z {
                0 => match y {
                    // NOP
                    0 => {}
                    // EX AF, AF'
                    1 => self.regs.exchange_af(),
                    // DJNZ e
                    2 => {
                        self.internal(1);
                        let b = self.regs.b().wrapping_sub(1);
                        self.regs.set_b(b);
                        if b != 0 {
                            self.jump_relative();
                        }
                    }
                    // JR e
                    3 => self.jump_relative(),
                    // JR cc, e (20=NZ, 28=Z, 30=NC, 38=C)
                    _ => {
                        if Condition::from_code(y - 4).holds(self.regs.f()) {
                            self.jump_relative();
                        }
                    }
                },

                // LD rr, nn (01=BC, 11=DE, 21=HL, 31=SP)
                1 if q == 0 => {
                    let value = self.decode.operand_word();
                    self.regs.set16(self.pair(p), value);
                }

                // ADD HL, rr (09=BC, 19=DE, 29=HL, 39=SP)
                1 => {
                    self.internal(7);
                    let dst = self.index_reg();
                    let hl = self.regs.get16(dst);
                    let rr = self.regs.get16(self.pair(p));
                    self.regs.set_wz(hl.wrapping_add(1));
                    let (result, flags) = alu::add16(hl, rr);
                    self.regs.set16(dst, result);
                    self.set_f((self.regs.f() & (SF | ZF | PF)) | flags);
                }

                2 => match (q, p) {
                    // LD (BC), A / LD (DE), A
                    (0, 0 | 1) => {
                        let addr = if p == 0 { self.regs.bc() } else { self.regs.de() };
                        let a = self.regs.a();
                        self.write_mem(bus, addr, a);
                        self.regs
                            .set_wz((u16::from(a) << 8) | (addr.wrapping_add(1) & 0xFF));
                    }
                    // LD (nn), HL
                    (0, 2) => {
                        let addr = self.decode.operand_word();
                        let [lo, hi] = self.regs.get16(self.index_reg()).to_le_bytes();
                        self.write_mem(bus, addr, lo);
                        self.write_mem(bus, addr.wrapping_add(1), hi);
                        self.regs.set_wz(addr.wrapping_add(1));
                    }
                    // LD (nn), A
                    (0, _) => {
                        let addr = self.decode.operand_word();
                        let a = self.regs.a();
                        self.write_mem(bus, addr, a);
                        self.regs
                            .set_wz((u16::from(a) << 8) | (addr.wrapping_add(1) & 0xFF));
                    }
                    // LD A, (BC) / LD A, (DE)
                    (_, 0 | 1) => {
                        let addr = if p == 0 { self.regs.bc() } else { self.regs.de() };
                        let value = self.read_mem(bus, addr);
                        self.regs.set_a(value);
                        self.regs.set_wz(addr.wrapping_add(1));
                    }
                    // LD HL, (nn)
                    (_, 2) => {
                        let addr = self.decode.operand_word();
                        let lo = self.read_mem(bus, addr);
                        let hi = self.read_mem(bus, addr.wrapping_add(1));
                        self.regs
                            .set16(self.index_reg(), u16::from_le_bytes([lo, hi]));
                        self.regs.set_wz(addr.wrapping_add(1));
                    }
                    // LD A, (nn)
                    _ => {
                        let addr = self.decode.operand_word();
                        let value = self.read_mem(bus, addr);
                        self.regs.set_a(value);
                        self.regs.set_wz(addr.wrapping_add(1));
                    }
                },

                // INC rr / DEC rr
                3 => {
                    self.internal(2);
                    let reg = self.pair(p);
                    let value = self.regs.get16(reg);
                    let value = if q == 0 {
                        value.wrapping_add(1)
                    } else {
                        value.wrapping_sub(1)
                    };
                    self.regs.set16(reg, value);
                }

                // INC r / DEC r, including (HL) and (IX+d)
                4 | 5 => {
                    let apply = if z == 4 { alu::inc8 } else { alu::dec8 };
                    if y == 6 {
                        let addr = self.memory_operand();
                        let value = self.read_mem(bus, addr);
                        self.internal(1);
                        let result = apply(value);
                        self.write_mem(bus, addr, result.value);
                        self.set_f((self.regs.f() & CF) | result.flags);
                    } else {
                        let reg = self.reg8(y);
                        let result = apply(self.regs.get8(reg));
                        self.regs.set8(reg, result.value);
                        self.set_f((self.regs.f() & CF) | result.flags);
                    }
                }

                // LD r, n
                6 => {
                    if y != 6 {
                        let value = self.decode.operands[0];
                        self.regs.set8(self.reg8(y), value);
                    } else if self.decode.index == IndexMode::None {
                        let value = self.decode.operands[0];
                        self.write_mem(bus, self.regs.hl(), value);
                    } else {
                        // LD (IX+d), n: n follows d, so only 2 T of address
                        // calculation remain
                        let value = self.decode.operands[1];
                        let addr = self.indexed_address();
                        self.internal(2);
                        self.write_mem(bus, addr, value);
                    }
                }

                // RLCA RRCA RLA RRA DAA CPL SCF CCF
                _ => {
                    let a = self.regs.a();
                    let f = self.regs.f();
                    match y {
                        0..=3 => {
                            let result = alu::rotate_accumulator(y, a, f);
                            self.regs.set_a(result.value);
                            self.set_f(result.flags);
                        }
                        4 => {
                            let result = alu::daa(a, f);
                            self.regs.set_a(result.value);
                            self.set_f(result.flags);
                        }
                        5 => {
                            let result = alu::cpl(a, f);
                            self.regs.set_a(result.value);
                            self.set_f(result.flags);
                        }
                        // Undocumented: X/Y flags from (prev_Q XOR F) OR A
                        6 => self.set_f(alu::scf(a, f, self.prev_q)),
                        _ => self.set_f(alu::ccf(a, f, self.prev_q)),
                    }
                }
            },

            // HALT. PC already points past it, so the return address of the
            // interrupt that wakes the CPU is the next instruction.
            1 if op == 0x76 => self.int.halted = true,

            // LD r, (HL) / LD r, (IX+d). H and L are never substituted here.
            1 if z == 6 => {
                let addr = self.memory_operand();
                let value = self.read_mem(bus, addr);
                self.regs.set8(Reg8::from_code(y), value);
            }

            // LD (HL), r / LD (IX+d), r
            1 if y == 6 => {
                let addr = self.memory_operand();
                let value = self.regs.get8(Reg8::from_code(z));
                self.write_mem(bus, addr, value);
            }

            // LD r, r' (IXH/IXL/IYH/IYL under DD/FD, undocumented)
            1 => {
                let value = self.regs.get8(self.reg8(z));
                self.regs.set8(self.reg8(y), value);
            }

            // ALU A, r / (HL) / (IX+d)
            2 => {
                let value = if z == 6 {
                    let addr = self.memory_operand();
                    self.read_mem(bus, addr)
                } else {
                    self.regs.get8(self.reg8(z))
                };
                self.alu_a(y, value);
            }

            _ => match z {
                // RET cc
                0 => {
                    self.internal(1);
                    if Condition::from_code(y).holds(self.regs.f()) {
                        self.ret(bus);
                    }
                }

                // POP rr (C1=BC, D1=DE, E1=HL, F1=AF)
                1 if q == 0 => {
                    let value = self.pop16(bus);
                    self.regs.set16(self.stack_pair(p), value);
                }

                1 => match p {
                    // RET
                    0 => self.ret(bus),
                    // EXX
                    1 => self.regs.exchange_shadow(),
                    // JP (HL)
                    2 => {
                        let target = self.regs.get16(self.index_reg());
                        self.jump(target);
                    }
                    // LD SP, HL
                    _ => {
                        self.internal(2);
                        let value = self.regs.get16(self.index_reg());
                        self.regs.set_sp(value);
                    }
                },

                // JP cc, nn
                2 => {
                    let target = self.decode.operand_word();
                    self.regs.set_wz(target);
                    if Condition::from_code(y).holds(self.regs.f()) {
                        self.jump(target);
                    }
                }

                3 => match y {
                    // JP nn
                    0 => {
                        let target = self.decode.operand_word();
                        self.regs.set_wz(target);
                        self.jump(target);
                    }
                    // CB prefix, consumed by the decoder
                    1 => {}
                    // OUT (n), A
                    2 => {
                        let n = self.decode.operands[0];
                        let a = self.regs.a();
                        let port = u16::from_le_bytes([n, a]);
                        self.io_write(bus, port, a);
                        self.regs
                            .set_wz(u16::from_le_bytes([n.wrapping_add(1), a]));
                    }
                    // IN A, (n)
                    3 => {
                        let n = self.decode.operands[0];
                        let port = u16::from_le_bytes([n, self.regs.a()]);
                        let value = self.io_read(bus, port);
                        self.regs.set_a(value);
                        self.regs.set_wz(port.wrapping_add(1));
                    }
                    // EX (SP), HL
                    4 => {
                        let sp = self.regs.sp();
                        let lo = self.read_mem(bus, sp);
                        let hi = self.read_mem(bus, sp.wrapping_add(1));
                        self.internal(1);
                        let reg = self.index_reg();
                        let [old_lo, old_hi] = self.regs.get16(reg).to_le_bytes();
                        self.write_mem(bus, sp.wrapping_add(1), old_hi);
                        self.write_mem(bus, sp, old_lo);
                        self.internal(2);
                        let value = u16::from_le_bytes([lo, hi]);
                        self.regs.set16(reg, value);
                        self.regs.set_wz(value);
                    }
                    // EX DE, HL (never indexed)
                    5 => self.regs.exchange_de_hl(),
                    // DI
                    6 => {
                        self.int.iff1 = false;
                        self.int.iff2 = false;
                    }
                    // EI
                    _ => {
                        self.int.iff1 = true;
                        self.int.iff2 = true;
                        self.int.ei_delay = true;
                    }
                },

                // CALL cc, nn
                4 => {
                    let target = self.decode.operand_word();
                    self.regs.set_wz(target);
                    if Condition::from_code(y).holds(self.regs.f()) {
                        self.internal(1);
                        self.call(bus, target);
                    }
                }

                // PUSH rr (C5=BC, D5=DE, E5=HL, F5=AF)
                5 if q == 0 => {
                    self.internal(1);
                    let value = self.regs.get16(self.stack_pair(p));
                    self.push16(bus, value);
                }

                // CALL nn
                5 if p == 0 => {
                    let target = self.decode.operand_word();
                    self.internal(1);
                    self.call(bus, target);
                }

                // DD, ED, FD prefixes, consumed by the decoder
                5 => {}

                // ALU A, n
                6 => self.alu_a(y, self.decode.operands[0]),

                // RST p
                _ => {
                    self.internal(1);
                    self.call(bus, u16::from(y * 8));
                }
            },
        }
    }

    /// Perform ALU operation `op` (ADD ADC SUB SBC AND XOR OR CP) on A.
    fn alu_a(&mut self, op: u8, value: u8) {
        let result = alu::accumulator_op(op, self.regs.a(), value, self.regs.carry());
        self.regs.set_a(result.value);
        self.set_f(result.flags);
    }

    /// Taken JR / DJNZ: 5 internal T-states, then PC += e.
    fn jump_relative(&mut self) {
        self.internal(5);
        let offset = i16::from(self.decode.displacement());
        let target = self.regs.pc().wrapping_add_signed(offset);
        self.regs.set_wz(target);
        self.jump(target);
    }

    // =========================================================================
    // CB-prefixed instructions
    // =========================================================================

    /// Execute a CB-prefixed opcode.
    pub(super) fn execute_bit<B: Bus>(&mut self, bus: &mut B) {
        let op = self.decode.opcode;
        let z = op & 7;

        if z == 6 {
            let addr = self.regs.hl();
            let value = self.read_mem(bus, addr);
            self.internal(1);
            // BIT n,(HL) takes X/Y from the high byte of WZ
            let xy_source = self.regs.w();
            if let Some(result) = self.bit_operation(op, value, xy_source) {
                self.write_mem(bus, addr, result);
            }
        } else {
            let reg = Reg8::from_code(z);
            let value = self.regs.get8(reg);
            if let Some(result) = self.bit_operation(op, value, value) {
                self.regs.set8(reg, result);
            }
        }
    }

    /// Execute a DD CB d op / FD CB d op instruction. The displacement and
    /// opcode have been read by the driver.
    pub(super) fn execute_indexed_bit<B: Bus>(&mut self, bus: &mut B) {
        let op = self.decode.opcode;
        let z = op & 7;

        let addr = self.indexed_address();
        let value = self.read_mem(bus, addr);
        self.internal(1);
        // BIT n,(IX+d) takes X/Y from the high byte of the address
        if let Some(result) = self.bit_operation(op, value, (addr >> 8) as u8) {
            self.write_mem(bus, addr, result);
            // Undocumented: the result is also copied to a register
            if z != 6 {
                self.regs.set8(Reg8::from_code(z), result);
            }
        }
    }

    /// Shared CB operation. Returns the value to write back, or `None` for
    /// BIT which only sets flags.
    fn bit_operation(&mut self, op: u8, value: u8, xy_source: u8) -> Option<u8> {
        let y = (op >> 3) & 7;
        match op >> 6 {
            // RLC RRC RL RR SLA SRA SLL SRL
            0 => {
                let result = alu::rotate_shift(y, value, self.regs.carry());
                self.set_f(result.flags);
                Some(result.value)
            }
            // BIT
            1 => {
                self.set_f(alu::bit(y, value, xy_source, self.regs.f()));
                None
            }
            // RES
            2 => Some(value & !(1 << y)),
            // SET
            _ => Some(value | (1 << y)),
        }
    }
}
