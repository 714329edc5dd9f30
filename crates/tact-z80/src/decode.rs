//! Opcode tables and decoder state.
//!
//! Each of the five opcode spaces (unprefixed, CB, ED, DD/FD and DD/FD CB)
//! has a 256-entry table of [`Instruction`] descriptors built at compile
//! time. A descriptor names the operation and its operands, says how many
//! bytes the driver must fetch after the opcode, and records the T-state
//! length of every machine cycle.
//!
//! The indexed tables are written in terms of IX. FD-prefixed code uses the
//! same entries with IY in place of IX.

use crate::registers::{Reg8, Reg16};

/// Which opcode-space prefix is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Prefix {
    #[default]
    None,
    /// `ED`
    Extended,
    /// `CB`
    Bit,
}

/// Which index register replaces HL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IndexMode {
    #[default]
    None,
    /// `DD`
    Ix,
    /// `FD`
    Iy,
}

/// One of the five opcode spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeTable {
    Main,
    Bit,
    Extended,
    Indexed,
    IndexedBit,
}

impl OpcodeTable {
    /// Table addressed by the opcode that follows the given prefix state.
    /// `ED` discards any index prefix, so it always selects `Extended`.
    #[must_use]
    pub const fn select(prefix: Prefix, index: IndexMode) -> Self {
        match (prefix, index) {
            (Prefix::None, IndexMode::None) => Self::Main,
            (Prefix::None, _) => Self::Indexed,
            (Prefix::Bit, IndexMode::None) => Self::Bit,
            (Prefix::Bit, _) => Self::IndexedBit,
            (Prefix::Extended, _) => Self::Extended,
        }
    }
}

/// Branch condition encoded in bits 5-3 of conditional opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Nz,
    Z,
    Nc,
    C,
    Po,
    Pe,
    P,
    M,
}

impl Condition {
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code & 7 {
            0 => Self::Nz,
            1 => Self::Z,
            2 => Self::Nc,
            3 => Self::C,
            4 => Self::Po,
            5 => Self::Pe,
            6 => Self::P,
            _ => Self::M,
        }
    }

    /// Whether the condition holds for flag byte `f`.
    #[must_use]
    pub const fn holds(self, f: u8) -> bool {
        use crate::flags::{CF, PF, SF, ZF};
        match self {
            Self::Nz => f & ZF == 0,
            Self::Z => f & ZF != 0,
            Self::Nc => f & CF == 0,
            Self::C => f & CF != 0,
            Self::Po => f & PF == 0,
            Self::Pe => f & PF != 0,
            Self::P => f & SF == 0,
            Self::M => f & SF != 0,
        }
    }
}

/// What an instruction does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Nop,
    Prefix,
    Ld,
    Push,
    Pop,
    Ex,
    Exx,
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
    Inc,
    Dec,
    Rlca,
    Rrca,
    Rla,
    Rra,
    Daa,
    Cpl,
    Scf,
    Ccf,
    Neg,
    Halt,
    Di,
    Ei,
    Im,
    Jp,
    Jr,
    Djnz,
    Call,
    Ret,
    Reti,
    Retn,
    Rst,
    In,
    Out,
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Sll,
    Srl,
    Bit,
    Res,
    Set,
    Rld,
    Rrd,
    Ldi,
    Ldd,
    Ldir,
    Lddr,
    Cpi,
    Cpd,
    Cpir,
    Cpdr,
    Ini,
    Ind,
    Inir,
    Indr,
    Outi,
    Outd,
    Otir,
    Otdr,
}

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    None,
    Reg8(Reg8),
    Reg16(Reg16),
    /// Immediate byte `n`.
    Imm8,
    /// Immediate word `nn`.
    Imm16,
    /// Memory addressed by a register pair: `(BC)`, `(DE)`, `(HL)`, `(SP)`.
    Indirect(Reg16),
    /// `(IX+d)` / `(IY+d)`.
    Indexed,
    /// `(nn)`
    Absolute,
    /// `(n)`, port address `A:n`.
    Port,
    /// `(C)`, port address `BC`.
    PortC,
    /// Signed relative displacement `e`.
    Relative,
    Condition(Condition),
    Bit(u8),
    Restart(u8),
    Mode(u8),
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub kind: OpKind,
    pub dst: Operand,
    pub src: Operand,
    /// Bytes fetched after the opcode: immediates and, for `(IX+d)` forms,
    /// the displacement.
    pub operand_bytes: u8,
    /// 4-T prefix fetches that precede the opcode.
    pub prefix_fetches: u8,
    /// T-states of each machine cycle after the prefixes, on the taken or
    /// repeating path.
    pub cycles: &'static [u8],
    /// Total T-states when a condition fails or a block op finishes.
    pub alt_tstates: Option<u8>,
    /// Register that also receives the result (DDCB register-copy forms).
    pub copy_to: Option<Reg8>,
    pub undocumented: bool,
}

impl Instruction {
    const fn new(kind: OpKind, dst: Operand, src: Operand, cycles: &'static [u8]) -> Self {
        Self {
            kind,
            dst,
            src,
            operand_bytes: 0,
            prefix_fetches: 0,
            cycles,
            alt_tstates: None,
            copy_to: None,
            undocumented: false,
        }
    }

    const fn bytes(self, operand_bytes: u8) -> Self {
        Self { operand_bytes, ..self }
    }

    const fn prefixed(self, prefix_fetches: u8) -> Self {
        Self { prefix_fetches, ..self }
    }

    /// Add one prefix fetch, moving the not-taken total with it.
    const fn behind_prefix(self) -> Self {
        let alt_tstates = match self.alt_tstates {
            Some(tstates) => Some(tstates + 4),
            None => None,
        };
        Self {
            prefix_fetches: self.prefix_fetches + 1,
            alt_tstates,
            ..self
        }
    }

    const fn alt(self, tstates: u8) -> Self {
        Self { alt_tstates: Some(tstates), ..self }
    }

    const fn undoc(self) -> Self {
        Self { undocumented: true, ..self }
    }

    const fn copying(self, reg: Reg8) -> Self {
        Self { copy_to: Some(reg), ..self }
    }

    /// Total T-states on the taken or repeating path.
    #[must_use]
    pub const fn tstates(&self) -> u8 {
        let mut total = self.prefix_fetches * 4;
        let mut i = 0;
        while i < self.cycles.len() {
            total += self.cycles[i];
            i += 1;
        }
        total
    }

    /// Number of machine cycles, prefix fetches included.
    #[must_use]
    pub const fn m_cycles(&self) -> usize {
        self.prefix_fetches as usize + self.cycles.len()
    }
}

const ALU_KINDS: [OpKind; 8] = [
    OpKind::Add,
    OpKind::Adc,
    OpKind::Sub,
    OpKind::Sbc,
    OpKind::And,
    OpKind::Xor,
    OpKind::Or,
    OpKind::Cp,
];

const ROTATE_KINDS: [OpKind; 8] = [
    OpKind::Rlc,
    OpKind::Rrc,
    OpKind::Rl,
    OpKind::Rr,
    OpKind::Sla,
    OpKind::Sra,
    OpKind::Sll,
    OpKind::Srl,
];

const ACCUMULATOR_KINDS: [OpKind; 8] = [
    OpKind::Rlca,
    OpKind::Rrca,
    OpKind::Rla,
    OpKind::Rra,
    OpKind::Daa,
    OpKind::Cpl,
    OpKind::Scf,
    OpKind::Ccf,
];

const BLOCK_KINDS: [[OpKind; 4]; 4] = [
    [OpKind::Ldi, OpKind::Cpi, OpKind::Ini, OpKind::Outi],
    [OpKind::Ldd, OpKind::Cpd, OpKind::Ind, OpKind::Outd],
    [OpKind::Ldir, OpKind::Cpir, OpKind::Inir, OpKind::Otir],
    [OpKind::Lddr, OpKind::Cpdr, OpKind::Indr, OpKind::Otdr],
];

/// `IM` argument for ED 46..7E, including the mirrors.
pub(crate) const IM_MODES: [u8; 8] = [0, 0, 1, 2, 0, 0, 1, 2];

const A: Operand = Operand::Reg8(Reg8::A);
const HL: Operand = Operand::Reg16(Reg16::Hl);
const IX: Operand = Operand::Reg16(Reg16::Ix);
const NONE: Operand = Operand::None;

/// `r[z]` operand, with 6 meaning `(HL)`.
const fn r8(code: u8) -> Operand {
    if code == 6 {
        Operand::Indirect(Reg16::Hl)
    } else {
        Operand::Reg8(Reg8::from_code(code))
    }
}

/// `r[z]` under a DD/FD prefix: H and L become IXH and IXL, `(HL)` becomes
/// `(IX+d)`.
const fn r8_indexed(code: u8) -> Operand {
    match code {
        4 => Operand::Reg8(Reg8::Ixh),
        5 => Operand::Reg8(Reg8::Ixl),
        6 => Operand::Indexed,
        _ => Operand::Reg8(Reg8::from_code(code)),
    }
}

const fn rp(p: u8) -> Operand {
    Operand::Reg16(Reg16::from_pair_code(p))
}

const fn rp_indexed(p: u8) -> Operand {
    if p == 2 { IX } else { rp(p) }
}

const fn rp2(p: u8) -> Operand {
    Operand::Reg16(Reg16::from_stack_code(p))
}

const fn prefix() -> Instruction {
    Instruction::new(OpKind::Prefix, NONE, NONE, &[4])
}

const fn main_entry(op: u8) -> Instruction {
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;
    let p = y >> 1;
    let q = y & 1;

    match x {
        0 => match z {
            0 => match y {
                0 => Instruction::new(OpKind::Nop, NONE, NONE, &[4]),
                1 => Instruction::new(
                    OpKind::Ex,
                    Operand::Reg16(Reg16::Af),
                    Operand::Reg16(Reg16::AfAlt),
                    &[4],
                ),
                2 => Instruction::new(OpKind::Djnz, Operand::Relative, NONE, &[5, 3, 5])
                    .bytes(1)
                    .alt(8),
                3 => Instruction::new(OpKind::Jr, Operand::Relative, NONE, &[4, 3, 5]).bytes(1),
                _ => Instruction::new(
                    OpKind::Jr,
                    Operand::Condition(Condition::from_code(y - 4)),
                    Operand::Relative,
                    &[4, 3, 5],
                )
                .bytes(1)
                .alt(7),
            },
            1 => {
                if q == 0 {
                    Instruction::new(OpKind::Ld, rp(p), Operand::Imm16, &[4, 3, 3]).bytes(2)
                } else {
                    Instruction::new(OpKind::Add, HL, rp(p), &[4, 4, 3])
                }
            }
            2 => match (q, p) {
                (0, 0) => Instruction::new(OpKind::Ld, Operand::Indirect(Reg16::Bc), A, &[4, 3]),
                (0, 1) => Instruction::new(OpKind::Ld, Operand::Indirect(Reg16::De), A, &[4, 3]),
                (0, 2) => Instruction::new(OpKind::Ld, Operand::Absolute, HL, &[4, 3, 3, 3, 3])
                    .bytes(2),
                (0, _) => {
                    Instruction::new(OpKind::Ld, Operand::Absolute, A, &[4, 3, 3, 3]).bytes(2)
                }
                (_, 0) => Instruction::new(OpKind::Ld, A, Operand::Indirect(Reg16::Bc), &[4, 3]),
                (_, 1) => Instruction::new(OpKind::Ld, A, Operand::Indirect(Reg16::De), &[4, 3]),
                (_, 2) => Instruction::new(OpKind::Ld, HL, Operand::Absolute, &[4, 3, 3, 3, 3])
                    .bytes(2),
                _ => Instruction::new(OpKind::Ld, A, Operand::Absolute, &[4, 3, 3, 3]).bytes(2),
            },
            3 => {
                let kind = if q == 0 { OpKind::Inc } else { OpKind::Dec };
                Instruction::new(kind, rp(p), NONE, &[6])
            }
            4 | 5 => {
                let kind = if z == 4 { OpKind::Inc } else { OpKind::Dec };
                if y == 6 {
                    Instruction::new(kind, r8(y), NONE, &[4, 4, 3])
                } else {
                    Instruction::new(kind, r8(y), NONE, &[4])
                }
            }
            6 => {
                if y == 6 {
                    Instruction::new(OpKind::Ld, r8(y), Operand::Imm8, &[4, 3, 3]).bytes(1)
                } else {
                    Instruction::new(OpKind::Ld, r8(y), Operand::Imm8, &[4, 3]).bytes(1)
                }
            }
            _ => Instruction::new(ACCUMULATOR_KINDS[y as usize], NONE, NONE, &[4]),
        },
        1 => {
            if op == 0x76 {
                Instruction::new(OpKind::Halt, NONE, NONE, &[4])
            } else if y == 6 || z == 6 {
                Instruction::new(OpKind::Ld, r8(y), r8(z), &[4, 3])
            } else {
                Instruction::new(OpKind::Ld, r8(y), r8(z), &[4])
            }
        }
        2 => {
            if z == 6 {
                Instruction::new(ALU_KINDS[y as usize], A, r8(z), &[4, 3])
            } else {
                Instruction::new(ALU_KINDS[y as usize], A, r8(z), &[4])
            }
        }
        _ => match z {
            0 => Instruction::new(
                OpKind::Ret,
                Operand::Condition(Condition::from_code(y)),
                NONE,
                &[5, 3, 3],
            )
            .alt(5),
            1 => match (q, p) {
                (0, _) => Instruction::new(OpKind::Pop, rp2(p), NONE, &[4, 3, 3]),
                (_, 0) => Instruction::new(OpKind::Ret, NONE, NONE, &[4, 3, 3]),
                (_, 1) => Instruction::new(OpKind::Exx, NONE, NONE, &[4]),
                (_, 2) => Instruction::new(OpKind::Jp, HL, NONE, &[4]),
                _ => Instruction::new(OpKind::Ld, Operand::Reg16(Reg16::Sp), HL, &[6]),
            },
            2 => Instruction::new(
                OpKind::Jp,
                Operand::Condition(Condition::from_code(y)),
                Operand::Imm16,
                &[4, 3, 3],
            )
            .bytes(2),
            3 => match y {
                0 => Instruction::new(OpKind::Jp, Operand::Imm16, NONE, &[4, 3, 3]).bytes(2),
                1 => prefix(),
                2 => Instruction::new(OpKind::Out, Operand::Port, A, &[4, 3, 4]).bytes(1),
                3 => Instruction::new(OpKind::In, A, Operand::Port, &[4, 3, 4]).bytes(1),
                4 => {
                    Instruction::new(OpKind::Ex, Operand::Indirect(Reg16::Sp), HL, &[4, 3, 4, 3, 5])
                }
                5 => Instruction::new(OpKind::Ex, Operand::Reg16(Reg16::De), HL, &[4]),
                6 => Instruction::new(OpKind::Di, NONE, NONE, &[4]),
                _ => Instruction::new(OpKind::Ei, NONE, NONE, &[4]),
            },
            4 => Instruction::new(
                OpKind::Call,
                Operand::Condition(Condition::from_code(y)),
                Operand::Imm16,
                &[4, 3, 4, 3, 3],
            )
            .bytes(2)
            .alt(10),
            5 => match (q, p) {
                (0, _) => Instruction::new(OpKind::Push, rp2(p), NONE, &[5, 3, 3]),
                (_, 0) => Instruction::new(OpKind::Call, Operand::Imm16, NONE, &[4, 3, 4, 3, 3])
                    .bytes(2),
                _ => prefix(),
            },
            6 => Instruction::new(ALU_KINDS[y as usize], A, Operand::Imm8, &[4, 3]).bytes(1),
            _ => Instruction::new(OpKind::Rst, Operand::Restart(y * 8), NONE, &[5, 3, 3]),
        },
    }
}

const fn indexed_entry(op: u8) -> Instruction {
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;
    let p = y >> 1;
    let q = y & 1;
    let uses_half = y == 4 || y == 5 || z == 4 || z == 5;

    let entry = match x {
        0 => match z {
            1 if q == 0 && p == 2 => {
                Some(Instruction::new(OpKind::Ld, IX, Operand::Imm16, &[4, 3, 3]).bytes(2))
            }
            1 if q == 1 => Some(Instruction::new(OpKind::Add, IX, rp_indexed(p), &[4, 4, 3])),
            2 if p == 2 => {
                if q == 0 {
                    Some(
                        Instruction::new(OpKind::Ld, Operand::Absolute, IX, &[4, 3, 3, 3, 3])
                            .bytes(2),
                    )
                } else {
                    Some(
                        Instruction::new(OpKind::Ld, IX, Operand::Absolute, &[4, 3, 3, 3, 3])
                            .bytes(2),
                    )
                }
            }
            3 if p == 2 => {
                let kind = if q == 0 { OpKind::Inc } else { OpKind::Dec };
                Some(Instruction::new(kind, IX, NONE, &[6]))
            }
            4 | 5 => {
                let kind = if z == 4 { OpKind::Inc } else { OpKind::Dec };
                match y {
                    4 | 5 => Some(Instruction::new(kind, r8_indexed(y), NONE, &[4]).undoc()),
                    6 => Some(
                        Instruction::new(kind, Operand::Indexed, NONE, &[4, 3, 5, 4, 3]).bytes(1),
                    ),
                    _ => None,
                }
            }
            6 => match y {
                4 | 5 => Some(
                    Instruction::new(OpKind::Ld, r8_indexed(y), Operand::Imm8, &[4, 3])
                        .bytes(1)
                        .undoc(),
                ),
                6 => Some(
                    Instruction::new(OpKind::Ld, Operand::Indexed, Operand::Imm8, &[4, 3, 5, 3])
                        .bytes(2),
                ),
                _ => None,
            },
            _ => None,
        },
        1 => {
            if op == 0x76 {
                None
            } else if z == 6 {
                // LD H,(IX+d) loads H itself, not IXH
                Some(Instruction::new(OpKind::Ld, r8(y), Operand::Indexed, &[4, 3, 5, 3]).bytes(1))
            } else if y == 6 {
                Some(Instruction::new(OpKind::Ld, Operand::Indexed, r8(z), &[4, 3, 5, 3]).bytes(1))
            } else if uses_half {
                Some(Instruction::new(OpKind::Ld, r8_indexed(y), r8_indexed(z), &[4]).undoc())
            } else {
                None
            }
        }
        2 => {
            if z == 6 {
                Some(
                    Instruction::new(ALU_KINDS[y as usize], A, Operand::Indexed, &[4, 3, 5, 3])
                        .bytes(1),
                )
            } else if z == 4 || z == 5 {
                Some(Instruction::new(ALU_KINDS[y as usize], A, r8_indexed(z), &[4]).undoc())
            } else {
                None
            }
        }
        _ => match op {
            0xE1 => Some(Instruction::new(OpKind::Pop, IX, NONE, &[4, 3, 3])),
            0xE3 => Some(Instruction::new(
                OpKind::Ex,
                Operand::Indirect(Reg16::Sp),
                IX,
                &[4, 3, 4, 3, 5],
            )),
            0xE5 => Some(Instruction::new(OpKind::Push, IX, NONE, &[5, 3, 3])),
            0xE9 => Some(Instruction::new(OpKind::Jp, IX, NONE, &[4])),
            0xF9 => Some(Instruction::new(OpKind::Ld, Operand::Reg16(Reg16::Sp), IX, &[6])),
            0xCB | 0xDD | 0xED | 0xFD => Some(prefix()),
            _ => None,
        },
    };

    match entry {
        Some(instruction) => {
            if matches!(instruction.kind, OpKind::Prefix) {
                instruction
            } else {
                instruction.prefixed(1)
            }
        }
        // The prefix only costs its own fetch
        None => main_entry(op).behind_prefix().undoc(),
    }
}

const fn bit_entry(op: u8) -> Instruction {
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;

    let entry = match x {
        0 => {
            let cycles: &'static [u8] = if z == 6 { &[4, 4, 3] } else { &[4] };
            let entry = Instruction::new(ROTATE_KINDS[y as usize], r8(z), NONE, cycles);
            if y == 6 { entry.undoc() } else { entry }
        }
        1 => {
            let cycles: &'static [u8] = if z == 6 { &[4, 4] } else { &[4] };
            Instruction::new(OpKind::Bit, Operand::Bit(y), r8(z), cycles)
        }
        _ => {
            let kind = if x == 2 { OpKind::Res } else { OpKind::Set };
            let cycles: &'static [u8] = if z == 6 { &[4, 4, 3] } else { &[4] };
            Instruction::new(kind, Operand::Bit(y), r8(z), cycles)
        }
    };
    entry.prefixed(1)
}

/// DD CB d op. The displacement precedes the opcode, so it is counted in
/// `cycles` rather than `operand_bytes`; the opcode itself is read as data
/// (3 T plus 2 internal).
const fn indexed_bit_entry(op: u8) -> Instruction {
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;

    let entry = match x {
        0 => Instruction::new(ROTATE_KINDS[y as usize], Operand::Indexed, NONE, &[3, 5, 4, 3]),
        1 => Instruction::new(OpKind::Bit, Operand::Bit(y), Operand::Indexed, &[3, 5, 4]),
        _ => {
            let kind = if x == 2 { OpKind::Res } else { OpKind::Set };
            Instruction::new(kind, Operand::Bit(y), Operand::Indexed, &[3, 5, 4, 3])
        }
    };
    let entry = entry.prefixed(2);
    if z == 6 {
        if x == 0 && y == 6 { entry.undoc() } else { entry }
    } else if x == 1 {
        entry.undoc()
    } else {
        entry.copying(Reg8::from_code(z)).undoc()
    }
}

const fn extended_entry(op: u8) -> Instruction {
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;
    let p = y >> 1;
    let q = y & 1;

    let entry = match x {
        1 => match z {
            0 => {
                if y == 6 {
                    Instruction::new(OpKind::In, NONE, Operand::PortC, &[4, 4]).undoc()
                } else {
                    Instruction::new(OpKind::In, r8(y), Operand::PortC, &[4, 4])
                }
            }
            1 => {
                if y == 6 {
                    Instruction::new(OpKind::Out, Operand::PortC, NONE, &[4, 4]).undoc()
                } else {
                    Instruction::new(OpKind::Out, Operand::PortC, r8(y), &[4, 4])
                }
            }
            2 => {
                let kind = if q == 0 { OpKind::Sbc } else { OpKind::Adc };
                Instruction::new(kind, HL, rp(p), &[4, 4, 3])
            }
            3 => {
                let entry = if q == 0 {
                    Instruction::new(OpKind::Ld, Operand::Absolute, rp(p), &[4, 3, 3, 3, 3])
                } else {
                    Instruction::new(OpKind::Ld, rp(p), Operand::Absolute, &[4, 3, 3, 3, 3])
                };
                let entry = entry.bytes(2);
                if p == 2 { entry.undoc() } else { entry }
            }
            4 => {
                let entry = Instruction::new(OpKind::Neg, NONE, NONE, &[4]);
                if y == 0 { entry } else { entry.undoc() }
            }
            5 => {
                let kind = if y == 1 { OpKind::Reti } else { OpKind::Retn };
                let entry = Instruction::new(kind, NONE, NONE, &[4, 3, 3]);
                if y <= 1 { entry } else { entry.undoc() }
            }
            6 => {
                let entry =
                    Instruction::new(OpKind::Im, Operand::Mode(IM_MODES[y as usize]), NONE, &[4]);
                if y == 0 || y == 2 || y == 3 { entry } else { entry.undoc() }
            }
            _ => match y {
                0 => Instruction::new(OpKind::Ld, Operand::Reg8(Reg8::I), A, &[5]),
                1 => Instruction::new(OpKind::Ld, Operand::Reg8(Reg8::R), A, &[5]),
                2 => Instruction::new(OpKind::Ld, A, Operand::Reg8(Reg8::I), &[5]),
                3 => Instruction::new(OpKind::Ld, A, Operand::Reg8(Reg8::R), &[5]),
                4 => Instruction::new(OpKind::Rrd, NONE, NONE, &[4, 3, 4, 3]),
                5 => Instruction::new(OpKind::Rld, NONE, NONE, &[4, 3, 4, 3]),
                _ => Instruction::new(OpKind::Nop, NONE, NONE, &[4]).undoc(),
            },
        },
        2 if z <= 3 && y >= 4 => {
            let kind = BLOCK_KINDS[(y - 4) as usize][z as usize];
            let repeating = y >= 6;
            let entry = match (z, repeating) {
                (0 | 1, false) => Instruction::new(kind, NONE, NONE, &[4, 3, 5]),
                (0 | 1, true) => Instruction::new(kind, NONE, NONE, &[4, 3, 5, 5]),
                (2, false) => Instruction::new(kind, NONE, NONE, &[5, 4, 3]),
                (2, true) => Instruction::new(kind, NONE, NONE, &[5, 4, 3, 5]),
                (_, false) => Instruction::new(kind, NONE, NONE, &[5, 3, 4]),
                (_, true) => Instruction::new(kind, NONE, NONE, &[5, 3, 4, 5]),
            };
            if repeating { entry.alt(16) } else { entry }
        }
        _ => Instruction::new(OpKind::Nop, NONE, NONE, &[4]).undoc(),
    };
    entry.prefixed(1)
}

const fn build(table: OpcodeTable) -> [Instruction; 256] {
    let mut entries = [Instruction::new(OpKind::Nop, NONE, NONE, &[4]); 256];
    let mut i = 0;
    while i < 256 {
        let op = i as u8;
        entries[i] = match table {
            OpcodeTable::Main => main_entry(op),
            OpcodeTable::Bit => bit_entry(op),
            OpcodeTable::Extended => extended_entry(op),
            OpcodeTable::Indexed => indexed_entry(op),
            OpcodeTable::IndexedBit => indexed_bit_entry(op),
        };
        i += 1;
    }
    entries
}

static MAIN: [Instruction; 256] = build(OpcodeTable::Main);
static BIT: [Instruction; 256] = build(OpcodeTable::Bit);
static EXTENDED: [Instruction; 256] = build(OpcodeTable::Extended);
static INDEXED: [Instruction; 256] = build(OpcodeTable::Indexed);
static INDEXED_BIT: [Instruction; 256] = build(OpcodeTable::IndexedBit);

/// Descriptor for `opcode` in `table`.
#[must_use]
pub fn lookup(table: OpcodeTable, opcode: u8) -> &'static Instruction {
    let entries = match table {
        OpcodeTable::Main => &MAIN,
        OpcodeTable::Bit => &BIT,
        OpcodeTable::Extended => &EXTENDED,
        OpcodeTable::Indexed => &INDEXED,
        OpcodeTable::IndexedBit => &INDEXED_BIT,
    };
    &entries[opcode as usize]
}

/// Where the decoder is within the current instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Next step is an M1 opcode or prefix fetch.
    #[default]
    Opcode,
    /// DD CB seen; next step reads the displacement.
    Displacement,
    /// DD CB d seen; next step reads the opcode as data.
    IndexedBitOpcode,
    /// Opcode known; next step reads an operand byte.
    Operands,
}

/// Decoder state carried between bus steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DecodeState {
    pub prefix: Prefix,
    pub index: IndexMode,
    pub phase: Phase,
    pub opcode: u8,
    /// Address of the first byte (first prefix) of the instruction.
    pub start_pc: u16,
    pub operands: [u8; 2],
    pub fetched: u8,
    pub needed: u8,
}

impl DecodeState {
    /// True between instructions: nothing fetched, no prefix pending.
    pub const fn at_boundary(&self) -> bool {
        matches!(self.phase, Phase::Opcode)
            && matches!(self.prefix, Prefix::None)
            && matches!(self.index, IndexMode::None)
    }

    pub const fn table(&self) -> OpcodeTable {
        OpcodeTable::select(self.prefix, self.index)
    }

    /// Little-endian word from the two operand bytes.
    pub const fn operand_word(&self) -> u16 {
        (self.operands[1] as u16) << 8 | self.operands[0] as u16
    }

    /// The `(IX+d)` displacement. For DD CB forms it is the only operand;
    /// otherwise it is the first byte after the opcode.
    pub const fn displacement(&self) -> i8 {
        self.operands[0] as i8
    }

    pub fn clear(&mut self) {
        self.prefix = Prefix::None;
        self.index = IndexMode::None;
        self.phase = Phase::Opcode;
        self.fetched = 0;
        self.needed = 0;
    }
}
