//! Z80 register file.
//!
//! Register pairs are stored as single 16-bit words. The 8-bit halves are
//! views computed by shift and mask, so writing `B` is visible through `BC`
//! and vice versa.

use crate::flags::{CF, Flag, HF, NF, PF, SF, XF, YF, ZF};

/// 8-bit register names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    A,
    F,
    Ixh,
    Ixl,
    Iyh,
    Iyl,
    I,
    R,
    W,
    Z,
}

impl Reg8 {
    /// Register selected by a 3-bit opcode field (B C D E H L - A).
    ///
    /// # Panics
    ///
    /// Code 6 selects `(HL)`, not a register, and codes above 7 do not exist.
    /// Either means the decoder is broken.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::B,
            1 => Self::C,
            2 => Self::D,
            3 => Self::E,
            4 => Self::H,
            5 => Self::L,
            7 => Self::A,
            _ => panic!("register code does not name an 8-bit register"),
        }
    }
}

/// 16-bit register names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg16 {
    Af,
    Bc,
    De,
    Hl,
    AfAlt,
    BcAlt,
    DeAlt,
    HlAlt,
    Ix,
    Iy,
    Sp,
    Pc,
    Ir,
    Wz,
}

impl Reg16 {
    /// Pair selected by a 2-bit field where 3 means SP (`LD rr,nn`, `INC rr`).
    ///
    /// # Panics
    ///
    /// Panics on codes above 3.
    #[must_use]
    pub const fn from_pair_code(code: u8) -> Self {
        match code {
            0 => Self::Bc,
            1 => Self::De,
            2 => Self::Hl,
            3 => Self::Sp,
            _ => panic!("register pair code out of range"),
        }
    }

    /// Pair selected by a 2-bit field where 3 means AF (`PUSH`, `POP`).
    ///
    /// # Panics
    ///
    /// Panics on codes above 3.
    #[must_use]
    pub const fn from_stack_code(code: u8) -> Self {
        match code {
            0 => Self::Bc,
            1 => Self::De,
            2 => Self::Hl,
            3 => Self::Af,
            _ => panic!("register pair code out of range"),
        }
    }
}

/// The full Z80 register file, including the hidden WZ (MEMPTR) register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Registers {
    af: u16,
    bc: u16,
    de: u16,
    hl: u16,
    af_alt: u16,
    bc_alt: u16,
    de_alt: u16,
    hl_alt: u16,
    ix: u16,
    iy: u16,
    sp: u16,
    pc: u16,
    ir: u16,
    wz: u16,
}

#[inline]
const fn hi(word: u16) -> u8 {
    (word >> 8) as u8
}

#[inline]
const fn lo(word: u16) -> u8 {
    word as u8
}

#[inline]
const fn with_hi(word: u16, value: u8) -> u16 {
    (word & 0x00FF) | ((value as u16) << 8)
}

#[inline]
const fn with_lo(word: u16, value: u8) -> u16 {
    (word & 0xFF00) | value as u16
}

macro_rules! pair {
    ($get:ident, $set:ident, $field:ident) => {
        #[must_use]
        pub const fn $get(&self) -> u16 {
            self.$field
        }

        pub fn $set(&mut self, value: u16) {
            self.$field = value;
        }
    };
}

macro_rules! half {
    ($get:ident, $set:ident, $field:ident, $read:ident, $write:ident) => {
        #[must_use]
        pub const fn $get(&self) -> u8 {
            $read(self.$field)
        }

        pub fn $set(&mut self, value: u8) {
            self.$field = $write(self.$field, value);
        }
    };
}

impl Registers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pair!(af, set_af, af);
    pair!(bc, set_bc, bc);
    pair!(de, set_de, de);
    pair!(hl, set_hl, hl);
    pair!(af_alt, set_af_alt, af_alt);
    pair!(bc_alt, set_bc_alt, bc_alt);
    pair!(de_alt, set_de_alt, de_alt);
    pair!(hl_alt, set_hl_alt, hl_alt);
    pair!(ix, set_ix, ix);
    pair!(iy, set_iy, iy);
    pair!(sp, set_sp, sp);
    pair!(pc, set_pc, pc);
    pair!(ir, set_ir, ir);
    pair!(wz, set_wz, wz);

    half!(a, set_a, af, hi, with_hi);
    half!(f, set_f, af, lo, with_lo);
    half!(b, set_b, bc, hi, with_hi);
    half!(c, set_c, bc, lo, with_lo);
    half!(d, set_d, de, hi, with_hi);
    half!(e, set_e, de, lo, with_lo);
    half!(h, set_h, hl, hi, with_hi);
    half!(l, set_l, hl, lo, with_lo);
    half!(ixh, set_ixh, ix, hi, with_hi);
    half!(ixl, set_ixl, ix, lo, with_lo);
    half!(iyh, set_iyh, iy, hi, with_hi);
    half!(iyl, set_iyl, iy, lo, with_lo);
    half!(i, set_i, ir, hi, with_hi);
    half!(r, set_r, ir, lo, with_lo);
    half!(w, set_w, wz, hi, with_hi);
    half!(z, set_z, wz, lo, with_lo);

    /// Read an 8-bit register by name.
    #[must_use]
    pub const fn get8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::A => self.a(),
            Reg8::F => self.f(),
            Reg8::B => self.b(),
            Reg8::C => self.c(),
            Reg8::D => self.d(),
            Reg8::E => self.e(),
            Reg8::H => self.h(),
            Reg8::L => self.l(),
            Reg8::Ixh => self.ixh(),
            Reg8::Ixl => self.ixl(),
            Reg8::Iyh => self.iyh(),
            Reg8::Iyl => self.iyl(),
            Reg8::I => self.i(),
            Reg8::R => self.r(),
            Reg8::W => self.w(),
            Reg8::Z => self.z(),
        }
    }

    /// Write an 8-bit register by name.
    pub fn set8(&mut self, reg: Reg8, value: u8) {
        match reg {
            Reg8::A => self.set_a(value),
            Reg8::F => self.set_f(value),
            Reg8::B => self.set_b(value),
            Reg8::C => self.set_c(value),
            Reg8::D => self.set_d(value),
            Reg8::E => self.set_e(value),
            Reg8::H => self.set_h(value),
            Reg8::L => self.set_l(value),
            Reg8::Ixh => self.set_ixh(value),
            Reg8::Ixl => self.set_ixl(value),
            Reg8::Iyh => self.set_iyh(value),
            Reg8::Iyl => self.set_iyl(value),
            Reg8::I => self.set_i(value),
            Reg8::R => self.set_r(value),
            Reg8::W => self.set_w(value),
            Reg8::Z => self.set_z(value),
        }
    }

    /// Read a 16-bit register by name.
    #[must_use]
    pub const fn get16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::Af => self.af,
            Reg16::Bc => self.bc,
            Reg16::De => self.de,
            Reg16::Hl => self.hl,
            Reg16::AfAlt => self.af_alt,
            Reg16::BcAlt => self.bc_alt,
            Reg16::DeAlt => self.de_alt,
            Reg16::HlAlt => self.hl_alt,
            Reg16::Ix => self.ix,
            Reg16::Iy => self.iy,
            Reg16::Sp => self.sp,
            Reg16::Pc => self.pc,
            Reg16::Ir => self.ir,
            Reg16::Wz => self.wz,
        }
    }

    /// Write a 16-bit register by name.
    pub fn set16(&mut self, reg: Reg16, value: u16) {
        let slot = match reg {
            Reg16::Af => &mut self.af,
            Reg16::Bc => &mut self.bc,
            Reg16::De => &mut self.de,
            Reg16::Hl => &mut self.hl,
            Reg16::AfAlt => &mut self.af_alt,
            Reg16::BcAlt => &mut self.bc_alt,
            Reg16::DeAlt => &mut self.de_alt,
            Reg16::HlAlt => &mut self.hl_alt,
            Reg16::Ix => &mut self.ix,
            Reg16::Iy => &mut self.iy,
            Reg16::Sp => &mut self.sp,
            Reg16::Pc => &mut self.pc,
            Reg16::Ir => &mut self.ir,
            Reg16::Wz => &mut self.wz,
        };
        *slot = value;
    }

    /// `EX AF,AF'`
    pub fn exchange_af(&mut self) {
        std::mem::swap(&mut self.af, &mut self.af_alt);
    }

    /// `EXX`: swap BC, DE and HL with their shadows.
    pub fn exchange_shadow(&mut self) {
        std::mem::swap(&mut self.bc, &mut self.bc_alt);
        std::mem::swap(&mut self.de, &mut self.de_alt);
        std::mem::swap(&mut self.hl, &mut self.hl_alt);
    }

    /// `EX DE,HL`
    pub fn exchange_de_hl(&mut self) {
        std::mem::swap(&mut self.de, &mut self.hl);
    }

    /// Advance the 7-bit memory refresh counter. Bit 7 of R is preserved.
    pub fn increment_r(&mut self) {
        let r = self.r();
        self.set_r((r & 0x80) | (r.wrapping_add(1) & 0x7F));
    }

    #[must_use]
    pub const fn flag(&self, flag: Flag) -> bool {
        self.f() & flag.set_mask() != 0
    }

    pub fn set_flag(&mut self, flag: Flag, on: bool) {
        let f = self.f();
        self.set_f(if on {
            f | flag.set_mask()
        } else {
            f & flag.reset_mask()
        });
    }

    #[must_use]
    pub const fn sign(&self) -> bool {
        self.f() & SF != 0
    }

    #[must_use]
    pub const fn zero(&self) -> bool {
        self.f() & ZF != 0
    }

    #[must_use]
    pub const fn flag_y(&self) -> bool {
        self.f() & YF != 0
    }

    #[must_use]
    pub const fn half_carry(&self) -> bool {
        self.f() & HF != 0
    }

    #[must_use]
    pub const fn flag_x(&self) -> bool {
        self.f() & XF != 0
    }

    #[must_use]
    pub const fn parity_overflow(&self) -> bool {
        self.f() & PF != 0
    }

    #[must_use]
    pub const fn subtract(&self) -> bool {
        self.f() & NF != 0
    }

    #[must_use]
    pub const fn carry(&self) -> bool {
        self.f() & CF != 0
    }
}
