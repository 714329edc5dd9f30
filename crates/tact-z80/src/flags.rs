//! Z80 flag register bits and precomputed flag tables.

/// Sign flag (bit 7) - set if result is negative.
pub const SF: u8 = 0b1000_0000;

/// Zero flag (bit 6) - set if result is zero.
pub const ZF: u8 = 0b0100_0000;

/// Undocumented flag (bit 5) - copy of bit 5 of result.
pub const YF: u8 = 0b0010_0000;

/// Half-carry flag (bit 4) - carry from bit 3 to bit 4.
pub const HF: u8 = 0b0001_0000;

/// Undocumented flag (bit 3) - copy of bit 3 of result.
pub const XF: u8 = 0b0000_1000;

/// Parity/Overflow flag (bit 2) - parity or overflow depending on instruction.
pub const PF: u8 = 0b0000_0100;

/// Add/Subtract flag (bit 1) - set if last operation was subtraction.
pub const NF: u8 = 0b0000_0010;

/// Carry flag (bit 0) - carry out of bit 7.
pub const CF: u8 = 0b0000_0001;

/// A single bit of the F register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Sign,
    Zero,
    Y,
    HalfCarry,
    X,
    ParityOverflow,
    Subtract,
    Carry,
}

/// OR masks, indexed by bit number.
const SET_MASKS: [u8; 8] = [CF, NF, PF, XF, HF, YF, ZF, SF];

/// AND masks, indexed by bit number.
const RESET_MASKS: [u8; 8] = [!CF, !NF, !PF, !XF, !HF, !YF, !ZF, !SF];

impl Flag {
    /// Bit position within F.
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            Self::Carry => 0,
            Self::Subtract => 1,
            Self::ParityOverflow => 2,
            Self::X => 3,
            Self::HalfCarry => 4,
            Self::Y => 5,
            Self::Zero => 6,
            Self::Sign => 7,
        }
    }

    /// Mask to OR into F to set this flag.
    #[must_use]
    pub const fn set_mask(self) -> u8 {
        SET_MASKS[self.bit() as usize]
    }

    /// Mask to AND into F to clear this flag.
    #[must_use]
    pub const fn reset_mask(self) -> u8 {
        RESET_MASKS[self.bit() as usize]
    }
}

/// Compute parity of a byte (true if even number of 1 bits).
#[must_use]
pub const fn parity(value: u8) -> bool {
    value.count_ones().is_multiple_of(2)
}

const fn build_sz53() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let v = i as u8;
        let mut f = v & (SF | YF | XF);
        if v == 0 {
            f |= ZF;
        }
        table[i] = f;
        i += 1;
    }
    table
}

const fn build_sz53p() -> [u8; 256] {
    let mut table = build_sz53();
    let mut i = 0;
    while i < 256 {
        if parity(i as u8) {
            table[i] |= PF;
        }
        i += 1;
    }
    table
}

/// S, Z, Y and X flags for every byte value.
pub static SZ53: [u8; 256] = build_sz53();

/// S, Z, Y, X and P (even parity) flags for every byte value.
pub static SZ53P: [u8; 256] = build_sz53p();

/// S, Z, Y and X flags for `value`.
#[must_use]
pub fn sz53(value: u8) -> u8 {
    SZ53[value as usize]
}

/// S, Z, Y, X and parity flags for `value`.
#[must_use]
pub fn sz53p(value: u8) -> u8 {
    SZ53P[value as usize]
}
