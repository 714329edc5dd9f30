//! ALU operations for the Z80.
//!
//! Every function is pure: it takes operand values (and the incoming flags
//! where the result depends on them) and returns the new value and flags.

use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, parity, sz53, sz53p};

/// Result of an ALU operation with flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

impl AluResult {
    const fn new(value: u8, flags: u8) -> Self {
        Self { value, flags }
    }
}

/// Add two bytes with optional carry, returning result and flags.
#[must_use]
pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let result16 = u16::from(a) + u16::from(b) + u16::from(c);
    let result = result16 as u8;

    let mut flags = sz53(result);
    if (a & 0x0F) + (b & 0x0F) + c > 0x0F {
        flags |= HF;
    }
    // Both operands same sign, result different sign
    if (a ^ b) & 0x80 == 0 && (a ^ result) & 0x80 != 0 {
        flags |= PF;
    }
    if result16 > 0xFF {
        flags |= CF;
    }
    AluResult::new(result, flags)
}

/// Subtract two bytes with optional borrow, returning result and flags.
#[must_use]
pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let result = a.wrapping_sub(b).wrapping_sub(c);

    let mut flags = sz53(result) | NF;
    if (a & 0x0F) < (b & 0x0F) + c {
        flags |= HF;
    }
    // Operands different sign, result same sign as subtrahend
    if (a ^ b) & 0x80 != 0 && (b ^ result) & 0x80 == 0 {
        flags |= PF;
    }
    if u16::from(a) < u16::from(b) + u16::from(c) {
        flags |= CF;
    }
    AluResult::new(result, flags)
}

#[must_use]
pub fn and8(a: u8, b: u8) -> AluResult {
    let result = a & b;
    AluResult::new(result, sz53p(result) | HF)
}

#[must_use]
pub fn or8(a: u8, b: u8) -> AluResult {
    let result = a | b;
    AluResult::new(result, sz53p(result))
}

#[must_use]
pub fn xor8(a: u8, b: u8) -> AluResult {
    let result = a ^ b;
    AluResult::new(result, sz53p(result))
}

/// Compare (subtract without storing result).
#[must_use]
pub fn cp8(a: u8, b: u8) -> AluResult {
    let mut result = sub8(a, b, false);
    // For CP, undocumented flags come from operand, not result
    result.flags = (result.flags & !(YF | XF)) | (b & (YF | XF));
    result
}

/// One of the eight accumulator operations selected by bits 5-3 of the
/// opcode (ADD ADC SUB SBC AND XOR OR CP). Returns the new A (unchanged for
/// CP) and the full flag byte.
#[must_use]
pub fn accumulator_op(op: u8, a: u8, value: u8, carry: bool) -> AluResult {
    match op & 7 {
        0 => add8(a, value, false),
        1 => add8(a, value, carry),
        2 => sub8(a, value, false),
        3 => sub8(a, value, carry),
        4 => and8(a, value),
        5 => xor8(a, value),
        6 => or8(a, value),
        _ => {
            let r = cp8(a, value);
            AluResult::new(a, r.flags)
        }
    }
}

/// Increment byte. Carry is not affected; caller merges it in.
#[must_use]
pub fn inc8(a: u8) -> AluResult {
    let result = a.wrapping_add(1);
    let mut flags = sz53(result);
    if a & 0x0F == 0x0F {
        flags |= HF;
    }
    if a == 0x7F {
        flags |= PF;
    }
    AluResult::new(result, flags)
}

/// Decrement byte. Carry is not affected; caller merges it in.
#[must_use]
pub fn dec8(a: u8) -> AluResult {
    let result = a.wrapping_sub(1);
    let mut flags = sz53(result) | NF;
    if a & 0x0F == 0x00 {
        flags |= HF;
    }
    if a == 0x80 {
        flags |= PF;
    }
    AluResult::new(result, flags)
}

/// NEG: two's complement of A.
#[must_use]
pub fn neg8(a: u8) -> AluResult {
    sub8(0, a, false)
}

/// Decimal adjust A after BCD addition or subtraction.
#[must_use]
pub fn daa(a: u8, f: u8) -> AluResult {
    let nf = f & NF != 0;
    let cf = f & CF != 0;
    let hf = f & HF != 0;

    let mut correction: u8 = 0;
    let mut new_cf = cf;
    if hf || (a & 0x0F) > 9 {
        correction |= 0x06;
    }
    if cf || a > 0x99 {
        correction |= 0x60;
        new_cf = true;
    }

    let result = if nf {
        a.wrapping_sub(correction)
    } else {
        a.wrapping_add(correction)
    };
    let new_hf = if nf {
        hf && (a & 0x0F) < 6
    } else {
        (a & 0x0F) > 9
    };

    let mut flags = sz53p(result) | (f & NF);
    if new_cf {
        flags |= CF;
    }
    if new_hf {
        flags |= HF;
    }
    AluResult::new(result, flags)
}

/// CB-table rotate/shift selected by bits 5-3 of the opcode
/// (RLC RRC RL RR SLA SRA SLL SRL).
#[must_use]
pub fn rotate_shift(op: u8, value: u8, carry: bool) -> AluResult {
    let (result, out) = match op & 7 {
        0 => (value.rotate_left(1), value >> 7),
        1 => (value.rotate_right(1), value & 1),
        2 => ((value << 1) | u8::from(carry), value >> 7),
        3 => ((value >> 1) | (u8::from(carry) << 7), value & 1),
        4 => (value << 1, value >> 7),
        5 => ((value >> 1) | (value & 0x80), value & 1),
        // SLL (undocumented): shifts a 1 into bit 0
        6 => ((value << 1) | 1, value >> 7),
        _ => (value >> 1, value & 1),
    };
    AluResult::new(result, sz53p(result) | out)
}

/// Accumulator rotates RLCA RRCA RLA RRA, selected by bits 4-3 of the
/// opcode. S, Z and P/V survive from `f`; X/Y come from the new A.
#[must_use]
pub fn rotate_accumulator(op: u8, a: u8, f: u8) -> AluResult {
    let carry = f & CF != 0;
    let (result, out) = match op & 3 {
        0 => (a.rotate_left(1), a >> 7),
        1 => (a.rotate_right(1), a & 1),
        2 => ((a << 1) | u8::from(carry), a >> 7),
        _ => ((a >> 1) | (u8::from(carry) << 7), a & 1),
    };
    AluResult::new(result, (f & (SF | ZF | PF)) | (result & (YF | XF)) | out)
}

/// BIT n: flags only. `xy_source` supplies bits 5 and 3, which differ
/// between the register, `(HL)` and indexed forms.
#[must_use]
pub fn bit(n: u8, value: u8, xy_source: u8, f: u8) -> u8 {
    let tested = value & (1 << (n & 7));
    let mut flags = (f & CF) | HF | (xy_source & (YF | XF));
    if tested == 0 {
        flags |= ZF | PF;
    }
    if tested & 0x80 != 0 {
        flags |= SF;
    }
    flags
}

#[must_use]
pub fn cpl(a: u8, f: u8) -> AluResult {
    let result = !a;
    AluResult::new(
        result,
        (f & (SF | ZF | PF | CF)) | HF | NF | (result & (YF | XF)),
    )
}

/// SCF. `q` is the flag value written by the previous instruction, or 0 if
/// it left the flags alone.
#[must_use]
pub fn scf(a: u8, f: u8, q: u8) -> u8 {
    (f & (SF | ZF | PF)) | CF | (((q ^ f) | a) & (YF | XF))
}

/// CCF. H takes the old carry.
#[must_use]
pub fn ccf(a: u8, f: u8, q: u8) -> u8 {
    let old_carry = f & CF != 0;
    (f & (SF | ZF | PF))
        | if old_carry { HF } else { CF }
        | (((q ^ f) | a) & (YF | XF))
}

/// 16-bit add for HL/IX/IY. Only H, C, X and Y are produced; the caller
/// keeps S, Z and P/V.
#[must_use]
pub fn add16(a: u16, b: u16) -> (u16, u8) {
    let result32 = u32::from(a) + u32::from(b);
    let result = result32 as u16;

    let mut flags = ((result >> 8) as u8) & (YF | XF);
    if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
        flags |= HF;
    }
    if result32 > 0xFFFF {
        flags |= CF;
    }
    (result, flags)
}

/// 16-bit add with carry for HL.
#[must_use]
pub fn adc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let result32 = u32::from(a) + u32::from(b) + u32::from(c);
    let result = result32 as u16;

    let mut flags = ((result >> 8) as u8) & (SF | YF | XF);
    if result == 0 {
        flags |= ZF;
    }
    if (a & 0x0FFF) + (b & 0x0FFF) + c > 0x0FFF {
        flags |= HF;
    }
    if (a ^ b) & 0x8000 == 0 && (a ^ result) & 0x8000 != 0 {
        flags |= PF;
    }
    if result32 > 0xFFFF {
        flags |= CF;
    }
    (result, flags)
}

/// 16-bit subtract with borrow for HL.
#[must_use]
pub fn sbc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let result = a.wrapping_sub(b).wrapping_sub(c);

    let mut flags = (((result >> 8) as u8) & (SF | YF | XF)) | NF;
    if result == 0 {
        flags |= ZF;
    }
    if (a & 0x0FFF) < (b & 0x0FFF) + c {
        flags |= HF;
    }
    if (a ^ b) & 0x8000 != 0 && (b ^ result) & 0x8000 == 0 {
        flags |= PF;
    }
    if u32::from(a) < u32::from(b) + u32::from(c) {
        flags |= CF;
    }
    (result, flags)
}

/// LDI/LDD flags. `n = value + A`; Y is bit 1 of n, X is bit 3 of n.
#[must_use]
pub fn block_load_flags(value: u8, a: u8, bc_after: u16, f: u8) -> u8 {
    let n = value.wrapping_add(a);
    (f & (SF | ZF | CF))
        | (n & XF)
        | if n & 0x02 != 0 { YF } else { 0 }
        | if bc_after != 0 { PF } else { 0 }
}

/// CPI/CPD flags. `n = A - value - H`; X/Y follow the LDI rule.
#[must_use]
pub fn block_compare_flags(a: u8, value: u8, bc_after: u16, f: u8) -> u8 {
    let result = a.wrapping_sub(value);
    let hf = (a & 0x0F) < (value & 0x0F);
    let n = result.wrapping_sub(u8::from(hf));
    (f & CF)
        | NF
        | (sz53(result) & (SF | ZF))
        | if hf { HF } else { 0 }
        | (n & XF)
        | if n & 0x02 != 0 { YF } else { 0 }
        | if bc_after != 0 { PF } else { 0 }
}

/// INI/IND/OUTI/OUTD flags.
///
/// `k` is the transferred byte plus `C±1` (input) or the updated L (output).
#[must_use]
pub fn block_io_flags(value: u8, k: u16, b_after: u8) -> u8 {
    let mut flags = sz53(b_after);
    if value & 0x80 != 0 {
        flags |= NF;
    }
    if k > 0xFF {
        flags |= HF | CF;
    }
    if parity(((k as u8) & 7) ^ b_after) {
        flags |= PF;
    }
    flags
}

/// Flag adjustment applied when a repeating block instruction goes round
/// again: X/Y come from the high byte of the instruction address.
#[must_use]
pub fn block_repeat_flags(f: u8, pc: u16) -> u8 {
    (f & !(YF | XF)) | (((pc >> 8) as u8) & (YF | XF))
}

/// INIR/INDR/OTIR/OTDR repeat adjustment on top of [`block_repeat_flags`].
/// H and P/V are recomputed from the interrupted B decrement.
#[must_use]
pub fn block_io_repeat_flags(f: u8, pc: u16, value: u8, k: u16, b_after: u8) -> u8 {
    let base = block_repeat_flags(f, pc) & !(HF | PF);
    let p = ((k as u8) & 7) ^ b_after;
    let (hf, pf) = if k > 0xFF {
        if value & 0x80 != 0 {
            (b_after & 0x0F == 0, parity(p ^ (b_after.wrapping_sub(1) & 7)))
        } else {
            (b_after & 0x0F == 0x0F, parity(p ^ (b_after.wrapping_add(1) & 7)))
        }
    } else {
        (false, parity(p ^ (b_after & 7)))
    };
    base | if hf { HF } else { 0 } | if pf { PF } else { 0 }
}

/// RLD/RRD flags. Carry survives from `f`.
#[must_use]
pub fn rotate_digit_flags(a: u8, f: u8) -> u8 {
    sz53p(a) | (f & CF)
}

/// `LD A,I` / `LD A,R` flags: P/V reports IFF2.
#[must_use]
pub fn load_ir_flags(a: u8, f: u8, iff2: bool) -> u8 {
    sz53(a) | (f & CF) | if iff2 { PF } else { 0 }
}

/// `IN r,(C)` flags.
#[must_use]
pub fn in_flags(value: u8, f: u8) -> u8 {
    sz53p(value) | (f & CF)
}
