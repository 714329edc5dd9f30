//! Instruction-level behaviour: flags, timing, interrupts and the driver.

use std::sync::mpsc;

use proptest::prelude::*;
use rstest::rstest;
use tact_core::{Bus, Cpu, ReadResult, SimpleBus, Tacts};
use tact_z80::{
    CF, ConfigError, CpuState, InterruptMode, OpKind, OpcodeTable, Operand, PF, Reg8, Reg16,
    Registers, StepEvent, XF, YF, Z80, ZF, lookup,
};

fn load(code: &[u8]) -> (Z80, SimpleBus) {
    let mut bus = SimpleBus::new();
    bus.load(0, code);
    (Z80::new(), bus)
}

/// CPU with interrupts enabled in `mode`, PC at `pc`.
fn enabled(mode: InterruptMode, pc: u16) -> Z80 {
    let mut cpu = Z80::new();
    let mut state = cpu.snapshot();
    state.registers.set_pc(pc);
    state.registers.set_sp(0x8000);
    state.iff1 = true;
    state.iff2 = true;
    state.interrupt_mode = mode;
    cpu.restore(&state);
    cpu
}

fn pop(bus: &SimpleBus, sp: u16) -> u16 {
    u16::from_le_bytes([bus.peek(sp), bus.peek(sp.wrapping_add(1))])
}

// =============================================================================
// Flags
// =============================================================================

#[test]
fn sla_ignores_incoming_carry() {
    let (mut cpu, mut bus) = load(&[0xCB, 0x20]); // SLA B
    cpu.regs_mut().set_b(0x08);
    cpu.regs_mut().set_f(CF);

    assert_eq!(cpu.execute_instruction(&mut bus), 8);
    assert_eq!(cpu.regs().b(), 0x10);
    assert_eq!(cpu.regs().f(), 0);
}

#[test]
fn sla_indexed_copies_result_to_register() {
    let (mut cpu, mut bus) = load(&[0xDD, 0xCB, 0x05, 0x20]); // SLA (IX+5),B
    bus.load(0x4005, &[0x81]);
    cpu.regs_mut().set_ix(0x4000);

    assert_eq!(cpu.execute_instruction(&mut bus), 23);
    assert_eq!(bus.peek(0x4005), 0x02);
    assert_eq!(cpu.regs().b(), 0x02);
    assert_eq!(cpu.regs().f(), CF);
    assert_eq!(cpu.regs().wz(), 0x4005);
}

#[test]
fn negative_displacement() {
    let (mut cpu, mut bus) = load(&[0xFD, 0x7E, 0xFE]); // LD A,(IY-2)
    bus.load(0x3FFE, &[0x5A]);
    cpu.regs_mut().set_iy(0x4000);

    assert_eq!(cpu.execute_instruction(&mut bus), 19);
    assert_eq!(cpu.regs().a(), 0x5A);
}

#[test]
fn scf_takes_xy_from_q() {
    let (mut cpu, mut bus) = load(&[0x37, 0x37]); // SCF; SCF
    cpu.regs_mut().set_a(0);
    cpu.regs_mut().set_f(YF | XF);

    cpu.execute_instruction(&mut bus);
    assert_eq!(cpu.regs().f() & (YF | XF), YF | XF);

    // Previous instruction wrote F, so X/Y now come from A only
    cpu.execute_instruction(&mut bus);
    assert_eq!(cpu.regs().f() & (YF | XF), 0);
    assert_eq!(cpu.regs().f() & CF, CF);
}

#[test]
fn daa_after_bcd_add() {
    let (mut cpu, mut bus) = load(&[0x80, 0x27]); // ADD A,B; DAA
    cpu.regs_mut().set_a(0x19);
    cpu.regs_mut().set_b(0x28);

    cpu.execute_instruction(&mut bus);
    cpu.execute_instruction(&mut bus);
    assert_eq!(cpu.regs().a(), 0x47);
    assert_eq!(cpu.regs().f() & CF, 0);
}

#[test]
fn bit_hl_takes_xy_from_memptr() {
    let (mut cpu, mut bus) = load(&[0xCB, 0x46]); // BIT 0,(HL)
    cpu.regs_mut().set_hl(0x4000);
    cpu.regs_mut().set_wz(0x2800);

    assert_eq!(cpu.execute_instruction(&mut bus), 12);
    assert_eq!(cpu.regs().f() & (YF | XF), YF | XF);
    assert_eq!(cpu.regs().f() & ZF, ZF);
}

// =============================================================================
// Registers
// =============================================================================

#[test]
fn untouched_registers_keep_their_values() {
    let (mut cpu, mut bus) = load(&[0x41]); // LD B,C
    {
        let regs = cpu.regs_mut();
        regs.set_af(0x1122);
        regs.set_bc(0x3344);
        regs.set_de(0x5566);
        regs.set_hl(0x7788);
        regs.set_af_alt(0x99AA);
        regs.set_bc_alt(0xBBCC);
        regs.set_de_alt(0xDDEE);
        regs.set_hl_alt(0xFF01);
        regs.set_ix(0x2345);
        regs.set_iy(0x6789);
        regs.set_sp(0xABCD);
        regs.set_ir(0x1280);
        regs.set_wz(0xEF01);
    }
    let mut expected = *cpu.regs();
    expected.set_b(0x44);
    expected.set_pc(1);
    expected.increment_r();

    cpu.execute_instruction(&mut bus);
    assert_eq!(*cpu.regs(), expected);
    // Bit 7 of R survives the refresh
    assert_eq!(cpu.regs().r(), 0x81);
}

#[test]
fn exx_twice_restores_pairs() {
    let (mut cpu, mut bus) = load(&[0xD9, 0xD9]);
    cpu.regs_mut().set_bc(0x1234);
    cpu.regs_mut().set_de(0x5678);
    cpu.regs_mut().set_hl(0x9ABC);

    cpu.execute_instruction(&mut bus);
    assert_eq!(cpu.regs().bc_alt(), 0x1234);
    assert_eq!(cpu.regs().bc(), 0);

    cpu.execute_instruction(&mut bus);
    assert_eq!(cpu.regs().bc(), 0x1234);
    assert_eq!(cpu.regs().de(), 0x5678);
    assert_eq!(cpu.regs().hl(), 0x9ABC);
}

#[test]
fn index_halves_replace_h_and_l() {
    let (mut cpu, mut bus) = load(&[0xDD, 0x65]); // LD IXH,IXL
    cpu.regs_mut().set_ix(0x12EF);
    cpu.regs_mut().set_hl(0x3344);

    assert_eq!(cpu.execute_instruction(&mut bus), 8);
    assert_eq!(cpu.regs().ix(), 0xEFEF);
    assert_eq!(cpu.regs().hl(), 0x3344);
}

#[test]
fn indexed_memory_form_keeps_h() {
    let (mut cpu, mut bus) = load(&[0xDD, 0x66, 0x01]); // LD H,(IX+1)
    bus.load(0x4001, &[0x77]);
    cpu.regs_mut().set_ix(0x4000);

    cpu.execute_instruction(&mut bus);
    assert_eq!(cpu.regs().h(), 0x77);
    assert_eq!(cpu.regs().ix(), 0x4000);
}

/// One instruction and the registers it may write, besides PC, R and WZ.
#[derive(Debug, Clone)]
struct RegisterEffect {
    code: Vec<u8>,
    bytes: Vec<Reg8>,
    pairs: Vec<Reg16>,
    writes_wz: bool,
}

impl RegisterEffect {
    fn new(code: &[u8], bytes: &[Reg8], pairs: &[Reg16]) -> Self {
        Self {
            code: code.to_vec(),
            bytes: bytes.to_vec(),
            pairs: pairs.to_vec(),
            writes_wz: false,
        }
    }

    fn with_wz(self) -> Self {
        Self { writes_wz: true, ..self }
    }
}

/// H and L name the index halves once DD or FD is in effect.
fn index_half(code: u8, prefix: u8) -> Reg8 {
    match (Reg8::from_code(code), prefix) {
        (Reg8::H, 0xDD) => Reg8::Ixh,
        (Reg8::L, 0xDD) => Reg8::Ixl,
        (Reg8::H, _) => Reg8::Iyh,
        (Reg8::L, _) => Reg8::Iyl,
        (reg, _) => reg,
    }
}

fn register_effects() -> Vec<RegisterEffect> {
    let mut effects = Vec::new();

    for op in 0x40..=0x7Fu8 {
        let (y, z) = ((op >> 3) & 7, op & 7);
        if y != 6 && z != 6 {
            effects.push(RegisterEffect::new(&[op], &[Reg8::from_code(y)], &[]));
        }
    }
    for op in 0x80..=0xBFu8 {
        if op & 7 != 6 {
            // CP leaves A alone
            let bytes: &[Reg8] = if op >= 0xB8 { &[Reg8::F] } else { &[Reg8::A, Reg8::F] };
            effects.push(RegisterEffect::new(&[op], bytes, &[]));
        }
    }
    for y in [0, 1, 2, 3, 4, 5, 7] {
        let reg = Reg8::from_code(y);
        effects.push(RegisterEffect::new(&[0x04 | (y << 3)], &[reg, Reg8::F], &[]));
        effects.push(RegisterEffect::new(&[0x05 | (y << 3)], &[reg, Reg8::F], &[]));
    }

    effects.push(RegisterEffect::new(&[0xEB], &[], &[Reg16::De, Reg16::Hl]));
    effects.push(RegisterEffect::new(&[0x08], &[], &[Reg16::Af, Reg16::AfAlt]));
    effects.push(RegisterEffect::new(
        &[0xD9],
        &[],
        &[Reg16::Bc, Reg16::De, Reg16::Hl, Reg16::BcAlt, Reg16::DeAlt, Reg16::HlAlt],
    ));
    effects.push(RegisterEffect::new(&[0xE3], &[], &[Reg16::Hl]).with_wz());
    for (p, pair) in [Reg16::Bc, Reg16::De, Reg16::Hl, Reg16::Af].into_iter().enumerate() {
        let p = p as u8;
        effects.push(RegisterEffect::new(&[0xC5 | (p << 4)], &[], &[Reg16::Sp]));
        effects.push(RegisterEffect::new(&[0xC1 | (p << 4)], &[], &[Reg16::Sp, pair]));
    }

    for (prefix, index) in [(0xDD, Reg16::Ix), (0xFD, Reg16::Iy)] {
        for op in 0x40..=0x7Fu8 {
            let (y, z) = ((op >> 3) & 7, op & 7);
            let touches_half = matches!(y, 4 | 5) || matches!(z, 4 | 5);
            if y != 6 && z != 6 && touches_half {
                effects.push(RegisterEffect::new(&[prefix, op], &[index_half(y, prefix)], &[]));
            }
        }
        for op in [0x84, 0x85, 0x8C, 0x95, 0xA4, 0xAD, 0xB4] {
            effects.push(RegisterEffect::new(&[prefix, op], &[Reg8::A, Reg8::F], &[]));
        }
        effects.push(RegisterEffect::new(&[prefix, 0xBD], &[Reg8::F], &[]));
        for y in [4, 5] {
            let half = index_half(y, prefix);
            effects.push(RegisterEffect::new(&[prefix, 0x04 | (y << 3)], &[half, Reg8::F], &[]));
            effects.push(RegisterEffect::new(&[prefix, 0x05 | (y << 3)], &[half, Reg8::F], &[]));
            effects.push(RegisterEffect::new(&[prefix, 0x06 | (y << 3), 0x5A], &[half], &[]));
        }
        effects.push(RegisterEffect::new(&[prefix, 0xE5], &[], &[Reg16::Sp]));
        effects.push(RegisterEffect::new(&[prefix, 0xE1], &[], &[Reg16::Sp, index]));
        effects.push(RegisterEffect::new(&[prefix, 0xE3], &[], &[index]).with_wz());
    }

    effects
}

fn register_file(values: [u16; 13]) -> Registers {
    let [af, bc, de, hl, af_alt, bc_alt, de_alt, hl_alt, ix, iy, sp, ir, wz] = values;
    let mut regs = Registers::new();
    regs.set_af(af);
    regs.set_bc(bc);
    regs.set_de(de);
    regs.set_hl(hl);
    regs.set_af_alt(af_alt);
    regs.set_bc_alt(bc_alt);
    regs.set_de_alt(de_alt);
    regs.set_hl_alt(hl_alt);
    regs.set_ix(ix);
    regs.set_iy(iy);
    regs.set_sp(sp);
    regs.set_ir(ir);
    regs.set_wz(wz);
    regs
}

proptest! {
    #[test]
    fn only_named_registers_change(
        values in any::<[u16; 13]>(),
        effect in prop::sample::select(register_effects()),
    ) {
        let (mut cpu, mut bus) = load(&effect.code);
        *cpu.regs_mut() = register_file(values);
        let before = *cpu.regs();

        cpu.execute_instruction(&mut bus);
        let after = *cpu.regs();

        let mut expected = before;
        for &reg in &effect.bytes {
            expected.set8(reg, after.get8(reg));
        }
        for &pair in &effect.pairs {
            expected.set16(pair, after.get16(pair));
        }
        if effect.writes_wz {
            expected.set_wz(after.wz());
        }
        expected.set_pc(effect.code.len() as u16);
        expected.increment_r();
        if matches!(effect.code[0], 0xDD | 0xFD) {
            expected.increment_r();
        }

        prop_assert_eq!(after, expected, "{:02X?}", effect.code);
    }
}

// =============================================================================
// Timing
// =============================================================================

#[rstest]
#[case::nop(&[0x00], 4)]
#[case::add_a_b(&[0x80], 4)]
#[case::add_a_hl(&[0x86], 7)]
#[case::add_a_ix(&[0xDD, 0x86, 0x05], 19)]
#[case::ld_b_n(&[0x06, 0x12], 7)]
#[case::ld_bc_nn(&[0x01, 0x34, 0x12], 10)]
#[case::ld_ix_n(&[0xDD, 0x36, 0x01, 0x02], 19)]
#[case::inc_ix(&[0xDD, 0x34, 0x01], 23)]
#[case::rlc_hl(&[0xCB, 0x06], 15)]
#[case::bit_hl(&[0xCB, 0x46], 12)]
#[case::bit_ix(&[0xDD, 0xCB, 0x01, 0x46], 20)]
#[case::add_hl_bc(&[0x09], 11)]
#[case::adc_hl_bc(&[0xED, 0x4A], 15)]
#[case::push(&[0xC5], 11)]
#[case::pop(&[0xC1], 10)]
#[case::ex_sp_hl(&[0xE3], 19)]
#[case::jr(&[0x18, 0x00], 12)]
#[case::djnz_taken(&[0x10, 0x00], 13)]
#[case::jr_nz_not_taken(&[0x20, 0x00], 7)]
#[case::jp(&[0xC3, 0x00, 0x00], 10)]
#[case::out_n_a(&[0xD3, 0x10], 11)]
#[case::in_a_n(&[0xDB, 0x10], 11)]
#[case::in_a_c(&[0xED, 0x78], 12)]
#[case::ld_a_nn(&[0x3A, 0x00, 0x00], 13)]
#[case::ld_nn_a(&[0x32, 0x00, 0x00], 13)]
#[case::ld_nn_hl(&[0x22, 0x00, 0x00], 16)]
#[case::ld_nn_bc(&[0xED, 0x43, 0x00, 0x00], 20)]
#[case::ld_ix_nn(&[0xDD, 0x21, 0x00, 0x00], 14)]
#[case::ld_sp_hl(&[0xF9], 6)]
#[case::inc_bc(&[0x03], 6)]
#[case::rst(&[0xFF], 11)]
#[case::call_nz_not_taken(&[0xC4, 0x00, 0x00], 10)]
#[case::call_z_taken(&[0xCC, 0x00, 0x00], 17)]
#[case::ret_nz_not_taken(&[0xC0], 5)]
#[case::ret_z_taken(&[0xC8], 11)]
#[case::rrd(&[0xED, 0x67], 18)]
#[case::ld_a_i(&[0xED, 0x57], 9)]
#[case::jp_ix(&[0xDD, 0xE9], 8)]
#[case::prefixed_nop(&[0xDD, 0x00], 8)]
#[case::ex_de_hl(&[0xEB], 4)]
#[case::halt(&[0x76], 4)]
fn instruction_timing(#[case] code: &[u8], #[case] expected: u64) {
    // Power-on F is 0xFF, so Z is set
    let (mut cpu, mut bus) = load(code);
    assert_eq!(cpu.execute_instruction(&mut bus), expected);
    assert_eq!(cpu.tacts(), Tacts::new(expected));
}

#[test]
fn every_table_entry_costs_its_listed_tstates() {
    let tables: [(OpcodeTable, &[u8]); 7] = [
        (OpcodeTable::Main, &[]),
        (OpcodeTable::Bit, &[0xCB]),
        (OpcodeTable::Extended, &[0xED]),
        (OpcodeTable::Indexed, &[0xDD]),
        (OpcodeTable::Indexed, &[0xFD]),
        // The displacement sits between CB and the opcode
        (OpcodeTable::IndexedBit, &[0xDD, 0xCB, 0x00]),
        (OpcodeTable::IndexedBit, &[0xFD, 0xCB, 0x00]),
    ];

    for (table, prefix) in tables {
        for opcode in 0..=0xFFu8 {
            let entry = lookup(table, opcode);
            if matches!(entry.kind, OpKind::Prefix) {
                continue;
            }

            let mut code = prefix.to_vec();
            code.push(opcode);
            code.extend_from_slice(&[0x00, 0x40][..entry.operand_bytes as usize]);

            // BC = 1 ends LDIR/CPIR after one pass
            let cost = |f: u8| {
                let (mut cpu, mut bus) = load(&code);
                let regs = cpu.regs_mut();
                regs.set_f(f);
                regs.set_sp(0x8000);
                regs.set_bc(0x0001);
                regs.set_de(0x5000);
                regs.set_hl(0x4000);
                regs.set_ix(0x4000);
                regs.set_iy(0x4000);
                cpu.execute_instruction(&mut bus)
            };
            let costs = [0x00, 0xFF].map(cost);

            let taken = u64::from(entry.tstates());
            let not_taken = entry.alt_tstates.map_or(taken, u64::from);
            for t in costs {
                assert!(
                    t == taken || t == not_taken,
                    "{table:?} {prefix:02X?} {opcode:02X}: {t} T, listed {taken}/{not_taken}"
                );
            }
            if matches!(entry.dst, Operand::Condition(_)) && not_taken != taken {
                assert_ne!(costs[0], costs[1], "{table:?} {prefix:02X?} {opcode:02X}");
            }
        }
    }
}

#[test]
fn execute_cpu_cycle_steps_one_bus_access() {
    let (mut cpu, mut bus) = load(&[0x01, 0x34, 0x12]); // LD BC,$1234

    cpu.execute_cpu_cycle(&mut bus);
    assert_eq!(cpu.tacts().get(), 4);
    assert!(!cpu.is_at_instruction_boundary());

    cpu.execute_cpu_cycle(&mut bus);
    assert_eq!(cpu.tacts().get(), 7);
    assert_eq!(cpu.regs().bc(), 0);

    cpu.execute_cpu_cycle(&mut bus);
    assert_eq!(cpu.tacts().get(), 10);
    assert!(cpu.is_at_instruction_boundary());
    assert_eq!(cpu.regs().bc(), 0x1234);
}

/// SimpleBus that adds one wait state to every memory read.
struct SlowBus(SimpleBus);

impl Bus for SlowBus {
    fn read(&mut self, address: u16, opcode_fetch: bool) -> ReadResult {
        ReadResult::with_wait(self.0.read(address, opcode_fetch).data, 1)
    }

    fn write(&mut self, address: u16, value: u8) -> u8 {
        self.0.write(address, value)
    }

    fn io_read(&mut self, port: u16) -> ReadResult {
        self.0.io_read(port)
    }

    fn io_write(&mut self, port: u16, value: u8) -> u8 {
        self.0.io_write(port, value)
    }

    fn peek(&self, address: u16) -> u8 {
        self.0.peek(address)
    }
}

#[test]
fn wait_states_are_charged() {
    let mut inner = SimpleBus::new();
    inner.load(0, &[0x3E, 0x42]); // LD A,$42
    let mut bus = SlowBus(inner);
    let mut cpu = Z80::new();

    assert_eq!(cpu.execute_instruction(&mut bus), 9);
    assert_eq!(cpu.regs().a(), 0x42);
}

#[test]
fn delay_and_set_tacts() {
    let (mut cpu, mut bus) = load(&[0x00]);
    cpu.delay(3);
    cpu.execute_instruction(&mut bus);
    assert_eq!(cpu.tacts().get(), 7);

    cpu.set_tacts(Tacts::ZERO);
    assert_eq!(cpu.tacts(), Tacts::ZERO);
}

// =============================================================================
// Calls and halt
// =============================================================================

#[test]
fn call_and_ret_are_symmetric() {
    let (mut cpu, mut bus) = load(&[0xCD, 0x00, 0x10]); // CALL $1000
    bus.load(0x1000, &[0xC9]); // RET
    cpu.regs_mut().set_sp(0x8000);

    assert_eq!(cpu.execute_instruction(&mut bus), 17);
    assert_eq!(cpu.regs().pc(), 0x1000);
    assert_eq!(cpu.regs().sp(), 0x7FFE);
    assert_eq!(pop(&bus, 0x7FFE), 0x0003);

    assert_eq!(cpu.execute_instruction(&mut bus), 10);
    assert_eq!(cpu.regs().pc(), 0x0003);
    assert_eq!(cpu.regs().sp(), 0x8000);
}

#[test]
fn halt_spins_without_moving_pc() {
    let (mut cpu, mut bus) = load(&[0x76]);

    cpu.execute_instruction(&mut bus);
    assert!(cpu.is_halted());
    let pc = cpu.regs().pc();
    assert_eq!(pc, 1);

    for n in 1..=5 {
        cpu.execute_cpu_cycle(&mut bus);
        assert_eq!(cpu.regs().pc(), pc);
        assert_eq!(cpu.tacts().get(), 4 + 4 * n);
    }
    assert!(cpu.is_halted());
}

#[test]
fn nmi_wakes_halt() {
    let (mut cpu, mut bus) = load(&[0x76]);
    cpu.regs_mut().set_sp(0x8000);
    cpu.execute_instruction(&mut bus);

    cpu.request_nmi();
    assert_eq!(cpu.execute_instruction(&mut bus), 11);
    assert!(!cpu.is_halted());
    assert_eq!(cpu.regs().pc(), 0x0066);
    assert_eq!(pop(&bus, cpu.regs().sp()), 0x0001);
}

// =============================================================================
// Interrupts
// =============================================================================

#[test]
fn ei_delays_acceptance_by_one_instruction() {
    let (mut cpu, mut bus) = load(&[0xED, 0x56, 0xFB, 0x00, 0x00]); // IM 1; EI; NOP
    cpu.regs_mut().set_sp(0x8000);
    cpu.execute_instruction(&mut bus);
    cpu.execute_instruction(&mut bus);
    cpu.request_interrupt();

    // The NOP after EI runs first
    assert_eq!(cpu.execute_instruction(&mut bus), 4);
    assert_eq!(cpu.regs().pc(), 4);

    assert_eq!(cpu.execute_instruction(&mut bus), 13);
    assert_eq!(cpu.regs().pc(), 0x0038);
    assert_eq!(pop(&bus, cpu.regs().sp()), 4);
    assert!(!cpu.iff1());
    assert!(!cpu.iff2());
    assert!(!cpu.is_interrupt_pending());
}

#[test]
fn masked_interrupt_stays_pending() {
    let (mut cpu, mut bus) = load(&[0x00, 0x00]);
    cpu.request_interrupt();

    assert_eq!(cpu.execute_instruction(&mut bus), 4);
    assert_eq!(cpu.regs().pc(), 1);
    assert!(cpu.is_interrupt_pending());

    cpu.clear_interrupt();
    assert!(!cpu.is_interrupt_pending());
}

#[test]
fn im2_reads_vector_table() {
    let mut bus = SimpleBus::new();
    bus.load(0x8020, &[0x34, 0x12]);
    bus.set_interrupt_data(0x21);
    let mut cpu = enabled(InterruptMode::Im2, 0x0100);
    cpu.regs_mut().set_i(0x80);

    cpu.request_interrupt();
    assert_eq!(cpu.execute_instruction(&mut bus), 19);
    assert_eq!(cpu.regs().pc(), 0x1234);
    assert_eq!(cpu.regs().wz(), 0x1234);
    assert_eq!(pop(&bus, cpu.regs().sp()), 0x0100);
}

#[rstest]
#[case::rst_08(0xCF, 0x0008)]
#[case::rst_28(0xEF, 0x0028)]
#[case::not_an_rst(0x00, 0x0038)]
fn im0_executes_rst_from_bus(#[case] data: u8, #[case] target: u16) {
    let mut bus = SimpleBus::new();
    bus.set_interrupt_data(data);
    let mut cpu = enabled(InterruptMode::Im0, 0x0200);

    cpu.request_interrupt();
    assert_eq!(cpu.execute_instruction(&mut bus), 13);
    assert_eq!(cpu.regs().pc(), target);
}

#[test]
fn interrupt_after_ld_a_i_clears_parity() {
    let (mut cpu, mut bus) = load(&[0xED, 0x57]); // LD A,I
    let mut state = cpu.snapshot();
    state.registers.set_sp(0x8000);
    state.iff1 = true;
    state.iff2 = true;
    state.interrupt_mode = InterruptMode::Im1;
    cpu.restore(&state);

    cpu.execute_instruction(&mut bus);
    assert_ne!(cpu.regs().f() & PF, 0);

    cpu.request_interrupt();
    cpu.execute_instruction(&mut bus);
    assert_eq!(cpu.regs().pc(), 0x0038);
    assert_eq!(cpu.regs().f() & PF, 0);
}

#[test]
fn retn_restores_iff1() {
    let mut bus = SimpleBus::new();
    bus.load(0x0066, &[0xED, 0x45]); // RETN
    let mut cpu = enabled(InterruptMode::Im1, 0x0300);

    cpu.request_nmi();
    cpu.execute_instruction(&mut bus);
    assert!(!cpu.iff1());
    assert!(cpu.iff2());

    assert_eq!(cpu.execute_instruction(&mut bus), 14);
    assert_eq!(cpu.regs().pc(), 0x0300);
    assert!(cpu.iff1());
}

#[test]
fn nmi_outranks_int() {
    let mut bus = SimpleBus::new();
    let mut cpu = enabled(InterruptMode::Im1, 0x0400);

    cpu.request_interrupt();
    cpu.request_nmi();
    cpu.execute_instruction(&mut bus);
    assert_eq!(cpu.regs().pc(), 0x0066);
    assert!(cpu.is_interrupt_pending());
}

#[test]
fn invalid_interrupt_mode_is_rejected() {
    let mut cpu = Z80::new();
    assert_eq!(
        cpu.set_interrupt_mode(3),
        Err(ConfigError::InvalidInterruptMode(3))
    );
    assert_eq!(cpu.interrupt_mode(), InterruptMode::Im0);
    assert!(cpu.set_interrupt_mode(2).is_ok());
    assert_eq!(cpu.interrupt_mode(), InterruptMode::Im2);
}

proptest! {
    #[test]
    fn im1_always_lands_on_0038(pc in any::<u16>()) {
        let mut bus = SimpleBus::new();
        let mut cpu = enabled(InterruptMode::Im1, pc);

        cpu.request_interrupt();
        prop_assert_eq!(cpu.execute_instruction(&mut bus), 13);
        prop_assert_eq!(cpu.regs().pc(), 0x0038);
        prop_assert!(!cpu.iff1());
        prop_assert!(!cpu.iff2());
    }

    #[test]
    fn nmi_saves_iff1_into_iff2(pc in any::<u16>(), iff1 in any::<bool>(), iff2 in any::<bool>()) {
        let mut bus = SimpleBus::new();
        let mut cpu = Z80::new();
        let mut state = cpu.snapshot();
        state.registers.set_pc(pc);
        state.registers.set_sp(0x8000);
        state.iff1 = iff1;
        state.iff2 = iff2;
        cpu.restore(&state);

        cpu.request_nmi();
        prop_assert_eq!(cpu.execute_instruction(&mut bus), 11);
        prop_assert_eq!(cpu.regs().pc(), 0x0066);
        prop_assert!(!cpu.iff1());
        prop_assert_eq!(cpu.iff2(), iff1);
        prop_assert_eq!(pop(&bus, 0x7FFE), pc);
    }

    #[test]
    fn exx_pairs_round_trip(
        bc in any::<u16>(),
        de in any::<u16>(),
        hl in any::<u16>(),
        alt in any::<u16>(),
    ) {
        let (mut cpu, mut bus) = load(&[0xD9, 0xD9]);
        cpu.regs_mut().set_bc(bc);
        cpu.regs_mut().set_de(de);
        cpu.regs_mut().set_hl(hl);
        cpu.regs_mut().set_bc_alt(alt);

        cpu.execute_instruction(&mut bus);
        prop_assert_eq!(cpu.regs().bc(), alt);
        cpu.execute_instruction(&mut bus);
        prop_assert_eq!(cpu.regs().bc(), bc);
        prop_assert_eq!(cpu.regs().de(), de);
        prop_assert_eq!(cpu.regs().hl(), hl);
        prop_assert_eq!(cpu.regs().bc_alt(), alt);
    }

    #[test]
    fn call_ret_restores_sp_and_pc(target in 0x1000u16..0x7000, sp in 0x8002u16..=0xFFFF) {
        let (mut cpu, mut bus) = load(&[0xCD]);
        bus.load(1, &target.to_le_bytes());
        bus.load(target, &[0xC9]);
        cpu.regs_mut().set_sp(sp);

        cpu.execute_instruction(&mut bus);
        prop_assert_eq!(cpu.regs().pc(), target);
        prop_assert_eq!(cpu.regs().sp(), sp - 2);
        prop_assert_eq!(pop(&bus, sp - 2), 3);

        cpu.execute_instruction(&mut bus);
        prop_assert_eq!(cpu.regs().pc(), 3);
        prop_assert_eq!(cpu.regs().sp(), sp);
    }
}

// =============================================================================
// Reset, state and debugging
// =============================================================================

#[test]
fn requested_reset_runs_at_boundary() {
    let (mut cpu, mut bus) = load(&[0x00, 0xFB, 0x00]); // NOP; EI
    cpu.execute_instruction(&mut bus);
    cpu.execute_instruction(&mut bus);
    assert!(cpu.iff1());
    cpu.regs_mut().set_ir(0x1234);
    let before = cpu.tacts();

    cpu.request_reset();
    cpu.execute_cpu_cycle(&mut bus);
    assert_eq!(cpu.regs().pc(), 0);
    assert_eq!(cpu.regs().ir(), 0);
    assert_eq!(cpu.regs().sp(), 0xFFFF);
    assert_eq!(cpu.regs().af(), 0xFFFF);
    assert!(!cpu.iff1());
    assert_eq!(cpu.interrupt_mode(), InterruptMode::Im0);
    assert_eq!(cpu.tacts(), before);
}

#[test]
fn snapshot_round_trip() {
    let (mut cpu, mut bus) = load(&[0x3E, 0x99, 0x06, 0x11]); // LD A,$99; LD B,$11
    cpu.execute_instruction(&mut bus);
    let state: CpuState = cpu.snapshot();

    cpu.execute_instruction(&mut bus);
    assert_eq!(cpu.regs().b(), 0x11);

    cpu.restore(&state);
    assert_eq!(cpu.snapshot(), state);
    assert_eq!(cpu.regs().pc(), 2);
}

#[test]
fn clone_is_independent() {
    let (mut cpu, mut bus) = load(&[0x3C, 0x3C]); // INC A; INC A
    cpu.regs_mut().set_a(0);
    let mut copy = cpu.clone();

    cpu.execute_instruction(&mut bus);
    cpu.execute_instruction(&mut bus);
    assert_eq!(cpu.regs().a(), 2);
    assert_eq!(copy.regs().a(), 0);

    let mut copy_bus = SimpleBus::new();
    copy_bus.load(0, &[0x3C]);
    copy.execute_instruction(&mut copy_bus);
    assert_eq!(copy.regs().a(), 1);
}

#[test]
fn observer_sees_call_and_return() {
    let (mut cpu, mut bus) = load(&[0xCD, 0x00, 0x10, 0x18, 0xFE]); // CALL $1000; JR $
    bus.load(0x1000, &[0xC9]);
    let (tx, rx) = mpsc::channel::<StepEvent>();
    cpu.set_observer(Box::new(tx));

    for _ in 0..3 {
        cpu.execute_instruction(&mut bus);
    }

    let events: Vec<StepEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            StepEvent::Call {
                address: 0x0000,
                target: 0x1000,
                return_address: 0x0003,
            },
            StepEvent::Return {
                address: 0x1000,
                return_address: 0x0003,
            },
            StepEvent::Branch {
                address: 0x0003,
                target: 0x0003,
            },
        ]
    );
    assert!(cpu.take_observer().is_some());
}

#[test]
fn observer_sees_interrupts() {
    let mut bus = SimpleBus::new();
    let mut cpu = enabled(InterruptMode::Im1, 0x0500);
    let (tx, rx) = mpsc::channel::<StepEvent>();
    cpu.set_observer(Box::new(tx));

    cpu.request_interrupt();
    cpu.execute_instruction(&mut bus);
    cpu.request_nmi();
    cpu.execute_instruction(&mut bus);

    let events: Vec<StepEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            StepEvent::Interrupt {
                pc: 0x0500,
                target: 0x0038,
            },
            StepEvent::Nmi { pc: 0x0038 },
        ]
    );
}

#[rstest]
#[case::call(&[0xCD, 0x00, 0x10], 3)]
#[case::call_cc(&[0xDC, 0x00, 0x10], 3)]
#[case::rst(&[0xD7], 1)]
#[case::halt(&[0x76], 1)]
#[case::ldir(&[0xED, 0xB0], 2)]
#[case::otdr(&[0xED, 0xBB], 2)]
#[case::ldi(&[0xED, 0xA0], 0)]
#[case::jp(&[0xC3, 0x00, 0x10], 0)]
#[case::nop(&[0x00], 0)]
fn step_over_lengths(#[case] code: &[u8], #[case] expected: u16) {
    let mut bus = SimpleBus::new();
    bus.load(0x2000, code);
    let mut cpu = Z80::new();
    cpu.regs_mut().set_pc(0x2000);
    assert_eq!(cpu.call_instruction_length(&bus), expected);
}
