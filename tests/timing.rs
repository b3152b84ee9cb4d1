mod common;

use common::gb_with_code;
use dotmatrix_core::gameboy::GameBoy;

/// Execute one instruction at the entry point and return its T-cycle count.
fn timed(code: &[u8], setup: impl FnOnce(&mut GameBoy)) -> u32 {
    let mut gb = gb_with_code(code);
    setup(&mut gb);
    gb.step().unwrap()
}

#[test]
fn opcode_cycle_counts_match_the_canonical_table() {
    let cases: &[(&[u8], fn(&mut GameBoy), u32)] = &[
        (&[0x00], |_| {}, 4),                    // NOP
        (&[0x06, 0x12], |_| {}, 8),              // LD B,n
        (&[0x0A], |_| {}, 8),                    // LD A,(BC)
        (&[0x36, 0x12], |_| {}, 12),             // LD (HL),n
        (&[0x46], |_| {}, 8),                    // LD B,(HL)
        (&[0x41], |_| {}, 4),                    // LD B,C
        (&[0x80], |_| {}, 4),                    // ADD A,B
        (&[0x86], |_| {}, 8),                    // ADD A,(HL)
        (&[0x01, 0x34, 0x12], |_| {}, 12),       // LD BC,nn
        (&[0x03], |_| {}, 8),                    // INC BC
        (&[0x09], |_| {}, 8),                    // ADD HL,BC
        (&[0x34], |_| {}, 12),                   // INC (HL)
        (&[0x08, 0x00, 0xC0], |_| {}, 20),       // LD (nn),SP
        (&[0xC5], |gb| gb.cpu.sp = 0xD000, 16),  // PUSH BC
        (&[0xC1], |gb| gb.cpu.sp = 0xD000, 12),  // POP BC
        (&[0xC3, 0x00, 0x02], |_| {}, 16),       // JP nn
        (&[0xE9], |_| {}, 4),                    // JP HL
        (&[0x18, 0x05], |_| {}, 12),             // JR
        (&[0x20, 0x05], |gb| gb.cpu.f = 0x00, 12), // JR NZ taken
        (&[0x20, 0x05], |gb| gb.cpu.f = 0x80, 8),  // JR NZ not taken
        (&[0xCA, 0x00, 0x02], |gb| gb.cpu.f = 0x80, 16), // JP Z taken
        (&[0xCA, 0x00, 0x02], |gb| gb.cpu.f = 0x00, 12), // JP Z not taken
        (&[0xCD, 0x00, 0x02], |gb| gb.cpu.sp = 0xD000, 24), // CALL
        (&[0xC4, 0x00, 0x02], |gb| { gb.cpu.sp = 0xD000; gb.cpu.f = 0x80 }, 12), // CALL NZ not taken
        (&[0xC9], |gb| gb.cpu.sp = 0xD000, 16),  // RET
        (&[0xC0], |gb| { gb.cpu.sp = 0xD000; gb.cpu.f = 0x00 }, 20), // RET NZ taken
        (&[0xC0], |gb| gb.cpu.f = 0x80, 8),      // RET NZ not taken
        (&[0xD9], |gb| gb.cpu.sp = 0xD000, 16),  // RETI
        (&[0xC7], |gb| gb.cpu.sp = 0xD000, 16),  // RST 00
        (&[0xE0, 0x80], |_| {}, 12),             // LDH (n),A
        (&[0xF0, 0x80], |_| {}, 12),             // LDH A,(n)
        (&[0xE2], |_| {}, 8),                    // LD (C),A
        (&[0xEA, 0x00, 0xC0], |_| {}, 16),       // LD (nn),A
        (&[0xFA, 0x00, 0xC0], |_| {}, 16),       // LD A,(nn)
        (&[0xE8, 0x01], |_| {}, 16),             // ADD SP,e8
        (&[0xF8, 0x01], |_| {}, 12),             // LD HL,SP+e8
        (&[0xF9], |_| {}, 8),                    // LD SP,HL
        (&[0xF3], |_| {}, 4),                    // DI
        (&[0xFB], |_| {}, 4),                    // EI
        (&[0x10, 0x00], |_| {}, 8),              // STOP
        (&[0xCB, 0x40], |_| {}, 8),              // BIT 0,B
        (&[0xCB, 0x46], |_| {}, 12),             // BIT 0,(HL)
        (&[0xCB, 0xC6], |_| {}, 16),             // SET 0,(HL)
        (&[0xCB, 0x11], |_| {}, 8),              // RL C
    ];

    for (i, (code, setup, expected)) in cases.iter().enumerate() {
        let got = timed(code, *setup);
        assert_eq!(got, *expected, "case {i}: code {code:02X?}");
    }
}

#[test]
fn cpu_cycles_equal_component_ticks() {
    // Every cycle the CPU reports must have reached the tick hook: the sum
    // of step() results matches the MMU's observed clock exactly.
    let mut gb = common::gb_blank();
    let cpu_start = gb.cpu.cycles;
    let clock_start = gb.mmu.clock;
    let mut reported = 0u64;
    for _ in 0..5000 {
        reported += gb.step().unwrap() as u64;
    }
    assert_eq!(reported, gb.cpu.cycles - cpu_start);
    assert_eq!(reported, gb.mmu.clock - clock_start);
}

#[test]
fn random_opcode_streams_keep_clocks_in_lockstep() {
    // Straight-line opcodes only (no control flow, no memory-indirect
    // stores) so the PC walks the WRAM buffer predictably.
    const SAFE: &[u8] = &[
        0x00, 0x04, 0x05, 0x0C, 0x14, 0x1C, 0x24, 0x3C, 0x07, 0x0F, 0x17, 0x1F, 0x2F, 0x37, 0x3F,
        0x41, 0x42, 0x43, 0x44, 0x45, 0x47, 0x48, 0x51, 0x62, 0x78, 0x79, 0x7A, 0x7B, 0x7C, 0x7D,
        0x80, 0x81, 0x82, 0x83, 0x84, 0x85, 0x87, 0x88, 0x90, 0x98, 0xA0, 0xA8, 0xB0, 0xB8, 0x27,
        0x03, 0x0B, 0x13, 0x1B, 0x23, 0x2B, 0x09, 0x19, 0x29,
    ];

    let mut seed = 0x2F6E_2B1Eu32;
    let mut rand = move || {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        seed
    };

    for _ in 0..8 {
        let mut gb = common::gb_blank();
        // Lay a random straight-line program across WRAM.
        for addr in 0xC000u16..0xD000 {
            let op = SAFE[rand() as usize % SAFE.len()];
            gb.mmu.write(addr, op);
        }
        gb.cpu.pc = 0xC000;

        let cpu_start = gb.cpu.cycles;
        let clock_start = gb.mmu.clock;
        let mut reported = 0u64;
        for _ in 0..1500 {
            reported += gb.step().unwrap() as u64;
        }
        assert_eq!(reported, gb.cpu.cycles - cpu_start);
        assert_eq!(reported, gb.mmu.clock - clock_start);
        assert_eq!(gb.cpu.f & 0x0F, 0, "flag low nibble leaked");
    }
}

#[test]
fn interrupt_dispatch_costs_twenty_cycles() {
    let mut gb = common::gb_blank();
    gb.cpu.ime = true;
    gb.cpu.sp = 0xD000;
    gb.mmu.ie_reg = 0x01;
    gb.mmu.if_reg = 0x01;
    assert_eq!(gb.step().unwrap(), 20);
}

#[test]
fn halted_core_idles_in_machine_cycles() {
    let mut gb = gb_with_code(&[0x76]);
    gb.step().unwrap();
    assert!(gb.cpu.halted);
    assert_eq!(gb.step().unwrap(), 4);
    assert_eq!(gb.step().unwrap(), 4);
}
