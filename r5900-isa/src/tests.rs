use crate::{
    decode,
    instruction::{branch_target, jump_target},
    regs::{Location, Register},
    DecodeError, Decoder, Opcode, Operand,
};

fn special(rs: u32, rt: u32, rd: u32, sa: u32, funct: u32) -> u32 {
    (rs << 21) | (rt << 16) | (rd << 11) | (sa << 6) | funct
}

fn imm(op: u32, rs: u32, rt: u32, imm: u16) -> u32 {
    (op << 26) | (rs << 21) | (rt << 16) | imm as u32
}

fn regimm(rs: u32, code: u32, offset: u16) -> u32 {
    imm(0x01, rs, code, offset)
}

fn mmi(rs: u32, rt: u32, rd: u32, sa: u32, funct: u32) -> u32 {
    (0x1c << 26) | special(rs, rt, rd, sa, funct)
}

fn cop(unit: u32, fmt: u32, rt: u32, rd: u32, sa: u32, funct: u32) -> u32 {
    ((0x10 + unit) << 26) | special(fmt, rt, rd, sa, funct)
}

fn regs(regs: &[Register]) -> Vec<Location> {
    regs.iter().map(|r| Location::from(*r)).collect()
}

#[track_caller]
fn check(word: u32, mnemonic: &str, operands: usize) {
    let inst = decode(word, 0x0010_0000)
        .unwrap_or_else(|e| panic!("{word:#010x} ({mnemonic}) failed to decode: {e}"));
    assert_eq!(inst.opcode.mnemonic(), mnemonic, "{word:#010x}");
    assert_eq!(inst.operands.len(), operands, "{word:#010x}: {inst}");
}

#[test]
fn special_group() {
    check(special(0, 8, 9, 2, 0x00), "sll", 3);
    check(special(0, 8, 9, 31, 0x03), "sra", 3);
    check(special(10, 8, 9, 0, 0x04), "sllv", 3);
    check(special(31, 0, 0, 0, 0x08), "jr", 1);
    check(special(9, 0, 31, 0, 0x09), "jalr", 2);
    check(special(9, 10, 8, 0, 0x0a), "movz", 3);
    check(special(0, 0, 0, 0, 0x0c), "syscall", 1);
    check(special(0, 0, 0, 0, 0x0d), "break", 1);
    check(special(0, 0, 0, 0, 0x0f), "sync", 0);
    check(special(0, 0, 8, 0, 0x10), "mfhi", 1);
    check(special(8, 0, 0, 0, 0x13), "mtlo", 1);
    check(special(8, 9, 10, 0, 0x18), "mult", 3);
    check(special(8, 9, 0, 0, 0x1a), "div", 2);
    check(special(8, 9, 10, 0, 0x23), "subu", 3);
    check(special(8, 9, 10, 0, 0x27), "nor", 3);
    check(special(0, 0, 8, 0, 0x28), "mfsa", 1);
    check(special(8, 9, 10, 0, 0x2a), "slt", 3);
    check(special(8, 9, 10, 0, 0x2f), "dsubu", 3);
    check(special(8, 9, 0, 0, 0x34), "teq", 2);
    check(special(0, 8, 9, 4, 0x3f), "dsra32", 3);
}

#[test]
fn primary_and_regimm_groups() {
    check(imm(0x02, 0, 0, 0x10), "j", 1);
    check(imm(0x03, 0, 0, 0x10), "jal", 1);
    check(imm(0x05, 8, 9, 0x10), "bne", 3);
    check(imm(0x06, 8, 0, 0x10), "blez", 2);
    check(imm(0x07, 8, 0, 0x10), "bgtz", 2);
    check(imm(0x14, 8, 9, 0x10), "beql", 3);
    check(imm(0x15, 8, 9, 0x10), "bnel", 3);
    check(imm(0x16, 8, 0, 0x10), "blezl", 2);
    check(imm(0x17, 8, 0, 0x10), "bgtzl", 2);
    check(imm(0x08, 8, 9, 0x10), "addi", 3);
    check(imm(0x0b, 8, 9, 0x10), "sltiu", 3);
    check(imm(0x0c, 8, 9, 0xff), "andi", 3);
    check(imm(0x0f, 0, 9, 0x8000), "lui", 2);
    check(imm(0x19, 8, 9, 0x10), "daddiu", 3);
    check(imm(0x1a, 8, 9, 0x10), "ldl", 2);
    check(imm(0x1e, 29, 9, 0x10), "lq", 2);
    check(imm(0x1f, 29, 9, 0x10), "sq", 2);
    check(imm(0x24, 8, 9, 0x10), "lbu", 2);
    check(imm(0x27, 8, 9, 0x10), "lwu", 2);
    check(imm(0x2e, 8, 9, 0x10), "swr", 2);
    check(imm(0x2f, 8, 0x18, 0x10), "cache", 2);
    check(imm(0x31, 8, 2, 0x10), "lwc1", 2);
    check(imm(0x33, 8, 0, 0x10), "pref", 2);
    check(imm(0x37, 8, 9, 0x10), "ld", 2);
    check(imm(0x39, 8, 2, 0x10), "swc1", 2);
    check(imm(0x3f, 8, 9, 0x10), "sd", 2);

    check(regimm(8, 0x00, 0x10), "bltz", 2);
    check(regimm(8, 0x03, 0x10), "bgezl", 2);
    check(regimm(8, 0x08, 0x10), "tgei", 2);
    check(regimm(8, 0x11, 0x10), "bgezal", 2);
    check(regimm(8, 0x13, 0x10), "bgezall", 2);
    check(regimm(8, 0x18, 0x10), "mtsab", 2);
    check(regimm(8, 0x19, 0x10), "mtsah", 2);
}

#[test]
fn mmi_groups() {
    check(mmi(8, 9, 10, 0, 0x00), "madd", 3);
    check(mmi(8, 0, 10, 0, 0x04), "plzcw", 2);
    check(mmi(0, 0, 10, 0, 0x10), "mfhi1", 1);
    check(mmi(8, 9, 10, 0, 0x18), "mult1", 3);
    check(mmi(8, 9, 0, 0, 0x1b), "divu1", 2);
    check(mmi(8, 9, 10, 0, 0x21), "maddu1", 3);
    check(mmi(0, 0, 10, 0, 0x30), "pmfhl", 2);
    check(mmi(8, 0, 0, 0, 0x31), "pmthl", 2);
    check(mmi(0, 9, 10, 3, 0x34), "psllh", 3);
    check(mmi(0, 9, 10, 3, 0x3f), "psraw", 3);

    check(mmi(8, 9, 10, 0x00, 0x08), "paddw", 3);
    check(mmi(8, 9, 10, 0x0a, 0x08), "pcgtb", 3);
    check(mmi(8, 9, 10, 0x12, 0x08), "pextlw", 3);
    check(mmi(0, 9, 10, 0x1f, 0x08), "ppac5", 2);

    check(mmi(0, 9, 10, 0x01, 0x28), "pabsw", 2);
    check(mmi(8, 9, 10, 0x04, 0x28), "padsbh", 3);
    check(mmi(8, 9, 10, 0x18, 0x28), "paddub", 3);
    check(mmi(8, 9, 10, 0x1b, 0x28), "qfsrv", 3);

    check(mmi(8, 9, 10, 0x00, 0x09), "pmaddw", 3);
    check(mmi(0, 0, 10, 0x08, 0x09), "pmfhi", 1);
    check(mmi(8, 9, 0, 0x0d, 0x09), "pdivw", 2);
    check(mmi(8, 9, 10, 0x0e, 0x09), "pcpyld", 3);
    check(mmi(8, 9, 10, 0x12, 0x09), "pand", 3);
    check(mmi(0, 9, 10, 0x1f, 0x09), "prot3w", 2);

    check(mmi(9, 8, 10, 0x03, 0x29), "psravw", 3);
    check(mmi(8, 0, 0, 0x08, 0x29), "pmthi", 1);
    check(mmi(8, 9, 10, 0x0e, 0x29), "pcpyud", 3);
    check(mmi(8, 9, 10, 0x12, 0x29), "por", 3);
    check(mmi(0, 9, 10, 0x1b, 0x29), "pcpyh", 2);
}

#[test]
fn coprocessor_groups() {
    check(cop(0, 0x00, 8, 12, 0, 0), "mfc0", 2);
    check(cop(0, 0x04, 8, 12, 0, 0), "mtc0", 2);
    check(cop(0, 0x08, 0, 0, 0, 0x10), "bc0f", 1);
    check(cop(0, 0x08, 3, 0, 0, 0x10), "bc0tl", 1);
    check(cop(0, 0x10, 0, 0, 0, 0x02), "tlbwi", 0);
    check(cop(0, 0x10, 0, 0, 0, 0x18), "eret", 0);
    check(cop(0, 0x10, 0, 0, 0, 0x38), "ei", 0);
    check(cop(0, 0x10, 0, 0, 0, 0x39), "di", 0);

    check(cop(1, 0x00, 8, 2, 0, 0), "mfc1", 2);
    check(cop(1, 0x06, 8, 31, 0, 0), "ctc1", 2);
    check(cop(1, 0x08, 1, 0, 0, 0x10), "bc1t", 1);
    check(cop(1, 0x10, 2, 1, 3, 0x00), "add.s", 3);
    check(cop(1, 0x10, 2, 0, 3, 0x04), "sqrt.s", 2);
    check(cop(1, 0x10, 0, 1, 3, 0x07), "neg.s", 2);
    check(cop(1, 0x10, 2, 1, 0, 0x18), "adda.s", 2);
    check(cop(1, 0x10, 2, 1, 3, 0x1c), "madd.s", 3);
    check(cop(1, 0x10, 0, 1, 3, 0x24), "cvt.w.s", 2);
    check(cop(1, 0x10, 2, 1, 0, 0x34), "c.lt.s", 2);
    check(cop(1, 0x14, 0, 1, 3, 0x20), "cvt.s.w", 2);
}

#[test]
fn disassembly_text() {
    let text = |word| decode(word, 0x0010_0000).unwrap().to_string();

    assert_eq!(text(imm(0x09, 8, 9, 3)), "addiu $t1, $t0, 3");
    assert_eq!(text(imm(0x09, 0, 8, 5)), "li $t0, 5");
    assert_eq!(text(imm(0x23, 29, 2, 0xfff0)), "lw $v0, -0x10($sp)");
    assert_eq!(text(imm(0x2b, 29, 31, 0x1c)), "sw $ra, 0x1c($sp)");
    assert_eq!(text(imm(0x0d, 8, 9, 0xff00)), "ori $t1, $t0, 0xff00");
    assert_eq!(text((0x02 << 26) | 0x4_0010), "j 0x100040");
    assert_eq!(text(cop(0, 0x04, 8, 12, 0, 0)), "mtc0 $t0, Status");
    assert_eq!(text(cop(1, 0x10, 2, 1, 3, 0x00)), "add.s $f3, $f1, $f2");
    assert_eq!(text(mmi(0, 0, 10, 0, 0x30)), "pmfhl.lw $t2");
    assert_eq!(text(mmi(0, 0, 10, 3, 0x30)), "pmfhl.lh $t2");
    assert_eq!(text(0), "nop");
}

#[test]
fn zero_word_is_nop() {
    let inst = decode(0, 0x1000).unwrap();
    assert_eq!(inst.opcode, Opcode::Nop);
    assert!(inst.operands.is_empty());
    assert!(inst.reads.is_empty() && inst.writes.is_empty());
}

#[test]
fn read_write_sets() {
    let inst = decode(imm(0x09, 8, 9, 3), 0).unwrap();
    assert_eq!(inst.reads, regs(&[Register::T0]));
    assert_eq!(inst.writes, regs(&[Register::T1]));

    let inst = decode(special(8, 9, 10, 0, 0x18), 0).unwrap();
    assert_eq!(inst.reads, regs(&[Register::T0, Register::T1]));
    assert_eq!(inst.writes, regs(&[Register::T2, Register::HI, Register::LO]));

    let inst = decode(mmi(8, 9, 10, 0, 0x00), 0).unwrap();
    assert_eq!(inst.reads, regs(&[Register::T0, Register::T1, Register::HI, Register::LO]));
    assert_eq!(inst.writes, regs(&[Register::T2, Register::HI, Register::LO]));

    let inst = decode(special(9, 10, 8, 0, 0x0a), 0).unwrap();
    assert_eq!(inst.reads, regs(&[Register::T1, Register::T2, Register::T0]));

    let inst = decode(imm(0x2b, 29, 31, 0x1c), 0).unwrap();
    assert!(inst.is_store());
    assert_eq!(inst.access_size, Some(4));
    assert_eq!(inst.reads, regs(&[Register::SP, Register::RA]));
    assert!(inst.writes.is_empty());
    assert_eq!(inst.memory_operand(), Some((Register::SP, 0x1c)));

    let inst = decode(imm(0x23, 29, 2, 0xfff0), 0).unwrap();
    assert!(inst.is_load());
    assert_eq!(inst.reads, regs(&[Register::SP]));
    assert_eq!(inst.writes, regs(&[Register::V0]));
    assert_eq!(inst.memory_operand(), Some((Register::SP, -0x10)));

    let inst = decode(imm(0x03, 0, 0, 0x10), 0).unwrap();
    assert!(inst.is_call());
    assert_eq!(inst.writes, regs(&[Register::RA]));

    let inst = decode(cop(1, 0x10, 2, 1, 0, 0x34), 0).unwrap();
    assert_eq!(inst.reads, regs(&[Register::fpr(1), Register::fpr(2)]));
    assert_eq!(inst.writes, regs(&[Register::FPU_COND]));

    let inst = decode(cop(1, 0x08, 1, 0, 0, 0x10), 0).unwrap();
    assert_eq!(inst.reads, regs(&[Register::FPU_COND]));

    let inst = decode(cop(0, 0x04, 8, 12, 0, 0), 0).unwrap();
    assert_eq!(inst.reads, regs(&[Register::T0]));
    assert_eq!(inst.writes, regs(&[Register::cop0(12)]));

    let inst = decode(mmi(0, 0, 10, 0x08, 0x09), 0).unwrap();
    assert_eq!(inst.reads, regs(&[Register::HI, Register::HI1]));
    assert_eq!(inst.writes, regs(&[Register::T2]));
}

#[test]
fn branch_targets() {
    let inst = decode(imm(0x05, 8, 9, 0xffff), 0x1000).unwrap();
    assert_eq!(inst.target(), Some(0x1000));
    assert!(inst.is_branch() && !inst.is_likely_branch());
    assert_eq!(inst.fallthrough(), 0x1008);

    let inst = decode(imm(0x14, 8, 9, 0x0003), 0x1000).unwrap();
    assert_eq!(inst.target(), Some(0x1010));
    assert!(inst.is_likely_branch());

    assert_eq!(branch_target(0x1000, -2), 0x0ffc);
    assert_eq!(jump_target(0x0fff_fffc, 0x10), 0x1000_0040);
    assert_eq!(jump_target(0x8010_0000, 0x4_0000), 0x8010_0000);
}

#[test]
fn canonical_forms() {
    let mut raw = Decoder::new();
    raw.simplify = false;

    let word = imm(0x04, 0, 0, 0x0010);
    let beq = raw.decode(word, 0x2000).unwrap();
    let b = decode(word, 0x2000).unwrap();
    assert_eq!(beq.opcode, Opcode::Beq);
    assert_eq!(b.opcode, Opcode::B);
    assert_eq!(b.target(), beq.target());
    assert_eq!(b.target(), Some(0x2044));
    assert!(b.reads.is_empty());

    let inst = decode(special(9, 0, 8, 0, 0x25), 0).unwrap();
    assert_eq!(inst.opcode, Opcode::Move);
    assert_eq!(inst.operands, vec![Operand::Reg(Register::T0), Operand::Reg(Register::T1)]);
    assert_eq!(inst.reads, regs(&[Register::T1]));
    assert_eq!(inst.writes, regs(&[Register::T0]));
    assert_eq!(inst.to_string(), "move $t0, $t1");

    let inst = decode(special(9, 0, 8, 0, 0x2d), 0).unwrap();
    assert_eq!(inst.opcode, Opcode::Move);

    let inst = decode(imm(0x09, 0, 8, 0xfffb), 0).unwrap();
    assert_eq!(inst.opcode, Opcode::Li);
    assert_eq!(inst.operands, vec![Operand::Reg(Register::T0), Operand::Signed(-5)]);

    // Only the exact idioms are rewritten.
    assert_eq!(decode(special(9, 10, 8, 0, 0x25), 0).unwrap().opcode, Opcode::Or);
    assert_eq!(decode(imm(0x04, 8, 0, 0x10), 0).unwrap().opcode, Opcode::Beq);
    assert_eq!(decode(imm(0x09, 8, 9, 1), 0).unwrap().opcode, Opcode::Addiu);

    // Canonicalization is applied once and is stable.
    assert_eq!(crate::simplify(b.clone()), b);
}

#[test]
fn unknown_opcodes() {
    // COP2 is not decoded.
    let word = 0x4800_0000 | special(0x01, 8, 9, 0, 0);
    assert_eq!(decode(word, 0x40), Err(DecodeError::UnknownOpcode { address: 0x40, word }));

    let word = imm(0x3b, 8, 9, 0);
    assert!(decode(word, 0).is_err());

    // SPECIAL funct 0x01 is unassigned.
    let word = special(8, 9, 10, 0, 0x01);
    assert!(decode(word, 0).is_err());

    let err = decode(word, 0x1234).unwrap_err();
    assert_eq!(err.to_string(), "unknown opcode 0x01095001 at 0x1234");
}

#[test]
fn table_is_unambiguous() {
    let decoder = Decoder::new();
    let conflicts = decoder.table().conflicts();
    assert!(conflicts.is_empty(), "{conflicts:?}");

    // Every non-pseudo instruction kind is reachable exactly once.
    let mut seen = std::collections::BTreeMap::new();
    decoder.table().for_each_opcode(&mut |opcode| *seen.entry(opcode).or_insert(0) += 1);
    for opcode in Opcode::ALL {
        let expected = match opcode {
            Opcode::Nop | Opcode::B | Opcode::Move | Opcode::Li => 0,
            _ => 1,
        };
        assert_eq!(seen.get(opcode).copied().unwrap_or(0), expected, "{opcode}");
    }

    // Decoding never visits more than three tables.
    assert_eq!(decoder.table().depth(mmi(8, 9, 10, 0x12, 0x29)), 3);
    assert_eq!(decoder.table().depth(cop(1, 0x10, 2, 1, 3, 0x00)), 3);
}

#[test]
fn likely_branch_encodings() {
    let cases = [
        (0x04, Opcode::Beq),
        (0x05, Opcode::Bne),
        (0x06, Opcode::Blez),
        (0x07, Opcode::Bgtz),
        (0x14, Opcode::Beql),
        (0x15, Opcode::Bnel),
        (0x16, Opcode::Blezl),
        (0x17, Opcode::Bgtzl),
    ];
    for (op, opcode) in cases {
        let inst = decode(imm(op, 8, 9, 4), 0).unwrap();
        assert_eq!(inst.opcode, opcode, "{op:#x}");
        assert_eq!(inst.is_likely_branch(), op >= 0x14, "{op:#x}");
    }
}

#[test]
fn decoding_is_total_and_deterministic() {
    fn do_decode(word: u32, address: u64) -> bool {
        let address = address & !0x3;
        let first = decode(word, address);
        if first != decode(word, address) {
            return false;
        }
        match first {
            Ok(inst) => inst.word == word && inst.address == address,
            Err(DecodeError::UnknownOpcode { address: a, word: w }) => {
                a == address && w == word && word != 0
            }
        }
    }
    assert!(do_decode(0, 0));
    assert!(do_decode(0xffff_ffff, 0));

    quickcheck::quickcheck(do_decode as fn(u32, u64) -> bool)
}

#[test]
fn sweep_function_fields() {
    let mut decoder = Decoder::new();
    decoder.simplify = false;
    for op in 0..64u32 {
        for rs in [0u32, 0x04, 0x08, 0x10, 0x14] {
            for sa in 0..32u32 {
                for funct in 0..64u32 {
                    let word = (op << 26) | (rs << 21) | (1 << 16) | (2 << 11) | (sa << 6) | funct;
                    match decoder.decode(word, 0) {
                        Ok(inst) => assert_eq!(decoder.table().lookup(word), Some(inst.opcode)),
                        Err(_) => assert_eq!(decoder.table().lookup(word), None),
                    }
                }
            }
        }
    }
}

#[test]
fn register_names() {
    assert_eq!(Register::gpr_by_name("$v0"), Some(Register::V0));
    assert_eq!(Register::gpr_by_name("sp"), Some(Register::SP));
    assert_eq!(Register::gpr_by_name("ra"), Some(Register::RA));
    assert_eq!(Register::gpr_by_name("f0"), None);
}
