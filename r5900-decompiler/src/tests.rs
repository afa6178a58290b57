use quickcheck::quickcheck;
use r5900_ir::{
    BranchTarget, DataType, Expr, ExprKind, ExprRef, FunctionRef, FunctionTable, Imm, Primitive,
    TextSink, TypeRegistry,
};
use r5900_isa::{decode, Location, Register};

use crate::{
    Config, DecompilerContext, Endianness, Error, Function, FunctionLifter, Image,
    InstructionSource, Statement, ToExpression,
};

const ZERO: u32 = 0;
const V0: u32 = 2;
const V1: u32 = 3;
const A0: u32 = 4;
const T0: u32 = 8;
const T1: u32 = 9;
const T2: u32 = 10;
const SP: u32 = 29;
const RA: u32 = 31;

fn itype(op: u32, rs: u32, rt: u32, imm: i32) -> u32 {
    op << 26 | rs << 21 | rt << 16 | (imm as u32 & 0xffff)
}

fn rtype(rs: u32, rt: u32, rd: u32, sa: u32, funct: u32) -> u32 {
    rs << 21 | rt << 16 | rd << 11 | sa << 6 | funct
}

fn addiu(rt: u32, rs: u32, imm: i32) -> u32 {
    itype(0x09, rs, rt, imm)
}

fn addu(rd: u32, rs: u32, rt: u32) -> u32 {
    rtype(rs, rt, rd, 0, 0x21)
}

fn lw(rt: u32, offset: i32, base: u32) -> u32 {
    itype(0x23, base, rt, offset)
}

fn sw(rt: u32, offset: i32, base: u32) -> u32 {
    itype(0x2b, base, rt, offset)
}

/// A branch at `from` to `to`.
fn branch(op: u32, rs: u32, rt: u32, from: u64, to: u64) -> u32 {
    let offset = (to as i64 - (from as i64 + 4)) / 4;
    itype(op, rs, rt, offset as i32)
}

fn jal(target: u64) -> u32 {
    0x03 << 26 | ((target >> 2) as u32 & 0x03ff_ffff)
}

fn jr(rs: u32) -> u32 {
    rtype(rs, 0, 0, 0, 0x08)
}

const NOP: u32 = 0;
const BASE: u64 = 0x1000;

fn image(words: &[u32], endianness: Endianness) -> Image {
    let bytes = words
        .iter()
        .flat_map(|w| match endianness {
            Endianness::Little => w.to_le_bytes(),
            Endianness::Big => w.to_be_bytes(),
        })
        .collect();
    Image::new(BASE, bytes, endianness)
}

fn lift_with(words: &[u32], config: Config, functions: Option<&FunctionTable>) -> Function {
    let types = TypeRegistry::new();
    let mut lifter = FunctionLifter::new(&types).with_config(config);
    if let Some(functions) = functions {
        lifter = lifter.with_functions(functions);
    }
    let mut src = image(words, Endianness::Little);
    let end = BASE + words.len() as u64 * 4;
    lifter.lift(&mut src, BASE, end, &[]).unwrap()
}

fn lift(words: &[u32]) -> Function {
    lift_with(words, Config::default(), None)
}

fn render(function: &Function, functions: Option<&FunctionTable>) -> String {
    let types = TypeRegistry::new();
    let mut sink = TextSink::new(&types);
    if let Some(functions) = functions {
        sink = sink.with_functions(functions);
    }
    function.render(&mut sink);
    sink.finish()
}

/// The last value written to `reg` by the function.
fn last_def(function: &Function, reg: Register) -> ExprRef {
    function
        .defs
        .iter()
        .rev()
        .find(|def| def.location() == Location::Register(reg))
        .map(|def| def.value.clone())
        .unwrap()
}

fn is_store(stmt: &Statement) -> bool {
    matches!(stmt, Statement::Expr { expr, .. } if matches!(expr.kind, ExprKind::Store { .. }))
}

fn replay(ctx: &mut DecompilerContext, words: &[u32]) {
    for (i, word) in words.iter().enumerate() {
        let inst = decode(*word, BASE + i as u64 * 4).unwrap();
        inst.to_expression(ctx).unwrap();
    }
}

#[test]
fn constant_propagation() {
    let types = TypeRegistry::new();
    let mut ctx = DecompilerContext::new(&types);
    replay(&mut ctx, &[addiu(T0, ZERO, 5), addiu(T1, T0, 3)]);

    let value = ctx.get_register(Register::gpr(T1 as u8), None);
    assert_eq!(value.as_imm(), Some(&Imm::i32(8)));
}

#[test]
fn constant_propagation_without_reduce() {
    let types = TypeRegistry::new();
    let config = Config { reduce_expressions: false, ..Config::default() };
    let mut ctx = DecompilerContext::new(&types).with_config(config);
    replay(&mut ctx, &[addiu(T0, ZERO, 5), addiu(T1, T0, 3)]);

    let value = ctx.get_register(Register::gpr(T1 as u8), None);
    assert!(value.as_imm().is_none());
    assert_eq!(value.reduce().unwrap().as_imm(), Some(&Imm::i32(8)));
}

#[test]
fn constant_propagation_without_simplify() {
    let config = Config { simplify_instructions: false, ..Config::default() };
    let function = lift_with(&[addiu(T0, ZERO, 5), addiu(T1, T0, 3)], config, None);
    assert_eq!(last_def(&function, Register::gpr(T1 as u8)).as_imm(), Some(&Imm::i32(8)));
}

#[test]
fn zero_register_ignores_writes() {
    let types = TypeRegistry::new();
    let mut ctx = DecompilerContext::new(&types);
    replay(&mut ctx, &[addiu(ZERO, ZERO, 5)]);

    assert!(!ctx.is_defined(Location::Register(Register::ZERO)));
    let value = ctx.get_register(Register::ZERO, None);
    assert!(value.as_imm().map_or(false, |imm| imm.is_zero()));
}

#[test]
fn read_at_address() {
    let types = TypeRegistry::new();
    let mut ctx = DecompilerContext::new(&types);
    replay(&mut ctx, &[addiu(T0, ZERO, 1), addiu(T0, ZERO, 2)]);

    let t0 = Register::gpr(T0 as u8);
    assert_eq!(ctx.get_register(t0, Some(BASE + 4)).as_imm(), Some(&Imm::i32(1)));
    assert_eq!(ctx.get_register(t0, None).as_imm(), Some(&Imm::i32(2)));

    let initial = ctx.get_register(t0, Some(BASE));
    assert!(matches!(initial.kind, ExprKind::Variable(var) if var.version == 0));
}

#[test]
fn stack_slots_are_tracked() {
    let function = lift(&[
        addiu(SP, SP, -16),
        addiu(T0, ZERO, 7),
        sw(T0, 4, SP),
        lw(T1, 4, SP),
    ]);

    assert!(!function.statements.iter().any(is_store));
    assert_eq!(last_def(&function, Register::gpr(T1 as u8)).as_imm(), Some(&Imm::i32(7)));
    assert!(function.defs.iter().any(|def| def.location() == Location::Stack(-12)));
}

#[test]
fn memory_loads_are_materialized() {
    let function = lift(&[lw(T0, 8, A0), addu(T1, T0, A0)]);

    let load = function.statements.iter().find_map(|stmt| match stmt {
        Statement::Assign { var, value, .. } => Some((*var, value.clone())),
        _ => None,
    });
    let (var, value) = load.unwrap();
    assert_eq!(var.location, Location::Register(Register::gpr(T0 as u8)));
    assert!(matches!(value.kind, ExprKind::Load { size: 4, signed: true, .. }));

    // Later reads see the variable rather than the load.
    let sum = last_def(&function, Register::gpr(T1 as u8));
    let ExprKind::Binary { lhs, .. } = &sum.kind
    else {
        panic!("unexpected {sum:?}");
    };
    assert!(matches!(lhs.kind, ExprKind::Variable(v) if v == var));
}

#[test]
fn memory_stores_emit_statements() {
    let function = lift(&[addiu(T0, ZERO, 1), sw(T0, 0, A0)]);
    assert_eq!(function.statements.iter().filter(|stmt| is_store(stmt)).count(), 1);
}

#[test]
fn delay_slot_precedes_branch() {
    let words = [
        branch(0x04, T0, T1, BASE, BASE + 0x10),
        sw(T2, 0, A0),
        NOP,
        NOP,
        jr(RA),
        NOP,
    ];
    let function = lift(&words);

    let store = function.statements.iter().position(is_store).unwrap();
    let jump = function
        .statements
        .iter()
        .position(|stmt| matches!(stmt, Statement::Branch { cond: Some(_), .. }))
        .unwrap();
    assert!(store < jump);
    assert!(function.statements.contains(&Statement::Label { address: BASE + 0x10 }));
    assert!(matches!(function.statements.last(), Some(Statement::Return { value: None, .. })));
}

#[test]
fn likely_delay_slot_is_nullified() {
    let words = [branch(0x14, T0, ZERO, BASE, BASE + 0xc), sw(T2, 0, A0), NOP, jr(RA), NOP];

    let function = lift(&words);
    assert!(!function.statements.iter().any(is_store));
    let body = function.statements.iter().find_map(|stmt| match stmt {
        Statement::Branch { cond: Some(_), body, .. } => Some(body.clone()),
        _ => None,
    });
    assert!(body.unwrap().iter().any(is_store));

    let config = Config { nullify_likely_delay_slots: false, ..Config::default() };
    let function = lift_with(&words, config, None);
    assert!(function.statements.iter().any(is_store));
}

#[test]
fn constant_branches() {
    // beq $zero, $zero is always taken and becomes a goto.
    let config = Config { simplify_instructions: false, ..Config::default() };
    let words = [branch(0x04, ZERO, ZERO, BASE, BASE + 0xc), NOP, NOP, jr(RA), NOP];
    let function = lift_with(&words, config, None);
    assert!(function.statements.iter().any(|stmt| matches!(
        stmt,
        Statement::Branch { cond: None, target: Some(BranchTarget::Direct(t)), .. } if *t == BASE + 0xc
    )));

    // bnel $zero, $zero is never taken and skips its delay slot.
    let words = [branch(0x15, ZERO, ZERO, BASE, BASE + 0xc), sw(T2, 0, A0), NOP, jr(RA), NOP];
    let function = lift(&words);
    assert!(!function.statements.iter().any(is_store));
    assert!(!function.statements.iter().any(|stmt| matches!(stmt, Statement::Branch { .. })));
}

#[test]
fn call_binds_return_value() {
    let mut table = FunctionTable::new();
    table.insert(FunctionRef {
        name: "get_value".into(),
        address: 0x2000,
        return_location: Some(Location::Register(Register::V0)),
        return_type: Some(DataType::primitive(Primitive::I32)),
    });

    let words = [jal(0x2000), NOP, addiu(V1, V0, 1), jr(RA), addu(V0, V1, ZERO)];
    let function = lift_with(&words, Config::default(), Some(&table));

    let call = function.statements.iter().find_map(|stmt| match stmt {
        Statement::Assign { var, value, .. } if matches!(value.kind, ExprKind::Call { .. }) => {
            Some(*var)
        }
        _ => None,
    });
    assert_eq!(call.unwrap().location, Location::Register(Register::V0));
    assert!(matches!(function.statements.last(), Some(Statement::Return { value: Some(_), .. })));

    let ra = last_def(&function, Register::RA);
    assert_eq!(ra.as_imm(), Some(&Imm::i32(0x1008)));

    let text = render(&function, Some(&table));
    assert!(text.contains("get_value("), "{text}");
}

#[test]
fn unknown_callee_is_an_effect() {
    let function = lift(&[jal(0x2000), NOP, jr(RA), NOP]);
    assert!(function.statements.iter().any(|stmt| matches!(
        stmt,
        Statement::Expr { expr, .. } if matches!(expr.kind, ExprKind::Call { target: 0x2000, .. })
    )));
    assert!(matches!(function.statements.last(), Some(Statement::Return { value: None, .. })));
}

#[test]
fn join_creates_phi() {
    let words = [
        branch(0x04, A0, ZERO, BASE, BASE + 0xc),
        addiu(V0, ZERO, 1),
        addiu(V0, ZERO, 2),
        jr(RA),
        NOP,
    ];
    let function = lift(&words);

    assert_eq!(function.phis.len(), 1);
    let phi = &function.phis[0];
    assert_eq!(phi.location(), Location::Register(Register::V0));
    assert_eq!(phi.address, BASE + 0xc);
    assert_eq!(phi.args.len(), 2);

    let Some(Statement::Return { value: Some(value), .. }) = function.statements.last()
    else {
        panic!("missing return");
    };
    assert!(matches!(value.kind, ExprKind::Variable(var) if var == phi.result));

    let text = render(&function, None);
    assert!(text.contains(&phi.to_string()), "{text}");
}

#[test]
fn loop_phi_receives_back_edge() {
    let words = [
        addiu(T0, ZERO, 0),
        addiu(T0, T0, 1),
        branch(0x05, T0, A0, BASE + 8, BASE + 4),
        NOP,
        jr(RA),
        NOP,
    ];
    let function = lift(&words);

    let phi = function
        .phis
        .iter()
        .find(|phi| phi.location() == Location::Register(Register::gpr(T0 as u8)))
        .unwrap();
    assert_eq!(phi.address, BASE + 4);
    assert_eq!(phi.args.len(), 2);
    assert_eq!(phi.args[0].0, BASE);
    assert_eq!(phi.args[1].0, BASE + 8);
    assert!(phi.args[1].1.version > phi.result.version);
}

#[test]
fn loop_phi_covers_stack_slots() {
    let words = [
        addiu(SP, SP, -0x20),
        sw(ZERO, 0x10, SP),
        lw(T0, 0x10, SP),
        addiu(T0, T0, 1),
        sw(T0, 0x10, SP),
        branch(0x05, T0, A0, BASE + 0x14, BASE + 8),
        NOP,
        jr(RA),
        NOP,
    ];
    let function = lift(&words);

    let phi = function
        .phis
        .iter()
        .find(|phi| phi.location() == Location::Stack(-0x10))
        .unwrap();
    assert_eq!(phi.address, BASE + 8);
    assert_eq!(phi.args.len(), 2);
    assert_eq!(phi.args[0].0, BASE + 4);
    assert_eq!(phi.args[1].0, BASE + 0x14);
    assert!(phi.args[1].1.version > phi.result.version);

    // The load at the loop header reads the merged slot, not the value stored before the loop.
    let uses: Vec<_> = function
        .uses
        .iter()
        .filter(|u| u.address == BASE + 8 && u.var.location == Location::Stack(-0x10))
        .collect();
    assert_eq!(uses.len(), 1);
    assert_eq!(uses[0].var.version, phi.result.version);
}

#[test]
fn unknown_opcodes_become_comments() {
    // COP2 is not decoded.
    let function = lift(&[0x4800_0000, addiu(T0, ZERO, 1)]);
    assert!(matches!(function.statements.first(), Some(Statement::Comment { .. })));
    assert_eq!(last_def(&function, Register::gpr(T0 as u8)).as_imm(), Some(&Imm::i32(1)));
}

#[test]
fn invalid_ranges() {
    let types = TypeRegistry::new();
    let lifter = FunctionLifter::new(&types);
    let mut src = image(&[NOP, NOP], Endianness::Little);

    let err = lifter.lift(&mut src, BASE, BASE, &[]).unwrap_err();
    assert_eq!(err, Error::InvalidRange { start: BASE, end: BASE });
    let err = lifter.lift(&mut src, BASE + 2, BASE + 8, &[]).unwrap_err();
    assert_eq!(err, Error::InvalidRange { start: BASE + 2, end: BASE + 8 });
    let err = lifter.lift(&mut src, BASE, BASE + 12, &[]).unwrap_err();
    assert_eq!(err, Error::Unmapped { address: BASE + 8 });
}

fn mmi(funct: u32, sa: u32, rs: u32, rt: u32, rd: u32) -> u32 {
    0x1c << 26 | rtype(rs, rt, rd, sa, funct)
}

fn lanes32(words: [u32; 4]) -> Imm {
    let value = words.iter().rev().fold(0_u128, |acc, w| acc << 32 | *w as u128);
    Imm::u128(value)
}

#[test]
fn absolute_value_saturates() {
    let types = TypeRegistry::new();
    let mut ctx = DecompilerContext::new(&types);
    let input = lanes32([0x8000_0000, 5, (-3_i32) as u32, 0x7fff_ffff]);
    ctx.set_register(Register::gpr(T1 as u8), Expr::imm(input).into_ref()).unwrap();

    // pabsw t0, t1
    replay(&mut ctx, &[mmi(0x28, 0x01, ZERO, T1, T0)]);
    let value = ctx.get_register(Register::gpr(T0 as u8), None);
    assert_eq!(value.as_imm(), Some(&lanes32([0x7fff_ffff, 5, 3, 0x7fff_ffff])));

    // pabsh t2, t1
    let input = lanes32([0x0001_8000, 0, 0, 0xfffe_0000]);
    ctx.set_register(Register::gpr(T1 as u8), Expr::imm(input).into_ref()).unwrap();
    replay(&mut ctx, &[mmi(0x28, 0x05, ZERO, T1, T2)]);
    let value = ctx.get_register(Register::gpr(T2 as u8), None);
    assert_eq!(value.as_imm(), Some(&lanes32([0x0001_7fff, 0, 0, 0x0002_0000])));
}

#[test]
fn sign_bit_count_is_named() {
    let types = TypeRegistry::new();
    let mut ctx = DecompilerContext::new(&types);

    // plzcw t0, t1
    replay(&mut ctx, &[mmi(0x04, 0, T1, ZERO, T0)]);
    let value = ctx.get_register(Register::gpr(T0 as u8), None);
    let text = TextSink::render(&types, &value);
    assert_eq!(text.matches("redundant_sign_bits(").count(), 2, "{text}");
}

#[test]
fn placeholders_are_visible() {
    let types = TypeRegistry::new();
    let placeholder: ExprRef = Expr::placeholder("pmaddw", DataType::primitive(Primitive::U128)).into_ref();
    let text = TextSink::render(&types, &placeholder);
    assert!(text.contains("pmaddw"), "{text}");
    assert!(text.starts_with("/*"), "{text}");
}

#[test]
fn image_byte_order() {
    let word = addiu(T0, ZERO, 5);
    assert_eq!(image(&[word], Endianness::Little).read_word(BASE), Some(word));
    assert_eq!(image(&[word], Endianness::Big).read_word(BASE), Some(word));
    assert_eq!(image(&[word], Endianness::Little).read_word(BASE + 4), None);
    assert_eq!(image(&[word], Endianness::Little).read_word(BASE - 4), None);
}

quickcheck! {
    fn addiu_chain_folds(a: i16, b: i16) -> bool {
        let types = TypeRegistry::new();
        let mut ctx = DecompilerContext::new(&types);
        replay(&mut ctx, &[addiu(T0, ZERO, a as i32), addiu(T1, T0, b as i32)]);
        let expected = (a as i32).wrapping_add(b as i32);
        ctx.get_register(Register::gpr(T1 as u8), None).as_imm() == Some(&Imm::i32(expected))
    }

    fn stack_round_trip(offset: i16, value: i16) -> bool {
        let offset = (offset as i32) & !3;
        let types = TypeRegistry::new();
        let mut ctx = DecompilerContext::new(&types);
        replay(&mut ctx, &[addiu(T0, ZERO, value as i32), sw(T0, offset, SP), lw(T1, offset, SP)]);
        ctx.get_register(Register::gpr(T1 as u8), None).as_imm() == Some(&Imm::i32(value as i32))
    }
}
