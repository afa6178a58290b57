use std::sync::Arc;

use quickcheck::{Arbitrary, Gen};
use r5900_isa::{Location, Register};

use crate::{
    expr::{BinaryOp, CompareOp, Expr, ExprKind, ExprRef, UnaryOp, VariableRef},
    imm::Imm,
    sink::{FunctionRef, FunctionTable},
    text::TextSink,
    types::{DataType, Primitive, TypeRegistry},
    ExprError,
};

fn i32_ty() -> DataType {
    DataType::primitive(Primitive::I32)
}

fn imm(value: i32) -> ExprRef {
    Expr::imm(Imm::i32(value)).into_ref()
}

fn var(reg: Register, ty: DataType) -> ExprRef {
    Expr::variable(VariableRef::new(Location::Register(reg), 0), ty).into_ref()
}

fn binary(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    let ty = lhs.ty.clone();
    Expr::binary(op, lhs, rhs, ty).into_ref()
}

fn reduced(expr: ExprRef) -> ExprRef {
    expr.reduce().unwrap()
}

#[test]
fn fold_add() {
    let expr = binary(BinaryOp::Add, imm(5), imm(-3));
    assert_eq!(reduced(expr).as_imm(), Some(&Imm::i32(2)));

    let expr = binary(BinaryOp::Add, imm(i32::MAX), imm(1));
    assert_eq!(reduced(expr).as_imm(), Some(&Imm::i32(i32::MIN)));
}

#[test]
fn sign_preserving_shift() {
    let u8 = DataType::primitive(Primitive::U8);
    let shl = BinaryOp::Shl { sign_preserving: true };

    let value = Expr::imm(Imm::u8(0x80)).into_ref();
    let amount = Expr::imm(Imm::u8(1)).into_ref();
    let expr = Expr::binary(shl, value, amount.clone(), u8.clone()).into_ref();
    assert_eq!(reduced(expr).as_imm(), Some(&Imm::u8(0x80)));

    let value = Expr::imm(Imm::u8(0xc1)).into_ref();
    let expr = Expr::binary(shl, value, amount.clone(), u8.clone()).into_ref();
    assert_eq!(reduced(expr).as_imm(), Some(&Imm::u8(0x82)));

    let value = Expr::imm(Imm::u8(0x41)).into_ref();
    let plain = Expr::binary(BinaryOp::Shl { sign_preserving: false }, value, amount, u8);
    assert_eq!(reduced(plain.into_ref()).as_imm(), Some(&Imm::u8(0x82)));
}

#[test]
fn integer_folding_matches_host() {
    fn check(a: i32, b: i32) -> bool {
        let fold = |op| reduced(binary(op, imm(a), imm(b))).as_imm().cloned();
        let mut ok = fold(BinaryOp::Add) == Some(Imm::i32(a.wrapping_add(b)))
            && fold(BinaryOp::Sub) == Some(Imm::i32(a.wrapping_sub(b)))
            && fold(BinaryOp::Mul) == Some(Imm::i32(a.wrapping_mul(b)))
            && fold(BinaryOp::And) == Some(Imm::i32(a & b))
            && fold(BinaryOp::Or) == Some(Imm::i32(a | b))
            && fold(BinaryOp::Xor) == Some(Imm::i32(a ^ b));

        if b != 0 {
            ok &= fold(BinaryOp::Div) == Some(Imm::i32(a.wrapping_div(b)));
            ok &= fold(BinaryOp::Mod) == Some(Imm::i32(a.wrapping_rem(b)));
        }

        let shift = (b & 31) as u32;
        let fold_shift = |op| {
            let expr = binary(op, imm(a), imm(shift as i32));
            reduced(expr).as_imm().cloned()
        };
        ok &= fold_shift(BinaryOp::Shl { sign_preserving: false })
            == Some(Imm::i32(a.wrapping_shl(shift)));
        ok &= fold_shift(BinaryOp::Shr { sign_preserving: false }) == Some(Imm::i32(a >> shift));

        let u32 = DataType::primitive(Primitive::U32);
        let logical = Expr::binary(
            BinaryOp::Shr { sign_preserving: false },
            Expr::imm(Imm::u32(a as u32)).into_ref(),
            imm(shift as i32),
            u32,
        );
        ok &= reduced(logical.into_ref()).as_imm() == Some(&Imm::u32((a as u32) >> shift));

        ok
    }
    quickcheck::quickcheck(check as fn(i32, i32) -> bool)
}

#[test]
fn division_by_zero_is_not_folded() {
    let expr = binary(BinaryOp::Div, imm(7), imm(0));
    let out = reduced(expr.clone());
    assert!(Arc::ptr_eq(&out, &expr));
}

#[test]
fn compare_folding() {
    let lt = |unsigned| {
        let expr = Expr::compare(CompareOp::Lt, unsigned, imm(-1), imm(1)).into_ref();
        reduced(expr).as_imm().cloned()
    };
    assert_eq!(lt(false), Some(Imm::bool(true)));
    assert_eq!(lt(true), Some(Imm::bool(false)));

    let expr = Expr::compare(CompareOp::Eq, false, imm(3), imm(3)).into_ref();
    let out = reduced(expr);
    assert_eq!(out.as_imm(), Some(&Imm::bool(true)));
    assert!(out.ty.is_bool());
}

#[test]
fn float_folding() {
    let f32 = DataType::primitive(Primitive::F32);
    let lhs = Expr::imm(Imm::f32(1.5)).into_ref();
    let rhs = Expr::imm(Imm::f32(2.25)).into_ref();
    let expr = Expr::binary(BinaryOp::Add, lhs.clone(), rhs, f32.clone()).into_ref();
    assert_eq!(reduced(expr).as_imm(), Some(&Imm::f32(3.75)));

    let neg = Expr::unary(UnaryOp::Neg, lhs.clone(), f32.clone()).into_ref();
    assert_eq!(reduced(neg).as_imm(), Some(&Imm::f32(-1.5)));

    let four = Expr::imm(Imm::f32(4.0)).into_ref();
    let sqrt = Expr::unary(UnaryOp::Sqrt, four, f32.clone()).into_ref();
    assert_eq!(reduced(sqrt).as_imm(), Some(&Imm::f32(2.0)));

    let xor = Expr::binary(BinaryOp::Xor, lhs.clone(), lhs, f32).into_ref();
    assert!(matches!(xor.reduce(), Err(ExprError::UnsupportedOperation { op: "xor", .. })));

    let sqrt = Expr::unary(UnaryOp::Sqrt, imm(4), i32_ty()).into_ref();
    assert!(matches!(sqrt.reduce(), Err(ExprError::UnsupportedOperation { .. })));
}

#[test]
fn unary_folding() {
    let fold = |op, value: Imm| {
        let ty = value.ty().clone();
        let expr = Expr::unary(op, Expr::imm(value).into_ref(), ty).into_ref();
        reduced(expr).as_imm().cloned()
    };
    assert_eq!(fold(UnaryOp::Neg, Imm::i32(5)), Some(Imm::i32(-5)));
    assert_eq!(fold(UnaryOp::Abs, Imm::i32(-5)), Some(Imm::i32(5)));
    assert_eq!(fold(UnaryOp::Abs, Imm::u8(0xfb)), Some(Imm::u8(0xfb)));
    assert_eq!(fold(UnaryOp::Not, Imm::u16(0x00ff)), Some(Imm::u16(0xff00)));
    assert_eq!(fold(UnaryOp::Neg, Imm::i8(i8::MIN)), Some(Imm::i8(i8::MIN)));

    let not = Expr::unary(UnaryOp::LogicalNot, imm(0), DataType::bool()).into_ref();
    assert_eq!(reduced(not).as_imm(), Some(&Imm::bool(true)));
}

#[test]
fn canonical_forms() {
    let t0 = var(Register::T0, i32_ty());

    // Constants move to the right of commutative operations.
    let out = reduced(binary(BinaryOp::Add, imm(3), t0.clone()));
    assert_eq!(out, binary(BinaryOp::Add, t0.clone(), imm(3)));

    // Nested constant additions are flattened.
    let nested = binary(BinaryOp::Add, binary(BinaryOp::Add, t0.clone(), imm(1)), imm(2));
    assert_eq!(reduced(nested), binary(BinaryOp::Add, t0.clone(), imm(3)));

    let nested = binary(BinaryOp::Sub, binary(BinaryOp::Add, t0.clone(), imm(8)), imm(8));
    assert!(Arc::ptr_eq(&reduced(nested), &t0));

    // Adding a negative constant becomes a subtraction.
    let out = reduced(binary(BinaryOp::Add, t0.clone(), imm(-4)));
    assert_eq!(out, binary(BinaryOp::Sub, t0.clone(), imm(4)));

    let out = reduced(binary(BinaryOp::Add, t0.clone(), imm(i32::MIN)));
    assert_eq!(out, binary(BinaryOp::Add, t0.clone(), imm(i32::MIN)));

    // Identities.
    for (op, value) in [(BinaryOp::Add, 0), (BinaryOp::Or, 0), (BinaryOp::Mul, 1), (BinaryOp::And, -1)]
    {
        assert!(Arc::ptr_eq(&reduced(binary(op, t0.clone(), imm(value))), &t0), "{op:?}");
    }
    let out = reduced(binary(BinaryOp::Mul, t0.clone(), imm(0)));
    assert_eq!(out.as_imm(), Some(&Imm::i32(0)));

    // Comparisons mirror when swapping operands.
    let cmp = Expr::compare(CompareOp::Lt, false, imm(3), t0.clone()).into_ref();
    let out = reduced(cmp);
    assert_eq!(out, Expr::compare(CompareOp::Gt, false, t0.clone(), imm(3)).into_ref());

    // Negated comparisons are inverted.
    let cmp = Expr::compare(CompareOp::Lt, false, t0.clone(), imm(3)).into_ref();
    let not = Expr::unary(UnaryOp::LogicalNot, cmp, DataType::bool()).into_ref();
    assert_eq!(reduced(not), Expr::compare(CompareOp::Ge, false, t0.clone(), imm(3)).into_ref());

    let neg = Expr::unary(UnaryOp::Neg, t0.clone(), i32_ty()).into_ref();
    let double = Expr::unary(UnaryOp::Neg, neg, i32_ty()).into_ref();
    assert!(Arc::ptr_eq(&reduced(double), &t0));
}

#[test]
fn unchanged_trees_are_shared() {
    let t0 = var(Register::T0, i32_ty());
    let expr = binary(BinaryOp::Sub, t0, imm(4));
    assert!(Arc::ptr_eq(&reduced(expr.clone()), &expr));
}

#[test]
fn pointer_branch_conditions() {
    let types = TypeRegistry::new();
    let ptr = types.pointer_to(&DataType::primitive(Primitive::U8));
    let a0 = var(Register::A0, ptr.clone());
    let null = Expr::imm(Imm::typed(0, ptr)).into_ref();

    let branch = |op| {
        let cond = Expr::compare(op, false, a0.clone(), null.clone()).into_ref();
        let kind = ExprKind::ConditionalBranch { cond, target: 0x100, likely: false };
        reduced(Expr::new(kind, DataType::bool()).into_ref())
    };

    let ne = branch(CompareOp::Ne);
    let ExprKind::ConditionalBranch { cond, .. } = &ne.kind
    else {
        panic!("expected a conditional branch");
    };
    assert!(Arc::ptr_eq(cond, &a0));

    let eq = branch(CompareOp::Eq);
    let ExprKind::ConditionalBranch { cond, .. } = &eq.kind
    else {
        panic!("expected a conditional branch");
    };
    assert!(matches!(&cond.kind, ExprKind::Unary { op: UnaryOp::LogicalNot, value } if Arc::ptr_eq(value, &a0)));
}

#[test]
fn lane_operations() {
    let u32 = DataType::primitive(Primitive::U32);
    let u64 = DataType::primitive(Primitive::U64);
    let t0 = var(Register::T0, u64.clone());

    let low = Expr::get_bits(t0.clone(), 0, 32, u32.clone()).into_ref();
    let high = Expr::get_bits(t0.clone(), 32, 32, u32.clone()).into_ref();

    // Reassembling all lanes in order gives back the value.
    let whole = Expr::concat_bits(vec![low.clone(), high.clone()], u64.clone()).into_ref();
    assert!(Arc::ptr_eq(&reduced(whole), &t0));

    // Swapped lanes stay a concatenation.
    let swapped = Expr::concat_bits(vec![high.clone(), low.clone()], u64.clone()).into_ref();
    assert!(matches!(reduced(swapped).kind, ExprKind::ConcatBits(_)));

    // Extracting a lane of a concatenation selects the part.
    let t1 = var(Register::T1, u32.clone());
    let pair = Expr::concat_bits(vec![t1.clone(), high], u64.clone()).into_ref();
    let lane = Expr::get_bits(pair, 0, 32, u32.clone()).into_ref();
    assert!(Arc::ptr_eq(&reduced(lane), &t1));

    let parts = vec![
        Expr::imm(Imm::u32(0x1111_2222)).into_ref(),
        Expr::imm(Imm::u32(0x3333_4444)).into_ref(),
    ];
    let constant = Expr::concat_bits(parts, u64.clone()).into_ref();
    assert_eq!(reduced(constant).as_imm(), Some(&Imm::u64(0x3333_4444_1111_2222)));

    let field = Expr::imm(Imm::u64(0x3333_4444_1111_2222)).into_ref();
    let lane = Expr::get_bits(field, 16, 16, DataType::primitive(Primitive::I16)).into_ref();
    assert_eq!(reduced(lane).as_imm(), Some(&Imm::i16(0x1111)));

    let i16 = DataType::primitive(Primitive::I16);
    let clamp = Expr::clamp(
        imm(40000),
        imm(i16::MIN as i32),
        imm(i16::MAX as i32),
        i32_ty(),
    );
    assert_eq!(reduced(clamp.into_ref()).as_imm(), Some(&Imm::i32(i16::MAX as i32)));
}

#[test]
fn casts() {
    let u8 = DataType::primitive(Primitive::U8);
    let i64 = DataType::primitive(Primitive::I64);
    let t0 = var(Register::T0, i32_ty());

    let out = reduced(Expr::cast(imm(0x1ff), u8.clone()).into_ref());
    assert_eq!(out.as_imm(), Some(&Imm::u8(0xff)));

    let same = Expr::cast(t0.clone(), i32_ty()).into_ref();
    assert!(Arc::ptr_eq(&reduced(same), &t0));

    let wide = Expr::cast(t0.clone(), i64).into_ref();
    let narrow = Expr::cast(wide, u8.clone()).into_ref();
    assert_eq!(reduced(narrow), Expr::cast(t0.clone(), u8).into_ref());

    let float = Expr::bitcast(imm(0x3f80_0000), DataType::primitive(Primitive::F32)).into_ref();
    assert_eq!(reduced(float).as_imm(), Some(&Imm::f32(1.0)));
}

/// A randomly generated expression tree over two 32-bit variables.
#[derive(Clone, Debug)]
struct Tree(ExprRef);

fn gen_tree(g: &mut Gen, depth: u32) -> ExprRef {
    const VALUES: &[i32] = &[0, 1, -1, 2, 3, -4, 8, 31, 0x7fff, i32::MIN, i32::MAX];
    const BINARY: &[BinaryOp] = &[
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Xor,
        BinaryOp::Shl { sign_preserving: false },
        BinaryOp::Shr { sign_preserving: true },
    ];

    let choice = match depth {
        0 => u8::arbitrary(g) % 3,
        _ => u8::arbitrary(g) % 9,
    };
    match choice {
        0 => imm(*g.choose(VALUES).unwrap()),
        1 => imm(i32::arbitrary(g)),
        2 => var(*g.choose(&[Register::T0, Register::T1]).unwrap(), i32_ty()),
        3..=5 => {
            let op = *g.choose(BINARY).unwrap();
            binary(op, gen_tree(g, depth - 1), gen_tree(g, depth - 1))
        }
        6 => {
            let op = *g.choose(&[UnaryOp::Neg, UnaryOp::Not, UnaryOp::Abs]).unwrap();
            Expr::unary(op, gen_tree(g, depth - 1), i32_ty()).into_ref()
        }
        7 => {
            let op = *g.choose(&[CompareOp::Eq, CompareOp::Lt, CompareOp::Ge]).unwrap();
            let cond =
                Expr::compare(op, bool::arbitrary(g), gen_tree(g, depth - 1), gen_tree(g, depth - 1));
            let cond = match bool::arbitrary(g) {
                true => Expr::unary(UnaryOp::LogicalNot, cond.into_ref(), DataType::bool()),
                false => cond,
            };
            Expr::ternary(cond.into_ref(), gen_tree(g, depth - 1), gen_tree(g, depth - 1), i32_ty())
                .into_ref()
        }
        _ => {
            let ty = *g.choose(&[Primitive::U8, Primitive::I16, Primitive::U64]).unwrap();
            let inner = Expr::cast(gen_tree(g, depth - 1), DataType::primitive(ty)).into_ref();
            Expr::cast(inner, i32_ty()).into_ref()
        }
    }
}

impl Arbitrary for Tree {
    fn arbitrary(g: &mut Gen) -> Self {
        let depth = u32::arbitrary(g) % 5;
        Tree(gen_tree(g, depth))
    }
}

#[test]
fn reduce_is_idempotent() {
    fn check(tree: Tree) -> bool {
        match tree.0.reduce() {
            Ok(once) => match once.clone().reduce() {
                Ok(twice) => twice == once && Arc::ptr_eq(&twice, &once),
                Err(_) => false,
            },
            // Shifts by a negative amount are rejected.
            Err(e) => matches!(e, ExprError::UnsupportedOperation { .. }),
        }
    }
    quickcheck::quickcheck(check as fn(Tree) -> bool)
}

fn game_types() -> TypeRegistry {
    let types = TypeRegistry::new();
    types
        .define_structure("Player", 0x10, &[
            ("hp", 0, "i16"),
            ("flags", 2, "u16"),
            ("pos", 4, "f32[2]"),
            ("next", 0xc, "u8*"),
        ])
        .unwrap();
    types
}

fn player(types: &TypeRegistry) -> ExprRef {
    let ty = types.pointer_to(&types.get_type("Player").unwrap());
    var(Register::A0, ty)
}

fn field(base: &ExprRef, offset: i32) -> ExprRef {
    binary(BinaryOp::Add, base.clone(), imm(offset))
}

#[test]
fn render_loads() {
    let types = game_types();
    let p = player(&types);
    let f32 = DataType::primitive(Primitive::F32);

    let load = Expr::load(field(&p, 8), 4, false, f32.clone());
    assert_eq!(TextSink::render(&types, &load), "a0_0->pos[1]");

    let load = Expr::load(field(&p, 0x18), 4, false, f32.clone());
    assert_eq!(TextSink::render(&types, &load), "a0_0[1].pos[1]");

    let load = Expr::load(p.clone(), 2, true, DataType::primitive(Primitive::I16));
    assert_eq!(TextSink::render(&types, &load), "a0_0->hp");

    let t0 = var(Register::T0, i32_ty());
    let load = Expr::load(field(&t0, 0x10), 4, true, i32_ty());
    assert_eq!(TextSink::render(&types, &load), "*(i32*)(t0_0 + 0x10)");

    // A size mismatch with the member falls back to a raw access.
    let load = Expr::load(p.clone(), 4, false, DataType::primitive(Primitive::U32));
    assert_eq!(TextSink::render(&types, &load), "*(u32*)a0_0");
}

#[test]
fn render_stores() {
    let types = game_types();
    let p = player(&types);
    let t0 = var(Register::T0, i32_ty());

    let store = Expr::store(field(&p, 2), t0.clone(), 2);
    let text = TextSink::render(&types, &store);
    assert_eq!(text, "a0_0->flags = (u16)t0_0");

    // An existing conversion is not stacked on top of the one to the member type.
    let narrowed = Expr::cast(t0.clone(), DataType::primitive(Primitive::I16)).into_ref();
    let store = Expr::store(field(&p, 2), narrowed, 2);
    let text = TextSink::render(&types, &store);
    assert_eq!(text.matches('(').count(), 1, "{text}");
    assert_eq!(text, "a0_0->flags = (u16)t0_0");

    let store = Expr::store(p.clone(), var(Register::T1, DataType::primitive(Primitive::I16)), 2);
    assert_eq!(TextSink::render(&types, &store), "a0_0->hp = t1_0");

    let store = Expr::store(field(&p, 0xc), imm(0), 4);
    assert_eq!(TextSink::render(&types, &store), "a0_0->next = NULL");
}

#[test]
fn render_bitcast_stores() {
    let types = game_types();
    let p = player(&types);
    let f0 = var(Register::fpr(0), DataType::primitive(Primitive::F32));

    // `mfc1` then `sw` into a float member stores the float itself.
    let bits = Expr::bitcast(f0.clone(), i32_ty()).into_ref();
    let store = Expr::store(field(&p, 4), bits.clone(), 4);
    assert_eq!(TextSink::render(&types, &store), "a0_0->pos[0] = f0_0");

    // Any other member gets a single reinterpretation.
    let store = Expr::store(field(&p, 0xc), bits, 4);
    let text = TextSink::render(&types, &store);
    assert_eq!(text.matches('(').count(), 1, "{text}");
    assert_eq!(text, "a0_0->next = *(u8**)&f0_0");
}

#[test]
fn render_expressions() {
    let types = TypeRegistry::new();
    let t0 = var(Register::T0, i32_ty());
    let render = |expr: ExprRef| TextSink::render(&types, &expr);

    assert_eq!(render(imm(-16)), "-0x10");
    assert_eq!(render(imm(9)), "9");
    assert_eq!(render(Expr::imm(Imm::f32(1.5)).into_ref()), "1.5f");
    assert_eq!(render(Expr::imm(Imm::bool(true)).into_ref()), "true");

    let sum = binary(BinaryOp::Add, t0.clone(), imm(-4));
    assert_eq!(render(reduced(sum)), "t0_0 - 4");

    let product = binary(BinaryOp::Mul, binary(BinaryOp::Add, t0.clone(), imm(1)), imm(3));
    assert_eq!(render(product), "(t0_0 + 1) * 3");

    let placeholder = Expr::placeholder("fpu flags", i32_ty()).into_ref();
    assert_eq!(render(placeholder), "/* unimplemented: fpu flags */");

    let stack = VariableRef::new(Location::Stack(-0x10), 2);
    assert_eq!(render(Expr::variable(stack, i32_ty()).into_ref()), "var_10_2");
}

#[test]
fn render_calls() {
    let types = TypeRegistry::new();
    let mut functions = FunctionTable::new();
    functions.insert(FunctionRef::new("init", 0x1000));

    let t0 = var(Register::T0, i32_ty());
    let call = |target| Expr::new(ExprKind::Call { target, args: vec![t0.clone()] }, i32_ty());

    let mut sink = TextSink::new(&types).with_functions(&functions);
    crate::CodeSink::expression(&mut sink, &call(0x1000));
    assert_eq!(sink.current_address(), None);
    assert_eq!(sink.finish(), "init(t0_0)");

    assert_eq!(TextSink::render(&types, &call(0x2000)), "sub_2000(t0_0)");
}
