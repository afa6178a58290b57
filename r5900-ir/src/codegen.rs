use num_bigint::BigInt;
use num_traits::Signed;

use crate::{
    expr::{BinaryOp, BranchTarget, Expr, ExprKind, ExprRef, UnaryOp},
    imm::Imm,
    memory::{resolve_access, Access},
    sink::CodeSink,
    types::{DataType, PathElement, Primitive},
};

/// The preferred source text for a constant.
pub fn literal_text(imm: &Imm) -> String {
    let ty = imm.ty();
    if ty.is_bool() {
        return match imm.is_zero() {
            true => "false".into(),
            false => "true".into(),
        };
    }
    if ty.is_pointer() && imm.is_zero() {
        return "NULL".into();
    }
    match ty.primitive_kind() {
        Some(Primitive::F32) => return float_text(imm.to_f32() as f64, "f"),
        Some(Primitive::F64) => return float_text(imm.to_f64(), ""),
        _ => {}
    }

    let value = imm.value();
    if value.abs() < BigInt::from(10) {
        return value.to_string();
    }
    match value.is_negative() {
        true => format!("-{:#x}", value.abs()),
        false => format!("{value:#x}"),
    }
}

fn float_text(value: f64, suffix: &str) -> String {
    if value.is_nan() {
        return "NAN".into();
    }
    if value.is_infinite() {
        return match value < 0.0 {
            true => "-INFINITY".into(),
            false => "INFINITY".into(),
        };
    }
    format!("{value:?}{suffix}")
}

fn operand<S: CodeSink + ?Sized>(sink: &mut S, expr: &Expr) {
    if expr.parenthesize {
        sink.punctuation("(");
        sink.expression(expr);
        sink.punctuation(")");
    }
    else {
        sink.expression(expr);
    }
}

fn cast_prefix<S: CodeSink + ?Sized>(sink: &mut S, ty: &DataType) {
    sink.punctuation("(");
    sink.data_type(ty);
    sink.punctuation(")");
}

fn call_args<S: CodeSink + ?Sized>(sink: &mut S, args: &[ExprRef]) {
    sink.punctuation("(");
    for (i, arg) in args.iter().enumerate() {
        if i != 0 {
            sink.punctuation(",");
            sink.whitespace(1);
        }
        sink.expression(arg);
    }
    sink.punctuation(")");
}

fn named_call<S: CodeSink + ?Sized>(sink: &mut S, name: &str, args: &[ExprRef]) {
    sink.misc_reference(name);
    call_args(sink, args);
}

fn binary_infix<S: CodeSink + ?Sized>(sink: &mut S, lhs: &Expr, symbol: &str, rhs: &Expr) {
    operand(sink, lhs);
    sink.whitespace(1);
    sink.punctuation(symbol);
    sink.whitespace(1);
    operand(sink, rhs);
}

/// Renders a memory access, returning the type of the accessed element.
fn access<S: CodeSink + ?Sized>(sink: &mut S, addr: &ExprRef, size: u8, fallback: &DataType) -> DataType {
    let access = resolve_access(sink.types(), addr, size, fallback);
    match &access {
        Access::Raw { addr, ty } => {
            sink.punctuation("*");
            sink.punctuation("(");
            sink.data_type(ty);
            sink.punctuation("*");
            sink.punctuation(")");
            operand(sink, addr);
        }
        Access::Typed { base, pointee, index, path, .. } => {
            let mut path = path.as_slice();
            let mut container = pointee.clone();

            match path.first() {
                Some(PathElement::Member(name)) if *index == 0 => {
                    operand(sink, base);
                    sink.punctuation("->");
                    sink.property_access(&container, name);
                    path = &path[1..];
                    container = member_type(sink, &container, name);
                }
                None if *index == 0 => {
                    sink.punctuation("*");
                    operand(sink, base);
                }
                _ => {
                    operand(sink, base);
                    sink.array_access(&container, &index.to_string());
                }
            }

            for element in path {
                match element {
                    PathElement::Index(i) => {
                        sink.array_access(&container, &i.to_string());
                        container = element_type(sink, &container);
                    }
                    PathElement::Member(name) => {
                        sink.punctuation(".");
                        sink.property_access(&container, name);
                        container = member_type(sink, &container, name);
                    }
                }
            }
        }
    }
    access.ty().clone()
}

fn member_type<S: CodeSink + ?Sized>(sink: &S, container: &DataType, name: &str) -> DataType {
    let crate::types::TypeKind::Structure { members } = container.kind()
    else {
        return container.clone();
    };
    members
        .iter()
        .find(|m| m.name == name)
        .and_then(|m| sink.types().get_type(m.ty).ok())
        .unwrap_or_else(|| DataType::primitive(Primitive::U8))
}

fn element_type<S: CodeSink + ?Sized>(sink: &S, container: &DataType) -> DataType {
    match container.kind() {
        crate::types::TypeKind::Array { element, .. } => {
            sink.types().get_type(*element).unwrap_or_else(|_| container.clone())
        }
        _ => container.clone(),
    }
}

fn store<S: CodeSink + ?Sized>(sink: &mut S, dest: &ExprRef, value: &ExprRef, size: u8) {
    // Prefer the type of the stored value when it already fits the access.
    let fallback = match value.ty.size() == size as u64 {
        true => value.ty.clone(),
        false => DataType::int(size as u32 * 8, false)
            .unwrap_or_else(|| DataType::primitive(Primitive::U32)),
    };
    let natural = access(sink, dest, size, &fallback);

    sink.whitespace(1);
    sink.punctuation("=");
    sink.whitespace(1);

    // An existing conversion is replaced by the one to the natural type.
    let (value, bitcast) = match &value.kind {
        ExprKind::Cast { value: inner, bitcast } => (inner, *bitcast),
        _ => (value, false),
    };

    if let Some(imm) = value.as_imm() {
        if natural.is_pointer() && imm.is_zero() {
            sink.keyword("NULL");
            return;
        }
    }
    if value.ty != natural {
        match bitcast && value.ty.is_float() != natural.is_float() {
            true => reinterpret(sink, &natural, value),
            false => {
                cast_prefix(sink, &natural);
                operand(sink, value);
            }
        }
        return;
    }
    sink.expression(value);
}

/// `*(ty*)&value`: the bits of `value` read as `ty`.
fn reinterpret<S: CodeSink + ?Sized>(sink: &mut S, ty: &DataType, value: &ExprRef) {
    sink.punctuation("*");
    sink.punctuation("(");
    sink.data_type(ty);
    sink.punctuation("*");
    sink.punctuation(")");
    sink.punctuation("&");
    operand(sink, value);
}

impl Expr {
    /// Renders the expression through `sink`.
    pub fn generate<S: CodeSink + ?Sized>(&self, sink: &mut S) {
        sink.push_address(self.address);
        self.generate_kind(sink);
        sink.pop_address();
    }

    fn generate_kind<S: CodeSink + ?Sized>(&self, sink: &mut S) {
        match &self.kind {
            ExprKind::Imm(imm) => sink.literal(&literal_text(imm), &self.ty, imm),
            ExprKind::Unary { op, value } => match op {
                UnaryOp::Neg => {
                    sink.punctuation("-");
                    operand(sink, value);
                }
                UnaryOp::Not => {
                    sink.punctuation("~");
                    operand(sink, value);
                }
                UnaryOp::LogicalNot => {
                    sink.punctuation("!");
                    operand(sink, value);
                }
                UnaryOp::Abs => named_call(sink, "abs", std::slice::from_ref(value)),
                UnaryOp::Sqrt => {
                    let name = if self.ty.bits() == 32 { "sqrtf" } else { "sqrt" };
                    named_call(sink, name, std::slice::from_ref(value))
                }
            },
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::Shl { sign_preserving: true } => {
                    named_call(sink, "SHL_KEEP_SIGN", &[lhs.clone(), rhs.clone()])
                }
                BinaryOp::Shr { sign_preserving: true } => {
                    named_call(sink, "SHR_KEEP_SIGN", &[lhs.clone(), rhs.clone()])
                }
                _ => binary_infix(sink, lhs, op.symbol(), rhs),
            },
            ExprKind::Compare { op, unsigned, lhs, rhs } => {
                let as_unsigned = |sink: &mut S, value: &Expr| {
                    if *unsigned && value.ty.is_signed() {
                        cast_prefix(sink, &value.ty.result_type(Some(true), None));
                    }
                    operand(sink, value);
                };
                as_unsigned(sink, lhs);
                sink.whitespace(1);
                sink.punctuation(op.symbol());
                sink.whitespace(1);
                as_unsigned(sink, rhs);
            }
            ExprKind::Ternary { cond, then, otherwise } => {
                operand(sink, cond);
                sink.whitespace(1);
                sink.punctuation("?");
                sink.whitespace(1);
                operand(sink, then);
                sink.whitespace(1);
                sink.punctuation(":");
                sink.whitespace(1);
                operand(sink, otherwise);
            }
            ExprKind::Load { addr, size, .. } => {
                access(sink, addr, *size, &self.ty);
            }
            ExprKind::Store { dest, value, size } => store(sink, dest, value, *size),
            ExprKind::Call { target, args } => {
                match sink.resolve_function(*target) {
                    Some(function) => sink.func(&function),
                    None => sink.misc_reference(&format!("sub_{target:x}")),
                }
                call_args(sink, args);
            }
            ExprKind::IndirectCall { target, args } => {
                sink.punctuation("(");
                sink.punctuation("*");
                operand(sink, target);
                sink.punctuation(")");
                call_args(sink, args);
            }
            ExprKind::Intrinsic { name, args } => named_call(sink, name, args),
            ExprKind::ConditionalBranch { target, likely, .. } => {
                let kind = if *likely { "likely branch" } else { "branch" };
                sink.comment(&format!("{kind} to {target:#x}"));
            }
            ExprKind::UnconditionalBranch(BranchTarget::Direct(target)) => {
                sink.keyword("goto");
                sink.whitespace(1);
                sink.misc_reference(&format!("loc_{target:x}"));
            }
            ExprKind::UnconditionalBranch(BranchTarget::Indirect(target)) => {
                sink.keyword("goto");
                sink.whitespace(1);
                sink.punctuation("*");
                operand(sink, target);
            }
            ExprKind::GetBits { value, offset, .. } => {
                cast_prefix(sink, &self.ty);
                if *offset == 0 {
                    operand(sink, value);
                    return;
                }
                sink.punctuation("(");
                operand(sink, value);
                sink.whitespace(1);
                sink.punctuation(">>");
                sink.whitespace(1);
                let shift = Imm::u32(*offset);
                sink.literal(&offset.to_string(), shift.ty(), &shift);
                sink.punctuation(")");
            }
            ExprKind::ConcatBits(parts) => {
                let high_first: Vec<ExprRef> = parts.iter().rev().cloned().collect();
                named_call(sink, "CONCAT", &high_first);
            }
            ExprKind::Clamp { value, lo, hi } => {
                named_call(sink, "CLAMP", &[value.clone(), lo.clone(), hi.clone()])
            }
            ExprKind::Cast { value, bitcast } => {
                if *bitcast && value.ty.is_float() != self.ty.is_float() {
                    reinterpret(sink, &self.ty, value);
                }
                else {
                    cast_prefix(sink, &self.ty);
                    operand(sink, value);
                }
            }
            ExprKind::RawText(text) => sink.plain_text(text),
            ExprKind::StackPointer => sink.misc_reference("__sp"),
            ExprKind::Variable(var) => sink.variable(var),
            ExprKind::Placeholder(note) => sink.comment(&format!("unimplemented: {note}")),
        }
    }
}
