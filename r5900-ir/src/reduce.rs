//! Constant folding and algebraic canonicalization of expression trees.

use std::sync::Arc;

use num_bigint::{BigInt, BigUint};
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    expr::{BinaryOp, CompareOp, Expr, ExprKind, ExprRef, UnaryOp},
    imm::{mask, sign_extend, Imm},
    types::{DataType, TypeKind},
    ExprError,
};

impl Expr {
    /// Simplifies the expression bottom-up.
    ///
    /// Returns the same node when nothing changes. The result is a fixed point: reducing it again
    /// returns it unchanged.
    pub fn reduce(self: Arc<Self>) -> Result<ExprRef, ExprError> {
        reduce(&self)
    }
}

/// See [Expr::reduce].
pub fn reduce(expr: &ExprRef) -> Result<ExprRef, ExprError> {
    let children = expr.children();
    let mut changed = false;
    let mut reduced = Vec::with_capacity(children.len());
    for child in children {
        let new = reduce(child)?;
        changed |= !Arc::ptr_eq(&new, child);
        reduced.push(new);
    }

    let node = match changed {
        true => Arc::new(expr.with_children(reduced)),
        false => expr.clone(),
    };

    match rewrite(&node)? {
        Some(new) => reduce(&new),
        None => Ok(node),
    }
}

fn imm_expr(template: &Expr, imm: Imm) -> ExprRef {
    let mut expr = Expr::imm(imm).at(template.address);
    expr.location = template.location;
    expr.into_ref()
}

/// Returns `value` as an expression of type `ty`, inserting a conversion when the types differ.
fn coerce(template: &Expr, value: &ExprRef, bitcast: bool) -> ExprRef {
    if value.ty == template.ty {
        return value.clone();
    }
    template.with_kind(ExprKind::Cast { value: value.clone(), bitcast }).into_ref()
}

/// Applies a single local rewrite to `expr`, whose children are already reduced.
fn rewrite(expr: &ExprRef) -> Result<Option<ExprRef>, ExprError> {
    match &expr.kind {
        ExprKind::Unary { op, value } => rewrite_unary(expr, *op, value),
        ExprKind::Binary { op, lhs, rhs } => rewrite_binary(expr, *op, lhs, rhs),
        ExprKind::Compare { op, unsigned, lhs, rhs } => {
            if let (Some(a), Some(b)) = (lhs.as_imm(), rhs.as_imm()) {
                return Ok(Some(imm_expr(expr, fold_compare(*op, *unsigned, a, b)?)));
            }
            if lhs.is_imm() {
                let kind = ExprKind::Compare {
                    op: op.mirror(),
                    unsigned: *unsigned,
                    lhs: rhs.clone(),
                    rhs: lhs.clone(),
                };
                return Ok(Some(expr.with_kind(kind).into_ref()));
            }
            Ok(None)
        }
        ExprKind::Ternary { cond, then, otherwise } => {
            if let Some(cond) = cond.as_imm() {
                let taken = if cond.is_zero() { otherwise } else { then };
                return Ok(Some(coerce(expr, taken, false)));
            }
            if then == otherwise && !cond.has_side_effects() {
                return Ok(Some(coerce(expr, then, false)));
            }
            Ok(None)
        }
        ExprKind::ConditionalBranch { cond, target, likely } => {
            let ExprKind::Compare { op, lhs, rhs, .. } = &cond.kind
            else {
                return Ok(None);
            };
            let zero = rhs.as_imm().map_or(false, |imm| imm.is_zero());
            if !zero || !(lhs.ty.is_pointer() || lhs.ty.is_bool()) {
                return Ok(None);
            }
            let cond = match op {
                CompareOp::Ne => lhs.clone(),
                CompareOp::Eq => cond
                    .with_kind(ExprKind::Unary { op: UnaryOp::LogicalNot, value: lhs.clone() })
                    .into_ref(),
                _ => return Ok(None),
            };
            let kind = ExprKind::ConditionalBranch { cond, target: *target, likely: *likely };
            Ok(Some(expr.with_kind(kind).into_ref()))
        }
        ExprKind::GetBits { value, offset, width } => rewrite_get_bits(expr, value, *offset, *width),
        ExprKind::ConcatBits(parts) => rewrite_concat(expr, parts),
        ExprKind::Clamp { value, lo, hi } => {
            match (value.as_imm(), lo.as_imm(), hi.as_imm()) {
                (Some(value), Some(lo), Some(hi)) => {
                    Ok(Some(imm_expr(expr, fold_clamp(value, lo, hi, &expr.ty)?)))
                }
                _ => Ok(None),
            }
        }
        ExprKind::Cast { value, bitcast } => rewrite_cast(expr, value, *bitcast),
        _ => Ok(None),
    }
}

fn rewrite_unary(expr: &ExprRef, op: UnaryOp, value: &ExprRef) -> Result<Option<ExprRef>, ExprError> {
    if let Some(imm) = value.as_imm() {
        return Ok(Some(imm_expr(expr, fold_unary(op, imm, &expr.ty)?)));
    }

    match (&value.kind, op) {
        (ExprKind::Unary { op: inner, value: x }, UnaryOp::Neg | UnaryOp::Not) if *inner == op => {
            Ok(Some(coerce(expr, x, false)))
        }
        (ExprKind::Unary { op: UnaryOp::LogicalNot, value: x }, UnaryOp::LogicalNot)
            if x.ty.is_bool() =>
        {
            Ok(Some(x.clone()))
        }
        (ExprKind::Compare { op: cmp, unsigned, lhs, rhs }, UnaryOp::LogicalNot) => {
            let kind = ExprKind::Compare {
                op: cmp.logical_inversion(),
                unsigned: *unsigned,
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            };
            Ok(Some(value.with_kind(kind).at(expr.address).into_ref()))
        }
        _ => Ok(None),
    }
}

fn rewrite_binary(
    expr: &ExprRef,
    op: BinaryOp,
    lhs: &ExprRef,
    rhs: &ExprRef,
) -> Result<Option<ExprRef>, ExprError> {
    let ty = &expr.ty;

    if let (Some(a), Some(b)) = (lhs.as_imm(), rhs.as_imm()) {
        return Ok(fold_binary(op, a, b, ty)?.map(|imm| imm_expr(expr, imm)));
    }

    if lhs.is_imm() && op.is_commutative() {
        let kind = ExprKind::Binary { op, lhs: rhs.clone(), rhs: lhs.clone() };
        return Ok(Some(expr.with_kind(kind).into_ref()));
    }

    let Some(c) = rhs.as_imm()
    else {
        return Ok(None);
    };
    if ty.is_float() || !(ty.is_integer() || ty.is_pointer()) {
        return Ok(None);
    }

    let binary = |op, lhs: &ExprRef, value: BigInt| {
        let rhs = imm_expr(rhs, Imm::typed(value, c.ty().clone()));
        Some(expr.with_kind(ExprKind::Binary { op, lhs: lhs.clone(), rhs }).into_ref())
    };

    // Flatten chains of additions and subtractions of constants.
    if let (BinaryOp::Add | BinaryOp::Sub, ExprKind::Binary { op: inner, lhs: x, rhs: c1 }) =
        (op, &lhs.kind)
    {
        if let (BinaryOp::Add | BinaryOp::Sub, Some(c1)) = (inner, c1.as_imm()) {
            if lhs.ty == *ty {
                let (a, b) = (c1.value(), c.value());
                return Ok(match (*inner, op) {
                    (BinaryOp::Add, BinaryOp::Add) => binary(BinaryOp::Add, x, a + b),
                    (BinaryOp::Sub, BinaryOp::Add) => binary(BinaryOp::Add, x, b - a),
                    (BinaryOp::Add, BinaryOp::Sub) => binary(BinaryOp::Add, x, a - b),
                    _ => binary(BinaryOp::Sub, x, a + b),
                });
            }
        }
    }

    // Prefer subtracting a positive constant over adding a negative one.
    if matches!(op, BinaryOp::Add | BinaryOp::Sub) && c.is_negative() {
        let negated = -c.value();
        if !Imm::typed(negated.clone(), c.ty().clone()).is_negative() {
            let op = if op == BinaryOp::Add { BinaryOp::Sub } else { BinaryOp::Add };
            return Ok(binary(op, lhs, negated));
        }
    }

    let identity = match op {
        BinaryOp::Add
        | BinaryOp::Sub
        | BinaryOp::Or
        | BinaryOp::Xor
        | BinaryOp::Shl { .. }
        | BinaryOp::Shr { .. } => c.is_zero(),
        BinaryOp::Mul | BinaryOp::Div => c.is_one(),
        BinaryOp::And => c.is_all_ones() && c.width() >= ty.bits(),
        BinaryOp::Mod => false,
    };
    if identity {
        return Ok(Some(coerce(expr, lhs, false)));
    }

    let annihilates = matches!(op, BinaryOp::Mul | BinaryOp::And) && c.is_zero();
    if annihilates && !lhs.has_side_effects() {
        return Ok(Some(imm_expr(expr, Imm::typed(0, ty.clone()))));
    }

    Ok(None)
}

fn part_width(part: &Expr) -> u32 {
    part.ty.bits()
}

fn rewrite_get_bits(
    expr: &ExprRef,
    value: &ExprRef,
    offset: u32,
    width: u32,
) -> Result<Option<ExprRef>, ExprError> {
    if let Some(imm) = value.as_imm() {
        return Ok(Some(imm_expr(expr, fold_get_bits(imm, offset, width, &expr.ty))));
    }

    match &value.kind {
        ExprKind::ConcatBits(parts) => {
            let mut start = 0;
            for part in parts {
                let end = start + part_width(part);
                if start <= offset && offset + width <= end {
                    if offset == start && width == end - start {
                        return Ok(Some(coerce(expr, part, true)));
                    }
                    let kind = ExprKind::GetBits { value: part.clone(), offset: offset - start, width };
                    return Ok(Some(expr.with_kind(kind).into_ref()));
                }
                start = end;
            }
            Ok(None)
        }
        ExprKind::GetBits { value: inner, offset: inner_offset, width: inner_width }
            if offset + width <= *inner_width =>
        {
            let kind =
                ExprKind::GetBits { value: inner.clone(), offset: inner_offset + offset, width };
            Ok(Some(expr.with_kind(kind).into_ref()))
        }
        _ if offset == 0 && width == value.ty.bits() && width == expr.ty.bits() => {
            Ok(Some(coerce(expr, value, true)))
        }
        _ => Ok(None),
    }
}

fn rewrite_concat(expr: &ExprRef, parts: &[ExprRef]) -> Result<Option<ExprRef>, ExprError> {
    if parts.len() == 1 {
        return Ok(Some(coerce(expr, &parts[0], true)));
    }

    if parts.iter().all(|part| part.is_imm()) {
        let mut bits = BigUint::zero();
        let mut shift = 0;
        for imm in parts.iter().filter_map(|part| part.as_imm()) {
            bits |= imm.bits() << shift;
            shift += imm.width();
        }
        return Ok(Some(imm_expr(expr, Imm::from_bits(bits, expr.ty.clone()))));
    }

    // Reassembling every field of a value in order yields the value itself.
    let mut source: Option<&ExprRef> = None;
    let mut next_offset = 0;
    for part in parts {
        let ExprKind::GetBits { value, offset, width } = &part.kind
        else {
            return Ok(None);
        };
        if *offset != next_offset || *width != part_width(part) {
            return Ok(None);
        }
        match source {
            Some(existing) if existing != value => return Ok(None),
            _ => source = Some(value),
        }
        next_offset += width;
    }
    match source {
        Some(value) if value.ty.bits() == next_offset && expr.ty.bits() == next_offset => {
            Ok(Some(coerce(expr, value, true)))
        }
        _ => Ok(None),
    }
}

fn rewrite_cast(expr: &ExprRef, value: &ExprRef, bitcast: bool) -> Result<Option<ExprRef>, ExprError> {
    let ty = &expr.ty;
    if let Some(imm) = value.as_imm() {
        let imm = match bitcast {
            true => imm.bitcast(ty.clone()),
            false => imm.convert(ty.clone())?,
        };
        return Ok(Some(imm_expr(expr, imm)));
    }

    if value.ty == *ty {
        return Ok(Some(value.clone()));
    }

    let is_int = |ty: &DataType| ty.is_integer() || ty.is_pointer();
    if let ExprKind::Cast { value: inner, .. } = &value.kind {
        // Truncating through a wider integer is the same as truncating directly.
        let all_int = is_int(ty) && is_int(&value.ty) && is_int(&inner.ty);
        if all_int && value.ty.bits() >= ty.bits() && value.ty.bits() >= inner.ty.bits() {
            if inner.ty == *ty {
                return Ok(Some(inner.clone()));
            }
            let kind = ExprKind::Cast { value: inner.clone(), bitcast };
            return Ok(Some(expr.with_kind(kind).into_ref()));
        }
    }

    Ok(None)
}

fn unsupported(op: &'static str, ty: &DataType) -> ExprError {
    ExprError::UnsupportedOperation { op, ty: ty.name().into() }
}

/// Converts an operand to the integer value it has when interpreted as `ty`.
fn int_operand(imm: &Imm, ty: &DataType) -> BigInt {
    match imm.ty().is_float() {
        true => imm.to_f64().trunc().to_i128().map_or_else(BigInt::zero, BigInt::from),
        false => Imm::typed(imm.value(), ty.clone()).value(),
    }
}

fn check_int(ty: &DataType, op: &'static str) -> Result<(), ExprError> {
    match ty.kind() {
        TypeKind::Primitive(_) | TypeKind::Pointer { .. } => Ok(()),
        _ => Err(unsupported(op, ty)),
    }
}

pub fn fold_unary(op: UnaryOp, value: &Imm, ty: &DataType) -> Result<Imm, ExprError> {
    if op == UnaryOp::LogicalNot {
        return Ok(Imm::bool(value.is_zero()));
    }

    if ty.is_float() {
        let x = value.to_float()?;
        let result = match op {
            UnaryOp::Neg => -x,
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Not | UnaryOp::LogicalNot => return Err(unsupported("not", ty)),
        };
        return Imm::from_float(result, ty.clone());
    }

    check_int(ty, "unary")?;
    let x = int_operand(value, ty);
    let result = match op {
        UnaryOp::Neg => -x,
        UnaryOp::Not => !x,
        UnaryOp::Abs if ty.is_signed() => x.abs(),
        UnaryOp::Abs => x,
        UnaryOp::Sqrt => return Err(unsupported("sqrt", ty)),
        UnaryOp::LogicalNot => return Ok(Imm::bool(value.is_zero())),
    };
    Ok(Imm::typed(result, ty.clone()))
}

/// Folds a binary operation on two constants. Returns `None` for division by zero, which is left
/// unevaluated.
pub fn fold_binary(op: BinaryOp, lhs: &Imm, rhs: &Imm, ty: &DataType) -> Result<Option<Imm>, ExprError> {
    if ty.is_float() {
        let (a, b) = (lhs.to_float()?, rhs.to_float()?);
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
            _ => return Err(unsupported(op.name(), ty)),
        };
        return Imm::from_float(result, ty.clone()).map(Some);
    }

    check_int(ty, op.name())?;
    let a = int_operand(lhs, ty);
    let b = || int_operand(rhs, ty);

    let result = match op {
        BinaryOp::Add => a + b(),
        BinaryOp::Sub => a - b(),
        BinaryOp::Mul => a * b(),
        BinaryOp::Div | BinaryOp::Mod if b().is_zero() => return Ok(None),
        BinaryOp::Div => a / b(),
        BinaryOp::Mod => a % b(),
        BinaryOp::And => a & b(),
        BinaryOp::Or => a | b(),
        BinaryOp::Xor => a ^ b(),
        BinaryOp::Shl { sign_preserving } => {
            return fold_shift(true, sign_preserving, a, rhs, ty).map(Some)
        }
        BinaryOp::Shr { sign_preserving } => {
            return fold_shift(false, sign_preserving, a, rhs, ty).map(Some)
        }
    };
    Ok(Some(Imm::typed(result, ty.clone())))
}

fn fold_shift(
    left: bool,
    sign_preserving: bool,
    value: BigInt,
    amount: &Imm,
    ty: &DataType,
) -> Result<Imm, ExprError> {
    let bits = ty.bits();
    let amount = int_operand(amount, amount.ty());
    if amount.is_negative() {
        return Err(unsupported(if left { "shl" } else { "shr" }, ty));
    }
    let amount = amount.to_u32().unwrap_or(u32::MAX).min(bits);

    let pattern = Imm::typed(value.clone(), ty.clone()).bits().clone();
    let shifted = match left {
        true => BigInt::from(&pattern << amount),
        false if ty.is_signed() => value >> amount,
        false => BigInt::from(&pattern >> amount),
    };
    if !sign_preserving || bits == 0 {
        return Ok(Imm::typed(shifted, ty.clone()));
    }

    let sign_bit = BigUint::from(1u32) << (bits - 1);
    let low = Imm::typed(shifted, ty.clone()).bits() & mask(bits - 1);
    Ok(Imm::from_bits(low | (pattern & sign_bit), ty.clone()))
}

pub fn fold_compare(op: CompareOp, unsigned: bool, lhs: &Imm, rhs: &Imm) -> Result<Imm, ExprError> {
    let result = if lhs.ty().is_float() || rhs.ty().is_float() {
        op.eval(&lhs.to_float()?, &rhs.to_float()?)
    }
    else if unsigned {
        op.eval(lhs.bits(), rhs.bits())
    }
    else {
        op.eval(&lhs.value(), &rhs.value())
    };
    Ok(Imm::bool(result))
}

pub fn fold_clamp(value: &Imm, lo: &Imm, hi: &Imm, ty: &DataType) -> Result<Imm, ExprError> {
    if ty.is_float() {
        let (x, lo, hi) = (value.to_float()?, lo.to_float()?, hi.to_float()?);
        return Imm::from_float(x.max(lo).min(hi), ty.clone());
    }
    let x = value.value();
    let (lo, hi) = (lo.value(), hi.value());
    let clamped = if x < lo { lo } else if x > hi { hi } else { x };
    Ok(Imm::typed(clamped, ty.clone()))
}

pub fn fold_get_bits(value: &Imm, offset: u32, width: u32, ty: &DataType) -> Imm {
    let field = (value.bits() >> offset) & mask(width);
    match ty.is_signed() && !ty.is_float() {
        true => Imm::typed(sign_extend(&field, width), ty.clone()),
        false => Imm::from_bits(field, ty.clone()),
    }
}
