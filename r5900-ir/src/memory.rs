//! Resolution of memory operand addresses into typed accesses.

use num_traits::ToPrimitive;

use crate::{
    expr::{BinaryOp, ExprKind, ExprRef},
    types::{DataType, PathElement, TypeRegistry},
};

/// Splits an address into a base expression and a constant byte offset. The base is `None` for
/// absolute addresses.
pub fn split_address(addr: &ExprRef) -> (Option<ExprRef>, i64) {
    match &addr.kind {
        ExprKind::Imm(imm) => (None, imm.to_i64()),
        ExprKind::Binary { op: op @ (BinaryOp::Add | BinaryOp::Sub), lhs, rhs } => {
            match rhs.as_imm().and_then(|imm| imm.value().to_i64()) {
                Some(offset) if *op == BinaryOp::Add => (Some(lhs.clone()), offset),
                Some(offset) => (Some(lhs.clone()), offset.wrapping_neg()),
                None => (Some(addr.clone()), 0),
            }
        }
        _ => (Some(addr.clone()), 0),
    }
}

/// How a memory operand is rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    /// `base[index]` followed by `path`, through a pointer to `pointee`.
    Typed {
        base: ExprRef,
        pointee: DataType,
        index: i64,
        path: Vec<PathElement>,

        /// The type of the accessed element.
        ty: DataType,
    },

    /// `*(ty*)addr`, used when no pointer type describes the address.
    Raw { addr: ExprRef, ty: DataType },
}

impl Access {
    /// The type the accessed memory naturally holds.
    pub fn ty(&self) -> &DataType {
        match self {
            Self::Typed { ty, .. } | Self::Raw { ty, .. } => ty,
        }
    }
}

/// Resolves an access of `size` bytes at `addr`. `fallback` is the type used when the address has no
/// pointer type or the pointee has no element of a matching size at the offset.
pub fn resolve_access(types: &TypeRegistry, addr: &ExprRef, size: u8, fallback: &DataType) -> Access {
    let raw = || Access::Raw { addr: addr.clone(), ty: fallback.clone() };

    let (Some(base), offset) = split_address(addr)
    else {
        return raw();
    };
    let Some(pointee) = base.ty.pointee().and_then(|id| types.get_type(id).ok())
    else {
        return raw();
    };
    let Ok(element_size) = i64::try_from(pointee.size())
    else {
        return raw();
    };
    if element_size == 0 {
        return raw();
    }

    let index = offset.div_euclid(element_size);
    let residual = offset.rem_euclid(element_size) as u64;
    let prop = types.property_at_offset(&pointee, residual);

    let ty = match prop.synthetic {
        true => fallback.clone(),
        false if prop.residual == 0 && prop.ty.size() == size as u64 => prop.ty,
        false => {
            tracing::trace!(
                "no {size} byte element of {} at offset {residual:#x}",
                pointee.name()
            );
            return raw();
        }
    };

    Access::Typed { base, pointee, index, path: prop.path, ty }
}
