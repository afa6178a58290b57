pub mod codegen;
pub mod expr;
pub mod imm;
pub mod memory;
pub mod reduce;
pub mod sink;
pub mod text;
pub mod types;

#[cfg(test)]
mod tests;

pub use crate::{
    expr::{BinaryOp, BranchTarget, CompareOp, Expr, ExprKind, ExprRef, UnaryOp, VariableRef},
    imm::Imm,
    sink::{CodeSink, FunctionRef, FunctionResolver, FunctionTable},
    text::TextSink,
    types::{DataType, LayoutProvider, PathElement, Primitive, Property, TypeError, TypeRegistry},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// The operation is not defined for operands of the given type.
    UnsupportedOperation { op: &'static str, ty: String },
    UnsupportedFloatWidth(u64),
}

impl std::fmt::Display for ExprError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedOperation { op, ty } => write!(f, "unsupported operation {op} on {ty}"),
            Self::UnsupportedFloatWidth(size) => {
                write!(f, "unsupported floating point width: {size} bytes")
            }
        }
    }
}

impl std::error::Error for ExprError {}
