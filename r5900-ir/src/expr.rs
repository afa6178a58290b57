use std::sync::Arc;

use r5900_isa::Location;

use crate::{
    imm::Imm,
    types::{DataType, Primitive},
};

pub type ExprRef = Arc<Expr>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    /// Bitwise inversion.
    Not,
    Abs,
    Sqrt,
    /// Boolean negation.
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Shift left. When `sign_preserving` is set the sign bit of the left operand is copied into
    /// the result after truncation.
    Shl { sign_preserving: bool },
    /// Shift right, arithmetic if the result type is signed.
    Shr { sign_preserving: bool },
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn is_commutative(self) -> bool {
        matches!(self, Self::Add | Self::Mul | Self::And | Self::Or | Self::Xor)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Shl { .. } => "<<",
            Self::Shr { .. } => ">>",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Mod => "mod",
            Self::Shl { .. } => "shl",
            Self::Shr { .. } => "shr",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// The comparison that is true exactly when this one is false.
    pub fn logical_inversion(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
        }
    }

    /// The comparison to use when the operands are swapped.
    pub fn mirror(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    pub fn eval<T: PartialOrd>(self, a: &T, b: &T) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
        }
    }
}

/// A versioned reference to the value of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableRef {
    pub location: Location,
    pub version: u32,
}

impl VariableRef {
    pub fn new(location: Location, version: u32) -> Self {
        Self { location, version }
    }

    /// A stable, C-compatible name for the variable.
    pub fn name(&self) -> String {
        match self.location {
            Location::Register(reg) => format!("{}_{}", reg.name(), self.version),
            Location::Stack(offset) if offset < 0 => {
                format!("var_{:x}_{}", offset.unsigned_abs(), self.version)
            }
            Location::Stack(offset) => format!("arg_{offset:x}_{}", self.version),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BranchTarget {
    Direct(u64),
    Indirect(ExprRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Imm(Imm),
    Unary { op: UnaryOp, value: ExprRef },
    Binary { op: BinaryOp, lhs: ExprRef, rhs: ExprRef },
    Compare { op: CompareOp, unsigned: bool, lhs: ExprRef, rhs: ExprRef },
    Ternary { cond: ExprRef, then: ExprRef, otherwise: ExprRef },

    /// Reads `size` bytes from the address computed by `addr`.
    Load { addr: ExprRef, size: u8, signed: bool },
    /// Writes the low `size` bytes of `value` to the address computed by `dest`.
    Store { dest: ExprRef, value: ExprRef, size: u8 },

    Call { target: u64, args: Vec<ExprRef> },
    IndirectCall { target: ExprRef, args: Vec<ExprRef> },
    /// A named operation with no direct source-level equivalent.
    Intrinsic { name: &'static str, args: Vec<ExprRef> },

    ConditionalBranch { cond: ExprRef, target: u64, likely: bool },
    UnconditionalBranch(BranchTarget),

    /// Extracts `width` bits of `value` starting at bit `offset`.
    GetBits { value: ExprRef, offset: u32, width: u32 },
    /// Concatenates parts, the first part forming the least significant bits.
    ConcatBits(Vec<ExprRef>),
    /// Saturates `value` to the inclusive range `[lo, hi]`.
    Clamp { value: ExprRef, lo: ExprRef, hi: ExprRef },
    /// Converts `value` to the node's type, reinterpreting the bit pattern when `bitcast` is set.
    Cast { value: ExprRef, bitcast: bool },

    RawText(String),
    /// The value of the stack pointer on entry to the function.
    StackPointer,
    Variable(VariableRef),
    /// A result the decompiler does not model. Rendered as a visible comment.
    Placeholder(String),
}

/// A typed node in an expression tree.
///
/// Nodes are immutable once shared: transformations such as [Expr::reduce] produce new nodes and
/// reuse unchanged subtrees.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// The address of the instruction the expression was created for.
    pub address: u64,
    pub ty: DataType,
    /// Wrap the expression in parentheses when it appears as an operand.
    pub parenthesize: bool,
    /// Whether the expression may be substituted into later uses of the location it defines.
    pub can_propagate: bool,
    pub location: Option<Location>,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: DataType) -> Self {
        let parenthesize = matches!(
            kind,
            ExprKind::Binary { .. } | ExprKind::Compare { .. } | ExprKind::Ternary { .. }
        );
        let can_propagate = !matches!(
            kind,
            ExprKind::Load { .. }
                | ExprKind::Store { .. }
                | ExprKind::Call { .. }
                | ExprKind::IndirectCall { .. }
        );
        Self { address: 0, ty, parenthesize, can_propagate, location: None, kind }
    }

    pub fn at(mut self, address: u64) -> Self {
        self.address = address;
        self
    }

    pub fn with_location(mut self, location: impl Into<Location>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_propagate(mut self, can_propagate: bool) -> Self {
        self.can_propagate = can_propagate;
        self
    }

    pub fn into_ref(self) -> ExprRef {
        Arc::new(self)
    }

    pub fn imm(imm: Imm) -> Self {
        let ty = imm.ty().clone();
        Self::new(ExprKind::Imm(imm), ty)
    }

    pub fn unary(op: UnaryOp, value: ExprRef, ty: DataType) -> Self {
        Self::new(ExprKind::Unary { op, value }, ty)
    }

    pub fn binary(op: BinaryOp, lhs: ExprRef, rhs: ExprRef, ty: DataType) -> Self {
        Self::new(ExprKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn compare(op: CompareOp, unsigned: bool, lhs: ExprRef, rhs: ExprRef) -> Self {
        Self::new(ExprKind::Compare { op, unsigned, lhs, rhs }, DataType::bool())
    }

    pub fn ternary(cond: ExprRef, then: ExprRef, otherwise: ExprRef, ty: DataType) -> Self {
        Self::new(ExprKind::Ternary { cond, then, otherwise }, ty)
    }

    pub fn load(addr: ExprRef, size: u8, signed: bool, ty: DataType) -> Self {
        Self::new(ExprKind::Load { addr, size, signed }, ty)
    }

    pub fn store(dest: ExprRef, value: ExprRef, size: u8) -> Self {
        let ty = DataType::int(size as u32 * 8, false)
            .unwrap_or_else(|| DataType::primitive(Primitive::U32));
        Self::new(ExprKind::Store { dest, value, size }, ty)
    }

    pub fn get_bits(value: ExprRef, offset: u32, width: u32, ty: DataType) -> Self {
        Self::new(ExprKind::GetBits { value, offset, width }, ty)
    }

    pub fn concat_bits(parts: Vec<ExprRef>, ty: DataType) -> Self {
        Self::new(ExprKind::ConcatBits(parts), ty)
    }

    pub fn clamp(value: ExprRef, lo: ExprRef, hi: ExprRef, ty: DataType) -> Self {
        Self::new(ExprKind::Clamp { value, lo, hi }, ty)
    }

    pub fn cast(value: ExprRef, ty: DataType) -> Self {
        Self::new(ExprKind::Cast { value, bitcast: false }, ty)
    }

    pub fn bitcast(value: ExprRef, ty: DataType) -> Self {
        Self::new(ExprKind::Cast { value, bitcast: true }, ty)
    }

    pub fn intrinsic(name: &'static str, args: Vec<ExprRef>, ty: DataType) -> Self {
        Self::new(ExprKind::Intrinsic { name, args }, ty)
    }

    pub fn variable(var: VariableRef, ty: DataType) -> Self {
        Self::new(ExprKind::Variable(var), ty).with_location(var.location)
    }

    pub fn placeholder(note: impl Into<String>, ty: DataType) -> Self {
        Self::new(ExprKind::Placeholder(note.into()), ty)
    }

    pub fn as_imm(&self) -> Option<&Imm> {
        match &self.kind {
            ExprKind::Imm(imm) => Some(imm),
            _ => None,
        }
    }

    pub fn is_imm(&self) -> bool {
        matches!(self.kind, ExprKind::Imm(_))
    }

    /// The direct children of this node, in evaluation order.
    pub fn children(&self) -> Vec<&ExprRef> {
        match &self.kind {
            ExprKind::Imm(_)
            | ExprKind::RawText(_)
            | ExprKind::StackPointer
            | ExprKind::Variable(_)
            | ExprKind::Placeholder(_)
            | ExprKind::UnconditionalBranch(BranchTarget::Direct(_)) => vec![],
            ExprKind::Unary { value, .. }
            | ExprKind::GetBits { value, .. }
            | ExprKind::Cast { value, .. } => vec![value],
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Compare { lhs, rhs, .. } => vec![lhs, rhs],
            ExprKind::Ternary { cond, then, otherwise } => vec![cond, then, otherwise],
            ExprKind::Load { addr, .. } => vec![addr],
            ExprKind::Store { dest, value, .. } => vec![dest, value],
            ExprKind::Call { args, .. } | ExprKind::Intrinsic { args, .. } => args.iter().collect(),
            ExprKind::IndirectCall { target, args } => {
                std::iter::once(target).chain(args.iter()).collect()
            }
            ExprKind::ConditionalBranch { cond, .. } => vec![cond],
            ExprKind::UnconditionalBranch(BranchTarget::Indirect(target)) => vec![target],
            ExprKind::ConcatBits(parts) => parts.iter().collect(),
            ExprKind::Clamp { value, lo, hi } => vec![value, lo, hi],
        }
    }

    /// Every node below this one, in pre-order.
    pub fn descendants(&self) -> Vec<&ExprRef> {
        let mut out = vec![];
        let mut stack: Vec<&ExprRef> = self.children().into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(next.children().into_iter().rev());
        }
        out
    }

    /// Whether evaluating the expression has effects beyond producing its value.
    pub fn has_side_effects(&self) -> bool {
        let local = matches!(
            self.kind,
            ExprKind::Store { .. } | ExprKind::Call { .. } | ExprKind::IndirectCall { .. }
        );
        local || self.children().iter().any(|child| child.has_side_effects())
    }

    /// Creates a copy of this node with its children replaced by `children`, which must be given
    /// in the same order as [Expr::children] returns them.
    pub fn with_children(&self, children: Vec<ExprRef>) -> Expr {
        let mut it = children.into_iter();
        let mut next = |old: &ExprRef| it.next().unwrap_or_else(|| old.clone());

        let kind = match &self.kind {
            ExprKind::Imm(_)
            | ExprKind::RawText(_)
            | ExprKind::StackPointer
            | ExprKind::Variable(_)
            | ExprKind::Placeholder(_)
            | ExprKind::UnconditionalBranch(BranchTarget::Direct(_)) => self.kind.clone(),
            ExprKind::Unary { op, value } => ExprKind::Unary { op: *op, value: next(value) },
            ExprKind::GetBits { value, offset, width } => {
                ExprKind::GetBits { value: next(value), offset: *offset, width: *width }
            }
            ExprKind::Cast { value, bitcast } => {
                ExprKind::Cast { value: next(value), bitcast: *bitcast }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = next(lhs);
                ExprKind::Binary { op: *op, lhs, rhs: next(rhs) }
            }
            ExprKind::Compare { op, unsigned, lhs, rhs } => {
                let lhs = next(lhs);
                ExprKind::Compare { op: *op, unsigned: *unsigned, lhs, rhs: next(rhs) }
            }
            ExprKind::Ternary { cond, then, otherwise } => {
                let cond = next(cond);
                let then = next(then);
                ExprKind::Ternary { cond, then, otherwise: next(otherwise) }
            }
            ExprKind::Load { addr, size, signed } => {
                ExprKind::Load { addr: next(addr), size: *size, signed: *signed }
            }
            ExprKind::Store { dest, value, size } => {
                let dest = next(dest);
                ExprKind::Store { dest, value: next(value), size: *size }
            }
            ExprKind::Call { target, args } => {
                ExprKind::Call { target: *target, args: args.iter().map(&mut next).collect() }
            }
            ExprKind::Intrinsic { name, args } => {
                ExprKind::Intrinsic { name: *name, args: args.iter().map(&mut next).collect() }
            }
            ExprKind::IndirectCall { target, args } => {
                let target = next(target);
                ExprKind::IndirectCall { target, args: args.iter().map(&mut next).collect() }
            }
            ExprKind::ConditionalBranch { cond, target, likely } => {
                ExprKind::ConditionalBranch { cond: next(cond), target: *target, likely: *likely }
            }
            ExprKind::UnconditionalBranch(BranchTarget::Indirect(target)) => {
                ExprKind::UnconditionalBranch(BranchTarget::Indirect(next(target)))
            }
            ExprKind::ConcatBits(parts) => {
                ExprKind::ConcatBits(parts.iter().map(&mut next).collect())
            }
            ExprKind::Clamp { value, lo, hi } => {
                let value = next(value);
                let lo = next(lo);
                ExprKind::Clamp { value, lo, hi: next(hi) }
            }
        };

        Expr { kind, ..self.clone_metadata() }
    }

    /// A copy of this node's metadata with an empty payload.
    fn clone_metadata(&self) -> Expr {
        Expr {
            address: self.address,
            ty: self.ty.clone(),
            parenthesize: self.parenthesize,
            can_propagate: self.can_propagate,
            location: self.location,
            kind: ExprKind::StackPointer,
        }
    }

    /// Rebuilds this node with a different payload, keeping address, type and provenance.
    pub fn with_kind(&self, kind: ExprKind) -> Expr {
        let mut expr = Expr::new(kind, self.ty.clone());
        expr.address = self.address;
        expr.location = self.location;
        expr.can_propagate = expr.can_propagate && self.can_propagate;
        expr
    }
}

impl From<Imm> for Expr {
    fn from(imm: Imm) -> Self {
        Expr::imm(imm)
    }
}
