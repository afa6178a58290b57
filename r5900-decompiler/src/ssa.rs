//! Version history exposed to phi construction.

use r5900_ir::{ExprRef, VariableRef};
use r5900_isa::Location;

/// A write of a new version of a location.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationDef {
    pub var: VariableRef,

    /// The address of the instruction that performed the write.
    pub address: u64,

    /// The expression that was written.
    pub value: ExprRef,

    /// Set when later reads see the variable rather than `value`.
    pub materialized: bool,
}

impl LocationDef {
    pub fn location(&self) -> Location {
        self.var.location
    }
}

/// A read of a version of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationUse {
    pub var: VariableRef,
    pub address: u64,
}

/// The merge of several versions of a location at a control flow join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phi {
    pub result: VariableRef,

    /// The address of the join.
    pub address: u64,

    /// The address of each predecessor together with the version it provides.
    pub args: Vec<(u64, VariableRef)>,
}

impl Phi {
    pub fn location(&self) -> Location {
        self.result.location
    }

    pub fn add_arg(&mut self, pred: u64, var: VariableRef) {
        if !self.args.contains(&(pred, var)) {
            self.args.push((pred, var));
        }
    }
}

impl std::fmt::Display for Phi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = phi(", self.result.name())?;
        for (i, (pred, var)) in self.args.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} @ {pred:#x}", var.name())?;
        }
        f.write_str(")")
    }
}
