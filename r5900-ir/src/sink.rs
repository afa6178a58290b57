use hashbrown::HashMap;
use r5900_isa::Location;

use crate::{
    expr::{Expr, VariableRef},
    imm::Imm,
    types::{DataType, TypeRegistry},
};

/// A known function, as returned by a [FunctionResolver].
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRef {
    pub name: String,
    pub address: u64,

    /// Where the function leaves its result, if it returns one.
    pub return_location: Option<Location>,
    pub return_type: Option<DataType>,
}

impl FunctionRef {
    pub fn new(name: impl Into<String>, address: u64) -> Self {
        Self { name: name.into(), address, return_location: None, return_type: None }
    }
}

pub trait FunctionResolver: Send + Sync {
    fn find_function_by_address(&self, address: u64) -> Option<FunctionRef>;
}

/// An in-memory [FunctionResolver].
#[derive(Debug, Default, Clone)]
pub struct FunctionTable {
    functions: HashMap<u64, FunctionRef>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, function: FunctionRef) {
        if let Some(prev) = self.functions.insert(function.address, function) {
            tracing::debug!("replaced function {} at {:#x}", prev.name, prev.address);
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// All functions ordered by address.
    pub fn functions(&self) -> Vec<&FunctionRef> {
        let mut out: Vec<_> = self.functions.values().collect();
        out.sort_by_key(|f| f.address);
        out
    }
}

impl FunctionResolver for FunctionTable {
    fn find_function_by_address(&self, address: u64) -> Option<FunctionRef> {
        self.functions.get(&address).cloned()
    }
}

/// The primitive operations expressions are rendered through.
///
/// Expressions never format text themselves; they only assemble calls to a sink, which allows the
/// same tree to be rendered as plain text, annotated rows or anything else.
pub trait CodeSink {
    fn punctuation(&mut self, text: &str);
    fn keyword(&mut self, text: &str);
    fn comment(&mut self, text: &str);
    fn whitespace(&mut self, count: usize);

    /// A constant, with `text` its preferred rendering.
    fn literal(&mut self, text: &str, ty: &DataType, value: &Imm);
    fn plain_text(&mut self, text: &str);

    /// Renders a nested expression.
    fn expression(&mut self, expr: &Expr) {
        expr.generate(self)
    }

    fn data_type(&mut self, ty: &DataType);
    fn variable(&mut self, var: &VariableRef);

    /// An indexing operation `[index]` into a value of type `ty`.
    fn array_access(&mut self, ty: &DataType, index: &str);

    /// A member name of a value of type `ty`. The separator is emitted separately.
    fn property_access(&mut self, ty: &DataType, member: &str);
    fn misc_reference(&mut self, name: &str);
    fn func(&mut self, function: &FunctionRef);

    fn push_address(&mut self, address: u64);
    fn pop_address(&mut self);

    fn types(&self) -> &TypeRegistry;

    fn resolve_function(&self, _address: u64) -> Option<FunctionRef> {
        None
    }
}
