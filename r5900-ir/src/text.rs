use crate::{
    expr::{Expr, VariableRef},
    imm::Imm,
    sink::{CodeSink, FunctionRef, FunctionResolver},
    types::{DataType, TypeRegistry},
};

/// A [CodeSink] producing plain C-like text.
pub struct TextSink<'a> {
    types: &'a TypeRegistry,
    functions: Option<&'a dyn FunctionResolver>,
    out: String,
    addresses: Vec<u64>,
}

impl<'a> TextSink<'a> {
    pub fn new(types: &'a TypeRegistry) -> Self {
        Self { types, functions: None, out: String::new(), addresses: vec![] }
    }

    pub fn with_functions(mut self, functions: &'a dyn FunctionResolver) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Renders a single expression to a string.
    pub fn render(types: &TypeRegistry, expr: &Expr) -> String {
        let mut sink = TextSink::new(types);
        sink.expression(expr);
        sink.finish()
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    /// The address of the innermost expression currently being rendered.
    pub fn current_address(&self) -> Option<u64> {
        self.addresses.last().copied()
    }

    pub fn clear(&mut self) {
        self.out.clear();
    }

    pub fn finish(self) -> String {
        self.out
    }
}

impl CodeSink for TextSink<'_> {
    fn punctuation(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn keyword(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn comment(&mut self, text: &str) {
        self.out.push_str("/* ");
        self.out.push_str(text);
        self.out.push_str(" */");
    }

    fn whitespace(&mut self, count: usize) {
        self.out.extend(std::iter::repeat(' ').take(count));
    }

    fn literal(&mut self, text: &str, _: &DataType, _: &Imm) {
        self.out.push_str(text);
    }

    fn plain_text(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn data_type(&mut self, ty: &DataType) {
        self.out.push_str(ty.name());
    }

    fn variable(&mut self, var: &VariableRef) {
        self.out.push_str(&var.name());
    }

    fn array_access(&mut self, _: &DataType, index: &str) {
        self.out.push('[');
        self.out.push_str(index);
        self.out.push(']');
    }

    fn property_access(&mut self, _: &DataType, member: &str) {
        self.out.push_str(member);
    }

    fn misc_reference(&mut self, name: &str) {
        self.out.push_str(name);
    }

    fn func(&mut self, function: &FunctionRef) {
        self.out.push_str(&function.name);
    }

    fn push_address(&mut self, address: u64) {
        self.addresses.push(address);
    }

    fn pop_address(&mut self) {
        if self.addresses.pop().is_none() {
            tracing::warn!("unbalanced address stack");
        }
    }

    fn types(&self) -> &TypeRegistry {
        self.types
    }

    fn resolve_function(&self, address: u64) -> Option<FunctionRef> {
        self.functions?.find_function_by_address(address)
    }
}
