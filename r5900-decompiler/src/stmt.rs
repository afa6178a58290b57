use r5900_ir::{BranchTarget, CodeSink, ExprRef, VariableRef};

/// A single line (or block) of decompiled output.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// An expression evaluated only for its effects (stores, calls, intrinsics).
    Expr { address: u64, expr: ExprRef },

    /// Materializes the value of a location into a variable.
    Assign { address: u64, var: VariableRef, value: ExprRef },

    /// A control transfer. `body` runs only when `cond` holds, before the transfer to `target`.
    Branch {
        address: u64,
        cond: Option<ExprRef>,
        target: Option<BranchTarget>,
        body: Vec<Statement>,
    },

    Return { address: u64, value: Option<ExprRef> },
    Comment { address: u64, text: String },

    /// The start of a branch target.
    Label { address: u64 },
}

pub fn label_name(address: u64) -> String {
    format!("loc_{address:x}")
}

fn newline<S: CodeSink + ?Sized>(sink: &mut S) {
    sink.plain_text("\n");
}

impl Statement {
    pub fn address(&self) -> u64 {
        match self {
            Self::Expr { address, .. }
            | Self::Assign { address, .. }
            | Self::Branch { address, .. }
            | Self::Return { address, .. }
            | Self::Comment { address, .. }
            | Self::Label { address } => *address,
        }
    }

    /// Renders the statement, followed by a newline.
    pub fn render<S: CodeSink + ?Sized>(&self, sink: &mut S, indent: usize) {
        if !matches!(self, Self::Label { .. }) {
            sink.whitespace(indent * 4);
        }
        match self {
            Self::Expr { expr, .. } => {
                sink.expression(expr);
                sink.punctuation(";");
            }
            Self::Assign { var, value, .. } => {
                sink.variable(var);
                sink.whitespace(1);
                sink.punctuation("=");
                sink.whitespace(1);
                sink.expression(value);
                sink.punctuation(";");
            }
            Self::Branch { cond, target, body, .. } => {
                let Some(cond) = cond
                else {
                    for stmt in body {
                        stmt.render(sink, indent);
                    }
                    if let Some(target) = target {
                        if !body.is_empty() {
                            sink.whitespace(indent * 4);
                        }
                        render_goto(sink, target);
                    }
                    newline(sink);
                    return;
                };

                sink.keyword("if");
                sink.whitespace(1);
                sink.punctuation("(");
                sink.expression(cond);
                sink.punctuation(")");
                sink.whitespace(1);
                if body.is_empty() {
                    if let Some(target) = target {
                        render_goto(sink, target);
                    }
                    newline(sink);
                    return;
                }

                sink.punctuation("{");
                newline(sink);
                for stmt in body {
                    stmt.render(sink, indent + 1);
                }
                if let Some(target) = target {
                    sink.whitespace((indent + 1) * 4);
                    render_goto(sink, target);
                    newline(sink);
                }
                sink.whitespace(indent * 4);
                sink.punctuation("}");
            }
            Self::Return { value, .. } => {
                sink.keyword("return");
                if let Some(value) = value {
                    sink.whitespace(1);
                    sink.expression(value);
                }
                sink.punctuation(";");
            }
            Self::Comment { text, .. } => sink.comment(text),
            Self::Label { address } => {
                sink.misc_reference(&label_name(*address));
                sink.punctuation(":");
            }
        }
        newline(sink);
    }
}

fn render_goto<S: CodeSink + ?Sized>(sink: &mut S, target: &BranchTarget) {
    sink.keyword("goto");
    sink.whitespace(1);
    match target {
        BranchTarget::Direct(address) => sink.misc_reference(&label_name(*address)),
        BranchTarget::Indirect(expr) => {
            sink.punctuation("*");
            if expr.parenthesize {
                sink.punctuation("(");
                sink.expression(expr);
                sink.punctuation(")");
            }
            else {
                sink.expression(expr);
            }
        }
    }
    sink.punctuation(";");
}
