#[derive(Debug, Clone)]
pub struct Config {
    /// Rewrite decoded instructions to their pseudo-instruction form (`move`, `li`, `b`).
    pub simplify_instructions: bool,

    /// Run [r5900_ir::Expr::reduce] on every expression written to a location.
    pub reduce_expressions: bool,

    /// Track values stored to stack slots addressed relative to the entry stack pointer.
    pub propagate_stack: bool,

    /// Only render the delay slot of a likely branch on the taken path.
    pub nullify_likely_delay_slots: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simplify_instructions: true,
            reduce_expressions: true,
            propagate_stack: true,
            nullify_likely_delay_slots: true,
        }
    }
}
