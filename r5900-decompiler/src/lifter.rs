//! Linear replay of a function's instructions.
//!
//! Instructions are evaluated in address order through a single [DecompilerContext]. Branch
//! targets inside the function become labels: the state reaching a label along every edge is
//! spilled to variables and merged with phis, and backward branches add their state to the phis
//! of the loop header afterwards.
//!
//! Delay slots: the branch (and its condition) is evaluated first, then the delay slot, then the
//! transfer is emitted. The delay slot of a likely branch is rendered inside the taken path.
//! Calls are the exception: the delay slot executes before the callee, so it is evaluated before
//! the call.

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;
use r5900_ir::{
    BranchTarget, CodeSink, DataType, Expr, ExprError, ExprKind, ExprRef, FunctionResolver,
    Primitive, TypeRegistry,
};
use r5900_isa::{Decoder, Instruction, Location, Opcode, Register};

use crate::{
    context::{DecompilerContext, Snapshot},
    ssa::{LocationDef, LocationUse, Phi},
    stmt::Statement,
    Config, Error, InstructionSource, ToExpression,
};

/// The result of decompiling a function.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub address: u64,
    pub end: u64,
    pub statements: Vec<Statement>,
    pub defs: Vec<LocationDef>,
    pub uses: Vec<LocationUse>,
    pub phis: Vec<Phi>,
}

impl Function {
    pub fn render<S: CodeSink + ?Sized>(&self, sink: &mut S) {
        sink.keyword("void");
        sink.whitespace(1);
        sink.misc_reference(&self.name);
        sink.punctuation("(");
        sink.keyword("void");
        sink.punctuation(")");
        sink.plain_text("\n");
        sink.punctuation("{");
        sink.plain_text("\n");
        for stmt in &self.statements {
            sink.push_address(stmt.address());
            stmt.render(sink, 1);
            sink.pop_address();
        }
        sink.punctuation("}");
        sink.plain_text("\n");
    }
}

/// Decodes and replays functions. A lifter can be shared between threads: every call to
/// [FunctionLifter::lift] uses its own context.
pub struct FunctionLifter<'a> {
    decoder: Decoder,
    types: &'a TypeRegistry,
    functions: Option<&'a dyn FunctionResolver>,
    config: Config,
}

impl<'a> FunctionLifter<'a> {
    pub fn new(types: &'a TypeRegistry) -> Self {
        Self { decoder: Decoder::new(), types, functions: None, config: Config::default() }
    }

    pub fn with_functions(mut self, functions: &'a dyn FunctionResolver) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.decoder.simplify = config.simplify_instructions;
        self.config = config;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Decompiles the instructions in `start..end`.
    ///
    /// `params` declares registers that hold typed values on entry.
    pub fn lift<S: InstructionSource + ?Sized>(
        &self,
        src: &mut S,
        start: u64,
        end: u64,
        params: &[(Register, DataType)],
    ) -> Result<Function, Error> {
        if start >= end || start % 4 != 0 || end % 4 != 0 {
            return Err(Error::InvalidRange { start, end });
        }

        let mut insts = vec![];
        for address in (start..end).step_by(4) {
            let word = src.read_word(address).ok_or(Error::Unmapped { address })?;
            insts.push(self.decoder.decode(word, address));
        }

        let name = self
            .functions
            .and_then(|f| f.find_function_by_address(start))
            .map_or_else(|| format!("sub_{start:x}"), |f| f.name);
        tracing::debug!("lifting {name} ({start:#x}..{end:#x}, {} instructions)", insts.len());

        let mut ctx = DecompilerContext::new(self.types).with_config(self.config.clone());
        if let Some(functions) = self.functions {
            ctx = ctx.with_functions(functions);
        }
        for (reg, ty) in params {
            ctx.declare(*reg, ty.clone());
        }

        let mut replay = Replay::new(ctx, &self.config, start, end, &insts);
        replay.run()?;

        let (statements, ctx) = (replay.out, replay.ctx);
        let (defs, uses, phis) = ctx.into_history();
        Ok(Function { name, address: start, end, statements, defs, uses, phis })
    }
}

/// The state of a single replay.
struct Replay<'c, 'a> {
    ctx: DecompilerContext<'a>,
    config: &'c Config,
    start: u64,
    end: u64,
    insts: &'c [Result<Instruction, r5900_isa::DecodeError>],

    labels: BTreeSet<u64>,

    /// Locations written inside each loop, keyed by loop header.
    loop_carried: HashMap<u64, Vec<Location>>,

    /// The state at the end of each forward edge into a label, with the address of its source.
    incoming: BTreeMap<u64, Vec<(u64, Snapshot)>>,

    /// Whether control can fall through into the next instruction.
    reachable: bool,
    out: Vec<Statement>,
}

impl<'c, 'a> Replay<'c, 'a> {
    fn new(
        ctx: DecompilerContext<'a>,
        config: &'c Config,
        start: u64,
        end: u64,
        insts: &'c [Result<Instruction, r5900_isa::DecodeError>],
    ) -> Self {
        let mut replay = Self {
            ctx,
            config,
            start,
            end,
            insts,
            labels: BTreeSet::new(),
            loop_carried: HashMap::new(),
            incoming: BTreeMap::new(),
            reachable: true,
            out: vec![],
        };
        replay.find_labels();
        replay
    }

    fn contains(&self, address: u64) -> bool {
        (self.start..self.end).contains(&address)
    }

    fn inst(&self, index: usize) -> Option<&'c Instruction> {
        self.insts.get(index).and_then(|inst| inst.as_ref().ok())
    }

    fn find_labels(&mut self) {
        let insts = self.insts;
        let stack_writes = stack_writes(insts);
        for (index, inst) in insts.iter().enumerate() {
            let Ok(inst) = inst
            else {
                continue;
            };
            let Some(target) = inst.target().filter(|t| self.contains(*t))
            else {
                continue;
            };
            if inst.is_call() {
                continue;
            }
            self.labels.insert(target);

            if target <= inst.address {
                // Everything written between the header and the end of the delay slot.
                let first = ((target - self.start) / 4) as usize;
                let last = (index + 2).min(insts.len());
                let carried = self.loop_carried.entry(target).or_default();
                let registers = insts[first..last].iter().flatten().flat_map(|body| body.writes.iter());
                let slots = stack_writes[first..last].iter().flatten();
                for location in registers.chain(slots) {
                    if !carried.contains(location) {
                        carried.push(*location);
                    }
                }
                tracing::debug!("loop {target:#x}..{:#x} carries {carried:?}", inst.address);
            }
        }
    }

    /// Moves the statements produced by the context to the output.
    fn flush(&mut self) {
        let statements = self.ctx.take_statements();
        self.out.extend(statements);
    }

    fn step(&mut self, inst: &Instruction) -> Result<Option<ExprRef>, Error> {
        inst.to_expression(&mut self.ctx)
            .map_err(|error| Error::Expr { address: inst.address, error })
    }

    fn run(&mut self) -> Result<(), Error> {
        let insts = self.insts;
        let mut index = 0;
        while index < insts.len() {
            let address = self.start + index as u64 * 4;
            if self.labels.contains(&address) {
                self.enter_label(address);
            }

            let inst = match &insts[index] {
                Ok(inst) => inst,
                Err(e) => {
                    tracing::warn!("{e}");
                    self.ctx.set_address(address);
                    self.ctx.comment(format!("{e}"));
                    self.flush();
                    index += 1;
                    continue;
                }
            };

            if !self.reachable {
                tracing::debug!("{address:#x}: not reachable by fallthrough");
                self.reachable = true;
            }

            if inst.opcode == Opcode::Eret {
                self.indirect_jump(inst, None)?;
                index += 1;
                continue;
            }
            if !inst.opcode.has_delay_slot() {
                self.step(inst)?;
                self.flush();
                index += 1;
                continue;
            }

            let delay = match self.inst(index + 1) {
                Some(delay) if delay.opcode.has_delay_slot() => {
                    tracing::warn!("{:#x}: branch in delay slot is ignored", delay.address);
                    None
                }
                Some(delay) => {
                    if self.labels.contains(&delay.address) {
                        tracing::warn!("{:#x}: branch into a delay slot", delay.address);
                    }
                    Some(delay)
                }
                None => {
                    tracing::debug!("{address:#x}: delay slot is outside of the function");
                    None
                }
            };
            self.branch(inst, delay)?;
            index += 2;
        }

        self.flush();
        self.finish();
        Ok(())
    }

    /// Lists the phis of each label after the label.
    fn finish(&mut self) {
        let statements = std::mem::take(&mut self.out);
        for stmt in statements {
            let label = match &stmt {
                Statement::Label { address } => Some(*address),
                _ => None,
            };
            self.out.push(stmt);
            let Some(address) = label
            else {
                continue;
            };
            for phi in self.ctx.phis().iter().filter(|phi| phi.address == address) {
                self.out.push(Statement::Comment { address, text: phi.to_string() });
            }
        }
    }

    /// Merges the states reaching the label at `address`.
    fn enter_label(&mut self, address: u64) {
        let mut preds = self.incoming.remove(&address).unwrap_or_default();
        if self.reachable {
            self.ctx.spill();
            self.flush();
            let pred = if address == self.start { address } else { address - 4 };
            preds.push((pred, self.ctx.snapshot()));
        }

        let carried = self.loop_carried.get(&address).cloned().unwrap_or_default();
        if preds.is_empty() {
            tracing::debug!("{address:#x}: label has no forward predecessors");
        }
        // Phi comments are added by `finish`, once back edges have contributed their arguments.
        self.ctx.join(address, &preds, &carried);
        self.out.push(Statement::Label { address });
        self.reachable = true;
    }

    /// Records the state at the end of an edge from `pred` to `target`.
    fn add_edge(&mut self, pred: u64, target: u64) {
        if !self.contains(target) {
            return;
        }
        let snapshot = self.ctx.snapshot();
        if target <= pred {
            self.ctx.add_phi_args(target, pred, &snapshot);
        }
        else {
            self.incoming.entry(target).or_default().push((pred, snapshot));
        }
    }

    fn delay_slot(&mut self, delay: Option<&Instruction>) -> Result<(), Error> {
        if let Some(delay) = delay {
            self.step(delay)?;
        }
        Ok(())
    }

    fn branch(&mut self, inst: &Instruction, delay: Option<&Instruction>) -> Result<(), Error> {
        use Opcode::*;

        match inst.opcode {
            Jal | Jalr => {
                self.delay_slot(delay)?;
                self.step(inst)?;
                self.flush();
                Ok(())
            }
            Bltzal | Bgezal | Bltzall | Bgezall => self.conditional_call(inst, delay),
            Jr => self.indirect_jump(inst, delay),
            B | J => {
                self.step(inst)?;
                self.flush();
                self.delay_slot(delay)?;
                self.jump(inst)
            }
            _ => self.conditional_branch(inst, delay),
        }
    }

    /// Emits the transfer of a direct, unconditional jump whose delay slot has been evaluated.
    fn jump(&mut self, inst: &Instruction) -> Result<(), Error> {
        let target = inst.target().unwrap_or_else(|| inst.fallthrough());
        let address = inst.address;
        self.ctx.set_address(address);

        if !self.contains(target) && inst.opcode == Opcode::J {
            tracing::debug!("{address:#x}: tail call to {target:#x}");
            let call = Expr::new(ExprKind::Call { target, args: vec![] }, DataType::primitive(Primitive::I32))
                .at(address)
                .into_ref();
            self.flush();
            self.out.push(Statement::Expr { address, expr: call });
            self.out.push(Statement::Return { address, value: None });
            self.reachable = false;
            return Ok(());
        }

        self.ctx.spill();
        self.flush();
        self.add_edge(address, target);
        self.out.push(Statement::Branch {
            address,
            cond: None,
            target: Some(BranchTarget::Direct(target)),
            body: vec![],
        });
        self.reachable = false;
        Ok(())
    }

    /// `jr` and `eret`. A jump through the return address register returns from the function.
    fn indirect_jump(&mut self, inst: &Instruction, delay: Option<&Instruction>) -> Result<(), Error> {
        let jump = self.step(inst)?;
        self.flush();
        self.delay_slot(delay)?;

        let address = inst.address;
        self.ctx.set_address(address);
        if inst.opcode == Opcode::Jr && inst.rs() == Register::RA {
            let value = match self.ctx.is_defined(Location::Register(Register::V0)) {
                true => Some(self.ctx.get_register(Register::V0, None)),
                false => None,
            };
            self.flush();
            self.out.push(Statement::Return { address, value });
            self.reachable = false;
            return Ok(());
        }

        let target = match jump.as_deref().map(|expr| &expr.kind) {
            Some(ExprKind::UnconditionalBranch(target)) => target.clone(),
            _ => return Err(unexpected(inst)),
        };
        self.ctx.spill();
        self.flush();
        self.out.push(Statement::Branch { address, cond: None, target: Some(target), body: vec![] });
        self.reachable = false;
        Ok(())
    }

    fn conditional_branch(&mut self, inst: &Instruction, delay: Option<&Instruction>) -> Result<(), Error> {
        let address = inst.address;
        let branch = self.step(inst)?;
        self.flush();

        let (cond, target) = match branch.as_deref().map(|expr| &expr.kind) {
            Some(ExprKind::ConditionalBranch { cond, target, .. }) => (cond.clone(), *target),
            Some(ExprKind::UnconditionalBranch(BranchTarget::Direct(_))) => {
                self.delay_slot(delay)?;
                return self.jump(inst);
            }
            _ => return Err(unexpected(inst)),
        };

        if let Some(taken) = cond.as_imm().map(|imm| !imm.is_zero()) {
            tracing::debug!("{address:#x}: branch is always {}", if taken { "taken" } else { "skipped" });
            return match taken {
                true => {
                    self.delay_slot(delay)?;
                    self.jump(inst)
                }
                false if inst.is_likely_branch() => Ok(()),
                false => {
                    self.delay_slot(delay)?;
                    self.flush();
                    Ok(())
                }
            };
        }

        let nullify = inst.is_likely_branch() && self.config.nullify_likely_delay_slots;
        if !nullify {
            self.delay_slot(delay)?;
            self.ctx.set_address(address);
            self.ctx.spill();
            self.flush();
            self.add_edge(address, target);
            self.out.push(Statement::Branch {
                address,
                cond: Some(cond),
                target: Some(BranchTarget::Direct(target)),
                body: vec![],
            });
            return Ok(());
        }

        // The delay slot only executes on the taken path.
        self.ctx.spill();
        self.flush();
        let checkpoint = self.ctx.checkpoint();
        self.delay_slot(delay)?;
        self.ctx.set_address(address);
        self.ctx.spill();
        let body = self.ctx.take_statements();
        self.add_edge(address, target);
        self.ctx.restore(checkpoint);
        self.out.push(Statement::Branch {
            address,
            cond: Some(cond),
            target: Some(BranchTarget::Direct(target)),
            body,
        });
        Ok(())
    }

    /// `bltzal` and friends. The call only happens on the taken path, after which both paths
    /// continue at the instruction following the delay slot.
    fn conditional_call(&mut self, inst: &Instruction, delay: Option<&Instruction>) -> Result<(), Error> {
        let address = inst.address;
        let call = self.step(inst)?;
        let mut branch = self.ctx.take_statements();

        let nullify = inst.is_likely_branch() && self.config.nullify_likely_delay_slots;
        if call.is_none() && inst.is_likely_branch() {
            // Never taken.
            self.out.extend(branch);
            return Ok(());
        }
        if !nullify || !matches!(branch.last(), Some(Statement::Branch { .. })) {
            self.delay_slot(delay)?;
            self.flush();
            self.out.extend(branch);
            return Ok(());
        }

        self.ctx.spill();
        self.flush();
        let skipped = self.ctx.snapshot();
        self.delay_slot(delay)?;
        self.ctx.set_address(address);
        self.ctx.spill();
        let slot = self.ctx.take_statements();
        let taken = self.ctx.snapshot();

        if let Some(Statement::Branch { body, .. }) = branch.last_mut() {
            body.splice(0..0, slot);
        }
        self.out.extend(branch);

        let join = inst.fallthrough();
        let delay_address = address.wrapping_add(4);
        for phi in self.ctx.join(join, &[(address, skipped), (delay_address, taken)], &[]) {
            self.out.push(Statement::Comment { address, text: phi.to_string() });
        }
        Ok(())
    }
}

/// The stack slot written by each instruction that stores through `$sp`, found by following
/// `addiu`/`daddiu` adjustments of `$sp` in address order. Any other write to `$sp` ends the
/// tracking.
fn stack_writes(insts: &[Result<Instruction, r5900_isa::DecodeError>]) -> Vec<Option<Location>> {
    let mut sp = Some(0_i64);
    insts
        .iter()
        .map(|inst| {
            let inst = inst.as_ref().ok()?;
            let slot = match (inst.is_store(), inst.memory_operand(), sp) {
                (true, Some((Register::SP, offset)), Some(sp)) => {
                    Some(Location::Stack(sp.wrapping_add(offset)))
                }
                _ => None,
            };
            if inst.writes.contains(&Location::Register(Register::SP)) {
                sp = match inst.opcode {
                    Opcode::Addiu | Opcode::Daddiu if inst.rs() == Register::SP => {
                        sp.map(|sp| sp.wrapping_add(inst.simm16()))
                    }
                    _ => None,
                };
            }
            slot
        })
        .collect()
}

fn unexpected(inst: &Instruction) -> Error {
    let error = ExprError::UnsupportedOperation { op: "branch", ty: inst.opcode.mnemonic().into() };
    Error::Expr { address: inst.address, error }
}
