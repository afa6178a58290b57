//! The symbolic store that instructions are evaluated against.
//!
//! A [DecompilerContext] is created for each function that is decompiled and is never shared:
//! concurrent decompilations each own their context, and only the (internally synchronized)
//! [TypeRegistry] and the read-only [FunctionResolver] are shared between them.

use hashbrown::HashMap;
use r5900_ir::{
    BinaryOp, DataType, Expr, ExprError, ExprKind, ExprRef, FunctionRef, FunctionResolver, Imm,
    Primitive, TypeRegistry, VariableRef,
};
use r5900_isa::{Location, Register};

use crate::{
    ssa::{LocationDef, LocationUse, Phi},
    stmt::Statement,
    Config,
};

/// The current value of a location.
#[derive(Debug, Clone, PartialEq)]
struct Binding {
    version: u32,
    value: ExprRef,

    /// Whether the value has been assigned to the variable named by `version`.
    materialized: bool,
}

/// A copy of every binding of a context, taken at the end of a path into a join.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    bindings: HashMap<Location, Binding>,
}

impl Snapshot {
    /// The version of `location` at the time of the snapshot.
    pub fn version(&self, location: Location) -> u32 {
        self.bindings.get(&location).map_or(0, |b| b.version)
    }
}

/// A saved set of bindings, see [DecompilerContext::checkpoint].
#[derive(Debug, Clone)]
pub struct Checkpoint {
    bindings: HashMap<Location, Binding>,
}

/// The natural type of a value held in `reg`.
pub fn register_type(reg: Register) -> DataType {
    let p = match reg {
        Register::SA => Primitive::U32,
        Register::Cpu(_) => Primitive::I64,
        Register::COP0_COND => Primitive::Bool,
        Register::Cop0(_) => Primitive::U32,
        Register::FPU_COND => Primitive::Bool,
        Register::FCR0 | Register::FCR31 | Register::FPU_FLAGS => Primitive::U32,
        Register::Cop1(_) => Primitive::F32,
        Register::Cop2Vector(..) => Primitive::F32,
        Register::Cop2Integer(_) => Primitive::U16,
        Register::Cop2Special(_) => Primitive::U32,
    };
    DataType::primitive(p)
}

/// The offset from the entry stack pointer that `addr` refers to, if it is stack relative.
pub fn stack_offset(addr: &Expr) -> Option<i64> {
    match &addr.kind {
        ExprKind::StackPointer => Some(0),
        ExprKind::Binary { op: op @ (BinaryOp::Add | BinaryOp::Sub), lhs, rhs } => {
            let base = stack_offset(lhs)?;
            let offset = rhs.as_imm()?.to_i64();
            Some(match op {
                BinaryOp::Add => base.wrapping_add(offset),
                _ => base.wrapping_sub(offset),
            })
        }
        ExprKind::Cast { value, bitcast: false } if value.ty.bits() <= addr.ty.bits() => {
            stack_offset(value)
        }
        _ => None,
    }
}

pub struct DecompilerContext<'a> {
    types: &'a TypeRegistry,
    functions: Option<&'a dyn FunctionResolver>,
    config: Config,

    /// The address of the instruction being evaluated.
    address: u64,

    bindings: HashMap<Location, Binding>,
    last_version: HashMap<Location, u32>,

    /// Types of locations that hold a typed value on entry to the function.
    declared: HashMap<Location, DataType>,

    defs: Vec<LocationDef>,
    uses: Vec<LocationUse>,
    phis: Vec<Phi>,
    statements: Vec<Statement>,
}

impl<'a> DecompilerContext<'a> {
    pub fn new(types: &'a TypeRegistry) -> Self {
        Self {
            types,
            functions: None,
            config: Config::default(),
            address: 0,
            bindings: HashMap::new(),
            last_version: HashMap::new(),
            declared: HashMap::new(),
            defs: vec![],
            uses: vec![],
            phis: vec![],
            statements: vec![],
        }
    }

    pub fn with_functions(mut self, functions: &'a dyn FunctionResolver) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn types(&self) -> &'a TypeRegistry {
        self.types
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    /// Sets the address attributed to expressions, definitions and statements created next.
    pub fn set_address(&mut self, address: u64) {
        self.address = address;
    }

    pub fn resolve_function(&self, address: u64) -> Option<FunctionRef> {
        self.functions.and_then(|f| f.find_function_by_address(address))
    }

    /// Declares that `reg` holds a value of type `ty` on entry, e.g. a typed parameter.
    pub fn declare(&mut self, reg: Register, ty: DataType) {
        let location = Location::Register(reg);
        self.declared.insert(location, ty);
        self.bindings.remove(&location);
    }

    fn location_type(&self, location: Location) -> DataType {
        if let Some(ty) = self.declared.get(&location) {
            return ty.clone();
        }
        match location {
            Location::Register(reg) => register_type(reg),
            Location::Stack(_) => DataType::primitive(Primitive::I32),
        }
    }

    /// The value of a location that has not been written by the function.
    fn initial_value(&self, location: Location) -> ExprRef {
        let ty = self.location_type(location);
        match location {
            Location::Register(reg) if reg.is_zero() => Expr::imm(Imm::typed(0, ty)).into_ref(),
            Location::Register(Register::SP) if !self.declared.contains_key(&location) => {
                Expr::new(ExprKind::StackPointer, DataType::primitive(Primitive::U32))
                    .with_location(location)
                    .into_ref()
            }
            _ => Expr::variable(VariableRef::new(location, 0), ty).into_ref(),
        }
    }

    /// Reads a location. With `at`, returns the value the location held just before the
    /// instruction at that address, otherwise the current value.
    pub fn get(&mut self, location: Location, at: Option<u64>) -> ExprRef {
        let (version, value) = match at {
            Some(at) => {
                let def = self
                    .defs
                    .iter()
                    .rev()
                    .find(|def| def.location() == location && def.address < at);
                match def {
                    Some(def) if def.materialized => {
                        (def.var.version, Expr::variable(def.var, def.value.ty.clone()).into_ref())
                    }
                    Some(def) => (def.var.version, def.value.clone()),
                    None => (0, self.initial_value(location)),
                }
            }
            None => match self.bindings.get(&location) {
                Some(binding) => (binding.version, binding.value.clone()),
                None => {
                    if !matches!(location, Location::Register(reg) if reg.is_zero()) {
                        tracing::debug!("{:#x}: read of undefined location {location:?}", self.address);
                    }
                    (0, self.initial_value(location))
                }
            },
        };

        if !matches!(location, Location::Register(reg) if reg.is_zero()) {
            let var = VariableRef::new(location, version);
            self.uses.push(LocationUse { var, address: self.address });
        }
        value
    }

    /// Whether `location` has been written by the function (or merged at a join).
    pub fn is_defined(&self, location: Location) -> bool {
        self.bindings.contains_key(&location)
    }

    pub fn get_register(&mut self, reg: Register, at: Option<u64>) -> ExprRef {
        self.get(Location::Register(reg), at)
    }

    pub fn get_stack(&mut self, offset: i64, at: Option<u64>) -> ExprRef {
        self.get(Location::Stack(offset), at)
    }

    fn next_version(&mut self, location: Location) -> u32 {
        let version = self.last_version.entry(location).or_insert(0);
        *version += 1;
        *version
    }

    /// Reduces `expr` if the configuration asks for it.
    pub fn finish_expr(&self, expr: ExprRef) -> Result<ExprRef, ExprError> {
        match self.config.reduce_expressions {
            true => expr.reduce(),
            false => Ok(expr),
        }
    }

    /// Writes a new version of a location.
    ///
    /// Values that cannot be substituted into later reads (loads, call results) are assigned to
    /// the new variable immediately and later reads see the variable.
    pub fn set(&mut self, location: Location, expr: ExprRef) -> Result<(), ExprError> {
        if matches!(location, Location::Register(reg) if reg.is_zero()) {
            return Ok(());
        }

        let value = self.finish_expr(expr)?;
        let version = self.next_version(location);
        let var = VariableRef::new(location, version);
        tracing::trace!("{:#x}: {} = {value:?}", self.address, var.name());

        let materialized = !value.can_propagate;
        let bound = match materialized {
            true => {
                self.statements.push(Statement::Assign {
                    address: self.address,
                    var,
                    value: value.clone(),
                });
                Expr::variable(var, value.ty.clone()).at(self.address).into_ref()
            }
            false => value.clone(),
        };

        self.defs.push(LocationDef { var, address: self.address, value, materialized });
        self.bindings.insert(location, Binding { version, value: bound, materialized });
        Ok(())
    }

    pub fn set_register(&mut self, reg: Register, expr: ExprRef) -> Result<(), ExprError> {
        self.set(Location::Register(reg), expr)
    }

    pub fn set_stack(&mut self, offset: i64, expr: ExprRef) -> Result<(), ExprError> {
        self.set(Location::Stack(offset), expr)
    }

    /// Reads `size` bytes of memory at `addr` as a value of type `ty`.
    pub fn load(&mut self, addr: ExprRef, size: u8, signed: bool, ty: DataType) -> Result<ExprRef, ExprError> {
        let addr = self.finish_expr(addr)?;
        if self.config.propagate_stack {
            if let Some(offset) = stack_offset(&addr) {
                let value = self.get_stack(offset, None);
                if value.ty == ty {
                    return Ok(value);
                }
                let bitcast = value.ty.is_float() != ty.is_float();
                let cast = match bitcast {
                    true => Expr::bitcast(value, ty),
                    false => Expr::cast(value, ty),
                };
                return self.finish_expr(cast.at(self.address).into_ref());
            }
        }
        Ok(Expr::load(addr, size, signed, ty).at(self.address).into_ref())
    }

    /// Writes the low `size` bytes of `value` to memory at `addr`, returning the store.
    ///
    /// Stores to stack slots only update the slot.
    pub fn store(&mut self, addr: ExprRef, value: ExprRef, size: u8) -> Result<ExprRef, ExprError> {
        let addr = self.finish_expr(addr)?;
        if self.config.propagate_stack {
            if let Some(offset) = stack_offset(&addr) {
                let value = match value.ty.size() == size as u64 {
                    true => value,
                    false => {
                        let ty = value.ty.result_type(None, Some(size as u32 * 8));
                        Expr::cast(value, ty).at(self.address).into_ref()
                    }
                };
                self.set_stack(offset, value.clone())?;
                return Ok(value);
            }
        }
        let store = Expr::store(addr, value, size).at(self.address).into_ref();
        let store = self.finish_expr(store)?;
        self.emit(Statement::Expr { address: self.address, expr: store.clone() });
        Ok(store)
    }

    pub fn emit(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn comment(&mut self, text: impl Into<String>) {
        self.statements.push(Statement::Comment { address: self.address, text: text.into() });
    }

    /// Removes and returns the statements produced since the last call.
    pub fn take_statements(&mut self) -> Vec<Statement> {
        std::mem::take(&mut self.statements)
    }

    /// Assigns every value that is still only held symbolically to its variable, so that the
    /// values reaching a join all have a name.
    ///
    /// Stack relative addresses are left alone so that accesses through them can still be
    /// resolved to stack slots.
    pub fn spill(&mut self) {
        let mut pending: Vec<_> = self
            .bindings
            .iter()
            .filter(|(_, b)| !b.materialized && b.version != 0)
            .filter(|(_, b)| stack_offset(&b.value).is_none())
            .map(|(location, _)| *location)
            .collect();
        pending.sort();

        for location in pending {
            let Some(binding) = self.bindings.get_mut(&location)
            else {
                continue;
            };
            let var = VariableRef::new(location, binding.version);
            let variable = Expr::variable(var, binding.value.ty.clone()).at(self.address).into_ref();
            let value = std::mem::replace(&mut binding.value, variable);
            binding.materialized = true;

            if let Some(def) = self.defs.iter_mut().rev().find(|def| def.var == var) {
                def.materialized = true;
            }
            self.statements.push(Statement::Assign { address: self.address, var, value });
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot { bindings: self.bindings.clone() }
    }

    /// Saves the current bindings. Versions allocated after the checkpoint stay allocated when the
    /// checkpoint is restored.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint { bindings: self.bindings.clone() }
    }

    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.bindings = checkpoint.bindings;
    }

    fn binding_in(&self, snapshot: &Snapshot, location: Location) -> Binding {
        match snapshot.bindings.get(&location) {
            Some(binding) => binding.clone(),
            None => Binding { version: 0, value: self.initial_value(location), materialized: true },
        }
    }

    /// Merges the states reaching the join at `address`.
    ///
    /// `incoming` holds the state at the end of each predecessor seen so far. Locations whose
    /// versions differ between predecessors, and every location in `loop_carried`, are bound to
    /// the result of a new phi. Returns the phis that were created.
    pub fn join(
        &mut self,
        address: u64,
        incoming: &[(u64, Snapshot)],
        loop_carried: &[Location],
    ) -> Vec<Phi> {
        if incoming.is_empty() {
            return vec![];
        }

        let mut locations: Vec<Location> = incoming
            .iter()
            .flat_map(|(_, snapshot)| snapshot.bindings.keys().copied())
            .chain(loop_carried.iter().copied())
            .filter(|location| !matches!(location, Location::Register(reg) if reg.is_zero()))
            .collect();
        locations.sort();
        locations.dedup();

        let mut merged = HashMap::new();
        let mut created = vec![];
        for location in locations {
            let args: Vec<(u64, Binding)> = incoming
                .iter()
                .map(|(pred, snapshot)| (*pred, self.binding_in(snapshot, location)))
                .collect();

            let same = args.windows(2).all(|w| w[0].1.version == w[1].1.version);
            if same && !loop_carried.contains(&location) {
                if let Some((_, binding)) = args.into_iter().next() {
                    merged.insert(location, binding);
                }
                continue;
            }

            let ty = match args.first() {
                Some((_, binding)) => binding.value.ty.clone(),
                None => self.location_type(location),
            };
            let version = self.next_version(location);
            let result = VariableRef::new(location, version);
            let mut phi = Phi { result, address, args: vec![] };
            for (pred, binding) in &args {
                phi.add_arg(*pred, VariableRef::new(location, binding.version));
            }
            tracing::debug!("{address:#x}: {phi}");

            let value = Expr::variable(result, ty).at(address).into_ref();
            self.defs.push(LocationDef { var: result, address, value: value.clone(), materialized: true });
            merged.insert(location, Binding { version, value, materialized: true });
            self.phis.push(phi.clone());
            created.push(phi);
        }

        self.bindings = merged;
        created
    }

    /// Adds the state at the end of a back edge from `pred` to the phis of the join at `header`.
    pub fn add_phi_args(&mut self, header: u64, pred: u64, snapshot: &Snapshot) {
        for phi in self.phis.iter_mut().filter(|phi| phi.address == header) {
            let location = phi.location();
            phi.add_arg(pred, VariableRef::new(location, snapshot.version(location)));
        }
    }

    pub fn defs(&self) -> &[LocationDef] {
        &self.defs
    }

    pub fn uses(&self) -> &[LocationUse] {
        &self.uses
    }

    pub fn phis(&self) -> &[Phi] {
        &self.phis
    }

    /// Consumes the context, returning its version history.
    pub fn into_history(self) -> (Vec<LocationDef>, Vec<LocationUse>, Vec<Phi>) {
        (self.defs, self.uses, self.phis)
    }
}
