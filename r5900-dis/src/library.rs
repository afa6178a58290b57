//! Type libraries: structure layouts and function signatures loaded from RON files.
//!
//! ```ron
//! (
//!     structures: [
//!         (name: "Vec3", size: 12, members: [("x", 0, "f32"), ("y", 4, "f32"), ("z", 8, "f32")]),
//!     ],
//!     functions: [
//!         (name: "main", address: 0x100000, end: Some(0x100040), returns: Some("v0"), return_type: Some("i32")),
//!     ],
//! )
//! ```

use std::path::Path;

use anyhow::Context;
use r5900_ir::{DataType, FunctionRef, FunctionTable, TypeRegistry};
use r5900_isa::{Location, Register};

#[derive(Clone, Default, serde::Deserialize)]
pub struct TypeLibrary {
    #[serde(default)]
    pub structures: Vec<StructureDef>,
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
}

#[derive(Clone, serde::Deserialize)]
pub struct StructureDef {
    pub name: String,
    pub size: u64,
    /// `(name, offset, type)` for each member.
    pub members: Vec<(String, u64, String)>,
}

#[derive(Clone, serde::Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub address: u64,

    /// The end of the function's code, required to decompile functions of raw images.
    #[serde(default)]
    pub end: Option<u64>,

    /// The register the function returns its result in.
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub return_type: Option<String>,

    /// `(register, type)` for each parameter passed in a register.
    #[serde(default)]
    pub params: Vec<(String, String)>,
}

fn register(name: &str) -> anyhow::Result<Register> {
    Register::gpr_by_name(name).ok_or_else(|| anyhow::format_err!("unknown register: {name}"))
}

impl TypeLibrary {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("error reading type library: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("error parsing type library: {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Defines the library's structures in `types`. Structures may only refer to structures
    /// defined before them.
    pub fn define_types(&self, types: &TypeRegistry) -> anyhow::Result<()> {
        for def in &self.structures {
            let members: Vec<(&str, u64, &str)> =
                def.members.iter().map(|(name, offset, ty)| (name.as_str(), *offset, ty.as_str())).collect();
            types
                .define_structure(&def.name, def.size, &members)
                .with_context(|| format!("error defining structure `{}`", def.name))?;
        }
        Ok(())
    }

    pub fn function_table(&self, types: &TypeRegistry) -> anyhow::Result<FunctionTable> {
        let mut table = FunctionTable::new();
        for def in &self.functions {
            let mut function = FunctionRef::new(&def.name, def.address);
            if let Some(reg) = &def.returns {
                function.return_location = Some(Location::Register(register(reg)?));
            }
            if let Some(ty) = &def.return_type {
                let ty = types.get_type(ty.as_str()).with_context(|| format!("in `{}`", def.name))?;
                function.return_type = Some(ty);
            }
            table.insert(function);
        }
        Ok(table)
    }

    /// The declared parameters of the function at `address`.
    pub fn params(&self, types: &TypeRegistry, address: u64) -> anyhow::Result<Vec<(Register, DataType)>> {
        let Some(def) = self.functions.iter().find(|f| f.address == address)
        else {
            return Ok(vec![]);
        };
        def.params
            .iter()
            .map(|(reg, ty)| {
                let ty = types.get_type(ty.as_str()).with_context(|| format!("in `{}`", def.name))?;
                Ok((register(reg)?, ty))
            })
            .collect()
    }
}
