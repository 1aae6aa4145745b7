use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

/// Storage class of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Static,
    Field,
    Arg,
    Local,
}

/// Declared type of a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Char,
    Boolean,
    Class(String),
}

impl Type {
    pub fn as_str(&self) -> &str {
        match self {
            Type::Int => "int",
            Type::Char => "char",
            Type::Boolean => "boolean",
            Type::Class(name) => name,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            Type::Class(name) => Some(name),
            _ => None,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub kind: VarKind,
    pub index: u32,
}

/// A name that was already present when `define` was called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redefinition(pub String);

/// One scope of variables.
#[derive(Debug, Default)]
pub struct SymbolTable {
    vars: HashMap<String, Symbol>,
    counts: HashMap<VarKind, u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name` with the next free index of `kind`. The first definition
    /// of a name wins: a repeated name leaves the table untouched.
    pub fn define(&mut self, ty: Type, name: &str, kind: VarKind) -> Result<&Symbol, Redefinition> {
        if self.vars.contains_key(name) {
            return Err(Redefinition(name.to_string()));
        }
        let count = self.counts.entry(kind).or_insert(0);
        let index = *count;
        *count += 1;
        Ok(self.vars.entry(name.to_string()).or_insert(Symbol {
            name: name.to_string(),
            ty,
            kind,
            index,
        }))
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.vars.get(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.get(name).map(|sym| sym.index)
    }

    pub fn kind_of(&self, name: &str) -> Option<VarKind> {
        self.get(name).map(|sym| sym.kind)
    }

    pub fn type_of(&self, name: &str) -> Option<&Type> {
        self.get(name).map(|sym| &sym.ty)
    }

    pub fn var_count(&self, kind: VarKind) -> u32 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

/// The class scope and the scope of the subroutine being compiled.
#[derive(Debug, Default)]
pub struct Scopes {
    pub class: SymbolTable,
    pub subroutine: SymbolTable,
}

impl Scopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every argument and local of the previous subroutine.
    pub fn enter_subroutine(&mut self) {
        self.subroutine = SymbolTable::new();
    }

    /// Looks `name` up in the subroutine scope, then the class scope.
    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.subroutine.get(name).or_else(|| self.class.get(name))
    }
}
