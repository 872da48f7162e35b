use std::collections::HashMap;

use crate::error::SourceLocation;
use crate::program::{special, Function, Symbol, Var, VarKind};

/// A function as seen by the compiler: it may be called before it is defined
#[derive(Debug)]
pub(super) struct FunctionInfo {
    pub name: String,
    pub params: Vec<String>,
    pub kinds: Vec<VarKind>,
    pub entry: Option<usize>,
    /// (argument count, call site) of every call
    pub calls: Vec<(usize, SourceLocation)>,
}

#[derive(Debug)]
pub(super) struct Symbols {
    globals: Vec<Symbol>,
    global_index: HashMap<String, usize>,
    functions: Vec<FunctionInfo>,
    function_index: HashMap<String, usize>,
    /// Function being compiled and its parameter slots
    scope: Option<(usize, HashMap<String, usize>)>,
}

impl Symbols {
    pub fn new() -> Self {
        let mut symbols = Self {
            globals: Vec::new(),
            global_index: HashMap::new(),
            functions: Vec::new(),
            function_index: HashMap::new(),
            scope: None,
        };
        for (slot, name) in special::NAMES.iter().enumerate() {
            let kind = if slot == special::ARGV || slot == special::ENVIRON {
                VarKind::Map
            } else {
                VarKind::Scalar
            };
            symbols.global_index.insert(name.to_string(), slot);
            symbols.globals.push(Symbol {
                name: name.to_string(),
                kind,
            });
        }
        symbols
    }

    /// Resolve a variable name: a parameter of the current function, else a
    /// global (created on first sight)
    pub fn resolve(&mut self, name: &str) -> Result<Var, String> {
        if let Some((_, params)) = &self.scope {
            if let Some(&slot) = params.get(name) {
                return Ok(Var::Local(slot));
            }
        }
        if self.function_index.contains_key(name) {
            return Err(format!("function `{}' used as a variable", name));
        }
        if let Some(&slot) = self.global_index.get(name) {
            return Ok(Var::Global(slot));
        }
        let slot = self.globals.len();
        self.globals.push(Symbol {
            name: name.to_string(),
            kind: VarKind::Unknown,
        });
        self.global_index.insert(name.to_string(), slot);
        Ok(Var::Global(slot))
    }

    fn kind_mut(&mut self, var: Var) -> Option<(&str, &mut VarKind)> {
        match var {
            Var::Global(slot) => self
                .globals
                .get_mut(slot)
                .map(|sym| (sym.name.as_str(), &mut sym.kind)),
            Var::Local(slot) => {
                let (func, _) = self.scope.as_ref()?;
                let info = self.functions.get_mut(*func)?;
                let name = info.params.get(slot)?;
                info.kinds.get_mut(slot).map(|kind| (name.as_str(), kind))
            }
        }
    }

    /// Record that `var` is used as `kind`; a conflicting use is an error
    pub fn mark(&mut self, var: Var, kind: VarKind) -> Result<(), String> {
        let Some((name, current)) = self.kind_mut(var) else {
            return Ok(());
        };
        match (*current, kind) {
            (VarKind::Unknown, _) => {
                *current = kind;
                Ok(())
            }
            (a, b) if a == b => Ok(()),
            (VarKind::Map, _) => Err(format!("can't use array `{}' in scalar context", name)),
            _ => Err(format!("can't use scalar `{}' as array", name)),
        }
    }

    /// Function slot for `name`, created when first referenced
    pub fn function_id(&mut self, name: &str) -> Result<usize, String> {
        if let Some(&id) = self.function_index.get(name) {
            return Ok(id);
        }
        if self.global_index.contains_key(name) {
            return Err(format!("variable `{}' used as a function", name));
        }
        let id = self.functions.len();
        self.functions.push(FunctionInfo {
            name: name.to_string(),
            params: Vec::new(),
            kinds: Vec::new(),
            entry: None,
            calls: Vec::new(),
        });
        self.function_index.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn note_call(&mut self, id: usize, argc: usize, location: SourceLocation) {
        if let Some(info) = self.functions.get_mut(id) {
            info.calls.push((argc, location));
        }
    }

    /// Start compiling the body of function `id`
    pub fn enter_function(&mut self, id: usize, params: Vec<String>, entry: usize) -> Result<(), String> {
        let Some(info) = self.functions.get_mut(id) else {
            return Err("unknown function".to_string());
        };
        if info.entry.is_some() {
            return Err(format!("function `{}' redefined", info.name));
        }
        let mut slots = HashMap::new();
        for (slot, param) in params.iter().enumerate() {
            if self.function_index.contains_key(param) {
                return Err(format!("function name `{}' used as a parameter", param));
            }
            if special::NAMES.contains(&param.as_str()) {
                return Err(format!("special variable `{}' used as a parameter", param));
            }
            if slots.insert(param.clone(), slot).is_some() {
                return Err(format!("duplicate parameter `{}'", param));
            }
        }
        let info = &mut self.functions[id];
        info.kinds = vec![VarKind::Unknown; params.len()];
        info.params = params;
        info.entry = Some(entry);
        self.scope = Some((id, slots));
        Ok(())
    }

    pub fn leave_function(&mut self) {
        self.scope = None;
    }

    pub fn in_function(&self) -> bool {
        self.scope.is_some()
    }

    pub fn functions(&self) -> &[FunctionInfo] {
        &self.functions
    }

    pub fn into_tables(self) -> (Vec<Symbol>, Vec<Function>) {
        let functions = self
            .functions
            .into_iter()
            .map(|info| Function {
                name: info.name,
                params: info.params,
                kinds: info.kinds,
                entry: info.entry.unwrap_or(0),
            })
            .collect();
        (self.globals, functions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specials_are_preallocated() {
        let mut symbols = Symbols::new();
        assert_eq!(symbols.resolve("NF"), Ok(Var::Global(special::NF)));
        assert_eq!(symbols.resolve("SUBSEP"), Ok(Var::Global(special::SUBSEP)));
        assert_eq!(symbols.resolve("x"), Ok(Var::Global(special::NAMES.len())));
        assert!(symbols.mark(Var::Global(special::ARGV), VarKind::Scalar).is_err());
    }

    #[test]
    fn test_kind_conflict() {
        let mut symbols = Symbols::new();
        let x = symbols.resolve("x").unwrap();
        symbols.mark(x, VarKind::Map).unwrap();
        symbols.mark(x, VarKind::Map).unwrap();
        assert!(symbols.mark(x, VarKind::Scalar).is_err());
    }

    #[test]
    fn test_params_shadow_globals() {
        let mut symbols = Symbols::new();
        symbols.resolve("a").unwrap();
        let f = symbols.function_id("f").unwrap();
        symbols
            .enter_function(f, vec!["a".to_string(), "b".to_string()], 0)
            .unwrap();
        assert_eq!(symbols.resolve("b"), Ok(Var::Local(1)));
        assert_eq!(symbols.resolve("a"), Ok(Var::Local(0)));
        symbols.leave_function();
        assert!(matches!(symbols.resolve("a"), Ok(Var::Global(_))));
        assert!(symbols.resolve("f").is_err());
    }

    #[test]
    fn test_bad_parameters() {
        let mut symbols = Symbols::new();
        let f = symbols.function_id("f").unwrap();
        assert!(symbols.enter_function(f, vec!["NR".to_string()], 0).is_err());
        let g = symbols.function_id("g").unwrap();
        assert!(symbols
            .enter_function(g, vec!["a".to_string(), "a".to_string()], 0)
            .is_err());
    }
}
