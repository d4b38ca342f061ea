//! The module graph
//!
//! Modules own a unique type map and an overloadable term map, plus an
//! import list. The dependency closure lists later imports before earlier
//! ones, so lookups walking it front to back see shadowing imports first.
//! Parent/child links are ids into the graph, never owned pointers, which
//! keeps the structure acyclic to Rust even though the language-level
//! graph has back-edges.

use crate::symbol::SymbolId;
use mica_syntax::{Name, Word};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity of a module in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleKind {
    /// A root module backed by a source file
    Source,
    /// A module nested under another module
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleData {
    pub id: ModuleId,
    pub name: Name,
    pub kind: ModuleKind,
    /// The enclosing module for `User` modules
    pub parent: Option<ModuleId>,
    /// Type-universe bindings; unique per word
    pub types: HashMap<Word, SymbolId>,
    /// Term-universe bindings; overloads share a word
    pub terms: HashMap<Word, Vec<SymbolId>>,
    /// Nested modules by their local word
    pub children: HashMap<Word, ModuleId>,
    /// Direct imports, in source order
    pub imports: Vec<ModuleId>,
}

/// The arena of all modules of a compilation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleGraph {
    modules: Vec<ModuleData>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        ModuleGraph::default()
    }

    pub fn add_source(&mut self, name: Name) -> ModuleId {
        self.add(name, ModuleKind::Source, None)
    }

    pub fn add_user(&mut self, name: Name, parent: ModuleId) -> ModuleId {
        let id = self.add(name.clone(), ModuleKind::User, Some(parent));
        if let Some(word) = name.local() {
            self.get_mut(parent).children.insert(word, id);
        }
        id
    }

    fn add(&mut self, name: Name, kind: ModuleKind, parent: Option<ModuleId>) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(ModuleData {
            id,
            name,
            kind,
            parent,
            types: HashMap::new(),
            terms: HashMap::new(),
            children: HashMap::new(),
            imports: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: ModuleId) -> &ModuleData {
        &self.modules[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ModuleId) -> &mut ModuleData {
        &mut self.modules[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleData> {
        self.modules.iter()
    }

    /// Bind a type symbol. Returns the previous binding when the word was
    /// already taken, leaving the old binding in place.
    pub fn define_type(&mut self, module: ModuleId, word: Word, sym: SymbolId) -> Option<SymbolId> {
        let types = &mut self.get_mut(module).types;
        if let Some(&existing) = types.get(&word) {
            return Some(existing);
        }
        types.insert(word, sym);
        None
    }

    /// Bind a term symbol; overloads accumulate
    pub fn define_term(&mut self, module: ModuleId, word: Word, sym: SymbolId) {
        self.get_mut(module).terms.entry(word).or_default().push(sym);
    }

    pub fn add_import(&mut self, module: ModuleId, import: ModuleId) {
        self.get_mut(module).imports.push(import);
    }

    /// The dependency closure of a module in reverse postorder over the
    /// import graph. The result lists later imports before earlier ones,
    /// which is what gives shadowing its direction.
    pub fn dependencies(&self, module: ModuleId) -> Vec<ModuleId> {
        let mut visited = vec![false; self.modules.len()];
        let mut postorder = Vec::new();
        visited[module.0 as usize] = true;
        for &import in &self.get(module).imports {
            self.visit(import, &mut visited, &mut postorder);
        }
        postorder.reverse();
        postorder
    }

    fn visit(&self, module: ModuleId, visited: &mut Vec<bool>, postorder: &mut Vec<ModuleId>) {
        if visited[module.0 as usize] {
            return;
        }
        visited[module.0 as usize] = true;
        for &import in &self.get(module).imports {
            self.visit(import, visited, postorder);
        }
        postorder.push(module);
    }

    /// Look up a type by word: the module's own map first, then the
    /// dependency closure, first hit wins.
    pub fn typ(&self, module: ModuleId, word: Word) -> Option<SymbolId> {
        if let Some(&sym) = self.get(module).types.get(&word) {
            return Some(sym);
        }
        for dep in self.dependencies(module) {
            if let Some(&sym) = self.get(dep).types.get(&word) {
                return Some(sym);
            }
        }
        None
    }

    /// Look up all term overloads visible under a word. The result is a
    /// set: order between providers is not significant.
    pub fn trm(&self, module: ModuleId, word: Word) -> Vec<SymbolId> {
        let mut out = Vec::new();
        let mut push_all = |syms: Option<&Vec<SymbolId>>| {
            if let Some(syms) = syms {
                for &s in syms {
                    if !out.contains(&s) {
                        out.push(s);
                    }
                }
            }
        };
        push_all(self.get(module).terms.get(&word));
        for dep in self.dependencies(module) {
            push_all(self.get(dep).terms.get(&word));
        }
        out
    }

    /// Resolve a nested module through child links
    pub fn submodule(&self, module: ModuleId, word: Word) -> Option<ModuleId> {
        if let Some(&child) = self.get(module).children.get(&word) {
            return Some(child);
        }
        for dep in self.dependencies(module) {
            if let Some(&child) = self.get(dep).children.get(&word) {
                return Some(child);
            }
        }
        None
    }

    /// Resolve a possibly qualified type name
    pub fn resolve_type(&self, module: ModuleId, name: &Name) -> Option<SymbolId> {
        match name {
            Name::Empty => None,
            Name::Word(w) => self.typ(module, *w),
            Name::Nested(parent, w) => {
                let m = self.resolve_module(module, parent)?;
                self.get(m).types.get(w).copied()
            }
        }
    }

    /// Resolve a possibly qualified term name to its overload set
    pub fn resolve_terms(&self, module: ModuleId, name: &Name) -> Vec<SymbolId> {
        match name {
            Name::Empty => Vec::new(),
            Name::Word(w) => self.trm(module, *w),
            Name::Nested(parent, w) => match self.resolve_module(module, parent) {
                Some(m) => self.get(m).terms.get(w).cloned().unwrap_or_default(),
                None => Vec::new(),
            },
        }
    }

    /// Resolve a possibly qualified module name
    pub fn resolve_module(&self, module: ModuleId, name: &Name) -> Option<ModuleId> {
        match name {
            Name::Empty => Some(module),
            Name::Word(w) => self.submodule(module, *w),
            Name::Nested(parent, w) => {
                let m = self.resolve_module(module, parent)?;
                self.submodule(m, *w)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{SymbolKind, Symbols, TypeSymbol};

    fn type_sym(syms: &mut Symbols, name: &str) -> SymbolId {
        syms.insert(
            Name::from(name),
            SymbolKind::Type(TypeSymbol::Data { constructors: vec![] }),
        )
    }

    #[test]
    fn test_later_imports_shadow_earlier() {
        let mut syms = Symbols::new();
        let mut graph = ModuleGraph::new();
        let a = graph.add_source(Name::from("a"));
        let b = graph.add_source(Name::from("b"));
        let main = graph.add_source(Name::from("main"));

        let w = Word::intern("T");
        let ta = type_sym(&mut syms, "T");
        let tb = type_sym(&mut syms, "T");
        graph.define_type(a, w, ta);
        graph.define_type(b, w, tb);

        graph.add_import(main, a);
        graph.add_import(main, b);

        // b is imported later, so it wins
        assert_eq!(graph.typ(main, w), Some(tb));
    }

    #[test]
    fn test_own_definitions_shadow_imports() {
        let mut syms = Symbols::new();
        let mut graph = ModuleGraph::new();
        let dep = graph.add_source(Name::from("dep"));
        let main = graph.add_source(Name::from("main"));

        let w = Word::intern("T");
        let imported = type_sym(&mut syms, "T");
        let own = type_sym(&mut syms, "T");
        graph.define_type(dep, w, imported);
        graph.define_type(main, w, own);
        graph.add_import(main, dep);

        assert_eq!(graph.typ(main, w), Some(own));
    }

    #[test]
    fn test_terms_accumulate_overloads() {
        let mut syms = Symbols::new();
        let mut graph = ModuleGraph::new();
        let dep = graph.add_source(Name::from("dep"));
        let main = graph.add_source(Name::from("main"));
        graph.add_import(main, dep);

        let w = Word::intern("log");
        let f1 = syms.fresh_call_target("log");
        let f2 = syms.fresh_call_target("log");
        graph.define_term(dep, w, f1);
        graph.define_term(main, w, f2);

        let overloads = graph.trm(main, w);
        assert_eq!(overloads.len(), 2);
        assert!(overloads.contains(&f1) && overloads.contains(&f2));
    }

    #[test]
    fn test_transitive_dependencies_in_reverse_postorder() {
        let mut graph = ModuleGraph::new();
        let base = graph.add_source(Name::from("base"));
        let mid = graph.add_source(Name::from("mid"));
        let main = graph.add_source(Name::from("main"));
        graph.add_import(mid, base);
        graph.add_import(main, mid);

        let deps = graph.dependencies(main);
        assert_eq!(deps, vec![mid, base]);
    }

    #[test]
    fn test_qualified_resolution() {
        let mut syms = Symbols::new();
        let mut graph = ModuleGraph::new();
        let root = graph.add_source(Name::from("root"));
        let inner = graph.add_user(Name::from("root.inner"), root);

        let w = Word::intern("T");
        let t = type_sym(&mut syms, "T");
        graph.define_type(inner, w, t);

        assert_eq!(graph.resolve_type(root, &Name::from("inner.T")), Some(t));
        assert_eq!(graph.resolve_module(root, &Name::from("inner")), Some(inner));
    }
}
