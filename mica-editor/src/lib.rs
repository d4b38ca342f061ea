//! Editor queries
//!
//! The language-server transport lives outside the core; this crate
//! answers its questions from the committed annotations: definition sites,
//! hover texts, reference lists, document symbols, code actions, and the
//! inferred-captures command. Positions resolve through an identifier
//! index built from the surface tree.

use mica_annotations::{anns, AnnotationStore, AnnotationsDb, Key};
use mica_syntax::tree as surface;
use mica_syntax::{
    ByteOffset, Callee, Definition, IdDef, IdRef, ModuleTree, NodeId, Pattern, PatternKind, Span,
    Stmts, Term, TermKind,
};
use mica_types::{BlockSymbol, DisplayType, SymbolId, SymbolKind as Universe, Symbols, TermSymbol};
use serde::{Deserialize, Serialize};

/// The subset of symbol kinds the editor surface distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    /// Modules surface as classes
    Class,
    /// Functions surface as methods
    Method,
    /// Parameters and binders surface as variables
    Variable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub range: Span,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeAction {
    pub title: String,
    pub range: Span,
    pub insertion: String,
}

/// One identifier occurrence, definition or reference
#[derive(Debug, Clone, Copy)]
struct Occurrence {
    node: NodeId,
    span: Span,
}

/// A position index over the identifiers of one module tree
#[derive(Debug, Default)]
pub struct TreeIndex {
    occurrences: Vec<Occurrence>,
}

impl TreeIndex {
    pub fn build(tree: &ModuleTree) -> TreeIndex {
        let mut index = TreeIndex::default();
        for def in &tree.defs {
            index.walk_definition(def);
        }
        index
    }

    fn add_def(&mut self, id: &IdDef) {
        self.occurrences.push(Occurrence { node: id.id, span: id.span });
    }

    fn add_ref(&mut self, id: &IdRef) {
        self.occurrences.push(Occurrence { node: id.id, span: id.span });
    }

    /// The innermost identifier covering an offset
    pub fn at(&self, offset: ByteOffset) -> Option<NodeId> {
        self.occurrences
            .iter()
            .filter(|o| o.span.contains(offset))
            .min_by_key(|o| o.span.len())
            .map(|o| o.node)
    }

    /// The span of an identifier node
    pub fn span_of(&self, node: NodeId) -> Option<Span> {
        self.occurrences.iter().find(|o| o.node == node).map(|o| o.span)
    }

    fn walk_definition(&mut self, def: &Definition) {
        if let Some(binder) = def.binder() {
            self.add_def(binder);
        }
        match def {
            Definition::Fun { tparams, vparams, bparams, body, .. } => {
                for p in tparams {
                    self.add_def(p);
                }
                self.walk_params(vparams, bparams);
                self.walk_stmts(body);
            }
            Definition::DefBlock { rhs, .. } => self.walk_term(rhs),
            Definition::Val { binding, .. } => self.walk_term(binding),
            Definition::Var { region, init, .. } => {
                if let Some(region) = region {
                    self.add_ref(region);
                }
                self.walk_term(init);
            }
            Definition::Data { ctors, .. } => {
                for ctor in ctors {
                    self.add_def(&ctor.binder);
                }
            }
            Definition::Record { fields, .. } => {
                for field in fields {
                    self.add_def(&field.binder);
                }
            }
            Definition::Effect { ops, .. } | Definition::Interface { ops, .. } => {
                for op in ops {
                    self.add_def(&op.binder);
                }
            }
            Definition::ExternDef { vparams, bparams, .. } => {
                self.walk_params(vparams, bparams);
            }
            Definition::TypeAlias { .. }
            | Definition::EffectAlias { .. }
            | Definition::ExternInclude { .. } => {}
        }
    }

    fn walk_params(&mut self, vparams: &[surface::ParamDef], bparams: &[surface::BlockParamDef]) {
        for p in vparams {
            self.add_def(&p.binder);
        }
        for p in bparams {
            self.add_def(&p.binder);
        }
    }

    fn walk_stmts(&mut self, stmts: &Stmts) {
        for stmt in &stmts.stmts {
            match stmt {
                surface::Stmt::Expr(t) | surface::Stmt::Return(t) => self.walk_term(t),
                surface::Stmt::Def(def) => self.walk_definition(def),
            }
        }
    }

    fn walk_term(&mut self, term: &Term) {
        match &term.kind {
            TermKind::Literal(_) | TermKind::Hole => {}
            TermKind::Var(id) => self.add_ref(id),
            TermKind::Call { callee, vargs, bargs, .. } => {
                match callee {
                    Callee::Id(id) => self.add_ref(id),
                    Callee::Method { receiver, method } => {
                        self.walk_term(receiver);
                        self.add_ref(method);
                    }
                    Callee::Expr(e) => self.walk_term(e),
                }
                for a in vargs {
                    self.walk_term(a);
                }
                for b in bargs {
                    self.walk_term(b);
                }
            }
            TermKind::If { cond, thn, els } => {
                self.walk_term(cond);
                self.walk_stmts(thn);
                self.walk_stmts(els);
            }
            TermKind::While { cond, body } => {
                self.walk_term(cond);
                self.walk_stmts(body);
            }
            TermKind::Match { scrutinee, clauses } => {
                self.walk_term(scrutinee);
                for clause in clauses {
                    self.walk_pattern(&clause.pattern);
                    self.walk_stmts(&clause.body);
                }
            }
            TermKind::TryHandle { body, handlers } => {
                self.walk_stmts(body);
                for handler in handlers {
                    self.add_ref(&handler.effect);
                    if let Some(cap) = &handler.capability {
                        self.add_def(cap);
                    }
                    for clause in &handler.clauses {
                        self.add_ref(&clause.op);
                        for p in &clause.vparams {
                            self.add_def(&p.binder);
                        }
                        self.add_def(&clause.resume);
                        self.walk_stmts(&clause.body);
                    }
                }
            }
            TermKind::Region { binder, body } => {
                self.add_def(binder);
                self.walk_stmts(body);
            }
            TermKind::Do { effect, op, vargs } => {
                if let Some(effect) = effect {
                    self.add_ref(effect);
                }
                self.add_ref(op);
                for a in vargs {
                    self.walk_term(a);
                }
            }
            TermKind::Assign { target, value } => {
                self.add_ref(target);
                self.walk_term(value);
            }
            TermKind::BlockLiteral { vparams, bparams, body } => {
                self.walk_params(vparams, bparams);
                self.walk_stmts(body);
            }
            TermKind::Box { body } | TermKind::Unbox { body } => self.walk_term(body),
        }
    }

    fn walk_pattern(&mut self, pattern: &Pattern) {
        match &pattern.kind {
            PatternKind::Any | PatternKind::Literal(_) => {}
            PatternKind::Ident(binder) => self.add_def(binder),
            PatternKind::Tag { ctor, patterns } => {
                self.add_ref(ctor);
                for p in patterns {
                    self.walk_pattern(p);
                }
            }
        }
    }
}

/// The tree and symbol under a position
pub fn symbol_at(
    index: &TreeIndex,
    db: &AnnotationsDb,
    offset: ByteOffset,
) -> Option<(NodeId, SymbolId)> {
    let node = index.at(offset)?;
    let sym = db.get(anns::SYMBOL, node)?;
    Some((node, *sym))
}

/// Where the symbol under a position was defined
pub fn definition(index: &TreeIndex, db: &AnnotationsDb, offset: ByteOffset) -> Option<Span> {
    let (_, sym) = symbol_at(index, db, offset)?;
    let def_node = db.get(anns::DEFINITION_TREE, sym)?;
    index.span_of(*def_node)
}

/// All reference sites of the symbol under a position
pub fn references(
    index: &TreeIndex,
    db: &AnnotationsDb,
    offset: ByteOffset,
    include_declaration: bool,
) -> Vec<Span> {
    let Some((_, sym)) = symbol_at(index, db, offset) else {
        return Vec::new();
    };
    let mut spans = Vec::new();
    if include_declaration {
        if let Some(def_node) = db.get(anns::DEFINITION_TREE, sym) {
            spans.extend(index.span_of(*def_node));
        }
    }
    if let Some(refs) = db.get(anns::REFERENCES, sym) {
        for node in refs {
            spans.extend(index.span_of(*node));
        }
    }
    spans
}

/// The type of the symbol under a position, rendered for display
pub fn hover(
    index: &TreeIndex,
    db: &AnnotationsDb,
    symbols: &Symbols,
    offset: ByteOffset,
) -> Option<String> {
    let (_, sym) = symbol_at(index, db, offset)?;
    let name = symbols.name(sym);
    if let Some(t) = db.get(anns::BLOCK_TYPE, sym) {
        let capture = db
            .get(anns::CAPTURE, sym)
            .map(|c| format!(" at {}", c))
            .unwrap_or_default();
        return Some(format!("{}: {}{}", name, DisplayType { ty: t, symbols }, capture));
    }
    if let Some(t) = db.get(anns::VALUE_TYPE, sym) {
        return Some(format!("{}: {}", name, DisplayType { ty: t, symbols }));
    }
    Some(name.qualified())
}

/// The document outline. Modules map to Class, functions to Method,
/// parameters and binders to Variable; everything else is omitted.
pub fn document_symbols(
    tree: &ModuleTree,
    db: &AnnotationsDb,
    symbols: &Symbols,
) -> Vec<DocumentSymbol> {
    let mut out = vec![DocumentSymbol {
        name: tree.name.qualified(),
        kind: SymbolKind::Class,
        range: tree.span,
        detail: String::new(),
    }];

    for def in &tree.defs {
        let Some(binder) = def.binder() else { continue };
        let Some(sym) = db.get(anns::SYMBOL, binder.id) else { continue };
        let kind = match symbols.kind(*sym) {
            Universe::Term(TermSymbol::Block(BlockSymbol::Function))
            | Universe::Term(TermSymbol::Block(BlockSymbol::ExternFunction)) => SymbolKind::Method,
            Universe::Term(TermSymbol::Value(_)) => SymbolKind::Variable,
            _ => continue,
        };
        let detail = db
            .get(anns::BLOCK_TYPE, *sym)
            .map(|t| format!("{}", DisplayType { ty: t, symbols }))
            .or_else(|| {
                db.get(anns::VALUE_TYPE, *sym)
                    .map(|t| format!("{}", DisplayType { ty: t, symbols }))
            })
            .unwrap_or_default();
        out.push(DocumentSymbol {
            name: binder.name.qualified(),
            kind,
            range: binder.span,
            detail,
        });
    }
    out
}

/// Quick fixes for the position: currently annotating the inferred capture
/// on a function definition
pub fn code_actions(
    index: &TreeIndex,
    db: &AnnotationsDb,
    symbols: &Symbols,
    offset: ByteOffset,
) -> Vec<CodeAction> {
    let Some((node, sym)) = symbol_at(index, db, offset) else {
        return Vec::new();
    };
    let Some(span) = index.span_of(node) else {
        return Vec::new();
    };
    match db.get(anns::CAPTURE, sym) {
        Some(capture) => vec![CodeAction {
            title: format!("annotate inferred capture of '{}'", symbols.name(sym)),
            range: span,
            insertion: format!("{}", capture),
        }],
        None => Vec::new(),
    }
}

/// The `inferredCaptures` command: every symbol with a computed capture,
/// at its definition site
pub fn inferred_captures(
    index: &TreeIndex,
    db: &AnnotationsDb,
    symbols: &Symbols,
) -> Vec<(Span, String)> {
    let mut out = Vec::new();
    for key in db.keys_with(anns::CAPTURE) {
        let Key::Symbol(sym) = key else { continue };
        let Some(def_node) = db.get(anns::DEFINITION_TREE, sym) else { continue };
        let Some(span) = index.span_of(*def_node) else { continue };
        let capture = db.require(anns::CAPTURE, sym);
        out.push((span, format!("{}: {}", symbols.name(sym), capture)));
    }
    out.sort_by_key(|(span, _)| (span.file, span.start));
    out
}
