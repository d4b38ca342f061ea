//! The reference namer
//!
//! Walks a surface module twice: first declaring every top-level binder
//! into the module graph, then resolving references, surface types, and
//! capture annotations. For every defining identifier it records the
//! symbol, its definition site, and its source module; for every reference
//! it records the symbol (or the overload candidates when several are
//! visible) and appends the referring node to the symbol's reference list.

use crate::context::CompilerContext;
use crate::messages::Message;
use mica_annotations::{add_reference, anns, AnnotationStore};
use mica_syntax::tree as surface;
use mica_syntax::{
    Callee, CaptureTree, Definition, IdDef, IdRef, ModuleTree, Name, Pattern, PatternKind, Stmts,
    Term, TermKind, TypeTree, TypeTreeKind, Word,
};
use mica_types::{
    BlockSymbol, BlockType, Capture, CaptureRole, CaptureSet, Effect, ModuleId, SymbolId,
    SymbolKind, TermSymbol, TypeSymbol, ValueSymbol, ValueType,
};
use std::collections::HashMap;
use tracing::debug;

/// Run the namer over one module tree
pub fn name_module(ctx: &mut CompilerContext, tree: &ModuleTree) -> ModuleId {
    debug!(module = %tree.name, "naming module");
    let module = ctx.modules.add_source(tree.name.clone());
    ctx.modules.add_import(module, ctx.builtins.prelude);

    for import in &tree.imports {
        let found = ctx.modules.iter().find(|m| &m.name == import).map(|m| m.id);
        match found {
            Some(id) => ctx.modules.add_import(module, id),
            None => ctx
                .messages
                .error(format!("unknown module '{}'", import.qualified()), Some(tree.span)),
        }
    }

    let mut namer = Namer { ctx, module, values: vec![HashMap::new()], types: vec![HashMap::new()] };
    namer.declare_toplevel(tree);
    namer.resolve_toplevel(tree);
    module
}

struct Namer<'a> {
    ctx: &'a mut CompilerContext,
    module: ModuleId,
    /// Lexical term scopes, innermost last
    values: Vec<HashMap<Word, SymbolId>>,
    /// Lexical type scopes (type parameters), innermost last
    types: Vec<HashMap<Word, SymbolId>>,
}

impl<'a> Namer<'a> {
    // -- bookkeeping --------------------------------------------------------

    fn define(&mut self, binder: &IdDef, kind: SymbolKind) -> SymbolId {
        let sym = self.ctx.symbols.insert(binder.name.clone(), kind);
        self.ctx.db.annotate(anns::SYMBOL, binder.id, sym);
        self.ctx.db.annotate(anns::DEFINITION_TREE, sym, binder.id);
        self.ctx.db.annotate(anns::SOURCE_MODULE, sym, self.module);
        sym
    }

    fn refer(&mut self, reference: &IdRef, sym: SymbolId) {
        self.ctx.db.annotate(anns::SYMBOL, reference.id, sym);
        add_reference(&mut self.ctx.db, sym, reference.id);
    }

    fn bind_value(&mut self, word: Word, sym: SymbolId) {
        self.values.last_mut().expect("scope present").insert(word, sym);
    }

    fn bind_type(&mut self, word: Word, sym: SymbolId) {
        self.types.last_mut().expect("scope present").insert(word, sym);
    }

    fn scoped(&mut self, f: impl FnOnce(&mut Self)) {
        self.values.push(HashMap::new());
        self.types.push(HashMap::new());
        f(self);
        self.types.pop();
        self.values.pop();
    }

    fn local_word(&self, name: &Name) -> Option<Word> {
        if name.is_qualified() {
            None
        } else {
            name.local()
        }
    }

    // -- pass 1: declarations ----------------------------------------------

    fn declare_toplevel(&mut self, tree: &ModuleTree) {
        for def in &tree.defs {
            self.declare_definition(def, true);
        }
    }

    fn declare_definition(&mut self, def: &Definition, toplevel: bool) -> Option<SymbolId> {
        let module_scope = toplevel;
        match def {
            Definition::Fun { binder, .. } | Definition::DefBlock { binder, .. } => {
                let sym =
                    self.define(binder, SymbolKind::Term(TermSymbol::Block(BlockSymbol::Function)));
                self.define_module_term(binder, sym, module_scope);
                Some(sym)
            }
            Definition::Val { binder, .. } => {
                let sym = self.define(
                    binder,
                    SymbolKind::Term(TermSymbol::Value(ValueSymbol::ValBinder)),
                );
                self.define_module_term(binder, sym, module_scope);
                Some(sym)
            }
            Definition::Var { binder, .. } => {
                let sym = self.define(
                    binder,
                    SymbolKind::Term(TermSymbol::Value(ValueSymbol::VarBinder { region: None })),
                );
                self.define_module_term(binder, sym, module_scope);
                Some(sym)
            }
            Definition::ExternDef { binder, .. } => {
                let sym = self.define(
                    binder,
                    SymbolKind::Term(TermSymbol::Block(BlockSymbol::ExternFunction)),
                );
                self.define_module_term(binder, sym, module_scope);
                Some(sym)
            }
            Definition::Data { binder, ctors, .. } => {
                let data = self.define(
                    binder,
                    SymbolKind::Type(TypeSymbol::Data { constructors: vec![] }),
                );
                self.define_module_type(binder, data, module_scope);
                let mut ctor_syms = Vec::with_capacity(ctors.len());
                for ctor in ctors {
                    let sym = self.define(
                        &ctor.binder,
                        SymbolKind::Term(TermSymbol::Block(BlockSymbol::Constructor {
                            datatype: data,
                            arity: ctor.fields.len(),
                        })),
                    );
                    self.define_module_term(&ctor.binder, sym, module_scope);
                    self.ctx.db.annotate(anns::TYPE_OF_CONSTRUCTOR, sym, data);
                    ctor_syms.push(sym);
                }
                self.ctx.symbols.set_data_constructors(data, ctor_syms);
                Some(data)
            }
            Definition::Record { binder, fields, .. } => {
                let rec = self.define(
                    binder,
                    SymbolKind::Type(TypeSymbol::Record {
                        constructor: SymbolId(u32::MAX),
                        fields: vec![],
                    }),
                );
                self.define_module_type(binder, rec, module_scope);
                // The constructor facet is a separate term symbol linked by
                // annotations, not a second universe on the same symbol
                let ctor = self.ctx.symbols.insert(
                    binder.name.clone(),
                    SymbolKind::Term(TermSymbol::Block(BlockSymbol::Constructor {
                        datatype: rec,
                        arity: fields.len(),
                    })),
                );
                self.ctx.db.annotate(anns::SOURCE_MODULE, ctor, self.module);
                self.ctx.db.annotate(anns::DEFINITION_TREE, ctor, binder.id);
                if module_scope {
                    if let Some(word) = self.local_word(&binder.name) {
                        self.ctx.modules.define_term(self.module, word, ctor);
                    }
                }
                self.ctx.db.annotate(anns::CONSTRUCTOR_OF, rec, ctor);
                self.ctx.db.annotate(anns::TYPE_OF_CONSTRUCTOR, ctor, rec);

                let mut field_syms = Vec::with_capacity(fields.len());
                for field in fields {
                    let sym = self.define(
                        &field.binder,
                        SymbolKind::Term(TermSymbol::Block(BlockSymbol::Field { owner: rec })),
                    );
                    self.define_module_term(&field.binder, sym, module_scope);
                    field_syms.push(sym);
                }
                self.ctx.symbols.set_record_parts(rec, ctor, field_syms);
                Some(rec)
            }
            Definition::Effect { binder, ops, .. } => {
                let effect = self.define(
                    binder,
                    SymbolKind::Type(TypeSymbol::Effect { operations: vec![], builtin: false }),
                );
                self.define_module_type(binder, effect, module_scope);
                let op_syms = self.declare_operations(effect, ops);
                self.ctx.symbols.set_operations(effect, op_syms);
                Some(effect)
            }
            Definition::Interface { binder, ops, .. } => {
                let interface = self.define(
                    binder,
                    SymbolKind::Type(TypeSymbol::Interface { operations: vec![] }),
                );
                self.define_module_type(binder, interface, module_scope);
                let op_syms = self.declare_operations(interface, ops);
                self.ctx.symbols.set_operations(interface, op_syms);
                Some(interface)
            }
            Definition::TypeAlias { binder, .. } => {
                let alias = self.define(
                    binder,
                    SymbolKind::Type(TypeSymbol::Alias {
                        params: vec![],
                        body: ValueType::unit(),
                    }),
                );
                self.define_module_type(binder, alias, module_scope);
                Some(alias)
            }
            Definition::EffectAlias { binder, .. } => {
                let alias = self.define(
                    binder,
                    SymbolKind::Type(TypeSymbol::EffectAlias {
                        params: vec![],
                        effects: mica_types::Effects::empty(),
                    }),
                );
                self.define_module_type(binder, alias, module_scope);
                Some(alias)
            }
            Definition::ExternInclude { .. } => None,
        }
    }

    fn declare_operations(
        &mut self,
        owner: SymbolId,
        ops: &[surface::OperationDef],
    ) -> Vec<SymbolId> {
        let mut syms = Vec::with_capacity(ops.len());
        for op in ops {
            let sym = self.define(
                &op.binder,
                SymbolKind::Term(TermSymbol::Block(BlockSymbol::Method { owner })),
            );
            self.define_module_term(&op.binder, sym, true);
            syms.push(sym);
        }
        syms
    }

    fn define_module_term(&mut self, binder: &IdDef, sym: SymbolId, module_scope: bool) {
        if !module_scope {
            return;
        }
        if let Some(word) = self.local_word(&binder.name) {
            self.ctx.modules.define_term(self.module, word, sym);
        }
    }

    fn define_module_type(&mut self, binder: &IdDef, sym: SymbolId, module_scope: bool) {
        if !module_scope {
            return;
        }
        if let Some(word) = self.local_word(&binder.name) {
            if let Some(previous) = self.ctx.modules.define_type(self.module, word, sym) {
                let _ = previous;
                self.ctx.messages.report(Message::error(
                    format!("the type name '{}' is already defined", binder.name),
                    Some(binder.span),
                ));
            }
        }
    }

    // -- pass 2: resolution -------------------------------------------------

    fn resolve_toplevel(&mut self, tree: &ModuleTree) {
        for def in &tree.defs {
            self.resolve_definition(def);
        }
    }

    fn resolve_definition(&mut self, def: &Definition) {
        match def {
            Definition::Fun { tparams, vparams, bparams, ret, effects, body, .. } => {
                self.scoped(|me| {
                    me.declare_type_params(tparams);
                    me.declare_params(vparams, bparams);
                    if let Some(ret) = ret {
                        me.resolve_value_type(ret);
                    }
                    for e in effects {
                        me.resolve_effect_ref(e);
                    }
                    me.resolve_stmts(body);
                });
            }
            Definition::DefBlock { rhs, .. } => self.resolve_term(rhs),
            Definition::Val { binding, .. } => self.resolve_term(binding),
            Definition::Var { region, init, .. } => {
                if let Some(region) = region {
                    self.resolve_value_ref(region);
                }
                self.resolve_term(init);
            }
            Definition::Data { tparams, ctors, .. } => {
                self.scoped(|me| {
                    me.declare_type_params(tparams);
                    for ctor in ctors {
                        for field in &ctor.fields {
                            me.resolve_value_type(field);
                        }
                    }
                });
            }
            Definition::Record { tparams, fields, .. } => {
                self.scoped(|me| {
                    me.declare_type_params(tparams);
                    for field in fields {
                        me.resolve_value_type(&field.tpe);
                    }
                });
            }
            Definition::Effect { tparams, ops, .. }
            | Definition::Interface { tparams, ops, .. } => {
                self.scoped(|me| {
                    me.declare_type_params(tparams);
                    for op in ops {
                        me.scoped(|me| {
                            me.declare_type_params(&op.tparams);
                            for p in &op.vparams {
                                if let Some(tpe) = &p.tpe {
                                    me.resolve_value_type(tpe);
                                }
                            }
                            if let Some(ret) = &op.ret {
                                me.resolve_value_type(ret);
                            }
                        });
                    }
                });
            }
            Definition::TypeAlias { binder, tparams, body, .. } => {
                let alias = *self.ctx.db.require(anns::SYMBOL, binder.id);
                let mut param_syms = Vec::new();
                self.scoped(|me| {
                    me.declare_type_params(tparams);
                    for p in tparams {
                        param_syms.push(*me.ctx.db.require(anns::SYMBOL, p.id));
                    }
                    if let Some(resolved) = me.resolve_value_type(body) {
                        me.ctx.symbols.set_alias_body(alias, resolved);
                    }
                });
                self.ctx.symbols.set_alias_params(alias, param_syms);
            }
            Definition::EffectAlias { binder, effects, .. } => {
                let alias = *self.ctx.db.require(anns::SYMBOL, binder.id);
                let members: Vec<Effect> =
                    effects.iter().filter_map(|e| self.resolve_effect_ref(e)).collect();
                let row = mica_types::Effects::of(members, &self.ctx.symbols);
                self.ctx.symbols.set_effect_alias_row(alias, row);
            }
            Definition::ExternDef { capture, tparams, vparams, bparams, ret, .. } => {
                self.scoped(|me| {
                    me.declare_type_params(tparams);
                    me.declare_params(vparams, bparams);
                    me.resolve_capture_tree(capture);
                    if let Some(ret) = ret {
                        me.resolve_value_type(ret);
                    }
                });
            }
            Definition::ExternInclude { .. } => {}
        }
    }

    fn declare_type_params(&mut self, tparams: &[IdDef]) {
        for p in tparams {
            let sym = self.define(p, SymbolKind::Type(TypeSymbol::TypeVar { rigid: true }));
            if let Some(word) = self.local_word(&p.name) {
                self.bind_type(word, sym);
            }
        }
    }

    fn declare_params(
        &mut self,
        vparams: &[surface::ParamDef],
        bparams: &[surface::BlockParamDef],
    ) {
        for p in vparams {
            let sym =
                self.define(&p.binder, SymbolKind::Term(TermSymbol::Value(ValueSymbol::Param)));
            if let Some(word) = self.local_word(&p.binder.name) {
                self.bind_value(word, sym);
            }
            if let Some(tpe) = &p.tpe {
                self.resolve_value_type(tpe);
            }
        }
        for p in bparams {
            let sym = self
                .define(&p.binder, SymbolKind::Term(TermSymbol::Block(BlockSymbol::BlockParam)));
            if let Some(word) = self.local_word(&p.binder.name) {
                self.bind_value(word, sym);
            }
            self.resolve_block_type(&p.tpe);
        }
    }

    // -- statements and terms -----------------------------------------------

    fn resolve_stmts(&mut self, stmts: &Stmts) {
        self.scoped(|me| {
            for stmt in &stmts.stmts {
                match stmt {
                    surface::Stmt::Expr(t) | surface::Stmt::Return(t) => me.resolve_term(t),
                    surface::Stmt::Def(def) => {
                        // Local definitions are visible to the following
                        // statements
                        if let Some(sym) = me.declare_definition(def, false) {
                            if let Some(binder) = def.binder() {
                                if let Some(word) = me.local_word(&binder.name) {
                                    if me.ctx.symbols.is_term(sym) {
                                        me.bind_value(word, sym);
                                    }
                                }
                            }
                        }
                        me.resolve_definition(def);
                    }
                }
            }
        });
    }

    fn resolve_term(&mut self, term: &Term) {
        match &term.kind {
            TermKind::Literal(_) | TermKind::Hole => {}
            TermKind::Var(id) => self.resolve_value_ref(id),
            TermKind::Call { callee, targs, vargs, bargs } => {
                match callee {
                    Callee::Id(id) => self.resolve_term_ref(id),
                    Callee::Method { receiver, method } => {
                        self.resolve_term(receiver);
                        self.resolve_term_ref(method);
                    }
                    Callee::Expr(e) => self.resolve_term(e),
                }
                for t in targs {
                    self.resolve_value_type(t);
                }
                for a in vargs {
                    self.resolve_term(a);
                }
                for b in bargs {
                    self.resolve_term(b);
                }
            }
            TermKind::If { cond, thn, els } => {
                self.resolve_term(cond);
                self.resolve_stmts(thn);
                self.resolve_stmts(els);
            }
            TermKind::While { cond, body } => {
                self.resolve_term(cond);
                self.resolve_stmts(body);
            }
            TermKind::Match { scrutinee, clauses } => {
                self.resolve_term(scrutinee);
                for clause in clauses {
                    self.scoped(|me| {
                        me.declare_pattern(&clause.pattern);
                        me.resolve_stmts(&clause.body);
                    });
                }
            }
            TermKind::TryHandle { body, handlers } => {
                for handler in handlers {
                    self.resolve_handler(handler);
                }
                self.scoped(|me| {
                    for handler in handlers {
                        if let Some(binder) = &handler.capability {
                            let sym = *me.ctx.db.require(anns::SYMBOL, binder.id);
                            if let Some(word) = me.local_word(&binder.name) {
                                me.bind_value(word, sym);
                            }
                        }
                    }
                    me.resolve_stmts(body);
                });
            }
            TermKind::Region { binder, body } => {
                let sym = self.define(
                    binder,
                    SymbolKind::Term(TermSymbol::Block(BlockSymbol::Capability {
                        effect: None,
                        role: CaptureRole::Region,
                    })),
                );
                self.scoped(|me| {
                    if let Some(word) = me.local_word(&binder.name) {
                        me.bind_value(word, sym);
                    }
                    me.resolve_stmts(body);
                });
            }
            TermKind::Do { effect, op, vargs } => {
                if let Some(effect) = effect {
                    self.resolve_type_ref(effect);
                }
                self.resolve_term_ref(op);
                for a in vargs {
                    self.resolve_term(a);
                }
            }
            TermKind::Assign { target, value } => {
                self.resolve_value_ref(target);
                self.resolve_term(value);
            }
            TermKind::BlockLiteral { vparams, bparams, body } => {
                self.scoped(|me| {
                    me.declare_params(vparams, bparams);
                    me.resolve_stmts(body);
                });
            }
            TermKind::Box { body } | TermKind::Unbox { body } => self.resolve_term(body),
        }
    }

    fn resolve_handler(&mut self, handler: &surface::HandlerTree) {
        let Some(effect) = self.resolve_type_ref(&handler.effect) else {
            return;
        };

        // The capability the handler introduces: either the named binder or
        // an implicit one recorded on the handler node itself
        let kind = SymbolKind::Term(TermSymbol::Block(BlockSymbol::Capability {
            effect: Some(effect),
            role: CaptureRole::Control,
        }));
        match &handler.capability {
            Some(binder) => {
                self.define(binder, kind);
            }
            None => {
                let name = self.ctx.symbols.name(effect).clone();
                let sym = self.ctx.symbols.insert(name, kind);
                self.ctx.db.annotate(anns::SYMBOL, handler.id, sym);
                self.ctx.db.annotate(anns::SOURCE_MODULE, sym, self.module);
            }
        }

        let operations = self.ctx.symbols.operations_of(effect).to_vec();
        for clause in &handler.clauses {
            // Operation names resolve inside the handled effect
            let op_sym = operations.iter().copied().find(|op| {
                clause.op.name.local().map(|w| &Name::Word(w) == self.ctx.symbols.name(*op))
                    == Some(true)
            });
            match op_sym {
                Some(op) => self.refer(&clause.op, op),
                None => {
                    self.ctx.messages.error(
                        format!(
                            "'{}' is not an operation of effect '{}'",
                            clause.op.name,
                            self.ctx.symbols.name(effect)
                        ),
                        Some(clause.op.span),
                    );
                    continue;
                }
            }

            self.scoped(|me| {
                me.declare_params(&clause.vparams, &[]);
                let resume = me.define(
                    &clause.resume,
                    SymbolKind::Term(TermSymbol::Block(BlockSymbol::ResumeParam)),
                );
                if let Some(word) = me.local_word(&clause.resume.name) {
                    me.bind_value(word, resume);
                }
                me.resolve_stmts(&clause.body);
            });
        }
    }

    fn declare_pattern(&mut self, pattern: &Pattern) {
        match &pattern.kind {
            PatternKind::Any | PatternKind::Literal(_) => {}
            PatternKind::Ident(binder) => {
                let sym = self
                    .define(binder, SymbolKind::Term(TermSymbol::Value(ValueSymbol::ValBinder)));
                if let Some(word) = self.local_word(&binder.name) {
                    self.bind_value(word, sym);
                }
            }
            PatternKind::Tag { ctor, patterns } => {
                self.resolve_term_ref(ctor);
                for p in patterns {
                    self.declare_pattern(p);
                }
            }
        }
    }

    // -- reference resolution -----------------------------------------------

    fn lookup_scoped_value(&self, name: &Name) -> Option<SymbolId> {
        let word = self.local_word(name)?;
        for scope in self.values.iter().rev() {
            if let Some(&sym) = scope.get(&word) {
                return Some(sym);
            }
        }
        None
    }

    /// Resolve a term reference in value position: a unique symbol is
    /// required
    fn resolve_value_ref(&mut self, id: &IdRef) {
        if let Some(sym) = self.lookup_scoped_value(&id.name) {
            self.refer(id, sym);
            return;
        }
        let candidates = self.ctx.modules.resolve_terms(self.module, &id.name);
        match candidates.as_slice() {
            [] => self
                .ctx
                .messages
                .error(format!("unknown name '{}'", id.name), Some(id.span)),
            [sym] => self.refer(id, *sym),
            _ => {
                // Several overloads in value position: the typer picks
                self.ctx.db.annotate(anns::CANDIDATES, id.id, candidates);
            }
        }
    }

    /// Resolve a term reference in call position: overloads are allowed and
    /// recorded for the typer
    fn resolve_term_ref(&mut self, id: &IdRef) {
        if let Some(sym) = self.lookup_scoped_value(&id.name) {
            self.refer(id, sym);
            return;
        }
        let candidates = self.ctx.modules.resolve_terms(self.module, &id.name);
        match candidates.as_slice() {
            [] => self
                .ctx
                .messages
                .error(format!("unknown name '{}'", id.name), Some(id.span)),
            [sym] => self.refer(id, *sym),
            _ => self.ctx.db.annotate(anns::CANDIDATES, id.id, candidates),
        }
    }

    fn lookup_scoped_type(&self, name: &Name) -> Option<SymbolId> {
        let word = self.local_word(name)?;
        for scope in self.types.iter().rev() {
            if let Some(&sym) = scope.get(&word) {
                return Some(sym);
            }
        }
        None
    }

    fn resolve_type_ref(&mut self, id: &IdRef) -> Option<SymbolId> {
        let sym = self
            .lookup_scoped_type(&id.name)
            .or_else(|| self.ctx.modules.resolve_type(self.module, &id.name));
        match sym {
            Some(sym) => {
                self.refer(id, sym);
                Some(sym)
            }
            None => {
                self.ctx
                    .messages
                    .error(format!("unknown type '{}'", id.name), Some(id.span));
                None
            }
        }
    }

    fn resolve_effect_ref(&mut self, id: &IdRef) -> Option<Effect> {
        self.resolve_type_ref(id).map(Effect::Named)
    }

    // -- types and captures -------------------------------------------------

    /// Resolve a surface type in value position, writing `RESOLVED_TYPE`
    fn resolve_value_type(&mut self, tree: &TypeTree) -> Option<ValueType> {
        let resolved = match &tree.kind {
            TypeTreeKind::Ref(id) => {
                let sym = self.resolve_type_ref(id)?;
                Some(self.type_symbol_to_value_type(sym))
            }
            TypeTreeKind::App(id, args) => {
                let sym = self.resolve_type_ref(id)?;
                let args: Vec<ValueType> =
                    args.iter().filter_map(|a| self.resolve_value_type(a)).collect();
                Some(ValueType::App { constructor: sym, args })
            }
            TypeTreeKind::Boxed { block, capture } => {
                let block = self.resolve_block_type(block)?;
                let capture = self.resolve_capture_tree(capture);
                Some(ValueType::Boxed { block: Box::new(block), capture })
            }
            TypeTreeKind::Fun { .. } => {
                // A bare function type in value position is a boxed block
                // with an empty capture
                let block = self.resolve_block_type(tree)?;
                Some(ValueType::Boxed { block: Box::new(block), capture: CaptureSet::empty() })
            }
        };
        if let Some(t) = &resolved {
            self.ctx.db.annotate(anns::RESOLVED_TYPE, tree.id, t.clone());
        }
        resolved
    }

    fn type_symbol_to_value_type(&self, sym: SymbolId) -> ValueType {
        match self.ctx.symbols.as_type(sym) {
            Some(TypeSymbol::Builtin(b)) => ValueType::Builtin(*b),
            Some(TypeSymbol::TypeVar { .. }) => ValueType::Var(sym),
            _ => ValueType::reference(sym),
        }
    }

    /// Resolve a surface type in block position, writing
    /// `RESOLVED_BLOCK_TYPE`
    fn resolve_block_type(&mut self, tree: &TypeTree) -> Option<BlockType> {
        let resolved = match &tree.kind {
            TypeTreeKind::Fun { vparams, bparams, ret, effects } => {
                let vparams: Vec<ValueType> =
                    vparams.iter().filter_map(|t| self.resolve_value_type(t)).collect();
                let bparams: Vec<BlockType> =
                    bparams.iter().filter_map(|t| self.resolve_block_type(t)).collect();
                let ret = self.resolve_value_type(ret)?;
                let members: Vec<Effect> =
                    effects.iter().filter_map(|e| self.resolve_effect_ref(e)).collect();
                let effects = mica_types::Effects::of(members, &self.ctx.symbols);
                let mut sections = vec![mica_types::ParamSection::Values(vparams)];
                if !bparams.is_empty() {
                    sections.push(mica_types::ParamSection::Blocks(bparams));
                }
                Some(BlockType::Function { tparams: vec![], sections, ret, effects })
            }
            TypeTreeKind::Ref(id) => {
                let sym = self.resolve_type_ref(id)?;
                Some(BlockType::Interface { interface: sym, targs: vec![] })
            }
            TypeTreeKind::App(id, args) => {
                let sym = self.resolve_type_ref(id)?;
                let targs: Vec<ValueType> =
                    args.iter().filter_map(|a| self.resolve_value_type(a)).collect();
                Some(BlockType::Interface { interface: sym, targs })
            }
            TypeTreeKind::Boxed { .. } => None,
        };
        if let Some(t) = &resolved {
            self.ctx.db.annotate(anns::RESOLVED_BLOCK_TYPE, tree.id, t.clone());
        }
        resolved
    }

    /// Resolve a surface capture set, writing `RESOLVED_CAPTURE`
    fn resolve_capture_tree(&mut self, tree: &CaptureTree) -> CaptureSet {
        let mut set = CaptureSet::empty();
        for r in &tree.refs {
            let sym = self
                .lookup_scoped_value(&r.name)
                .or_else(|| {
                    let candidates = self.ctx.modules.resolve_terms(self.module, &r.name);
                    candidates.first().copied()
                });
            match sym {
                Some(sym) => {
                    self.refer(r, sym);
                    let role = match self.ctx.symbols.as_block(sym) {
                        Some(BlockSymbol::Capability { role, .. }) => *role,
                        _ => CaptureRole::Resource,
                    };
                    set.insert(Capture::new(sym, role));
                }
                None => self
                    .ctx
                    .messages
                    .error(format!("unknown capability '{}'", r.name), Some(r.span)),
            }
        }
        self.ctx.db.annotate(anns::RESOLVED_CAPTURE, tree.id, set.clone());
        set
    }
}
