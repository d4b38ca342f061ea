//! The reference typer
//!
//! Signature-driven checking: declared parameter and return types flow
//! through the tree, captures are computed bottom-up, and every term node
//! receives exactly one of an inferred value type or an inferred block
//! type, plus its capture set and effect row. All writes go through a
//! local overlay; the overlay commits into the global store only when the
//! module checks out. Overload resolution clones the overlay per candidate
//! and keeps the winner's.

use crate::context::CompilerContext;
use crate::messages::{Message, MessageBuffer};
use mica_annotations::{annotate_block_type, annotate_value_type, anns, Annotations, AnnotationStore};
use mica_syntax::tree as surface;
use mica_syntax::{
    Callee, Definition, IdRef, Literal, ModuleTree, NodeId, Pattern, PatternKind, Span, Stmts,
    Term, TermKind,
};
use mica_types::{
    BlockSymbol, BlockType, Capture, CaptureRole, CaptureSet, DisplayType, Effect, Effects,
    ParamSection, SymbolId, SymbolKind, TermSymbol, TypeSymbol, ValueSymbol, ValueType,
};
use std::collections::HashMap;
use tracing::debug;

/// Check one named module; returns whether the overlay was committed.
pub fn type_module(ctx: &mut CompilerContext, tree: &ModuleTree) -> bool {
    debug!(module = %tree.name, "typing module");
    let mut typer = Typer {
        ctx,
        local: Annotations::new(),
        errors: MessageBuffer::new(),
        op_sigs: HashMap::new(),
        ctor_fields: HashMap::new(),
    };
    typer.collect_signatures(tree);
    typer.check_bodies(tree);

    let Typer { ctx, local, errors, .. } = typer;
    let ok = !errors.has_errors();
    ctx.messages.absorb(errors);
    if ok {
        local.commit(&mut ctx.db);
    }
    ok
}

#[derive(Debug, Clone)]
struct OpSig {
    params: Vec<ValueType>,
    ret: ValueType,
    owner: SymbolId,
}

/// What checking a term yields
#[derive(Debug, Clone)]
enum Ty {
    V(ValueType),
    B(BlockType),
}

#[derive(Debug, Clone)]
struct Checked {
    ty: Ty,
    capture: CaptureSet,
    effects: Effects,
}

impl Checked {
    fn value(ty: ValueType) -> Checked {
        Checked { ty: Ty::V(ty), capture: CaptureSet::empty(), effects: Effects::empty() }
    }
}

struct Typer<'a> {
    ctx: &'a mut CompilerContext,
    local: Annotations,
    errors: MessageBuffer,
    op_sigs: HashMap<SymbolId, OpSig>,
    ctor_fields: HashMap<SymbolId, Vec<ValueType>>,
}

impl<'a> Typer<'a> {
    // -- small helpers ------------------------------------------------------

    fn symbol_of(&self, node: NodeId) -> Option<SymbolId> {
        self.local.get(anns::SYMBOL, node).or_else(|| self.ctx.db.get(anns::SYMBOL, node)).copied()
    }

    fn resolved_type(&mut self, tree: &surface::TypeTree, span: Span) -> ValueType {
        match self.ctx.db.get(anns::RESOLVED_TYPE, tree.id) {
            Some(t) => t.clone(),
            None => {
                self.errors.error("this type did not resolve", Some(span));
                ValueType::unit()
            }
        }
    }

    fn declared_or_unit(&mut self, tpe: &Option<surface::TypeTree>, span: Span) -> ValueType {
        match tpe {
            Some(t) => self.resolved_type(t, span),
            None => ValueType::unit(),
        }
    }

    fn value_type_of(&self, sym: SymbolId) -> Option<ValueType> {
        self.local
            .get(anns::VALUE_TYPE, sym)
            .or_else(|| self.ctx.db.get(anns::VALUE_TYPE, sym))
            .cloned()
    }

    fn block_type_of(&self, sym: SymbolId) -> Option<BlockType> {
        self.local
            .get(anns::BLOCK_TYPE, sym)
            .or_else(|| self.ctx.db.get(anns::BLOCK_TYPE, sym))
            .cloned()
    }

    fn capture_of_symbol(&self, sym: SymbolId) -> CaptureSet {
        self.local
            .get(anns::CAPTURE, sym)
            .or_else(|| self.ctx.db.get(anns::CAPTURE, sym))
            .cloned()
            .unwrap_or_default()
    }

    fn qualified_name(&self, sym: SymbolId) -> String {
        let module = self.ctx.db.get(anns::SOURCE_MODULE, sym);
        let name = self.ctx.symbols.name(sym);
        match module {
            Some(m) => format!("{}.{}", self.ctx.modules.get(*m).name, name),
            None => name.qualified(),
        }
    }

    fn show_value_type(&self, t: &ValueType) -> String {
        format!("{}", DisplayType { ty: t, symbols: &self.ctx.symbols })
    }

    fn show_block_type(&self, t: &BlockType) -> String {
        format!("{}", DisplayType { ty: t, symbols: &self.ctx.symbols })
    }

    /// Structural compatibility modulo aliases; non-rigid type variables
    /// match anything.
    fn compatible(&self, expected: &ValueType, found: &ValueType) -> bool {
        let expected = expected.dealias(&self.ctx.symbols);
        let found = found.dealias(&self.ctx.symbols);
        self.compatible_dealiased(&expected, &found)
    }

    fn compatible_dealiased(&self, expected: &ValueType, found: &ValueType) -> bool {
        let flexible = |v: &ValueType| match v {
            ValueType::Var(sym) => !matches!(
                self.ctx.symbols.as_type(*sym),
                Some(TypeSymbol::TypeVar { rigid: true })
            ),
            _ => false,
        };
        if flexible(expected) || flexible(found) {
            return true;
        }
        match (expected, found) {
            (ValueType::App { constructor: a, args: xs }, ValueType::App { constructor: b, args: ys }) => {
                a == b
                    && xs.len() == ys.len()
                    && xs.iter().zip(ys).all(|(x, y)| self.compatible_dealiased(x, y))
            }
            _ => expected == found,
        }
    }

    // -- signature collection ----------------------------------------------

    fn collect_signatures(&mut self, tree: &ModuleTree) {
        for def in &tree.defs {
            self.collect_signature(def);
        }
    }

    fn collect_signature(&mut self, def: &Definition) {
        match def {
            Definition::Fun { binder, tparams, vparams, bparams, ret, effects, span, .. } => {
                let Some(sym) = self.symbol_of(binder.id) else { return };
                let tparams: Vec<SymbolId> =
                    tparams.iter().filter_map(|p| self.symbol_of(p.id)).collect();
                let vtypes = self.param_types(vparams, *span);
                let btypes = self.block_param_types(bparams, *span);
                let ret = self.declared_or_unit(ret, *span);
                let row = self.effect_row(effects);

                let mut sections = vec![ParamSection::Values(vtypes)];
                if !btypes.is_empty() {
                    sections.push(ParamSection::Blocks(btypes));
                }
                let tpe = BlockType::Function { tparams, sections, ret, effects: row };
                annotate_block_type(&mut self.local, &self.ctx.symbols, sym, tpe);
            }
            Definition::ExternDef { binder, capture, vparams, bparams, ret, span, .. } => {
                let Some(sym) = self.symbol_of(binder.id) else { return };
                let vtypes = self.param_types(vparams, *span);
                let btypes = self.block_param_types(bparams, *span);
                let ret = self.declared_or_unit(ret, *span);
                let mut sections = vec![ParamSection::Values(vtypes)];
                if !btypes.is_empty() {
                    sections.push(ParamSection::Blocks(btypes));
                }
                let tpe = BlockType::Function {
                    tparams: vec![],
                    sections,
                    ret,
                    effects: Effects::empty(),
                };
                annotate_block_type(&mut self.local, &self.ctx.symbols, sym, tpe);

                // The declared capture decides pure vs direct-style calls
                let declared = self
                    .ctx
                    .db
                    .get(anns::RESOLVED_CAPTURE, capture.id)
                    .cloned()
                    .unwrap_or_default();
                self.local.annotate(anns::CAPTURE, sym, declared);
            }
            Definition::Data { binder, ctors, span, .. } => {
                let Some(data) = self.symbol_of(binder.id) else { return };
                for ctor in ctors {
                    let Some(csym) = self.symbol_of(ctor.binder.id) else { continue };
                    let fields: Vec<ValueType> =
                        ctor.fields.iter().map(|f| self.resolved_type(f, *span)).collect();
                    let tpe = BlockType::function(
                        fields.clone(),
                        ValueType::reference(data),
                        Effects::empty(),
                    );
                    annotate_block_type(&mut self.local, &self.ctx.symbols, csym, tpe);
                    self.ctor_fields.insert(csym, fields);
                }
            }
            Definition::Record { binder, fields, span, .. } => {
                let Some(rec) = self.symbol_of(binder.id) else { return };
                let field_types: Vec<ValueType> =
                    fields.iter().map(|f| self.resolved_type(&f.tpe, *span)).collect();
                if let Some(TypeSymbol::Record { constructor, fields: accessors }) =
                    self.ctx.symbols.as_type(rec).cloned()
                {
                    let tpe = BlockType::function(
                        field_types.clone(),
                        ValueType::reference(rec),
                        Effects::empty(),
                    );
                    annotate_block_type(&mut self.local, &self.ctx.symbols, constructor, tpe);
                    self.ctor_fields.insert(constructor, field_types.clone());
                    for (accessor, tpe) in accessors.iter().zip(field_types) {
                        let getter = BlockType::function(
                            vec![ValueType::reference(rec)],
                            tpe,
                            Effects::empty(),
                        );
                        annotate_block_type(&mut self.local, &self.ctx.symbols, *accessor, getter);
                    }
                }
            }
            Definition::Effect { binder, ops, span, .. }
            | Definition::Interface { binder, ops, span, .. } => {
                let Some(owner) = self.symbol_of(binder.id) else { return };
                let is_effect = matches!(def, Definition::Effect { .. });
                for op in ops {
                    let Some(osym) = self.symbol_of(op.binder.id) else { continue };
                    let params: Vec<ValueType> = op
                        .vparams
                        .iter()
                        .map(|p| match &p.tpe {
                            Some(t) => self.resolved_type(t, *span),
                            None => ValueType::unit(),
                        })
                        .collect();
                    let ret = self.declared_or_unit(&op.ret, *span);
                    // Operations of a user effect carry their effect in the
                    // row; interface operations do not. The asymmetry is
                    // deliberate and load-bearing for capability passing.
                    let row = if is_effect {
                        Effects::of([Effect::Named(owner)], &self.ctx.symbols)
                    } else {
                        Effects::empty()
                    };
                    let tpe = BlockType::function(params.clone(), ret.clone(), row);
                    annotate_block_type(&mut self.local, &self.ctx.symbols, osym, tpe);
                    self.op_sigs.insert(osym, OpSig { params, ret, owner });
                }
            }
            _ => {}
        }
    }

    fn param_types(&mut self, vparams: &[surface::ParamDef], span: Span) -> Vec<ValueType> {
        let mut out = Vec::with_capacity(vparams.len());
        for p in vparams {
            let t = match &p.tpe {
                Some(t) => self.resolved_type(t, span),
                None => {
                    self.errors.error(
                        format!("the parameter '{}' needs a type annotation", p.binder.name),
                        Some(p.binder.span),
                    );
                    ValueType::unit()
                }
            };
            if let Some(sym) = self.symbol_of(p.binder.id) {
                annotate_value_type(&mut self.local, &self.ctx.symbols, sym, t.clone());
            }
            out.push(t);
        }
        out
    }

    fn block_param_types(
        &mut self,
        bparams: &[surface::BlockParamDef],
        span: Span,
    ) -> Vec<BlockType> {
        let mut out = Vec::with_capacity(bparams.len());
        for p in bparams {
            let t = match self.ctx.db.get(anns::RESOLVED_BLOCK_TYPE, p.tpe.id) {
                Some(t) => t.clone(),
                None => {
                    self.errors.error(
                        format!("the block parameter '{}' needs a block type", p.binder.name),
                        Some(span),
                    );
                    BlockType::function(vec![], ValueType::unit(), Effects::empty())
                }
            };
            if let Some(sym) = self.symbol_of(p.binder.id) {
                annotate_block_type(&mut self.local, &self.ctx.symbols, sym, t.clone());
            }
            out.push(t);
        }
        out
    }

    fn effect_row(&mut self, refs: &[IdRef]) -> Effects {
        let members: Vec<Effect> = refs
            .iter()
            .filter_map(|r| self.symbol_of(r.id))
            .map(Effect::Named)
            .collect();
        Effects::of(members, &self.ctx.symbols)
    }

    // -- bodies -------------------------------------------------------------

    fn check_bodies(&mut self, tree: &ModuleTree) {
        for def in &tree.defs {
            self.check_definition(def);
        }
    }

    fn check_definition(&mut self, def: &Definition) {
        match def {
            Definition::Fun { binder, bparams, body, .. } => {
                let Some(sym) = self.symbol_of(binder.id) else { return };
                let result = self.check_stmts(body);

                // A function's capture is its body's, minus its own block
                // parameters
                let mut capture = result.capture;
                for p in bparams {
                    if let Some(psym) = self.symbol_of(p.binder.id) {
                        capture = capture
                            .difference(&CaptureSet::singleton(Capture::new(psym, CaptureRole::Control)));
                    }
                }
                self.local.annotate(anns::CAPTURE, sym, capture);
            }
            Definition::DefBlock { binder, rhs, .. } => {
                let Some(sym) = self.symbol_of(binder.id) else { return };
                let checked = self.check_term(rhs);
                if let Ty::B(tpe) = checked.ty {
                    if self.block_type_of(sym).is_none() {
                        annotate_block_type(&mut self.local, &self.ctx.symbols, sym, tpe);
                    }
                }
                self.local.annotate(anns::CAPTURE, sym, checked.capture);
            }
            Definition::Val { binder, binding, .. } => {
                let Some(sym) = self.symbol_of(binder.id) else { return };
                let checked = self.check_term(binding);
                if let Ty::V(tpe) = checked.ty {
                    annotate_value_type(&mut self.local, &self.ctx.symbols, sym, tpe);
                }
            }
            Definition::Var { binder, init, .. } => {
                let Some(sym) = self.symbol_of(binder.id) else { return };
                let checked = self.check_term(init);
                if let Ty::V(tpe) = checked.ty {
                    annotate_value_type(&mut self.local, &self.ctx.symbols, sym, tpe);
                }
            }
            _ => {}
        }
    }

    fn check_stmts(&mut self, stmts: &Stmts) -> Checked {
        let mut capture = CaptureSet::empty();
        let mut effects = Effects::empty();
        let mut last = Checked::value(ValueType::unit());

        for stmt in &stmts.stmts {
            match stmt {
                surface::Stmt::Expr(t) | surface::Stmt::Return(t) => {
                    let checked = self.check_term(t);
                    capture = capture.union(&checked.capture);
                    effects = effects.union(&checked.effects);
                    last = checked;
                }
                surface::Stmt::Def(def) => {
                    self.collect_signature(def);
                    self.check_definition(def);
                    // Definition right-hand sides contribute their capture
                    let contributed = match def {
                        Definition::Val { binding, .. } => Some(binding),
                        Definition::Var { init, .. } => Some(init),
                        _ => None,
                    };
                    if let Some(term) = contributed {
                        if let Some(c) = self.local.get(anns::INFERRED_CAPTURE, term.id) {
                            capture = capture.union(&c.clone());
                        }
                    }
                    last = Checked::value(ValueType::unit());
                }
            }
        }

        Checked { ty: last.ty, capture, effects }
    }

    fn check_term(&mut self, term: &Term) -> Checked {
        let checked = self.infer_term(term);

        // Exactly one of the two inferred type annotations per tree
        match &checked.ty {
            Ty::V(t) => self.local.annotate(anns::INFERRED_VALUE_TYPE, term.id, t.clone()),
            Ty::B(t) => self.local.annotate(anns::INFERRED_BLOCK_TYPE, term.id, t.clone()),
        }
        self.local.annotate(anns::INFERRED_CAPTURE, term.id, checked.capture.clone());
        self.local.annotate(anns::INFERRED_EFFECTS, term.id, checked.effects.clone());
        checked
    }

    fn infer_term(&mut self, term: &Term) -> Checked {
        match &term.kind {
            TermKind::Literal(lit) => Checked::value(literal_type(lit)),

            TermKind::Var(id) => self.infer_var(id, term.span),

            TermKind::Call { callee, targs, vargs, bargs } => {
                self.infer_call(term, callee, targs, vargs, bargs)
            }

            TermKind::If { cond, thn, els } => {
                let cond = self.check_term(cond);
                if let Ty::V(t) = &cond.ty {
                    if !self.compatible(&ValueType::bool(), t) {
                        self.errors.error(
                            format!("the condition must be Bool, not {}", self.show_value_type(t)),
                            Some(term.span),
                        );
                    }
                }
                let thn = self.check_stmts(thn);
                let els = self.check_stmts(els);
                Checked {
                    ty: thn.ty,
                    capture: cond.capture.union(&thn.capture).union(&els.capture),
                    effects: cond.effects.union(&thn.effects).union(&els.effects),
                }
            }

            TermKind::While { cond, body } => {
                let cond = self.check_term(cond);
                let body = self.check_stmts(body);
                Checked {
                    ty: Ty::V(ValueType::unit()),
                    capture: cond.capture.union(&body.capture),
                    effects: cond.effects.union(&body.effects),
                }
            }

            TermKind::Match { scrutinee, clauses } => {
                let scrutinee = self.check_term(scrutinee);
                let scrutinee_type = match &scrutinee.ty {
                    Ty::V(t) => t.clone(),
                    Ty::B(_) => ValueType::unit(),
                };
                let mut capture = scrutinee.capture;
                let mut effects = scrutinee.effects;
                let mut result: Option<Ty> = None;
                for clause in clauses {
                    self.bind_pattern(&clause.pattern, &scrutinee_type);
                    let body = self.check_stmts(&clause.body);
                    capture = capture.union(&body.capture);
                    effects = effects.union(&body.effects);
                    result.get_or_insert(body.ty);
                }
                Checked {
                    ty: result.unwrap_or(Ty::V(ValueType::unit())),
                    capture,
                    effects,
                }
            }

            TermKind::TryHandle { body, handlers } => self.infer_try(body, handlers),

            TermKind::Region { binder, body } => {
                let body = self.check_stmts(body);
                let mut capture = body.capture;
                if let Some(cap) = self.symbol_of(binder.id) {
                    capture =
                        capture.difference(&CaptureSet::singleton(Capture::new(cap, CaptureRole::Region)));
                }
                Checked { ty: body.ty, capture, effects: body.effects }
            }

            TermKind::Do { effect: _, op, vargs } => {
                // Capability passing replaces these before lowering; typing
                // still records the effect demand
                let mut capture = CaptureSet::singleton(Capture::new(
                    self.ctx.builtins.control,
                    CaptureRole::Control,
                ));
                let mut effects = Effects::empty();
                for a in vargs {
                    let c = self.check_term(a);
                    capture = capture.union(&c.capture);
                    effects = effects.union(&c.effects);
                }
                let (ret, row) = match self.symbol_of(op.id).and_then(|s| self.op_sigs.get(&s)) {
                    Some(sig) => (
                        sig.ret.clone(),
                        Effects::of([Effect::Named(sig.owner)], &self.ctx.symbols),
                    ),
                    None => (ValueType::unit(), Effects::empty()),
                };
                Checked { ty: Ty::V(ret), capture, effects: effects.union(&row) }
            }

            TermKind::Assign { target, value } => {
                let value = self.check_term(value);
                let mut capture = value.capture;
                if let Some(var) = self.symbol_of(target.id) {
                    if let (Some(expected), Ty::V(found)) = (self.value_type_of(var), &value.ty) {
                        if !self.compatible(&expected, found) {
                            self.errors.error(
                                format!(
                                    "cannot assign {} to '{}' of type {}",
                                    self.show_value_type(found),
                                    target.name,
                                    self.show_value_type(&expected)
                                ),
                                Some(term.span),
                            );
                        }
                    }
                    capture.insert(Capture::new(var, CaptureRole::Resource));
                }
                Checked { ty: Ty::V(ValueType::unit()), capture, effects: value.effects }
            }

            TermKind::BlockLiteral { vparams, bparams, body } => {
                let vtypes = self.param_types(vparams, term.span);
                let btypes = self.block_param_types(bparams, term.span);
                let body = self.check_stmts(body);
                let ret = match body.ty {
                    Ty::V(t) => t,
                    Ty::B(_) => ValueType::unit(),
                };
                let mut sections = vec![ParamSection::Values(vtypes)];
                if !btypes.is_empty() {
                    sections.push(ParamSection::Blocks(btypes));
                }
                Checked {
                    ty: Ty::B(BlockType::Function {
                        tparams: vec![],
                        sections,
                        ret,
                        effects: body.effects.clone(),
                    }),
                    capture: body.capture,
                    effects: body.effects,
                }
            }

            TermKind::Box { body } => {
                let inner = self.check_term(body);
                match inner.ty {
                    Ty::B(block) => Checked {
                        ty: Ty::V(ValueType::Boxed {
                            block: Box::new(block),
                            capture: inner.capture.clone(),
                        }),
                        capture: inner.capture,
                        effects: inner.effects,
                    },
                    Ty::V(t) => {
                        self.errors.error(
                            format!("only blocks can be boxed, not {}", self.show_value_type(&t)),
                            Some(term.span),
                        );
                        Checked::value(t)
                    }
                }
            }

            TermKind::Unbox { body } => {
                let inner = self.check_term(body);
                match inner.ty {
                    Ty::V(ValueType::Boxed { block, capture }) => Checked {
                        ty: Ty::B(*block),
                        capture: inner.capture.union(&capture),
                        effects: inner.effects,
                    },
                    other => {
                        self.errors
                            .error("only boxed blocks can be unboxed", Some(term.span));
                        Checked { ty: other, capture: inner.capture, effects: inner.effects }
                    }
                }
            }

            TermKind::Hole => {
                let wildcard = self.ctx.symbols.fresh_type_var(false);
                Checked::value(ValueType::Var(wildcard))
            }
        }
    }

    fn infer_var(&mut self, id: &IdRef, span: Span) -> Checked {
        let sym = match self.symbol_of(id.id) {
            Some(sym) => sym,
            None => {
                if self.ctx.db.has(anns::CANDIDATES, id.id) {
                    self.errors.error(
                        format!("the reference to '{}' is ambiguous here", id.name),
                        Some(span),
                    );
                } else {
                    self.errors
                        .error(format!("unknown name '{}'", id.name), Some(span));
                }
                return Checked::value(ValueType::unit());
            }
        };

        match self.ctx.symbols.kind(sym).clone() {
            SymbolKind::Term(TermSymbol::Value(v)) => {
                let tpe = self.value_type_of(sym).unwrap_or_else(ValueType::unit);
                let capture = match v {
                    ValueSymbol::VarBinder { .. } => {
                        CaptureSet::singleton(Capture::new(sym, CaptureRole::Resource))
                    }
                    _ => CaptureSet::empty(),
                };
                Checked { ty: Ty::V(tpe), capture, effects: Effects::empty() }
            }
            SymbolKind::Term(TermSymbol::Block(b)) => {
                let tpe = self.block_type_of(sym).unwrap_or_else(|| {
                    BlockType::function(vec![], ValueType::unit(), Effects::empty())
                });
                let capture = match b {
                    BlockSymbol::Capability { role, .. } => {
                        CaptureSet::singleton(Capture::new(sym, role))
                    }
                    BlockSymbol::BlockParam | BlockSymbol::ResumeParam => {
                        CaptureSet::singleton(Capture::new(sym, CaptureRole::Control))
                    }
                    _ => self.capture_of_symbol(sym),
                };
                Checked { ty: Ty::B(tpe), capture, effects: Effects::empty() }
            }
            SymbolKind::Type(_) => {
                self.errors.error(
                    format!("'{}' is a type and cannot appear here", id.name),
                    Some(span),
                );
                Checked::value(ValueType::unit())
            }
        }
    }

    fn infer_call(
        &mut self,
        whole: &Term,
        callee: &Callee,
        targs: &[surface::TypeTree],
        vargs: &[Term],
        bargs: &[Term],
    ) -> Checked {
        // Arguments are checked once; candidates are matched against the
        // results
        let mut arg_capture = CaptureSet::empty();
        let mut arg_effects = Effects::empty();
        let mut arg_types = Vec::with_capacity(vargs.len());
        let mut flexible = Vec::with_capacity(vargs.len());
        for a in vargs {
            let checked = self.check_term(a);
            arg_capture = arg_capture.union(&checked.capture);
            arg_effects = arg_effects.union(&checked.effects);
            flexible.push(matches!(a.kind, TermKind::Literal(Literal::Int(_))));
            arg_types.push(match checked.ty {
                Ty::V(t) => t,
                Ty::B(_) => ValueType::unit(),
            });
        }
        for b in bargs {
            let checked = self.check_term(b);
            arg_capture = arg_capture.union(&checked.capture);
            arg_effects = arg_effects.union(&checked.effects);
        }

        let targs: Vec<ValueType> = targs
            .iter()
            .map(|t| self.resolved_type(t, whole.span))
            .collect();

        let (callee_sym, receiver_capture) = match callee {
            Callee::Id(id) => {
                let sym = self.resolve_callee(id, &arg_types, &flexible, whole.span);
                (sym, CaptureSet::empty())
            }
            Callee::Method { receiver, method } => {
                let recv = self.check_term(receiver);
                let sym = self.resolve_callee(method, &arg_types, &flexible, whole.span);
                (sym, recv.capture)
            }
            Callee::Expr(e) => {
                let checked = self.check_term(e);
                let (ret, effects) = match &checked.ty {
                    Ty::V(ValueType::Boxed { block, .. }) => match block.as_ref() {
                        BlockType::Function { ret, effects, .. } => {
                            (ret.clone(), effects.clone())
                        }
                        _ => (ValueType::unit(), Effects::empty()),
                    },
                    Ty::B(BlockType::Function { ret, effects, .. }) => {
                        (ret.clone(), effects.clone())
                    }
                    _ => {
                        self.errors
                            .error("this expression is not callable", Some(whole.span));
                        (ValueType::unit(), Effects::empty())
                    }
                };
                return Checked {
                    ty: Ty::V(ret),
                    capture: checked.capture.union(&arg_capture),
                    effects: checked.effects.union(&arg_effects),
                };
            }
        };

        let Some(sym) = callee_sym else {
            return Checked {
                ty: Ty::V(ValueType::unit()),
                capture: arg_capture,
                effects: arg_effects,
            };
        };

        // The callee's contribution
        let callee_capture = match self.ctx.symbols.as_block(sym) {
            Some(BlockSymbol::Capability { role, .. }) => {
                CaptureSet::singleton(Capture::new(sym, *role))
            }
            Some(BlockSymbol::BlockParam | BlockSymbol::ResumeParam) => {
                CaptureSet::singleton(Capture::new(sym, CaptureRole::Control))
            }
            Some(BlockSymbol::Method { .. }) => receiver_capture.clone(),
            _ => self.capture_of_symbol(sym),
        };

        let (ret, row) = match self.block_type_of(sym) {
            Some(BlockType::Function { tparams, sections, ret, effects }) => {
                let subst =
                    self.solve_type_args(&tparams, &sections, &arg_types, &targs);
                (ret.substitute(&subst), effects.substitute(&subst))
            }
            _ => (ValueType::unit(), Effects::empty()),
        };

        Checked {
            ty: Ty::V(ret),
            capture: callee_capture.union(&arg_capture).union(&receiver_capture),
            effects: arg_effects.union(&row),
        }
    }

    /// Resolve the callee symbol, going through overload resolution when
    /// the namer recorded several candidates
    fn resolve_callee(
        &mut self,
        id: &IdRef,
        arg_types: &[ValueType],
        flexible: &[bool],
        span: Span,
    ) -> Option<SymbolId> {
        if let Some(sym) = self.symbol_of(id.id) {
            return Some(sym);
        }
        let candidates = self.ctx.db.get(anns::CANDIDATES, id.id).cloned()?;

        let mut winners = Vec::new();
        let mut attempts = Vec::new();
        for candidate in candidates {
            // Each attempt speculates on its own clone of the overlay and
            // its own scoped error buffer; only a winner's clone survives
            let speculative = self.local.clone();
            let mut attempt_errors = MessageBuffer::new();
            let matched = self.try_candidate(candidate, arg_types, flexible, &mut attempt_errors);
            if matched {
                winners.push((candidate, speculative));
            } else {
                for m in attempt_errors.messages() {
                    attempts.push(format!("{}: {}", self.describe_candidate(candidate), m.text));
                }
            }
        }

        match winners.len() {
            1 => {
                let (sym, overlay) = winners.into_iter().next().unwrap();
                self.local = overlay;
                self.local.annotate(anns::SYMBOL, id.id, sym);
                Some(sym)
            }
            0 => {
                self.errors.report(Message::failed_overload(
                    &id.name.qualified(),
                    Some(span),
                    attempts,
                ));
                None
            }
            _ => {
                let described = winners
                    .iter()
                    .map(|(sym, _)| self.describe_candidate(*sym))
                    .collect();
                self.errors.report(Message::ambiguous_overload(
                    &id.name.qualified(),
                    Some(span),
                    described,
                ));
                None
            }
        }
    }

    fn describe_candidate(&self, sym: SymbolId) -> String {
        match self.block_type_of(sym) {
            Some(t) => format!("{}: {}", self.qualified_name(sym), self.show_block_type(&t)),
            None => self.qualified_name(sym),
        }
    }

    fn try_candidate(
        &self,
        candidate: SymbolId,
        arg_types: &[ValueType],
        flexible: &[bool],
        errors: &mut MessageBuffer,
    ) -> bool {
        let Some(BlockType::Function { sections, .. }) = self.block_type_of(candidate) else {
            errors.error("not callable", None);
            return false;
        };
        let params: Vec<ValueType> = sections
            .iter()
            .filter_map(|s| match s {
                ParamSection::Values(ts) => Some(ts.clone()),
                ParamSection::Blocks(_) => None,
            })
            .flatten()
            .collect();

        if params.len() != arg_types.len() {
            errors.error(
                format!("expects {} arguments, got {}", params.len(), arg_types.len()),
                None,
            );
            return false;
        }

        for (i, (param, arg)) in params.iter().zip(arg_types).enumerate() {
            let numeric_widening = flexible[i]
                && matches!(
                    param.dealias(&self.ctx.symbols),
                    ValueType::Builtin(mica_types::BuiltinType::Double)
                );
            if !self.compatible(param, arg) && !numeric_widening {
                errors.error(
                    format!(
                        "argument {} has type {}, expected {}",
                        i + 1,
                        self.show_value_type(arg),
                        self.show_value_type(param)
                    ),
                    None,
                );
                return false;
            }
        }
        true
    }

    /// Solve type parameters from explicit arguments or by matching
    /// declared parameter types against the argument types
    fn solve_type_args(
        &self,
        tparams: &[SymbolId],
        sections: &[ParamSection],
        arg_types: &[ValueType],
        targs: &[ValueType],
    ) -> HashMap<SymbolId, ValueType> {
        let mut subst = HashMap::new();
        for (p, t) in tparams.iter().zip(targs) {
            subst.insert(*p, t.clone());
        }
        if subst.len() < tparams.len() {
            let params: Vec<&ValueType> = sections
                .iter()
                .filter_map(|s| match s {
                    ParamSection::Values(ts) => Some(ts.iter()),
                    ParamSection::Blocks(_) => None,
                })
                .flatten()
                .collect();
            for (param, arg) in params.iter().zip(arg_types) {
                solve_one(tparams, param, arg, &mut subst);
            }
        }
        subst
    }

    fn infer_try(&mut self, body: &Stmts, handlers: &[surface::HandlerTree]) -> Checked {
        let mut cap_syms = Vec::new();
        let mut clause_capture = CaptureSet::empty();
        let mut clause_effects = Effects::empty();
        let mut handled = Vec::new();

        for handler in handlers {
            let effect = self.symbol_of(handler.effect.id);
            if let Some(effect) = effect {
                handled.push(Effect::Named(effect));
            }

            let cap = match &handler.capability {
                Some(binder) => self.symbol_of(binder.id),
                None => self.symbol_of(handler.id),
            };
            if let (Some(cap), Some(effect)) = (cap, effect) {
                cap_syms.push(cap);
                annotate_block_type(
                    &mut self.local,
                    &self.ctx.symbols,
                    cap,
                    BlockType::Capability { effect: Effect::Named(effect) },
                );
                self.local.annotate(
                    anns::CAPTURE,
                    cap,
                    CaptureSet::singleton(Capture::new(cap, CaptureRole::Control)),
                );
            }

            for clause in &handler.clauses {
                let sig = self
                    .symbol_of(clause.op.id)
                    .and_then(|op| self.op_sigs.get(&op).cloned());
                for (i, p) in clause.vparams.iter().enumerate() {
                    let tpe = sig
                        .as_ref()
                        .and_then(|s| s.params.get(i).cloned())
                        .unwrap_or_else(ValueType::unit);
                    if let Some(sym) = self.symbol_of(p.binder.id) {
                        annotate_value_type(&mut self.local, &self.ctx.symbols, sym, tpe);
                    }
                }
                if let Some(resume) = self.symbol_of(clause.resume.id) {
                    let accepts = sig.as_ref().map(|s| s.ret.clone()).unwrap_or_else(ValueType::unit);
                    let answers = ValueType::Var(self.ctx.symbols.fresh_type_var(false));
                    annotate_block_type(
                        &mut self.local,
                        &self.ctx.symbols,
                        resume,
                        BlockType::function(vec![accepts], answers, Effects::empty()),
                    );
                }
                let body = self.check_stmts(&clause.body);
                clause_capture = clause_capture.union(&body.capture);
                clause_effects = clause_effects.union(&body.effects);
            }
        }

        let body = self.check_stmts(body);
        let mut capture = body.capture;
        for cap in cap_syms {
            capture =
                capture.difference(&CaptureSet::singleton(Capture::new(cap, CaptureRole::Control)));
        }
        let handled_row = Effects::of(handled, &self.ctx.symbols);
        Checked {
            ty: body.ty,
            capture: capture.union(&clause_capture),
            effects: body.effects.difference(&handled_row).union(&clause_effects),
        }
    }

    /// Bind the binders of a pattern to the field types of its constructor
    fn bind_pattern(&mut self, pattern: &Pattern, scrutinee: &ValueType) {
        match &pattern.kind {
            PatternKind::Any | PatternKind::Literal(_) => {}
            PatternKind::Ident(binder) => {
                if let Some(sym) = self.symbol_of(binder.id) {
                    annotate_value_type(
                        &mut self.local,
                        &self.ctx.symbols,
                        sym,
                        scrutinee.clone(),
                    );
                }
            }
            PatternKind::Tag { ctor, patterns } => {
                let fields = self
                    .symbol_of(ctor.id)
                    .and_then(|c| self.ctor_fields.get(&c).cloned())
                    .unwrap_or_default();
                // Instantiate field types from the scrutinee's arguments
                let subst = match scrutinee.dealias(&self.ctx.symbols) {
                    ValueType::App { constructor, args } => {
                        datatype_params(&self.ctx.symbols, constructor)
                            .into_iter()
                            .zip(args)
                            .collect()
                    }
                    _ => HashMap::new(),
                };
                for (p, t) in patterns.iter().zip(fields) {
                    self.bind_pattern(p, &t.substitute(&subst));
                }
            }
        }
    }
}

fn literal_type(lit: &Literal) -> ValueType {
    match lit {
        Literal::Unit => ValueType::unit(),
        Literal::Bool(_) => ValueType::bool(),
        Literal::Int(_) => ValueType::int(),
        Literal::Double(_) => ValueType::double(),
        Literal::String(_) => ValueType::string(),
    }
}

fn solve_one(
    tparams: &[SymbolId],
    param: &ValueType,
    arg: &ValueType,
    subst: &mut HashMap<SymbolId, ValueType>,
) {
    match (param, arg) {
        (ValueType::Var(p), arg) if tparams.contains(p) => {
            subst.entry(*p).or_insert_with(|| arg.clone());
        }
        (ValueType::App { args: ps, .. }, ValueType::App { args: asr, .. }) => {
            for (p, a) in ps.iter().zip(asr) {
                solve_one(tparams, p, a, subst);
            }
        }
        _ => {}
    }
}

fn datatype_params(_symbols: &mica_types::Symbols, _datatype: SymbolId) -> Vec<SymbolId> {
    // Data type parameters are rigid type variables scoped to the
    // declaration; the reference typer does not track them per datatype, so
    // instantiation falls back to the uninstantiated field types.
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namer;
    use mica_syntax::{
        CaptureTree, CtorDef, IdDef, MatchClause, ParamDef, Stmt as SStmt, TypeTree,
    };

    /// Name and type a module, requiring the overlay to commit
    fn check(tree: &ModuleTree) -> CompilerContext {
        let mut ctx = CompilerContext::new();
        namer::name_module(&mut ctx, tree);
        assert!(
            type_module(&mut ctx, tree),
            "typing must succeed: {:?}",
            ctx.messages.messages()
        );
        ctx
    }

    fn op(name: &str, param: Option<(&str, &str)>, ret: &str) -> surface::OperationDef {
        surface::OperationDef {
            binder: IdDef::new(name),
            tparams: vec![],
            vparams: param
                .map(|(n, t)| vec![ParamDef::typed(n, TypeTree::reference(t))])
                .unwrap_or_default(),
            ret: Some(TypeTree::reference(ret)),
        }
    }

    fn fun(
        name: &str,
        tparams: Vec<&str>,
        vparams: Vec<(&str, &str)>,
        ret: Option<&str>,
        body: Vec<SStmt>,
    ) -> Definition {
        Definition::Fun {
            id: NodeId::fresh(),
            span: Span::synthetic(),
            binder: IdDef::new(name),
            tparams: tparams.into_iter().map(IdDef::new).collect(),
            vparams: vparams
                .into_iter()
                .map(|(n, t)| ParamDef::typed(n, TypeTree::reference(t)))
                .collect(),
            bparams: vec![],
            ret: ret.map(TypeTree::reference),
            effects: vec![],
            body: Stmts::of(body),
        }
    }

    fn extern_log(param: &str) -> (Definition, NodeId) {
        let binder = IdDef::new("log");
        let binder_id = binder.id;
        let def = Definition::ExternDef {
            id: NodeId::fresh(),
            span: Span::synthetic(),
            binder,
            capture: CaptureTree::empty(),
            tparams: vec![],
            vparams: vec![ParamDef::typed("x", TypeTree::reference(param))],
            bparams: vec![],
            ret: Some(TypeTree::reference("Unit")),
            body: "<extern>".to_string(),
        };
        (def, binder_id)
    }

    fn ident_pattern(binder: IdDef) -> Pattern {
        Pattern { id: NodeId::fresh(), span: Span::synthetic(), kind: PatternKind::Ident(binder) }
    }

    #[test]
    fn test_effect_operations_carry_the_applied_row_but_interface_ones_do_not() {
        let exc = IdDef::new("Exc");
        let exc_id = exc.id;
        let counter = IdDef::new("Counter");
        let counter_id = counter.id;

        let tree = ModuleTree::new(
            "demo",
            vec![
                Definition::Effect {
                    id: NodeId::fresh(),
                    span: Span::synthetic(),
                    binder: exc,
                    tparams: vec![],
                    ops: vec![op("raise", Some(("msg", "String")), "Unit")],
                },
                Definition::Interface {
                    id: NodeId::fresh(),
                    span: Span::synthetic(),
                    binder: counter,
                    tparams: vec![],
                    ops: vec![op("current", None, "Int")],
                },
            ],
        );
        let ctx = check(&tree);

        let exc_sym = *ctx.db.require(anns::SYMBOL, exc_id);
        let raise = ctx.symbols.operations_of(exc_sym)[0];
        match ctx.db.require(anns::BLOCK_TYPE, raise) {
            BlockType::Function { effects, .. } => {
                assert_eq!(effects.len(), 1);
                assert!(effects.contains(&Effect::Named(exc_sym), &ctx.symbols));
            }
            other => panic!("expected a function type for raise, got {:?}", other),
        }

        let counter_sym = *ctx.db.require(anns::SYMBOL, counter_id);
        let current = ctx.symbols.operations_of(counter_sym)[0];
        match ctx.db.require(anns::BLOCK_TYPE, current) {
            BlockType::Function { effects, .. } => {
                assert!(effects.is_empty(), "interface operations stay row-free");
            }
            other => panic!("expected a function type for current, got {:?}", other),
        }
    }

    #[test]
    fn test_unambiguous_overload_picks_the_matching_candidate() {
        let (log_int, log_int_id) = extern_log("Int");
        let (log_double, log_double_id) = extern_log("Double");

        // A double literal is not widened, so only one candidate matches
        let callee = IdRef::new("log");
        let callee_id = callee.id;
        let call = Term::new(TermKind::Call {
            callee: Callee::Id(callee),
            targs: vec![],
            vargs: vec![Term::literal(Literal::Double(1.5))],
            bargs: vec![],
        });
        let main = fun("main", vec![], vec![], None, vec![SStmt::Expr(call)]);

        let tree = ModuleTree::new("demo", vec![log_int, log_double, main]);
        let ctx = check(&tree);

        let resolved = *ctx.db.require(anns::SYMBOL, callee_id);
        let double_sym = *ctx.db.require(anns::SYMBOL, log_double_id);
        let int_sym = *ctx.db.require(anns::SYMBOL, log_int_id);
        assert_eq!(resolved, double_sym);
        assert_ne!(resolved, int_sym);
    }

    #[test]
    fn test_pattern_binders_receive_the_constructor_field_types() {
        // type Pair { MkPair(Int, String) }
        let data = Definition::Data {
            id: NodeId::fresh(),
            span: Span::synthetic(),
            binder: IdDef::new("Pair"),
            tparams: vec![],
            ctors: vec![CtorDef {
                binder: IdDef::new("MkPair"),
                fields: vec![TypeTree::reference("Int"), TypeTree::reference("String")],
            }],
        };

        // def first(p: Pair): Int = p match { MkPair(a, b) => a }
        let a_def = IdDef::new("a");
        let a_id = a_def.id;
        let b_def = IdDef::new("b");
        let b_id = b_def.id;
        let pattern = Pattern {
            id: NodeId::fresh(),
            span: Span::synthetic(),
            kind: PatternKind::Tag {
                ctor: IdRef::new("MkPair"),
                patterns: vec![ident_pattern(a_def), ident_pattern(b_def)],
            },
        };
        let first = fun(
            "first",
            vec![],
            vec![("p", "Pair")],
            Some("Int"),
            vec![SStmt::Expr(Term::new(TermKind::Match {
                scrutinee: Box::new(Term::var("p")),
                clauses: vec![MatchClause::new(pattern, Stmts::expr(Term::var("a")))],
            }))],
        );

        let tree = ModuleTree::new("demo", vec![data, first]);
        let ctx = check(&tree);

        let a_sym = *ctx.db.require(anns::SYMBOL, a_id);
        let b_sym = *ctx.db.require(anns::SYMBOL, b_id);
        assert_eq!(ctx.db.require(anns::VALUE_TYPE, a_sym), &ValueType::int());
        assert_eq!(ctx.db.require(anns::VALUE_TYPE, b_sym), &ValueType::string());
    }

    #[test]
    fn test_type_arguments_solve_from_argument_types() {
        // def id[A](x: A): A = x; the call id(3) comes back at Int
        let id_fun = fun(
            "id",
            vec!["A"],
            vec![("x", "A")],
            Some("A"),
            vec![SStmt::Expr(Term::var("x"))],
        );
        let call = Term::call("id", vec![Term::int(3)]);
        let call_id = call.id;
        let main = fun("main", vec![], vec![], None, vec![SStmt::Expr(call)]);

        let tree = ModuleTree::new("demo", vec![id_fun, main]);
        let ctx = check(&tree);

        assert_eq!(
            ctx.db.require(anns::INFERRED_VALUE_TYPE, call_id),
            &ValueType::int()
        );
    }
}
