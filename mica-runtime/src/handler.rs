//! Handler construction
//!
//! `handle` allocates a fresh prompt, wraps every operation implementation
//! so that invoking it shifts to that prompt, and runs the body under a
//! `reset` carrying the unwind/rewind/return clauses. Operation results
//! that are functions receive the capability tuple, which is what makes
//! bidirectional handlers work.

use crate::control::{shift, reset, Control, Resumer};
use crate::stack::{Clauses, Prompt, TOPLEVEL};
use crate::value::{FnValue, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_PROMPT: AtomicU64 = AtomicU64::new(TOPLEVEL + 1);

/// Allocate a prompt no other handler uses
pub fn fresh_prompt() -> Prompt {
    NEXT_PROMPT.fetch_add(1, Ordering::Relaxed)
}

/// One operation of a handler
pub struct HandlerOp {
    pub name: &'static str,
    /// The user implementation: operation arguments plus the continuation
    pub body: Rc<dyn Fn(Vec<Value>, Resumer) -> Control>,
}

impl HandlerOp {
    pub fn new(
        name: &'static str,
        body: impl Fn(Vec<Value>, Resumer) -> Control + 'static,
    ) -> Self {
        HandlerOp { name, body: Rc::new(body) }
    }
}

/// Install a handler around `body`. The body receives one capability value
/// per operation, in declaration order.
pub fn handle(
    ops: Vec<HandlerOp>,
    clauses: Clauses,
    body: impl FnOnce(Vec<Value>) -> Control + 'static,
) -> Control {
    let prompt = fresh_prompt();
    debug!(prompt, operations = ops.len(), "installing handler");

    // Capabilities close over the full capability tuple for bidirectional
    // results, so the tuple is backpatched after construction.
    let caps_cell: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));

    let mut caps = Vec::with_capacity(ops.len());
    for op in ops {
        let implementation = op.body.clone();
        let caps_for_op = caps_cell.clone();
        caps.push(Value::Fn(FnValue::of(move |args: Vec<Value>| {
            let implementation = implementation.clone();
            let caps_for_op = caps_for_op.clone();
            shift(prompt, move |k| {
                implementation(args, k).then(move |result| match result {
                    // A function result is a bidirectional handler: it
                    // receives the capabilities of this handler
                    Value::Fn(f) => f.call(caps_for_op.borrow().clone()),
                    other => Control::pure(other),
                })
            })
        })));
    }
    *caps_cell.borrow_mut() = caps.clone();

    reset(prompt, clauses, Control::delay(move || body(caps)))
}

/// Abortive capture of the continuation up to the toplevel.
///
/// The exported continuation is two-phase: invoking it with a value yields
/// a suspended pair, and only invoking that pair's thunk actually runs the
/// captured continuation. The branch below sits at the original call site
/// and unpacks whichever pair arrives.
pub fn capture(f: impl FnOnce(Value) -> Control + 'static) -> Control {
    shift(TOPLEVEL, move |k| {
        let exported = Value::function(move |mut args: Vec<Value>| {
            let a = if args.is_empty() { Value::Unit } else { args.remove(0) };
            let k = k.clone();
            // First invocation: hand back a thunk without running anything.
            // Re-invoking the thunk enters the captured continuation with a
            // runnable pair, which the branch below unpacks.
            let thunk = Value::function(move |_| {
                let payload = a.clone();
                k(should_run_pair(
                    true,
                    Value::function(move |_| Control::pure(payload.clone())),
                ))
            });
            Control::pure(thunk)
        });
        f(exported)
    })
    .then(|value| match as_should_run_pair(&value) {
        Some((true, cont)) => cont.call(vec![]),
        Some((false, cont)) => Control::pure(Value::Fn(cont)),
        None => Control::pure(value),
    })
}

const SHOULD_RUN_TAG: u32 = u32::MAX;

fn should_run_pair(should_run: bool, cont: Value) -> Value {
    Value::data(SHOULD_RUN_TAG, vec![Value::Bool(should_run), cont])
}

fn as_should_run_pair(value: &Value) -> Option<(bool, FnValue)> {
    match value {
        Value::Data { tag, fields } if *tag == SHOULD_RUN_TAG && fields.len() == 2 => {
            match (&fields[0], &fields[1]) {
                (Value::Bool(b), Value::Fn(f)) => Some((*b, f.clone())),
                _ => None,
            }
        }
        _ => None,
    }
}
