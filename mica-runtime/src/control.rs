//! Controls and the trampoline
//!
//! A `Control` is a computation that, given a stack, either takes a step
//! (a new control on a new stack) or produces the final value. Execution
//! repeatedly applies steps until a value falls out; no native stack depth
//! is consumed between steps.

use crate::stack::{Clauses, Prompt, Stack};
use crate::value::Value;
use std::rc::Rc;
use tracing::trace;

/// The outcome of one step
pub enum RunResult {
    Step { c: Control, k: Stack },
    Done(Value),
}

/// A suspended computation over a stack
pub struct Control(Box<dyn FnOnce(Stack) -> RunResult>);

impl Control {
    pub fn new(f: impl FnOnce(Stack) -> RunResult + 'static) -> Self {
        Control(Box::new(f))
    }

    /// Return a value through the current stack
    pub fn pure(value: Value) -> Control {
        Control::new(move |stack| stack.apply(value))
    }

    /// Defer building a control until the trampoline reaches it
    pub fn delay(f: impl FnOnce() -> Control + 'static) -> Control {
        Control::new(move |stack| RunResult::Step { c: f(), k: stack })
    }

    /// Monadic bind: push `f` as a pending frame and continue with `self`
    pub fn then(self, f: impl Fn(Value) -> Control + 'static) -> Control {
        Control::new(move |mut stack| {
            stack.push_frame(Rc::new(f));
            RunResult::Step { c: self, k: stack }
        })
    }

    pub(crate) fn step(self, stack: Stack) -> RunResult {
        (self.0)(stack)
    }
}

/// Run a control on the toplevel stack to completion
pub fn run(c: Control) -> Value {
    run_with(c, Stack::toplevel())
}

/// The trampoline: apply step after step until a value is produced
pub fn run_with(c: Control, stack: Stack) -> Value {
    let mut c = c;
    let mut k = stack;
    loop {
        match c.step(k) {
            RunResult::Step { c: next, k: next_stack } => {
                c = next;
                k = next_stack;
            }
            RunResult::Done(value) => return value,
        }
    }
}

/// Run a clause control on an empty stack. Unwind/rewind clauses are
/// self-contained computations; their value is consumed immediately.
pub(crate) fn run_nested(c: Control) -> Value {
    run_with(c, Stack::empty())
}

/// Install a prompt with its clauses around a computation
pub fn reset(prompt: Prompt, clauses: Clauses, body: Control) -> Control {
    Control::new(move |mut stack| {
        trace!(prompt, "installing prompt");
        stack.push_segment(prompt, clauses);
        RunResult::Step { c: body, k: stack }
    })
}

/// A resumable captured continuation
pub type Resumer = Rc<dyn Fn(Value) -> Control>;

/// Capture the continuation up to `prompt` and hand a resumer to `body`.
/// The resumer can be invoked any number of times; each invocation
/// reinstalls the captured segments with freshly restored cells.
pub fn shift(
    prompt: Prompt,
    body: impl FnOnce(Resumer) -> Control + 'static,
) -> Control {
    Control::new(move |mut stack| {
        let sub = Rc::new(stack.unwind_to(prompt));
        trace!(prompt, segments = sub.depth(), "captured continuation");
        let resume: Resumer = Rc::new(move |a: Value| {
            let sub = sub.clone();
            Control::new(move |stack| {
                trace!(segments = sub.depth(), "resuming continuation");
                let rebuilt = sub.rewind_onto(stack);
                rebuilt.apply(a)
            })
        });
        RunResult::Step { c: body(resume), k: stack }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::TOPLEVEL;

    #[test]
    fn test_pure_runs_to_value() {
        assert_eq!(run(Control::pure(Value::Int(42))), Value::Int(42));
    }

    #[test]
    fn test_then_sequences() {
        let c = Control::pure(Value::Int(1))
            .then(|v| Control::pure(Value::Int(v.as_int() + 1)))
            .then(|v| Control::pure(Value::Int(v.as_int() * 10)));
        assert_eq!(run(c), Value::Int(20));
    }

    #[test]
    fn test_shift_discarding_continuation_aborts() {
        // reset p { 1 + shift p { _ => 99 } } evaluates to 99
        let p = 7;
        let body = shift(p, |_k| Control::pure(Value::Int(99)))
            .then(|v| Control::pure(Value::Int(v.as_int() + 1)));
        let c = reset(p, Clauses::none(), body);
        assert_eq!(run(c), Value::Int(99));
    }

    #[test]
    fn test_shift_resuming_continues_at_the_hole() {
        // reset p { shift p { k => k(5) } + 1 } evaluates to 6
        let p = 8;
        let body = shift(p, |k| k(Value::Int(5)))
            .then(|v| Control::pure(Value::Int(v.as_int() + 1)));
        let c = reset(p, Clauses::none(), body);
        assert_eq!(run(c), Value::Int(6));
    }

    #[test]
    fn test_multi_shot_resume() {
        // The continuation doubles; invoking it twice composes through then
        let p = 9;
        let body = shift(p, |k| {
            let k2 = k.clone();
            k(Value::Int(10)).then(move |first| {
                k2(Value::Int(100)).then(move |second| {
                    Control::pure(Value::Int(first.as_int() + second.as_int()))
                })
            })
        })
        .then(|v| Control::pure(Value::Int(v.as_int() * 2)));
        let c = reset(p, Clauses::none(), body);
        assert_eq!(run(c), Value::Int(20 + 200));
    }

    #[test]
    #[should_panic(expected = "unknown prompt")]
    fn test_shift_on_unknown_prompt_panics() {
        run(shift(TOPLEVEL + 100, |_k| Control::pure(Value::Unit)));
    }
}
