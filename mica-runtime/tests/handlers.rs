//! Handler semantics: clause ordering, resumption, and state isolation

use mica_runtime::{
    handle, run, with_state, Clauses, Control, HandlerOp, Value,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
struct Trace {
    unwinds: RefCell<u32>,
    rewinds: RefCell<u32>,
    returns: RefCell<u32>,
    rewind_data: RefCell<Option<Value>>,
}

fn traced_clauses(trace: &Rc<Trace>) -> Clauses {
    let u = trace.clone();
    let r = trace.clone();
    let n = trace.clone();
    Clauses {
        on_unwind: Some(Rc::new(move || {
            *u.unwinds.borrow_mut() += 1;
            Control::pure(Value::Int(7))
        })),
        on_rewind: Some(Rc::new(move |data| {
            *r.rewinds.borrow_mut() += 1;
            *r.rewind_data.borrow_mut() = Some(data);
            Control::pure(Value::Unit)
        })),
        on_return: Some(Rc::new(move |v| {
            *n.returns.borrow_mut() += 1;
            Control::pure(v)
        })),
    }
}

#[test]
fn linear_exception_discards_the_continuation() {
    // try { raise("boom") } with Exc { def raise(m, k) = 42 }
    let trace = Rc::new(Trace::default());
    let raise = HandlerOp::new("raise", |_args, _k| Control::pure(Value::Int(42)));
    let c = handle(vec![raise], traced_clauses(&trace), |caps| {
        caps[0].as_fn().call(vec![Value::string("boom")]).then(|_| {
            panic!("the continuation of raise must never run");
        })
    });

    assert_eq!(run(c), Value::Int(42));
    // One shift tears down the handler segment exactly once; nothing is
    // ever rebuilt and the body never returns normally
    assert_eq!(*trace.unwinds.borrow(), 1);
    assert_eq!(*trace.rewinds.borrow(), 0);
    assert_eq!(*trace.returns.borrow(), 0);
}

#[test]
fn natural_return_only_runs_the_return_clause() {
    let trace = Rc::new(Trace::default());
    let noop = HandlerOp::new("noop", |_args, k| k(Value::Unit));
    let c = handle(vec![noop], traced_clauses(&trace), |_caps| {
        Control::pure(Value::Int(5))
    });

    assert_eq!(run(c), Value::Int(5));
    assert_eq!(*trace.unwinds.borrow(), 0);
    assert_eq!(*trace.rewinds.borrow(), 0);
    assert_eq!(*trace.returns.borrow(), 1);
}

#[test]
fn one_shot_resume_unwinds_once_and_rewinds_once() {
    let trace = Rc::new(Trace::default());
    let ask = HandlerOp::new("ask", |_args, k| k(Value::Int(41)));
    let c = handle(vec![ask], traced_clauses(&trace), |caps| {
        caps[0]
            .as_fn()
            .call(vec![])
            .then(|v| Control::pure(Value::Int(v.as_int() + 1)))
    });

    assert_eq!(run(c), Value::Int(42));
    assert_eq!(*trace.unwinds.borrow(), 1);
    assert_eq!(*trace.rewinds.borrow(), 1);
    // The resumed body returned normally through the handler
    assert_eq!(*trace.returns.borrow(), 1);
    // The rewind clause received what the unwind clause produced
    assert_eq!(*trace.rewind_data.borrow(), Some(Value::Int(7)));
}

#[test]
fn multi_shot_resume_rewinds_once_per_resume() {
    let trace = Rc::new(Trace::default());
    let choose = HandlerOp::new("choose", |_args, k| {
        let k2 = k.clone();
        k(Value::Bool(true)).then(move |first| {
            k2(Value::Bool(false)).then(move |second| {
                Control::pure(Value::Int(first.as_int() + second.as_int()))
            })
        })
    });
    let c = handle(vec![choose], traced_clauses(&trace), |caps| {
        caps[0]
            .as_fn()
            .call(vec![])
            .then(|b| Control::pure(Value::Int(if b.as_bool() { 1 } else { 10 })))
    });

    assert_eq!(run(c), Value::Int(11));
    assert_eq!(*trace.unwinds.borrow(), 1);
    assert_eq!(*trace.rewinds.borrow(), 2);
    assert_eq!(*trace.returns.borrow(), 2);
}

#[test]
fn multi_shot_resumption_restores_state_per_resume() {
    // var x = 0;
    // try { x = x + 1; choose(); x = x + 10; x }
    // with NonDet { def choose(k) = { k(); k(); x } }
    let result = run(with_state(Value::Int(0), |x| {
        let x_for_op = x.clone();
        let choose = HandlerOp::new("choose", move |_args, k| {
            let x = x_for_op.clone();
            let k2 = k.clone();
            k(Value::Unit).then(move |_| {
                let x = x.clone();
                k2(Value::Unit).then(move |_| Control::pure(x.get()))
            })
        });

        let x_for_body = x.clone();
        handle(vec![choose], Clauses::none(), move |caps| {
            let x = x_for_body;
            x.put(Value::Int(x.get().as_int() + 1));
            let x_after = x.clone();
            caps[0].as_fn().call(vec![]).then(move |_| {
                x_after.put(Value::Int(x_after.get().as_int() + 10));
                Control::pure(x_after.get())
            })
        })
    }));

    // Each resumption starts from the captured pre-choose state (x = 1)
    // and increments to 11; the second does not observe the first's write.
    assert_eq!(result, Value::Int(11));
}

#[test]
fn resumptions_do_not_observe_each_others_writes() {
    // State allocated inside the handled region is copied per resume
    let observed = Rc::new(RefCell::new(Vec::new()));
    let observed_in_body = observed.clone();

    let twice = HandlerOp::new("twice", |_args, k| {
        let k2 = k.clone();
        k(Value::Unit).then(move |_| k2(Value::Unit))
    });

    let c = handle(vec![twice], Clauses::none(), move |caps| {
        with_state(Value::Int(0), move |y| {
            let y_after = y.clone();
            y.put(Value::Int(1));
            caps[0].as_fn().call(vec![]).then(move |_| {
                // Both resumptions must see y = 1, never the other's y = 2
                observed_in_body.borrow_mut().push(y_after.get().as_int());
                y_after.put(Value::Int(2));
                Control::pure(Value::Unit)
            })
        })
    });

    run(c);
    assert_eq!(&*observed.borrow(), &[1, 1]);
}

#[test]
fn handlers_nest_and_inner_shift_unwinds_intermediate_segments() {
    // Count unwinds of an intermediate handler crossed by an abort
    let trace = Rc::new(Trace::default());
    let inner_noop = HandlerOp::new("noop", |_args, k| k(Value::Unit));
    let raise = HandlerOp::new("raise", |_args, _k| Control::pure(Value::Int(1)));

    let traced = traced_clauses(&trace);
    let c = handle(vec![raise], Clauses::none(), move |outer_caps| {
        let outer = outer_caps[0].clone();
        handle(vec![inner_noop], traced, move |_inner_caps| {
            // Shift past the inner handler to the outer one
            outer.as_fn().call(vec![])
        })
    });

    assert_eq!(run(c), Value::Int(1));
    // The intermediate segment is torn down exactly once and never rebuilt
    assert_eq!(*trace.unwinds.borrow(), 1);
    assert_eq!(*trace.rewinds.borrow(), 0);
    assert_eq!(*trace.returns.borrow(), 0);
}
