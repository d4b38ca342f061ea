//! Runtime values

use crate::control::Control;
use crate::state::CellRef;
use std::fmt;
use std::rc::Rc;

/// A runtime function value
#[derive(Clone)]
pub struct FnValue(pub Rc<dyn Fn(Vec<Value>) -> Control>);

impl FnValue {
    pub fn of(f: impl Fn(Vec<Value>) -> Control + 'static) -> Self {
        FnValue(Rc::new(f))
    }

    pub fn call(&self, args: Vec<Value>) -> Control {
        (self.0)(args)
    }
}

impl fmt::Debug for FnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function>")
    }
}

/// Values produced and consumed by compiled programs
#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(Rc<str>),
    /// A constructed datum: constructor tag plus its fields
    Data { tag: u32, fields: Rc<Vec<Value>> },
    Fn(FnValue),
    Cell(CellRef),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(Rc::from(s.into().into_boxed_str()))
    }

    pub fn data(tag: u32, fields: Vec<Value>) -> Value {
        Value::Data { tag, fields: Rc::new(fields) }
    }

    pub fn function(f: impl Fn(Vec<Value>) -> Control + 'static) -> Value {
        Value::Fn(FnValue::of(f))
    }

    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(v) => *v,
            other => panic!("runtime type error: expected Int, got {:?}", other),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(v) => *v,
            other => panic!("runtime type error: expected Bool, got {:?}", other),
        }
    }

    pub fn as_fn(&self) -> &FnValue {
        match self {
            Value::Fn(f) => f,
            other => panic!("runtime type error: expected a function, got {:?}", other),
        }
    }

    pub fn as_cell(&self) -> &CellRef {
        match self {
            Value::Cell(c) => c,
            other => panic!("runtime type error: expected a cell, got {:?}", other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Data { tag: ta, fields: fa }, Value::Data { tag: tb, fields: fb }) => {
                ta == tb && fa == fb
            }
            (Value::Fn(a), Value::Fn(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Value::Cell(a), Value::Cell(b)) => a.same(b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}
