//! Heap cells with backup and restore
//!
//! Cells back mutable variables. Each cell is registered with the stack
//! segment that allocated it; capturing a continuation snapshots the cells
//! of every captured segment, and each resume restores the snapshots, so
//! multi-shot handlers observe independent copies of handler-local state.

use crate::control::{Control, RunResult};
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// A mutable heap cell
#[derive(Debug, Clone)]
pub struct CellRef(Rc<RefCell<Value>>);

impl CellRef {
    pub fn new(init: Value) -> Self {
        CellRef(Rc::new(RefCell::new(init)))
    }

    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    pub fn put(&self, value: Value) {
        *self.0.borrow_mut() = value;
    }

    /// Snapshot the current value for a later restore
    pub fn backup(&self) -> CellSnapshot {
        CellSnapshot { cell: self.clone(), saved: self.get() }
    }

    pub fn same(&self, other: &CellRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A restorable snapshot of one cell
#[derive(Debug, Clone)]
pub struct CellSnapshot {
    cell: CellRef,
    saved: Value,
}

impl CellSnapshot {
    pub fn restore(&self) {
        self.cell.put(self.saved.clone());
    }

    pub fn cell(&self) -> CellRef {
        self.cell.clone()
    }
}

/// Allocate a cell, register it with the current segment, and hand it to
/// the body
pub fn with_state(
    init: Value,
    body: impl FnOnce(CellRef) -> Control + 'static,
) -> Control {
    Control::new(move |mut stack| {
        let cell = CellRef::new(init);
        stack.register_cell(cell.clone());
        RunResult::Step { c: body(cell), k: stack }
    })
}
