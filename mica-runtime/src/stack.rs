//! The segmented metacontinuation stack
//!
//! A stack is a list of segments grouped by prompts. Each segment carries
//! its pending frames, the cells allocated within it, its prompt, and the
//! handler clauses installed with it. Capturing pops segments into a
//! sub-stack of restorable snapshots; resuming pushes them back.

use crate::control::{run_nested, Control, RunResult};
use crate::state::{CellRef, CellSnapshot};
use crate::value::Value;
use std::rc::Rc;

/// A prompt delimits the extent of a capture. Prompts are unique non-zero
/// integers; segments that only group frames use `NO_PROMPT`.
pub type Prompt = u64;

pub const NO_PROMPT: Prompt = 0;
pub const TOPLEVEL: Prompt = 1;

/// One pending frame: what to do with the next value
pub type Frame = Rc<dyn Fn(Value) -> Control>;

/// Handler clauses installed together with a prompt
#[derive(Clone, Default)]
pub struct Clauses {
    /// Runs once per capture while this segment is torn down; its result
    /// is handed to `on_rewind` when the continuation is resumed
    pub on_unwind: Option<Rc<dyn Fn() -> Control>>,
    /// Runs once per resume while this segment is reinstalled
    pub on_rewind: Option<Rc<dyn Fn(Value) -> Control>>,
    /// Runs only when the segment returns normally
    pub on_return: Option<Rc<dyn Fn(Value) -> Control>>,
}

impl Clauses {
    pub fn none() -> Self {
        Clauses::default()
    }
}

impl std::fmt::Debug for Clauses {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clauses")
            .field("on_unwind", &self.on_unwind.is_some())
            .field("on_rewind", &self.on_rewind.is_some())
            .field("on_return", &self.on_return.is_some())
            .finish()
    }
}

/// One stack segment
pub struct Segment {
    /// Pending frames; the last pushed runs first
    frames: Vec<Frame>,
    /// Cells allocated while this segment was on top
    cells: Vec<CellRef>,
    prompt: Prompt,
    clauses: Clauses,
}

/// The metacontinuation: segments with the top at the end
#[derive(Default)]
pub struct Stack {
    segments: Vec<Segment>,
}

impl Stack {
    /// The empty stack used for nested clause evaluation
    pub fn empty() -> Self {
        Stack::default()
    }

    /// The initial stack of a program: a single toplevel prompt
    pub fn toplevel() -> Self {
        let mut stack = Stack::empty();
        stack.push_segment(TOPLEVEL, Clauses::none());
        stack
    }

    pub fn push_segment(&mut self, prompt: Prompt, clauses: Clauses) {
        // The new segment keeps the cells of the stack below it in scope:
        // a capture up to this prompt must be able to snapshot every cell
        // the captured continuation can still write to.
        let cells = self.segments.last().map(|s| s.cells.clone()).unwrap_or_default();
        self.segments.push(Segment { frames: Vec::new(), cells, prompt, clauses });
    }

    /// Push a frame onto the top segment, creating a promptless segment
    /// when the stack is empty
    pub fn push_frame(&mut self, frame: Frame) {
        if self.segments.is_empty() {
            self.push_segment(NO_PROMPT, Clauses::none());
        }
        self.segments.last_mut().unwrap().frames.push(frame);
    }

    /// Register a cell with the segment currently on top
    pub fn register_cell(&mut self, cell: CellRef) {
        if self.segments.is_empty() {
            self.push_segment(NO_PROMPT, Clauses::none());
        }
        self.segments.last_mut().unwrap().cells.push(cell);
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Return `a` through the stack: pop the next frame and apply it, or
    /// finish the segment (running `on_return` if installed), or finish the
    /// whole program.
    pub fn apply(mut self, a: Value) -> RunResult {
        let mut value = a;
        loop {
            match self.segments.last_mut() {
                None => return RunResult::Done(value),
                Some(segment) => {
                    if let Some(frame) = segment.frames.pop() {
                        return RunResult::Step { c: frame(value), k: self };
                    }
                    // The segment is exhausted: it returns normally
                    let finished = self.segments.pop().expect("segment present");
                    if let Some(on_return) = finished.clauses.on_return {
                        return RunResult::Step { c: on_return(value), k: self };
                    }
                    // No return clause: drop the segment and keep going
                    let _ = finished;
                    continue;
                }
            }
        }
    }

    /// Unwind to `prompt`, popping segments into a sub-stack. Each popped
    /// segment snapshots its cells and runs its unwind clause once. The
    /// segment carrying the prompt is included, so resuming reinstalls the
    /// handler.
    pub fn unwind_to(&mut self, prompt: Prompt) -> SubStack {
        let mut captured = Vec::new();
        loop {
            let Some(segment) = self.segments.pop() else {
                panic!("runtime error: shift to unknown prompt {}", prompt);
            };
            let found = segment.prompt == prompt;
            let snapshots: Vec<CellSnapshot> =
                segment.cells.iter().map(CellRef::backup).collect();
            let unwind_data = segment
                .clauses
                .on_unwind
                .as_ref()
                .map(|f| run_nested(f()));
            captured.push(SubSegment {
                frames: segment.frames,
                snapshots,
                prompt: segment.prompt,
                clauses: segment.clauses,
                unwind_data,
            });
            if found {
                return SubStack { segments: captured };
            }
        }
    }
}

/// A captured segment: frames plus restorable cell snapshots and the data
/// its unwind clause produced
pub struct SubSegment {
    frames: Vec<Frame>,
    snapshots: Vec<CellSnapshot>,
    prompt: Prompt,
    clauses: Clauses,
    unwind_data: Option<Value>,
}

/// A captured continuation segment chain. Segments are ordered from the
/// innermost (first popped) to the prompt segment.
pub struct SubStack {
    segments: Vec<SubSegment>,
}

impl SubStack {
    /// Push the captured segments back onto `stack`, restoring cells and
    /// running each rewind clause from the bottom (the prompt segment) up.
    /// The sub-stack itself is untouched so it can be resumed again.
    pub fn rewind_onto(&self, mut stack: Stack) -> Stack {
        for segment in self.segments.iter().rev() {
            stack.segments.push(Segment {
                frames: segment.frames.clone(),
                cells: segment.snapshots.iter().map(CellSnapshot::cell).collect(),
                prompt: segment.prompt,
                clauses: segment.clauses.clone(),
            });
            for snapshot in &segment.snapshots {
                snapshot.restore();
            }
            if let Some(on_rewind) = &segment.clauses.on_rewind {
                let data = segment.unwind_data.clone().unwrap_or(Value::Unit);
                run_nested(on_rewind(data));
            }
        }
        stack
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}
