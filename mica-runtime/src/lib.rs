//! The Mica delimited-control runtime
//!
//! The reference semantics for effect handlers at execution time: a
//! trampoline over suspended controls, a metacontinuation stack segmented
//! by prompts, sub-continuation capture with cell snapshots, and handler
//! construction with unwind/rewind/return clauses. Backends compile core
//! against exactly these operations.

pub mod control;
pub mod handler;
pub mod stack;
pub mod state;
pub mod value;

pub use control::{reset, run, run_with, shift, Control, Resumer, RunResult};
pub use handler::{capture, fresh_prompt, handle, HandlerOp};
pub use stack::{Clauses, Frame, Prompt, Stack, SubStack, NO_PROMPT, TOPLEVEL};
pub use state::{with_state, CellRef, CellSnapshot};
pub use value::{FnValue, Value};
