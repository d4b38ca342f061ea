//! Shared state threaded through the phases

use crate::messages::MessageBuffer;
use mica_annotations::AnnotationsDb;
use mica_types::{Builtins, ModuleGraph, Symbols};

/// Everything the phases read and write: symbols, the module graph, the
/// global annotations store, and the message buffer. Phases run one at a
/// time; there is no concurrent mutation.
pub struct CompilerContext {
    pub symbols: Symbols,
    pub modules: ModuleGraph,
    pub builtins: Builtins,
    pub db: AnnotationsDb,
    pub messages: MessageBuffer,
}

impl CompilerContext {
    pub fn new() -> Self {
        let mut symbols = Symbols::new();
        let mut modules = ModuleGraph::new();
        let builtins = Builtins::install(&mut symbols, &mut modules);
        CompilerContext {
            symbols,
            modules,
            builtins,
            db: AnnotationsDb::new(),
            messages: MessageBuffer::new(),
        }
    }
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new()
    }
}
