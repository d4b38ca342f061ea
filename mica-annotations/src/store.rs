//! The annotations store
//!
//! Inferred facts are keyed by `(identity of key, annotation)`. Keys are
//! tree node or symbol identities and never compare structurally: two
//! syntactically equal subtrees at distinct positions stay distinguishable.
//! Annotation descriptors carry a phantom value type so reads come back
//! statically typed; the payload itself is a tagged `Fact`.

use mica_syntax::NodeId;
use mica_types::{BlockType, CaptureSet, Effects, ModuleId, SymbolId, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Identity of an annotation key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Node(NodeId),
    Symbol(SymbolId),
}

impl From<NodeId> for Key {
    fn from(n: NodeId) -> Self {
        Key::Node(n)
    }
}

impl From<SymbolId> for Key {
    fn from(s: SymbolId) -> Self {
        Key::Symbol(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Node(n) => write!(f, "node {}", n.0),
            Key::Symbol(s) => write!(f, "symbol {}", s),
        }
    }
}

/// Identity of an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub u16);

/// A typed annotation descriptor. The phantom parameter fixes the fact
/// variant reads and writes go through.
pub struct Annotation<V> {
    pub id: AnnotationId,
    pub name: &'static str,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Annotation<V> {
    pub const fn new(id: u16, name: &'static str) -> Self {
        Annotation { id: AnnotationId(id), name, _marker: PhantomData }
    }
}

impl<V> Clone for Annotation<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Annotation<V> {}

/// The tagged payload stored per `(key, annotation)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Fact {
    ValueType(ValueType),
    BlockType(BlockType),
    Captures(CaptureSet),
    Effects(Effects),
    Symbol(SymbolId),
    Symbols(Vec<SymbolId>),
    Module(ModuleId),
    Node(NodeId),
    Nodes(Vec<NodeId>),
}

/// Conversion between typed views and the tagged payload
pub trait FactValue: Clone {
    fn wrap(self) -> Fact;
    fn unwrap(fact: &Fact) -> Option<&Self>;
}

macro_rules! impl_fact_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FactValue for $ty {
                fn wrap(self) -> Fact {
                    Fact::$variant(self)
                }
                fn unwrap(fact: &Fact) -> Option<&Self> {
                    match fact {
                        Fact::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_fact_value! {
    ValueType => ValueType,
    BlockType => BlockType,
    CaptureSet => Captures,
    Effects => Effects,
    SymbolId => Symbol,
    Vec<SymbolId> => Symbols,
    ModuleId => Module,
    NodeId => Node,
    Vec<NodeId> => Nodes,
}

/// Shared behavior of the global store and the local overlay
pub trait AnnotationStore {
    fn insert_fact(&mut self, key: Key, ann: AnnotationId, fact: Fact);
    fn fact(&self, key: Key, ann: AnnotationId) -> Option<&Fact>;
    /// All facts recorded for one key
    fn facts_of(&self, key: Key) -> Vec<(AnnotationId, Fact)>;
    /// All keys that carry the given annotation
    fn keys_with_id(&self, ann: AnnotationId) -> Vec<Key>;

    /// Record `value` under `(ann, key)`, replacing any prior value
    fn annotate<V: FactValue>(&mut self, ann: Annotation<V>, key: impl Into<Key>, value: V) {
        self.insert_fact(key.into(), ann.id, value.wrap());
    }

    /// Look up; missing is not an error
    fn get<V: FactValue>(&self, ann: Annotation<V>, key: impl Into<Key>) -> Option<&V> {
        self.fact(key.into(), ann.id).and_then(V::unwrap)
    }

    /// Look up; a miss is a compiler bug
    fn require<V: FactValue>(&self, ann: Annotation<V>, key: impl Into<Key>) -> &V {
        let key = key.into();
        match self.fact(key, ann.id).and_then(V::unwrap) {
            Some(v) => v,
            None => panic!(
                "internal compiler error: missing annotation '{}' for {}",
                ann.name, key
            ),
        }
    }

    fn has<V: FactValue>(&self, ann: Annotation<V>, key: impl Into<Key>) -> bool {
        self.get(ann, key).is_some()
    }

    /// Merge a map of annotations for a single key
    fn bulk_annotate(&mut self, key: impl Into<Key>, facts: Vec<(AnnotationId, Fact)>) {
        let key = key.into();
        for (ann, fact) in facts {
            self.insert_fact(key, ann, fact);
        }
    }

    /// Add every annotation of `from` to `to` without overwriting the ones
    /// `to` already carries
    fn copy_annotations(&mut self, from: impl Into<Key>, to: impl Into<Key>) {
        let (from, to) = (from.into(), to.into());
        for (ann, fact) in self.facts_of(from) {
            if self.fact(to, ann).is_none() {
                self.insert_fact(to, ann, fact);
            }
        }
    }

    /// All keys carrying an annotation, for enumeration by editor queries
    fn keys_with<V: FactValue>(&self, ann: Annotation<V>) -> Vec<Key> {
        self.keys_with_id(ann.id)
    }
}

/// The global annotations database. Append-only once the typer has
/// committed: facts are only ever refined, never rewritten to a different
/// semantic value.
#[derive(Debug, Clone, Default)]
pub struct AnnotationsDb {
    facts: HashMap<(Key, AnnotationId), Fact>,
}

impl AnnotationsDb {
    pub fn new() -> Self {
        AnnotationsDb::default()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

impl AnnotationStore for AnnotationsDb {
    fn insert_fact(&mut self, key: Key, ann: AnnotationId, fact: Fact) {
        self.facts.insert((key, ann), fact);
    }

    fn fact(&self, key: Key, ann: AnnotationId) -> Option<&Fact> {
        self.facts.get(&(key, ann))
    }

    fn facts_of(&self, key: Key) -> Vec<(AnnotationId, Fact)> {
        self.facts
            .iter()
            .filter(|((k, _), _)| *k == key)
            .map(|((_, a), f)| (*a, f.clone()))
            .collect()
    }

    fn keys_with_id(&self, ann: AnnotationId) -> Vec<Key> {
        let mut keys: Vec<Key> =
            self.facts.keys().filter(|(_, a)| *a == ann).map(|(k, _)| *k).collect();
        keys.sort();
        keys
    }
}
