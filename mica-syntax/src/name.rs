//! Hierarchical names
//!
//! A name is empty, a single word, or a word nested under a parent name.
//! Equality is structural, so two independently built `a.b` names compare
//! equal even though the entities they refer to may not.

use crate::word::Word;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Name {
    /// The empty name, used for anonymous entities
    Empty,
    /// A single unqualified word
    Word(Word),
    /// A word nested under a parent name (`parent.word`)
    Nested(Box<Name>, Word),
}

impl Name {
    pub fn word(w: impl Into<Word>) -> Self {
        Name::Word(w.into())
    }

    /// Nest `w` under this name
    pub fn nested(self, w: impl Into<Word>) -> Self {
        Name::Nested(Box::new(self), w.into())
    }

    /// Build a name from dotted segments; empty input gives `Empty`
    pub fn from_segments<I, W>(segments: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: Into<Word>,
    {
        let mut name = Name::Empty;
        for seg in segments {
            name = match name {
                Name::Empty => Name::Word(seg.into()),
                other => other.nested(seg),
            };
        }
        name
    }

    /// The last word of the name, if any
    pub fn local(&self) -> Option<Word> {
        match self {
            Name::Empty => None,
            Name::Word(w) => Some(*w),
            Name::Nested(_, w) => Some(*w),
        }
    }

    /// The parent part of the name; `Empty` for unqualified names
    pub fn parent(&self) -> Name {
        match self {
            Name::Nested(parent, _) => (**parent).clone(),
            _ => Name::Empty,
        }
    }

    /// All words from outermost to innermost
    pub fn segments(&self) -> Vec<Word> {
        let mut out = Vec::new();
        self.collect_segments(&mut out);
        out
    }

    fn collect_segments(&self, out: &mut Vec<Word>) {
        match self {
            Name::Empty => {}
            Name::Word(w) => out.push(*w),
            Name::Nested(parent, w) => {
                parent.collect_segments(out);
                out.push(*w);
            }
        }
    }

    /// Fully qualified dotted rendering
    pub fn qualified(&self) -> String {
        self.segments()
            .iter()
            .map(|w| w.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Name::Empty)
    }

    pub fn is_qualified(&self) -> bool {
        matches!(self, Name::Nested(..))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

impl From<Word> for Name {
    fn from(w: Word) -> Self {
        Name::Word(w)
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::from_segments(s.split('.').filter(|p| !p.is_empty()))
    }
}
