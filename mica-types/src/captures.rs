//! Capture sets
//!
//! A capture set records which capabilities a term closes over. Captures
//! compare by the identity of the capability symbol. Purity is the empty
//! set; the pure-or-IO predicate drives the transformer's choice between
//! direct-style and suspendable calls.

use crate::symbol::SymbolId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// What a capability stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CaptureRole {
    /// Input/output with the outside world
    Io,
    /// A lexical region of heap cells
    Region,
    /// A scoped resource
    Resource,
    /// The delimited-control capability; its presence forces suspension
    Control,
}

/// One member of a capture set, identity-compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capture {
    pub id: SymbolId,
    pub role: CaptureRole,
}

impl Capture {
    pub fn new(id: SymbolId, role: CaptureRole) -> Self {
        Capture { id, role }
    }
}

/// A duplicate-free set of captures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSet {
    captures: BTreeSet<Capture>,
}

impl CaptureSet {
    pub fn empty() -> Self {
        CaptureSet::default()
    }

    pub fn singleton(capture: Capture) -> Self {
        let mut captures = BTreeSet::new();
        captures.insert(capture);
        CaptureSet { captures }
    }

    pub fn insert(&mut self, capture: Capture) {
        self.captures.insert(capture);
    }

    pub fn union(&self, other: &CaptureSet) -> CaptureSet {
        CaptureSet { captures: self.captures.union(&other.captures).copied().collect() }
    }

    pub fn difference(&self, other: &CaptureSet) -> CaptureSet {
        CaptureSet { captures: self.captures.difference(&other.captures).copied().collect() }
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.captures.iter().any(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capture> {
        self.captures.iter()
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    /// Purity is the empty capture set
    pub fn is_pure(&self) -> bool {
        self.captures.is_empty()
    }

    /// True when every member is I/O, a region, or a resource, and none is
    /// the control capability. Such computations never suspend.
    pub fn pure_or_io(&self) -> bool {
        self.captures.iter().all(|c| {
            matches!(c.role, CaptureRole::Io | CaptureRole::Region | CaptureRole::Resource)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}

impl FromIterator<Capture> for CaptureSet {
    fn from_iter<I: IntoIterator<Item = Capture>>(iter: I) -> Self {
        CaptureSet { captures: iter.into_iter().collect() }
    }
}

impl fmt::Display for CaptureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, c) in self.captures.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c.id)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(n: u32, role: CaptureRole) -> Capture {
        Capture::new(SymbolId(n), role)
    }

    #[test]
    fn test_purity() {
        assert!(CaptureSet::empty().is_pure());
        assert!(!CaptureSet::singleton(cap(1, CaptureRole::Io)).is_pure());
    }

    #[test]
    fn test_pure_or_io() {
        let io = CaptureSet::singleton(cap(1, CaptureRole::Io));
        let region = CaptureSet::singleton(cap(2, CaptureRole::Region));
        let resource = CaptureSet::singleton(cap(3, CaptureRole::Resource));
        let control = CaptureSet::singleton(cap(4, CaptureRole::Control));

        assert!(CaptureSet::empty().pure_or_io());
        assert!(io.pure_or_io());
        assert!(io.union(&region).union(&resource).pure_or_io());
        assert!(!control.pure_or_io());
        assert!(!io.union(&control).pure_or_io());
    }

    #[test]
    fn test_set_operations() {
        let a: CaptureSet =
            [cap(1, CaptureRole::Io), cap(2, CaptureRole::Region)].into_iter().collect();
        let b = CaptureSet::singleton(cap(2, CaptureRole::Region));
        assert_eq!(a.difference(&b), CaptureSet::singleton(cap(1, CaptureRole::Io)));
        assert_eq!(a.union(&b), a);
        assert!(a.contains(SymbolId(2)));
        assert!(!a.contains(SymbolId(3)));
    }
}
