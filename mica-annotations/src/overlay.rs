//! The local annotations overlay
//!
//! The typer works through a local layer it can clone before a speculative
//! attempt (an overload candidate) and either commit into the global store
//! or simply drop. The backing map is persistent, so clones are cheap and
//! fully independent: mutations after cloning never reach the original.

use crate::store::{AnnotationId, AnnotationStore, AnnotationsDb, Fact, Key};

#[derive(Debug, Clone, Default)]
pub struct Annotations {
    facts: im::HashMap<(Key, AnnotationId), Fact>,
}

impl Annotations {
    pub fn new() -> Self {
        Annotations::default()
    }

    /// Write every local fact into the global store. Committing the same
    /// values twice is idempotent.
    pub fn commit(&self, db: &mut AnnotationsDb) {
        for ((key, ann), fact) in self.facts.iter() {
            db.insert_fact(*key, *ann, fact.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

impl AnnotationStore for Annotations {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::anns;
    use mica_syntax::Term;
    use mica_types::{CaptureSet, ValueType};

    #[test]
    fn test_clone_independence() {
        let t = Term::int(0);
        let mut original = Annotations::new();
        original.annotate(anns::INFERRED_VALUE_TYPE, t.id, ValueType::int());

        let mut clone = original.clone();
        clone.annotate(anns::INFERRED_VALUE_TYPE, t.id, ValueType::bool());
        clone.annotate(anns::INFERRED_CAPTURE, t.id, CaptureSet::empty());

        // The original is untouched by mutations of the clone
        assert_eq!(original.get(anns::INFERRED_VALUE_TYPE, t.id), Some(&ValueType::int()));
        assert!(!original.has(anns::INFERRED_CAPTURE, t.id));
        assert_eq!(clone.get(anns::INFERRED_VALUE_TYPE, t.id), Some(&ValueType::bool()));
    }

    #[test]
    fn test_commit_reaches_global_store() {
        let t = Term::int(0);
        let mut local = Annotations::new();
        local.annotate(anns::INFERRED_VALUE_TYPE, t.id, ValueType::int());

        let mut db = AnnotationsDb::new();
        local.commit(&mut db);
        assert_eq!(db.get(anns::INFERRED_VALUE_TYPE, t.id), Some(&ValueType::int()));

        // Committing again with equal writes changes nothing
        local.commit(&mut db);
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_discarded_overlay_leaves_no_trace() {
        let t = Term::int(0);
        let mut db = AnnotationsDb::new();
        {
            let mut speculative = Annotations::new();
            speculative.annotate(anns::INFERRED_VALUE_TYPE, t.id, ValueType::int());
            // Dropped without commit
        }
        assert!(db.is_empty());
        assert!(!db.has(anns::INFERRED_VALUE_TYPE, t.id));
    }

    #[test]
    fn test_either_clone_commits_to_same_state() {
        let t = Term::int(0);
        let mut base = Annotations::new();
        base.annotate(anns::INFERRED_VALUE_TYPE, t.id, ValueType::int());

        let mut left = base.clone();
        let mut right = base.clone();
        left.annotate(anns::INFERRED_CAPTURE, t.id, CaptureSet::empty());
        right.annotate(anns::INFERRED_CAPTURE, t.id, CaptureSet::empty());

        let mut db_left = AnnotationsDb::new();
        let mut db_right = AnnotationsDb::new();
        left.commit(&mut db_left);
        right.commit(&mut db_right);
        assert_eq!(db_left.len(), db_right.len());
        assert_eq!(
            db_left.get(anns::INFERRED_CAPTURE, t.id),
            db_right.get(anns::INFERRED_CAPTURE, t.id)
        );
    }
}
