//! Batched insert/delete updates applied to replicated sets.

use std::collections::HashSet;
use std::hash::Hash;

/// A buffered mutation of one node's entry in a replicated set.
///
/// The update is a builder: the owning update loop mutates it between
/// flushes, then hands a by-value snapshot to the replicator via
/// [IndelUpdate::export_and_reset]. A consumer applying update `U` to a
/// set `S` computes `S' = (if U.replace_all then ∅ else S) ∪ U.inserts \
/// U.deletes`.
///
/// Invariant: `inserts ∩ deletes = ∅`. [IndelUpdate::insert] and
/// [IndelUpdate::delete] each strip the element from the opposite side.
///
/// On the wire this serializes as
/// `{"inserts": [..], "deletes": [..], "replaceAll": bool}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndelUpdate<S: Eq + Hash> {
    inserts: HashSet<S>,
    deletes: HashSet<S>,
    replace_all: bool,
}

impl<S: Eq + Hash> Default for IndelUpdate<S> {
    fn default() -> Self {
        Self {
            inserts: HashSet::new(),
            deletes: HashSet::new(),
            replace_all: false,
        }
    }
}

impl<S: Eq + Hash> IndelUpdate<S> {
    /// The empty, non-replacing update.
    pub fn new() -> Self {
        Self::default()
    }

    /// A full-replacement update: the consumer discards the previous set
    /// and installs `set`.
    pub fn replacing(set: HashSet<S>) -> Self {
        Self {
            inserts: set,
            deletes: HashSet::new(),
            replace_all: true,
        }
    }

    /// Buffer an insertion, cancelling any pending deletion of the same
    /// element.
    pub fn insert(&mut self, element: S) {
        self.deletes.remove(&element);
        self.inserts.insert(element);
    }

    /// Buffer a deletion, cancelling any pending insertion of the same
    /// element.
    pub fn delete(&mut self, element: S) {
        self.inserts.remove(&element);
        self.deletes.insert(element);
    }

    /// Turn this update into a full replacement by `set`.
    pub fn replace_all(&mut self, set: HashSet<S>) {
        self.inserts = set;
        self.deletes = HashSet::new();
        self.replace_all = true;
    }

    /// Clear back to the empty, non-replacing update.
    pub fn reset(&mut self) {
        self.inserts = HashSet::new();
        self.deletes = HashSet::new();
        self.replace_all = false;
    }

    /// Take the buffered update by value, leaving the empty update behind
    /// for the next accumulation interval.
    pub fn export_and_reset(&mut self) -> IndelUpdate<S> {
        std::mem::take(self)
    }

    /// Elements to insert.
    pub fn inserts(&self) -> &HashSet<S> {
        &self.inserts
    }

    /// Elements to delete.
    pub fn deletes(&self) -> &HashSet<S> {
        &self.deletes
    }

    /// Whether the consumer should discard its previous set first.
    pub fn should_replace_all(&self) -> bool {
        self.replace_all
    }

    /// `true` if applying this update cannot change any set.
    pub fn is_empty(&self) -> bool {
        !self.replace_all && self.inserts.is_empty() && self.deletes.is_empty()
    }
}

impl<S: Eq + Hash + Clone> IndelUpdate<S> {
    /// Apply this update to a target set, in place.
    pub fn apply_to(&self, target: &mut HashSet<S>) {
        if self.replace_all {
            target.clear();
        }
        for element in &self.inserts {
            target.insert(element.clone());
        }
        for element in &self.deletes {
            target.remove(element);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_strips_pending_delete() {
        let mut update = IndelUpdate::new();
        update.delete(7);
        update.insert(7);
        assert!(update.deletes().is_empty());
        assert_eq!(&HashSet::from([7]), update.inserts());
    }

    #[test]
    fn delete_strips_pending_insert() {
        let mut update = IndelUpdate::new();
        update.insert(7);
        update.delete(7);
        assert!(update.inserts().is_empty());
        assert_eq!(&HashSet::from([7]), update.deletes());
    }

    #[test]
    fn export_leaves_empty_update() {
        let mut update = IndelUpdate::new();
        update.insert(1);
        update.delete(2);
        let exported = update.export_and_reset();
        assert!(!exported.is_empty());
        assert!(update.is_empty());
        assert!(!update.should_replace_all());
    }

    #[test]
    fn apply_delta() {
        let mut target = HashSet::from([1, 2, 3]);
        let mut update = IndelUpdate::new();
        update.insert(4);
        update.delete(2);
        update.apply_to(&mut target);
        assert_eq!(HashSet::from([1, 3, 4]), target);
    }

    #[test]
    fn apply_replacement_discards_previous_set() {
        let mut target = HashSet::from([1, 2, 3]);
        IndelUpdate::replacing(HashSet::from([9])).apply_to(&mut target);
        assert_eq!(HashSet::from([9]), target);
    }

    #[test]
    fn empty_replacement_is_not_empty() {
        // A replacing update with no inserts still clears the entry.
        let update: IndelUpdate<i32> = IndelUpdate::replacing(HashSet::new());
        assert!(!update.is_empty());
    }

    #[test]
    fn wire_format() {
        let mut update = IndelUpdate::new();
        update.insert(42);
        let encoded = serde_json::to_value(&update).unwrap();
        assert_eq!(
            serde_json::json!({
                "inserts": [42],
                "deletes": [],
                "replaceAll": false,
            }),
            encoded,
        );
    }
}
