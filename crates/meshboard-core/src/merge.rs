//! Last-writer-wins merge resolver.
//!
//! Reconciles two collections of versioned records into one, applied
//! independently and identically for elements and connections. The result
//! is deterministic, commutative and idempotent: the same two collections
//! merged in any peer, in any arrival order, produce the same table. This
//! is what makes unordered, duplicated `StateSync` delivery safe.

use std::collections::HashMap;

use crate::element::{ElementId, Versioned};

/// Returns true if `incoming` should replace `existing`.
///
/// Rules, in order:
/// 1. an incoming tombstone beats a live record unconditionally, regardless
///    of version order (there is deliberately no mirror rule for undelete);
/// 2. a strictly higher version wins;
/// 3. equal versions are broken by a strictly higher nonce;
/// 4. otherwise the existing record is retained.
fn incoming_wins<T: Versioned>(existing: &T, incoming: &T) -> bool {
    if incoming.is_deleted() && !existing.is_deleted() {
        return true;
    }
    if incoming.version() > existing.version() {
        return true;
    }
    incoming.version() == existing.version()
        && incoming.version_nonce() > existing.version_nonce()
}

/// Merge two record collections into one reconciled table.
///
/// Pure with respect to both inputs; the caller persists the result. No id
/// seen in either input is ever absent from the output, and malformed
/// version fields (decoded as 0) sort below every well-formed record
/// instead of raising.
pub fn merge<T: Versioned + Clone>(
    local: &HashMap<ElementId, T>,
    remote: &HashMap<ElementId, T>,
) -> HashMap<ElementId, T> {
    let mut table: HashMap<ElementId, T> = HashMap::with_capacity(local.len() + remote.len());
    for record in local.values().chain(remote.values()) {
        match table.get(&record.id()) {
            None => {
                table.insert(record.id(), record.clone());
            }
            Some(existing) => {
                if incoming_wins(existing, record) {
                    table.insert(record.id(), record.clone());
                }
            }
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, ElementKind};
    use kurbo::Point;

    fn collection(elements: Vec<Element>) -> HashMap<ElementId, Element> {
        elements.into_iter().map(|e| (e.id, e)).collect()
    }

    fn rect(version: u64, nonce: u32) -> Element {
        let mut e = Element::new(ElementKind::Rectangle, 0.0, 0.0, 100.0, 100.0);
        e.version = version;
        e.version_nonce = nonce;
        e
    }

    fn tables_equal(a: &HashMap<ElementId, Element>, b: &HashMap<ElementId, Element>) -> bool {
        a.len() == b.len() && a.iter().all(|(id, e)| b.get(id) == Some(e))
    }

    #[test]
    fn test_disjoint_union() {
        let a = collection(vec![rect(1, 1)]);
        let b = collection(vec![rect(1, 1)]);
        let merged = merge(&a, &b);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_higher_version_wins() {
        let mut newer = rect(200, 1);
        let mut older = newer.clone();
        older.version = 100;
        older.x = 50.0;
        newer.x = 75.0;

        let merged = merge(&collection(vec![older]), &collection(vec![newer.clone()]));
        assert_eq!(merged[&newer.id].x, 75.0);
    }

    #[test]
    fn test_tie_break_by_nonce() {
        let winner = rect(100, 9);
        let mut loser = winner.clone();
        loser.version_nonce = 3;
        loser.x = 1.0;

        let forward = merge(&collection(vec![loser.clone()]), &collection(vec![winner.clone()]));
        let backward = merge(&collection(vec![winner.clone()]), &collection(vec![loser]));
        assert_eq!(forward[&winner.id].version_nonce, 9);
        assert_eq!(backward[&winner.id].version_nonce, 9);
        assert_eq!(forward[&winner.id].x, 0.0);
    }

    #[test]
    fn test_tombstone_precedence_over_version() {
        // Peer A deleted at version 100; peer B edited at the *higher*
        // version 190 without seeing the delete. The tombstone still wins.
        let mut deleted = rect(100, 1);
        deleted.is_deleted = true;
        let mut edited = deleted.clone();
        edited.is_deleted = false;
        edited.version = 190;

        let merged = merge(&collection(vec![edited]), &collection(vec![deleted.clone()]));
        assert!(merged[&deleted.id].is_deleted);
    }

    #[test]
    fn test_no_unconditional_undelete() {
        // The asymmetric counterpart: a live record only beats a tombstone
        // through normal version ordering.
        let mut tombstone = rect(200, 1);
        tombstone.is_deleted = true;
        let mut stale_live = tombstone.clone();
        stale_live.is_deleted = false;
        stale_live.version = 150;

        let merged = merge(&collection(vec![tombstone.clone()]), &collection(vec![stale_live]));
        assert!(merged[&tombstone.id].is_deleted);
    }

    #[test]
    fn test_commutative() {
        let shared = rect(50, 2);
        let mut shared_newer = shared.clone();
        shared_newer.version = 80;
        shared_newer.x = 33.0;

        let a = collection(vec![rect(10, 1), shared]);
        let b = collection(vec![rect(20, 4), shared_newer]);
        assert!(tables_equal(&merge(&a, &b), &merge(&b, &a)));
    }

    #[test]
    fn test_idempotent() {
        let a = collection(vec![rect(10, 1), rect(20, 2)]);
        let b = collection(vec![rect(30, 3)]);
        assert!(tables_equal(&merge(&a, &a), &a));
        let ab = merge(&a, &b);
        assert!(tables_equal(&merge(&ab, &b), &ab));
    }

    #[test]
    fn test_zero_version_sorts_lowest() {
        // A record with missing/defaulted version fields never displaces a
        // well-formed one.
        let good = rect(100, 5);
        let mut corrupt = good.clone();
        corrupt.version = 0;
        corrupt.version_nonce = 0;
        corrupt.x = 999.0;

        let merged = merge(&collection(vec![good.clone()]), &collection(vec![corrupt]));
        assert_eq!(merged[&good.id].x, 0.0);
    }

    #[test]
    fn test_delete_vs_concurrent_edit_scenario() {
        // Peer A deletes "r1" at version 100; peer B edits its color at
        // version 90. After both broadcasts merge, the element is deleted
        // on both peers. Explicit contract, not an inconsistency.
        let mut base = rect(80, 1);
        base.start_point = Some(Point::ZERO);

        let mut a_side = collection(vec![base.clone()]);
        let mut b_side = a_side.clone();

        let mut deleted = base.clone();
        deleted.version = 100;
        deleted.is_deleted = true;
        a_side.insert(deleted.id, deleted);

        let mut recolored = base.clone();
        recolored.version = 90;
        recolored.style.stroke_width = 8.0;
        b_side.insert(recolored.id, recolored);

        let on_a = merge(&a_side, &b_side);
        let on_b = merge(&b_side, &a_side);
        assert!(on_a[&base.id].is_deleted);
        assert!(on_b[&base.id].is_deleted);
        assert!(tables_equal(&on_a, &on_b));
    }
}
