//! Disjoint sets over master ids
//!
//! Accepted pairs are unioned before any rewrite so that chains such as
//! A~B, B~C collapse into one group merged into a single survivor.

use std::collections::{BTreeMap, HashMap};

/// Union-find keyed by master id. The root of every set is its lowest id.
#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    parent: HashMap<i64, i64>,
}

impl DisjointSet {
    pub fn new() -> Self {
        DisjointSet::default()
    }

    /// Representative of `id`'s set, compressing the path on the way
    pub fn find(&mut self, id: i64) -> i64 {
        let mut root = id;
        while let Some(&parent) = self.parent.get(&root) {
            if parent == root {
                break;
            }
            root = parent;
        }

        let mut node = id;
        while node != root {
            let next = self.parent.get(&node).copied().unwrap_or(root);
            self.parent.insert(node, root);
            node = next;
        }

        self.parent.entry(root).or_insert(root);
        root
    }

    pub fn union(&mut self, a: i64, b: i64) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent.insert(high, low);
    }

    /// Representative -> members (representative included), both ascending
    pub fn groups(&mut self) -> BTreeMap<i64, Vec<i64>> {
        let ids: Vec<i64> = self.parent.keys().copied().collect();
        let mut groups: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for id in ids {
            let root = self.find(id);
            groups.entry(root).or_default().push(id);
        }
        for members in groups.values_mut() {
            members.sort_unstable();
        }
        groups
    }
}
