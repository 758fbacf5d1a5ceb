//! Structural overlap tests: does any address fall under a route of both
//! subtrees, or under a route of a subtree and a query prefix.
//!
//! Range scans are avoided where a precomputed allotment bitset can
//! answer the same question with one intersection.

use inetnum::addr::Prefix;

use crate::allot;
use crate::bitset::BitSet256;
use crate::types::base_index::{
    host_idx, last_octet_idx_and_bits, pfx_to_idx256,
};
use crate::types::prefix::{addr_octets, prefixes_overlap};

use super::node::{Child, StrideNode};

impl<V: Clone> StrideNode<V> {
    /// True if any address is covered by at least one route in each of
    /// the two subtrees.
    pub(crate) fn overlaps(&self, other: &Self, depth: usize) -> bool {
        let mut n = self;
        let mut o = other;

        // 1. do any routes overlap?
        if !n.prefixes.is_empty()
            && !o.prefixes.is_empty()
            && n.overlaps_routes(o)
        {
            return true;
        }

        // 2. do routes overlap any child slot? Try the cheaper direction
        // first.
        if n.children.len() > o.children.len() {
            std::mem::swap(&mut n, &mut o);
        }
        if !n.prefixes.is_empty()
            && !o.children.is_empty()
            && n.overlaps_children_in(o)
        {
            return true;
        }
        if !o.prefixes.is_empty()
            && !n.children.is_empty()
            && o.overlaps_children_in(n)
        {
            return true;
        }

        // 3. children with the same octet in both nodes
        if n.children.is_empty() || o.children.is_empty() {
            return false;
        }
        if !n.children.bits().intersects_any(o.children.bits()) {
            return false;
        }
        n.overlaps_same_children(o, depth)
    }

    /// Route-vs-route cross check between two nodes.
    fn overlaps_routes(&self, other: &Self) -> bool {
        // identical indices are a trivial overlap
        if self.prefixes.bits().intersects_any(other.prefixes.bits()) {
            return true;
        }

        // zip over both sides at once; indices below the other side's
        // lowest cannot be covered by it, so each scan starts there
        let mut self_cursor = other.prefixes.bits().first_set();
        let mut other_cursor = self.prefixes.bits().first_set();

        while self_cursor.is_some() || other_cursor.is_some() {
            if let Some(from) = self_cursor {
                self_cursor = match self.prefixes.bits().next_set(from) {
                    Some(idx) => {
                        if other.lpm_test(idx as usize) {
                            return true;
                        }
                        idx.checked_add(1)
                    }
                    None => None,
                };
            }
            if let Some(from) = other_cursor {
                other_cursor = match other.prefixes.bits().next_set(from) {
                    Some(idx) => {
                        if self.lpm_test(idx as usize) {
                            return true;
                        }
                        idx.checked_add(1)
                    }
                    None => None,
                };
            }
        }

        false
    }

    /// Do the routes of `self` overlap any child slot of `other`?
    fn overlaps_children_in(&self, other: &Self) -> bool {
        let pfx_count = self.prefixes.len();
        let child_count = other.children.len();

        // crossover between the range scan and the bitset union, found
        // by benchmark
        let magic = 15;
        if child_count < magic || pfx_count > magic {
            for octet in other.children.bits().ones() {
                if self.lpm_test(host_idx(octet)) {
                    return true;
                }
            }
            return false;
        }

        // union the host-route allotments of all routes, then one
        // intersection against the child bitset
        let mut host_routes = BitSet256::new();
        for idx in self.prefixes.bits().ones() {
            host_routes = host_routes.union(allot::host_routes(idx));
        }
        host_routes.intersects_any(other.children.bits())
    }

    fn overlaps_same_children(&self, other: &Self, depth: usize) -> bool {
        let common =
            self.children.bits().intersection(other.children.bits());
        for octet in common.ones() {
            if overlaps_two_children(
                self.children.must_get(octet),
                other.children.must_get(octet),
                depth + 1,
            ) {
                return true;
            }
        }
        false
    }

    /// True if any route below this node overlaps `pfx`, whose octet
    /// path runs through this node at `depth`.
    pub(crate) fn overlaps_prefix_at_depth(
        &self,
        pfx: &Prefix,
        depth: usize,
    ) -> bool {
        let octets = addr_octets(pfx.addr());
        let (last_idx, last_bits) = last_octet_idx_and_bits(pfx.len());

        let mut n = self;
        let mut depth = depth;
        loop {
            let octet = octets[depth];

            if depth == last_idx {
                return n.overlaps_idx(pfx_to_idx256(octet, last_bits));
            }

            // any route here already covers the prefix; no backtracking
            // needed, a forward test per level is enough
            if !n.prefixes.is_empty() && n.lpm_test(host_idx(octet)) {
                return true;
            }

            match n.children.get(octet) {
                None => return false,
                Some(Child::Node(node)) => {
                    n = node;
                    depth += 1;
                }
                Some(Child::Leaf(leaf)) => {
                    return prefixes_overlap(&leaf.prefix, pfx)
                }
                // the fringe covers its whole slot and the prefix runs
                // through it
                Some(Child::Fringe(_)) => return true,
            }
        }
    }

    /// Overlap of a prefix terminating in this node: a stored route
    /// covers it, it covers a stored route, or it covers a child
    /// subtree.
    fn overlaps_idx(&self, idx: u8) -> bool {
        if self.lpm_test(idx as usize) {
            return true;
        }
        if allot::prefix_routes(idx).intersects_any(self.prefixes.bits()) {
            return true;
        }
        allot::host_routes(idx).intersects_any(self.children.bits())
    }
}

fn overlaps_two_children<V: Clone>(
    a: &Child<V>,
    b: &Child<V>,
    depth: usize,
) -> bool {
    match (a, b) {
        (Child::Node(a), Child::Node(b)) => a.overlaps(b, depth),
        (Child::Node(node), Child::Leaf(leaf))
        | (Child::Leaf(leaf), Child::Node(node)) => {
            node.overlaps_prefix_at_depth(&leaf.prefix, depth)
        }
        (Child::Leaf(a), Child::Leaf(b)) => {
            prefixes_overlap(&a.prefix, &b.prefix)
        }
        // a fringe covers its entire slot; whatever shares the slot
        // overlaps it
        (Child::Fringe(_), _) | (_, Child::Fringe(_)) => true,
    }
}
