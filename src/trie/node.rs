//! One level of the multibit trie.
//!
//! A node holds two popcount-compressed arrays: the intra-stride prefixes,
//! keyed by base index and forming a complete binary tree, and the child
//! slots, keyed by address octet. A child slot is either the next level
//! node or a path-compressed leaf, so a prefix never forces a chain of
//! otherwise empty levels into existence.
//!
//! Child nodes sit behind an `Arc` and every mutating descent goes through
//! `Arc::make_mut`: a node is only cloned when it is shared with another
//! tree. This one mechanism gives both in-place mutation on an unshared
//! table and copy-on-write path cloning for the persistent operations.

use std::sync::Arc;

use inetnum::addr::Prefix;
use log::trace;

use crate::allot;
use crate::sparse::SparseArray256;
use crate::types::base_index::{last_octet_idx_and_bits, pfx_to_idx256};
use crate::types::prefix::{
    addr_octets, cidr_for_fringe, cidr_from_path, is_fringe, is_v4,
};

//------------ Child ---------------------------------------------------------

/// A child slot: the next trie level or a path-compressed prefix.
#[derive(Clone, Debug)]
pub(crate) enum Child<V> {
    Node(Arc<StrideNode<V>>),
    Leaf(LeafNode<V>),
    Fringe(FringeNode<V>),
}

/// A path-compressed prefix with its value.
#[derive(Clone, Debug)]
pub(crate) struct LeafNode<V> {
    pub prefix: Prefix,
    pub value: V,
}

/// A path-compressed prefix anchored exactly one stride above its
/// terminal node: the default route for everything below its child slot.
/// Its prefix is implicit in the octet path, so only the value is kept.
#[derive(Clone, Debug)]
pub(crate) struct FringeNode<V> {
    pub value: V,
}

//------------ StrideNode ----------------------------------------------------

#[derive(Clone, Debug)]
pub(crate) struct StrideNode<V> {
    pub(crate) prefixes: SparseArray256<V>,
    pub(crate) children: SparseArray256<Child<V>>,
}

impl<V> StrideNode<V> {
    pub(crate) fn new() -> Self {
        StrideNode {
            prefixes: SparseArray256::new(),
            children: SparseArray256::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.children.is_empty()
    }
}

impl<V> Default for StrideNode<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> StrideNode<V> {
    /// Insert `pfx`/`val` into the trie below this node, which sits at
    /// `depth`. The prefix must be canonical. Returns the previous value
    /// if the prefix was already present.
    ///
    /// A colliding path-compressed child is pushed one level down into a
    /// fresh node and the descent continues into it.
    pub(crate) fn insert_at_depth(
        &mut self,
        pfx: &Prefix,
        val: V,
        depth: usize,
    ) -> Option<V> {
        let bits = pfx.len();
        let octets = addr_octets(pfx.addr());
        let (last_idx, last_bits) = last_octet_idx_and_bits(bits);

        let mut n = self;
        let mut depth = depth;
        loop {
            let octet = octets[depth];

            // the last significant octet: the prefix lives in this node
            if depth == last_idx {
                return n
                    .prefixes
                    .insert_at(pfx_to_idx256(octet, last_bits), val);
            }

            // a free slot takes the prefix path-compressed
            if n.children.get(octet).is_none() {
                let child = if is_fringe(depth, bits) {
                    Child::Fringe(FringeNode { value: val })
                } else {
                    Child::Leaf(LeafNode { prefix: *pfx, value: val })
                };
                n.children.insert_at(octet, child);
                return None;
            }

            match n.children.must_get_mut(octet) {
                Child::Node(node) => {
                    n = Arc::make_mut(node);
                    depth += 1;
                }
                Child::Leaf(leaf) if leaf.prefix == *pfx => {
                    return Some(std::mem::replace(&mut leaf.value, val));
                }
                Child::Fringe(fringe) if is_fringe(depth, bits) => {
                    return Some(std::mem::replace(&mut fringe.value, val));
                }
                slot => {
                    // the slot holds a different compressed prefix: push
                    // it one level down and keep descending
                    trace!("push compressed prefix below depth {}", depth);
                    let node = push_down(slot, depth);
                    n = node;
                    depth += 1;
                }
            }
        }
    }

    /// Insert or rewrite the value for `pfx` through a callback that sees
    /// the current value, if any. Returns the new value and whether the
    /// prefix already existed.
    pub(crate) fn update_at_depth(
        &mut self,
        pfx: &Prefix,
        f: impl FnOnce(Option<&V>) -> V,
        depth: usize,
    ) -> (V, bool) {
        let bits = pfx.len();
        let octets = addr_octets(pfx.addr());
        let (last_idx, last_bits) = last_octet_idx_and_bits(bits);

        let mut n = self;
        let mut depth = depth;
        loop {
            let octet = octets[depth];

            if depth == last_idx {
                let (val, existed) = n
                    .prefixes
                    .update_at(pfx_to_idx256(octet, last_bits), f);
                return (val.clone(), existed);
            }

            if n.children.get(octet).is_none() {
                let val = f(None);
                let child = if is_fringe(depth, bits) {
                    Child::Fringe(FringeNode { value: val.clone() })
                } else {
                    Child::Leaf(LeafNode {
                        prefix: *pfx,
                        value: val.clone(),
                    })
                };
                n.children.insert_at(octet, child);
                return (val, false);
            }

            match n.children.must_get_mut(octet) {
                Child::Node(node) => {
                    n = Arc::make_mut(node);
                    depth += 1;
                }
                Child::Leaf(leaf) if leaf.prefix == *pfx => {
                    leaf.value = f(Some(&leaf.value));
                    return (leaf.value.clone(), true);
                }
                Child::Fringe(fringe) if is_fringe(depth, bits) => {
                    fringe.value = f(Some(&fringe.value));
                    return (fringe.value.clone(), true);
                }
                slot => {
                    let node = push_down(slot, depth);
                    n = node;
                    depth += 1;
                }
            }
        }
    }

    /// Exact-match retrieval below this node.
    pub(crate) fn get_at_depth(
        &self,
        pfx: &Prefix,
        depth: usize,
    ) -> Option<&V> {
        let octets = addr_octets(pfx.addr());
        let (last_idx, last_bits) = last_octet_idx_and_bits(pfx.len());

        let mut n = self;
        let mut depth = depth;
        loop {
            let octet = octets[depth];
            if depth == last_idx {
                return n.prefixes.get(pfx_to_idx256(octet, last_bits));
            }
            match n.children.get(octet)? {
                Child::Node(node) => {
                    n = node;
                    depth += 1;
                }
                Child::Leaf(leaf) => {
                    return (leaf.prefix == *pfx).then_some(&leaf.value)
                }
                Child::Fringe(fringe) => {
                    return is_fringe(depth, pfx.len())
                        .then_some(&fringe.value)
                }
            }
        }
    }

    /// Remove `pfx` from the trie below this node. On the way back up,
    /// every node left behind is purged or compressed so that the shape
    /// invariants hold again: no empty node, no node holding nothing but
    /// a single prefix or a single compressed child.
    pub(crate) fn remove_at_depth(
        &mut self,
        pfx: &Prefix,
        depth: usize,
    ) -> Option<V> {
        let octets = addr_octets(pfx.addr());
        let (last_idx, last_bits) = last_octet_idx_and_bits(pfx.len());
        let octet = octets[depth];

        if depth == last_idx {
            return self.prefixes.delete_at(pfx_to_idx256(octet, last_bits));
        }

        let descend = match self.children.get(octet)? {
            Child::Node(_) => true,
            Child::Leaf(leaf) => {
                if leaf.prefix != *pfx {
                    return None;
                }
                false
            }
            Child::Fringe(_) => {
                if !is_fringe(depth, pfx.len()) {
                    return None;
                }
                false
            }
        };

        if !descend {
            return match self.children.delete_at(octet) {
                Some(Child::Leaf(leaf)) => Some(leaf.value),
                Some(Child::Fringe(fringe)) => Some(fringe.value),
                _ => None,
            };
        }

        let Some(Child::Node(node)) = self.children.get_mut(octet) else {
            unreachable!()
        };
        let value = Arc::make_mut(node).remove_at_depth(pfx, depth + 1)?;

        self.compress_child(&octets, depth, is_v4(pfx));
        Some(value)
    }

    /// Re-establish the shape invariants for the child node in slot
    /// `octets[depth]` after a removal below it.
    fn compress_child(&mut self, octets: &[u8; 16], depth: usize, is4: bool) {
        let octet = octets[depth];
        let Some(Child::Node(node)) = self.children.get(octet) else {
            return;
        };

        if node.is_empty() {
            // purge the unreachable node
            self.children.delete_at(octet);
            return;
        }

        match (node.prefixes.len(), node.children.len()) {
            (1, 0) => {
                // rebuild the only prefix and pull it one level up; it
                // lands as a leaf or fringe in the freed slot
                trace!("compress single prefix below depth {}", depth);
                let Some(Child::Node(node)) = self.children.delete_at(octet)
                else {
                    unreachable!()
                };
                let mut node = Arc::unwrap_or_clone(node);
                let idx = node.prefixes.bits().first_set().unwrap();
                let value = node.prefixes.delete_at(idx).unwrap();
                let pfx = cidr_from_path(octets, depth + 1, is4, idx);
                self.insert_at_depth(&pfx, value, depth);
            }
            (0, 1) => {
                // a single compressed child shifts one level up; another
                // node stays where it is
                let child_octet = node.children.bits().first_set().unwrap();
                if matches!(node.children.must_get(child_octet), Child::Node(_))
                {
                    return;
                }
                trace!("compress single child below depth {}", depth);
                let Some(Child::Node(node)) = self.children.delete_at(octet)
                else {
                    unreachable!()
                };
                let mut node = Arc::unwrap_or_clone(node);
                match node.children.delete_at(child_octet).unwrap() {
                    Child::Leaf(leaf) => {
                        self.insert_at_depth(&leaf.prefix, leaf.value, depth);
                    }
                    Child::Fringe(fringe) => {
                        let pfx = cidr_for_fringe(
                            octets,
                            depth + 1,
                            is4,
                            child_octet,
                        );
                        self.insert_at_depth(&pfx, fringe.value, depth);
                    }
                    Child::Node(_) => unreachable!(),
                }
            }
            _ => {}
        }
    }

    /// Longest-prefix-match within this stride: the highest base index on
    /// the backtracking chain of `idx` that holds a route. One bitset
    /// intersection against the precomputed chain mask.
    pub(crate) fn lpm_get(&self, idx: usize) -> Option<(u8, &V)> {
        let top = self
            .prefixes
            .bits()
            .intersection_top(allot::backtracking(idx))?;
        Some((top, self.prefixes.must_get(top)))
    }

    /// As [`Self::lpm_get`], without extracting the route.
    pub(crate) fn lpm_test(&self, idx: usize) -> bool {
        self.prefixes.bits().intersects_any(allot::backtracking(idx))
    }

    /// Merge another node's subtree into this one. On duplicate prefixes
    /// the other side's value wins. Returns the number of duplicates so
    /// the table can fix up its size counters.
    pub(crate) fn union_rec(
        &mut self,
        other: &StrideNode<V>,
        depth: usize,
    ) -> usize {
        let mut duplicates = 0;

        for (idx, val) in other.prefixes.iter() {
            if self.prefixes.insert_at(idx, val.clone()).is_some() {
                duplicates += 1;
            }
        }

        for (octet, other_child) in other.children.iter() {
            if self.children.get(octet).is_none() {
                // free slot: share the other subtree, copy the leaf
                self.children.insert_at(octet, other_child.clone());
                continue;
            }

            let slot = self.children.must_get_mut(octet);
            match (slot, other_child) {
                (Child::Node(node), Child::Node(other_node)) => {
                    duplicates +=
                        Arc::make_mut(node).union_rec(other_node, depth + 1);
                }
                (Child::Node(node), Child::Leaf(leaf)) => {
                    if Arc::make_mut(node)
                        .insert_at_depth(
                            &leaf.prefix,
                            leaf.value.clone(),
                            depth + 1,
                        )
                        .is_some()
                    {
                        duplicates += 1;
                    }
                }
                (Child::Node(node), Child::Fringe(fringe)) => {
                    // the other fringe is the default route of this
                    // subtree
                    if Arc::make_mut(node)
                        .prefixes
                        .insert_at(1, fringe.value.clone())
                        .is_some()
                    {
                        duplicates += 1;
                    }
                }
                (Child::Leaf(this_leaf), Child::Leaf(other_leaf))
                    if this_leaf.prefix == other_leaf.prefix =>
                {
                    this_leaf.value = other_leaf.value.clone();
                    duplicates += 1;
                }
                (Child::Fringe(this_fringe), Child::Fringe(other_fringe)) => {
                    // same implicit prefix by construction
                    this_fringe.value = other_fringe.value.clone();
                    duplicates += 1;
                }
                (slot, other_child) => {
                    // two different compressed prefixes in one slot: push
                    // ours down into a fresh node, then merge theirs
                    let node = push_down(slot, depth);
                    match other_child {
                        Child::Node(other_node) => {
                            duplicates +=
                                node.union_rec(other_node, depth + 1);
                        }
                        Child::Leaf(leaf) => {
                            if node
                                .insert_at_depth(
                                    &leaf.prefix,
                                    leaf.value.clone(),
                                    depth + 1,
                                )
                                .is_some()
                            {
                                duplicates += 1;
                            }
                        }
                        Child::Fringe(fringe) => {
                            if node
                                .prefixes
                                .insert_at(1, fringe.value.clone())
                                .is_some()
                            {
                                duplicates += 1;
                            }
                        }
                    }
                }
            }
        }

        duplicates
    }
}

/// Replace a compressed child slot by a fresh node that carries the
/// slot's previous occupant one level further down, and hand the node
/// back for the caller to descend into.
fn push_down<V: Clone>(
    slot: &mut Child<V>,
    depth: usize,
) -> &mut StrideNode<V> {
    let old =
        std::mem::replace(slot, Child::Node(Arc::new(StrideNode::new())));
    let Child::Node(node) = slot else { unreachable!() };
    let node = Arc::make_mut(node);
    match old {
        Child::Leaf(leaf) => {
            node.insert_at_depth(&leaf.prefix, leaf.value, depth + 1);
        }
        Child::Fringe(fringe) => {
            // a pushed-down fringe is the new node's default route
            node.prefixes.insert_at(1, fringe.value);
        }
        Child::Node(_) => unreachable!(),
    }
    node
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
impl<V: Clone> StrideNode<V> {
    /// Walk the subtree and assert the shape invariants of every
    /// non-root node.
    pub(crate) fn assert_invariants(&self, is_root: bool) {
        assert_eq!(self.prefixes.bits().count(), self.prefixes.len());
        assert_eq!(self.children.bits().count(), self.children.len());

        if !is_root {
            assert!(!self.is_empty(), "unreachable empty node");
            assert!(
                !(self.prefixes.len() == 1 && self.children.is_empty()),
                "uncompressed single-prefix node"
            );
            if self.prefixes.is_empty() && self.children.len() == 1 {
                let octet = self.children.bits().first_set().unwrap();
                assert!(
                    matches!(
                        self.children.must_get(octet),
                        Child::Node(_)
                    ),
                    "uncompressed single-leaf node"
                );
            }
        }

        for (_, child) in self.children.iter() {
            if let Child::Node(node) = child {
                node.assert_invariants(false);
            }
        }
    }
}
