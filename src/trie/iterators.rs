//! Recursive traversal over a subtree: unordered, in CIDR sort order, and
//! the two range enumerations (covered subnets, covering supernets).
//!
//! All traversals drive a `yield`-style callback; a `false` return stops
//! the recursion immediately and is propagated to the caller.

use inetnum::addr::Prefix;

use crate::types::base_index::{
    idx_rank, idx_to_pfx, idx_to_range, netmask, pfx_to_idx,
};
use crate::types::prefix::{cidr_for_fringe, cidr_from_path};

use super::node::{Child, StrideNode};

impl<V: Clone> StrideNode<V> {
    /// Yield every route in the subtree in no particular order, the
    /// fastest shape for full scans.
    pub(crate) fn all_rec<F>(
        &self,
        path: &mut [u8; 16],
        depth: usize,
        is4: bool,
        f: &mut F,
    ) -> bool
    where
        F: FnMut(Prefix, &V) -> bool,
    {
        for (idx, val) in self.prefixes.iter() {
            if !f(cidr_from_path(path, depth, is4, idx), val) {
                return false;
            }
        }

        for (octet, child) in self.children.iter() {
            match child {
                Child::Node(node) => {
                    path[depth] = octet;
                    if !node.all_rec(path, depth + 1, is4, f) {
                        return false;
                    }
                }
                Child::Leaf(leaf) => {
                    if !f(leaf.prefix, &leaf.value) {
                        return false;
                    }
                }
                Child::Fringe(fringe) => {
                    let pfx = cidr_for_fringe(path, depth, is4, octet);
                    if !f(pfx, &fringe.value) {
                        return false;
                    }
                }
            }
        }

        true
    }

    /// Yield every route in the subtree in CIDR sort order: ascending
    /// address, then ascending prefix length at equal address.
    ///
    /// The node's own prefixes are walked by sort rank and the child
    /// slots are interleaved by octet. A child slot with the same octet
    /// as a prefix comes after it, since everything below the slot is
    /// longer than any intra-stride prefix.
    pub(crate) fn all_rec_sorted<F>(
        &self,
        path: &mut [u8; 16],
        depth: usize,
        is4: bool,
        f: &mut F,
    ) -> bool
    where
        F: FnMut(Prefix, &V) -> bool,
    {
        let mut indices: Vec<u8> = self.prefixes.bits().ones().collect();
        indices.sort_unstable_by_key(|&idx| idx_rank(idx));

        let child_octets: Vec<u8> = self.children.bits().ones().collect();
        let mut cursor = 0;

        for &idx in &indices {
            let (pfx_octet, _) = idx_to_pfx(idx);

            while cursor < child_octets.len()
                && child_octets[cursor] < pfx_octet
            {
                if !self.child_sorted(path, depth, is4, child_octets[cursor], f)
                {
                    return false;
                }
                cursor += 1;
            }

            if !f(
                cidr_from_path(path, depth, is4, idx),
                self.prefixes.must_get(idx),
            ) {
                return false;
            }
        }

        for &octet in &child_octets[cursor..] {
            if !self.child_sorted(path, depth, is4, octet, f) {
                return false;
            }
        }

        true
    }

    fn child_sorted<F>(
        &self,
        path: &mut [u8; 16],
        depth: usize,
        is4: bool,
        octet: u8,
        f: &mut F,
    ) -> bool
    where
        F: FnMut(Prefix, &V) -> bool,
    {
        match self.children.must_get(octet) {
            Child::Node(node) => {
                path[depth] = octet;
                node.all_rec_sorted(path, depth + 1, is4, f)
            }
            Child::Leaf(leaf) => f(leaf.prefix, &leaf.value),
            Child::Fringe(fringe) => {
                f(cidr_for_fringe(path, depth, is4, octet), &fringe.value)
            }
        }
    }

    /// Yield this node's routes along the backtracking chain of
    /// `path[depth]` with intra-stride length `len`, most specific
    /// first. This is the per-stride step of supernet enumeration.
    pub(crate) fn each_lookup_prefix<F>(
        &self,
        path: &[u8; 16],
        depth: usize,
        is4: bool,
        len: u8,
        f: &mut F,
    ) -> bool
    where
        F: FnMut(Prefix, &V) -> bool,
    {
        if self.prefixes.is_empty() {
            return true;
        }

        let mut idx = pfx_to_idx(path[depth], len);
        while idx > 0 {
            if idx < 256 && self.prefixes.bits().test(idx as u8) {
                let pfx = cidr_from_path(path, depth, is4, idx as u8);
                if !f(pfx, self.prefixes.must_get(idx as u8)) {
                    return false;
                }
            }
            idx >>= 1;
        }

        true
    }

    /// As [`Self::each_lookup_prefix`], but least specific first, the
    /// order the CIDR-sorted supernet enumeration needs.
    pub(crate) fn each_covering<F>(
        &self,
        path: &[u8; 16],
        depth: usize,
        is4: bool,
        len: u8,
        f: &mut F,
    ) -> bool
    where
        F: FnMut(Prefix, &V) -> bool,
    {
        if self.prefixes.is_empty() {
            return true;
        }

        // the chain has at most nine links (host route up to idx 1)
        let mut links = [0usize; 9];
        let mut count = 0;
        let mut idx = pfx_to_idx(path[depth], len);
        while idx > 0 {
            links[count] = idx;
            count += 1;
            idx >>= 1;
        }

        for &idx in links[..count].iter().rev() {
            if idx < 256 && self.prefixes.bits().test(idx as u8) {
                let pfx = cidr_from_path(path, depth, is4, idx as u8);
                if !f(pfx, self.prefixes.must_get(idx as u8)) {
                    return false;
                }
            }
        }

        true
    }

    /// Yield every route in this node and below covered by the prefix
    /// `path[..=depth]/len`, in CIDR sort order. The node sits at the
    /// prefix's own level; deeper subtrees inside the covered octet
    /// range are emitted whole.
    pub(crate) fn each_subnet<F>(
        &self,
        path: &mut [u8; 16],
        depth: usize,
        is4: bool,
        len: u8,
        f: &mut F,
    ) -> bool
    where
        F: FnMut(Prefix, &V) -> bool,
    {
        let first = path[depth];
        let last = first | !netmask(len);

        let mut indices: Vec<u8> = self
            .prefixes
            .bits()
            .ones()
            .filter(|&idx| {
                let (idx_first, idx_last) = idx_to_range(idx);
                idx_first >= first && idx_last <= last
            })
            .collect();
        indices.sort_unstable_by_key(|&idx| idx_rank(idx));

        let child_octets: Vec<u8> = self
            .children
            .bits()
            .ones()
            .filter(|&octet| octet >= first && octet <= last)
            .collect();
        let mut cursor = 0;

        for &idx in &indices {
            let (pfx_octet, _) = idx_to_pfx(idx);

            while cursor < child_octets.len()
                && child_octets[cursor] < pfx_octet
            {
                if !self.child_sorted(path, depth, is4, child_octets[cursor], f)
                {
                    return false;
                }
                cursor += 1;
            }

            if !f(
                cidr_from_path(path, depth, is4, idx),
                self.prefixes.must_get(idx),
            ) {
                return false;
            }
        }

        for &octet in &child_octets[cursor..] {
            if !self.child_sorted(path, depth, is4, octet, f) {
                return false;
            }
        }

        true
    }
}
