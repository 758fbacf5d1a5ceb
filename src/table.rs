//! The user-visible routing table.
//!
//! A [`RouteTable`] keeps one trie per address family plus the route
//! counters, normalizes every incoming prefix to its canonical masked
//! form, and dispatches to the node-level machinery.

use std::net::IpAddr;

use inetnum::addr::Prefix;
use log::trace;

use crate::trie::{Child, StrideNode};
use crate::types::base_index::{
    host_idx, last_octet_idx_and_bits, pfx_to_idx, MAX_TREE_DEPTH,
};
use crate::types::prefix::{
    addr_octets, cidr_for_fringe, cidr_from_path, is_v4, masked,
    prefix_contains,
};

fn family_depth(is4: bool) -> usize {
    if is4 {
        4
    } else {
        MAX_TREE_DEPTH
    }
}

//------------ RouteTable ----------------------------------------------------

/// A map from IP prefixes (IPv4 and IPv6) to values of `V`, answering
/// exact-match, longest-prefix-match, coverage and overlap queries.
///
/// Prefixes may arrive in non-canonical form; they are masked before use.
/// A lookup never mixes families: an IPv4 address is only ever matched
/// against IPv4 routes.
///
/// Cloning is cheap: the two trees are shared between the clones and only
/// copied where one of them is later modified. The `*_persist` methods
/// build on the same mechanism and leave `self` untouched.
#[derive(Clone, Debug)]
pub struct RouteTable<V> {
    root4: StrideNode<V>,
    root6: StrideNode<V>,
    size4: usize,
    size6: usize,
}

impl<V> Default for RouteTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RouteTable<V> {
    pub fn new() -> Self {
        RouteTable {
            root4: StrideNode::new(),
            root6: StrideNode::new(),
            size4: 0,
            size6: 0,
        }
    }

    /// The number of routes in the table.
    pub fn size(&self) -> usize {
        self.size4 + self.size6
    }

    /// The number of IPv4 routes.
    pub fn size4(&self) -> usize {
        self.size4
    }

    /// The number of IPv6 routes.
    pub fn size6(&self) -> usize {
        self.size6
    }

    pub fn is_empty(&self) -> bool {
        self.size4 == 0 && self.size6 == 0
    }

    fn root_for(&self, is4: bool) -> &StrideNode<V> {
        if is4 {
            &self.root4
        } else {
            &self.root6
        }
    }

    fn root_for_mut(&mut self, is4: bool) -> &mut StrideNode<V> {
        if is4 {
            &mut self.root4
        } else {
            &mut self.root6
        }
    }

    fn size_for_mut(&mut self, is4: bool) -> &mut usize {
        if is4 {
            &mut self.size4
        } else {
            &mut self.size6
        }
    }
}

impl<V: Clone> RouteTable<V> {
    //--- mutation

    /// Insert a route. Returns the previous value if the prefix was
    /// already present.
    pub fn insert(&mut self, pfx: &Prefix, val: V) -> Option<V> {
        let pfx = masked(pfx);
        let is4 = is_v4(&pfx);

        let old = self.root_for_mut(is4).insert_at_depth(&pfx, val, 0);
        if old.is_none() {
            *self.size_for_mut(is4) += 1;
            trace!("inserted {}, size now {}", pfx, self.size());
        }
        old
    }

    /// Insert or rewrite the route for `pfx` through a callback that
    /// receives the current value, if any. Returns the new value.
    pub fn update(
        &mut self,
        pfx: &Prefix,
        f: impl FnOnce(Option<&V>) -> V,
    ) -> V {
        let pfx = masked(pfx);
        let is4 = is_v4(&pfx);

        let (val, existed) =
            self.root_for_mut(is4).update_at_depth(&pfx, f, 0);
        if !existed {
            *self.size_for_mut(is4) += 1;
        }
        val
    }

    /// Remove the route for `pfx`, returning its value. After removal
    /// the affected path is purged and compressed, so the tree never
    /// keeps nodes a fresh sequence of inserts would not create.
    pub fn remove(&mut self, pfx: &Prefix) -> Option<V> {
        let pfx = masked(pfx);
        let is4 = is_v4(&pfx);

        // a miss must not clone shared nodes along the path
        self.root_for(is4).get_at_depth(&pfx, 0)?;

        let val = self.root_for_mut(is4).remove_at_depth(&pfx, 0)?;
        *self.size_for_mut(is4) -= 1;
        trace!("removed {}, size now {}", pfx, self.size());
        Some(val)
    }

    /// Merge all routes of `other` into `self`. On duplicate prefixes
    /// the value from `other` wins.
    pub fn union_with(&mut self, other: &Self) {
        let dup4 = self.root4.union_rec(&other.root4, 0);
        let dup6 = self.root6.union_rec(&other.root6, 0);
        self.size4 += other.size4 - dup4;
        self.size6 += other.size6 - dup6;
    }

    //--- persistent variants

    /// As [`Self::insert`], but leaves `self` unchanged and returns a new
    /// table. The two tables share all subtrees off the insertion path.
    #[must_use]
    pub fn insert_persist(&self, pfx: &Prefix, val: V) -> Self {
        let mut tbl = self.clone();
        tbl.insert(pfx, val);
        tbl
    }

    /// As [`Self::remove`], but leaves `self` unchanged; returns the new
    /// table and the removed value.
    #[must_use]
    pub fn remove_persist(&self, pfx: &Prefix) -> (Self, Option<V>) {
        let mut tbl = self.clone();
        let val = tbl.remove(pfx);
        (tbl, val)
    }

    /// As [`Self::union_with`], but leaves `self` unchanged and returns
    /// the merged table.
    #[must_use]
    pub fn union_persist(&self, other: &Self) -> Self {
        let mut tbl = self.clone();
        tbl.union_with(other);
        tbl
    }

    //--- exact match

    /// The value stored for exactly this prefix, if any.
    pub fn get(&self, pfx: &Prefix) -> Option<&V> {
        let pfx = masked(pfx);
        self.root_for(is_v4(&pfx)).get_at_depth(&pfx, 0)
    }

    //--- longest prefix match

    /// The value of the most specific route covering `addr`.
    pub fn lookup(&self, addr: &IpAddr) -> Option<&V> {
        let is4 = matches!(addr, IpAddr::V4(_));
        let octets = addr_octets(*addr);

        let mut n = self.root_for(is4);
        let mut stack: Vec<&StrideNode<V>> =
            Vec::with_capacity(MAX_TREE_DEPTH);

        // descend as deep as the address path allows, remembering the
        // nodes seen
        for depth in 0..family_depth(is4) {
            stack.push(n);
            match n.children.get(octets[depth]) {
                None => break,
                Some(Child::Node(node)) => n = node,
                Some(Child::Leaf(leaf)) => {
                    if prefix_contains(&leaf.prefix, &octets) {
                        return Some(&leaf.value);
                    }
                    break;
                }
                // the fringe covers its whole slot, nothing below it can
                // be more specific
                Some(Child::Fringe(fringe)) => return Some(&fringe.value),
            }
        }

        // backtrack the per-node binary trees, deepest stride first
        for (depth, node) in stack.iter().enumerate().rev() {
            if let Some((_, val)) = node.lpm_get(host_idx(octets[depth])) {
                return Some(val);
            }
        }
        None
    }

    /// Is `addr` covered by any route? Cheaper than [`Self::lookup`]:
    /// one forward test per level, no backtracking.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        let is4 = matches!(addr, IpAddr::V4(_));
        let octets = addr_octets(*addr);

        let mut n = self.root_for(is4);
        for depth in 0..family_depth(is4) {
            let octet = octets[depth];
            if n.lpm_test(host_idx(octet)) {
                return true;
            }
            match n.children.get(octet) {
                None => return false,
                Some(Child::Node(node)) => n = node,
                Some(Child::Leaf(leaf)) => {
                    return prefix_contains(&leaf.prefix, &octets)
                }
                Some(Child::Fringe(_)) => return true,
            }
        }
        false
    }

    /// The value of the most specific route covering the whole of `pfx`.
    pub fn lookup_prefix(&self, pfx: &Prefix) -> Option<&V> {
        self.lookup_prefix_lpm_impl(masked(pfx)).map(|(_, val)| val)
    }

    /// As [`Self::lookup_prefix`], also returning the matched prefix.
    pub fn lookup_prefix_lpm(&self, pfx: &Prefix) -> Option<(Prefix, &V)> {
        self.lookup_prefix_lpm_impl(masked(pfx))
    }

    fn lookup_prefix_lpm_impl(&self, pfx: Prefix) -> Option<(Prefix, &V)> {
        let is4 = is_v4(&pfx);
        let octets = addr_octets(pfx.addr());
        let (last_idx, last_bits) = last_octet_idx_and_bits(pfx.len());

        let mut n = self.root_for(is4);
        let mut stack: Vec<&StrideNode<V>> =
            Vec::with_capacity(MAX_TREE_DEPTH);
        let mut depth = 0;

        loop {
            stack.push(n);
            if depth == last_idx {
                break;
            }
            let octet = octets[depth];
            match n.children.get(octet) {
                None => break,
                Some(Child::Node(node)) => {
                    n = node;
                    depth += 1;
                }
                Some(Child::Leaf(leaf)) => {
                    if leaf.prefix.len() <= pfx.len()
                        && prefix_contains(&leaf.prefix, &octets)
                    {
                        return Some((leaf.prefix, &leaf.value));
                    }
                    break;
                }
                Some(Child::Fringe(fringe)) => {
                    // one stride boundary above the prefix's own level,
                    // on its path: always covers it
                    let fringe_pfx =
                        cidr_for_fringe(&octets, depth, is4, octet);
                    return Some((fringe_pfx, &fringe.value));
                }
            }
        }

        for (depth, node) in stack.iter().enumerate().rev() {
            if node.prefixes.is_empty() {
                continue;
            }
            let idx = if depth == last_idx {
                pfx_to_idx(octets[depth], last_bits)
            } else {
                host_idx(octets[depth])
            };
            if let Some((top, val)) = node.lpm_get(idx) {
                return Some((
                    cidr_from_path(&octets, depth, is4, top),
                    val,
                ));
            }
        }
        None
    }

    //--- overlap

    /// Does any route overlap `pfx`, in either direction?
    pub fn overlaps_prefix(&self, pfx: &Prefix) -> bool {
        let pfx = masked(pfx);
        self.root_for(is_v4(&pfx)).overlaps_prefix_at_depth(&pfx, 0)
    }

    /// Do the two tables share any covered address, in any family?
    pub fn overlaps(&self, other: &Self) -> bool {
        self.overlaps4(other) || self.overlaps6(other)
    }

    /// As [`Self::overlaps`] for the IPv4 trees only.
    pub fn overlaps4(&self, other: &Self) -> bool {
        self.size4 != 0
            && other.size4 != 0
            && self.root4.overlaps(&other.root4, 0)
    }

    /// As [`Self::overlaps`] for the IPv6 trees only.
    pub fn overlaps6(&self, other: &Self) -> bool {
        self.size6 != 0
            && other.size6 != 0
            && self.root6.overlaps(&other.root6, 0)
    }

    //--- iteration

    /// Call `f` for every route, both families, in no particular order.
    /// Iteration stops early when `f` returns `false`; the return value
    /// is `false` iff that happened.
    pub fn all(&self, mut f: impl FnMut(Prefix, &V) -> bool) -> bool {
        let mut path = [0; 16];
        self.root4.all_rec(&mut path, 0, true, &mut f)
            && self.root6.all_rec(&mut path, 0, false, &mut f)
    }

    /// Call `f` for every route, both families, in CIDR sort order
    /// (IPv4 first).
    pub fn all_sorted(&self, mut f: impl FnMut(Prefix, &V) -> bool) -> bool {
        let mut path = [0; 16];
        self.root4.all_rec_sorted(&mut path, 0, true, &mut f)
            && self.root6.all_rec_sorted(&mut path, 0, false, &mut f)
    }

    /// Call `f` for every IPv4 route in no particular order.
    pub fn all4(&self, mut f: impl FnMut(Prefix, &V) -> bool) -> bool {
        self.root4.all_rec(&mut [0; 16], 0, true, &mut f)
    }

    /// Call `f` for every IPv6 route in no particular order.
    pub fn all6(&self, mut f: impl FnMut(Prefix, &V) -> bool) -> bool {
        self.root6.all_rec(&mut [0; 16], 0, false, &mut f)
    }

    /// Call `f` for every IPv4 route in CIDR sort order.
    pub fn all4_sorted(&self, mut f: impl FnMut(Prefix, &V) -> bool) -> bool {
        self.root4.all_rec_sorted(&mut [0; 16], 0, true, &mut f)
    }

    /// Call `f` for every IPv6 route in CIDR sort order.
    pub fn all6_sorted(&self, mut f: impl FnMut(Prefix, &V) -> bool) -> bool {
        self.root6.all_rec_sorted(&mut [0; 16], 0, false, &mut f)
    }

    /// Call `f` for every route covered by `pfx`, in CIDR sort order.
    pub fn subnets(
        &self,
        pfx: &Prefix,
        f: impl FnMut(Prefix, &V) -> bool,
    ) -> bool {
        self.each_subnet(pfx, f)
    }

    /// The lower-level form of [`Self::subnets`]: identical enumeration,
    /// offered for symmetry with [`Self::each_lookup_prefix`].
    pub fn each_subnet(
        &self,
        pfx: &Prefix,
        mut f: impl FnMut(Prefix, &V) -> bool,
    ) -> bool {
        let pfx = masked(pfx);
        let is4 = is_v4(&pfx);
        let octets = addr_octets(pfx.addr());
        let (last_idx, last_bits) = last_octet_idx_and_bits(pfx.len());

        let mut n = self.root_for(is4);
        let mut depth = 0;
        loop {
            if depth == last_idx {
                let mut path = octets;
                return n.each_subnet(&mut path, depth, is4, last_bits, &mut f);
            }
            let octet = octets[depth];
            match n.children.get(octet) {
                None => return true,
                Some(Child::Node(node)) => {
                    n = node;
                    depth += 1;
                }
                Some(Child::Leaf(leaf)) => {
                    // sole candidate at or below this point
                    if leaf.prefix.len() >= pfx.len()
                        && prefix_contains(
                            &pfx,
                            &addr_octets(leaf.prefix.addr()),
                        )
                    {
                        return f(leaf.prefix, &leaf.value);
                    }
                    return true;
                }
                Some(Child::Fringe(fringe)) => {
                    let fringe_pfx =
                        cidr_for_fringe(&octets, depth, is4, octet);
                    if fringe_pfx.len() >= pfx.len() {
                        return f(fringe_pfx, &fringe.value);
                    }
                    return true;
                }
            }
        }
    }

    /// Call `f` for every route covering `pfx`, in CIDR sort order,
    /// i.e. shortest mask first.
    pub fn supernets(
        &self,
        pfx: &Prefix,
        mut f: impl FnMut(Prefix, &V) -> bool,
    ) -> bool {
        let pfx = masked(pfx);
        let is4 = is_v4(&pfx);
        let octets = addr_octets(pfx.addr());
        let (last_idx, last_bits) = last_octet_idx_and_bits(pfx.len());

        let mut n = self.root_for(is4);
        let mut depth = 0;
        loop {
            // this node's covering routes, least specific first
            let len = if depth == last_idx { last_bits } else { 8 };
            if !n.each_covering(&octets, depth, is4, len, &mut f) {
                return false;
            }
            if depth == last_idx {
                return true;
            }

            let octet = octets[depth];
            match n.children.get(octet) {
                None => return true,
                Some(Child::Node(node)) => {
                    n = node;
                    depth += 1;
                }
                Some(Child::Leaf(leaf)) => {
                    if leaf.prefix.len() <= pfx.len()
                        && prefix_contains(&leaf.prefix, &octets)
                    {
                        return f(leaf.prefix, &leaf.value);
                    }
                    return true;
                }
                Some(Child::Fringe(fringe)) => {
                    let fringe_pfx =
                        cidr_for_fringe(&octets, depth, is4, octet);
                    return f(fringe_pfx, &fringe.value);
                }
            }
        }
    }

    /// Call `f` for every route covering `pfx`, most specific first:
    /// the backtracking order of the longest-prefix-match itself.
    pub fn each_lookup_prefix(
        &self,
        pfx: &Prefix,
        mut f: impl FnMut(Prefix, &V) -> bool,
    ) -> bool {
        let pfx = masked(pfx);
        let is4 = is_v4(&pfx);
        let octets = addr_octets(pfx.addr());
        let (last_idx, last_bits) = last_octet_idx_and_bits(pfx.len());

        let mut n = self.root_for(is4);
        let mut stack: Vec<&StrideNode<V>> =
            Vec::with_capacity(MAX_TREE_DEPTH);
        let mut depth = 0;

        // a covering leaf or fringe found on the way down is the most
        // specific candidate of all
        let mut compressed: Option<(Prefix, &V)> = None;

        loop {
            stack.push(n);
            if depth == last_idx {
                break;
            }
            let octet = octets[depth];
            match n.children.get(octet) {
                None => break,
                Some(Child::Node(node)) => {
                    n = node;
                    depth += 1;
                }
                Some(Child::Leaf(leaf)) => {
                    if leaf.prefix.len() <= pfx.len()
                        && prefix_contains(&leaf.prefix, &octets)
                    {
                        compressed = Some((leaf.prefix, &leaf.value));
                    }
                    break;
                }
                Some(Child::Fringe(fringe)) => {
                    let fringe_pfx =
                        cidr_for_fringe(&octets, depth, is4, octet);
                    compressed = Some((fringe_pfx, &fringe.value));
                    break;
                }
            }
        }

        if let Some((pfx, val)) = compressed {
            if !f(pfx, val) {
                return false;
            }
        }

        for (depth, node) in stack.iter().enumerate().rev() {
            let len = if depth == last_idx { last_bits } else { 8 };
            if !node.each_lookup_prefix(&octets, depth, is4, len, &mut f) {
                return false;
            }
        }
        true
    }
}

//------------ Tests ---------------------------------------------------------
