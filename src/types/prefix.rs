//! Byte-level plumbing between [`inetnum::addr::Prefix`] and the trie.
//!
//! The trie consumes addresses as big-endian octets, four for IPv4 and
//! sixteen for IPv6, and reconstructs prefixes from the octet path walked
//! so far. All prefixes handed to the trie are canonical: the bits past
//! the prefix length are zero.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use inetnum::addr::Prefix;

use super::base_index::{
    idx_to_pfx, last_octet_idx_and_bits, netmask, STRIDE_LEN,
};

pub(crate) fn is_v4(pfx: &Prefix) -> bool {
    matches!(pfx.addr(), IpAddr::V4(_))
}

/// The address as 16 big-endian octets. IPv4 occupies the first four, the
/// tail stays zero; the trie never looks past the family's last octet.
pub(crate) fn addr_octets(addr: IpAddr) -> [u8; 16] {
    match addr {
        IpAddr::V4(addr) => {
            let mut octets = [0; 16];
            octets[..4].copy_from_slice(&addr.octets());
            octets
        }
        IpAddr::V6(addr) => addr.octets(),
    }
}

/// Build a prefix from an octet path. The octets must already be masked
/// to `bits`.
pub(crate) fn from_octets(octets: &[u8; 16], is4: bool, bits: u8) -> Prefix {
    let addr = if is4 {
        IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
    } else {
        IpAddr::V6(Ipv6Addr::from(*octets))
    };
    Prefix::new(addr, bits).unwrap()
}

/// Canonicalize: zero every address bit past the prefix length.
pub(crate) fn masked(pfx: &Prefix) -> Prefix {
    let bits = pfx.len();
    let mut octets = addr_octets(pfx.addr());
    let (last_idx, last_bits) = last_octet_idx_and_bits(bits);

    if last_idx < octets.len() {
        octets[last_idx] &= netmask(last_bits);
        for octet in &mut octets[last_idx + 1..] {
            *octet = 0;
        }
    }
    from_octets(&octets, is_v4(pfx), bits)
}

/// A leaf is a fringe when it sits exactly one level above its terminal
/// node, i.e. its prefix length is a whole number of strides and the next
/// descent step would reach its own level. A fringe is the default route
/// for everything below its child slot.
pub(crate) fn is_fringe(depth: usize, bits: u8) -> bool {
    let (last_idx, last_bits) = last_octet_idx_and_bits(bits);
    last_idx > 0 && depth == last_idx - 1 && last_bits == 0
}

/// Rebuild the prefix for base index `idx` in the node reached via
/// `path[..depth]`.
pub(crate) fn cidr_from_path(
    path: &[u8; 16],
    depth: usize,
    is4: bool,
    idx: u8,
) -> Prefix {
    let (octet, len) = idx_to_pfx(idx);
    let mut path = *path;
    path[depth] = octet;
    for octet in &mut path[depth + 1..] {
        *octet = 0;
    }
    from_octets(&path, is4, depth as u8 * STRIDE_LEN + len)
}

/// Rebuild the implicit prefix of a fringe in child slot `octet` of the
/// node reached via `path[..depth]`.
pub(crate) fn cidr_for_fringe(
    path: &[u8; 16],
    depth: usize,
    is4: bool,
    octet: u8,
) -> Prefix {
    let mut path = *path;
    path[depth] = octet;
    for octet in &mut path[depth + 1..] {
        *octet = 0;
    }
    from_octets(&path, is4, (depth as u8 + 1) * STRIDE_LEN)
}

/// Does the (canonical) prefix cover the address given as octets? The
/// caller guarantees matching families.
pub(crate) fn prefix_contains(pfx: &Prefix, octets: &[u8; 16]) -> bool {
    let own = addr_octets(pfx.addr());
    let (last_idx, last_bits) = last_octet_idx_and_bits(pfx.len());

    if own[..last_idx] != octets[..last_idx] {
        return false;
    }
    if last_bits == 0 || last_idx >= own.len() {
        return true;
    }
    own[last_idx] == octets[last_idx] & netmask(last_bits)
}

/// Do two same-family canonical prefixes share any address? True iff the
/// shorter one covers the longer one's network address.
pub(crate) fn prefixes_overlap(a: &Prefix, b: &Prefix) -> bool {
    let (wide, narrow) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    prefix_contains(wide, &addr_octets(narrow.addr()))
}

//------------ Tests ---------------------------------------------------------
