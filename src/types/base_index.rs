//! The base-index mapping of the ART algorithm.
//!
//! An 8-bit stride holds its prefixes as a complete binary tree: the prefix
//! `octet/len` with `len` in `0..=8` lives at index
//!
//! ```text
//!     idx = (octet >> (8 - len)) + (1 << len)
//! ```
//!
//! so index 1 is the stride's default route, 1..=255 are the intra-stride
//! prefixes and 256..=511 are the host routes. The parent of index `i` in
//! the tree is `i >> 1`. Everything derivable from this formula (the
//! inverse mapping, the covered host-route range, the CIDR sort rank) is
//! precomputed once into [`BASE_IDX_LOOKUP_TBL`] at compile time.

/// Number of address bits consumed per trie level.
pub(crate) const STRIDE_LEN: u8 = 8;

/// Trie depth bound: 4 levels for IPv4, 16 for IPv6.
pub(crate) const MAX_TREE_DEPTH: usize = 16;

/// Base index of the first host route, `pfx_to_idx(0, 8)`.
pub(crate) const FIRST_HOST_IDX: usize = 256;

// hostMasks[len] has the bits past an intra-stride prefix of that length.
const HOST_MASKS: [u8; 9] = [
    0b1111_1111, // len == 0
    0b0111_1111, // len == 1
    0b0011_1111, // len == 2
    0b0001_1111, // len == 3
    0b0000_1111, // len == 4
    0b0000_0111, // len == 5
    0b0000_0011, // len == 6
    0b0000_0001, // len == 7
    0b0000_0000, // len == 8
];

pub(crate) const fn netmask(len: u8) -> u8 {
    !HOST_MASKS[len as usize]
}

/// Map `octet/len` to its base index, the heap function of the complete
/// binary tree. `len` may be 8, yielding a host route index >= 256.
pub(crate) fn pfx_to_idx(octet: u8, len: u8) -> usize {
    (octet as usize >> (STRIDE_LEN - len) as usize) + (1 << len)
}

/// As [`pfx_to_idx`] for stored prefixes, where `len < 8` always holds
/// (whole-octet prefixes are path-compressed or become the default route
/// one level down) and the index fits the 256-slot prefix array.
pub(crate) fn pfx_to_idx256(octet: u8, len: u8) -> u8 {
    pfx_to_idx(octet, len) as u8
}

/// The host route index of an address octet, `pfx_to_idx(octet, 8)`.
pub(crate) fn host_idx(octet: u8) -> usize {
    octet as usize + FIRST_HOST_IDX
}

/// Split a prefix bit count into the index of its last significant octet
/// and the prefix length within that octet.
pub(crate) fn last_octet_idx_and_bits(bits: u8) -> (usize, u8) {
    ((bits >> 3) as usize, bits & 7)
}

/// The inverse of [`pfx_to_idx256`]: masked octet and intra-stride length
/// of a stored prefix index.
pub(crate) fn idx_to_pfx(idx: u8) -> (u8, u8) {
    let item = &BASE_IDX_LOOKUP_TBL[idx as usize];
    (item.octet, item.bits as u8)
}

/// The inclusive range of address octets covered by a stored prefix
/// index.
pub(crate) fn idx_to_range(idx: u8) -> (u8, u8) {
    let item = &BASE_IDX_LOOKUP_TBL[idx as usize];
    (
        (item.lower as usize - FIRST_HOST_IDX) as u8,
        (item.upper as usize - FIRST_HOST_IDX) as u8,
    )
}

/// The CIDR sort rank of a base index: ascending masked octet, then
/// ascending prefix length. Sorting stride indices by this key yields the
/// natural prefix sort order.
pub(crate) fn idx_rank(idx: u8) -> u16 {
    BASE_IDX_LOOKUP_TBL[idx as usize].rank
}

//------------ BASE_IDX_LOOKUP_TBL -------------------------------------------

#[derive(Copy, Clone, Debug)]
pub(crate) struct IdxEntry {
    /// masked octet of the prefix at this index
    pub octet: u8,
    /// intra-stride prefix length, -1 for the invalid index 0
    pub bits: i8,
    /// first covered host route index
    pub lower: u16,
    /// last covered host route index
    pub upper: u16,
    /// CIDR sort rank over all 511 valid indices, 1-based
    pub rank: u16,
}

/// Everything the closed form gives per base index, evaluated at compile
/// time.
pub(crate) static BASE_IDX_LOOKUP_TBL: [IdxEntry; 512] = base_idx_tbl();

const fn base_idx_tbl() -> [IdxEntry; 512] {
    let mut tbl = [IdxEntry {
        octet: 0,
        bits: -1,
        lower: 0,
        upper: 0,
        rank: 0,
    }; 512];

    let mut idx = 1usize;
    while idx < 512 {
        // bits = floor(log2(idx)), octet = low bits shifted into place
        let mut bits = 0usize;
        let mut i = idx;
        while i > 1 {
            i >>= 1;
            bits += 1;
        }
        let octet = ((idx & ((1 << bits) - 1)) << (8 - bits)) as u8;
        let host_mask = HOST_MASKS[bits];

        tbl[idx] = IdxEntry {
            octet,
            bits: bits as i8,
            lower: FIRST_HOST_IDX as u16 + octet as u16,
            upper: FIRST_HOST_IDX as u16 + (octet | host_mask) as u16,
            rank: 0,
        };
        idx += 1;
    }

    // the rank of an index is its 1-based position in (octet, bits)
    // order; the pairs are unique, so counting strictly-smaller entries
    // is enough
    let mut idx = 1usize;
    while idx < 512 {
        let mut rank = 1u16;
        let mut other = 1usize;
        while other < 512 {
            if tbl[other].octet < tbl[idx].octet
                || (tbl[other].octet == tbl[idx].octet
                    && tbl[other].bits < tbl[idx].bits)
            {
                rank += 1;
            }
            other += 1;
        }
        tbl[idx].rank = rank;
        idx += 1;
    }

    tbl
}

//------------ Tests ---------------------------------------------------------
