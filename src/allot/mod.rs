//! Precomputed allotment bitsets for the complete binary tree of a
//! stride.
//!
//! The 512-slot allotment of a base index splits into two 256-bit halves:
//! the intra-stride prefix routes it covers (low half, [`prefix_routes`])
//! and the host routes it covers (high half shifted down by 256,
//! [`host_routes`], which is exactly the covered child-octet range).
//! [`backtracking`] holds the converse: the chain from an index up to the
//! stride's default route, restricted to storable indices.
//!
//! With these, "does prefix X cover anything in this node" and the
//! longest-prefix-match are plain bitset intersections instead of range
//! scans. All three tables derive from the base-index formula and are
//! evaluated at compile time; the unit tests check them against the
//! on-the-fly computation.

use crate::bitset::BitSet256;

/// The backtracking chain `{idx, idx >> 1, .., 1}` of a base index,
/// restricted to the storable range `1..=255`. For host indices (>= 256)
/// the entry starts at `idx >> 1`, the only part a stored prefix can
/// match.
pub(crate) fn backtracking(idx: usize) -> &'static BitSet256 {
    &LPM_TBL[idx]
}

/// All stored-prefix indices covered by `idx`: its subtree within
/// `1..=255`.
pub(crate) fn prefix_routes(idx: u8) -> &'static BitSet256 {
    &PFX_ROUTES_TBL[idx as usize]
}

/// All host routes covered by `idx`, as address octets `0..=255`. This is
/// the child-octet range a prefix spans inside a node.
pub(crate) fn host_routes(idx: u8) -> &'static BitSet256 {
    &HOST_ROUTES_TBL[idx as usize]
}

//------------ const table builders ------------------------------------------

static LPM_TBL: [BitSet256; 512] = lpm_tbl();
static PFX_ROUTES_TBL: [BitSet256; 256] = pfx_routes_tbl();
static HOST_ROUTES_TBL: [BitSet256; 256] = host_routes_tbl();

const fn lpm_tbl() -> [BitSet256; 512] {
    let mut tbl = [BitSet256::new(); 512];
    let mut idx = 1usize;
    while idx < 512 {
        let mut words = [0u64; 4];
        let mut link = idx;
        while link > 0 {
            if link < 256 {
                words[link >> 6] |= 1 << (link & 63);
            }
            link >>= 1;
        }
        tbl[idx] = BitSet256::from_words(words);
        idx += 1;
    }
    tbl
}

const fn pfx_routes_tbl() -> [BitSet256; 256] {
    let mut tbl = [BitSet256::new(); 256];
    let mut idx = 1usize;
    while idx < 256 {
        let mut words = [0u64; 4];
        // an index covers every index whose up-chain passes through it
        let mut other = 1usize;
        while other < 256 {
            let mut link = other;
            while link > 0 {
                if link == idx {
                    words[other >> 6] |= 1 << (other & 63);
                    break;
                }
                link >>= 1;
            }
            other += 1;
        }
        tbl[idx] = BitSet256::from_words(words);
        idx += 1;
    }
    tbl
}

const fn host_routes_tbl() -> [BitSet256; 256] {
    let mut tbl = [BitSet256::new(); 256];
    let mut idx = 1usize;
    while idx < 256 {
        let mut words = [0u64; 4];
        let mut host = 256usize;
        while host < 512 {
            let mut link = host;
            while link > 0 {
                if link == idx {
                    let octet = host - 256;
                    words[octet >> 6] |= 1 << (octet & 63);
                    break;
                }
                link >>= 1;
            }
            host += 1;
        }
        tbl[idx] = BitSet256::from_words(words);
        idx += 1;
    }
    tbl
}

//------------ Tests ---------------------------------------------------------
