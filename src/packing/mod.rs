//! Packing functions: encode a (left child, right child) pair into one integer key
//! that indexes the cartesian-product vector and the binary grammar matrix columns.
//!
//! Every strategy round-trips exactly for the pairs it accepts, and reports any
//! pair it doesn't accept as invalid (`None`) rather than returning a wrong key.

mod bit_vector;
mod perfect_hash;
mod shift;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::GrammarResult;
use crate::symbols::ClassBoundaries;

pub use bit_vector::BitVectorPacking;
pub use perfect_hash::PerfectPairHash;
pub use shift::ShiftPacking;

/// Largest packed array any strategy may require (keys must fit a signed 32-bit int).
pub const MAX_PACKED_ARRAY_SIZE: u64 = 1 << 31;

/// Per-left-child packing parameters, computed once and reused for every right
/// sibling the cartesian-product loop tries against that left child.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LeftPacking {
  pub shift: u32,
  pub mask: u32,
  pub offset: u32,
}

pub trait PackingFunction {
  /// Packing parameters for `left`, or `None` if it can never be a left child.
  fn prepare_left(&self, left: u16) -> Option<LeftPacking>;

  /// Packs `right` against a prepared left child. `None` if the pair is invalid.
  fn pack_prepared(&self, left: &LeftPacking, right: u16) -> Option<u32>;

  fn pack(&self, left: u16, right: u16) -> Option<u32> {
    self
      .prepare_left(left)
      .and_then(|l| self.pack_prepared(&l, right))
  }

  /// Decodes a key back into (left, right). `None` for keys no valid pair packs to.
  fn unpack(&self, key: u32) -> Option<(u16, u16)>;

  fn is_valid(&self, key: u32) -> bool {
    self.unpack(key).is_some()
  }

  /// Length of any dense array indexed by packed keys.
  fn packed_array_size(&self) -> usize;
}

/// Which packing strategy a grammar is compiled with.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackingKind {
  /// `left << shift | right`; every syntactically possible pair is valid
  Shift,
  /// Shift packing, plus a bitset of the pairs that occur in some binary rule
  BitVector,
  /// A hash built from the exact set of occurring pairs; keys are dense
  #[default]
  PerfectHash,
}

impl PackingKind {
  pub const ALL: [PackingKind; 3] = [Self::Shift, Self::BitVector, Self::PerfectHash];

  pub fn name(&self) -> &'static str {
    match self {
      Self::Shift => "shift",
      Self::BitVector => "bit-vector",
      Self::PerfectHash => "perfect-hash",
    }
  }
}

impl fmt::Display for PackingKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

impl FromStr for PackingKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "shift" => Ok(Self::Shift),
      "bit-vector" | "bitvector" | "bv" => Ok(Self::BitVector),
      "perfect-hash" | "perfecthash" | "hash" => Ok(Self::PerfectHash),
      _ => Err(format!("unknown packing function: {}", s)),
    }
  }
}

/// The packing function held by a compiled grammar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Packing {
  Shift(ShiftPacking),
  BitVector(BitVectorPacking),
  PerfectHash(PerfectPairHash),
}

impl Packing {
  /// Builds the requested strategy sized to the class boundaries and the
  /// (left, right) pairs of every binary rule.
  pub fn build(
    kind: PackingKind,
    bounds: &ClassBoundaries,
    pairs: &[(u16, u16)],
  ) -> GrammarResult<Self> {
    Ok(match kind {
      PackingKind::Shift => Self::Shift(ShiftPacking::new(bounds)?),
      PackingKind::BitVector => Self::BitVector(BitVectorPacking::new(bounds, pairs)?),
      PackingKind::PerfectHash => {
        Self::PerfectHash(PerfectPairHash::new(bounds.left_children(), pairs.iter().copied()))
      }
    })
  }

  pub fn kind(&self) -> PackingKind {
    match self {
      Self::Shift(_) => PackingKind::Shift,
      Self::BitVector(_) => PackingKind::BitVector,
      Self::PerfectHash(_) => PackingKind::PerfectHash,
    }
  }
}

impl PackingFunction for Packing {
  fn prepare_left(&self, left: u16) -> Option<LeftPacking> {
    match self {
      Self::Shift(p) => p.prepare_left(left),
      Self::BitVector(p) => p.prepare_left(left),
      Self::PerfectHash(p) => p.prepare_left(left),
    }
  }

  fn pack_prepared(&self, left: &LeftPacking, right: u16) -> Option<u32> {
    match self {
      Self::Shift(p) => p.pack_prepared(left, right),
      Self::BitVector(p) => p.pack_prepared(left, right),
      Self::PerfectHash(p) => p.pack_prepared(left, right),
    }
  }

  fn unpack(&self, key: u32) -> Option<(u16, u16)> {
    match self {
      Self::Shift(p) => p.unpack(key),
      Self::BitVector(p) => p.unpack(key),
      Self::PerfectHash(p) => p.unpack(key),
    }
  }

  fn is_valid(&self, key: u32) -> bool {
    match self {
      Self::Shift(p) => p.is_valid(key),
      Self::BitVector(p) => p.is_valid(key),
      Self::PerfectHash(p) => p.is_valid(key),
    }
  }

  fn packed_array_size(&self) -> usize {
    match self {
      Self::Shift(p) => p.packed_array_size(),
      Self::BitVector(p) => p.packed_array_size(),
      Self::PerfectHash(p) => p.packed_array_size(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// 3 right-only (0..3), 2 pos (3..5), 1 either (5), 2 left-only (6..8), 1 unary-only (8)
  fn bounds() -> ClassBoundaries {
    ClassBoundaries::from_counts([3, 2, 1, 2, 1])
  }

  fn pairs() -> Vec<(u16, u16)> {
    vec![(3, 0), (3, 4), (5, 1), (6, 5), (7, 2), (7, 3), (6, 0)]
  }

  #[test]
  fn test_every_strategy_round_trips_rule_pairs() {
    for kind in PackingKind::ALL {
      let p = Packing::build(kind, &bounds(), &pairs()).unwrap();
      assert_eq!(p.kind(), kind);

      let mut keys = Vec::new();
      for &(l, r) in pairs().iter() {
        let key = p.pack(l, r).unwrap_or_else(|| panic!("{}: ({}, {}) invalid", kind, l, r));
        assert!((key as usize) < p.packed_array_size());
        assert!(p.is_valid(key));
        assert_eq!(p.unpack(key), Some((l, r)), "{}", kind);
        keys.push(key);
      }

      keys.sort();
      keys.dedup();
      assert_eq!(keys.len(), pairs().len(), "{} collided", kind);
    }
  }

  #[test]
  fn test_non_children_are_invalid() {
    for kind in PackingKind::ALL {
      let p = Packing::build(kind, &bounds(), &pairs()).unwrap();
      // 8 is unary-only, so can't be a left child; 6 is left-only, so can't be a right child
      assert_eq!(p.pack(8, 0), None, "{}", kind);
      assert_eq!(p.pack(3, 6), None, "{}", kind);
      assert_eq!(p.prepare_left(0), None, "{}", kind);
    }
  }

  #[test]
  fn test_filtering_strategies_reject_unused_pairs() {
    for kind in [PackingKind::BitVector, PackingKind::PerfectHash] {
      let p = Packing::build(kind, &bounds(), &pairs()).unwrap();
      assert_eq!(p.pack(3, 1), None, "{}", kind);
      assert_eq!(p.pack(5, 5), None, "{}", kind);
    }

    // shift packing is exhaustive over the syntactic ranges
    let p = Packing::build(PackingKind::Shift, &bounds(), &pairs()).unwrap();
    let key = p.pack(3, 1).unwrap();
    assert_eq!(p.unpack(key), Some((3, 1)));
  }

  #[test]
  fn test_perfect_hash_is_dense() {
    let p = Packing::build(PackingKind::PerfectHash, &bounds(), &pairs()).unwrap();
    assert_eq!(p.packed_array_size(), pairs().len());
    let shift = Packing::build(PackingKind::Shift, &bounds(), &pairs()).unwrap();
    assert!(shift.packed_array_size() > p.packed_array_size());
  }

  #[test]
  fn test_packing_kind_from_str() {
    for kind in PackingKind::ALL {
      assert_eq!(kind.name().parse::<PackingKind>(), Ok(kind));
    }
    assert!("nope".parse::<PackingKind>().is_err());
  }
}
