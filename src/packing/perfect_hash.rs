use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::{LeftPacking, PackingFunction};
use crate::utils::{bits_for, collision_free_shift};

const EMPTY_SLOT: u32 = u32::MAX;

/// A two-level hash built from the exact set of occurring (left, right) pairs.
///
/// Each left child owns a small power-of-two slot table addressed by
/// `(right >> shift) & mask`, with `shift` chosen so its right siblings never
/// collide. Slots store the right child they hold (for the validity check) and
/// a dense key. Keys run `0..pairs`, ordered by (left, right), so the packed
/// array is exactly as large as the set of valid pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfectPairHash {
  lefts: Range<u16>,
  shifts: Vec<u8>,
  masks: Vec<u32>,
  slot_offsets: Vec<u32>,
  slot_rights: Vec<u32>,
  slot_keys: Vec<u32>,
  unpacked: Vec<(u16, u16)>,
}

impl PerfectPairHash {
  /// `lefts` bounds the first element of every pair; pairs outside it are ignored.
  pub fn new(lefts: Range<u16>, pairs: impl IntoIterator<Item = (u16, u16)>) -> Self {
    let mut by_left: BTreeMap<u16, Vec<u16>> = BTreeMap::new();
    for (left, right) in pairs {
      if lefts.contains(&left) {
        by_left.entry(left).or_default().push(right);
      }
    }

    let num_lefts = lefts.len();
    let mut shifts = Vec::with_capacity(num_lefts);
    let mut masks = Vec::with_capacity(num_lefts);
    let mut slot_offsets = Vec::with_capacity(num_lefts);
    let mut slot_rights = Vec::new();
    let mut slot_keys = Vec::new();
    let mut unpacked = Vec::new();
    let mut scratch = Vec::new();

    for left in lefts.clone() {
      let mut rights = by_left.remove(&left).unwrap_or_default();
      rights.sort_unstable();
      rights.dedup();

      let min_bits = if rights.len() <= 1 {
        0
      } else {
        bits_for(rights.len() as u32 - 1)
      };
      // 16 bits with no shift is the identity on u16, so this always terminates
      let (shift, mask) = (min_bits..=16)
        .find_map(|bits| {
          let mask = (1u32 << bits) - 1;
          collision_free_shift(&rights, mask, &mut scratch).map(|shift| (shift, mask))
        })
        .unwrap_or((0, u16::MAX as u32));

      let base = slot_rights.len();
      shifts.push(shift as u8);
      masks.push(mask);
      slot_offsets.push(base as u32);
      slot_rights.resize(base + mask as usize + 1, EMPTY_SLOT);
      slot_keys.resize(base + mask as usize + 1, EMPTY_SLOT);

      for right in rights {
        let slot = base + (((right as u32) >> shift) & mask) as usize;
        slot_rights[slot] = right as u32;
        slot_keys[slot] = unpacked.len() as u32;
        unpacked.push((left, right));
      }
    }

    Self {
      lefts,
      shifts,
      masks,
      slot_offsets,
      slot_rights,
      slot_keys,
      unpacked,
    }
  }

  /// Size of the slot tables, for comparison with the dense packed array.
  pub fn slot_count(&self) -> usize {
    self.slot_rights.len()
  }
}

impl PackingFunction for PerfectPairHash {
  #[inline]
  fn prepare_left(&self, left: u16) -> Option<LeftPacking> {
    if !self.lefts.contains(&left) {
      return None;
    }
    let i = (left - self.lefts.start) as usize;
    Some(LeftPacking {
      shift: self.shifts[i] as u32,
      mask: self.masks[i],
      offset: self.slot_offsets[i],
    })
  }

  #[inline]
  fn pack_prepared(&self, left: &LeftPacking, right: u16) -> Option<u32> {
    let slot = (left.offset + (((right as u32) >> left.shift) & left.mask)) as usize;
    if self.slot_rights[slot] == right as u32 {
      Some(self.slot_keys[slot])
    } else {
      None
    }
  }

  fn unpack(&self, key: u32) -> Option<(u16, u16)> {
    self.unpacked.get(key as usize).copied()
  }

  fn is_valid(&self, key: u32) -> bool {
    (key as usize) < self.unpacked.len()
  }

  fn packed_array_size(&self) -> usize {
    self.unpacked.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keys_are_ordered_by_pair() {
    let h = PerfectPairHash::new(0..4, vec![(2, 9), (0, 5), (2, 1), (0, 5), (3, 100)]);
    assert_eq!(h.packed_array_size(), 4);
    assert_eq!(h.pack(0, 5), Some(0));
    assert_eq!(h.pack(2, 1), Some(1));
    assert_eq!(h.pack(2, 9), Some(2));
    assert_eq!(h.pack(3, 100), Some(3));
    assert_eq!(h.pack(1, 5), None);
    assert_eq!(h.pack(3, 101), None);
    assert_eq!(h.unpack(4), None);
  }

  #[test]
  fn test_many_siblings_round_trip() {
    // strided right children force a non-zero shift
    let pairs: Vec<(u16, u16)> = (0..64u16)
      .map(|r| (1, r * 16))
      .chain((0..300u16).map(|r| (0, r)))
      .collect();
    let h = PerfectPairHash::new(0..2, pairs.clone());
    assert_eq!(h.packed_array_size(), pairs.len());
    for &(l, r) in pairs.iter() {
      let key = h.pack(l, r).unwrap();
      assert_eq!(h.unpack(key), Some((l, r)));
    }
    assert_eq!(h.pack(1, 17), None);
    assert!(h.slot_count() < 1024);
  }
}
