use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::{LeftPacking, MAX_PACKED_ARRAY_SIZE, PackingFunction};
use crate::errors::{GrammarError, GrammarResult};
use crate::symbols::ClassBoundaries;
use crate::utils::bits_for;

/// Packs `left << shift | right`, with `shift` wide enough for the largest valid
/// right child. O(1) both ways, but the array covers every left child times
/// `2^shift`, which is mostly empty for heavily split grammars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftPacking {
  shift: u32,
  mask: u32,
  left_children: Range<u16>,
  right_children: Range<u16>,
  packed_array_size: usize,
}

impl ShiftPacking {
  pub fn new(bounds: &ClassBoundaries) -> GrammarResult<Self> {
    let left_children = bounds.left_children();
    let right_children = bounds.right_children();

    let max_right = right_children.end.saturating_sub(1) as u32;
    let shift = bits_for(max_right);
    let mask = (1u32 << shift) - 1;

    let required = (left_children.end as u64) << shift;
    if required > MAX_PACKED_ARRAY_SIZE {
      return Err(GrammarError::PackingOverflow {
        strategy: "shift",
        required,
      });
    }

    Ok(Self {
      shift,
      mask,
      left_children,
      right_children,
      packed_array_size: required as usize,
    })
  }

  pub fn shift(&self) -> u32 {
    self.shift
  }
}

impl PackingFunction for ShiftPacking {
  #[inline]
  fn prepare_left(&self, left: u16) -> Option<LeftPacking> {
    if !self.left_children.contains(&left) {
      return None;
    }
    Some(LeftPacking {
      shift: self.shift,
      mask: self.mask,
      offset: (left as u32) << self.shift,
    })
  }

  #[inline]
  fn pack_prepared(&self, left: &LeftPacking, right: u16) -> Option<u32> {
    if !self.right_children.contains(&right) {
      return None;
    }
    Some(left.offset | (right as u32 & left.mask))
  }

  fn unpack(&self, key: u32) -> Option<(u16, u16)> {
    if key as usize >= self.packed_array_size {
      return None;
    }
    let left = (key >> self.shift) as u16;
    let right = (key & self.mask) as u16;
    if self.left_children.contains(&left) && self.right_children.contains(&right) {
      Some((left, right))
    } else {
      None
    }
  }

  fn packed_array_size(&self) -> usize {
    self.packed_array_size
  }
}
