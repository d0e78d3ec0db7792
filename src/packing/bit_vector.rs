use bit_set::BitSet;
use serde::{Deserialize, Serialize};

use super::{LeftPacking, PackingFunction, ShiftPacking};
use crate::errors::GrammarResult;
use crate::symbols::ClassBoundaries;

/// Shift packing that only accepts the child pairs found in binary rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitVectorPacking {
  shift: ShiftPacking,
  valid: BitSet,
}

impl BitVectorPacking {
  pub fn new(bounds: &ClassBoundaries, pairs: &[(u16, u16)]) -> GrammarResult<Self> {
    let shift = ShiftPacking::new(bounds)?;
    let mut valid = BitSet::with_capacity(shift.packed_array_size());
    for &(left, right) in pairs {
      if let Some(key) = shift.pack(left, right) {
        valid.insert(key as usize);
      }
    }
    Ok(Self { shift, valid })
  }

  pub fn valid_pairs(&self) -> usize {
    self.valid.len()
  }
}

impl PackingFunction for BitVectorPacking {
  #[inline]
  fn prepare_left(&self, left: u16) -> Option<LeftPacking> {
    self.shift.prepare_left(left)
  }

  #[inline]
  fn pack_prepared(&self, left: &LeftPacking, right: u16) -> Option<u32> {
    let key = self.shift.pack_prepared(left, right)?;
    self.valid.contains(key as usize).then_some(key)
  }

  fn unpack(&self, key: u32) -> Option<(u16, u16)> {
    if self.valid.contains(key as usize) {
      self.shift.unpack(key)
    } else {
      None
    }
  }

  fn is_valid(&self, key: u32) -> bool {
    self.valid.contains(key as usize)
  }

  fn packed_array_size(&self) -> usize {
    self.shift.packed_array_size()
  }
}
