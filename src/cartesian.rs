//! The cartesian product of child cells, unioned over every midpoint of a span.

use crate::chart::Chart;
use crate::grammar::Grammar;
use crate::packing::{Packing, PackingFunction};
use crate::utils::LOG_ZERO;

/// Best joint inside score and midpoint per packed child pair, for one cell.
///
/// A dense sparse-accumulator: `midpoints[key] == 0` means the key is
/// unpopulated (no binary midpoint is ever 0). Populated keys are listed so
/// clearing only touches them.
#[derive(Debug, Clone)]
pub struct CartesianProductVector {
  probs: Vec<f32>,
  midpoints: Vec<u16>,
  populated: Vec<u32>,
}

impl CartesianProductVector {
  pub fn new(packed_array_size: usize) -> Self {
    Self {
      probs: vec![LOG_ZERO; packed_array_size],
      midpoints: vec![0; packed_array_size],
      populated: Vec::new(),
    }
  }

  pub fn clear(&mut self) {
    for key in self.populated.drain(..) {
      self.probs[key as usize] = LOG_ZERO;
      self.midpoints[key as usize] = 0;
    }
  }

  /// Number of populated child pairs.
  pub fn len(&self) -> usize {
    self.populated.len()
  }

  pub fn is_empty(&self) -> bool {
    self.populated.is_empty()
  }

  pub fn populated(&self) -> &[u32] {
    &self.populated
  }

  /// Midpoint of the best entry for `key`, 0 if unpopulated.
  #[inline]
  pub fn midpoint(&self, key: u32) -> u16 {
    self.midpoints[key as usize]
  }

  #[inline]
  pub fn prob(&self, key: u32) -> f32 {
    self.probs[key as usize]
  }

  pub fn get(&self, key: u32) -> Option<(f32, u16)> {
    let mid = *self.midpoints.get(key as usize)?;
    (mid != 0).then(|| (self.probs[key as usize], mid))
  }

  /// Keeps the larger score. Midpoints arrive in increasing order, so on a tie
  /// the earlier (smaller) midpoint stays.
  #[inline]
  pub fn update(&mut self, key: u32, prob: f32, midpoint: u16) {
    let i = key as usize;
    if self.midpoints[i] == 0 {
      self.populated.push(key);
      self.probs[i] = prob;
      self.midpoints[i] = midpoint;
    } else if prob > self.probs[i] {
      self.probs[i] = prob;
      self.midpoints[i] = midpoint;
    }
  }
}

/// Unions the child pairs of every midpoint of (start, end) into `vector`.
pub fn union(grammar: &Grammar, chart: &Chart, start: u16, end: u16, vector: &mut CartesianProductVector) {
  match grammar.packing() {
    Packing::Shift(p) => union_with(p, grammar, chart, start, end, vector),
    Packing::BitVector(p) => union_with(p, grammar, chart, start, end, vector),
    Packing::PerfectHash(p) => union_with(p, grammar, chart, start, end, vector),
  }
}

fn union_with<P: PackingFunction>(
  packing: &P,
  grammar: &Grammar,
  chart: &Chart,
  start: u16,
  end: u16,
  vector: &mut CartesianProductVector,
) {
  for mid in start + 1..end {
    let left_cell = chart.cell(start, mid);
    let right_cell = chart.cell(mid, end);
    if left_cell.is_empty() || right_cell.is_empty() {
      continue;
    }
    let rights = right_cell.non_terminals();
    let right_probs = right_cell.inside_probs();

    for (&left, &left_prob) in left_cell.non_terminals().iter().zip(left_cell.inside_probs()) {
      let Some((min_right, max_right)) = grammar.right_sibling_bounds(left) else {
        continue;
      };
      let Some(prepared) = packing.prepare_left(left) else {
        continue;
      };

      // right children are sorted, so everything past max_right is out of range
      let first = rights.partition_point(|&r| r < min_right);
      for (&right, &right_prob) in rights[first..].iter().zip(&right_probs[first..]) {
        if right > max_right {
          break;
        }
        if let Some(key) = packing.pack_prepared(&prepared, right) {
          vector.update(key, left_prob + right_prob, mid);
        }
      }
    }
  }
}
