//! Sparse matrix-vector products that populate a cell's scratch arrays.

use crate::cartesian::CartesianProductVector;
use crate::chart::{CellScratch, Children};
use crate::grammar::Grammar;

/// Seeds a span-1 cell with every pos tag of `word`. Lexical entries carry
/// midpoint 0.
pub fn lexical(grammar: &Grammar, word: u32, scratch: &mut CellScratch) {
  let (parents, probs) = grammar.lexical().column(word);
  for (&parent, &prob) in parents.iter().zip(probs) {
    scratch.update(parent, prob, Children::Lexical(word), 0);
  }
}

/// Multiplies the unioned child pairs against the binary CSC matrix, keeping the
/// best (children, midpoint) per parent.
pub fn binary(grammar: &Grammar, vector: &CartesianProductVector, scratch: &mut CellScratch) {
  if vector.is_empty() {
    return;
  }
  let csc = grammar.csc_binary();
  for (i, &key) in csc.populated_columns().iter().enumerate() {
    let midpoint = vector.midpoint(key);
    if midpoint == 0 {
      continue;
    }
    let pair_prob = vector.prob(key);
    let (parents, probs) = csc.populated_column(i);
    for (&parent, &rule_prob) in parents.iter().zip(probs) {
      scratch.update(parent, rule_prob + pair_prob, Children::Binary(key), midpoint);
    }
  }
}

/// Buffers for [`unary`], reused across cells.
#[derive(Debug, Clone)]
pub struct UnaryScratch {
  candidates: CellScratch,
  blocked: Vec<u16>,
}

impl UnaryScratch {
  pub fn new(num_non_terminals: usize) -> Self {
    Self {
      candidates: CellScratch::new(num_non_terminals),
      blocked: Vec::new(),
    }
  }
}

/// Applies unary rules once, to the entries present before the call. Unary
/// entries record the cell's end as their midpoint.
///
/// An entry another unary entry points at keeps its own score and
/// backpointer, so every unary backpointer leads to a binary or lexical entry.
/// Chains longer than one hop are only found if the grammar encodes them as a
/// single rule.
pub fn unary(grammar: &Grammar, scratch: &mut CellScratch, buffers: &mut UnaryScratch, end: u16) {
  let UnaryScratch { candidates, blocked } = buffers;
  candidates.reset();
  blocked.clear();

  let csc = grammar.csc_unary();
  for &child in scratch.populated() {
    let child_prob = scratch.inside(child);
    let (parents, probs) = csc.column(child as u32);
    for (&parent, &rule_prob) in parents.iter().zip(probs) {
      let prob = rule_prob + child_prob;
      if prob > scratch.inside(parent) {
        candidates.update(parent, prob, Children::Unary(child), end);
      }
    }
  }
  if candidates.is_empty() {
    return;
  }

  blocked.extend(candidates.populated().iter().filter_map(|&parent| {
    match candidates.entry(parent)?.children {
      Children::Unary(child) => Some(child),
      _ => None,
    }
  }));
  blocked.sort_unstable();
  blocked.dedup();

  for &parent in candidates.populated() {
    if blocked.binary_search(&parent).is_ok() {
      continue;
    }
    if let Some(e) = candidates.entry(parent) {
      scratch.set(parent, e.inside, e.children, e.midpoint);
    }
  }
}
