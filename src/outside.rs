//! Viterbi outside scores over a populated chart.
//!
//! The outside score of an entry is the best log-probability of everything in
//! a derivation of the whole sentence except the entry's own subtree. For each
//! entry on the best parse, inside + outside equals the best parse's inside
//! score.

use crate::chart::{triangular_index, Chart};
use crate::grammar::Grammar;
use crate::packing::PackingFunction;
use crate::utils::LOG_ZERO;

#[derive(Debug, Clone, Default)]
struct OutsideCell {
  nts: Vec<u16>,
  outside: Vec<f32>,
}

impl OutsideCell {
  fn index_of(&self, nt: u16) -> Option<usize> {
    self.nts.binary_search(&nt).ok()
  }

  fn raise(&mut self, i: usize, score: f32) {
    if score > self.outside[i] {
      self.outside[i] = score;
    }
  }
}

/// Outside log-probabilities, one per chart entry.
#[derive(Debug, Clone, Default)]
pub struct OutsideChart {
  size: usize,
  cells: Vec<OutsideCell>,
}

impl OutsideChart {
  /// Computes outside scores top-down. The start symbol in the top cell scores
  /// 0; everything unreachable from it scores negative infinity.
  pub fn compute(grammar: &Grammar, chart: &Chart) -> Self {
    let size = chart.size();
    let mut outside = Self {
      size,
      cells: Vec::with_capacity(size * (size + 1) / 2),
    };
    for start in 0..size as u16 {
      for end in start + 1..=size as u16 {
        debug_assert_eq!(outside.cells.len(), chart.cell_index(start, end));
        let cell = chart.cell(start, end);
        outside.cells.push(OutsideCell {
          nts: cell.non_terminals().to_vec(),
          outside: vec![LOG_ZERO; cell.len()],
        });
      }
    }
    if size == 0 {
      return outside;
    }

    let top = chart.cell_index(0, size as u16);
    if let Some(i) = outside.cells[top].index_of(grammar.start_symbol()) {
      outside.cells[top].outside[i] = 0.0;
    }

    let mut parents = Vec::new();
    for span in (1..=size as u16).rev() {
      for start in 0..=(size as u16 - span) {
        let end = start + span;
        let idx = chart.cell_index(start, end);

        // unary: one hop, from scores that arrived from larger spans
        parents.clear();
        parents.extend(outside.scored(idx));
        for &(parent, score) in parents.iter() {
          for (child, rule_prob) in grammar.csr_unary().row(parent) {
            if let Some(i) = outside.cells[idx].index_of(child as u16) {
              outside.cells[idx].raise(i, score + rule_prob);
            }
          }
        }

        parents.clear();
        parents.extend(outside.scored(idx));
        if span > 1 && !parents.is_empty() {
          for mid in start + 1..end {
            outside.distribute(grammar, chart, &parents, start, mid, end);
          }
        }
      }
    }
    outside
  }

  /// (non-terminal, outside) for every entry of a cell with a finite score
  fn scored(&self, idx: usize) -> impl Iterator<Item = (u16, f32)> + '_ {
    let cell = &self.cells[idx];
    cell
      .nts
      .iter()
      .copied()
      .zip(cell.outside.iter().copied())
      .filter(|&(_, score)| score != LOG_ZERO)
  }

  /// Passes parent outside scores down to the children at one midpoint.
  fn distribute(
    &mut self,
    grammar: &Grammar,
    chart: &Chart,
    parents: &[(u16, f32)],
    start: u16,
    mid: u16,
    end: u16,
  ) {
    let left_cell = chart.cell(start, mid);
    let right_cell = chart.cell(mid, end);
    if left_cell.is_empty() || right_cell.is_empty() {
      return;
    }
    let left_idx = chart.cell_index(start, mid);
    let right_idx = chart.cell_index(mid, end);

    for &(parent, parent_score) in parents.iter() {
      // left children, found by (parent, right sibling)
      for (&right, &right_inside) in right_cell.non_terminals().iter().zip(right_cell.inside_probs()) {
        let Some(key) = grammar.left_child_packing().pack(parent, right) else {
          continue;
        };
        let (lefts, probs) = grammar.left_child_csc().column(key);
        for (&left, &rule_prob) in lefts.iter().zip(probs) {
          if let Some(li) = left_cell.index_of(left) {
            self.cells[left_idx].raise(li, parent_score + rule_prob + right_inside);
          }
        }
      }

      // right children, found by (parent, left sibling)
      for (&left, &left_inside) in left_cell.non_terminals().iter().zip(left_cell.inside_probs()) {
        let Some(key) = grammar.right_child_packing().pack(parent, left) else {
          continue;
        };
        let (rights, probs) = grammar.right_child_csc().column(key);
        for (&right, &rule_prob) in rights.iter().zip(probs) {
          if let Some(ri) = right_cell.index_of(right) {
            self.cells[right_idx].raise(ri, parent_score + rule_prob + left_inside);
          }
        }
      }
    }
  }

  pub fn size(&self) -> usize {
    self.size
  }

  /// Outside score of `nt` over (start, end); negative infinity if `nt` isn't
  /// in that cell or can't reach the start symbol.
  pub fn get(&self, start: u16, end: u16, nt: u16) -> f32 {
    if start >= end || end as usize > self.size {
      return LOG_ZERO;
    }
    let cell = &self.cells[triangular_index(self.size, start, end)];
    cell.index_of(nt).map_or(LOG_ZERO, |i| cell.outside[i])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::packing::PackingKind;
  use crate::parser::{Parser, ParserOptions};
  use crate::syntree::SynTree;

  fn attachment() -> Grammar {
    Grammar::parse(
      include_str!("../data/attachment.gr"),
      include_str!("../data/attachment.lex"),
      PackingKind::PerfectHash,
    )
    .unwrap()
  }

  fn check_path(
    g: &Grammar,
    chart: &Chart,
    outside: &OutsideChart,
    tree: &SynTree<String, String>,
    total: f32,
  ) -> usize {
    let Some((constituent, children)) = tree.get_branch() else {
      return 0;
    };
    let (start, end) = (constituent.span.0 as u16, constituent.span.1 as u16);
    let nt = g.non_terminals().get(&constituent.value).unwrap() as u16;
    let inside = chart.cell(start, end).inside(nt);
    let score = inside + outside.get(start, end, nt);
    assert!(
      (score - total).abs() < 1e-3,
      "{} over {}..{}: {} != {}",
      constituent.value,
      start,
      end,
      score,
      total
    );
    1 + children
      .iter()
      .map(|c| check_path(g, chart, outside, c, total))
      .sum::<usize>()
  }

  #[test]
  fn test_best_path_scores_sum_to_total() {
    let g = attachment();
    let mut parser = Parser::new(&g, ParserOptions::default());
    for sentence in [
      "the man saw the dog with the telescope",
      "the old man saw a big dog with the telescope in the park",
      "the dog walked",
    ] {
      let result = parser.parse(sentence).unwrap();
      let outside = OutsideChart::compute(&g, parser.chart());
      assert_eq!(outside.size(), parser.chart().size());
      assert_eq!(outside.get(0, outside.size() as u16, g.start_symbol()), 0.0);

      let checked = check_path(&g, parser.chart(), &outside, &result.tree, result.inside);
      // a preterminal per word, plus at least the binary nodes joining them
      assert!(checked >= 2 * result.tree.leaves().len() - 1);
    }
  }

  #[test]
  fn test_no_entry_beats_the_best_parse() {
    let g = attachment();
    let mut parser = Parser::new(&g, ParserOptions::default());
    let result = parser.parse("the man saw the dog with the telescope").unwrap();
    let chart = parser.chart();
    let outside = OutsideChart::compute(&g, chart);

    let size = chart.size() as u16;
    for start in 0..size {
      for end in start + 1..=size {
        for entry in chart.cell(start, end).entries() {
          let o = outside.get(start, end, entry.nt);
          assert!(o <= 0.0);
          assert!(entry.inside + o <= result.inside + 1e-3);
        }
      }
    }
  }

  #[test]
  fn test_unreachable_entries_score_log_zero() {
    let g = attachment();
    let mut parser = Parser::new(&g, ParserOptions::default());
    parser.parse("the man saw the dog").unwrap();
    let outside = OutsideChart::compute(&g, parser.chart());

    // "saw" as a noun fits no analysis of the sentence
    let n = g.non_terminals().get("N").unwrap() as u16;
    assert!(parser.chart().cell(2, 3).get(n).is_some());
    assert_eq!(outside.get(2, 3, n), LOG_ZERO);
    assert_eq!(outside.get(3, 2, n), LOG_ZERO);
    assert_eq!(outside.get(0, 9, n), LOG_ZERO);
  }

  #[test]
  fn test_failed_parse_has_no_outside_mass() {
    let g = attachment();
    let mut parser = Parser::new(&g, ParserOptions::default());
    assert!(parser.parse("the dog the").is_err());
    let chart = parser.chart();
    let outside = OutsideChart::compute(&g, chart);
    for start in 0..3u16 {
      for end in start + 1..=3 {
        for entry in chart.cell(start, end).entries() {
          assert_eq!(outside.get(start, end, entry.nt), LOG_ZERO);
        }
      }
    }
  }
}
