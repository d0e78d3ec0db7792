//! Triangular chart storage and the dense scratch arrays a cell is built in.

use crate::utils::LOG_ZERO;

/// Backpointer of a chart entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Children {
  /// Packed (left, right) key; the split point is the entry's midpoint
  Binary(u32),
  Unary(u16),
  /// Lexical index of the word the entry was read from
  Lexical(u32),
}

/// One populated non-terminal of a cell.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ChartEntry {
  pub nt: u16,
  pub inside: f32,
  pub children: Children,
  /// Split point for binary entries, the cell's end for unary entries, and 0
  /// for lexical entries.
  pub midpoint: u16,
}

/// A finalized cell: parallel arrays sorted by non-terminal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
  nts: Vec<u16>,
  inside: Vec<f32>,
  children: Vec<Children>,
  midpoints: Vec<u16>,
}

impl Cell {
  pub fn len(&self) -> usize {
    self.nts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nts.is_empty()
  }

  /// Empties the cell, keeping its allocations.
  pub fn clear(&mut self) {
    self.nts.clear();
    self.inside.clear();
    self.children.clear();
    self.midpoints.clear();
  }

  /// Entries must be pushed in increasing non-terminal order.
  pub(crate) fn push(&mut self, entry: ChartEntry) {
    debug_assert!(self.nts.last().is_none_or(|&last| last < entry.nt));
    self.nts.push(entry.nt);
    self.inside.push(entry.inside);
    self.children.push(entry.children);
    self.midpoints.push(entry.midpoint);
  }

  /// Populated non-terminals, ascending.
  pub fn non_terminals(&self) -> &[u16] {
    &self.nts
  }

  /// Inside log-probabilities, parallel to [`Cell::non_terminals`].
  pub fn inside_probs(&self) -> &[f32] {
    &self.inside
  }

  #[inline]
  pub fn index_of(&self, nt: u16) -> Option<usize> {
    self.nts.binary_search(&nt).ok()
  }

  pub fn entry(&self, i: usize) -> ChartEntry {
    ChartEntry {
      nt: self.nts[i],
      inside: self.inside[i],
      children: self.children[i],
      midpoint: self.midpoints[i],
    }
  }

  pub fn get(&self, nt: u16) -> Option<ChartEntry> {
    self.index_of(nt).map(|i| self.entry(i))
  }

  /// Inside log-probability of `nt`, negative infinity if it isn't in the cell.
  pub fn inside(&self, nt: u16) -> f32 {
    self.index_of(nt).map_or(LOG_ZERO, |i| self.inside[i])
  }

  pub fn entries(&self) -> impl Iterator<Item = ChartEntry> + '_ {
    (0..self.len()).map(|i| self.entry(i))
  }
}

/// Index of (start, end) when the spans of a `size`-word sentence are stored
/// row by row.
#[inline]
pub(crate) fn triangular_index(size: usize, start: u16, end: u16) -> usize {
  let (start, end) = (start as usize, end as usize);
  debug_assert!(start < end && end <= size);
  // rows before `start` hold size, size - 1, ... cells
  start * size - start * start.saturating_sub(1) / 2 + end - start - 1
}

/// Cells for every span of a sentence, stored row by row.
#[derive(Debug, Clone, Default)]
pub struct Chart {
  size: usize,
  cells: Vec<Cell>,
}

impl Chart {
  pub fn new() -> Self {
    Default::default()
  }

  /// Resets the chart for a sentence of `size` words. Cell allocations are reused.
  pub fn clear(&mut self, size: usize) {
    let count = size * (size + 1) / 2;
    self.cells.truncate(count);
    for cell in self.cells.iter_mut() {
      cell.clear();
    }
    self.cells.resize_with(count, Cell::default);
    self.size = size;
  }

  /// Sentence length the chart is sized for.
  pub fn size(&self) -> usize {
    self.size
  }

  #[inline]
  pub fn cell_index(&self, start: u16, end: u16) -> usize {
    triangular_index(self.size, start, end)
  }

  #[inline]
  pub fn cell(&self, start: u16, end: u16) -> &Cell {
    &self.cells[self.cell_index(start, end)]
  }

  /// Swaps `cell` into (start, end) and returns the cell it displaced.
  pub fn replace(&mut self, start: u16, end: u16, cell: Cell) -> Cell {
    let idx = self.cell_index(start, end);
    std::mem::replace(&mut self.cells[idx], cell)
  }

  /// The cell spanning the whole sentence.
  pub fn top(&self) -> Option<&Cell> {
    (self.size > 0).then(|| self.cell(0, self.size as u16))
  }

  /// Total entries across every cell.
  pub fn population(&self) -> usize {
    self.cells.iter().map(Cell::len).sum()
  }
}

/// Dense per-non-terminal arrays a cell is populated in before being compacted
/// into a [`Cell`].
///
/// Unpopulated non-terminals hold negative infinity. The populated
/// non-terminals are also listed, so resetting costs O(populated) rather than
/// O(non-terminals).
#[derive(Debug, Clone)]
pub struct CellScratch {
  inside: Vec<f32>,
  children: Vec<Children>,
  midpoints: Vec<u16>,
  populated: Vec<u16>,
}

impl CellScratch {
  pub fn new(num_non_terminals: usize) -> Self {
    Self {
      inside: vec![LOG_ZERO; num_non_terminals],
      children: vec![Children::Unary(0); num_non_terminals],
      midpoints: vec![0; num_non_terminals],
      populated: Vec::new(),
    }
  }

  pub fn reset(&mut self) {
    for nt in self.populated.drain(..) {
      self.inside[nt as usize] = LOG_ZERO;
      self.midpoints[nt as usize] = 0;
    }
  }

  /// Populated non-terminals, in the order they were first set unless
  /// [`CellScratch::sort_populated`] has been called.
  pub fn populated(&self) -> &[u16] {
    &self.populated
  }

  pub fn sort_populated(&mut self) {
    self.populated.sort_unstable();
  }

  pub fn len(&self) -> usize {
    self.populated.len()
  }

  pub fn is_empty(&self) -> bool {
    self.populated.is_empty()
  }

  #[inline]
  pub fn inside(&self, nt: u16) -> f32 {
    self.inside[nt as usize]
  }

  pub fn entry(&self, nt: u16) -> Option<ChartEntry> {
    let i = nt as usize;
    (self.inside[i] != LOG_ZERO).then(|| ChartEntry {
      nt,
      inside: self.inside[i],
      children: self.children[i],
      midpoint: self.midpoints[i],
    })
  }

  /// Keeps the entry if it beats the current inside score of `nt`.
  #[inline]
  pub fn update(&mut self, nt: u16, inside: f32, children: Children, midpoint: u16) -> bool {
    let i = nt as usize;
    if inside > self.inside[i] {
      if self.inside[i] == LOG_ZERO {
        self.populated.push(nt);
      }
      self.inside[i] = inside;
      self.children[i] = children;
      self.midpoints[i] = midpoint;
      true
    } else {
      false
    }
  }

  /// Overwrites the entry for `nt` regardless of its current score.
  pub fn set(&mut self, nt: u16, inside: f32, children: Children, midpoint: u16) {
    let i = nt as usize;
    if inside == LOG_ZERO {
      return;
    }
    if self.inside[i] == LOG_ZERO {
      self.populated.push(nt);
    }
    self.inside[i] = inside;
    self.children[i] = children;
    self.midpoints[i] = midpoint;
  }

  /// Writes the populated entries into `cell`, sorted by non-terminal.
  pub fn finalize_into(&mut self, cell: &mut Cell) {
    self.populated.sort_unstable();
    cell.clear();
    for &nt in self.populated.iter() {
      let i = nt as usize;
      cell.push(ChartEntry {
        nt,
        inside: self.inside[i],
        children: self.children[i],
        midpoint: self.midpoints[i],
      });
    }
  }
}
