//! Which spans of a sentence get populated, and in what order.

use rustc_hash::{FxHashMap, FxHashSet};

/// Yields the spans to populate for one sentence.
///
/// Every span's children must be yielded before it: any order that visits
/// shorter spans first is valid. Spans never yielded are left empty.
pub trait CellSelector {
  fn reset(&mut self, sentence_len: u16);

  fn next(&mut self) -> Option<(u16, u16)>;

  /// Beam width for one cell, if narrower than the parser's global width.
  fn beam_width(&self, _start: u16, _end: u16) -> Option<usize> {
    None
  }
}

/// Every span, shortest first, left to right within a width.
#[derive(Debug, Clone, Default)]
pub struct LeftRightBottomUp {
  len: u16,
  span: u16,
  start: u16,
}

impl LeftRightBottomUp {
  pub fn new() -> Self {
    Default::default()
  }
}

impl CellSelector for LeftRightBottomUp {
  fn reset(&mut self, sentence_len: u16) {
    self.len = sentence_len;
    self.span = 1;
    self.start = 0;
  }

  fn next(&mut self) -> Option<(u16, u16)> {
    if self.span == 0 || self.span > self.len {
      return None;
    }
    let cell = (self.start, self.start + self.span);
    if self.start + self.span == self.len {
      self.span += 1;
      self.start = 0;
    } else {
      self.start += 1;
    }
    Some(cell)
  }
}

/// Wraps another selector, leaving out a fixed set of spans.
#[derive(Debug, Clone)]
pub struct SkipSpans<S> {
  inner: S,
  skipped: FxHashSet<(u16, u16)>,
}

impl<S: CellSelector> SkipSpans<S> {
  pub fn new(inner: S, skipped: impl IntoIterator<Item = (u16, u16)>) -> Self {
    Self {
      inner,
      skipped: skipped.into_iter().collect(),
    }
  }
}

impl<S: CellSelector> CellSelector for SkipSpans<S> {
  fn reset(&mut self, sentence_len: u16) {
    self.inner.reset(sentence_len);
  }

  fn next(&mut self) -> Option<(u16, u16)> {
    loop {
      let span = self.inner.next()?;
      if !self.skipped.contains(&span) {
        return Some(span);
      }
    }
  }

  fn beam_width(&self, start: u16, end: u16) -> Option<usize> {
    self.inner.beam_width(start, end)
  }
}

/// Wraps another selector, narrowing the beam of individual cells.
#[derive(Debug, Clone)]
pub struct CellBeamWidths<S> {
  inner: S,
  widths: FxHashMap<(u16, u16), usize>,
}

impl<S: CellSelector> CellBeamWidths<S> {
  pub fn new(inner: S, widths: impl IntoIterator<Item = ((u16, u16), usize)>) -> Self {
    Self {
      inner,
      widths: widths.into_iter().collect(),
    }
  }
}

impl<S: CellSelector> CellSelector for CellBeamWidths<S> {
  fn reset(&mut self, sentence_len: u16) {
    self.inner.reset(sentence_len);
  }

  fn next(&mut self) -> Option<(u16, u16)> {
    self.inner.next()
  }

  fn beam_width(&self, start: u16, end: u16) -> Option<usize> {
    match (self.widths.get(&(start, end)), self.inner.beam_width(start, end)) {
      (Some(&a), Some(b)) => Some(a.min(b)),
      (a, b) => a.copied().or(b),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn spans(selector: &mut impl CellSelector, len: u16) -> Vec<(u16, u16)> {
    selector.reset(len);
    std::iter::from_fn(|| selector.next()).collect()
  }

  #[test]
  fn test_bottom_up_order() {
    let mut s = LeftRightBottomUp::new();
    assert_eq!(
      spans(&mut s, 3),
      vec![(0, 1), (1, 2), (2, 3), (0, 2), (1, 3), (0, 3)]
    );
    assert_eq!(spans(&mut s, 0), vec![]);
    // resets cleanly between sentences
    assert_eq!(spans(&mut s, 1), vec![(0, 1)]);
  }

  #[test]
  fn test_skip_spans() {
    let mut s = SkipSpans::new(LeftRightBottomUp::new(), [(1, 3), (0, 1)]);
    assert_eq!(spans(&mut s, 3), vec![(1, 2), (2, 3), (0, 2), (0, 3)]);
  }

  #[test]
  fn test_cell_beam_widths() {
    let s = CellBeamWidths::new(LeftRightBottomUp::new(), [((0, 3), 2)]);
    let s = CellBeamWidths::new(s, [((0, 3), 5), ((0, 1), 1)]);
    assert_eq!(s.beam_width(0, 3), Some(2));
    assert_eq!(s.beam_width(0, 1), Some(1));
    assert_eq!(s.beam_width(1, 2), None);
  }
}
