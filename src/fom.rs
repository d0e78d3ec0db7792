/// Ranks candidate non-terminals of a cell for beam pruning. Higher is better.
///
/// Must be a pure function of its arguments; cells may be scored from several
/// threads at once.
pub trait FigureOfMerit: Send + Sync {
  fn score(&self, start: u16, end: u16, nt: u16, inside: f32) -> f32;

  /// Score for entries of span-1 cells, before any unary rule is applied.
  fn lexical_score(&self, start: u16, end: u16, nt: u16, inside: f32) -> f32 {
    self.score(start, end, nt, inside)
  }
}

/// Ranks entries by inside log-probability alone.
#[derive(Debug, Copy, Clone, Default)]
pub struct InsideProbabilityFom;

impl FigureOfMerit for InsideProbabilityFom {
  fn score(&self, _start: u16, _end: u16, _nt: u16, inside: f32) -> f32 {
    inside
  }
}

impl<F> FigureOfMerit for F
where
  F: Fn(u16, u16, u16, f32) -> f32 + Send + Sync,
{
  fn score(&self, start: u16, end: u16, nt: u16, inside: f32) -> f32 {
    self(start, end, nt, inside)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_closure_fom() {
    let boost = |_s: u16, _e: u16, nt: u16, inside: f32| if nt == 3 { inside + 1.0 } else { inside };
    assert_eq!(boost.score(0, 1, 3, -2.0), -1.0);
    assert_eq!(boost.lexical_score(0, 1, 2, -2.0), -2.0);
    assert_eq!(InsideProbabilityFom.score(0, 4, 9, -0.5), -0.5);
  }
}
