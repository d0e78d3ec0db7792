use std::fmt;

use crate::chart::{Chart, Children};
use crate::errors::ParseError;
use crate::grammar::Grammar;
use crate::packing::PackingFunction;

#[derive(Debug, PartialEq, Clone)]
pub struct Constituent<T> {
  pub value: T,
  pub span: (usize, usize),
}

impl<T> fmt::Display for Constituent<T>
where
  T: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}: {}", self.span.0, self.span.1, self.value)
  }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Word<U> {
  pub value: U,
  pub span: (usize, usize),
}

impl<U> fmt::Display for Word<U>
where
  U: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}: {}", self.span.0, self.span.1, self.value)
  }
}

#[derive(Debug, PartialEq, Clone)]
pub enum SynTree<T, U> {
  Branch(Constituent<T>, Vec<SynTree<T, U>>),
  Leaf(Word<U>),
}

impl<T, U> SynTree<T, U> {
  pub fn is_leaf(&self) -> bool {
    matches!(self, Self::Leaf(_))
  }

  pub fn get_leaf(&self) -> Option<&Word<U>> {
    match self {
      Self::Leaf(w) => Some(w),
      _ => None,
    }
  }

  pub fn get_branch(&self) -> Option<(&Constituent<T>, &Vec<SynTree<T, U>>)> {
    match self {
      Self::Branch(c, cs) => Some((c, cs)),
      _ => None,
    }
  }

  pub fn span(&self) -> (usize, usize) {
    match self {
      Self::Branch(c, _) => c.span,
      Self::Leaf(w) => w.span,
    }
  }

  /// Words under this tree, left to right.
  pub fn leaves(&self) -> Vec<&U> {
    match self {
      Self::Leaf(w) => vec![&w.value],
      Self::Branch(_, children) => children.iter().flat_map(|c| c.leaves()).collect(),
    }
  }

  pub fn map<V, W>(
    &self,
    map_branch: &impl Fn(&Constituent<T>) -> V,
    map_leaf: &impl Fn(&Word<U>) -> W,
  ) -> SynTree<V, W> {
    match self {
      Self::Branch(t, children) => {
        let children = children
          .iter()
          .map(|c| c.map(map_branch, map_leaf))
          .collect::<Vec<_>>();
        SynTree::Branch(
          Constituent {
            span: t.span,
            value: map_branch(t),
          },
          children,
        )
      }
      Self::Leaf(u) => SynTree::Leaf(Word {
        span: u.span,
        value: map_leaf(u),
      }),
    }
  }
}

/// Penn-treebank brackets: `(S (NP (n dog)) (VP (v barks)))`
impl<T, U> fmt::Display for SynTree<T, U>
where
  T: fmt::Display,
  U: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Leaf(w) => write!(f, "{}", w.value),
      Self::Branch(c, children) => {
        write!(f, "({}", c.value)?;
        for child in children.iter() {
          write!(f, " {}", child)?;
        }
        write!(f, ")")
      }
    }
  }
}

/// Rebuilds the best derivation of `nt` over (start, end) from the chart's
/// backpointers. Branches are labelled with non-terminal indices and leaves with
/// the word's position in the sentence.
pub fn backtrace(
  grammar: &Grammar,
  chart: &Chart,
  start: u16,
  end: u16,
  nt: u16,
) -> Result<SynTree<u16, usize>, ParseError> {
  backtrace_bounded(grammar, chart, start, end, nt, grammar.num_non_terminals())
}

/// `unaries` bounds how many unary entries may stack in one cell, so a
/// cyclic set of backpointers can't recurse forever.
fn backtrace_bounded(
  grammar: &Grammar,
  chart: &Chart,
  start: u16,
  end: u16,
  nt: u16,
  unaries: usize,
) -> Result<SynTree<u16, usize>, ParseError> {
  let entry = chart.cell(start, end).get(nt).ok_or(ParseError::NoParse)?;
  let span = (start as usize, end as usize);
  let children = match entry.children {
    Children::Lexical(_) => vec![SynTree::Leaf(Word {
      value: start as usize,
      span,
    })],
    Children::Unary(child) => {
      if unaries == 0 {
        return Err(ParseError::NoParse);
      }
      vec![backtrace_bounded(grammar, chart, start, end, child, unaries - 1)?]
    }
    Children::Binary(key) => {
      let (left, right) = grammar.packing().unpack(key).ok_or(ParseError::NoParse)?;
      let mid = entry.midpoint;
      let unaries = grammar.num_non_terminals();
      vec![
        backtrace_bounded(grammar, chart, start, mid, left, unaries)?,
        backtrace_bounded(grammar, chart, mid, end, right, unaries)?,
      ]
    }
  };
  Ok(SynTree::Branch(Constituent { value: nt, span }, children))
}
