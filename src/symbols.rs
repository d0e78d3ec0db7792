use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Bidirectional mapping between symbol strings and dense indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
  symbols: Vec<String>,
  indices: FxHashMap<String, u32>,
}

impl SymbolTable {
  pub fn new() -> Self {
    Default::default()
  }

  /// Returns the index of `symbol`, adding it if it's new.
  pub fn index(&mut self, symbol: &str) -> u32 {
    if let Some(&idx) = self.indices.get(symbol) {
      return idx;
    }
    let idx = self.symbols.len() as u32;
    self.symbols.push(symbol.to_string());
    self.indices.insert(symbol.to_string(), idx);
    idx
  }

  pub fn get(&self, symbol: &str) -> Option<u32> {
    self.indices.get(symbol).copied()
  }

  /// Panics on an out-of-range index
  pub fn symbol(&self, idx: u32) -> &str {
    &self.symbols[idx as usize]
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
    self.symbols.iter().enumerate().map(|(i, s)| (i as u32, s.as_str()))
  }
}

impl<S: AsRef<str>> FromIterator<S> for SymbolTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let mut table = Self::new();
    for s in iter {
      table.index(s.as_ref());
    }
    table
  }
}

/// Structural class of a non-terminal. Non-terminals are numbered class by class,
/// in declaration order, so each class is one contiguous index range.
///
/// The order is what makes the child ranges contiguous: valid right children are
/// `RightChildOnly..LeftChildOnly` and valid left children are `Pos..UnaryChildOnly`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NonTerminalClass {
  RightChildOnly,
  Pos,
  EitherChild,
  LeftChildOnly,
  UnaryChildOnly,
}

impl NonTerminalClass {
  pub const ALL: [NonTerminalClass; 5] = [
    Self::RightChildOnly,
    Self::Pos,
    Self::EitherChild,
    Self::LeftChildOnly,
    Self::UnaryChildOnly,
  ];
}

impl fmt::Display for NonTerminalClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::RightChildOnly => "right-child-only",
      Self::Pos => "pos",
      Self::EitherChild => "either-child",
      Self::LeftChildOnly => "left-child-only",
      Self::UnaryChildOnly => "unary-child-only",
    };
    write!(f, "{}", name)
  }
}

/// Start indices of each non-terminal class. Empty classes start where the next one does.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassBoundaries {
  pub right_child_only_start: u16,
  pub pos_start: u16,
  pub either_child_start: u16,
  pub left_child_only_start: u16,
  pub unary_child_only_start: u16,
  pub num_non_terminals: u16,
}

impl ClassBoundaries {
  /// Builds boundaries from per-class counts, in `NonTerminalClass::ALL` order.
  pub fn from_counts(counts: [usize; 5]) -> Self {
    let mut starts = [0u16; 5];
    let mut next = 0usize;
    for (i, count) in counts.iter().enumerate() {
      starts[i] = next as u16;
      next += count;
    }
    Self {
      right_child_only_start: starts[0],
      pos_start: starts[1],
      either_child_start: starts[2],
      left_child_only_start: starts[3],
      unary_child_only_start: starts[4],
      num_non_terminals: next as u16,
    }
  }

  pub fn class_of(&self, nt: u16) -> NonTerminalClass {
    if nt < self.pos_start {
      NonTerminalClass::RightChildOnly
    } else if nt < self.either_child_start {
      NonTerminalClass::Pos
    } else if nt < self.left_child_only_start {
      NonTerminalClass::EitherChild
    } else if nt < self.unary_child_only_start {
      NonTerminalClass::LeftChildOnly
    } else {
      NonTerminalClass::UnaryChildOnly
    }
  }

  pub fn range(&self, class: NonTerminalClass) -> std::ops::Range<u16> {
    match class {
      NonTerminalClass::RightChildOnly => self.right_child_only_start..self.pos_start,
      NonTerminalClass::Pos => self.pos_start..self.either_child_start,
      NonTerminalClass::EitherChild => self.either_child_start..self.left_child_only_start,
      NonTerminalClass::LeftChildOnly => self.left_child_only_start..self.unary_child_only_start,
      NonTerminalClass::UnaryChildOnly => self.unary_child_only_start..self.num_non_terminals,
    }
  }

  /// Non-terminals that may appear as the left child of a binary rule.
  pub fn left_children(&self) -> std::ops::Range<u16> {
    self.pos_start..self.unary_child_only_start
  }

  /// Non-terminals that may appear as the right child of a binary rule.
  pub fn right_children(&self) -> std::ops::Range<u16> {
    self.right_child_only_start..self.left_child_only_start
  }

  pub fn is_pos(&self, nt: u16) -> bool {
    self.class_of(nt) == NonTerminalClass::Pos
  }

  pub fn is_valid_left_child(&self, nt: u16) -> bool {
    self.left_children().contains(&nt)
  }

  pub fn is_valid_right_child(&self, nt: u16) -> bool {
    self.right_children().contains(&nt)
  }
}
