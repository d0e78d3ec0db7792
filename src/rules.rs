use std::fmt;

use serde::{Deserialize, Serialize};

/// A rule as read from a grammar or lexicon file, before symbols are indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct StringRule {
  pub parent: String,
  pub left: String,
  pub right: Option<String>,
  /// Natural-log probability
  pub log_prob: f32,
}

impl StringRule {
  pub fn is_binary(&self) -> bool {
    self.right.is_some()
  }
}

impl fmt::Display for StringRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} -> {}", self.parent, self.left)?;
    if let Some(right) = &self.right {
      write!(f, " {}", right)?;
    }
    write!(f, " {}", self.log_prob.exp())
  }
}

/// What a production rewrites to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rhs {
  Binary { left: u16, right: u16 },
  Unary { child: u16 },
  /// `word` is an index into the lexicon, not a non-terminal
  Lexical { word: u32 },
}

/// An indexed, weighted production.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Production {
  pub parent: u16,
  pub rhs: Rhs,
  pub log_prob: f32,
}

impl Production {
  pub fn binary(parent: u16, left: u16, right: u16, log_prob: f32) -> Self {
    Self {
      parent,
      rhs: Rhs::Binary { left, right },
      log_prob,
    }
  }

  pub fn unary(parent: u16, child: u16, log_prob: f32) -> Self {
    Self {
      parent,
      rhs: Rhs::Unary { child },
      log_prob,
    }
  }

  pub fn lexical(parent: u16, word: u32, log_prob: f32) -> Self {
    Self {
      parent,
      rhs: Rhs::Lexical { word },
      log_prob,
    }
  }

  pub fn is_binary(&self) -> bool {
    matches!(self.rhs, Rhs::Binary { .. })
  }

  pub fn is_unary(&self) -> bool {
    matches!(self.rhs, Rhs::Unary { .. })
  }

  pub fn is_lexical(&self) -> bool {
    matches!(self.rhs, Rhs::Lexical { .. })
  }
}

impl fmt::Display for Production {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.rhs {
      Rhs::Binary { left, right } => write!(f, "{} -> {} {}", self.parent, left, right)?,
      Rhs::Unary { child } => write!(f, "{} -> {}", self.parent, child)?,
      Rhs::Lexical { word } => write!(f, "{} -> '{}", self.parent, word)?,
    }
    write!(f, " ({:.4})", self.log_prob)
  }
}
