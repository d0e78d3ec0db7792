use std::collections::BTreeSet;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{GrammarError, GrammarResult};
use crate::matrix::{CscMatrix, CsrMatrix};
use crate::packing::{Packing, PackingFunction, PackingKind, PerfectPairHash};
use crate::parse_grammar::GrammarSource;
use crate::rules::{Production, Rhs};
use crate::symbols::{ClassBoundaries, NonTerminalClass, SymbolTable};
use crate::utils::LOG_ZERO;

/// A PCFG compiled into sparse matrices.
///
/// Non-terminals are renumbered so each structural class is a contiguous index
/// range (see [`NonTerminalClass`]). Binary rules are stored by parent (CSR) and
/// by packed child pair (CSC); unary rules by parent (CSR) and by child (CSC);
/// lexical rules by word. Two more CSC copies of the binary rules, keyed by
/// (parent, sibling) and holding the left or right child as the row, serve the
/// outside pass.
///
/// Immutable once compiled; share it freely between parsers and threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grammar {
  start_symbol: u16,
  non_terminals: SymbolTable,
  lexicon: SymbolTable,
  bounds: ClassBoundaries,
  packing: Packing,

  csr_binary: CsrMatrix,
  csc_binary: CscMatrix,
  csr_unary: CsrMatrix,
  csc_unary: CscMatrix,
  lexical: CscMatrix,

  left_child_packing: PerfectPairHash,
  left_child_csc: CscMatrix,
  right_child_packing: PerfectPairHash,
  right_child_csc: CscMatrix,

  min_right_sibling: Vec<u16>,
  max_right_sibling: Vec<u16>,
}

/// Which binary-rule positions and rule types a non-terminal occurs in.
#[derive(Debug, Default)]
struct Occurrences {
  pos: FxHashSet<String>,
  left: FxHashSet<String>,
  right: FxHashSet<String>,
  all: BTreeSet<String>,
}

impl Occurrences {
  fn scan(source: &GrammarSource) -> Self {
    let mut occ = Self::default();
    for rule in source.lexicon.iter() {
      occ.pos.insert(rule.parent.clone());
      occ.all.insert(rule.parent.clone());
    }
    for rule in source.rules.iter() {
      occ.all.insert(rule.parent.clone());
      occ.all.insert(rule.left.clone());
      if let Some(right) = &rule.right {
        occ.all.insert(right.clone());
        if !occ.pos.contains(&rule.left) {
          occ.left.insert(rule.left.clone());
        }
        if !occ.pos.contains(right) {
          occ.right.insert(right.clone());
        }
      }
    }
    occ.all.insert(source.start_symbol.clone());
    occ
  }

  /// Anything that isn't a pos tag or a binary child lands in the unary-only
  /// class, including the start symbol and parent-only non-terminals.
  fn class_of(&self, nt: &str) -> NonTerminalClass {
    if self.pos.contains(nt) {
      NonTerminalClass::Pos
    } else {
      match (self.left.contains(nt), self.right.contains(nt)) {
        (true, true) => NonTerminalClass::EitherChild,
        (true, false) => NonTerminalClass::LeftChildOnly,
        (false, true) => NonTerminalClass::RightChildOnly,
        (false, false) => NonTerminalClass::UnaryChildOnly,
      }
    }
  }
}

impl Grammar {
  /// Reads, then compiles, a grammar and lexicon from text.
  pub fn parse(grammar: &str, lexicon: &str, packing: PackingKind) -> GrammarResult<Self> {
    Self::compile(&GrammarSource::parse(grammar, lexicon)?, packing)
  }

  pub fn read_from_files(
    grammar_path: impl AsRef<Path>,
    lexicon_path: impl AsRef<Path>,
    packing: PackingKind,
  ) -> GrammarResult<Self> {
    Self::compile(
      &GrammarSource::read_from_files(grammar_path, lexicon_path)?,
      packing,
    )
  }

  /// Classifies and renumbers non-terminals, then builds the packing function and
  /// every rule matrix. Duplicate rules are merged by summing their probabilities.
  pub fn compile(source: &GrammarSource, packing_kind: PackingKind) -> GrammarResult<Self> {
    let occ = Occurrences::scan(source);
    if occ.all.len() > u16::MAX as usize {
      return Err(GrammarError::TooManyNonTerminals {
        count: occ.all.len(),
      });
    }

    // BTreeSet iteration is lexical, so a stable sort by class leaves each
    // class sorted by label
    let mut sorted: Vec<(NonTerminalClass, &String)> =
      occ.all.iter().map(|nt| (occ.class_of(nt), nt)).collect();
    sorted.sort_by_key(|(class, _)| *class);

    let mut counts = [0usize; 5];
    for (class, _) in sorted.iter() {
      counts[*class as usize] += 1;
    }
    let bounds = ClassBoundaries::from_counts(counts);
    let non_terminals: SymbolTable = sorted.iter().map(|(_, nt)| nt.as_str()).collect();

    for class in NonTerminalClass::ALL {
      debug!(%class, count = bounds.range(class).len(), "non-terminal class");
    }

    let nt = |s: &str| -> GrammarResult<u16> {
      non_terminals
        .get(s)
        .map(|i| i as u16)
        .ok_or_else(|| GrammarError::UnknownSymbol(s.to_string()))
    };

    let mut lexicon = SymbolTable::new();
    let mut productions = Vec::with_capacity(source.rules.len() + source.lexicon.len());
    for rule in source.lexicon.iter() {
      let word = lexicon.index(&rule.left);
      productions.push(Production::lexical(nt(&rule.parent)?, word, rule.log_prob));
    }
    for rule in source.rules.iter() {
      let parent = nt(&rule.parent)?;
      let left = nt(&rule.left)?;
      productions.push(match &rule.right {
        Some(right) => Production::binary(parent, left, nt(right)?, rule.log_prob),
        None => Production::unary(parent, left, rule.log_prob),
      });
    }

    let start_symbol = nt(&source.start_symbol)?;
    Self::from_productions(
      start_symbol,
      non_terminals,
      lexicon,
      bounds,
      &productions,
      packing_kind,
    )
  }

  /// Builds the matrices from indexed productions. `non_terminals` must already
  /// be ordered to match `bounds`.
  pub fn from_productions(
    start_symbol: u16,
    non_terminals: SymbolTable,
    lexicon: SymbolTable,
    bounds: ClassBoundaries,
    productions: &[Production],
    packing_kind: PackingKind,
  ) -> GrammarResult<Self> {
    let num_nts = non_terminals.len();

    let mut pairs = Vec::new();
    let mut min_right_sibling = vec![u16::MAX; num_nts];
    let mut max_right_sibling = vec![0u16; num_nts];
    for p in productions.iter() {
      if let Rhs::Binary { left, right } = p.rhs {
        pairs.push((left, right));
        min_right_sibling[left as usize] = min_right_sibling[left as usize].min(right);
        max_right_sibling[left as usize] = max_right_sibling[left as usize].max(right);
      }
    }

    let packing = Packing::build(packing_kind, &bounds, &pairs)?;

    let mut binary = Vec::new();
    let mut unary = Vec::new();
    let mut lexical = Vec::new();
    let mut by_left_child = Vec::new();
    let mut by_right_child = Vec::new();
    for p in productions.iter() {
      match p.rhs {
        Rhs::Binary { left, right } => {
          let key = packing.pack(left, right).ok_or(GrammarError::PackingOverflow {
            strategy: packing_kind.name(),
            required: packing.packed_array_size() as u64,
          })?;
          binary.push((p.parent, key, p.log_prob));
          by_left_child.push((p.parent, right, left, p.log_prob));
          by_right_child.push((p.parent, left, right, p.log_prob));
        }
        Rhs::Unary { child } => unary.push((p.parent, child, p.log_prob)),
        Rhs::Lexical { word } => lexical.push((p.parent, word, p.log_prob)),
      }
    }

    let csr_binary = CsrMatrix::new(
      num_nts,
      binary.iter().map(|&(p, k, v)| (p as u32, k, v)).collect(),
    );
    let csc_binary = CscMatrix::new(packing.packed_array_size(), binary);

    let csr_unary = CsrMatrix::new(
      num_nts,
      unary.iter().map(|&(p, c, v)| (p as u32, c as u32, v)).collect(),
    );
    let csc_unary = CscMatrix::new(
      num_nts,
      unary.into_iter().map(|(p, c, v)| (p, c as u32, v)).collect(),
    );
    let lexical = CscMatrix::new(lexicon.len(), lexical);

    let (left_child_packing, left_child_csc) = Self::sibling_matrix(num_nts, &by_left_child);
    let (right_child_packing, right_child_csc) = Self::sibling_matrix(num_nts, &by_right_child);

    let grammar = Self {
      start_symbol,
      non_terminals,
      lexicon,
      bounds,
      packing,
      csr_binary,
      csc_binary,
      csr_unary,
      csc_unary,
      lexical,
      left_child_packing,
      left_child_csc,
      right_child_packing,
      right_child_csc,
      min_right_sibling,
      max_right_sibling,
    };

    info!(
      packing = %packing_kind,
      non_terminals = num_nts,
      binary = grammar.num_binary_rules(),
      unary = grammar.num_unary_rules(),
      lexical = grammar.num_lexical_rules(),
      packed_array_size = grammar.packing.packed_array_size(),
      "compiled grammar"
    );

    Ok(grammar)
  }

  /// CSC matrix whose columns are hashed (parent, sibling) pairs and whose rows
  /// are the remaining child. Entries are (parent, sibling, child, log-prob).
  fn sibling_matrix(num_nts: usize, entries: &[(u16, u16, u16, f32)]) -> (PerfectPairHash, CscMatrix) {
    let packing = PerfectPairHash::new(
      0..num_nts as u16,
      entries.iter().map(|&(parent, sibling, _, _)| (parent, sibling)),
    );
    let matrix = CscMatrix::new(
      packing.packed_array_size(),
      entries
        .iter()
        .filter_map(|&(parent, sibling, child, v)| {
          packing.pack(parent, sibling).map(|key| (child, key, v))
        })
        .collect(),
    );
    (packing, matrix)
  }

  pub fn start_symbol(&self) -> u16 {
    self.start_symbol
  }

  pub fn num_non_terminals(&self) -> usize {
    self.non_terminals.len()
  }

  pub fn non_terminals(&self) -> &SymbolTable {
    &self.non_terminals
  }

  pub fn lexicon(&self) -> &SymbolTable {
    &self.lexicon
  }

  pub fn non_terminal(&self, nt: u16) -> &str {
    self.non_terminals.symbol(nt as u32)
  }

  pub fn word(&self, word: u32) -> &str {
    self.lexicon.symbol(word)
  }

  pub fn bounds(&self) -> &ClassBoundaries {
    &self.bounds
  }

  pub fn packing(&self) -> &Packing {
    &self.packing
  }

  pub fn csr_binary(&self) -> &CsrMatrix {
    &self.csr_binary
  }

  pub fn csc_binary(&self) -> &CscMatrix {
    &self.csc_binary
  }

  pub fn csr_unary(&self) -> &CsrMatrix {
    &self.csr_unary
  }

  pub fn csc_unary(&self) -> &CscMatrix {
    &self.csc_unary
  }

  pub fn lexical(&self) -> &CscMatrix {
    &self.lexical
  }

  pub fn left_child_packing(&self) -> &PerfectPairHash {
    &self.left_child_packing
  }

  pub fn left_child_csc(&self) -> &CscMatrix {
    &self.left_child_csc
  }

  pub fn right_child_packing(&self) -> &PerfectPairHash {
    &self.right_child_packing
  }

  pub fn right_child_csc(&self) -> &CscMatrix {
    &self.right_child_csc
  }

  /// Inclusive range of right children `left` combines with in some binary rule.
  /// `None` if `left` never occurs as a left child.
  #[inline]
  pub fn right_sibling_bounds(&self, left: u16) -> Option<(u16, u16)> {
    let min = self.min_right_sibling[left as usize];
    let max = self.max_right_sibling[left as usize];
    (min <= max).then_some((min, max))
  }

  pub fn num_binary_rules(&self) -> usize {
    self.csr_binary.nnz()
  }

  pub fn num_unary_rules(&self) -> usize {
    self.csr_unary.nnz()
  }

  pub fn num_lexical_rules(&self) -> usize {
    self.lexical.nnz()
  }

  pub fn binary_log_prob(&self, parent: u16, left: u16, right: u16) -> f32 {
    match self.packing.pack(left, right) {
      Some(key) => self.csr_binary.get(parent, key),
      None => LOG_ZERO,
    }
  }

  pub fn unary_log_prob(&self, parent: u16, child: u16) -> f32 {
    self.csr_unary.get(parent, child as u32)
  }

  pub fn lexical_log_prob(&self, parent: u16, word: u32) -> f32 {
    self.lexical.get(parent, word)
  }

  /// Every binary rule as (parent, left, right, log-prob), read back out of the CSR matrix.
  pub fn binary_productions(&self) -> Vec<Production> {
    (0..self.num_non_terminals() as u16)
      .flat_map(|parent| {
        self.csr_binary.row(parent).filter_map(move |(key, v)| {
          let (left, right) = self.packing.unpack(key)?;
          Some(Production::binary(parent, left, right, v))
        })
      })
      .collect()
  }

  pub fn stats(&self) -> GrammarStats {
    GrammarStats {
      packing: self.packing.kind(),
      non_terminals: self.num_non_terminals(),
      words: self.lexicon.len(),
      binary_rules: self.num_binary_rules(),
      unary_rules: self.num_unary_rules(),
      lexical_rules: self.num_lexical_rules(),
      valid_child_pairs: self.csc_binary.populated_columns().len(),
      packed_array_size: self.packing.packed_array_size(),
      class_sizes: NonTerminalClass::ALL.map(|c| (c, self.bounds.range(c).len())),
      start_symbol: self.non_terminal(self.start_symbol).to_string(),
    }
  }

  /// Writes the compiled grammar as an opaque binary blob.
  pub fn write_binary<W: Write>(&self, mut writer: W) -> GrammarResult<()> {
    bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
      .map_err(|e| GrammarError::Serialization(e.to_string()))?;
    Ok(())
  }

  /// Reads a grammar written by [`Grammar::write_binary`] with the same crate version.
  pub fn read_binary<R: Read>(mut reader: R) -> GrammarResult<Self> {
    bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
      .map_err(|e| GrammarError::Serialization(e.to_string()))
  }
}

/// Summary counts for a compiled grammar.
#[derive(Debug, Clone, PartialEq)]
pub struct GrammarStats {
  pub packing: PackingKind,
  pub non_terminals: usize,
  pub words: usize,
  pub binary_rules: usize,
  pub unary_rules: usize,
  pub lexical_rules: usize,
  pub valid_child_pairs: usize,
  pub packed_array_size: usize,
  pub class_sizes: [(NonTerminalClass, usize); 5],
  pub start_symbol: String,
}

impl fmt::Display for GrammarStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Binary rules: {}", self.binary_rules)?;
    writeln!(f, "Unary rules: {}", self.unary_rules)?;
    writeln!(f, "Lexical rules: {}", self.lexical_rules)?;
    writeln!(f, "Non-terminals: {}", self.non_terminals)?;
    writeln!(f, "Lexical symbols: {}", self.words)?;
    for (class, size) in self.class_sizes.iter() {
      writeln!(f, "  {}: {}", class, size)?;
    }
    writeln!(f, "Start symbol: {}", self.start_symbol)?;
    writeln!(f, "Packing function: {}", self.packing)?;
    writeln!(f, "Valid child pairs: {}", self.valid_child_pairs)?;
    write!(f, "Packed array size: {}", self.packed_array_size)
  }
}
