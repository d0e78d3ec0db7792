//! Error types for grammar compilation and per-sentence parsing.

use thiserror::Error;

/// Fatal errors raised while reading or compiling a grammar.
#[derive(Debug, Error)]
pub enum GrammarError {
  /// A rule line didn't have the expected `A -> B [C] prob` shape.
  #[error("malformed line {line_no}: {line}")]
  MalformedLine { line_no: usize, line: String },

  /// The grammar file never declared a start symbol.
  #[error("no start symbol found; expected a single non-terminal on its own line")]
  MissingStartSymbol,

  /// More than one start symbol line was found.
  #[error("more than one start symbol declared (line {line_no}: {line})")]
  DuplicateStartSymbol { line_no: usize, line: String },

  /// The probability column didn't parse, was above 1, or was exactly 0
  /// (neither a usable probability nor an unambiguous log-probability).
  #[error("bad probability on line {line_no}: {value}")]
  BadProbability { line_no: usize, value: String },

  /// A rule refers to a symbol the compiled grammar doesn't know.
  #[error("unknown symbol: {0}")]
  UnknownSymbol(String),

  /// Non-terminal indices are stored in 16 bits.
  #[error("grammar has {count} non-terminals; at most {} are supported", u16::MAX)]
  TooManyNonTerminals { count: usize },

  /// The chosen packing function can't address every child pair.
  #[error(
    "{strategy} packing needs a {required}-entry array; use the perfect-hash packing for this grammar"
  )]
  PackingOverflow {
    strategy: &'static str,
    required: u64,
  },

  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// Binary grammar encoding or decoding failed.
  #[error("serialization: {0}")]
  Serialization(String),
}

/// Non-fatal per-sentence failures. A batch reports these and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
  /// The start symbol never reached the top cell.
  #[error("no parse")]
  NoParse,

  /// A token has no lexical entry and the lexicon has no unknown-word class.
  #[error("unknown word: {0}")]
  UnknownWord(String),

  #[error("sentence length {len} exceeds maximum {max}")]
  SentenceTooLong { len: usize, max: usize },

  #[error("empty sentence")]
  EmptySentence,

  /// The sentence ran past the parser's time limit and was abandoned.
  #[error("parse abandoned after {elapsed_ms}ms")]
  Cancelled { elapsed_ms: u128 },
}

pub type GrammarResult<T> = Result<T, GrammarError>;
