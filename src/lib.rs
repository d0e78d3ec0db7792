#[macro_use]
extern crate lazy_static;

pub mod beam;
pub mod cartesian;
pub mod cell_selector;
pub mod chart;
pub mod classifier;
pub mod errors;
pub mod fom;
pub mod grammar;
pub mod matrix;
pub mod outside;
pub mod packing;
pub mod parse_grammar;
pub mod parser;
pub mod rules;
pub mod spmv;
pub mod symbols;
pub mod syntree;
pub mod utils;

pub use crate::cell_selector::{CellBeamWidths, CellSelector, LeftRightBottomUp, SkipSpans};
pub use crate::errors::{GrammarError, ParseError};
pub use crate::fom::{FigureOfMerit, InsideProbabilityFom};
pub use crate::grammar::{Grammar, GrammarStats};
pub use crate::outside::OutsideChart;
pub use crate::packing::PackingKind;
pub use crate::parser::{parse_batch, ParseResult, ParseStats, Parser, ParserOptions};
pub use crate::syntree::SynTree;
pub use crate::utils::Err;

impl Grammar {
  /// Parses one whitespace-tokenized sentence exhaustively, with a throwaway parser.
  pub fn parse_sentence(&self, sentence: &str) -> Result<ParseResult, ParseError> {
    Parser::new(self, ParserOptions::default()).parse(sentence)
  }
}

#[test]
fn test_ambiguous_attachment() {
  let g = Grammar::parse(
    r#"
    S
    S -> NP VP 1.0
    VP -> V NP 0.6
    VP -> VP PP 0.4
    NP -> NP PP 0.3
    NP -> D N 0.7
    PP -> P NP 1.0
    "#,
    r#"
    D -> the 1.0
    N -> man 0.5
    N -> telescope 0.5
    V -> saw 1.0
    P -> with 1.0
    "#,
    PackingKind::default(),
  )
  .unwrap();

  let result = g
    .parse_sentence("the man saw the man with the telescope")
    .unwrap();
  // VP attachment: 0.4 * 0.6 beats NP attachment: 0.6 * 0.3
  assert_eq!(
    result.tree.to_string(),
    "(S (NP (D the) (N man)) (VP (VP (V saw) (NP (D the) (N man))) (PP (P with) (NP (D the) (N telescope)))))"
  );
  assert!(g.parse_sentence("saw the man").is_err());
}
