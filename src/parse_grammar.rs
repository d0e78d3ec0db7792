/// Line-oriented reading of grammar and lexicon files
use regex::Regex;

use crate::errors::{GrammarError, GrammarResult};
use crate::rules::StringRule;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

/// Rules read from text, not yet compiled.
#[derive(Debug, Clone, PartialEq)]
pub struct GrammarSource {
  pub start_symbol: String,
  pub rules: Vec<StringRule>,
  pub lexicon: Vec<StringRule>,
}

impl GrammarSource {
  /// Reads a grammar file (start symbol line, unary and binary rules) and a lexicon
  /// file (`A -> word prob`).
  pub fn parse(grammar: &str, lexicon: &str) -> GrammarResult<Self> {
    let (start_symbol, rules) = parse_rules(grammar)?;
    let lexicon = parse_lexicon(lexicon)?;
    Ok(Self {
      start_symbol,
      rules,
      lexicon,
    })
  }

  pub fn read_from_files(
    grammar_path: impl AsRef<std::path::Path>,
    lexicon_path: impl AsRef<std::path::Path>,
  ) -> GrammarResult<Self> {
    let grammar = std::fs::read_to_string(grammar_path)?;
    let lexicon = std::fs::read_to_string(lexicon_path)?;
    Self::parse(&grammar, &lexicon)
  }
}

/// Blank lines and `#` or `//` comments are skipped
fn is_skippable(line: &str) -> bool {
  regex_static!(SKIPPABLE, r"^\s*(#.*|//.*)?$");
  SKIPPABLE.is_match(line)
}

/// Converts the probability column to natural-log space. Values in (0, 1] are
/// plain probabilities; negative values are taken to already be
/// log-probabilities. Zero is rejected, since it reads as either.
fn parse_log_prob(value: &str, line_no: usize) -> GrammarResult<f32> {
  let bad = || GrammarError::BadProbability {
    line_no,
    value: value.to_string(),
  };
  let p: f32 = value.parse().map_err(|_| bad())?;
  if p.is_nan() || p > 1.0 || p == 0.0 {
    Err(bad())
  } else if p > 0.0 {
    Ok(p.ln())
  } else {
    Ok(p)
  }
}

fn malformed(line_no: usize, line: &str) -> GrammarError {
  GrammarError::MalformedLine {
    line_no,
    line: line.to_string(),
  }
}

/// Parses a grammar file into (start symbol, rules)
/// Errors on malformed lines and on a missing or repeated start symbol
fn parse_rules(s: &str) -> GrammarResult<(String, Vec<StringRule>)> {
  regex_static!(START, r"^\s*(\S+)\s*$");
  regex_static!(UNARY, r"^\s*(\S+)\s+->\s+(\S+)\s+(\S+)\s*$");
  regex_static!(BINARY, r"^\s*(\S+)\s+->\s+(\S+)\s+(\S+)\s+(\S+)\s*$");

  let mut start: Option<String> = None;
  let mut rules = Vec::new();

  for (idx, line) in s.lines().enumerate() {
    let line_no = idx + 1;
    if is_skippable(line) {
      continue;
    }

    if let Some(caps) = BINARY.captures(line) {
      rules.push(StringRule {
        parent: caps[1].to_string(),
        left: caps[2].to_string(),
        right: Some(caps[3].to_string()),
        log_prob: parse_log_prob(&caps[4], line_no)?,
      });
    } else if let Some(caps) = UNARY.captures(line) {
      rules.push(StringRule {
        parent: caps[1].to_string(),
        left: caps[2].to_string(),
        right: None,
        log_prob: parse_log_prob(&caps[3], line_no)?,
      });
    } else if let Some(caps) = START.captures(line) {
      if start.is_some() {
        return Err(GrammarError::DuplicateStartSymbol {
          line_no,
          line: line.to_string(),
        });
      }
      start = Some(caps[1].to_string());
    } else {
      return Err(malformed(line_no, line));
    }
  }

  let start = start.ok_or(GrammarError::MissingStartSymbol)?;
  Ok((start, rules))
}

/// Parses a lexicon file, one `A -> word prob` entry per line
fn parse_lexicon(s: &str) -> GrammarResult<Vec<StringRule>> {
  regex_static!(LEXICAL, r"^\s*(\S+)\s+->\s+(\S+)\s+(\S+)\s*$");

  let mut rules = Vec::new();
  for (idx, line) in s.lines().enumerate() {
    let line_no = idx + 1;
    if is_skippable(line) {
      continue;
    }
    let caps = LEXICAL.captures(line).ok_or_else(|| malformed(line_no, line))?;
    rules.push(StringRule {
      parent: caps[1].to_string(),
      left: caps[2].to_string(),
      right: None,
      log_prob: parse_log_prob(&caps[3], line_no)?,
    });
  }
  Ok(rules)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_rules() {
    let src = GrammarSource::parse(
      r#"
      S
      // binary
      S -> NP VP 1.0
      NP -> n 0.5
      # log-space values pass through
      NP -> NP PP -0.6931
    "#,
      "n -> dog 1.0\nv -> barks 0.25\n",
    )
    .unwrap();

    assert_eq!(src.start_symbol, "S");
    assert_eq!(src.rules.len(), 3);
    assert_eq!(src.rules[0].right.as_deref(), Some("VP"));
    assert_eq!(src.rules[0].log_prob, 0.0);
    assert!(!src.rules[1].is_binary());
    assert!((src.rules[1].log_prob - 0.5f32.ln()).abs() < 1e-6);
    assert!((src.rules[2].log_prob + 0.6931).abs() < 1e-6);

    assert_eq!(src.lexicon.len(), 2);
    assert_eq!(src.lexicon[1].left, "barks");
    assert!((src.lexicon[1].log_prob - 0.25f32.ln()).abs() < 1e-6);
  }

  #[test]
  fn test_malformed_line_reports_line_number() {
    let err = GrammarSource::parse("S\nS -> A B C D 1.0\n", "").unwrap_err();
    match err {
      GrammarError::MalformedLine { line_no, line } => {
        assert_eq!(line_no, 2);
        assert!(line.contains("A B C D"));
      }
      other => panic!("unexpected error {}", other),
    }
  }

  #[test]
  fn test_start_symbol_errors() {
    assert!(matches!(
      GrammarSource::parse("S -> A B 1.0\n", ""),
      Err(GrammarError::MissingStartSymbol)
    ));
    assert!(matches!(
      GrammarSource::parse("S\nTOP\nS -> A B 1.0\n", ""),
      Err(GrammarError::DuplicateStartSymbol { line_no: 2, .. })
    ));
  }

  #[test]
  fn test_bad_probability() {
    assert!(matches!(
      GrammarSource::parse("S\nS -> A B 1.5\n", ""),
      Err(GrammarError::BadProbability { line_no: 2, .. })
    ));
    assert!(matches!(
      GrammarSource::parse("S\n", "n -> dog x\n"),
      Err(GrammarError::BadProbability { line_no: 1, .. })
    ));
    for zero in ["0", "0.0", "-0"] {
      let err = GrammarSource::parse(&format!("S\nS -> A B {}\n", zero), "").unwrap_err();
      assert!(matches!(err, GrammarError::BadProbability { line_no: 2, .. }), "{}", zero);
    }
    // but a log-probability just below zero is fine
    let src = GrammarSource::parse("S\nS -> A B -0.0001\n", "").unwrap();
    assert!((src.rules[0].log_prob + 0.0001).abs() < 1e-7);
  }

  #[test]
  fn test_lexicon_needs_four_tokens() {
    assert!(matches!(
      GrammarSource::parse("S\n", "n -> dog\n"),
      Err(GrammarError::MalformedLine { line_no: 1, .. })
    ));
  }
}
