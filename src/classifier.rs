use crate::symbols::SymbolTable;

/// Maps a surface token to a lexicon index.
pub trait TokenClassifier: Send + Sync {
  /// `None` if the token can't be read under this lexicon.
  fn classify(&self, lexicon: &SymbolTable, token: &str) -> Option<u32>;
}

/// Exact match, then lowercased, then a fixed unknown-word entry.
#[derive(Debug, Clone)]
pub struct UnknownWordClassifier {
  unknown: String,
}

impl UnknownWordClassifier {
  pub fn new(unknown: impl Into<String>) -> Self {
    Self {
      unknown: unknown.into(),
    }
  }
}

impl Default for UnknownWordClassifier {
  fn default() -> Self {
    Self::new("UNK")
  }
}

impl TokenClassifier for UnknownWordClassifier {
  fn classify(&self, lexicon: &SymbolTable, token: &str) -> Option<u32> {
    lexicon
      .get(token)
      .or_else(|| lexicon.get(&token.to_lowercase()))
      .or_else(|| lexicon.get(&self.unknown))
  }
}
