//! The chart-parsing driver: populates cells bottom-up, then extracts the best tree.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::beam::BeamSelector;
use crate::cartesian::{self, CartesianProductVector};
use crate::cell_selector::{CellSelector, LeftRightBottomUp};
use crate::chart::{Cell, CellScratch, Chart};
use crate::classifier::{TokenClassifier, UnknownWordClassifier};
use crate::errors::ParseError;
use crate::fom::{FigureOfMerit, InsideProbabilityFom};
use crate::grammar::Grammar;
use crate::packing::PackingFunction;
use crate::spmv;
use crate::syntree::{backtrace, Constituent, SynTree, Word};

#[derive(Debug, Clone, PartialEq)]
pub struct ParserOptions {
  /// Entries kept per cell. `None` keeps everything.
  pub beam_width: Option<usize>,
  /// Beam for span-1 cells. `None` leaves them unpruned whatever `beam_width`
  /// is.
  pub lexical_row_beam_width: Option<usize>,
  /// Share of the lexical row beam held back for unary parents.
  pub lexical_row_unary_fraction: f32,
  pub max_sentence_length: usize,
  /// Populate cells of equal width concurrently.
  pub parallel: bool,
  /// Sentences still parsing after this long are abandoned.
  pub time_limit: Option<Duration>,
}

impl Default for ParserOptions {
  fn default() -> Self {
    Self {
      beam_width: None,
      lexical_row_beam_width: None,
      lexical_row_unary_fraction: 0.3,
      max_sentence_length: 200,
      parallel: false,
      time_limit: None,
    }
  }
}

impl ParserOptions {
  pub fn with_beam_width(mut self, width: usize) -> Self {
    self.beam_width = Some(width);
    self
  }

  pub fn with_lexical_row_beam_width(mut self, width: usize) -> Self {
    self.lexical_row_beam_width = Some(width);
    self
  }

  pub fn with_lexical_row_unary_fraction(mut self, fraction: f32) -> Self {
    self.lexical_row_unary_fraction = fraction.clamp(0.0, 1.0);
    self
  }

  pub fn with_max_sentence_length(mut self, len: usize) -> Self {
    self.max_sentence_length = len;
    self
  }

  pub fn with_parallel(mut self, parallel: bool) -> Self {
    self.parallel = parallel;
    self
  }

  pub fn with_time_limit(mut self, limit: Duration) -> Self {
    self.time_limit = Some(limit);
    self
  }

  fn cell_beam_width(&self, start: u16, end: u16) -> Option<usize> {
    if end - start == 1 {
      self.lexical_row_beam_width
    } else {
      self.beam_width
    }
  }
}

/// Counters for one parsed sentence.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
  pub sentence_length: usize,
  pub cells_visited: usize,
  /// Child pairs unioned, summed over cells
  pub cartesian_entries: usize,
  /// Finalized chart entries, summed over cells
  pub cell_population: usize,
}

impl ParseStats {
  fn merge(&mut self, other: &ParseStats) {
    self.cells_visited += other.cells_visited;
    self.cartesian_entries += other.cartesian_entries;
    self.cell_population += other.cell_population;
  }
}

#[derive(Debug, Clone)]
pub struct ParseResult {
  pub tree: SynTree<String, String>,
  /// Inside log-probability of the start symbol over the whole sentence
  pub inside: f32,
  pub stats: ParseStats,
}

#[derive(Debug, Copy, Clone)]
struct CellJob {
  start: u16,
  end: u16,
  beam: Option<usize>,
  lexical_unaries: usize,
}

impl CellJob {
  fn width(&self) -> u16 {
    self.end - self.start
  }
}

/// Buffers for populating one cell at a time. Never shared between cells that
/// are populated concurrently.
#[derive(Debug, Clone)]
struct Workspace {
  cartesian: CartesianProductVector,
  scratch: CellScratch,
  unaries: spmv::UnaryScratch,
  beam: BeamSelector,
  /// Cells displaced from the chart, refilled instead of allocating
  spare: Vec<Cell>,
}

impl Workspace {
  fn new(grammar: &Grammar) -> Self {
    let n = grammar.num_non_terminals();
    Self {
      cartesian: CartesianProductVector::new(grammar.packing().packed_array_size()),
      scratch: CellScratch::new(n),
      unaries: spmv::UnaryScratch::new(n),
      beam: BeamSelector::new(n),
      spare: Vec::new(),
    }
  }

  fn populate(
    &mut self,
    grammar: &Grammar,
    fom: &dyn FigureOfMerit,
    chart: &Chart,
    words: &[u32],
    job: CellJob,
    stats: &mut ParseStats,
  ) -> Cell {
    let mut cell = self.spare.pop().unwrap_or_default();
    self.scratch.reset();

    if job.width() == 1 {
      spmv::lexical(grammar, words[job.start as usize], &mut self.scratch);
    } else {
      self.cartesian.clear();
      cartesian::union(grammar, chart, job.start, job.end, &mut self.cartesian);
      stats.cartesian_entries += self.cartesian.len();
      spmv::binary(grammar, &self.cartesian, &mut self.scratch);
    }

    match job.beam {
      Some(width) => self.beam.select(
        grammar,
        fom,
        &mut self.scratch,
        job.start,
        job.end,
        width,
        job.lexical_unaries,
        &mut cell,
      ),
      None => {
        spmv::unary(grammar, &mut self.scratch, &mut self.unaries, job.end);
        self.scratch.finalize_into(&mut cell);
      }
    }

    stats.cells_visited += 1;
    stats.cell_population += cell.len();
    trace!(start = job.start, end = job.end, population = cell.len(), "populated cell");
    cell
  }
}

/// Per-worker parsing state. A parser borrows the grammar, owns its chart and
/// buffers, and reuses them from one sentence to the next.
pub struct Parser<'g> {
  grammar: &'g Grammar,
  options: ParserOptions,
  classifier: Box<dyn TokenClassifier>,
  chart: Chart,
  workspace: Workspace,
  /// One workspace per rayon worker for parallel population, kept across
  /// widths and sentences
  workers: Vec<Workspace>,
  words: Vec<u32>,
}

impl<'g> Parser<'g> {
  pub fn new(grammar: &'g Grammar, options: ParserOptions) -> Self {
    Self {
      grammar,
      options,
      classifier: Box::new(UnknownWordClassifier::default()),
      chart: Chart::new(),
      workspace: Workspace::new(grammar),
      workers: Vec::new(),
      words: Vec::new(),
    }
  }

  pub fn with_classifier(mut self, classifier: impl TokenClassifier + 'static) -> Self {
    self.classifier = Box::new(classifier);
    self
  }

  pub fn grammar(&self) -> &'g Grammar {
    self.grammar
  }

  pub fn options(&self) -> &ParserOptions {
    &self.options
  }

  /// Chart of the most recent sentence, populated even if it failed to parse.
  /// Empty when the sentence was rejected before any cell was visited.
  pub fn chart(&self) -> &Chart {
    &self.chart
  }

  /// Parses a whitespace-tokenized sentence.
  pub fn parse(&mut self, sentence: &str) -> Result<ParseResult, ParseError> {
    let tokens = sentence.split_whitespace().collect::<Vec<_>>();
    self.parse_tokens(&tokens)
  }

  pub fn parse_tokens(&mut self, tokens: &[&str]) -> Result<ParseResult, ParseError> {
    self.parse_with(tokens, &mut LeftRightBottomUp::new(), &InsideProbabilityFom)
  }

  /// Parses with an explicit cell schedule and figure of merit.
  pub fn parse_with(
    &mut self,
    tokens: &[&str],
    selector: &mut dyn CellSelector,
    fom: &dyn FigureOfMerit,
  ) -> Result<ParseResult, ParseError> {
    let started = Instant::now();
    let result = self.populate_chart(tokens, selector, fom, started).and_then(|stats| {
      self.extract(tokens, stats)
    });

    match &result {
      Ok(r) => debug!(
        len = tokens.len(),
        cells = r.stats.cells_visited,
        population = r.stats.cell_population,
        inside = r.inside,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "parsed"
      ),
      Err(e) => debug!(len = tokens.len(), error = %e, "no parse"),
    }
    result
  }

  fn populate_chart(
    &mut self,
    tokens: &[&str],
    selector: &mut dyn CellSelector,
    fom: &dyn FigureOfMerit,
    started: Instant,
  ) -> Result<ParseStats, ParseError> {
    self.chart.clear(0);
    let len = tokens.len();
    if len == 0 {
      return Err(ParseError::EmptySentence);
    }
    let max = self.options.max_sentence_length.min(u16::MAX as usize);
    if len > max {
      return Err(ParseError::SentenceTooLong { len, max });
    }

    self.words.clear();
    for token in tokens.iter() {
      let word = self
        .classifier
        .classify(self.grammar.lexicon(), token)
        .ok_or_else(|| ParseError::UnknownWord(token.to_string()))?;
      self.words.push(word);
    }

    self.chart.clear(len);
    selector.reset(len as u16);
    let mut jobs = Vec::new();
    while let Some((start, end)) = selector.next() {
      let beam = match (self.options.cell_beam_width(start, end), selector.beam_width(start, end)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
      };
      let lexical_unaries = match (beam, self.options.lexical_row_beam_width) {
        (Some(width), Some(_)) if end - start == 1 => {
          (width as f32 * self.options.lexical_row_unary_fraction) as usize
        }
        _ => 0,
      };
      jobs.push(CellJob {
        start,
        end,
        beam,
        lexical_unaries,
      });
    }

    let mut stats = ParseStats {
      sentence_length: len,
      ..Default::default()
    };
    if self.options.parallel {
      self.populate_parallel(&mut jobs, fom, &mut stats, started)?;
    } else {
      for job in jobs {
        self.check_time(started)?;
        let cell = self
          .workspace
          .populate(self.grammar, fom, &self.chart, &self.words, job, &mut stats);
        let displaced = self.chart.replace(job.start, job.end, cell);
        self.workspace.spare.push(displaced);
      }
    }
    Ok(stats)
  }

  /// Populates each span width as one batch of independent cells, split into
  /// one run of jobs per pooled workspace. A width is committed to the chart
  /// before the next one starts.
  fn populate_parallel(
    &mut self,
    jobs: &mut [CellJob],
    fom: &dyn FigureOfMerit,
    stats: &mut ParseStats,
    started: Instant,
  ) -> Result<(), ParseError> {
    use rayon::prelude::*;

    let grammar = self.grammar;
    let threads = rayon::current_num_threads().max(1);
    if self.workers.len() < threads {
      self.workers.resize_with(threads, || Workspace::new(grammar));
    }

    jobs.sort_by_key(CellJob::width);
    for group in jobs.chunk_by(|a, b| a.width() == b.width()) {
      self.check_time(started)?;
      let chart = &self.chart;
      let words = self.words.as_slice();
      let chunk = group.len().div_ceil(self.workers.len());
      let populated = group
        .par_chunks(chunk)
        .zip(self.workers.par_iter_mut())
        .map(|(jobs, workspace)| {
          jobs
            .iter()
            .map(|&job| {
              let mut cell_stats = ParseStats::default();
              let cell = workspace.populate(grammar, fom, chart, words, job, &mut cell_stats);
              (job, cell, cell_stats)
            })
            .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

      // chunk i was populated by worker i
      for (cells, workspace) in populated.into_iter().zip(self.workers.iter_mut()) {
        for (job, cell, cell_stats) in cells {
          workspace.spare.push(self.chart.replace(job.start, job.end, cell));
          stats.merge(&cell_stats);
        }
      }
    }
    Ok(())
  }

  fn check_time(&self, started: Instant) -> Result<(), ParseError> {
    match self.options.time_limit {
      Some(limit) if started.elapsed() >= limit => Err(ParseError::Cancelled {
        elapsed_ms: started.elapsed().as_millis(),
      }),
      _ => Ok(()),
    }
  }

  fn extract(&self, tokens: &[&str], stats: ParseStats) -> Result<ParseResult, ParseError> {
    let start_symbol = self.grammar.start_symbol();
    let end = self.chart.size() as u16;
    let inside = self
      .chart
      .top()
      .and_then(|top| top.get(start_symbol))
      .ok_or(ParseError::NoParse)?
      .inside;

    let grammar = self.grammar;
    let tree = backtrace(grammar, &self.chart, 0, end, start_symbol)?.map(
      &|c: &Constituent<u16>| grammar.non_terminal(c.value).to_string(),
      &|w: &Word<usize>| tokens[w.value].to_string(),
    );

    Ok(ParseResult {
      tree,
      inside,
      stats,
    })
  }
}

/// Parses every sentence, one parser per rayon worker. Failures are returned
/// per sentence.
pub fn parse_batch(
  grammar: &Grammar,
  options: &ParserOptions,
  sentences: &[String],
) -> Vec<Result<ParseResult, ParseError>> {
  use rayon::prelude::*;

  sentences
    .par_iter()
    .map_init(
      || Parser::new(grammar, options.clone()),
      |parser, sentence| parser.parse(sentence),
    )
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cell_selector::{CellBeamWidths, SkipSpans};
  use crate::packing::PackingKind;

  fn check_is_send_sync<T: Send + Sync>(_: &T) {}

  fn grammar() -> Grammar {
    Grammar::parse(
      "S\nS -> NP VP 1.0\nNP -> n 1.0\nVP -> v 1.0\n",
      "n -> dog 1.0\nv -> barks 1.0\n",
      PackingKind::PerfectHash,
    )
    .unwrap()
  }

  #[test]
  fn test_dog_barks() {
    let g = grammar();
    check_is_send_sync(&g);
    let mut parser = Parser::new(&g, ParserOptions::default());
    let result = parser.parse("dog barks").unwrap();
    assert_eq!(result.tree.to_string(), "(S (NP (n dog)) (VP (v barks)))");
    assert_eq!(result.inside, 0.0);
    assert_eq!(result.stats.cells_visited, 3);
    assert_eq!(result.stats.cartesian_entries, 1);
    assert_eq!(result.stats.cell_population, 5);
  }

  #[test]
  fn test_sentence_errors() {
    let g = grammar();
    let mut parser = Parser::new(&g, ParserOptions::default().with_max_sentence_length(2));
    assert_eq!(parser.parse("").unwrap_err(), ParseError::EmptySentence);
    assert_eq!(
      parser.parse("dog dog dog").unwrap_err(),
      ParseError::SentenceTooLong { len: 3, max: 2 }
    );
    assert_eq!(
      parser.parse("cat barks").unwrap_err(),
      ParseError::UnknownWord("cat".to_string())
    );
    assert_eq!(parser.parse("barks dog").unwrap_err(), ParseError::NoParse);
    // the parser is still usable after failures
    assert!(parser.parse("dog barks").is_ok());
  }

  #[test]
  fn test_rejected_sentence_clears_chart() {
    let g = grammar();
    let mut parser = Parser::new(&g, ParserOptions::default().with_max_sentence_length(2));
    for rejected in ["", "dog dog dog", "dog meows"] {
      parser.parse("dog barks").unwrap();
      assert_eq!(parser.chart().size(), 2);
      assert!(parser.parse(rejected).is_err());
      assert_eq!(parser.chart().size(), 0);
      assert!(parser.chart().top().is_none());
    }
  }

  /// One word with ten pos tags and no unary rules.
  fn many_tags() -> Grammar {
    let lexicon = (0..10)
      .map(|i| format!("T{} -> w {}\n", i, 0.09 - i as f32 * 0.005))
      .collect::<String>();
    Grammar::parse("S\nS -> T0 T1 1.0\n", &lexicon, PackingKind::PerfectHash).unwrap()
  }

  #[test]
  fn test_lexical_row_unpruned_without_its_own_beam() {
    let g = many_tags();
    let mut parser = Parser::new(&g, ParserOptions::default().with_beam_width(10));
    let _ = parser.parse("w");
    assert_eq!(parser.chart().cell(0, 1).len(), 10);

    let mut parser = Parser::new(&g, ParserOptions::default().with_beam_width(2));
    let _ = parser.parse("w");
    assert_eq!(parser.chart().cell(0, 1).len(), 10);

    // 3 of 10 slots are held back for unary parents, and there are none
    let options = ParserOptions::default().with_lexical_row_beam_width(10);
    let mut parser = Parser::new(&g, options);
    let _ = parser.parse("w");
    let kept = parser.chart().cell(0, 1).entries().map(|e| e.nt).collect::<Vec<_>>();
    let best = (0..7)
      .map(|i| g.non_terminals().get(&format!("T{}", i)).unwrap() as u16)
      .collect::<Vec<_>>();
    assert_eq!(kept.len(), 7);
    assert!(best.iter().all(|nt| kept.contains(nt)));
  }

  #[test]
  fn test_time_limit() {
    let g = grammar();
    let mut parser = Parser::new(&g, ParserOptions::default().with_time_limit(Duration::ZERO));
    assert!(matches!(
      parser.parse("dog barks"),
      Err(ParseError::Cancelled { .. })
    ));
  }

  const ATTACHMENT_GRAMMAR: &str = include_str!("../data/attachment.gr");
  const ATTACHMENT_LEXICON: &str = include_str!("../data/attachment.lex");

  fn attachment(kind: PackingKind) -> Grammar {
    Grammar::parse(ATTACHMENT_GRAMMAR, ATTACHMENT_LEXICON, kind).unwrap()
  }

  /// Each reading of "x y z" is a different bracketing or pos tag; the best one
  /// is also the best entry of every cell it passes through.
  fn ambiguous() -> Grammar {
    Grammar::parse(
      "S\nS -> A BC 0.5\nS -> D BC 0.2\nS -> AB C 0.3\nAB -> A B 1.0\nBC -> B C 1.0\n",
      "A -> x 0.6\nD -> x 0.4\nB -> y 1.0\nC -> z 1.0\n",
      PackingKind::PerfectHash,
    )
    .unwrap()
  }

  fn cells(chart: &Chart) -> Vec<Vec<crate::chart::ChartEntry>> {
    let size = chart.size() as u16;
    (0..size)
      .flat_map(|start| (start + 1..=size).map(move |end| (start, end)))
      .map(|(start, end)| chart.cell(start, end).entries().collect())
      .collect()
  }

  #[test]
  fn test_beam_of_one_keeps_best_parse() {
    let g = ambiguous();
    let exhaustive = Parser::new(&g, ParserOptions::default()).parse("x y z").unwrap();
    assert_eq!(exhaustive.tree.to_string(), "(S (A x) (BC (B y) (C z)))");
    assert!((exhaustive.inside - 0.3f32.ln()).abs() < 1e-5);

    let options = ParserOptions::default()
      .with_beam_width(1)
      .with_lexical_row_beam_width(1);
    let beamed = Parser::new(&g, options).parse("x y z")
      .unwrap();
    assert_eq!(beamed.tree, exhaustive.tree);
    assert!((beamed.inside - exhaustive.inside).abs() < 1e-6);
    assert_eq!(beamed.stats.cell_population, 6);
    assert!(beamed.stats.cell_population < exhaustive.stats.cell_population);
  }

  #[test]
  fn test_skipped_spans_stay_empty() {
    let g = ambiguous();
    let mut parser = Parser::new(&g, ParserOptions::default());
    let mut selector = SkipSpans::new(LeftRightBottomUp::new(), [(1, 3)]);
    let result = parser
      .parse_with(&["x", "y", "z"], &mut selector, &InsideProbabilityFom)
      .unwrap();
    assert!(parser.chart().cell(1, 3).is_empty());
    assert_eq!(result.stats.cells_visited, 5);
    // only the (x y) z bracketing is left
    assert_eq!(result.tree.to_string(), "(S (AB (A x) (B y)) (C z))");
    assert!((result.inside - 0.18f32.ln()).abs() < 1e-5);
  }

  #[test]
  fn test_narrower_cell_beam_keeps_best_entries() {
    let g = Grammar::parse(
      r#"
      S
      S -> A BC 0.5
      S -> AB C 0.5
      Q -> A BC 0.9
      R -> AB C 0.8
      T -> A BC 0.3
      U -> AB C 0.1
      AB -> A B 1.0
      BC -> B C 1.0
      "#,
      "A -> a 1.0\nB -> b 1.0\nC -> c 1.0\n",
      PackingKind::PerfectHash,
    )
    .unwrap();
    let tokens = ["a", "b", "c"];
    let top = (0, 3);
    let mut parser = Parser::new(&g, ParserOptions::default());
    parser.parse_tokens(&tokens).unwrap();
    let mut exhaustive = parser.chart().cell(top.0, top.1).entries().collect::<Vec<_>>();
    exhaustive.sort_by(|a, b| b.inside.total_cmp(&a.inside));
    assert_eq!(exhaustive.len(), 5);

    let mut previous = exhaustive.clone();
    for width in (1..exhaustive.len()).rev() {
      let mut selector = CellBeamWidths::new(LeftRightBottomUp::new(), [(top, width)]);
      // S falls out of the narrowest beams, so the parse itself may fail
      let _ = parser.parse_with(&tokens, &mut selector, &InsideProbabilityFom);
      let kept = parser.chart().cell(top.0, top.1).entries().collect::<Vec<_>>();

      assert_eq!(kept.len(), width);
      for entry in kept.iter() {
        assert!(previous.contains(entry));
      }
      let worst_kept = kept.iter().map(|e| e.inside).fold(f32::INFINITY, f32::min);
      assert!(exhaustive[width..].iter().all(|e| e.inside < worst_kept));
      previous = kept;
    }
  }

  #[test]
  fn test_chart_reuse_matches_fresh_parser() {
    let g = attachment(PackingKind::BitVector);
    let long = "the old man saw a big dog with the telescope in the park";
    let short = "the dog walked";

    let mut reused = Parser::new(&g, ParserOptions::default());
    reused.parse(long).unwrap();
    let result = reused.parse(short).unwrap();

    let mut fresh = Parser::new(&g, ParserOptions::default());
    let expected = fresh.parse(short).unwrap();
    assert_eq!(result.tree, expected.tree);
    assert_eq!(result.inside, expected.inside);
    assert_eq!(result.stats, expected.stats);
    assert_eq!(reused.chart().size(), 3);
    assert_eq!(cells(reused.chart()), cells(fresh.chart()));
  }

  #[test]
  fn test_parallel_matches_serial() {
    let sentences = [
      "the man saw the dog with the telescope",
      "a big old dog walked in the park with the man",
      "the man saw",
    ];
    for kind in PackingKind::ALL {
      let g = attachment(kind);
      for options in [ParserOptions::default(), ParserOptions::default().with_beam_width(3)] {
        let mut serial = Parser::new(&g, options.clone());
        let mut parallel = Parser::new(&g, options.with_parallel(true));
        for sentence in sentences {
          let a = serial.parse(sentence);
          let b = parallel.parse(sentence);
          match (&a, &b) {
            (Ok(a), Ok(b)) => {
              assert_eq!(a.tree, b.tree);
              assert_eq!(a.inside, b.inside);
              assert_eq!(a.stats, b.stats);
            }
            _ => assert_eq!(a.as_ref().err(), b.as_ref().err()),
          }
          assert_eq!(cells(serial.chart()), cells(parallel.chart()));
        }
      }
    }
  }

  #[test]
  fn test_parallel_workspaces_are_reused() {
    let g = attachment(PackingKind::Shift);
    let mut parser = Parser::new(&g, ParserOptions::default().with_parallel(true));
    parser.parse("the man saw the dog with the telescope").unwrap();
    let threads = rayon::current_num_threads();
    assert_eq!(parser.workers.len(), threads);
    let pool = parser.workers.as_ptr();

    for sentence in ["the dog walked", "the old man saw a big dog with the telescope in the park"] {
      parser.parse(sentence).unwrap();
      assert_eq!(parser.workers.len(), threads);
      assert_eq!(parser.workers.as_ptr(), pool);
    }
  }

  #[test]
  fn test_packing_kinds_agree() {
    let sentence = "the old man saw a big dog with the telescope in the park";
    let results = PackingKind::ALL.map(|kind| attachment(kind).parse_sentence(sentence).unwrap());
    for r in results[1..].iter() {
      assert_eq!(r.tree, results[0].tree);
      assert!((r.inside - results[0].inside).abs() < 1e-5);
      assert_eq!(r.stats.cell_population, results[0].stats.cell_population);
    }
  }

  #[test]
  fn test_unknown_words_use_unk() {
    let g = attachment(PackingKind::Shift);
    let result = g.parse_sentence("the frobnicator walked").unwrap();
    assert_eq!(
      result.tree.to_string(),
      "(S (NP_0 (D the) (N frobnicator)) (VP_0 (V walked)))"
    );
  }

  #[test]
  fn test_custom_fom_prunes_differently() {
    let g = ambiguous();
    let d = g.non_terminals().get("D").unwrap() as u16;
    // prefer D over A in span-1 cells, whatever the inside score says
    let prefer_d = move |_start: u16, _end: u16, nt: u16, inside: f32| if nt == d { 0.0 } else { inside };
    let options = ParserOptions::default()
      .with_beam_width(1)
      .with_lexical_row_beam_width(1);
    let mut parser = Parser::new(&g, options);
    let result = parser
      .parse_with(&["x", "y", "z"], &mut LeftRightBottomUp::new(), &prefer_d)
      .unwrap();
    assert_eq!(result.tree.to_string(), "(S (D x) (BC (B y) (C z)))");
    assert!((result.inside - 0.08f32.ln()).abs() < 1e-5);
  }

  /// Sum of the rule log-probabilities used by `tree`.
  fn derivation_log_prob(g: &Grammar, tree: &SynTree<String, String>) -> f32 {
    let Some((c, children)) = tree.get_branch() else {
      return 0.0;
    };
    let nt = |t: &SynTree<String, String>| {
      let (c, _) = t.get_branch().unwrap();
      g.non_terminals().get(&c.value).unwrap() as u16
    };
    let parent = g.non_terminals().get(&c.value).unwrap() as u16;
    let rule = match children.as_slice() {
      [SynTree::Leaf(w)] => g.lexical_log_prob(parent, g.lexicon().get(&w.value).unwrap()),
      [child] => g.unary_log_prob(parent, nt(child)),
      [left, right] => g.binary_log_prob(parent, nt(left), nt(right)),
      _ => panic!("{} has {} children", c.value, children.len()),
    };
    rule + children.iter().map(|t| derivation_log_prob(g, t)).sum::<f32>()
  }

  #[test]
  fn test_inside_is_sum_of_rules_on_tree() {
    let g = attachment(PackingKind::PerfectHash);
    let mut parser = Parser::new(&g, ParserOptions::default());
    for sentence in [
      "the dog walked",
      "the man saw the dog with the telescope",
      "the old man saw a big dog with the telescope in the park",
    ] {
      let result = parser.parse(sentence).unwrap();
      let sum = derivation_log_prob(&g, &result.tree);
      assert!((sum - result.inside).abs() < 1e-4, "{}: {} != {}", sentence, sum, result.inside);
    }

    let mut parser = Parser::new(&g, ParserOptions::default().with_beam_width(2));
    let result = parser.parse("the dog walked").unwrap();
    assert!((derivation_log_prob(&g, &result.tree) - result.inside).abs() < 1e-4);
  }

  #[test]
  fn test_parse_batch() {
    let g = grammar();
    let sentences = vec!["dog barks".to_string(), "barks".to_string(), "dog barks".to_string()];
    let results = parse_batch(&g, &ParserOptions::default(), &sentences);
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert_eq!(results[1].as_ref().unwrap_err(), &ParseError::NoParse);
    assert_eq!(
      results[2].as_ref().map(|r| r.tree.to_string()).ok(),
      Some("(S (NP (n dog)) (VP (v barks)))".to_string())
    );
  }
}
