//! Beam pruning of a cell by figure of merit.

use crate::chart::{Cell, CellScratch, Children};
use crate::fom::FigureOfMerit;
use crate::grammar::Grammar;
use crate::utils::LOG_ZERO;

/// A one-shot priority queue over a fixed array, ordered best-first by FOM.
///
/// Entries live in `head..tail`, and `tail` may never pass `max_tail`. Popping
/// advances `head` without moving `max_tail`, so every pop also shrinks the
/// room left for later insertions: a cell never holds more than its beam width,
/// counting what has already been popped.
///
/// Equal FOMs keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct BoundedPriorityQueue {
  nts: Vec<u16>,
  foms: Vec<f32>,
  head: usize,
  tail: usize,
  max_tail: usize,
}

impl BoundedPriorityQueue {
  pub fn new(max_size: usize) -> Self {
    let mut q = Self::default();
    q.clear(max_size);
    q
  }

  /// Empties the queue and resets its capacity to `max_size`.
  pub fn clear(&mut self, max_size: usize) {
    if self.foms.len() < max_size {
      self.foms.resize(max_size, LOG_ZERO);
      self.nts.resize(max_size, 0);
    }
    self.head = 0;
    self.tail = 0;
    self.max_tail = max_size;
  }

  pub fn len(&self) -> usize {
    self.tail - self.head
  }

  pub fn is_empty(&self) -> bool {
    self.head == self.tail
  }

  /// Slots still available, counting queued entries but not popped ones.
  pub fn capacity(&self) -> usize {
    self.max_tail - self.head
  }

  /// Caps the queue at `max_size` entries from the current head, dropping the
  /// worst entries if it already holds more.
  pub fn set_max_size(&mut self, max_size: usize) {
    self.max_tail = self.head + max_size;
    if self.foms.len() < self.max_tail {
      self.foms.resize(self.max_tail, LOG_ZERO);
      self.nts.resize(self.max_tail, 0);
    }
    self.tail = self.tail.min(self.max_tail);
  }

  pub fn head(&self) -> Option<(u16, f32)> {
    (!self.is_empty()).then(|| (self.nts[self.head], self.foms[self.head]))
  }

  pub fn pop_head(&mut self) -> Option<(u16, f32)> {
    let h = self.head()?;
    self.head += 1;
    Some(h)
  }

  /// Inserts `nt`, evicting the worst entry if the queue is full. Returns
  /// whether `nt` was queued.
  pub fn insert(&mut self, nt: u16, fom: f32) -> bool {
    let pos = if self.tail == self.max_tail {
      if self.tail == self.head || fom <= self.foms[self.tail - 1] {
        return false;
      }
      self.tail - 1
    } else {
      self.tail += 1;
      self.tail - 1
    };
    self.nts[pos] = nt;
    self.foms[pos] = fom;
    self.sort_up(pos);
    true
  }

  /// Raises the FOM of `nt` if it's queued with a lower one, or inserts it if
  /// it isn't queued. Returns whether the queue changed.
  pub fn replace(&mut self, nt: u16, fom: f32) -> bool {
    match (self.head..self.tail).find(|&i| self.nts[i] == nt) {
      Some(i) if fom > self.foms[i] => {
        self.foms[i] = fom;
        self.sort_up(i);
        true
      }
      Some(_) => false,
      None => self.insert(nt, fom),
    }
  }

  fn sort_up(&mut self, mut pos: usize) {
    while pos > self.head && self.foms[pos - 1] < self.foms[pos] {
      self.foms.swap(pos - 1, pos);
      self.nts.swap(pos - 1, pos);
      pos -= 1;
    }
  }
}

/// Chooses the entries of a cell from its binary (or lexical) results.
///
/// Holds the queue and the dense FOM arrays so they're allocated once per
/// worker rather than once per cell.
#[derive(Debug, Clone)]
pub struct BeamSelector {
  queue: BoundedPriorityQueue,
  queued_foms: Vec<f32>,
  cell_foms: Vec<f32>,
  finalized: CellScratch,
}

impl BeamSelector {
  pub fn new(num_non_terminals: usize) -> Self {
    Self {
      queue: BoundedPriorityQueue::default(),
      queued_foms: vec![LOG_ZERO; num_non_terminals],
      cell_foms: vec![LOG_ZERO; num_non_terminals],
      finalized: CellScratch::new(num_non_terminals),
    }
  }

  /// Pops up to `width` entries from `scratch` into `cell`, best FOM first.
  ///
  /// Every newly popped non-terminal is tried as a unary child; a parent whose
  /// FOM beats both its queued and finalized FOMs is queued (or requeued), so
  /// unary expansion competes for the same beam without a separate pass. A
  /// requeued parent that was already finalized only replaces its edge when it
  /// pops again. For span-1 cells, `lexical_unaries` slots are held back from
  /// the lexical entries for unary parents.
  #[allow(clippy::too_many_arguments)]
  pub fn select(
    &mut self,
    grammar: &Grammar,
    fom: &dyn FigureOfMerit,
    scratch: &mut CellScratch,
    start: u16,
    end: u16,
    width: usize,
    lexical_unaries: usize,
    cell: &mut Cell,
  ) {
    let lexical_row = end - start == 1;
    self.queue.clear(width);
    if lexical_row {
      self.queue.set_max_size(width.saturating_sub(lexical_unaries));
    }

    scratch.sort_populated();
    for &nt in scratch.populated() {
      let inside = scratch.inside(nt);
      let f = if lexical_row {
        fom.lexical_score(start, end, nt, inside)
      } else {
        fom.score(start, end, nt, inside)
      };
      self.queue.insert(nt, f);
      self.queued_foms[nt as usize] = f;
    }
    if lexical_row {
      self.queue.set_max_size(width);
    }

    let csc = grammar.csc_unary();
    let mut popped = 0;
    while popped < width {
      let Some((nt, f)) = self.queue.pop_head() else {
        break;
      };
      let Some(entry) = scratch.entry(nt) else {
        continue;
      };
      let finalized_fom = self.cell_foms[nt as usize];
      if finalized_fom != LOG_ZERO {
        // a unary parent requeued after it was finalized: swap in the better
        // edge, without taking another slot or requeueing its own parents
        if f > finalized_fom {
          self.finalized.set(nt, entry.inside, entry.children, entry.midpoint);
          self.cell_foms[nt as usize] = f;
        }
        continue;
      }
      self.finalized.set(nt, entry.inside, entry.children, entry.midpoint);
      self.cell_foms[nt as usize] = f;

      let (parents, probs) = csc.column(nt as u32);
      for (&parent, &rule_prob) in parents.iter().zip(probs) {
        let inside = rule_prob + entry.inside;
        let parent_fom = fom.score(start, end, parent, inside);
        if parent_fom > self.queued_foms[parent as usize]
          && parent_fom > self.cell_foms[parent as usize]
          && self.queue.replace(parent, parent_fom)
        {
          scratch.set(parent, inside, Children::Unary(nt), end);
          self.queued_foms[parent as usize] = parent_fom;
        }
      }
      popped += 1;
    }

    for &nt in scratch.populated() {
      self.queued_foms[nt as usize] = LOG_ZERO;
    }
    for &nt in self.finalized.populated() {
      self.cell_foms[nt as usize] = LOG_ZERO;
    }
    self.finalized.finalize_into(cell);
    self.finalized.reset();
  }
}
