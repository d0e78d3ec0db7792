//! Compressed sparse row / column storage for grammar rules.
//!
//! Both formats are built once from (row, column, log-probability) triples and
//! never change afterwards. Duplicate triples are merged by summing their
//! probabilities.

use serde::{Deserialize, Serialize};

use crate::utils::{LOG_ZERO, log_sum};

/// Sorts triples by (major, minor) and merges duplicates with a log-sum.
fn accumulate(mut triples: Vec<(u32, u32, f32)>) -> Vec<(u32, u32, f32)> {
  triples.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
  let mut merged: Vec<(u32, u32, f32)> = Vec::with_capacity(triples.len());
  for (major, minor, value) in triples {
    match merged.last_mut() {
      Some(last) if last.0 == major && last.1 == minor => last.2 = log_sum(last.2, value),
      _ => merged.push((major, minor, value)),
    }
  }
  merged
}

/// Prefix offsets for `count` buckets from entries sorted by bucket.
fn offsets(count: usize, buckets: impl Iterator<Item = u32>) -> Vec<u32> {
  let mut offsets = vec![0u32; count + 1];
  for b in buckets {
    offsets[b as usize + 1] += 1;
  }
  for i in 0..count {
    offsets[i + 1] += offsets[i];
  }
  offsets
}

/// Row-major storage: iterate the columns (children) of a row (parent).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
  row_offsets: Vec<u32>,
  columns: Vec<u32>,
  values: Vec<f32>,
}

impl CsrMatrix {
  /// `entries` are (row, column, log-probability).
  pub fn new(rows: usize, entries: Vec<(u32, u32, f32)>) -> Self {
    let merged = accumulate(entries);
    let row_offsets = offsets(rows, merged.iter().map(|e| e.0));
    Self {
      row_offsets,
      columns: merged.iter().map(|e| e.1).collect(),
      values: merged.iter().map(|e| e.2).collect(),
    }
  }

  pub fn rows(&self) -> usize {
    self.row_offsets.len() - 1
  }

  pub fn nnz(&self) -> usize {
    self.values.len()
  }

  /// (column, log-probability) pairs of `row`, in increasing column order
  pub fn row(&self, row: u16) -> impl Iterator<Item = (u32, f32)> + '_ {
    let range = self.row_offsets[row as usize] as usize..self.row_offsets[row as usize + 1] as usize;
    self.columns[range.clone()]
      .iter()
      .copied()
      .zip(self.values[range].iter().copied())
  }

  /// Log-probability at (row, column), or negative infinity if absent.
  pub fn get(&self, row: u16, column: u32) -> f32 {
    if row as usize >= self.rows() {
      return LOG_ZERO;
    }
    let start = self.row_offsets[row as usize] as usize;
    let end = self.row_offsets[row as usize + 1] as usize;
    match self.columns[start..end].binary_search(&column) {
      Ok(i) => self.values[start + i],
      Err(_) => LOG_ZERO,
    }
  }
}

/// Column-major storage: iterate the rows (parents) of a column (child or packed
/// child pair).
///
/// Populated columns are also listed on their own, so a multiply can walk only
/// the columns that hold rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CscMatrix {
  populated_columns: Vec<u32>,
  populated_column_offsets: Vec<u32>,
  column_offsets: Vec<u32>,
  rows: Vec<u16>,
  values: Vec<f32>,
}

impl CscMatrix {
  /// `entries` are (row, column, log-probability).
  pub fn new(columns: usize, entries: Vec<(u16, u32, f32)>) -> Self {
    let merged = accumulate(entries.into_iter().map(|(r, c, v)| (c, r as u32, v)).collect());
    let column_offsets = offsets(columns, merged.iter().map(|e| e.0));

    let mut populated_columns = Vec::new();
    let mut populated_column_offsets = Vec::new();
    for (i, e) in merged.iter().enumerate() {
      if populated_columns.last() != Some(&e.0) {
        populated_columns.push(e.0);
        populated_column_offsets.push(i as u32);
      }
    }
    populated_column_offsets.push(merged.len() as u32);

    Self {
      populated_columns,
      populated_column_offsets,
      column_offsets,
      rows: merged.iter().map(|e| e.1 as u16).collect(),
      values: merged.iter().map(|e| e.2).collect(),
    }
  }

  pub fn columns(&self) -> usize {
    self.column_offsets.len() - 1
  }

  pub fn nnz(&self) -> usize {
    self.values.len()
  }

  pub fn populated_columns(&self) -> &[u32] {
    &self.populated_columns
  }

  /// (row, log-probability) pairs of the i-th populated column
  #[inline]
  pub fn populated_column(&self, i: usize) -> (&[u16], &[f32]) {
    let range = self.populated_column_offsets[i] as usize..self.populated_column_offsets[i + 1] as usize;
    (&self.rows[range.clone()], &self.values[range])
  }

  /// (row, log-probability) pairs of `column`, in increasing row order
  #[inline]
  pub fn column(&self, column: u32) -> (&[u16], &[f32]) {
    if column as usize >= self.columns() {
      return (&[], &[]);
    }
    let range = self.column_offsets[column as usize] as usize..self.column_offsets[column as usize + 1] as usize;
    (&self.rows[range.clone()], &self.values[range])
  }

  pub fn get(&self, row: u16, column: u32) -> f32 {
    let (rows, values) = self.column(column);
    match rows.binary_search(&row) {
      Ok(i) => values[i],
      Err(_) => LOG_ZERO,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_csr_sums_duplicates() {
    let m = CsrMatrix::new(
      3,
      vec![(2, 7, 0.6f32.ln()), (0, 1, -1.0), (2, 7, 0.4f32.ln()), (2, 3, -2.0)],
    );
    assert_eq!(m.nnz(), 3);
    assert!(m.get(2, 7).abs() < 1e-6);
    assert_eq!(m.get(2, 3), -2.0);
    assert_eq!(m.get(1, 1), LOG_ZERO);
    assert_eq!(m.get(9, 1), LOG_ZERO);
    assert_eq!(m.row(2).map(|(c, _)| c).collect::<Vec<_>>(), vec![3, 7]);
    assert_eq!(m.row(1).count(), 0);
  }

  #[test]
  fn test_csc_populated_columns() {
    let m = CscMatrix::new(10, vec![(4, 8, -1.0), (1, 2, -0.5), (0, 8, -3.0)]);
    assert_eq!(m.columns(), 10);
    assert_eq!(m.populated_columns(), &[2, 8]);
    let (rows, values) = m.populated_column(1);
    assert_eq!(rows, &[0, 4]);
    assert_eq!(values, &[-3.0, -1.0]);
    assert_eq!(m.column(5).0.len(), 0);
    assert_eq!(m.get(4, 8), -1.0);
    assert_eq!(m.get(4, 2), LOG_ZERO);
    assert_eq!(m.column(99).0.len(), 0);
  }
}
