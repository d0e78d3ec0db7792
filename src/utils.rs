use std::error::Error;

/// Boxed static error type
pub type Err = Box<dyn Error + 'static>;

/// Log-probability of an absent rule, pair, or chart entry.
pub const LOG_ZERO: f32 = f32::NEG_INFINITY;

/// Adds two probabilities stored in log space.
///
/// ```
/// let sum = sparse_cky::utils::log_sum(0.6f32.ln(), 0.4f32.ln());
/// assert!(sum.abs() < 1e-6);
/// assert_eq!(sparse_cky::utils::log_sum(f32::NEG_INFINITY, -1.0), -1.0);
/// ```
pub fn log_sum(a: f32, b: f32) -> f32 {
  if a == LOG_ZERO {
    return b;
  }
  if b == LOG_ZERO {
    return a;
  }
  let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
  hi + (lo - hi).exp().ln_1p()
}

/// Number of bits needed to represent every value in `0..=max`. Always at least 1.
pub fn bits_for(max: u32) -> u32 {
  (u32::BITS - max.leading_zeros()).max(1)
}

/// Smallest shift that, with the given mask, separates every value in `values`.
/// Returns `None` when no shift up to 16 is collision-free.
pub(crate) fn collision_free_shift(values: &[u16], mask: u32, scratch: &mut Vec<bool>) -> Option<u32> {
  'shift: for shift in 0..=16 {
    scratch.clear();
    scratch.resize(mask as usize + 1, false);
    for &v in values {
      let slot = (((v as u32) >> shift) & mask) as usize;
      if scratch[slot] {
        continue 'shift;
      }
      scratch[slot] = true;
    }
    return Some(shift);
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bits_for() {
    assert_eq!(bits_for(0), 1);
    assert_eq!(bits_for(1), 1);
    assert_eq!(bits_for(2), 2);
    assert_eq!(bits_for(255), 8);
    assert_eq!(bits_for(256), 9);
  }

  #[test]
  fn test_log_sum_is_commutative() {
    let a = 0.25f32.ln();
    let b = 0.5f32.ln();
    assert!((log_sum(a, b) - 0.75f32.ln()).abs() < 1e-6);
    assert_eq!(log_sum(a, b), log_sum(b, a));
    assert_eq!(log_sum(LOG_ZERO, LOG_ZERO), LOG_ZERO);
  }

  #[test]
  fn test_collision_free_shift() {
    let mut scratch = Vec::new();
    assert_eq!(collision_free_shift(&[1, 2, 3], 0b11, &mut scratch), Some(0));
    let shift = collision_free_shift(&[0, 8, 16, 24], 0b11, &mut scratch).unwrap();
    assert_eq!(shift, 3);
    assert_eq!(collision_free_shift(&[], 0, &mut scratch), Some(0));
  }
}
