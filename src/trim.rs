//! Exclude regions of a trace from fitting.
//!
//! A [`TrimMask`] records which rows of a table are kept. Regions are removed by
//! time span and the mask is applied to each column before the columns are
//! handed to the fitter.
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrimError {
    #[error("The mask covers {mask} rows but the array has {array}")]
    LengthMismatch { mask: usize, array: usize },
}

/// A keep-mask over the rows of a table. `true` means the row is kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrimMask {
    keep: Vec<bool>,
}

impl TrimMask {
    /// A mask over `len` rows that keeps all of them
    pub fn new(len: usize) -> Self {
        Self {
            keep: vec![true; len],
        }
    }

    pub fn len(&self) -> usize {
        self.keep.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keep.is_empty()
    }

    pub fn is_kept(&self, index: usize) -> bool {
        self.keep.get(index).copied().unwrap_or(false)
    }

    /// The number of rows kept
    pub fn kept(&self) -> usize {
        self.keep.iter().filter(|k| **k).count()
    }

    /// The number of rows trimmed away
    pub fn trimmed(&self) -> usize {
        self.len() - self.kept()
    }

    /// Trim every row whose time lies in the closed span between `start` and `end`,
    /// in addition to anything already trimmed. The ends may be given in either order.
    ///
    /// Returns the number of rows newly trimmed.
    pub fn delete_span(&mut self, times: &[f64], start: f64, end: f64) -> Result<usize, TrimError> {
        self.check(times.len())?;
        let (lo, hi) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };
        let mut removed = 0;
        for (keep, t) in self.keep.iter_mut().zip(times.iter()) {
            if *keep && lo <= *t && *t <= hi {
                *keep = false;
                removed += 1;
            }
        }
        log::debug!("Trimmed {removed} rows in [{lo}, {hi}]");
        Ok(removed)
    }

    /// Keep every row again
    pub fn reset(&mut self) {
        self.keep.fill(true);
    }

    /// The indices of the rows that are kept
    pub fn kept_indices(&self) -> Vec<usize> {
        self.keep
            .iter()
            .enumerate()
            .filter_map(|(i, k)| k.then_some(i))
            .collect()
    }

    /// Select the kept rows of `values`
    pub fn apply(&self, values: &[f64]) -> Result<Vec<f64>, TrimError> {
        self.check(values.len())?;
        Ok(values
            .iter()
            .zip(self.keep.iter())
            .filter_map(|(v, k)| k.then_some(*v))
            .collect())
    }

    fn check(&self, len: usize) -> Result<(), TrimError> {
        if len != self.len() {
            Err(TrimError::LengthMismatch {
                mask: self.len(),
                array: len,
            })
        } else {
            Ok(())
        }
    }
}

impl From<Vec<bool>> for TrimMask {
    fn from(keep: Vec<bool>) -> Self {
        Self { keep }
    }
}

impl AsRef<[bool]> for TrimMask {
    fn as_ref(&self) -> &[bool] {
        &self.keep
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_delete_and_reset() {
        let times = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let values = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0];
        let mut mask = TrimMask::new(times.len());
        assert_eq!(mask.kept(), 7);

        assert_eq!(mask.delete_span(&times, 1.5, 3.0).unwrap(), 2);
        assert_eq!(mask.apply(&values).unwrap(), vec![10.0, 11.0, 14.0, 15.0, 16.0]);

        // reversed bounds, overlapping the earlier span
        assert_eq!(mask.delete_span(&times, 5.0, 2.5).unwrap(), 2);
        assert_eq!(mask.kept_indices(), vec![0, 1, 6]);
        assert_eq!(mask.trimmed(), 4);
        assert!(!mask.is_kept(3));
        assert!(!mask.is_kept(100));

        mask.reset();
        assert_eq!(mask.kept(), 7);
        assert_eq!(mask.apply(&values).unwrap(), values.to_vec());
    }

    #[test]
    fn test_nan_times_are_not_trimmed() {
        let times = [0.0, f64::NAN, 2.0];
        let mut mask = TrimMask::new(3);
        assert_eq!(mask.delete_span(&times, -1.0, 10.0).unwrap(), 2);
        assert_eq!(mask.kept_indices(), vec![1]);
    }

    #[test]
    fn test_length_mismatch() {
        let mut mask = TrimMask::from(vec![true, false]);
        assert_eq!(
            mask.apply(&[1.0]),
            Err(TrimError::LengthMismatch { mask: 2, array: 1 })
        );
        assert!(mask.delete_span(&[1.0, 2.0, 3.0], 0.0, 1.0).is_err());
        assert_eq!(mask.as_ref(), &[true, false]);
    }
}
