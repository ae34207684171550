use std::borrow::Cow;
use std::iter::FusedIterator;

use num_traits::{Float, ToPrimitive};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::{argmax, argsort, median, take};

/// Which signal the recovery model is fitted against
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FitTarget {
    /// Fit the measured signal as-is
    RawSignal,
    /// Fit the measured signal minus the paired background
    #[default]
    BackgroundSubtracted,
}

impl FitTarget {
    pub fn requires_background(&self) -> bool {
        matches!(self, Self::BackgroundSubtracted)
    }
}

/// An iterator over `(time, value)` pairs of a [`SampleSeries`]
pub struct SampleSeriesIter<'a> {
    inner: std::iter::Zip<
        std::iter::Copied<std::slice::Iter<'a, f64>>,
        std::iter::Copied<std::slice::Iter<'a, f64>>,
    >,
}

impl Iterator for SampleSeriesIter<'_> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl FusedIterator for SampleSeriesIter<'_> {}

impl ExactSizeIterator for SampleSeriesIter<'_> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Represent an array pair for signal-over-time data
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleSeries<'a, 'b> {
    /// The time axis of the signal
    pub time: Cow<'a, [f64]>,
    /// The paired signal value to fit against
    pub value: Cow<'b, [f64]>,
}

impl<'a, 'b> SampleSeries<'a, 'b> {
    /// # Panics
    /// If `time` and `value` differ in length
    pub fn new(time: Cow<'a, [f64]>, value: Cow<'b, [f64]>) -> Self {
        assert_eq!(
            time.len(),
            value.len(),
            "time array length ({}) must equal value length ({})",
            time.len(),
            value.len()
        );
        Self { time, value }
    }

    /// Build a series from any floating point arrays, converting to `f64`.
    ///
    /// Returns `None` if the lengths differ.
    pub fn from_arrays<T: Float + ToPrimitive, U: Float + ToPrimitive>(
        time: &[T],
        value: &[U],
    ) -> Option<SampleSeries<'static, 'static>> {
        if time.len() != value.len() {
            return None;
        }
        let time: Vec<f64> = time.iter().map(|t| t.to_f64().unwrap_or(f64::NAN)).collect();
        let value: Vec<f64> = value.iter().map(|v| v.to_f64().unwrap_or(f64::NAN)).collect();
        Some(SampleSeries::new(Cow::Owned(time), Cow::Owned(value)))
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn get(&self, index: usize) -> (f64, f64) {
        (self.time[index], self.value[index])
    }

    pub fn iter(&self) -> SampleSeriesIter<'_> {
        SampleSeriesIter {
            inner: self.time.iter().copied().zip(self.value.iter().copied()),
        }
    }

    /// Create a new series borrowing from this one
    pub fn borrow(&self) -> SampleSeries<'_, '_> {
        SampleSeries::new(Cow::Borrowed(&self.time), Cow::Borrowed(&self.value))
    }

    /// The time span covered by the series, `(first, last)` after sorting
    pub fn time_range(&self) -> Option<(f64, f64)> {
        let lo = self.time.iter().copied().reduce(f64::min)?;
        let hi = self.time.iter().copied().reduce(f64::max)?;
        Some((lo, hi))
    }

    pub fn duration(&self) -> f64 {
        self.time_range().map(|(lo, hi)| hi - lo).unwrap_or_default()
    }

    /// Subtract `background` from the signal value point-wise
    ///
    /// # Panics
    /// If `background` is not the same length as the series
    pub fn subtract(&mut self, background: &[f64]) {
        assert_eq!(self.value.len(), background.len());
        self.value
            .to_mut()
            .iter_mut()
            .zip(background.iter())
            .for_each(|(a, b)| {
                *a -= *b;
            });
    }

    /// Drop every point where either the time or the value is not finite
    pub fn retain_finite(&self) -> SampleSeries<'static, 'static> {
        let (time, value): (Vec<f64>, Vec<f64>) = self
            .iter()
            .filter(|(t, y)| t.is_finite() && y.is_finite())
            .unzip();
        SampleSeries::new(Cow::Owned(time), Cow::Owned(value))
    }

    /// Whether the time axis is non-decreasing
    pub fn is_sorted(&self) -> bool {
        self.time.windows(2).all(|w| w[0] <= w[1])
    }

    /// Sort by ascending time. The sort is stable, so points with equal times keep
    /// their relative order.
    pub fn sorted(&self) -> SampleSeries<'static, 'static> {
        let order = argsort(&self.time);
        SampleSeries::new(
            Cow::Owned(take(&self.time, &order)),
            Cow::Owned(take(&self.value, &order)),
        )
    }

    /// The largest value in the series, ignoring NaN
    pub fn max_value(&self) -> Option<f64> {
        argmax(&self.value).map(|(_, v)| v)
    }

    pub fn argmax(&self) -> usize {
        argmax(&self.value).map(|(i, _)| i).unwrap_or_default()
    }

    pub fn median_time(&self) -> Option<f64> {
        median(&self.time)
    }

    /// Divide every value by `scale`
    pub fn scaled(&self, scale: f64) -> SampleSeries<'a, 'static> {
        let value = self.value.iter().map(|v| v / scale).collect();
        SampleSeries::new(self.time.clone(), Cow::Owned(value))
    }

    /// The sum of squared deviations of the values from their mean
    pub fn total_sum_of_squares(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let mean = self.value.iter().sum::<f64>() / self.len() as f64;
        self.value.iter().map(|v| (v - mean).powi(2)).sum()
    }
}

impl<'a, 'b> From<(&'a [f64], &'b [f64])> for SampleSeries<'a, 'b> {
    fn from(value: (&'a [f64], &'b [f64])) -> Self {
        SampleSeries::new(Cow::Borrowed(value.0), Cow::Borrowed(value.1))
    }
}

impl From<(Vec<f64>, Vec<f64>)> for SampleSeries<'static, 'static> {
    fn from(value: (Vec<f64>, Vec<f64>)) -> Self {
        SampleSeries::new(Cow::Owned(value.0), Cow::Owned(value.1))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_retain_finite_and_sort() {
        let time = vec![5.0, 1.0, f64::NAN, 3.0, 1.0, 2.0];
        let value = vec![0.5, 0.9, 1.0, f64::INFINITY, 0.8, 0.7];
        let series = SampleSeries::from((time, value));
        let finite = series.retain_finite();
        assert_eq!(finite.len(), 4);
        assert!(!finite.is_sorted());

        let sorted = finite.sorted();
        assert!(sorted.is_sorted());
        assert_eq!(sorted.time.as_ref(), &[1.0, 1.0, 2.0, 5.0]);
        // ties keep their input order
        assert_eq!(sorted.value.as_ref(), &[0.9, 0.8, 0.7, 0.5]);
    }

    #[test]
    fn test_subtract_and_scale() {
        let time = [0.0, 1.0, 2.0];
        let value = [10.0, 8.0, 6.0];
        let mut series = SampleSeries::from((&time[..], &value[..]));
        series.subtract(&[2.0, 2.0, 2.0]);
        assert_eq!(series.value.as_ref(), &[8.0, 6.0, 4.0]);
        // the source array is untouched
        assert_eq!(value, [10.0, 8.0, 6.0]);

        let max = series.max_value().unwrap();
        assert_eq!(max, 8.0);
        let normed = series.scaled(max);
        assert_eq!(normed.value.as_ref(), &[1.0, 0.75, 0.5]);
        assert_eq!(normed.argmax(), 0);
    }

    #[test]
    fn test_from_arrays() {
        let series = SampleSeries::from_arrays(&[0.0f32, 1.0, 2.0], &[3.0f32, 2.0, 1.0]).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.get(1), (1.0, 2.0));
        assert!(SampleSeries::from_arrays(&[0.0f64], &[1.0f64, 2.0]).is_none());
    }

    #[test]
    fn test_summaries() {
        let series = SampleSeries::from((vec![10.0, 0.0, 4.0, 2.0], vec![1.0, 2.0, 3.0, 4.0]));
        assert_eq!(series.time_range(), Some((0.0, 10.0)));
        assert_eq!(series.duration(), 10.0);
        assert_eq!(series.median_time(), Some(3.0));
        assert_eq!(series.total_sum_of_squares(), 5.0);
        assert_eq!(series.iter().len(), 4);
        assert!(SampleSeries::default().time_range().is_none());
    }

    #[test]
    fn test_target() {
        assert_eq!(FitTarget::default(), FitTarget::BackgroundSubtracted);
        assert!(FitTarget::BackgroundSubtracted.requires_background());
        assert!(!FitTarget::RawSignal.requires_background());
    }
}
