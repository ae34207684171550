use std::cmp::Ordering;

use num_traits::{Float, ToPrimitive};

/// Produce `n` evenly spaced points from `start` to `end`, inclusive of both ends.
///
/// When `n == 1`, only `start` is returned.
pub fn gridspace<T: Float + ToPrimitive>(start: T, end: T, n: usize) -> Vec<T> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / T::from(n - 1).unwrap();
            let mut result = Vec::with_capacity(n);
            for i in 0..n - 1 {
                result.push(start + T::from(i).unwrap() * step);
            }
            result.push(end);
            result
        }
    }
}

/// Compute the median of `values`, averaging the two middle values when the
/// length is even. Returns `None` for an empty slice.
///
/// `values` does not need to be sorted.
pub fn median<T: Float>(values: &[T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    let mut buf = values.to_vec();
    buf.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = buf.len();
    let mid = n / 2;
    if n % 2 == 0 {
        let two = T::one() + T::one();
        Some((buf[mid - 1] + buf[mid]) / two)
    } else {
        Some(buf[mid])
    }
}

/// The indices that would sort `values` in ascending order.
///
/// The sort is stable, so equal values keep their relative order.
pub fn argsort<T: Float>(values: &[T]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|a, b| {
        values[*a]
            .partial_cmp(&values[*b])
            .unwrap_or(Ordering::Equal)
    });
    indices
}

/// Gather `values` in the order given by `indices`
pub fn take<T: Copy>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|i| values[*i]).collect()
}

/// The position and value of the largest element, ignoring NaN.
pub fn argmax<T: Float>(values: &[T]) -> Option<(usize, T)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gridspace() {
        let xs = gridspace(0.0, 100.0, 201);
        assert_eq!(xs.len(), 201);
        assert_eq!(xs[0], 0.0);
        assert_eq!(xs[200], 100.0);
        assert!((xs[1] - 0.5).abs() < 1e-12);

        assert!(gridspace(0.0f64, 1.0, 0).is_empty());
        assert_eq!(gridspace(3.0f64, 1.0, 1), vec![3.0]);
    }

    #[test]
    fn test_median() {
        assert_eq!(median::<f64>(&[]), None);
        assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(&[0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0]), Some(7.5));
    }

    #[test]
    fn test_argsort_stable() {
        let xs = [3.0, 1.0, 2.0, 1.0, 0.5];
        assert_eq!(argsort(&xs), vec![4, 1, 3, 2, 0]);
        assert_eq!(take(&xs, &argsort(&xs)), vec![0.5, 1.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax::<f64>(&[]), None);
        assert_eq!(argmax(&[1.0, f64::NAN, 4.0, 4.0, 2.0]), Some((2, 4.0)));
        assert_eq!(argmax(&[f64::NAN, f64::NAN]), None);
    }
}
