//! The double-exponential recovery model.
//!
//! ```math
//! I(t) = 1 - P_1\left(1 - e^{-t/T_1}\right) - P_2\left(1 - e^{-t/T_2}\right)
//! ```
//!
//! Two independent relaxation channels with amplitudes $`P_1, P_2`$ and time
//! constants $`T_1, T_2`$, normalized so that $`I(0) = 1`$. As $`t \to \infty`$
//! the model approaches $`1 - P_1 - P_2`$.
use std::fmt::Display;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::series::SampleSeries;

/// Evaluate the recovery model at `t` for the given parameters
#[inline]
pub fn model_func(t: f64, p1: f64, t1: f64, p2: f64, t2: f64) -> f64 {
    1.0 - p1 * (1.0 - (-t / t1).exp()) - p2 * (1.0 - (-t / t2).exp())
}

/// The four parameters of the recovery model.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelParameters {
    /// Amplitude of the first channel, in $`[0, 1]`$
    pub p1: f64,
    /// Time constant of the first channel
    pub t1: f64,
    /// Amplitude of the second channel, in $`[0, 1]`$
    pub p2: f64,
    /// Time constant of the second channel
    pub t2: f64,
}

impl ModelParameters {
    /// The number of parameters the solver varies
    pub const COUNT: usize = 4;

    pub fn new(p1: f64, t1: f64, p2: f64, t2: f64) -> Self {
        Self { p1, t1, p2, t2 }
    }

    /// Given observed data, compute some initial parameters.
    ///
    /// The amplitudes start at `0.5` and `0.3`, the first time constant sits at the
    /// median observed time and the second at the latest observed time, each with a
    /// floor (`1` and `10`) so neither starts near zero.
    pub fn guess(data: &SampleSeries) -> Self {
        let t1 = data.median_time().unwrap_or(1.0).max(1.0);
        let t2 = data
            .time_range()
            .map(|(_, hi)| hi)
            .unwrap_or(10.0)
            .max(10.0);
        Self::new(0.5, t1, 0.3, t2)
    }

    /// Compute the model intensity at time `t`
    ///
    /// # See also
    /// [`ModelParameters::predict`]
    /// [`ModelParameters::predict_iter`]
    #[inline]
    pub fn density(&self, t: f64) -> f64 {
        model_func(t, self.p1, self.t1, self.p2, self.t2)
    }

    /// Given a time sequence, produce the complementary sequence of model intensities
    pub fn predict(&self, times: &[f64]) -> Vec<f64> {
        times.iter().map(|t| self.density(*t)).collect()
    }

    /// Given a time iterator, produce the complementary iterator of model intensities
    pub fn predict_iter<I: IntoIterator<Item = f64>>(&self, times: I) -> impl Iterator<Item = f64> {
        let params = *self;
        times.into_iter().map(move |t| params.density(t))
    }

    /// The value the model approaches as $`t \to \infty`$
    pub fn asymptote(&self) -> f64 {
        1.0 - self.p1 - self.p2
    }

    /// The partial derivatives of $`I(t)`$ with respect to `[p1, t1, p2, t2]`
    pub fn gradient(&self, t: f64) -> [f64; 4] {
        let e1 = (-t / self.t1).exp();
        let e2 = (-t / self.t2).exp();
        [
            -(1.0 - e1),
            self.p1 * e1 * t / self.t1.powi(2),
            -(1.0 - e2),
            self.p2 * e2 * t / self.t2.powi(2),
        ]
    }

    /// Swap the two channels if needed so that `t1 <= t2`.
    ///
    /// The model is symmetric in its channels, so this does not change the curve.
    pub fn ordered(self) -> Self {
        if self.t1 > self.t2 {
            Self::new(self.p2, self.t2, self.p1, self.t1)
        } else {
            self
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.p1, self.t1, self.p2, self.t2]
    }

    pub fn from_slice(data: &[f64]) -> Self {
        Self::new(data[0], data[1], data[2], data[3])
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl Display for ModelParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "P1={}, T1={} ms, P2={}, T2={} ms",
            SigFigs(self.p1),
            SigFigs(self.t1),
            SigFigs(self.p2),
            SigFigs(self.t2)
        )
    }
}

/// Format a number with three significant digits, `%.3g` style.
pub(crate) struct SigFigs(pub f64);

impl Display for SigFigs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let x = self.0;
        if x == 0.0 || !x.is_finite() {
            return write!(f, "{x}");
        }
        // the exponent after rounding to three digits, so 999.7 lands in the next decade
        let rounded = format!("{x:.2e}");
        let (mantissa, exponent) = rounded.split_once('e').unwrap_or((rounded.as_str(), "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        if !(-4..3).contains(&exponent) {
            let text = mantissa.trim_end_matches('0').trim_end_matches('.');
            let sign = if exponent < 0 { '-' } else { '+' };
            write!(f, "{text}e{sign}{:02}", exponent.abs())
        } else {
            let decimals = (2 - exponent).max(0) as usize;
            let text = format!("{x:.decimals$}");
            let text = if text.contains('.') {
                text.trim_end_matches('0').trim_end_matches('.')
            } else {
                text.as_str()
            };
            write!(f, "{text}")
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arrayops::gridspace;

    #[test]
    fn test_identity_at_zero() {
        for params in [
            ModelParameters::new(0.4, 5.0, 0.2, 40.0),
            ModelParameters::new(1.0, 1e-12, 1.0, 1e-12),
            ModelParameters::new(0.0, 3.0, 0.0, 7.0),
        ] {
            assert_eq!(params.density(0.0), 1.0);
        }
    }

    #[test]
    fn test_monotone_decay() {
        let params = ModelParameters::new(0.4, 5.0, 0.2, 40.0);
        let times = gridspace(0.0, 2000.0, 500);
        let ys = params.predict(&times);
        for w in ys.windows(2) {
            assert!(w[1] <= w[0], "{} > {}", w[1], w[0]);
        }
        assert!((ys.last().unwrap() - params.asymptote()).abs() < 1e-12);
        assert!((params.asymptote() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let params = ModelParameters::new(0.35, 4.0, 0.25, 30.0);
        let h = 1e-6;
        for t in [0.5, 3.0, 12.0, 80.0] {
            let analytic = params.gradient(t);
            let base = params.to_array();
            for k in 0..4 {
                let mut up = base;
                let mut down = base;
                up[k] += h;
                down[k] -= h;
                let numeric = (ModelParameters::from_slice(&up).density(t)
                    - ModelParameters::from_slice(&down).density(t))
                    / (2.0 * h);
                assert!(
                    (numeric - analytic[k]).abs() < 1e-6,
                    "parameter {k} at t={t}: {numeric} vs {}",
                    analytic[k]
                );
            }
        }
    }

    #[test]
    fn test_ordered() {
        let swapped = ModelParameters::new(0.2, 40.0, 0.4, 5.0);
        let ordered = swapped.ordered();
        assert_eq!(ordered, ModelParameters::new(0.4, 5.0, 0.2, 40.0));
        assert_eq!(ordered.ordered(), ordered);
        for t in [0.0, 1.0, 7.0, 33.0, 400.0] {
            assert_eq!(swapped.density(t), ordered.density(t));
        }
    }

    #[test]
    fn test_guess() {
        let times = [0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0];
        let values = ModelParameters::new(0.4, 5.0, 0.2, 40.0).predict(&times);
        let data = SampleSeries::from((&times[..], &values[..]));
        assert_eq!(ModelParameters::guess(&data), ModelParameters::new(0.5, 7.5, 0.3, 100.0));

        let times = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5];
        let data = SampleSeries::from((&times[..], &values[..6]));
        assert_eq!(ModelParameters::guess(&data), ModelParameters::new(0.5, 1.0, 0.3, 10.0));
    }

    #[test]
    fn test_display() {
        let params = ModelParameters::new(0.4, 5.0, 0.2, 40.0);
        assert_eq!(params.to_string(), "P1=0.4, T1=5 ms, P2=0.2, T2=40 ms");
        let params = ModelParameters::new(0.123456, 1234.5, 0.000012345, 12.345);
        assert_eq!(params.to_string(), "P1=0.123, T1=1.23e+03 ms, P2=1.23e-05, T2=12.3 ms");
    }

    #[test]
    fn test_sig_figs_rounding_carry() {
        let cases = [
            (999.7, "1e+03"),
            (0.00099996, "0.001"),
            (99.96, "100"),
            (9.9996, "10"),
            (0.000099996, "0.0001"),
            (-999.7, "-1e+03"),
            (999.4, "999"),
            (1.0e-5, "1e-05"),
            (123456.0, "1.23e+05"),
        ];
        for (value, expected) in cases {
            assert_eq!(SigFigs(value).to_string(), expected, "formatting {value}");
        }
    }
}
