//! The outcome of a recovery curve fit and the ways to evaluate it.
use std::fmt::Display;

use nalgebra::DMatrix;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::gridspace;
use crate::fitter::FitError;
use crate::model::{ModelParameters, SigFigs};
use crate::series::{FitTarget, SampleSeries};

/// Goodness-of-fit summary computed against the normalized series
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitStatistics {
    /// The number of samples the model was fit to
    pub n_data: usize,
    /// The number of varied parameters
    pub n_varying: usize,
    /// The number of model evaluations the solver performed
    pub n_evaluations: usize,
    /// The sum of squared residuals
    pub chi_square: f64,
    /// `chi_square` divided by the degrees of freedom
    pub reduced_chi_square: f64,
    /// Akaike information criterion
    pub aic: f64,
    /// Bayesian information criterion
    pub bic: f64,
    /// Coefficient of determination
    pub r_squared: f64,
}

impl FitStatistics {
    pub(crate) fn new(
        data: &SampleSeries,
        params: &ModelParameters,
        n_varying: usize,
        n_evaluations: usize,
    ) -> Self {
        let n_data = data.len();
        let chi_square: f64 = data
            .iter()
            .map(|(t, y)| (params.density(t) - y).powi(2))
            .sum();
        let dof = n_data.saturating_sub(n_varying).max(1) as f64;
        let n = n_data as f64;
        let k = n_varying as f64;
        let log_likelihood = n * (chi_square.max(1e-250 * n) / n).ln();
        let total = data.total_sum_of_squares();
        let r_squared = if total > 0.0 {
            1.0 - chi_square / total
        } else {
            f64::NAN
        };
        Self {
            n_data,
            n_varying,
            n_evaluations,
            chi_square,
            reduced_chi_square: chi_square / dof,
            aic: log_likelihood + 2.0 * k,
            bic: log_likelihood + n.ln() * k,
            r_squared,
        }
    }
}

/// Parameter covariance estimated from the Jacobian at the solution
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterUncertainty {
    /// Covariance matrix in `[p1, t1, p2, t2]` order
    pub covariance: [[f64; 4]; 4],
}

impl ParameterUncertainty {
    /// Estimate the covariance as $`(J^TJ)^{-1}\chi^2_\nu`$.
    ///
    /// Returns `None` when there are no spare degrees of freedom or the
    /// normal matrix is singular.
    pub(crate) fn estimate(
        data: &SampleSeries,
        params: &ModelParameters,
        reduced_chi_square: f64,
    ) -> Option<Self> {
        let n = data.len();
        if n <= ModelParameters::COUNT || !reduced_chi_square.is_finite() {
            return None;
        }
        let mut jac = DMatrix::<f64>::zeros(n, ModelParameters::COUNT);
        for (row, (t, _)) in data.iter().enumerate() {
            for (col, g) in params.gradient(t).into_iter().enumerate() {
                jac[(row, col)] = g;
            }
        }
        let normal = jac.transpose() * &jac;
        let inverse = normal.try_inverse()?;
        let mut covariance = [[0.0; 4]; 4];
        for (i, row) in covariance.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = inverse[(i, j)] * reduced_chi_square;
            }
        }
        if covariance.iter().flatten().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Self { covariance })
    }

    /// One standard error for each parameter, in the same layout as [`ModelParameters`]
    pub fn stderr(&self) -> ModelParameters {
        let diag: [f64; 4] = std::array::from_fn(|i| self.covariance[i][i].max(0.0).sqrt());
        ModelParameters::from_slice(&diag)
    }

    /// The correlation coefficient between parameters `i` and `j`
    pub fn correlation(&self, i: usize, j: usize) -> f64 {
        let c = &self.covariance;
        c[i][j] / (c[i][i] * c[j][j]).sqrt()
    }
}

/// Something the fitted curve can be evaluated over, producing an output of the same shape.
pub trait CurveInput {
    type Output;

    fn evaluate_with(self, params: &ModelParameters) -> Self::Output;
}

impl CurveInput for f64 {
    type Output = f64;

    fn evaluate_with(self, params: &ModelParameters) -> f64 {
        params.density(self)
    }
}

impl CurveInput for &[f64] {
    type Output = Vec<f64>;

    fn evaluate_with(self, params: &ModelParameters) -> Vec<f64> {
        params.predict(self)
    }
}

impl CurveInput for &Vec<f64> {
    type Output = Vec<f64>;

    fn evaluate_with(self, params: &ModelParameters) -> Vec<f64> {
        params.predict(self)
    }
}

impl<const N: usize> CurveInput for [f64; N] {
    type Output = [f64; N];

    fn evaluate_with(self, params: &ModelParameters) -> [f64; N] {
        self.map(|t| params.density(t))
    }
}

impl<const N: usize> CurveInput for &[f64; N] {
    type Output = [f64; N];

    fn evaluate_with(self, params: &ModelParameters) -> [f64; N] {
        (*self).map(|t| params.density(t))
    }
}

/// The result of fitting the recovery model to one series.
///
/// A result is produced whenever the input passed validation. `success` reports
/// whether the solver converged; when it did not, `message` says why and `params`
/// holds wherever the solver stopped.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitResult {
    /// The fitted parameters.
    ///
    /// The model does not change when its two channels are exchanged, so the
    /// channels are labeled by speed: `t1 <= t2` always holds. Data generated from
    /// `(0.2, 40, 0.4, 5)` is reported as `(0.4, 5, 0.2, 40)`, the same curve.
    pub params: ModelParameters,
    /// The parameters the solver started from
    pub initial: ModelParameters,
    /// Whether the solver converged
    pub success: bool,
    /// Why the solver did not converge, if it did not
    pub message: Option<String>,
    /// Parameter covariance, when it can be estimated
    pub uncertainty: Option<ParameterUncertainty>,
    pub statistics: FitStatistics,
    /// The signal that was fit
    pub target: FitTarget,
    scale: f64,
    time_range: (f64, f64),
}

impl FitResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        params: ModelParameters,
        initial: ModelParameters,
        success: bool,
        message: Option<String>,
        uncertainty: Option<ParameterUncertainty>,
        statistics: FitStatistics,
        target: FitTarget,
        scale: f64,
        time_range: (f64, f64),
    ) -> Self {
        Self {
            params,
            initial,
            success,
            message,
            uncertainty,
            statistics,
            target,
            scale,
            time_range,
        }
    }

    /// Evaluate the normalized fitted curve at a time or a collection of times.
    ///
    /// Any time is accepted, including ones outside the fitted range.
    ///
    /// ```
    /// # use recoveryfit::{fit, FitTarget};
    /// let times = [0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0];
    /// let values = recoveryfit::ModelParameters::new(0.4, 5.0, 0.2, 40.0).predict(&times);
    /// let result = fit(&times, &values, FitTarget::RawSignal, None).unwrap();
    /// assert_eq!(result.evaluate(0.0), 1.0);
    /// assert_eq!(result.evaluate(&times).len(), 8);
    /// ```
    pub fn evaluate<I: CurveInput>(&self, t: I) -> I::Output {
        t.evaluate_with(&self.params)
    }

    /// Evaluate the normalized fitted curve at each of `times`
    pub fn evaluate_many(&self, times: &[f64]) -> Vec<f64> {
        self.params.predict(times)
    }

    /// Evaluate the normalized fitted curve lazily over `times`
    pub fn predict_iter<I: IntoIterator<Item = f64>>(&self, times: I) -> impl Iterator<Item = f64> {
        self.params.predict_iter(times)
    }

    /// The value the series was divided by before fitting
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// The earliest and latest times of the fitted samples
    pub fn time_range(&self) -> (f64, f64) {
        self.time_range
    }

    /// Evaluate the fitted curve at the magnitude of the original data
    pub fn denormalized(&self, t: f64) -> f64 {
        self.params.density(t) * self.scale
    }

    /// Sample the fitted curve at `n_points` evenly spaced times over the fitted range,
    /// at the magnitude of the original data
    pub fn curve(&self, n_points: usize) -> (Vec<f64>, Vec<f64>) {
        let (start, end) = self.time_range;
        let times = gridspace(start, end, n_points);
        let values = times.iter().map(|t| self.denormalized(*t)).collect();
        (times, values)
    }

    /// Convert a failed fit into [`FitError::Convergence`]
    pub fn into_result(self) -> Result<Self, FitError> {
        if self.success {
            Ok(self)
        } else {
            Err(FitError::Convergence(
                self.message
                    .unwrap_or_else(|| "the solver did not converge".to_string()),
            ))
        }
    }

    /// A one-line description of the fitted parameters
    pub fn summary(&self) -> String {
        self.params.to_string()
    }
}

impl Display for FitResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.params)?;
        if let Some(uncertainty) = self.uncertainty.as_ref() {
            let err = uncertainty.stderr();
            write!(
                f,
                " (±{}, ±{}, ±{}, ±{})",
                SigFigs(err.p1),
                SigFigs(err.t1),
                SigFigs(err.p2),
                SigFigs(err.t2)
            )?;
        }
        if let Some(message) = self.message.as_ref() {
            write!(f, " [failed: {message}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn make_result(params: ModelParameters) -> FitResult {
        let times = gridspace(0.0, 200.0, 60);
        let values = params.predict(&times);
        let data = SampleSeries::from((times, values));
        let statistics = FitStatistics::new(&data, &params, 4, 12);
        FitResult::new(
            params,
            params,
            true,
            None,
            None,
            statistics,
            FitTarget::RawSignal,
            250.0,
            (0.0, 200.0),
        )
    }

    #[test]
    fn test_evaluate_shapes() {
        let result = make_result(ModelParameters::new(0.4, 5.0, 0.2, 40.0));
        assert_eq!(result.evaluate(0.0), 1.0);
        let arr = result.evaluate([0.0, 10.0, 1e6]);
        assert_eq!(arr[0], 1.0);
        assert!((arr[2] - 0.4).abs() < 1e-9);
        let v = vec![0.0, 5.0];
        assert_eq!(result.evaluate(&v).len(), 2);
        assert_eq!(result.evaluate(&v[..]), result.evaluate(&[0.0, 5.0]).to_vec());
        // extrapolation to negative times is allowed
        assert!(result.evaluate(-1.0) > 1.0);
        assert_eq!(result.predict_iter(vec![0.0, 5.0]).count(), 2);
        assert_eq!(result.evaluate_many(&v), result.evaluate(&v));
    }

    #[test]
    fn test_curve_is_rescaled() {
        let result = make_result(ModelParameters::new(0.4, 5.0, 0.2, 40.0));
        let (times, values) = result.curve(200);
        assert_eq!(times.len(), 200);
        assert_eq!(times[0], 0.0);
        assert_eq!(times[199], 200.0);
        assert_eq!(values[0], 250.0);
        assert_eq!(result.denormalized(0.0), result.scale());
    }

    #[test]
    fn test_perfect_statistics() {
        let result = make_result(ModelParameters::new(0.4, 5.0, 0.2, 40.0));
        let stats = result.statistics;
        assert_eq!(stats.n_data, 60);
        assert_eq!(stats.chi_square, 0.0);
        assert_eq!(stats.r_squared, 1.0);
        assert!(stats.aic < 0.0);
        assert!(stats.bic > stats.aic);
    }

    #[test]
    fn test_uncertainty() {
        let params = ModelParameters::new(0.4, 5.0, 0.2, 40.0);
        let times = gridspace(0.0, 200.0, 60);
        let values: Vec<f64> = params
            .predict(&times)
            .into_iter()
            .enumerate()
            .map(|(i, v)| v + if i % 2 == 0 { 1e-3 } else { -1e-3 })
            .collect();
        let data = SampleSeries::from((times, values));
        let stats = FitStatistics::new(&data, &params, 4, 1);
        let unc = ParameterUncertainty::estimate(&data, &params, stats.reduced_chi_square).unwrap();
        let err = unc.stderr();
        assert!(err.p1 > 0.0 && err.t1 > 0.0 && err.p2 > 0.0 && err.t2 > 0.0);
        assert!((unc.correlation(1, 1) - 1.0).abs() < 1e-9);

        let short = SampleSeries::from((vec![0.0, 1.0, 2.0, 3.0], vec![1.0, 0.9, 0.8, 0.7]));
        assert!(ParameterUncertainty::estimate(&short, &params, 1.0).is_none());
    }

    #[test]
    fn test_into_result() {
        let mut result = make_result(ModelParameters::new(0.4, 5.0, 0.2, 40.0));
        assert!(result.clone().into_result().is_ok());
        result.success = false;
        result.message = Some("lost patience".into());
        match result.into_result() {
            Err(FitError::Convergence(msg)) => assert_eq!(msg, "lost patience"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_display() {
        let result = make_result(ModelParameters::new(0.4, 5.0, 0.2, 40.0));
        assert_eq!(result.summary(), "P1=0.4, T1=5 ms, P2=0.2, T2=40 ms");
        assert_eq!(result.to_string(), result.summary());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_round_trip() {
        let result = make_result(ModelParameters::new(0.4, 5.0, 0.2, 40.0));
        let text = serde_json::to_string(&result).unwrap();
        let dup: FitResult = serde_json::from_str(&text).unwrap();
        assert_eq!(dup.params, result.params);
        assert_eq!(dup.scale(), result.scale());
        assert_eq!(dup.target, result.target);
    }
}
