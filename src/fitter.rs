//! Fit the recovery model to a time series with bounded nonlinear least squares.
//!
//! The series is validated, stripped of non-finite points, sorted by time and
//! divided by its maximum before the four model parameters are estimated with a
//! Levenberg-Marquardt solver. The amplitudes are held to $`[0, 1]`$ and the time
//! constants to positive values (see [`crate::bounds`]).
//!
//! # Example
//!
//! ```rust
//! use recoveryfit::{CurveFitEngine, FitConfig, FitRequest, ModelParameters};
//!
//! let times: Vec<f64> = (0..60).map(|i| i as f64 * 5.0).collect();
//! let truth = ModelParameters::new(0.4, 5.0, 0.2, 40.0);
//! let signal: Vec<f64> = truth.predict(&times).iter().map(|y| y * 800.0 + 50.0).collect();
//! let background = vec![50.0; times.len()];
//!
//! let engine = CurveFitEngine::new(FitConfig::default().patience(500));
//! let result = engine
//!     .fit(&FitRequest::subtracted(&times, &signal, &background))
//!     .unwrap();
//! assert!(result.success);
//! assert!((result.params.p1 - 0.4).abs() < 1e-3);
//! ```
use std::borrow::Cow;

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::{debug, trace};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use thiserror::Error;

use crate::bounds::ParameterBounds;
use crate::model::ModelParameters;
use crate::result::{FitResult, FitStatistics, ParameterUncertainty};
use crate::series::{FitTarget, SampleSeries};

/// The fewest finite samples a fit will be attempted on
pub const MIN_SAMPLES: usize = 6;

/// All the ways a recovery fit can fail
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("Too few finite samples to fit: found {found}, need at least {required}")]
    InsufficientData { found: usize, required: usize },
    #[error("Cannot normalize the series, its maximum is {maximum}")]
    DegenerateData { maximum: f64 },
    #[error("The {name} array has length {found}, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("A background array is required to fit the background-subtracted signal")]
    MissingBackground,
    #[error("Every sample was taken at time {time}, the time constants cannot be estimated")]
    ZeroTimeSpan { time: f64 },
    #[error("The fit did not converge: {0}")]
    Convergence(String),
}

/// Solver settings for a recovery fit
#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    /// Bounds the solver's work to `patience * (parameters + 1)` model evaluations
    pub patience: usize,
    /// Relative reduction in the sum of squares below which the fit has converged
    pub ftol: f64,
    /// Relative change in the parameters below which the fit has converged
    pub xtol: f64,
    /// Orthogonality between the residuals and the Jacobian columns at which the fit
    /// has converged
    pub gtol: f64,
    /// Scales the initial trust region
    pub stepbound: f64,
    /// Start from these parameters instead of [`ModelParameters::guess`]
    pub initial_guess: Option<ModelParameters>,
}

impl FitConfig {
    /// Bounds the solver's work to `patience * (parameters + 1)` model evaluations
    pub fn patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    pub fn xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    pub fn gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    pub fn stepbound(mut self, stepbound: f64) -> Self {
        self.stepbound = stepbound;
        self
    }

    /// Start from `params` instead of the data-driven guess.
    ///
    /// Values outside the parameter bounds are clamped onto them.
    pub fn initial_guess(mut self, params: ModelParameters) -> Self {
        self.initial_guess = Some(params);
        self
    }

    fn solver(&self) -> LevenbergMarquardt<f64> {
        LevenbergMarquardt::new()
            .with_ftol(self.ftol)
            .with_xtol(self.xtol)
            .with_gtol(self.gtol)
            .with_stepbound(self.stepbound)
            .with_patience(self.patience.max(1))
    }
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            patience: 2000,
            ftol: f64::EPSILON * 30.0,
            xtol: f64::EPSILON * 30.0,
            gtol: 0.0,
            stepbound: 100.0,
            initial_guess: None,
        }
    }
}

/// One fit's worth of input arrays. Nothing is copied until the fit runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitRequest<'a> {
    pub time: &'a [f64],
    pub value: &'a [f64],
    pub target: FitTarget,
    pub background: Option<&'a [f64]>,
}

impl<'a> FitRequest<'a> {
    pub fn new(
        time: &'a [f64],
        value: &'a [f64],
        target: FitTarget,
        background: Option<&'a [f64]>,
    ) -> Self {
        Self {
            time,
            value,
            target,
            background,
        }
    }

    /// Fit the signal as-is
    pub fn raw(time: &'a [f64], value: &'a [f64]) -> Self {
        Self::new(time, value, FitTarget::RawSignal, None)
    }

    /// Fit the signal minus `background`
    pub fn subtracted(time: &'a [f64], value: &'a [f64], background: &'a [f64]) -> Self {
        Self::new(time, value, FitTarget::BackgroundSubtracted, Some(background))
    }
}

/// A validated, sorted and normalized series ready for fitting
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSeries {
    /// The series divided by `scale`, sorted by time
    pub series: SampleSeries<'static, 'static>,
    /// The maximum of the series before normalization
    pub scale: f64,
    pub target: FitTarget,
}

impl PreparedSeries {
    /// Validate `request` and build the series the model will be fit against.
    pub fn from_request(request: &FitRequest) -> Result<Self, FitError> {
        let n = request.time.len();
        if request.value.len() != n {
            return Err(FitError::LengthMismatch {
                name: "value",
                expected: n,
                found: request.value.len(),
            });
        }

        let mut series =
            SampleSeries::new(Cow::Borrowed(request.time), Cow::Borrowed(request.value));
        if request.target.requires_background() {
            let background = request.background.ok_or(FitError::MissingBackground)?;
            if background.len() != n {
                return Err(FitError::LengthMismatch {
                    name: "background",
                    expected: n,
                    found: background.len(),
                });
            }
            series.subtract(background);
        }

        if n >= MIN_SAMPLES && !series.value.iter().any(|v| v.is_finite()) {
            return Err(FitError::DegenerateData { maximum: f64::NAN });
        }

        let series = series.retain_finite();
        if series.len() < MIN_SAMPLES {
            return Err(FitError::InsufficientData {
                found: series.len(),
                required: MIN_SAMPLES,
            });
        }

        let series = series.sorted();
        let maximum = series.max_value().unwrap_or(f64::NAN);
        if maximum == 0.0 || !maximum.is_finite() {
            return Err(FitError::DegenerateData { maximum });
        }
        if let Some((start, end)) = series.time_range() {
            if start == end {
                return Err(FitError::ZeroTimeSpan { time: start });
            }
        }

        Ok(Self {
            series: series.scaled(maximum),
            scale: maximum,
            target: request.target,
        })
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// The least squares problem the solver sees, in unconstrained coordinates
struct RecoveryProblem<'a> {
    data: &'a SampleSeries<'static, 'static>,
    bounds: ParameterBounds,
    internal: DVector<f64>,
}

impl<'a> RecoveryProblem<'a> {
    fn new(
        data: &'a SampleSeries<'static, 'static>,
        bounds: ParameterBounds,
        initial: &ModelParameters,
    ) -> Self {
        let internal = DVector::from_row_slice(&bounds.to_internal(initial));
        Self {
            data,
            bounds,
            internal,
        }
    }

    fn external(&self) -> ModelParameters {
        self.bounds.to_external(self.internal.as_slice())
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for RecoveryProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.internal.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.internal.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let params = self.external();
        let residuals = DVector::from_iterator(
            self.data.len(),
            self.data.iter().map(|(t, y)| params.density(t) - y),
        );
        if residuals.iter().all(|r| r.is_finite()) {
            Some(residuals)
        } else {
            None
        }
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let params = self.external();
        let chain = self.bounds.external_derivative(self.internal.as_slice());
        let mut jac = DMatrix::zeros(self.data.len(), ModelParameters::COUNT);
        for (row, (t, _)) in self.data.iter().enumerate() {
            for (col, g) in params.gradient(t).into_iter().enumerate() {
                jac[(row, col)] = g * chain[col];
            }
        }
        if jac.iter().all(|v| v.is_finite()) {
            Some(jac)
        } else {
            None
        }
    }
}

fn describe_termination(reason: &TerminationReason) -> String {
    match reason {
        TerminationReason::LostPatience => {
            "Maximum number of function evaluations exceeded".to_string()
        }
        TerminationReason::User(what) => {
            format!("The model {what} could not be evaluated with finite values")
        }
        TerminationReason::Numerical(what) => {
            format!("Numerical failure while computing the {what}")
        }
        other => format!("The solver stopped without converging: {other:?}"),
    }
}

/// Fits the double-exponential recovery model.
///
/// The engine holds only its [`FitConfig`]; each call to [`CurveFitEngine::fit`] is
/// independent and deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurveFitEngine {
    config: FitConfig,
    bounds: ParameterBounds,
}

impl CurveFitEngine {
    pub fn new(config: FitConfig) -> Self {
        Self {
            config,
            bounds: ParameterBounds::default(),
        }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn bounds(&self) -> &ParameterBounds {
        &self.bounds
    }

    /// Validate `request`, then fit the model to it.
    ///
    /// # Errors
    /// Returns [`FitError::InsufficientData`], [`FitError::DegenerateData`],
    /// [`FitError::ZeroTimeSpan`], [`FitError::LengthMismatch`] or
    /// [`FitError::MissingBackground`] when the input
    /// cannot be fit. A solver that fails to converge is *not* an error, it produces
    /// a [`FitResult`] whose `success` is `false`.
    pub fn fit(&self, request: &FitRequest) -> Result<FitResult, FitError> {
        let prepared = PreparedSeries::from_request(request)?;
        Ok(self.fit_prepared(&prepared))
    }

    /// Fit the model to a series that has already been prepared
    pub fn fit_prepared(&self, prepared: &PreparedSeries) -> FitResult {
        let data = &prepared.series;
        let initial = self
            .config
            .initial_guess
            .map(|p| {
                let internal = self.bounds.to_internal(&p);
                self.bounds.to_external(&internal)
            })
            .unwrap_or_else(|| ModelParameters::guess(data));

        debug!(
            "Fitting {} samples ({:?}, scale {}) from {initial}",
            data.len(),
            prepared.target,
            prepared.scale
        );

        let problem = RecoveryProblem::new(data, self.bounds, &initial);
        trace!("Initial internal parameters {:?}", problem.internal.as_slice());

        let (problem, report) = self.config.solver().minimize(problem);
        let params = problem.external().ordered();

        let success = report.termination.was_successful() && params.is_finite();
        let message = if success {
            None
        } else if !params.is_finite() {
            Some("The solver produced non-finite parameters".to_string())
        } else {
            Some(describe_termination(&report.termination))
        };

        let statistics = FitStatistics::new(
            data,
            &params,
            ModelParameters::COUNT,
            report.number_of_evaluations,
        );
        let uncertainty = if success {
            ParameterUncertainty::estimate(data, &params, statistics.reduced_chi_square)
        } else {
            None
        };

        match message.as_ref() {
            None => debug!(
                "Converged after {} evaluations ({:?}): {params}, chi-square {:e}",
                report.number_of_evaluations, report.termination, statistics.chi_square
            ),
            Some(message) => debug!(
                "Fit failed after {} evaluations: {message}",
                report.number_of_evaluations
            ),
        }

        FitResult::new(
            params,
            initial,
            success,
            message,
            uncertainty,
            statistics,
            prepared.target,
            prepared.scale,
            data.time_range().unwrap_or_default(),
        )
    }
}

/// Fit the recovery model with the default [`FitConfig`].
///
/// `background` is required when `target` is [`FitTarget::BackgroundSubtracted`]
/// and ignored otherwise.
///
/// # See also
/// [`CurveFitEngine::fit`]
pub fn fit(
    time: &[f64],
    value: &[f64],
    target: FitTarget,
    background: Option<&[f64]>,
) -> Result<FitResult, FitError> {
    CurveFitEngine::default().fit(&FitRequest::new(time, value, target, background))
}
