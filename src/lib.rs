//! `recoveryfit` fits a two-channel exponential recovery model to a measured
//! time trace.
//!
//! ```math
//! I(t) = 1 - P_1\left(1 - e^{-t/T_1}\right) - P_2\left(1 - e^{-t/T_2}\right)
//! ```
//!
//! The measured signal is optionally background-subtracted, normalized by its
//! maximum and then fit with a bounded Levenberg-Marquardt least squares solver.
//! The simplest entry point is [`fit`]. [`CurveFitEngine`] exposes the solver
//! configuration through [`FitConfig`] and [`ParameterBounds`].
//!
//! Measurement tables can be read with [`SampleTable`], and regions of a trace
//! excluded from fitting with a [`TrimMask`].
//!
//! # Usage
//! ```
//! use recoveryfit::{self, FitTarget};
//!
//! let table = recoveryfit::load_sample_table("./test/data/recovery_trace.tsv").unwrap();
//! let result = recoveryfit::fit(
//!     &table.time,
//!     &table.signal,
//!     FitTarget::BackgroundSubtracted,
//!     Some(&table.background),
//! )
//! .unwrap();
//! assert!(result.success);
//! println!("{}", result);
//! ```
pub mod arrayops;
pub mod bounds;
pub mod fitter;
pub mod model;
pub mod result;
pub mod series;
pub mod text;
pub mod trim;

pub mod prelude;

pub use crate::bounds::{ParameterBound, ParameterBounds};
pub use crate::fitter::{
    fit, CurveFitEngine, FitConfig, FitError, FitRequest, PreparedSeries, MIN_SAMPLES,
};
pub use crate::model::{model_func, ModelParameters};
pub use crate::result::{CurveInput, FitResult, FitStatistics, ParameterUncertainty};
pub use crate::series::{FitTarget, SampleSeries};
pub use crate::text::{load_sample_table, ColumnNames, SampleTable, TableError};
pub use crate::trim::{TrimError, TrimMask};
