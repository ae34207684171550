pub use crate::fitter::{CurveFitEngine, FitConfig, FitError, FitRequest};
pub use crate::model::ModelParameters;
pub use crate::result::{CurveInput, FitResult};
pub use crate::series::{FitTarget, SampleSeries};
pub use crate::trim::TrimMask;
