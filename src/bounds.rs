//! Box constraints on model parameters.
//!
//! The solver works on unconstrained values, so each bounded parameter is mapped
//! through a smooth transform between the solver's *internal* value and the model's
//! *external* value:
//!
//! - both bounds: $`p = a + (\sin x + 1)(b - a) / 2`$
//! - lower bound only: $`p = a - 1 + \sqrt{x^2 + 1}`$
//! - upper bound only: $`p = b + 1 - \sqrt{x^2 + 1}`$
//!
//! Any internal value maps to an external value within the bounds.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::model::ModelParameters;

/// The smallest permitted time constant
pub const MIN_TIME_CONSTANT: f64 = 1e-12;

/// An interval constraint on a single parameter. Either end may be infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterBound {
    pub min: f64,
    pub max: f64,
}

impl Default for ParameterBound {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl ParameterBound {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn unbounded() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn lower(min: f64) -> Self {
        Self::new(min, f64::INFINITY)
    }

    pub fn upper(max: f64) -> Self {
        Self::new(f64::NEG_INFINITY, max)
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    fn has_min(&self) -> bool {
        self.min.is_finite()
    }

    fn has_max(&self) -> bool {
        self.max.is_finite()
    }

    /// Map an external (model) value to the solver's internal coordinate.
    ///
    /// Values outside the interval are clamped first.
    pub fn to_internal(&self, value: f64) -> f64 {
        let value = self.clamp(value);
        match (self.has_min(), self.has_max()) {
            (true, true) => {
                let x = 2.0 * (value - self.min) / (self.max - self.min) - 1.0;
                x.clamp(-1.0, 1.0).asin()
            }
            (true, false) => ((value - self.min + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            (false, true) => ((self.max - value + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            (false, false) => value,
        }
    }

    /// Map an internal coordinate back to a value within the interval
    pub fn to_external(&self, internal: f64) -> f64 {
        match (self.has_min(), self.has_max()) {
            (true, true) => self.min + (internal.sin() + 1.0) * (self.max - self.min) / 2.0,
            (true, false) => self.min + ((internal * internal + 1.0).sqrt() - 1.0),
            (false, true) => self.max - ((internal * internal + 1.0).sqrt() - 1.0),
            (false, false) => internal,
        }
    }

    /// The derivative of [`ParameterBound::to_external`] at `internal`,
    /// used to chain the model Jacobian into internal coordinates.
    pub fn external_derivative(&self, internal: f64) -> f64 {
        match (self.has_min(), self.has_max()) {
            (true, true) => internal.cos() * (self.max - self.min) / 2.0,
            (true, false) => internal / (internal * internal + 1.0).sqrt(),
            (false, true) => -internal / (internal * internal + 1.0).sqrt(),
            (false, false) => 1.0,
        }
    }
}

/// Bounds for all four [`ModelParameters`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterBounds {
    pub p1: ParameterBound,
    pub t1: ParameterBound,
    pub p2: ParameterBound,
    pub t2: ParameterBound,
}

impl Default for ParameterBounds {
    /// Amplitudes in $`[0, 1]`$, time constants strictly positive
    fn default() -> Self {
        Self {
            p1: ParameterBound::new(0.0, 1.0),
            t1: ParameterBound::lower(MIN_TIME_CONSTANT),
            p2: ParameterBound::new(0.0, 1.0),
            t2: ParameterBound::lower(MIN_TIME_CONSTANT),
        }
    }
}

impl ParameterBounds {
    fn as_array(&self) -> [ParameterBound; 4] {
        [self.p1, self.t1, self.p2, self.t2]
    }

    pub fn contains(&self, params: &ModelParameters) -> bool {
        self.as_array()
            .iter()
            .zip(params.to_array())
            .all(|(b, v)| b.contains(v))
    }

    pub fn to_internal(&self, params: &ModelParameters) -> [f64; 4] {
        let bounds = self.as_array();
        let values = params.to_array();
        std::array::from_fn(|i| bounds[i].to_internal(values[i]))
    }

    pub fn to_external(&self, internal: &[f64]) -> ModelParameters {
        let bounds = self.as_array();
        let values: [f64; 4] = std::array::from_fn(|i| bounds[i].to_external(internal[i]));
        ModelParameters::from_slice(&values)
    }

    pub fn external_derivative(&self, internal: &[f64]) -> [f64; 4] {
        let bounds = self.as_array();
        std::array::from_fn(|i| bounds[i].external_derivative(internal[i]))
    }
}
