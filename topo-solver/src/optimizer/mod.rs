//! The constrained optimizer collaborator.
//!
//! Optimizers minimize an [`OptimizationProblem`] (a scalar objective plus a
//! batch of inequality constraints `c_i(x) <= tol_i`, all with gradients)
//! inside box bounds. A fresh optimizer is created for every anneal stage
//! from an [`OptimizerFactory`].

pub mod ccsa;
#[cfg(feature = "nlopt")]
pub mod nlopt;

use nalgebra::{
    DMatrix,
    DVector,
};

pub use self::ccsa::Ccsa;
use crate::Error;

pub trait OptimizationProblem {
    fn dimension(&self) -> usize;

    fn num_constraints(&self) -> usize;

    /// Objective value and gradient.
    fn objective(&mut self, x: &DVector<f64>) -> (f64, DVector<f64>);

    /// Constraint values and the Jacobian `[constraints, dimension]`.
    fn constraints(&mut self, x: &DVector<f64>) -> Result<(DVector<f64>, DMatrix<f64>), Error>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerSettings {
    pub lower_bounds: DVector<f64>,
    pub upper_bounds: DVector<f64>,
    pub constraint_tolerances: DVector<f64>,
    /// Evaluation budget, counting the initial point.
    pub max_evaluations: usize,
    /// Stop when the objective changes by at most this fraction. `0` disables.
    pub ftol_rel: f64,
    /// Stop when every variable changes by at most this fraction. `0` disables.
    pub xtol_rel: f64,
    /// Relative tolerance of the inner dual solve.
    pub dual_ftol_rel: f64,
}

impl OptimizerSettings {
    pub fn validate(&self, dimension: usize, num_constraints: usize) -> Result<(), Error> {
        Error::check_size("lower bounds", dimension, self.lower_bounds.len())?;
        Error::check_size("upper bounds", dimension, self.upper_bounds.len())?;
        Error::check_size(
            "constraint tolerances",
            num_constraints,
            self.constraint_tolerances.len(),
        )?;

        let invalid = |reason: String| Err(Error::InvalidSettings { reason });

        for (j, (lower, upper)) in self
            .lower_bounds
            .iter()
            .zip(self.upper_bounds.iter())
            .enumerate()
        {
            if lower.is_nan() || upper.is_nan() || lower > upper {
                return invalid(format!("bounds of variable {j} are [{lower}, {upper}]"));
            }
        }
        if self
            .constraint_tolerances
            .iter()
            .any(|tolerance| !tolerance.is_finite() || *tolerance < 0.0)
        {
            return invalid("constraint tolerances must be non-negative".to_owned());
        }
        if self.max_evaluations == 0 {
            return invalid("evaluation budget is zero".to_owned());
        }
        for (name, value) in [
            ("ftol_rel", self.ftol_rel),
            ("xtol_rel", self.xtol_rel),
            ("dual_ftol_rel", self.dual_ftol_rel),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("{name} must be non-negative, but is {value}"));
            }
        }

        Ok(())
    }

    /// Largest amount by which a constraint exceeds its tolerance, or `0`.
    pub fn violation(&self, constraints: &DVector<f64>) -> f64 {
        constraints
            .iter()
            .zip(self.constraint_tolerances.iter())
            .map(|(value, tolerance)| value - tolerance)
            .fold(0.0, f64::max)
    }

    pub fn is_feasible(&self, constraints: &DVector<f64>) -> bool {
        constraints
            .iter()
            .zip(self.constraint_tolerances.iter())
            .all(|(value, tolerance)| value <= tolerance)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    MaxEvaluations,
    FtolReached,
    XtolReached,
    Converged,
    RoundoffLimited,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationReport {
    pub stop_reason: StopReason,
    pub evaluations: usize,
    /// Objective at the returned point.
    pub objective: f64,
    /// Constraint values at the returned point.
    pub constraints: DVector<f64>,
    pub feasible: bool,
}

pub trait ConstrainedOptimizer {
    /// Minimizes `problem` starting at `x`, which is overwritten with the
    /// result.
    ///
    /// Running out of evaluations is not an error. The returned point may be
    /// infeasible, which is reported in [`OptimizationReport::feasible`].
    fn minimize(
        &mut self,
        problem: &mut dyn OptimizationProblem,
        x: &mut DVector<f64>,
    ) -> Result<OptimizationReport, Error>;
}

pub trait OptimizerFactory {
    fn create(&self, settings: OptimizerSettings) -> Result<Box<dyn ConstrainedOptimizer>, Error>;
}

impl<F> OptimizerFactory for F
where
    F: Fn(OptimizerSettings) -> Result<Box<dyn ConstrainedOptimizer>, Error>,
{
    fn create(&self, settings: OptimizerSettings) -> Result<Box<dyn ConstrainedOptimizer>, Error> {
        self(settings)
    }
}

/// The optimizers shipped with this crate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OptimizerBackend {
    #[default]
    Ccsa,
    /// Method of moving asymptotes from NLopt
    NloptMma,
}

impl OptimizerFactory for OptimizerBackend {
    fn create(&self, settings: OptimizerSettings) -> Result<Box<dyn ConstrainedOptimizer>, Error> {
        match self {
            Self::Ccsa => Ok(Box::new(Ccsa::new(settings))),
            #[cfg(feature = "nlopt")]
            Self::NloptMma => Ok(Box::new(self::nlopt::NloptMma::new(settings))),
            #[cfg(not(feature = "nlopt"))]
            Self::NloptMma => {
                Err(Error::Optimizer {
                    reason: "compiled without the nlopt feature".to_owned(),
                })
            }
        }
    }
}
