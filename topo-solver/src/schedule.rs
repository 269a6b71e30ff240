//! Annealing of the projection sharpness.
//!
//! The design is optimized in stages. Every stage keeps `eta` fixed and
//! multiplies `beta` by a constant growth factor, pushing the physical design
//! toward a binary layout while the optimizer follows along.

use nalgebra::DVector;

use crate::{
    Error,
    design::{
        DesignFields,
        DesignSpace,
    },
    history::EvaluationHistory,
    mapping::ProjectionParameters,
    optimizer::StopReason,
};

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnnealSchedule {
    /// Projection threshold, fixed for all stages.
    pub eta: f64,

    /// Sharpness of the first stage.
    pub initial_beta: f64,

    /// Factor by which `beta` grows from one stage to the next.
    pub beta_growth: f64,

    pub num_stages: usize,

    /// Evaluation budget of every stage.
    pub evaluations_per_stage: usize,

    /// Relative objective change at which a stage is considered converged.
    pub ftol_rel: f64,

    /// Tolerance of every epigraph constraint `f_i - t <= tol`.
    pub constraint_tolerance: f64,
}

impl Default for AnnealSchedule {
    fn default() -> Self {
        Self {
            eta: 0.5,
            initial_beta: 8.0,
            beta_growth: 2.0,
            num_stages: 4,
            evaluations_per_stage: 30,
            ftol_rel: 1e-5,
            constraint_tolerance: 1e-3,
        }
    }
}

impl AnnealSchedule {
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |reason: String| Err(Error::InvalidSchedule { reason });

        if !(self.eta > 0.0 && self.eta < 1.0) {
            return invalid(format!("eta must be in (0, 1), but is {}", self.eta));
        }
        if !(self.initial_beta.is_finite() && self.initial_beta > 0.0) {
            return invalid(format!(
                "initial beta must be positive and finite, but is {}",
                self.initial_beta
            ));
        }
        if !(self.beta_growth.is_finite() && self.beta_growth > 1.0) {
            return invalid(format!(
                "beta growth must be greater than 1, but is {}",
                self.beta_growth
            ));
        }
        if self.num_stages == 0 {
            return invalid("no stages".to_owned());
        }
        let final_beta = self.initial_beta * self.beta_growth.powf((self.num_stages - 1) as f64);
        if !final_beta.is_finite() {
            return invalid(format!(
                "beta overflows within {} stages of growth {}",
                self.num_stages, self.beta_growth
            ));
        }
        if self.evaluations_per_stage < 2 {
            return invalid(format!(
                "a stage needs at least 2 evaluations, but the budget is {}",
                self.evaluations_per_stage
            ));
        }
        if !(self.ftol_rel.is_finite() && self.ftol_rel >= 0.0) {
            return invalid(format!("invalid ftol_rel: {}", self.ftol_rel));
        }
        if !(self.constraint_tolerance.is_finite() && self.constraint_tolerance >= 0.0) {
            return invalid(format!(
                "invalid constraint tolerance: {}",
                self.constraint_tolerance
            ));
        }

        Ok(())
    }

    pub fn stages(&self) -> impl Iterator<Item = StageParameters> {
        let eta = self.eta;
        let growth = self.beta_growth;
        std::iter::successors(Some(self.initial_beta), move |beta| Some(beta * growth))
            .take(self.num_stages)
            .enumerate()
            .map(move |(index, beta)| StageParameters { index, eta, beta })
    }

    pub fn final_beta(&self) -> f64 {
        self.stages()
            .last()
            .map_or(self.initial_beta, |stage| stage.beta)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StageParameters {
    pub index: usize,
    pub eta: f64,
    pub beta: f64,
}

impl StageParameters {
    pub fn projection(&self) -> ProjectionParameters {
        ProjectionParameters::new(self.eta, self.beta)
    }
}

/// How a stage ended.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StageReport {
    pub parameters: StageParameters,
    pub stop_reason: StopReason,
    pub evaluations: usize,
    pub feasible: bool,
    /// Epigraph variable `t` at the end of the stage.
    pub bound: f64,
    /// Largest objective at the end of the stage.
    pub worst_objective: f64,
}

#[derive(Clone, Debug)]
pub struct AnnealOutcome {
    /// Augmented vector `[t, raw design...]` after the last stage.
    pub design: DVector<f64>,
    pub stages: Vec<StageReport>,
    pub history: EvaluationHistory,
    pub(crate) eta: f64,
}

impl AnnealOutcome {
    /// The epigraph variable `t`.
    pub fn bound(&self) -> f64 {
        self.design[0]
    }

    /// The raw design without the epigraph variable.
    pub fn raw_design(&self) -> DVector<f64> {
        self.design.rows(1, self.design.len() - 1).into_owned()
    }

    /// Physical design at the sharpness of the last stage.
    pub fn physical(&self, space: &DesignSpace) -> Result<DesignFields, Error> {
        let beta = self
            .stages
            .last()
            .map_or(f64::INFINITY, |stage| stage.parameters.beta);
        space.map(&self.raw_design(), &ProjectionParameters::new(self.eta, beta))
    }

    /// Physical design of the last stage thresholded to a hard two-material
    /// layout.
    pub fn binarized(&self, space: &DesignSpace) -> Result<DesignFields, Error> {
        Ok(self.physical(space)?.thresholded(self.eta))
    }
}
