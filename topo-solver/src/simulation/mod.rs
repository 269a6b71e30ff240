//! The field-solver collaborator.
//!
//! An [`AdjointSimulation`] takes the physical design fields and returns the
//! objective value for every frequency together with the adjoint
//! sensitivities. The driver never looks inside; it calls
//! [`evaluate`][AdjointSimulation::evaluate] exactly once per constraint
//! evaluation.

pub mod lens;

use nalgebra::{
    DMatrix,
    DVector,
};

pub use self::lens::{
    PhaseScreenLens,
    PhaseScreenLensConfig,
};
use crate::{
    Error,
    design::DesignFields,
};

/// Objective values and their sensitivities from one forward + adjoint run.
#[derive(Clone, Debug, PartialEq)]
pub struct AdjointEvaluation {
    /// One value per frequency.
    pub objective_values: DVector<f64>,

    /// `[design cells, frequencies]`. Row `j`, column `i` is the derivative of
    /// objective `i` with respect to physical cell `j`, with cells ordered like
    /// [`DesignFields::concatenated`].
    pub sensitivity: DMatrix<f64>,
}

impl AdjointEvaluation {
    pub fn check_shape(&self, num_cells: usize, num_objectives: usize) -> Result<(), Error> {
        Error::check_size("objective values", num_objectives, self.objective_values.len())?;
        Error::check_size("sensitivity rows", num_cells, self.sensitivity.nrows())?;
        Error::check_size("sensitivity columns", num_objectives, self.sensitivity.ncols())?;
        Ok(())
    }
}

pub trait AdjointSimulation {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Number of objectives (frequencies) per evaluation.
    fn num_objectives(&self) -> usize;

    fn evaluate(&mut self, fields: &DesignFields) -> Result<AdjointEvaluation, Self::Error>;
}

impl<T> AdjointSimulation for &mut T
where
    T: AdjointSimulation + ?Sized,
{
    type Error = T::Error;

    fn num_objectives(&self) -> usize {
        T::num_objectives(*self)
    }

    fn evaluate(&mut self, fields: &DesignFields) -> Result<AdjointEvaluation, Self::Error> {
        T::evaluate(*self, fields)
    }
}
