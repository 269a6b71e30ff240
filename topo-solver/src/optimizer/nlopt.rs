//! MMA from NLopt as an alternative backend.

use std::cell::RefCell;

use nalgebra::DVector;
use nlopt::{
    Algorithm,
    FailState,
    Nlopt,
    SuccessState,
    Target,
};

use crate::{
    Error,
    optimizer::{
        ConstrainedOptimizer,
        OptimizationProblem,
        OptimizationReport,
        OptimizerSettings,
        StopReason,
    },
};

#[derive(Clone, Debug)]
pub struct NloptMma {
    settings: OptimizerSettings,
}

impl NloptMma {
    pub fn new(settings: OptimizerSettings) -> Self {
        Self { settings }
    }
}

struct CallbackState<'a> {
    problem: &'a mut dyn OptimizationProblem,
    evaluations: Vec<(DVector<f64>, DVector<f64>)>,
    error: Option<Error>,
}

fn nlopt_error(operation: &str, state: impl std::fmt::Debug) -> Error {
    Error::Optimizer {
        reason: format!("nlopt {operation} failed: {state:?}"),
    }
}

impl ConstrainedOptimizer for NloptMma {
    fn minimize(
        &mut self,
        problem: &mut dyn OptimizationProblem,
        x: &mut DVector<f64>,
    ) -> Result<OptimizationReport, Error> {
        let n = problem.dimension();
        let m = problem.num_constraints();
        self.settings.validate(n, m)?;
        Error::check_size("initial point", n, x.len())?;

        let state = RefCell::new(CallbackState {
            problem,
            evaluations: vec![],
            error: None,
        });

        let objective = |x: &[f64], gradient: Option<&mut [f64]>, state: &mut &RefCell<CallbackState>| {
            let mut state = state.borrow_mut();
            let (value, g) = state.problem.objective(&DVector::from_column_slice(x));
            if let Some(gradient) = gradient {
                gradient.copy_from_slice(g.as_slice());
            }
            value
        };

        let constraints = |result: &mut [f64],
                           x: &[f64],
                           gradient: Option<&mut [f64]>,
                           state: &mut &RefCell<CallbackState>| {
            let mut state = state.borrow_mut();
            if state.error.is_some() {
                // nlopt can't be stopped from here, so don't evaluate again
                result.fill(f64::NAN);
                return;
            }
            let x = DVector::from_column_slice(x);
            match state.problem.constraints(&x) {
                Ok((values, jacobian)) => {
                    result.copy_from_slice(values.as_slice());
                    if let Some(gradient) = gradient {
                        // row-major
                        let n = x.len();
                        for i in 0..jacobian.nrows() {
                            for j in 0..n {
                                gradient[i * n + j] = jacobian[(i, j)];
                            }
                        }
                    }
                    state.evaluations.push((x, values));
                }
                Err(error) => {
                    result.fill(f64::NAN);
                    state.error.get_or_insert(error);
                }
            }
        };

        let outcome = {
            let mut optimizer = Nlopt::new(Algorithm::Mma, n, objective, Target::Minimize, &state);
            optimizer
                .set_lower_bounds(self.settings.lower_bounds.as_slice())
                .map_err(|e| nlopt_error("set_lower_bounds", e))?;
            optimizer
                .set_upper_bounds(self.settings.upper_bounds.as_slice())
                .map_err(|e| nlopt_error("set_upper_bounds", e))?;
            optimizer
                .set_maxeval(u32::try_from(self.settings.max_evaluations).unwrap_or(u32::MAX))
                .map_err(|e| nlopt_error("set_maxeval", e))?;
            optimizer
                .set_ftol_rel(self.settings.ftol_rel)
                .map_err(|e| nlopt_error("set_ftol_rel", e))?;
            optimizer
                .set_xtol_rel(self.settings.xtol_rel)
                .map_err(|e| nlopt_error("set_xtol_rel", e))?;
            optimizer
                .add_inequality_mconstraint(
                    m,
                    constraints,
                    &state,
                    self.settings.constraint_tolerances.as_slice(),
                )
                .map_err(|e| nlopt_error("add_inequality_mconstraint", e))?;

            optimizer.optimize(x.as_mut_slice())
        };

        let mut state = state.into_inner();
        if let Some(error) = state.error {
            return Err(error);
        }

        let stop_reason = match outcome {
            Ok((SuccessState::MaxEvalReached, _)) => StopReason::MaxEvaluations,
            Ok((SuccessState::FtolReached, _)) => StopReason::FtolReached,
            Ok((SuccessState::XtolReached, _)) => StopReason::XtolReached,
            Ok(_) => StopReason::Converged,
            Err((FailState::RoundoffLimited, _)) => StopReason::RoundoffLimited,
            Err((fail, _)) => return Err(nlopt_error("optimize", fail)),
        };

        let mut evaluations = state.evaluations.len();
        let (objective, _) = state.problem.objective(x);
        let constraints = match state
            .evaluations
            .into_iter()
            .rev()
            .find(|(evaluated, _)| *evaluated == *x)
        {
            Some((_, constraints)) => constraints,
            None => {
                evaluations += 1;
                state.problem.constraints(x)?.0
            }
        };

        Ok(OptimizationReport {
            stop_reason,
            evaluations,
            objective,
            feasible: self.settings.is_feasible(&constraints),
            constraints,
        })
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{
        DMatrix,
        DVector,
    };

    use crate::{
        Error,
        optimizer::{
            ConstrainedOptimizer,
            OptimizationProblem,
            nlopt::NloptMma,
            tests::settings,
        },
    };

    /// min t s.t. -mean(x) - t <= 0
    #[derive(Debug, Default)]
    struct MeanEpigraph {
        calls: usize,
        fail_after: Option<usize>,
    }

    impl OptimizationProblem for MeanEpigraph {
        fn dimension(&self) -> usize {
            3
        }

        fn num_constraints(&self) -> usize {
            1
        }

        fn objective(&mut self, x: &DVector<f64>) -> (f64, DVector<f64>) {
            (x[0], DVector::from_vec(vec![1.0, 0.0, 0.0]))
        }

        fn constraints(&mut self, x: &DVector<f64>) -> Result<(DVector<f64>, DMatrix<f64>), Error> {
            self.calls += 1;
            if self.fail_after.is_some_and(|limit| self.calls > limit) {
                return Err(Error::Optimizer {
                    reason: "simulation diverged".to_owned(),
                });
            }
            let mean = 0.5 * (x[1] + x[2]);
            let jacobian = DMatrix::from_row_slice(1, 3, &[-1.0, -0.5, -0.5]);
            Ok((DVector::from_element(1, -mean - x[0]), jacobian))
        }
    }

    fn optimizer() -> NloptMma {
        NloptMma::new(settings(
            vec![f64::NEG_INFINITY, 0.0, 0.0],
            vec![0.0, 1.0, 1.0],
            vec![1e-3],
        ))
    }

    #[test]
    fn it_solves_mean_epigraph() {
        let mut problem = MeanEpigraph::default();
        let mut x = DVector::from_vec(vec![0.0, 0.5, 0.5]);

        let report = optimizer().minimize(&mut problem, &mut x).unwrap();

        assert!(x[0] < 0.0, "t = {}", x[0]);
        assert!(report.feasible);
        assert!(report.constraints[0] <= 1e-3);
        assert_eq!(report.evaluations, problem.calls);
    }

    #[test]
    fn it_stops_evaluating_after_an_error() {
        let mut problem = MeanEpigraph {
            calls: 0,
            fail_after: Some(2),
        };
        let mut x = DVector::from_vec(vec![0.0, 0.5, 0.5]);

        let result = optimizer().minimize(&mut problem, &mut x);

        assert!(matches!(result, Err(Error::Optimizer { .. })));
        assert_eq!(problem.calls, 3);
    }
}
